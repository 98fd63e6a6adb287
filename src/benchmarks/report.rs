//! CSV export of result records.

use super::benchmark_types::ResultRecord;
use crate::errors::BenchmarkResult;
use log::info;
use std::io;
use std::path::Path;

/// Writes one header row followed by one row per record.
pub fn write_records<W: io::Write>(writer: W, records: &[ResultRecord]) -> BenchmarkResult<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes all records to `path`, replacing any existing file.
pub fn write_csv(path: impl AsRef<Path>, records: &[ResultRecord]) -> BenchmarkResult<()> {
    let path = path.as_ref();
    let file = std::fs::File::create(path)?;
    write_records(file, records)?;
    info!("Wrote {} result(s) to {}", records.len(), path.display());
    Ok(())
}

/// Reads records previously written by [`write_csv`].
pub fn read_csv(path: impl AsRef<Path>) -> BenchmarkResult<Vec<ResultRecord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let records = reader.deserialize().collect::<Result<Vec<ResultRecord>, _>>()?;
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmarks::DEFAULT_CONFIGURATION;

    fn sample_record(candidate: &str) -> ResultRecord {
        let requested = DEFAULT_CONFIGURATION;
        let executed = requested.with_batch_size(128);
        ResultRecord::new(candidate, &requested, &executed, 1, 2.0, 1 << 20, 100)
    }

    #[test]
    fn test_header_and_column_order() {
        let mut buffer = Vec::new();
        write_records(&mut buffer, &[sample_record("dense-perceiver")]).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        let header = text.lines().next().unwrap();
        assert_eq!(
            header,
            "batch_size,input_dim,input_size,depth,latent_dim,num_latents,candidate,\
             executed_batch_size,backoff_reductions,run_time,peak_memory,it_per_sec,time_per_it"
        );
        assert_eq!(text.lines().count(), 2);
    }

    #[test]
    fn test_csv_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.csv");
        let records = vec![sample_record("a"), sample_record("b")];

        write_csv(&path, &records).unwrap();
        let loaded = read_csv(&path).unwrap();

        assert_eq!(loaded, records);
    }

    #[test]
    fn test_empty_results_write_no_rows() {
        let mut buffer = Vec::new();
        write_records(&mut buffer, &[]).unwrap();
        assert!(buffer.is_empty());
    }
}
