//! Expansion of declarative sweep specifications into concrete configurations.
//!
//! A [`ConfigurationSpec`] maps each field to one value or a list of values.
//! Expanding it yields the Cartesian product of those lists, with the first
//! field varying slowest and the last fastest. A list of specs expands to the
//! concatenation of each spec's product, in order. Nothing is deduplicated.

use super::benchmark_types::{ConfigOverrides, Field};
use serde::de::{self, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// The values a spec assigns to one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AxisValues {
    Single(usize),
    Many(Vec<usize>),
}

impl AxisValues {
    /// The values as a list; a single value becomes a one-element list.
    pub fn as_slice(&self) -> &[usize] {
        match self {
            AxisValues::Single(value) => std::slice::from_ref(value),
            AxisValues::Many(values) => values,
        }
    }
}

impl From<usize> for AxisValues {
    fn from(value: usize) -> Self {
        AxisValues::Single(value)
    }
}

impl From<Vec<usize>> for AxisValues {
    fn from(values: Vec<usize>) -> Self {
        AxisValues::Many(values)
    }
}

impl<const N: usize> From<[usize; N]> for AxisValues {
    fn from(values: [usize; N]) -> Self {
        AxisValues::Many(values.to_vec())
    }
}

/// One block of a sweep: an ordered mapping from field to candidate values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigurationSpec {
    axes: Vec<(Field, AxisValues)>,
}

impl ConfigurationSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the values for `field`, replacing any earlier assignment in place.
    pub fn with(mut self, field: Field, values: impl Into<AxisValues>) -> Self {
        let values = values.into();
        match self.axes.iter_mut().find(|(existing, _)| *existing == field) {
            Some(axis) => axis.1 = values,
            None => self.axes.push((field, values)),
        }
        self
    }

    pub fn axes(&self) -> &[(Field, AxisValues)] {
        &self.axes
    }

    /// Number of configurations this spec expands to.
    pub fn num_combinations(&self) -> usize {
        self.axes
            .iter()
            .map(|(_, values)| values.as_slice().len())
            .product()
    }

    /// Lazily enumerates the Cartesian product of this spec's axes.
    pub fn combinations(&self) -> Combinations<'_> {
        Combinations {
            axes: &self.axes,
            indices: vec![0; self.axes.len()],
            exhausted: self
                .axes
                .iter()
                .any(|(_, values)| values.as_slice().is_empty()),
        }
    }
}

/// Expands `specs` in order into a flat, finite sequence of overrides.
///
/// The returned iterator borrows `specs`; calling this again produces an
/// identical sequence.
pub fn expand_specs(specs: &[ConfigurationSpec]) -> impl Iterator<Item = ConfigOverrides> + '_ {
    specs.iter().flat_map(ConfigurationSpec::combinations)
}

/// Iterator over the combinations of one [`ConfigurationSpec`].
#[derive(Debug, Clone)]
pub struct Combinations<'a> {
    axes: &'a [(Field, AxisValues)],
    indices: Vec<usize>,
    exhausted: bool,
}

impl Iterator for Combinations<'_> {
    type Item = ConfigOverrides;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let current = self
            .axes
            .iter()
            .zip(&self.indices)
            .map(|((field, values), &index)| (*field, values.as_slice()[index]))
            .collect();

        // Odometer increment, last axis fastest.
        self.exhausted = true;
        for position in (0..self.axes.len()).rev() {
            self.indices[position] += 1;
            if self.indices[position] < self.axes[position].1.as_slice().len() {
                self.exhausted = false;
                break;
            }
            self.indices[position] = 0;
        }

        Some(ConfigOverrides::new(current))
    }
}

impl Serialize for ConfigurationSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.axes.len()))?;
        for (field, values) in &self.axes {
            map.serialize_entry(field, values)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ConfigurationSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SpecVisitor;

        impl<'de> Visitor<'de> for SpecVisitor {
            type Value = ConfigurationSpec;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map from configuration field to a value or list of values")
            }

            fn visit_map<M: MapAccess<'de>>(self, mut access: M) -> Result<Self::Value, M::Error> {
                let mut axes: Vec<(Field, AxisValues)> =
                    Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((field, values)) = access.next_entry::<Field, AxisValues>()? {
                    if axes.iter().any(|(existing, _)| *existing == field) {
                        return Err(de::Error::custom(format!("duplicate field `{}`", field)));
                    }
                    axes.push((field, values));
                }
                Ok(ConfigurationSpec { axes })
            }
        }

        deserializer.deserialize_map(SpecVisitor)
    }
}
