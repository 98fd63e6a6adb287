//! Encoder that recomputes the latent layers during backward.

use super::latent_attention::{
    DeviceParameters, LatentAttentionParams, encode, encode_backward, latent_stack,
    latent_stack_backward,
};
use super::{Candidate, ForwardPass};
use crate::benchmarks::RunConfiguration;
use crate::device::{Device, DeviceArray};
use crate::errors::BenchmarkResult;
use ndarray::{Array3, ArrayView2, Axis, Ix3};

/// Latent cross-attention encoder that only keeps the cross-attention
/// activations between passes and replays the latent layers one sample at a
/// time in backward. Peak memory no longer grows with `depth × batch_size`.
#[derive(Debug)]
pub struct CheckpointedPerceiver {
    state: DeviceParameters,
}

struct CheckpointTape {
    input: DeviceArray<Ix3>,
    keys: DeviceArray<Ix3>,
    attention: DeviceArray<Ix3>,
    encoded: DeviceArray<Ix3>,
}

impl CheckpointedPerceiver {
    pub const NAME: &'static str = "checkpointed-perceiver";

    pub fn new(params: LatentAttentionParams) -> Self {
        Self {
            state: DeviceParameters::new(params),
        }
    }

    pub fn from_config(config: &RunConfiguration, seed: Option<u64>) -> BenchmarkResult<Self> {
        Ok(Self {
            state: DeviceParameters::from_config(Self::NAME, config, seed)?,
        })
    }

    pub fn params(&self) -> &LatentAttentionParams {
        &self.state.params
    }

    /// Gradients left by the most recent backward pass.
    pub fn gradients(&self) -> &LatentAttentionParams {
        &self.state.grads
    }

    /// Bytes of recomputed activations alive while one sample is replayed.
    fn replay_bytes(&self) -> u64 {
        let params = &self.state.params;
        let per_layer = params.num_latents() * params.latent_dim();
        (2 * params.depth() * per_layer * std::mem::size_of::<f32>()) as u64
    }
}

impl Candidate for CheckpointedPerceiver {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn to_device(&mut self, device: &dyn Device) -> BenchmarkResult<()> {
        Ok(self.state.to_device(device)?)
    }

    fn forward(
        &mut self,
        device: &dyn Device,
        batch: &DeviceArray<Ix3>,
    ) -> BenchmarkResult<ForwardPass> {
        self.state.ensure_on_device(Self::NAME)?;
        let (batch_size, seq_len) = self.state.check_batch(batch)?;
        let params = &self.state.params;
        let (num_latents, latent_dim) = (params.num_latents(), params.latent_dim());

        let mut keys = Array3::zeros((batch_size, seq_len, latent_dim));
        let mut attention = Array3::zeros((batch_size, num_latents, seq_len));
        let mut encoded = Array3::zeros((batch_size, num_latents, latent_dim));
        let mut output = Array3::zeros((batch_size, num_latents, latent_dim));

        let samples = batch.view();
        for (index, sample) in samples.outer_iter().enumerate() {
            let encoder = encode(params, sample);
            keys.index_axis_mut(Axis(0), index).assign(&encoder.keys);
            attention
                .index_axis_mut(Axis(0), index)
                .assign(&encoder.attention);
            encoded
                .index_axis_mut(Axis(0), index)
                .assign(&encoder.encoded);

            // Intermediate layer activations are dropped here and replayed in backward.
            let stack = latent_stack(params, encoder.encoded);
            output.index_axis_mut(Axis(0), index).assign(&stack.output);
        }

        let tape = CheckpointTape {
            input: batch.clone(),
            keys: DeviceArray::upload(device, keys)?,
            attention: DeviceArray::upload(device, attention)?,
            encoded: DeviceArray::upload(device, encoded)?,
        };
        let output = DeviceArray::upload(device, output)?;

        Ok(ForwardPass::new(output, tape))
    }

    fn backward(&mut self, device: &dyn Device, pass: ForwardPass) -> BenchmarkResult<()> {
        self.state.ensure_on_device(Self::NAME)?;
        let tape: CheckpointTape = pass.into_tape(Self::NAME)?;
        let batch_size = tape.input.shape()[0];
        let _replay = device.allocate(self.replay_bytes())?;
        let state = &mut self.state;
        state.grads.fill_zero();

        for index in 0..batch_size {
            let encoded = tape
                .encoded
                .view()
                .index_axis_move(Axis(0), index)
                .to_owned();
            let stack = latent_stack(&state.params, encoded);
            let saved: Vec<(ArrayView2<'_, f32>, ArrayView2<'_, f32>)> = stack
                .layer_inputs
                .iter()
                .zip(&stack.pre_activations)
                .map(|(input, pre)| (input.view(), pre.view()))
                .collect();

            let grad_output = state.mean_gradient(batch_size);
            let grad_encoded =
                latent_stack_backward(&state.params, &saved, grad_output, &mut state.grads);
            encode_backward(
                &state.params,
                tape.input.view().index_axis_move(Axis(0), index),
                tape.keys.view().index_axis_move(Axis(0), index),
                tape.attention.view().index_axis_move(Axis(0), index),
                grad_encoded,
                &mut state.grads,
            );
        }

        Ok(())
    }
}
