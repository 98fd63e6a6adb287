//! Encoder that keeps every activation of the forward pass for backward.

use super::latent_attention::{
    DeviceParameters, LatentAttentionParams, encode, encode_backward, latent_stack,
    latent_stack_backward,
};
use super::{Candidate, ForwardPass};
use crate::benchmarks::RunConfiguration;
use crate::device::{Device, DeviceArray};
use crate::errors::{BenchmarkResult, DeviceResult};
use ndarray::{Array3, ArrayView2, Axis, Ix3};

/// Latent cross-attention encoder trading memory for speed: the backward
/// pass reads every intermediate straight from the forward tape.
#[derive(Debug)]
pub struct DensePerceiver {
    state: DeviceParameters,
}

struct DenseTape {
    input: DeviceArray<Ix3>,
    keys: DeviceArray<Ix3>,
    attention: DeviceArray<Ix3>,
    layer_inputs: Vec<DeviceArray<Ix3>>,
    pre_activations: Vec<DeviceArray<Ix3>>,
}

impl DensePerceiver {
    pub const NAME: &'static str = "dense-perceiver";

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
}

fn upload_all(
    device: &dyn Device,
    arrays: Vec<Array3<f32>>,
) -> DeviceResult<Vec<DeviceArray<Ix3>>> {
    arrays
        .into_iter()
        .map(|array| DeviceArray::upload(device, array))
        .collect()
}

impl Candidate for DensePerceiver {
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
        let latent_shape = (batch_size, num_latents, latent_dim);

        let mut keys = Array3::zeros((batch_size, seq_len, latent_dim));
        let mut attention = Array3::zeros((batch_size, num_latents, seq_len));
        let mut layer_inputs: Vec<Array3<f32>> =
            (0..params.depth()).map(|_| Array3::zeros(latent_shape)).collect();
        let mut pre_activations: Vec<Array3<f32>> =
            (0..params.depth()).map(|_| Array3::zeros(latent_shape)).collect();
        let mut output = Array3::zeros(latent_shape);

        let samples = batch.view();
        for (index, sample) in samples.outer_iter().enumerate() {
            let encoder = encode(params, sample);
            keys.index_axis_mut(Axis(0), index).assign(&encoder.keys);
            attention
                .index_axis_mut(Axis(0), index)
                .assign(&encoder.attention);

            let stack = latent_stack(params, encoder.encoded);
            for (layer, (input, pre)) in stack
                .layer_inputs
                .iter()
                .zip(&stack.pre_activations)
                .enumerate()
            {
                layer_inputs[layer]
                    .index_axis_mut(Axis(0), index)
                    .assign(input);
                pre_activations[layer]
                    .index_axis_mut(Axis(0), index)
                    .assign(pre);
            }
            output.index_axis_mut(Axis(0), index).assign(&stack.output);
        }

        let tape = DenseTape {
            input: batch.clone(),
            keys: DeviceArray::upload(device, keys)?,
            attention: DeviceArray::upload(device, attention)?,
            layer_inputs: upload_all(device, layer_inputs)?,
            pre_activations: upload_all(device, pre_activations)?,
        };
        let output = DeviceArray::upload(device, output)?;

        Ok(ForwardPass::new(output, tape))
    }

    fn backward(&mut self, _device: &dyn Device, pass: ForwardPass) -> BenchmarkResult<()> {
        self.state.ensure_on_device(Self::NAME)?;
        let tape: DenseTape = pass.into_tape(Self::NAME)?;
        let batch_size = tape.input.shape()[0];
        let state = &mut self.state;
        state.grads.fill_zero();

        for index in 0..batch_size {
            let saved: Vec<(ArrayView2<'_, f32>, ArrayView2<'_, f32>)> = tape
                .layer_inputs
                .iter()
                .zip(&tape.pre_activations)
                .map(|(input, pre)| {
                    (
                        input.view().index_axis_move(Axis(0), index),
                        pre.view().index_axis_move(Axis(0), index),
                    )
                })
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
