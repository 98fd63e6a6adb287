//! Latent cross-attention encoder shared by the built-in candidates.
//!
//! For one sample `X` of shape `(seq_len, input_dim)`:
//!
//! ```text
//! K     = X · W_in                      (seq_len, latent_dim)
//! P     = softmax(L · Kᵀ / √latent_dim)  (num_latents, seq_len)
//! Z₀    = P · K                         (num_latents, latent_dim)
//! Zₗ₊₁  = Zₗ + relu(Zₗ · Wₗ)             for each of the `depth` latent layers
//! ```
//!
//! The candidates differ only in which of these activations they keep between
//! the forward and the backward pass.

use crate::benchmarks::RunConfiguration;
use crate::device::{Device, DeviceArray, MemoryLease};
use crate::errors::{BenchmarkError, BenchmarkResult, DeviceError, DeviceResult};
use ndarray::{Array2, ArrayView2, Axis, Ix3, Zip};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// Learnable parameters of the encoder, also used as the gradient container.
#[derive(Debug, Clone, PartialEq)]
pub struct LatentAttentionParams {
    /// `(input_dim, latent_dim)`
    pub input_projection: Array2<f32>,
    /// `(num_latents, latent_dim)`
    pub latents: Array2<f32>,
    /// `depth` matrices of `(latent_dim, latent_dim)`
    pub layers: Vec<Array2<f32>>,
}

impl LatentAttentionParams {
    /// Random initialisation scaled by `1/√fan_in`.
    pub fn init<R: Rng>(config: &RunConfiguration, rng: &mut R) -> Self {
        let latent_dim = config.latent_dim;
        Self {
            input_projection: random_matrix(rng, config.input_dim, latent_dim),
            latents: random_matrix(rng, config.num_latents, latent_dim),
            layers: (0..config.depth)
                .map(|_| random_matrix(rng, latent_dim, latent_dim))
                .collect(),
        }
    }

    /// All-zero parameters of the same shapes.
    pub fn zeros_like(&self) -> Self {
        Self {
            input_projection: Array2::zeros(self.input_projection.raw_dim()),
            latents: Array2::zeros(self.latents.raw_dim()),
            layers: self
                .layers
                .iter()
                .map(|layer| Array2::zeros(layer.raw_dim()))
                .collect(),
        }
    }

    pub fn fill_zero(&mut self) {
        self.input_projection.fill(0.0);
        self.latents.fill(0.0);
        for layer in &mut self.layers {
            layer.fill(0.0);
        }
    }

    pub fn input_dim(&self) -> usize {
        self.input_projection.nrows()
    }

    pub fn latent_dim(&self) -> usize {
        self.latents.ncols()
    }

    pub fn num_latents(&self) -> usize {
        self.latents.nrows()
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Attention logit scale `1/√latent_dim`.
    pub fn scale(&self) -> f32 {
        1.0 / (self.latent_dim() as f32).sqrt()
    }

    pub fn num_elements(&self) -> usize {
        self.input_projection.len()
            + self.latents.len()
            + self.layers.iter().map(|layer| layer.len()).sum::<usize>()
    }

    pub fn size_in_bytes(&self) -> u64 {
        (self.num_elements() * std::mem::size_of::<f32>()) as u64
    }
}

fn random_matrix<R: Rng>(rng: &mut R, rows: usize, cols: usize) -> Array2<f32> {
    let scale = 1.0 / (rows.max(1) as f32).sqrt();
    Array2::from_shape_simple_fn((rows, cols), || rng.sample::<f32, _>(StandardNormal) * scale)
}

/// Parameters and gradient buffers of one candidate instance, plus the device
/// memory backing them once placed.
#[derive(Debug)]
pub struct DeviceParameters {
    pub params: LatentAttentionParams,
    pub grads: LatentAttentionParams,
    leases: Vec<MemoryLease>,
}

impl DeviceParameters {
    pub fn new(params: LatentAttentionParams) -> Self {
        let grads = params.zeros_like();
        Self {
            params,
            grads,
            leases: Vec::new(),
        }
    }

    /// Initialises parameters for `config`, from `seed` when given.
    pub fn from_config(
        candidate: &str,
        config: &RunConfiguration,
        seed: Option<u64>,
    ) -> BenchmarkResult<Self> {
        for (field, value) in [
            ("input_dim", config.input_dim),
            ("latent_dim", config.latent_dim),
            ("num_latents", config.num_latents),
        ] {
            if value == 0 {
                return Err(BenchmarkError::CandidateBuild {
                    candidate: candidate.to_string(),
                    message: format!("{} must be greater than 0", field),
                });
            }
        }

        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self::new(LatentAttentionParams::init(config, &mut rng)))
    }

    /// Reserves device memory for the parameters and their gradients.
    pub fn to_device(&mut self, device: &dyn Device) -> DeviceResult<()> {
        self.leases.clear();
        let params = device.allocate(self.params.size_in_bytes())?;
        let grads = device.allocate(self.grads.size_in_bytes())?;
        self.leases = vec![params, grads];
        Ok(())
    }

    pub fn ensure_on_device(&self, candidate: &str) -> BenchmarkResult<()> {
        if self.leases.is_empty() {
            return Err(BenchmarkError::CandidateExecution {
                candidate: candidate.to_string(),
                message: "Candidate was not moved to a device".to_string(),
            });
        }
        Ok(())
    }

    /// Checks the batch feature dimension; returns `(batch_size, seq_len)`.
    pub fn check_batch(&self, batch: &DeviceArray<Ix3>) -> DeviceResult<(usize, usize)> {
        let shape = batch.shape();
        let (batch_size, seq_len, feature_dim) = (shape[0], shape[1], shape[2]);
        if feature_dim != self.params.input_dim() {
            return Err(DeviceError::ShapeMismatch {
                expected: vec![batch_size, seq_len, self.params.input_dim()],
                actual: shape.to_vec(),
            });
        }
        Ok((batch_size, seq_len))
    }

    /// Gradient of the output mean with respect to each output element.
    pub fn mean_gradient(&self, batch_size: usize) -> Array2<f32> {
        let (num_latents, latent_dim) = (self.params.num_latents(), self.params.latent_dim());
        let seed = 1.0 / (batch_size * num_latents * latent_dim) as f32;
        Array2::from_elem((num_latents, latent_dim), seed)
    }
}

/// Activations of the cross-attention step for one sample.
#[derive(Debug, Clone)]
pub struct EncoderActivations {
    pub keys: Array2<f32>,
    pub attention: Array2<f32>,
    pub encoded: Array2<f32>,
}

/// Cross-attends the latent array to one input sample.
pub fn encode(params: &LatentAttentionParams, input: ArrayView2<'_, f32>) -> EncoderActivations {
    let keys = input.dot(&params.input_projection);
    let mut attention = params.latents.dot(&keys.t()) * params.scale();
    softmax_rows(&mut attention);
    let encoded = attention.dot(&keys);

    EncoderActivations {
        keys,
        attention,
        encoded,
    }
}

/// Applies one residual latent layer; returns `(pre_activation, output)`.
pub fn latent_layer(
    weights: &Array2<f32>,
    input: ArrayView2<'_, f32>,
) -> (Array2<f32>, Array2<f32>) {
    let pre_activation = input.dot(weights);
    let output = &input + &pre_activation.mapv(|v| v.max(0.0));
    (pre_activation, output)
}

/// Backward through one residual latent layer.
///
/// Accumulates the weight gradient into `grad_weights` and returns the
/// gradient with respect to the layer input.
pub fn latent_layer_backward(
    weights: &Array2<f32>,
    input: ArrayView2<'_, f32>,
    pre_activation: ArrayView2<'_, f32>,
    grad_output: Array2<f32>,
    grad_weights: &mut Array2<f32>,
) -> Array2<f32> {
    let mut grad_pre = grad_output.clone();
    Zip::from(&mut grad_pre)
        .and(&pre_activation)
        .for_each(|grad, &pre| {
            if pre <= 0.0 {
                *grad = 0.0;
            }
        });

    *grad_weights += &input.t().dot(&grad_pre);
    grad_output + &grad_pre.dot(&weights.t())
}

/// Activations of the residual latent layers for one sample.
#[derive(Debug, Clone)]
pub struct LatentStack {
    /// Input of each layer; the first entry is the encoder output.
    pub layer_inputs: Vec<Array2<f32>>,
    pub pre_activations: Vec<Array2<f32>>,
    pub output: Array2<f32>,
}

/// Runs every latent layer starting from the encoder output.
pub fn latent_stack(params: &LatentAttentionParams, encoded: Array2<f32>) -> LatentStack {
    let mut layer_inputs = Vec::with_capacity(params.depth());
    let mut pre_activations = Vec::with_capacity(params.depth());
    let mut current = encoded;
    for weights in &params.layers {
        let (pre_activation, next) = latent_layer(weights, current.view());
        layer_inputs.push(current);
        pre_activations.push(pre_activation);
        current = next;
    }

    LatentStack {
        layer_inputs,
        pre_activations,
        output: current,
    }
}

/// Backward through the latent layers, last to first.
///
/// `saved` holds `(layer_input, pre_activation)` for every layer in forward
/// order. Returns the gradient with respect to the encoder output.
pub fn latent_stack_backward(
    params: &LatentAttentionParams,
    saved: &[(ArrayView2<'_, f32>, ArrayView2<'_, f32>)],
    grad_output: Array2<f32>,
    grads: &mut LatentAttentionParams,
) -> Array2<f32> {
    let mut grad = grad_output;
    for ((weights, grad_weights), (input, pre_activation)) in params
        .layers
        .iter()
        .zip(grads.layers.iter_mut())
        .zip(saved.iter())
        .rev()
    {
        grad = latent_layer_backward(weights, *input, *pre_activation, grad, grad_weights);
    }
    grad
}

/// Backward through the cross-attention step for one sample, accumulating
/// into `grads.latents` and `grads.input_projection`.
pub fn encode_backward(
    params: &LatentAttentionParams,
    input: ArrayView2<'_, f32>,
    keys: ArrayView2<'_, f32>,
    attention: ArrayView2<'_, f32>,
    grad_encoded: Array2<f32>,
    grads: &mut LatentAttentionParams,
) {
    let grad_attention = grad_encoded.dot(&keys.t());
    let mut grad_keys = attention.t().dot(&grad_encoded);

    let grad_scores = softmax_rows_backward(attention, grad_attention.view()) * params.scale();
    grads.latents += &grad_scores.dot(&keys);
    grad_keys += &grad_scores.t().dot(&params.latents);

    grads.input_projection += &input.t().dot(&grad_keys);
}

/// Numerically stable softmax over each row, in place.
pub fn softmax_rows(scores: &mut Array2<f32>) {
    for mut row in scores.axis_iter_mut(Axis(0)) {
        let max_val = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        let mut sum = 0.0f32;
        for val in row.iter_mut() {
            *val = (*val - max_val).exp();
            sum += *val;
        }
        for val in row.iter_mut() {
            *val /= sum;
        }
    }
}

/// Gradient of the scores given the row-softmax `probs` and the gradient of the probabilities.
pub fn softmax_rows_backward(
    probs: ArrayView2<'_, f32>,
    grad_probs: ArrayView2<'_, f32>,
) -> Array2<f32> {
    let mut grad_scores = Array2::zeros(probs.raw_dim());
    for ((mut out, p), dp) in grad_scores
        .axis_iter_mut(Axis(0))
        .zip(probs.axis_iter(Axis(0)))
        .zip(grad_probs.axis_iter(Axis(0)))
    {
        let weighted = p.dot(&dp);
        Zip::from(&mut out)
            .and(&p)
            .and(&dp)
            .for_each(|o, &p, &dp| *o = p * (dp - weighted));
    }
    grad_scores
}
