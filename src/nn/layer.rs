//! Fully connected layers.
//!
//! # State Machine
//!
//! 1. `predict`: `activation = f(W x + b)`
//! 2. `feedforward`: like `predict`, also storing `f'` and keeping a handle on
//!    the input for gradient accumulation
//! 3. `backpropagate_output` / `backpropagate`: `error_term = f' .* incoming`,
//!    then `error_output = W^T error_term` when the layer below needs it
//! 4. `accumulate_gradients`: `dW += error_term x^T`, `db += error_term`
//!
//! A layer built with [`Layer::parallelized`] processes `parallelization`
//! examples per call, stacked one after the other in every buffer.

use core::fmt;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use super::{ErrorCriterion, NnContext, TransferFunction};
use crate::core::{
    elementwise_mul_assign, parallel_add, parallel_mvmul, transpose_mvmul, tune_geometry, CommandQueue, Device, Matrix, Range2D,
    ValueType, Vector,
};

/// What a [`Network`](super::Network) needs from each of its layers.
pub trait NetworkLayer: fmt::Debug {
    /// Elements per example expected as input.
    fn input_size(&self) -> usize;

    /// Elements per example produced as output.
    fn output_size(&self) -> usize;

    /// Initializes trainable parameters deterministically from `seed`.
    fn init(&mut self, _queue: &CommandQueue, _seed: u64) {}

    /// Calibrates launch geometry with `repetitions` timed launches.
    fn tune(&mut self, _repetitions: usize) {}

    fn dump(&self, _queue: &CommandQueue) {}

    /// Whether the layer needs error propagated from the layers above it.
    fn backpropagates(&self) -> bool {
        true
    }

    /// Inference only.
    fn predict<'a>(&'a mut self, ctx: &NnContext, queue: &CommandQueue, input: &'a Vector) -> &'a Vector;

    /// Inference keeping what backpropagation needs.
    fn feedforward<'a>(&'a mut self, ctx: &NnContext, queue: &CommandQueue, input: &'a Vector) -> &'a Vector;

    /// Computes the error term of the output layer from the expected output.
    /// `down` asks for [`NetworkLayer::error_output`] to be computed.
    fn backpropagate_output(
        &mut self,
        ctx: &NnContext,
        queue: &CommandQueue,
        expected: &Vector,
        criterion: &dyn ErrorCriterion,
        down: bool,
    );

    /// Computes the error term from the error output of the layer above.
    fn backpropagate(&mut self, ctx: &NnContext, queue: &CommandQueue, error_input: &Vector, down: bool);

    /// Error handed to the layer below, valid after a backpropagation with
    /// `down` set.
    fn error_output(&self) -> &Vector;

    /// Adds the last error term's contribution to the gradients.
    fn accumulate_gradients(&mut self, _ctx: &NnContext, _queue: &CommandQueue) {}

    /// Appends `(parameters, gradients)` pairs.
    fn collect_weights_and_gradients<'a>(&'a self, _pairs: &mut Vec<(&'a Vector, &'a Vector)>) {}

    fn zero_gradients(&self, _queue: &CommandQueue) {}
}

/// A fully connected layer of `neurons` outputs over `inputs` inputs.
///
/// # Example
///
/// ```
/// use nnfit::core::{CommandQueue, Device, Vector};
/// use nnfit::nn::{Layer, NetworkLayer, NnContext, TransferFunction};
///
/// let device = Device::host();
/// let queue = CommandQueue::new(&device);
/// let ctx = NnContext::new(&device);
/// let mut layer = Layer::new(&device, 2, 2, TransferFunction::Linear);
/// layer.weights().write(&queue, &[1.0f32, 1.0, 2.0, 0.5]);
/// layer.biases().write(&queue, &[0.0f32, 1.0]);
/// let x = Vector::from_slice(&device, &[1.0f32, 2.0]);
/// assert_eq!(layer.predict(&ctx, &queue, &x).read::<f32>(&queue), vec![3.0, 4.0]);
/// ```
pub struct Layer {
    transfer: TransferFunction,
    parallelization: usize,
    weights: Matrix,
    biases: Vector,
    weight_gradients: Matrix,
    bias_gradients: Vector,
    activations: Vector,
    /// `f'` after feedforward, the error term after backpropagation.
    derivatives: Vector,
    error_output: Vector,
    /// Alias of the last feedforward input.
    previous_input: Vector,
    geometry: Range2D,
}

impl Layer {
    /// # Panics
    ///
    /// If `neurons` or `inputs` is zero.
    pub fn new(device: &Device, neurons: usize, inputs: usize, transfer: TransferFunction) -> Self {
        Self::parallelized(device, neurons, inputs, transfer, 1)
    }

    /// A layer processing `parallelization` stacked examples per call.
    ///
    /// # Panics
    ///
    /// If any size is zero.
    pub fn parallelized(
        device: &Device,
        neurons: usize,
        inputs: usize,
        transfer: TransferFunction,
        parallelization: usize,
    ) -> Self {
        assert!(neurons > 0 && inputs > 0, "a layer needs neurons and inputs");
        assert!(parallelization > 0, "parallelization must be positive");
        Self {
            transfer,
            parallelization,
            weights: Matrix::new(device, neurons, inputs),
            biases: Vector::zeroed(device, neurons),
            weight_gradients: Matrix::new(device, neurons, inputs),
            bias_gradients: Vector::zeroed(device, neurons),
            activations: Vector::zeroed(device, neurons * parallelization),
            derivatives: Vector::zeroed(device, neurons * parallelization),
            error_output: Vector::zeroed(device, inputs * parallelization),
            previous_input: Vector::empty(device, ValueType::Float),
            geometry: Range2D::default(),
        }
    }

    #[must_use]
    pub fn neurons(&self) -> usize {
        self.weights.rows()
    }

    #[must_use]
    pub fn inputs(&self) -> usize {
        self.weights.columns()
    }

    #[must_use]
    pub fn parallelization(&self) -> usize {
        self.parallelization
    }

    #[must_use]
    pub fn transfer_function(&self) -> TransferFunction {
        self.transfer
    }

    #[must_use]
    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    #[must_use]
    pub fn biases(&self) -> &Vector {
        &self.biases
    }

    #[must_use]
    pub fn weight_gradients(&self) -> &Matrix {
        &self.weight_gradients
    }

    #[must_use]
    pub fn bias_gradients(&self) -> &Vector {
        &self.bias_gradients
    }

    #[must_use]
    pub fn activations(&self) -> &Vector {
        &self.activations
    }

    /// The transfer derivative after feedforward, the error term after
    /// backpropagation.
    #[must_use]
    pub fn error_term(&self) -> &Vector {
        &self.derivatives
    }

    /// Cached `(rows_per_workgroup, parts)`; `(0, 0)` picks a default.
    #[must_use]
    pub fn geometry(&self) -> Range2D {
        self.geometry
    }

    pub fn set_geometry(&mut self, geometry: Range2D) {
        self.geometry = geometry;
    }

    fn check_input(&self, input: &Vector) {
        assert_eq!(
            input.len(),
            self.inputs() * self.parallelization,
            "layer over {} inputs x {} examples given {} values",
            self.inputs(),
            self.parallelization,
            input.len()
        );
    }

    /// `activations = W x + b` for every stacked example.
    pub(crate) fn predict_linear(&self, queue: &CommandQueue, input: &Vector) -> &Vector {
        parallel_mvmul(queue, &self.activations, &self.weights, input, self.geometry);
        parallel_add(queue, &self.activations, &self.biases, &self.activations);
        &self.activations
    }

    /// Adds `error (x) input` over `vectors` stacked examples to the gradients.
    pub(crate) fn accumulate_gradients_from(
        &self,
        ctx: &NnContext,
        queue: &CommandQueue,
        error: &Vector,
        input: &Vector,
        vectors: usize,
    ) {
        assert_eq!(error.len(), self.neurons() * vectors, "error term size");
        assert_eq!(input.len(), self.inputs() * vectors, "gradient input size");
        queue.enqueue_2d(
            &ctx.weight_gradient
                .invoke()
                .arg(error)
                .arg(input)
                .arg(vectors)
                .arg(&self.weight_gradients),
            Range2D::new([self.neurons(), self.inputs()]),
            None,
        );
        queue.enqueue_1d(
            &ctx.bias_gradient.invoke().arg(error).arg(vectors).arg(&self.bias_gradients),
            self.neurons(),
        );
    }

    fn propagate_down(&self, queue: &CommandQueue) {
        transpose_mvmul(queue, &self.error_output, &self.weights, &self.derivatives, self.parallelization);
    }
}

impl NetworkLayer for Layer {
    fn input_size(&self) -> usize {
        self.inputs()
    }

    fn output_size(&self) -> usize {
        self.neurons()
    }

    /// Draws weights, then biases, from `N(0, 1/sqrt(inputs))`.
    fn init(&mut self, queue: &CommandQueue, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let std_dev = 1.0 / (self.inputs() as f32).sqrt();
        let normal = Normal::new(0.0f32, std_dev)
            .unwrap_or_else(|e| unreachable!("standard deviation {std_dev} is positive: {e}"));
        let weights: Vec<f32> = (0..self.weights.len()).map(|_| normal.sample(&mut rng)).collect();
        let biases: Vec<f32> = (0..self.biases.len()).map(|_| normal.sample(&mut rng)).collect();
        self.weights.write(queue, &weights);
        self.biases.write(queue, &biases);
    }

    fn tune(&mut self, repetitions: usize) {
        self.geometry = tune_geometry(self.weights.device(), &self.weights, self.parallelization, repetitions);
    }

    fn dump(&self, queue: &CommandQueue) {
        let weights = self.weights.read::<f32>(queue);
        let biases = self.biases.read::<f32>(queue);
        for (i, row) in weights.chunks(self.inputs()).enumerate() {
            tracing::debug!(neuron = i, bias = biases[i], weights = ?row, "layer neuron");
        }
    }

    fn predict<'a>(&'a mut self, ctx: &NnContext, queue: &CommandQueue, input: &'a Vector) -> &'a Vector {
        self.check_input(input);
        self.transfer.apply(ctx, queue, self.predict_linear(queue, input));
        &self.activations
    }

    fn feedforward<'a>(&'a mut self, ctx: &NnContext, queue: &CommandQueue, input: &'a Vector) -> &'a Vector {
        self.check_input(input);
        self.previous_input.share(input);
        let activations = self.predict_linear(queue, input);
        self.transfer.apply_with_derivative(ctx, queue, activations, &self.derivatives);
        &self.activations
    }

    fn backpropagate_output(
        &mut self,
        ctx: &NnContext,
        queue: &CommandQueue,
        expected: &Vector,
        criterion: &dyn ErrorCriterion,
        down: bool,
    ) {
        criterion.compute_layer_error(ctx, queue, &self.activations, expected, &self.derivatives);
        if down {
            self.propagate_down(queue);
        }
    }

    fn backpropagate(&mut self, _ctx: &NnContext, queue: &CommandQueue, error_input: &Vector, down: bool) {
        assert_eq!(error_input.len(), self.derivatives.len(), "incoming error size");
        elementwise_mul_assign(queue, &self.derivatives, error_input);
        if down {
            self.propagate_down(queue);
        }
    }

    fn error_output(&self) -> &Vector {
        &self.error_output
    }

    fn accumulate_gradients(&mut self, ctx: &NnContext, queue: &CommandQueue) {
        self.accumulate_gradients_from(ctx, queue, &self.derivatives, &self.previous_input, self.parallelization);
    }

    fn collect_weights_and_gradients<'a>(&'a self, pairs: &mut Vec<(&'a Vector, &'a Vector)>) {
        pairs.push((self.weights.as_vector(), self.weight_gradients.as_vector()));
        pairs.push((&self.biases, &self.bias_gradients));
    }

    fn zero_gradients(&self, queue: &CommandQueue) {
        self.weight_gradients.zeros(queue);
        self.bias_gradients.zeros(queue);
    }
}

impl fmt::Debug for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Layer")
            .field("neurons", &self.neurons())
            .field("inputs", &self.inputs())
            .field("transfer", &self.transfer)
            .field("parallelization", &self.parallelization)
            .field("geometry", &self.geometry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nn::MeanSquaredError;

    #[test]
    fn init_is_deterministic_per_seed() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let mut a = Layer::new(&device, 3, 4, TransferFunction::Sigmoid);
        let mut b = Layer::new(&device, 3, 4, TransferFunction::Sigmoid);
        a.init(&queue, 7);
        b.init(&queue, 7);
        assert_eq!(a.weights().read::<f32>(&queue), b.weights().read::<f32>(&queue));
        assert_eq!(a.biases().read::<f32>(&queue), b.biases().read::<f32>(&queue));
        b.init(&queue, 8);
        assert_ne!(a.weights().read::<f32>(&queue), b.weights().read::<f32>(&queue));
    }

    #[test]
    fn feedforward_keeps_the_input_alias() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let ctx = NnContext::new(&device);
        let mut layer = Layer::new(&device, 1, 2, TransferFunction::Linear);
        let x = Vector::from_slice(&device, &[1.0f32, 2.0]);
        layer.feedforward(&ctx, &queue, &x);
        assert!(layer.previous_input.is_shared_with(&x));
        assert_eq!(layer.error_term().read::<f32>(&queue), vec![1.0]);
    }

    #[test]
    fn gradients_accumulate_outer_products() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let ctx = NnContext::new(&device);
        let mut layer = Layer::new(&device, 1, 2, TransferFunction::Linear);
        let x = Vector::from_slice(&device, &[1.0f32, 2.0]);
        let y = Vector::from_slice(&device, &[1.0f32]);
        layer.feedforward(&ctx, &queue, &x);
        // prediction 0, error term (0 - 1) * 1
        layer.backpropagate_output(&ctx, &queue, &y, &MeanSquaredError, false);
        layer.accumulate_gradients(&ctx, &queue);
        layer.accumulate_gradients(&ctx, &queue);
        assert_eq!(layer.weight_gradients().read::<f32>(&queue), vec![-2.0, -4.0]);
        assert_eq!(layer.bias_gradients().read::<f32>(&queue), vec![-2.0]);
        layer.zero_gradients(&queue);
        assert_eq!(layer.bias_gradients().read::<f32>(&queue), vec![0.0]);
    }

    #[test]
    fn parallelized_matches_sequential() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let ctx = NnContext::new(&device);
        let mut single = Layer::new(&device, 3, 2, TransferFunction::Tanh);
        let mut batched = Layer::parallelized(&device, 3, 2, TransferFunction::Tanh, 2);
        single.init(&queue, 3);
        batched.init(&queue, 3);
        let both = Vector::from_slice(&device, &[0.5f32, -1.0, 2.0, 0.25]);
        let batched_out = batched.predict(&ctx, &queue, &both).read::<f32>(&queue);
        let first = Vector::from_slice(&device, &[0.5f32, -1.0]);
        let second = Vector::from_slice(&device, &[2.0f32, 0.25]);
        let mut expected = single.predict(&ctx, &queue, &first).read::<f32>(&queue);
        expected.extend(single.predict(&ctx, &queue, &second).read::<f32>(&queue));
        assert_eq!(batched_out, expected);
    }
}
