//! Fully recurrent layers with backpropagation through time.
//!
//! Every timestep runs a [`Layer`] over `[x_t, a_{t-1}]`, where `a_{-1}` is the
//! layer's initial activation. After `unroll(T)`, `feedforward` records the
//! merged input, transfer derivative and output of up to `T` timesteps, and
//! `backpropagate` consumes them one by one from the last timestep back.

use core::fmt;

use crate::core::{add, elementwise_mul_assign, transpose_mvmul, CommandQueue, Device, Vector, VectorSlice};
use crate::nn::{Layer, NetworkLayer, NnContext, TransferFunction};

/// What one unrolled timestep keeps for backpropagation.
#[derive(Debug)]
struct UnrolledState {
    input: Vector,
    derivatives: Vector,
    output: Vector,
}

impl UnrolledState {
    fn new(device: &Device, inputs: usize, neurons: usize) -> Self {
        Self {
            input: Vector::zeroed(device, inputs + neurons),
            derivatives: Vector::zeroed(device, neurons),
            output: Vector::zeroed(device, neurons),
        }
    }
}

/// A recurrent layer of `neurons` outputs over `inputs` external inputs.
///
/// # Example
///
/// ```
/// use nnfit::core::{CommandQueue, Device, Vector};
/// use nnfit::nn::{NnContext, TransferFunction};
/// use nnfit::rnn::RecurrentLayer;
///
/// let device = Device::host();
/// let queue = CommandQueue::new(&device);
/// let ctx = NnContext::new(&device);
/// let mut layer = RecurrentLayer::new(&device, 2, 1, TransferFunction::Tanh);
/// layer.init(&queue, 3);
/// let x = Vector::from_slice(&device, &[0.5f32]);
/// layer.predict(&ctx, &queue, &x);
/// let second = layer.predict(&ctx, &queue, &x).read::<f32>(&queue);
/// assert_eq!(second.len(), 2);
/// ```
pub struct RecurrentLayer {
    layer: Layer,
    inputs: usize,
    initial_activation: Vector,
    merged: Vector,
    states: Vec<UnrolledState>,
    step: usize,
    /// Next timestep to backpropagate, `None` before the first call.
    backward: Option<usize>,
    error_term: Vector,
    error_output: Vector,
    recurrent_error: Vector,
}

impl RecurrentLayer {
    /// # Panics
    ///
    /// If `neurons` or `inputs` is zero.
    pub fn new(device: &Device, neurons: usize, inputs: usize, transfer: TransferFunction) -> Self {
        Self {
            layer: Layer::new(device, neurons, inputs + neurons, transfer),
            inputs,
            initial_activation: Vector::zeroed(device, neurons),
            merged: Vector::zeroed(device, inputs + neurons),
            states: Vec::new(),
            step: 0,
            backward: None,
            error_term: Vector::zeroed(device, neurons),
            error_output: Vector::zeroed(device, inputs + neurons),
            recurrent_error: Vector::zeroed(device, neurons),
        }
    }

    #[must_use]
    pub fn neurons(&self) -> usize {
        self.layer.neurons()
    }

    /// External inputs per timestep.
    #[must_use]
    pub fn inputs(&self) -> usize {
        self.inputs
    }

    /// The inner layer over `[input, previous activation]`.
    #[must_use]
    pub fn layer(&self) -> &Layer {
        &self.layer
    }

    /// Activation fed back at the first timestep, zero unless written.
    #[must_use]
    pub fn initial_activation(&self) -> &Vector {
        &self.initial_activation
    }

    /// Timesteps processed since the last reset.
    #[must_use]
    pub fn position(&self) -> usize {
        self.step
    }

    /// Timesteps `feedforward` can record.
    #[must_use]
    pub fn unrolled_length(&self) -> usize {
        self.states.len()
    }

    /// Output of recorded timestep `t`.
    ///
    /// # Panics
    ///
    /// If `t` was not recorded by `feedforward` since the last reset.
    #[must_use]
    pub fn output(&self, t: usize) -> &Vector {
        assert!(t < self.step.min(self.states.len()), "timestep {t} not recorded");
        &self.states[t].output
    }

    pub fn init(&mut self, queue: &CommandQueue, seed: u64) {
        self.layer.init(queue, seed);
    }

    pub fn tune(&mut self, repetitions: usize) {
        self.layer.tune(repetitions);
    }

    /// Starts a new sequence.
    pub fn reset(&mut self) {
        self.step = 0;
        self.backward = None;
    }

    /// Makes room for sequences of up to `length` timesteps and resets.
    pub fn unroll(&mut self, length: usize) {
        let device = self.merged.device().clone();
        while self.states.len() < length {
            self.states.push(UnrolledState::new(&device, self.inputs, self.neurons()));
        }
        tracing::trace!(length, "recurrent layer unrolled");
        self.reset();
    }

    /// Writes `[input, previous activation]` into the shared merge buffer.
    pub fn merge_input(&mut self, queue: &CommandQueue, input: &Vector) -> &Vector {
        self.merge_into(queue, input, &self.merged);
        &self.merged
    }

    fn merge_into(&self, queue: &CommandQueue, input: &Vector, dest: &Vector) {
        assert_eq!(input.len(), self.inputs, "recurrent input size");
        input.copy_to_slice(queue, &dest.slice(0, self.inputs));
        let previous = if self.step == 0 {
            &self.initial_activation
        } else {
            self.layer.activations()
        };
        previous.copy_to_slice(queue, &dest.slice_from(self.inputs));
    }

    /// Runs one timestep of inference.
    pub fn predict(&mut self, ctx: &NnContext, queue: &CommandQueue, input: &Vector) -> &Vector {
        self.merge_into(queue, input, &self.merged);
        self.step += 1;
        self.layer.predict(ctx, queue, &self.merged)
    }

    /// Runs one timestep, recording it for backpropagation.
    ///
    /// # Panics
    ///
    /// If the sequence is longer than the unrolled length.
    pub fn feedforward(&mut self, ctx: &NnContext, queue: &CommandQueue, input: &Vector) -> &Vector {
        assert!(
            self.step < self.states.len(),
            "timestep {} beyond unrolled length {}",
            self.step,
            self.states.len()
        );
        let state = &self.states[self.step];
        self.merge_into(queue, input, &state.input);
        let activations = self.layer.predict_linear(queue, &state.input);
        self.layer
            .transfer_function()
            .apply_with_derivative(ctx, queue, activations, &state.derivatives);
        activations.copy_to(queue, &state.output);
        self.step += 1;
        &self.states[self.step - 1].output
    }

    /// Backpropagates the latest timestep not yet processed.
    ///
    /// `error_input` is the error on the timestep's output coming from above;
    /// the error flowing back through the recurrent connection is added to
    /// it. Gradients accumulate across timesteps. Returns the error on the
    /// timestep's external input.
    ///
    /// # Panics
    ///
    /// If every recorded timestep has already been backpropagated.
    pub fn backpropagate(&mut self, ctx: &NnContext, queue: &CommandQueue, error_input: &Vector) -> VectorSlice<'_> {
        let remaining = match self.backward {
            Some(t) => t,
            None => {
                self.recurrent_error.zeros(queue);
                self.step.min(self.states.len())
            }
        };
        assert!(remaining > 0, "no timestep left to backpropagate");
        let t = remaining - 1;
        self.backward = Some(t);

        let state = &self.states[t];
        add(queue, &self.error_term, error_input, &self.recurrent_error);
        elementwise_mul_assign(queue, &self.error_term, &state.derivatives);
        self.layer
            .accumulate_gradients_from(ctx, queue, &self.error_term, &state.input, 1);
        transpose_mvmul(queue, &self.error_output, self.layer.weights(), &self.error_term, 1);
        self.error_output
            .slice_from(self.inputs)
            .copy_to(queue, &self.recurrent_error);
        self.error_output.slice(0, self.inputs)
    }

    /// Appends the inner layer's `(parameters, gradients)` pairs.
    pub fn collect_weights_and_gradients<'a>(&'a self, pairs: &mut Vec<(&'a Vector, &'a Vector)>) {
        self.layer.collect_weights_and_gradients(pairs);
    }

    pub fn zero_gradients(&self, queue: &CommandQueue) {
        self.layer.zero_gradients(queue);
    }
}

impl fmt::Debug for RecurrentLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecurrentLayer")
            .field("neurons", &self.neurons())
            .field("inputs", &self.inputs)
            .field("unrolled", &self.states.len())
            .field("step", &self.step)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_starts_from_the_initial_activation() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let ctx = NnContext::new(&device);
        let mut layer = RecurrentLayer::new(&device, 2, 1, TransferFunction::Linear);
        layer.initial_activation().write(&queue, &[5.0f32, 6.0]);
        let x = Vector::from_slice(&device, &[1.0f32]);
        assert_eq!(layer.merge_input(&queue, &x).read::<f32>(&queue), vec![1.0, 5.0, 6.0]);

        // identity over the previous activation, ignoring the input
        layer
            .layer
            .weights()
            .write(&queue, &[0.0f32, 1.0, 0.0, 0.0, 0.0, 1.0]);
        layer.predict(&ctx, &queue, &x);
        assert_eq!(layer.position(), 1);
        let x = Vector::from_slice(&device, &[2.0f32]);
        assert_eq!(layer.merge_input(&queue, &x).read::<f32>(&queue), vec![2.0, 5.0, 6.0]);
    }

    #[test]
    fn unroll_resets_and_grows() {
        let device = Device::host();
        let mut layer = RecurrentLayer::new(&device, 1, 1, TransferFunction::Tanh);
        layer.unroll(3);
        layer.unroll(2);
        assert_eq!(layer.unrolled_length(), 3);
        assert_eq!(layer.position(), 0);
    }

    #[test]
    #[should_panic(expected = "beyond unrolled length")]
    fn feedforward_needs_unrolling() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let ctx = NnContext::new(&device);
        let mut layer = RecurrentLayer::new(&device, 1, 1, TransferFunction::Tanh);
        let x = Vector::from_slice(&device, &[1.0f32]);
        layer.feedforward(&ctx, &queue, &x);
    }

    #[test]
    fn linear_backpropagation_through_two_steps() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let ctx = NnContext::new(&device);
        // a_t = 2 x_t + 3 a_{t-1}
        let mut layer = RecurrentLayer::new(&device, 1, 1, TransferFunction::Linear);
        layer.layer.weights().write(&queue, &[2.0f32, 3.0]);
        layer.unroll(2);
        let x = Vector::from_slice(&device, &[1.0f32]);
        layer.feedforward(&ctx, &queue, &x);
        layer.feedforward(&ctx, &queue, &x);
        assert_eq!(layer.output(1).read::<f32>(&queue), vec![8.0]);

        // dL/da_1 = 1, dL/da_0 = 0
        let e1 = Vector::from_slice(&device, &[1.0f32]);
        let input_error = layer.backpropagate(&ctx, &queue, &e1).read::<f32>(&queue);
        assert_eq!(input_error, vec![2.0]);
        let e0 = Vector::from_slice(&device, &[0.0f32]);
        let input_error = layer.backpropagate(&ctx, &queue, &e0).read::<f32>(&queue);
        assert_eq!(input_error, vec![6.0]);

        // dW_x = 1 * x_1 + 3 * x_0, dW_a = 1 * a_0 + 3 * 0
        assert_eq!(layer.layer().weight_gradients().read::<f32>(&queue), vec![4.0, 2.0]);
        assert_eq!(layer.layer().bias_gradients().read::<f32>(&queue), vec![4.0]);
    }
}
