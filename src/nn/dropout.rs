//! Inverted dropout.

use super::{ErrorCriterion, NetworkLayer, NnContext};
use crate::core::{elementwise_mul, elementwise_mul_assign, CommandQueue, Device, RandomGenerator, ValueType, Vector};

/// Zeroes each input element with probability `1 - p` while training, scaling
/// the survivors by `1 / p`. Inference passes the input through.
///
/// The mask is applied to the input in place. The layer does not need error
/// from above unless a trainable layer sits below it.
#[derive(Debug)]
pub struct DropoutLayer {
    size: usize,
    keep_probability: f32,
    generator: RandomGenerator,
    mask: Vector,
    /// Alias of the last feedforward input, which holds the masked output.
    output: Vector,
    error_output: Vector,
}

impl DropoutLayer {
    /// Dropout over `size` elements per example, for `parallelization`
    /// stacked examples, keeping each with probability `keep_probability`.
    ///
    /// # Panics
    ///
    /// If `keep_probability` is outside `(0, 1]` or a size is zero.
    pub fn new(
        device: &Device,
        queue: &CommandQueue,
        size: usize,
        keep_probability: f32,
        parallelization: usize,
        seed: u64,
    ) -> Self {
        assert!(size > 0 && parallelization > 0, "dropout over no elements");
        assert!(
            keep_probability > 0.0 && keep_probability <= 1.0,
            "keep probability {keep_probability} outside (0, 1]"
        );
        let len = size * parallelization;
        Self {
            size,
            keep_probability,
            generator: RandomGenerator::new(device, queue, len, seed),
            mask: Vector::zeroed(device, len),
            output: Vector::empty(device, ValueType::Float),
            error_output: Vector::zeroed(device, len),
        }
    }

    #[must_use]
    pub fn keep_probability(&self) -> f32 {
        self.keep_probability
    }

    /// `1 / p` for kept elements and 0 for dropped ones, as of the last
    /// feedforward.
    #[must_use]
    pub fn mask(&self) -> &Vector {
        &self.mask
    }
}

impl NetworkLayer for DropoutLayer {
    fn input_size(&self) -> usize {
        self.size
    }

    fn output_size(&self) -> usize {
        self.size
    }

    fn backpropagates(&self) -> bool {
        false
    }

    fn predict<'a>(&'a mut self, _ctx: &NnContext, _queue: &CommandQueue, input: &'a Vector) -> &'a Vector {
        input
    }

    fn feedforward<'a>(&'a mut self, _ctx: &NnContext, queue: &CommandQueue, input: &'a Vector) -> &'a Vector {
        assert_eq!(input.len(), self.mask.len(), "dropout input size");
        self.mask.ones(queue);
        self.generator.inverted_dropout(queue, &self.mask, self.keep_probability);
        elementwise_mul_assign(queue, input, &self.mask);
        self.output.share(input);
        input
    }

    fn backpropagate_output(
        &mut self,
        ctx: &NnContext,
        queue: &CommandQueue,
        expected: &Vector,
        criterion: &dyn ErrorCriterion,
        _down: bool,
    ) {
        self.mask.copy_to(queue, &self.error_output);
        criterion.compute_layer_error(ctx, queue, &self.output, expected, &self.error_output);
    }

    fn backpropagate(&mut self, _ctx: &NnContext, queue: &CommandQueue, error_input: &Vector, _down: bool) {
        elementwise_mul(queue, &self.error_output, error_input, &self.mask);
    }

    fn error_output(&self) -> &Vector {
        &self.error_output
    }
}
