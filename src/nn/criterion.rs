//! Error criteria for the output layer.

use super::NnContext;
use crate::core::{CommandQueue, Kernel, Vector};

/// Measures a prediction against the expected output and seeds the output
/// layer's error term.
pub trait ErrorCriterion {
    /// Adds the per-element error of `prediction` to `accumulator`.
    fn compute_error(
        &self,
        ctx: &NnContext,
        queue: &CommandQueue,
        prediction: &Vector,
        expected: &Vector,
        accumulator: &Vector,
    );

    /// Turns `error_term`, which holds the transfer derivative on entry,
    /// into the output layer's error term.
    fn compute_layer_error(
        &self,
        ctx: &NnContext,
        queue: &CommandQueue,
        prediction: &Vector,
        expected: &Vector,
        error_term: &Vector,
    );
}

fn enqueue_elementwise(queue: &CommandQueue, kernel: &Kernel, prediction: &Vector, expected: &Vector, target: &Vector) {
    assert_eq!(prediction.len(), expected.len(), "prediction and expected output lengths differ");
    assert_eq!(prediction.len(), target.len(), "prediction and error lengths differ");
    queue.enqueue_1d(
        &kernel.invoke().arg(prediction).arg(expected).arg(target),
        prediction.len(),
    );
}

/// Squared error, `(y - p)^2`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanSquaredError;

impl ErrorCriterion for MeanSquaredError {
    fn compute_error(&self, ctx: &NnContext, queue: &CommandQueue, prediction: &Vector, expected: &Vector, accumulator: &Vector) {
        enqueue_elementwise(queue, &ctx.mean_squared_error, prediction, expected, accumulator);
    }

    fn compute_layer_error(&self, ctx: &NnContext, queue: &CommandQueue, prediction: &Vector, expected: &Vector, error_term: &Vector) {
        enqueue_elementwise(queue, &ctx.mse_layer_error, prediction, expected, error_term);
    }
}

/// Binary cross entropy, `-y ln p - (1 - y) ln (1 - p)`.
///
/// Predictions are clamped away from 0 and 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct CrossEntropy;

impl ErrorCriterion for CrossEntropy {
    fn compute_error(&self, ctx: &NnContext, queue: &CommandQueue, prediction: &Vector, expected: &Vector, accumulator: &Vector) {
        enqueue_elementwise(queue, &ctx.cross_entropy_error, prediction, expected, accumulator);
    }

    fn compute_layer_error(&self, ctx: &NnContext, queue: &CommandQueue, prediction: &Vector, expected: &Vector, error_term: &Vector) {
        enqueue_elementwise(queue, &ctx.cross_entropy_layer_error, prediction, expected, error_term);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approx::assert_close;
    use crate::core::Device;

    #[test]
    fn squared_error_accumulates() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let ctx = NnContext::new(&device);
        let p = Vector::from_slice(&device, &[0.5f32, 1.0]);
        let y = Vector::from_slice(&device, &[1.0f32, 0.0]);
        let acc = Vector::from_slice(&device, &[1.0f32, 0.0]);
        MeanSquaredError.compute_error(&ctx, &queue, &p, &y, &acc);
        assert_eq!(acc.read::<f32>(&queue), vec![1.25, 1.0]);
    }

    #[test]
    fn squared_layer_error_scales_derivative() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let ctx = NnContext::new(&device);
        let p = Vector::from_slice(&device, &[0.5f32]);
        let y = Vector::from_slice(&device, &[1.0f32]);
        let e = Vector::from_slice(&device, &[0.25f32]);
        MeanSquaredError.compute_layer_error(&ctx, &queue, &p, &y, &e);
        assert_eq!(e.read::<f32>(&queue), vec![-0.125]);
    }

    #[test]
    fn cross_entropy_of_half_is_ln_two() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let ctx = NnContext::new(&device);
        let p = Vector::from_slice(&device, &[0.5f32]);
        let y = Vector::from_slice(&device, &[1.0f32]);
        let acc = Vector::zeroed(&device, 1);
        CrossEntropy.compute_error(&ctx, &queue, &p, &y, &acc);
        assert_close(&acc.read::<f32>(&queue), &[core::f32::consts::LN_2]);
    }

    #[test]
    fn cross_entropy_with_sigmoid_derivative_is_plain_difference() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let ctx = NnContext::new(&device);
        let p = Vector::from_slice(&device, &[0.8f32]);
        let y = Vector::from_slice(&device, &[1.0f32]);
        let e = Vector::from_slice(&device, &[0.8f32 * 0.2]);
        CrossEntropy.compute_layer_error(&ctx, &queue, &p, &y, &e);
        assert_close(&e.read::<f32>(&queue), &[-0.2]);
    }
}
