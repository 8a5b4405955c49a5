//! Weight update rules.
//!
//! An optimizer receives the `(parameters, gradients)` pairs of a network
//! after a batch, with gradients summed over `example_count` examples, and
//! issues one update kernel per pair from the `optimizers` program.

mod gradient_descent;
mod momentum;

pub use gradient_descent::GradientDescent;
pub use momentum::Momentum;

use crate::core::{CommandQueue, Vector};

/// Applies accumulated gradients to parameters.
pub trait Optimizer {
    fn optimize(&mut self, queue: &CommandQueue, weights_and_gradients: &[(&Vector, &Vector)], example_count: usize);
}

/// Learning rate scaled to the mean gradient.
fn batch_rate(learning_rate: f32, example_count: usize) -> f32 {
    learning_rate / example_count.max(1) as f32
}

fn check_pair(weights: &Vector, gradients: &Vector) {
    assert_eq!(weights.len(), gradients.len(), "parameter and gradient lengths differ");
}
