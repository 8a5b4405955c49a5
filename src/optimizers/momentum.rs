use super::{batch_rate, check_pair, Optimizer};
use crate::core::{CommandQueue, Device, Kernel, Vector};

/// Classical momentum: `v = mu v - rate / count * g; w += v`.
///
/// Velocities are allocated on the first step, one per parameter vector, and
/// the pairs must keep their order and sizes afterwards.
#[derive(Debug)]
pub struct Momentum {
    device: Device,
    kernel: Kernel,
    learning_rate: f32,
    momentum: f32,
    velocities: Vec<Vector>,
}

impl Momentum {
    pub fn new(device: &Device, learning_rate: f32, momentum: f32) -> Self {
        Self {
            device: device.clone(),
            kernel: device.program("optimizers").kernel("momentum"),
            learning_rate,
            momentum,
            velocities: Vec::new(),
        }
    }

    #[must_use]
    pub fn velocities(&self) -> &[Vector] {
        &self.velocities
    }
}

impl Optimizer for Momentum {
    fn optimize(&mut self, queue: &CommandQueue, weights_and_gradients: &[(&Vector, &Vector)], example_count: usize) {
        if self.velocities.is_empty() {
            self.velocities = weights_and_gradients
                .iter()
                .map(|(weights, _)| Vector::zeroed(&self.device, weights.len()))
                .collect();
        }
        assert_eq!(
            self.velocities.len(),
            weights_and_gradients.len(),
            "parameter set changed between steps"
        );
        let rate = batch_rate(self.learning_rate, example_count);
        for (&(weights, gradients), velocity) in weights_and_gradients.iter().zip(&self.velocities) {
            check_pair(weights, gradients);
            assert_eq!(weights.len(), velocity.len(), "parameter size changed between steps");
            queue.enqueue_1d(
                &self
                    .kernel
                    .invoke()
                    .arg(weights)
                    .arg(gradients)
                    .arg(velocity)
                    .arg(rate)
                    .arg(self.momentum),
                weights.len(),
            );
        }
    }
}
