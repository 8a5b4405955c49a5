use super::{batch_rate, check_pair, Optimizer};
use crate::core::{CommandQueue, Device, Kernel, Vector};

/// `w -= rate / count * g`
#[derive(Debug, Clone)]
pub struct GradientDescent {
    kernel: Kernel,
    learning_rate: f32,
}

impl GradientDescent {
    pub fn new(device: &Device, learning_rate: f32) -> Self {
        Self {
            kernel: device.program("optimizers").kernel("gradientDescent"),
            learning_rate,
        }
    }

    #[must_use]
    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

impl Optimizer for GradientDescent {
    fn optimize(&mut self, queue: &CommandQueue, weights_and_gradients: &[(&Vector, &Vector)], example_count: usize) {
        let rate = batch_rate(self.learning_rate, example_count);
        for &(weights, gradients) in weights_and_gradients {
            check_pair(weights, gradients);
            queue.enqueue_1d(
                &self.kernel.invoke().arg(weights).arg(gradients).arg(rate),
                weights.len(),
            );
        }
    }
}
