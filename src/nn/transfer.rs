//! Neuron transfer functions.

use core::str::FromStr;

use super::NnContext;
use crate::core::{CommandQueue, Kernel, Vector};

/// The nonlinearity applied to a layer's affine output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransferFunction {
    /// Identity; its derivative is one everywhere.
    Linear,
    /// `1 / (1 + e^-x)`
    #[default]
    Sigmoid,
    /// Hyperbolic tangent.
    Tanh,
    /// `max(x, 0)`
    RectifiedLinearUnit,
}

impl TransferFunction {
    fn predict_kernel(self, ctx: &NnContext) -> Option<&Kernel> {
        match self {
            Self::Linear => None,
            Self::Sigmoid => Some(&ctx.sigmoid_predict),
            Self::Tanh => Some(&ctx.tanh_predict),
            Self::RectifiedLinearUnit => Some(&ctx.relu_predict),
        }
    }

    fn feedforward_kernel(self, ctx: &NnContext) -> Option<&Kernel> {
        match self {
            Self::Linear => None,
            Self::Sigmoid => Some(&ctx.sigmoid_feedforward),
            Self::Tanh => Some(&ctx.tanh_feedforward),
            Self::RectifiedLinearUnit => Some(&ctx.relu_feedforward),
        }
    }

    /// Applies the function to `x` in place.
    pub fn apply(self, ctx: &NnContext, queue: &CommandQueue, x: &Vector) {
        if let Some(kernel) = self.predict_kernel(ctx) {
            queue.enqueue_1d(&kernel.invoke().arg(x), x.len());
        }
    }

    /// Applies the function to `x` in place and stores its derivative at
    /// every element in `derivative`.
    ///
    /// # Panics
    ///
    /// If the vectors differ in length or type.
    pub fn apply_with_derivative(self, ctx: &NnContext, queue: &CommandQueue, x: &Vector, derivative: &Vector) {
        assert_eq!(x.len(), derivative.len(), "activation and derivative lengths differ");
        assert_eq!(x.value_type(), derivative.value_type(), "activation and derivative types differ");
        match self.feedforward_kernel(ctx) {
            Some(kernel) => queue.enqueue_1d(&kernel.invoke().arg(x).arg(derivative), x.len()),
            None => derivative.ones(queue),
        }
    }
}

impl FromStr for TransferFunction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "sigmoid" => Ok(Self::Sigmoid),
            "tanh" => Ok(Self::Tanh),
            "relu" => Ok(Self::RectifiedLinearUnit),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Device;

    #[test]
    fn linear_leaves_values_and_sets_unit_derivative() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let ctx = NnContext::new(&device);
        let x = Vector::from_slice(&device, &[-1.0f32, 2.0]);
        let d = Vector::zeroed(&device, 2);
        TransferFunction::Linear.apply_with_derivative(&ctx, &queue, &x, &d);
        assert_eq!(x.read::<f32>(&queue), vec![-1.0, 2.0]);
        assert_eq!(d.read::<f32>(&queue), vec![1.0, 1.0]);
    }

    #[test]
    fn relu_derivative_is_a_step() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let ctx = NnContext::new(&device);
        let x = Vector::from_slice(&device, &[-1.0f32, 0.0, 3.0]);
        let d = Vector::zeroed(&device, 3);
        TransferFunction::RectifiedLinearUnit.apply_with_derivative(&ctx, &queue, &x, &d);
        assert_eq!(x.read::<f32>(&queue), vec![0.0, 0.0, 3.0]);
        assert_eq!(d.read::<f32>(&queue), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn sigmoid_of_zero_is_half() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let ctx = NnContext::new(&device);
        let x = Vector::from_slice(&device, &[0.0f32]);
        let d = Vector::zeroed(&device, 1);
        TransferFunction::Sigmoid.apply_with_derivative(&ctx, &queue, &x, &d);
        assert_eq!(x.read::<f32>(&queue), vec![0.5]);
        assert_eq!(d.read::<f32>(&queue), vec![0.25]);
    }

    #[test]
    fn parses_names() {
        assert_eq!("ReLU".parse(), Ok(TransferFunction::RectifiedLinearUnit));
        assert_eq!("tanh".parse(), Ok(TransferFunction::Tanh));
        assert!("softmax".parse::<TransferFunction>().is_err());
    }
}
