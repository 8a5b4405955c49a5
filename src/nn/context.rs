//! Kernels of the `nn` program.

use crate::core::{Device, Kernel};

/// The `nn` program's kernels, resolved once per network.
///
/// Cloning is cheap: kernels are shared handles.
#[derive(Debug, Clone)]
pub struct NnContext {
    pub sigmoid_predict: Kernel,
    pub sigmoid_feedforward: Kernel,
    pub tanh_predict: Kernel,
    pub tanh_feedforward: Kernel,
    pub relu_predict: Kernel,
    pub relu_feedforward: Kernel,
    pub mean_squared_error: Kernel,
    pub cross_entropy_error: Kernel,
    pub mse_layer_error: Kernel,
    pub cross_entropy_layer_error: Kernel,
    pub weight_gradient: Kernel,
    pub bias_gradient: Kernel,
    pub evaluate_classification: Kernel,
}

impl NnContext {
    pub fn new(device: &Device) -> Self {
        let program = device.program("nn");
        Self {
            sigmoid_predict: program.kernel("sigmoidPredict"),
            sigmoid_feedforward: program.kernel("sigmoidFeedforward"),
            tanh_predict: program.kernel("tanhPredict"),
            tanh_feedforward: program.kernel("tanhFeedforward"),
            relu_predict: program.kernel("reluPredict"),
            relu_feedforward: program.kernel("reluFeedforward"),
            mean_squared_error: program.kernel("meanSquaredError"),
            cross_entropy_error: program.kernel("crossEntropyError"),
            mse_layer_error: program.kernel("computeMSELayerError"),
            cross_entropy_layer_error: program.kernel("computeCrossEntropyLayerError"),
            weight_gradient: program.kernel("computeWeightGradient"),
            bias_gradient: program.kernel("computeBiasGradient"),
            evaluate_classification: program.kernel("evaluateClassification"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kernel_resolves_on_the_host() {
        let device = Device::new_host();
        let ctx = NnContext::new(&device);
        assert!(ctx.sigmoid_predict.is_usable());
        assert!(ctx.evaluate_classification.is_usable());
        assert_eq!(device.error_count(), 0);
    }
}
