//! Classification accuracy.

use super::Network;
use crate::core::{partial_true_count, CommandQueue, Dataset, ValueType, Vector};

/// Outcome of [`ClassificationEvaluator::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationResult {
    pub count: usize,
    pub correct: usize,
}

impl EvaluationResult {
    /// Fraction of correct predictions, 0 for an empty dataset.
    #[must_use]
    pub fn accuracy(&self) -> f32 {
        if self.count == 0 {
            0.0
        } else {
            self.correct as f32 / self.count as f32
        }
    }
}

/// Counts the examples whose most activated output matches the label.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClassificationEvaluator;

impl ClassificationEvaluator {
    /// Predicts every example of `data`, `parallelization` at a time.
    ///
    /// # Panics
    ///
    /// If `data` has no classification labels or does not fit the network.
    pub fn evaluate(queue: &CommandQueue, network: &mut Network, data: &dyn Dataset, parallelization: usize) -> EvaluationResult {
        assert!(parallelization > 0, "parallelization must be positive");
        let Some(labels) = data.classification_labels() else {
            panic!("evaluation needs classification labels");
        };
        assert_eq!(data.input_size(), network.input_size(), "dataset and network input sizes differ");
        let size = data.size();
        let (inputs, classes) = (data.input_size(), data.output_size());
        let device = network.device().clone();
        let kernel = network.context().evaluate_classification.clone();

        let input = Vector::zeroed(&device, inputs * parallelization);
        let output = Vector::zeroed(&device, classes * parallelization);
        let results = Vector::new(&device, size, ValueType::Uint8);

        for first in (0..size).step_by(parallelization) {
            let count = parallelization.min(size - first);
            data.get(
                queue,
                first,
                count,
                &input.slice(0, count * inputs),
                &output.slice(0, count * classes),
            );
            let hypothesis = network.predict(queue, &input);
            queue.enqueue_1d(
                &kernel
                    .invoke()
                    .arg(hypothesis)
                    .arg(classes)
                    .arg(labels)
                    .arg(&results)
                    .arg(first),
                count,
            );
        }

        let correct = Vector::new(&device, 1, ValueType::Uint32);
        partial_true_count(queue, &correct, &results);
        EvaluationResult {
            count: size,
            correct: correct.read::<u32>(queue)[0] as usize,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accuracy_of_empty_result_is_zero() {
        let r = EvaluationResult { count: 0, correct: 0 };
        assert_eq!(r.accuracy(), 0.0);
        let r = EvaluationResult { count: 4, correct: 3 };
        assert_eq!(r.accuracy(), 0.75);
    }
}
