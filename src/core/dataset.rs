//! Training data sources.

use super::{CommandQueue, Matrix, ValueType, Vector, VectorSlice};

/// A table of `(input, expected output)` examples.
pub trait Dataset {
    /// Number of examples.
    fn size(&self) -> usize;

    fn input_size(&self) -> usize;

    fn output_size(&self) -> usize;

    /// Copies `count` consecutive examples starting at `index` into `input`
    /// and `output`, which hold exactly `count` examples each.
    fn get(&self, queue: &CommandQueue, index: usize, count: usize, input: &VectorSlice<'_>, output: &VectorSlice<'_>);

    /// One uint16 class label per example, when the data is a classification
    /// problem.
    fn classification_labels(&self) -> Option<&Vector> {
        None
    }
}

/// A dataset held in two device matrices, one example per row.
#[derive(Debug)]
pub struct SimpleDataset {
    inputs: Matrix,
    outputs: Matrix,
    labels: Option<Vector>,
}

impl SimpleDataset {
    /// # Panics
    ///
    /// If the matrices hold different numbers of examples.
    pub fn new(inputs: Matrix, outputs: Matrix) -> Self {
        assert_eq!(
            inputs.rows(),
            outputs.rows(),
            "{} inputs but {} outputs",
            inputs.rows(),
            outputs.rows()
        );
        Self {
            inputs,
            outputs,
            labels: None,
        }
    }

    /// Attaches uint16 class labels, one per example.
    ///
    /// # Panics
    ///
    /// If the labels are not uint16 or their count differs from the examples.
    #[must_use]
    pub fn with_labels(mut self, labels: Vector) -> Self {
        assert_eq!(labels.value_type(), ValueType::Uint16, "labels must be uint16");
        assert_eq!(labels.len(), self.size(), "one label per example");
        self.labels = Some(labels);
        self
    }

    #[must_use]
    pub fn inputs(&self) -> &Matrix {
        &self.inputs
    }

    #[must_use]
    pub fn outputs(&self) -> &Matrix {
        &self.outputs
    }
}

impl Dataset for SimpleDataset {
    fn size(&self) -> usize {
        self.inputs.rows()
    }

    fn input_size(&self) -> usize {
        self.inputs.columns()
    }

    fn output_size(&self) -> usize {
        self.outputs.columns()
    }

    fn get(&self, queue: &CommandQueue, index: usize, count: usize, input: &VectorSlice<'_>, output: &VectorSlice<'_>) {
        self.inputs.row_range(index, count).copy_to_slice(queue, input);
        self.outputs.row_range(index, count).copy_to_slice(queue, output);
    }

    fn classification_labels(&self) -> Option<&Vector> {
        self.labels.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Device;

    #[test]
    fn get_copies_consecutive_rows() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let data = SimpleDataset::new(
            Matrix::from_slice(&device, 3, 2, &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]),
            Matrix::from_slice(&device, 3, 1, &[10.0, 20.0, 30.0]),
        );
        let input = Vector::zeroed(&device, 4);
        let output = Vector::zeroed(&device, 2);
        data.get(&queue, 1, 2, &input.as_slice(), &output.as_slice());
        assert_eq!(input.read::<f32>(&queue), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(output.read::<f32>(&queue), vec![20.0, 30.0]);
        assert!(data.classification_labels().is_none());
    }
}
