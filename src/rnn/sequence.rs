//! Sequences of `(input, expected output)` timesteps.

use crate::core::{CommandQueue, Matrix, Vector};

/// One sequence, one timestep per matrix row.
#[derive(Debug, Clone, Copy)]
pub struct Sequence<'a> {
    inputs: &'a Matrix,
    outputs: &'a Matrix,
}

impl<'a> Sequence<'a> {
    /// # Panics
    ///
    /// If the matrices hold different numbers of timesteps.
    pub fn new(inputs: &'a Matrix, outputs: &'a Matrix) -> Self {
        assert_eq!(inputs.rows(), outputs.rows(), "inputs and outputs differ in length");
        Self { inputs, outputs }
    }

    /// Number of timesteps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inputs.rows()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies timestep `i` into `input` and `output`.
    pub fn get(&self, queue: &CommandQueue, i: usize, input: &Vector, output: &Vector) {
        self.inputs.row(i).copy_to(queue, input);
        self.outputs.row(i).copy_to(queue, output);
    }
}

/// A collection of sequences sharing input and output sizes.
pub trait SequentialDataset {
    fn size(&self) -> usize;

    fn input_size(&self) -> usize;

    fn output_size(&self) -> usize;

    fn get(&self, i: usize) -> Sequence<'_>;
}

/// Sequences held as pairs of device matrices.
#[derive(Debug)]
pub struct SimpleSequentialDataset {
    input_size: usize,
    output_size: usize,
    sequences: Vec<(Matrix, Matrix)>,
}

impl SimpleSequentialDataset {
    pub fn new(input_size: usize, output_size: usize) -> Self {
        Self {
            input_size,
            output_size,
            sequences: Vec::new(),
        }
    }

    /// # Panics
    ///
    /// If the matrices do not match the dataset's sizes or each other's length.
    pub fn push(&mut self, inputs: Matrix, outputs: Matrix) {
        assert_eq!(inputs.columns(), self.input_size, "sequence input size");
        assert_eq!(outputs.columns(), self.output_size, "sequence output size");
        assert_eq!(inputs.rows(), outputs.rows(), "inputs and outputs differ in length");
        self.sequences.push((inputs, outputs));
    }
}

impl SequentialDataset for SimpleSequentialDataset {
    fn size(&self) -> usize {
        self.sequences.len()
    }

    fn input_size(&self) -> usize {
        self.input_size
    }

    fn output_size(&self) -> usize {
        self.output_size
    }

    fn get(&self, i: usize) -> Sequence<'_> {
        let (inputs, outputs) = &self.sequences[i];
        Sequence::new(inputs, outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Device;

    #[test]
    fn timesteps_are_rows() {
        let device = Device::host();
        let queue = CommandQueue::new(&device);
        let mut data = SimpleSequentialDataset::new(2, 1);
        data.push(
            Matrix::from_slice(&device, 3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]),
            Matrix::from_slice(&device, 3, 1, &[7.0, 8.0, 9.0]),
        );
        let sequence = data.get(0);
        assert_eq!(sequence.len(), 3);
        let x = Vector::zeroed(&device, 2);
        let y = Vector::zeroed(&device, 1);
        sequence.get(&queue, 2, &x, &y);
        assert_eq!(x.read::<f32>(&queue), vec![5.0, 6.0]);
        assert_eq!(y.read::<f32>(&queue), vec![9.0]);
    }
}
