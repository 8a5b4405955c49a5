//! Batch and mini-batch gradient descent.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use super::{ErrorCriterion, Network, NnContext};
use crate::core::{partial_sum, CommandQueue, Dataset, Vector};
use crate::optimizers::Optimizer;

/// Called after every optimizer step with `(iteration, batch, mean error)`.
pub type IterationCallback<'a> = Box<dyn FnMut(usize, usize, f32) + 'a>;

/// Drives a [`Network`] over a [`Dataset`].
///
/// Examples are fed `parallelization` at a time, which must match the
/// parallelization the network's layers were built with.
pub struct Trainer<'a> {
    queue: &'a CommandQueue,
    network: &'a mut Network,
    context: NnContext,
    criterion: &'a dyn ErrorCriterion,
    data: &'a dyn Dataset,
    parallelization: usize,
    input: Vector,
    output: Vector,
    errors: Vector,
    error_sum: Vector,
    indices: Vec<usize>,
    shuffle: Option<StdRng>,
    after_iteration: Option<IterationCallback<'a>>,
}

impl<'a> Trainer<'a> {
    /// # Panics
    ///
    /// If the dataset does not fit the network, or its size is not a multiple
    /// of `parallelization`.
    pub fn new(
        queue: &'a CommandQueue,
        network: &'a mut Network,
        criterion: &'a dyn ErrorCriterion,
        data: &'a dyn Dataset,
        parallelization: usize,
    ) -> Self {
        assert!(parallelization > 0, "parallelization must be positive");
        assert_eq!(data.input_size(), network.input_size(), "dataset and network input sizes differ");
        assert_eq!(data.output_size(), network.output_size(), "dataset and network output sizes differ");
        assert_eq!(
            data.size() % parallelization,
            0,
            "{} examples do not split into groups of {parallelization}",
            data.size()
        );
        let device = network.device().clone();
        Self {
            queue,
            input: Vector::zeroed(&device, data.input_size() * parallelization),
            output: Vector::zeroed(&device, data.output_size() * parallelization),
            errors: Vector::zeroed(&device, data.output_size() * parallelization),
            error_sum: Vector::zeroed(&device, 1),
            indices: (0..data.size()).collect(),
            context: network.context().clone(),
            network,
            criterion,
            data,
            parallelization,
            shuffle: None,
            after_iteration: None,
        }
    }

    /// Shuffles the example order before every iteration, reproducibly from
    /// `seed`.
    pub fn reshuffle_indices(&mut self, seed: u64) -> &mut Self {
        self.shuffle = Some(StdRng::seed_from_u64(seed));
        self
    }

    pub fn after_iteration(&mut self, callback: impl FnMut(usize, usize, f32) + 'a) -> &mut Self {
        self.after_iteration = Some(Box::new(callback));
        self
    }

    /// One optimizer step per iteration over the whole dataset.
    pub fn gradient_descent(&mut self, optimizer: &mut dyn Optimizer, iterations: usize) {
        let batch = self.data.size();
        self.train(optimizer, iterations, batch);
    }

    /// One optimizer step per `batch` examples.
    ///
    /// # Panics
    ///
    /// If `batch` is not a positive multiple of the parallelization.
    pub fn mini_batch_gradient_descent(&mut self, optimizer: &mut dyn Optimizer, iterations: usize, batch: usize) {
        assert!(
            batch > 0 && batch % self.parallelization == 0,
            "batch of {batch} is not a multiple of {}",
            self.parallelization
        );
        self.train(optimizer, iterations, batch);
    }

    fn train(&mut self, optimizer: &mut dyn Optimizer, iterations: usize, batch_size: usize) {
        let size = self.data.size();
        if size == 0 {
            return;
        }
        let batch_count = size.div_ceil(batch_size);
        for iteration in 0..iterations {
            if let Some(rng) = self.shuffle.as_mut() {
                self.indices.shuffle(rng);
            }
            for batch in 0..batch_count {
                let start = batch * batch_size;
                let count = (start + batch_size).min(size) - start;
                let error = self.train_batch(optimizer, start, count);
                tracing::trace!(iteration, batch, error, "batch trained");
                if let Some(callback) = self.after_iteration.as_mut() {
                    callback(iteration, batch, error);
                }
            }
        }
    }

    /// Returns the mean error over the batch, measured before the step.
    fn train_batch(&mut self, optimizer: &mut dyn Optimizer, start: usize, count: usize) -> f32 {
        let queue = self.queue;
        self.network.zero_gradients(queue);
        self.errors.zeros(queue);

        let (inputs, outputs) = (self.data.input_size(), self.data.output_size());
        for group in (start..start + count).step_by(self.parallelization) {
            for j in 0..self.parallelization {
                self.data.get(
                    queue,
                    self.indices[group + j],
                    1,
                    &self.input.slice(j * inputs, (j + 1) * inputs),
                    &self.output.slice(j * outputs, (j + 1) * outputs),
                );
            }
            let prediction = self.network.feedforward(queue, &self.input);
            self.criterion
                .compute_error(&self.context, queue, prediction, &self.output, &self.errors);
            self.network.backpropagate(queue, &self.output, self.criterion);
        }

        partial_sum(queue, &self.error_sum, &self.errors);
        let error = self.error_sum.read::<f32>(queue)[0] / count as f32;
        optimizer.optimize(queue, &self.network.weights_and_gradients(), count);
        error
    }
}
