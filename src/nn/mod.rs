//! # Neural networks
//!
//! Layers, networks and the training loop, built on the device tensor
//! operations of [`crate::core`].
//!
//! ## Training Flow
//!
//! 1. the [`Trainer`] loads `parallelization` examples into device vectors
//! 2. [`Network::feedforward`] drives every layer in order
//! 3. the [`ErrorCriterion`] accumulates the error and seeds the output layer
//! 4. [`Network::backpropagate`] walks down to
//!    [`Network::backpropagate_until`], accumulating gradients
//! 5. an [`Optimizer`](crate::optimizers::Optimizer) consumes the
//!    `(weights, gradients)` pairs
//!
//! ## Example
//!
//! ```
//! use nnfit::core::{CommandQueue, Device, Matrix, SimpleDataset};
//! use nnfit::nn::{Layer, MeanSquaredError, Network, Trainer, TransferFunction};
//! use nnfit::optimizers::GradientDescent;
//!
//! let device = Device::host();
//! let queue = CommandQueue::new(&device);
//! let data = SimpleDataset::new(
//!     Matrix::from_slice(&device, 2, 1, &[0.0, 1.0]),
//!     Matrix::from_slice(&device, 2, 1, &[1.0, 0.0]),
//! );
//! let mut net = Network::new(&device);
//! net.input_layer(1).add(Layer::new(&device, 1, 1, TransferFunction::Sigmoid));
//! net.init(&queue, 1);
//!
//! let mut optimizer = GradientDescent::new(&device, 1.0);
//! let mut trainer = Trainer::new(&queue, &mut net, &MeanSquaredError, &data, 1);
//! trainer.gradient_descent(&mut optimizer, 10);
//! ```

mod context;
mod criterion;
mod dropout;
mod evaluator;
mod layer;
mod network;
mod trainer;
mod transfer;

pub use context::NnContext;
pub use criterion::{CrossEntropy, ErrorCriterion, MeanSquaredError};
pub use dropout::DropoutLayer;
pub use evaluator::{ClassificationEvaluator, EvaluationResult};
pub use layer::{Layer, NetworkLayer};
pub use network::Network;
pub use trainer::{IterationCallback, Trainer};
pub use transfer::TransferFunction;
