//! nnfit: device-resident tensors and neural network training.
//!
//! Vectors and matrices live on a compute device (the host, or a GPU through
//! the `wgpu` feature) and every operation is a kernel issued on an explicit
//! [`CommandQueue`](crate::core::CommandQueue). Fully connected, dropout and
//! recurrent layers are built on those operations and trained with gradient
//! descent or momentum.
//!
//! # Modules
//!
//! - [`core`]: devices, queues, programs, vectors, matrices and tensor operations
//! - [`nn`]: layers, networks, error criteria, training and evaluation
//! - [`optimizers`]: weight update rules
//! - [`rnn`]: recurrent layers and sequence datasets
//! - [`backend`], [`config`]: backend selection and environment configuration
//! - [`approx`]: float comparison for results computed on different backends
//!
//! # Example
//!
//! ```rust
//! use nnfit::core::{add, CommandQueue, Device, Vector};
//!
//! let device = Device::host();
//! let queue = CommandQueue::new(&device);
//! let x = Vector::from_slice(&device, &[1.0f32, 2.0]);
//! let y = Vector::from_slice(&device, &[3.0f32, 4.0]);
//! let sum = Vector::zeroed(&device, 2);
//! add(&queue, &sum, &x, &y);
//! assert_eq!(sum.read::<f32>(&queue), vec![4.0, 6.0]);
//! ```

pub mod approx;
pub mod backend;
pub mod config;
pub mod core;
pub mod error;
pub mod nn;
pub mod ops;
pub mod optimizers;
pub mod rnn;
