//! # Recurrent networks
//!
//! A [`RecurrentLayer`] is a single-timestep cell: every call merges the
//! external input with the previous activation and runs a fully connected
//! [`Layer`](crate::nn::Layer) over the result. Training a sequence requires
//! [`RecurrentLayer::unroll`] so every timestep keeps its own input and
//! derivative until backpropagation through time has walked back over it.

mod recurrent;
mod sequence;

pub use recurrent::RecurrentLayer;
pub use sequence::{Sequence, SequentialDataset, SimpleSequentialDataset};
