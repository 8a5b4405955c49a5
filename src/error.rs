//! Backend failure reporting.
//!
//! Contract violations (mismatched shapes, wrong element types, out-of-range
//! slices) are assertions and abort before any work is issued. Everything in
//! this module describes failures coming from the compute backend itself:
//! context or queue creation, program builds, kernel lookup, buffer
//! allocation, launches and transfers.
//!
//! Such failures are reported through [`Device::error`](crate::core::Device::error)
//! and leave the affected handle unusable. Nothing is retried.

use thiserror::Error;

/// A failure reported by a compute backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// The compute context could not be created.
    #[error("failed to create compute context: {0}")]
    Context(String),

    /// A command queue could not be created.
    #[error("failed to create command queue: {0}")]
    Queue(String),

    /// A program source is unknown or failed to compile.
    #[error("failed to build program `{program}`: {message}")]
    ProgramBuild { program: String, message: String },

    /// The program has no entry point with the requested name.
    #[error("kernel `{kernel}` not found in program `{program}`")]
    KernelNotFound { program: String, kernel: String },

    /// A device buffer could not be allocated.
    #[error("failed to allocate a buffer of {size} bytes: {message}")]
    Allocation { size: usize, message: String },

    /// A kernel launch could not be scheduled or failed while running.
    #[error("failed to enqueue kernel `{kernel}`: {message}")]
    Enqueue { kernel: String, message: String },

    /// A bound argument does not match what the kernel expects.
    #[error("argument {index} of kernel `{kernel}`: {message}")]
    Argument {
        kernel: String,
        index: usize,
        message: String,
    },

    /// A copy, fill, read or write between buffers failed.
    #[error("buffer transfer failed: {0}")]
    Transfer(String),

    /// An operation was attempted on a handle whose creation failed earlier.
    #[error("operation on an unusable {0}")]
    Unusable(&'static str),
}

impl DeviceError {
    /// Numeric code attached to the error when it is logged.
    ///
    /// Codes are negative, in the spirit of compute API status codes, so they
    /// never collide with a success value of zero.
    #[must_use]
    pub fn code(&self) -> i32 {
        match self {
            Self::Context(_) => -1,
            Self::Queue(_) => -2,
            Self::ProgramBuild { .. } => -11,
            Self::KernelNotFound { .. } => -46,
            Self::Allocation { .. } => -4,
            Self::Enqueue { .. } => -5,
            Self::Argument { .. } => -51,
            Self::Transfer(_) => -30,
            Self::Unusable(_) => -34,
        }
    }
}

/// Result alias used by the backend internals.
pub type Result<T> = std::result::Result<T, DeviceError>;
