//! # Device, memory and tensor operations
//!
//! The compute half of the crate: devices and their queues, programs and
//! kernels, device-resident vectors and matrices, and the numeric operations
//! issued against them.
//!
//! ## Ownership
//!
//! - [`Device`] is a shared handle; everything created from it keeps it alive
//! - [`Storage`], [`Vector`] and [`Matrix`] are move-only owners of device memory
//! - [`VectorSlice`] and [`StorageRef`] are borrows and cannot outlive or
//!   survive a resize of their source
//! - aliasing one buffer from two owners is explicit, through [`Vector::share`]
//!
//! ## Commands
//!
//! No queue is implied: every operation that touches device memory receives
//! the [`CommandQueue`] to issue on. Commands on one queue are observed in
//! submission order.
//!
//! ## Failures
//!
//! Shape and type mismatches are caller bugs and panic before any work is
//! issued. Backend failures are reported through [`Device::error`] and leave
//! the affected handle unusable.

mod dataset;
mod device;
mod matrix;
mod program;
mod queue;
mod random;
mod range;
mod storage;
mod tensor;
mod tune;
mod value_type;
mod vector;

pub use dataset::{Dataset, SimpleDataset};
pub use device::{Device, DeviceKind};
pub use matrix::Matrix;
pub use program::{IntoKernelArg, Kernel, KernelArg, KernelInvocation, LocalMemory, Program};
pub use queue::{CommandQueue, ProfileEntry};
pub use random::RandomGenerator;
pub use range::{NdRange, Range1D, Range2D, Range3D, RangeND};
pub use storage::{Storage, StorageRef};
pub use tensor::{
    add, add_assign, default_geometry, div, div_assign, elementwise_mul, elementwise_mul_assign, mul,
    mul_assign, mvmul, parallel_add, parallel_mvmul, partial_sum, partial_true_count, select_parts,
    select_rows_per_workgroup, sub, sub_assign, transpose_mvmul, TensorKernels, PART_CANDIDATES,
    ROWS_PER_WORKGROUP_CANDIDATES,
};
pub use tune::{candidate_geometries, tune_geometry};
pub use value_type::{value_type, Element, ValueType};
pub use vector::{Vector, VectorSlice};
