//! # Compute backends
//!
//! Each backend provides buffers, programs and kernel launches for the
//! [`crate::core`] handles to wrap. Kernels are addressed by program and entry
//! point name; both backends implement the same entry points with the same
//! argument order.
//!
//! - [`cpu`]: host memory and Rust kernels on a `rayon` pool, always built
//! - [`wgpu`] *(opt-in)*: WGSL compute shaders through `wgpu`
//!
//! ## Feature Flags
//!
//! - `wgpu`: enables GPU adapters in [`Device::find_all`](crate::core::Device::find_all)

pub mod cpu;
#[cfg(feature = "wgpu")]
pub mod wgpu;
