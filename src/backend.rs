//! Backend selection.
//!
//! The active backend decides which device [`Device::default_device`]
//! returns. It is kept in a global `AtomicU8`, so it can be switched at runtime
//! before devices are created.
//!
//! # Supported Backends
//!
//! - `Host`: kernels run as Rust functions on a `rayon` thread pool (default).
//! - `Wgpu`: kernels run as WGSL compute shaders through `wgpu`, when the
//!   `wgpu` feature is enabled and an adapter is found. Otherwise the host
//!   device is used and a warning is logged.
//!
//! [`Device::default_device`]: crate::core::Device::default_device

use core::convert::TryFrom;
use core::str::FromStr;
use core::sync::atomic::{AtomicU8, Ordering};

/// Enumeration of compute backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Backend {
    /// Host memory and CPU threads.
    #[default]
    Host = 0,
    /// GPU adapters through `wgpu`.
    Wgpu,
}

impl TryFrom<u8> for Backend {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Host),
            1 => Ok(Self::Wgpu),
            _ => Err(()),
        }
    }
}

impl FromStr for Backend {
    type Err = ();

    /// Parses `host`/`cpu` or `wgpu`/`gpu`, ignoring case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "host" | "cpu" => Ok(Self::Host),
            "wgpu" | "gpu" => Ok(Self::Wgpu),
            _ => Err(()),
        }
    }
}

/// Active backend, as a `Backend` discriminant.
static GLOBAL_DEFAULT_BACKEND: AtomicU8 = AtomicU8::new(Backend::Host as u8);

/// Sets the backend used by [`Device::default_device`](crate::core::Device::default_device).
///
/// # Example
///
/// ```
/// use nnfit::backend::{get_backend, set_backend, Backend};
/// set_backend(Backend::Wgpu);
/// assert_eq!(get_backend(), Backend::Wgpu);
/// set_backend(Backend::Host);
/// ```
pub fn set_backend(b: Backend) {
    GLOBAL_DEFAULT_BACKEND.store(b as u8, Ordering::Release);
}

/// Returns the active backend.
///
/// If the stored value is invalid, defaults to [`Backend::Host`].
pub fn get_backend() -> Backend {
    Backend::try_from(GLOBAL_DEFAULT_BACKEND.load(Ordering::Acquire)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_names() {
        assert_eq!("Host".parse(), Ok(Backend::Host));
        assert_eq!(" wgpu ".parse(), Ok(Backend::Wgpu));
        assert_eq!("gpu".parse(), Ok(Backend::Wgpu));
        assert!("cuda".parse::<Backend>().is_err());
    }
}
