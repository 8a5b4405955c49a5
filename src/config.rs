//! Environment configuration.
//!
//! | Variable | Meaning | Default |
//! |---|---|---|
//! | `NNFIT_BACKEND` | `host` or `wgpu` | `host` |
//! | `NNFIT_TUNE_REPETITIONS` | launches timed per geometry when tuning | `10` |
//!
//! Unparsable values fall back to the default.

use crate::backend::{set_backend, Backend};

/// Default number of timed launches per candidate geometry.
pub const DEFAULT_TUNE_REPETITIONS: usize = 10;

/// Settings read from the environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub backend: Backend,
    pub tune_repetitions: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: Backend::Host,
            tune_repetitions: DEFAULT_TUNE_REPETITIONS,
        }
    }
}

impl Config {
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            backend: std::env::var("NNFIT_BACKEND")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            tune_repetitions: std::env::var("NNFIT_TUNE_REPETITIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&n| n > 0)
                .unwrap_or(DEFAULT_TUNE_REPETITIONS),
        }
    }

    /// Makes [`Config::backend`] the global backend.
    pub fn apply(&self) {
        set_backend(self.backend);
    }
}
