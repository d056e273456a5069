//! Runtime configuration.
//!
//! All fields have defaults; a TOML file only needs to name what it changes:
//!
//! ```toml
//! ignore_window_ms = 500
//! history_capacity = 4096
//! ```

use std::time::Duration;

#[cfg(feature = "config")]
use serde::{Deserialize, Serialize};

#[cfg(feature = "config")]
use crate::error::RuntimeError;

/// Tunables shared by every runtime of a display.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "config", derive(Deserialize, Serialize))]
#[cfg_attr(feature = "config", serde(default))]
pub struct RuntimeConfig {
    /// How long incoming crosshair updates are ignored after a local write.
    pub ignore_window_ms: u64,
    /// Default number of samples kept by history bindings.
    pub history_capacity: usize,
    /// Prefix of synthetic array element PV names.
    pub array_element_prefix: String,
    /// Log runtimes that stop with PVs still tracked.
    pub warn_unreleased_pvs: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            ignore_window_ms: Self::DEFAULT_IGNORE_WINDOW_MS,
            history_capacity: Self::DEFAULT_HISTORY_CAPACITY,
            array_element_prefix: "elem".to_owned(),
            warn_unreleased_pvs: true,
        }
    }
}

impl RuntimeConfig {
    pub const DEFAULT_IGNORE_WINDOW_MS: u64 = 1_000;
    pub const DEFAULT_HISTORY_CAPACITY: usize = 1_024;

    /// Feedback-suppression window.
    #[inline]
    #[must_use]
    pub fn ignore_window(&self) -> Duration {
        Duration::from_millis(self.ignore_window_ms)
    }

    /// History capacity, at least one sample.
    #[inline]
    #[must_use]
    pub fn history_capacity(&self) -> usize {
        self.history_capacity.max(1)
    }

    /// Parse a TOML document.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Config`] on malformed input.
    #[cfg(feature = "config")]
    pub fn from_toml_str(text: &str) -> Result<Self, RuntimeError> {
        toml::from_str(text).map_err(|err| RuntimeError::Config(err.to_string()))
    }

    /// Load a TOML file.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Config`] when the file cannot be read or parsed.
    #[cfg(feature = "config")]
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| RuntimeError::Config(format!("{}: {err}", path.display())))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), ?config, "loaded runtime config");
        Ok(config)
    }
}
