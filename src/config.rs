//! Offload configuration
//!
//! Tunables consumed by the control surface and by callers wiring the
//! engines up at startup. Values are validated on write and clamped to
//! the engine-specific maxima.

use crate::engine::channel::MAX_TRANSFER_CHANNELS;
use crate::engine::threaded::MAX_COPY_WORKERS;
use crate::error::{MigCopyError, Result};
use serde::{Deserialize, Serialize};

/// Tunables for the two offload engines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffloadConfig {
    /// Transfer channels used per hardware-engine copy call
    pub channel_count: usize,
    /// Worker tasks used per thread-engine copy call
    pub worker_count: usize,
}

impl Default for OffloadConfig {
    fn default() -> Self {
        Self {
            channel_count: 1,
            worker_count: 4,
        }
    }
}

impl OffloadConfig {
    /// Size the worker count to the machine's logical CPUs.
    pub fn auto() -> Self {
        Self {
            worker_count: num_cpus::get().min(MAX_COPY_WORKERS),
            ..Self::default()
        }
    }

    /// Reject out-of-range values. Counts below 1 are configuration
    /// errors; counts above the engine maxima are clamped by
    /// [`Self::clamped`] instead of rejected.
    pub fn validate(&self) -> Result<()> {
        if self.channel_count < 1 {
            return Err(MigCopyError::config("channel_count must be at least 1"));
        }
        if self.worker_count < 1 {
            return Err(MigCopyError::config("worker_count must be at least 1"));
        }
        Ok(())
    }

    /// Copy of the config with both counts clamped to the engine maxima.
    pub fn clamped(&self) -> Self {
        Self {
            channel_count: self.channel_count.min(MAX_TRANSFER_CHANNELS),
            worker_count: self.worker_count.min(MAX_COPY_WORKERS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_engine_defaults() {
        let config = OffloadConfig::default();
        assert_eq!(config.channel_count, 1);
        assert_eq!(config.worker_count, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_counts() {
        let config = OffloadConfig {
            channel_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = OffloadConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_clamping() {
        let config = OffloadConfig {
            channel_count: 1000,
            worker_count: 1000,
        };
        let clamped = config.clamped();
        assert_eq!(clamped.channel_count, MAX_TRANSFER_CHANNELS);
        assert_eq!(clamped.worker_count, MAX_COPY_WORKERS);
    }

    #[test]
    fn test_auto_stays_in_bounds() {
        let config = OffloadConfig::auto();
        assert!(config.worker_count >= 1);
        assert!(config.worker_count <= MAX_COPY_WORKERS);
    }
}
