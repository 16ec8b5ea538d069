//! Ephemeral store configuration

use serde::{Deserialize, Serialize};
use squid_core::ConfigValidation;
use std::time::Duration;

/// Ephemeral store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EphemeralConfig {
    /// TTL applied when a write does not name one
    pub default_ttl_ms: u64,
    /// Period of the background sweep
    pub sweep_interval_ms: u64,
    /// Hidden time after which a visibility loss counts as session loss
    pub visibility_loss_threshold_ms: u64,
    /// Capacity of the event channel
    pub event_capacity: usize,
}

impl Default for EphemeralConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: 60 * 60 * 1000,
            sweep_interval_ms: 60 * 1000,
            visibility_loss_threshold_ms: 5 * 60 * 1000,
            event_capacity: 64,
        }
    }
}

impl EphemeralConfig {
    /// Default TTL as a duration.
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Sweep period as a duration.
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

impl ConfigValidation for EphemeralConfig {
    fn validate(&self) -> Result<(), String> {
        if self.default_ttl_ms == 0 {
            return Err("ephemeral.default_ttl_ms must be positive".into());
        }
        if self.sweep_interval_ms == 0 {
            return Err("ephemeral.sweep_interval_ms must be positive".into());
        }
        if self.event_capacity == 0 {
            return Err("ephemeral.event_capacity must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EphemeralConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.default_ttl(), Duration::from_secs(3600));
        assert_eq!(config.sweep_interval(), Duration::from_secs(60));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = EphemeralConfig {
            sweep_interval_ms: 0,
            ..EphemeralConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
