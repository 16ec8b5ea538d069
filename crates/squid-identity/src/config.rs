//! Identity store configuration

use serde::{Deserialize, Serialize};
use squid_core::ConfigValidation;

/// Upper bound accepted for `max_depth`.
pub const MAX_SUPPORTED_DEPTH: u8 = 16;

/// Identity store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Default maximum tree depth declared by newly bootstrapped roots
    pub max_depth: u8,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self { max_depth: 3 }
    }
}

impl ConfigValidation for IdentityConfig {
    fn validate(&self) -> Result<(), String> {
        if self.max_depth == 0 || self.max_depth > MAX_SUPPORTED_DEPTH {
            return Err(format!(
                "identity.max_depth must be within 1..={MAX_SUPPORTED_DEPTH}, got {}",
                self.max_depth
            ));
        }
        Ok(())
    }
}
