//! Agent errors

use squid_audit::AuditError;
use squid_authorization::ResolverError;
use squid_core::TimeError;
use squid_ephemeral::EphemeralError;
use squid_identity::IdentityError;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration loading and validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// File could not be read.
    #[error("cannot read config {path}: {reason}")]
    Io {
        /// Path that was read
        path: PathBuf,
        /// OS message
        reason: String,
    },

    /// TOML did not match the config schema.
    #[error("cannot parse config: {reason}")]
    Parse {
        /// Parser message
        reason: String,
    },

    /// A `SQUID_*` variable held an unparseable value.
    #[error("environment variable {var}: {reason}")]
    Env {
        /// Variable name
        var: String,
        /// Why the value was rejected
        reason: String,
    },

    /// A section failed validation.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Offending field and constraint
        reason: String,
    },
}

impl ConfigError {
    /// Create a parse error
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    /// Create an environment error
    pub fn env(var: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Env {
            var: var.into(),
            reason: reason.into(),
        }
    }

    /// Create a validation error
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by [`crate::SquidAgent`] and the switch coordinator.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Identity store failure.
    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Audit subsystem failure.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// Ephemeral store failure.
    #[error(transparent)]
    Ephemeral(#[from] EphemeralError),

    /// Capability summary failure.
    #[error(transparent)]
    Resolver(#[from] ResolverError),

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Clock failure.
    #[error(transparent)]
    Time(#[from] TimeError),
}
