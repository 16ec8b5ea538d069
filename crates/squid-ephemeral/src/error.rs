//! Ephemeral store errors

use squid_core::{StorageError, TimeError};
use thiserror::Error;

/// Errors from ephemeral store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EphemeralError {
    /// Live map or durable mirror failure, including missing encryption support.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Clock failure.
    #[error(transparent)]
    Time(#[from] TimeError),

    /// Sealed payload could not be opened.
    #[error("cannot open sealed payload {key}: {reason}")]
    Unseal {
        /// Item key
        key: String,
        /// Provider message
        reason: String,
    },

    /// Keys must be non-empty.
    #[error("invalid key: {reason}")]
    InvalidKey {
        /// Why the key was rejected
        reason: String,
    },

    /// TTL must be positive.
    #[error("ttl must be positive")]
    InvalidTtl,
}

impl EphemeralError {
    /// Create an invalid key error
    pub fn invalid_key(reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            reason: reason.into(),
        }
    }

    /// True when encryption was requested without a usable sealer.
    pub fn is_encryption_unavailable(&self) -> bool {
        matches!(self, Self::Storage(StorageError::EncryptionUnavailable { .. }))
    }
}
