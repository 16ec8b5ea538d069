//! Error types shared across the identity core
//!
//! Repository and key/value reads return `Result<T, StorageError>` so that
//! malformed persisted data is a typed, recoverable condition.

use serde::{Deserialize, Serialize};

/// Failure of a storage backend or of decoding persisted state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum StorageError {
    /// Key does not exist
    #[error("not found: {key}")]
    NotFound {
        /// Missing key
        key: String,
    },

    /// Persisted bytes could not be decoded
    #[error("malformed record at {key}: {reason}")]
    Malformed {
        /// Offending key
        key: String,
        /// Decoder message
        reason: String,
    },

    /// Backend is unreachable; callers may queue and retry
    #[error("storage unavailable: {reason}")]
    Unavailable {
        /// Backend message
        reason: String,
    },

    /// Encryption was requested but no sealer is configured or sealing failed
    #[error("encryption unavailable: {reason}")]
    EncryptionUnavailable {
        /// Provider message
        reason: String,
    },

    /// Any other backend failure
    #[error("storage backend error: {reason}")]
    Backend {
        /// Backend message
        reason: String,
    },
}

impl StorageError {
    /// Create a not found error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create a malformed record error
    pub fn malformed(key: impl Into<String>, reason: impl ToString) -> Self {
        Self::Malformed {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Create an unavailable backend error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create an encryption unavailable error
    pub fn encryption_unavailable(reason: impl Into<String>) -> Self {
        Self::EncryptionUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a generic backend error
    pub fn backend(reason: impl Into<String>) -> Self {
        Self::Backend {
            reason: reason.into(),
        }
    }

    /// True when retrying later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Failure reading the clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum TimeError {
    /// Clock is not available
    #[error("time service unavailable")]
    ServiceUnavailable,
    /// System clock is before the Unix epoch
    #[error("clock before unix epoch")]
    BeforeEpoch,
}

/// Failure of the collaborator-provided module registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RegistryError {
    /// Registry could not be consulted
    #[error("module registry unavailable: {reason}")]
    Unavailable {
        /// Collaborator message
        reason: String,
    },
}

impl RegistryError {
    /// Create an unavailable registry error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Failure of a collaborator hook (security notifier, index sync, crypto provider).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum HookError {
    /// Collaborator is unreachable; the call may be retried
    #[error("hook unavailable: {reason}")]
    Unavailable {
        /// Collaborator message
        reason: String,
    },
    /// Collaborator rejected the call
    #[error("hook rejected call: {reason}")]
    Rejected {
        /// Collaborator message
        reason: String,
    },
}

impl HookError {
    /// Create an unavailable hook error
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Create a rejected hook error
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StorageError::malformed("identity:did:squid:a", "expected value");
        assert!(err.to_string().contains("identity:did:squid:a"));
        assert!(err.to_string().contains("expected value"));

        let err = StorageError::unavailable("disk offline");
        assert!(err.is_transient());
        assert!(!StorageError::not_found("k").is_transient());
    }
}
