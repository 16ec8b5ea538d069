//! Audit subsystem errors

use squid_core::{SecurityFlagId, StorageError, TimeError};
use thiserror::Error;

/// Errors from audit, flag and report operations.
///
/// Transient storage failures during appends are not errors: the write is
/// queued and reported through [`crate::WriteStatus::Queued`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    /// Repository failure that could not be queued.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Clock failure.
    #[error(transparent)]
    Time(#[from] TimeError),

    /// Entry could not be serialized for signing or export.
    #[error("serialization failed: {reason}")]
    Serialization {
        /// Encoder message
        reason: String,
    },

    /// Security flag does not exist.
    #[error("security flag not found: {0}")]
    FlagNotFound(SecurityFlagId),

    /// Security flag was already resolved.
    #[error("security flag already resolved: {0}")]
    AlreadyResolved(SecurityFlagId),

    /// Analysis window must be positive.
    #[error("invalid analysis window: {window_ms} ms")]
    InvalidWindow {
        /// Rejected window
        window_ms: u64,
    },

    /// Report period ends before it starts.
    #[error("invalid report period: {start_ms}..{end_ms}")]
    InvalidPeriod {
        /// Period start
        start_ms: u64,
        /// Period end
        end_ms: u64,
    },
}

impl AuditError {
    /// Create a serialization error
    pub fn serialization(reason: impl ToString) -> Self {
        Self::Serialization {
            reason: reason.to_string(),
        }
    }
}
