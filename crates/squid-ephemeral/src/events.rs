//! Session lifecycle signals and store notifications

use serde::{Deserialize, Serialize};
use squid_core::IdentityId;

/// Host-reported session lifecycle change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum LifecycleSignal {
    /// User logged out
    Logout,
    /// Page or tab is unloading
    PageUnload,
    /// The session has been hidden for `hidden_for_ms`
    VisibilityLost {
        /// How long the session has been hidden
        hidden_for_ms: u64,
    },
    /// The session became visible again
    VisibilityRestored,
}

/// Why a session cleanup ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTrigger {
    /// Explicit call by the host
    Manual,
    /// Logout
    Logout,
    /// Page unload
    PageUnload,
    /// Visibility lost beyond the threshold
    VisibilityLoss,
}

/// Notification broadcast to store listeners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EphemeralEvent {
    /// Auto-destruct items were destroyed on session loss
    SessionCleanup {
        /// Cause
        trigger: CleanupTrigger,
        /// Items destroyed
        removed: usize,
    },
    /// Every item of one identity was removed
    IdentityPurged {
        /// Purged identity
        identity_id: IdentityId,
        /// Items removed
        removed: usize,
    },
    /// Expired items were evicted by a sweep
    Swept {
        /// Items evicted
        removed: usize,
    },
}
