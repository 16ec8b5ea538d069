//! Collaborator hooks the audit subsystem calls but does not implement

use crate::audit::SecurityFlag;
use crate::errors::HookError;
use crate::identifiers::IdentityId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Event escalated to the security team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SecurityEvent {
    /// A high or critical flag was raised
    FlagRaised {
        /// The raised flag
        flag: SecurityFlag,
    },
    /// The same signature was observed across several identities
    CoordinatedPattern {
        /// Pattern signature
        signature: String,
        /// Identities exhibiting it
        identities: Vec<IdentityId>,
    },
}

/// `notifySecurityTeam(event)` hook.
#[async_trait]
pub trait SecurityNotifier: Send + Sync {
    /// Deliver an escalation.
    async fn notify_security_team(&self, event: &SecurityEvent) -> Result<(), HookError>;
}

/// `syncWithQindex(identityId)` hook.
#[async_trait]
pub trait IndexSync: Send + Sync {
    /// Push the identity's latest audit state to the external index.
    async fn sync_with_qindex(&self, identity: &IdentityId) -> Result<(), HookError>;
}
