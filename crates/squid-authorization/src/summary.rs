//! Capability summary

use serde::{Deserialize, Serialize};
use squid_core::{IdentityId, IdentityType};

/// Aggregated capabilities of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilitySummary {
    /// Summarized identity
    pub identity_id: IdentityId,
    /// May create sub-identities now
    pub can_create_subidentities: bool,
    /// May delete sub-identities
    pub can_delete_subidentities: bool,
    /// May modify sub-identities
    pub can_modify_subidentities: bool,
    /// KYC approved
    pub has_kyc: bool,
    /// Takes part in governance
    pub is_governance_participant: bool,
    /// Privacy level is PUBLIC
    pub is_public: bool,
    /// Child types creatable now (empty when creation is impossible)
    pub allowed_child_types: Vec<IdentityType>,
    /// Registry modules the identity cannot reach
    pub restricted_modules: Vec<String>,
    /// Catalog actions the identity cannot perform
    pub restricted_actions: Vec<String>,
}

impl CapabilitySummary {
    /// True when `module` is restricted.
    pub fn is_module_restricted(&self, module: &str) -> bool {
        self.restricted_modules.iter().any(|m| m == module)
    }

    /// True when `action` is restricted.
    pub fn is_action_restricted(&self, action: &str) -> bool {
        self.restricted_actions.iter().any(|a| a == action)
    }
}
