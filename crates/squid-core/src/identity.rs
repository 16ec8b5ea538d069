//! Identity tree data model
//!
//! An [`Identity`] is one node of a sovereign identity tree: a single ROOT
//! plus bounded sub-identities. Structural invariants (depth, allowed child
//! types, shared root) are enforced by the identity store; this module only
//! defines the shapes and the per-type defaults.

use crate::identifiers::{IdentityId, SecurityFlagId};
use crate::time::PhysicalTime;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Kind of identity node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityType {
    /// Sovereign root of a tree
    Root,
    /// DAO-governed sub-identity
    Dao,
    /// Enterprise sub-identity
    Enterprise,
    /// Minor / parental-consent sub-identity
    Consentida,
    /// Anonymous, leaf-only, ephemeral-by-default identity
    Aid,
}

impl IdentityType {
    /// Every identity type, in declaration order.
    pub const ALL: [IdentityType; 5] = [
        IdentityType::Root,
        IdentityType::Dao,
        IdentityType::Enterprise,
        IdentityType::Consentida,
        IdentityType::Aid,
    ];

    /// Governance model a freshly created identity of this type starts with.
    pub fn default_governance(self) -> GovernanceLevel {
        match self {
            IdentityType::Root | IdentityType::Aid => GovernanceLevel::SelfGoverned,
            IdentityType::Dao | IdentityType::Enterprise => GovernanceLevel::Dao,
            IdentityType::Consentida => GovernanceLevel::Parent,
        }
    }

    /// Privacy level a freshly created identity of this type starts with.
    pub fn default_privacy(self) -> PrivacyLevel {
        match self {
            IdentityType::Root | IdentityType::Enterprise => PrivacyLevel::Public,
            IdentityType::Dao => PrivacyLevel::DaoOnly,
            IdentityType::Consentida => PrivacyLevel::Private,
            IdentityType::Aid => PrivacyLevel::Anonymous,
        }
    }

    /// Whether KYC is required by default for this type.
    pub fn requires_kyc_by_default(self) -> bool {
        matches!(self, IdentityType::Dao | IdentityType::Enterprise)
    }

    /// Child types this type may create. AID and CONSENTIDA are leaf-only.
    pub fn default_allowed_children(self) -> BTreeSet<IdentityType> {
        match self {
            IdentityType::Root => [
                IdentityType::Dao,
                IdentityType::Enterprise,
                IdentityType::Consentida,
                IdentityType::Aid,
            ]
            .into_iter()
            .collect(),
            IdentityType::Dao | IdentityType::Enterprise => {
                [IdentityType::Aid].into_iter().collect()
            }
            IdentityType::Consentida | IdentityType::Aid => BTreeSet::new(),
        }
    }

    /// Stable lowercase name used in logs and audit metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            IdentityType::Root => "root",
            IdentityType::Dao => "dao",
            IdentityType::Enterprise => "enterprise",
            IdentityType::Consentida => "consentida",
            IdentityType::Aid => "aid",
        }
    }
}

impl fmt::Display for IdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who besides the identity itself can authorize its actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GovernanceLevel {
    /// Self-governed
    #[serde(rename = "SELF")]
    SelfGoverned,
    /// DAO approval recommended
    #[serde(rename = "DAO")]
    Dao,
    /// Parent/guardian approval required
    #[serde(rename = "PARENT")]
    Parent,
}

/// Lifecycle status. Anything other than `Active` resolves to denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentityStatus {
    /// Usable
    Active,
    /// Disabled by its owner
    Inactive,
    /// Disabled by governance or security
    Suspended,
}

/// Visibility of an identity towards modules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PrivacyLevel {
    /// Visible everywhere
    Public,
    /// Visible to DAO members only
    DaoOnly,
    /// Visible to the governing parent only
    Private,
    /// Never linked to a disclosed identity
    Anonymous,
}

/// KYC progress for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KycStatus {
    /// Whether this identity must pass KYC before sensitive actions
    pub required: bool,
    /// Documents were submitted
    pub submitted: bool,
    /// Verification was approved
    pub approved: bool,
}

impl KycStatus {
    /// KYC status for a fresh identity.
    pub fn new(required: bool) -> Self {
        Self {
            required,
            submitted: false,
            approved: false,
        }
    }

    /// True when the KYC gate would block sensitive actions.
    pub fn is_blocking(&self) -> bool {
        self.required && !self.approved
    }
}

/// Rules governing creation beneath an identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreationRules {
    /// Children must pass KYC
    pub requires_kyc: bool,
    /// Children require DAO governance approval
    pub requires_dao_governance: bool,
    /// Children require parental consent
    pub requires_parental_consent: bool,
    /// Maximum tree depth, fixed by the root
    pub max_depth: u8,
    /// Types this identity may create as children
    pub allowed_child_types: BTreeSet<IdentityType>,
}

impl CreationRules {
    /// Default rules for an identity of `identity_type` inside a tree bounded by `max_depth`.
    pub fn for_type(identity_type: IdentityType, max_depth: u8) -> Self {
        Self {
            requires_kyc: matches!(identity_type, IdentityType::Dao | IdentityType::Enterprise),
            requires_dao_governance: identity_type == IdentityType::Dao,
            requires_parental_consent: identity_type == IdentityType::Consentida,
            max_depth,
            allowed_child_types: identity_type.default_allowed_children(),
        }
    }

    /// True when this identity can never have children.
    pub fn is_leaf_only(&self) -> bool {
        self.allowed_child_types.is_empty()
    }
}

/// A node in the identity tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Unique DID
    pub did: IdentityId,
    /// Display name
    pub name: String,
    /// Node type
    #[serde(rename = "type")]
    pub identity_type: IdentityType,
    /// Parent identity, absent for ROOT
    pub parent_id: Option<IdentityId>,
    /// Root of this tree, self for ROOT
    pub root_id: IdentityId,
    /// Child identities in creation order
    pub children: IndexSet<IdentityId>,
    /// Distance from the root (ROOT = 0)
    pub depth: u8,
    /// Ancestor ids from the root down to the parent
    pub path: Vec<IdentityId>,
    /// Governance model
    pub governance_level: GovernanceLevel,
    /// Creation rules for children
    pub creation_rules: CreationRules,
    /// Lifecycle status
    pub status: IdentityStatus,
    /// Module visibility
    pub privacy_level: PrivacyLevel,
    /// KYC progress
    pub kyc: KycStatus,
    /// Unresolved security flags raised against this identity
    pub security_flags: BTreeSet<SecurityFlagId>,
    /// Creation time
    pub created_at: PhysicalTime,
    /// Last mutation time
    pub updated_at: PhysicalTime,
    /// Last time this identity became active
    pub last_used: PhysicalTime,
}

impl Identity {
    /// True for the root of a tree.
    pub fn is_root(&self) -> bool {
        self.identity_type == IdentityType::Root
    }

    /// True when the identity may act at all.
    pub fn is_active(&self) -> bool {
        self.status == IdentityStatus::Active
    }

    /// True when `ancestor` is on this identity's path.
    pub fn descends_from(&self, ancestor: &IdentityId) -> bool {
        self.path.iter().any(|id| id == ancestor)
    }

    /// Lightweight view for notifications and audit metadata.
    pub fn summary(&self) -> IdentitySummary {
        IdentitySummary {
            did: self.did.clone(),
            name: self.name.clone(),
            identity_type: self.identity_type,
            privacy_level: self.privacy_level,
            governance_level: self.governance_level,
            depth: self.depth,
        }
    }
}

/// Compact identity description carried by notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    /// Identity DID
    pub did: IdentityId,
    /// Display name
    pub name: String,
    /// Node type
    #[serde(rename = "type")]
    pub identity_type: IdentityType,
    /// Module visibility
    pub privacy_level: PrivacyLevel,
    /// Governance model
    pub governance_level: GovernanceLevel,
    /// Depth in the tree
    pub depth: u8,
}
