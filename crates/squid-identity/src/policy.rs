//! Type-specific creation policy
//!
//! Validation and construction of new tree nodes. Child nodes inherit
//! `root_id`, `path` and the root's `max_depth`; everything else comes from
//! the child type's defaults unless the caller overrides it.

use crate::error::ValidationError;
use indexmap::IndexSet;
use squid_core::{
    CreationRules, Identity, IdentityId, IdentityStatus, IdentityType, KycStatus, PhysicalTime,
    PrivacyLevel,
};
use std::collections::BTreeSet;

/// Attributes supplied when bootstrapping a root.
#[derive(Debug, Clone, Default)]
pub struct RootAttributes {
    /// Display name
    pub name: String,
    /// Explicit DID; minted when absent
    pub did: Option<IdentityId>,
    /// Maximum depth of the tree; config default when absent
    pub max_depth: Option<u8>,
    /// Override the default PUBLIC privacy level
    pub privacy_level: Option<PrivacyLevel>,
    /// Override the default (not required) KYC requirement
    pub kyc_required: Option<bool>,
}

impl RootAttributes {
    /// Root attributes with a display name and all defaults
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Attributes supplied when creating a sub-identity.
#[derive(Debug, Clone, Default)]
pub struct SubIdentityAttributes {
    /// Display name
    pub name: String,
    /// Override the type's default privacy level
    pub privacy_level: Option<PrivacyLevel>,
    /// Override the type's default KYC requirement
    pub kyc_required: Option<bool>,
}

impl SubIdentityAttributes {
    /// Sub-identity attributes with a display name and all defaults
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Set the privacy level
    pub fn with_privacy(mut self, level: PrivacyLevel) -> Self {
        self.privacy_level = Some(level);
        self
    }

    /// Set the KYC requirement
    pub fn with_kyc_required(mut self, required: bool) -> Self {
        self.kyc_required = Some(required);
        self
    }
}

/// Check whether `parent` may create a child of `child_type`.
pub fn validate_child(parent: &Identity, child_type: IdentityType) -> Result<(), ValidationError> {
    let requested = parent.depth.saturating_add(1);
    let max_depth = parent.creation_rules.max_depth;
    if requested > max_depth {
        return Err(ValidationError::DepthExceeded {
            parent: parent.did.clone(),
            requested,
            max_depth,
        });
    }

    if child_type == IdentityType::Root
        || !parent.creation_rules.allowed_child_types.contains(&child_type)
    {
        return Err(ValidationError::TypeNotAllowed {
            parent_type: parent.identity_type,
            requested: child_type,
        });
    }

    if parent.status != IdentityStatus::Active {
        return Err(ValidationError::ParentInactive {
            parent: parent.did.clone(),
            status: parent.status,
        });
    }

    Ok(())
}

/// Build a new root identity.
pub fn build_root(attrs: RootAttributes, default_max_depth: u8, now: PhysicalTime) -> Identity {
    let did = attrs.did.unwrap_or_else(IdentityId::generate);
    let max_depth = attrs.max_depth.unwrap_or(default_max_depth);
    let kind = IdentityType::Root;
    Identity {
        root_id: did.clone(),
        did,
        name: attrs.name,
        identity_type: kind,
        parent_id: None,
        children: IndexSet::new(),
        depth: 0,
        path: Vec::new(),
        governance_level: kind.default_governance(),
        creation_rules: CreationRules::for_type(kind, max_depth),
        status: IdentityStatus::Active,
        privacy_level: attrs.privacy_level.unwrap_or(kind.default_privacy()),
        kyc: KycStatus::new(attrs.kyc_required.unwrap_or(kind.requires_kyc_by_default())),
        security_flags: BTreeSet::new(),
        created_at: now,
        updated_at: now,
        last_used: now,
    }
}

/// Build a child of `parent`. Call [`validate_child`] first.
pub fn build_child(
    parent: &Identity,
    child_type: IdentityType,
    attrs: SubIdentityAttributes,
    now: PhysicalTime,
) -> Identity {
    let mut path = parent.path.clone();
    path.push(parent.did.clone());
    let rules = CreationRules::for_type(child_type, parent.creation_rules.max_depth);
    let kyc_required = attrs
        .kyc_required
        .unwrap_or(child_type.requires_kyc_by_default());

    Identity {
        did: IdentityId::generate(),
        name: attrs.name,
        identity_type: child_type,
        parent_id: Some(parent.did.clone()),
        root_id: parent.root_id.clone(),
        children: IndexSet::new(),
        depth: parent.depth + 1,
        path,
        governance_level: child_type.default_governance(),
        creation_rules: rules,
        status: IdentityStatus::Active,
        privacy_level: attrs
            .privacy_level
            .unwrap_or(child_type.default_privacy()),
        kyc: KycStatus::new(kyc_required),
        security_flags: BTreeSet::new(),
        created_at: now,
        updated_at: now,
        last_used: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squid_core::GovernanceLevel;

    fn root(max_depth: u8) -> Identity {
        build_root(
            RootAttributes {
                max_depth: Some(max_depth),
                ..RootAttributes::named("root")
            },
            3,
            PhysicalTime::from_millis(1),
        )
    }

    #[test]
    fn child_inherits_position() {
        let root = root(3);
        let child = build_child(
            &root,
            IdentityType::Dao,
            SubIdentityAttributes::named("dao"),
            PhysicalTime::from_millis(2),
        );
        assert_eq!(child.depth, 1);
        assert_eq!(child.path, vec![root.did.clone()]);
        assert_eq!(child.root_id, root.did);
        assert_eq!(child.creation_rules.max_depth, 3);
        assert_eq!(child.governance_level, GovernanceLevel::Dao);
        assert!(child.kyc.required);
    }

    #[test]
    fn depth_is_checked_before_type() {
        let mut parent = root(1);
        parent.depth = 1;
        let err = validate_child(&parent, IdentityType::Root).unwrap_err();
        assert!(matches!(err, ValidationError::DepthExceeded { requested: 2, .. }));
    }

    #[test]
    fn root_cannot_be_a_child() {
        let err = validate_child(&root(3), IdentityType::Root).unwrap_err();
        assert!(matches!(err, ValidationError::TypeNotAllowed { .. }));
    }

    #[test]
    fn suspended_parent_rejected() {
        let mut parent = root(3);
        parent.status = IdentityStatus::Suspended;
        let err = validate_child(&parent, IdentityType::Aid).unwrap_err();
        assert!(matches!(err, ValidationError::ParentInactive { .. }));
    }
}
