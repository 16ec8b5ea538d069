//! Proptest strategies over core enums

use proptest::prelude::*;
use squid_core::{GovernanceLevel, IdentityStatus, IdentityType, PrivacyLevel};

/// Any identity type
pub fn arb_identity_type() -> impl Strategy<Value = IdentityType> {
    prop::sample::select(IdentityType::ALL.to_vec())
}

/// Any non-root identity type
pub fn arb_child_type() -> impl Strategy<Value = IdentityType> {
    prop::sample::select(vec![
        IdentityType::Dao,
        IdentityType::Enterprise,
        IdentityType::Consentida,
        IdentityType::Aid,
    ])
}

/// Any privacy level
pub fn arb_privacy_level() -> impl Strategy<Value = PrivacyLevel> {
    prop::sample::select(vec![
        PrivacyLevel::Public,
        PrivacyLevel::DaoOnly,
        PrivacyLevel::Private,
        PrivacyLevel::Anonymous,
    ])
}

/// Any governance level
pub fn arb_governance_level() -> impl Strategy<Value = GovernanceLevel> {
    prop::sample::select(vec![
        GovernanceLevel::SelfGoverned,
        GovernanceLevel::Dao,
        GovernanceLevel::Parent,
    ])
}

/// Any status
pub fn arb_status() -> impl Strategy<Value = IdentityStatus> {
    prop::sample::select(vec![
        IdentityStatus::Active,
        IdentityStatus::Inactive,
        IdentityStatus::Suspended,
    ])
}

/// Any `namespace.verb` action drawn from the common catalog
pub fn arb_action() -> impl Strategy<Value = String> {
    prop::sample::select(vec![
        "financial.transfer".to_string(),
        "financial.transaction".to_string(),
        "governance.vote".to_string(),
        "identity.create_subidentity".to_string(),
        "identity.delete_subidentity".to_string(),
        "content.delete".to_string(),
        "message.send".to_string(),
        "kyc.submit".to_string(),
    ])
}

/// Any module id from the default registry, plus an unknown one
pub fn arb_module() -> impl Strategy<Value = Option<String>> {
    prop::option::of(prop::sample::select(vec![
        "qmail".to_string(),
        "qchat".to_string(),
        "qdrive".to_string(),
        "qmarket".to_string(),
        "qwallet".to_string(),
        "qsocial".to_string(),
        "qindex".to_string(),
        "qlock".to_string(),
        "unknown-module".to_string(),
    ]))
}
