//! Resolver decisions
//!
//! A denial is a value, not an error. Every denial carries a human-readable
//! reason and, where one exists, the role or balance that would flip it.

use crate::rules::Rule;
use serde::{Deserialize, Serialize};
use squid_core::IdentityStatus;

/// Reason string for type-permission and guardian denials.
pub const REASON_INSUFFICIENT_PERMISSIONS: &str = "insufficient permissions";

/// Reason string for KYC denials.
pub const REASON_KYC_REQUIRED: &str = "KYC verification required";

/// Reason string for balance denials.
pub const REASON_INSUFFICIENT_BALANCE: &str = "insufficient balance";

/// Which KYC step is still outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KycMissing {
    /// Documents were never submitted
    Submission,
    /// Submitted but not yet approved
    Approval,
}

/// Structured cause of a denial.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DenialKind {
    /// Identity is not ACTIVE
    Inactive {
        /// Current status
        status: IdentityStatus,
    },
    /// Identity type lacks the needed permission flag
    InsufficientPermissions,
    /// Permission denial specialized to a missing KYC precondition
    KycRequired {
        /// Outstanding step
        missing: KycMissing,
    },
    /// Privacy level forbids the module
    ModuleRestricted {
        /// Module id
        module: String,
    },
    /// Governance model forbids the action without guardian approval
    GovernanceRestricted,
    /// Available balance below the action minimum
    InsufficientBalance {
        /// Balance supplied with the request
        available: u64,
    },
}

/// Non-blocking annotation carried on an allowed decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Advisory {
    /// Action should be approved by the identity's DAO
    DaoApprovalRequired,
}

impl Advisory {
    /// Message recorded in audit metadata.
    pub fn message(self) -> &'static str {
        match self {
            Advisory::DaoApprovalRequired => "requires DAO approval",
        }
    }
}

/// Outcome of resolving one request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    /// Whether the action may proceed
    pub allowed: bool,
    /// Human-readable explanation
    pub reason: String,
    /// Role that would flip a denial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_role: Option<String>,
    /// Balance that would flip a denial
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_balance: Option<u64>,
    /// Structured denial cause
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<DenialKind>,
    /// Advisories gathered while evaluating
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub advisories: Vec<Advisory>,
    /// Rule that denied, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<Rule>,
}

impl Decision {
    /// Allowed decision carrying `advisories`.
    pub fn allow(advisories: Vec<Advisory>) -> Self {
        let reason = match advisories.first() {
            Some(advisory) => advisory.message().to_string(),
            None => "allowed".to_string(),
        };
        Self {
            allowed: true,
            reason,
            required_role: None,
            required_balance: None,
            denial: None,
            advisories,
            rule: None,
        }
    }

    /// Denied decision.
    pub fn deny(rule: Rule, denial: DenialKind, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.into(),
            required_role: None,
            required_balance: None,
            denial: Some(denial),
            advisories: Vec::new(),
            rule: Some(rule),
        }
    }

    /// Attach the role that would flip this decision.
    pub fn with_required_role(mut self, role: impl Into<String>) -> Self {
        self.required_role = Some(role.into());
        self
    }

    /// Attach the balance that would flip this decision.
    pub fn with_required_balance(mut self, balance: u64) -> Self {
        self.required_balance = Some(balance);
        self
    }

    /// True for a KYC denial.
    pub fn is_kyc_denial(&self) -> bool {
        matches!(self.denial, Some(DenialKind::KycRequired { .. }))
    }

    /// True when the DAO advisory was raised.
    pub fn requires_dao_approval(&self) -> bool {
        self.advisories.contains(&Advisory::DaoApprovalRequired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allowed_decision_reason_reflects_advisory() {
        assert_eq!(Decision::allow(Vec::new()).reason, "allowed");
        let d = Decision::allow(vec![Advisory::DaoApprovalRequired]);
        assert!(d.allowed && d.requires_dao_approval());
        assert_eq!(d.reason, "requires DAO approval");
    }

    #[test]
    fn denial_serializes_camel_case() {
        let d = Decision::deny(
            Rule::Kyc,
            DenialKind::KycRequired {
                missing: KycMissing::Approval,
            },
            REASON_KYC_REQUIRED,
        )
        .with_required_role("kyc-verified");
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["requiredRole"], "kyc-verified");
        assert_eq!(json["denial"]["kind"], "kyc_required");
        assert!(json.get("requiredBalance").is_none());
        assert!(d.is_kyc_denial());
    }
}
