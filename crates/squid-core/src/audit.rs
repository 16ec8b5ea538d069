//! Audit log and security flag data model
//!
//! Audit entries are immutable once appended. Security flags have their own
//! lifecycle (raise, resolve) and reference entries only as evidence.

use crate::identifiers::{AuditEntryId, CorrelationId, IdentityId, SecurityFlagId};
use crate::time::PhysicalTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Metadata key carrying the module an action targeted.
pub const META_MODULE: &str = "module";

/// Metadata key carrying the human-readable decision reason.
pub const META_REASON: &str = "reason";

/// Result of the audited operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditOutcome {
    /// Operation was permitted
    Allowed,
    /// Operation was refused
    Denied,
    /// Operation failed or was abandoned
    Error,
}

impl AuditOutcome {
    /// Stable name used in exports.
    pub fn as_str(self) -> &'static str {
        match self {
            AuditOutcome::Allowed => "ALLOWED",
            AuditOutcome::Denied => "DENIED",
            AuditOutcome::Error => "ERROR",
        }
    }
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One appended audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    /// Entry id
    pub id: AuditEntryId,
    /// Subject identity
    pub identity_id: IdentityId,
    /// Per-identity append position, starting at 0
    pub sequence: u64,
    /// Tagged operation name, e.g. `financial.transfer`
    pub action: String,
    /// Monotonic per identity
    pub timestamp: PhysicalTime,
    /// Outcome of the operation
    pub outcome: AuditOutcome,
    /// Free-form, action-specific metadata (always a JSON object)
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Links entries from one logical operation
    pub correlation_id: Option<CorrelationId>,
    /// Hex signature over the canonical entry bytes, when a signer is configured
    pub signature: Option<String>,
}

impl AuditEntry {
    /// Module the action targeted, if recorded.
    pub fn module(&self) -> Option<&str> {
        self.metadata.get(META_MODULE).and_then(|v| v.as_str())
    }

    /// Decision reason, if recorded.
    pub fn reason(&self) -> Option<&str> {
        self.metadata.get(META_REASON).and_then(|v| v.as_str())
    }

    /// Namespace part of a `namespace.verb` action.
    pub fn action_namespace(&self) -> &str {
        self.action
            .split_once('.')
            .map_or(self.action.as_str(), |(ns, _)| ns)
    }

    /// Bytes covered by the signature: the entry serialized without its signature.
    pub fn signing_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        serde_json::to_vec(&unsigned)
    }
}

/// Severity of a security flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    /// Informational
    Low,
    /// Worth review
    Medium,
    /// Needs prompt review; notifies the security team
    High,
    /// Blocks compliance gates; notifies the security team
    Critical,
}

impl Severity {
    /// True when the security team should be notified.
    pub fn requires_escalation(self) -> bool {
        self >= Severity::High
    }
}

/// Category of a security flag.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagType {
    /// Action frequency far above baseline
    RateAnomaly,
    /// Access from an unexpected location
    LocationAnomaly,
    /// Run of denied outcomes (possible probing)
    ProbingSequence,
    /// Access to modules outside the historical profile
    UnusualModuleAccess,
    /// Activity in hours outside the historical profile
    OffHoursAccess,
    /// Explicit policy violation reported by a collaborator
    PolicyViolation,
    /// Collaborator-defined category
    Custom(String),
}

impl fmt::Display for FlagType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlagType::RateAnomaly => f.write_str("RATE_ANOMALY"),
            FlagType::LocationAnomaly => f.write_str("LOCATION_ANOMALY"),
            FlagType::ProbingSequence => f.write_str("PROBING_SEQUENCE"),
            FlagType::UnusualModuleAccess => f.write_str("UNUSUAL_MODULE_ACCESS"),
            FlagType::OffHoursAccess => f.write_str("OFF_HOURS_ACCESS"),
            FlagType::PolicyViolation => f.write_str("POLICY_VIOLATION"),
            FlagType::Custom(name) => write!(f, "CUSTOM:{name}"),
        }
    }
}

/// A raised security concern about one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityFlag {
    /// Flag id
    pub id: SecurityFlagId,
    /// Flagged identity
    pub identity_id: IdentityId,
    /// Category
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    /// Severity
    pub severity: Severity,
    /// When the flag was raised
    pub timestamp: PhysicalTime,
    /// Human-readable description
    pub description: String,
    /// Supporting audit entries
    pub evidence: Vec<AuditEntryId>,
    /// Whether the flag was resolved
    pub resolved: bool,
    /// Who resolved it
    pub resolved_by: Option<String>,
    /// When it was resolved
    pub resolved_at: Option<PhysicalTime>,
}
