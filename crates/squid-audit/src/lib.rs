//! sQuid Audit - audit and security subsystem ("Qerberos")
//!
//! [`AuditService`] owns the append-only, per-identity audit log and layers
//! the security tooling on top of it:
//!
//! - export of an identity's trail as JSON or CSV
//! - access profiles and anomaly detection over a trailing window
//! - the security flag lifecycle, with escalation of HIGH and CRITICAL flags
//! - compliance reports with security-debt gates
//! - correlation of anomalies and flags across identities
//! - retention status and explicit purge
//!
//! Collaborator hooks (`syncWithQindex`, `notifySecurityTeam`) are optional;
//! their failures are queued for retry and never fail the audited action.

pub mod anomaly;
pub mod compliance;
pub mod config;
pub mod correlation;
pub mod error;
pub mod export;
pub mod flags;
pub mod profile;
pub mod repository;
pub mod retention;
mod service;

pub use anomaly::{AnomalyMatch, AnomalyReport};
pub use compliance::{
    ComplianceReport, DsrMetrics, GateCheck, GateResult, PiaRiskCounts, ReportPeriod,
    SecurityDebt, ViolationCounts,
};
pub use config::{AnomalyConfig, AuditConfig, ComplianceGates, DebtWeights, RetentionPolicy};
pub use correlation::{CorrelatedEvents, CrossIdentityPattern};
pub use error::AuditError;
pub use export::ExportFormat;
pub use flags::{FlagFilter, FlagRequest};
pub use profile::AccessProfile;
pub use repository::{KvAuditRepository, MemoryAuditRepository};
pub use retention::RetentionStatus;
pub use service::{ActionRecord, AuditService, FlushReport, LogReceipt, Metadata, WriteStatus};
