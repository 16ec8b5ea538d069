//! Compliance reporting
//!
//! Reports are read-side aggregations over audit entries and security flags;
//! generating one stores nothing.
//!
//! Recognized entry conventions:
//! - `dsr.request` / `dsr.complete` carry a `request_id` metadata value
//! - `pia.assessment` carries a `risk` metadata value (`low` .. `critical`)

use crate::config::{ComplianceGates, DebtWeights};
use crate::error::AuditError;
use crate::flags::FlagFilter;
use crate::service::AuditService;
use serde::{Deserialize, Serialize};
use squid_core::{AuditEntry, AuditOutcome, IdentityId, PhysicalTime, SecurityFlag, Severity};
use std::collections::{BTreeMap, HashMap};
use tracing::info;

/// Action opening a data-subject request.
pub const DSR_REQUEST: &str = "dsr.request";
/// Action closing a data-subject request.
pub const DSR_COMPLETE: &str = "dsr.complete";
/// Action recording a privacy impact assessment.
pub const PIA_ASSESSMENT: &str = "pia.assessment";
/// Metadata key linking DSR entries.
pub const META_REQUEST_ID: &str = "request_id";
/// Metadata key carrying the PIA risk level.
pub const META_RISK: &str = "risk";

/// Inclusive reporting period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportPeriod {
    /// First instant covered
    pub start: PhysicalTime,
    /// Last instant covered
    pub end: PhysicalTime,
}

impl ReportPeriod {
    /// Period `start..=end`.
    pub fn new(start: PhysicalTime, end: PhysicalTime) -> Result<Self, AuditError> {
        if start > end {
            return Err(AuditError::InvalidPeriod {
                start_ms: start.ts_ms,
                end_ms: end.ts_ms,
            });
        }
        Ok(Self { start, end })
    }

    /// The `length_ms` ending at `end`.
    pub fn trailing(end: PhysicalTime, length_ms: u64) -> Self {
        Self {
            start: end.saturating_sub_ms(length_ms),
            end,
        }
    }

    /// Whether `t` falls inside the period.
    pub fn contains(&self, t: PhysicalTime) -> bool {
        self.start <= t && t <= self.end
    }
}

/// Violation counts over the period.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViolationCounts {
    /// DENIED entries
    pub denied: u64,
    /// ERROR entries
    pub errors: u64,
    /// Flags raised in the period, by severity
    pub flags_by_severity: BTreeMap<Severity, u64>,
}

/// Data-subject request completion metrics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsrMetrics {
    /// Requests opened in the period
    pub requested: u64,
    /// Of those, requests with a later completion
    pub completed: u64,
    /// Requests still open
    pub pending: u64,
    /// `completed / requested`, 1.0 when nothing was requested
    pub completion_rate: f64,
    /// Mean request-to-completion time
    pub mean_completion_ms: Option<u64>,
}

/// Privacy impact assessment counts by risk.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PiaRiskCounts {
    /// Assessments in the period
    pub total: u64,
    /// Assessments by risk level
    pub by_risk: BTreeMap<Severity, u64>,
    /// Assessments without a recognizable risk level
    pub unrated: u64,
}

/// Weighted score of unresolved flags.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityDebt {
    /// Unresolved flags by severity
    pub unresolved_by_severity: BTreeMap<Severity, u64>,
    /// Weighted sum
    pub score: u64,
}

impl SecurityDebt {
    /// Debt of the unresolved flags among `flags`.
    pub fn from_flags<'a>(
        flags: impl IntoIterator<Item = &'a SecurityFlag>,
        weights: &DebtWeights,
    ) -> Self {
        let mut debt = Self::default();
        for flag in flags.into_iter().filter(|f| !f.resolved) {
            *debt.unresolved_by_severity.entry(flag.severity).or_default() += 1;
            debt.score += match flag.severity {
                Severity::Critical => weights.critical,
                Severity::High => weights.high,
                Severity::Medium => weights.medium,
                Severity::Low => weights.low,
            };
        }
        debt
    }

    /// Unresolved flags of `severity`.
    pub fn unresolved(&self, severity: Severity) -> u64 {
        self.unresolved_by_severity
            .get(&severity)
            .copied()
            .unwrap_or(0)
    }
}

/// One evaluated gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateCheck {
    /// Gate name
    pub name: String,
    /// Whether it passed
    pub passed: bool,
    /// Explanation
    pub message: String,
}

/// Outcome of every configured gate.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GateResult {
    /// All gates passed
    pub passed: bool,
    /// Individual gates in evaluation order
    pub checks: Vec<GateCheck>,
}

impl GateResult {
    /// Evaluate `gates` against `debt`.
    pub fn evaluate(debt: &SecurityDebt, gates: &ComplianceGates) -> Self {
        let mut checks = Vec::new();

        if gates.fail_on_critical {
            let critical = debt.unresolved(Severity::Critical);
            checks.push(GateCheck {
                name: "critical-flags".into(),
                passed: critical == 0,
                message: format!("unresolved critical flags: {critical}"),
            });
        }

        let high = debt.unresolved(Severity::High);
        checks.push(GateCheck {
            name: "high-flags".into(),
            passed: high <= gates.max_unresolved_high,
            message: format!(
                "unresolved high flags: {high} (max {})",
                gates.max_unresolved_high
            ),
        });

        checks.push(GateCheck {
            name: "security-debt".into(),
            passed: debt.score <= gates.max_total_debt,
            message: format!("debt score {} (max {})", debt.score, gates.max_total_debt),
        });

        Self {
            passed: checks.iter().all(|c| c.passed),
            checks,
        }
    }

    /// Gates that failed.
    pub fn failures(&self) -> impl Iterator<Item = &GateCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }
}

/// Compliance summary of one identity over a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplianceReport {
    /// Reported identity
    pub identity_id: IdentityId,
    /// Covered period
    pub period: ReportPeriod,
    /// When the report was produced
    pub generated_at: PhysicalTime,
    /// Entries in the period
    pub total_entries: u64,
    /// Violation counts
    pub violations: ViolationCounts,
    /// DSR completion
    pub dsr: DsrMetrics,
    /// PIA risk counts
    pub pia: PiaRiskCounts,
    /// Debt of flags raised up to the end of the period
    pub debt: SecurityDebt,
    /// Gate evaluation
    pub gates: GateResult,
}

/// Aggregate `entries` and `flags` of one identity.
pub fn build_report(
    identity_id: &IdentityId,
    period: ReportPeriod,
    entries: &[AuditEntry],
    flags: &[SecurityFlag],
    gates: &ComplianceGates,
    generated_at: PhysicalTime,
) -> ComplianceReport {
    let in_period: Vec<&AuditEntry> = entries
        .iter()
        .filter(|e| period.contains(e.timestamp))
        .collect();

    let mut violations = ViolationCounts::default();
    for entry in &in_period {
        match entry.outcome {
            AuditOutcome::Denied => violations.denied += 1,
            AuditOutcome::Error => violations.errors += 1,
            AuditOutcome::Allowed => {}
        }
    }
    for flag in flags.iter().filter(|f| period.contains(f.timestamp)) {
        *violations.flags_by_severity.entry(flag.severity).or_default() += 1;
    }

    let debt = SecurityDebt::from_flags(
        flags.iter().filter(|f| f.timestamp <= period.end),
        &gates.weights,
    );
    let gates = GateResult::evaluate(&debt, gates);

    ComplianceReport {
        identity_id: identity_id.clone(),
        period,
        generated_at,
        total_entries: in_period.len() as u64,
        violations,
        dsr: dsr_metrics(&in_period, entries),
        pia: pia_counts(&in_period),
        debt,
        gates,
    }
}

fn request_id(entry: &AuditEntry) -> Option<&str> {
    entry.metadata.get(META_REQUEST_ID).and_then(|v| v.as_str())
}

/// Requests opened in the period, completed by any later entry.
fn dsr_metrics(in_period: &[&AuditEntry], all: &[AuditEntry]) -> DsrMetrics {
    let completions: HashMap<&str, PhysicalTime> = all
        .iter()
        .filter(|e| e.action == DSR_COMPLETE)
        .filter_map(|e| request_id(e).map(|id| (id, e.timestamp)))
        .collect();

    let mut metrics = DsrMetrics::default();
    let mut durations = Vec::new();
    for request in in_period.iter().filter(|e| e.action == DSR_REQUEST) {
        metrics.requested += 1;
        let done = request_id(request)
            .and_then(|id| completions.get(id))
            .filter(|done| **done >= request.timestamp);
        match done {
            Some(done) => {
                metrics.completed += 1;
                durations.push(done.millis_since(request.timestamp));
            }
            None => metrics.pending += 1,
        }
    }

    metrics.completion_rate = if metrics.requested == 0 {
        1.0
    } else {
        metrics.completed as f64 / metrics.requested as f64
    };
    if !durations.is_empty() {
        metrics.mean_completion_ms = Some(durations.iter().sum::<u64>() / durations.len() as u64);
    }
    metrics
}

fn parse_risk(raw: &str) -> Option<Severity> {
    match raw.to_ascii_lowercase().as_str() {
        "low" => Some(Severity::Low),
        "medium" => Some(Severity::Medium),
        "high" => Some(Severity::High),
        "critical" => Some(Severity::Critical),
        _ => None,
    }
}

fn pia_counts(in_period: &[&AuditEntry]) -> PiaRiskCounts {
    let mut counts = PiaRiskCounts::default();
    for entry in in_period.iter().filter(|e| e.action == PIA_ASSESSMENT) {
        counts.total += 1;
        let risk = entry
            .metadata
            .get(META_RISK)
            .and_then(|v| v.as_str())
            .and_then(parse_risk);
        match risk {
            Some(level) => *counts.by_risk.entry(level).or_default() += 1,
            None => counts.unrated += 1,
        }
    }
    counts
}

impl AuditService {
    /// Aggregate violations, DSR, PIA and security debt for `identity_id` over `period`.
    pub async fn generate_compliance_report(
        &self,
        identity_id: &IdentityId,
        period: ReportPeriod,
    ) -> Result<ComplianceReport, AuditError> {
        let entries = self.entries(identity_id).await?;
        let flags = self.get_flags(Some(identity_id), FlagFilter::All).await?;
        let report = build_report(
            identity_id,
            period,
            &entries,
            &flags,
            &self.config.gates,
            self.now().await?,
        );
        info!(
            identity_id = %identity_id,
            entries = report.total_entries,
            denied = report.violations.denied,
            debt = report.debt.score,
            passed = report.gates.passed,
            "Compliance report generated"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squid_core::{AuditEntryId, FlagType, SecurityFlagId};

    fn id() -> IdentityId {
        IdentityId::new("did:squid:a")
    }

    fn entry(action: &str, outcome: AuditOutcome, ts: u64, meta: &[(&str, &str)]) -> AuditEntry {
        AuditEntry {
            id: AuditEntryId::new(),
            identity_id: id(),
            sequence: 0,
            action: action.into(),
            timestamp: PhysicalTime::from_millis(ts),
            outcome,
            metadata: meta
                .iter()
                .map(|(k, v)| ((*k).to_string(), serde_json::Value::from(*v)))
                .collect(),
            correlation_id: None,
            signature: None,
        }
    }

    fn flag(severity: Severity, ts: u64, resolved: bool) -> SecurityFlag {
        SecurityFlag {
            id: SecurityFlagId::new(),
            identity_id: id(),
            flag_type: FlagType::PolicyViolation,
            severity,
            timestamp: PhysicalTime::from_millis(ts),
            description: String::new(),
            evidence: Vec::new(),
            resolved,
            resolved_by: None,
            resolved_at: None,
        }
    }

    fn period(start: u64, end: u64) -> ReportPeriod {
        ReportPeriod::new(PhysicalTime::from_millis(start), PhysicalTime::from_millis(end)).unwrap()
    }

    #[test]
    fn reversed_period_is_rejected() {
        assert!(ReportPeriod::new(PhysicalTime::from_millis(2), PhysicalTime::from_millis(1)).is_err());
    }

    #[test]
    fn counts_violations_inside_period_only() {
        let entries = vec![
            entry("x.y", AuditOutcome::Denied, 5, &[]),
            entry("x.y", AuditOutcome::Denied, 15, &[]),
            entry("x.y", AuditOutcome::Error, 16, &[]),
            entry("x.y", AuditOutcome::Allowed, 17, &[]),
        ];
        let report = build_report(
            &id(),
            period(10, 20),
            &entries,
            &[flag(Severity::Medium, 12, false), flag(Severity::Low, 30, false)],
            &ComplianceGates::default(),
            PhysicalTime::from_millis(40),
        );
        assert_eq!(report.total_entries, 3);
        assert_eq!(report.violations.denied, 1);
        assert_eq!(report.violations.errors, 1);
        assert_eq!(report.violations.flags_by_severity.get(&Severity::Medium), Some(&1));
        assert_eq!(report.violations.flags_by_severity.get(&Severity::Low), None);
        assert!(report.gates.passed);
    }

    #[test]
    fn dsr_completion_and_pia_risk() {
        let entries = vec![
            entry(DSR_REQUEST, AuditOutcome::Allowed, 10, &[(META_REQUEST_ID, "r1")]),
            entry(DSR_REQUEST, AuditOutcome::Allowed, 11, &[(META_REQUEST_ID, "r2")]),
            entry(DSR_COMPLETE, AuditOutcome::Allowed, 110, &[(META_REQUEST_ID, "r1")]),
            entry(PIA_ASSESSMENT, AuditOutcome::Allowed, 12, &[(META_RISK, "HIGH")]),
            entry(PIA_ASSESSMENT, AuditOutcome::Allowed, 13, &[(META_RISK, "unknown")]),
        ];
        let report = build_report(
            &id(),
            period(0, 100),
            &entries,
            &[],
            &ComplianceGates::default(),
            PhysicalTime::from_millis(200),
        );
        assert_eq!(report.dsr.requested, 2);
        assert_eq!(report.dsr.completed, 1);
        assert_eq!(report.dsr.pending, 1);
        assert_eq!(report.dsr.mean_completion_ms, Some(100));
        assert!((report.dsr.completion_rate - 0.5).abs() < f64::EPSILON);
        assert_eq!(report.pia.total, 2);
        assert_eq!(report.pia.by_risk.get(&Severity::High), Some(&1));
        assert_eq!(report.pia.unrated, 1);
    }

    #[test]
    fn unresolved_critical_fails_gates() {
        let flags = [
            flag(Severity::Critical, 1, false),
            flag(Severity::High, 2, true),
            flag(Severity::Low, 3, false),
        ];
        let report = build_report(
            &id(),
            period(0, 10),
            &[],
            &flags,
            &ComplianceGates::default(),
            PhysicalTime::from_millis(10),
        );
        assert_eq!(report.debt.score, 51);
        assert!(!report.gates.passed);
        let failed: Vec<_> = report.gates.failures().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["critical-flags"]);
    }

    #[test]
    fn debt_above_maximum_fails_gates() {
        let flags: Vec<_> = (0..6).map(|i| flag(Severity::High, i, false)).collect();
        let report = build_report(
            &id(),
            period(0, 10),
            &[],
            &flags,
            &ComplianceGates::default(),
            PhysicalTime::from_millis(10),
        );
        let failed: Vec<_> = report.gates.failures().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["high-flags", "security-debt"]);
    }
}
