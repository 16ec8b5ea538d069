//! Audit subsystem configuration

use serde::{Deserialize, Serialize};
use squid_core::time::DAY_MS;
use squid_core::ConfigValidation;

/// Thresholds for anomaly detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Window count must exceed `baseline * rate_multiplier` to flag
    pub rate_multiplier: f64,
    /// Per-window baseline used when an identity has no history
    pub default_baseline: f64,
    /// Fewer events than this in the window never flag a rate anomaly
    pub min_events: usize,
    /// Consecutive DENIED outcomes that count as probing
    pub denied_run_threshold: usize,
    /// Historical entries needed before profile divergence is checked
    pub divergence_min_history: usize,
    /// Raise security flags for every match
    pub auto_flag: bool,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        Self {
            rate_multiplier: 3.0,
            default_baseline: 20.0,
            min_events: 10,
            denied_run_threshold: 5,
            divergence_min_history: 20,
            auto_flag: false,
        }
    }
}

/// How long audit entries are retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Entries older than this are eligible for purge
    pub horizon_ms: u64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            horizon_ms: 365 * DAY_MS,
        }
    }
}

/// Security-debt weights per unresolved flag severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebtWeights {
    /// Weight of a CRITICAL flag
    pub critical: u64,
    /// Weight of a HIGH flag
    pub high: u64,
    /// Weight of a MEDIUM flag
    pub medium: u64,
    /// Weight of a LOW flag
    pub low: u64,
}

impl Default for DebtWeights {
    fn default() -> Self {
        Self {
            critical: 50,
            high: 20,
            medium: 5,
            low: 1,
        }
    }
}

/// Pass/fail gates applied to compliance reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceGates {
    /// Any unresolved CRITICAL flag fails the report
    pub fail_on_critical: bool,
    /// More unresolved HIGH flags than this fails the report
    pub max_unresolved_high: u64,
    /// Debt score above this fails the report
    pub max_total_debt: u64,
    /// Debt weights
    pub weights: DebtWeights,
}

impl Default for ComplianceGates {
    fn default() -> Self {
        Self {
            fail_on_critical: true,
            max_unresolved_high: 5,
            max_total_debt: 100,
            weights: DebtWeights::default(),
        }
    }
}

/// Audit subsystem settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Anomaly thresholds
    pub anomaly: AnomalyConfig,
    /// Retention horizon
    pub retention: RetentionPolicy,
    /// Compliance gates
    pub gates: ComplianceGates,
    /// Upper bound on writes held for retry while storage is unavailable
    pub max_pending: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            anomaly: AnomalyConfig::default(),
            retention: RetentionPolicy::default(),
            gates: ComplianceGates::default(),
            max_pending: 1024,
        }
    }
}

impl ConfigValidation for AuditConfig {
    fn validate(&self) -> Result<(), String> {
        let anomaly = &self.anomaly;
        if !(anomaly.rate_multiplier.is_finite() && anomaly.rate_multiplier >= 1.0) {
            return Err(format!(
                "audit.anomaly.rate_multiplier must be >= 1.0, got {}",
                anomaly.rate_multiplier
            ));
        }
        if !(anomaly.default_baseline.is_finite() && anomaly.default_baseline > 0.0) {
            return Err("audit.anomaly.default_baseline must be positive".into());
        }
        if anomaly.denied_run_threshold == 0 {
            return Err("audit.anomaly.denied_run_threshold must be at least 1".into());
        }
        if self.retention.horizon_ms == 0 {
            return Err("audit.retention.horizon_ms must be positive".into());
        }
        if self.max_pending == 0 {
            return Err("audit.max_pending must be at least 1".into());
        }
        Ok(())
    }
}
