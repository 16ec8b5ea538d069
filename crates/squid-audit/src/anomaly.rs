//! Anomaly detection over the trailing window of an identity's log
//!
//! Entries inside `[now - window, now]` are compared against everything
//! older. Four patterns are recognized:
//!
//! - rate: the window holds more than `baseline * rate_multiplier` entries
//! - probing: a run of consecutive DENIED outcomes reaches the threshold
//! - unusual module: a module never seen in the history is used
//! - off hours: activity in an hour of day never seen in the history
//!
//! The last two only apply once the history holds
//! `divergence_min_history` entries.

use crate::config::AnomalyConfig;
use crate::error::AuditError;
use crate::flags::FlagRequest;
use crate::profile::AccessProfile;
use crate::service::AuditService;
use serde::{Deserialize, Serialize};
use squid_core::{
    AuditEntry, AuditEntryId, AuditOutcome, FlagType, IdentityId, PhysicalTime, SecurityFlagId,
    Severity,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// One matched pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyMatch {
    /// Pattern kind
    pub pattern: FlagType,
    /// Assessed severity
    pub severity: Severity,
    /// Human-readable description
    pub description: String,
    /// Entries supporting the match
    pub evidence: Vec<AuditEntryId>,
    /// Pattern kind plus dominant action or module, used for correlation
    pub signature: String,
}

impl AnomalyMatch {
    /// Flag request raising this match against `identity_id`.
    pub fn to_flag_request(&self, identity_id: &IdentityId) -> FlagRequest {
        FlagRequest::new(
            identity_id.clone(),
            self.pattern.clone(),
            self.severity,
            self.description.clone(),
        )
        .with_evidence(self.evidence.clone())
    }
}

/// Result of one anomaly scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnomalyReport {
    /// Scanned identity
    pub identity_id: IdentityId,
    /// Window length
    pub window_ms: u64,
    /// Inclusive window start
    pub window_start: PhysicalTime,
    /// Inclusive window end (scan time)
    pub window_end: PhysicalTime,
    /// Entries inside the window
    pub events_in_window: usize,
    /// Expected entries per window
    pub baseline: f64,
    /// Matched patterns
    pub matches: Vec<AnomalyMatch>,
    /// Flags raised for the matches, when auto-flagging is enabled
    pub raised_flags: Vec<SecurityFlagId>,
}

impl AnomalyReport {
    /// True when any pattern matched.
    pub fn is_anomalous(&self) -> bool {
        !self.matches.is_empty()
    }

    /// Highest severity among the matches.
    pub fn highest_severity(&self) -> Option<Severity> {
        self.matches.iter().map(|m| m.severity).max()
    }

    /// Whether a pattern of `kind` matched.
    pub fn has_pattern(&self, kind: &FlagType) -> bool {
        self.matches.iter().any(|m| &m.pattern == kind)
    }
}

/// Scan `entries` (one identity, sequence order) for anomalies in the window ending at `now`.
pub fn detect(
    identity_id: &IdentityId,
    entries: &[AuditEntry],
    now: PhysicalTime,
    window_ms: u64,
    config: &AnomalyConfig,
) -> AnomalyReport {
    let window_start = now.saturating_sub_ms(window_ms);
    let (history, window): (Vec<&AuditEntry>, Vec<&AuditEntry>) = entries
        .iter()
        .filter(|e| e.timestamp <= now)
        .partition(|e| e.timestamp < window_start);

    let baseline = baseline(&history, window_start, window_ms, config);
    let mut matches = Vec::new();
    matches.extend(rate_match(&window, baseline, config));
    matches.extend(probing_match(&window, config));
    if history.len() >= config.divergence_min_history {
        let profile = AccessProfile::from_entries(identity_id.clone(), history.iter().copied());
        matches.extend(unusual_module_matches(&window, &profile));
        matches.extend(off_hours_match(&window, &profile));
    }

    AnomalyReport {
        identity_id: identity_id.clone(),
        window_ms,
        window_start,
        window_end: now,
        events_in_window: window.len(),
        baseline,
        matches,
        raised_flags: Vec::new(),
    }
}

/// Per-window rate of the history, or the configured default without history.
fn baseline(
    history: &[&AuditEntry],
    window_start: PhysicalTime,
    window_ms: u64,
    config: &AnomalyConfig,
) -> f64 {
    let Some(first) = history.first() else {
        return config.default_baseline;
    };
    let span = window_start.millis_since(first.timestamp);
    let windows = (span as f64 / window_ms as f64).max(1.0);
    history.len() as f64 / windows
}

fn rate_match(window: &[&AuditEntry], baseline: f64, config: &AnomalyConfig) -> Option<AnomalyMatch> {
    let count = window.len();
    let threshold = baseline * config.rate_multiplier;
    if count < config.min_events || count as f64 <= threshold {
        return None;
    }
    let severity = if count as f64 > threshold * 2.0 {
        Severity::High
    } else {
        Severity::Medium
    };
    let dominant = dominant_action(window.iter().copied()).unwrap_or_default();
    Some(AnomalyMatch {
        pattern: FlagType::RateAnomaly,
        severity,
        description: format!(
            "{count} actions in window, baseline {baseline:.1} (threshold {threshold:.1})"
        ),
        evidence: window.iter().map(|e| e.id).collect(),
        signature: format!("{}:{dominant}", FlagType::RateAnomaly),
    })
}

fn probing_match(window: &[&AuditEntry], config: &AnomalyConfig) -> Option<AnomalyMatch> {
    let mut longest: &[&AuditEntry] = &[];
    let mut run_start = 0;
    for (i, entry) in window.iter().enumerate() {
        if entry.outcome == AuditOutcome::Denied {
            if i + 1 - run_start > longest.len() {
                longest = &window[run_start..=i];
            }
        } else {
            run_start = i + 1;
        }
    }
    if longest.is_empty() || longest.len() < config.denied_run_threshold {
        return None;
    }
    let severity = if longest.len() >= config.denied_run_threshold * 2 {
        Severity::High
    } else {
        Severity::Medium
    };
    let dominant = dominant_action(longest.iter().copied()).unwrap_or_default();
    Some(AnomalyMatch {
        pattern: FlagType::ProbingSequence,
        severity,
        description: format!("{} consecutive denied actions", longest.len()),
        evidence: longest.iter().map(|e| e.id).collect(),
        signature: format!("{}:{dominant}", FlagType::ProbingSequence),
    })
}

fn unusual_module_matches(window: &[&AuditEntry], profile: &AccessProfile) -> Vec<AnomalyMatch> {
    let mut novel: BTreeMap<&str, Vec<AuditEntryId>> = BTreeMap::new();
    for entry in window {
        if let Some(module) = entry.module() {
            if profile.module_share(module) == 0.0 {
                novel.entry(module).or_default().push(entry.id);
            }
        }
    }
    novel
        .into_iter()
        .map(|(module, evidence)| AnomalyMatch {
            pattern: FlagType::UnusualModuleAccess,
            severity: Severity::Medium,
            description: format!(
                "module {module} accessed {} times, never seen in {} historical actions",
                evidence.len(),
                profile.total
            ),
            evidence,
            signature: format!("{}:{module}", FlagType::UnusualModuleAccess),
        })
        .collect()
}

fn off_hours_match(window: &[&AuditEntry], profile: &AccessProfile) -> Option<AnomalyMatch> {
    let off_hours: Vec<&AuditEntry> = window
        .iter()
        .copied()
        .filter(|e| profile.hour_share(e.timestamp.hour_of_day()) == 0.0)
        .collect();
    if off_hours.is_empty() {
        return None;
    }
    let hours: BTreeSet<u8> = off_hours.iter().map(|e| e.timestamp.hour_of_day()).collect();
    let dominant = dominant_action(off_hours.iter().copied()).unwrap_or_default();
    Some(AnomalyMatch {
        pattern: FlagType::OffHoursAccess,
        severity: Severity::Low,
        description: format!(
            "{} actions during hours {:?} (UTC) with no prior activity",
            off_hours.len(),
            hours
        ),
        evidence: off_hours.iter().map(|e| e.id).collect(),
        signature: format!("{}:{dominant}", FlagType::OffHoursAccess),
    })
}

/// Most frequent action, ties broken by name.
fn dominant_action<'a>(entries: impl Iterator<Item = &'a AuditEntry>) -> Option<String> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in entries {
        *counts.entry(entry.action.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
        .map(|(action, _)| action.to_string())
}

impl AuditService {
    /// Scan the trailing `window_ms` of `identity_id`'s log.
    ///
    /// With `auto_flag` configured every match is raised as a security flag
    /// and the flag ids are listed in the report.
    pub async fn detect_anomalies(
        &self,
        identity_id: &IdentityId,
        window_ms: u64,
    ) -> Result<AnomalyReport, AuditError> {
        let mut report = self.scan(identity_id, window_ms).await?;
        if self.config.anomaly.auto_flag {
            for m in &report.matches {
                let flag = self
                    .flag_security_event(m.to_flag_request(identity_id))
                    .await?;
                report.raised_flags.push(flag.id);
            }
        }
        Ok(report)
    }

    /// Anomaly scan without side effects.
    pub(crate) async fn scan(
        &self,
        identity_id: &IdentityId,
        window_ms: u64,
    ) -> Result<AnomalyReport, AuditError> {
        if window_ms == 0 {
            return Err(AuditError::InvalidWindow { window_ms });
        }
        let now = self.now().await?;
        let entries = self.entries(identity_id).await?;
        let report = detect(identity_id, &entries, now, window_ms, &self.config.anomaly);

        for m in &report.matches {
            warn!(
                identity_id = %identity_id,
                pattern = %m.pattern,
                severity = ?m.severity,
                evidence = m.evidence.len(),
                "Anomaly detected"
            );
        }
        debug!(
            identity_id = %identity_id,
            window_ms,
            events = report.events_in_window,
            baseline = report.baseline,
            "Anomaly scan complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squid_core::audit::META_MODULE;
    use squid_core::time::{DAY_MS, HOUR_MS};

    const WINDOW: u64 = HOUR_MS;

    fn entry(sequence: u64, ts: u64, action: &str, outcome: AuditOutcome, module: &str) -> AuditEntry {
        let mut metadata = serde_json::Map::new();
        metadata.insert(META_MODULE.into(), module.into());
        AuditEntry {
            id: AuditEntryId::new(),
            identity_id: IdentityId::new("did:squid:a"),
            sequence,
            action: action.into(),
            timestamp: PhysicalTime::from_millis(ts),
            outcome,
            metadata,
            correlation_id: None,
            signature: None,
        }
    }

    /// `per_day` allowed qmail entries on each of the `days` days before `now`,
    /// at the same hour of day as the window.
    fn history(days: u64, per_day: u64, now: u64) -> Vec<AuditEntry> {
        let mut out = Vec::new();
        for d in (1..=days).rev() {
            for i in 0..per_day {
                out.push(entry(0, now - 10 - d * DAY_MS + i, "message.send", AuditOutcome::Allowed, "qmail"));
            }
        }
        out
    }

    fn resequence(mut entries: Vec<AuditEntry>) -> Vec<AuditEntry> {
        entries.sort_by_key(|e| e.timestamp);
        for (i, e) in entries.iter_mut().enumerate() {
            e.sequence = i as u64;
        }
        entries
    }

    #[test]
    fn quiet_window_matches_nothing() {
        let now = 100 * WINDOW;
        let mut entries = history(10, 4, now);
        entries.push(entry(0, now - 10, "message.send", AuditOutcome::Allowed, "qmail"));
        let report = detect(
            &IdentityId::new("did:squid:a"),
            &resequence(entries),
            PhysicalTime::from_millis(now),
            WINDOW,
            &AnomalyConfig::default(),
        );
        assert!(!report.is_anomalous());
        assert_eq!(report.events_in_window, 1);
    }

    #[test]
    fn burst_above_baseline_is_a_rate_anomaly() {
        let now = 100 * WINDOW;
        let mut entries = history(10, 2, now);
        for i in 0..30 {
            entries.push(entry(0, now - 1_000 + i, "message.send", AuditOutcome::Allowed, "qmail"));
        }
        let report = detect(
            &IdentityId::new("did:squid:a"),
            &resequence(entries),
            PhysicalTime::from_millis(now),
            WINDOW,
            &AnomalyConfig::default(),
        );
        let rate = report
            .matches
            .iter()
            .find(|m| m.pattern == FlagType::RateAnomaly)
            .unwrap();
        assert_eq!(rate.severity, Severity::High);
        assert_eq!(rate.evidence.len(), 30);
        assert_eq!(rate.signature, "RATE_ANOMALY:message.send");
        assert!(report.baseline < 3.0);
    }

    #[test]
    fn few_events_never_flag_rate() {
        let now = 100 * WINDOW;
        let entries: Vec<_> = (0..5)
            .map(|i| entry(i, now - 100 + i, "x.y", AuditOutcome::Allowed, "qmail"))
            .collect();
        let config = AnomalyConfig {
            default_baseline: 0.5,
            ..AnomalyConfig::default()
        };
        let report = detect(
            &IdentityId::new("did:squid:a"),
            &entries,
            PhysicalTime::from_millis(now),
            WINDOW,
            &config,
        );
        assert!(!report.has_pattern(&FlagType::RateAnomaly));
    }

    #[test]
    fn denied_run_is_probing() {
        let now = 100 * WINDOW;
        let mut entries = vec![entry(0, now - 50, "financial.transfer", AuditOutcome::Denied, "qwallet")];
        entries.push(entry(1, now - 40, "message.send", AuditOutcome::Allowed, "qmail"));
        for i in 0..6 {
            entries.push(entry(2 + i, now - 30 + i, "financial.transfer", AuditOutcome::Denied, "qwallet"));
        }
        let report = detect(
            &IdentityId::new("did:squid:a"),
            &entries,
            PhysicalTime::from_millis(now),
            WINDOW,
            &AnomalyConfig::default(),
        );
        let probing = report
            .matches
            .iter()
            .find(|m| m.pattern == FlagType::ProbingSequence)
            .unwrap();
        assert_eq!(probing.evidence.len(), 6);
        assert_eq!(probing.severity, Severity::Medium);
        assert_eq!(probing.signature, "PROBING_SEQUENCE:financial.transfer");
    }

    #[test]
    fn divergence_needs_enough_history() {
        let now = 100 * WINDOW;
        let mut entries = history(2, 5, now);
        entries.push(entry(0, now - 10, "financial.transfer", AuditOutcome::Allowed, "qwallet"));
        let report = detect(
            &IdentityId::new("did:squid:a"),
            &resequence(entries.clone()),
            PhysicalTime::from_millis(now),
            WINDOW,
            &AnomalyConfig::default(),
        );
        assert!(!report.has_pattern(&FlagType::UnusualModuleAccess));

        let mut entries = history(5, 5, now);
        entries.push(entry(0, now, "financial.transfer", AuditOutcome::Allowed, "qwallet"));
        let report = detect(
            &IdentityId::new("did:squid:a"),
            &resequence(entries),
            PhysicalTime::from_millis(now),
            WINDOW,
            &AnomalyConfig::default(),
        );
        let unusual = report
            .matches
            .iter()
            .find(|m| m.pattern == FlagType::UnusualModuleAccess)
            .unwrap();
        assert_eq!(unusual.signature, "UNUSUAL_MODULE_ACCESS:qwallet");
        assert!(report.has_pattern(&FlagType::OffHoursAccess));
    }
}
