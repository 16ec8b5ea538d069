//! Cross-identity correlation
//!
//! Joins anomaly matches and security flags of several identities on
//! pattern signature and time proximity. Flags of one type form a cluster
//! while each lies within `window_ms` of the previous one, so two flags on
//! either side of a round timestamp still correlate.

use crate::error::AuditError;
use crate::flags::FlagFilter;
use crate::service::AuditService;
use serde::{Deserialize, Serialize};
use squid_core::{
    AuditEntryId, FlagType, IdentityId, PhysicalTime, SecurityEvent, SecurityFlag,
    SecurityFlagId, Severity,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// The same anomaly signature seen in several identities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossIdentityPattern {
    /// Shared signature
    pub signature: String,
    /// Pattern kind
    pub pattern: FlagType,
    /// Identities exhibiting it, sorted
    pub identities: Vec<IdentityId>,
    /// Evidence entries across all identities
    pub evidence: Vec<AuditEntryId>,
    /// Highest severity among the matches
    pub max_severity: Severity,
}

/// Flags of one type raised by several identities close together in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrelatedEvents {
    /// Shared flag type
    pub flag_type: FlagType,
    /// Timestamp of the first flag in the cluster
    pub window_start: PhysicalTime,
    /// Timestamp of the last flag in the cluster
    pub window_end: PhysicalTime,
    /// Identities involved, sorted
    pub identities: Vec<IdentityId>,
    /// Flags in the cluster, oldest first
    pub flags: Vec<SecurityFlagId>,
    /// Highest severity in the cluster
    pub max_severity: Severity,
}

impl CorrelatedEvents {
    fn open(flag: &SecurityFlag) -> Self {
        Self {
            flag_type: flag.flag_type.clone(),
            window_start: flag.timestamp,
            window_end: flag.timestamp,
            identities: Vec::new(),
            flags: Vec::new(),
            max_severity: flag.severity,
        }
    }

    fn admits(&self, flag: &SecurityFlag, window_ms: u64) -> bool {
        flag.timestamp.ts_ms.saturating_sub(self.window_end.ts_ms) <= window_ms
    }

    fn add(&mut self, flag: SecurityFlag) {
        if !self.identities.contains(&flag.identity_id) {
            self.identities.push(flag.identity_id);
        }
        self.flags.push(flag.id);
        self.window_end = self.window_end.max(flag.timestamp);
        self.max_severity = self.max_severity.max(flag.severity);
    }
}

impl AuditService {
    /// Scan each identity's trailing window and report signatures shared by two or more of them.
    ///
    /// Every reported pattern is escalated as a coordinated pattern event.
    pub async fn detect_cross_identity_patterns(
        &self,
        identity_ids: &[IdentityId],
        window_ms: u64,
    ) -> Result<Vec<CrossIdentityPattern>, AuditError> {
        let mut groups: BTreeMap<String, CrossIdentityPattern> = BTreeMap::new();
        let unique: BTreeSet<&IdentityId> = identity_ids.iter().collect();

        for identity_id in unique {
            let report = self.scan(identity_id, window_ms).await?;
            for m in report.matches {
                let group = groups
                    .entry(m.signature.clone())
                    .or_insert_with(|| CrossIdentityPattern {
                        signature: m.signature.clone(),
                        pattern: m.pattern.clone(),
                        identities: Vec::new(),
                        evidence: Vec::new(),
                        max_severity: m.severity,
                    });
                if group.identities.last() != Some(identity_id) {
                    group.identities.push(identity_id.clone());
                }
                group.evidence.extend(m.evidence);
                group.max_severity = group.max_severity.max(m.severity);
            }
        }

        let patterns: Vec<_> = groups
            .into_values()
            .filter(|p| p.identities.len() >= 2)
            .collect();
        for pattern in &patterns {
            warn!(
                signature = %pattern.signature,
                identities = pattern.identities.len(),
                "Coordinated pattern across identities"
            );
            self.notify(SecurityEvent::CoordinatedPattern {
                signature: pattern.signature.clone(),
                identities: pattern.identities.clone(),
            })
            .await;
        }
        Ok(patterns)
    }

    /// Cluster flags by type and proximity; report clusters spanning two or more identities.
    ///
    /// A flag joins the current cluster of its type when it was raised at
    /// most `window_ms` after the cluster's latest flag.
    pub async fn correlate_security_events(
        &self,
        window_ms: u64,
    ) -> Result<Vec<CorrelatedEvents>, AuditError> {
        if window_ms == 0 {
            return Err(AuditError::InvalidWindow { window_ms });
        }
        let mut by_type: BTreeMap<FlagType, Vec<SecurityFlag>> = BTreeMap::new();
        for flag in self.get_flags(None, FlagFilter::All).await? {
            by_type.entry(flag.flag_type.clone()).or_default().push(flag);
        }

        let mut clusters = Vec::new();
        for mut flags in by_type.into_values() {
            flags.sort_by_key(|f| f.timestamp);
            let mut current: Option<CorrelatedEvents> = None;
            for flag in flags {
                if !current.as_ref().is_some_and(|c| c.admits(&flag, window_ms)) {
                    clusters.extend(current.take());
                    current = Some(CorrelatedEvents::open(&flag));
                }
                if let Some(cluster) = current.as_mut() {
                    cluster.add(flag);
                }
            }
            clusters.extend(current);
        }

        Ok(clusters
            .into_iter()
            .filter(|c| c.identities.len() >= 2)
            .map(|mut c| {
                c.identities.sort();
                c
            })
            .collect())
    }
}
