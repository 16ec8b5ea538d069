//! Access-pattern profiles
//!
//! A profile buckets an identity's entries by module, hour of day and action
//! namespace. Anomaly detection compares the trailing window against the
//! profile of everything before it.

use crate::error::AuditError;
use crate::service::AuditService;
use serde::{Deserialize, Serialize};
use squid_core::{AuditEntry, IdentityId, PhysicalTime};
use std::collections::BTreeMap;

/// Usage profile of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessProfile {
    /// Profiled identity
    pub identity_id: IdentityId,
    /// Number of entries profiled
    pub total: u64,
    /// Entries per recorded module
    pub by_module: BTreeMap<String, u64>,
    /// Entries per UTC hour of day
    pub by_hour: [u64; 24],
    /// Entries per action namespace
    pub by_action_namespace: BTreeMap<String, u64>,
    /// Oldest profiled entry
    pub first_seen: Option<PhysicalTime>,
    /// Newest profiled entry
    pub last_seen: Option<PhysicalTime>,
}

impl AccessProfile {
    /// Profile built from `entries`.
    pub fn from_entries<'a>(
        identity_id: IdentityId,
        entries: impl IntoIterator<Item = &'a AuditEntry>,
    ) -> Self {
        let mut profile = Self {
            identity_id,
            total: 0,
            by_module: BTreeMap::new(),
            by_hour: [0; 24],
            by_action_namespace: BTreeMap::new(),
            first_seen: None,
            last_seen: None,
        };
        for entry in entries {
            profile.total += 1;
            if let Some(module) = entry.module() {
                *profile.by_module.entry(module.to_string()).or_default() += 1;
            }
            profile.by_hour[usize::from(entry.timestamp.hour_of_day())] += 1;
            *profile
                .by_action_namespace
                .entry(entry.action_namespace().to_string())
                .or_default() += 1;
            profile.first_seen = Some(
                profile
                    .first_seen
                    .map_or(entry.timestamp, |t| t.min(entry.timestamp)),
            );
            profile.last_seen = Some(
                profile
                    .last_seen
                    .map_or(entry.timestamp, |t| t.max(entry.timestamp)),
            );
        }
        profile
    }

    /// Share of profiled entries that targeted `module`.
    pub fn module_share(&self, module: &str) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.by_module.get(module).copied().unwrap_or(0) as f64 / self.total as f64
    }

    /// Share of profiled entries recorded during `hour`.
    pub fn hour_share(&self, hour: u8) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.by_hour
            .get(usize::from(hour))
            .copied()
            .unwrap_or(0) as f64
            / self.total as f64
    }

    /// Milliseconds between the first and last profiled entry.
    pub fn span_ms(&self) -> u64 {
        match (self.first_seen, self.last_seen) {
            (Some(first), Some(last)) => last.millis_since(first),
            _ => 0,
        }
    }

    /// Most frequently used module, ties broken by name.
    pub fn dominant_module(&self) -> Option<&str> {
        self.by_module
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(m, _)| m.as_str())
    }
}

impl AuditService {
    /// Bucket every retained entry of `identity_id` by module, hour and namespace.
    pub async fn analyze_access_patterns(
        &self,
        identity_id: &IdentityId,
    ) -> Result<AccessProfile, AuditError> {
        let entries = self.entries(identity_id).await?;
        Ok(AccessProfile::from_entries(identity_id.clone(), &entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squid_core::audit::META_MODULE;
    use squid_core::time::HOUR_MS;
    use squid_core::{AuditEntryId, AuditOutcome};

    fn entry(action: &str, module: Option<&str>, ts: u64) -> AuditEntry {
        let mut metadata = serde_json::Map::new();
        if let Some(m) = module {
            metadata.insert(META_MODULE.into(), m.into());
        }
        AuditEntry {
            id: AuditEntryId::new(),
            identity_id: IdentityId::new("did:squid:a"),
            sequence: 0,
            action: action.into(),
            timestamp: PhysicalTime::from_millis(ts),
            outcome: AuditOutcome::Allowed,
            metadata,
            correlation_id: None,
            signature: None,
        }
    }

    #[test]
    fn buckets_by_module_hour_and_namespace() {
        let entries = vec![
            entry("message.send", Some("qmail"), 9 * HOUR_MS),
            entry("message.read", Some("qmail"), 9 * HOUR_MS + 10),
            entry("financial.transfer", Some("qwallet"), 14 * HOUR_MS),
            entry("login", None, 14 * HOUR_MS + 5),
        ];
        let profile = AccessProfile::from_entries(IdentityId::new("did:squid:a"), &entries);

        assert_eq!(profile.total, 4);
        assert_eq!(profile.by_module["qmail"], 2);
        assert_eq!(profile.by_hour[9], 2);
        assert_eq!(profile.by_hour[14], 2);
        assert_eq!(profile.by_action_namespace["message"], 2);
        assert_eq!(profile.by_action_namespace["login"], 1);
        assert_eq!(profile.dominant_module(), Some("qmail"));
        assert!((profile.module_share("qwallet") - 0.25).abs() < f64::EPSILON);
        assert_eq!(profile.span_ms(), 5 * HOUR_MS + 5);
    }

    #[test]
    fn empty_profile_has_zero_shares() {
        let profile = AccessProfile::from_entries(IdentityId::new("did:squid:a"), &[]);
        assert_eq!(profile.module_share("qmail"), 0.0);
        assert_eq!(profile.hour_share(3), 0.0);
        assert_eq!(profile.first_seen, None);
        assert_eq!(profile.dominant_module(), None);
    }
}
