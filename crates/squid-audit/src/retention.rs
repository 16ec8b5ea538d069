//! Retention status and explicit purge

use crate::error::AuditError;
use crate::service::AuditService;
use serde::{Deserialize, Serialize};
use squid_core::{IdentityId, PhysicalTime};
use tracing::info;

/// Age of an identity's log against the retention horizon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionStatus {
    /// Inspected identity
    pub identity_id: IdentityId,
    /// Configured horizon
    pub horizon_ms: u64,
    /// Retained entries
    pub total_entries: usize,
    /// Timestamp of the oldest retained entry
    pub oldest_entry: Option<PhysicalTime>,
    /// Age of the oldest retained entry
    pub oldest_age_ms: Option<u64>,
    /// Entries older than the horizon
    pub eligible_for_purge: usize,
    /// Entries at or after this instant are kept by a purge
    pub cutoff: PhysicalTime,
}

impl RetentionStatus {
    /// True when some entry has outlived the horizon.
    pub fn is_over_horizon(&self) -> bool {
        self.eligible_for_purge > 0
    }
}

impl AuditService {
    /// Report the oldest retained entry of `identity_id` against the horizon.
    pub async fn get_data_retention_status(
        &self,
        identity_id: &IdentityId,
    ) -> Result<RetentionStatus, AuditError> {
        let now = self.now().await?;
        let horizon_ms = self.config.retention.horizon_ms;
        let cutoff = now.saturating_sub_ms(horizon_ms);
        let entries = self.entries(identity_id).await?;
        let oldest_entry = entries.iter().map(|e| e.timestamp).min();

        Ok(RetentionStatus {
            identity_id: identity_id.clone(),
            horizon_ms,
            total_entries: entries.len(),
            oldest_entry,
            oldest_age_ms: oldest_entry.map(|t| now.millis_since(t)),
            eligible_for_purge: entries.iter().filter(|e| e.timestamp < cutoff).count(),
            cutoff,
        })
    }

    /// Delete entries of `identity_id` older than the horizon; returns the count removed.
    ///
    /// Never runs on its own; callers export first when the trail must be kept.
    pub async fn purge_expired(&self, identity_id: &IdentityId) -> Result<usize, AuditError> {
        let cutoff = self
            .now()
            .await?
            .saturating_sub_ms(self.config.retention.horizon_ms);
        let purged = self.repo.purge_before(identity_id, cutoff).await?;
        info!(
            identity_id = %identity_id,
            purged,
            cutoff_ms = cutoff.ts_ms,
            "Expired audit entries purged"
        );
        Ok(purged)
    }
}
