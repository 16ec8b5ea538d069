//! Security flag lifecycle

use crate::error::AuditError;
use crate::service::{AuditService, PendingWork};
use squid_core::{
    AuditEntryId, FlagType, IdentityId, SecurityEvent, SecurityFlag, SecurityFlagId, Severity,
    StorageError,
};
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Request to raise a security flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagRequest {
    /// Flagged identity
    pub identity_id: IdentityId,
    /// Category
    pub flag_type: FlagType,
    /// Severity
    pub severity: Severity,
    /// Human-readable description
    pub description: String,
    /// Supporting audit entries
    pub evidence: Vec<AuditEntryId>,
}

impl FlagRequest {
    /// Request without evidence.
    pub fn new(
        identity_id: IdentityId,
        flag_type: FlagType,
        severity: Severity,
        description: impl Into<String>,
    ) -> Self {
        Self {
            identity_id,
            flag_type,
            severity,
            description: description.into(),
            evidence: Vec::new(),
        }
    }

    /// Attach evidence entries.
    pub fn with_evidence(mut self, evidence: Vec<AuditEntryId>) -> Self {
        self.evidence = evidence;
        self
    }
}

/// Which flags to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlagFilter {
    /// Every flag
    #[default]
    All,
    /// Only flags still open
    Unresolved,
}

impl AuditService {
    /// Raise a security flag.
    ///
    /// HIGH and CRITICAL flags are escalated through the security notifier.
    /// A transient storage failure queues the flag; it stays visible to
    /// [`AuditService::get_flags`] until flushed.
    pub async fn flag_security_event(
        &self,
        request: FlagRequest,
    ) -> Result<SecurityFlag, AuditError> {
        let flag = SecurityFlag {
            id: SecurityFlagId::new(),
            identity_id: request.identity_id,
            flag_type: request.flag_type,
            severity: request.severity,
            timestamp: self.now().await?,
            description: request.description,
            evidence: request.evidence,
            resolved: false,
            resolved_by: None,
            resolved_at: None,
        };
        self.persist_flag(&flag).await?;
        info!(
            flag_id = %flag.id,
            identity_id = %flag.identity_id,
            flag_type = %flag.flag_type,
            severity = ?flag.severity,
            "Security flag raised"
        );

        if flag.severity.requires_escalation() {
            self.notify(SecurityEvent::FlagRaised { flag: flag.clone() })
                .await;
        }
        Ok(flag)
    }

    /// Mark a flag resolved.
    pub async fn resolve_security_flag(
        &self,
        flag_id: &SecurityFlagId,
        resolved_by: &str,
    ) -> Result<SecurityFlag, AuditError> {
        let mut flag = match self.take_pending_flag(flag_id) {
            Some(flag) => flag,
            None => self
                .repo
                .get_flag(flag_id)
                .await?
                .ok_or(AuditError::FlagNotFound(*flag_id))?,
        };
        if flag.resolved {
            return Err(AuditError::AlreadyResolved(*flag_id));
        }

        flag.resolved = true;
        flag.resolved_by = Some(resolved_by.to_string());
        flag.resolved_at = Some(self.now().await?);
        self.persist_flag(&flag).await?;
        info!(
            flag_id = %flag.id,
            identity_id = %flag.identity_id,
            resolved_by,
            "Security flag resolved"
        );
        Ok(flag)
    }

    /// Flags of one identity, or of every identity, oldest first.
    pub async fn get_flags(
        &self,
        identity_id: Option<&IdentityId>,
        filter: FlagFilter,
    ) -> Result<Vec<SecurityFlag>, AuditError> {
        let stored = match self.repo.flags(identity_id).await {
            Ok(flags) => flags,
            Err(StorageError::Unavailable { reason }) => {
                warn!(reason = %reason, "Reading queued flags only");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let mut merged: BTreeMap<SecurityFlagId, SecurityFlag> =
            stored.into_iter().map(|f| (f.id, f)).collect();
        for flag in self.pending_flags() {
            if identity_id.map_or(true, |id| &flag.identity_id == id) {
                merged.insert(flag.id, flag);
            }
        }

        let mut flags: Vec<_> = merged
            .into_values()
            .filter(|f| filter == FlagFilter::All || !f.resolved)
            .collect();
        flags.sort_by_key(|f| (f.timestamp, f.id));
        Ok(flags)
    }

    async fn persist_flag(&self, flag: &SecurityFlag) -> Result<(), AuditError> {
        match self.repo.put_flag(flag).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_transient() => {
                warn!(flag_id = %flag.id, error = %e, "Flag storage degraded, queueing");
                self.enqueue(PendingWork::Flag(flag.clone()));
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
