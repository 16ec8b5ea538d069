//! Append-only audit log
//!
//! [`AuditService`] assigns each entry a per-identity sequence number and a
//! timestamp that never goes backwards for that identity, signs it when a
//! signer is configured, and appends it through the injected repository.
//!
//! When storage is unavailable the entry is kept in a bounded in-memory
//! queue and the caller still receives an id ([`WriteStatus::Queued`]).
//! Queued entries stay visible to reads and are retried in order by
//! [`AuditService::flush_pending`]. An identity whose stored tail could not
//! be read gets provisional sequence numbers; they are rebased onto the
//! stored tail before any of its queued entries is appended. Collaborator hook failures (index sync,
//! security notifier) are queued the same way and never fail the caller.

use crate::config::AuditConfig;
use crate::error::AuditError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use squid_core::audit::{META_MODULE, META_REASON};
use squid_core::{
    AuditEntry, AuditEntryId, AuditOutcome, AuditRepository, AuditSigner, CorrelationId,
    IdentityId, IndexSync, PhysicalTime, PhysicalTimeEffects, SecurityEvent, SecurityFlag,
    SecurityFlagId, SecurityNotifier, StorageError,
};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Free-form entry metadata.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// Whether a write reached the repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteStatus {
    /// Appended to the repository
    Persisted,
    /// Held in memory for retry (service degraded)
    Queued,
}

/// Result of logging one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogReceipt {
    /// Id of the new entry
    pub entry_id: AuditEntryId,
    /// Per-identity sequence number
    pub sequence: u64,
    /// Where the entry currently lives
    pub status: WriteStatus,
}

/// One audit write request.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRecord {
    /// Subject identity
    pub identity_id: IdentityId,
    /// `namespace.verb` action
    pub action: String,
    /// Outcome
    pub outcome: AuditOutcome,
    /// Free-form metadata
    pub metadata: Metadata,
    /// Links entries of one logical operation
    pub correlation_id: Option<CorrelationId>,
}

impl ActionRecord {
    /// Record with empty metadata.
    pub fn new(identity_id: IdentityId, action: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            identity_id,
            action: action.into(),
            outcome,
            metadata: Metadata::new(),
            correlation_id: None,
        }
    }

    /// Attach a metadata value.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Record the targeted module.
    pub fn with_module(self, module: impl Into<String>) -> Self {
        self.with_meta(META_MODULE, module.into())
    }

    /// Record the decision reason.
    pub fn with_reason(self, reason: impl Into<String>) -> Self {
        self.with_meta(META_REASON, reason.into())
    }

    /// Link to a correlation group.
    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Replace all metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Work waiting for a collaborator or storage to come back.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum PendingWork {
    Entry(AuditEntry),
    Flag(SecurityFlag),
    IndexSync(IdentityId),
    Notify(SecurityEvent),
}

/// Outcome of a retry pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlushReport {
    /// Items delivered during this pass
    pub delivered: usize,
    /// Items still waiting
    pub remaining: usize,
    /// Items abandoned after a permanent storage error
    pub dropped: usize,
}

enum Delivery {
    Delivered,
    Dropped,
}

#[derive(Debug, Clone, Copy)]
struct Cursor {
    next_sequence: u64,
    last_timestamp: PhysicalTime,
    /// Whether `next_sequence` continues the stored log.
    confirmed: bool,
}

#[derive(Debug, Default)]
struct LogState {
    cursors: HashMap<IdentityId, Cursor>,
    pending: VecDeque<PendingWork>,
}

/// Audit and security subsystem ("Qerberos").
pub struct AuditService {
    pub(crate) repo: Arc<dyn AuditRepository>,
    pub(crate) time: Arc<dyn PhysicalTimeEffects>,
    pub(crate) config: AuditConfig,
    signer: Option<Arc<dyn AuditSigner>>,
    index: Option<Arc<dyn IndexSync>>,
    notifier: Option<Arc<dyn SecurityNotifier>>,
    state: Mutex<LogState>,
}

impl AuditService {
    /// Service over a repository and clock, with no collaborators attached.
    pub fn new(
        repo: Arc<dyn AuditRepository>,
        time: Arc<dyn PhysicalTimeEffects>,
        config: AuditConfig,
    ) -> Self {
        Self {
            repo,
            time,
            config,
            signer: None,
            index: None,
            notifier: None,
            state: Mutex::new(LogState::default()),
        }
    }

    /// Sign every new entry.
    pub fn with_signer(mut self, signer: Arc<dyn AuditSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Call `syncWithQindex` after every append.
    pub fn with_index_sync(mut self, index: Arc<dyn IndexSync>) -> Self {
        self.index = Some(index);
        self
    }

    /// Escalate HIGH and CRITICAL flags.
    pub fn with_notifier(mut self, notifier: Arc<dyn SecurityNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub(crate) async fn now(&self) -> Result<PhysicalTime, AuditError> {
        Ok(self.time.physical_time().await?)
    }

    /// Log an ALLOWED action.
    pub async fn log_action(
        &self,
        identity_id: &IdentityId,
        action: &str,
        metadata: Metadata,
    ) -> Result<LogReceipt, AuditError> {
        self.record(
            ActionRecord::new(identity_id.clone(), action, AuditOutcome::Allowed)
                .with_metadata(metadata),
        )
        .await
    }

    /// Append one entry.
    pub async fn record(&self, record: ActionRecord) -> Result<LogReceipt, AuditError> {
        let now = self.now().await?;
        self.resolve_cursor(&record.identity_id).await?;

        let (mut entry, confirmed) = {
            let mut state = self.state.lock();
            let cursor = state
                .cursors
                .entry(record.identity_id.clone())
                .or_insert(Cursor {
                    next_sequence: 0,
                    last_timestamp: PhysicalTime::default(),
                    confirmed: false,
                });
            let sequence = cursor.next_sequence;
            let timestamp = now.max(cursor.last_timestamp);
            cursor.next_sequence += 1;
            cursor.last_timestamp = timestamp;
            let entry = AuditEntry {
                id: AuditEntryId::new(),
                identity_id: record.identity_id,
                sequence,
                action: record.action,
                timestamp,
                outcome: record.outcome,
                metadata: record.metadata,
                correlation_id: record.correlation_id,
                signature: None,
            };
            (entry, cursor.confirmed)
        };
        self.sign(&mut entry);

        let receipt = LogReceipt {
            entry_id: entry.id,
            sequence: entry.sequence,
            status: WriteStatus::Persisted,
        };
        if !confirmed {
            warn!(
                identity_id = %entry.identity_id,
                provisional_sequence = entry.sequence,
                "Stored audit tail unknown, queueing entry"
            );
            self.enqueue(PendingWork::Entry(entry));
            return Ok(LogReceipt {
                status: WriteStatus::Queued,
                ..receipt
            });
        }
        match self.repo.append(&entry).await {
            Ok(()) => {
                debug!(
                    identity_id = %entry.identity_id,
                    action = %entry.action,
                    outcome = %entry.outcome,
                    sequence = entry.sequence,
                    "Audit entry appended"
                );
                self.sync_index(&entry.identity_id).await;
                Ok(receipt)
            }
            Err(e) if e.is_transient() => {
                warn!(
                    identity_id = %entry.identity_id,
                    sequence = entry.sequence,
                    error = %e,
                    "Audit storage degraded, queueing entry"
                );
                self.enqueue(PendingWork::Entry(entry));
                Ok(LogReceipt {
                    status: WriteStatus::Queued,
                    ..receipt
                })
            }
            Err(e) => {
                // The sequence stays consumed; later entries never reuse it.
                error!(identity_id = %entry.identity_id, error = %e, "Audit append failed");
                Err(e.into())
            }
        }
    }

    /// Load the stored tail of `identity_id` unless it is already known.
    ///
    /// Returns `false` while storage is unavailable. Once the tail loads,
    /// queued entries numbered provisionally are shifted past it, their
    /// timestamps raised to the stored last timestamp and re-signed.
    async fn resolve_cursor(&self, identity_id: &IdentityId) -> Result<bool, AuditError> {
        if self.cursor_confirmed(identity_id) {
            return Ok(true);
        }
        let (base, floor) = match self.repo.entries(identity_id).await {
            Ok(entries) => entries
                .last()
                .map_or((0, PhysicalTime::default()), |last| {
                    (last.sequence + 1, last.timestamp)
                }),
            Err(e) if e.is_transient() => return Ok(false),
            Err(e) => return Err(e.into()),
        };

        let mut state = self.state.lock();
        let LogState { cursors, pending } = &mut *state;
        match cursors.get_mut(identity_id) {
            Some(cursor) if cursor.confirmed => {}
            Some(cursor) => {
                let mut rebased = 0;
                for work in pending.iter_mut() {
                    if let PendingWork::Entry(entry) = work {
                        if &entry.identity_id == identity_id {
                            entry.sequence += base;
                            entry.timestamp = entry.timestamp.max(floor);
                            self.sign(entry);
                            rebased += 1;
                        }
                    }
                }
                cursor.next_sequence += base;
                cursor.last_timestamp = cursor.last_timestamp.max(floor);
                cursor.confirmed = true;
                if rebased > 0 {
                    info!(
                        identity_id = %identity_id,
                        rebased,
                        base,
                        "Rebased queued audit entries onto stored log"
                    );
                }
            }
            None => {
                cursors.insert(
                    identity_id.clone(),
                    Cursor {
                        next_sequence: base,
                        last_timestamp: floor,
                        confirmed: true,
                    },
                );
            }
        }
        Ok(true)
    }

    fn cursor_confirmed(&self, identity_id: &IdentityId) -> bool {
        self.state
            .lock()
            .cursors
            .get(identity_id)
            .is_some_and(|c| c.confirmed)
    }

    fn sign(&self, entry: &mut AuditEntry) {
        let Some(signer) = &self.signer else {
            return;
        };
        let signed = entry
            .signing_bytes()
            .map_err(|e| e.to_string())
            .and_then(|bytes| signer.sign(&bytes).map_err(|e| e.to_string()));
        match signed {
            Ok(signature) => entry.signature = Some(hex::encode(signature)),
            Err(reason) => warn!(
                identity_id = %entry.identity_id,
                sequence = entry.sequence,
                reason = %reason,
                "Audit entry left unsigned"
            ),
        }
    }

    /// Check an entry's signature against the configured signer.
    ///
    /// Unsigned entries, undecodable signatures and a missing signer all
    /// verify as `false`.
    pub fn verify_entry(&self, entry: &AuditEntry) -> bool {
        let (Some(signer), Some(signature)) = (&self.signer, &entry.signature) else {
            return false;
        };
        let Ok(signature) = hex::decode(signature) else {
            return false;
        };
        match entry.signing_bytes() {
            Ok(bytes) => signer.verify(&bytes, &signature),
            Err(_) => false,
        }
    }

    async fn sync_index(&self, identity_id: &IdentityId) {
        let Some(index) = &self.index else {
            return;
        };
        if let Err(e) = index.sync_with_qindex(identity_id).await {
            warn!(identity_id = %identity_id, error = %e, "Index sync failed, queueing");
            self.enqueue(PendingWork::IndexSync(identity_id.clone()));
        }
    }

    pub(crate) async fn notify(&self, event: SecurityEvent) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if let Err(e) = notifier.notify_security_team(&event).await {
            warn!(error = %e, "Security notification failed, queueing");
            self.enqueue(PendingWork::Notify(event));
        }
    }

    pub(crate) fn enqueue(&self, work: PendingWork) {
        let mut state = self.state.lock();
        if state.pending.len() >= self.config.max_pending {
            if let Some(dropped) = state.pending.pop_front() {
                error!(dropped = ?dropped, "Audit retry queue full, dropping oldest item");
            }
        }
        state.pending.push_back(work);
    }

    /// Number of writes and hook calls waiting for retry.
    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Retry queued work in order, stopping at the first item that still fails.
    pub async fn flush_pending(&self) -> FlushReport {
        let mut delivered = 0;
        let mut dropped = 0;
        loop {
            let front = match self.state.lock().pending.front() {
                Some(PendingWork::Entry(entry)) => Some(Some(entry.identity_id.clone())),
                Some(_) => Some(None),
                None => None,
            };
            let Some(entry_owner) = front else {
                break;
            };
            if let Some(identity_id) = entry_owner {
                match self.resolve_cursor(&identity_id).await {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(identity_id = %identity_id, "Retry pass stopped, stored tail unknown");
                        break;
                    }
                    Err(e) => {
                        error!(identity_id = %identity_id, error = %e, "Retry pass stopped");
                        break;
                    }
                }
            }
            let Some(work) = self.state.lock().pending.pop_front() else {
                break;
            };
            match self.deliver(&work).await {
                Ok(Delivery::Delivered) => delivered += 1,
                Ok(Delivery::Dropped) => dropped += 1,
                Err(reason) => {
                    debug!(reason = %reason, "Retry pass stopped");
                    self.state.lock().pending.push_front(work);
                    break;
                }
            }
        }
        let remaining = self.pending_count();
        if delivered > 0 || dropped > 0 {
            info!(delivered, dropped, remaining, "Flushed queued audit work");
        }
        FlushReport {
            delivered,
            remaining,
            dropped,
        }
    }

    async fn deliver(&self, work: &PendingWork) -> Result<Delivery, String> {
        match work {
            PendingWork::Entry(entry) => {
                match self.repo.append(entry).await {
                    Ok(()) => {}
                    Err(e) if e.is_transient() => return Err(e.to_string()),
                    Err(e) => {
                        error!(
                            identity_id = %entry.identity_id,
                            sequence = entry.sequence,
                            error = %e,
                            "Dropping queued audit entry"
                        );
                        return Ok(Delivery::Dropped);
                    }
                }
                if let Some(index) = &self.index {
                    if index.sync_with_qindex(&entry.identity_id).await.is_err() {
                        self.enqueue(PendingWork::IndexSync(entry.identity_id.clone()));
                    }
                }
                Ok(Delivery::Delivered)
            }
            PendingWork::Flag(flag) => self
                .repo
                .put_flag(flag)
                .await
                .map(|()| Delivery::Delivered)
                .map_err(|e| e.to_string()),
            PendingWork::IndexSync(id) => match &self.index {
                Some(index) => index
                    .sync_with_qindex(id)
                    .await
                    .map(|()| Delivery::Delivered)
                    .map_err(|e| e.to_string()),
                None => Ok(Delivery::Delivered),
            },
            PendingWork::Notify(event) => match &self.notifier {
                Some(n) => n
                    .notify_security_team(event)
                    .await
                    .map(|()| Delivery::Delivered)
                    .map_err(|e| e.to_string()),
                None => Ok(Delivery::Delivered),
            },
        }
    }

    fn pending_entries(&self, identity_id: &IdentityId) -> Vec<AuditEntry> {
        self.state
            .lock()
            .pending
            .iter()
            .filter_map(|w| match w {
                PendingWork::Entry(e) if &e.identity_id == identity_id => Some(e.clone()),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn pending_flags(&self) -> Vec<SecurityFlag> {
        self.state
            .lock()
            .pending
            .iter()
            .filter_map(|w| match w {
                PendingWork::Flag(f) => Some(f.clone()),
                _ => None,
            })
            .collect()
    }

    /// Remove a queued flag write so it can be replaced.
    pub(crate) fn take_pending_flag(&self, id: &SecurityFlagId) -> Option<SecurityFlag> {
        let mut state = self.state.lock();
        let pos = state
            .pending
            .iter()
            .position(|w| matches!(w, PendingWork::Flag(f) if &f.id == id))?;
        match state.pending.remove(pos) {
            Some(PendingWork::Flag(flag)) => Some(flag),
            _ => None,
        }
    }

    /// Every retained entry of `identity_id`, including queued ones, in sequence order.
    pub async fn entries(&self, identity_id: &IdentityId) -> Result<Vec<AuditEntry>, AuditError> {
        // Provisional numbers would collide with stored ones.
        self.resolve_cursor(identity_id).await?;
        let mut entries = match self.repo.entries(identity_id).await {
            Ok(entries) => entries,
            Err(StorageError::Unavailable { reason }) => {
                warn!(identity_id = %identity_id, reason = %reason, "Reading queued entries only");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        let queued = self.pending_entries(identity_id);
        if !queued.is_empty() {
            entries.extend(queued);
            entries.sort_by_key(|e| e.sequence);
            entries.dedup_by_key(|e| e.sequence);
        }
        Ok(entries)
    }

    /// Most recent entries of `identity_id`, oldest first, at most `limit` of them.
    pub async fn get_audit_log(
        &self,
        identity_id: &IdentityId,
        limit: Option<usize>,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let mut entries = self.entries(identity_id).await?;
        if let Some(limit) = limit {
            let skip = entries.len().saturating_sub(limit);
            entries.drain(..skip);
        }
        Ok(entries)
    }

    /// Entries of `identity_id` with `start <= timestamp <= end`.
    pub async fn get_audit_trail(
        &self,
        identity_id: &IdentityId,
        start: Option<PhysicalTime>,
        end: Option<PhysicalTime>,
    ) -> Result<Vec<AuditEntry>, AuditError> {
        let entries = self.entries(identity_id).await?;
        Ok(entries
            .into_iter()
            .filter(|e| start.map_or(true, |s| e.timestamp >= s))
            .filter(|e| end.map_or(true, |t| e.timestamp <= t))
            .collect())
    }
}

impl std::fmt::Debug for AuditService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditService")
            .field("config", &self.config)
            .field("signed", &self.signer.is_some())
            .field("pending", &self.pending_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{KvAuditRepository, MemoryAuditRepository};
    use squid_testkit::{ControllableClock, FlakyKvStore, KeyedBlake3Signer, RecordingIndexSync};

    fn id(s: &str) -> IdentityId {
        IdentityId::new(format!("did:squid:{s}"))
    }

    #[tokio::test]
    async fn sequences_and_timestamps_are_monotonic_per_identity() {
        let clock = ControllableClock::new(10_000);
        let service = AuditService::new(
            Arc::new(MemoryAuditRepository::new()),
            Arc::new(clock.clone()),
            AuditConfig::default(),
        );
        let a = id("a");

        service.log_action(&a, "message.send", Metadata::new()).await.unwrap();
        clock.set_ms(5_000);
        let second = service.log_action(&a, "message.send", Metadata::new()).await.unwrap();
        assert_eq!(second.sequence, 1);

        let log = service.get_audit_log(&a, None).await.unwrap();
        assert_eq!(log[1].timestamp, PhysicalTime::from_millis(10_000));

        let other = service.log_action(&id("b"), "x.y", Metadata::new()).await.unwrap();
        assert_eq!(other.sequence, 0);
    }

    #[tokio::test]
    async fn cursor_resumes_from_repository() {
        let repo = Arc::new(MemoryAuditRepository::new());
        let clock = Arc::new(ControllableClock::default());
        let a = id("a");
        let first = AuditService::new(repo.clone(), clock.clone(), AuditConfig::default());
        first.log_action(&a, "x.y", Metadata::new()).await.unwrap();
        first.log_action(&a, "x.y", Metadata::new()).await.unwrap();

        let second = AuditService::new(repo, clock, AuditConfig::default());
        let receipt = second.log_action(&a, "x.y", Metadata::new()).await.unwrap();
        assert_eq!(receipt.sequence, 2);
    }

    #[tokio::test]
    async fn degraded_storage_queues_and_flushes_in_order() {
        let kv = Arc::new(FlakyKvStore::new());
        let index = Arc::new(RecordingIndexSync::new());
        let service = AuditService::new(
            Arc::new(KvAuditRepository::new(kv.clone())),
            Arc::new(ControllableClock::default()),
            AuditConfig::default(),
        )
        .with_index_sync(index.clone());
        let a = id("a");

        service.log_action(&a, "first.one", Metadata::new()).await.unwrap();
        kv.go_offline();
        let queued = service.log_action(&a, "second.one", Metadata::new()).await.unwrap();
        assert_eq!(queued.status, WriteStatus::Queued);
        assert_eq!(service.pending_count(), 1);

        // Queued entries remain readable while storage is down.
        let visible = service.get_audit_log(&a, None).await.unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].action, "second.one");

        kv.go_online();
        let report = service.flush_pending().await;
        assert_eq!(report.delivered, 1);
        assert_eq!(report.remaining, 0);

        let actions: Vec<_> = service
            .get_audit_log(&a, None)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["first.one", "second.one"]);
        assert_eq!(index.synced().len(), 2);
    }

    #[tokio::test]
    async fn restart_while_offline_rebases_queued_entries() {
        let kv = Arc::new(FlakyKvStore::new());
        let clock = Arc::new(ControllableClock::new(5_000));
        let a = id("a");
        let before = AuditService::new(
            Arc::new(KvAuditRepository::new(kv.clone())),
            clock.clone(),
            AuditConfig::default(),
        );
        before.log_action(&a, "x.one", Metadata::new()).await.unwrap();
        before.log_action(&a, "x.two", Metadata::new()).await.unwrap();

        let restarted = AuditService::new(
            Arc::new(KvAuditRepository::new(kv.clone())),
            clock.clone(),
            AuditConfig::default(),
        )
        .with_signer(Arc::new(KeyedBlake3Signer::new([3; 32])));
        kv.go_offline();
        clock.set_ms(1_000);
        let queued = restarted.log_action(&a, "x.three", Metadata::new()).await.unwrap();
        assert_eq!(queued.status, WriteStatus::Queued);

        kv.go_online();
        let report = restarted.flush_pending().await;
        assert_eq!(
            report,
            FlushReport {
                delivered: 1,
                remaining: 0,
                dropped: 0
            }
        );

        let next = restarted.log_action(&a, "x.four", Metadata::new()).await.unwrap();
        assert_eq!(next.status, WriteStatus::Persisted);
        assert_eq!(next.sequence, 3);

        let log = restarted.get_audit_log(&a, None).await.unwrap();
        let actions: Vec<_> = log.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, ["x.one", "x.two", "x.three", "x.four"]);
        let sequences: Vec<_> = log.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, [0, 1, 2, 3]);
        assert!(log.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert!(restarted.verify_entry(&log[2]));
    }

    #[tokio::test]
    async fn queued_entries_read_back_after_restart_without_collisions() {
        let kv = Arc::new(FlakyKvStore::new());
        let clock = Arc::new(ControllableClock::default());
        let a = id("a");
        AuditService::new(
            Arc::new(KvAuditRepository::new(kv.clone())),
            clock.clone(),
            AuditConfig::default(),
        )
        .log_action(&a, "x.one", Metadata::new())
        .await
        .unwrap();

        let restarted = AuditService::new(
            Arc::new(KvAuditRepository::new(kv.clone())),
            clock,
            AuditConfig::default(),
        );
        kv.go_offline();
        restarted.log_action(&a, "x.two", Metadata::new()).await.unwrap();
        kv.go_online();

        // Reading before the retry pass still shows both entries.
        let log = restarted.get_audit_log(&a, None).await.unwrap();
        let actions: Vec<_> = log.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, ["x.one", "x.two"]);
        assert_eq!(log[1].sequence, 1);
        assert_eq!(restarted.flush_pending().await.delivered, 1);
    }

    #[tokio::test]
    async fn failed_index_sync_is_retried() {
        let index = Arc::new(RecordingIndexSync::new());
        index.set_failing(true);
        let service = AuditService::new(
            Arc::new(MemoryAuditRepository::new()),
            Arc::new(ControllableClock::default()),
            AuditConfig::default(),
        )
        .with_index_sync(index.clone());

        let receipt = service.log_action(&id("a"), "x.y", Metadata::new()).await.unwrap();
        assert_eq!(receipt.status, WriteStatus::Persisted);
        assert_eq!(service.pending_count(), 1);

        index.set_failing(false);
        assert_eq!(service.flush_pending().await.delivered, 1);
        assert_eq!(index.synced(), vec![id("a")]);
    }

    #[tokio::test]
    async fn signed_entries_verify_and_detect_tampering() {
        let service = AuditService::new(
            Arc::new(MemoryAuditRepository::new()),
            Arc::new(ControllableClock::default()),
            AuditConfig::default(),
        )
        .with_signer(Arc::new(KeyedBlake3Signer::new([7; 32])));
        let a = id("a");
        service
            .record(
                ActionRecord::new(a.clone(), "financial.transfer", AuditOutcome::Denied)
                    .with_reason("KYC verification required"),
            )
            .await
            .unwrap();

        let mut entry = service.get_audit_log(&a, Some(1)).await.unwrap().remove(0);
        assert!(entry.signature.is_some());
        assert!(service.verify_entry(&entry));
        entry.outcome = AuditOutcome::Allowed;
        assert!(!service.verify_entry(&entry));
    }

    #[tokio::test]
    async fn trail_and_limit_filters() {
        let clock = ControllableClock::new(1_000);
        let service = AuditService::new(
            Arc::new(MemoryAuditRepository::new()),
            Arc::new(clock.clone()),
            AuditConfig::default(),
        );
        let a = id("a");
        for _ in 0..5 {
            service.log_action(&a, "x.y", Metadata::new()).await.unwrap();
            clock.advance_ms(1_000);
        }
        assert_eq!(service.get_audit_log(&a, Some(2)).await.unwrap()[0].sequence, 3);
        let trail = service
            .get_audit_trail(
                &a,
                Some(PhysicalTime::from_millis(2_000)),
                Some(PhysicalTime::from_millis(4_000)),
            )
            .await
            .unwrap();
        assert_eq!(trail.len(), 3);
    }
}
