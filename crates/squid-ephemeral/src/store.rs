//! TTL-bound ephemeral storage
//!
//! The live map is authoritative for reads; an optional durable mirror keeps
//! items across restarts and is consulted when the live map misses. Expired
//! items are never returned: reads evict them on sight and [`EphemeralStore::sweep`]
//! removes the rest.
//!
//! Identities in ephemeral mode (see [`EphemeralStore::arm`]) keep their
//! items in memory only, all marked auto-destruct.

use crate::config::EphemeralConfig;
use crate::error::EphemeralError;
use crate::events::{CleanupTrigger, EphemeralEvent, LifecycleSignal};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use squid_core::{
    EphemeralItem, EphemeralPayload, EphemeralRepository, IdentityId, IdentityType,
    PayloadSealer, PhysicalTime, PhysicalTimeEffects, StorageError,
};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// AID identities default to ephemeral-only storage.
pub fn should_use_ephemeral_storage(identity_type: IdentityType) -> bool {
    identity_type == IdentityType::Aid
}

/// Per-write options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreOptions {
    /// Lifetime; the configured default when `None`
    pub ttl: Option<Duration>,
    /// Seal the payload with the configured sealer
    pub encrypt: bool,
    /// Destroy on session loss regardless of TTL
    pub auto_destruct: bool,
}

impl StoreOptions {
    /// Options with the configured default TTL.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the lifetime.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Request sealing.
    pub fn encrypted(mut self) -> Self {
        self.encrypt = true;
        self
    }

    /// Destroy on session loss.
    pub fn auto_destruct(mut self) -> Self {
        self.auto_destruct = true;
        self
    }
}

/// Storage usage of one identity.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    /// Stored items, expired or not
    pub items: usize,
    /// Stored payload bytes
    pub total_bytes: usize,
    /// Items with sealed payloads
    pub sealed_items: usize,
    /// Items destroyed on session loss
    pub auto_destruct_items: usize,
    /// Items past expiry awaiting eviction
    pub expired_items: usize,
    /// Earliest upcoming expiry among live items
    pub next_expiry: Option<PhysicalTime>,
}

type LiveMap = HashMap<IdentityId, BTreeMap<String, EphemeralItem>>;

/// Ephemeral store for all identities.
pub struct EphemeralStore {
    live: Mutex<LiveMap>,
    armed: Mutex<BTreeSet<IdentityId>>,
    mirror: Option<Arc<dyn EphemeralRepository>>,
    sealer: Option<Arc<dyn PayloadSealer>>,
    time: Arc<dyn PhysicalTimeEffects>,
    config: EphemeralConfig,
    events: broadcast::Sender<EphemeralEvent>,
}

impl EphemeralStore {
    /// Memory-only store.
    pub fn new(time: Arc<dyn PhysicalTimeEffects>, config: EphemeralConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            live: Mutex::new(HashMap::new()),
            armed: Mutex::new(BTreeSet::new()),
            mirror: None,
            sealer: None,
            time,
            config,
            events,
        }
    }

    /// Mirror writes to a durable repository.
    pub fn with_mirror(mut self, mirror: Arc<dyn EphemeralRepository>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Seal payloads stored with `encrypt`.
    pub fn with_sealer(mut self, sealer: Arc<dyn PayloadSealer>) -> Self {
        self.sealer = Some(sealer);
        self
    }

    /// Active configuration.
    pub fn config(&self) -> &EphemeralConfig {
        &self.config
    }

    /// Listen for cleanup, purge and sweep notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<EphemeralEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: EphemeralEvent) {
        // No listeners is fine.
        let _ = self.events.send(event);
    }

    async fn now(&self) -> Result<PhysicalTime, EphemeralError> {
        Ok(self.time.physical_time().await?)
    }

    /// Store `data` under `key` for `identity_id`; returns the expiry.
    ///
    /// Fails with `StorageError::EncryptionUnavailable` when encryption is
    /// requested without a sealer. If the mirror write of an auto-destruct
    /// item fails, the live write is rolled back and the error returned;
    /// other mirror failures are logged and the live item kept.
    pub async fn store(
        &self,
        key: &str,
        data: &[u8],
        identity_id: &IdentityId,
        options: StoreOptions,
    ) -> Result<PhysicalTime, EphemeralError> {
        if key.is_empty() {
            return Err(EphemeralError::invalid_key("key is empty"));
        }
        let ttl = options.ttl.unwrap_or_else(|| self.config.default_ttl());
        if ttl.is_zero() {
            return Err(EphemeralError::InvalidTtl);
        }
        let payload = if options.encrypt {
            let sealer = self.sealer.as_ref().ok_or_else(|| {
                StorageError::encryption_unavailable("no payload sealer configured")
            })?;
            let sealed = sealer
                .seal(identity_id, data)
                .map_err(|e| StorageError::encryption_unavailable(e.to_string()))?;
            EphemeralPayload::Sealed(sealed)
        } else {
            EphemeralPayload::Plain(data.to_vec())
        };

        let now = self.now().await?;
        let armed = self.is_armed(identity_id);
        let item = EphemeralItem {
            key: key.to_string(),
            identity_id: identity_id.clone(),
            payload,
            created_at: now,
            expires_at: now.saturating_add(ttl),
            auto_destruct: options.auto_destruct || armed,
        };

        let previous = self
            .live
            .lock()
            .entry(identity_id.clone())
            .or_default()
            .insert(item.key.clone(), item.clone());

        if let (Some(mirror), false) = (&self.mirror, armed) {
            if let Err(e) = mirror.put(&item).await {
                if item.auto_destruct {
                    self.roll_back(&item, previous);
                    warn!(
                        identity_id = %identity_id,
                        key,
                        error = %e,
                        "Mirror write failed, auto-destruct item rolled back"
                    );
                    return Err(e.into());
                }
                warn!(identity_id = %identity_id, key, error = %e, "Mirror write failed, kept in memory");
            }
        }

        debug!(
            identity_id = %identity_id,
            key,
            sealed = item.payload.is_sealed(),
            auto_destruct = item.auto_destruct,
            expires_at = item.expires_at.ts_ms,
            "Ephemeral item stored"
        );
        Ok(item.expires_at)
    }

    fn roll_back(&self, item: &EphemeralItem, previous: Option<EphemeralItem>) {
        let mut live = self.live.lock();
        let Some(items) = live.get_mut(&item.identity_id) else {
            return;
        };
        // Only undo our own write; a later write to the same key wins.
        if items.get(&item.key) != Some(item) {
            return;
        }
        match previous {
            Some(previous) => {
                items.insert(item.key.clone(), previous);
            }
            None => {
                items.remove(&item.key);
                if items.is_empty() {
                    live.remove(&item.identity_id);
                }
            }
        }
    }

    /// Unexpired item, consulting the mirror on a live miss. Expired items are evicted.
    async fn lookup(
        &self,
        identity_id: &IdentityId,
        key: &str,
    ) -> Result<Option<EphemeralItem>, EphemeralError> {
        let now = self.now().await?;
        let live = self
            .live
            .lock()
            .get(identity_id)
            .and_then(|items| items.get(key))
            .cloned();

        let item = match (live, &self.mirror) {
            (Some(item), _) => item,
            (None, Some(mirror)) => match mirror.get(identity_id, key).await? {
                Some(item) => {
                    if !item.is_expired(now) {
                        self.live
                            .lock()
                            .entry(identity_id.clone())
                            .or_default()
                            .entry(key.to_string())
                            .or_insert_with(|| item.clone());
                    }
                    item
                }
                None => return Ok(None),
            },
            (None, None) => return Ok(None),
        };

        if item.is_expired(now) {
            self.evict(identity_id, key).await;
            debug!(identity_id = %identity_id, key, "Expired item evicted on read");
            return Ok(None);
        }
        Ok(Some(item))
    }

    async fn evict(&self, identity_id: &IdentityId, key: &str) {
        self.remove_live(identity_id, key);
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.remove(identity_id, key).await {
                warn!(identity_id = %identity_id, key, error = %e, "Mirror eviction failed");
            }
        }
    }

    fn remove_live(&self, identity_id: &IdentityId, key: &str) -> bool {
        let mut live = self.live.lock();
        let Some(items) = live.get_mut(identity_id) else {
            return false;
        };
        let removed = items.remove(key).is_some();
        if items.is_empty() {
            live.remove(identity_id);
        }
        removed
    }

    fn open(&self, item: &EphemeralItem) -> Result<Vec<u8>, EphemeralError> {
        match &item.payload {
            EphemeralPayload::Plain(bytes) => Ok(bytes.clone()),
            EphemeralPayload::Sealed(sealed) => {
                let sealer = self.sealer.as_ref().ok_or_else(|| {
                    StorageError::encryption_unavailable("no payload sealer configured")
                })?;
                sealer
                    .open(&item.identity_id, sealed)
                    .map_err(|e| EphemeralError::Unseal {
                        key: item.key.clone(),
                        reason: e.to_string(),
                    })
            }
        }
    }

    /// Payload of an unexpired item.
    pub async fn retrieve(
        &self,
        key: &str,
        identity_id: &IdentityId,
    ) -> Result<Option<Vec<u8>>, EphemeralError> {
        match self.lookup(identity_id, key).await? {
            Some(item) => self.open(&item).map(Some),
            None => Ok(None),
        }
    }

    /// Whether an unexpired item exists.
    pub async fn exists(&self, key: &str, identity_id: &IdentityId) -> Result<bool, EphemeralError> {
        Ok(self.lookup(identity_id, key).await?.is_some())
    }

    /// Remove one item; returns whether it existed.
    pub async fn remove(&self, key: &str, identity_id: &IdentityId) -> Result<bool, EphemeralError> {
        let mut removed = self.remove_live(identity_id, key);
        if let Some(mirror) = &self.mirror {
            removed |= mirror.remove(identity_id, key).await?;
        }
        Ok(removed)
    }

    /// Remove every item of `identity_id`; returns how many were removed.
    pub async fn remove_all_for_identity(
        &self,
        identity_id: &IdentityId,
    ) -> Result<usize, EphemeralError> {
        let mut keys: BTreeSet<String> = self
            .live
            .lock()
            .remove(identity_id)
            .map(|items| items.into_keys().collect())
            .unwrap_or_default();

        if let Some(mirror) = &self.mirror {
            for item in mirror.list(Some(identity_id)).await? {
                mirror.remove(identity_id, &item.key).await?;
                keys.insert(item.key);
            }
        }

        let removed = keys.len();
        if removed > 0 {
            info!(identity_id = %identity_id, removed, "Ephemeral data purged");
            self.emit(EphemeralEvent::IdentityPurged {
                identity_id: identity_id.clone(),
                removed,
            });
        }
        Ok(removed)
    }

    /// Usage of `identity_id`, live and mirrored.
    pub async fn get_storage_stats(
        &self,
        identity_id: &IdentityId,
    ) -> Result<StorageStats, EphemeralError> {
        let now = self.now().await?;
        let mut items: BTreeMap<String, EphemeralItem> = self
            .live
            .lock()
            .get(identity_id)
            .cloned()
            .unwrap_or_default();
        if let Some(mirror) = &self.mirror {
            for item in mirror.list(Some(identity_id)).await? {
                items.entry(item.key.clone()).or_insert(item);
            }
        }

        let mut stats = StorageStats::default();
        for item in items.values() {
            stats.items += 1;
            stats.total_bytes += item.payload.len();
            stats.sealed_items += usize::from(item.payload.is_sealed());
            stats.auto_destruct_items += usize::from(item.auto_destruct);
            if item.is_expired(now) {
                stats.expired_items += 1;
            } else {
                stats.next_expiry = Some(
                    stats
                        .next_expiry
                        .map_or(item.expires_at, |t| t.min(item.expires_at)),
                );
            }
        }
        Ok(stats)
    }

    /// Evict every expired item from the live map and the mirror.
    pub async fn sweep(&self) -> Result<usize, EphemeralError> {
        let now = self.now().await?;
        let mut evicted = self.drain_live(|item| item.is_expired(now));
        if let Some(mirror) = &self.mirror {
            for item in mirror.list(None).await? {
                if item.is_expired(now) {
                    mirror.remove(&item.identity_id, &item.key).await?;
                    evicted.insert((item.identity_id, item.key));
                }
            }
        }

        let removed = evicted.len();
        if removed > 0 {
            info!(removed, "Ephemeral sweep evicted expired items");
            self.emit(EphemeralEvent::Swept { removed });
        }
        Ok(removed)
    }

    /// Destroy every auto-destruct item across identities and notify listeners.
    pub async fn trigger_session_cleanup(
        &self,
        trigger: CleanupTrigger,
    ) -> Result<usize, EphemeralError> {
        let mut destroyed = self.drain_live(|item| item.auto_destruct);
        if let Some(mirror) = &self.mirror {
            for item in mirror.list(None).await? {
                if item.auto_destruct {
                    mirror.remove(&item.identity_id, &item.key).await?;
                    destroyed.insert((item.identity_id, item.key));
                }
            }
        }

        let removed = destroyed.len();
        info!(trigger = ?trigger, removed, "Session cleanup");
        self.emit(EphemeralEvent::SessionCleanup { trigger, removed });
        Ok(removed)
    }

    /// React to a host lifecycle signal; returns the cleanup count when one ran.
    pub async fn handle_signal(
        &self,
        signal: LifecycleSignal,
    ) -> Result<Option<usize>, EphemeralError> {
        let trigger = match signal {
            LifecycleSignal::Logout => CleanupTrigger::Logout,
            LifecycleSignal::PageUnload => CleanupTrigger::PageUnload,
            LifecycleSignal::VisibilityLost { hidden_for_ms }
                if hidden_for_ms >= self.config.visibility_loss_threshold_ms =>
            {
                CleanupTrigger::VisibilityLoss
            }
            LifecycleSignal::VisibilityLost { .. } | LifecycleSignal::VisibilityRestored => {
                return Ok(None)
            }
        };
        self.trigger_session_cleanup(trigger).await.map(Some)
    }

    fn drain_live(
        &self,
        mut doomed: impl FnMut(&EphemeralItem) -> bool,
    ) -> BTreeSet<(IdentityId, String)> {
        let mut removed = BTreeSet::new();
        let mut live = self.live.lock();
        for (identity_id, items) in live.iter_mut() {
            items.retain(|key, item| {
                if doomed(item) {
                    removed.insert((identity_id.clone(), key.clone()));
                    false
                } else {
                    true
                }
            });
        }
        live.retain(|_, items| !items.is_empty());
        removed
    }

    /// Enter ephemeral mode: later writes for `identity_id` stay in memory and auto-destruct.
    pub fn arm(&self, identity_id: &IdentityId) {
        if self.armed.lock().insert(identity_id.clone()) {
            info!(identity_id = %identity_id, "Ephemeral mode armed");
        }
    }

    /// Leave ephemeral mode and purge the identity's items.
    pub async fn disarm(&self, identity_id: &IdentityId) -> Result<usize, EphemeralError> {
        self.armed.lock().remove(identity_id);
        self.remove_all_for_identity(identity_id).await
    }

    /// Whether `identity_id` is in ephemeral mode.
    pub fn is_armed(&self, identity_id: &IdentityId) -> bool {
        self.armed.lock().contains(identity_id)
    }
}

impl std::fmt::Debug for EphemeralStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralStore")
            .field("config", &self.config)
            .field("mirrored", &self.mirror.is_some())
            .field("sealed", &self.sealer.is_some())
            .finish_non_exhaustive()
    }
}
