//! Durable mirror backends for ephemeral items

use async_trait::async_trait;
use squid_core::effects::{decode_json, encode_json, namespace};
use squid_core::ephemeral::storage_key;
use squid_core::{EphemeralItem, EphemeralRepository, IdentityId, KvStore, StorageError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory mirror keyed by `identityId:key`.
#[derive(Debug, Clone, Default)]
pub struct MemoryEphemeralRepository {
    items: Arc<RwLock<BTreeMap<String, EphemeralItem>>>,
}

impl MemoryEphemeralRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mirrored items
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    /// Check if nothing is mirrored
    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl EphemeralRepository for MemoryEphemeralRepository {
    async fn put(&self, item: &EphemeralItem) -> Result<(), StorageError> {
        self.items
            .write()
            .await
            .insert(item.storage_key(), item.clone());
        Ok(())
    }

    async fn get(
        &self,
        identity: &IdentityId,
        key: &str,
    ) -> Result<Option<EphemeralItem>, StorageError> {
        Ok(self
            .items
            .read()
            .await
            .get(&storage_key(identity, key))
            .cloned())
    }

    async fn remove(&self, identity: &IdentityId, key: &str) -> Result<bool, StorageError> {
        Ok(self
            .items
            .write()
            .await
            .remove(&storage_key(identity, key))
            .is_some())
    }

    async fn list(
        &self,
        identity: Option<&IdentityId>,
    ) -> Result<Vec<EphemeralItem>, StorageError> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .filter(|item| identity.map_or(true, |id| &item.identity_id == id))
            .cloned()
            .collect())
    }
}

/// Mirror persisted as JSON documents under `ephemeral/<did>:<key>`.
#[derive(Debug, Clone)]
pub struct KvEphemeralRepository<S> {
    store: Arc<S>,
}

impl<S: KvStore> KvEphemeralRepository<S> {
    /// Layer a repository over a key/value store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: KvStore + 'static> EphemeralRepository for KvEphemeralRepository<S> {
    async fn put(&self, item: &EphemeralItem) -> Result<(), StorageError> {
        let key = namespace::ephemeral_key(&item.identity_id, &item.key);
        let bytes = encode_json(&key, item)?;
        self.store.put(&key, bytes).await
    }

    async fn get(
        &self,
        identity: &IdentityId,
        key: &str,
    ) -> Result<Option<EphemeralItem>, StorageError> {
        let key = namespace::ephemeral_key(identity, key);
        match self.store.get(&key).await? {
            Some(bytes) => decode_json(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn remove(&self, identity: &IdentityId, key: &str) -> Result<bool, StorageError> {
        self.store
            .remove(&namespace::ephemeral_key(identity, key))
            .await
    }

    async fn list(
        &self,
        identity: Option<&IdentityId>,
    ) -> Result<Vec<EphemeralItem>, StorageError> {
        let prefix = match identity {
            Some(id) => namespace::ephemeral_prefix(id),
            None => namespace::EPHEMERAL.to_string(),
        };
        let mut items = Vec::new();
        for key in self.store.list_keys(&prefix).await? {
            let Some(bytes) = self.store.get(&key).await? else {
                continue;
            };
            let item: EphemeralItem = decode_json(&key, &bytes)?;
            // DIDs may themselves contain ':' so the prefix alone is not authoritative.
            if identity.map_or(true, |id| &item.identity_id == id) {
                items.push(item);
            }
        }
        Ok(items)
    }
}
