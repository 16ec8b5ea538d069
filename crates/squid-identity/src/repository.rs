//! Identity repository backends

use async_trait::async_trait;
use squid_core::effects::{decode_json, encode_json, namespace};
use squid_core::{Identity, IdentityId, IdentityRepository, KvStore, StorageError};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory identity repository
#[derive(Debug, Clone, Default)]
pub struct MemoryIdentityRepository {
    identities: Arc<RwLock<HashMap<IdentityId, Identity>>>,
}

impl MemoryIdentityRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored identities (for testing)
    pub async fn len(&self) -> usize {
        self.identities.read().await.len()
    }

    /// Check if the repository is empty
    pub async fn is_empty(&self) -> bool {
        self.identities.read().await.is_empty()
    }
}

#[async_trait]
impl IdentityRepository for MemoryIdentityRepository {
    async fn get(&self, id: &IdentityId) -> Result<Option<Identity>, StorageError> {
        Ok(self.identities.read().await.get(id).cloned())
    }

    async fn put_all(&self, identities: &[Identity]) -> Result<(), StorageError> {
        let mut map = self.identities.write().await;
        for identity in identities {
            map.insert(identity.did.clone(), identity.clone());
        }
        Ok(())
    }

    async fn delete(&self, id: &IdentityId) -> Result<bool, StorageError> {
        Ok(self.identities.write().await.remove(id).is_some())
    }

    async fn list_by_root(&self, root: &IdentityId) -> Result<Vec<Identity>, StorageError> {
        Ok(self
            .identities
            .read()
            .await
            .values()
            .filter(|i| &i.root_id == root)
            .cloned()
            .collect())
    }
}

/// Identity repository persisted as JSON documents under `identity/<did>`.
#[derive(Debug, Clone)]
pub struct KvIdentityRepository<S> {
    store: Arc<S>,
}

impl<S: KvStore> KvIdentityRepository<S> {
    /// Layer a repository over a key/value store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: KvStore + 'static> IdentityRepository for KvIdentityRepository<S> {
    async fn get(&self, id: &IdentityId) -> Result<Option<Identity>, StorageError> {
        let key = namespace::identity_key(id);
        match self.store.get(&key).await? {
            Some(bytes) => decode_json(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn put_all(&self, identities: &[Identity]) -> Result<(), StorageError> {
        // Encode everything first so a bad record never leaves a partial write.
        let mut encoded = Vec::with_capacity(identities.len());
        for identity in identities {
            let key = namespace::identity_key(&identity.did);
            let bytes = encode_json(&key, identity)?;
            encoded.push((key, bytes));
        }
        for (key, bytes) in encoded {
            self.store.put(&key, bytes).await?;
        }
        Ok(())
    }

    async fn delete(&self, id: &IdentityId) -> Result<bool, StorageError> {
        self.store.remove(&namespace::identity_key(id)).await
    }

    async fn list_by_root(&self, root: &IdentityId) -> Result<Vec<Identity>, StorageError> {
        let mut out = Vec::new();
        for key in self.store.list_keys(namespace::IDENTITY).await? {
            let Some(bytes) = self.store.get(&key).await? else {
                continue;
            };
            let identity: Identity = decode_json(&key, &bytes)?;
            if &identity.root_id == root {
                out.push(identity);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{build_root, RootAttributes};
    use squid_core::{MemoryKvStore, PhysicalTime};

    #[tokio::test]
    async fn kv_repository_round_trips_and_reports_corruption() {
        let kv = Arc::new(MemoryKvStore::new());
        let repo = KvIdentityRepository::new(kv.clone());
        let root = build_root(RootAttributes::named("r"), 3, PhysicalTime::from_millis(5));

        repo.put_all(std::slice::from_ref(&root)).await.unwrap();
        assert_eq!(repo.get(&root.did).await.unwrap(), Some(root.clone()));
        assert_eq!(repo.list_by_root(&root.did).await.unwrap().len(), 1);

        kv.put(&namespace::identity_key(&root.did), b"{oops".to_vec())
            .await
            .unwrap();
        assert!(matches!(
            repo.get(&root.did).await,
            Err(StorageError::Malformed { .. })
        ));
    }

    #[tokio::test]
    async fn memory_repository_delete() {
        let repo = MemoryIdentityRepository::new();
        let root = build_root(RootAttributes::named("r"), 3, PhysicalTime::from_millis(5));
        repo.put_all(&[root.clone()]).await.unwrap();
        assert!(repo.delete(&root.did).await.unwrap());
        assert!(repo.is_empty().await);
    }
}
