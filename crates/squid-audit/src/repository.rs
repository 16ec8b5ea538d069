//! Audit repository backends

use async_trait::async_trait;
use squid_core::effects::{decode_json, encode_json, namespace};
use squid_core::{
    AuditEntry, AuditRepository, IdentityId, KvStore, PhysicalTime, SecurityFlag,
    SecurityFlagId, StorageError,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    entries: HashMap<IdentityId, Vec<AuditEntry>>,
    flags: HashMap<SecurityFlagId, SecurityFlag>,
}

/// In-memory audit repository
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditRepository {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryAuditRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored entries across identities
    pub async fn entry_count(&self) -> usize {
        self.state.read().await.entries.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl AuditRepository for MemoryAuditRepository {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        let mut state = self.state.write().await;
        let log = state.entries.entry(entry.identity_id.clone()).or_default();
        match log.binary_search_by_key(&entry.sequence, |e| e.sequence) {
            Ok(_) => Err(StorageError::backend(format!(
                "audit entry {} of {} already exists",
                entry.sequence, entry.identity_id
            ))),
            Err(pos) => {
                log.insert(pos, entry.clone());
                Ok(())
            }
        }
    }

    async fn entries(&self, identity: &IdentityId) -> Result<Vec<AuditEntry>, StorageError> {
        Ok(self
            .state
            .read()
            .await
            .entries
            .get(identity)
            .cloned()
            .unwrap_or_default())
    }

    async fn identities(&self) -> Result<Vec<IdentityId>, StorageError> {
        let state = self.state.read().await;
        let mut ids: Vec<_> = state
            .entries
            .iter()
            .filter(|(_, log)| !log.is_empty())
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn purge_before(
        &self,
        identity: &IdentityId,
        cutoff: PhysicalTime,
    ) -> Result<usize, StorageError> {
        let mut state = self.state.write().await;
        let Some(log) = state.entries.get_mut(identity) else {
            return Ok(0);
        };
        let before = log.len();
        log.retain(|e| e.timestamp >= cutoff);
        Ok(before - log.len())
    }

    async fn put_flag(&self, flag: &SecurityFlag) -> Result<(), StorageError> {
        self.state.write().await.flags.insert(flag.id, flag.clone());
        Ok(())
    }

    async fn get_flag(&self, id: &SecurityFlagId) -> Result<Option<SecurityFlag>, StorageError> {
        Ok(self.state.read().await.flags.get(id).cloned())
    }

    async fn flags(
        &self,
        identity: Option<&IdentityId>,
    ) -> Result<Vec<SecurityFlag>, StorageError> {
        let state = self.state.read().await;
        let mut flags: Vec<_> = state
            .flags
            .values()
            .filter(|f| identity.map_or(true, |id| &f.identity_id == id))
            .cloned()
            .collect();
        flags.sort_by_key(|f| (f.timestamp, f.id));
        Ok(flags)
    }
}

/// Audit repository persisted as JSON documents.
///
/// Entries live under `audit/<did>/<sequence>`, flags under `flag/<id>`.
#[derive(Debug, Clone)]
pub struct KvAuditRepository<S> {
    store: Arc<S>,
}

impl<S: KvStore> KvAuditRepository<S> {
    /// Layer a repository over a key/value store
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<S: KvStore + 'static> AuditRepository for KvAuditRepository<S> {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StorageError> {
        let key = namespace::audit_key(&entry.identity_id, entry.sequence);
        if self.store.get(&key).await?.is_some() {
            return Err(StorageError::backend(format!("{key} already exists")));
        }
        let bytes = encode_json(&key, entry)?;
        self.store.put(&key, bytes).await
    }

    async fn entries(&self, identity: &IdentityId) -> Result<Vec<AuditEntry>, StorageError> {
        let mut out = Vec::new();
        for key in self.store.list_keys(&namespace::audit_prefix(identity)).await? {
            if let Some(bytes) = self.store.get(&key).await? {
                out.push(decode_json(&key, &bytes)?);
            }
        }
        Ok(out)
    }

    async fn identities(&self) -> Result<Vec<IdentityId>, StorageError> {
        let mut ids: Vec<IdentityId> = Vec::new();
        for key in self.store.list_keys(namespace::AUDIT).await? {
            let Some((did, _)) = key
                .strip_prefix(namespace::AUDIT)
                .and_then(|rest| rest.rsplit_once('/'))
            else {
                continue;
            };
            if ids.last().map(IdentityId::as_str) != Some(did) {
                ids.push(IdentityId::new(did));
            }
        }
        Ok(ids)
    }

    async fn purge_before(
        &self,
        identity: &IdentityId,
        cutoff: PhysicalTime,
    ) -> Result<usize, StorageError> {
        let mut purged = 0;
        for key in self.store.list_keys(&namespace::audit_prefix(identity)).await? {
            let Some(bytes) = self.store.get(&key).await? else {
                continue;
            };
            let entry: AuditEntry = decode_json(&key, &bytes)?;
            if entry.timestamp < cutoff && self.store.remove(&key).await? {
                purged += 1;
            }
        }
        Ok(purged)
    }

    async fn put_flag(&self, flag: &SecurityFlag) -> Result<(), StorageError> {
        let key = namespace::flag_key(&flag.id);
        let bytes = encode_json(&key, flag)?;
        self.store.put(&key, bytes).await
    }

    async fn get_flag(&self, id: &SecurityFlagId) -> Result<Option<SecurityFlag>, StorageError> {
        let key = namespace::flag_key(id);
        match self.store.get(&key).await? {
            Some(bytes) => decode_json(&key, &bytes).map(Some),
            None => Ok(None),
        }
    }

    async fn flags(
        &self,
        identity: Option<&IdentityId>,
    ) -> Result<Vec<SecurityFlag>, StorageError> {
        let mut flags = Vec::new();
        for key in self.store.list_keys(namespace::FLAG).await? {
            let Some(bytes) = self.store.get(&key).await? else {
                continue;
            };
            let flag: SecurityFlag = decode_json(&key, &bytes)?;
            if identity.map_or(true, |id| &flag.identity_id == id) {
                flags.push(flag);
            }
        }
        flags.sort_by_key(|f| (f.timestamp, f.id));
        Ok(flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use squid_core::{AuditEntryId, AuditOutcome, MemoryKvStore};

    fn entry(identity: &IdentityId, sequence: u64, ts: u64) -> AuditEntry {
        AuditEntry {
            id: AuditEntryId::new(),
            identity_id: identity.clone(),
            sequence,
            action: "message.send".into(),
            timestamp: PhysicalTime::from_millis(ts),
            outcome: AuditOutcome::Allowed,
            metadata: serde_json::Map::new(),
            correlation_id: None,
            signature: None,
        }
    }

    async fn exercise(repo: &dyn AuditRepository) {
        let a = IdentityId::new("did:squid:a");
        let b = IdentityId::new("did:squid:b");
        repo.append(&entry(&a, 1, 20)).await.unwrap();
        repo.append(&entry(&a, 0, 10)).await.unwrap();
        repo.append(&entry(&b, 0, 30)).await.unwrap();
        assert!(repo.append(&entry(&a, 1, 99)).await.is_err());

        let seqs: Vec<_> = repo.entries(&a).await.unwrap().iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, vec![0, 1]);
        assert_eq!(repo.identities().await.unwrap(), vec![a.clone(), b.clone()]);

        assert_eq!(
            repo.purge_before(&a, PhysicalTime::from_millis(15)).await.unwrap(),
            1
        );
        assert_eq!(repo.entries(&a).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn memory_repository_keeps_append_order() {
        exercise(&MemoryAuditRepository::new()).await;
    }

    #[tokio::test]
    async fn kv_repository_keeps_append_order() {
        exercise(&KvAuditRepository::new(Arc::new(MemoryKvStore::new()))).await;
    }

    #[tokio::test]
    async fn kv_repository_reports_malformed_entries() {
        let kv = Arc::new(MemoryKvStore::new());
        let repo = KvAuditRepository::new(kv.clone());
        let a = IdentityId::new("did:squid:a");
        kv.put(&namespace::audit_key(&a, 0), b"not json".to_vec())
            .await
            .unwrap();
        assert!(matches!(
            repo.entries(&a).await,
            Err(StorageError::Malformed { .. })
        ));
    }
}
