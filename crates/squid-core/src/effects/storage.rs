//! Local key/value storage effect
//!
//! Durable repository backends are layered over [`KvStore`]. Keys are kept
//! in three independent namespaces (see [`namespace`]) plus one for security
//! flags; values are JSON documents.

use crate::errors::StorageError;
use crate::identifiers::{IdentityId, SecurityFlagId};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Key layout shared by every durable backend.
pub mod namespace {
    use super::{IdentityId, SecurityFlagId};

    /// Identities keyed by DID.
    pub const IDENTITY: &str = "identity/";
    /// Audit entries keyed by identity then append order.
    pub const AUDIT: &str = "audit/";
    /// Ephemeral items keyed by `identityId:key`.
    pub const EPHEMERAL: &str = "ephemeral/";
    /// Security flags keyed by flag id.
    pub const FLAG: &str = "flag/";

    /// Key of one identity record.
    pub fn identity_key(id: &IdentityId) -> String {
        format!("{IDENTITY}{id}")
    }

    /// Prefix of all audit entries of one identity.
    pub fn audit_prefix(id: &IdentityId) -> String {
        format!("{AUDIT}{id}/")
    }

    /// Key of one audit entry; zero padding keeps lexical order equal to append order.
    pub fn audit_key(id: &IdentityId, sequence: u64) -> String {
        format!("{}{sequence:020}", audit_prefix(id))
    }

    /// Prefix of all ephemeral items of one identity.
    pub fn ephemeral_prefix(id: &IdentityId) -> String {
        format!("{EPHEMERAL}{id}:")
    }

    /// Key of one ephemeral item.
    pub fn ephemeral_key(id: &IdentityId, key: &str) -> String {
        format!("{}{key}", ephemeral_prefix(id))
    }

    /// Key of one security flag.
    pub fn flag_key(id: &SecurityFlagId) -> String {
        format!("{FLAG}{id}")
    }
}

/// Byte-oriented local key/value store.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Insert or replace a value.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Remove a value, returning whether it existed.
    async fn remove(&self, key: &str) -> Result<bool, StorageError>;

    /// Keys starting with `prefix`, in lexical order.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// In-memory [`KvStore`], the default local backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryKvStore {
    data: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
}

impl MemoryKvStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    /// Check if the store is empty
    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.data.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.write().await.remove(key).is_some())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let data = self.data.read().await;
        Ok(data
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

/// Decode a JSON record, mapping decoder failures to [`StorageError::Malformed`].
pub fn decode_json<T: serde::de::DeserializeOwned>(
    key: &str,
    bytes: &[u8],
) -> Result<T, StorageError> {
    serde_json::from_slice(bytes).map_err(|e| StorageError::malformed(key, e))
}

/// Encode a JSON record.
pub fn encode_json<T: serde::Serialize>(key: &str, value: &T) -> Result<Vec<u8>, StorageError> {
    serde_json::to_vec(value).map_err(|e| StorageError::backend(format!("encode {key}: {e}")))
}
