//! Fault-injecting key/value store

use async_trait::async_trait;
use squid_core::{KvStore, MemoryKvStore, StorageError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// [`MemoryKvStore`] that can be switched offline to simulate an unreachable backend.
#[derive(Debug, Clone, Default)]
pub struct FlakyKvStore {
    inner: MemoryKvStore,
    offline: Arc<AtomicBool>,
}

impl FlakyKvStore {
    /// Create an online store
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every call with `StorageError::Unavailable` until [`FlakyKvStore::go_online`]
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    /// Resume normal operation
    pub fn go_online(&self) {
        self.offline.store(false, Ordering::SeqCst);
    }

    /// Write raw bytes regardless of online state (for corrupt-record tests)
    pub async fn inject_raw(&self, key: &str, value: Vec<u8>) {
        self.inner.put(key, value).await.unwrap();
    }

    /// Direct access to the backing store
    pub fn inner(&self) -> &MemoryKvStore {
        &self.inner
    }

    fn check(&self) -> Result<(), StorageError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(StorageError::unavailable("flaky store offline"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl KvStore for FlakyKvStore {
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.check()?;
        self.inner.put(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        self.check()?;
        self.inner.remove(key).await
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.check()?;
        self.inner.list_keys(prefix).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn offline_store_reports_unavailable() {
        let kv = FlakyKvStore::new();
        kv.put("a", vec![1]).await.unwrap();
        kv.go_offline();
        assert!(matches!(
            kv.get("a").await,
            Err(StorageError::Unavailable { .. })
        ));
        kv.go_online();
        assert_eq!(kv.get("a").await.unwrap(), Some(vec![1]));
    }
}
