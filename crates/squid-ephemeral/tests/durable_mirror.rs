//! Ephemeral store behavior over a failing durable mirror.

use assert_matches::assert_matches;
use squid_core::{IdentityId, StorageError};
use squid_ephemeral::{
    EphemeralConfig, EphemeralError, EphemeralStore, KvEphemeralRepository, StoreOptions,
};
use squid_testkit::{ControllableClock, FlakyKvStore};
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Arc<FlakyKvStore>, EphemeralStore, ControllableClock) {
    let kv = Arc::new(FlakyKvStore::new());
    let clock = ControllableClock::default();
    let store = EphemeralStore::new(Arc::new(clock.clone()), EphemeralConfig::default())
        .with_mirror(Arc::new(KvEphemeralRepository::new(kv.clone())));
    (kv, store, clock)
}

#[tokio::test]
async fn auto_destruct_write_rolls_back_when_mirror_fails() {
    let (kv, store, _) = setup();
    let a = IdentityId::new("did:squid:a");
    store
        .store("session", b"old", &a, StoreOptions::new().auto_destruct())
        .await
        .unwrap();

    kv.go_offline();
    let result = store
        .store("session", b"new", &a, StoreOptions::new().auto_destruct())
        .await;
    assert_matches!(
        result,
        Err(EphemeralError::Storage(StorageError::Unavailable { .. }))
    );
    assert_eq!(store.retrieve("session", &a).await.unwrap(), Some(b"old".to_vec()));
}

#[tokio::test]
async fn plain_write_survives_mirror_failure_in_memory() {
    let (kv, store, _) = setup();
    let a = IdentityId::new("did:squid:a");
    kv.go_offline();
    store
        .store("draft", b"text", &a, StoreOptions::new())
        .await
        .unwrap();
    assert_eq!(store.retrieve("draft", &a).await.unwrap(), Some(b"text".to_vec()));
}

#[tokio::test]
async fn sweep_clears_expired_mirror_entries() {
    let (kv, store, clock) = setup();
    let a = IdentityId::new("did:squid:a");
    store
        .store("short", b"1", &a, StoreOptions::new().with_ttl(Duration::from_secs(5)))
        .await
        .unwrap();
    store
        .store("long", b"2", &a, StoreOptions::new().with_ttl(Duration::from_secs(500)))
        .await
        .unwrap();

    clock.advance(Duration::from_secs(10));
    assert_eq!(store.sweep().await.unwrap(), 1);
    assert_eq!(kv.inner().len().await, 1);
    assert_eq!(store.sweep().await.unwrap(), 0);
}
