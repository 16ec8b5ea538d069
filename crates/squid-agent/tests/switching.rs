//! Identity switch sequencing: supersede and ephemeral transitions.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use async_trait::async_trait;
use squid_agent::{FeedbackKind, SquidAgent, SquidConfig, SwitchOutcome, SwitchPhase, SWITCH_ACTION};
use squid_core::{AuditOutcome, Identity, IdentityId, IdentityRepository, IdentityType, StorageError};
use squid_ephemeral::{EphemeralEvent, LifecycleSignal, StoreOptions};
use squid_identity::{MemoryIdentityRepository, RootAttributes, SubIdentityAttributes};
use squid_testkit::ControllableClock;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Identity repository that can hold one `get` until released.
#[derive(Default)]
struct GatedRepository {
    inner: MemoryIdentityRepository,
    gated: Mutex<Option<IdentityId>>,
    entered: Notify,
    release: Notify,
}

impl GatedRepository {
    fn gate(&self, id: &IdentityId) {
        *self.gated.lock().unwrap() = Some(id.clone());
    }
}

#[async_trait]
impl IdentityRepository for GatedRepository {
    async fn get(&self, id: &IdentityId) -> Result<Option<Identity>, StorageError> {
        let hold = {
            let mut gated = self.gated.lock().unwrap();
            if gated.as_ref() == Some(id) {
                gated.take();
                true
            } else {
                false
            }
        };
        if hold {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.get(id).await
    }

    async fn put_all(&self, identities: &[Identity]) -> Result<(), StorageError> {
        self.inner.put_all(identities).await
    }

    async fn delete(&self, id: &IdentityId) -> Result<bool, StorageError> {
        self.inner.delete(id).await
    }

    async fn list_by_root(&self, root: &IdentityId) -> Result<Vec<Identity>, StorageError> {
        self.inner.list_by_root(root).await
    }
}

struct Fixture {
    agent: Arc<SquidAgent>,
    repo: Arc<GatedRepository>,
    clock: ControllableClock,
    root: Identity,
    aid: Identity,
    dao: Identity,
}

async fn fixture() -> Fixture {
    squid_testkit::init_test_tracing();
    let repo = Arc::new(GatedRepository::default());
    let clock = ControllableClock::new(1_700_000_000_000);
    let agent = Arc::new(
        SquidAgent::builder(SquidConfig::default())
            .with_time(Arc::new(clock.clone()))
            .with_identity_repository(repo.clone())
            .build()
            .unwrap(),
    );
    let identities = agent.identities();
    let root = identities
        .bootstrap_root(RootAttributes::named("Alice"))
        .await
        .unwrap();
    let aid = identities
        .create_sub_identity(&root.did, IdentityType::Aid, SubIdentityAttributes::named("anon"))
        .await
        .unwrap();
    let dao = identities
        .create_sub_identity(&root.did, IdentityType::Dao, SubIdentityAttributes::named("Guild"))
        .await
        .unwrap();
    Fixture {
        agent,
        repo,
        clock,
        root,
        aid,
        dao,
    }
}

#[tokio::test]
async fn newer_switch_supersedes_one_in_flight() {
    let f = fixture().await;
    assert!(f.agent.switch_identity(&f.root.did).await.outcome.is_success());

    f.repo.gate(&f.aid.did);
    let slow = tokio::spawn({
        let agent = f.agent.clone();
        let target = f.aid.did.clone();
        async move { agent.switch_identity(&target).await }
    });
    f.repo.entered.notified().await;

    let loading = f.agent.coordinator().loading_state();
    assert!(loading.switching);
    assert_eq!(loading.target, Some(f.aid.did.clone()));
    assert_eq!(loading.phase, SwitchPhase::Validating);

    let fast = f.agent.switch_identity(&f.dao.did).await;
    assert_eq!(fast.outcome, SwitchOutcome::Success { degraded: false });
    assert_eq!(fast.previous, Some(f.root.did.clone()));

    f.repo.release.notify_one();
    let slow = slow.await.unwrap();
    assert_eq!(slow.outcome, SwitchOutcome::Superseded);
    assert_eq!(slow.phase, SwitchPhase::Validating);
    assert!(slow.feedback_id.is_none());

    // The newer target wins and the AID was never armed.
    assert_eq!(f.agent.identities().active_id(), Some(f.dao.did.clone()));
    assert!(!f.agent.ephemeral().is_armed(&f.aid.did));

    let loading = f.agent.coordinator().loading_state();
    assert_eq!(loading.target, Some(f.dao.did.clone()));
    assert_eq!(loading.phase, SwitchPhase::Success);
    assert!(!loading.switching);

    let feedback = f.agent.active_feedback().await.unwrap();
    assert!(feedback
        .iter()
        .all(|e| e.correlation_id != Some(slow.correlation_id)));

    let log = f.agent.audit().entries(&f.aid.did).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].action, SWITCH_ACTION);
    assert_eq!(log[0].outcome, AuditOutcome::Error);
    assert_eq!(log[0].metadata["superseded"], true);
    assert_eq!(log[0].correlation_id, Some(slow.correlation_id));
}

#[tokio::test]
async fn aid_away_and_back_starts_empty() {
    let f = fixture().await;
    let ephemeral = f.agent.ephemeral();
    let mut events = ephemeral.subscribe();

    f.agent.switch_identity(&f.aid.did).await;
    assert!(ephemeral.is_armed(&f.aid.did));
    ephemeral
        .store("session", b"token", &f.aid.did, StoreOptions::new())
        .await
        .unwrap();
    ephemeral
        .store("notes", b"text", &f.aid.did, StoreOptions::new().auto_destruct())
        .await
        .unwrap();

    let away = f.agent.switch_identity(&f.root.did).await;
    assert_eq!(away.purged, 2);
    assert_eq!(
        events.recv().await.unwrap(),
        EphemeralEvent::IdentityPurged {
            identity_id: f.aid.did.clone(),
            removed: 2
        }
    );

    let back = f.agent.switch_identity(&f.aid.did).await;
    assert!(back.outcome.is_success());
    assert!(ephemeral.is_armed(&f.aid.did));
    assert_eq!(ephemeral.retrieve("session", &f.aid.did).await.unwrap(), None);
    assert_eq!(ephemeral.retrieve("notes", &f.aid.did).await.unwrap(), None);
    assert_eq!(ephemeral.get_storage_stats(&f.aid.did).await.unwrap().items, 0);
}

#[tokio::test]
async fn reselecting_the_active_aid_keeps_its_data() {
    let f = fixture().await;
    let ephemeral = f.agent.ephemeral();
    f.agent.switch_identity(&f.aid.did).await;
    ephemeral
        .store("draft", b"x", &f.aid.did, StoreOptions::new())
        .await
        .unwrap();

    let again = f.agent.switch_identity(&f.aid.did).await;
    assert!(again.outcome.is_success());
    assert_eq!(again.purged, 0);
    assert!(ephemeral.exists("draft", &f.aid.did).await.unwrap());
}

#[tokio::test]
async fn feedback_carries_both_identities() {
    let f = fixture().await;
    let mut feedback = f.agent.subscribe_feedback();
    f.agent.switch_identity(&f.root.did).await;
    let _ = feedback.recv().await.unwrap();

    let report = f.agent.switch_identity(&f.dao.did).await;
    let event = feedback.recv().await.unwrap();
    assert_eq!(event.kind, FeedbackKind::Success);
    assert_eq!(event.correlation_id, Some(report.correlation_id));
    assert_eq!(event.previous.unwrap().did, f.root.did);
    assert_eq!(event.current.unwrap().did, f.dao.did);

    f.clock.advance_ms(f.agent.config().feedback.ttl_ms);
    assert!(f.agent.active_feedback().await.unwrap().is_empty());
}

#[tokio::test]
async fn logout_signs_out_and_destroys_auto_destruct_items() {
    let f = fixture().await;
    let ephemeral = f.agent.ephemeral();
    f.agent.switch_identity(&f.root.did).await;
    ephemeral
        .store("cache", b"keep", &f.root.did, StoreOptions::new())
        .await
        .unwrap();
    ephemeral
        .store("otp", b"burn", &f.root.did, StoreOptions::new().auto_destruct())
        .await
        .unwrap();

    let destroyed = f
        .agent
        .handle_lifecycle_signal(LifecycleSignal::Logout)
        .await
        .unwrap();
    assert_eq!(destroyed, Some(1));
    assert_eq!(f.agent.identities().active_id(), None);
    assert!(ephemeral.exists("cache", &f.root.did).await.unwrap());
    assert!(!ephemeral.exists("otp", &f.root.did).await.unwrap());
}
