//! End-to-end identity scenarios through the wired agent.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use assert_matches::assert_matches;
use squid_agent::{SquidAgent, SquidConfig, SwitchOutcome};
use squid_authorization::DenialKind;
use squid_core::time::HOUR_MS;
use squid_audit::FlagRequest;
use squid_core::{AuditOutcome, FlagType, IdentityType, PrivacyLevel, SecurityEvent, Severity};
use squid_ephemeral::StoreOptions;
use squid_identity::{IdentityError, RootAttributes, SubIdentityAttributes, ValidationError};
use squid_testkit::{ControllableClock, RecordingNotifier};
use std::sync::Arc;

fn agent_with(config: SquidConfig) -> (SquidAgent, ControllableClock) {
    squid_testkit::init_test_tracing();
    let clock = ControllableClock::new(1_700_000_000_000);
    let agent = SquidAgent::builder(config)
        .with_time(Arc::new(clock.clone()))
        .build()
        .unwrap();
    (agent, clock)
}

fn agent() -> (SquidAgent, ControllableClock) {
    agent_with(SquidConfig::default())
}

#[tokio::test]
async fn scenario_a_depth_limit_stops_second_level_creation() {
    let mut config = SquidConfig::default();
    config.identity.max_depth = 1;
    let (agent, _) = agent_with(config);
    let identities = agent.identities();

    let root = identities
        .bootstrap_root(RootAttributes::named("Alice"))
        .await
        .unwrap();
    assert_eq!(root.depth, 0);
    assert_eq!(root.privacy_level, PrivacyLevel::Public);
    assert!(!root.kyc.required);

    let dao = identities
        .create_sub_identity(&root.did, IdentityType::Dao, SubIdentityAttributes::named("Guild"))
        .await
        .unwrap();
    assert_eq!(dao.depth, 1);

    let enterprise = identities
        .create_sub_identity(
            &root.did,
            IdentityType::Enterprise,
            SubIdentityAttributes::named("Acme"),
        )
        .await
        .unwrap();
    let err = identities
        .create_sub_identity(&enterprise.did, IdentityType::Aid, SubIdentityAttributes::named("x"))
        .await
        .unwrap_err();
    assert_matches!(
        err.as_validation(),
        Some(ValidationError::DepthExceeded { .. })
    );

    let tree = identities.get_tree(&root.did).await.unwrap();
    assert_eq!(tree.len(), 3);
}

#[tokio::test]
async fn scenario_b_consentida_transfer_is_a_permission_denial() {
    let (agent, _) = agent();
    let root = agent
        .identities()
        .bootstrap_root(RootAttributes::named("Parent"))
        .await
        .unwrap();
    let minor = agent
        .identities()
        .create_sub_identity(
            &root.did,
            IdentityType::Consentida,
            SubIdentityAttributes::named("Kid"),
        )
        .await
        .unwrap();

    let decision = agent
        .authorize(&minor.did, Some("financial.transfer"), None)
        .await
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.reason, "insufficient permissions");
    assert!(!matches!(decision.denial, Some(DenialKind::KycRequired { .. })));

    let log = agent.audit().entries(&minor.did).await.unwrap();
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].outcome, AuditOutcome::Denied);
    assert_eq!(log[0].reason(), Some("insufficient permissions"));
}

#[tokio::test]
async fn scenario_c_aid_module_gate_and_purge_on_leave() {
    let (agent, _) = agent();
    let root = agent
        .identities()
        .bootstrap_root(RootAttributes::named("Alice"))
        .await
        .unwrap();
    let aid = agent
        .identities()
        .create_sub_identity(&root.did, IdentityType::Aid, SubIdentityAttributes::named("anon"))
        .await
        .unwrap();
    assert_eq!(aid.privacy_level, PrivacyLevel::Anonymous);

    assert!(!agent.authorize(&aid.did, None, Some("qsocial")).await.unwrap().allowed);
    assert!(!agent.authorize(&aid.did, None, Some("qindex")).await.unwrap().allowed);
    assert!(agent.authorize(&aid.did, None, Some("qlock")).await.unwrap().allowed);

    let report = agent.switch_identity(&aid.did).await;
    assert!(report.outcome.is_success());
    for key in ["session", "draft", "keys"] {
        agent
            .ephemeral()
            .store(key, b"secret", &aid.did, StoreOptions::new())
            .await
            .unwrap();
    }

    let report = agent.switch_identity(&root.did).await;
    assert_eq!(report.purged, 3);
    let stats = agent.ephemeral().get_storage_stats(&aid.did).await.unwrap();
    assert_eq!(stats.items, 0);
}

#[tokio::test]
async fn scenario_d_unapproved_kyc_denies_and_audits() {
    let (agent, _) = agent();
    let root = agent
        .identities()
        .bootstrap_root(RootAttributes::named("Alice"))
        .await
        .unwrap();
    let dao = agent
        .identities()
        .create_sub_identity(
            &root.did,
            IdentityType::Dao,
            SubIdentityAttributes::named("Guild").with_kyc_required(true),
        )
        .await
        .unwrap();
    assert!(dao.kyc.required && !dao.kyc.approved);

    for action in ["governance.vote", "financial.transaction"] {
        let decision = agent.authorize(&dao.did, Some(action), None).await.unwrap();
        assert!(!decision.allowed, "{action} should be denied");
        assert_eq!(decision.reason, "KYC verification required");
        assert_matches!(decision.denial, Some(DenialKind::KycRequired { .. }));
    }

    let log = agent.audit().entries(&dao.did).await.unwrap();
    let actions: Vec<_> = log.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, ["governance.vote", "financial.transaction"]);
    for entry in &log {
        assert_eq!(entry.outcome, AuditOutcome::Denied);
        assert_eq!(entry.reason(), Some("KYC verification required"));
    }

    agent.identities().approve_kyc(&dao.did).await.unwrap();
    let decision = agent
        .authorize(&dao.did, Some("governance.vote"), None)
        .await
        .unwrap();
    assert!(decision.allowed);
}

#[tokio::test]
async fn scenario_e_burst_of_actions_is_a_rate_anomaly() {
    let (agent, clock) = agent();
    let root = agent
        .identities()
        .bootstrap_root(RootAttributes::named("Alice"))
        .await
        .unwrap();

    for _ in 0..100 {
        agent
            .authorize(&root.did, Some("message.send"), Some("qmail"))
            .await
            .unwrap();
        clock.advance_ms(10);
    }

    let report = agent.scan_for_anomalies(&root.did, HOUR_MS).await.unwrap();
    assert_eq!(report.events_in_window, 100);
    let rate = report
        .matches
        .iter()
        .find(|m| m.pattern == FlagType::RateAnomaly)
        .expect("rate anomaly");
    assert!(!rate.evidence.is_empty());

    let log = agent.audit().entries(&root.did).await.unwrap();
    assert!(rate.evidence.iter().all(|id| log.iter().any(|e| &e.id == id)));
}

#[tokio::test]
async fn auto_flagged_anomalies_are_attached_to_the_identity() {
    let mut config = SquidConfig::default();
    config.audit.anomaly.auto_flag = true;
    let (agent, clock) = agent_with(config);
    let root = agent
        .identities()
        .bootstrap_root(RootAttributes::named("Alice"))
        .await
        .unwrap();
    for _ in 0..100 {
        agent
            .authorize(&root.did, Some("message.send"), None)
            .await
            .unwrap();
        clock.advance_ms(10);
    }

    let report = agent.scan_for_anomalies(&root.did, HOUR_MS).await.unwrap();
    assert!(!report.raised_flags.is_empty());
    let stored = agent.identities().get(&root.did).await.unwrap();
    for flag in &report.raised_flags {
        assert!(stored.security_flags.contains(flag));
    }
}

#[tokio::test]
async fn switching_to_a_missing_identity_reports_failure() {
    let (agent, clock) = agent();
    let ghost = squid_core::IdentityId::new("did:squid:ghost");

    let report = agent.switch_identity(&ghost).await;
    assert_matches!(report.outcome, SwitchOutcome::Failed { .. });
    assert_matches!(
        agent.identities().get(&ghost).await,
        Err(IdentityError::NotFound(_))
    );

    let feedback = agent.active_feedback().await.unwrap();
    assert_eq!(feedback.len(), 1);
    assert!(agent.dismiss_feedback(feedback[0].id));

    clock.advance_ms(10);
    assert!(agent.active_feedback().await.unwrap().is_empty());
}

#[tokio::test]
async fn sibling_probing_is_reported_as_a_coordinated_pattern() {
    squid_testkit::init_test_tracing();
    let clock = ControllableClock::new(1_700_000_000_000);
    let notifier = Arc::new(RecordingNotifier::new());
    let agent = SquidAgent::builder(SquidConfig::default())
        .with_time(Arc::new(clock.clone()))
        .with_notifier(notifier.clone())
        .build()
        .unwrap();
    let identities = agent.identities();
    let root = identities
        .bootstrap_root(RootAttributes::named("Parent"))
        .await
        .unwrap();
    let mut kids = Vec::new();
    for name in ["Kid A", "Kid B"] {
        let kid = identities
            .create_sub_identity(
                &root.did,
                IdentityType::Consentida,
                SubIdentityAttributes::named(name),
            )
            .await
            .unwrap();
        kids.push(kid.did);
    }
    let guild = identities
        .create_sub_identity(&root.did, IdentityType::Dao, SubIdentityAttributes::named("Guild"))
        .await
        .unwrap();

    for kid in &kids {
        for _ in 0..5 {
            let decision = agent
                .authorize(kid, Some("financial.transfer"), None)
                .await
                .unwrap();
            assert!(!decision.allowed);
            clock.advance_ms(100);
        }
    }
    agent
        .authorize(&guild.did, Some("content.read"), None)
        .await
        .unwrap();

    let mut scanned = kids.clone();
    scanned.push(guild.did.clone());
    let patterns = agent
        .audit()
        .detect_cross_identity_patterns(&scanned, 60_000)
        .await
        .unwrap();
    assert_eq!(patterns.len(), 1);
    assert_eq!(patterns[0].pattern, FlagType::ProbingSequence);
    assert_eq!(patterns[0].signature, "PROBING_SEQUENCE:financial.transfer");
    let mut expected = kids.clone();
    expected.sort();
    assert_eq!(patterns[0].identities, expected);
    assert_eq!(patterns[0].evidence.len(), 10);
    assert_matches!(
        notifier.events().as_slice(),
        [SecurityEvent::CoordinatedPattern { identities, .. }] if identities == &expected
    );

    // Flags raised 1 ms apart across a whole-minute mark still correlate.
    clock.set_ms(1_700_000_039_999);
    agent
        .raise_flag(FlagRequest::new(
            kids[0].clone(),
            FlagType::ProbingSequence,
            Severity::Medium,
            "repeated denied transfers",
        ))
        .await
        .unwrap();
    clock.advance_ms(1);
    agent
        .raise_flag(FlagRequest::new(
            kids[1].clone(),
            FlagType::ProbingSequence,
            Severity::Medium,
            "repeated denied transfers",
        ))
        .await
        .unwrap();

    let correlated = agent.audit().correlate_security_events(60_000).await.unwrap();
    assert_eq!(correlated.len(), 1);
    assert_eq!(correlated[0].identities, expected);
    assert_eq!(correlated[0].flags.len(), 2);
}
