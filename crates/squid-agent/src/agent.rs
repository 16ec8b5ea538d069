//! Service wiring and the audited authorization facade

use crate::config::SquidConfig;
use crate::error::{AgentError, ConfigError};
use crate::feedback::{FeedbackEvent, FeedbackId, FeedbackQueue, LoadingState};
use crate::switch::{SwitchCoordinator, SwitchReport};
use squid_audit::{ActionRecord, AnomalyReport, AuditService, FlagRequest, MemoryAuditRepository};
use squid_authorization::{CapabilityResolver, Decision, ResolveRequest, StaticModuleRegistry};
use squid_core::{
    AuditOutcome, AuditRepository, AuditSigner, ConfigValidation, CorrelationId,
    EphemeralRepository, IdentityId, IdentityRepository, IndexSync, ModuleRegistry,
    PayloadSealer, PhysicalTimeEffects, SecurityFlag, SecurityFlagId, SecurityNotifier,
    SystemClock,
};
use squid_ephemeral::{spawn_sweeper, EphemeralStore, LifecycleSignal, SweeperHandle};
use squid_identity::{IdentityStore, MemoryIdentityRepository};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};

/// Audit action used when a request names only a module.
pub const MODULE_ACCESS_ACTION: &str = "module.access";

/// Collects backends and collaborators, then wires a [`SquidAgent`].
///
/// Anything left unset falls back to an in-memory backend, the system clock
/// or the built-in module catalog.
#[derive(Default)]
pub struct SquidAgentBuilder {
    config: SquidConfig,
    time: Option<Arc<dyn PhysicalTimeEffects>>,
    identity_repo: Option<Arc<dyn IdentityRepository>>,
    audit_repo: Option<Arc<dyn AuditRepository>>,
    ephemeral_mirror: Option<Arc<dyn EphemeralRepository>>,
    registry: Option<Arc<dyn ModuleRegistry>>,
    signer: Option<Arc<dyn AuditSigner>>,
    sealer: Option<Arc<dyn PayloadSealer>>,
    notifier: Option<Arc<dyn SecurityNotifier>>,
    index_sync: Option<Arc<dyn IndexSync>>,
}

impl SquidAgentBuilder {
    /// Builder over `config`.
    pub fn new(config: SquidConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Clock for every service.
    pub fn with_time(mut self, time: Arc<dyn PhysicalTimeEffects>) -> Self {
        self.time = Some(time);
        self
    }

    /// Identity backend.
    pub fn with_identity_repository(mut self, repo: Arc<dyn IdentityRepository>) -> Self {
        self.identity_repo = Some(repo);
        self
    }

    /// Audit backend.
    pub fn with_audit_repository(mut self, repo: Arc<dyn AuditRepository>) -> Self {
        self.audit_repo = Some(repo);
        self
    }

    /// Durable copy of ephemeral items.
    pub fn with_ephemeral_mirror(mut self, mirror: Arc<dyn EphemeralRepository>) -> Self {
        self.ephemeral_mirror = Some(mirror);
        self
    }

    /// Module catalog for the privacy gate.
    pub fn with_module_registry(mut self, registry: Arc<dyn ModuleRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Audit entry signer.
    pub fn with_signer(mut self, signer: Arc<dyn AuditSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Ephemeral payload sealer.
    pub fn with_sealer(mut self, sealer: Arc<dyn PayloadSealer>) -> Self {
        self.sealer = Some(sealer);
        self
    }

    /// Security team escalation hook.
    pub fn with_notifier(mut self, notifier: Arc<dyn SecurityNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Qindex sync hook.
    pub fn with_index_sync(mut self, index: Arc<dyn IndexSync>) -> Self {
        self.index_sync = Some(index);
        self
    }

    /// Validate the config and wire the services.
    pub fn build(self) -> Result<SquidAgent, AgentError> {
        self.config.validate().map_err(ConfigError::invalid)?;
        let config = self.config;

        let time: Arc<dyn PhysicalTimeEffects> = match self.time {
            Some(time) => time,
            None => Arc::new(SystemClock),
        };
        let identity_repo: Arc<dyn IdentityRepository> = match self.identity_repo {
            Some(repo) => repo,
            None => Arc::new(MemoryIdentityRepository::new()),
        };
        let audit_repo: Arc<dyn AuditRepository> = match self.audit_repo {
            Some(repo) => repo,
            None => Arc::new(MemoryAuditRepository::new()),
        };
        let registry: Arc<dyn ModuleRegistry> = match self.registry {
            Some(registry) => registry,
            None => Arc::new(StaticModuleRegistry::default()),
        };

        let identities = Arc::new(IdentityStore::new(
            identity_repo,
            time.clone(),
            config.identity.clone(),
        ));

        let resolver = Arc::new(CapabilityResolver::from_config(registry, &config.resolver));

        let mut audit = AuditService::new(audit_repo, time.clone(), config.audit.clone());
        if let Some(signer) = self.signer {
            audit = audit.with_signer(signer);
        }
        if let Some(notifier) = self.notifier {
            audit = audit.with_notifier(notifier);
        }
        if let Some(index) = self.index_sync {
            audit = audit.with_index_sync(index);
        }
        let audit = Arc::new(audit);

        let mut ephemeral = EphemeralStore::new(time.clone(), config.ephemeral.clone());
        if let Some(mirror) = self.ephemeral_mirror {
            ephemeral = ephemeral.with_mirror(mirror);
        }
        if let Some(sealer) = self.sealer {
            ephemeral = ephemeral.with_sealer(sealer);
        }
        let ephemeral = Arc::new(ephemeral);

        let feedback = Arc::new(FeedbackQueue::new(config.feedback.clone()));
        let coordinator = Arc::new(SwitchCoordinator::new(
            identities.clone(),
            resolver.clone(),
            audit.clone(),
            ephemeral.clone(),
            feedback.clone(),
            time.clone(),
        ));

        info!("sQuid agent ready");
        Ok(SquidAgent {
            config,
            time,
            identities,
            resolver,
            audit,
            ephemeral,
            feedback,
            coordinator,
        })
    }
}

/// The identity core with every service wired together.
pub struct SquidAgent {
    config: SquidConfig,
    time: Arc<dyn PhysicalTimeEffects>,
    identities: Arc<IdentityStore>,
    resolver: Arc<CapabilityResolver>,
    audit: Arc<AuditService>,
    ephemeral: Arc<EphemeralStore>,
    feedback: Arc<FeedbackQueue>,
    coordinator: Arc<SwitchCoordinator>,
}

impl SquidAgent {
    /// Start configuring an agent.
    pub fn builder(config: SquidConfig) -> SquidAgentBuilder {
        SquidAgentBuilder::new(config)
    }

    /// Agent over in-memory backends and the system clock.
    pub fn in_memory(config: SquidConfig) -> Result<Self, AgentError> {
        SquidAgentBuilder::new(config).build()
    }

    /// Active configuration.
    pub fn config(&self) -> &SquidConfig {
        &self.config
    }

    /// Identity tree and active pointer.
    pub fn identities(&self) -> &Arc<IdentityStore> {
        &self.identities
    }

    /// Capability resolver.
    pub fn resolver(&self) -> &Arc<CapabilityResolver> {
        &self.resolver
    }

    /// Audit subsystem.
    pub fn audit(&self) -> &Arc<AuditService> {
        &self.audit
    }

    /// Ephemeral store.
    pub fn ephemeral(&self) -> &Arc<EphemeralStore> {
        &self.ephemeral
    }

    /// Switch coordinator.
    pub fn coordinator(&self) -> &Arc<SwitchCoordinator> {
        &self.coordinator
    }

    /// Decide `action` and/or `module` for an identity and audit the decision.
    pub async fn authorize(
        &self,
        identity_id: &IdentityId,
        action: Option<&str>,
        module: Option<&str>,
    ) -> Result<Decision, AgentError> {
        let request = ResolveRequest {
            action: action.map(str::to_string),
            module: module.map(str::to_string),
            balance: None,
        };
        self.authorize_request(identity_id, &request).await
    }

    /// [`SquidAgent::authorize`] with a full request.
    ///
    /// The audit entry carries the reason, the denying rule and any
    /// advisories. A degraded audit backend queues the entry and a failed
    /// audit write is logged; neither changes the decision.
    pub async fn authorize_request(
        &self,
        identity_id: &IdentityId,
        request: &ResolveRequest,
    ) -> Result<Decision, AgentError> {
        let identity = self.identities.get(identity_id).await?;
        let decision = self.resolver.resolve_request(&identity, request);

        let outcome = if decision.allowed {
            AuditOutcome::Allowed
        } else {
            AuditOutcome::Denied
        };
        let action = request.action.as_deref().unwrap_or(MODULE_ACCESS_ACTION);
        let mut record = ActionRecord::new(identity_id.clone(), action, outcome)
            .with_correlation(CorrelationId::new())
            .with_reason(decision.reason.clone());
        if let Some(module) = &request.module {
            record = record.with_module(module.clone());
        }
        if let Some(rule) = decision.rule {
            if let Ok(rule) = serde_json::to_value(rule) {
                record = record.with_meta("rule", rule);
            }
        }
        if let Some(denial) = &decision.denial {
            if let Ok(denial) = serde_json::to_value(denial) {
                record = record.with_meta("denial", denial);
            }
        }
        if !decision.advisories.is_empty() {
            let advisories: Vec<&str> = decision.advisories.iter().map(|a| a.message()).collect();
            record = record.with_meta("advisories", advisories);
        }
        if let Some(role) = &decision.required_role {
            record = record.with_meta("required_role", role.clone());
        }
        if let Some(balance) = decision.required_balance {
            record = record.with_meta("required_balance", balance);
        }

        // Audit outages never change the decision.
        match self.audit.record(record).await {
            Ok(receipt) => debug!(
                identity_id = %identity_id,
                action,
                allowed = decision.allowed,
                entry_id = %receipt.entry_id,
                status = ?receipt.status,
                "Authorization decided"
            ),
            Err(e) => error!(
                identity_id = %identity_id,
                action,
                allowed = decision.allowed,
                error = %e,
                "Authorization decided but audit write failed"
            ),
        }
        Ok(decision)
    }

    /// Make `target` the active identity.
    pub async fn switch_identity(&self, target: &IdentityId) -> SwitchReport {
        self.coordinator.switch_identity(target).await
    }

    /// Clear the active identity.
    pub async fn sign_out(&self) -> Result<Option<IdentityId>, AgentError> {
        self.coordinator.sign_out().await
    }

    /// Feed a host lifecycle signal to the ephemeral store.
    ///
    /// Logout also signs out. Returns the number of items a cleanup destroyed.
    pub async fn handle_lifecycle_signal(
        &self,
        signal: LifecycleSignal,
    ) -> Result<Option<usize>, AgentError> {
        if signal == LifecycleSignal::Logout {
            self.sign_out().await?;
        }
        Ok(self.ephemeral.handle_signal(signal).await?)
    }

    /// Raise a security flag and attach it to the identity.
    pub async fn raise_flag(&self, request: FlagRequest) -> Result<SecurityFlag, AgentError> {
        let flag = self.audit.flag_security_event(request).await?;
        self.attach_flag(&flag.identity_id, flag.id).await;
        Ok(flag)
    }

    /// Resolve a flag and detach it from the identity.
    pub async fn resolve_flag(
        &self,
        flag_id: &SecurityFlagId,
        resolved_by: &str,
    ) -> Result<SecurityFlag, AgentError> {
        let flag = self.audit.resolve_security_flag(flag_id, resolved_by).await?;
        if let Err(e) = self.identities.clear_flag(&flag.identity_id, flag.id).await {
            warn!(flag_id = %flag.id, error = %e, "Cannot detach resolved flag from identity");
        }
        Ok(flag)
    }

    /// Run anomaly detection; flags it raises are attached to the identity.
    pub async fn scan_for_anomalies(
        &self,
        identity_id: &IdentityId,
        window_ms: u64,
    ) -> Result<AnomalyReport, AgentError> {
        let report = self.audit.detect_anomalies(identity_id, window_ms).await?;
        for flag in &report.raised_flags {
            self.attach_flag(identity_id, *flag).await;
        }
        Ok(report)
    }

    async fn attach_flag(&self, identity_id: &IdentityId, flag: SecurityFlagId) {
        if let Err(e) = self.identities.record_flag(identity_id, flag).await {
            warn!(identity_id = %identity_id, flag_id = %flag, error = %e, "Cannot attach flag to identity");
        }
    }

    /// Start the periodic ephemeral sweep on the current runtime.
    pub fn spawn_sweeper(&self) -> SweeperHandle {
        spawn_sweeper(self.ephemeral.clone())
    }

    /// Receive every switch feedback event from now on.
    pub fn subscribe_feedback(&self) -> broadcast::Receiver<FeedbackEvent> {
        self.feedback.subscribe()
    }

    /// Watch switch progress.
    pub fn subscribe_loading_state(&self) -> watch::Receiver<LoadingState> {
        self.coordinator.subscribe_loading_state()
    }

    /// Feedback events that have not expired.
    pub async fn active_feedback(&self) -> Result<Vec<FeedbackEvent>, AgentError> {
        let now = self.time.physical_time().await?;
        Ok(self.feedback.active(now))
    }

    /// Dismiss a feedback event by id.
    pub fn dismiss_feedback(&self, id: FeedbackId) -> bool {
        self.feedback.dismiss(id)
    }
}

impl std::fmt::Debug for SquidAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SquidAgent")
            .field("active", &self.identities.active_id())
            .field("ephemeral", &self.ephemeral)
            .field("feedback", &self.feedback)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use squid_core::{
        AuditEntry, AuditRepository, FlagType, PhysicalTime, SecurityFlag, SecurityFlagId,
        Severity, StorageError,
    };
    use squid_identity::RootAttributes;
    use squid_testkit::ControllableClock;

    fn agent() -> SquidAgent {
        SquidAgent::builder(SquidConfig::default())
            .with_time(Arc::new(ControllableClock::default()))
            .build()
            .unwrap()
    }

    #[test]
    fn build_rejects_invalid_config() {
        let mut config = SquidConfig::default();
        config.feedback.ttl_ms = 0;
        assert_matches!(
            SquidAgent::in_memory(config),
            Err(AgentError::Config(ConfigError::Invalid { .. }))
        );
    }

    #[tokio::test]
    async fn module_only_request_is_audited_as_module_access() {
        let agent = agent();
        let root = agent
            .identities()
            .bootstrap_root(RootAttributes::named("Alice"))
            .await
            .unwrap();

        let decision = agent.authorize(&root.did, None, Some("qmail")).await.unwrap();
        assert!(decision.allowed);

        let log = agent.audit().entries(&root.did).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].action, MODULE_ACCESS_ACTION);
        assert_eq!(log[0].module(), Some("qmail"));
        assert_eq!(log[0].outcome, AuditOutcome::Allowed);
    }

    /// Audit backend that rejects every append.
    struct RejectingAuditRepository(MemoryAuditRepository);

    #[async_trait::async_trait]
    impl AuditRepository for RejectingAuditRepository {
        async fn append(&self, _entry: &AuditEntry) -> Result<(), StorageError> {
            Err(StorageError::backend("audit table is read-only"))
        }

        async fn entries(&self, identity: &IdentityId) -> Result<Vec<AuditEntry>, StorageError> {
            self.0.entries(identity).await
        }

        async fn identities(&self) -> Result<Vec<IdentityId>, StorageError> {
            self.0.identities().await
        }

        async fn purge_before(
            &self,
            identity: &IdentityId,
            cutoff: PhysicalTime,
        ) -> Result<usize, StorageError> {
            self.0.purge_before(identity, cutoff).await
        }

        async fn put_flag(&self, flag: &SecurityFlag) -> Result<(), StorageError> {
            self.0.put_flag(flag).await
        }

        async fn get_flag(&self, id: &SecurityFlagId) -> Result<Option<SecurityFlag>, StorageError> {
            self.0.get_flag(id).await
        }

        async fn flags(
            &self,
            identity: Option<&IdentityId>,
        ) -> Result<Vec<SecurityFlag>, StorageError> {
            self.0.flags(identity).await
        }
    }

    #[tokio::test]
    async fn failed_audit_write_leaves_decision_intact() {
        let agent = SquidAgent::builder(SquidConfig::default())
            .with_time(Arc::new(ControllableClock::default()))
            .with_audit_repository(Arc::new(RejectingAuditRepository(
                MemoryAuditRepository::new(),
            )))
            .build()
            .unwrap();
        let root = agent
            .identities()
            .bootstrap_root(RootAttributes::named("Alice"))
            .await
            .unwrap();
        let minor = agent
            .identities()
            .create_sub_identity(
                &root.did,
                squid_core::IdentityType::Consentida,
                squid_identity::SubIdentityAttributes::named("Kid"),
            )
            .await
            .unwrap();

        let allowed = agent.authorize(&root.did, Some("content.read"), None).await.unwrap();
        assert!(allowed.allowed);
        let denied = agent
            .authorize(&minor.did, Some("financial.transfer"), None)
            .await
            .unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.reason, "insufficient permissions");
    }

    #[tokio::test]
    async fn unknown_identity_is_an_error_not_a_denial() {
        let agent = agent();
        let result = agent
            .authorize(&IdentityId::new("did:squid:nobody"), Some("content.read"), None)
            .await;
        assert_matches!(result, Err(AgentError::Identity(_)));
    }

    #[tokio::test]
    async fn flags_are_attached_and_detached() {
        let agent = agent();
        let root = agent
            .identities()
            .bootstrap_root(RootAttributes::named("Alice"))
            .await
            .unwrap();

        let flag = agent
            .raise_flag(FlagRequest::new(
                root.did.clone(),
                FlagType::PolicyViolation,
                Severity::Medium,
                "manual review",
            ))
            .await
            .unwrap();
        let stored = agent.identities().get(&root.did).await.unwrap();
        assert!(stored.security_flags.contains(&flag.id));

        agent.resolve_flag(&flag.id, "analyst").await.unwrap();
        let stored = agent.identities().get(&root.did).await.unwrap();
        assert!(stored.security_flags.is_empty());
    }
}
