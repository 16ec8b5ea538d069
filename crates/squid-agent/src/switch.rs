//! Identity switch coordinator
//!
//! One switch walks `Idle → Validating → Resolving → Transitioning →
//! Notifying → {Success | Failed}`:
//!
//! - Validating loads the target and requires it to be ACTIVE.
//! - Resolving recomputes its capability summary. A resolver failure does
//!   not stop the switch; it marks it degraded.
//! - Transitioning purges the previous identity's ephemeral data when that
//!   identity was ephemeral-only (AID), moves the active pointer, and arms
//!   ephemeral mode when the target is AID.
//! - Notifying queues a feedback event with both identity summaries.
//!
//! Every switch writes exactly one `identity.switch` audit entry, whatever
//! its outcome. Starting a switch supersedes any switch still in flight:
//! the older one stops at its next checkpoint and drops its remaining side
//! effects. The commit step is serialized, so the active pointer always ends
//! on the most recently requested target that passed validation.

use crate::error::AgentError;
use crate::feedback::{FeedbackEvent, FeedbackId, FeedbackKind, FeedbackQueue, LoadingState};
use serde::{Deserialize, Serialize};
use squid_audit::{ActionRecord, AuditService};
use squid_authorization::{CapabilityResolver, CapabilitySummary};
use squid_core::{
    AuditEntryId, AuditOutcome, CorrelationId, IdentityId, IdentityStatus, IdentitySummary,
    PhysicalTime, PhysicalTimeEffects,
};
use squid_ephemeral::{should_use_ephemeral_storage, EphemeralStore};
use squid_identity::{IdentityError, IdentityStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tracing::{debug, info, warn};

/// Audit action written for every switch.
pub const SWITCH_ACTION: &str = "identity.switch";

/// Step of a switch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPhase {
    /// No switch has run
    #[default]
    Idle,
    /// Checking the target exists and is ACTIVE
    Validating,
    /// Recomputing capabilities
    Resolving,
    /// Moving the active pointer and ephemeral mode
    Transitioning,
    /// Publishing feedback
    Notifying,
    /// Completed
    Success,
    /// Stopped with a reason
    Failed,
}

impl SwitchPhase {
    /// Stable name used in audit metadata.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Validating => "validating",
            Self::Resolving => "resolving",
            Self::Transitioning => "transitioning",
            Self::Notifying => "notifying",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Success and Failed end a switch.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// How a switch ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SwitchOutcome {
    /// Target is now active
    Success {
        /// Capabilities could not be resolved
        degraded: bool,
    },
    /// Target was not activated
    Failed {
        /// Human-readable cause
        reason: String,
    },
    /// A newer switch took over
    Superseded,
}

impl SwitchOutcome {
    fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// True for [`SwitchOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    fn audit_outcome(&self) -> AuditOutcome {
        match self {
            Self::Success { .. } => AuditOutcome::Allowed,
            Self::Failed { .. } => AuditOutcome::Denied,
            Self::Superseded => AuditOutcome::Error,
        }
    }
}

/// Everything a caller learns about one switch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwitchReport {
    /// Links the audit entry and feedback event
    pub correlation_id: CorrelationId,
    /// Requested identity
    pub target: IdentityId,
    /// Identity active when the switch committed (or started, if it never did)
    pub previous: Option<IdentityId>,
    /// How the switch ended
    pub outcome: SwitchOutcome,
    /// Last working phase entered
    pub phase: SwitchPhase,
    /// Target capabilities, absent when degraded or stopped early
    pub capabilities: Option<CapabilitySummary>,
    /// Ephemeral items purged from the previous identity
    pub purged: usize,
    /// Queued feedback event
    pub feedback_id: Option<FeedbackId>,
    /// Audit entry for this switch
    pub audit_entry: Option<AuditEntryId>,
}

struct SwitchRun {
    generation: u64,
    correlation_id: CorrelationId,
    target: IdentityId,
    phase: SwitchPhase,
    previous: Option<IdentityId>,
    current: Option<IdentitySummary>,
    capabilities: Option<CapabilitySummary>,
    degraded: bool,
    purged: usize,
}

/// Drives identity switches.
pub struct SwitchCoordinator {
    identities: Arc<IdentityStore>,
    resolver: Arc<CapabilityResolver>,
    audit: Arc<AuditService>,
    ephemeral: Arc<EphemeralStore>,
    feedback: Arc<FeedbackQueue>,
    time: Arc<dyn PhysicalTimeEffects>,
    generation: AtomicU64,
    commit: Mutex<()>,
    loading: watch::Sender<LoadingState>,
}

impl SwitchCoordinator {
    /// Coordinator over the shared services.
    pub fn new(
        identities: Arc<IdentityStore>,
        resolver: Arc<CapabilityResolver>,
        audit: Arc<AuditService>,
        ephemeral: Arc<EphemeralStore>,
        feedback: Arc<FeedbackQueue>,
        time: Arc<dyn PhysicalTimeEffects>,
    ) -> Self {
        let (loading, _) = watch::channel(LoadingState::idle());
        Self {
            identities,
            resolver,
            audit,
            ephemeral,
            feedback,
            time,
            generation: AtomicU64::new(0),
            commit: Mutex::new(()),
            loading,
        }
    }

    /// Watch the progress of the latest switch.
    pub fn subscribe_loading_state(&self) -> watch::Receiver<LoadingState> {
        self.loading.subscribe()
    }

    /// Current progress of the latest switch.
    pub fn loading_state(&self) -> LoadingState {
        self.loading.borrow().clone()
    }

    /// Receive every feedback event from now on.
    pub fn subscribe_feedback(&self) -> broadcast::Receiver<FeedbackEvent> {
        self.feedback.subscribe()
    }

    /// Make `target` the active identity.
    pub async fn switch_identity(&self, target: &IdentityId) -> SwitchReport {
        let mut run = SwitchRun {
            generation: self.begin(target),
            correlation_id: CorrelationId::new(),
            target: target.clone(),
            phase: SwitchPhase::Idle,
            previous: self.identities.active_id(),
            current: None,
            capabilities: None,
            degraded: false,
            purged: 0,
        };
        info!(
            correlation_id = %run.correlation_id,
            target = %target,
            previous = ?run.previous,
            "Identity switch requested"
        );

        let outcome = self.drive(&mut run).await;
        let feedback_id = match &outcome {
            SwitchOutcome::Superseded => None,
            outcome => self.notify(&run, outcome).await,
        };
        let audit_entry = self.record(&run, &outcome).await;

        match &outcome {
            SwitchOutcome::Success { degraded } => {
                self.publish(&run, SwitchPhase::Success);
                info!(
                    correlation_id = %run.correlation_id,
                    target = %run.target,
                    degraded,
                    purged = run.purged,
                    "Identity switch completed"
                );
            }
            SwitchOutcome::Failed { reason } => {
                self.publish(&run, SwitchPhase::Failed);
                warn!(
                    correlation_id = %run.correlation_id,
                    target = %run.target,
                    phase = run.phase.as_str(),
                    reason = %reason,
                    "Identity switch failed"
                );
            }
            SwitchOutcome::Superseded => {
                info!(
                    correlation_id = %run.correlation_id,
                    target = %run.target,
                    phase = run.phase.as_str(),
                    "Identity switch superseded"
                );
            }
        }

        SwitchReport {
            correlation_id: run.correlation_id,
            target: run.target,
            previous: run.previous,
            outcome,
            phase: run.phase,
            capabilities: run.capabilities,
            purged: run.purged,
            feedback_id,
            audit_entry,
        }
    }

    /// Clear the active identity (logout), purging it if it was ephemeral-only.
    ///
    /// Any switch still in flight is superseded.
    pub async fn sign_out(&self) -> Result<Option<IdentityId>, AgentError> {
        self.loading.send_modify(|state| {
            self.generation.fetch_add(1, Ordering::SeqCst);
            *state = LoadingState::idle();
        });
        let _commit = self.commit.lock().await;
        let previous = self.identities.clear_active();
        if let Some(prev) = &previous {
            if self.is_ephemeral_only(prev).await {
                let purged = self.ephemeral.disarm(prev).await?;
                debug!(identity_id = %prev, purged, "Purged ephemeral identity on sign-out");
            }
        }
        info!(previous = ?previous, "Signed out");
        Ok(previous)
    }

    async fn drive(&self, run: &mut SwitchRun) -> SwitchOutcome {
        self.enter(run, SwitchPhase::Validating);
        let identity = match self.identities.get(&run.target).await {
            Ok(identity) => identity,
            Err(e) => return SwitchOutcome::failed(e.to_string()),
        };
        if identity.status != IdentityStatus::Active {
            let err = IdentityError::Inactive {
                id: identity.did.clone(),
                status: identity.status,
            };
            return SwitchOutcome::failed(err.to_string());
        }
        run.current = Some(identity.summary());
        if self.is_superseded(run) {
            return SwitchOutcome::Superseded;
        }

        self.enter(run, SwitchPhase::Resolving);
        match self.resolver.summary(&identity) {
            Ok(capabilities) => run.capabilities = Some(capabilities),
            Err(e) => {
                warn!(
                    correlation_id = %run.correlation_id,
                    target = %run.target,
                    error = %e,
                    "Capability resolution failed, continuing degraded"
                );
                run.degraded = true;
            }
        }
        if self.is_superseded(run) {
            return SwitchOutcome::Superseded;
        }

        self.enter(run, SwitchPhase::Transitioning);
        {
            let _commit = self.commit.lock().await;
            if self.is_superseded(run) {
                return SwitchOutcome::Superseded;
            }

            let previous = self.identities.active_id();
            let mut disarmed = None;
            if let Some(prev) = previous.as_ref().filter(|p| **p != run.target) {
                if self.is_ephemeral_only(prev).await {
                    match self.ephemeral.disarm(prev).await {
                        Ok(purged) => {
                            run.purged = purged;
                            disarmed = Some(prev.clone());
                        }
                        Err(e) => {
                            return SwitchOutcome::failed(format!(
                                "cannot purge ephemeral data of {prev}: {e}"
                            ))
                        }
                    }
                }
            }

            if let Err(e) = self.identities.set_active(&run.target).await {
                if let Some(prev) = disarmed {
                    self.ephemeral.arm(&prev);
                }
                return SwitchOutcome::failed(e.to_string());
            }
            if should_use_ephemeral_storage(identity.identity_type) {
                self.ephemeral.arm(&run.target);
            }
            run.previous = previous;
        }

        if self.is_superseded(run) {
            return SwitchOutcome::Superseded;
        }
        self.enter(run, SwitchPhase::Notifying);
        SwitchOutcome::Success {
            degraded: run.degraded,
        }
    }

    async fn notify(&self, run: &SwitchRun, outcome: &SwitchOutcome) -> Option<FeedbackId> {
        let now = match self.now().await {
            Some(now) => now,
            None => return None,
        };
        let name = run
            .current
            .as_ref()
            .map_or_else(|| run.target.to_string(), |s| s.name.clone());
        let (kind, title, message) = match outcome {
            SwitchOutcome::Success { degraded: false } => (
                FeedbackKind::Success,
                "Identity switched",
                format!("Now acting as {name}"),
            ),
            SwitchOutcome::Success { degraded: true } => (
                FeedbackKind::Warning,
                "Identity switched with limited capabilities",
                format!("Now acting as {name}; capabilities could not be resolved"),
            ),
            SwitchOutcome::Failed { reason } => (
                FeedbackKind::Error,
                "Identity switch failed",
                reason.clone(),
            ),
            SwitchOutcome::Superseded => return None,
        };

        let previous = match &run.previous {
            Some(prev) => match self.identities.find(prev).await {
                Ok(found) => found.map(|identity| identity.summary()),
                Err(e) => {
                    debug!(identity_id = %prev, error = %e, "Previous identity unavailable for feedback");
                    None
                }
            },
            None => None,
        };
        let current = if outcome.is_success() {
            run.current.clone()
        } else {
            None
        };

        let event = self
            .feedback
            .event(kind, title, message, now)
            .with_identities(previous, current)
            .with_correlation(run.correlation_id);
        Some(self.feedback.push(event))
    }

    async fn record(&self, run: &SwitchRun, outcome: &SwitchOutcome) -> Option<AuditEntryId> {
        let from = run.previous.as_ref().map(ToString::to_string);
        let mut record = ActionRecord::new(run.target.clone(), SWITCH_ACTION, outcome.audit_outcome())
            .with_correlation(run.correlation_id)
            .with_meta("from", from)
            .with_meta("to", run.target.to_string())
            .with_meta("phase", run.phase.as_str())
            .with_meta("degraded", run.degraded)
            .with_meta("superseded", matches!(outcome, SwitchOutcome::Superseded));
        if let SwitchOutcome::Failed { reason } = outcome {
            record = record.with_reason(reason.clone());
        }

        match self.audit.record(record).await {
            Ok(receipt) => Some(receipt.entry_id),
            Err(e) => {
                warn!(
                    correlation_id = %run.correlation_id,
                    error = %e,
                    "Failed to audit identity switch"
                );
                None
            }
        }
    }

    async fn is_ephemeral_only(&self, id: &IdentityId) -> bool {
        if self.ephemeral.is_armed(id) {
            return true;
        }
        match self.identities.find(id).await {
            Ok(found) => found.is_some_and(|identity| should_use_ephemeral_storage(identity.identity_type)),
            Err(e) => {
                warn!(identity_id = %id, error = %e, "Cannot load previous identity");
                false
            }
        }
    }

    async fn now(&self) -> Option<PhysicalTime> {
        match self.time.physical_time().await {
            Ok(now) => Some(now),
            Err(e) => {
                warn!(error = %e, "Clock unavailable, switch feedback skipped");
                None
            }
        }
    }

    fn begin(&self, target: &IdentityId) -> u64 {
        let mut generation = 0;
        self.loading.send_modify(|state| {
            generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *state = LoadingState {
                switching: true,
                target: Some(target.clone()),
                phase: SwitchPhase::Idle,
            };
        });
        generation
    }

    fn is_superseded(&self, run: &SwitchRun) -> bool {
        self.generation.load(Ordering::SeqCst) != run.generation
    }

    fn enter(&self, run: &mut SwitchRun, phase: SwitchPhase) {
        run.phase = phase;
        debug!(
            correlation_id = %run.correlation_id,
            target = %run.target,
            phase = phase.as_str(),
            "Switch phase"
        );
        self.publish(run, phase);
    }

    /// Update the loading state unless a newer switch owns it.
    fn publish(&self, run: &SwitchRun, phase: SwitchPhase) {
        let generation = run.generation;
        let target = run.target.clone();
        self.loading.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            *state = LoadingState {
                switching: !phase.is_terminal(),
                target: Some(target),
                phase,
            };
            true
        });
    }
}

impl std::fmt::Debug for SwitchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SwitchCoordinator")
            .field("generation", &self.generation.load(Ordering::SeqCst))
            .field("loading", &*self.loading.borrow())
            .finish()
    }
}
