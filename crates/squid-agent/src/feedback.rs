//! Switch feedback queue
//!
//! Feedback events are short-lived notices for the host UI. The queue keeps
//! at most `max_queued` of them (oldest dropped first), hides events past
//! their `expires_at`, and lets the host dismiss one by id. Every pushed
//! event is also broadcast to subscribers.

use crate::switch::SwitchPhase;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use squid_core::{ConfigValidation, CorrelationId, IdentityId, IdentitySummary, PhysicalTime};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Feedback queue settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// How long an event stays active
    pub ttl_ms: u64,
    /// Most events held at once
    pub max_queued: usize,
    /// Capacity of the broadcast channel
    pub channel_capacity: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 5_000,
            max_queued: 16,
            channel_capacity: 32,
        }
    }
}

impl FeedbackConfig {
    /// Event lifetime as a duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }
}

impl ConfigValidation for FeedbackConfig {
    fn validate(&self) -> Result<(), String> {
        if self.ttl_ms == 0 {
            return Err("feedback.ttl_ms must be positive".into());
        }
        if self.max_queued == 0 {
            return Err("feedback.max_queued must be at least 1".into());
        }
        if self.channel_capacity == 0 {
            return Err("feedback.channel_capacity must be at least 1".into());
        }
        Ok(())
    }
}

/// Feedback event identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedbackId(Uuid);

impl FeedbackId {
    /// Generate a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FeedbackId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FeedbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Feedback severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    /// Operation completed
    Success,
    /// Operation failed
    Error,
    /// Completed with reduced guarantees
    Warning,
    /// Neutral notice
    #[default]
    Info,
}

impl FeedbackKind {
    /// True for [`FeedbackKind::Error`].
    pub fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }
}

/// One host-visible notice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEvent {
    /// Dismissal handle
    pub id: FeedbackId,
    /// Severity
    pub kind: FeedbackKind,
    /// Short heading
    pub title: String,
    /// Body text
    pub message: String,
    /// Identity active before the operation
    pub previous: Option<IdentitySummary>,
    /// Identity active after the operation
    pub current: Option<IdentitySummary>,
    /// Operation this event reports on
    pub correlation_id: Option<CorrelationId>,
    /// When the event was raised
    pub created_at: PhysicalTime,
    /// When the event stops being active
    pub expires_at: PhysicalTime,
}

impl FeedbackEvent {
    /// Event raised at `now` that lives for `ttl`.
    pub fn new(
        kind: FeedbackKind,
        title: impl Into<String>,
        message: impl Into<String>,
        now: PhysicalTime,
        ttl: Duration,
    ) -> Self {
        Self {
            id: FeedbackId::new(),
            kind,
            title: title.into(),
            message: message.into(),
            previous: None,
            current: None,
            correlation_id: None,
            created_at: now,
            expires_at: now.saturating_add(ttl),
        }
    }

    /// Attach the identities on either side of a switch.
    pub fn with_identities(
        mut self,
        previous: Option<IdentitySummary>,
        current: Option<IdentitySummary>,
    ) -> Self {
        self.previous = previous;
        self.current = current;
        self
    }

    /// Link to an operation.
    pub fn with_correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// True once `now` reaches `expires_at`.
    pub fn is_expired(&self, now: PhysicalTime) -> bool {
        now >= self.expires_at
    }
}

/// Progress of the switch in flight, for spinners.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingState {
    /// A switch is in progress
    pub switching: bool,
    /// Identity being switched to
    pub target: Option<IdentityId>,
    /// Phase reached by the most recent switch
    pub phase: SwitchPhase,
}

impl LoadingState {
    /// Nothing in progress.
    pub fn idle() -> Self {
        Self {
            switching: false,
            target: None,
            phase: SwitchPhase::Idle,
        }
    }
}

impl Default for LoadingState {
    fn default() -> Self {
        Self::idle()
    }
}

/// Bounded queue of active feedback events.
pub struct FeedbackQueue {
    config: FeedbackConfig,
    events: Mutex<VecDeque<FeedbackEvent>>,
    tx: broadcast::Sender<FeedbackEvent>,
}

impl FeedbackQueue {
    /// Empty queue.
    pub fn new(config: FeedbackConfig) -> Self {
        let (tx, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            config,
            events: Mutex::new(VecDeque::new()),
            tx,
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &FeedbackConfig {
        &self.config
    }

    /// Receive every event pushed from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedbackEvent> {
        self.tx.subscribe()
    }

    /// Build an event with the configured TTL.
    pub fn event(
        &self,
        kind: FeedbackKind,
        title: impl Into<String>,
        message: impl Into<String>,
        now: PhysicalTime,
    ) -> FeedbackEvent {
        FeedbackEvent::new(kind, title, message, now, self.config.ttl())
    }

    /// Queue and broadcast an event.
    pub fn push(&self, event: FeedbackEvent) -> FeedbackId {
        let id = event.id;
        {
            let mut events = self.events.lock();
            events.push_back(event.clone());
            while events.len() > self.config.max_queued {
                if let Some(dropped) = events.pop_front() {
                    debug!(feedback_id = %dropped.id, "Feedback queue full, dropped oldest");
                }
            }
        }
        // No receivers is fine; the queue still holds the event.
        let _ = self.tx.send(event);
        id
    }

    /// Remove an event, returning whether it was queued.
    pub fn dismiss(&self, id: FeedbackId) -> bool {
        let mut events = self.events.lock();
        let before = events.len();
        events.retain(|e| e.id != id);
        events.len() != before
    }

    /// Unexpired events, oldest first. Expired events are dropped.
    pub fn active(&self, now: PhysicalTime) -> Vec<FeedbackEvent> {
        let mut events = self.events.lock();
        events.retain(|e| !e.is_expired(now));
        events.iter().cloned().collect()
    }

    /// Number of queued events, expired or not.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl fmt::Debug for FeedbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FeedbackQueue")
            .field("config", &self.config)
            .field("queued", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(ms: u64) -> PhysicalTime {
        PhysicalTime::from_millis(ms)
    }

    #[test]
    fn events_expire_after_ttl() {
        let queue = FeedbackQueue::new(FeedbackConfig::default());
        queue.push(queue.event(FeedbackKind::Success, "Switched", "now acting as Alice", at(1_000)));

        assert_eq!(queue.active(at(5_999)).len(), 1);
        assert!(queue.active(at(6_000)).is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn queue_drops_oldest_beyond_bound() {
        let queue = FeedbackQueue::new(FeedbackConfig {
            max_queued: 2,
            ..FeedbackConfig::default()
        });
        let first = queue.push(queue.event(FeedbackKind::Info, "1", "", at(0)));
        queue.push(queue.event(FeedbackKind::Info, "2", "", at(1)));
        queue.push(queue.event(FeedbackKind::Info, "3", "", at(2)));

        let titles: Vec<_> = queue.active(at(3)).into_iter().map(|e| e.title).collect();
        assert_eq!(titles, ["2", "3"]);
        assert!(!queue.dismiss(first));
    }

    #[test]
    fn dismiss_removes_by_id() {
        let queue = FeedbackQueue::new(FeedbackConfig::default());
        let keep = queue.push(queue.event(FeedbackKind::Warning, "keep", "", at(0)));
        let gone = queue.push(queue.event(FeedbackKind::Error, "gone", "", at(0)));

        assert!(queue.dismiss(gone));
        assert!(!queue.dismiss(gone));
        let active = queue.active(at(1));
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, keep);
    }

    #[tokio::test]
    async fn subscribers_receive_pushed_events() {
        let queue = FeedbackQueue::new(FeedbackConfig::default());
        let mut rx = queue.subscribe();
        let id = queue.push(queue.event(FeedbackKind::Error, "Switch failed", "not found", at(0)));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.id, id);
        assert!(event.kind.is_error());
    }

    #[test]
    fn config_rejects_zero_bounds() {
        assert!(FeedbackConfig::default().validate().is_ok());
        let config = FeedbackConfig {
            max_queued: 0,
            ..FeedbackConfig::default()
        };
        assert!(config.validate().unwrap_err().contains("max_queued"));
    }
}
