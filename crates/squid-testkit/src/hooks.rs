//! Recording collaborator hooks

use async_trait::async_trait;
use parking_lot::Mutex;
use squid_core::{
    HookError, IdentityId, IndexSync, ModuleDescriptor, ModuleRegistry, RegistryError,
    SecurityEvent, SecurityNotifier,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Captures every security escalation.
#[derive(Debug, Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<SecurityEvent>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingNotifier {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail with `HookError::Unavailable`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Events delivered so far
    pub fn events(&self) -> Vec<SecurityEvent> {
        self.events.lock().clone()
    }
}

#[async_trait]
impl SecurityNotifier for RecordingNotifier {
    async fn notify_security_team(&self, event: &SecurityEvent) -> Result<(), HookError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HookError::unavailable("notifier offline"));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}

/// Captures every index sync request.
#[derive(Debug, Clone, Default)]
pub struct RecordingIndexSync {
    synced: Arc<Mutex<Vec<IdentityId>>>,
    failing: Arc<AtomicBool>,
}

impl RecordingIndexSync {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent calls fail with `HookError::Unavailable`
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Identities synced so far, in call order
    pub fn synced(&self) -> Vec<IdentityId> {
        self.synced.lock().clone()
    }
}

#[async_trait]
impl IndexSync for RecordingIndexSync {
    async fn sync_with_qindex(&self, identity: &IdentityId) -> Result<(), HookError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(HookError::unavailable("index offline"));
        }
        self.synced.lock().push(identity.clone());
        Ok(())
    }
}

/// Module registry that is always unreachable.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingModuleRegistry;

impl ModuleRegistry for FailingModuleRegistry {
    fn modules(&self) -> Result<Vec<ModuleDescriptor>, RegistryError> {
        Err(RegistryError::unavailable("registry offline"))
    }
}
