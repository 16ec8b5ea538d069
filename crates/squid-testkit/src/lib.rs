//! sQuid Testkit - deterministic effects and fault injection for tests
//!
//! - [`ControllableClock`]: manually advanced `PhysicalTimeEffects`
//! - [`FlakyKvStore`]: key/value store that can be switched offline
//! - [`RecordingNotifier`], [`RecordingIndexSync`]: hook call capture
//! - [`TestSealer`], [`KeyedBlake3Signer`]: crypto provider stand-ins
//! - [`strategies`]: proptest strategies over core enums

#![allow(clippy::unwrap_used, clippy::expect_used)]

pub mod clock;
pub mod crypto;
pub mod hooks;
pub mod storage;
pub mod strategies;

pub use clock::ControllableClock;
pub use crypto::{KeyedBlake3Signer, TestSealer};
pub use hooks::{FailingModuleRegistry, RecordingIndexSync, RecordingNotifier};
pub use storage::FlakyKvStore;

/// Install a test-writer tracing subscriber once; later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
