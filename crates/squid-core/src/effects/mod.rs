//! Effect interfaces
//!
//! Trait definitions for every side effect the identity core performs or
//! consumes. Domain crates are parameterized by these traits so tests can
//! drive time, inject storage faults, and record hook invocations.
//!
//! # Effect Classification
//!
//! - **Infrastructure**: `PhysicalTimeEffects`, `KvStore`
//! - **Repositories**: `IdentityRepository`, `AuditRepository`, `EphemeralRepository`
//! - **Collaborators**: `PayloadSealer`, `AuditSigner`, `SecurityNotifier`,
//!   `IndexSync`, `ModuleRegistry`
//!
//! Only `SystemClock` and `MemoryKvStore` have handlers here; everything else
//! is implemented by the domain crates or by the host.

pub mod crypto;
pub mod hooks;
pub mod registry;
pub mod repository;
pub mod storage;
pub mod time;

pub use crypto::{AuditSigner, PayloadSealer};
pub use hooks::{IndexSync, SecurityEvent, SecurityNotifier};
pub use registry::{ModuleCategory, ModuleDescriptor, ModuleRegistry};
pub use repository::{AuditRepository, EphemeralRepository, IdentityRepository};
pub use storage::{decode_json, encode_json, namespace, KvStore, MemoryKvStore};
pub use time::{PhysicalTimeEffects, SystemClock};
