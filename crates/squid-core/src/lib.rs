//! sQuid Core - Identity Core Foundation
//!
//! Foundational types and effect interfaces shared by every crate of the
//! sQuid identity core. This crate holds data and trait signatures only;
//! behavior lives in the layered crates above it.
//!
//! # Contents
//!
//! - Identifiers: `IdentityId` (DID), `AuditEntryId`, `SecurityFlagId`, `CorrelationId`
//! - Data model: `Identity`, `AuditEntry`, `SecurityFlag`, `EphemeralItem`
//! - Effects: time, key/value storage, repositories, crypto provider,
//!   security notifier, index sync, module registry
//! - Errors: `StorageError`, `TimeError`, `RegistryError`, `HookError`
//!
//! # Persisted namespaces
//!
//! Durable backends keep three independent key spaces, see [`effects::storage::namespace`]:
//! identities by DID, audit entries by per-identity append order, and
//! ephemeral items by `identityId:key`.

#![forbid(unsafe_code)]

/// Audit log and security flag data model
pub mod audit;

/// Configuration validation trait
pub mod config;

/// Ephemeral item data model
pub mod ephemeral;

/// Pure effect interfaces plus the small default handlers
pub mod effects;

/// Error types shared across crates
pub mod errors;

/// Identity and DID identifiers
pub mod identifiers;

/// Identity tree data model
pub mod identity;

/// Physical time representation
pub mod time;

pub use audit::{AuditEntry, AuditOutcome, FlagType, SecurityFlag, Severity};
pub use config::ConfigValidation;
pub use effects::{
    AuditRepository, AuditSigner, EphemeralRepository, IdentityRepository, IndexSync,
    KvStore, MemoryKvStore, ModuleCategory, ModuleDescriptor, ModuleRegistry, PayloadSealer,
    PhysicalTimeEffects, SecurityEvent, SecurityNotifier, SystemClock,
};
pub use ephemeral::{EphemeralItem, EphemeralPayload};
pub use errors::{HookError, RegistryError, StorageError, TimeError};
pub use identifiers::{AuditEntryId, CorrelationId, IdentityId, SecurityFlagId};
pub use identity::{
    CreationRules, GovernanceLevel, Identity, IdentityStatus, IdentitySummary, IdentityType,
    KycStatus, PrivacyLevel,
};
pub use time::PhysicalTime;
