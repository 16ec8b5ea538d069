//! Repository interfaces
//!
//! Injected in place of process-wide maps. Each domain crate ships an
//! in-memory backend and a backend layered over [`super::KvStore`].

use crate::audit::{AuditEntry, SecurityFlag};
use crate::ephemeral::EphemeralItem;
use crate::errors::StorageError;
use crate::identifiers::{IdentityId, SecurityFlagId};
use crate::identity::Identity;
use crate::time::PhysicalTime;
use async_trait::async_trait;

/// Persistence for identity records.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// Load one identity.
    async fn get(&self, id: &IdentityId) -> Result<Option<Identity>, StorageError>;

    /// Insert or replace the given identities.
    async fn put_all(&self, identities: &[Identity]) -> Result<(), StorageError>;

    /// Remove one identity, returning whether it existed.
    async fn delete(&self, id: &IdentityId) -> Result<bool, StorageError>;

    /// Every identity whose `root_id` is `root`, in no particular order.
    async fn list_by_root(&self, root: &IdentityId) -> Result<Vec<Identity>, StorageError>;
}

/// Append-only persistence for audit entries plus the security flag table.
#[async_trait]
pub trait AuditRepository: Send + Sync {
    /// Append one entry; never overwrites an existing sequence.
    async fn append(&self, entry: &AuditEntry) -> Result<(), StorageError>;

    /// All retained entries of one identity in append order.
    async fn entries(&self, identity: &IdentityId) -> Result<Vec<AuditEntry>, StorageError>;

    /// Identities that have at least one retained entry.
    async fn identities(&self) -> Result<Vec<IdentityId>, StorageError>;

    /// Drop entries of `identity` timestamped before `cutoff`, returning how many.
    async fn purge_before(
        &self,
        identity: &IdentityId,
        cutoff: PhysicalTime,
    ) -> Result<usize, StorageError>;

    /// Insert or replace a security flag.
    async fn put_flag(&self, flag: &SecurityFlag) -> Result<(), StorageError>;

    /// Load one security flag.
    async fn get_flag(&self, id: &SecurityFlagId) -> Result<Option<SecurityFlag>, StorageError>;

    /// Flags of one identity, or of all identities when `identity` is `None`.
    async fn flags(&self, identity: Option<&IdentityId>)
        -> Result<Vec<SecurityFlag>, StorageError>;
}

/// Durable mirror for ephemeral items.
#[async_trait]
pub trait EphemeralRepository: Send + Sync {
    /// Insert or replace an item.
    async fn put(&self, item: &EphemeralItem) -> Result<(), StorageError>;

    /// Load one item.
    async fn get(&self, identity: &IdentityId, key: &str)
        -> Result<Option<EphemeralItem>, StorageError>;

    /// Remove one item, returning whether it existed.
    async fn remove(&self, identity: &IdentityId, key: &str) -> Result<bool, StorageError>;

    /// Items of one identity, or of all identities when `identity` is `None`.
    async fn list(&self, identity: Option<&IdentityId>)
        -> Result<Vec<EphemeralItem>, StorageError>;
}
