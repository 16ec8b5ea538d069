//! Identity store
//!
//! Owns the active-identity pointer, the single piece of shared mutable
//! state in the core. The pointer is only swapped inside a synchronous
//! critical section, so two interleaved `set_active` calls can never observe
//! a half-applied switch.
//!
//! Every read-modify-write of stored records runs under one async write
//! lock, so concurrent creations under the same parent cannot drop a child.

use crate::config::IdentityConfig;
use crate::error::{IdentityError, ValidationError};
use crate::policy::{self, RootAttributes, SubIdentityAttributes};
use crate::tree::IdentityTree;
use parking_lot::Mutex;
use squid_core::{
    Identity, IdentityId, IdentityRepository, IdentityStatus, IdentityType, PhysicalTime,
    PhysicalTimeEffects, SecurityFlagId,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identity tree plus the active-identity pointer.
pub struct IdentityStore {
    repo: Arc<dyn IdentityRepository>,
    time: Arc<dyn PhysicalTimeEffects>,
    config: IdentityConfig,
    active: Mutex<Option<IdentityId>>,
    writes: tokio::sync::Mutex<()>,
}

impl IdentityStore {
    /// Create a store over a repository and clock
    pub fn new(
        repo: Arc<dyn IdentityRepository>,
        time: Arc<dyn PhysicalTimeEffects>,
        config: IdentityConfig,
    ) -> Self {
        Self {
            repo,
            time,
            config,
            active: Mutex::new(None),
            writes: tokio::sync::Mutex::new(()),
        }
    }

    async fn now(&self) -> Result<PhysicalTime, IdentityError> {
        Ok(self.time.physical_time().await?)
    }

    /// Load an identity, failing with `NotFound` when absent.
    pub async fn get(&self, id: &IdentityId) -> Result<Identity, IdentityError> {
        self.repo
            .get(id)
            .await?
            .ok_or_else(|| IdentityError::NotFound(id.clone()))
    }

    /// Load an identity if it exists.
    pub async fn find(&self, id: &IdentityId) -> Result<Option<Identity>, IdentityError> {
        Ok(self.repo.get(id).await?)
    }

    /// Create the ROOT of a new tree.
    pub async fn bootstrap_root(&self, attrs: RootAttributes) -> Result<Identity, IdentityError> {
        let now = self.now().await?;
        let root = policy::build_root(attrs, self.config.max_depth, now);
        self.repo.put_all(std::slice::from_ref(&root)).await?;
        info!(
            identity_id = %root.did,
            max_depth = root.creation_rules.max_depth,
            "Bootstrapped root identity"
        );
        Ok(root)
    }

    /// Create a sub-identity of `parent_id`.
    ///
    /// Fails with `DepthExceeded`, `TypeNotAllowed` or `ParentInactive`; on
    /// failure nothing is written.
    pub async fn create_sub_identity(
        &self,
        parent_id: &IdentityId,
        identity_type: IdentityType,
        attrs: SubIdentityAttributes,
    ) -> Result<Identity, IdentityError> {
        let _writes = self.writes.lock().await;
        let mut parent = self.get(parent_id).await?;

        if let Err(violation) = policy::validate_child(&parent, identity_type) {
            debug!(
                parent_id = %parent_id,
                requested = %identity_type,
                error = %violation,
                "Rejected sub-identity creation"
            );
            return Err(violation.into());
        }

        let now = self.now().await?;
        let child = policy::build_child(&parent, identity_type, attrs, now);
        parent.children.insert(child.did.clone());
        parent.updated_at = now;

        self.repo.put_all(&[parent, child.clone()]).await?;
        info!(
            identity_id = %child.did,
            parent_id = %parent_id,
            identity_type = %identity_type,
            depth = child.depth,
            "Created sub-identity"
        );
        Ok(child)
    }

    /// Currently active identity, if any. A pointer to a deleted identity reads as `None`.
    pub async fn get_active(&self) -> Result<Option<Identity>, IdentityError> {
        let Some(id) = self.active_id() else {
            return Ok(None);
        };
        Ok(self.repo.get(&id).await?)
    }

    /// Id of the currently active identity.
    pub fn active_id(&self) -> Option<IdentityId> {
        self.active.lock().clone()
    }

    /// Make `id` the active identity, returning the previously active id.
    pub async fn set_active(&self, id: &IdentityId) -> Result<Option<IdentityId>, IdentityError> {
        let _writes = self.writes.lock().await;
        let mut identity = self.get(id).await?;
        if identity.status != IdentityStatus::Active {
            return Err(IdentityError::Inactive {
                id: id.clone(),
                status: identity.status,
            });
        }

        let now = self.now().await?;
        let previous = {
            let mut active = self.active.lock();
            active.replace(id.clone())
        };

        identity.last_used = now;
        if let Err(e) = self.repo.put_all(std::slice::from_ref(&identity)).await {
            // The switch itself already happened; only the usage timestamp is lost.
            warn!(identity_id = %id, error = %e, "Failed to record last_used");
        }

        debug!(
            identity_id = %id,
            previous = ?previous,
            "Active identity changed"
        );
        Ok(previous)
    }

    /// Clear the active pointer (logout), returning what it held.
    pub fn clear_active(&self) -> Option<IdentityId> {
        self.active.lock().take()
    }

    /// Materialize the tree below `root_id` (which may be any node).
    pub async fn get_tree(&self, root_id: &IdentityId) -> Result<IdentityTree, IdentityError> {
        let root = self.get(root_id).await?;
        let members = self.repo.list_by_root(&root.root_id).await?;
        Ok(IdentityTree::assemble(root, members))
    }

    /// Change the lifecycle status of an identity.
    pub async fn update_status(
        &self,
        id: &IdentityId,
        status: IdentityStatus,
    ) -> Result<Identity, IdentityError> {
        let updated = self
            .mutate(id, |identity| identity.status = status)
            .await?;
        info!(identity_id = %id, status = ?status, "Identity status updated");
        Ok(updated)
    }

    /// Mark KYC documents as submitted.
    pub async fn submit_kyc(&self, id: &IdentityId) -> Result<Identity, IdentityError> {
        self.mutate(id, |identity| identity.kyc.submitted = true)
            .await
    }

    /// Approve KYC for an identity.
    pub async fn approve_kyc(&self, id: &IdentityId) -> Result<Identity, IdentityError> {
        let updated = self
            .mutate(id, |identity| {
                identity.kyc.submitted = true;
                identity.kyc.approved = true;
            })
            .await?;
        info!(identity_id = %id, "KYC approved");
        Ok(updated)
    }

    /// Attach an unresolved security flag.
    pub async fn record_flag(
        &self,
        id: &IdentityId,
        flag: SecurityFlagId,
    ) -> Result<Identity, IdentityError> {
        self.mutate(id, |identity| {
            identity.security_flags.insert(flag);
        })
        .await
    }

    /// Detach a resolved security flag.
    pub async fn clear_flag(
        &self,
        id: &IdentityId,
        flag: SecurityFlagId,
    ) -> Result<Identity, IdentityError> {
        self.mutate(id, |identity| {
            identity.security_flags.remove(&flag);
        })
        .await
    }

    /// Record use of an identity without activating it.
    pub async fn touch(&self, id: &IdentityId) -> Result<Identity, IdentityError> {
        let now = self.now().await?;
        self.mutate(id, |identity| identity.last_used = now).await
    }

    async fn mutate(
        &self,
        id: &IdentityId,
        apply: impl FnOnce(&mut Identity),
    ) -> Result<Identity, IdentityError> {
        let _writes = self.writes.lock().await;
        let mut identity = self.get(id).await?;
        apply(&mut identity);
        identity.updated_at = self.now().await?;
        self.repo.put_all(std::slice::from_ref(&identity)).await?;
        Ok(identity)
    }

    /// Delete a childless identity.
    ///
    /// Rejected with `HasChildren` while children exist; remove or reparent them first.
    pub async fn delete_identity(&self, id: &IdentityId) -> Result<(), IdentityError> {
        let _writes = self.writes.lock().await;
        let identity = self.get(id).await?;
        if !identity.children.is_empty() {
            return Err(IdentityError::HasChildren {
                id: id.clone(),
                count: identity.children.len(),
            });
        }

        if let Some(parent_id) = &identity.parent_id {
            let now = self.now().await?;
            if let Some(mut parent) = self.repo.get(parent_id).await? {
                parent.children.shift_remove(id);
                parent.updated_at = now;
                self.repo.put_all(&[parent]).await?;
            }
        }
        self.repo.delete(id).await?;

        {
            let mut active = self.active.lock();
            if active.as_ref() == Some(id) {
                *active = None;
            }
        }
        info!(identity_id = %id, "Deleted identity");
        Ok(())
    }

    /// Move `id` (and its subtree) beneath `new_parent_id` within the same tree.
    pub async fn reparent(
        &self,
        id: &IdentityId,
        new_parent_id: &IdentityId,
    ) -> Result<Identity, IdentityError> {
        let _writes = self.writes.lock().await;
        let mut moved = self.get(id).await?;
        let mut new_parent = self.get(new_parent_id).await?;

        let Some(old_parent_id) = moved.parent_id.clone() else {
            return Err(ValidationError::RootImmovable {
                identity: moved.did.clone(),
            }
            .into());
        };
        if new_parent.root_id != moved.root_id {
            return Err(ValidationError::RootMismatch {
                expected: moved.root_id.clone(),
                actual: new_parent.root_id.clone(),
            }
            .into());
        }
        if new_parent.did == moved.did || new_parent.descends_from(&moved.did) {
            return Err(ValidationError::CycleDetected {
                identity: moved.did.clone(),
            }
            .into());
        }
        if old_parent_id == new_parent.did {
            return Ok(moved);
        }
        policy::validate_child(&new_parent, moved.identity_type)?;

        let descendants: Vec<Identity> = self
            .repo
            .list_by_root(&moved.root_id)
            .await?
            .into_iter()
            .filter(|i| i.descends_from(&moved.did))
            .collect();
        let subtree_height = descendants
            .iter()
            .map(|d| d.depth - moved.depth)
            .max()
            .unwrap_or(0);
        let new_depth = new_parent.depth + 1;
        let max_depth = new_parent.creation_rules.max_depth;
        if new_depth.saturating_add(subtree_height) > max_depth {
            return Err(ValidationError::DepthExceeded {
                parent: new_parent.did.clone(),
                requested: new_depth.saturating_add(subtree_height),
                max_depth,
            }
            .into());
        }

        let now = self.now().await?;
        let mut old_parent = self.get(&old_parent_id).await?;
        old_parent.children.shift_remove(&moved.did);
        old_parent.updated_at = now;
        new_parent.children.insert(moved.did.clone());
        new_parent.updated_at = now;

        let mut new_path = new_parent.path.clone();
        new_path.push(new_parent.did.clone());
        moved.parent_id = Some(new_parent.did.clone());
        moved.depth = new_depth;
        moved.path = new_path;
        moved.updated_at = now;

        let mut changed = vec![old_parent, new_parent];
        for mut descendant in descendants {
            let Some(pos) = descendant.path.iter().position(|a| a == &moved.did) else {
                continue;
            };
            let mut path = moved.path.clone();
            path.extend(descendant.path.drain(pos..));
            descendant.depth = u8::try_from(path.len()).unwrap_or(u8::MAX);
            descendant.path = path;
            descendant.updated_at = now;
            changed.push(descendant);
        }
        changed.push(moved.clone());
        self.repo.put_all(&changed).await?;

        info!(
            identity_id = %moved.did,
            from = %old_parent_id,
            to = %new_parent_id,
            "Reparented identity"
        );
        Ok(moved)
    }

    /// Root-level maximum depth used for new roots.
    pub fn config(&self) -> &IdentityConfig {
        &self.config
    }
}
