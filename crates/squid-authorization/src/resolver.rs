//! Capability resolver

use crate::config::ResolverConfig;
use crate::decision::Decision;
use crate::error::ResolverError;
use crate::module::StaticModuleRegistry;
use crate::policy::PolicyTables;
use crate::rules::{ModuleView, RuleContext, RuleTable};
use crate::summary::CapabilitySummary;
use serde::{Deserialize, Serialize};
use squid_core::{GovernanceLevel, Identity, ModuleRegistry, PrivacyLevel};
use std::sync::Arc;
use tracing::{debug, warn};

/// One authorization question.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveRequest {
    /// `namespace.verb` action
    pub action: Option<String>,
    /// Target module id
    pub module: Option<String>,
    /// Balance the identity has available for the action
    pub balance: Option<u64>,
}

impl ResolveRequest {
    /// Request for an action.
    pub fn action(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            ..Self::default()
        }
    }

    /// Request for module access.
    pub fn module(module: impl Into<String>) -> Self {
        Self {
            module: Some(module.into()),
            ..Self::default()
        }
    }

    /// Also target a module.
    pub fn on_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Supply the available balance.
    pub fn with_balance(mut self, balance: u64) -> Self {
        self.balance = Some(balance);
        self
    }
}

/// Decision function over identity snapshots.
///
/// Decisions depend only on the identity snapshot, the request, the policy
/// tables and the registry contents, so repeated calls agree.
pub struct CapabilityResolver {
    registry: Arc<dyn ModuleRegistry>,
    tables: PolicyTables,
    rules: RuleTable,
}

impl CapabilityResolver {
    /// Resolver with explicit policy.
    pub fn new(registry: Arc<dyn ModuleRegistry>, tables: PolicyTables, rules: RuleTable) -> Self {
        Self {
            registry,
            tables,
            rules,
        }
    }

    /// Resolver with default rules and tables derived from `config`.
    pub fn from_config(registry: Arc<dyn ModuleRegistry>, config: &ResolverConfig) -> Self {
        Self::new(registry, PolicyTables::from_config(config), RuleTable::default())
    }

    /// Policy data in use.
    pub fn tables(&self) -> &PolicyTables {
        &self.tables
    }

    /// Decide whether `identity` may perform `action` on `module`.
    pub fn resolve(
        &self,
        identity: &Identity,
        action: Option<&str>,
        module: Option<&str>,
    ) -> Decision {
        self.evaluate(identity, action, module, None)
    }

    /// Decide a full [`ResolveRequest`], including the balance gate.
    pub fn resolve_request(&self, identity: &Identity, request: &ResolveRequest) -> Decision {
        self.evaluate(
            identity,
            request.action.as_deref(),
            request.module.as_deref(),
            request.balance,
        )
    }

    fn evaluate(
        &self,
        identity: &Identity,
        action: Option<&str>,
        module: Option<&str>,
        balance: Option<u64>,
    ) -> Decision {
        let taxonomy = &self.tables.taxonomy;
        let ctx = RuleContext {
            identity,
            action,
            tags: action.map(|a| taxonomy.tags(a)).unwrap_or_default(),
            structural: action.and_then(|a| taxonomy.structural_op(a)),
            module: module.map(|id| self.module_view(id)),
            balance,
            tables: &self.tables,
        };
        let decision = self.rules.evaluate(&ctx);
        if !decision.allowed {
            debug!(
                identity_id = %identity.did,
                action = action.unwrap_or("-"),
                module = module.unwrap_or("-"),
                rule = ?decision.rule,
                reason = %decision.reason,
                "Capability denied"
            );
        }
        decision
    }

    fn module_view<'a>(&self, id: &'a str) -> ModuleView<'a> {
        let descriptor = match self.registry.lookup(id) {
            Ok(found) => found,
            Err(e) => {
                warn!(module = id, error = %e, "Module registry lookup failed");
                None
            }
        };
        match descriptor {
            Some(d) => ModuleView {
                id,
                discloses_identity: d.discloses_identity(),
                financial: d.is_financial(),
            },
            None => ModuleView {
                id,
                discloses_identity: self.tables.unknown_modules_disclose,
                financial: false,
            },
        }
    }

    /// Aggregate capabilities of `identity` for UI gating and audit annotation.
    pub fn summary(&self, identity: &Identity) -> Result<CapabilitySummary, ResolverError> {
        let modules = self.registry.modules()?;
        let permissions = self.tables.permissions(identity.identity_type);
        let creation = &identity.creation_rules;

        let restricted_modules = modules
            .iter()
            .filter(|m| !self.resolve(identity, None, Some(&m.id)).allowed)
            .map(|m| m.id.clone())
            .collect();
        let restricted_actions = self
            .tables
            .action_catalog
            .iter()
            .filter(|a| !self.resolve(identity, Some(a.as_str()), None).allowed)
            .cloned()
            .collect();

        let can_create = identity.is_active()
            && identity.depth < creation.max_depth
            && !creation.is_leaf_only()
            && permissions.create;

        Ok(CapabilitySummary {
            identity_id: identity.did.clone(),
            can_create_subidentities: can_create,
            can_delete_subidentities: identity.is_active() && permissions.delete,
            can_modify_subidentities: identity.is_active() && permissions.modify,
            has_kyc: identity.kyc.approved,
            is_governance_participant: permissions.governance
                && identity.governance_level != GovernanceLevel::Parent,
            is_public: identity.privacy_level == PrivacyLevel::Public,
            allowed_child_types: if can_create {
                creation.allowed_child_types.iter().copied().collect()
            } else {
                Vec::new()
            },
            restricted_modules,
            restricted_actions,
        })
    }
}

impl Default for CapabilityResolver {
    fn default() -> Self {
        Self::new(
            Arc::new(StaticModuleRegistry::default()),
            PolicyTables::default(),
            RuleTable::default(),
        )
    }
}

impl std::fmt::Debug for CapabilityResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityResolver")
            .field("tables", &self.tables)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}
