//! Policy tables
//!
//! Everything the rules consult that could reasonably change with product
//! policy lives here as data: per-type permission flags, the action
//! taxonomy, minimum balances and the catalog of actions used for
//! capability summaries.

use crate::action::{ActionTags, ActionTaxonomy, StructuralOp};
use crate::config::ResolverConfig;
use serde::{Deserialize, Serialize};
use squid_core::IdentityType;
use std::collections::BTreeMap;

/// Permission flags carried by an identity type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypePermissions {
    /// May create sub-identities
    pub create: bool,
    /// May delete sub-identities
    pub delete: bool,
    /// May modify sub-identities
    pub modify: bool,
    /// May perform financial actions
    pub financial: bool,
    /// May take part in governance
    pub governance: bool,
}

impl TypePermissions {
    /// Every flag set.
    pub const ALL: Self = Self {
        create: true,
        delete: true,
        modify: true,
        financial: true,
        governance: true,
    };

    /// No flag set.
    pub const NONE: Self = Self {
        create: false,
        delete: false,
        modify: false,
        financial: false,
        governance: false,
    };

    /// Name of the first flag `tags` needs that is not set.
    pub fn missing_for(
        &self,
        tags: &ActionTags,
        structural: Option<StructuralOp>,
    ) -> Option<Permission> {
        match structural {
            Some(StructuralOp::Create) if !self.create => return Some(Permission::Create),
            Some(StructuralOp::Delete) if !self.delete => return Some(Permission::Delete),
            Some(StructuralOp::Modify) if !self.modify => return Some(Permission::Modify),
            _ => {}
        }
        if tags.financial && !self.financial {
            return Some(Permission::Financial);
        }
        if tags.governance && !self.governance {
            return Some(Permission::Governance);
        }
        None
    }

    /// Whether `permission` is set.
    pub fn has(&self, permission: Permission) -> bool {
        match permission {
            Permission::Create => self.create,
            Permission::Delete => self.delete,
            Permission::Modify => self.modify,
            Permission::Financial => self.financial,
            Permission::Governance => self.governance,
        }
    }
}

/// One permission flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Create sub-identities
    Create,
    /// Delete sub-identities
    Delete,
    /// Modify sub-identities
    Modify,
    /// Financial actions
    Financial,
    /// Governance actions
    Governance,
}

/// Data consulted by the rule table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyTables {
    /// Permission flags per identity type
    pub type_permissions: BTreeMap<IdentityType, TypePermissions>,
    /// Action tagging
    pub taxonomy: ActionTaxonomy,
    /// Minimum available balance per action
    pub min_balances: BTreeMap<String, u64>,
    /// Actions evaluated when building capability summaries
    pub action_catalog: Vec<String>,
    /// Treat module ids missing from the registry as identity-disclosing
    pub unknown_modules_disclose: bool,
}

impl PolicyTables {
    /// Permission flags for `identity_type`; unlisted types get none.
    pub fn permissions(&self, identity_type: IdentityType) -> TypePermissions {
        self.type_permissions
            .get(&identity_type)
            .copied()
            .unwrap_or(TypePermissions::NONE)
    }

    /// First identity type, in declaration order, that holds `permission`.
    pub fn holder_of(&self, permission: Permission) -> Option<IdentityType> {
        IdentityType::ALL
            .into_iter()
            .find(|ty| self.permissions(*ty).has(permission))
    }

    /// Build tables from resolver configuration.
    pub fn from_config(config: &ResolverConfig) -> Self {
        Self {
            taxonomy: config.taxonomy.clone(),
            min_balances: config.min_balances.clone(),
            unknown_modules_disclose: config.unknown_modules_disclose,
            ..Self::default()
        }
    }
}

impl Default for PolicyTables {
    fn default() -> Self {
        let member = TypePermissions {
            create: true,
            delete: false,
            modify: true,
            financial: true,
            governance: true,
        };
        let type_permissions = [
            (IdentityType::Root, TypePermissions::ALL),
            (IdentityType::Dao, member),
            (IdentityType::Enterprise, member),
            (IdentityType::Consentida, TypePermissions::NONE),
            (IdentityType::Aid, TypePermissions::NONE),
        ]
        .into_iter()
        .collect();

        let action_catalog = [
            "identity.create_subidentity",
            "identity.delete_subidentity",
            "identity.modify_subidentity",
            "financial.transfer",
            "financial.transaction",
            "governance.vote",
            "governance.propose",
            "kyc.submit",
            "content.delete",
            "message.send",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        Self {
            type_permissions,
            taxonomy: ActionTaxonomy::default(),
            min_balances: BTreeMap::new(),
            action_catalog,
            unknown_modules_disclose: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_permissions_by_type() {
        let tables = PolicyTables::default();
        assert_eq!(tables.permissions(IdentityType::Root), TypePermissions::ALL);
        assert!(!tables.permissions(IdentityType::Dao).delete);
        assert!(tables.permissions(IdentityType::Enterprise).financial);
        assert_eq!(
            tables.permissions(IdentityType::Consentida),
            TypePermissions::NONE
        );
        assert_eq!(
            tables.holder_of(Permission::Financial),
            Some(IdentityType::Root)
        );
    }

    #[test]
    fn missing_permission_prefers_structural_op() {
        let tax = ActionTaxonomy::default();
        let perms = TypePermissions::NONE;
        let action = "identity.delete_subidentity";
        assert_eq!(
            perms.missing_for(&tax.tags(action), tax.structural_op(action)),
            Some(Permission::Delete)
        );
        let action = "financial.transfer";
        assert_eq!(
            perms.missing_for(&tax.tags(action), tax.structural_op(action)),
            Some(Permission::Financial)
        );
        assert_eq!(
            perms.missing_for(&tax.tags("message.send"), None),
            None
        );
    }
}
