//! Action taxonomy
//!
//! Actions are `namespace.verb` strings. Tags are derived from the namespace
//! and verb through lookup tables, never from call-site string matching.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// An action split into namespace and verb. A string without a dot is all namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedAction<'a> {
    /// Part before the first dot
    pub namespace: &'a str,
    /// Part after the first dot, empty when absent
    pub verb: &'a str,
}

impl<'a> ParsedAction<'a> {
    /// Split `action` at its first dot.
    pub fn parse(action: &'a str) -> Self {
        match action.split_once('.') {
            Some((namespace, verb)) => Self { namespace, verb },
            None => Self {
                namespace: action,
                verb: "",
            },
        }
    }
}

/// Categories an action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActionTags {
    /// Moves value
    pub financial: bool,
    /// Votes, proposals, DAO operations
    pub governance: bool,
    /// KYC and verification flows
    pub verification: bool,
    /// Creates, deletes or modifies sub-identities
    pub structural: bool,
    /// Irreversibly removes something
    pub destructive: bool,
}

impl ActionTags {
    /// True when the KYC gate applies.
    pub fn is_kyc_sensitive(&self) -> bool {
        self.financial || self.governance || self.verification
    }

    /// True when PARENT governance denies outright (and DAO governance advises).
    pub fn needs_guardian(&self) -> bool {
        self.financial || self.destructive
    }
}

/// Kind of structural operation on sub-identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StructuralOp {
    /// `identity.create_subidentity`
    Create,
    /// `identity.delete_subidentity`
    Delete,
    /// `identity.modify_subidentity`
    Modify,
}

/// Lookup tables mapping namespaces and verbs to [`ActionTags`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActionTaxonomy {
    /// Namespaces whose actions move value
    pub financial_namespaces: BTreeSet<String>,
    /// Namespaces whose actions are governance operations
    pub governance_namespaces: BTreeSet<String>,
    /// Namespaces whose actions are verification flows
    pub verification_namespaces: BTreeSet<String>,
    /// Namespace holding structural sub-identity operations
    pub structural_namespace: String,
    /// Verbs that irreversibly remove something
    pub destructive_verbs: BTreeSet<String>,
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

impl Default for ActionTaxonomy {
    fn default() -> Self {
        Self {
            financial_namespaces: set(&["financial", "wallet", "payment"]),
            governance_namespaces: set(&["governance", "dao"]),
            verification_namespaces: set(&["kyc", "verification"]),
            structural_namespace: "identity".to_string(),
            destructive_verbs: set(&[
                "delete",
                "destroy",
                "revoke",
                "purge",
                "remove",
                "delete_subidentity",
            ]),
        }
    }
}

impl ActionTaxonomy {
    /// Tags for `action`.
    pub fn tags(&self, action: &str) -> ActionTags {
        let parsed = ParsedAction::parse(action);
        ActionTags {
            financial: self.financial_namespaces.contains(parsed.namespace),
            governance: self.governance_namespaces.contains(parsed.namespace),
            verification: self.verification_namespaces.contains(parsed.namespace),
            structural: self.structural_op(action).is_some(),
            destructive: self.destructive_verbs.contains(parsed.verb),
        }
    }

    /// Structural operation named by `action`, if any.
    pub fn structural_op(&self, action: &str) -> Option<StructuralOp> {
        let parsed = ParsedAction::parse(action);
        if parsed.namespace != self.structural_namespace {
            return None;
        }
        match parsed.verb {
            "create_subidentity" => Some(StructuralOp::Create),
            "delete_subidentity" => Some(StructuralOp::Delete),
            "modify_subidentity" => Some(StructuralOp::Modify),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_splits_at_first_dot() {
        let p = ParsedAction::parse("financial.transfer.batch");
        assert_eq!(p.namespace, "financial");
        assert_eq!(p.verb, "transfer.batch");
        assert_eq!(ParsedAction::parse("logout").verb, "");
    }

    #[test]
    fn default_taxonomy_tags() {
        let tax = ActionTaxonomy::default();
        assert!(tax.tags("financial.transfer").financial);
        assert!(tax.tags("wallet.send").is_kyc_sensitive());
        assert!(tax.tags("governance.vote").governance);
        assert!(tax.tags("kyc.submit").verification);
        assert!(!tax.tags("message.send").is_kyc_sensitive());

        let delete = tax.tags("identity.delete_subidentity");
        assert!(delete.structural && delete.destructive);
        assert_eq!(
            tax.structural_op("identity.create_subidentity"),
            Some(StructuralOp::Create)
        );
        assert!(tax.tags("content.delete").needs_guardian());
        assert!(!tax.tags("identity.rename").structural);
    }
}
