//! Resolver configuration

use crate::action::{ActionTaxonomy, ParsedAction};
use serde::{Deserialize, Serialize};
use squid_core::ConfigValidation;
use std::collections::BTreeMap;

/// Capability resolver settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Namespace and verb tagging
    pub taxonomy: ActionTaxonomy,
    /// Minimum available balance required per action, e.g. `financial.transfer = 10`
    pub min_balances: BTreeMap<String, u64>,
    /// Treat module ids unknown to the registry as identity-disclosing
    pub unknown_modules_disclose: bool,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            taxonomy: ActionTaxonomy::default(),
            min_balances: BTreeMap::new(),
            unknown_modules_disclose: true,
        }
    }
}

impl ConfigValidation for ResolverConfig {
    fn validate(&self) -> Result<(), String> {
        for action in self.min_balances.keys() {
            let parsed = ParsedAction::parse(action);
            if parsed.namespace.is_empty() || parsed.verb.is_empty() {
                return Err(format!(
                    "resolver.min_balances key `{action}` is not a namespace.verb action"
                ));
            }
        }
        if self.taxonomy.structural_namespace.is_empty() {
            return Err("resolver.taxonomy.structural_namespace must not be empty".into());
        }
        Ok(())
    }
}
