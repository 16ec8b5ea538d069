//! Module registry interface
//!
//! The privacy-level gate only needs to know which category a module id
//! belongs to; the list itself comes from the host application.

use crate::errors::RegistryError;
use serde::{Deserialize, Serialize};

/// Coarse module classification used by the privacy gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleCategory {
    /// Mail, chat
    Communication,
    /// Drive, media
    Storage,
    /// Marketplace (financial and identity-disclosing)
    Marketplace,
    /// Wallet, payments
    Financial,
    /// Social graph (identity-disclosing)
    Social,
    /// Public index (identity-disclosing)
    Index,
    /// Encryption, consent, audit
    Privacy,
    /// Networking and plumbing
    Infrastructure,
}

/// One module known to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Module id, e.g. `qmail`
    pub id: String,
    /// Classification
    pub category: ModuleCategory,
}

impl ModuleDescriptor {
    /// Create a descriptor
    pub fn new(id: impl Into<String>, category: ModuleCategory) -> Self {
        Self {
            id: id.into(),
            category,
        }
    }

    /// Using the module reveals who the identity is.
    pub fn discloses_identity(&self) -> bool {
        matches!(
            self.category,
            ModuleCategory::Social | ModuleCategory::Index | ModuleCategory::Marketplace
        )
    }

    /// Module moves value.
    pub fn is_financial(&self) -> bool {
        matches!(
            self.category,
            ModuleCategory::Financial | ModuleCategory::Marketplace
        )
    }
}

/// Source of known module ids.
pub trait ModuleRegistry: Send + Sync {
    /// Every known module.
    fn modules(&self) -> Result<Vec<ModuleDescriptor>, RegistryError>;

    /// Look up one module by id.
    fn lookup(&self, id: &str) -> Result<Option<ModuleDescriptor>, RegistryError> {
        Ok(self.modules()?.into_iter().find(|m| m.id == id))
    }
}
