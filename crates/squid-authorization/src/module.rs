//! Built-in module registry

use squid_core::{ModuleCategory, ModuleDescriptor, ModuleRegistry, RegistryError};

/// Fixed list of modules, used when the host supplies no registry of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticModuleRegistry {
    modules: Vec<ModuleDescriptor>,
}

impl StaticModuleRegistry {
    /// Registry with exactly `modules`.
    pub fn new(modules: Vec<ModuleDescriptor>) -> Self {
        Self { modules }
    }

    /// Add or replace one module.
    pub fn with_module(mut self, module: ModuleDescriptor) -> Self {
        self.modules.retain(|m| m.id != module.id);
        self.modules.push(module);
        self
    }
}

impl Default for StaticModuleRegistry {
    fn default() -> Self {
        use ModuleCategory::*;
        let modules = [
            ("qmail", Communication),
            ("qchat", Communication),
            ("qdrive", Storage),
            ("qpic", Storage),
            ("qmarket", Marketplace),
            ("qwallet", Financial),
            ("qsocial", Social),
            ("qindex", Index),
            ("qlock", Privacy),
            ("qonsent", Privacy),
            ("qerberos", Privacy),
            ("qnet", Infrastructure),
        ]
        .into_iter()
        .map(|(id, category)| ModuleDescriptor::new(id, category))
        .collect();
        Self { modules }
    }
}

impl ModuleRegistry for StaticModuleRegistry {
    fn modules(&self) -> Result<Vec<ModuleDescriptor>, RegistryError> {
        Ok(self.modules.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_classifies_q_modules() {
        let registry = StaticModuleRegistry::default();
        let social = registry.lookup("qsocial").unwrap().unwrap();
        assert!(social.discloses_identity());
        let market = registry.lookup("qmarket").unwrap().unwrap();
        assert!(market.discloses_identity() && market.is_financial());
        let lock = registry.lookup("qlock").unwrap().unwrap();
        assert!(!lock.discloses_identity());
        assert!(registry.lookup("qunknown").unwrap().is_none());
    }

    #[test]
    fn with_module_replaces_existing() {
        let registry = StaticModuleRegistry::default()
            .with_module(ModuleDescriptor::new("qmail", ModuleCategory::Social));
        let modules = registry.modules().unwrap();
        assert_eq!(modules.iter().filter(|m| m.id == "qmail").count(), 1);
        assert!(registry.lookup("qmail").unwrap().unwrap().discloses_identity());
    }
}
