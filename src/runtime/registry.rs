//! Version-indexed runtime factories

use std::collections::HashMap;
use std::sync::Arc;

use super::types::RuntimeFactory;
use crate::domain::SdkVersion;

/// Runtime factories keyed by SDK version string
#[derive(Default, Clone)]
pub struct BuilderRegistry {
    factories: HashMap<String, Arc<dyn RuntimeFactory>>,
}

impl std::fmt::Debug for BuilderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuilderRegistry")
            .field("versions", &self.versions())
            .finish()
    }
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory under the version it reports, replacing any previous one
    pub fn register(&mut self, factory: Arc<dyn RuntimeFactory>) {
        let key = factory.sdk_version().registry_key();
        if self.factories.insert(key.clone(), factory).is_some() {
            log::warn!("Replacing runtime factory for SDK {}", key);
        }
    }

    /// Builder-style registration
    pub fn with(mut self, factory: Arc<dyn RuntimeFactory>) -> Self {
        self.register(factory);
        self
    }

    pub fn get(&self, version: &SdkVersion) -> Option<Arc<dyn RuntimeFactory>> {
        self.factories.get(&version.registry_key()).cloned()
    }

    /// Registered version keys, sorted
    pub fn versions(&self) -> Vec<String> {
        let mut versions: Vec<String> = self.factories.keys().cloned().collect();
        versions.sort();
        versions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::DryRunRuntimeFactory;

    #[test]
    fn test_lookup_by_version() {
        let registry = BuilderRegistry::new()
            .with(Arc::new(DryRunRuntimeFactory::new(SdkVersion::numbered(28, 0, 0))))
            .with(Arc::new(DryRunRuntimeFactory::new(SdkVersion::Unversioned)));

        assert!(registry.get(&SdkVersion::numbered(28, 0, 0)).is_some());
        assert!(registry.get(&SdkVersion::Unversioned).is_some());
        assert!(registry.get(&SdkVersion::numbered(27, 0, 0)).is_none());
        assert_eq!(registry.versions(), vec!["28.0.0".to_string(), "UNVERSIONED".to_string()]);
    }

    #[test]
    fn test_register_replaces_same_version() {
        let mut registry = BuilderRegistry::new();
        registry.register(Arc::new(DryRunRuntimeFactory::new(SdkVersion::Unversioned)));
        registry.register(Arc::new(DryRunRuntimeFactory::new(SdkVersion::Unversioned)));
        assert_eq!(registry.versions().len(), 1);
    }
}
