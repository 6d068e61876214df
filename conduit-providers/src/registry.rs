//! Provider registry.
//!
//! A direct structural port of the hyper-sdk registry, trimmed to the
//! `ProviderRegistry` type itself: the deprecated free-function wrappers and
//! the fluent client builder are not needed here, since conduit-core owns one
//! registry instance directly rather than reaching for a process-global.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;

use crate::provider::Provider;

#[derive(Default)]
pub struct ProviderRegistry {
    providers: RwLock<HashMap<String, Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        tracing::debug!(provider = %name, "registering provider");
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        providers.insert(name, provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        let providers = self.providers.read().unwrap_or_else(|e| e.into_inner());
        providers.get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<dyn Provider>> {
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        providers.remove(name)
    }

    pub fn list(&self) -> Vec<String> {
        let providers = self.providers.read().unwrap_or_else(|e| e.into_inner());
        providers.keys().cloned().collect()
    }

    pub fn has(&self, name: &str) -> bool {
        let providers = self.providers.read().unwrap_or_else(|e| e.into_inner());
        providers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockProvider;

    #[test]
    fn register_then_get_round_trips() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("mock")));

        let retrieved = registry.get("mock").expect("provider should be registered");
        assert_eq!(retrieved.name(), "mock");
        assert!(registry.has("mock"));
        assert!(!registry.has("missing"));
    }

    #[test]
    fn register_replaces_existing_entry_with_the_same_name() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("mock")));
        registry.register(Arc::new(MockProvider::new("mock")));

        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn remove_drops_the_provider() {
        let registry = ProviderRegistry::new();
        registry.register(Arc::new(MockProvider::new("mock")));
        assert!(registry.remove("mock").is_some());
        assert!(!registry.has("mock"));
    }
}
