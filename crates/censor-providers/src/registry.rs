//! Provider registry

use crate::provider::Provider;
use censor_core::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

/// Providers by name
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name, replacing any previous one
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        let name = provider.name().to_string();
        info!(provider = %name, "Registered provider");
        self.providers.insert(name, provider);
    }

    /// Builder form of [`register`](Self::register)
    pub fn with_provider(mut self, provider: Arc<dyn Provider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers.get(name).cloned()
    }

    /// Like [`get`](Self::get), failing with `ProviderNotFound`
    pub fn require(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.get(name)
            .ok_or_else(|| Error::ProviderNotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.providers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Providers that accept async work for at least one resource type
    pub fn async_capable(&self) -> Vec<Arc<dyn Provider>> {
        let mut providers: Vec<_> = self
            .providers
            .values()
            .filter(|p| p.scene_capability().async_supported)
            .cloned()
            .collect();
        providers.sort_by(|a, b| a.name().cmp(b.name()));
        providers
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}
