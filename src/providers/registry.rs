//! Registry mapping provider names to implementations.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Provider, ProviderError};

bitflags::bitflags! {
    /// Capabilities an upstream provider can support
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ProviderCapabilities: u32 {
        const SEARCH = 1 << 0;
        const ISBN_LOOKUP = 1 << 1;
        const AUTHOR_WORKS = 1 << 2;
        const EDITIONS = 1 << 3;
    }
}

/// Name→implementation registry for provider plugins
///
/// The orchestrator selects providers by capability, never by concrete
/// type, so new upstreams slot in without touching the request path.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider
    pub fn register(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    /// Get a provider by id
    pub fn get(&self, id: &str) -> Option<&Arc<dyn Provider>> {
        self.providers.get(id)
    }

    /// Get a provider by id, erroring if absent
    pub fn get_required(&self, id: &str) -> Result<&Arc<dyn Provider>, ProviderError> {
        self.get(id)
            .ok_or_else(|| ProviderError::Other(format!("Provider '{id}' not registered")))
    }

    /// All registered providers
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Provider>> {
        self.providers.values()
    }

    /// All provider ids
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(|s| s.as_str())
    }

    /// Providers advertising a specific capability
    pub fn with_capability(&self, capability: ProviderCapabilities) -> Vec<&Arc<dyn Provider>> {
        self.all()
            .filter(|p| p.capabilities().contains(capability))
            .collect()
    }

    /// Providers usable for general search
    pub fn searchable(&self) -> Vec<&Arc<dyn Provider>> {
        self.with_capability(ProviderCapabilities::SEARCH)
    }

    pub fn has(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
