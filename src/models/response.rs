//! Provider result and aggregated response models.

use serde::{Deserialize, Serialize};

use crate::models::Work;

/// The outcome of one provider call, canonicalized at the adapter boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResult {
    /// Provider identifier ("google", "openlibrary", "isbndb")
    pub provider: String,

    /// Works found; empty on clean no-result responses
    pub works: Vec<Work>,

    /// Whether the call succeeded
    pub success: bool,

    /// Error detail when the call failed
    pub error: Option<String>,
}

impl ProviderResult {
    pub fn ok(provider: impl Into<String>, works: Vec<Work>) -> Self {
        Self {
            provider: provider.into(),
            works,
            success: true,
            error: None,
        }
    }

    pub fn failed(provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            works: Vec::new(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// The merged, deduplicated response returned to the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedResponse {
    /// Deduplicated works
    pub items: Vec<Work>,

    /// Number of items
    pub total_items: usize,

    /// Which upstreams contributed, e.g. "orchestrated:google+openlibrary"
    pub provider: String,

    /// Whether this response was served from cache
    pub cached: bool,

    /// End-to-end handling time in milliseconds
    pub response_time_ms: u64,
}

impl AggregatedResponse {
    /// Build a response from merged items and the contributing provider ids
    pub fn from_items(items: Vec<Work>, contributors: &[String]) -> Self {
        let provider = if contributors.is_empty() {
            "orchestrated".to_string()
        } else {
            format!("orchestrated:{}", contributors.join("+"))
        };

        Self {
            total_items: items.len(),
            items,
            provider,
            cached: false,
            response_time_ms: 0,
        }
    }

    pub fn cached(mut self, cached: bool) -> Self {
        self.cached = cached;
        self
    }

    pub fn response_time_ms(mut self, ms: u64) -> Self {
        self.response_time_ms = ms;
        self
    }
}
