//! Shared key-value state layer.
//!
//! Everything that must survive across requests or be visible to sibling
//! process instances goes through [`StateStore`]: cache tiers, circuit
//! breaker records, and rate-limit timestamps. Handlers themselves stay
//! stateless. Mutations are plain read-modify-write; races between
//! instances are tolerated rather than locked out.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use async_trait::async_trait;
use std::time::Duration;

/// Errors from a backing store
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Async key-value store with per-entry TTL
///
/// Implementations must treat an expired entry as absent. Keys follow the
/// layouts in the persisted-state section of the README:
/// `{type}:{classification}:{...}` for cache entries,
/// `circuit_breaker:{provider}` and `ratelimit:{provider}` for state.
#[async_trait]
pub trait StateStore: Send + Sync + std::fmt::Debug {
    /// Read a value; `None` on miss or expiry
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value; `ttl = None` means no expiry
    async fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Remove a value; removing a missing key is not an error
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Current epoch seconds, used by stores for persisted expiry
pub(crate) fn now_epoch_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
