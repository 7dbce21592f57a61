//! # bibliomerge
//!
//! Book-metadata orchestration across multiple upstream catalogs, with
//! tiered caching and per-provider failure isolation.
//!
//! ## Architecture
//!
//! - [`models`]: Canonical data structures (Work, Edition, SearchRequest)
//!   and query classification
//! - [`providers`]: Upstream adapters behind a capability-set interface
//!   and the name→implementation registry
//! - [`resilience`]: Circuit breakers, retry policies with query
//!   escalation, and persisted rate pacing
//! - [`cache`]: Deterministic key construction and the fast/durable
//!   tiered cache
//! - [`store`]: The shared key-value layer breaker state and cache tiers
//!   persist through
//! - [`aggregate`]: Cross-provider dedup, merging, and edition scoring
//! - [`orchestrator`]: The request path tying all of the above together
//! - [`warmer`]: Scheduled out-of-band cache warming
//! - [`config`]: Configuration management

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod models;
pub mod orchestrator;
pub mod providers;
pub mod resilience;
pub mod store;
pub mod warmer;

// Re-export the types most callers need
pub use models::{AggregatedResponse, SearchRequest, Work};
pub use orchestrator::{OrchestrateError, Orchestrator};
pub use providers::{Provider, ProviderRegistry};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
