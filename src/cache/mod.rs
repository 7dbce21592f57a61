//! Tiered caching: key normalization plus the fast/durable store pair.

mod key;
mod tiered;

pub use key::{build_key, normalize_query, object_key};
pub use tiered::{CacheEntry, CacheHit, CacheTier, TieredCache};
