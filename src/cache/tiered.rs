//! Two-tier cache: a fast short-TTL store in front of a larger durable one.
//!
//! Reads check the fast tier first; a durable hit is promoted back into
//! the fast tier asynchronously so the caller never waits on promotion.
//! The durable tier is best-effort throughout: its failures are logged
//! and swallowed, never surfaced to the request path.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::store::{now_epoch_secs, StateStore};

/// Which tier a value was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Fast,
    Durable,
}

/// Metadata wrapper persisted around every cached payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    /// The cached payload
    pub payload: T,

    /// Unix timestamp of insertion
    pub cached_at: u64,

    /// TTL the entry was written with, seconds
    pub ttl_secs: u64,

    /// Provider tag recorded at write time ("orchestrated:google+...")
    pub source: String,

    /// Set by the warmer so warm entries are recognizable in stats
    #[serde(default)]
    pub high_priority: bool,
}

impl<T> CacheEntry<T> {
    pub fn new(payload: T, ttl: Duration, source: &str, high_priority: bool) -> Self {
        Self {
            payload,
            cached_at: now_epoch_secs(),
            ttl_secs: ttl.as_secs(),
            source: source.to_string(),
            high_priority,
        }
    }
}

/// Result of a tiered lookup
pub struct CacheHit<T> {
    pub entry: CacheEntry<T>,
    pub tier: CacheTier,
}

/// Two-tier cache over a pair of [`StateStore`]s
#[derive(Debug, Clone)]
pub struct TieredCache {
    fast: Arc<dyn StateStore>,
    durable: Arc<dyn StateStore>,
    /// TTL used when re-inserting a durable hit into the fast tier
    promotion_ttl: Duration,
}

impl TieredCache {
    pub fn new(fast: Arc<dyn StateStore>, durable: Arc<dyn StateStore>) -> Self {
        Self {
            fast,
            durable,
            promotion_ttl: Duration::from_secs(3600),
        }
    }

    pub fn promotion_ttl(mut self, ttl: Duration) -> Self {
        self.promotion_ttl = ttl;
        self
    }

    /// Look up a key across both tiers.
    ///
    /// Never returns an error: store failures degrade to a miss.
    pub async fn get<T>(&self, key: &str) -> Option<CacheHit<T>>
    where
        T: DeserializeOwned + Serialize + Send + 'static,
    {
        match self.fast.get(key).await {
            Ok(Some(raw)) => {
                if let Some(entry) = decode::<T>(&raw, key) {
                    tracing::debug!(key, tier = "fast", "cache hit");
                    return Some(CacheHit {
                        entry,
                        tier: CacheTier::Fast,
                    });
                }
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(key, error = %e, "fast tier read failed"),
        }

        match self.durable.get(key).await {
            Ok(Some(raw)) => {
                let entry = decode::<T>(&raw, key)?;
                tracing::debug!(key, tier = "durable", "cache hit");
                self.promote(key, &raw);
                Some(CacheHit {
                    entry,
                    tier: CacheTier::Durable,
                })
            }
            Ok(None) => {
                tracing::debug!(key, "cache miss");
                None
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "durable tier read failed");
                None
            }
        }
    }

    /// Fire-and-forget write-through of a durable hit into the fast tier
    fn promote(&self, key: &str, raw: &str) {
        let fast = Arc::clone(&self.fast);
        let key = key.to_string();
        let raw = raw.to_string();
        let ttl = self.promotion_ttl;
        tokio::spawn(async move {
            if let Err(e) = fast.put(&key, &raw, Some(ttl)).await {
                tracing::warn!(key, error = %e, "cache promotion failed");
            }
        });
    }

    /// Write a value: always fast, additionally durable when marked so.
    ///
    /// Durable writes are best-effort; only a fast-tier failure is
    /// reported, and callers treat even that as non-fatal.
    pub async fn put<T>(
        &self,
        key: &str,
        payload: &T,
        ttl: Duration,
        durable: bool,
        source: &str,
        high_priority: bool,
    ) -> Result<(), crate::store::StoreError>
    where
        T: Serialize,
    {
        let entry = CacheEntry {
            payload,
            cached_at: now_epoch_secs(),
            ttl_secs: ttl.as_secs(),
            source: source.to_string(),
            high_priority,
        };
        let raw = serde_json::to_string(&entry)?;

        self.fast.put(key, &raw, Some(ttl)).await?;

        if durable {
            if let Err(e) = self.durable.put(key, &raw, Some(ttl)).await {
                tracing::warn!(key, error = %e, "durable tier write failed");
            }
        }
        Ok(())
    }

    /// Write a value into the durable tier only.
    ///
    /// Used for identifier objects under the `{entity}/{id}.json` layout,
    /// which are addressed by identifier rather than by request key and
    /// have no business occupying the fast tier.
    pub async fn put_durable<T>(
        &self,
        key: &str,
        payload: &T,
        ttl: Duration,
        source: &str,
    ) -> Result<(), crate::store::StoreError>
    where
        T: Serialize,
    {
        let entry = CacheEntry {
            payload,
            cached_at: now_epoch_secs(),
            ttl_secs: ttl.as_secs(),
            source: source.to_string(),
            high_priority: false,
        };
        let raw = serde_json::to_string(&entry)?;
        self.durable.put(key, &raw, Some(ttl)).await
    }

    /// Whether a key is present in either tier (warmer skip check)
    pub async fn contains(&self, key: &str) -> bool {
        if matches!(self.fast.get(key).await, Ok(Some(_))) {
            return true;
        }
        matches!(self.durable.get(key).await, Ok(Some(_)))
    }
}

fn decode<T: DeserializeOwned>(raw: &str, key: &str) -> Option<CacheEntry<T>> {
    match serde_json::from_str(raw) {
        Ok(entry) => Some(entry),
        Err(e) => {
            tracing::warn!(key, error = %e, "discarding undecodable cache entry");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;

    fn cache_with_stores() -> (TieredCache, Arc<MemoryStore>, Arc<MemoryStore>) {
        let fast = Arc::new(MemoryStore::new());
        let durable = Arc::new(MemoryStore::new());
        let cache = TieredCache::new(
            Arc::clone(&fast) as Arc<dyn StateStore>,
            Arc::clone(&durable) as Arc<dyn StateStore>,
        );
        (cache, fast, durable)
    }

    #[tokio::test]
    async fn test_fast_hit() {
        let (cache, _, _) = cache_with_stores();
        cache
            .put("k", &"v".to_string(), Duration::from_secs(60), false, "test", false)
            .await
            .unwrap();

        let hit = cache.get::<String>("k").await.unwrap();
        assert_eq!(hit.entry.payload, "v");
        assert_eq!(hit.tier, CacheTier::Fast);
    }

    #[tokio::test]
    async fn test_durable_only_write_flag() {
        let (cache, _, durable) = cache_with_stores();

        cache
            .put("a", &1u32, Duration::from_secs(60), false, "test", false)
            .await
            .unwrap();
        cache
            .put("b", &2u32, Duration::from_secs(60), true, "test", false)
            .await
            .unwrap();

        assert!(durable.get("a").await.unwrap().is_none());
        assert!(durable.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_durable_hit_promotes() {
        let (cache, fast, durable) = cache_with_stores();
        // Seed only the durable tier, as if a sibling instance wrote it
        let entry = CacheEntry::new(7u32, Duration::from_secs(60), "test", false);
        durable
            .put("k", &serde_json::to_string(&entry).unwrap(), None)
            .await
            .unwrap();

        let hit = cache.get::<u32>("k").await.unwrap();
        assert_eq!(hit.tier, CacheTier::Durable);
        assert_eq!(hit.entry.payload, 7);

        // Promotion is spawned; give it a tick
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(fast.get("k").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_put_durable_skips_fast_tier() {
        let (cache, fast, durable) = cache_with_stores();
        cache
            .put_durable("book/1.json", &"v".to_string(), Duration::from_secs(60), "test")
            .await
            .unwrap();

        assert!(fast.get("book/1.json").await.unwrap().is_none());
        assert!(durable.get("book/1.json").await.unwrap().is_some());
    }

    /// A store that fails every operation
    #[derive(Debug)]
    struct BrokenStore;

    #[async_trait]
    impl StateStore for BrokenStore {
        async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn put(&self, _k: &str, _v: &str, _t: Option<Duration>) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_broken_durable_never_fails_request() {
        let fast = Arc::new(MemoryStore::new());
        let cache = TieredCache::new(fast as Arc<dyn StateStore>, Arc::new(BrokenStore));

        // Durable write failure is swallowed
        cache
            .put("k", &"v".to_string(), Duration::from_secs(60), true, "test", false)
            .await
            .unwrap();

        // Read still works off the fast tier
        assert!(cache.get::<String>("k").await.is_some());

        // Full miss with broken durable degrades to None, no panic
        assert!(cache.get::<String>("other").await.is_none());
    }

    #[tokio::test]
    async fn test_contains() {
        let (cache, _, _) = cache_with_stores();
        assert!(!cache.contains("k").await);
        cache
            .put("k", &0u8, Duration::from_secs(60), false, "test", false)
            .await
            .unwrap();
        assert!(cache.contains("k").await);
    }
}
