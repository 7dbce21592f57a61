//! Out-of-band cache warming for anticipated high-traffic subjects.
//!
//! Runs on a schedule, never on the request path. Subjects are processed
//! in small concurrent batches with an inter-batch pause, paced per
//! upstream through the persisted rate guard. Every failure is logged
//! and swallowed; warming must never affect foreground availability.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use crate::cache::TieredCache;
use crate::models::{AggregatedResponse, QueryKind, SearchRequest};
use crate::orchestrator::Orchestrator;
use crate::providers::ProviderCapabilities;
use crate::resilience::RateGuard;

#[derive(Debug, Clone)]
pub struct WarmerConfig {
    /// Subjects processed concurrently per batch
    pub batch_size: usize,

    /// Pause between batches
    pub batch_pause: Duration,

    /// TTL for warmed entries, longer than foreground writes
    pub warm_ttl: Duration,

    /// Minimum spacing between warm calls to the same upstream
    pub min_call_spacing: Duration,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            batch_size: 3,
            batch_pause: Duration::from_secs(2),
            warm_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            min_call_spacing: Duration::from_secs(1),
        }
    }
}

/// Outcome counts for one warming run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmStats {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
}

enum WarmOutcome {
    Succeeded,
    Failed,
    Skipped,
}

pub struct CacheWarmer {
    orchestrator: Arc<Orchestrator>,
    cache: TieredCache,
    rate_guard: RateGuard,
    config: WarmerConfig,
}

impl CacheWarmer {
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        cache: TieredCache,
        rate_guard: RateGuard,
        config: WarmerConfig,
    ) -> Self {
        Self {
            orchestrator,
            cache,
            rate_guard,
            config,
        }
    }

    /// Warm the ranked subject list, most anticipated first
    pub async fn run(&self, subjects: &[String]) -> WarmStats {
        let mut stats = WarmStats::default();
        let batch_size = self.config.batch_size.max(1);

        for (index, batch) in subjects.chunks(batch_size).enumerate() {
            if index > 0 {
                tokio::time::sleep(self.config.batch_pause).await;
            }

            let outcomes = join_all(batch.iter().map(|s| self.warm_subject(s))).await;
            for outcome in outcomes {
                stats.attempted += 1;
                match outcome {
                    WarmOutcome::Succeeded => stats.succeeded += 1,
                    WarmOutcome::Failed => stats.failed += 1,
                    WarmOutcome::Skipped => stats.skipped += 1,
                }
            }
        }

        tracing::info!(
            attempted = stats.attempted,
            succeeded = stats.succeeded,
            failed = stats.failed,
            skipped = stats.skipped,
            "cache warming run complete"
        );
        stats
    }

    async fn warm_subject(&self, subject: &str) -> WarmOutcome {
        let request = SearchRequest::new(subject);
        let kind = request.kind();
        let key = self.orchestrator.cache_key(kind, &request);

        if self.cache.contains(&key).await {
            tracing::debug!(subject, "already cached, skipping");
            return WarmOutcome::Skipped;
        }

        for provider in self.providers_for(kind) {
            self.rate_guard
                .wait_turn(&provider, self.config.min_call_spacing)
                .await;
        }

        match self.orchestrator.handle(&request).await {
            Ok(response) if !response.items.is_empty() => {
                self.store_warm_entry(&key, &response).await;
                WarmOutcome::Succeeded
            }
            Ok(_) => {
                tracing::debug!(subject, "no results to warm");
                WarmOutcome::Failed
            }
            Err(e) => {
                tracing::warn!(subject, error = %e, "warming failed");
                WarmOutcome::Failed
            }
        }
    }

    /// Rewrite the fresh response into the durable tier with a long TTL
    /// and the high-priority marker
    async fn store_warm_entry(&self, key: &str, response: &AggregatedResponse) {
        if let Err(e) = self
            .cache
            .put(key, response, self.config.warm_ttl, true, &response.provider, true)
            .await
        {
            tracing::warn!(key, error = %e, "warm entry write failed");
        }
    }

    /// Upstream ids a subject of this classification will touch
    fn providers_for(&self, kind: QueryKind) -> Vec<String> {
        let capability = match kind {
            QueryKind::Isbn => ProviderCapabilities::ISBN_LOOKUP,
            QueryKind::Author => ProviderCapabilities::AUTHOR_WORKS,
            QueryKind::Title | QueryKind::Mixed => ProviderCapabilities::SEARCH,
        };
        self.orchestrator
            .registry()
            .with_capability(capability)
            .into_iter()
            .map(|p| p.id().to_string())
            .collect()
    }
}
