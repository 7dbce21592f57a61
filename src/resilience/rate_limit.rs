//! Persisted minimum-spacing guard for background provider calls.
//!
//! The warmer must not exceed any upstream's rate ceiling even when
//! several warmer runs overlap across instances, so the last-call
//! timestamp lives in the shared store under `ratelimit:{provider}`.
//! The guard is read-check-then-write with no locking: concurrent runs
//! can slightly over- or under-shoot, which only makes the posture more
//! conservative, never less safe.

use std::sync::Arc;
use std::time::Duration;

use crate::store::StateStore;

#[derive(Debug, Clone)]
pub struct RateGuard {
    store: Arc<dyn StateStore>,
}

impl RateGuard {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    fn key(provider: &str) -> String {
        format!("ratelimit:{provider}")
    }

    fn now_ms() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    /// Sleep until at least `min_interval` has passed since the last
    /// recorded call to `provider`, then record this call.
    ///
    /// Store failures are ignored: a missing timestamp just means no
    /// waiting, and rate posture degrades conservatively elsewhere.
    pub async fn wait_turn(&self, provider: &str, min_interval: Duration) {
        let key = Self::key(provider);

        let last_ms = match self.store.get(&key).await {
            Ok(Some(raw)) => raw.parse::<u64>().ok(),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(provider, error = %e, "rate-limit timestamp read failed");
                None
            }
        };

        if let Some(last) = last_ms {
            let elapsed = Self::now_ms().saturating_sub(last);
            let min_ms = min_interval.as_millis() as u64;
            if elapsed < min_ms {
                let wait = Duration::from_millis(min_ms - elapsed);
                tracing::debug!(provider, wait_ms = wait.as_millis() as u64, "pacing provider call");
                tokio::time::sleep(wait).await;
            }
        }

        if let Err(e) = self
            .store
            .put(&key, &Self::now_ms().to_string(), Some(min_interval * 10))
            .await
        {
            tracing::warn!(provider, error = %e, "rate-limit timestamp write failed");
        }
    }
}
