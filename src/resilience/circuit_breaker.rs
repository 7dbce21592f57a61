//! Circuit breaker for upstream failure isolation.
//!
//! Three states: **closed** (normal), **open** (failing, calls denied),
//! **half-open** (probing recovery). Unlike an in-process breaker, state
//! lives in the shared store under `circuit_breaker:{provider}` so any
//! handler instance sees the same picture; the record carries its own
//! short TTL so a stuck breaker self-heals even without traffic.
//! Mutations are read-modify-write and tolerate benign races.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::providers::ErrorKind;
use crate::store::{now_epoch_secs, StateStore};

/// Size of the recent-error ring kept on the record
const ERROR_RING_SIZE: usize = 5;

/// Breaker states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

/// One classified error remembered on the record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedError {
    pub kind: ErrorKind,
    pub at: u64,
}

/// The persisted record for one provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerRecord {
    pub failures: u32,
    pub state: BreakerState,
    /// Unix timestamp of the last recorded failure
    pub last_failure: Option<u64>,
    /// Bounded ring of recent classified errors, newest last
    pub recent_errors: Vec<RecordedError>,
}

impl Default for BreakerRecord {
    fn default() -> Self {
        Self {
            failures: 0,
            state: BreakerState::Closed,
            last_failure: None,
            recent_errors: Vec::new(),
        }
    }
}

/// Breaker tuning for one provider
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    /// Failures before the circuit opens (lower for quota-limited upstreams)
    pub failure_threshold: u32,

    /// How long the circuit stays open before a half-open probe
    pub recovery_timeout: Duration,

    /// TTL on the persisted record itself
    pub record_ttl: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            record_ttl: Duration::from_secs(300),
        }
    }
}

/// Store-backed circuit breaker for a single provider
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    provider: String,
    config: BreakerConfig,
    store: Arc<dyn StateStore>,
}

impl CircuitBreaker {
    pub fn new(provider: &str, config: BreakerConfig, store: Arc<dyn StateStore>) -> Self {
        Self {
            provider: provider.to_string(),
            config,
            store,
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    fn key(&self) -> String {
        format!("circuit_breaker:{}", self.provider)
    }

    /// Load the record; store failures or a missing record read as closed
    pub async fn record(&self) -> BreakerRecord {
        match self.store.get(&self.key()).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            Ok(None) => BreakerRecord::default(),
            Err(e) => {
                tracing::warn!(provider = %self.provider, error = %e, "breaker state read failed, assuming closed");
                BreakerRecord::default()
            }
        }
    }

    async fn save(&self, record: &BreakerRecord) {
        match serde_json::to_string(record) {
            Ok(raw) => {
                if let Err(e) = self
                    .store
                    .put(&self.key(), &raw, Some(self.config.record_ttl))
                    .await
                {
                    tracing::warn!(provider = %self.provider, error = %e, "breaker state write failed");
                }
            }
            Err(e) => {
                tracing::warn!(provider = %self.provider, error = %e, "breaker state serialize failed")
            }
        }
    }

    /// Whether a call may proceed.
    ///
    /// Closed and half-open allow. Open allows a single probe once the
    /// recovery timeout has elapsed (transitioning to half-open), else
    /// denies with the remaining wait.
    pub async fn can_execute(&self) -> Result<(), Duration> {
        let mut record = self.record().await;

        match record.state {
            BreakerState::Closed | BreakerState::HalfOpen => Ok(()),
            BreakerState::Open => {
                let elapsed = now_epoch_secs().saturating_sub(record.last_failure.unwrap_or(0));
                let recovery = self.config.recovery_timeout.as_secs();

                if elapsed >= recovery {
                    record.state = BreakerState::HalfOpen;
                    self.save(&record).await;
                    tracing::info!(provider = %self.provider, "circuit half-open, allowing probe");
                    Ok(())
                } else {
                    Err(Duration::from_secs(recovery - elapsed))
                }
            }
        }
    }

    /// Report a terminal success.
    ///
    /// Half-open resets fully to closed; a closed breaker with residual
    /// failures heals gradually, one count per success.
    pub async fn record_success(&self) {
        let mut record = self.record().await;

        match record.state {
            BreakerState::HalfOpen => {
                tracing::info!(provider = %self.provider, "circuit closed (recovered)");
                record = BreakerRecord::default();
            }
            BreakerState::Closed if record.failures > 0 => {
                record.failures -= 1;
            }
            BreakerState::Closed => return,
            BreakerState::Open => {
                // A success while nominally open (racing instance); close it
                record = BreakerRecord::default();
            }
        }

        self.save(&record).await;
    }

    /// Report a terminal failure with its classified kind
    pub async fn record_failure(&self, kind: ErrorKind) {
        let mut record = self.record().await;
        let now = now_epoch_secs();

        record.recent_errors.push(RecordedError { kind, at: now });
        if record.recent_errors.len() > ERROR_RING_SIZE {
            let excess = record.recent_errors.len() - ERROR_RING_SIZE;
            record.recent_errors.drain(..excess);
        }

        record.failures += 1;
        record.last_failure = Some(now);

        match record.state {
            BreakerState::HalfOpen => {
                record.state = BreakerState::Open;
                tracing::warn!(provider = %self.provider, "circuit reopened (probe failed)");
            }
            BreakerState::Closed if record.failures >= self.config.failure_threshold => {
                record.state = BreakerState::Open;
                tracing::warn!(
                    provider = %self.provider,
                    failures = record.failures,
                    error = %kind,
                    "circuit opened"
                );
            }
            _ => {}
        }

        self.save(&record).await;
    }

    /// Reset to closed, dropping all history
    pub async fn reset(&self) {
        if let Err(e) = self.store.delete(&self.key()).await {
            tracing::warn!(provider = %self.provider, error = %e, "breaker reset failed");
        }
    }
}
