//! Bounded retries with deterministic query escalation and backoff.
//!
//! Every attempt first consults the provider's circuit breaker; a denial
//! aborts immediately without consuming a retry. From the second attempt
//! onward the provider's escalation ladder progressively simplifies the
//! query (never random variation). Only terminal outcomes report to the
//! breaker, so one orchestrated call moves the failure count by at most
//! one.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};

use super::CircuitBreaker;
use crate::providers::ProviderError;

/// One rung of a provider's query-normalization escalation ladder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStep {
    /// Drop everything that is not alphanumeric or whitespace
    StripPunctuation,
    /// Keep only the first N whitespace tokens
    FirstTokens(usize),
    /// Wrap the query as an exact phrase
    ExactPhrase,
    /// Apply a provider field-scoped operator, e.g. `intitle:`
    FieldScoped(&'static str),
}

impl QueryStep {
    fn apply(&self, query: &str) -> String {
        match self {
            QueryStep::StripPunctuation => query
                .chars()
                .filter(|c| c.is_alphanumeric() || c.is_whitespace())
                .collect::<String>()
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
            QueryStep::FirstTokens(n) => query
                .split_whitespace()
                .take(*n)
                .collect::<Vec<_>>()
                .join(" "),
            QueryStep::ExactPhrase => format!("\"{}\"", query.trim_matches('"')),
            QueryStep::FieldScoped(field) => format!("{field}:{query}"),
        }
    }
}

/// Retry tuning for one provider
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempt cap, including the first call (fewer for quota-limited)
    pub max_attempts: u32,

    /// First backoff interval; doubles per attempt
    pub initial_backoff: Duration,

    /// Ceiling on any single backoff
    pub max_backoff: Duration,

    /// Upper bound of the random jitter added to each backoff
    pub max_jitter: Duration,

    /// Timeout on each individual call, distinct from breaker recovery
    pub call_timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(10),
            max_jitter: Duration::from_millis(500),
            call_timeout: Duration::from_secs(8),
        }
    }
}

/// Retry policy for one provider, built on its circuit breaker
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    ladder: Vec<QueryStep>,
    breaker: CircuitBreaker,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, ladder: Vec<QueryStep>, breaker: CircuitBreaker) -> Self {
        Self {
            config,
            ladder,
            breaker,
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Query text used on a given 1-based attempt: attempt 1 is the raw
    /// query, attempt N applies ladder rungs 1..=N-1 cumulatively.
    pub fn query_for_attempt(&self, raw: &str, attempt: u32) -> String {
        let rungs = (attempt.saturating_sub(1) as usize).min(self.ladder.len());
        self.ladder[..rungs]
            .iter()
            .fold(raw.to_string(), |q, step| step.apply(&q))
    }

    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self
            .config
            .initial_backoff
            .saturating_mul(1u32 << (attempt - 1).min(16));
        let jitter_ms = if self.config.max_jitter.is_zero() {
            0
        } else {
            fastrand::u64(0..=self.config.max_jitter.as_millis() as u64)
        };
        (exp + Duration::from_millis(jitter_ms)).min(self.config.max_backoff)
    }

    /// Run `operation` under the breaker, retry cap, per-call timeout,
    /// and escalation ladder. The closure receives the (possibly
    /// escalated) query text for that attempt.
    pub async fn execute<T, F, Fut>(&self, query: &str, operation: F) -> Result<T, ProviderError>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            if let Err(wait) = self.breaker.can_execute().await {
                return Err(ProviderError::CircuitOpen {
                    provider: self.breaker.provider().to_string(),
                    retry_after_secs: wait.as_secs(),
                });
            }

            let effective = self.query_for_attempt(query, attempt);
            if attempt > 1 {
                tracing::debug!(
                    provider = self.breaker.provider(),
                    attempt,
                    query = %effective,
                    "retrying with escalated query"
                );
            }

            let outcome = match timeout(self.config.call_timeout, operation(effective)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout),
            };

            match outcome {
                Ok(value) => {
                    self.breaker.record_success().await;
                    return Ok(value);
                }
                Err(error) => {
                    let terminal = !error.is_retryable() || attempt >= self.config.max_attempts;
                    if terminal {
                        if error.counts_as_failure() {
                            self.breaker.record_failure(error.kind()).await;
                        }
                        tracing::warn!(
                            provider = self.breaker.provider(),
                            attempt,
                            error = %error,
                            "provider call failed"
                        );
                        return Err(error);
                    }

                    let delay = self.backoff_for_attempt(attempt);
                    tracing::debug!(
                        provider = self.breaker.provider(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient failure, backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// Standard escalation ladder for general-search upstreams
pub fn search_ladder(field_operator: &'static str) -> Vec<QueryStep> {
    vec![
        QueryStep::StripPunctuation,
        QueryStep::FirstTokens(2),
        QueryStep::ExactPhrase,
        QueryStep::FieldScoped(field_operator),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ErrorKind;
    use crate::resilience::BreakerConfig;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn test_policy(max_attempts: u32, threshold: u32) -> RetryPolicy {
        let breaker = CircuitBreaker::new(
            "test",
            BreakerConfig {
                failure_threshold: threshold,
                recovery_timeout: Duration::from_secs(30),
                record_ttl: Duration::from_secs(300),
            },
            Arc::new(MemoryStore::new()),
        );
        RetryPolicy::new(
            RetryConfig {
                max_attempts,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                max_jitter: Duration::ZERO,
                call_timeout: Duration::from_secs(5),
            },
            search_ladder("intitle"),
            breaker,
        )
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let policy = test_policy(3, 5);
        let calls = AtomicU32::new(0);

        let result = policy
            .execute("the martian", |q| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    assert_eq!(q, "the martian");
                    Ok::<_, ProviderError>(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_escalation_ladder_order() {
        let policy = test_policy(5, 10);
        let raw = "the martian: a novel";

        assert_eq!(policy.query_for_attempt(raw, 1), "the martian: a novel");
        assert_eq!(policy.query_for_attempt(raw, 2), "the martian a novel");
        assert_eq!(policy.query_for_attempt(raw, 3), "the martian");
        assert_eq!(policy.query_for_attempt(raw, 4), "\"the martian\"");
        assert_eq!(policy.query_for_attempt(raw, 5), "intitle:\"the martian\"");
        // Past the ladder end the query stops changing
        assert_eq!(policy.query_for_attempt(raw, 9), "intitle:\"the martian\"");
    }

    #[tokio::test]
    async fn test_attempt_cap_respected() {
        let policy = test_policy(3, 10);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .execute("q", |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::ServerError("500".into()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Terminal failure reported once
        assert_eq!(policy.breaker().record().await.failures, 1);
    }

    #[tokio::test]
    async fn test_non_retryable_aborts_immediately() {
        let policy = test_policy(5, 10);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .execute("q", |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::Auth("bad key".into()))
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_not_retried_locally() {
        let policy = test_policy(5, 10);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .execute("q", |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(ProviderError::RateLimit)
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::RateLimit)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The breaker, not the retry loop, governs rate-limit back-off
        let record = policy.breaker().record().await;
        assert_eq!(record.failures, 1);
        assert_eq!(record.recent_errors[0].kind, ErrorKind::RateLimit);
    }

    #[tokio::test]
    async fn test_breaker_denial_aborts_without_calling() {
        let policy = test_policy(3, 1);
        policy.breaker().record_failure(ErrorKind::Timeout).await;

        let calls = Arc::new(AtomicU32::new(0));
        let result: Result<(), _> = policy
            .execute("q", |_| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            })
            .await;

        assert!(matches!(result, Err(ProviderError::CircuitOpen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let policy = test_policy(4, 10);
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy
            .execute("q", |_| {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                    if n < 3 {
                        Err(ProviderError::Network("refused".into()))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        // Terminal success, no breaker failures recorded
        assert_eq!(policy.breaker().record().await.failures, 0);
    }
}
