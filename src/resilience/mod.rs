//! Failure isolation: circuit breakers, retry policies, rate pacing.
//!
//! Every orchestrated upstream call runs breaker → retry → per-call
//! timeout. Breaker state and rate-limit timestamps are externalized to
//! the shared store so stateless handler instances agree on provider
//! health.

mod circuit_breaker;
mod rate_limit;
mod retry;

pub use circuit_breaker::{
    BreakerConfig, BreakerRecord, BreakerState, CircuitBreaker, RecordedError,
};
pub use rate_limit::RateGuard;
pub use retry::{search_ladder, QueryStep, RetryConfig, RetryPolicy};
