//! Upstream provider plugins behind a capability-set interface.
//!
//! Each adapter wraps one upstream and normalizes its response shape into
//! canonical [`Work`]/[`Edition`](crate::models::Edition) records right at
//! this boundary, never deeper in the pipeline. New upstreams are added by
//! implementing [`Provider`] and registering with the
//! [`ProviderRegistry`]; the orchestrator only sees capabilities.

mod google_books;
mod http;
mod isbndb;
pub mod mock;
mod open_library;
mod registry;

pub use google_books::GoogleBooksProvider;
pub use isbndb::IsbndbProvider;
pub use mock::MockProvider;
pub use open_library::OpenLibraryProvider;
pub use registry::{ProviderCapabilities, ProviderRegistry};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::{SearchRequest, Work};

/// Classified provider error kind, recorded in the breaker's error ring
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Timeout,
    RateLimit,
    Auth,
    ServerError,
    Network,
    Unknown,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimit => "rate_limit",
            ErrorKind::Auth => "auth",
            ErrorKind::ServerError => "server_error",
            ErrorKind::Network => "network",
            ErrorKind::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// Errors that can occur when calling an upstream provider
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The requested operation is not implemented for this provider
    #[error("Operation not implemented for this provider")]
    NotImplemented,

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// Upstream reported a rate limit (429)
    #[error("Rate limit exceeded")]
    RateLimit,

    /// Authentication/authorization failure (401/403)
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Upstream 5xx
    #[error("Upstream server error: {0}")]
    ServerError(String),

    /// Network or connection error
    #[error("Network error: {0}")]
    Network(String),

    /// Response parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Malformed request, never retried
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Clean zero-result response; not a failure
    #[error("Not found: {0}")]
    NotFound(String),

    /// Circuit breaker denied the call; seconds until the next probe
    #[error("Circuit open for {provider}, retry in {retry_after_secs}s")]
    CircuitOpen {
        provider: String,
        retry_after_secs: u64,
    },

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

impl ProviderError {
    /// Classify into the breaker's error-ring taxonomy
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProviderError::Timeout => ErrorKind::Timeout,
            ProviderError::RateLimit => ErrorKind::RateLimit,
            ProviderError::Auth(_) => ErrorKind::Auth,
            ProviderError::ServerError(_) => ErrorKind::ServerError,
            ProviderError::Network(_) => ErrorKind::Network,
            _ => ErrorKind::Unknown,
        }
    }

    /// Whether the retry loop may attempt this error again locally.
    ///
    /// Rate limits are deliberately excluded: the breaker, not the retry
    /// loop, governs that back-off.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::Timeout | ProviderError::ServerError(_) | ProviderError::Network(_)
        )
    }

    /// Whether the terminal outcome should count as a breaker failure.
    ///
    /// Clean empty results and caller mistakes do not degrade the
    /// provider's health.
    pub fn counts_as_failure(&self) -> bool {
        !matches!(
            self,
            ProviderError::NotFound(_)
                | ProviderError::InvalidRequest(_)
                | ProviderError::NotImplemented
                | ProviderError::CircuitOpen { .. }
        )
    }

    /// Map an HTTP status + body excerpt onto the taxonomy
    pub fn from_status(status: reqwest::StatusCode, detail: &str) -> Self {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            ProviderError::RateLimit
        } else if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            ProviderError::Auth(format!("{status}: {detail}"))
        } else if status.is_server_error() {
            ProviderError::ServerError(format!("{status}: {detail}"))
        } else {
            ProviderError::Other(format!("{status}: {detail}"))
        }
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout
        } else if err.is_connect() {
            ProviderError::Network(err.to_string())
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::Parse(format!("JSON: {err}"))
    }
}

/// The Provider trait defines the capability-set interface for upstreams.
///
/// Adapters implement only the operations their upstream supports and
/// advertise them via [`Provider::capabilities`]; everything else falls
/// back to `NotImplemented`.
#[async_trait]
pub trait Provider: Send + Sync + std::fmt::Debug {
    /// Unique identifier ("google", "openlibrary", "isbndb")
    fn id(&self) -> &str;

    /// Human-readable name
    fn name(&self) -> &str;

    /// Capability set for this provider
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::SEARCH
    }

    fn supports_search(&self) -> bool {
        self.capabilities().contains(ProviderCapabilities::SEARCH)
    }

    fn supports_isbn_lookup(&self) -> bool {
        self.capabilities()
            .contains(ProviderCapabilities::ISBN_LOOKUP)
    }

    fn supports_author_works(&self) -> bool {
        self.capabilities()
            .contains(ProviderCapabilities::AUTHOR_WORKS)
    }

    fn supports_editions(&self) -> bool {
        self.capabilities().contains(ProviderCapabilities::EDITIONS)
    }

    /// General search
    async fn search(&self, _request: &SearchRequest) -> Result<Vec<Work>, ProviderError> {
        Err(ProviderError::NotImplemented)
    }

    /// Full bibliography for an author
    async fn get_author_works(&self, _author: &str) -> Result<Vec<Work>, ProviderError> {
        Err(ProviderError::NotImplemented)
    }

    /// Single record by normalized ISBN
    async fn get_by_isbn(&self, _isbn: &str) -> Result<Work, ProviderError> {
        Err(ProviderError::NotImplemented)
    }

    /// Editions for a known work
    async fn get_editions_for_work(
        &self,
        _title: &str,
        _author: &str,
    ) -> Result<Vec<crate::models::Edition>, ProviderError> {
        Err(ProviderError::NotImplemented)
    }
}
