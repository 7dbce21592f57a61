//! Configuration management.
//!
//! Layered: on-disk TOML first, then `BIBLIOMERGE_*` environment
//! variables override. Every field has a default so the binary runs with
//! no config file at all.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::orchestrator::CacheTtls;
use crate::resilience::{BreakerConfig, RetryConfig};
use crate::warmer::WarmerConfig;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// API keys for upstream services
    #[serde(default)]
    pub api_keys: ApiKeys,

    /// Cache TTLs and durable-tier location
    #[serde(default)]
    pub cache: CacheConfig,

    /// Per-provider resilience tuning
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Cache warmer schedule settings
    #[serde(default)]
    pub warmer: WarmerSettings,
}

/// API keys for external services
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKeys {
    /// Google Books API key (optional, raises quota)
    #[serde(default)]
    pub google: Option<String>,

    /// ISBNdb API key (required for the isbndb provider)
    #[serde(default)]
    pub isbndb: Option<String>,
}

impl Default for ApiKeys {
    fn default() -> Self {
        Self {
            google: std::env::var("GOOGLE_BOOKS_API_KEY").ok(),
            isbndb: std::env::var("ISBNDB_API_KEY").ok(),
        }
    }
}

/// Cache tier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// TTL for general search responses, seconds
    #[serde(default = "default_search_ttl")]
    pub search_ttl_secs: u64,

    /// TTL for author bibliographies, seconds
    #[serde(default = "default_author_ttl")]
    pub author_ttl_secs: u64,

    /// TTL for identifier lookups, seconds
    #[serde(default = "default_isbn_ttl")]
    pub isbn_ttl_secs: u64,

    /// TTL for successful-but-empty responses, seconds
    #[serde(default = "default_empty_ttl")]
    pub empty_ttl_secs: u64,

    /// Durable tier directory; platform cache dir when unset
    #[serde(default)]
    pub durable_dir: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            search_ttl_secs: default_search_ttl(),
            author_ttl_secs: default_author_ttl(),
            isbn_ttl_secs: default_isbn_ttl(),
            empty_ttl_secs: default_empty_ttl(),
            durable_dir: None,
        }
    }
}

impl CacheConfig {
    pub fn ttls(&self) -> CacheTtls {
        CacheTtls {
            search: Duration::from_secs(self.search_ttl_secs),
            author: Duration::from_secs(self.author_ttl_secs),
            isbn: Duration::from_secs(self.isbn_ttl_secs),
            empty: Duration::from_secs(self.empty_ttl_secs),
        }
    }
}

fn default_search_ttl() -> u64 {
    60 * 60
}

fn default_author_ttl() -> u64 {
    24 * 60 * 60
}

fn default_isbn_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_empty_ttl() -> u64 {
    60
}

/// Resilience tuning for one upstream
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Whether to register this provider at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Breaker failure threshold
    pub failure_threshold: u32,

    /// Breaker recovery timeout, seconds
    pub recovery_timeout_secs: u64,

    /// Retry attempt cap, including the first call
    pub max_attempts: u32,

    /// Per-call timeout, seconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_call_timeout() -> u64 {
    8
}

impl ProviderSettings {
    /// Free/best-effort upstream defaults
    fn free() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            max_attempts: 3,
            call_timeout_secs: default_call_timeout(),
        }
    }

    /// Quota-limited upstream defaults: opens sooner, retries less
    fn quota_limited() -> Self {
        Self {
            enabled: true,
            failure_threshold: 3,
            recovery_timeout_secs: 60,
            max_attempts: 2,
            call_timeout_secs: default_call_timeout(),
        }
    }

    pub fn breaker_config(&self) -> BreakerConfig {
        BreakerConfig {
            failure_threshold: self.failure_threshold,
            recovery_timeout: Duration::from_secs(self.recovery_timeout_secs),
            ..BreakerConfig::default()
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            ..RetryConfig::default()
        }
    }
}

/// Per-provider settings block
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "ProviderSettings::free")]
    pub google: ProviderSettings,

    #[serde(default = "ProviderSettings::free")]
    pub openlibrary: ProviderSettings,

    #[serde(default = "ProviderSettings::quota_limited")]
    pub isbndb: ProviderSettings,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            google: ProviderSettings::free(),
            openlibrary: ProviderSettings::free(),
            isbndb: ProviderSettings::quota_limited(),
        }
    }
}

/// Cache warmer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmerSettings {
    /// Subjects processed concurrently per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Pause between batches, seconds
    #[serde(default = "default_batch_pause")]
    pub batch_pause_secs: u64,

    /// TTL for warmed entries, seconds
    #[serde(default = "default_warm_ttl")]
    pub warm_ttl_secs: u64,

    /// Minimum spacing between warm calls per upstream, milliseconds
    #[serde(default = "default_spacing_ms")]
    pub min_call_spacing_ms: u64,

    /// Ranked anticipated high-traffic subjects
    #[serde(default)]
    pub subjects: Vec<String>,
}

impl Default for WarmerSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            batch_pause_secs: default_batch_pause(),
            warm_ttl_secs: default_warm_ttl(),
            min_call_spacing_ms: default_spacing_ms(),
            subjects: Vec::new(),
        }
    }
}

impl WarmerSettings {
    pub fn warmer_config(&self) -> WarmerConfig {
        WarmerConfig {
            batch_size: self.batch_size,
            batch_pause: Duration::from_secs(self.batch_pause_secs),
            warm_ttl: Duration::from_secs(self.warm_ttl_secs),
            min_call_spacing: Duration::from_millis(self.min_call_spacing_ms),
        }
    }
}

fn default_batch_size() -> usize {
    3
}

fn default_batch_pause() -> u64 {
    2
}

fn default_warm_ttl() -> u64 {
    7 * 24 * 60 * 60
}

fn default_spacing_ms() -> u64 {
    1000
}

/// Load configuration from a file, with environment overrides
pub fn load_config(path: &PathBuf) -> Result<Config, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path.as_path()))
        .add_source(config::Environment::with_prefix("BIBLIOMERGE").separator("__"))
        .build()?;

    settings.try_deserialize()
}

/// Environment-only configuration when no file is given
pub fn get_config() -> Config {
    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_distinguish_quota_limited() {
        let config = Config::default();
        assert_eq!(config.providers.google.failure_threshold, 5);
        assert_eq!(config.providers.google.max_attempts, 3);
        assert_eq!(config.providers.isbndb.failure_threshold, 3);
        assert_eq!(config.providers.isbndb.max_attempts, 2);
        assert_eq!(config.providers.isbndb.recovery_timeout_secs, 60);
    }

    #[test]
    fn test_ttl_conversion() {
        let ttls = CacheConfig::default().ttls();
        assert_eq!(ttls.search, Duration::from_secs(3600));
        assert_eq!(ttls.isbn, Duration::from_secs(7 * 24 * 3600));
        assert_eq!(ttls.empty, Duration::from_secs(60));
    }

    #[test]
    fn test_warmer_defaults() {
        let warmer = WarmerSettings::default().warmer_config();
        assert_eq!(warmer.batch_size, 3);
        assert_eq!(warmer.batch_pause, Duration::from_secs(2));
    }
}
