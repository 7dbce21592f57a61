use anyhow::Result;
use bibliomerge::config::{get_config, load_config, Config};
use bibliomerge::models::SearchRequest;
use bibliomerge::orchestrator::Orchestrator;
use bibliomerge::providers::{
    GoogleBooksProvider, IsbndbProvider, OpenLibraryProvider, Provider, ProviderRegistry,
};
use bibliomerge::resilience::{search_ladder, CircuitBreaker, RateGuard, RetryPolicy};
use bibliomerge::store::{FileStore, MemoryStore, StateStore};
use bibliomerge::cache::TieredCache;
use bibliomerge::warmer::CacheWarmer;
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// bibliomerge - Search book metadata across multiple upstream catalogs
#[derive(Parser, Debug)]
#[command(name = "bibliomerge")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Search book metadata across multiple upstream catalogs", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging (can be used multiple times: -v, -vv)
    #[arg(long, short, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(long, short)]
    quiet: bool,

    /// Configuration file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one query through the orchestrator
    Query {
        /// Query text: a title, an author name, or an ISBN
        query: String,

        /// Maximum results per upstream
        #[arg(long, default_value_t = 20)]
        max_results: usize,

        /// Include every known edition instead of the best-scored one
        #[arg(long)]
        all_editions: bool,
    },

    /// Warm the cache for the configured (or given) subjects
    Warm {
        /// Subjects to warm; falls back to the configured list
        subjects: Vec<String>,
    },

    /// Show circuit breaker state per provider
    Breakers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let env_filter = if cli.quiet { "error" } else { log_level };

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| format!("bibliomerge={env_filter}")),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => get_config(),
    };

    let engine = Engine::build(&config)?;

    match cli.command {
        Commands::Query {
            query,
            max_results,
            all_editions,
        } => {
            let request = SearchRequest::new(query)
                .max_results(max_results)
                .show_all_editions(all_editions);
            let response = engine.orchestrator.handle(&request).await?;

            if std::io::stdout().is_terminal() {
                print_human(&response);
            } else {
                println!("{}", serde_json::to_string_pretty(&response)?);
            }
        }
        Commands::Warm { subjects } => {
            let subjects = if subjects.is_empty() {
                config.warmer.subjects.clone()
            } else {
                subjects
            };
            if subjects.is_empty() {
                anyhow::bail!("no subjects given and none configured");
            }

            let warmer = CacheWarmer::new(
                Arc::clone(&engine.orchestrator),
                engine.cache.clone(),
                RateGuard::new(Arc::clone(&engine.state_store)),
                config.warmer.warmer_config(),
            );
            let stats = warmer.run(&subjects).await;
            println!(
                "warmed {} subjects: {} succeeded, {} failed, {} skipped",
                stats.attempted, stats.succeeded, stats.failed, stats.skipped
            );
        }
        Commands::Breakers => {
            for breaker in &engine.breakers {
                let record = breaker.record().await;
                println!(
                    "{:<12} {:?} failures={} recent={}",
                    breaker.provider(),
                    record.state,
                    record.failures,
                    record.recent_errors.len()
                );
            }
        }
    }

    Ok(())
}

/// Wired-up runtime: registry, cache, policies, breakers
struct Engine {
    orchestrator: Arc<Orchestrator>,
    cache: TieredCache,
    state_store: Arc<dyn StateStore>,
    breakers: Vec<CircuitBreaker>,
}

impl Engine {
    fn build(config: &Config) -> Result<Self> {
        let durable = match &config.cache.durable_dir {
            Some(dir) => FileStore::new(dir)?,
            None => FileStore::default_location()?,
        };
        let durable: Arc<dyn StateStore> = Arc::new(durable);
        let fast: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
        let cache = TieredCache::new(fast, Arc::clone(&durable));

        let mut registry = ProviderRegistry::new();

        // Ladders: identifier lookups never mutate the query, general
        // search escalates through the standard ladder
        let mut policies: Vec<(String, RetryPolicy)> = Vec::new();
        let mut breakers = Vec::new();

        if config.providers.google.enabled {
            let provider = GoogleBooksProvider::new(config.api_keys.google.clone())?;
            let breaker = CircuitBreaker::new(
                provider.id(),
                config.providers.google.breaker_config(),
                Arc::clone(&durable),
            );
            breakers.push(breaker.clone());
            policies.push((
                provider.id().to_string(),
                RetryPolicy::new(
                    config.providers.google.retry_config(),
                    search_ladder("intitle"),
                    breaker,
                ),
            ));
            registry.register(Arc::new(provider));
        }

        if config.providers.openlibrary.enabled {
            let provider = OpenLibraryProvider::new()?;
            let breaker = CircuitBreaker::new(
                provider.id(),
                config.providers.openlibrary.breaker_config(),
                Arc::clone(&durable),
            );
            breakers.push(breaker.clone());
            policies.push((
                provider.id().to_string(),
                RetryPolicy::new(
                    config.providers.openlibrary.retry_config(),
                    search_ladder("title"),
                    breaker,
                ),
            ));
            registry.register(Arc::new(provider));
        }

        if config.providers.isbndb.enabled {
            if let Some(key) = &config.api_keys.isbndb {
                let provider = IsbndbProvider::new(key.clone())?;
                let breaker = CircuitBreaker::new(
                    provider.id(),
                    config.providers.isbndb.breaker_config(),
                    Arc::clone(&durable),
                );
                breakers.push(breaker.clone());
                policies.push((
                    provider.id().to_string(),
                    RetryPolicy::new(config.providers.isbndb.retry_config(), Vec::new(), breaker),
                ));
                registry.register(Arc::new(provider));
            } else {
                tracing::warn!("ISBNDB_API_KEY not set, isbndb provider disabled");
            }
        }

        let mut orchestrator = Orchestrator::new(Arc::new(registry), cache.clone())
            .with_ttls(config.cache.ttls());
        for (id, policy) in policies {
            orchestrator = orchestrator.with_policy(id, policy);
        }

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            cache,
            state_store: durable,
            breakers,
        })
    }
}

fn print_human(response: &bibliomerge::AggregatedResponse) {
    println!(
        "{} result(s) from {} ({}ms{})",
        response.total_items,
        response.provider,
        response.response_time_ms,
        if response.cached { ", cached" } else { "" }
    );
    for work in &response.items {
        let year = work
            .editions
            .first()
            .and_then(|e| e.published_year())
            .map(|y| format!(" ({y})"))
            .unwrap_or_default();
        println!("  {}{} — {}", work.title, year, work.author_line());
        if let Some(isbn) = work.any_isbn() {
            println!("    isbn: {isbn}");
        }
    }
}
