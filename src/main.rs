//! `ticket-metrics` binary
//!
//! Reads calls as JSON lines on stdin and writes replies on stdout; logs go
//! to stderr. Configuration comes from `TICKET_METRICS_*` variables, with
//! command-line flags taking precedence.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use ticket_metrics::{
    Aggregator, QueryService, ServiceConfig, SqliteConfig, SqliteStore, StoreAdapter,
};
use ticket_metrics_app::{AppContext, create_router, serve};
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ticket-metrics", version, about = "Ticket metrics query service")]
struct Cli {
    /// SQLite database file; an in-memory store is used when absent
    #[arg(long)]
    database: Option<PathBuf>,

    /// Default cache TTL in seconds
    #[arg(long)]
    ttl_secs: Option<u64>,

    #[arg(long)]
    max_entries: Option<usize>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    #[arg(long)]
    max_connections: Option<u32>,

    /// Disable result caching
    #[arg(long)]
    no_cache: bool,
}

impl Cli {
    fn apply(self, mut config: ServiceConfig) -> ServiceConfig {
        if let Some(path) = self.database {
            config = config.with_database_path(path);
        }
        if let Some(ttl) = self.ttl_secs {
            config.cache = config.cache.with_default_ttl(Duration::from_secs(ttl));
        }
        if let Some(max) = self.max_entries {
            config.cache = config.cache.with_max_entries(max);
        }
        if let Some(timeout) = self.timeout_ms {
            config = config.with_request_timeout(Duration::from_millis(timeout));
        }
        if let Some(max) = self.max_connections {
            config = config.with_max_connections(max);
        }
        if self.no_cache {
            config.cache = config.cache.with_enabled(false);
        }
        config
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Cli::parse().apply(ServiceConfig::from_env());
    config.validate()?;

    let (sqlite, backend) = match &config.database_path {
        Some(path) => (SqliteConfig::new(path.to_string_lossy().to_string()), "sqlite"),
        None => (SqliteConfig::in_memory(), "sqlite-memory"),
    };
    let store = SqliteStore::new(sqlite.with_max_connections(config.max_connections)).await?;
    let aggregator = Aggregator::new(StoreAdapter::new(Arc::new(store)));
    let service = QueryService::from_config(&config, Arc::new(aggregator));
    let cleanup = service
        .coordinator()
        .start_cleanup_task(config.cleanup_interval);

    let router = Arc::new(create_router(AppContext::new(service, backend)));
    info!(
        store = backend,
        procedures = ?router.procedures(),
        ttl_secs = config.cache.default_ttl.as_secs(),
        "ticket metrics service ready"
    );

    serve(router, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await?;

    cleanup.abort();
    info!("stdin closed, shutting down");
    Ok(())
}
