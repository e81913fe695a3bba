//! StreamWatch binary entry point: wires logging, the store, and the
//! checking/pipeline services together, then waits for a shutdown signal.
//! The terminal UI, argument parsing, and player binary are external
//! collaborators — this binary only proves the core wires up end to end.

use std::sync::Arc;
use std::time::Duration;

use streamwatch::cache::StatusCache;
use streamwatch::checker::{CheckerConfig, StreamChecker};
use streamwatch::config::BootstrapConfig;
use streamwatch::logging::init_logging;
use streamwatch::ratelimit::{RateLimiter, RateLimiterConfig};
use streamwatch::store;
use tracing::{error, info};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let bootstrap = BootstrapConfig::load()?;

    let log_dir = bootstrap
        .log_dir
        .clone()
        .unwrap_or_else(|| bootstrap.data_dir.join("logs"));
    let (_logging_config, _guard) = init_logging(&log_dir.display().to_string())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    info!(version = env!("CARGO_PKG_VERSION"), "starting streamwatch");

    std::fs::create_dir_all(&bootstrap.data_dir)?;

    let pool = store::init_pool(&bootstrap.database_url).await?;
    store::run_migrations(&pool).await?;
    let store = store::Store::new(pool);

    streamwatch::config::seed_runtime_defaults(&store).await?;

    let migration_report = store::migrate_legacy(
        &store,
        &bootstrap.streams_json_path(),
        &bootstrap.config_ini_path(),
        &bootstrap.data_dir,
    )
    .await?;
    if migration_report.streams_migrated > 0 || migration_report.config_migrated > 0 {
        info!(
            streams = migration_report.streams_migrated,
            config = migration_report.config_migrated,
            "migrated legacy state"
        );
    }

    let cache = Arc::new(StatusCache::new(Duration::from_secs(300)));
    let rate_limiter = Arc::new(RateLimiter::new(RateLimiterConfig::default()));
    let _checker = Arc::new(StreamChecker::new(cache, rate_limiter, CheckerConfig::default()));

    let manager = streamwatch::manager::StreamManager::new(store.clone());
    let records = manager.list().await?;
    info!(count = records.len(), "loaded stream records");

    info!("streamwatch core initialized, waiting for shutdown signal");
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received shutdown signal"),
        Err(e) => error!(error = %e, "failed to listen for shutdown signal"),
    }

    Ok(())
}
