//! Reset worker binary for KinQuest period counters.
//!
//! This is the scheduler entry point that zeroes family period buckets
//! at their calendar boundaries. It loads configuration, connects to
//! PostgreSQL and the leaderboard cache, and runs the reset loop until
//! the process is stopped.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `kinquest.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Connect to PostgreSQL and apply migrations
//! 4. Connect the leaderboard cache (optional)
//! 5. Run the reset scheduler loop

mod config;
mod error;
mod jobs;

use std::path::Path;

use kinquest_store::{LeaderboardCache, PostgresConfig, PostgresPool};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::WorkerConfig;
use crate::error::WorkerError;
use crate::jobs::ResetScheduler;

/// Application entry point for the reset worker.
///
/// Initializes all subsystems and runs the scheduling loop. Returns an
/// error code on failure.
///
/// # Errors
///
/// Returns an error if configuration, connections, or the scheduler fail.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let (config, from_file) = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .with_target(true)
        .init();

    info!("kinquest-worker starting");
    if from_file {
        info!(
            max_connections = config.infrastructure.max_connections,
            log_level = %config.logging.level,
            "Configuration loaded"
        );
    } else {
        info!("Config file not found, using defaults");
    }

    // 3. Connect to PostgreSQL and run migrations.
    let pg_config = PostgresConfig::new(&config.infrastructure.postgres_url)
        .with_max_connections(config.infrastructure.max_connections);
    let pool = PostgresPool::connect(&pg_config).await?;
    pool.run_migrations().await?;
    info!("PostgreSQL connected, migrations applied");

    // 4. Connect the leaderboard cache (optional; resets proceed without it).
    let cache = match LeaderboardCache::connect(&config.infrastructure.cache_url).await {
        Ok(cache) => {
            info!("Leaderboard cache connected");
            Some(cache)
        }
        Err(e) => {
            warn!(error = %e, "Cache unavailable, resets will not clear cached leaderboards");
            None
        }
    };

    // 5. Run the reset scheduler.
    let mut scheduler = ResetScheduler::new(pool);
    if let Some(cache) = cache {
        scheduler = scheduler.with_cache(cache);
    }
    scheduler.run().await?;

    Ok(())
}

/// Load the worker configuration from `kinquest.yaml`.
///
/// Looks for the config file relative to the current working directory.
/// When the file is absent, defaults are used; environment overrides for
/// infrastructure URLs apply on both paths. The returned flag records
/// whether a file was actually read, for startup logging.
fn load_config() -> Result<(WorkerConfig, bool), WorkerError> {
    let config_path = Path::new("kinquest.yaml");
    if config_path.exists() {
        let config = WorkerConfig::from_file(config_path)?;
        Ok((config, true))
    } else {
        let mut config = WorkerConfig::default();
        config.infrastructure.apply_env_overrides();
        Ok((config, false))
    }
}
