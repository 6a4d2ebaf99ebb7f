//! Aldine circulation pass runner
//!
//! Batch entry point invoked by an external scheduler (cron or similar):
//! reallocate expired allocations, allocate pending reservations, accrue
//! penalties, then exit. User-facing actions go through the library crate.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aldine_core::{
    config::AppConfig,
    repository::Repository,
    services::{audit::LogAuditWriter, notifications::LogNotifier, Services},
    Scope,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("aldine_core={}", config.logging.level).into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Aldine circulation pass v{}", env!("CARGO_PKG_VERSION"));

    // Create database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await?;

    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations").run(&pool).await?;

    // Create repository and services with the logging collaborators;
    // production deployments wire real dispatchers here
    let repository = Repository::new(pool);
    let services = Services::new(repository, Arc::new(LogNotifier), Arc::new(LogAuditWriter));

    // One full pass: expire, allocate, accrue
    let reallocation = services.allocator.reallocate_expired(Scope::All).await?;
    let allocation = services.allocator.allocate_pending(Scope::All).await?;
    let accrual = services.penalties.accrue(Scope::All).await?;

    tracing::info!(
        expired = reallocation.expired.len(),
        reallocated = reallocation.allocated.len(),
        allocated = allocation.allocated.len(),
        penalties_created = accrual.penalties_created,
        penalties_updated = accrual.penalties_updated,
        records_promoted = accrual.records_promoted,
        accrual_skipped = accrual.skipped,
        total_accrued = %accrual.total_accrued,
        "circulation pass finished"
    );

    Ok(())
}
