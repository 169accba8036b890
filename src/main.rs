// This is the entry point of the community moderation service.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (SQLite stores)
// - `web/` = HTTP adapters (routes, session headers, error mapping)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Start background maintenance
// 4. Serve the HTTP API

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
mod config;
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;
#[path = "web/web_layer.rs"]
mod web;

use crate::config::AppConfig;
use crate::core::moderation::ModerationService;
use crate::core::rate_limit::RateLimiter;
use crate::infra::database::connect_pool;
use crate::infra::moderation::SqliteModerationStore;
use crate::infra::rate_limit::SqliteRateLimitStore;
use crate::web::AppState;
use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let config = AppConfig::from_env()?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let pool = connect_pool(&config.database_url).await?;

    let moderation_store = SqliteModerationStore::new(pool.clone());
    moderation_store
        .migrate()
        .await
        .context("Failed to migrate moderation tables")?;
    let moderation_service = Arc::new(ModerationService::new(moderation_store));

    let rate_limit_store = SqliteRateLimitStore::new(pool);
    rate_limit_store
        .migrate()
        .await
        .context("Failed to migrate rate limit tables")?;
    let rate_limiter = Arc::new(RateLimiter::new(
        rate_limit_store,
        config.rate_limits.clone(),
    ));

    let state = AppState {
        moderation: Arc::clone(&moderation_service),
        rate_limiter: Arc::clone(&rate_limiter),
    };

    // Background sweep of expired rate limit counters and hits
    let cleanup_limiter = Arc::clone(&rate_limiter);
    let cleanup_every = Duration::from_secs(config.cleanup_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(cleanup_every);
        loop {
            ticker.tick().await;
            match cleanup_limiter.cleanup(chrono::Utc::now()).await {
                Ok(0) => tracing::debug!("No stale rate limit records"),
                Ok(removed) => tracing::info!("Removed {} stale rate limit records", removed),
                Err(err) => tracing::warn!("Rate limit cleanup failed: {}", err),
            }
        }
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!("Moderation service listening on {}", config.bind_addr);

    axum::serve(listener, web::router(state))
        .await
        .context("HTTP server stopped unexpectedly")?;

    Ok(())
}
