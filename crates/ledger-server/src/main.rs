//! figure-credits HTTP Server
//!
//! Receives payment provider webhooks, converts payments into credits
//! exactly once, and exposes admin adjustment and ledger read endpoints.

mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use credit_ledger::{LedgerConfig, LedgerStore, MemoryLedgerStore};

use crate::state::{AppState, ServerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let ledger_config = LedgerConfig::from_env()?;
    let server_config = ServerConfig::from_env();

    tracing::info!("Conversion rate: {} credits per currency unit", ledger_config.credits_per_unit);
    if ledger_config.admin_key.is_some() {
        tracing::info!("✓ Admin key configured");
    } else {
        tracing::warn!("⚠ ADMIN_KEY not set - admin endpoints will reject every request");
    }

    let (store, backend) = open_store(&server_config).await?;
    let state = AppState::new(store, ledger_config, backend);
    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&server_config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 figure-credits running on http://{}", server_config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    for (method, path, what) in routes::ENDPOINTS {
        tracing::info!("  {method} {path:<40} - {what}");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

#[cfg(feature = "postgres")]
async fn open_store(config: &ServerConfig) -> anyhow::Result<(Arc<dyn LedgerStore>, &'static str)> {
    if let Some(url) = config.database_url.as_deref() {
        let store = credit_ledger::PgLedgerStore::connect(url).await?;
        tracing::info!("✓ Connected to PostgreSQL, migrations applied");
        return Ok((Arc::new(store), "postgres"));
    }
    Ok(memory_store())
}

#[cfg(not(feature = "postgres"))]
#[allow(clippy::unused_async)]
async fn open_store(config: &ServerConfig) -> anyhow::Result<(Arc<dyn LedgerStore>, &'static str)> {
    if config.database_url.is_some() {
        tracing::warn!("⚠ DATABASE_URL is set but this build lacks the `postgres` feature");
    }
    Ok(memory_store())
}

fn memory_store() -> (Arc<dyn LedgerStore>, &'static str) {
    tracing::warn!("⚠ Using in-memory storage - all payments are lost on restart");
    (Arc::new(MemoryLedgerStore::new()), "memory")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutdown signal received");
}
