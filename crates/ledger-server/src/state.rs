//! Application State

use std::sync::Arc;

use credit_ledger::{CreditAdjuster, LedgerConfig, LedgerQueries, LedgerStore, PaymentRecorder};

/// Process-level settings outside the ledger itself
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub database_url: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into()),
            database_url: std::env::var("DATABASE_URL").ok().filter(|url| !url.is_empty()),
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Webhook-driven payment recording
    pub recorder: Arc<PaymentRecorder>,

    /// Manual credit adjustments
    pub adjuster: Arc<CreditAdjuster>,

    /// Read-only listings and balances
    pub queries: LedgerQueries,

    /// Needed by admin read endpoints to check the key header
    pub config: Arc<LedgerConfig>,

    /// Storage backend name, reported by /health
    pub backend: &'static str,
}

impl AppState {
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig, backend: &'static str) -> Self {
        Self {
            recorder: Arc::new(PaymentRecorder::new(store.clone(), config.clone())),
            adjuster: Arc::new(CreditAdjuster::new(store.clone(), config.clone())),
            queries: LedgerQueries::new(store),
            config: Arc::new(config),
            backend,
        }
    }
}
