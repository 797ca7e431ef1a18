//! Router

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    adjust_credits, health_check, list_payments, provider_webhook, reconcile_user, user_balance,
    user_ledger, user_payments,
};
use crate::state::AppState;

/// Endpoint table, printed at startup
pub const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("GET ", "/health", "Health check"),
    ("POST", "/webhooks/{provider}", "Provider payment notification"),
    ("POST", "/api/admin/credits", "Manual credit adjustment"),
    ("GET ", "/api/admin/payments", "Recent payments (x-admin-key)"),
    ("GET ", "/api/admin/users/{user_id}/reconcile", "Balance vs ledger (x-admin-key)"),
    ("GET ", "/api/users/{user_id}/payments", "User payment history"),
    ("GET ", "/api/users/{user_id}/ledger", "User ledger entries"),
    ("GET ", "/api/users/{user_id}/balance", "User credit balance"),
];

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(health_check))

        // Provider callbacks
        .route("/webhooks/{provider}", post(provider_webhook))

        // Admin
        .route("/api/admin/credits", post(adjust_credits))
        .route("/api/admin/payments", get(list_payments))
        .route("/api/admin/users/{user_id}/reconcile", get(reconcile_user))

        // Per-user reads
        .route("/api/users/{user_id}/payments", get(user_payments))
        .route("/api/users/{user_id}/ledger", get(user_ledger))
        .route("/api/users/{user_id}/balance", get(user_balance))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
