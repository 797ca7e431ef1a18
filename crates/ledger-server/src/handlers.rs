//! HTTP Handlers

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
};
use serde::{Deserialize, Serialize};

use credit_ledger::{
    AdjustmentOutcome, LedgerEntry, PaymentError, PaymentEvent, PaymentRecord, Provider,
    Reconciliation, UserId, query::DEFAULT_PAGE_SIZE,
};

use crate::state::AppState;

/// Header carrying the admin key on admin read endpoints
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub storage: &'static str,
    pub admin_enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustCreditsRequest {
    pub user_id: String,
    pub delta: i64,
    #[serde(default)]
    pub reason: String,
    pub admin_key: String,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub limit: Option<usize>,
}

impl ListParams {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub user_id: UserId,
    pub credits: i64,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, code: &str, error: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.into(),
        }),
    )
}

/// Map ledger errors onto HTTP. Storage failures become 503 so providers
/// redeliver the webhook.
fn ledger_error(err: &PaymentError) -> ApiError {
    let (status, code) = match err {
        PaymentError::DuplicateIdentifier(_) => (StatusCode::CONFLICT, "DUPLICATE_IDENTIFIER"),
        PaymentError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
        PaymentError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
        PaymentError::UserNotFound(_) => (StatusCode::NOT_FOUND, "USER_NOT_FOUND"),
        PaymentError::WebhookParse(_) => (StatusCode::BAD_REQUEST, "WEBHOOK_PARSE_ERROR"),
        PaymentError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
        PaymentError::Storage(_) => (StatusCode::SERVICE_UNAVAILABLE, "STORAGE_UNAVAILABLE"),
    };
    api_error(status, code, err.user_message())
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let key = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if state.config.verify_admin_key(key) {
        Ok(())
    } else {
        Err(ledger_error(&PaymentError::Unauthorized("invalid admin key".into())))
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        storage: state.backend,
        admin_enabled: state.config.admin_key.is_some(),
    })
}

/// Provider webhook receiver
///
/// Signature verification would sit in front of this handler, per provider.
pub async fn provider_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    body: String,
) -> Result<(StatusCode, Json<WebhookResponse>), ApiError> {
    let provider = Provider::parse(&provider).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            "UNKNOWN_PROVIDER",
            format!("Unknown payment provider: {provider}"),
        )
    })?;

    let event = PaymentEvent::parse(provider, &body).map_err(|e| {
        tracing::warn!(provider = %provider, error = %e, "Rejected webhook payload");
        ledger_error(&e)
    })?;
    let kind = event.kind();

    let Some(mut request) = event.into_request().map_err(|e| {
        tracing::warn!(provider = %provider, event = %kind, error = %e, "Unusable webhook payload");
        ledger_error(&e)
    })?
    else {
        tracing::debug!(provider = %provider, event = %kind, "Ignoring non-payment webhook");
        return Ok((
            StatusCode::ACCEPTED,
            Json(WebhookResponse {
                status: "ignored",
                payment: None,
            }),
        ));
    };

    // Body already parsed as a provider shape, so it is valid JSON.
    request.raw = serde_json::from_str(&body).ok();

    let record = state.recorder.record_payment(request).await.map_err(|e| {
        tracing::error!(
            provider = %provider,
            event = %kind,
            error = %e,
            "Webhook processing error"
        );
        ledger_error(&e)
    })?;

    Ok((
        StatusCode::OK,
        Json(WebhookResponse {
            status: "recorded",
            payment: Some(record),
        }),
    ))
}

/// Manual credit adjustment
pub async fn adjust_credits(
    State(state): State<AppState>,
    Json(payload): Json<AdjustCreditsRequest>,
) -> Result<Json<AdjustmentOutcome>, ApiError> {
    let user_id = UserId::new(payload.user_id);
    state
        .adjuster
        .adjust_credits(&user_id, payload.delta, &payload.reason, &payload.admin_key)
        .await
        .map(Json)
        .map_err(|e| ledger_error(&e))
}

/// Most recent payments across all users (admin)
pub async fn list_payments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<PaymentRecord>>, ApiError> {
    require_admin(&state, &headers)?;
    state
        .queries
        .recent_payments(params.limit())
        .await
        .map(Json)
        .map_err(|e| ledger_error(&e))
}

/// Balance vs ledger comparison for one user (admin)
pub async fn reconcile_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(user_id): Path<String>,
) -> Result<Json<Reconciliation>, ApiError> {
    require_admin(&state, &headers)?;
    let user_id = UserId::new(user_id);
    match state.queries.reconcile(&user_id).await {
        Ok(Some(report)) => Ok(Json(report)),
        Ok(None) => Err(ledger_error(&PaymentError::UserNotFound(user_id.to_string()))),
        Err(e) => Err(ledger_error(&e)),
    }
}

pub async fn user_payments(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<PaymentRecord>>, ApiError> {
    state
        .queries
        .user_payments(&UserId::new(user_id), params.limit())
        .await
        .map(Json)
        .map_err(|e| ledger_error(&e))
}

pub async fn user_ledger(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<LedgerEntry>>, ApiError> {
    state
        .queries
        .user_ledger(&UserId::new(user_id), params.limit())
        .await
        .map(Json)
        .map_err(|e| ledger_error(&e))
}

pub async fn user_balance(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let user_id = UserId::new(user_id);
    match state.queries.balance(&user_id).await {
        Ok(Some(credits)) => Ok(Json(BalanceResponse { user_id, credits })),
        Ok(None) => Err(ledger_error(&PaymentError::UserNotFound(user_id.to_string()))),
        Err(e) => Err(ledger_error(&e)),
    }
}
