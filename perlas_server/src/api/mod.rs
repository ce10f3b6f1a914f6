//! HTTP API for the Perlas wallet.
//!
//! Thin handlers over [`perlas_wallet::Engine`]. Authentication happens
//! upstream; the caller arrives in `x-user-id` and operators additionally
//! in `x-operator-id`.
//!
//! # Modules
//!
//! - [`deposits`]: Deposit requests for non-card methods
//! - [`payments`]: Card, bank transfer and store charges, transaction history
//! - [`wallet`]: Wallet, ledger history, transfers and withdrawals
//! - [`webhooks`]: Gateway notifications
//! - [`admin`]: Operator decisions, monitoring and ledger checks
//! - [`middleware`]: Caller and operator identity
//!
//! # Endpoints Overview
//!
//! ```text
//! GET  /health                                   - Health check (public)
//! POST /api/v1/webhooks/gateway                  - Gateway webhook (signature)
//!
//! POST /api/v1/wallet                            - Open wallet (user)
//! GET  /api/v1/wallet                            - Wallet (user)
//! GET  /api/v1/wallet/history                    - Ledger entries (user)
//! POST /api/v1/transfers                         - P2P transfer (user)
//! POST /api/v1/withdrawals                       - Request withdrawal (user)
//! GET  /api/v1/withdrawals/{id}                  - Withdrawal (user)
//! POST /api/v1/deposits                          - Create deposit (user)
//! GET  /api/v1/deposits/{id}                     - Deposit (user)
//! POST /api/v1/payments/card                     - Card charge (user)
//! POST /api/v1/payments/bank-transfer            - CLABE (user)
//! POST /api/v1/payments/store                    - Store reference (user)
//! GET  /api/v1/payments                          - Gateway transactions (user)
//! GET  /api/v1/payments/{id}                     - Gateway transaction (user)
//!
//! POST /api/v1/admin/deposits/expire             - Expire stale deposits
//! POST /api/v1/admin/deposits/confirm            - Confirm manual deposit
//! POST /api/v1/admin/deposits/{id}/approve       - Release pending deposit
//! POST /api/v1/admin/deposits/{id}/reject        - Reject deposit
//! POST /api/v1/admin/withdrawals/{id}/complete   - Mark payout sent
//! POST /api/v1/admin/withdrawals/{id}/reject     - Reject and refund payout
//! GET  /api/v1/admin/monitoring                  - Health report
//! GET  /api/v1/admin/wallets/{user_id}/verify    - Ledger check
//! POST /api/v1/admin/wallets/{user_id}/freeze    - Freeze wallet
//! POST /api/v1/admin/wallets/{user_id}/unfreeze  - Unfreeze wallet
//! POST /api/v1/admin/wallets/{user_id}/release   - Release review hold
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod admin;
pub mod deposits;
pub mod errors;
pub mod middleware;
pub mod payments;
pub mod request_id;
pub mod wallet;
pub mod webhooks;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use perlas_wallet::Engine;
use perlas_wallet::db::{DEFAULT_PAGE_SIZE, Database, PageRequest};
use perlas_wallet::payments::PaymentResponse;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use errors::status_for;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every service inside the engine is `Arc`-backed.
#[derive(Clone)]
pub struct AppState {
    pub engine: Engine,
    /// Pool for health checks; `None` when running on the in-memory store
    pub database: Option<Database>,
}

/// `?page=&limit=` query, one-based
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        PageRequest::new(
            params.page.unwrap_or(1),
            params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
    }
}

/// Status for a payment response; refused charges keep their body.
///
/// Gateway outages map to 502/504; any other refusal, including the
/// gateway's own decline codes, is `402 Payment Required`.
pub(crate) fn payment_status(response: &PaymentResponse, ok: StatusCode) -> StatusCode {
    if response.success {
        return ok;
    }
    match response.error_code.as_deref() {
        Some(code) if code.starts_with("GATEWAY_") => status_for(code),
        _ => StatusCode::PAYMENT_REQUIRED,
    }
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Example
///
/// ```rust,no_run
/// # use perlas_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    let root_routes = Router::new().route("/health", get(health_check));

    Router::new()
        .merge(root_routes)
        .nest("/api/v1", create_v1_router())
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_v1_router() -> Router<AppState> {
    // Authenticated by signature, not by caller headers
    let public_routes = Router::new().route("/webhooks/gateway", post(webhooks::gateway_webhook));

    let user_routes = Router::new()
        .route("/wallet", get(wallet::get_wallet).post(wallet::open_wallet))
        .route("/wallet/history", get(wallet::get_history))
        .route("/transfers", post(wallet::create_transfer))
        .route("/withdrawals", post(wallet::create_withdrawal))
        .route("/withdrawals/{withdrawal_id}", get(wallet::get_withdrawal))
        .route("/deposits", post(deposits::create_deposit))
        .route("/deposits/{deposit_id}", get(deposits::get_deposit))
        .route("/payments", get(payments::list_transactions))
        .route("/payments/card", post(payments::create_card_payment))
        .route("/payments/bank-transfer", post(payments::create_bank_transfer))
        .route("/payments/store", post(payments::create_store_payment))
        .route("/payments/{transaction_id}", get(payments::get_transaction))
        .layer(axum::middleware::from_fn(middleware::user_context_middleware));

    let admin_routes = Router::new()
        .route("/admin/deposits/expire", post(admin::expire_deposits))
        .route("/admin/deposits/confirm", post(admin::confirm_deposit))
        .route("/admin/deposits/{deposit_id}/approve", post(admin::approve_deposit))
        .route("/admin/deposits/{deposit_id}/reject", post(admin::reject_deposit))
        .route(
            "/admin/withdrawals/{withdrawal_id}/complete",
            post(admin::complete_withdrawal),
        )
        .route(
            "/admin/withdrawals/{withdrawal_id}/reject",
            post(admin::reject_withdrawal),
        )
        .route("/admin/monitoring", get(admin::monitoring))
        .route("/admin/wallets/{user_id}/verify", get(admin::verify_wallet))
        .route("/admin/wallets/{user_id}/freeze", post(admin::freeze_wallet))
        .route("/admin/wallets/{user_id}/unfreeze", post(admin::unfreeze_wallet))
        .route("/admin/wallets/{user_id}/release", post(admin::release_review_hold))
        .layer(axum::middleware::from_fn(middleware::operator_middleware));

    Router::new()
        .merge(public_routes)
        .merge(user_routes)
        .merge(admin_routes)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the store answers, `503 Service Unavailable`
/// otherwise. Payment health is reported but never fails the check.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","store":"postgres","database":true,"payments":{"total":12,...},...}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (store, db_healthy) = match &state.database {
        Some(db) => ("postgres", db.health_check().await.is_ok()),
        None => ("memory", true),
    };

    let payments = match state.engine.monitor.metrics(chrono::Utc::now()).await {
        Ok(metrics) => json!({
            "total": metrics.total,
            "success_rate": metrics.success_rate,
        }),
        Err(e) => json!({ "error": e.client_message() }),
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "store": store,
        "database": db_healthy,
        "payments": payments,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
