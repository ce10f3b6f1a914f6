//! Gateway payment handlers.
//!
//! A refused charge is not an API error: the response body is the full
//! payment response with `success: false` and the gateway's code. Only
//! the HTTP status differs (402 for declines, 502/504 when the gateway
//! could not answer).

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
};
use perlas_wallet::db::Page;
use perlas_wallet::deposit::DepositStatus;
use perlas_wallet::gateway::ExternalTransaction;
use perlas_wallet::payments::PaymentResponse;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::errors::ApiResult;
use super::middleware::Caller;
use super::{AppState, PageParams, payment_status};
use crate::{logging, metrics};

#[derive(Debug, Deserialize)]
pub struct CardPaymentRequest {
    pub amount: Decimal,
    /// Card token from the gateway's client library
    pub source_id: String,
    #[serde(default)]
    pub device_session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AmountRequest {
    pub amount: Decimal,
}

/// Charge a tokenised card.
///
/// ```json
/// {"amount": "100.00", "source_id": "tok_visa", "device_session_id": "ds_1"}
/// ```
///
/// Synchronously completed charges are credited before the response
/// returns (`deposit_status: "APPROVED"`); pending charges wait for the
/// gateway's webhook.
pub async fn create_card_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CardPaymentRequest>,
) -> ApiResult<(StatusCode, Json<PaymentResponse>)> {
    let started = std::time::Instant::now();
    let response = state
        .engine
        .payments
        .create_card_payment(
            caller.user_id,
            request.amount,
            request.source_id,
            request.device_session_id,
        )
        .await?;
    logging::log_performance(
        "card_charge",
        started.elapsed().as_millis() as u64,
        response.external_charge_id.as_deref(),
    );
    Ok(record("CARD", response))
}

/// Issue a CLABE for an interbank transfer.
pub async fn create_bank_transfer(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<AmountRequest>,
) -> ApiResult<(StatusCode, Json<PaymentResponse>)> {
    let response = state
        .engine
        .payments
        .create_bank_transfer(caller.user_id, request.amount)
        .await?;
    Ok(record("BANK_TRANSFER", response))
}

/// Issue a convenience store payment reference.
pub async fn create_store_payment(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<AmountRequest>,
) -> ApiResult<(StatusCode, Json<PaymentResponse>)> {
    let response = state
        .engine
        .payments
        .create_store_payment(caller.user_id, request.amount)
        .await?;
    Ok(record("STORE", response))
}

fn record(method: &str, response: PaymentResponse) -> (StatusCode, Json<PaymentResponse>) {
    metrics::deposits_created_total(method);
    metrics::charges_total(method, response.success);
    if response.deposit_status == Some(DepositStatus::Approved) {
        metrics::deposits_approved_total("charge_response");
    }
    (payment_status(&response, StatusCode::CREATED), Json(response))
}

/// The caller's gateway transactions, newest first.
pub async fn list_transactions(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Page<ExternalTransaction>>> {
    let page = state
        .engine
        .payments
        .get_transaction_history(caller.user_id, params.into())
        .await?;
    Ok(Json(page))
}

/// One of the caller's gateway transactions.
pub async fn get_transaction(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(transaction_id): Path<Uuid>,
) -> ApiResult<Json<ExternalTransaction>> {
    let transaction = state
        .engine
        .payments
        .get_transaction(transaction_id, caller.user_id)
        .await?;
    Ok(Json(transaction))
}
