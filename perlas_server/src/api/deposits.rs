//! Deposit request handlers.
//!
//! Deposits through methods that need no card token: bank transfer, store
//! and manual bank deposit. Card deposits go through [`super::payments`].
//!
//! # Examples
//!
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/deposits \
//!   -H "x-user-id: 42" \
//!   -H "Content-Type: application/json" \
//!   -d '{"amount": "250.00", "payment_method": "MANUAL_DEPOSIT"}'
//! ```

use axum::{
    Json,
    extract::{Extension, Path, State},
    http::StatusCode,
};
use perlas_wallet::deposit::{DepositError, DepositRequest, PaymentMethod};
use perlas_wallet::payments::PaymentResponse;
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::errors::{ApiError, ApiResult};
use super::middleware::Caller;
use super::{AppState, payment_status};
use crate::metrics;

#[derive(Debug, Deserialize)]
pub struct CreateDepositRequest {
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
}

/// Create a deposit request.
///
/// # Response
///
/// `201 Created` with the payment response. Manual deposits carry the
/// `reference_code` and `validation_code` the user prints on the slip;
/// bank transfers and store payments carry payment instructions.
///
/// # Errors
///
/// - `400 Bad Request`: Card method (use `/payments/card`) or invalid amount
/// - `404 Not Found`: Caller has no wallet
/// - `409 Conflict`: Wallet frozen or inactive
/// - `422 Unprocessable Entity`: Amount out of range or deposit limit reached
/// - `502 Bad Gateway`: Gateway failed to issue instructions
pub async fn create_deposit(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<CreateDepositRequest>,
) -> ApiResult<(StatusCode, Json<PaymentResponse>)> {
    let response = state
        .engine
        .payments
        .create_deposit(caller.user_id, request.amount, request.payment_method)
        .await?;

    metrics::deposits_created_total(&request.payment_method.to_string());
    if request.payment_method != PaymentMethod::ManualDeposit {
        metrics::charges_total(&request.payment_method.to_string(), response.success);
    }
    Ok((payment_status(&response, StatusCode::CREATED), Json(response)))
}

/// Get one of the caller's deposit requests.
///
/// Another user's deposit reads as not found.
pub async fn get_deposit(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(deposit_id): Path<Uuid>,
) -> ApiResult<Json<DepositRequest>> {
    let deposit = state.engine.deposits.get_deposit(deposit_id).await?;
    if deposit.user_id != caller.user_id {
        return Err(ApiError::from(DepositError::DepositNotFound(deposit_id)));
    }
    Ok(Json(deposit))
}
