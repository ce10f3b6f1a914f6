//! Wallet, transfer and withdrawal handlers.

use axum::{
    Json,
    extract::{Extension, Path, Query, State},
    http::StatusCode,
};
use perlas_wallet::db::Page;
use perlas_wallet::wallet::{LedgerTransaction, TransferReceipt, UserId, Wallet};
use perlas_wallet::withdrawal::{BankDestination, WithdrawalError, WithdrawalRequest};
use rust_decimal::Decimal;
use serde::Deserialize;
use uuid::Uuid;

use super::errors::{ApiError, ApiResult};
use super::middleware::Caller;
use super::{AppState, PageParams};
use crate::{logging, metrics};

#[derive(Debug, Default, Deserialize)]
pub struct OpenWalletRequest {
    #[serde(default)]
    pub daily_limit: Option<Decimal>,
    #[serde(default)]
    pub monthly_limit: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub to_user_id: UserId,
    pub amount: Decimal,
}

#[derive(Debug, Deserialize)]
pub struct WithdrawalBody {
    pub amount: Decimal,
    pub destination: BankDestination,
}

/// Open the caller's wallet. Calling again returns the existing wallet.
///
/// Limits default to the configured values when omitted.
pub async fn open_wallet(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    body: Option<Json<OpenWalletRequest>>,
) -> ApiResult<Json<Wallet>> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let wallet = state
        .engine
        .wallets
        .open_wallet(caller.user_id, request.daily_limit, request.monthly_limit)
        .await?;
    Ok(Json(wallet))
}

/// The caller's wallet
pub async fn get_wallet(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
) -> ApiResult<Json<Wallet>> {
    Ok(Json(state.engine.wallets.get_wallet(caller.user_id).await?))
}

/// The caller's ledger entries, newest first, each with its running balance
pub async fn get_history(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<Page<LedgerTransaction>>> {
    let page = state
        .engine
        .wallets
        .history(caller.user_id, params.into())
        .await?;
    Ok(Json(page))
}

/// Send pearls to another user.
///
/// The sender pays the amount plus the configured commission.
///
/// # Errors
///
/// - `400 Bad Request`: Transfer to self or invalid amount
/// - `404 Not Found`: Either wallet missing
/// - `409 Conflict`: Either wallet frozen or inactive
/// - `422 Unprocessable Entity`: Sender cannot cover amount plus commission
pub async fn create_transfer(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<TransferRequest>,
) -> ApiResult<(StatusCode, Json<TransferReceipt>)> {
    let receipt = state
        .engine
        .transfers
        .send(caller.user_id, request.to_user_id, request.amount)
        .await?;
    metrics::ledger_entries_total("transfer");
    logging::log_money_movement("transfer", caller.user_id, request.amount, None);
    Ok((StatusCode::CREATED, Json(receipt)))
}

/// Request a payout to a bank account.
///
/// ```json
/// {
///   "amount": "1000.00",
///   "destination": {
///     "bank_name": "BBVA",
///     "account_holder": "Ana Pérez",
///     "clabe": "012180001234567897"
///   }
/// }
/// ```
///
/// The wallet is debited immediately; a rejection later refunds it.
pub async fn create_withdrawal(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Json(request): Json<WithdrawalBody>,
) -> ApiResult<(StatusCode, Json<WithdrawalRequest>)> {
    let withdrawal = state
        .engine
        .withdrawals
        .request_withdrawal(caller.user_id, request.amount, request.destination)
        .await?;
    metrics::withdrawals_requested_total();
    metrics::ledger_entries_total("debit");
    logging::log_money_movement(
        "withdrawal",
        caller.user_id,
        withdrawal.amount,
        Some(&withdrawal.reference_code),
    );
    Ok((StatusCode::CREATED, Json(withdrawal)))
}

/// One of the caller's withdrawal requests
pub async fn get_withdrawal(
    State(state): State<AppState>,
    Extension(caller): Extension<Caller>,
    Path(withdrawal_id): Path<Uuid>,
) -> ApiResult<Json<WithdrawalRequest>> {
    let withdrawal = state.engine.withdrawals.get_withdrawal(withdrawal_id).await?;
    if withdrawal.user_id != caller.user_id {
        return Err(ApiError::from(WithdrawalError::WithdrawalNotFound(
            withdrawal_id,
        )));
    }
    Ok(Json(withdrawal))
}
