//! Operator endpoints.
//!
//! Every route here sits behind [`super::middleware::operator_middleware`];
//! the operator id is recorded as the actor on each decision.

use axum::{
    Json,
    extract::{Extension, Path, State},
};
use chrono::Utc;
use perlas_wallet::approval::ApprovalOutcome;
use perlas_wallet::deposit::DepositRequest;
use perlas_wallet::monitoring::HealthReport;
use perlas_wallet::wallet::{LedgerSnapshot, UserId, Wallet};
use perlas_wallet::withdrawal::WithdrawalRequest;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::AppState;
use super::errors::{ApiError, ApiResult};
use super::middleware::Operator;
use crate::{logging, metrics};

#[derive(Debug, Deserialize)]
pub struct ConfirmDepositRequest {
    pub reference_code: String,
    pub validation_code: String,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: String,
}

#[derive(Debug, Serialize)]
pub struct ExpiredDeposits {
    pub expired: usize,
    pub deposits: Vec<DepositRequest>,
}

/// A released deposit and the balance it produced
#[derive(Debug, Serialize)]
pub struct ApprovalResponse {
    pub outcome: &'static str,
    pub deposit: DepositRequest,
    pub balance: Decimal,
    pub transaction_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct LedgerCheck {
    #[serde(flatten)]
    pub snapshot: LedgerSnapshot,
    pub consistent: bool,
    /// Whether this check put the wallet under review
    pub hold_placed: bool,
}

/// Turn an approval outcome into a response; anything but a release is a conflict
fn approval_response(outcome: ApprovalOutcome) -> ApiResult<Json<ApprovalResponse>> {
    match outcome {
        ApprovalOutcome::Approved {
            deposit,
            credit,
            trigger,
        } => {
            metrics::deposits_approved_total(&trigger.to_string());
            Ok(Json(ApprovalResponse {
                outcome: "approved",
                balance: credit.wallet.balance,
                transaction_id: credit.transaction.id,
                deposit,
            }))
        }
        ApprovalOutcome::AlreadyProcessed(status) => Err(ApiError::new(
            "DEPOSIT_NOT_PENDING",
            format!("Deposit request is {}", status),
        )),
        ApprovalOutcome::NotEligible => Err(ApiError::new(
            "NOT_ELIGIBLE",
            "Payment method does not release on this trigger",
        )),
        ApprovalOutcome::HeldForReview => Err(ApiError::new(
            "WALLET_UNDER_REVIEW",
            "Wallet is under review; release the hold first",
        )),
        ApprovalOutcome::WalletBlocked { code } => {
            Err(ApiError::new(code, "Wallet cannot receive funds"))
        }
        ApprovalOutcome::IntegrityViolation(_) => Err(ApiError::new(
            "LEDGER_MISMATCH",
            "Wallet balance disagrees with its ledger; wallet placed under review",
        )),
    }
}

/// Expire every PENDING deposit past its expiry time
pub async fn expire_deposits(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
) -> ApiResult<Json<ExpiredDeposits>> {
    let deposits = state.engine.deposits.expire_stale_requests().await?;
    tracing::info!(
        operator = operator.as_str(),
        expired = deposits.len(),
        "Stale deposits expired"
    );
    Ok(Json(ExpiredDeposits {
        expired: deposits.len(),
        deposits,
    }))
}

/// Confirm a manual bank deposit against its payment reference
pub async fn confirm_deposit(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Json(request): Json<ConfirmDepositRequest>,
) -> ApiResult<Json<ApprovalResponse>> {
    let outcome = state
        .engine
        .deposits
        .confirm_manual_deposit(
            &request.reference_code,
            &request.validation_code,
            operator.as_str(),
        )
        .await?;
    approval_response(outcome)
}

/// Release a pending deposit on the operator's decision.
///
/// Used for deposits left pending after their charge completed, once the
/// wallet's hold or freeze has been lifted.
pub async fn approve_deposit(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Path(deposit_id): Path<Uuid>,
) -> ApiResult<Json<ApprovalResponse>> {
    let outcome = state
        .engine
        .approver
        .operator_approve(deposit_id, operator.as_str())
        .await?;
    approval_response(outcome)
}

pub async fn reject_deposit(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Path(deposit_id): Path<Uuid>,
    Json(request): Json<ReasonRequest>,
) -> ApiResult<Json<DepositRequest>> {
    let deposit = state
        .engine
        .deposits
        .reject_deposit(deposit_id, operator.as_str(), &request.reason)
        .await?;
    Ok(Json(deposit))
}

pub async fn complete_withdrawal(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Path(withdrawal_id): Path<Uuid>,
) -> ApiResult<Json<WithdrawalRequest>> {
    let withdrawal = state
        .engine
        .withdrawals
        .complete_withdrawal(withdrawal_id, operator.as_str())
        .await?;
    Ok(Json(withdrawal))
}

/// Reject a withdrawal; the gross amount is refunded
pub async fn reject_withdrawal(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Path(withdrawal_id): Path<Uuid>,
    Json(request): Json<ReasonRequest>,
) -> ApiResult<Json<WithdrawalRequest>> {
    let withdrawal = state
        .engine
        .withdrawals
        .reject_withdrawal(withdrawal_id, operator.as_str(), &request.reason)
        .await?;
    metrics::ledger_entries_total("credit");
    logging::log_money_movement(
        "withdrawal_refund",
        withdrawal.user_id,
        withdrawal.amount,
        Some(&withdrawal.reference_code),
    );
    Ok(Json(withdrawal))
}

/// Payment metrics, active alerts and overall status; nothing is raised
pub async fn monitoring(State(state): State<AppState>) -> ApiResult<Json<HealthReport>> {
    Ok(Json(state.engine.monitor.health_report(Utc::now()).await?))
}

/// Recompute a wallet's ledger; a mismatch puts the wallet under review
pub async fn verify_wallet(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Json<LedgerCheck>> {
    let snapshot = state.engine.monitor.verify_ledger(user_id).await?;
    let consistent = snapshot.is_consistent();
    let mut hold_placed = false;
    if !consistent {
        let wallet = state.engine.wallets.get_wallet(user_id).await?;
        if !wallet.review_hold {
            state
                .engine
                .wallets
                .place_review_hold(user_id, operator.as_str(), "ledger mismatch")
                .await?;
            hold_placed = true;
        }
    }
    Ok(Json(LedgerCheck {
        snapshot,
        consistent,
        hold_placed,
    }))
}

pub async fn freeze_wallet(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Path(user_id): Path<UserId>,
    Json(request): Json<ReasonRequest>,
) -> ApiResult<Json<Wallet>> {
    let wallet = state
        .engine
        .wallets
        .freeze(user_id, operator.as_str(), &request.reason)
        .await?;
    Ok(Json(wallet))
}

pub async fn unfreeze_wallet(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Json<Wallet>> {
    Ok(Json(
        state
            .engine
            .wallets
            .unfreeze(user_id, operator.as_str())
            .await?,
    ))
}

pub async fn release_review_hold(
    State(state): State<AppState>,
    Extension(operator): Extension<Operator>,
    Path(user_id): Path<UserId>,
) -> ApiResult<Json<Wallet>> {
    Ok(Json(
        state
            .engine
            .wallets
            .release_review_hold(user_id, operator.as_str())
            .await?,
    ))
}
