//! Withdrawal requests: debit on request, refund on rejection.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    config::WithdrawalConfig,
    errors::{WithdrawalError, WithdrawalResult},
    models::{BankDestination, WithdrawalRequest, WithdrawalStatus},
};
use crate::audit::{AuditAction, AuditTrail, NewAuditEntry};
use crate::db::{Store, UnitOfWork};
use crate::reference;
use crate::wallet::{
    EntryRequest, LedgerTransaction, TransactionType, UserId, WalletError,
    ledger::{self, entry_audit},
};

const MAX_REFERENCE_ATTEMPTS: usize = 3;

/// Withdrawal manager
#[derive(Clone)]
pub struct WithdrawalManager {
    store: Arc<dyn Store>,
    audit: AuditTrail,
    config: WithdrawalConfig,
}

impl WithdrawalManager {
    pub fn new(store: Arc<dyn Store>, config: WithdrawalConfig) -> Self {
        Self {
            audit: AuditTrail::new(store.clone()),
            store,
            config,
        }
    }

    pub fn config(&self) -> &WithdrawalConfig {
        &self.config
    }

    /// Request a payout to a bank account
    ///
    /// The wallet is debited immediately: `net_amount` as a WITHDRAWAL entry
    /// and the commission as a COMMISSION entry.
    ///
    /// # Arguments
    ///
    /// * `user_id` - Withdrawing user
    /// * `amount` - Gross amount taken from the wallet
    /// * `destination` - Bank account receiving the payout
    pub async fn request_withdrawal(
        &self,
        user_id: UserId,
        amount: Decimal,
        destination: BankDestination,
    ) -> WithdrawalResult<WithdrawalRequest> {
        ledger::validate_amount(amount)?;
        let bounds = self.config.bounds;
        if !bounds.contains(amount) {
            return Err(WithdrawalError::AmountOutOfRange {
                amount,
                min: bounds.min,
                max: bounds.max,
            });
        }
        if !destination.has_valid_clabe() {
            return Err(WithdrawalError::InvalidDestination);
        }

        let commission = self.config.commission_for(amount);
        let net_amount = amount - commission;

        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            let now = Utc::now();
            let request = WithdrawalRequest {
                id: Uuid::new_v4(),
                user_id,
                amount,
                commission,
                net_amount,
                reference_code: reference::generate_reference_code(
                    reference::WITHDRAWAL_PREFIX,
                    now,
                ),
                destination: destination.clone(),
                status: WithdrawalStatus::Pending,
                processed_by: None,
                processed_at: None,
                rejection_reason: None,
                created_at: now,
                updated_at: now,
            };

            let mut uow = self.store.begin().await?;
            let entries = self.debit_for(uow.as_mut(), &request).await?;
            match uow.insert_withdrawal(&request).await {
                Ok(()) => uow.commit().await?,
                Err(e) if e.is_conflict() => {
                    log::warn!(
                        "Withdrawal reference {} collided (attempt {}/{})",
                        request.reference_code,
                        attempt,
                        MAX_REFERENCE_ATTEMPTS
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            log::info!(
                "Withdrawal {} requested by user {}: {} (net {})",
                request.reference_code,
                user_id,
                amount,
                net_amount
            );
            let actor = user_id.to_string();
            let mut audit = vec![
                NewAuditEntry::new(actor.clone(), AuditAction::WithdrawalRequested)
                    .user(user_id)
                    .amount(amount)
                    .reference(request.reference_code.clone())
                    .details(serde_json::json!({
                        "withdrawal_id": request.id,
                        "commission": commission,
                        "net_amount": net_amount,
                    })),
            ];
            audit.extend(entries.iter().map(|t| entry_audit(&actor, t)));
            self.audit.record(audit).await;
            return Ok(request);
        }

        Err(WithdrawalError::ReferenceExhausted)
    }

    async fn debit_for(
        &self,
        uow: &mut dyn UnitOfWork,
        request: &WithdrawalRequest,
    ) -> WithdrawalResult<Vec<LedgerTransaction>> {
        let mut wallet = ledger::lock_usable_wallet(uow, request.user_id).await?;
        if wallet.balance < request.amount {
            return Err(WalletError::InsufficientFunds {
                available: wallet.balance,
                required: request.amount,
            }
            .into());
        }

        let mut entries = vec![
            ledger::post_to_locked(
                uow,
                &mut wallet,
                EntryRequest::debit(
                    request.user_id,
                    request.net_amount,
                    TransactionType::Withdrawal,
                    format!("Withdrawal {}", request.reference_code),
                    Some(request.reference_code.clone()),
                ),
            )
            .await?,
        ];
        if request.commission > Decimal::ZERO {
            entries.push(
                ledger::post_to_locked(
                    uow,
                    &mut wallet,
                    EntryRequest::debit(
                        request.user_id,
                        request.commission,
                        TransactionType::Commission,
                        "Withdrawal commission",
                        Some(request.reference_code.clone()),
                    ),
                )
                .await?,
            );
        }
        Ok(entries)
    }

    /// Get a withdrawal request
    pub async fn get_withdrawal(&self, id: Uuid) -> WithdrawalResult<WithdrawalRequest> {
        self.store
            .withdrawal(id)
            .await?
            .ok_or(WithdrawalError::WithdrawalNotFound(id))
    }

    /// Mark a payout as sent. The ledger already reflects it.
    pub async fn complete_withdrawal(
        &self,
        id: Uuid,
        operator: &str,
    ) -> WithdrawalResult<WithdrawalRequest> {
        let mut uow = self.store.begin().await?;
        let mut request = lock_pending(uow.as_mut(), id).await?;

        let now = Utc::now();
        request.status = WithdrawalStatus::Completed;
        request.processed_by = Some(operator.to_string());
        request.processed_at = Some(now);
        request.updated_at = now;
        uow.update_withdrawal(&request).await?;
        uow.commit().await?;

        log::info!("Withdrawal {} completed by {}", request.reference_code, operator);
        self.audit
            .record([NewAuditEntry::new(operator, AuditAction::WithdrawalCompleted)
                .user(request.user_id)
                .amount(request.net_amount)
                .reference(request.reference_code.clone())])
            .await;
        Ok(request)
    }

    /// Reject a payout and refund the gross amount.
    ///
    /// The refund is posted even to a frozen wallet; the funds never left
    /// the platform.
    pub async fn reject_withdrawal(
        &self,
        id: Uuid,
        operator: &str,
        reason: &str,
    ) -> WithdrawalResult<WithdrawalRequest> {
        let mut uow = self.store.begin().await?;
        let mut request = lock_pending(uow.as_mut(), id).await?;

        let mut wallet = ledger::lock_wallet(uow.as_mut(), request.user_id).await?;
        let refund = ledger::post_to_locked(
            uow.as_mut(),
            &mut wallet,
            EntryRequest::credit(
                request.user_id,
                request.amount,
                TransactionType::Withdrawal,
                format!("Refund of withdrawal {}", request.reference_code),
                Some(request.reference_code.clone()),
            ),
        )
        .await?;

        let now = Utc::now();
        request.status = WithdrawalStatus::Rejected;
        request.processed_by = Some(operator.to_string());
        request.processed_at = Some(now);
        request.rejection_reason = Some(reason.to_string());
        request.updated_at = now;
        uow.update_withdrawal(&request).await?;
        uow.commit().await?;

        log::info!(
            "Withdrawal {} rejected by {}; refunded {}",
            request.reference_code,
            operator,
            request.amount
        );
        self.audit
            .record([
                NewAuditEntry::new(operator, AuditAction::WithdrawalRejected)
                    .user(request.user_id)
                    .amount(request.amount)
                    .reference(request.reference_code.clone())
                    .details(serde_json::json!({ "reason": reason })),
                entry_audit(operator, &refund),
            ])
            .await;
        Ok(request)
    }
}

async fn lock_pending(uow: &mut dyn UnitOfWork, id: Uuid) -> WithdrawalResult<WithdrawalRequest> {
    let request = uow
        .lock_withdrawal(id)
        .await?
        .ok_or(WithdrawalError::WithdrawalNotFound(id))?;
    if request.status != WithdrawalStatus::Pending {
        return Err(WithdrawalError::NotPending(request.status));
    }
    Ok(request)
}
