//! Deposit request lifecycle.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use super::{
    config::DepositConfig,
    errors::{DepositError, DepositResult},
    models::{DepositRequest, DepositStatus, PaymentMethod, PaymentReference, ReferenceKind},
};
use crate::approval::{ApprovalOutcome, ApprovalTrigger, DepositApprover};
use crate::audit::{AuditAction, AuditTrail, NewAuditEntry, SYSTEM_ACTOR};
use crate::db::Store;
use crate::reference;
use crate::wallet::{TransactionType, UserId, WalletError, ledger};

/// Attempts at a unique reference code before giving up
const MAX_REFERENCE_ATTEMPTS: usize = 3;

/// A created deposit and, for manual deposits, the code that validates it
#[derive(Debug, Clone, Serialize)]
pub struct DepositReceipt {
    pub deposit: DepositRequest,
    /// Shown once to the depositor; the operator needs it to confirm
    pub validation_code: Option<String>,
}

/// Deposit request manager
#[derive(Clone)]
pub struct DepositManager {
    store: Arc<dyn Store>,
    audit: AuditTrail,
    approver: DepositApprover,
    config: DepositConfig,
}

impl DepositManager {
    /// Create a new deposit manager
    ///
    /// # Arguments
    ///
    /// * `store` - Store holding deposits and wallets
    /// * `approver` - Approver used for operator confirmations
    /// * `config` - Bounds, lifetime and currency
    pub fn new(store: Arc<dyn Store>, approver: DepositApprover, config: DepositConfig) -> Self {
        Self {
            audit: AuditTrail::new(store.clone()),
            store,
            approver,
            config,
        }
    }

    pub fn config(&self) -> &DepositConfig {
        &self.config
    }

    /// Create a PENDING deposit request
    ///
    /// # Arguments
    ///
    /// * `user_id` - Depositing user
    /// * `amount` - Amount in currency units, at most two decimals
    /// * `method` - Payment method
    ///
    /// # Returns
    ///
    /// * `DepositResult<DepositReceipt>` - The request; rejected before any write on bad input
    pub async fn create_deposit(
        &self,
        user_id: UserId,
        amount: Decimal,
        method: PaymentMethod,
    ) -> DepositResult<DepositReceipt> {
        let bounds = self
            .config
            .bounds_for(method)
            .ok_or_else(|| DepositError::UnknownPaymentMethod(method.to_string()))?;
        ledger::validate_amount(amount)?;
        if !bounds.contains(amount) {
            return Err(DepositError::AmountOutOfRange {
                amount,
                min: bounds.min,
                max: bounds.max,
            });
        }

        let wallet = self
            .store
            .wallet(user_id)
            .await?
            .ok_or(WalletError::WalletNotFound(user_id))?;
        ledger::ensure_usable(&wallet)?;

        let now = Utc::now();
        for (period, span, limit) in [
            ("Daily", Duration::days(1), wallet.daily_limit),
            ("Monthly", Duration::days(30), wallet.monthly_limit),
        ] {
            let purchased = self
                .store
                .credited_since(user_id, TransactionType::PearlPurchase, now - span)
                .await?;
            let attempted = purchased + amount;
            if attempted > limit {
                return Err(DepositError::DepositLimitExceeded {
                    period,
                    limit,
                    attempted,
                });
            }
        }

        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            let deposit = self.new_request(user_id, amount, method, now);
            let payment_reference = (method == PaymentMethod::ManualDeposit)
                .then(|| payment_reference_for(&deposit, now));

            let mut uow = self.store.begin().await?;
            let inserted = match uow.insert_deposit(&deposit).await {
                Ok(()) => match &payment_reference {
                    Some(r) => uow.insert_payment_reference(r).await,
                    None => Ok(()),
                },
                Err(e) => Err(e),
            };
            match inserted {
                Ok(()) => uow.commit().await?,
                Err(e) if e.is_conflict() => {
                    log::warn!(
                        "Reference code {} collided (attempt {}/{})",
                        deposit.reference_code,
                        attempt,
                        MAX_REFERENCE_ATTEMPTS
                    );
                    continue;
                }
                Err(e) => return Err(e.into()),
            }

            log::info!(
                "Created {} deposit {} for user {}: {}",
                method,
                deposit.reference_code,
                user_id,
                amount
            );
            return Ok(DepositReceipt {
                deposit,
                validation_code: payment_reference.map(|r| r.validation_code),
            });
        }

        Err(DepositError::ReferenceExhausted)
    }

    fn new_request(
        &self,
        user_id: UserId,
        amount: Decimal,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> DepositRequest {
        DepositRequest {
            id: Uuid::new_v4(),
            user_id,
            amount,
            pearls_amount: amount,
            payment_method: method,
            reference_code: reference::generate_reference_code(reference::DEPOSIT_PREFIX, now),
            integration_method: method.integration(),
            auto_approval_eligible: self.approver.policy().for_method(method).auto_approval_eligible,
            status: DepositStatus::Pending,
            external_transaction_id: None,
            expires_at: now + self.config.lifetime,
            validated_by: None,
            validated_at: None,
            rejection_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Get a deposit request
    pub async fn get_deposit(&self, id: Uuid) -> DepositResult<DepositRequest> {
        self.store
            .deposit(id)
            .await?
            .ok_or(DepositError::DepositNotFound(id))
    }

    /// Expire every PENDING request past its expiry time
    pub async fn expire_stale_requests(&self) -> DepositResult<Vec<DepositRequest>> {
        self.expire_stale_requests_at(Utc::now()).await
    }

    /// Expire every PENDING request whose expiry is before `now`.
    ///
    /// No wallet is touched; a PENDING request never moved funds. Requests
    /// whose gateway charge completed are skipped: the capture was held back
    /// and stays pending until an operator approves it.
    pub async fn expire_stale_requests_at(
        &self,
        now: DateTime<Utc>,
    ) -> DepositResult<Vec<DepositRequest>> {
        let mut uow = self.store.begin().await?;
        let expired = uow.expire_deposits(now).await?;
        uow.commit().await?;

        if !expired.is_empty() {
            log::info!("Expired {} stale deposit requests", expired.len());
        }
        let entries: Vec<NewAuditEntry> = expired
            .iter()
            .map(|d| {
                NewAuditEntry::new(SYSTEM_ACTOR, AuditAction::DepositExpired)
                    .user(d.user_id)
                    .amount(d.amount)
                    .reference(d.reference_code.clone())
            })
            .collect();
        self.audit.record(entries).await;
        Ok(expired)
    }

    /// Reject a PENDING deposit
    ///
    /// # Arguments
    ///
    /// * `deposit_id` - Deposit to reject
    /// * `operator` - Operator recorded as the validator
    /// * `reason` - Why the deposit was refused
    pub async fn reject_deposit(
        &self,
        deposit_id: Uuid,
        operator: &str,
        reason: &str,
    ) -> DepositResult<DepositRequest> {
        let mut uow = self.store.begin().await?;
        let mut deposit = uow
            .lock_deposit(deposit_id)
            .await?
            .ok_or(DepositError::DepositNotFound(deposit_id))?;
        if !deposit.is_pending() {
            return Err(DepositError::NotPending(deposit.status));
        }

        let now = Utc::now();
        deposit.status = DepositStatus::Rejected;
        deposit.validated_by = Some(operator.to_string());
        deposit.validated_at = Some(now);
        deposit.rejection_reason = Some(reason.to_string());
        deposit.updated_at = now;
        uow.update_deposit(&deposit).await?;
        uow.commit().await?;

        log::info!("Deposit {} rejected by {}", deposit.reference_code, operator);
        self.audit
            .record([NewAuditEntry::new(operator, AuditAction::DepositRejected)
                .user(deposit.user_id)
                .amount(deposit.amount)
                .reference(deposit.reference_code.clone())
                .details(serde_json::json!({ "reason": reason }))])
            .await;
        Ok(deposit)
    }

    /// Confirm a manual deposit against its payment reference.
    ///
    /// The reference is consumed only when the deposit is approved, in the
    /// same unit of work as the credit.
    ///
    /// # Arguments
    ///
    /// * `reference_code` - Code printed on the deposit slip
    /// * `validation_code` - Code issued with the reference
    /// * `operator` - Operator validating the payment
    pub async fn confirm_manual_deposit(
        &self,
        reference_code: &str,
        validation_code: &str,
        operator: &str,
    ) -> DepositResult<ApprovalOutcome> {
        let mut uow = self.store.begin().await?;
        let mut payment_reference = uow
            .lock_payment_reference(reference_code)
            .await?
            .ok_or_else(|| DepositError::ReferenceNotFound(reference_code.to_string()))?;

        let now = Utc::now();
        if payment_reference.is_used {
            return Err(DepositError::ReferenceUsed);
        }
        if payment_reference.expires_at < now {
            return Err(DepositError::ReferenceExpired);
        }
        if !reference::validation_codes_match(&payment_reference.validation_code, validation_code)
        {
            log::warn!(
                "Validation code mismatch for reference {} (operator {})",
                reference_code,
                operator
            );
            return Err(DepositError::InvalidValidationCode);
        }

        let deposit = uow
            .lock_deposit_by_reference(reference_code)
            .await?
            .ok_or_else(|| DepositError::ReferenceNotFound(reference_code.to_string()))?;
        let outcome = self
            .approver
            .approve_within(
                uow.as_mut(),
                deposit.id,
                None,
                operator,
                ApprovalTrigger::Operator,
            )
            .await?;

        if outcome.is_approved() {
            payment_reference.is_used = true;
            payment_reference.used_at = Some(now);
            uow.update_payment_reference(&payment_reference).await?;
        }
        uow.commit().await?;

        self.approver.finish(&outcome).await;
        Ok(outcome)
    }
}

fn payment_reference_for(deposit: &DepositRequest, now: DateTime<Utc>) -> PaymentReference {
    PaymentReference {
        id: Uuid::new_v4(),
        code: deposit.reference_code.clone(),
        validation_code: reference::generate_validation_code(),
        user_id: deposit.user_id,
        amount: deposit.amount,
        kind: ReferenceKind::Deposit,
        is_used: false,
        used_at: None,
        expires_at: deposit.expires_at,
        created_at: now,
    }
}
