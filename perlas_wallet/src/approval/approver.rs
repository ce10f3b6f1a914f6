//! Deposit approval: the one path that turns a pending deposit into pearls.
//!
//! The deposit row is locked and re-read inside the caller's unit of work
//! before anything is written, so of two concurrent triggers for the same
//! deposit only one observes PENDING. The other sees APPROVED and does
//! nothing.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::errors::{ApprovalError, ApprovalResult};
use super::policy::{ApprovalPolicy, ApprovalTrigger};
use crate::audit::{AuditAction, AuditTrail, NewAuditEntry, SYSTEM_ACTOR};
use crate::db::{Store, UnitOfWork};
use crate::deposit::{DepositRequest, DepositStatus};
use crate::monitoring::{Alert, AlertSink};
use crate::wallet::ledger::{self, entry_audit};
use crate::wallet::{EntryRequest, LedgerOutcome, LedgerSnapshot, TransactionType};

/// Result of an approval attempt
#[derive(Debug, Clone)]
pub enum ApprovalOutcome {
    /// Funds released
    Approved {
        deposit: DepositRequest,
        credit: LedgerOutcome,
        trigger: ApprovalTrigger,
    },
    /// The deposit had already left PENDING; nothing was written
    AlreadyProcessed(DepositStatus),
    /// The payment method does not release on this trigger
    NotEligible,
    /// The wallet is under review; the deposit stays PENDING
    HeldForReview,
    /// The wallet is frozen or inactive; the deposit stays PENDING
    WalletBlocked { code: &'static str },
    /// The wallet disagreed with its ledger and has been put under review
    IntegrityViolation(LedgerSnapshot),
}

impl ApprovalOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalOutcome::Approved { .. })
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            ApprovalOutcome::Approved { .. } => "approved",
            ApprovalOutcome::AlreadyProcessed(_) => "already_processed",
            ApprovalOutcome::NotEligible => "not_eligible",
            ApprovalOutcome::HeldForReview => "held_for_review",
            ApprovalOutcome::WalletBlocked { .. } => "wallet_blocked",
            ApprovalOutcome::IntegrityViolation(_) => "integrity_violation",
        }
    }
}

/// Deposit approver
#[derive(Clone)]
pub struct DepositApprover {
    store: Arc<dyn Store>,
    audit: AuditTrail,
    alerts: Arc<dyn AlertSink>,
    policy: ApprovalPolicy,
}

impl DepositApprover {
    pub fn new(store: Arc<dyn Store>, alerts: Arc<dyn AlertSink>, policy: ApprovalPolicy) -> Self {
        Self {
            audit: AuditTrail::new(store.clone()),
            store,
            alerts,
            policy,
        }
    }

    pub fn policy(&self) -> &ApprovalPolicy {
        &self.policy
    }

    /// Release a deposit confirmed by the gateway
    ///
    /// # Arguments
    ///
    /// * `deposit_id` - Deposit request to approve
    /// * `external_transaction_id` - Gateway transaction to link onto the deposit
    ///
    /// # Returns
    ///
    /// * `ApprovalResult<ApprovalOutcome>` - What happened; only `Approved` moved funds
    pub async fn auto_approve(
        &self,
        deposit_id: Uuid,
        external_transaction_id: Uuid,
    ) -> ApprovalResult<ApprovalOutcome> {
        let mut uow = self.store.begin().await?;
        let outcome = self
            .approve_within(
                uow.as_mut(),
                deposit_id,
                Some(external_transaction_id),
                SYSTEM_ACTOR,
                ApprovalTrigger::GatewayConfirmation,
            )
            .await?;
        uow.commit().await?;
        self.finish(&outcome).await;
        Ok(outcome)
    }

    /// Release a pending deposit on an operator's decision.
    ///
    /// Any method qualifies; wallet state and the ledger check still apply.
    pub async fn operator_approve(
        &self,
        deposit_id: Uuid,
        operator: &str,
    ) -> ApprovalResult<ApprovalOutcome> {
        let mut uow = self.store.begin().await?;
        let outcome = self
            .approve_within(
                uow.as_mut(),
                deposit_id,
                None,
                operator,
                ApprovalTrigger::Operator,
            )
            .await?;
        uow.commit().await?;
        self.finish(&outcome).await;
        Ok(outcome)
    }

    /// Approve inside a caller-owned unit of work.
    ///
    /// Nothing is visible until the caller commits. After committing, pass
    /// the outcome to [`DepositApprover::finish`] for audit and alerts.
    pub async fn approve_within(
        &self,
        uow: &mut dyn UnitOfWork,
        deposit_id: Uuid,
        external_transaction_id: Option<Uuid>,
        validated_by: &str,
        trigger: ApprovalTrigger,
    ) -> ApprovalResult<ApprovalOutcome> {
        let mut deposit = uow
            .lock_deposit(deposit_id)
            .await?
            .ok_or(ApprovalError::DepositNotFound(deposit_id))?;

        if !deposit.is_pending() {
            return Ok(ApprovalOutcome::AlreadyProcessed(deposit.status));
        }
        if !self.policy.allows(&deposit, trigger) {
            return Ok(ApprovalOutcome::NotEligible);
        }

        let mut wallet = ledger::lock_wallet(uow, deposit.user_id).await?;
        if let Err(e) = ledger::ensure_usable(&wallet) {
            return Ok(ApprovalOutcome::WalletBlocked { code: e.code() });
        }
        if wallet.review_hold {
            return Ok(ApprovalOutcome::HeldForReview);
        }

        let ledger_balance = uow.ledger_sum(wallet.user_id).await?;
        if ledger_balance != wallet.balance {
            wallet.review_hold = true;
            wallet.updated_at = Utc::now();
            uow.update_wallet(&wallet).await?;
            return Ok(ApprovalOutcome::IntegrityViolation(LedgerSnapshot {
                user_id: wallet.user_id,
                wallet_balance: wallet.balance,
                ledger_balance,
            }));
        }

        let transaction = ledger::post_to_locked(
            uow,
            &mut wallet,
            EntryRequest::credit(
                deposit.user_id,
                deposit.pearls_amount,
                TransactionType::PearlPurchase,
                format!("Pearl purchase {}", deposit.reference_code),
                Some(deposit.reference_code.clone()),
            ),
        )
        .await?;

        let now = Utc::now();
        deposit.status = DepositStatus::Approved;
        deposit.validated_by = Some(validated_by.to_string());
        deposit.validated_at = Some(now);
        if external_transaction_id.is_some() {
            deposit.external_transaction_id = external_transaction_id;
        }
        deposit.updated_at = now;
        uow.update_deposit(&deposit).await?;

        Ok(ApprovalOutcome::Approved {
            deposit,
            credit: LedgerOutcome {
                wallet,
                transaction,
            },
            trigger,
        })
    }

    /// Post-commit side effects: audit entries, logs and alerts
    pub async fn finish(&self, outcome: &ApprovalOutcome) {
        match outcome {
            ApprovalOutcome::Approved {
                deposit,
                credit,
                trigger,
            } => {
                log::info!(
                    "Deposit {} approved via {}: credited {} to user {}",
                    deposit.reference_code,
                    trigger,
                    credit.transaction.amount,
                    deposit.user_id
                );
                let actor = deposit.validated_by.as_deref().unwrap_or(SYSTEM_ACTOR);
                self.audit
                    .record([
                        NewAuditEntry::new(actor, AuditAction::DepositApproved)
                            .user(deposit.user_id)
                            .amount(deposit.pearls_amount)
                            .reference(deposit.reference_code.clone())
                            .details(serde_json::json!({
                                "deposit_id": deposit.id,
                                "external_transaction_id": deposit.external_transaction_id,
                                "trigger": trigger.to_string(),
                            })),
                        entry_audit(actor, &credit.transaction),
                    ])
                    .await;
            }
            ApprovalOutcome::IntegrityViolation(snapshot) => {
                log::error!(
                    "Auto-approval halted for user {}: wallet {} ledger {}",
                    snapshot.user_id,
                    snapshot.wallet_balance,
                    snapshot.ledger_balance
                );
                self.alerts.raise(&Alert::ledger_mismatch(snapshot));
                self.audit
                    .record([NewAuditEntry::new(SYSTEM_ACTOR, AuditAction::ReviewHoldPlaced)
                        .user(snapshot.user_id)
                        .details(serde_json::json!({
                            "reason": "ledger mismatch",
                            "wallet_balance": snapshot.wallet_balance,
                            "ledger_balance": snapshot.ledger_balance,
                        }))])
                    .await;
            }
            ApprovalOutcome::HeldForReview => {
                log::warn!("Deposit left pending: wallet under review");
            }
            ApprovalOutcome::WalletBlocked { code } => {
                log::warn!("Deposit left pending: wallet blocked ({})", code);
            }
            ApprovalOutcome::AlreadyProcessed(status) => {
                log::debug!("Approval skipped: deposit already {}", status);
            }
            ApprovalOutcome::NotEligible => {
                log::debug!("Approval skipped: method not eligible for trigger");
            }
        }
    }
}
