//! Payment service: the synchronous API the platform calls.
//!
//! The gateway call happens outside any unit of work, so a failed or slow
//! charge never holds a lock and never touches a wallet.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use super::errors::{PaymentError, PaymentResult};
use crate::approval::{ApprovalOutcome, ApprovalTrigger, DepositApprover};
use crate::audit::SYSTEM_ACTOR;
use crate::db::{Page, PageRequest, Store};
use crate::deposit::{DepositManager, DepositRequest, DepositStatus, PaymentMethod};
use crate::gateway::{
    ChargeMethod, ChargeRequest, ChargeResult, ExternalStatus, ExternalTransaction,
    GatewayError, PaymentGateway, PaymentInstructions,
};
use crate::wallet::UserId;

/// Default bound on a single gateway call
pub const DEFAULT_GATEWAY_TIMEOUT: Duration = Duration::from_secs(15);

/// Result of a payment call. Gateway refusals are `success: false`, not errors.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PaymentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deposit_status: Option<DepositStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_charge_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<ExternalStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_instructions: Option<PaymentInstructions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl PaymentResponse {
    fn for_deposit(deposit: &DepositRequest) -> Self {
        Self {
            success: true,
            deposit_id: Some(deposit.id),
            reference_code: Some(deposit.reference_code.clone()),
            deposit_status: Some(deposit.status),
            ..Self::default()
        }
    }

    fn declined(deposit: &DepositRequest, err: &GatewayError) -> Self {
        Self {
            success: false,
            error_code: Some(err.relay_code()),
            error_message: Some(err.client_message()),
            ..Self::for_deposit(deposit)
        }
    }
}

/// Payment service
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn Store>,
    deposits: DepositManager,
    approver: DepositApprover,
    gateway: Arc<dyn PaymentGateway>,
    gateway_timeout: Duration,
}

impl PaymentService {
    /// Create a new payment service
    ///
    /// # Arguments
    ///
    /// * `store` - Store holding deposits and gateway transactions
    /// * `deposits` - Deposit manager that validates and records requests
    /// * `approver` - Approver for charges that complete synchronously
    /// * `gateway` - Gateway adapter
    pub fn new(
        store: Arc<dyn Store>,
        deposits: DepositManager,
        approver: DepositApprover,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        Self {
            store,
            deposits,
            approver,
            gateway,
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }

    pub fn with_gateway_timeout(mut self, timeout: Duration) -> Self {
        self.gateway_timeout = timeout;
        self
    }

    pub fn deposits(&self) -> &DepositManager {
        &self.deposits
    }

    /// Create a deposit through a method that needs no card source.
    ///
    /// Manual deposits return the reference and validation codes; bank
    /// transfer and store deposits issue their gateway charge.
    pub async fn create_deposit(
        &self,
        user_id: UserId,
        amount: Decimal,
        method: PaymentMethod,
    ) -> PaymentResult<PaymentResponse> {
        match method {
            PaymentMethod::Card => Err(PaymentError::CardSourceRequired),
            PaymentMethod::BankTransfer => self.create_bank_transfer(user_id, amount).await,
            PaymentMethod::Store => self.create_store_payment(user_id, amount).await,
            PaymentMethod::ManualDeposit => {
                let receipt = self.deposits.create_deposit(user_id, amount, method).await?;
                Ok(PaymentResponse {
                    validation_code: receipt.validation_code,
                    ..PaymentResponse::for_deposit(&receipt.deposit)
                })
            }
        }
    }

    /// Charge a tokenised card
    ///
    /// # Arguments
    ///
    /// * `source_id` - Card token from the gateway's client library
    /// * `device_session_id` - Anti-fraud device fingerprint, if collected
    pub async fn create_card_payment(
        &self,
        user_id: UserId,
        amount: Decimal,
        source_id: String,
        device_session_id: Option<String>,
    ) -> PaymentResult<PaymentResponse> {
        let receipt = self
            .deposits
            .create_deposit(user_id, amount, PaymentMethod::Card)
            .await?;
        self.charge(
            receipt.deposit,
            ChargeMethod::Card {
                source_id,
                device_session_id,
            },
        )
        .await
    }

    /// Issue a CLABE for an interbank transfer
    pub async fn create_bank_transfer(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> PaymentResult<PaymentResponse> {
        let receipt = self
            .deposits
            .create_deposit(user_id, amount, PaymentMethod::BankTransfer)
            .await?;
        self.charge(receipt.deposit, ChargeMethod::BankTransfer).await
    }

    /// Issue a convenience store payment reference
    pub async fn create_store_payment(
        &self,
        user_id: UserId,
        amount: Decimal,
    ) -> PaymentResult<PaymentResponse> {
        let receipt = self
            .deposits
            .create_deposit(user_id, amount, PaymentMethod::Store)
            .await?;
        self.charge(receipt.deposit, ChargeMethod::Store).await
    }

    async fn charge(
        &self,
        deposit: DepositRequest,
        method: ChargeMethod,
    ) -> PaymentResult<PaymentResponse> {
        let currency = self.deposits.config().currency.clone();
        let request = ChargeRequest {
            method,
            amount: deposit.amount,
            currency: currency.clone(),
            customer_ref: format!("user-{}", deposit.user_id),
            order_ref: deposit.reference_code.clone(),
            description: format!("Perlas {}", deposit.reference_code),
        };

        let charge = match self.call_gateway(&request).await {
            Ok(charge) => charge,
            Err(e) => {
                log::warn!(
                    "Charge for deposit {} failed: {}",
                    deposit.reference_code,
                    e
                );
                return Ok(PaymentResponse::declined(&deposit, &e));
            }
        };

        let external = ExternalTransaction::from_charge(&deposit, &charge, &currency);
        let (deposit, approval) = self.record_charge(deposit, &external, &charge).await?;
        if let Some(outcome) = &approval {
            self.approver.finish(outcome).await;
        }

        log::info!(
            "Charge {} for deposit {}: {}",
            charge.id,
            deposit.reference_code,
            charge.status
        );
        let failed = charge.status.is_failure();
        Ok(PaymentResponse {
            success: !failed,
            deposit_status: Some(deposit.status),
            transaction_id: Some(external.id),
            external_charge_id: Some(charge.id),
            status: Some(charge.status),
            payment_instructions: charge.payment_instructions,
            due_date: charge.due_date,
            error_code: charge.error_code,
            error_message: charge.error_message,
            ..PaymentResponse::for_deposit(&deposit)
        })
    }

    async fn call_gateway(&self, request: &ChargeRequest) -> Result<ChargeResult, GatewayError> {
        match tokio::time::timeout(self.gateway_timeout, self.gateway.create_charge(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(self.gateway_timeout)),
        }
    }

    /// Store the charge, link it to the deposit and, when the gateway
    /// already captured it, release funds in the same unit of work
    async fn record_charge(
        &self,
        deposit: DepositRequest,
        external: &ExternalTransaction,
        charge: &ChargeResult,
    ) -> PaymentResult<(DepositRequest, Option<ApprovalOutcome>)> {
        let mut uow = self.store.begin().await?;
        uow.insert_external(external).await?;

        let mut linked = uow
            .lock_deposit(deposit.id)
            .await?
            .ok_or(PaymentError::DepositNotFound(deposit.id))?;
        linked.external_transaction_id = Some(external.id);
        linked.updated_at = Utc::now();
        uow.update_deposit(&linked).await?;

        let approval = if charge.status == ExternalStatus::Completed {
            Some(
                self.approver
                    .approve_within(
                        uow.as_mut(),
                        deposit.id,
                        Some(external.id),
                        SYSTEM_ACTOR,
                        ApprovalTrigger::ChargeResponse,
                    )
                    .await?,
            )
        } else {
            None
        };
        uow.commit().await?;

        let deposit = match &approval {
            Some(ApprovalOutcome::Approved { deposit, .. }) => deposit.clone(),
            _ => linked,
        };
        Ok((deposit, approval))
    }

    /// Get one of a user's gateway transactions.
    ///
    /// Another user's transaction reads as not found.
    pub async fn get_transaction(
        &self,
        id: Uuid,
        user_id: UserId,
    ) -> PaymentResult<ExternalTransaction> {
        self.store
            .external_transaction(id)
            .await?
            .filter(|t| t.user_id == user_id)
            .ok_or(PaymentError::TransactionNotFound(id))
    }

    /// A user's gateway transactions, newest first
    pub async fn get_transaction_history(
        &self,
        user_id: UserId,
        page: PageRequest,
    ) -> PaymentResult<Page<ExternalTransaction>> {
        Ok(self
            .store
            .external_transactions_for_user(user_id, page)
            .await?)
    }
}
