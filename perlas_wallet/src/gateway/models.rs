//! Gateway charge models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deposit::{DepositRequest, PaymentMethod};
use crate::wallet::UserId;

/// Status of a charge as reported by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExternalStatus {
    Pending,
    ChargePending,
    Completed,
    Failed,
    Cancelled,
    Expired,
}

impl ExternalStatus {
    /// Whether the gateway considers the charge settled one way or the other
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExternalStatus::Pending | ExternalStatus::ChargePending)
    }

    /// Whether the charge ended without capturing funds
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            ExternalStatus::Failed | ExternalStatus::Cancelled | ExternalStatus::Expired
        )
    }

    /// Ordering used when reconciling out-of-order events.
    ///
    /// A failed, cancelled or expired charge can still be corrected by a
    /// later capture; a capture is final.
    pub fn rank(self) -> u8 {
        match self {
            ExternalStatus::Pending => 0,
            ExternalStatus::ChargePending => 1,
            ExternalStatus::Failed | ExternalStatus::Cancelled | ExternalStatus::Expired => 2,
            ExternalStatus::Completed => 3,
        }
    }

    /// Whether an event carrying `next` may overwrite this status
    pub fn can_transition_to(self, next: ExternalStatus) -> bool {
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for ExternalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExternalStatus::Pending => write!(f, "pending"),
            ExternalStatus::ChargePending => write!(f, "charge_pending"),
            ExternalStatus::Completed => write!(f, "completed"),
            ExternalStatus::Failed => write!(f, "failed"),
            ExternalStatus::Cancelled => write!(f, "cancelled"),
            ExternalStatus::Expired => write!(f, "expired"),
        }
    }
}

impl std::str::FromStr for ExternalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExternalStatus::Pending),
            "charge_pending" | "in_progress" => Ok(ExternalStatus::ChargePending),
            "completed" => Ok(ExternalStatus::Completed),
            "failed" => Ok(ExternalStatus::Failed),
            "cancelled" => Ok(ExternalStatus::Cancelled),
            "expired" => Ok(ExternalStatus::Expired),
            other => Err(other.to_string()),
        }
    }
}

/// Where and how a pending charge can be paid
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentInstructions {
    pub bank_name: Option<String>,
    pub clabe: Option<String>,
    pub reference: Option<String>,
}

impl PaymentInstructions {
    pub fn is_empty(&self) -> bool {
        self.bank_name.is_none() && self.clabe.is_none() && self.reference.is_none()
    }
}

/// Payment source for a charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum ChargeMethod {
    Card {
        source_id: String,
        device_session_id: Option<String>,
    },
    BankTransfer,
    Store,
}

impl ChargeMethod {
    /// Deposit method this charge fulfils
    pub fn payment_method(&self) -> PaymentMethod {
        match self {
            ChargeMethod::Card { .. } => PaymentMethod::Card,
            ChargeMethod::BankTransfer => PaymentMethod::BankTransfer,
            ChargeMethod::Store => PaymentMethod::Store,
        }
    }
}

/// Charge creation request sent to the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeRequest {
    pub method: ChargeMethod,
    pub amount: Decimal,
    pub currency: String,
    /// Platform-side customer identifier
    pub customer_ref: String,
    /// Deposit reference code; lets the gateway dashboard be matched to us
    pub order_ref: String,
    pub description: String,
}

/// Gateway response to a charge creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeResult {
    pub id: String,
    pub status: ExternalStatus,
    pub authorization: Option<String>,
    pub due_date: Option<DateTime<Utc>>,
    pub payment_instructions: Option<PaymentInstructions>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

/// The platform's record of one gateway charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalTransaction {
    pub id: Uuid,
    pub deposit_request_id: Uuid,
    pub user_id: UserId,
    /// Gateway charge id; unique, and the idempotency key for webhooks
    pub external_charge_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub external_status: ExternalStatus,
    pub authorization_code: Option<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub payment_instructions: PaymentInstructions,
    pub charged_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ExternalTransaction {
    /// Record a freshly created charge for a deposit
    pub fn from_charge(deposit: &DepositRequest, charge: &ChargeResult, currency: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            deposit_request_id: deposit.id,
            user_id: deposit.user_id,
            external_charge_id: charge.id.clone(),
            amount: deposit.amount,
            currency: currency.to_string(),
            payment_method: deposit.payment_method,
            external_status: charge.status,
            authorization_code: charge.authorization.clone(),
            error_code: charge.error_code.clone(),
            error_message: charge.error_message.clone(),
            payment_instructions: charge.payment_instructions.clone().unwrap_or_default(),
            charged_at: (charge.status == ExternalStatus::Completed).then_some(now),
            expires_at: charge.due_date,
            created_at: now,
            updated_at: now,
        }
    }

    /// Time from charge creation to capture, for completed charges
    pub fn processing_time(&self) -> Option<chrono::Duration> {
        match (self.external_status, self.charged_at) {
            (ExternalStatus::Completed, Some(charged_at)) => Some(charged_at - self.created_at),
            _ => None,
        }
    }
}
