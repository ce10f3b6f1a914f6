//! Deposit data models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::wallet::UserId;

/// Deposit payment method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    /// Card charge through the gateway
    Card,
    /// Gateway-issued CLABE for an interbank transfer
    BankTransfer,
    /// Cash paid at a convenience store against a gateway reference
    Store,
    /// Bank deposit checked by an operator against a payment reference
    ManualDeposit,
}

impl PaymentMethod {
    /// All supported methods
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Card,
        PaymentMethod::BankTransfer,
        PaymentMethod::Store,
        PaymentMethod::ManualDeposit,
    ];

    /// How deposits through this method are fulfilled
    pub fn integration(self) -> IntegrationMethod {
        match self {
            PaymentMethod::ManualDeposit => IntegrationMethod::Manual,
            _ => IntegrationMethod::Gateway,
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaymentMethod::Card => write!(f, "CARD"),
            PaymentMethod::BankTransfer => write!(f, "BANK_TRANSFER"),
            PaymentMethod::Store => write!(f, "STORE"),
            PaymentMethod::ManualDeposit => write!(f, "MANUAL_DEPOSIT"),
        }
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CARD" => Ok(PaymentMethod::Card),
            "BANK_TRANSFER" => Ok(PaymentMethod::BankTransfer),
            "STORE" => Ok(PaymentMethod::Store),
            "MANUAL_DEPOSIT" => Ok(PaymentMethod::ManualDeposit),
            _ => Err(s.to_string()),
        }
    }
}

/// Fulfilment channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationMethod {
    Gateway,
    Manual,
}

impl std::fmt::Display for IntegrationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntegrationMethod::Gateway => write!(f, "gateway"),
            IntegrationMethod::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for IntegrationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gateway" => Ok(IntegrationMethod::Gateway),
            "manual" => Ok(IntegrationMethod::Manual),
            other => Err(other.to_string()),
        }
    }
}

/// Deposit request status
///
/// `Pending` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DepositStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

impl std::fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DepositStatus::Pending => write!(f, "PENDING"),
            DepositStatus::Approved => write!(f, "APPROVED"),
            DepositStatus::Rejected => write!(f, "REJECTED"),
            DepositStatus::Expired => write!(f, "EXPIRED"),
        }
    }
}

impl std::str::FromStr for DepositStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(DepositStatus::Pending),
            "APPROVED" => Ok(DepositStatus::Approved),
            "REJECTED" => Ok(DepositStatus::Rejected),
            "EXPIRED" => Ok(DepositStatus::Expired),
            other => Err(other.to_string()),
        }
    }
}

/// A user's declared intent to add funds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepositRequest {
    pub id: Uuid,
    pub user_id: UserId,
    pub amount: Decimal,
    /// Always equal to `amount`; one pearl per currency unit
    pub pearls_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub reference_code: String,
    pub integration_method: IntegrationMethod,
    pub auto_approval_eligible: bool,
    pub status: DepositStatus,
    pub external_transaction_id: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub validated_by: Option<String>,
    pub validated_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DepositRequest {
    /// Whether the request is still waiting for a decision
    pub fn is_pending(&self) -> bool {
        self.status == DepositStatus::Pending
    }

    /// Whether the request has outlived its expiry time
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.is_pending() && self.expires_at < now
    }
}

/// What a payment reference was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Deposit,
    Withdrawal,
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReferenceKind::Deposit => write!(f, "deposit"),
            ReferenceKind::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

impl std::str::FromStr for ReferenceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(ReferenceKind::Deposit),
            "withdrawal" => Ok(ReferenceKind::Withdrawal),
            other => Err(other.to_string()),
        }
    }
}

/// Single-use, time-boxed token binding a code to a user and amount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentReference {
    pub id: Uuid,
    pub code: String,
    #[serde(skip_serializing)]
    pub validation_code: String,
    pub user_id: UserId,
    pub amount: Decimal,
    pub kind: ReferenceKind,
    pub is_used: bool,
    pub used_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
