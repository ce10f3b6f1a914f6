//! Wallet and ledger data models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User ID type
pub type UserId = i64;

/// Wallet model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Wallet {
    pub user_id: UserId,
    pub balance: Decimal,
    pub daily_limit: Decimal,
    pub monthly_limit: Decimal,
    pub is_active: bool,
    pub is_frozen: bool,
    /// Set when a ledger integrity check fails; blocks automatic releases
    pub review_hold: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create an empty, active wallet
    pub fn new(user_id: UserId, daily_limit: Decimal, monthly_limit: Decimal) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            balance: Decimal::ZERO,
            daily_limit,
            monthly_limit,
            is_active: true,
            is_frozen: false,
            review_hold: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Entry direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryDirection {
    Debit,
    Credit,
}

impl EntryDirection {
    /// Apply the direction's sign to an unsigned amount
    pub fn signed(self, amount: Decimal) -> Decimal {
        match self {
            EntryDirection::Credit => amount,
            EntryDirection::Debit => -amount,
        }
    }
}

impl std::fmt::Display for EntryDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryDirection::Debit => write!(f, "debit"),
            EntryDirection::Credit => write!(f, "credit"),
        }
    }
}

impl std::str::FromStr for EntryDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debit" => Ok(EntryDirection::Debit),
            "credit" => Ok(EntryDirection::Credit),
            other => Err(other.to_string()),
        }
    }
}

/// Ledger transaction type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    PearlPurchase,
    GamePurchase,
    GameWin,
    Withdrawal,
    PearlTransfer,
    Commission,
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionType::PearlPurchase => write!(f, "PEARL_PURCHASE"),
            TransactionType::GamePurchase => write!(f, "GAME_PURCHASE"),
            TransactionType::GameWin => write!(f, "GAME_WIN"),
            TransactionType::Withdrawal => write!(f, "WITHDRAWAL"),
            TransactionType::PearlTransfer => write!(f, "PEARL_TRANSFER"),
            TransactionType::Commission => write!(f, "COMMISSION"),
        }
    }
}

impl std::str::FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PEARL_PURCHASE" => Ok(TransactionType::PearlPurchase),
            "GAME_PURCHASE" => Ok(TransactionType::GamePurchase),
            "GAME_WIN" => Ok(TransactionType::GameWin),
            "WITHDRAWAL" => Ok(TransactionType::Withdrawal),
            "PEARL_TRANSFER" => Ok(TransactionType::PearlTransfer),
            "COMMISSION" => Ok(TransactionType::Commission),
            other => Err(other.to_string()),
        }
    }
}

/// Ledger transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Pending => write!(f, "PENDING"),
            TransactionStatus::Completed => write!(f, "COMPLETED"),
            TransactionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TransactionStatus::Pending),
            "COMPLETED" => Ok(TransactionStatus::Completed),
            "FAILED" => Ok(TransactionStatus::Failed),
            other => Err(other.to_string()),
        }
    }
}

/// Ledger transaction (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: Uuid,
    pub user_id: UserId,
    pub transaction_type: TransactionType,
    pub direction: EntryDirection,
    pub amount: Decimal,
    pub balance_after: Decimal,
    pub status: TransactionStatus,
    pub description: String,
    pub reference_id: Option<String>,
    pub from_user_id: Option<UserId>,
    pub to_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl LedgerTransaction {
    /// Amount signed by direction; zero unless the entry is completed
    pub fn signed_amount(&self) -> Decimal {
        if self.status == TransactionStatus::Completed {
            self.direction.signed(self.amount)
        } else {
            Decimal::ZERO
        }
    }
}

/// A balance change requested from the ledger
#[derive(Debug, Clone)]
pub struct EntryRequest {
    pub user_id: UserId,
    pub amount: Decimal,
    pub direction: EntryDirection,
    pub transaction_type: TransactionType,
    pub description: String,
    pub reference_id: Option<String>,
    pub from_user_id: Option<UserId>,
    pub to_user_id: Option<UserId>,
}

impl EntryRequest {
    /// Credit entry with no counterparty
    pub fn credit(
        user_id: UserId,
        amount: Decimal,
        transaction_type: TransactionType,
        description: impl Into<String>,
        reference_id: Option<String>,
    ) -> Self {
        Self {
            user_id,
            amount,
            direction: EntryDirection::Credit,
            transaction_type,
            description: description.into(),
            reference_id,
            from_user_id: None,
            to_user_id: None,
        }
    }

    /// Debit entry with no counterparty
    pub fn debit(
        user_id: UserId,
        amount: Decimal,
        transaction_type: TransactionType,
        description: impl Into<String>,
        reference_id: Option<String>,
    ) -> Self {
        Self {
            direction: EntryDirection::Debit,
            ..Self::credit(user_id, amount, transaction_type, description, reference_id)
        }
    }

    /// Attach the transfer counterparties
    pub fn between(mut self, from_user_id: UserId, to_user_id: UserId) -> Self {
        self.from_user_id = Some(from_user_id);
        self.to_user_id = Some(to_user_id);
        self
    }
}

/// Result of a single credit or debit
#[derive(Debug, Clone, Serialize)]
pub struct LedgerOutcome {
    pub wallet: Wallet,
    pub transaction: LedgerTransaction,
}

/// Result of a P2P transfer
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub sender: Wallet,
    pub recipient: Wallet,
    pub debit: LedgerTransaction,
    pub credit: LedgerTransaction,
    pub commission: Option<LedgerTransaction>,
}

/// Consistent view of a wallet and its ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerSnapshot {
    pub user_id: UserId,
    pub wallet_balance: Decimal,
    pub ledger_balance: Decimal,
}

impl LedgerSnapshot {
    /// Whether the wallet agrees with its ledger
    pub fn is_consistent(&self) -> bool {
        self.wallet_balance == self.ledger_balance
    }
}
