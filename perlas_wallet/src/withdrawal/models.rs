//! Withdrawal data models.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::wallet::UserId;

/// Withdrawal request status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    Pending,
    Completed,
    Rejected,
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WithdrawalStatus::Pending => write!(f, "PENDING"),
            WithdrawalStatus::Completed => write!(f, "COMPLETED"),
            WithdrawalStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

impl std::str::FromStr for WithdrawalStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(WithdrawalStatus::Pending),
            "COMPLETED" => Ok(WithdrawalStatus::Completed),
            "REJECTED" => Ok(WithdrawalStatus::Rejected),
            other => Err(other.to_string()),
        }
    }
}

/// Destination bank account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BankDestination {
    pub bank_name: String,
    pub account_holder: String,
    /// 18-digit interbank account number
    pub clabe: String,
}

impl BankDestination {
    /// CLABE accounts are exactly 18 ASCII digits
    pub fn has_valid_clabe(&self) -> bool {
        self.clabe.len() == 18 && self.clabe.bytes().all(|b| b.is_ascii_digit())
    }
}

/// Outbound counterpart of a deposit request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    pub id: Uuid,
    pub user_id: UserId,
    /// Gross amount taken from the wallet
    pub amount: Decimal,
    pub commission: Decimal,
    /// Amount paid out to the bank account
    pub net_amount: Decimal,
    pub reference_code: String,
    pub destination: BankDestination,
    pub status: WithdrawalStatus,
    pub processed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clabe_validation() {
        let mut destination = BankDestination {
            bank_name: "BBVA".to_string(),
            account_holder: "Ana Pérez".to_string(),
            clabe: "012180015555555555".to_string(),
        };
        assert!(destination.has_valid_clabe());

        destination.clabe = "01218001555555555X".to_string();
        assert!(!destination.has_valid_clabe());

        destination.clabe = "0121800155".to_string();
        assert!(!destination.has_valid_clabe());
    }
}
