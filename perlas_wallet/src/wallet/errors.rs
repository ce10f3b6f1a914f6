//! Wallet error types.

use rust_decimal::Decimal;
use thiserror::Error;

use super::models::UserId;
use crate::db::StoreError;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Wallet not found
    #[error("Wallet not found for user {0}")]
    WalletNotFound(UserId),

    /// Wallet is frozen
    #[error("Wallet for user {0} is frozen")]
    WalletFrozen(UserId),

    /// Wallet has been deactivated
    #[error("Wallet for user {0} is inactive")]
    WalletInactive(UserId),

    /// Amount is not a positive value with at most two decimals
    #[error("Invalid amount: {0}")]
    InvalidAmount(Decimal),

    /// Insufficient funds
    #[error("Insufficient funds: available {available}, required {required}")]
    InsufficientFunds { available: Decimal, required: Decimal },

    /// Balance would exceed what the ledger can store
    #[error("Balance overflow for user {0}")]
    BalanceOverflow(UserId),

    /// Transfer sender and recipient are the same wallet
    #[error("Cannot transfer to the same wallet")]
    SameWallet,
}

impl WalletError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::Store(_) => "INTERNAL_ERROR",
            WalletError::WalletNotFound(_) => "WALLET_NOT_FOUND",
            WalletError::WalletFrozen(_) => "WALLET_FROZEN",
            WalletError::WalletInactive(_) => "WALLET_INACTIVE",
            WalletError::InvalidAmount(_) => "INVALID_AMOUNT",
            WalletError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            WalletError::BalanceOverflow(_) => "BALANCE_OVERFLOW",
            WalletError::SameWallet => "SAME_WALLET",
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Store errors are sanitized and user IDs are redacted.
    pub fn client_message(&self) -> String {
        match self {
            WalletError::Store(_) => "Internal server error".to_string(),
            WalletError::WalletNotFound(_) => "Wallet not found".to_string(),
            WalletError::WalletFrozen(_) => "Wallet is frozen".to_string(),
            WalletError::WalletInactive(_) => "Wallet is inactive".to_string(),
            WalletError::BalanceOverflow(_) => "Balance limit exceeded".to_string(),
            _ => self.to_string(),
        }
    }
}

/// Result type for wallet operations
pub type WalletResult<T> = Result<T, WalletError>;
