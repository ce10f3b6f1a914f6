//! Withdrawal error types.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::models::WithdrawalStatus;
use crate::db::StoreError;
use crate::wallet::WalletError;

/// Withdrawal errors
#[derive(Debug, Error)]
pub enum WithdrawalError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Ledger rejected the debit or refund
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// Amount outside the configured bounds
    #[error("Amount {amount} outside allowed range {min}..={max}")]
    AmountOutOfRange {
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },

    /// Destination account is not a valid CLABE
    #[error("Invalid destination account")]
    InvalidDestination,

    /// Withdrawal not found
    #[error("Withdrawal request not found: {0}")]
    WithdrawalNotFound(Uuid),

    /// Withdrawal already processed
    #[error("Withdrawal request is {0}")]
    NotPending(WithdrawalStatus),

    /// Every generated reference code collided
    #[error("Could not allocate a unique reference code")]
    ReferenceExhausted,
}

impl WithdrawalError {
    pub fn code(&self) -> &'static str {
        match self {
            WithdrawalError::Store(_) | WithdrawalError::ReferenceExhausted => "INTERNAL_ERROR",
            WithdrawalError::Wallet(e) => e.code(),
            WithdrawalError::AmountOutOfRange { .. } => "AMOUNT_OUT_OF_RANGE",
            WithdrawalError::InvalidDestination => "INVALID_DESTINATION",
            WithdrawalError::WithdrawalNotFound(_) => "WITHDRAWAL_NOT_FOUND",
            WithdrawalError::NotPending(_) => "WITHDRAWAL_NOT_PENDING",
        }
    }

    pub fn client_message(&self) -> String {
        match self {
            WithdrawalError::Store(_) | WithdrawalError::ReferenceExhausted => {
                "Internal server error".to_string()
            }
            WithdrawalError::Wallet(e) => e.client_message(),
            WithdrawalError::WithdrawalNotFound(_) => "Withdrawal request not found".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type for withdrawal operations
pub type WithdrawalResult<T> = Result<T, WithdrawalError>;
