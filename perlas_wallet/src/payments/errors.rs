//! Payment service error types.

use thiserror::Error;
use uuid::Uuid;

use crate::approval::ApprovalError;
use crate::db::StoreError;
use crate::deposit::DepositError;

/// Payment errors
///
/// Gateway refusals are reported in the response, never here.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Deposit validation or lifecycle error
    #[error(transparent)]
    Deposit(#[from] DepositError),

    /// Approval failed
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    /// Card deposits go through the card payment endpoint
    #[error("Card deposits require a card source")]
    CardSourceRequired,

    /// Deposit disappeared between creation and charge
    #[error("Deposit request not found: {0}")]
    DepositNotFound(Uuid),

    /// Transaction not found for this user
    #[error("Transaction not found: {0}")]
    TransactionNotFound(Uuid),
}

impl PaymentError {
    pub fn code(&self) -> &'static str {
        match self {
            PaymentError::Store(_) => "INTERNAL_ERROR",
            PaymentError::Deposit(e) => e.code(),
            PaymentError::Approval(e) => e.code(),
            PaymentError::CardSourceRequired => "CARD_SOURCE_REQUIRED",
            PaymentError::DepositNotFound(_) => "DEPOSIT_NOT_FOUND",
            PaymentError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
        }
    }

    pub fn client_message(&self) -> String {
        match self {
            PaymentError::Store(_) => "Internal server error".to_string(),
            PaymentError::Deposit(e) => e.client_message(),
            PaymentError::Approval(e) => e.client_message(),
            PaymentError::CardSourceRequired => self.to_string(),
            PaymentError::DepositNotFound(_) => "Deposit request not found".to_string(),
            PaymentError::TransactionNotFound(_) => "Transaction not found".to_string(),
        }
    }
}

/// Result type for payment operations
pub type PaymentResult<T> = Result<T, PaymentError>;
