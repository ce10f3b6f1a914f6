//! Approval error types.

use thiserror::Error;
use uuid::Uuid;

use crate::db::StoreError;
use crate::wallet::WalletError;

/// Approval errors
///
/// Business refusals (already processed, not eligible, held) are outcomes,
/// not errors; these are the failures that abort the unit of work.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Ledger rejected the credit
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// Deposit not found
    #[error("Deposit request not found: {0}")]
    DepositNotFound(Uuid),
}

impl ApprovalError {
    pub fn code(&self) -> &'static str {
        match self {
            ApprovalError::Store(_) => "INTERNAL_ERROR",
            ApprovalError::Wallet(e) => e.code(),
            ApprovalError::DepositNotFound(_) => "DEPOSIT_NOT_FOUND",
        }
    }

    pub fn client_message(&self) -> String {
        match self {
            ApprovalError::Store(_) => "Internal server error".to_string(),
            ApprovalError::Wallet(e) => e.client_message(),
            ApprovalError::DepositNotFound(_) => "Deposit request not found".to_string(),
        }
    }
}

/// Result type for approval operations
pub type ApprovalResult<T> = Result<T, ApprovalError>;
