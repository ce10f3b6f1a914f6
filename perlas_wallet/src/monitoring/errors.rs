//! Monitoring error types.

use thiserror::Error;

use crate::db::StoreError;
use crate::wallet::UserId;

/// Monitoring errors
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Wallet not found
    #[error("Wallet not found for user {0}")]
    WalletNotFound(UserId),
}

impl MonitorError {
    pub fn code(&self) -> &'static str {
        match self {
            MonitorError::Store(_) => "INTERNAL_ERROR",
            MonitorError::WalletNotFound(_) => "WALLET_NOT_FOUND",
        }
    }

    pub fn client_message(&self) -> String {
        match self {
            MonitorError::Store(_) => "Internal server error".to_string(),
            MonitorError::WalletNotFound(_) => "Wallet not found".to_string(),
        }
    }
}

/// Result type for monitoring operations
pub type MonitorResult<T> = Result<T, MonitorError>;
