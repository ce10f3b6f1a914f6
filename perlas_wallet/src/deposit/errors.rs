//! Deposit error types.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::models::DepositStatus;
use crate::approval::ApprovalError;
use crate::db::StoreError;
use crate::wallet::WalletError;

/// Deposit errors
#[derive(Debug, Error)]
pub enum DepositError {
    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Wallet missing or unusable
    #[error(transparent)]
    Wallet(#[from] WalletError),

    /// Approval failed
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    /// Amount outside the method's bounds
    #[error("Amount {amount} outside allowed range {min}..={max}")]
    AmountOutOfRange {
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },

    /// Method not supported or disabled
    #[error("Unknown payment method: {0}")]
    UnknownPaymentMethod(String),

    /// Daily or monthly purchase limit reached
    #[error("{period} deposit limit exceeded: limit {limit}, would reach {attempted}")]
    DepositLimitExceeded {
        period: &'static str,
        limit: Decimal,
        attempted: Decimal,
    },

    /// Deposit not found
    #[error("Deposit request not found: {0}")]
    DepositNotFound(Uuid),

    /// Deposit already decided
    #[error("Deposit request is {0}")]
    NotPending(DepositStatus),

    /// Payment reference not found
    #[error("Payment reference not found: {0}")]
    ReferenceNotFound(String),

    /// Payment reference consumed before
    #[error("Payment reference already used")]
    ReferenceUsed,

    /// Payment reference past its expiry
    #[error("Payment reference expired")]
    ReferenceExpired,

    /// Validation code did not match
    #[error("Invalid validation code")]
    InvalidValidationCode,

    /// Every generated reference code collided
    #[error("Could not allocate a unique reference code")]
    ReferenceExhausted,
}

impl DepositError {
    pub fn code(&self) -> &'static str {
        match self {
            DepositError::Store(_) => "INTERNAL_ERROR",
            DepositError::Wallet(e) => e.code(),
            DepositError::Approval(e) => e.code(),
            DepositError::AmountOutOfRange { .. } => "AMOUNT_OUT_OF_RANGE",
            DepositError::UnknownPaymentMethod(_) => "UNKNOWN_PAYMENT_METHOD",
            DepositError::DepositLimitExceeded { .. } => "DEPOSIT_LIMIT_EXCEEDED",
            DepositError::DepositNotFound(_) => "DEPOSIT_NOT_FOUND",
            DepositError::NotPending(_) => "DEPOSIT_NOT_PENDING",
            DepositError::ReferenceNotFound(_) => "REFERENCE_NOT_FOUND",
            DepositError::ReferenceUsed => "REFERENCE_USED",
            DepositError::ReferenceExpired => "REFERENCE_EXPIRED",
            DepositError::InvalidValidationCode => "INVALID_VALIDATION_CODE",
            DepositError::ReferenceExhausted => "INTERNAL_ERROR",
        }
    }

    pub fn client_message(&self) -> String {
        match self {
            DepositError::Store(_) | DepositError::ReferenceExhausted => {
                "Internal server error".to_string()
            }
            DepositError::Wallet(e) => e.client_message(),
            DepositError::Approval(e) => e.client_message(),
            DepositError::DepositNotFound(_) => "Deposit request not found".to_string(),
            DepositError::ReferenceNotFound(_) => "Payment reference not found".to_string(),
            other => other.to_string(),
        }
    }
}

/// Result type for deposit operations
pub type DepositResult<T> = Result<T, DepositError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_hides_ids() {
        let err = DepositError::DepositNotFound(Uuid::nil());
        assert_eq!(err.client_message(), "Deposit request not found");
        assert_eq!(err.code(), "DEPOSIT_NOT_FOUND");
    }

    #[test]
    fn test_range_message() {
        let err = DepositError::AmountOutOfRange {
            amount: Decimal::new(500, 2),
            min: Decimal::new(1000, 2),
            max: Decimal::new(500000, 2),
        };
        assert_eq!(err.code(), "AMOUNT_OUT_OF_RANGE");
        assert!(err.client_message().contains("5.00"));
    }

    #[test]
    fn test_wallet_codes_pass_through() {
        let err: DepositError = WalletError::WalletFrozen(3).into();
        assert_eq!(err.code(), "WALLET_FROZEN");
    }
}
