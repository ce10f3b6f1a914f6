//! JSON error responses.
//!
//! Every library error carries a stable machine code; the HTTP status is
//! derived from that code so the mapping lives in one place.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use perlas_wallet::approval::ApprovalError;
use perlas_wallet::deposit::DepositError;
use perlas_wallet::monitoring::MonitorError;
use perlas_wallet::payments::PaymentError;
use perlas_wallet::wallet::WalletError;
use perlas_wallet::webhook::WebhookError;
use perlas_wallet::withdrawal::WithdrawalError;
use serde::Serialize;

/// Body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

/// Error returned by handlers
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
}

impl ApiError {
    /// Error whose status follows from its code
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        Self {
            status: status_for(&code),
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("BAD_REQUEST", message)
    }
}

/// HTTP status for a machine error code
pub fn status_for(code: &str) -> StatusCode {
    match code {
        "INVALID_AMOUNT"
        | "UNKNOWN_PAYMENT_METHOD"
        | "CARD_SOURCE_REQUIRED"
        | "INVALID_DESTINATION"
        | "SAME_WALLET"
        | "MALFORMED_PAYLOAD"
        | "BAD_REQUEST" => StatusCode::BAD_REQUEST,
        "AMOUNT_OUT_OF_RANGE"
        | "DEPOSIT_LIMIT_EXCEEDED"
        | "INSUFFICIENT_FUNDS"
        | "INVALID_VALIDATION_CODE"
        | "BALANCE_OVERFLOW" => StatusCode::UNPROCESSABLE_ENTITY,
        "WALLET_FROZEN"
        | "WALLET_INACTIVE"
        | "WALLET_UNDER_REVIEW"
        | "LEDGER_MISMATCH"
        | "DEPOSIT_NOT_PENDING"
        | "WITHDRAWAL_NOT_PENDING"
        | "REFERENCE_USED"
        | "REFERENCE_EXPIRED"
        | "NOT_ELIGIBLE" => StatusCode::CONFLICT,
        "WALLET_NOT_FOUND"
        | "DEPOSIT_NOT_FOUND"
        | "TRANSACTION_NOT_FOUND"
        | "WITHDRAWAL_NOT_FOUND"
        | "REFERENCE_NOT_FOUND" => StatusCode::NOT_FOUND,
        "INVALID_SIGNATURE" | "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
        "FORBIDDEN" => StatusCode::FORBIDDEN,
        "GATEWAY_UNAVAILABLE" | "GATEWAY_ERROR" => StatusCode::BAD_GATEWAY,
        "GATEWAY_TIMEOUT" => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = %self.code, "Request failed: {}", self.message);
        }
        (
            self.status,
            Json(ErrorBody {
                code: self.code,
                message: self.message,
            }),
        )
            .into_response()
    }
}

macro_rules! from_library_error {
    ($($error:ty),* $(,)?) => {
        $(
            impl From<$error> for ApiError {
                fn from(err: $error) -> Self {
                    ApiError::new(err.code(), err.client_message())
                }
            }
        )*
    };
}

from_library_error!(
    WalletError,
    DepositError,
    PaymentError,
    ApprovalError,
    WebhookError,
    WithdrawalError,
    MonitorError,
);

/// Result type for handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_validation_errors_are_client_errors() {
        let err: ApiError = WalletError::InvalidAmount(Decimal::NEGATIVE_ONE).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = WalletError::InsufficientFunds {
            available: Decimal::ONE,
            required: Decimal::TEN,
        }
        .into();
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(err.code, "INSUFFICIENT_FUNDS");
    }

    #[test]
    fn test_state_conflicts_map_to_409() {
        let err: ApiError = WalletError::WalletFrozen(7).into();
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert!(!err.message.contains('7'));
    }

    #[test]
    fn test_signature_and_gateway_codes() {
        let err: ApiError = WebhookError::InvalidSignature.into();
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(status_for("GATEWAY_UNAVAILABLE"), StatusCode::BAD_GATEWAY);
        assert_eq!(status_for("GATEWAY_TIMEOUT"), StatusCode::GATEWAY_TIMEOUT);
    }

    #[test]
    fn test_unknown_codes_are_internal() {
        assert_eq!(status_for("INTERNAL_ERROR"), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(status_for("SOMETHING_NEW"), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
