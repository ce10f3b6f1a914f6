//! Gateway error types.

use thiserror::Error;

/// Gateway errors
#[derive(Debug, Clone, Error, PartialEq)]
pub enum GatewayError {
    /// The gateway refused the charge
    #[error("Charge declined ({code}): {message}")]
    Declined { code: String, message: String },

    /// The gateway could not be reached or returned a server error
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    /// The call did not finish in time
    #[error("Gateway call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The response could not be understood
    #[error("Invalid gateway response: {0}")]
    InvalidResponse(String),
}

impl GatewayError {
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Declined { .. } => "PAYMENT_DECLINED",
            GatewayError::Unavailable(_) => "GATEWAY_UNAVAILABLE",
            GatewayError::Timeout(_) => "GATEWAY_TIMEOUT",
            GatewayError::InvalidResponse(_) => "GATEWAY_ERROR",
        }
    }

    /// Error code to relay to the payer: the gateway's own when it gave one
    pub fn relay_code(&self) -> String {
        match self {
            GatewayError::Declined { code, .. } => code.clone(),
            other => other.code().to_string(),
        }
    }

    /// Message to relay to the payer
    pub fn client_message(&self) -> String {
        match self {
            GatewayError::Declined { message, .. } => message.clone(),
            GatewayError::Unavailable(_) | GatewayError::InvalidResponse(_) => {
                "Payment provider unavailable, please retry".to_string()
            }
            GatewayError::Timeout(_) => "Payment provider timed out, please retry".to_string(),
        }
    }
}

/// Result type for gateway calls
pub type GatewayResult<T> = Result<T, GatewayError>;
