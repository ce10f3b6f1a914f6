//! Webhook error types.

use thiserror::Error;

use crate::approval::ApprovalError;
use crate::db::StoreError;

/// Webhook errors
///
/// Unknown charges, duplicates and stale events are outcomes, not errors.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Signature missing or wrong while verification is configured
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// Body is not a webhook event
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),

    /// Store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Approval failed; the status update was rolled back with it
    #[error(transparent)]
    Approval(#[from] ApprovalError),
}

impl WebhookError {
    pub fn code(&self) -> &'static str {
        match self {
            WebhookError::InvalidSignature => "INVALID_SIGNATURE",
            WebhookError::MalformedPayload(_) => "MALFORMED_PAYLOAD",
            WebhookError::Store(_) => "INTERNAL_ERROR",
            WebhookError::Approval(e) => e.code(),
        }
    }

    pub fn client_message(&self) -> String {
        match self {
            WebhookError::InvalidSignature => "Invalid signature".to_string(),
            WebhookError::MalformedPayload(_) => "Malformed payload".to_string(),
            WebhookError::Store(_) | WebhookError::Approval(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

/// Result type for webhook operations
pub type WebhookResult<T> = Result<T, WebhookError>;
