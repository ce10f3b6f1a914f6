//! Gateway webhook endpoint.
//!
//! The body is read as raw bytes because the signature covers them exactly.
//! Every authenticated, well-formed delivery is acknowledged with `200`,
//! including duplicates, stale events and unknown charges, so the gateway
//! stops retrying. Store failures answer `500` and the gateway redelivers.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use perlas_wallet::webhook::{WebhookError, WebhookOutcome};
use serde::Serialize;

use super::AppState;
use super::errors::{ApiError, ApiResult};
use crate::{logging, metrics};

/// Header carrying the hex HMAC-SHA256 of the body
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval: Option<&'static str>,
}

impl From<&WebhookOutcome> for WebhookAck {
    fn from(outcome: &WebhookOutcome) -> Self {
        let approval = match outcome {
            WebhookOutcome::Updated {
                approval: Some(approval),
                ..
            } => Some(approval.label()),
            _ => None,
        };
        Self {
            received: true,
            outcome: outcome.label(),
            approval,
        }
    }
}

/// Receive a gateway notification.
///
/// # Errors
///
/// - `400 Bad Request`: Body is not a webhook event
/// - `401 Unauthorized`: Signature missing or wrong while verification is on
/// - `500 Internal Server Error`: Store failure; safe to redeliver
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookAck>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.engine.webhooks.handle_webhook(&body, signature).await {
        Ok(outcome) => {
            metrics::webhook_outcomes_total(outcome.label());
            if outcome.credited() {
                metrics::deposits_approved_total("gateway_confirmation");
            }
            Ok(Json(WebhookAck::from(&outcome)))
        }
        Err(err) => {
            metrics::webhook_outcomes_total(err.code());
            if matches!(err, WebhookError::InvalidSignature) {
                logging::log_security_event(
                    "invalid_webhook_signature",
                    None,
                    Some("gateway"),
                    if signature.is_some() {
                        "Webhook signature did not match"
                    } else {
                        "Webhook delivered without a signature"
                    },
                );
            }
            Err(ApiError::from(err))
        }
    }
}
