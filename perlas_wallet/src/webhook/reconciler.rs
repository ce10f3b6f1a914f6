//! Maps gateway events onto external transactions.
//!
//! Delivery is at-least-once and unordered. The external row is locked for
//! the whole event, and a status is applied only when it ranks strictly
//! above the stored one, so replays and late events fall through as no-ops.

use chrono::Utc;
use std::sync::Arc;

use super::{
    errors::{WebhookError, WebhookResult},
    models::WebhookEvent,
    signature::SignatureVerifier,
};
use crate::approval::{ApprovalOutcome, ApprovalTrigger, DepositApprover};
use crate::audit::SYSTEM_ACTOR;
use crate::db::Store;
use crate::gateway::ExternalStatus;

/// Why an event changed nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The event carries no status we understand
    Unmapped,
    /// The charge is already in the reported status
    Duplicate,
    /// The reported status ranks below the stored one
    Stale,
}

impl std::fmt::Display for IgnoreReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IgnoreReason::Unmapped => write!(f, "unmapped"),
            IgnoreReason::Duplicate => write!(f, "duplicate"),
            IgnoreReason::Stale => write!(f, "stale"),
        }
    }
}

/// What handling an event did
#[derive(Debug, Clone)]
pub enum WebhookOutcome {
    /// Endpoint verification ping
    Verification { code: Option<String> },
    /// No external transaction has this charge id
    UnknownCharge { charge_id: String },
    Ignored {
        charge_id: Option<String>,
        reason: IgnoreReason,
    },
    /// Status applied; `approval` is set for completions
    Updated {
        charge_id: String,
        status: ExternalStatus,
        approval: Option<ApprovalOutcome>,
    },
}

impl WebhookOutcome {
    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Verification { .. } => "verification",
            WebhookOutcome::UnknownCharge { .. } => "unknown_charge",
            WebhookOutcome::Ignored {
                reason: IgnoreReason::Unmapped,
                ..
            } => "unmapped",
            WebhookOutcome::Ignored {
                reason: IgnoreReason::Duplicate,
                ..
            } => "duplicate",
            WebhookOutcome::Ignored {
                reason: IgnoreReason::Stale,
                ..
            } => "stale",
            WebhookOutcome::Updated { .. } => "updated",
        }
    }

    /// Whether this event released funds
    pub fn credited(&self) -> bool {
        matches!(
            self,
            WebhookOutcome::Updated {
                approval: Some(a),
                ..
            } if a.is_approved()
        )
    }
}

/// Webhook reconciler
#[derive(Clone)]
pub struct WebhookReconciler {
    store: Arc<dyn Store>,
    approver: DepositApprover,
    verifier: SignatureVerifier,
}

impl WebhookReconciler {
    pub fn new(store: Arc<dyn Store>, approver: DepositApprover, verifier: SignatureVerifier) -> Self {
        Self {
            store,
            approver,
            verifier,
        }
    }

    pub fn verifier(&self) -> &SignatureVerifier {
        &self.verifier
    }

    /// Authenticate, parse and apply one delivery
    ///
    /// # Arguments
    ///
    /// * `body` - Raw request body, exactly as signed
    /// * `signature` - Hex signature header, if any
    ///
    /// # Errors
    ///
    /// * `WebhookError::InvalidSignature` - Verification configured and failed
    /// * `WebhookError::MalformedPayload` - Body is not a webhook event
    pub async fn handle_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> WebhookResult<WebhookOutcome> {
        self.verifier.verify(body, signature)?;
        let event: WebhookEvent = serde_json::from_slice(body)
            .map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;
        self.reconcile(&event).await
    }

    /// Apply an already authenticated event
    pub async fn reconcile(&self, event: &WebhookEvent) -> WebhookResult<WebhookOutcome> {
        if event.is_verification() {
            log::info!(
                "Gateway webhook verification received (code {:?})",
                event.verification_code
            );
            return Ok(WebhookOutcome::Verification {
                code: event.verification_code.clone(),
            });
        }

        let object = event.object().ok_or_else(|| {
            WebhookError::MalformedPayload(format!("{} event without data.object", event.event_type))
        })?;
        let Some(status) = event.status() else {
            log::debug!("Ignoring unmapped {} event for {}", event.event_type, object.id);
            return Ok(WebhookOutcome::Ignored {
                charge_id: Some(object.id.clone()),
                reason: IgnoreReason::Unmapped,
            });
        };

        let mut uow = self.store.begin().await?;
        let Some(mut external) = uow.lock_external_by_charge_id(&object.id).await? else {
            if status == ExternalStatus::Completed {
                // Can race the charge call itself, before its row commits
                log::warn!(
                    "Capture for unrecorded charge {} acknowledged; it will surface \
                     as a stuck pending charge",
                    object.id
                );
            } else {
                log::info!("Webhook for unknown charge {} acknowledged", object.id);
            }
            return Ok(WebhookOutcome::UnknownCharge {
                charge_id: object.id.clone(),
            });
        };

        let current = external.external_status;
        if current == status || !current.can_transition_to(status) {
            let reason = if current == status {
                IgnoreReason::Duplicate
            } else {
                IgnoreReason::Stale
            };
            log::info!(
                "Ignoring {} {} event for charge {} (stored {})",
                reason,
                status,
                object.id,
                current
            );
            return Ok(WebhookOutcome::Ignored {
                charge_id: Some(object.id.clone()),
                reason,
            });
        }

        if let Some(amount) = object.amount
            && amount != external.amount
        {
            log::warn!(
                "Charge {} reported amount {} but was created for {}; keeping {}",
                object.id,
                amount,
                external.amount,
                external.amount
            );
        }

        let now = Utc::now();
        external.external_status = status;
        external.updated_at = now;
        if status == ExternalStatus::Completed {
            if object.authorization.is_some() {
                external.authorization_code = object.authorization.clone();
            }
            external.charged_at = Some(object.charged_at().unwrap_or(now));
        } else if status.is_failure() {
            external.error_code = object.error_code.clone();
            external.error_message = object.error_message.clone();
        }
        uow.update_external(&external).await?;

        let approval = if status == ExternalStatus::Completed {
            Some(
                self.approver
                    .approve_within(
                        uow.as_mut(),
                        external.deposit_request_id,
                        Some(external.id),
                        SYSTEM_ACTOR,
                        ApprovalTrigger::GatewayConfirmation,
                    )
                    .await?,
            )
        } else {
            None
        };
        uow.commit().await?;

        log::info!(
            "Charge {} moved {} -> {}{}",
            external.external_charge_id,
            current,
            status,
            approval
                .as_ref()
                .map(|a| format!(" ({})", a.label()))
                .unwrap_or_default()
        );
        if status.is_failure() {
            log::warn!(
                "Charge {} {}: {} {}",
                external.external_charge_id,
                status,
                external.error_code.as_deref().unwrap_or("-"),
                external.error_message.as_deref().unwrap_or("")
            );
        }
        if let Some(outcome) = &approval {
            self.approver.finish(outcome).await;
        }

        Ok(WebhookOutcome::Updated {
            charge_id: external.external_charge_id,
            status,
            approval,
        })
    }
}
