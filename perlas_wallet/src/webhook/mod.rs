//! Inbound gateway notifications: authentication, parsing and idempotent
//! reconciliation onto external transactions.

pub mod errors;
pub mod models;
pub mod reconciler;
pub mod signature;

pub use errors::{WebhookError, WebhookResult};
pub use models::{ChargeObject, EventData, VERIFICATION_EVENT, WebhookEvent};
pub use reconciler::{IgnoreReason, WebhookOutcome, WebhookReconciler};
pub use signature::{SignatureVerifier, WebhookConfig, sign};
