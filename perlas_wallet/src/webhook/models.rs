//! Inbound webhook payloads.
//!
//! Parsing is lenient: unknown fields are ignored and optional fields may be
//! missing or null.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;

use crate::gateway::ExternalStatus;

/// Event type of the gateway's endpoint verification ping
pub const VERIFICATION_EVENT: &str = "verification";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub event_date: Option<String>,
    #[serde(default)]
    pub verification_code: Option<String>,
    #[serde(default)]
    pub data: Option<EventData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventData {
    pub object: ChargeObject,
}

/// The charge an event refers to
#[derive(Debug, Clone, Deserialize)]
pub struct ChargeObject {
    pub id: String,
    #[serde(default)]
    pub amount: Option<Decimal>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub authorization: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub charged_date: Option<String>,
}

impl ChargeObject {
    /// Capture time, when present and RFC 3339
    pub fn charged_at(&self) -> Option<DateTime<Utc>> {
        self.charged_date
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|d| d.with_timezone(&Utc))
    }
}

impl WebhookEvent {
    pub fn is_verification(&self) -> bool {
        self.event_type == VERIFICATION_EVENT
    }

    pub fn object(&self) -> Option<&ChargeObject> {
        self.data.as_ref().map(|d| &d.object)
    }

    /// Status this event reports: from the event type, else from the object
    pub fn status(&self) -> Option<ExternalStatus> {
        let from_type = match self.event_type.as_str() {
            "charge.created" => Some(ExternalStatus::Pending),
            "charge.pending" => Some(ExternalStatus::ChargePending),
            "charge.succeeded" => Some(ExternalStatus::Completed),
            "charge.failed" => Some(ExternalStatus::Failed),
            "charge.cancelled" => Some(ExternalStatus::Cancelled),
            "charge.expired" => Some(ExternalStatus::Expired),
            _ => None,
        };
        from_type.or_else(|| {
            self.object()
                .and_then(|o| o.status.as_deref())
                .and_then(|s| ExternalStatus::from_str(s).ok())
        })
    }
}
