//! Append-only audit trail for balance-affecting actions.
//!
//! Audit writes happen after the financial unit of work has committed and
//! are best-effort: a failed write is logged and never rolls back the
//! mutation it describes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::db::Store;
use crate::wallet::UserId;

/// Actor recorded for automatic decisions
pub const SYSTEM_ACTOR: &str = "SYSTEM";

/// Audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    WalletOpened,
    Credit,
    Debit,
    Transfer,
    WalletFrozen,
    WalletUnfrozen,
    WalletDeactivated,
    ReviewHoldPlaced,
    ReviewHoldReleased,
    DepositApproved,
    DepositRejected,
    DepositExpired,
    WithdrawalRequested,
    WithdrawalCompleted,
    WithdrawalRejected,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::WalletOpened => "wallet_opened",
            AuditAction::Credit => "credit",
            AuditAction::Debit => "debit",
            AuditAction::Transfer => "transfer",
            AuditAction::WalletFrozen => "wallet_frozen",
            AuditAction::WalletUnfrozen => "wallet_unfrozen",
            AuditAction::WalletDeactivated => "wallet_deactivated",
            AuditAction::ReviewHoldPlaced => "review_hold_placed",
            AuditAction::ReviewHoldReleased => "review_hold_released",
            AuditAction::DepositApproved => "deposit_approved",
            AuditAction::DepositRejected => "deposit_rejected",
            AuditAction::DepositExpired => "deposit_expired",
            AuditAction::WithdrawalRequested => "withdrawal_requested",
            AuditAction::WithdrawalCompleted => "withdrawal_completed",
            AuditAction::WithdrawalRejected => "withdrawal_rejected",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "wallet_opened" => AuditAction::WalletOpened,
            "credit" => AuditAction::Credit,
            "debit" => AuditAction::Debit,
            "transfer" => AuditAction::Transfer,
            "wallet_frozen" => AuditAction::WalletFrozen,
            "wallet_unfrozen" => AuditAction::WalletUnfrozen,
            "wallet_deactivated" => AuditAction::WalletDeactivated,
            "review_hold_placed" => AuditAction::ReviewHoldPlaced,
            "review_hold_released" => AuditAction::ReviewHoldReleased,
            "deposit_approved" => AuditAction::DepositApproved,
            "deposit_rejected" => AuditAction::DepositRejected,
            "deposit_expired" => AuditAction::DepositExpired,
            "withdrawal_requested" => AuditAction::WithdrawalRequested,
            "withdrawal_completed" => AuditAction::WithdrawalCompleted,
            "withdrawal_rejected" => AuditAction::WithdrawalRejected,
            other => return Err(other.to_string()),
        })
    }
}

/// Audit entry to be appended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuditEntry {
    pub actor: String,
    pub action: AuditAction,
    pub user_id: Option<UserId>,
    pub amount: Option<Decimal>,
    pub reference_id: Option<String>,
    pub details: serde_json::Value,
}

impl NewAuditEntry {
    pub fn new(actor: impl Into<String>, action: AuditAction) -> Self {
        Self {
            actor: actor.into(),
            action,
            user_id: None,
            amount: None,
            reference_id: None,
            details: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn amount(mut self, amount: Decimal) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn reference(mut self, reference_id: impl Into<String>) -> Self {
        self.reference_id = Some(reference_id.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}

/// Stored audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: i64,
    pub actor: String,
    pub action: AuditAction,
    pub user_id: Option<UserId>,
    pub amount: Option<Decimal>,
    pub reference_id: Option<String>,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Best-effort writer over the store's audit table
#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn Store>,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Append entries, logging (not returning) any failure
    pub async fn record(&self, entries: impl IntoIterator<Item = NewAuditEntry>) {
        for entry in entries {
            let action = entry.action;
            let user_id = entry.user_id;
            if let Err(e) = self.store.append_audit(entry).await {
                log::error!(
                    "Failed to write audit entry {} for user {:?}: {}",
                    action,
                    user_id,
                    e
                );
            }
        }
    }
}
