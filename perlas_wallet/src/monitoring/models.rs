//! Monitoring data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::wallet::LedgerSnapshot;

/// Alert severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Alert types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    /// Share of failed charges above threshold
    HighFailureRate,

    /// Charges left pending beyond the allowed age
    StuckPending,

    /// Charge volume well above the recent hourly baseline
    UnusualVolume,

    /// Wallet balance disagrees with its ledger
    LedgerMismatch,

    /// Gateway captured a charge whose deposit is still pending
    CapturedNotCredited,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertKind::HighFailureRate => write!(f, "HIGH_FAILURE_RATE"),
            AlertKind::StuckPending => write!(f, "STUCK_PENDING"),
            AlertKind::UnusualVolume => write!(f, "UNUSUAL_VOLUME"),
            AlertKind::LedgerMismatch => write!(f, "LEDGER_MISMATCH"),
            AlertKind::CapturedNotCredited => write!(f, "CAPTURED_NOT_CREDITED"),
        }
    }
}

/// Alert record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    /// Figures that triggered the alert
    pub metrics: serde_json::Value,
    /// Entity the alert is about, if any (e.g. `user:42`)
    pub subject: Option<String>,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        severity: Severity,
        message: impl Into<String>,
        metrics: serde_json::Value,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            metrics,
            subject: None,
            raised_at: Utc::now(),
        }
    }

    /// Critical alert for a wallet whose balance disagrees with its ledger
    pub fn ledger_mismatch(snapshot: &LedgerSnapshot) -> Self {
        let mut alert = Self::new(
            AlertKind::LedgerMismatch,
            Severity::Critical,
            format!(
                "Wallet balance {} does not match ledger sum {}",
                snapshot.wallet_balance, snapshot.ledger_balance
            ),
            serde_json::json!({
                "wallet_balance": snapshot.wallet_balance,
                "ledger_balance": snapshot.ledger_balance,
                "difference": snapshot.wallet_balance - snapshot.ledger_balance,
            }),
        );
        alert.subject = Some(format!("user:{}", snapshot.user_id));
        alert
    }
}

/// Charge metrics over a window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentMetrics {
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub total: u64,
    pub completed: u64,
    /// Failed, cancelled and expired charges
    pub failed: u64,
    /// Pending and charge-pending charges
    pub pending: u64,
    /// `completed / total`; zero for an empty window
    pub success_rate: f64,
    /// Mean seconds from creation to capture over completed charges
    pub average_processing_secs: Option<f64>,
}

impl PaymentMetrics {
    /// Share of charges that ended in failure; zero for an empty window
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}

/// Overall health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
}

impl HealthStatus {
    /// Worst status implied by a set of alerts
    pub fn from_alerts(alerts: &[Alert]) -> Self {
        match alerts.iter().map(|a| a.severity).max() {
            None | Some(Severity::Low) => HealthStatus::Healthy,
            Some(Severity::Medium) => HealthStatus::Degraded,
            Some(Severity::High) | Some(Severity::Critical) => HealthStatus::Critical,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Critical => write!(f, "critical"),
        }
    }
}

/// Metrics, alerts and status at one instant
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub metrics: PaymentMetrics,
    pub alerts: Vec<Alert>,
    pub generated_at: DateTime<Utc>,
}
