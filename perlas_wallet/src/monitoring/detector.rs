//! Payment metrics and anomaly detection.
//!
//! The monitor only reads. Alerts go to the configured [`AlertSink`]; acting
//! on them (a review hold, paging someone) is the caller's job.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

use super::{
    config::MonitoringConfig,
    errors::{MonitorError, MonitorResult},
    models::{Alert, AlertKind, HealthReport, HealthStatus, PaymentMetrics, Severity},
    sink::AlertSink,
};
use crate::db::Store;
use crate::gateway::{ExternalStatus, ExternalTransaction};
use crate::wallet::{LedgerSnapshot, UserId};

/// Charge ids listed in a stuck-pending or captured alert
const STUCK_SAMPLE: usize = 10;

/// Payment monitor
#[derive(Clone)]
pub struct PaymentMonitor {
    store: Arc<dyn Store>,
    sink: Arc<dyn AlertSink>,
    config: MonitoringConfig,
}

impl PaymentMonitor {
    pub fn new(store: Arc<dyn Store>, sink: Arc<dyn AlertSink>, config: MonitoringConfig) -> Self {
        Self {
            store,
            sink,
            config,
        }
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    /// Compute charge metrics over the window ending at `now`
    pub async fn metrics(&self, now: DateTime<Utc>) -> MonitorResult<PaymentMetrics> {
        let window_start = now - self.config.window;
        let charges: Vec<ExternalTransaction> = self
            .store
            .external_transactions_since(window_start)
            .await?
            .into_iter()
            .filter(|c| c.created_at <= now)
            .collect();
        Ok(summarise(&charges, window_start, now))
    }

    /// Evaluate every alert rule at `now`, raising each alert through the sink
    pub async fn check_alerts(&self, now: DateTime<Utc>) -> MonitorResult<Vec<Alert>> {
        let metrics = self.metrics(now).await?;
        let alerts = self.evaluate(&metrics, now).await?;
        for alert in &alerts {
            self.sink.raise(alert);
        }
        Ok(alerts)
    }

    /// Metrics, alerts and overall status.
    ///
    /// Read-only: the alerts are reported but not raised through the sink;
    /// [`check_alerts`](Self::check_alerts) does that on its own schedule.
    pub async fn health_report(&self, now: DateTime<Utc>) -> MonitorResult<HealthReport> {
        let metrics = self.metrics(now).await?;
        let alerts = self.evaluate(&metrics, now).await?;
        Ok(HealthReport {
            status: HealthStatus::from_alerts(&alerts),
            metrics,
            alerts,
            generated_at: now,
        })
    }

    async fn evaluate(
        &self,
        metrics: &PaymentMetrics,
        now: DateTime<Utc>,
    ) -> MonitorResult<Vec<Alert>> {
        let mut alerts = Vec::new();
        alerts.extend(self.failure_rate_alert(metrics));
        alerts.extend(self.stuck_pending_alert(now).await?);
        alerts.extend(self.captured_not_credited_alert(now).await?);
        alerts.extend(self.volume_alert(now).await?);
        Ok(alerts)
    }

    /// Recompute a user's ledger and compare it with their wallet.
    ///
    /// A mismatch raises `LEDGER_MISMATCH`; the snapshot is returned either way.
    pub async fn verify_ledger(&self, user_id: UserId) -> MonitorResult<LedgerSnapshot> {
        let snapshot = self
            .store
            .ledger_snapshot(user_id)
            .await?
            .ok_or(MonitorError::WalletNotFound(user_id))?;

        if !snapshot.is_consistent() {
            log::error!(
                "Ledger mismatch for user {}: wallet {} ledger {}",
                user_id,
                snapshot.wallet_balance,
                snapshot.ledger_balance
            );
            self.sink.raise(&Alert::ledger_mismatch(&snapshot));
        }
        Ok(snapshot)
    }

    fn failure_rate_alert(&self, metrics: &PaymentMetrics) -> Option<Alert> {
        let rate = metrics.failure_rate();
        if metrics.total < self.config.min_samples || rate <= self.config.failure_rate_threshold {
            return None;
        }
        let severity = if rate > self.config.failure_rate_high {
            Severity::High
        } else {
            Severity::Medium
        };
        Some(Alert::new(
            AlertKind::HighFailureRate,
            severity,
            format!(
                "{:.1}% of {} charges failed in the last {} minutes",
                rate * 100.0,
                metrics.total,
                self.config.window.num_minutes()
            ),
            serde_json::json!({
                "failure_rate": rate,
                "failed": metrics.failed,
                "total": metrics.total,
                "threshold": self.config.failure_rate_threshold,
            }),
        ))
    }

    async fn stuck_pending_alert(&self, now: DateTime<Utc>) -> MonitorResult<Option<Alert>> {
        let stuck = self
            .store
            .stale_pending_externals(now - self.config.stuck_pending_after)
            .await?;
        let Some(oldest) = stuck.first() else {
            return Ok(None);
        };

        let severity = if stuck.len() >= self.config.stuck_pending_high {
            Severity::High
        } else {
            Severity::Medium
        };
        let sample: Vec<&str> = stuck
            .iter()
            .take(STUCK_SAMPLE)
            .map(|c| c.external_charge_id.as_str())
            .collect();
        Ok(Some(Alert::new(
            AlertKind::StuckPending,
            severity,
            format!(
                "{} charges pending for more than {} minutes",
                stuck.len(),
                self.config.stuck_pending_after.num_minutes()
            ),
            serde_json::json!({
                "count": stuck.len(),
                "oldest_created_at": oldest.created_at,
                "charge_ids": sample,
            }),
        )))
    }

    /// Captures held back by a freeze, a review hold or a lost webhook
    async fn captured_not_credited_alert(
        &self,
        now: DateTime<Utc>,
    ) -> MonitorResult<Option<Alert>> {
        let captured = self
            .store
            .captured_pending_externals(now - self.config.stuck_pending_after)
            .await?;
        let Some(oldest) = captured.first() else {
            return Ok(None);
        };

        let total: Decimal = captured.iter().map(|c| c.amount).sum();
        let sample: Vec<&str> = captured
            .iter()
            .take(STUCK_SAMPLE)
            .map(|c| c.external_charge_id.as_str())
            .collect();
        Ok(Some(Alert::new(
            AlertKind::CapturedNotCredited,
            Severity::High,
            format!(
                "{} captured charges ({} total) wait for an operator",
                captured.len(),
                total
            ),
            serde_json::json!({
                "count": captured.len(),
                "amount": total,
                "oldest_captured_at": oldest.updated_at,
                "charge_ids": sample,
            }),
        )))
    }

    async fn volume_alert(&self, now: DateTime<Utc>) -> MonitorResult<Option<Alert>> {
        let hour = Duration::hours(1);
        let current = self.store.external_volume(now - hour, now).await?;

        let baseline_end = now - hour;
        let baseline_start = baseline_end - self.config.baseline_span;
        let hours = self.config.baseline_span.num_hours().max(1) as f64;
        let baseline_total = self
            .store
            .external_volume(baseline_start, baseline_end)
            .await?;
        let baseline = baseline_total as f64 / hours;

        if baseline <= 0.0 || (current as f64) <= baseline * self.config.volume_multiplier {
            return Ok(None);
        }
        Ok(Some(Alert::new(
            AlertKind::UnusualVolume,
            Severity::Medium,
            format!(
                "{} charges in the last hour against an hourly average of {:.2}",
                current, baseline
            ),
            serde_json::json!({
                "current_hour": current,
                "hourly_average": baseline,
                "multiplier": self.config.volume_multiplier,
            }),
        )))
    }
}

/// Aggregate a window of charges
pub fn summarise(
    charges: &[ExternalTransaction],
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> PaymentMetrics {
    let total = charges.len() as u64;
    let completed = charges
        .iter()
        .filter(|c| c.external_status == ExternalStatus::Completed)
        .count() as u64;
    let failed = charges
        .iter()
        .filter(|c| c.external_status.is_failure())
        .count() as u64;
    let pending = charges
        .iter()
        .filter(|c| !c.external_status.is_terminal())
        .count() as u64;

    let durations: Vec<f64> = charges
        .iter()
        .filter_map(ExternalTransaction::processing_time)
        .map(|d| d.num_milliseconds() as f64 / 1000.0)
        .collect();
    let average_processing_secs = if durations.is_empty() {
        None
    } else {
        Some(durations.iter().sum::<f64>() / durations.len() as f64)
    };

    PaymentMetrics {
        window_start,
        window_end,
        total,
        completed,
        failed,
        pending,
        success_rate: if total == 0 {
            0.0
        } else {
            completed as f64 / total as f64
        },
        average_processing_secs,
    }
}
