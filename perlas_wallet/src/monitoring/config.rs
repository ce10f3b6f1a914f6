//! Monitoring thresholds.

use chrono::Duration;

/// Monitoring configuration
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// Rolling window for metrics and the failure-rate alert
    pub window: Duration,

    /// Failure share above which `HIGH_FAILURE_RATE` fires
    pub failure_rate_threshold: f64,

    /// Failure share above which `HIGH_FAILURE_RATE` is high rather than medium
    pub failure_rate_high: f64,

    /// Charges needed in the window before the failure rate is judged
    pub min_samples: u64,

    /// Age after which a pending charge counts as stuck
    pub stuck_pending_after: Duration,

    /// Number of stuck charges that makes `STUCK_PENDING` high severity
    pub stuck_pending_high: usize,

    /// Last-hour volume above `multiplier * baseline` fires `UNUSUAL_VOLUME`
    pub volume_multiplier: f64,

    /// Span used to compute the hourly volume baseline
    pub baseline_span: Duration,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            window: Duration::hours(1),
            failure_rate_threshold: 0.15,
            failure_rate_high: 0.30,
            min_samples: 10,
            stuck_pending_after: Duration::minutes(30),
            stuck_pending_high: 10,
            volume_multiplier: 3.0,
            baseline_span: Duration::days(7),
        }
    }
}
