//! Alert delivery.

use std::sync::Mutex;

use super::models::{Alert, Severity};

/// Receives alerts. Delivery is fire-and-forget and must not fail the caller.
pub trait AlertSink: Send + Sync {
    fn raise(&self, alert: &Alert);
}

/// Writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn raise(&self, alert: &Alert) {
        let subject = alert.subject.as_deref().unwrap_or("-");
        match alert.severity {
            Severity::Critical | Severity::High => log::error!(
                "ALERT {} [{}] {}: {} {}",
                alert.kind,
                alert.severity,
                subject,
                alert.message,
                alert.metrics
            ),
            Severity::Medium | Severity::Low => log::warn!(
                "ALERT {} [{}] {}: {} {}",
                alert.kind,
                alert.severity,
                subject,
                alert.message,
                alert.metrics
            ),
        }
    }
}

/// Keeps every alert it receives
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<Alert>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Alerts received so far
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .map(|alerts| alerts.clone())
            .unwrap_or_default()
    }
}

impl AlertSink for RecordingAlertSink {
    fn raise(&self, alert: &Alert) {
        if let Ok(mut alerts) = self.alerts.lock() {
            alerts.push(alert.clone());
        }
    }
}

/// Forwards each alert to several sinks
pub struct FanOutAlertSink {
    sinks: Vec<std::sync::Arc<dyn AlertSink>>,
}

impl FanOutAlertSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn AlertSink>>) -> Self {
        Self { sinks }
    }
}

impl AlertSink for FanOutAlertSink {
    fn raise(&self, alert: &Alert) {
        for sink in &self.sinks {
            sink.raise(alert);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::AlertKind;
    use std::sync::Arc;

    #[test]
    fn test_fan_out_reaches_every_sink() {
        let first = Arc::new(RecordingAlertSink::new());
        let second = Arc::new(RecordingAlertSink::new());
        let sinks: Vec<Arc<dyn AlertSink>> = vec![
            first.clone() as Arc<dyn AlertSink>,
            second.clone() as Arc<dyn AlertSink>,
            Arc::new(LogAlertSink) as Arc<dyn AlertSink>,
        ];
        let sink = FanOutAlertSink::new(sinks);

        sink.raise(&Alert::new(
            AlertKind::UnusualVolume,
            Severity::Medium,
            "volume spike",
            serde_json::json!({ "count": 40 }),
        ));

        assert_eq!(first.alerts().len(), 1);
        assert_eq!(second.alerts()[0].kind, AlertKind::UnusualVolume);
    }
}
