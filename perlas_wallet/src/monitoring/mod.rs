//! Monitoring module: payment metrics, anomaly alerts and ledger verification.

pub mod config;
pub mod detector;
pub mod errors;
pub mod models;
pub mod sink;

pub use config::MonitoringConfig;
pub use detector::PaymentMonitor;
pub use errors::{MonitorError, MonitorResult};
pub use models::{Alert, AlertKind, HealthReport, HealthStatus, PaymentMetrics, Severity};
pub use sink::{AlertSink, FanOutAlertSink, LogAlertSink, RecordingAlertSink};
