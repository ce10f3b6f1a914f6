//! Structured logging.
//!
//! The server logs through `tracing`; the wallet crate logs through the
//! `log` facade and its records reach the same subscriber.

use rust_decimal::Decimal;
use tracing::Level;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info,sqlx=warn,hyper=warn";

/// Operations slower than this are logged at warn level
pub const SLOW_OPERATION_MS: u64 = 1000;

/// Install the global subscriber.
///
/// Levels come from `RUST_LOG`, falling back to [`DEFAULT_FILTER`]. Calling
/// this twice leaves the first subscriber in place.
///
/// ```no_run
/// perlas_server::logging::init();
/// tracing::info!("Server starting");
/// ```
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    if tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
    {
        tracing::info!(filter = DEFAULT_FILTER, "Structured logging initialized");
    }
}

/// Log a security event such as a forged webhook
///
/// # Arguments
///
/// * `event_type` - Machine-readable event name
/// * `user_id` - Affected user, if known
/// * `source` - Origin, e.g. `gateway`
/// * `message` - Human-readable detail
pub fn log_security_event(
    event_type: &str,
    user_id: Option<i64>,
    source: Option<&str>,
    message: &str,
) {
    tracing::warn!(
        event_type = event_type,
        user_id = user_id,
        source = source,
        "SECURITY: {}",
        message
    );
}

/// Log a balance change made on behalf of an HTTP caller
pub fn log_money_movement(kind: &str, user_id: i64, amount: Decimal, reference: Option<&str>) {
    tracing::info!(
        kind = kind,
        user_id = user_id,
        amount = %amount,
        reference = reference,
        "Money movement"
    );
}

/// Log how long an operation took; slow ones at warn level
pub fn log_performance(operation: &str, duration_ms: u64, metadata: Option<&str>) {
    if duration_ms > SLOW_OPERATION_MS {
        tracing::warn!(
            operation = operation,
            duration_ms = duration_ms,
            metadata = metadata,
            "PERFORMANCE: Slow operation"
        );
    } else {
        tracing::debug!(operation = operation, duration_ms = duration_ms, "Timing");
    }
}

/// Level an access log line is written at
pub fn level_for_status(status_code: u16) -> Level {
    match status_code {
        500.. => Level::ERROR,
        400..=499 => Level::WARN,
        _ => Level::INFO,
    }
}

/// Access log line for a finished request
///
/// `route` is the matched route template, so ids never leak into labels.
pub fn log_api_request(
    method: &str,
    route: &str,
    status_code: u16,
    duration_ms: u64,
    user_id: Option<i64>,
) {
    macro_rules! access {
        ($level:ident) => {
            tracing::$level!(
                http_method = method,
                http_route = route,
                http_status = status_code,
                duration_ms = duration_ms,
                user_id = user_id,
                "API request completed"
            )
        };
    }
    match level_for_status(status_code) {
        Level::ERROR => access!(error),
        Level::WARN => access!(warn),
        _ => access!(info),
    }
}
