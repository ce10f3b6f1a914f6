//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use chrono::Duration;
use perlas_wallet::EngineConfig;
use perlas_wallet::approval::ApprovalPolicy;
use perlas_wallet::db::DatabaseConfig;
use perlas_wallet::deposit::DepositConfig;
use perlas_wallet::monitoring::MonitoringConfig;
use perlas_wallet::payments::DEFAULT_GATEWAY_TIMEOUT;
use perlas_wallet::wallet::{TransferEngine, WalletConfig};
use perlas_wallet::webhook::WebhookConfig;
use perlas_wallet::withdrawal::WithdrawalConfig;
use rust_decimal::Decimal;
use std::net::SocketAddr;

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration; the in-memory store is used when `None`
    pub database: Option<DatabaseConfig>,
    /// Prometheus scrape listener, disabled when `None`
    pub metrics_bind: Option<SocketAddr>,
    /// Wallet engine settings
    pub engine: EngineConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if a variable is present but cannot be used
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind = match bind_override {
            Some(bind) => bind,
            None => parse_required_or("SERVER_BIND", "127.0.0.1:8080")?,
        };

        let database = match database_url_override {
            Some(database_url) => Some(DatabaseConfig {
                database_url,
                ..DatabaseConfig::from_env().unwrap_or_else(DatabaseConfig::development)
            }),
            None => DatabaseConfig::from_env(),
        };

        let metrics_bind = match std::env::var("METRICS_BIND") {
            Ok(v) if !v.is_empty() => Some(v.parse().map_err(|_| ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("'{}' is not a socket address", v),
            })?),
            _ => None,
        };

        let defaults = MonitoringConfig::default();
        let monitoring = MonitoringConfig {
            window: Duration::minutes(parse_env_or(
                "MONITOR_WINDOW_MINUTES",
                defaults.window.num_minutes(),
            )),
            failure_rate_threshold: parse_env_or(
                "MONITOR_FAILURE_RATE_THRESHOLD",
                defaults.failure_rate_threshold,
            ),
            failure_rate_high: parse_env_or("MONITOR_FAILURE_RATE_HIGH", defaults.failure_rate_high),
            min_samples: parse_env_or("MONITOR_MIN_SAMPLES", defaults.min_samples),
            stuck_pending_after: Duration::minutes(parse_env_or(
                "MONITOR_STUCK_PENDING_MINUTES",
                defaults.stuck_pending_after.num_minutes(),
            )),
            stuck_pending_high: parse_env_or("MONITOR_STUCK_PENDING_HIGH", defaults.stuck_pending_high),
            volume_multiplier: parse_env_or("MONITOR_VOLUME_MULTIPLIER", defaults.volume_multiplier),
            baseline_span: Duration::days(parse_env_or(
                "MONITOR_BASELINE_DAYS",
                defaults.baseline_span.num_days(),
            )),
        };

        let engine = EngineConfig {
            wallet: WalletConfig::from_env(),
            deposit: DepositConfig::from_env(),
            withdrawal: WithdrawalConfig::from_env(),
            monitoring,
            webhook: WebhookConfig::from_env(),
            policy: ApprovalPolicy::default(),
            transfer_commission_rate: parse_env_or(
                "TRANSFER_COMMISSION_RATE",
                TransferEngine::default_commission_rate(),
            ),
            gateway_timeout: std::time::Duration::from_secs(parse_env_or(
                "GATEWAY_TIMEOUT_SECS",
                DEFAULT_GATEWAY_TIMEOUT.as_secs(),
            )),
        };

        Ok(ServerConfig {
            bind,
            database,
            metrics_bind,
            engine,
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (method, bounds) in &self.engine.deposit.bounds {
            if bounds.min <= Decimal::ZERO || bounds.max < bounds.min {
                return Err(ConfigError::Invalid {
                    var: "DEPOSIT_MIN_AMOUNT".to_string(),
                    reason: format!(
                        "Bounds for {} must satisfy 0 < min <= max (got {}..={})",
                        method, bounds.min, bounds.max
                    ),
                });
            }
        }

        let withdrawal = &self.engine.withdrawal;
        if withdrawal.bounds.min <= Decimal::ZERO || withdrawal.bounds.max < withdrawal.bounds.min {
            return Err(ConfigError::Invalid {
                var: "WITHDRAWAL_MIN_AMOUNT".to_string(),
                reason: "Must satisfy 0 < min <= max".to_string(),
            });
        }

        for (var, rate) in [
            ("WITHDRAWAL_COMMISSION_RATE", withdrawal.commission_rate),
            ("TRANSFER_COMMISSION_RATE", self.engine.transfer_commission_rate),
        ] {
            if rate < Decimal::ZERO || rate >= Decimal::ONE {
                return Err(ConfigError::Invalid {
                    var: var.to_string(),
                    reason: "Must be in [0, 1)".to_string(),
                });
            }
        }

        if self.engine.deposit.lifetime <= Duration::zero() {
            return Err(ConfigError::Invalid {
                var: "DEPOSIT_LIFETIME_HOURS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        let monitoring = &self.engine.monitoring;
        if !(0.0..=1.0).contains(&monitoring.failure_rate_threshold)
            || monitoring.failure_rate_high < monitoring.failure_rate_threshold
        {
            return Err(ConfigError::Invalid {
                var: "MONITOR_FAILURE_RATE_THRESHOLD".to_string(),
                reason: format!(
                    "Must be within [0, 1] and not above MONITOR_FAILURE_RATE_HIGH ({})",
                    monitoring.failure_rate_high
                ),
            });
        }

        if self.engine.gateway_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                var: "GATEWAY_TIMEOUT_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if let Some(metrics_bind) = self.metrics_bind
            && metrics_bind == self.bind
        {
            return Err(ConfigError::Invalid {
                var: "METRICS_BIND".to_string(),
                reason: format!("Must differ from the server bind address ({})", self.bind),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Parse a variable that must be valid when set; `default` is parsed otherwise
fn parse_required_or<T>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
{
    let raw = std::env::var(key).unwrap_or_else(|_| default.to_string());
    raw.parse().map_err(|_| ConfigError::Invalid {
        var: key.to_string(),
        reason: format!("'{}' could not be parsed", raw),
    })
}

/// Secret required when webhook verification must be enforced
pub fn require_webhook_secret(config: &ServerConfig) -> Result<(), ConfigError> {
    if config.engine.webhook.verification_enabled() {
        Ok(())
    } else {
        Err(ConfigError::MissingRequired {
            var: "GATEWAY_WEBHOOK_SECRET".to_string(),
            hint: "Generate with: openssl rand -hex 32".to_string(),
        })
    }
}
