//! Deposit configuration.

use chrono::Duration;
use rust_decimal::Decimal;
use std::collections::HashMap;

use super::models::PaymentMethod;
use crate::db::config::env_or;

/// Inclusive amount range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountBounds {
    pub min: Decimal,
    pub max: Decimal,
}

impl AmountBounds {
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, amount: Decimal) -> bool {
        amount >= self.min && amount <= self.max
    }
}

/// Deposit request settings
///
/// A method is enabled exactly when it has bounds configured.
#[derive(Debug, Clone)]
pub struct DepositConfig {
    pub bounds: HashMap<PaymentMethod, AmountBounds>,
    /// How long a request stays PENDING before it can be expired
    pub lifetime: Duration,
    /// ISO currency sent to the gateway
    pub currency: String,
}

impl DepositConfig {
    /// Read overrides from the environment
    ///
    /// Expected environment variables:
    /// - `DEPOSIT_MIN_AMOUNT` / `DEPOSIT_MAX_AMOUNT`: bounds for every method
    /// - `DEPOSIT_LIFETIME_HOURS`: request lifetime (default: 24)
    /// - `DEPOSIT_CURRENCY`: currency code (default: MXN)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let fallback = AmountBounds::default();
        let bounds = AmountBounds::new(
            env_or("DEPOSIT_MIN_AMOUNT", fallback.min),
            env_or("DEPOSIT_MAX_AMOUNT", fallback.max),
        );
        Self {
            bounds: PaymentMethod::ALL.iter().map(|m| (*m, bounds)).collect(),
            lifetime: Duration::hours(env_or("DEPOSIT_LIFETIME_HOURS", 24)),
            currency: env_or("DEPOSIT_CURRENCY", defaults.currency),
        }
    }

    /// Bounds for an enabled method
    pub fn bounds_for(&self, method: PaymentMethod) -> Option<AmountBounds> {
        self.bounds.get(&method).copied()
    }

    /// Replace one method's bounds
    pub fn with_bounds(mut self, method: PaymentMethod, bounds: AmountBounds) -> Self {
        self.bounds.insert(method, bounds);
        self
    }

    /// Stop accepting a method
    pub fn without_method(mut self, method: PaymentMethod) -> Self {
        self.bounds.remove(&method);
        self
    }
}

impl Default for AmountBounds {
    fn default() -> Self {
        Self::new(Decimal::new(10_00, 2), Decimal::new(5_000_00, 2))
    }
}

impl Default for DepositConfig {
    fn default() -> Self {
        Self {
            bounds: PaymentMethod::ALL
                .iter()
                .map(|m| (*m, AmountBounds::default()))
                .collect(),
            lifetime: Duration::hours(24),
            currency: "MXN".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_inclusive() {
        let bounds = AmountBounds::default();
        assert!(bounds.contains(Decimal::new(10_00, 2)));
        assert!(bounds.contains(Decimal::new(5_000_00, 2)));
        assert!(!bounds.contains(Decimal::new(9_99, 2)));
        assert!(!bounds.contains(Decimal::new(5_000_01, 2)));
    }

    #[test]
    fn test_disabled_method_has_no_bounds() {
        let config = DepositConfig::default().without_method(PaymentMethod::Store);
        assert!(config.bounds_for(PaymentMethod::Store).is_none());
        assert!(config.bounds_for(PaymentMethod::Card).is_some());
    }
}
