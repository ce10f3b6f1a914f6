//! Withdrawal configuration.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::db::config::env_or;
use crate::deposit::AmountBounds;

/// Withdrawal settings
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawalConfig {
    pub bounds: AmountBounds,
    /// Share of the gross amount kept as commission
    pub commission_rate: Decimal,
}

impl WithdrawalConfig {
    /// Read `WITHDRAWAL_MIN_AMOUNT`, `WITHDRAWAL_MAX_AMOUNT` and
    /// `WITHDRAWAL_COMMISSION_RATE`, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            bounds: AmountBounds::new(
                env_or("WITHDRAWAL_MIN_AMOUNT", defaults.bounds.min),
                env_or("WITHDRAWAL_MAX_AMOUNT", defaults.bounds.max),
            ),
            commission_rate: env_or("WITHDRAWAL_COMMISSION_RATE", defaults.commission_rate),
        }
    }

    /// Commission on a gross amount, rounded half away from zero to cents
    pub fn commission_for(&self, amount: Decimal) -> Decimal {
        (amount * self.commission_rate)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
    }
}

impl Default for WithdrawalConfig {
    fn default() -> Self {
        Self {
            bounds: AmountBounds::new(Decimal::new(100_00, 2), Decimal::new(10_000_00, 2)),
            commission_rate: Decimal::new(3, 2),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commission_rounding() {
        let config = WithdrawalConfig::default();
        assert_eq!(config.commission_for(Decimal::new(100_00, 2)), Decimal::new(3_00, 2));
        // 3% of 123.45 = 3.7035
        assert_eq!(config.commission_for(Decimal::new(123_45, 2)), Decimal::new(3_70, 2));
        // 3% of 150.50 = 4.515
        assert_eq!(config.commission_for(Decimal::new(150_50, 2)), Decimal::new(4_52, 2));
    }
}
