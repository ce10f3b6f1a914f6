//! Withdrawals: payouts from a wallet to a bank account.

pub mod config;
pub mod errors;
pub mod manager;
pub mod models;

pub use config::WithdrawalConfig;
pub use errors::{WithdrawalError, WithdrawalResult};
pub use manager::WithdrawalManager;
pub use models::{BankDestination, WithdrawalRequest, WithdrawalStatus};
