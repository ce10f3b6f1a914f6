//! # Perlas Wallet
//!
//! Wallet ledger and payment reconciliation engine for the Perlas bingo
//! platform.
//!
//! Users buy pearls through a payment gateway, spend them on game entries
//! and cash winnings out. This crate owns the money side of that loop:
//!
//! - [`deposit`]: deposit requests, limits, expiry and manual confirmation
//! - [`payments`]: charge issuance through a [`gateway::PaymentGateway`]
//! - [`webhook`]: idempotent reconciliation of gateway notifications
//! - [`approval`]: the per-method policy that releases funds, exactly once
//! - [`wallet`]: the ledger, the single place balances change, plus P2P transfers
//! - [`withdrawal`]: payouts with commission and refund on rejection
//! - [`monitoring`]: success-rate metrics, anomaly alerts and ledger checks
//!
//! All durable state sits behind [`db::Store`]; every balance change runs
//! inside a [`db::UnitOfWork`] spanning the wallet row, the ledger entry and
//! whatever request row drove it.
//!
//! ## Example
//!
//! ```no_run
//! use perlas_wallet::{Engine, EngineConfig};
//! use perlas_wallet::db::MemoryStore;
//! use perlas_wallet::gateway::SimulatedGateway;
//! use perlas_wallet::monitoring::LogAlertSink;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(SimulatedGateway::default()),
//!     Arc::new(LogAlertSink),
//!     EngineConfig::default(),
//! );
//! engine.wallets.open_wallet(1, None, None).await?;
//! let response = engine
//!     .payments
//!     .create_card_payment(1, Decimal::new(100_00, 2), "tok_visa".into(), None)
//!     .await?;
//! assert!(response.success);
//! # Ok(())
//! # }
//! ```

pub mod approval;
pub mod audit;
pub mod db;
pub mod deposit;
pub mod engine;
pub mod gateway;
pub mod monitoring;
pub mod payments;
pub mod reference;
pub mod wallet;
pub mod webhook;
pub mod withdrawal;

pub use engine::{Engine, EngineConfig};
