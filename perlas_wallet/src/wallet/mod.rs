//! Wallet module: the only place balances change.
//!
//! This module implements:
//! - An append-only ledger whose completed entries always sum to the wallet balance
//! - Credits and debits that commit atomically with their ledger row
//! - P2P transfers with a commission, locking wallets in a fixed order
//! - Operator controls (freeze, deactivate, review hold)
//!
//! ## Example
//!
//! ```no_run
//! use perlas_wallet::db::MemoryStore;
//! use perlas_wallet::wallet::{TransactionType, WalletConfig, WalletManager};
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let wallets = WalletManager::new(Arc::new(MemoryStore::new()), WalletConfig::default());
//!     wallets.open_wallet(1, None, None).await?;
//!
//!     let outcome = wallets
//!         .credit(1, Decimal::new(10000, 2), TransactionType::GameWin, "Bingo prize", None)
//!         .await?;
//!     println!("New balance: {}", outcome.wallet.balance);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod ledger;
pub mod manager;
pub mod models;
pub mod transfer;

pub use errors::{WalletError, WalletResult};
pub use manager::{WalletConfig, WalletManager};
pub use models::{
    EntryDirection, EntryRequest, LedgerOutcome, LedgerSnapshot, LedgerTransaction,
    TransactionStatus, TransactionType, TransferReceipt, UserId, Wallet,
};
pub use transfer::TransferEngine;
