//! Deposit requests: a user's declared intent to add funds, from creation
//! through approval, rejection or expiry.

pub mod config;
pub mod errors;
pub mod manager;
pub mod models;

pub use config::{AmountBounds, DepositConfig};
pub use errors::{DepositError, DepositResult};
pub use manager::{DepositManager, DepositReceipt};
pub use models::{
    DepositRequest, DepositStatus, IntegrationMethod, PaymentMethod, PaymentReference,
    ReferenceKind,
};
