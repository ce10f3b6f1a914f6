//! Payment gateway adapter.
//!
//! Services receive an `Arc<dyn PaymentGateway>`; a live HTTP client and the
//! [`SimulatedGateway`] are interchangeable behind it.

use async_trait::async_trait;

pub mod errors;
pub mod models;
pub mod simulator;

pub use errors::{GatewayError, GatewayResult};
pub use models::{
    ChargeMethod, ChargeRequest, ChargeResult, ExternalStatus, ExternalTransaction,
    PaymentInstructions,
};
pub use simulator::{SimulatedCharge, SimulatedGateway, SimulatorMode};

/// Charge creation against the payment gateway
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a charge
    ///
    /// # Returns
    ///
    /// * `GatewayResult<ChargeResult>` - Gateway charge, or why it was refused
    async fn create_charge(&self, request: &ChargeRequest) -> GatewayResult<ChargeResult>;
}
