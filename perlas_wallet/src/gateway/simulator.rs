//! Deterministic and randomised gateway for development and tests.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    PaymentGateway,
    errors::{GatewayError, GatewayResult},
    models::{ChargeMethod, ChargeRequest, ChargeResult, ExternalStatus, PaymentInstructions},
};

/// Gateway code used for simulated card declines
pub const DECLINE_CODE: &str = "3001";

/// How long bank and store references stay payable
const PAYABLE_FOR_HOURS: i64 = 72;

/// How card charges are answered
#[derive(Debug, Clone, PartialEq)]
pub enum SimulatorMode {
    /// Every card charge completes immediately
    Complete,
    /// Every card charge waits for an asynchronous confirmation
    Pending,
    /// Every charge is declined
    Decline { code: String, message: String },
    /// Every call fails as if the gateway were down
    Unavailable,
    /// Card charges complete with the given probability and are otherwise declined
    Random { success_rate: f64 },
}

/// A charge the simulator answered
#[derive(Debug, Clone, Serialize)]
pub struct SimulatedCharge {
    pub request: ChargeRequest,
    pub result: ChargeResult,
}

/// Simulated payment gateway
pub struct SimulatedGateway {
    mode: Mutex<SimulatorMode>,
    latency: Option<std::time::Duration>,
    charges: Mutex<Vec<SimulatedCharge>>,
}

impl SimulatedGateway {
    pub fn new(mode: SimulatorMode) -> Self {
        Self {
            mode: Mutex::new(mode),
            latency: None,
            charges: Mutex::new(Vec::new()),
        }
    }

    /// Delay every answer by `latency`
    pub fn with_latency(mut self, latency: std::time::Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub async fn set_mode(&self, mode: SimulatorMode) {
        *self.mode.lock().await = mode;
    }

    /// Charges answered so far, oldest first
    pub async fn issued_charges(&self) -> Vec<SimulatedCharge> {
        self.charges.lock().await.clone()
    }

    /// Most recent charge answered
    pub async fn last_charge(&self) -> Option<SimulatedCharge> {
        self.charges.lock().await.last().cloned()
    }

    /// Build a webhook event for a charge, in the gateway's notification format
    ///
    /// # Arguments
    ///
    /// * `charge_id` - Gateway charge id
    /// * `event_type` - e.g. `charge.succeeded`, `charge.failed`
    /// * `amount` - Charged amount
    pub fn webhook_event(charge_id: &str, event_type: &str, amount: Decimal) -> serde_json::Value {
        let status = match event_type {
            "charge.succeeded" => "completed",
            "charge.pending" => "in_progress",
            "charge.failed" => "failed",
            "charge.cancelled" => "cancelled",
            "charge.expired" => "expired",
            _ => "pending",
        };
        let now = Utc::now();
        let mut object = serde_json::json!({
            "id": charge_id,
            "amount": amount.to_f64().unwrap_or_default(),
            "status": status,
            "currency": "MXN",
            "method": "card",
        });
        match status {
            "completed" => {
                object["authorization"] = serde_json::json!(authorization_code());
                object["charged_date"] = serde_json::json!(now.to_rfc3339());
            }
            "failed" => {
                object["error_code"] = serde_json::json!(DECLINE_CODE);
                object["error_message"] = serde_json::json!("The card was declined");
            }
            _ => {}
        }
        serde_json::json!({
            "type": event_type,
            "event_date": now.to_rfc3339(),
            "data": { "object": object },
        })
    }

    fn charge_id() -> String {
        format!("sim_{}", Uuid::new_v4().simple())
    }

    fn answer(mode: &SimulatorMode, request: &ChargeRequest) -> GatewayResult<ChargeResult> {
        let card_status = match mode {
            SimulatorMode::Unavailable => {
                return Err(GatewayError::Unavailable(
                    "simulated gateway is offline".to_string(),
                ));
            }
            SimulatorMode::Decline { code, message } => {
                return Err(GatewayError::Declined {
                    code: code.clone(),
                    message: message.clone(),
                });
            }
            SimulatorMode::Complete => Some(ExternalStatus::Completed),
            SimulatorMode::Pending => Some(ExternalStatus::ChargePending),
            SimulatorMode::Random { success_rate } => rand::rng()
                .random_bool(success_rate.clamp(0.0, 1.0))
                .then_some(ExternalStatus::Completed),
        };

        let instructions = match &request.method {
            ChargeMethod::BankTransfer => PaymentInstructions {
                bank_name: Some("STP".to_string()),
                clabe: Some(format!("646180{}", digits(12))),
                reference: Some(digits(7)),
            },
            ChargeMethod::Store => PaymentInstructions {
                bank_name: None,
                clabe: None,
                reference: Some(digits(14)),
            },
            ChargeMethod::Card { .. } => {
                let status = card_status.ok_or_else(|| GatewayError::Declined {
                    code: DECLINE_CODE.to_string(),
                    message: "The card was declined".to_string(),
                })?;
                let completed = status == ExternalStatus::Completed;
                return Ok(ChargeResult {
                    id: Self::charge_id(),
                    status,
                    authorization: completed.then(authorization_code),
                    due_date: None,
                    payment_instructions: None,
                    error_code: None,
                    error_message: None,
                });
            }
        };

        Ok(ChargeResult {
            id: Self::charge_id(),
            status: ExternalStatus::ChargePending,
            authorization: None,
            due_date: Some(Utc::now() + Duration::hours(PAYABLE_FOR_HOURS)),
            payment_instructions: Some(instructions),
            error_code: None,
            error_message: None,
        })
    }
}

impl Default for SimulatedGateway {
    fn default() -> Self {
        Self::new(SimulatorMode::Complete)
    }
}

#[async_trait]
impl PaymentGateway for SimulatedGateway {
    async fn create_charge(&self, request: &ChargeRequest) -> GatewayResult<ChargeResult> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mode = self.mode.lock().await.clone();
        let result = Self::answer(&mode, request)?;

        log::debug!(
            "Simulated {} charge {} for {} -> {}",
            request.method.payment_method(),
            result.id,
            request.amount,
            result.status
        );
        self.charges.lock().await.push(SimulatedCharge {
            request: request.clone(),
            result: result.clone(),
        });
        Ok(result)
    }
}

fn digits(count: usize) -> String {
    let mut rng = rand::rng();
    (0..count)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

fn authorization_code() -> String {
    digits(6)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn card_request() -> ChargeRequest {
        ChargeRequest {
            method: ChargeMethod::Card {
                source_id: "tok_test".to_string(),
                device_session_id: None,
            },
            amount: Decimal::new(10000, 2),
            currency: "MXN".to_string(),
            customer_ref: "user-1".to_string(),
            order_ref: "PRL-20250101-ABCDEFGH".to_string(),
            description: "Perlas".to_string(),
        }
    }

    #[tokio::test]
    async fn test_complete_mode_authorizes_cards() {
        let gateway = SimulatedGateway::new(SimulatorMode::Complete);
        let result = gateway.create_charge(&card_request()).await.unwrap();
        assert_eq!(result.status, ExternalStatus::Completed);
        assert_eq!(result.authorization.as_ref().map(String::len), Some(6));
        assert!(result.id.starts_with("sim_"));
        assert_eq!(gateway.issued_charges().await.len(), 1);
    }

    #[tokio::test]
    async fn test_bank_transfers_always_wait_for_payment() {
        let gateway = SimulatedGateway::new(SimulatorMode::Complete);
        let request = ChargeRequest {
            method: ChargeMethod::BankTransfer,
            ..card_request()
        };
        let result = gateway.create_charge(&request).await.unwrap();
        assert_eq!(result.status, ExternalStatus::ChargePending);
        let instructions = result.payment_instructions.unwrap();
        assert_eq!(instructions.clabe.as_ref().map(String::len), Some(18));
        assert!(result.due_date.is_some());
    }

    #[tokio::test]
    async fn test_decline_and_unavailable_record_nothing() {
        let gateway = SimulatedGateway::new(SimulatorMode::Decline {
            code: "3003".to_string(),
            message: "Insufficient funds".to_string(),
        });
        assert!(matches!(
            gateway.create_charge(&card_request()).await,
            Err(GatewayError::Declined { code, .. }) if code == "3003"
        ));

        gateway.set_mode(SimulatorMode::Unavailable).await;
        assert!(matches!(
            gateway.create_charge(&card_request()).await,
            Err(GatewayError::Unavailable(_))
        ));
        assert!(gateway.issued_charges().await.is_empty());
    }

    #[tokio::test]
    async fn test_random_mode_extremes() {
        let gateway = SimulatedGateway::new(SimulatorMode::Random { success_rate: 1.0 });
        assert!(gateway.create_charge(&card_request()).await.is_ok());

        gateway
            .set_mode(SimulatorMode::Random { success_rate: 0.0 })
            .await;
        assert!(gateway.create_charge(&card_request()).await.is_err());
    }

    #[test]
    fn test_webhook_event_shape() {
        let event = SimulatedGateway::webhook_event("sim_1", "charge.succeeded", Decimal::new(7500, 2));
        assert_eq!(event["type"], "charge.succeeded");
        assert_eq!(event["data"]["object"]["status"], "completed");
        assert_eq!(event["data"]["object"]["amount"], 75.0);
        assert!(event["data"]["object"]["authorization"].is_string());
    }
}
