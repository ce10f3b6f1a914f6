//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use perlas_wallet::db::{MemoryStore, Store};
use perlas_wallet::gateway::{SimulatedGateway, SimulatorMode};
use perlas_wallet::monitoring::RecordingAlertSink;
use perlas_wallet::wallet::{TransactionType, UserId};
use perlas_wallet::webhook::{WebhookConfig, sign};
use perlas_wallet::{Engine, EngineConfig};
use rust_decimal::Decimal;
use std::sync::Arc;

pub const WEBHOOK_SECRET: &str = "whsec_test_7f3a";

pub struct Harness {
    pub store: MemoryStore,
    pub gateway: Arc<SimulatedGateway>,
    pub alerts: Arc<RecordingAlertSink>,
    pub engine: Engine,
}

impl Harness {
    pub fn new(mode: SimulatorMode) -> Self {
        Self::with_config(mode, EngineConfig {
            webhook: WebhookConfig {
                secret: Some(WEBHOOK_SECRET.to_string()),
            },
            ..EngineConfig::default()
        })
    }

    pub fn with_config(mode: SimulatorMode, config: EngineConfig) -> Self {
        let store = MemoryStore::new();
        let gateway = Arc::new(SimulatedGateway::new(mode));
        let alerts = Arc::new(RecordingAlertSink::new());
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let engine = Engine::new(shared, gateway.clone(), alerts.clone(), config);
        Self {
            store,
            gateway,
            alerts,
            engine,
        }
    }

    /// Open a wallet and, when `balance` is positive, fund it with a game win
    pub async fn wallet_with(&self, user_id: UserId, balance: Decimal) {
        self.engine
            .wallets
            .open_wallet(user_id, None, None)
            .await
            .expect("open wallet");
        if balance > Decimal::ZERO {
            self.engine
                .wallets
                .credit(user_id, balance, TransactionType::GameWin, "Seed balance", None)
                .await
                .expect("seed balance");
        }
    }

    pub async fn balance(&self, user_id: UserId) -> Decimal {
        self.engine
            .wallets
            .get_wallet(user_id)
            .await
            .expect("wallet exists")
            .balance
    }

    pub async fn count_of(&self, user_id: UserId, kind: TransactionType) -> usize {
        self.store
            .all_transactions()
            .await
            .iter()
            .filter(|t| t.user_id == user_id && t.transaction_type == kind)
            .count()
    }

    /// Deliver a signed webhook built by the simulator
    pub async fn deliver(
        &self,
        charge_id: &str,
        event_type: &str,
        amount: Decimal,
    ) -> perlas_wallet::webhook::WebhookResult<perlas_wallet::webhook::WebhookOutcome> {
        let body = event_body(charge_id, event_type, amount);
        let signature = sign(WEBHOOK_SECRET, &body).expect("sign");
        self.engine
            .webhooks
            .handle_webhook(&body, Some(&signature))
            .await
    }
}

pub fn event_body(charge_id: &str, event_type: &str, amount: Decimal) -> Vec<u8> {
    serde_json::to_vec(&SimulatedGateway::webhook_event(charge_id, event_type, amount))
        .expect("serialise event")
}

pub fn money(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}
