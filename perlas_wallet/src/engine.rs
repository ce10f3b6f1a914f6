//! Service wiring shared by the server and the integration tests.

use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

use crate::approval::{ApprovalPolicy, DepositApprover};
use crate::db::Store;
use crate::deposit::{DepositConfig, DepositManager};
use crate::gateway::PaymentGateway;
use crate::monitoring::{AlertSink, MonitoringConfig, PaymentMonitor};
use crate::payments::{DEFAULT_GATEWAY_TIMEOUT, PaymentService};
use crate::wallet::{TransferEngine, WalletConfig, WalletManager};
use crate::webhook::{SignatureVerifier, WebhookConfig, WebhookReconciler};
use crate::withdrawal::{WithdrawalConfig, WithdrawalManager};

/// Settings for every service
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub wallet: WalletConfig,
    pub deposit: DepositConfig,
    pub withdrawal: WithdrawalConfig,
    pub monitoring: MonitoringConfig,
    pub webhook: WebhookConfig,
    pub policy: ApprovalPolicy,
    pub transfer_commission_rate: Decimal,
    pub gateway_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            wallet: WalletConfig::default(),
            deposit: DepositConfig::default(),
            withdrawal: WithdrawalConfig::default(),
            monitoring: MonitoringConfig::default(),
            webhook: WebhookConfig::default(),
            policy: ApprovalPolicy::default(),
            transfer_commission_rate: TransferEngine::default_commission_rate(),
            gateway_timeout: DEFAULT_GATEWAY_TIMEOUT,
        }
    }
}

/// Every service, built over one store
#[derive(Clone)]
pub struct Engine {
    pub store: Arc<dyn Store>,
    pub wallets: WalletManager,
    pub transfers: TransferEngine,
    pub deposits: DepositManager,
    pub approver: DepositApprover,
    pub payments: PaymentService,
    pub webhooks: WebhookReconciler,
    pub withdrawals: WithdrawalManager,
    pub monitor: PaymentMonitor,
}

impl Engine {
    /// Build every service
    ///
    /// # Arguments
    ///
    /// * `store` - Store shared by all services
    /// * `gateway` - Gateway adapter used for charges
    /// * `alerts` - Sink for monitoring and integrity alerts
    /// * `config` - Service settings
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        alerts: Arc<dyn AlertSink>,
        config: EngineConfig,
    ) -> Self {
        let approver = DepositApprover::new(store.clone(), alerts.clone(), config.policy);
        let deposits = DepositManager::new(store.clone(), approver.clone(), config.deposit);
        let payments =
            PaymentService::new(store.clone(), deposits.clone(), approver.clone(), gateway)
                .with_gateway_timeout(config.gateway_timeout);
        let webhooks = WebhookReconciler::new(
            store.clone(),
            approver.clone(),
            SignatureVerifier::new(&config.webhook),
        );

        Self {
            wallets: WalletManager::new(store.clone(), config.wallet),
            transfers: TransferEngine::with_commission_rate(
                store.clone(),
                config.transfer_commission_rate,
            ),
            withdrawals: WithdrawalManager::new(store.clone(), config.withdrawal),
            monitor: PaymentMonitor::new(store.clone(), alerts, config.monitoring),
            deposits,
            approver,
            payments,
            webhooks,
            store,
        }
    }
}
