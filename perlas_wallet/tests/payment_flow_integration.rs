//! Integration tests for deposit creation and charge issuance.
//!
//! Covers synchronous card approval, asynchronous card and bank transfer
//! confirmation, gateway failures, limits and manual deposits.

mod common;

use common::{Harness, money};
use perlas_wallet::approval::ApprovalOutcome;
use perlas_wallet::db::PageRequest;
use perlas_wallet::deposit::{DepositError, DepositStatus, PaymentMethod};
use perlas_wallet::gateway::{ExternalStatus, SimulatedGateway, SimulatorMode};
use perlas_wallet::payments::PaymentError;
use perlas_wallet::wallet::{TransactionType, WalletConfig};
use perlas_wallet::webhook::WebhookOutcome;
use perlas_wallet::{Engine, EngineConfig};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_card_completed_synchronously_is_credited_once() {
    let h = Harness::new(SimulatorMode::Complete);
    h.wallet_with(1, money(0)).await;

    let response = h
        .engine
        .payments
        .create_card_payment(1, money(100_00), "tok_visa".to_string(), None)
        .await
        .unwrap();

    assert!(response.success);
    assert_eq!(response.status, Some(ExternalStatus::Completed));
    assert_eq!(response.deposit_status, Some(DepositStatus::Approved));
    assert_eq!(h.balance(1).await, money(100_00));
    assert_eq!(h.store.user_balance(1).await, Some(money(100_00)));
    assert_eq!(h.count_of(1, TransactionType::PearlPurchase).await, 1);

    let deposit = h
        .engine
        .deposits
        .get_deposit(response.deposit_id.unwrap())
        .await
        .unwrap();
    assert_eq!(deposit.validated_by.as_deref(), Some("SYSTEM"));
    assert_eq!(deposit.external_transaction_id, response.transaction_id);
}

#[tokio::test]
async fn test_card_pending_waits_for_webhook_and_ignores_replays() {
    let h = Harness::new(SimulatorMode::Pending);
    h.wallet_with(1, money(0)).await;

    let response = h
        .engine
        .payments
        .create_card_payment(1, money(75_00), "tok_visa".to_string(), None)
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.status, Some(ExternalStatus::ChargePending));
    assert_eq!(response.deposit_status, Some(DepositStatus::Pending));
    assert_eq!(h.balance(1).await, money(0));

    let charge_id = response.external_charge_id.unwrap();
    let first = h.deliver(&charge_id, "charge.succeeded", money(75_00)).await.unwrap();
    assert!(first.credited());

    for _ in 0..3 {
        let replay = h.deliver(&charge_id, "charge.succeeded", money(75_00)).await.unwrap();
        assert!(!replay.credited());
        assert_eq!(replay.label(), "duplicate");
    }

    assert_eq!(h.balance(1).await, money(75_00));
    assert_eq!(h.count_of(1, TransactionType::PearlPurchase).await, 1);
}

#[tokio::test]
async fn test_bank_transfer_released_only_by_webhook() {
    let h = Harness::new(SimulatorMode::Complete);
    h.wallet_with(2, money(0)).await;

    let response = h
        .engine
        .payments
        .create_bank_transfer(2, money(300_00))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.status, Some(ExternalStatus::ChargePending));
    let instructions = response.payment_instructions.clone().unwrap();
    assert!(instructions.clabe.is_some());
    assert!(response.due_date.is_some());

    let deposit = h
        .engine
        .deposits
        .get_deposit(response.deposit_id.unwrap())
        .await
        .unwrap();
    assert!(!deposit.auto_approval_eligible);
    assert_eq!(deposit.status, DepositStatus::Pending);
    assert_eq!(h.balance(2).await, money(0));

    let outcome = h
        .deliver(
            response.external_charge_id.as_deref().unwrap(),
            "charge.succeeded",
            money(300_00),
        )
        .await
        .unwrap();
    match outcome {
        WebhookOutcome::Updated {
            status,
            approval: Some(ApprovalOutcome::Approved { deposit, .. }),
            ..
        } => {
            assert_eq!(status, ExternalStatus::Completed);
            assert_eq!(deposit.status, DepositStatus::Approved);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(h.balance(2).await, money(300_00));
}

#[tokio::test]
async fn test_store_payment_returns_reference() {
    let h = Harness::new(SimulatorMode::Complete);
    h.wallet_with(3, money(0)).await;

    let response = h
        .engine
        .payments
        .create_deposit(3, money(150_00), PaymentMethod::Store)
        .await
        .unwrap();
    assert!(response.success);
    let instructions = response.payment_instructions.unwrap();
    assert!(instructions.reference.is_some());
    assert!(instructions.clabe.is_none());
    assert_eq!(h.balance(3).await, money(0));
}

#[tokio::test]
async fn test_declined_card_is_a_business_outcome() {
    let h = Harness::new(SimulatorMode::Decline {
        code: "3003".to_string(),
        message: "The card has insufficient funds".to_string(),
    });
    h.wallet_with(1, money(0)).await;

    let response = h
        .engine
        .payments
        .create_card_payment(1, money(100_00), "tok_visa".to_string(), None)
        .await
        .unwrap();

    assert!(!response.success);
    assert_eq!(response.error_code.as_deref(), Some("3003"));
    assert_eq!(
        response.error_message.as_deref(),
        Some("The card has insufficient funds")
    );
    assert_eq!(response.deposit_status, Some(DepositStatus::Pending));
    assert!(response.transaction_id.is_none());
    assert_eq!(h.balance(1).await, money(0));
    assert!(h.store.all_transactions().await.is_empty());
}

#[tokio::test]
async fn test_gateway_outage_leaves_deposit_pending() {
    let h = Harness::new(SimulatorMode::Unavailable);
    h.wallet_with(1, money(0)).await;

    let response = h
        .engine
        .payments
        .create_card_payment(1, money(100_00), "tok_visa".to_string(), None)
        .await
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.error_code.as_deref(), Some("GATEWAY_UNAVAILABLE"));

    let deposit = h
        .engine
        .deposits
        .get_deposit(response.deposit_id.unwrap())
        .await
        .unwrap();
    assert_eq!(deposit.status, DepositStatus::Pending);
    assert!(deposit.external_transaction_id.is_none());

    let history = h
        .engine
        .payments
        .get_transaction_history(1, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(history.total, 0);
}

#[tokio::test]
async fn test_slow_gateway_times_out() {
    let h = Harness::new(SimulatorMode::Complete);
    let slow = SimulatedGateway::new(SimulatorMode::Complete).with_latency(Duration::from_millis(500));
    let engine = Engine::new(
        Arc::new(h.store.clone()),
        Arc::new(slow),
        h.alerts.clone(),
        EngineConfig {
            gateway_timeout: Duration::from_millis(20),
            ..EngineConfig::default()
        },
    );
    h.wallet_with(1, money(0)).await;

    let response = engine
        .payments
        .create_card_payment(1, money(50_00), "tok_visa".to_string(), None)
        .await
        .unwrap();
    assert!(!response.success);
    assert_eq!(response.error_code.as_deref(), Some("GATEWAY_TIMEOUT"));
    assert_eq!(response.deposit_status, Some(DepositStatus::Pending));
    assert_eq!(h.balance(1).await, money(0));
}

#[tokio::test]
async fn test_validation_rejects_before_any_write() {
    let h = Harness::new(SimulatorMode::Complete);
    h.wallet_with(1, money(0)).await;

    let err = h
        .engine
        .payments
        .create_card_payment(1, money(5_00), "tok_visa".to_string(), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PaymentError::Deposit(DepositError::AmountOutOfRange { .. })
    ));
    assert!(h.gateway.issued_charges().await.is_empty());

    let err = h
        .engine
        .payments
        .create_deposit(1, money(50_00), PaymentMethod::Card)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "CARD_SOURCE_REQUIRED");
}

#[tokio::test]
async fn test_frozen_wallet_cannot_deposit() {
    let h = Harness::new(SimulatorMode::Complete);
    h.wallet_with(1, money(0)).await;
    h.engine.wallets.freeze(1, "ops-1", "kyc review").await.unwrap();

    let err = h
        .engine
        .payments
        .create_bank_transfer(1, money(100_00))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "WALLET_FROZEN");
}

#[tokio::test]
async fn test_daily_limit_counts_approved_purchases() {
    let h = Harness::with_config(
        SimulatorMode::Complete,
        EngineConfig {
            wallet: WalletConfig {
                default_daily_limit: money(1_000_00),
                default_monthly_limit: money(50_000_00),
            },
            ..EngineConfig::default()
        },
    );
    h.wallet_with(1, money(0)).await;

    for _ in 0..2 {
        let response = h
            .engine
            .payments
            .create_card_payment(1, money(450_00), "tok_visa".to_string(), None)
            .await
            .unwrap();
        assert!(response.success);
    }

    let err = h
        .engine
        .payments
        .create_card_payment(1, money(100_01), "tok_visa".to_string(), None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "DEPOSIT_LIMIT_EXCEEDED");

    let response = h
        .engine
        .payments
        .create_card_payment(1, money(100_00), "tok_visa".to_string(), None)
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(h.balance(1).await, money(1_000_00));
}

#[tokio::test]
async fn test_manual_deposit_round_trip() {
    let h = Harness::new(SimulatorMode::Complete);
    h.wallet_with(4, money(0)).await;

    let response = h
        .engine
        .payments
        .create_deposit(4, money(500_00), PaymentMethod::ManualDeposit)
        .await
        .unwrap();
    let code = response.reference_code.clone().unwrap();
    let validation = response.validation_code.clone().unwrap();
    assert!(h.gateway.issued_charges().await.is_empty());

    let outcome = h
        .engine
        .deposits
        .confirm_manual_deposit(&code, &validation, "ops-7")
        .await
        .unwrap();
    assert!(outcome.is_approved());
    assert_eq!(h.balance(4).await, money(500_00));

    let deposit = h
        .engine
        .deposits
        .get_deposit(response.deposit_id.unwrap())
        .await
        .unwrap();
    assert_eq!(deposit.validated_by.as_deref(), Some("ops-7"));
}

#[tokio::test]
async fn test_transactions_are_private_and_newest_first() {
    let h = Harness::new(SimulatorMode::Pending);
    h.wallet_with(1, money(0)).await;
    h.wallet_with(2, money(0)).await;

    let mut ids = Vec::new();
    for cents in [10_00, 20_00, 30_00] {
        let response = h
            .engine
            .payments
            .create_card_payment(1, money(cents), "tok_visa".to_string(), None)
            .await
            .unwrap();
        ids.push(response.transaction_id.unwrap());
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let history = h
        .engine
        .payments
        .get_transaction_history(1, PageRequest::new(1, 2))
        .await
        .unwrap();
    assert_eq!(history.total, 3);
    assert_eq!(history.items.len(), 2);
    assert_eq!(history.items[0].id, ids[2]);
    assert_eq!(history.items[1].id, ids[1]);

    let own = h.engine.payments.get_transaction(ids[0], 1).await.unwrap();
    assert_eq!(own.amount, money(10_00));

    let err = h.engine.payments.get_transaction(ids[0], 2).await.unwrap_err();
    assert_eq!(err.code(), "TRANSACTION_NOT_FOUND");
}

#[tokio::test]
async fn test_held_wallet_keeps_completed_charge_pending_until_operator() {
    let h = Harness::new(SimulatorMode::Pending);
    h.wallet_with(8, money(0)).await;

    let response = h
        .engine
        .payments
        .create_card_payment(8, money(60_00), "tok_visa".to_string(), None)
        .await
        .unwrap();
    let deposit_id = response.deposit_id.unwrap();
    h.engine
        .wallets
        .place_review_hold(8, "ops-2", "manual review")
        .await
        .unwrap();

    let charge_id = response.external_charge_id.unwrap();
    let outcome = h.deliver(&charge_id, "charge.succeeded", money(60_00)).await.unwrap();
    assert!(matches!(
        outcome,
        WebhookOutcome::Updated {
            approval: Some(ApprovalOutcome::HeldForReview),
            ..
        }
    ));
    let replay = h.deliver(&charge_id, "charge.succeeded", money(60_00)).await.unwrap();
    assert_eq!(replay.label(), "duplicate");

    let held = h.engine.approver.operator_approve(deposit_id, "ops-2").await.unwrap();
    assert!(matches!(held, ApprovalOutcome::HeldForReview));
    assert_eq!(h.balance(8).await, money(0));

    h.engine
        .wallets
        .release_review_hold(8, "ops-2")
        .await
        .unwrap();
    let released = h.engine.approver.operator_approve(deposit_id, "ops-2").await.unwrap();
    assert!(released.is_approved());
    assert_eq!(h.balance(8).await, money(60_00));

    let again = h.engine.approver.operator_approve(deposit_id, "ops-2").await.unwrap();
    assert!(matches!(
        again,
        ApprovalOutcome::AlreadyProcessed(DepositStatus::Approved)
    ));
    assert_eq!(h.count_of(8, TransactionType::PearlPurchase).await, 1);
}

#[tokio::test]
async fn test_expiry_sweep_skips_captured_charge_on_frozen_wallet() {
    let h = Harness::new(SimulatorMode::Pending);
    h.wallet_with(9, money(0)).await;

    let captured = h
        .engine
        .payments
        .create_card_payment(9, money(75_00), "tok_visa".to_string(), None)
        .await
        .unwrap();
    let uncaptured = h
        .engine
        .payments
        .create_card_payment(9, money(20_00), "tok_visa".to_string(), None)
        .await
        .unwrap();
    let deposit_id = captured.deposit_id.unwrap();

    h.engine.wallets.freeze(9, "ops-3", "chargeback dispute").await.unwrap();
    let outcome = h
        .deliver(
            captured.external_charge_id.as_deref().unwrap(),
            "charge.succeeded",
            money(75_00),
        )
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        WebhookOutcome::Updated {
            approval: Some(ApprovalOutcome::WalletBlocked { .. }),
            ..
        }
    ));
    h.engine.wallets.unfreeze(9, "ops-3").await.unwrap();

    let expired = h
        .engine
        .deposits
        .expire_stale_requests_at(chrono::Utc::now() + chrono::Duration::hours(25))
        .await
        .unwrap();
    assert_eq!(expired.len(), 1);
    assert_eq!(Some(expired[0].id), uncaptured.deposit_id);

    let deposit = h.engine.deposits.get_deposit(deposit_id).await.unwrap();
    assert_eq!(deposit.status, DepositStatus::Pending);

    let released = h.engine.approver.operator_approve(deposit_id, "ops-3").await.unwrap();
    assert!(released.is_approved());
    assert_eq!(h.balance(9).await, money(75_00));
    assert_eq!(h.count_of(9, TransactionType::PearlPurchase).await, 1);
}
