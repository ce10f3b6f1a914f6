//! Webhook reconciliation against a simulated gateway.

mod common;

use common::{Harness, WEBHOOK_SECRET, event_body, money};
use perlas_wallet::approval::ApprovalOutcome;
use perlas_wallet::deposit::DepositStatus;
use perlas_wallet::gateway::{ExternalStatus, SimulatorMode};
use perlas_wallet::monitoring::AlertKind;
use perlas_wallet::wallet::{TransactionType, UserId};
use perlas_wallet::webhook::{IgnoreReason, WebhookError, WebhookOutcome, sign};

/// Create a pending card charge and return its gateway id
async fn pending_charge(h: &Harness, user_id: UserId, cents: i64) -> String {
    let response = h
        .engine
        .payments
        .create_card_payment(user_id, money(cents), "tok_visa".to_string(), None)
        .await
        .unwrap();
    assert_eq!(response.status, Some(ExternalStatus::ChargePending));
    response.external_charge_id.unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_deliveries_credit_once() {
    let h = Harness::new(SimulatorMode::Pending);
    h.wallet_with(1, money(0)).await;
    let charge_id = pending_charge(&h, 1, 120_00).await;

    let body = event_body(&charge_id, "charge.succeeded", money(120_00));
    let signature = sign(WEBHOOK_SECRET, &body).unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let webhooks = h.engine.webhooks.clone();
        let body = body.clone();
        let signature = signature.clone();
        handles.push(tokio::spawn(async move {
            webhooks.handle_webhook(&body, Some(&signature)).await
        }));
    }

    let mut credited = 0;
    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        if outcome.credited() {
            credited += 1;
        } else {
            assert_eq!(outcome.label(), "duplicate");
        }
    }

    assert_eq!(credited, 1);
    assert_eq!(h.balance(1).await, money(120_00));
    assert_eq!(h.count_of(1, TransactionType::PearlPurchase).await, 1);
}

#[tokio::test]
async fn test_late_pending_event_does_not_regress_status() {
    let h = Harness::new(SimulatorMode::Pending);
    h.wallet_with(1, money(0)).await;
    let charge_id = pending_charge(&h, 1, 60_00).await;

    h.deliver(&charge_id, "charge.succeeded", money(60_00)).await.unwrap();
    let late = h
        .deliver(&charge_id, "charge.pending", money(60_00))
        .await
        .unwrap();
    assert!(matches!(
        late,
        WebhookOutcome::Ignored {
            reason: IgnoreReason::Stale,
            ..
        }
    ));
    let failed_after = h
        .deliver(&charge_id, "charge.failed", money(60_00))
        .await
        .unwrap();
    assert_eq!(failed_after.label(), "stale");

    let external = h
        .engine
        .store
        .external_by_charge_id(&charge_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(external.external_status, ExternalStatus::Completed);
    assert!(external.authorization_code.is_some());
    assert!(external.charged_at.is_some());
    assert_eq!(h.balance(1).await, money(60_00));
}

#[tokio::test]
async fn test_failure_then_completion_is_applied_upward() {
    let h = Harness::new(SimulatorMode::Pending);
    h.wallet_with(1, money(0)).await;
    let charge_id = pending_charge(&h, 1, 80_00).await;

    let failed = h
        .deliver(&charge_id, "charge.failed", money(80_00))
        .await
        .unwrap();
    match failed {
        WebhookOutcome::Updated {
            status, approval, ..
        } => {
            assert_eq!(status, ExternalStatus::Failed);
            assert!(approval.is_none());
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    let external = h
        .engine
        .store
        .external_by_charge_id(&charge_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(external.error_code.as_deref(), Some("3001"));
    assert_eq!(h.balance(1).await, money(0));

    let completed = h
        .deliver(&charge_id, "charge.succeeded", money(80_00))
        .await
        .unwrap();
    assert!(completed.credited());
    assert_eq!(h.balance(1).await, money(80_00));
}

#[tokio::test]
async fn test_unknown_charge_is_acknowledged() {
    let h = Harness::new(SimulatorMode::Pending);
    let outcome = h
        .deliver("tr_not_ours", "charge.succeeded", money(10_00))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        WebhookOutcome::UnknownCharge { ref charge_id } if charge_id == "tr_not_ours"
    ));
}

#[tokio::test]
async fn test_verification_ping_needs_no_charge() {
    let h = Harness::new(SimulatorMode::Pending);
    let body = br#"{"type":"verification","verification_code":"aB3dE"}"#;
    let signature = sign(WEBHOOK_SECRET, body).unwrap();

    let outcome = h
        .engine
        .webhooks
        .handle_webhook(body, Some(&signature))
        .await
        .unwrap();
    match outcome {
        WebhookOutcome::Verification { code } => assert_eq!(code.as_deref(), Some("aB3dE")),
        other => panic!("unexpected outcome {:?}", other),
    }
}

#[tokio::test]
async fn test_bad_signature_changes_nothing() {
    let h = Harness::new(SimulatorMode::Pending);
    h.wallet_with(1, money(0)).await;
    let charge_id = pending_charge(&h, 1, 40_00).await;
    let body = event_body(&charge_id, "charge.succeeded", money(40_00));

    let forged = sign("not-the-secret", &body).unwrap();
    let err = h
        .engine
        .webhooks
        .handle_webhook(&body, Some(&forged))
        .await
        .unwrap_err();
    assert!(matches!(err, WebhookError::InvalidSignature));

    let err = h
        .engine
        .webhooks
        .handle_webhook(&body, None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_SIGNATURE");

    let err = h
        .engine
        .webhooks
        .handle_webhook(&body, Some("zz-not-hex"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "INVALID_SIGNATURE");

    assert_eq!(h.balance(1).await, money(0));
}

#[tokio::test]
async fn test_malformed_payloads_are_rejected() {
    let h = Harness::new(SimulatorMode::Pending);

    for body in [&b"not json"[..], &br#"{"type":"charge.succeeded"}"#[..]] {
        let signature = sign(WEBHOOK_SECRET, body).unwrap();
        let err = h
            .engine
            .webhooks
            .handle_webhook(body, Some(&signature))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "MALFORMED_PAYLOAD");
    }
}

#[tokio::test]
async fn test_unmapped_event_is_ignored() {
    let h = Harness::new(SimulatorMode::Pending);
    let body = br#"{"type":"payout.created","data":{"object":{"id":"po_1","status":"queued"}}}"#;
    let signature = sign(WEBHOOK_SECRET, body).unwrap();

    let outcome = h
        .engine
        .webhooks
        .handle_webhook(body, Some(&signature))
        .await
        .unwrap();
    assert_eq!(outcome.label(), "unmapped");
}

#[tokio::test]
async fn test_reported_amount_never_changes_the_credit() {
    let h = Harness::new(SimulatorMode::Pending);
    h.wallet_with(1, money(0)).await;
    let charge_id = pending_charge(&h, 1, 90_00).await;

    let outcome = h
        .deliver(&charge_id, "charge.succeeded", money(900_00))
        .await
        .unwrap();
    assert!(outcome.credited());
    assert_eq!(h.balance(1).await, money(90_00));
}

#[tokio::test]
async fn test_completion_on_held_wallet_leaves_deposit_pending() {
    let h = Harness::new(SimulatorMode::Pending);
    h.wallet_with(1, money(0)).await;
    let response = h
        .engine
        .payments
        .create_card_payment(1, money(70_00), "tok_visa".to_string(), None)
        .await
        .unwrap();
    let charge_id = response.external_charge_id.clone().unwrap();
    let deposit_id = response.deposit_id.unwrap();
    let transaction_id = response.transaction_id.unwrap();

    h.engine
        .wallets
        .place_review_hold(1, "ops-2", "chargeback history")
        .await
        .unwrap();

    let outcome = h
        .deliver(&charge_id, "charge.succeeded", money(70_00))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        WebhookOutcome::Updated {
            approval: Some(ApprovalOutcome::HeldForReview),
            ..
        }
    ));
    assert_eq!(
        h.engine.deposits.get_deposit(deposit_id).await.unwrap().status,
        DepositStatus::Pending
    );
    assert_eq!(h.balance(1).await, money(0));

    // The charge stays completed, so the replay is a duplicate; release goes
    // through the approver once the hold is lifted.
    let replay = h
        .deliver(&charge_id, "charge.succeeded", money(70_00))
        .await
        .unwrap();
    assert_eq!(replay.label(), "duplicate");

    h.engine.wallets.release_review_hold(1, "ops-2").await.unwrap();
    let released = h
        .engine
        .approver
        .auto_approve(deposit_id, transaction_id)
        .await
        .unwrap();
    assert!(released.is_approved());
    assert_eq!(h.balance(1).await, money(70_00));
}

#[tokio::test]
async fn test_ledger_mismatch_halts_release_and_alerts() {
    let h = Harness::new(SimulatorMode::Pending);
    h.wallet_with(1, money(20_00)).await;
    let charge_id = pending_charge(&h, 1, 50_00).await;

    h.store.overwrite_wallet_balance(1, money(999_00)).await;

    let outcome = h
        .deliver(&charge_id, "charge.succeeded", money(50_00))
        .await
        .unwrap();
    match outcome {
        WebhookOutcome::Updated {
            approval: Some(ApprovalOutcome::IntegrityViolation(snapshot)),
            ..
        } => {
            assert_eq!(snapshot.wallet_balance, money(999_00));
            assert_eq!(snapshot.ledger_balance, money(20_00));
        }
        other => panic!("unexpected outcome {:?}", other),
    }

    let wallet = h.engine.wallets.get_wallet(1).await.unwrap();
    assert!(wallet.review_hold);
    assert_eq!(wallet.balance, money(999_00));
    assert_eq!(h.count_of(1, TransactionType::PearlPurchase).await, 0);

    let alerts = h.alerts.alerts();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::LedgerMismatch);
}

#[tokio::test]
async fn test_verification_disabled_accepts_unsigned_events() {
    let h = Harness::with_config(SimulatorMode::Pending, Default::default());
    h.wallet_with(1, money(0)).await;
    let charge_id = pending_charge(&h, 1, 30_00).await;
    assert!(!h.engine.webhooks.verifier().is_enabled());

    let body = event_body(&charge_id, "charge.succeeded", money(30_00));
    let outcome = h.engine.webhooks.handle_webhook(&body, None).await.unwrap();
    assert!(outcome.credited());
}
