//! HTTP API tests over the in-memory store and a simulated gateway.

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use hmac::{Hmac, Mac};
use http_body_util::BodyExt;
use perlas_server::api::{AppState, create_router};
use perlas_wallet::db::{MemoryStore, Store};
use perlas_wallet::gateway::{SimulatedGateway, SimulatorMode};
use perlas_wallet::monitoring::RecordingAlertSink;
use perlas_wallet::webhook::WebhookConfig;
use perlas_wallet::{Engine, EngineConfig};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use sha2::Sha256;
use std::str::FromStr;
use std::sync::Arc;
use tower::ServiceExt; // For `oneshot` method

const WEBHOOK_SECRET: &str = "whsec_api_tests";

struct TestApp {
    router: Router,
    store: MemoryStore,
    gateway: Arc<SimulatedGateway>,
}

impl TestApp {
    fn new(mode: SimulatorMode) -> Self {
        let store = MemoryStore::new();
        let gateway = Arc::new(SimulatedGateway::new(mode));
        let shared: Arc<dyn Store> = Arc::new(store.clone());
        let engine = Engine::new(
            shared,
            gateway.clone(),
            Arc::new(RecordingAlertSink::new()),
            EngineConfig {
                webhook: WebhookConfig {
                    secret: Some(WEBHOOK_SECRET.to_string()),
                },
                ..EngineConfig::default()
            },
        );
        let router = create_router(AppState {
            engine,
            database: None,
        });
        Self {
            router,
            store,
            gateway,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn call(
        &self,
        method: &str,
        uri: &str,
        user_id: Option<i64>,
        operator: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user_id) = user_id {
            builder = builder.header("x-user-id", user_id.to_string());
        }
        if let Some(operator) = operator {
            builder = builder.header("x-operator-id", operator);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(request).await
    }

    async fn user(&self, method: &str, uri: &str, user_id: i64, body: Option<Value>) -> (StatusCode, Value) {
        self.call(method, uri, Some(user_id), None, body).await
    }

    async fn admin(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        self.call(method, uri, None, Some("ops-1"), body).await
    }

    async fn webhook(&self, body: &[u8], signature: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/v1/webhooks/gateway")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-gateway-signature", signature);
        }
        self.send(builder.body(Body::from(body.to_vec())).unwrap())
            .await
    }

    async fn open_wallet(&self, user_id: i64) {
        let (status, _) = self.user("POST", "/api/v1/wallet", user_id, None).await;
        assert_eq!(status, StatusCode::OK);
    }

    async fn balance(&self, user_id: i64) -> Decimal {
        let (status, body) = self.user("GET", "/api/v1/wallet", user_id, None).await;
        assert_eq!(status, StatusCode::OK);
        dec(&body["balance"])
    }

    /// Card payment that completes or waits, depending on the simulator mode
    async fn card_payment(&self, user_id: i64, amount: &str) -> (StatusCode, Value) {
        self.user(
            "POST",
            "/api/v1/payments/card",
            user_id,
            Some(json!({ "amount": amount, "source_id": "tok_visa" })),
        )
        .await
    }
}

fn dec(value: &Value) -> Decimal {
    match value {
        Value::String(s) => Decimal::from_str(s).unwrap(),
        other => Decimal::from_str(&other.to_string()).unwrap(),
    }
}

fn money(cents: i64) -> Decimal {
    Decimal::new(cents, 2)
}

/// Sign the way the gateway does, independently of the wallet crate
fn gateway_signature(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn signed_event(charge_id: &str, event_type: &str, amount: Decimal) -> (Vec<u8>, String) {
    let body = serde_json::to_vec(&SimulatedGateway::webhook_event(charge_id, event_type, amount)).unwrap();
    let signature = gateway_signature(&body);
    (body, signature)
}

// ============================================================================
// Health and identity
// ============================================================================

#[tokio::test]
async fn test_health_check_reports_memory_store() {
    let app = TestApp::new(SimulatorMode::Complete);
    let (status, body) = app.call("GET", "/health", None, None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["payments"]["total"], 0);
}

#[tokio::test]
async fn test_user_routes_require_caller() {
    let app = TestApp::new(SimulatorMode::Complete);
    let (status, body) = app.call("GET", "/api/v1/wallet", None, None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");

    let (status, _) = app.user("GET", "/api/v1/wallet", 0, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_require_operator() {
    let app = TestApp::new(SimulatorMode::Complete);
    let (status, _) = app
        .user("GET", "/api/v1/admin/monitoring", 1, None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.admin("GET", "/api/v1/admin/monitoring", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["metrics"].is_object());
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let app = TestApp::new(SimulatorMode::Complete);
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-abc")
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(request).await.unwrap();

    assert_eq!(
        response.headers().get("x-request-id").unwrap(),
        "req-abc"
    );
}

// ============================================================================
// Wallets and card payments
// ============================================================================

#[tokio::test]
async fn test_open_wallet_and_unknown_wallet() {
    let app = TestApp::new(SimulatorMode::Complete);

    let (status, body) = app.user("GET", "/api/v1/wallet", 7, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "WALLET_NOT_FOUND");

    app.open_wallet(7).await;
    assert_eq!(app.balance(7).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_completed_card_payment_is_credited() {
    let app = TestApp::new(SimulatorMode::Complete);
    app.open_wallet(1).await;

    let (status, body) = app.card_payment(1, "250.00").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["success"], true);
    assert_eq!(body["deposit_status"], "APPROVED");
    assert_eq!(app.balance(1).await, money(250_00));

    let (status, history) = app
        .user("GET", "/api/v1/wallet/history?page=1&limit=10", 1, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["items"].as_array().unwrap().len(), 1);

    let transaction_id = body["transaction_id"].as_str().unwrap();
    let (status, _) = app
        .user("GET", &format!("/api/v1/payments/{transaction_id}"), 1, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = app
        .user("GET", &format!("/api/v1/payments/{transaction_id}"), 2, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_declined_card_returns_payment_required() {
    let app = TestApp::new(SimulatorMode::Decline {
        code: "3001".to_string(),
        message: "The card was declined".to_string(),
    });
    app.open_wallet(1).await;

    let (status, body) = app.card_payment(1, "100.00").await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "3001");
    assert_eq!(app.balance(1).await, Decimal::ZERO);
}

#[tokio::test]
async fn test_gateway_outage_returns_bad_gateway() {
    let app = TestApp::new(SimulatorMode::Unavailable);
    app.open_wallet(1).await;

    let (status, body) = app.card_payment(1, "100.00").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["deposit_status"], "PENDING");
}

#[tokio::test]
async fn test_invalid_amounts_are_rejected() {
    let app = TestApp::new(SimulatorMode::Complete);
    app.open_wallet(1).await;

    let (status, body) = app.card_payment(1, "5.00").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "AMOUNT_OUT_OF_RANGE");

    let (status, body) = app.card_payment(1, "10.001").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_AMOUNT");
    assert!(app.gateway.issued_charges().await.is_empty());
}

// ============================================================================
// Webhooks
// ============================================================================

#[tokio::test]
async fn test_signed_webhook_releases_pending_card() {
    let app = TestApp::new(SimulatorMode::Pending);
    app.open_wallet(1).await;

    let (status, body) = app.card_payment(1, "120.00").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["deposit_status"], "PENDING");
    let charge_id = body["external_charge_id"].as_str().unwrap().to_string();

    let (event, signature) = signed_event(&charge_id, "charge.succeeded", money(120_00));
    let (status, ack) = app.webhook(&event, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "updated");
    assert_eq!(ack["approval"], "approved");
    assert_eq!(app.balance(1).await, money(120_00));

    let (status, ack) = app.webhook(&event, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "duplicate");
    assert_eq!(app.balance(1).await, money(120_00));
}

#[tokio::test]
async fn test_webhook_signature_is_enforced() {
    let app = TestApp::new(SimulatorMode::Pending);
    app.open_wallet(1).await;
    let (_, body) = app.card_payment(1, "50.00").await;
    let charge_id = body["external_charge_id"].as_str().unwrap().to_string();
    let (event, _) = signed_event(&charge_id, "charge.succeeded", money(50_00));

    let (status, body) = app.webhook(&event, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "INVALID_SIGNATURE");

    let (status, _) = app.webhook(&event, Some(&"0".repeat(64))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.balance(1).await, Decimal::ZERO);
}

#[test]
fn test_library_signature_matches_gateway_scheme() {
    let body = br#"{"type":"verification","verification_code":"abc"}"#;
    assert_eq!(
        perlas_wallet::webhook::sign(WEBHOOK_SECRET, body).unwrap(),
        gateway_signature(body)
    );
}

#[tokio::test]
async fn test_verification_ping_is_acknowledged() {
    let app = TestApp::new(SimulatorMode::Pending);
    let body = br#"{"type":"verification","verification_code":"vc_123"}"#;
    let (status, ack) = app.webhook(body, Some(&gateway_signature(body))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "verification");
}

#[tokio::test]
async fn test_unknown_charge_and_malformed_payloads() {
    let app = TestApp::new(SimulatorMode::Pending);

    let (event, signature) = signed_event("sim_unknown", "charge.succeeded", money(10_00));
    let (status, ack) = app.webhook(&event, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["outcome"], "unknown_charge");

    let garbage = b"not json";
    let signature = gateway_signature(garbage);
    let (status, body) = app.webhook(garbage, Some(&signature)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "MALFORMED_PAYLOAD");
}

// ============================================================================
// Deposits and operator decisions
// ============================================================================

#[tokio::test]
async fn test_manual_deposit_confirmed_by_operator() {
    let app = TestApp::new(SimulatorMode::Complete);
    app.open_wallet(3).await;

    let (status, body) = app
        .user(
            "POST",
            "/api/v1/deposits",
            3,
            Some(json!({ "amount": "300.00", "payment_method": "MANUAL_DEPOSIT" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let reference = body["reference_code"].as_str().unwrap().to_string();
    let validation = body["validation_code"].as_str().unwrap().to_string();

    let (status, _) = app
        .admin(
            "POST",
            "/api/v1/admin/deposits/confirm",
            Some(json!({ "reference_code": reference, "validation_code": "000000" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, approval) = app
        .admin(
            "POST",
            "/api/v1/admin/deposits/confirm",
            Some(json!({ "reference_code": reference, "validation_code": validation })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approval["outcome"], "approved");
    assert_eq!(approval["deposit"]["validated_by"], "ops-1");
    assert_eq!(dec(&approval["balance"]), money(300_00));

    let (status, body) = app
        .admin(
            "POST",
            "/api/v1/admin/deposits/confirm",
            Some(json!({ "reference_code": reference, "validation_code": validation })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "REFERENCE_USED");
    assert_eq!(app.balance(3).await, money(300_00));
}

#[tokio::test]
async fn test_card_deposit_route_needs_source() {
    let app = TestApp::new(SimulatorMode::Complete);
    app.open_wallet(1).await;

    let (status, body) = app
        .user(
            "POST",
            "/api/v1/deposits",
            1,
            Some(json!({ "amount": "100.00", "payment_method": "CARD" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "CARD_SOURCE_REQUIRED");
}

#[tokio::test]
async fn test_bank_transfer_rejected_by_operator() {
    let app = TestApp::new(SimulatorMode::Complete);
    app.open_wallet(2).await;

    let (status, body) = app
        .user(
            "POST",
            "/api/v1/payments/bank-transfer",
            2,
            Some(json!({ "amount": "400.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["payment_instructions"]["clabe"].is_string());
    let deposit_id = body["deposit_id"].as_str().unwrap().to_string();

    let (status, body) = app
        .admin(
            "POST",
            &format!("/api/v1/admin/deposits/{deposit_id}/approve"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, body) = app
        .admin(
            "POST",
            &format!("/api/v1/admin/deposits/{deposit_id}/reject"),
            Some(json!({ "reason": "duplicate" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "DEPOSIT_NOT_PENDING");

    let (status, deposit) = app
        .user("GET", &format!("/api/v1/deposits/{deposit_id}"), 2, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deposit["status"], "APPROVED");
    let (status, _) = app
        .user("GET", &format!("/api/v1/deposits/{deposit_id}"), 9, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_completed_webhook_on_frozen_wallet_waits_for_operator() {
    let app = TestApp::new(SimulatorMode::Pending);
    app.open_wallet(5).await;
    let (_, body) = app.card_payment(5, "80.00").await;
    let charge_id = body["external_charge_id"].as_str().unwrap().to_string();
    let deposit_id = body["deposit_id"].as_str().unwrap().to_string();

    let (status, _) = app
        .admin(
            "POST",
            "/api/v1/admin/wallets/5/freeze",
            Some(json!({ "reason": "chargeback investigation" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (event, signature) = signed_event(&charge_id, "charge.succeeded", money(80_00));
    let (status, ack) = app.webhook(&event, Some(&signature)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["approval"], "wallet_blocked");

    let approve_uri = format!("/api/v1/admin/deposits/{deposit_id}/approve");
    let (status, body) = app.admin("POST", &approve_uri, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "WALLET_FROZEN");

    let (status, _) = app
        .admin("POST", "/api/v1/admin/wallets/5/unfreeze", None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.admin("POST", &approve_uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deposit"]["validated_by"], "ops-1");
    assert_eq!(app.balance(5).await, money(80_00));
}

#[tokio::test]
async fn test_expire_sweep_returns_nothing_when_fresh() {
    let app = TestApp::new(SimulatorMode::Pending);
    app.open_wallet(1).await;
    app.card_payment(1, "20.00").await;

    let (status, body) = app
        .admin("POST", "/api/v1/admin/deposits/expire", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expired"], 0);
}

// ============================================================================
// Transfers and withdrawals
// ============================================================================

#[tokio::test]
async fn test_transfer_charges_sender_commission() {
    let app = TestApp::new(SimulatorMode::Complete);
    app.open_wallet(1).await;
    app.open_wallet(2).await;
    app.card_payment(1, "500.00").await;

    let (status, receipt) = app
        .user(
            "POST",
            "/api/v1/transfers",
            1,
            Some(json!({ "to_user_id": 2, "amount": "100.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(dec(&receipt["commission"]["amount"]), money(5_00));
    assert_eq!(app.balance(1).await, money(395_00));
    assert_eq!(app.balance(2).await, money(100_00));

    let (status, body) = app
        .user(
            "POST",
            "/api/v1/transfers",
            2,
            Some(json!({ "to_user_id": 1, "amount": "100.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "INSUFFICIENT_FUNDS");

    let (status, body) = app
        .user(
            "POST",
            "/api/v1/transfers",
            1,
            Some(json!({ "to_user_id": 1, "amount": "1.00" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "SAME_WALLET");
}

#[tokio::test]
async fn test_transfer_beyond_decimal_range_is_bad_request() {
    let app = TestApp::new(SimulatorMode::Complete);
    app.open_wallet(1).await;
    app.open_wallet(2).await;

    let (status, body) = app
        .user(
            "POST",
            "/api/v1/transfers",
            1,
            Some(json!({ "to_user_id": 2, "amount": "79228162514264337593543950335" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_AMOUNT");
}

#[tokio::test]
async fn test_rejected_withdrawal_is_refunded() {
    let app = TestApp::new(SimulatorMode::Complete);
    app.open_wallet(4).await;
    app.card_payment(4, "500.00").await;

    let destination = json!({
        "bank_name": "BBVA",
        "account_holder": "Ana Pérez",
        "clabe": "012180015555555555",
    });
    let (status, withdrawal) = app
        .user(
            "POST",
            "/api/v1/withdrawals",
            4,
            Some(json!({ "amount": "200.00", "destination": destination })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(dec(&withdrawal["commission"]), money(6_00));
    assert_eq!(app.balance(4).await, money(300_00));
    let withdrawal_id = withdrawal["id"].as_str().unwrap().to_string();

    let (status, _) = app
        .user("GET", &format!("/api/v1/withdrawals/{withdrawal_id}"), 5, None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, rejected) = app
        .admin(
            "POST",
            &format!("/api/v1/admin/withdrawals/{withdrawal_id}/reject"),
            Some(json!({ "reason": "account holder mismatch" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(rejected["status"], "REJECTED");
    assert_eq!(app.balance(4).await, money(500_00));

    let (status, body) = app
        .admin(
            "POST",
            &format!("/api/v1/admin/withdrawals/{withdrawal_id}/complete"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "WITHDRAWAL_NOT_PENDING");
}

#[tokio::test]
async fn test_withdrawal_to_invalid_clabe_is_rejected() {
    let app = TestApp::new(SimulatorMode::Complete);
    app.open_wallet(4).await;
    app.card_payment(4, "500.00").await;

    let (status, body) = app
        .user(
            "POST",
            "/api/v1/withdrawals",
            4,
            Some(json!({
                "amount": "200.00",
                "destination": { "bank_name": "BBVA", "account_holder": "Ana", "clabe": "1234" },
            })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "INVALID_DESTINATION");
    assert_eq!(app.balance(4).await, money(500_00));
}

// ============================================================================
// Ledger integrity
// ============================================================================

#[tokio::test]
async fn test_verify_places_hold_on_drift() {
    let app = TestApp::new(SimulatorMode::Complete);
    app.open_wallet(6).await;
    app.card_payment(6, "100.00").await;

    let (status, check) = app
        .admin("GET", "/api/v1/admin/wallets/6/verify", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["consistent"], true);
    assert_eq!(check["hold_placed"], false);

    app.store.overwrite_wallet_balance(6, money(999_00)).await;
    let (status, check) = app
        .admin("GET", "/api/v1/admin/wallets/6/verify", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(check["consistent"], false);
    assert_eq!(check["hold_placed"], true);
    assert_eq!(dec(&check["ledger_balance"]), money(100_00));

    let (status, body) = app.card_payment(6, "50.00").await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["deposit_status"], "PENDING");

    let (status, wallet) = app
        .admin("POST", "/api/v1/admin/wallets/6/release", None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wallet["review_hold"], false);
}
