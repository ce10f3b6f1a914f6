use criterion::{BatchSize, BenchmarkId, Criterion, criterion_group, criterion_main};
use perlas_wallet::db::MemoryStore;
use perlas_wallet::gateway::{SimulatedGateway, SimulatorMode};
use perlas_wallet::monitoring::LogAlertSink;
use perlas_wallet::reference::{DEPOSIT_PREFIX, generate_reference_code};
use perlas_wallet::wallet::TransactionType;
use perlas_wallet::webhook::sign;
use perlas_wallet::{Engine, EngineConfig};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::runtime::Runtime;

/// Engine over a fresh memory store with `users` funded wallets
async fn funded_engine(mode: SimulatorMode, users: i64) -> Engine {
    let engine = Engine::new(
        Arc::new(MemoryStore::new()),
        Arc::new(SimulatedGateway::new(mode)),
        Arc::new(LogAlertSink),
        EngineConfig::default(),
    );
    for user in 1..=users {
        engine.wallets.open_wallet(user, None, None).await.unwrap();
        engine
            .wallets
            .credit(user, Decimal::new(1_000_000, 2), TransactionType::GameWin, "Seed", None)
            .await
            .unwrap();
    }
    engine
}

/// Benchmark a single credit through the wallet manager
fn bench_credit(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = rt.block_on(funded_engine(SimulatorMode::Complete, 1));

    c.bench_function("wallet_credit", |b| {
        b.to_async(&rt).iter(|| async {
            engine
                .wallets
                .credit(1, Decimal::new(1_00, 2), TransactionType::GameWin, "Win", None)
                .await
                .unwrap()
        });
    });
}

/// Benchmark P2P transfers with commission
fn bench_transfer(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let engine = rt.block_on(funded_engine(SimulatorMode::Complete, 2));

    c.bench_function("transfer_with_commission", |b| {
        b.to_async(&rt).iter(|| async {
            engine
                .transfers
                .transfer(1, 2, Decimal::new(1_00, 2), Decimal::new(5, 2))
                .await
                .unwrap()
        });
    });
}

/// Benchmark a card payment that completes synchronously
fn bench_card_payment(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();

    c.bench_function("card_payment_complete", |b| {
        b.iter_batched(
            || rt.block_on(funded_engine(SimulatorMode::Complete, 1)),
            |engine| {
                rt.block_on(engine.payments.create_card_payment(
                    1,
                    Decimal::new(100_00, 2),
                    "tok_visa".to_string(),
                    None,
                ))
                .unwrap()
            },
            BatchSize::SmallInput,
        );
    });
}

/// Benchmark webhook reconciliation, including replays of the same event
fn bench_webhook_replays(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("webhook_replays");

    for replays in [1usize, 5, 20] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}_deliveries", replays)),
            &replays,
            |b, &replays| {
                b.iter_batched(
                    || {
                        rt.block_on(async {
                            let engine = funded_engine(SimulatorMode::Pending, 1).await;
                            let response = engine
                                .payments
                                .create_card_payment(1, Decimal::new(50_00, 2), "tok_visa".to_string(), None)
                                .await
                                .unwrap();
                            let body = serde_json::to_vec(&SimulatedGateway::webhook_event(
                                &response.external_charge_id.unwrap(),
                                "charge.succeeded",
                                Decimal::new(50_00, 2),
                            ))
                            .unwrap();
                            (engine, body)
                        })
                    },
                    |(engine, body)| {
                        rt.block_on(async {
                            for _ in 0..replays {
                                engine.webhooks.handle_webhook(&body, None).await.unwrap();
                            }
                        })
                    },
                    BatchSize::SmallInput,
                );
            },
        );
    }

    group.finish();
}

/// Benchmark reference generation and webhook signing
fn bench_codes(c: &mut Criterion) {
    let now = chrono::Utc::now();
    c.bench_function("reference_code", |b| {
        b.iter(|| generate_reference_code(DEPOSIT_PREFIX, now));
    });

    let body = vec![b'x'; 2048];
    c.bench_function("hmac_sign_2kb", |b| {
        b.iter(|| sign("whsec_bench", &body).unwrap());
    });
}

criterion_group!(ledger, bench_credit, bench_transfer);
criterion_group!(payments, bench_card_payment, bench_webhook_replays, bench_codes);
criterion_main!(ledger, payments);
