//! Perlas wallet server.
//!
//! Serves the wallet HTTP API over PostgreSQL, or over the in-memory store
//! when no database is configured.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Error};
use log::info;
use pico_args::Arguments;
use perlas_server::{api, config, logging, metrics};
use perlas_wallet::Engine;
use perlas_wallet::db::{Database, MemoryStore, Store};
use perlas_wallet::deposit::DepositManager;
use perlas_wallet::gateway::{SimulatedGateway, SimulatorMode};
use perlas_wallet::monitoring::{AlertSink, FanOutAlertSink, LogAlertSink, PaymentMonitor};

const HELP: &str = "\
Run the Perlas wallet server

USAGE:
  perlas_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:8080]
  --db-url     URL         Database connection string  [default: env DATABASE_URL, in-memory store when unset]

FLAGS:
  -h, --help               Print help information
  --require-signatures     Refuse to start without GATEWAY_WEBHOOK_SECRET

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  METRICS_BIND             Prometheus listener (e.g., 0.0.0.0:9090)
  GATEWAY_WEBHOOK_SECRET   Shared secret for webhook signatures
  GATEWAY_SIMULATOR_MODE   complete | pending | unavailable [default: pending]
  EXPIRY_SWEEP_SECS        Interval between stale deposit sweeps [default: 300]
  MONITOR_CHECK_SECS       Interval between payment alert checks [default: 60]
  (See .env file for all configuration options)
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    require_signatures: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs
            .opt_value_from_str("--bind")
            .context("Invalid --bind address")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        require_signatures: pargs.contains("--require-signatures"),
    };

    logging::init();

    let config = config::ServerConfig::from_env(args.bind, args.database_url)?;
    config.validate()?;
    if args.require_signatures {
        config::require_webhook_secret(&config)?;
    }
    if !config.engine.webhook.verification_enabled() {
        log::warn!("GATEWAY_WEBHOOK_SECRET not set: webhook signature verification is disabled");
    }

    if let Some(metrics_bind) = config.metrics_bind {
        metrics::init_metrics(metrics_bind).map_err(anyhow::Error::msg)?;
        info!("Prometheus metrics listening on {}", metrics_bind);
    }

    let (store, database): (Arc<dyn Store>, Option<Database>) = match &config.database {
        Some(db_config) => {
            info!("Connecting to database");
            let db = Database::new(db_config)
                .await
                .context("Failed to connect to database")?;
            db.migrate().await.context("Failed to run migrations")?;
            info!("Database connected and migrated");
            (Arc::new(db.store()), Some(db))
        }
        None => {
            log::warn!("DATABASE_URL not set: using the in-memory store, state is lost on exit");
            (Arc::new(MemoryStore::new()), None)
        }
    };

    let gateway_mode = simulator_mode_from_env();
    info!("Payment gateway: simulator ({:?})", gateway_mode);
    let alerts: Arc<dyn AlertSink> = Arc::new(FanOutAlertSink::new(vec![
        Arc::new(LogAlertSink),
        Arc::new(metrics::MetricsAlertSink),
    ]));

    let engine = Engine::new(
        store,
        Arc::new(SimulatedGateway::new(gateway_mode)),
        alerts,
        config.engine.clone(),
    );

    let sweeper = tokio::spawn(expiry_sweeper(
        engine.deposits.clone(),
        interval_from_env("EXPIRY_SWEEP_SECS", 300),
    ));
    let checker = tokio::spawn(alert_checker(
        engine.monitor.clone(),
        interval_from_env("MONITOR_CHECK_SECS", 60),
    ));

    let app = api::create_router(api::AppState {
        engine,
        database: database.clone(),
    });

    info!("Starting HTTP server on {}", config.bind);
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Shutting down server...");
    sweeper.abort();
    checker.abort();
    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

fn simulator_mode_from_env() -> SimulatorMode {
    match std::env::var("GATEWAY_SIMULATOR_MODE")
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "complete" => SimulatorMode::Complete,
        "unavailable" => SimulatorMode::Unavailable,
        _ => SimulatorMode::Pending,
    }
}

fn interval_from_env(key: &str, default_secs: u64) -> Duration {
    let secs = std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

/// Raise payment alerts through the sink on a fixed interval
async fn alert_checker(monitor: PaymentMonitor, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match monitor.check_alerts(chrono::Utc::now()).await {
            Ok(alerts) if !alerts.is_empty() => {
                info!("Payment monitor raised {} alert(s)", alerts.len());
            }
            Ok(_) => {}
            Err(e) => log::error!("Payment alert check failed: {}", e),
        }
    }
}

/// Expire stale deposits on a fixed interval
async fn expiry_sweeper(deposits: DepositManager, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        match deposits.expire_stale_requests().await {
            Ok(expired) if !expired.is_empty() => {
                info!("Expired {} stale deposit request(s)", expired.len());
            }
            Ok(_) => {}
            Err(e) => log::error!("Stale deposit sweep failed: {}", e),
        }
    }
}

/// Graceful shutdown on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
