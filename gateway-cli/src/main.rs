// gateway-cli/src/main.rs
// ============================================================================
// Module: Gateway CLI Entry Point
// Description: Process entrypoint: loads settings, wires every collaborator,
//              and runs the HTTP server alongside the background workers.
// Purpose: One binary that starts the whole gateway from a config file and a
//          handful of environment overrides.
// Dependencies: clap, gateway-config, gateway-core, gateway-delivery,
//               gateway-providers, gateway-sandbox, gateway-server,
//               gateway-store-sqlite, reqwest, thiserror, tokio,
//               tracing-subscriber.
// ============================================================================

//! ## Overview
//! `serve` is the only thing this binary does: load [`GatewaySettings`],
//! build the durable store (in-memory or SQLite, per `store.backend`),
//! build the sandbox/auth/rate-limit/HTTP collaborators, assemble a
//! [`DeliveryEngine`], spawn the background workers, and run the HTTP
//! surface until the process receives a shutdown signal.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gateway_config::GatewaySettings;
use gateway_config::StoreConfig;
use gateway_core::interfaces::AuditStore;
use gateway_core::interfaces::ConfigStore;
use gateway_core::interfaces::DlqStore;
use gateway_core::interfaces::ExecutionLogStore;
use gateway_core::interfaces::ScheduleStore;
use gateway_core::interfaces::Sandbox;
use gateway_core::runtime::InMemoryAuditStore;
use gateway_core::runtime::InMemoryConfigStore;
use gateway_core::runtime::InMemoryDlqStore;
use gateway_core::runtime::InMemoryExecutionLogStore;
use gateway_core::runtime::InMemoryScheduleStore;
use gateway_delivery::DeliveryEngine;
use gateway_delivery::EventDispatcher;
use gateway_delivery::RetryWorker;
use gateway_delivery::ScheduleWorker;
use gateway_delivery::TracingMetrics;
use gateway_delivery::Watchdog;
use gateway_delivery::WorkerConfig as DeliveryWorkerConfig;
use gateway_delivery::Workers;
use gateway_delivery::fetch::GatewayDataSource;
use gateway_providers::AuthProvider;
use gateway_providers::RateLimiter;
use gateway_providers::TargetPolicy;
use gateway_providers::build_client;
use gateway_sandbox::QuickJsSandbox;
use gateway_server::AppState;
use gateway_server::GatewayServer;
use gateway_store_sqlite::GatewaySqliteStore;
use gateway_store_sqlite::SqliteStoreConfig;
use thiserror::Error;

mod source;

use source::NullEventSource;

/// Command-line flags and environment overrides for the gateway process.
#[derive(Parser, Debug)]
#[command(name = "gateway", about = "Runs the integration gateway HTTP surface and background workers.")]
struct Cli {
    /// Path to `gateway.toml`; defaults to `$GATEWAY_CONFIG` or `gateway.toml`.
    #[arg(long, env = "GATEWAY_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Overrides `server.bind_addr`'s port.
    #[arg(long, env = "PORT")]
    port: Option<u16>,
    /// Event-source connection string; no concrete driver is wired yet, so a
    /// configured value is accepted but only logged.
    #[arg(long, env = "SOURCE_URI")]
    source_uri: Option<String>,
    /// Overrides the store backend: `memory`, or a `sqlite://` path.
    #[arg(long, env = "STORE_URI")]
    store_uri: Option<String>,
    /// Overrides `auth.api_key`.
    #[arg(long, env = "API_KEY")]
    api_key: Option<String>,
    /// Overrides `auth.jwt_secret`.
    #[arg(long, env = "JWT_SECRET")]
    jwt_secret: Option<String>,
}

/// Top-level CLI failure.
#[derive(Debug, Error)]
enum CliError {
    /// Settings could not be loaded or validated.
    #[error("failed to load settings: {0}")]
    Settings(#[from] gateway_config::SettingsError),
    /// The SQLite store could not be opened.
    #[error("failed to open sqlite store: {0}")]
    Store(#[from] gateway_store_sqlite::SqliteStoreError),
    /// The sandbox runtime could not be initialized.
    #[error("failed to init sandbox: {0}")]
    Sandbox(#[from] gateway_sandbox::SandboxInitError),
    /// The shared HTTP client could not be built.
    #[error("failed to build http client: {0}")]
    HttpClient(#[from] gateway_providers::TargetError),
    /// The HTTP server failed to bind or serve.
    #[error("server failed: {0}")]
    Server(#[from] gateway_server::GatewayServerError),
    /// `--store-uri` named an unsupported scheme.
    #[error("unsupported store uri: {0}")]
    InvalidStoreUri(String),
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "gateway exited with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_deref())?;
    apply_overrides(&mut settings, &cli)?;

    if let Some(source_uri) = &cli.source_uri {
        tracing::warn!(%source_uri, "no concrete event-source driver is wired in this deployment; ingestion will stay idle");
    }

    let stores = build_stores(&settings.store)?;
    let sandbox: Arc<dyn Sandbox> = Arc::new(QuickJsSandbox::new(usize_from_u64(settings.sandbox.memory_limit_bytes))?);
    let http = build_client(Duration::from_millis(30_000))?;
    let auth = Arc::new(AuthProvider::new(http.clone()));
    let rate_limiter = Arc::new(RateLimiter::new());
    let target_policy = TargetPolicy::new();
    let metrics = Arc::new(TracingMetrics);

    let engine = Arc::new(DeliveryEngine::new(
        Arc::clone(&stores.config),
        Arc::clone(&stores.log),
        Arc::clone(&stores.dlq),
        Arc::clone(&sandbox),
        auth,
        rate_limiter,
        http.clone(),
        target_policy,
        Arc::clone(&metrics) as Arc<dyn gateway_delivery::GatewayMetrics>,
    ));

    let dispatcher = Arc::new(EventDispatcher::new(
        Arc::clone(&stores.audit),
        Arc::clone(&stores.config),
        Arc::clone(&sandbox),
        Arc::clone(&engine),
        Arc::clone(&metrics) as Arc<dyn gateway_delivery::GatewayMetrics>,
    ));

    let retry_worker = Arc::new(RetryWorker::new(
        Arc::clone(&stores.dlq),
        Arc::clone(&stores.config),
        Arc::clone(&engine),
        Arc::clone(&metrics) as Arc<dyn gateway_delivery::GatewayMetrics>,
    ));

    let data_source = Arc::new(GatewayDataSource::new(http, None));
    let schedule_worker = Arc::new(ScheduleWorker::new(
        Arc::clone(&stores.schedule),
        Arc::clone(&stores.config),
        Arc::clone(&engine),
        data_source,
        Arc::clone(&metrics) as Arc<dyn gateway_delivery::GatewayMetrics>,
    ));

    let watchdog = Arc::new(Watchdog::new(
        Arc::clone(&stores.audit),
        Arc::clone(&metrics) as Arc<dyn gateway_delivery::GatewayMetrics>,
        i64_from_u64(settings.workers.stuck_threshold_ms),
    ));

    let worker_config = DeliveryWorkerConfig {
        ingest_interval: Duration::from_millis(settings.workers.source_poll_interval_ms),
        ingest_batch_size: 100,
        retry_interval: Duration::from_millis(settings.workers.retry_poll_interval_ms),
        retry_batch_size: 50,
        schedule_interval: Duration::from_millis(settings.workers.schedule_poll_interval_ms),
        schedule_batch_size: 50,
        watchdog_interval: Duration::from_millis(settings.workers.watchdog_interval_ms),
    };
    let handles = Workers::spawn_all(worker_config, Arc::new(NullEventSource), Arc::clone(&dispatcher), retry_worker, schedule_worker, watchdog);

    let state = AppState {
        engine,
        dispatcher,
        config_store: stores.config,
        audit_store: stores.audit,
        dlq_store: stores.dlq,
        log_store: stores.log,
        auth: settings.auth.clone(),
    };
    let server = GatewayServer::new(state).with_max_body_bytes(settings.server.max_body_bytes);

    let bind_addr = settings.server.bind_addr.clone();
    tokio::select! {
        result = server.serve(&bind_addr) => result?,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    handles.shutdown().await;
    Ok(())
}

/// Loads settings from `path`, or from defaults when no config file exists
/// and the caller did not name one explicitly.
fn load_settings(path: Option<&std::path::Path>) -> Result<GatewaySettings, CliError> {
    match GatewaySettings::load(path) {
        Ok(settings) => Ok(settings),
        Err(gateway_config::SettingsError::Io(_)) if path.is_none() => Ok(GatewaySettings::default()),
        Err(err) => Err(err.into()),
    }
}

fn apply_overrides(settings: &mut GatewaySettings, cli: &Cli) -> Result<(), CliError> {
    if let Some(port) = cli.port {
        let host = settings.server.bind_addr.rsplit_once(':').map_or("0.0.0.0", |(host, _)| host);
        settings.server.bind_addr = format!("{host}:{port}");
    }
    if let Some(store_uri) = &cli.store_uri {
        if let Some(path) = store_uri.strip_prefix("sqlite://") {
            settings.store = StoreConfig::Sqlite(gateway_config::SqliteStoreSettings {
                path: PathBuf::from(path),
                busy_timeout_ms: 5_000,
                journal_mode: gateway_store_sqlite::SqliteStoreMode::default(),
                sync_mode: gateway_store_sqlite::SqliteSyncMode::default(),
            });
        } else if store_uri == "memory" {
            settings.store = StoreConfig::Memory;
        } else {
            return Err(CliError::InvalidStoreUri(store_uri.clone()));
        }
    }
    if let Some(api_key) = &cli.api_key {
        settings.auth.api_key = Some(api_key.clone());
    }
    if let Some(jwt_secret) = &cli.jwt_secret {
        settings.auth.jwt_secret = Some(jwt_secret.clone());
    }
    Ok(())
}

/// The five store trait handles the rest of the process needs.
struct Stores {
    config: Arc<dyn ConfigStore>,
    audit: Arc<dyn AuditStore>,
    log: Arc<dyn ExecutionLogStore>,
    dlq: Arc<dyn DlqStore>,
    schedule: Arc<dyn ScheduleStore>,
}

fn build_stores(config: &StoreConfig) -> Result<Stores, CliError> {
    match config {
        StoreConfig::Memory => Ok(Stores {
            config: Arc::new(InMemoryConfigStore::new()),
            audit: Arc::new(InMemoryAuditStore::new()),
            log: Arc::new(InMemoryExecutionLogStore::new()),
            dlq: Arc::new(InMemoryDlqStore::new()),
            schedule: Arc::new(InMemoryScheduleStore::new()),
        }),
        StoreConfig::Sqlite(settings) => {
            let store = Arc::new(GatewaySqliteStore::open(SqliteStoreConfig {
                path: settings.path.clone(),
                busy_timeout_ms: settings.busy_timeout_ms,
                journal_mode: settings.journal_mode,
                sync_mode: settings.sync_mode,
            })?);
            Ok(Stores {
                config: Arc::clone(&store) as Arc<dyn ConfigStore>,
                audit: Arc::clone(&store) as Arc<dyn AuditStore>,
                log: Arc::clone(&store) as Arc<dyn ExecutionLogStore>,
                dlq: Arc::clone(&store) as Arc<dyn DlqStore>,
                schedule: store as Arc<dyn ScheduleStore>,
            })
        }
    }
}

const fn usize_from_u64(value: u64) -> usize {
    value as usize
}

const fn i64_from_u64(value: u64) -> i64 {
    value as i64
}
