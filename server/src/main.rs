//! Blood bank HTTP server.
//!
//! Wires a stock ledger and a request store (in-memory or `PostgreSQL`) into
//! the allocator and serves the HTTP API. On `PostgreSQL` the allocator
//! commits both sides of every mutation in one transaction.

mod config;
mod seed;

use anyhow::Context;
use bloodbank_core::{
    Allocator, Clock, InMemoryRequestStore, InMemoryStockLedger, RequestStore, StockLedger,
    SystemClock, TransactionalBank,
};
use bloodbank_postgres::{PostgresBloodBank, PostgresRequestStore, PostgresStockLedger};
use bloodbank_web::{AppState, build_router};
use config::{Backend, Config};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::{sync::Arc, time::Duration};
use tokio::{signal, sync::oneshot};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,bloodbank=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting blood bank server");

    let config = Config::from_env()?;
    info!(
        address = %config.bind_address(),
        backend = backend_name(&config.backend),
        seed = ?config.seed,
        "Configuration loaded"
    );

    // Metrics recorder, rendered by GET /metrics
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    bloodbank_core::metrics::register_metrics();

    let backend = build_backend(&config.backend).await?;

    let seeded = seed::apply(backend.ledger.as_ref(), &config.seed).await?;
    if seeded > 0 {
        info!(units = seeded, "Inventory seeded");
    }

    let state = AppState::new(backend.into_allocator()).with_metrics(metrics);
    let app = build_router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    // Run server with graceful shutdown
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    let timeout = Duration::from_secs(config.server.shutdown_timeout);
    match tokio::time::timeout(timeout, server).await {
        Ok(joined) => joined.context("server task panicked")??,
        Err(_) => warn!(
            timeout_secs = config.server.shutdown_timeout,
            "In-flight requests did not finish before the shutdown timeout"
        ),
    }

    info!("Server stopped");
    Ok(())
}

const fn backend_name(backend: &Backend) -> &'static str {
    match backend {
        Backend::Memory => "memory",
        Backend::Postgres { .. } => "postgres",
    }
}

/// Storage for the configured backend, before it is handed to the allocator.
struct Storage {
    ledger: Arc<dyn StockLedger>,
    store: Arc<dyn RequestStore>,
    bank: Option<Arc<dyn TransactionalBank>>,
}

impl Storage {
    fn into_allocator(self) -> Allocator {
        match self.bank {
            Some(bank) => Allocator::transactional(bank, self.ledger, self.store),
            None => Allocator::new(self.ledger, self.store),
        }
    }
}

/// Build the ledger and store for the configured backend.
async fn build_backend(backend: &Backend) -> anyhow::Result<Storage> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    match backend {
        Backend::Memory => {
            warn!("Using the in-memory backend; stock and requests are lost on restart");
            Ok(Storage {
                ledger: Arc::new(InMemoryStockLedger::new(Arc::clone(&clock))),
                store: Arc::new(InMemoryRequestStore::new(clock)),
                bank: None,
            })
        },
        Backend::Postgres {
            url,
            max_connections,
        } => {
            info!("Connecting to database...");
            let pool = bloodbank_postgres::connect(url, *max_connections)
                .await
                .context("failed to connect to PostgreSQL")?;
            bloodbank_postgres::migrate(&pool)
                .await
                .context("failed to run migrations")?;
            info!("Database connected and migrated");

            Ok(Storage {
                ledger: Arc::new(PostgresStockLedger::new(pool.clone(), Arc::clone(&clock))),
                store: Arc::new(PostgresRequestStore::new(pool.clone(), Arc::clone(&clock))),
                bank: Some(Arc::new(PostgresBloodBank::new(pool, clock))),
            })
        },
    }
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
