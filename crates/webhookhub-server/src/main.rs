mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use webhookhub_api::cleanup::SWEEP_PERIOD;
use webhookhub_api::{AppStateInner, dashboard_router, ingest_router};
use webhookhub_db::Database;
use webhookhub_ingest::{Normalizer, ParserRegistry};
use webhookhub_notify::Dispatcher;

use crate::config::Config;

/// How long shutdown waits for in-flight notification dispatches.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(20);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "webhookhub=debug,webhookhub_db=info,tower_http=debug".into()),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: {e:#}");
            eprintln!("       Set it in your environment or .env file and restart.");
            std::process::exit(1);
        }
    };

    if let Some(parent) = config.db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    let db = Arc::new(Database::open(&config.db_path)?);

    let registry = ParserRegistry::default();
    info!("Payload parsers registered: {:?}", registry.keys());
    let dispatcher = Dispatcher::from_config(&config.notify);
    let state = AppStateInner::new(db, Normalizer::new(registry), dispatcher, config.api_key.clone());

    let shutdown = CancellationToken::new();
    let sweeper = state.sweeper.spawn(SWEEP_PERIOD, shutdown.clone());

    let dashboard_addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let ingest_addr: SocketAddr = format!("{}:{}", config.host, config.ingest_port).parse()?;
    let dashboard_listener = tokio::net::TcpListener::bind(dashboard_addr).await?;
    let ingest_listener = tokio::net::TcpListener::bind(ingest_addr).await?;
    info!("WebhookHub dashboard listening on {}", dashboard_addr);
    info!("WebhookHub ingest listening on {}", ingest_addr);
    if let Some(dir) = &config.static_dir {
        info!("Serving dashboard from {}", dir.display());
    }

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            shutdown_signal().await;
            shutdown.cancel();
        }
    });

    let dashboard = axum::serve(
        dashboard_listener,
        dashboard_router(state.clone(), config.static_dir.as_deref())
            .into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    let ingest = axum::serve(
        ingest_listener,
        ingest_router(state.clone()).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown.clone().cancelled_owned());

    // Either listener stopping stops the other.
    let (dashboard_result, ingest_result) = tokio::join!(
        async {
            let result = dashboard.await;
            shutdown.cancel();
            result
        },
        async {
            let result = ingest.await;
            shutdown.cancel();
            result
        },
    );

    if let Err(e) = sweeper.await {
        warn!("Retention sweeper task failed: {}", e);
    }

    state.tracker.close();
    if tokio::time::timeout(DRAIN_TIMEOUT, state.tracker.wait()).await.is_err() {
        warn!(
            "Gave up waiting for {} notification dispatches after {:?}",
            state.tracker.len(),
            DRAIN_TIMEOUT
        );
    }

    dashboard_result?;
    ingest_result?;
    info!("WebhookHub stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
