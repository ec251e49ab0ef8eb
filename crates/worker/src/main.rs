use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use callsync_events::EventBus;
use callsync_sync::{PgStore, SyncEngine};
use callsync_upstream::{CampaignApi, CarrierApi};
use callsync_worker::background;
use callsync_worker::config::WorkerConfig;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "callsync_worker=info,callsync_sync=info".into());
    let registry = tracing_subscriber::registry().with(filter);
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    tracing::info!(
        scopes = config.sync_scopes.len(),
        interval_secs = config.sync_interval.as_secs(),
        "Loaded worker configuration"
    );

    // --- Database ---
    let pool = callsync_db::create_pool(&config.database_url)
        .await
        .context("Failed to connect to database")?;
    callsync_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    callsync_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Engine ---
    let campaign_api = CampaignApi::new(
        config.campaign_api_url.clone(),
        config.campaign_api_key.clone(),
        config.upstream_timeout,
    )
    .context("Failed to build campaign API client")?;
    let carrier_api = CarrierApi::new(
        &config.carrier_api_url,
        config.carrier_api_key.clone(),
        config.carrier_api_token.clone(),
        config.carrier_offset,
        config.upstream_timeout,
    )
    .context("Failed to build carrier API client")?;

    let event_bus = Arc::new(EventBus::default());
    let engine = SyncEngine::new(
        Arc::new(PgStore::new(pool)),
        event_bus.clone(),
        Arc::new(campaign_api),
        Arc::new(carrier_api),
        config.sync_settings(),
    );

    // --- Background loops ---
    let cancel = CancellationToken::new();
    let sync_handle = tokio::spawn(background::campaign_sync::run(
        engine.clone(),
        config.sync_scopes.clone(),
        config.sync_interval,
        cancel.clone(),
    ));
    let incoming_handle = tokio::spawn(background::incoming_calls::run(
        engine,
        config.incoming_numbers.clone(),
        config.incoming_lookback,
        config.sync_interval,
        cancel.clone(),
    ));
    tracing::info!("Worker started");

    shutdown_signal().await;

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(30), sync_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), incoming_handle).await;
    drop(event_bus);
    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
