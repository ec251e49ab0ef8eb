//! Periodic campaign refresh for every configured scope.
//!
//! Each tick triggers the engine's background sync per scope. The engine's
//! coordinator deduplicates with any sync already started by a reader, so
//! a tick never doubles upstream traffic.

use std::time::Duration;

use callsync_sync::{SyncEngine, SyncFilters};
use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::config::SyncScope;

/// Run the refresh loop until `cancel` is triggered.
pub async fn run(
    engine: SyncEngine,
    scopes: Vec<SyncScope>,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        scopes = scopes.len(),
        interval_secs = interval.as_secs(),
        "Campaign sync loop started"
    );

    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Campaign sync loop stopping");
                break;
            }
            _ = interval.tick() => {
                tick(&engine, &scopes).await;
            }
        }
    }
}

/// Trigger every scope and wait for the outcomes.
pub async fn tick(engine: &SyncEngine, scopes: &[SyncScope]) {
    let handles = scopes.iter().map(|scope| {
        let filters = SyncFilters {
            user_id: scope.user_id,
            status: None,
        };
        let handle = engine.trigger_background_sync(&scope.key, filters);
        async move { (scope, handle.await) }
    });

    for (scope, outcome) in join_all(handles).await {
        match outcome {
            Ok(report) => tracing::debug!(
                scope = %scope.key,
                run_id = %report.run_id,
                persisted = report.campaigns.persisted(),
                errors = report.errors.len(),
                "Scope refreshed"
            ),
            Err(e) => tracing::warn!(scope = %scope.key, error = %e, "Scope refresh failed"),
        }
    }
}
