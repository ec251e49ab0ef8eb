//! Periodic pull of inbound calls to the provisioned numbers.

use std::time::Duration;

use callsync_sync::SyncEngine;
use chrono::Utc;
use tokio_util::sync::CancellationToken;

/// Run the inbound-call loop until `cancel` is triggered. Each tick looks
/// back `lookback` from now; re-seen calls are upserted, not duplicated.
pub async fn run(
    engine: SyncEngine,
    numbers: Vec<String>,
    lookback: chrono::Duration,
    interval: Duration,
    cancel: CancellationToken,
) {
    if numbers.is_empty() {
        tracing::info!("No provisioned numbers, inbound call loop not started");
        return;
    }
    tracing::info!(
        numbers = numbers.len(),
        lookback_hours = lookback.num_hours(),
        "Inbound call loop started"
    );

    let mut interval = tokio::time::interval(interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Inbound call loop stopping");
                break;
            }
            _ = interval.tick() => {
                let until = Utc::now();
                let Some(since) = until.checked_sub_signed(lookback) else {
                    tracing::error!(
                        lookback_hours = lookback.num_hours(),
                        "Lookback out of calendar range, skipping tick"
                    );
                    continue;
                };
                for number in &numbers {
                    if let Err(e) = engine.sync_incoming_calls(number, since, until).await {
                        tracing::error!(number = %number, error = %e, "Inbound call sync failed");
                    }
                }
            }
        }
    }
}
