//! Recording lookup on the carrier.
//!
//! Campaign calls are placed by the campaign platform through the carrier,
//! and the carrier records the leg the other way round: its `From` is the
//! contact and its `To` is our dialing number. The resolver therefore
//! queries with the parties swapped first and falls back to the engine's
//! own orientation once.

use std::sync::Arc;

use callsync_core::phone::PhoneNormalizer;
use callsync_core::recording::{search_window, select_closest, RecordingCandidate};
use callsync_core::types::Timestamp;
use callsync_upstream::{CallSearch, CarrierGateway, GatewayError};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};

use crate::settings::SyncSettings;

/// One recording to resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingRequest {
    pub destination: String,
    pub origin: String,
    pub approx: Timestamp,
}

/// Finds the recording of a call from its parties and approximate time.
pub struct RecordingResolver {
    carrier: Arc<dyn CarrierGateway>,
    phones: PhoneNormalizer,
    half_width: chrono::Duration,
    batch_size: usize,
}

impl RecordingResolver {
    pub fn new(carrier: Arc<dyn CarrierGateway>, settings: &SyncSettings) -> Self {
        Self {
            carrier,
            phones: settings.phones.clone(),
            half_width: settings.recording_half_width(),
            batch_size: settings.recording_batch_size.max(1),
        }
    }

    /// URL of the recording closest to `approx`, or `None` on a miss.
    ///
    /// Carrier failures count as a miss; this never errors.
    pub async fn resolve(
        &self,
        destination: &str,
        origin: &str,
        approx: Timestamp,
    ) -> Option<String> {
        let destination = self.phones.trunk_form(destination);
        let origin = self.phones.trunk_form(origin);
        if destination.is_empty() && origin.is_empty() {
            return None;
        }

        if let Some(url) = self.search(&destination, &origin, approx).await {
            return Some(url);
        }
        tracing::debug!(destination = %destination, "Swapped recording search missed, retrying unswapped");
        self.search(&origin, &destination, approx).await
    }

    /// Resolve many recordings, at most `recording_batch_size` at a time.
    /// Results are in request order.
    pub async fn resolve_many(&self, requests: Vec<RecordingRequest>) -> Vec<Option<String>> {
        stream::iter(requests)
            .map(|r| async move { self.resolve(&r.destination, &r.origin, r.approx).await })
            .buffered(self.batch_size)
            .collect()
            .await
    }

    /// Download recording bytes.
    pub async fn fetch_recording(&self, url: &str) -> Result<Vec<u8>, GatewayError> {
        self.carrier.fetch_recording(url).await
    }

    async fn search(&self, from: &str, to: &str, approx: Timestamp) -> Option<String> {
        let mut search = CallSearch::new(search_window(approx, self.half_width));
        if !from.is_empty() {
            search = search.from_number(from);
        }
        if !to.is_empty() {
            search = search.to_number(to);
        }

        let calls = match self.carrier.search_calls(&search).await {
            Ok(calls) => calls,
            Err(e) => {
                tracing::warn!(from, to, error = %e, "Recording search failed");
                return None;
            }
        };
        let candidates: Vec<RecordingCandidate> = calls.iter().map(|c| c.as_candidate()).collect();
        select_closest(&candidates, approx).and_then(|c| c.recording_url.clone())
    }
}
