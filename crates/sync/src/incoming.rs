//! Inbound calls to provisioned numbers.

use std::sync::Arc;

use callsync_core::incoming::{InboundCall, RawInboundCall, Rejection};
use callsync_core::phone::PhoneNormalizer;
use callsync_core::types::Timestamp;
use callsync_db::models::incoming_call::UpsertIncomingCall;
use callsync_events::{names, DomainEvent, EventSink};
use callsync_upstream::{CallSearch, CarrierCall, CarrierGateway};
use serde::Serialize;

use crate::error::SyncError;
use crate::store::SyncStore;

/// Outcome of one inbound sync.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IncomingSummary {
    /// Records returned by the carrier.
    pub fetched: usize,
    /// Records inserted or refreshed.
    pub stored: usize,
    /// Garbage records dropped (self calls, missing ids) and failed writes.
    pub discarded: usize,
}

pub struct IncomingCallSync {
    carrier: Arc<dyn CarrierGateway>,
    store: Arc<dyn SyncStore>,
    events: Arc<dyn EventSink>,
    phones: PhoneNormalizer,
}

impl IncomingCallSync {
    pub fn new(
        carrier: Arc<dyn CarrierGateway>,
        store: Arc<dyn SyncStore>,
        events: Arc<dyn EventSink>,
        phones: PhoneNormalizer,
    ) -> Self {
        Self {
            carrier,
            store,
            events,
            phones,
        }
    }

    /// Pull calls made to `number` between `since` and `until` and upsert
    /// them by external call id. A failed carrier search is an error; a
    /// failed write only skips that record.
    pub async fn sync_incoming_calls(
        &self,
        number: &str,
        since: Timestamp,
        until: Timestamp,
    ) -> Result<IncomingSummary, SyncError> {
        let search = CallSearch::new((since, until)).to_number(self.phones.trunk_form(number));
        let calls = self.carrier.search_calls(&search).await?;

        let mut summary = IncomingSummary {
            fetched: calls.len(),
            ..Default::default()
        };

        for call in &calls {
            let inbound = match InboundCall::accept(raw(call), &self.phones) {
                Ok(inbound) => inbound,
                Err(reason) => {
                    summary.discarded += 1;
                    match reason {
                        Rejection::SelfCall => tracing::debug!(sid = %call.sid, "Self call discarded"),
                        Rejection::MissingCallId => tracing::debug!("Inbound call without id discarded"),
                    }
                    continue;
                }
            };

            let input = UpsertIncomingCall {
                external_call_id: inbound.external_call_id.clone(),
                from_number: inbound.from_number.clone(),
                to_number: inbound.to_number.clone(),
                status: inbound.status.as_str().to_string(),
                started_at: inbound.started_at,
                ended_at: inbound.ended_at,
                duration_secs: inbound.duration_secs,
                recording_url: inbound.recording_url.clone(),
            };
            match self.store.upsert_incoming_call(&input).await {
                Ok((record, inserted)) => {
                    summary.stored += 1;
                    let name = if inserted {
                        names::INCOMING_CALL_CREATED
                    } else {
                        names::INCOMING_CALL_UPDATED
                    };
                    self.events.publish(
                        DomainEvent::new(name)
                            .with_entity("incoming_call", record.id)
                            .with_record(&record),
                    );
                }
                Err(e) => {
                    summary.discarded += 1;
                    tracing::warn!(sid = %call.sid, error = %e, "Inbound call upsert failed");
                }
            }
        }

        tracing::info!(
            number = %number,
            fetched = summary.fetched,
            stored = summary.stored,
            discarded = summary.discarded,
            "Incoming calls synced"
        );
        Ok(summary)
    }
}

fn raw(call: &CarrierCall) -> RawInboundCall<'_> {
    RawInboundCall {
        external_call_id: &call.sid,
        from: &call.from,
        to: &call.to,
        status: call.status.as_deref(),
        started_at: call.start_time,
        ended_at: call.end_time,
        duration_secs: call.duration_secs,
        recording_url: call.recording_url.as_deref(),
    }
}
