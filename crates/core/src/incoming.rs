//! Inbound calls to provisioned numbers.

use serde::Serialize;

use crate::phone::PhoneNormalizer;
use crate::status::CallLineStatus;
use crate::types::Timestamp;

/// An inbound call as reported by the carrier, numbers in canonical form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundCall {
    pub external_call_id: String,
    pub from_number: String,
    pub to_number: String,
    pub status: CallLineStatus,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub duration_secs: Option<i32>,
    pub recording_url: Option<String>,
}

/// Raw inbound call fields before canonicalization.
#[derive(Debug, Clone, Default)]
pub struct RawInboundCall<'a> {
    pub external_call_id: &'a str,
    pub from: &'a str,
    pub to: &'a str,
    pub status: Option<&'a str>,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub duration_secs: Option<i32>,
    pub recording_url: Option<&'a str>,
}

/// Why an inbound record was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingCallId,
    /// From and To normalize to the same number: a carrier loopback, not a
    /// real call.
    SelfCall,
}

impl InboundCall {
    /// Canonicalize a raw record, discarding garbage signals.
    pub fn accept(raw: RawInboundCall<'_>, phones: &PhoneNormalizer) -> Result<Self, Rejection> {
        let external_call_id = raw.external_call_id.trim();
        if external_call_id.is_empty() {
            return Err(Rejection::MissingCallId);
        }

        let from_number = phones.normalize(raw.from);
        let to_number = phones.normalize(raw.to);
        if from_number == to_number {
            return Err(Rejection::SelfCall);
        }

        Ok(Self {
            external_call_id: external_call_id.to_string(),
            from_number,
            to_number,
            status: raw
                .status
                .map(CallLineStatus::unify)
                .unwrap_or(CallLineStatus::Pending),
            started_at: raw.started_at,
            ended_at: raw.ended_at,
            duration_secs: raw.duration_secs.filter(|d| *d >= 0),
            recording_url: raw
                .recording_url
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(str::to_string),
        })
    }
}
