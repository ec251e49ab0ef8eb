//! Inbound call entity model and DTOs.

use callsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `incoming_calls` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct IncomingCall {
    pub id: DbId,
    pub external_call_id: String,
    pub from_number: String,
    pub to_number: String,
    pub status: String,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub duration_secs: i32,
    pub recording_url: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for upserting an inbound call keyed by `external_call_id`.
#[derive(Debug, Clone, Deserialize)]
pub struct UpsertIncomingCall {
    pub external_call_id: String,
    pub from_number: String,
    pub to_number: String,
    pub status: String,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub duration_secs: Option<i32>,
    pub recording_url: Option<String>,
}
