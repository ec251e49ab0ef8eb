//! Call line entity model and DTOs.

use callsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `call_lines` table: one attempted call to one contact.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct CallLine {
    pub id: DbId,
    pub campaign_id: DbId,
    pub external_call_id: Option<String>,
    /// Canonical destination number.
    pub destination_number: String,
    pub call_time: Option<Timestamp>,
    pub status: String,
    pub interaction: String,
    pub duration_secs: i32,
    pub recording_available: bool,
    pub recording_url: Option<String>,
    pub transcript: Option<String>,
    /// Latency, quality and linkage details.
    pub metadata: serde_json::Value,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a call line. `None` fields take column defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCallLine {
    pub campaign_id: DbId,
    pub external_call_id: Option<String>,
    pub destination_number: String,
    pub call_time: Option<Timestamp>,
    pub status: Option<String>,
    pub interaction: Option<String>,
    pub duration_secs: Option<i32>,
    pub recording_url: Option<String>,
    pub transcript: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// DTO for updating a call line. Present fields overwrite, absent fields
/// are left untouched; `metadata` keys are merged into the stored object.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdateCallLine {
    pub external_call_id: Option<String>,
    pub call_time: Option<Timestamp>,
    pub status: Option<String>,
    pub interaction: Option<String>,
    pub duration_secs: Option<i32>,
    pub recording_url: Option<String>,
    pub transcript: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl UpdateCallLine {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
