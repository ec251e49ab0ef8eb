//! Campaign activity log model and DTOs.

use callsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Activity actions written by the engine.
pub mod actions {
    pub const CREATED: &str = "campaign.created";
    pub const COMPLETED: &str = "campaign.completed";
    pub const PAUSED: &str = "campaign.paused";
    pub const RESUMED: &str = "campaign.resumed";
    pub const RESCHEDULED: &str = "campaign.rescheduled";
    pub const CANCELLED: &str = "campaign.cancelled";
}

/// A row from the `campaign_activity_logs` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct ActivityLog {
    pub id: DbId,
    pub user_id: DbId,
    pub campaign_id: Option<DbId>,
    pub action: String,
    pub details: serde_json::Value,
    pub created_at: Timestamp,
}

/// DTO for appending an activity entry.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateActivityLog {
    pub user_id: DbId,
    pub campaign_id: Option<DbId>,
    pub action: String,
    pub details: serde_json::Value,
}
