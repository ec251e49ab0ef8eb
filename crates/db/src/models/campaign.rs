//! Campaign entity model and DTOs.

use callsync_core::status::CampaignStatus;
use callsync_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// `sync_status` of a record mirrored from the campaign platform.
pub const SYNC_STATUS_SYNCED: &str = "synced";

/// `sync_status` of a record created locally that upstream has not acknowledged.
pub const SYNC_STATUS_LOCAL_ONLY: &str = "local_only";

/// A campaign row from the `campaigns` table.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Campaign {
    pub id: DbId,
    pub user_id: DbId,
    pub external_id: Option<String>,
    pub name: String,
    pub status: String,
    pub origin_number: Option<String>,
    pub agent_name: Option<String>,
    pub contact_numbers: Vec<String>,
    pub total_calls: i64,
    pub calls_made: i64,
    pub picked_up_calls: i64,
    pub completed_calls: i64,
    pub failed_calls: i64,
    pub busy_calls: i64,
    pub no_answer_calls: i64,
    pub transfer_calls: i64,
    pub low_interaction_calls: i64,
    pub cost: f64,
    pub scheduled_at: Option<Timestamp>,
    /// When the record was last confirmed against upstream.
    pub cached_at: Option<Timestamp>,
    pub sync_status: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Campaign {
    /// Typed lifecycle status. Unrecognized stored values read as pending.
    pub fn lifecycle(&self) -> CampaignStatus {
        CampaignStatus::from_db(&self.status).unwrap_or(CampaignStatus::Pending)
    }
}

/// DTO for inserting a campaign. Counters default to zero.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateCampaign {
    pub user_id: DbId,
    pub external_id: Option<String>,
    pub name: String,
    pub status: String,
    pub origin_number: Option<String>,
    pub agent_name: Option<String>,
    pub contact_numbers: Vec<String>,
    pub total_calls: Option<i64>,
    pub calls_made: Option<i64>,
    pub picked_up_calls: Option<i64>,
    pub completed_calls: Option<i64>,
    pub failed_calls: Option<i64>,
    pub busy_calls: Option<i64>,
    pub no_answer_calls: Option<i64>,
    pub transfer_calls: Option<i64>,
    pub low_interaction_calls: Option<i64>,
    pub cost: Option<f64>,
    pub scheduled_at: Option<Timestamp>,
    pub sync_status: String,
}

/// DTO for field-merging an existing campaign. `None` leaves the column unchanged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct UpdateCampaign {
    pub name: Option<String>,
    pub status: Option<String>,
    pub origin_number: Option<String>,
    pub agent_name: Option<String>,
    pub contact_numbers: Option<Vec<String>>,
    pub total_calls: Option<i64>,
    pub calls_made: Option<i64>,
    pub picked_up_calls: Option<i64>,
    pub completed_calls: Option<i64>,
    pub failed_calls: Option<i64>,
    pub busy_calls: Option<i64>,
    pub no_answer_calls: Option<i64>,
    pub transfer_calls: Option<i64>,
    pub low_interaction_calls: Option<i64>,
    pub cost: Option<f64>,
    pub scheduled_at: Option<Timestamp>,
    pub sync_status: Option<String>,
}

impl UpdateCampaign {
    /// True when the patch would not change any column.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the patch to an in-memory row (same semantics as the SQL update).
    pub fn apply_to(&self, campaign: &mut Campaign) {
        fn set<T: Clone>(slot: &mut T, value: &Option<T>) {
            if let Some(v) = value {
                *slot = v.clone();
            }
        }
        fn set_opt<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
            if value.is_some() {
                *slot = value.clone();
            }
        }

        set(&mut campaign.name, &self.name);
        set(&mut campaign.status, &self.status);
        set_opt(&mut campaign.origin_number, &self.origin_number);
        set_opt(&mut campaign.agent_name, &self.agent_name);
        set(&mut campaign.contact_numbers, &self.contact_numbers);
        set(&mut campaign.total_calls, &self.total_calls);
        set(&mut campaign.calls_made, &self.calls_made);
        set(&mut campaign.picked_up_calls, &self.picked_up_calls);
        set(&mut campaign.completed_calls, &self.completed_calls);
        set(&mut campaign.failed_calls, &self.failed_calls);
        set(&mut campaign.busy_calls, &self.busy_calls);
        set(&mut campaign.no_answer_calls, &self.no_answer_calls);
        set(&mut campaign.transfer_calls, &self.transfer_calls);
        set(&mut campaign.low_interaction_calls, &self.low_interaction_calls);
        set(&mut campaign.cost, &self.cost);
        set_opt(&mut campaign.scheduled_at, &self.scheduled_at);
        set(&mut campaign.sync_status, &self.sync_status);
    }
}
