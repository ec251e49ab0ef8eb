//! Persistence seam of the engine.
//!
//! Every write is scoped to one record identified by a stable key, so the
//! engine needs no locking of its own: uniqueness is enforced by the store
//! and surfaces as [`StoreError::Conflict`].

mod memory;
mod pg;

pub use memory::MemoryStore;
pub use pg::PgStore;

use async_trait::async_trait;
use callsync_core::status::CampaignStatus;
use callsync_core::types::DbId;
use callsync_db::models::activity_log::{ActivityLog, CreateActivityLog};
use callsync_db::models::call_line::{CallLine, CreateCallLine, UpdateCallLine};
use callsync_db::models::campaign::{Campaign, CreateCampaign, UpdateCampaign};
use callsync_db::models::incoming_call::{IncomingCall, UpsertIncomingCall};

/// Persistence failures as the engine sees them.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A unique key is already taken (duplicate insert).
    #[error("Duplicate key: {0}")]
    Conflict(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Persistence failure: {0}")]
    Backend(String),
}

/// Storage operations used by the reconcilers.
#[async_trait]
pub trait SyncStore: Send + Sync {
    // ---- campaigns ----

    async fn find_campaign(&self, id: DbId) -> Result<Option<Campaign>, StoreError>;

    async fn find_campaign_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Campaign>, StoreError>;

    /// Campaigns of one user (or everyone's), newest first.
    async fn list_campaigns(&self, user_id: Option<DbId>) -> Result<Vec<Campaign>, StoreError>;

    /// Insert; [`StoreError::Conflict`] when the external id is taken.
    async fn create_campaign(&self, input: &CreateCampaign) -> Result<Campaign, StoreError>;

    /// Field-merge and refresh `cached_at`.
    async fn update_campaign(
        &self,
        id: DbId,
        input: &UpdateCampaign,
    ) -> Result<Campaign, StoreError>;

    /// Refresh only `cached_at`.
    async fn touch_campaign(&self, id: DbId) -> Result<(), StoreError>;

    async fn set_contact_numbers(&self, id: DbId, numbers: &[String]) -> Result<(), StoreError>;

    async fn set_campaign_status(
        &self,
        id: DbId,
        status: CampaignStatus,
    ) -> Result<Campaign, StoreError>;

    // ---- call lines ----

    async fn find_line_by_call_id(
        &self,
        campaign_id: DbId,
        external_call_id: &str,
    ) -> Result<Option<CallLine>, StoreError>;

    /// The line keyed by destination only (no external call id).
    async fn find_unkeyed_line(
        &self,
        campaign_id: DbId,
        destination: &str,
    ) -> Result<Option<CallLine>, StoreError>;

    /// Every line to `destination`, most recent call first.
    async fn lines_to(
        &self,
        campaign_id: DbId,
        destination: &str,
    ) -> Result<Vec<CallLine>, StoreError>;

    async fn list_lines(&self, campaign_id: DbId) -> Result<Vec<CallLine>, StoreError>;

    /// Insert; [`StoreError::Conflict`] when the line key is taken.
    async fn create_line(&self, input: &CreateCallLine) -> Result<CallLine, StoreError>;

    async fn update_line(&self, id: DbId, input: &UpdateCallLine) -> Result<CallLine, StoreError>;

    // ---- inbound calls ----

    /// Insert or refresh by external call id. The flag is `true` on insert.
    async fn upsert_incoming_call(
        &self,
        input: &UpsertIncomingCall,
    ) -> Result<(IncomingCall, bool), StoreError>;

    // ---- activity log ----

    async fn append_activity(&self, input: &CreateActivityLog) -> Result<ActivityLog, StoreError>;

    async fn list_activity(&self, campaign_id: DbId) -> Result<Vec<ActivityLog>, StoreError>;
}
