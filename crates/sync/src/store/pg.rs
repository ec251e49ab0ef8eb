//! [`SyncStore`] over the Postgres repositories.

use async_trait::async_trait;
use callsync_core::status::CampaignStatus;
use callsync_core::types::DbId;
use callsync_db::models::activity_log::{ActivityLog, CreateActivityLog};
use callsync_db::models::call_line::{CallLine, CreateCallLine, UpdateCallLine};
use callsync_db::models::campaign::{Campaign, CreateCampaign, UpdateCampaign};
use callsync_db::models::incoming_call::{IncomingCall, UpsertIncomingCall};
use callsync_db::repositories::{ActivityLogRepo, CallLineRepo, CampaignRepo, IncomingCallRepo};
use callsync_db::DbPool;

use super::{StoreError, SyncStore};

/// Postgres-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            // PostgreSQL unique constraint violation
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                return StoreError::Conflict(constraint.to_string());
            }
        }
        StoreError::Backend(err.to_string())
    }
}

fn missing(entity: &'static str, id: DbId) -> StoreError {
    StoreError::NotFound { entity, id }
}

#[async_trait]
impl SyncStore for PgStore {
    async fn find_campaign(&self, id: DbId) -> Result<Option<Campaign>, StoreError> {
        Ok(CampaignRepo::find_by_id(&self.pool, id).await?)
    }

    async fn find_campaign_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Campaign>, StoreError> {
        Ok(CampaignRepo::find_by_external_id(&self.pool, external_id).await?)
    }

    async fn list_campaigns(&self, user_id: Option<DbId>) -> Result<Vec<Campaign>, StoreError> {
        Ok(CampaignRepo::list_by_user(&self.pool, user_id).await?)
    }

    async fn create_campaign(&self, input: &CreateCampaign) -> Result<Campaign, StoreError> {
        Ok(CampaignRepo::create(&self.pool, input).await?)
    }

    async fn update_campaign(
        &self,
        id: DbId,
        input: &UpdateCampaign,
    ) -> Result<Campaign, StoreError> {
        CampaignRepo::update(&self.pool, id, input)
            .await?
            .ok_or_else(|| missing("campaign", id))
    }

    async fn touch_campaign(&self, id: DbId) -> Result<(), StoreError> {
        if CampaignRepo::touch_cached_at(&self.pool, id).await? {
            Ok(())
        } else {
            Err(missing("campaign", id))
        }
    }

    async fn set_contact_numbers(&self, id: DbId, numbers: &[String]) -> Result<(), StoreError> {
        if CampaignRepo::set_contact_numbers(&self.pool, id, numbers).await? {
            Ok(())
        } else {
            Err(missing("campaign", id))
        }
    }

    async fn set_campaign_status(
        &self,
        id: DbId,
        status: CampaignStatus,
    ) -> Result<Campaign, StoreError> {
        CampaignRepo::update_status(&self.pool, id, status.as_str())
            .await?
            .ok_or_else(|| missing("campaign", id))
    }

    async fn find_line_by_call_id(
        &self,
        campaign_id: DbId,
        external_call_id: &str,
    ) -> Result<Option<CallLine>, StoreError> {
        Ok(CallLineRepo::find_by_call_id(&self.pool, campaign_id, external_call_id).await?)
    }

    async fn find_unkeyed_line(
        &self,
        campaign_id: DbId,
        destination: &str,
    ) -> Result<Option<CallLine>, StoreError> {
        Ok(CallLineRepo::find_unkeyed_by_destination(&self.pool, campaign_id, destination).await?)
    }

    async fn lines_to(
        &self,
        campaign_id: DbId,
        destination: &str,
    ) -> Result<Vec<CallLine>, StoreError> {
        Ok(CallLineRepo::list_by_destination(&self.pool, campaign_id, destination).await?)
    }

    async fn list_lines(&self, campaign_id: DbId) -> Result<Vec<CallLine>, StoreError> {
        Ok(CallLineRepo::list_by_campaign(&self.pool, campaign_id).await?)
    }

    async fn create_line(&self, input: &CreateCallLine) -> Result<CallLine, StoreError> {
        Ok(CallLineRepo::create(&self.pool, input).await?)
    }

    async fn update_line(&self, id: DbId, input: &UpdateCallLine) -> Result<CallLine, StoreError> {
        CallLineRepo::update(&self.pool, id, input)
            .await?
            .ok_or_else(|| missing("call_line", id))
    }

    async fn upsert_incoming_call(
        &self,
        input: &UpsertIncomingCall,
    ) -> Result<(IncomingCall, bool), StoreError> {
        Ok(IncomingCallRepo::upsert(&self.pool, input).await?)
    }

    async fn append_activity(&self, input: &CreateActivityLog) -> Result<ActivityLog, StoreError> {
        Ok(ActivityLogRepo::create(&self.pool, input).await?)
    }

    async fn list_activity(&self, campaign_id: DbId) -> Result<Vec<ActivityLog>, StoreError> {
        Ok(ActivityLogRepo::list_for_campaign(&self.pool, campaign_id).await?)
    }
}
