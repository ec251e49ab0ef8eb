//! User-initiated campaign lifecycle actions.
//!
//! Each action is sent upstream first; the local record is only touched
//! once upstream accepted it.

use std::sync::Arc;

use callsync_core::campaign::{self, CampaignSnapshot};
use callsync_core::error::CoreError;
use callsync_core::status::CampaignStatus;
use callsync_core::types::DbId;
use callsync_db::models::activity_log::actions;
use callsync_db::models::campaign::{Campaign, CreateCampaign, SYNC_STATUS_LOCAL_ONLY};
use callsync_events::names;
use callsync_upstream::CampaignGateway;
use serde_json::Value;

use crate::campaigns::CampaignReconciler;
use crate::error::SyncError;
use crate::store::SyncStore;

/// Keys under which a create response may nest the campaign.
const CREATE_RESPONSE_WRAPPERS: &[&str] = &["data", "campaign", "bulk_call"];

pub struct CampaignActions {
    gateway: Arc<dyn CampaignGateway>,
    store: Arc<dyn SyncStore>,
    campaigns: Arc<CampaignReconciler>,
}

impl CampaignActions {
    pub fn new(
        gateway: Arc<dyn CampaignGateway>,
        store: Arc<dyn SyncStore>,
        campaigns: Arc<CampaignReconciler>,
    ) -> Self {
        Self {
            gateway,
            store,
            campaigns,
        }
    }

    /// Create a campaign upstream and persist it locally.
    ///
    /// The returned snapshot is stored whatever its status: the caller just
    /// created it and expects to see it. When upstream answers without an
    /// id the campaign is kept as `local_only`.
    pub async fn create_campaign(&self, owner: DbId, payload: &Value) -> Result<Campaign, SyncError> {
        let response = self.gateway.create_campaign(payload).await?;
        let record = overlay(payload, unwrap_response(&response));
        let phones = self.campaigns.phones();

        match CampaignSnapshot::from_value(&record, phones) {
            Some(snapshot) => {
                let outcome = self.campaigns.persist_created(&snapshot, owner).await?;
                outcome
                    .into_campaign()
                    .ok_or_else(|| SyncError::not_found("campaign", &snapshot.external_id))
            }
            None => {
                tracing::warn!(user_id = owner, "Create response carried no campaign id, storing locally");
                let input = CreateCampaign {
                    user_id: owner,
                    external_id: None,
                    name: campaign::NAME
                        .text(&record)
                        .unwrap_or_else(|| "Untitled campaign".to_string()),
                    status: CampaignStatus::Pending.as_str().to_string(),
                    origin_number: campaign::ORIGIN_NUMBER
                        .text(&record)
                        .map(|n| phones.normalize(&n))
                        .filter(|n| !n.is_empty()),
                    agent_name: campaign::AGENT_NAME.text(&record),
                    contact_numbers: campaign::contact_numbers(&record, phones).unwrap_or_default(),
                    scheduled_at: campaign::SCHEDULED_AT.timestamp(&record),
                    sync_status: SYNC_STATUS_LOCAL_ONLY.to_string(),
                    ..Default::default()
                };
                self.campaigns.insert(&input).await
            }
        }
    }

    /// Pause upstream; local status becomes paused.
    pub async fn pause(&self, campaign_id: DbId) -> Result<Campaign, SyncError> {
        let current = self.synced_campaign(campaign_id).await?;
        self.gateway
            .campaign_action(external_id(&current), "pause", None)
            .await?;
        self.transition(current, CampaignStatus::Paused, actions::PAUSED).await
    }

    /// Resume upstream. The local status is left as is; the next snapshot
    /// (active, previously paused) is persisted by the cache policy.
    pub async fn resume(&self, campaign_id: DbId) -> Result<Campaign, SyncError> {
        let current = self.synced_campaign(campaign_id).await?;
        self.gateway
            .campaign_action(external_id(&current), "resume", None)
            .await?;
        self.campaigns
            .log_activity(&current, actions::RESUMED, Some(current.lifecycle()))
            .await;
        tracing::info!(campaign_id, "Campaign resumed");
        Ok(current)
    }

    /// Reschedule upstream with optional extra body fields (e.g. a new
    /// `scheduled_at`); local status becomes retry_scheduled.
    pub async fn reschedule(
        &self,
        campaign_id: DbId,
        extra: Option<&Value>,
    ) -> Result<Campaign, SyncError> {
        let current = self.synced_campaign(campaign_id).await?;
        self.gateway
            .campaign_action(external_id(&current), "reschedule", extra)
            .await?;
        self.transition(current, CampaignStatus::RetryScheduled, actions::RESCHEDULED)
            .await
    }

    /// Cancel upstream; the local record is kept with status cancelled.
    pub async fn cancel(&self, campaign_id: DbId) -> Result<Campaign, SyncError> {
        let current = self.synced_campaign(campaign_id).await?;
        self.gateway.cancel_campaign(external_id(&current)).await?;
        self.transition(current, CampaignStatus::Cancelled, actions::CANCELLED)
            .await
    }

    async fn synced_campaign(&self, campaign_id: DbId) -> Result<Campaign, SyncError> {
        let campaign = self
            .store
            .find_campaign(campaign_id)
            .await?
            .ok_or_else(|| SyncError::not_found("campaign", campaign_id))?;
        if campaign.external_id.is_none() {
            return Err(CoreError::Validation(format!(
                "campaign {campaign_id} has no upstream id"
            ))
            .into());
        }
        Ok(campaign)
    }

    async fn transition(
        &self,
        current: Campaign,
        status: CampaignStatus,
        action: &str,
    ) -> Result<Campaign, SyncError> {
        let previous = current.lifecycle();
        let updated = self.store.set_campaign_status(current.id, status).await?;
        tracing::info!(
            campaign_id = updated.id,
            from = %previous,
            to = %status,
            "Campaign status changed by action"
        );
        self.campaigns.log_activity(&updated, action, Some(previous)).await;
        self.campaigns.publish(names::CAMPAIGN_UPDATED, &updated);
        Ok(updated)
    }
}

fn external_id(campaign: &Campaign) -> &str {
    campaign.external_id.as_deref().unwrap_or_default()
}

fn unwrap_response(response: &Value) -> &Value {
    CREATE_RESPONSE_WRAPPERS
        .iter()
        .find_map(|key| response.get(*key).filter(|v| v.is_object()))
        .unwrap_or(response)
}

/// `base` with every field of `top` laid over it.
fn overlay(base: &Value, top: &Value) -> Value {
    let mut merged = base.clone();
    if let (Value::Object(fields), Value::Object(extra)) = (&mut merged, top) {
        for (key, value) in extra {
            fields.insert(key.clone(), value.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_is_unwrapped_and_laid_over_payload() {
        let payload = json!({"name": "Spring", "phone_numbers": ["9876543210"]});
        let response = json!({"success": true, "data": {"id": "bc-1", "status": "pending"}});
        let record = overlay(&payload, unwrap_response(&response));
        assert_eq!(record["id"], "bc-1");
        assert_eq!(record["name"], "Spring");
        assert_eq!(record["status"], "pending");
    }

    #[test]
    fn flat_response_is_used_as_is() {
        let response = json!({"bulk_call_id": "bc-2"});
        assert_eq!(unwrap_response(&response), &response);
    }
}
