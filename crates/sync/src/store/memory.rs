//! In-memory [`SyncStore`] with the same key constraints as the schema.
//!
//! Used by tests and dry runs. State lives behind a mutex that is never
//! held across an await point.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use callsync_core::status::CampaignStatus;
use callsync_core::types::DbId;
use callsync_db::models::activity_log::{ActivityLog, CreateActivityLog};
use callsync_db::models::call_line::{CallLine, CreateCallLine, UpdateCallLine};
use callsync_db::models::campaign::{Campaign, CreateCampaign, UpdateCampaign};
use callsync_db::models::incoming_call::{IncomingCall, UpsertIncomingCall};
use chrono::Utc;
use serde_json::Value;

use super::{StoreError, SyncStore};

#[derive(Default)]
struct Inner {
    next_id: DbId,
    campaigns: BTreeMap<DbId, Campaign>,
    lines: BTreeMap<DbId, CallLine>,
    incoming: BTreeMap<DbId, IncomingCall>,
    activity: Vec<ActivityLog>,
}

impl Inner {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }

    fn campaign_mut(&mut self, id: DbId) -> Result<&mut Campaign, StoreError> {
        self.campaigns
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "campaign", id })
    }
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every stored inbound call, in insertion order.
    pub fn incoming_calls(&self) -> Vec<IncomingCall> {
        self.lock().incoming.values().cloned().collect()
    }

    /// Number of stored campaigns.
    pub fn campaign_count(&self) -> usize {
        self.lock().campaigns.len()
    }
}

fn check_counters(campaign: &Campaign) -> Result<(), StoreError> {
    let counters = [
        campaign.total_calls,
        campaign.calls_made,
        campaign.picked_up_calls,
        campaign.completed_calls,
        campaign.failed_calls,
        campaign.busy_calls,
        campaign.no_answer_calls,
        campaign.transfer_calls,
        campaign.low_interaction_calls,
    ];
    if counters.iter().any(|c| *c < 0) || campaign.cost < 0.0 {
        return Err(StoreError::Backend("negative campaign counter".into()));
    }
    Ok(())
}

fn merge_metadata(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(stored), Value::Object(fields)) => {
            for (key, value) in fields {
                stored.insert(key.clone(), value.clone());
            }
        }
        (stored, patch) => *stored = patch.clone(),
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn find_campaign(&self, id: DbId) -> Result<Option<Campaign>, StoreError> {
        Ok(self.lock().campaigns.get(&id).cloned())
    }

    async fn find_campaign_by_external_id(
        &self,
        external_id: &str,
    ) -> Result<Option<Campaign>, StoreError> {
        Ok(self
            .lock()
            .campaigns
            .values()
            .find(|c| c.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn list_campaigns(&self, user_id: Option<DbId>) -> Result<Vec<Campaign>, StoreError> {
        Ok(self
            .lock()
            .campaigns
            .values()
            .rev()
            .filter(|c| user_id.map_or(true, |uid| c.user_id == uid))
            .cloned()
            .collect())
    }

    async fn create_campaign(&self, input: &CreateCampaign) -> Result<Campaign, StoreError> {
        let mut inner = self.lock();
        if let Some(external_id) = &input.external_id {
            if inner
                .campaigns
                .values()
                .any(|c| c.external_id.as_ref() == Some(external_id))
            {
                return Err(StoreError::Conflict("uq_campaigns_external_id".into()));
            }
        }

        let now = Utc::now();
        let campaign = Campaign {
            id: inner.next_id(),
            user_id: input.user_id,
            external_id: input.external_id.clone(),
            name: input.name.clone(),
            status: input.status.clone(),
            origin_number: input.origin_number.clone(),
            agent_name: input.agent_name.clone(),
            contact_numbers: input.contact_numbers.clone(),
            total_calls: input.total_calls.unwrap_or(0),
            calls_made: input.calls_made.unwrap_or(0),
            picked_up_calls: input.picked_up_calls.unwrap_or(0),
            completed_calls: input.completed_calls.unwrap_or(0),
            failed_calls: input.failed_calls.unwrap_or(0),
            busy_calls: input.busy_calls.unwrap_or(0),
            no_answer_calls: input.no_answer_calls.unwrap_or(0),
            transfer_calls: input.transfer_calls.unwrap_or(0),
            low_interaction_calls: input.low_interaction_calls.unwrap_or(0),
            cost: input.cost.unwrap_or(0.0),
            scheduled_at: input.scheduled_at,
            cached_at: Some(now),
            sync_status: input.sync_status.clone(),
            created_at: now,
            updated_at: now,
        };
        check_counters(&campaign)?;
        inner.campaigns.insert(campaign.id, campaign.clone());
        Ok(campaign)
    }

    async fn update_campaign(
        &self,
        id: DbId,
        input: &UpdateCampaign,
    ) -> Result<Campaign, StoreError> {
        let mut inner = self.lock();
        let stored = inner.campaign_mut(id)?;
        let mut updated = stored.clone();
        input.apply_to(&mut updated);
        check_counters(&updated)?;
        let now = Utc::now();
        updated.cached_at = Some(now);
        updated.updated_at = now;
        *stored = updated.clone();
        Ok(updated)
    }

    async fn touch_campaign(&self, id: DbId) -> Result<(), StoreError> {
        let mut inner = self.lock();
        inner.campaign_mut(id)?.cached_at = Some(Utc::now());
        Ok(())
    }

    async fn set_contact_numbers(&self, id: DbId, numbers: &[String]) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let campaign = inner.campaign_mut(id)?;
        campaign.contact_numbers = numbers.to_vec();
        campaign.updated_at = Utc::now();
        Ok(())
    }

    async fn set_campaign_status(
        &self,
        id: DbId,
        status: CampaignStatus,
    ) -> Result<Campaign, StoreError> {
        let mut inner = self.lock();
        let campaign = inner.campaign_mut(id)?;
        campaign.status = status.as_str().to_string();
        campaign.updated_at = Utc::now();
        Ok(campaign.clone())
    }

    async fn find_line_by_call_id(
        &self,
        campaign_id: DbId,
        external_call_id: &str,
    ) -> Result<Option<CallLine>, StoreError> {
        Ok(self
            .lock()
            .lines
            .values()
            .find(|l| {
                l.campaign_id == campaign_id
                    && l.external_call_id.as_deref() == Some(external_call_id)
            })
            .cloned())
    }

    async fn find_unkeyed_line(
        &self,
        campaign_id: DbId,
        destination: &str,
    ) -> Result<Option<CallLine>, StoreError> {
        Ok(self
            .lock()
            .lines
            .values()
            .find(|l| {
                l.campaign_id == campaign_id
                    && l.external_call_id.is_none()
                    && l.destination_number == destination
            })
            .cloned())
    }

    async fn lines_to(
        &self,
        campaign_id: DbId,
        destination: &str,
    ) -> Result<Vec<CallLine>, StoreError> {
        let mut lines: Vec<CallLine> = self
            .lock()
            .lines
            .values()
            .filter(|l| l.campaign_id == campaign_id && l.destination_number == destination)
            .cloned()
            .collect();
        // Most recent call first, untimed lines last.
        lines.sort_by(|a, b| match (a.call_time, b.call_time) {
            (Some(x), Some(y)) => y.cmp(&x).then(b.id.cmp(&a.id)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => b.id.cmp(&a.id),
        });
        Ok(lines)
    }

    async fn list_lines(&self, campaign_id: DbId) -> Result<Vec<CallLine>, StoreError> {
        Ok(self
            .lock()
            .lines
            .values()
            .filter(|l| l.campaign_id == campaign_id)
            .cloned()
            .collect())
    }

    async fn create_line(&self, input: &CreateCallLine) -> Result<CallLine, StoreError> {
        let mut inner = self.lock();
        if !inner.campaigns.contains_key(&input.campaign_id) {
            return Err(StoreError::NotFound {
                entity: "campaign",
                id: input.campaign_id,
            });
        }
        let taken = inner.lines.values().any(|l| {
            l.campaign_id == input.campaign_id
                && match &input.external_call_id {
                    Some(call_id) => l.external_call_id.as_ref() == Some(call_id),
                    None => {
                        l.external_call_id.is_none()
                            && l.destination_number == input.destination_number
                    }
                }
        });
        if taken {
            return Err(StoreError::Conflict(
                if input.external_call_id.is_some() {
                    "uq_call_lines_campaign_call"
                } else {
                    "uq_call_lines_campaign_destination"
                }
                .into(),
            ));
        }

        let now = Utc::now();
        let line = CallLine {
            id: inner.next_id(),
            campaign_id: input.campaign_id,
            external_call_id: input.external_call_id.clone(),
            destination_number: input.destination_number.clone(),
            call_time: input.call_time,
            status: input.status.clone().unwrap_or_else(|| "pending".into()),
            interaction: input
                .interaction
                .clone()
                .unwrap_or_else(|| "no_interaction".into()),
            duration_secs: input.duration_secs.unwrap_or(0),
            recording_available: input.recording_url.is_some(),
            recording_url: input.recording_url.clone(),
            transcript: input.transcript.clone(),
            metadata: input
                .metadata
                .clone()
                .unwrap_or_else(|| Value::Object(Default::default())),
            created_at: now,
            updated_at: now,
        };
        inner.lines.insert(line.id, line.clone());
        Ok(line)
    }

    async fn update_line(&self, id: DbId, input: &UpdateCallLine) -> Result<CallLine, StoreError> {
        let mut inner = self.lock();
        if let Some(call_id) = &input.external_call_id {
            let (campaign_id, current) = inner
                .lines
                .get(&id)
                .map(|l| (l.campaign_id, l.external_call_id.clone()))
                .ok_or(StoreError::NotFound { entity: "call_line", id })?;
            let taken = current.as_ref() != Some(call_id)
                && inner.lines.values().any(|l| {
                    l.campaign_id == campaign_id && l.external_call_id.as_ref() == Some(call_id)
                });
            if taken {
                return Err(StoreError::Conflict("uq_call_lines_campaign_call".into()));
            }
        }

        let line = inner
            .lines
            .get_mut(&id)
            .ok_or(StoreError::NotFound { entity: "call_line", id })?;
        if input.external_call_id.is_some() {
            line.external_call_id = input.external_call_id.clone();
        }
        if input.call_time.is_some() {
            line.call_time = input.call_time;
        }
        if let Some(status) = &input.status {
            line.status = status.clone();
        }
        if let Some(interaction) = &input.interaction {
            line.interaction = interaction.clone();
        }
        if let Some(duration) = input.duration_secs {
            line.duration_secs = duration;
        }
        if input.recording_url.is_some() {
            line.recording_url = input.recording_url.clone();
        }
        line.recording_available = line.recording_url.is_some();
        if input.transcript.is_some() {
            line.transcript = input.transcript.clone();
        }
        if let Some(patch) = &input.metadata {
            merge_metadata(&mut line.metadata, patch);
        }
        line.updated_at = Utc::now();
        Ok(line.clone())
    }

    async fn upsert_incoming_call(
        &self,
        input: &UpsertIncomingCall,
    ) -> Result<(IncomingCall, bool), StoreError> {
        if input.from_number == input.to_number {
            return Err(StoreError::Backend(
                "ck_incoming_calls_distinct_parties".into(),
            ));
        }
        let mut inner = self.lock();
        let now = Utc::now();
        if let Some(existing) = inner
            .incoming
            .values_mut()
            .find(|c| c.external_call_id == input.external_call_id)
        {
            existing.status = input.status.clone();
            existing.started_at = input.started_at.or(existing.started_at);
            existing.ended_at = input.ended_at.or(existing.ended_at);
            existing.duration_secs = input.duration_secs.unwrap_or(existing.duration_secs);
            existing.recording_url = input
                .recording_url
                .clone()
                .or_else(|| existing.recording_url.clone());
            existing.updated_at = now;
            return Ok((existing.clone(), false));
        }

        let call = IncomingCall {
            id: inner.next_id(),
            external_call_id: input.external_call_id.clone(),
            from_number: input.from_number.clone(),
            to_number: input.to_number.clone(),
            status: input.status.clone(),
            started_at: input.started_at,
            ended_at: input.ended_at,
            duration_secs: input.duration_secs.unwrap_or(0),
            recording_url: input.recording_url.clone(),
            created_at: now,
            updated_at: now,
        };
        inner.incoming.insert(call.id, call.clone());
        Ok((call, true))
    }

    async fn append_activity(&self, input: &CreateActivityLog) -> Result<ActivityLog, StoreError> {
        let mut inner = self.lock();
        let entry = ActivityLog {
            id: inner.next_id(),
            user_id: input.user_id,
            campaign_id: input.campaign_id,
            action: input.action.clone(),
            details: input.details.clone(),
            created_at: Utc::now(),
        };
        inner.activity.push(entry.clone());
        Ok(entry)
    }

    async fn list_activity(&self, campaign_id: DbId) -> Result<Vec<ActivityLog>, StoreError> {
        Ok(self
            .lock()
            .activity
            .iter()
            .filter(|e| e.campaign_id == Some(campaign_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn campaign(external_id: Option<&str>) -> CreateCampaign {
        CreateCampaign {
            user_id: 1,
            external_id: external_id.map(str::to_string),
            name: "c".into(),
            status: "pending".into(),
            sync_status: "synced".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn external_id_conflict() {
        let store = MemoryStore::new();
        store.create_campaign(&campaign(Some("1"))).await.unwrap();
        assert_matches!(
            store.create_campaign(&campaign(Some("1"))).await,
            Err(StoreError::Conflict(_))
        );
        store.create_campaign(&campaign(None)).await.unwrap();
        store.create_campaign(&campaign(None)).await.unwrap();
        assert_eq!(store.campaign_count(), 3);
    }

    #[tokio::test]
    async fn line_keys_follow_schema() {
        let store = MemoryStore::new();
        let c = store.create_campaign(&campaign(Some("1"))).await.unwrap();
        let unkeyed = CreateCallLine {
            campaign_id: c.id,
            destination_number: "9876543210".into(),
            ..Default::default()
        };
        let line = store.create_line(&unkeyed).await.unwrap();
        assert_matches!(store.create_line(&unkeyed).await, Err(StoreError::Conflict(_)));

        // Adopting a call id frees the destination key.
        store
            .update_line(
                line.id,
                &UpdateCallLine {
                    external_call_id: Some("x".into()),
                    metadata: Some(json!({"a": 1})),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        store.create_line(&unkeyed).await.unwrap();
        assert_eq!(store.lines_to(c.id, "9876543210").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn negative_counter_rejected() {
        let store = MemoryStore::new();
        let c = store.create_campaign(&campaign(Some("1"))).await.unwrap();
        let patch = UpdateCampaign {
            busy_calls: Some(-2),
            ..Default::default()
        };
        assert_matches!(
            store.update_campaign(c.id, &patch).await,
            Err(StoreError::Backend(_))
        );
        assert_eq!(store.find_campaign(c.id).await.unwrap().unwrap().busy_calls, 0);
    }
}
