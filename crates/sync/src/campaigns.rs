//! Merging upstream campaign snapshots into local campaign records.

use std::sync::Arc;

use callsync_core::campaign::{merge_numbers, CampaignSnapshot};
use callsync_core::phone::PhoneNormalizer;
use callsync_core::status::{cache_eligible, CampaignStatus};
use callsync_core::types::DbId;
use callsync_db::models::activity_log::{actions, CreateActivityLog};
use callsync_db::models::campaign::{
    Campaign, CreateCampaign, UpdateCampaign, SYNC_STATUS_SYNCED,
};
use callsync_events::{names, DomainEvent, EventSink};
use serde::Serialize;
use serde_json::{json, Value};

use crate::error::SyncError;
use crate::store::{StoreError, SyncStore};

/// Why a snapshot was not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No external id resolved from the synonym chain.
    MissingExternalId,
    /// Active and not resuming from a pause: not cached.
    NotCacheable,
}

/// Result of reconciling one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Created(Campaign),
    Updated(Campaign),
    /// Identical snapshot; only the freshness timestamp moved.
    Unchanged(Campaign),
    Skipped(SkipReason),
}

impl ReconcileOutcome {
    /// The persisted campaign, if the snapshot was persisted.
    pub fn campaign(&self) -> Option<&Campaign> {
        match self {
            Self::Created(c) | Self::Updated(c) | Self::Unchanged(c) => Some(c),
            Self::Skipped(_) => None,
        }
    }

    pub fn into_campaign(self) -> Option<Campaign> {
        match self {
            Self::Created(c) | Self::Updated(c) | Self::Unchanged(c) => Some(c),
            Self::Skipped(_) => None,
        }
    }
}

/// Tally of a batch reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub(crate) fn record(&mut self, outcome: &ReconcileOutcome) {
        match outcome {
            ReconcileOutcome::Created(_) => self.created += 1,
            ReconcileOutcome::Updated(_) => self.updated += 1,
            ReconcileOutcome::Unchanged(_) => self.unchanged += 1,
            ReconcileOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    /// Campaigns written or confirmed.
    pub fn persisted(&self) -> usize {
        self.created + self.updated + self.unchanged
    }
}

/// Applies the cache policy and field-merges snapshots into the store.
pub struct CampaignReconciler {
    store: Arc<dyn SyncStore>,
    events: Arc<dyn EventSink>,
    phones: PhoneNormalizer,
}

impl CampaignReconciler {
    pub fn new(store: Arc<dyn SyncStore>, events: Arc<dyn EventSink>, phones: PhoneNormalizer) -> Self {
        Self {
            store,
            events,
            phones,
        }
    }

    pub fn phones(&self) -> &PhoneNormalizer {
        &self.phones
    }

    /// Reconcile a batch sequentially. A failed record is logged and
    /// skipped; it never aborts the batch.
    pub async fn reconcile_campaigns(&self, batch: &[Value], owner: DbId) -> BatchSummary {
        let mut summary = BatchSummary::default();
        for raw in batch {
            match self.reconcile(raw, owner).await {
                Ok(outcome) => summary.record(&outcome),
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(user_id = owner, error = %e, "Campaign snapshot failed to reconcile");
                }
            }
        }
        summary
    }

    /// Reconcile one raw upstream payload.
    pub async fn reconcile(&self, raw: &Value, owner: DbId) -> Result<ReconcileOutcome, SyncError> {
        match CampaignSnapshot::from_value(raw, &self.phones) {
            Some(snapshot) => self.reconcile_snapshot(&snapshot, owner).await,
            None => {
                tracing::debug!(user_id = owner, "Campaign snapshot without external id skipped");
                Ok(ReconcileOutcome::Skipped(SkipReason::MissingExternalId))
            }
        }
    }

    /// Reconcile an already-mapped snapshot.
    pub async fn reconcile_snapshot(
        &self,
        snapshot: &CampaignSnapshot,
        owner: DbId,
    ) -> Result<ReconcileOutcome, SyncError> {
        let existing = self
            .store
            .find_campaign_by_external_id(&snapshot.external_id)
            .await?;

        if let Some(incoming) = snapshot.status {
            let previous = existing.as_ref().map(Campaign::lifecycle);
            if !cache_eligible(incoming, previous) {
                tracing::debug!(
                    external_id = %snapshot.external_id,
                    "Active campaign not cached"
                );
                return Ok(ReconcileOutcome::Skipped(SkipReason::NotCacheable));
            }
        }

        match existing {
            Some(current) => self.merge(current, snapshot).await,
            None => self.insert_snapshot(snapshot, owner).await,
        }
    }

    /// Persist a snapshot regardless of the cache policy (local creation).
    pub async fn persist_created(
        &self,
        snapshot: &CampaignSnapshot,
        owner: DbId,
    ) -> Result<ReconcileOutcome, SyncError> {
        match self
            .store
            .find_campaign_by_external_id(&snapshot.external_id)
            .await?
        {
            Some(current) => self.merge(current, snapshot).await,
            None => self.insert_snapshot(snapshot, owner).await,
        }
    }

    async fn insert_snapshot(
        &self,
        snapshot: &CampaignSnapshot,
        owner: DbId,
    ) -> Result<ReconcileOutcome, SyncError> {
        let input = create_from_snapshot(snapshot, owner);
        match self.insert(&input).await {
            Ok(campaign) => Ok(ReconcileOutcome::Created(campaign)),
            Err(SyncError::Store(StoreError::Conflict(constraint))) => {
                // Another writer inserted the same external id in between.
                tracing::info!(
                    external_id = %snapshot.external_id,
                    constraint = %constraint,
                    "Duplicate campaign insert, merging instead"
                );
                let current = self
                    .store
                    .find_campaign_by_external_id(&snapshot.external_id)
                    .await?
                    .ok_or_else(|| SyncError::not_found("campaign", &snapshot.external_id))?;
                self.merge(current, snapshot).await
            }
            Err(e) => Err(e),
        }
    }

    /// Insert a new campaign, writing the creation activity entries and event.
    pub(crate) async fn insert(&self, input: &CreateCampaign) -> Result<Campaign, SyncError> {
        let campaign = self.store.create_campaign(input).await?;
        tracing::info!(
            campaign_id = campaign.id,
            external_id = campaign.external_id.as_deref().unwrap_or(""),
            status = %campaign.status,
            "Campaign created"
        );

        self.log_activity(&campaign, actions::CREATED, None).await;
        if campaign.lifecycle() == CampaignStatus::Completed {
            self.log_activity(&campaign, actions::COMPLETED, None).await;
        }
        self.publish(names::CAMPAIGN_CREATED, &campaign);
        Ok(campaign)
    }

    async fn merge(
        &self,
        current: Campaign,
        snapshot: &CampaignSnapshot,
    ) -> Result<ReconcileOutcome, SyncError> {
        let patch = diff(&current, snapshot);
        if patch.is_empty() {
            self.store.touch_campaign(current.id).await?;
            return Ok(ReconcileOutcome::Unchanged(current));
        }

        let previous = current.lifecycle();
        let updated = self.store.update_campaign(current.id, &patch).await?;
        tracing::debug!(
            campaign_id = updated.id,
            external_id = %snapshot.external_id,
            status = %updated.status,
            "Campaign updated"
        );

        if previous != CampaignStatus::Completed && updated.lifecycle() == CampaignStatus::Completed {
            self.log_activity(&updated, actions::COMPLETED, Some(previous))
                .await;
        }
        self.publish(names::CAMPAIGN_UPDATED, &updated);
        Ok(ReconcileOutcome::Updated(updated))
    }

    /// Append an activity entry. Failures are logged, never propagated.
    pub(crate) async fn log_activity(
        &self,
        campaign: &Campaign,
        action: &str,
        previous: Option<CampaignStatus>,
    ) {
        let mut details = json!({
            "external_id": campaign.external_id,
            "name": campaign.name,
            "status": campaign.status,
        });
        if let (Some(previous), Value::Object(fields)) = (previous, &mut details) {
            fields.insert("previous_status".into(), previous.as_str().into());
        }
        let entry = CreateActivityLog {
            user_id: campaign.user_id,
            campaign_id: Some(campaign.id),
            action: action.to_string(),
            details,
        };
        if let Err(e) = self.store.append_activity(&entry).await {
            tracing::warn!(campaign_id = campaign.id, action, error = %e, "Activity log write failed");
        }
    }

    pub(crate) fn publish(&self, name: &str, campaign: &Campaign) {
        self.events.publish(
            DomainEvent::new(name)
                .with_entity("campaign", campaign.id)
                .with_user(campaign.user_id)
                .with_record(campaign),
        );
    }
}

/// Insert DTO for a snapshot seen for the first time.
pub fn create_from_snapshot(snapshot: &CampaignSnapshot, owner: DbId) -> CreateCampaign {
    let counters = &snapshot.counters;
    CreateCampaign {
        user_id: owner,
        external_id: Some(snapshot.external_id.clone()),
        name: snapshot
            .name
            .clone()
            .unwrap_or_else(|| format!("Campaign {}", snapshot.external_id)),
        status: snapshot.effective_status().as_str().to_string(),
        origin_number: snapshot.origin_number.clone(),
        agent_name: snapshot.agent_name.clone(),
        contact_numbers: snapshot.contact_numbers.clone().unwrap_or_default(),
        total_calls: counters.total,
        calls_made: counters.made,
        picked_up_calls: counters.picked_up,
        completed_calls: counters.completed,
        failed_calls: counters.failed,
        busy_calls: counters.busy,
        no_answer_calls: counters.no_answer,
        transfer_calls: counters.transfer,
        low_interaction_calls: counters.low_interaction,
        cost: snapshot.cost,
        scheduled_at: snapshot.scheduled_at,
        sync_status: SYNC_STATUS_SYNCED.to_string(),
    }
}

/// Fields of `snapshot` that differ from `current`.
///
/// Absent snapshot fields are never cleared. The contact-number set only
/// grows: numbers already cached stay even when a later snapshot omits them.
pub fn diff(current: &Campaign, snapshot: &CampaignSnapshot) -> UpdateCampaign {
    fn changed<T: PartialEq>(incoming: Option<T>, stored: &T) -> Option<T> {
        incoming.filter(|v| v != stored)
    }
    fn changed_opt<T: PartialEq>(incoming: Option<T>, stored: &Option<T>) -> Option<T> {
        incoming.filter(|v| stored.as_ref() != Some(v))
    }

    let counters = &snapshot.counters;
    let contact_numbers = snapshot.contact_numbers.as_ref().and_then(|incoming| {
        let mut merged = current.contact_numbers.clone();
        merge_numbers(&mut merged, incoming).then_some(merged)
    });

    UpdateCampaign {
        name: changed(snapshot.name.clone(), &current.name),
        status: changed(
            snapshot.status.map(|s| s.as_str().to_string()),
            &current.status,
        ),
        origin_number: changed_opt(snapshot.origin_number.clone(), &current.origin_number),
        agent_name: changed_opt(snapshot.agent_name.clone(), &current.agent_name),
        contact_numbers,
        total_calls: changed(counters.total, &current.total_calls),
        calls_made: changed(counters.made, &current.calls_made),
        picked_up_calls: changed(counters.picked_up, &current.picked_up_calls),
        completed_calls: changed(counters.completed, &current.completed_calls),
        failed_calls: changed(counters.failed, &current.failed_calls),
        busy_calls: changed(counters.busy, &current.busy_calls),
        no_answer_calls: changed(counters.no_answer, &current.no_answer_calls),
        transfer_calls: changed(counters.transfer, &current.transfer_calls),
        low_interaction_calls: changed(counters.low_interaction, &current.low_interaction_calls),
        cost: changed(snapshot.cost, &current.cost),
        scheduled_at: changed_opt(snapshot.scheduled_at, &current.scheduled_at),
        sync_status: changed(Some(SYNC_STATUS_SYNCED.to_string()), &current.sync_status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use callsync_events::EventBus;
    use serde_json::json;

    struct Fixture {
        store: Arc<MemoryStore>,
        bus: Arc<EventBus>,
        reconciler: CampaignReconciler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::default());
        let reconciler =
            CampaignReconciler::new(store.clone(), bus.clone(), PhoneNormalizer::default());
        Fixture {
            store,
            bus,
            reconciler,
        }
    }

    async fn actions_for(store: &MemoryStore, campaign_id: DbId) -> Vec<String> {
        store
            .list_activity(campaign_id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.action)
            .collect()
    }

    #[tokio::test]
    async fn fresh_completed_snapshot_logs_created_and_completed() {
        let f = fixture();
        let mut rx = f.bus.subscribe();
        let raw = json!({"id": "77", "status": "completed", "total_calls_to_dispatch": 50, "completed_calls": 50});

        let outcome = f.reconciler.reconcile(&raw, 3).await.unwrap();
        let campaign = match outcome {
            ReconcileOutcome::Created(c) => c,
            other => panic!("expected creation, got {other:?}"),
        };
        assert_eq!(campaign.status, "completed");
        assert_eq!(campaign.total_calls, 50);
        assert_eq!(campaign.user_id, 3);

        let actions = actions_for(&f.store, campaign.id).await;
        assert_eq!(actions, vec!["campaign.created", "campaign.completed"]);
        assert_eq!(
            actions.iter().filter(|a| *a == "campaign.completed").count(),
            1
        );
        assert_eq!(rx.recv().await.unwrap().name, "campaign.created");
    }

    #[tokio::test]
    async fn identical_snapshot_only_touches_freshness() {
        let f = fixture();
        let raw = json!({"id": "77", "name": "Renewals", "status": "completed", "total_calls": 50});

        let first = f.reconciler.reconcile(&raw, 1).await.unwrap();
        let first = first.into_campaign().unwrap();
        let second = f.reconciler.reconcile(&raw, 1).await.unwrap();
        assert!(matches!(second, ReconcileOutcome::Unchanged(_)));

        let stored = f.store.find_campaign(first.id).await.unwrap().unwrap();
        assert_eq!(stored.name, first.name);
        assert_eq!(stored.total_calls, first.total_calls);
        assert_eq!(stored.updated_at, first.updated_at);
        assert!(stored.cached_at >= first.cached_at);
        assert_eq!(f.store.campaign_count(), 1);
        // No second "completed" entry.
        assert_eq!(actions_for(&f.store, first.id).await.len(), 2);
    }

    #[tokio::test]
    async fn never_cached_active_campaign_stays_absent() {
        let f = fixture();
        let outcome = f
            .reconciler
            .reconcile(&json!({"id": "5", "status": "running"}), 1)
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Skipped(SkipReason::NotCacheable));
        assert_eq!(f.store.campaign_count(), 0);
    }

    #[tokio::test]
    async fn paused_campaign_resuming_is_persisted() {
        let f = fixture();
        f.reconciler
            .reconcile(&json!({"id": "5", "status": "paused"}), 1)
            .await
            .unwrap();
        let outcome = f
            .reconciler
            .reconcile(&json!({"id": "5", "status": "active"}), 1)
            .await
            .unwrap();
        let campaign = match outcome {
            ReconcileOutcome::Updated(c) => c,
            other => panic!("expected update, got {other:?}"),
        };
        assert_eq!(campaign.status, "active");

        // Once active locally, further active snapshots are not cached.
        let again = f
            .reconciler
            .reconcile(&json!({"id": "5", "status": "active", "calls_made": 3}), 1)
            .await
            .unwrap();
        assert_eq!(again, ReconcileOutcome::Skipped(SkipReason::NotCacheable));
    }

    #[tokio::test]
    async fn absent_fields_are_preserved_and_contacts_only_grow() {
        let f = fixture();
        let created = f
            .reconciler
            .reconcile(
                &json!({"id": "9", "name": "Leads", "status": "in_progress", "busy_calls": 4,
                        "phone_numbers": ["9876543210", "9123456789"]}),
                1,
            )
            .await
            .unwrap()
            .into_campaign()
            .unwrap();

        let updated = f
            .reconciler
            .reconcile(
                &json!({"id": "9", "status": "completed", "phone_numbers": ["9000000000"]}),
                1,
            )
            .await
            .unwrap()
            .into_campaign()
            .unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.name, "Leads");
        assert_eq!(updated.busy_calls, 4);
        assert_eq!(
            updated.contact_numbers,
            vec!["9876543210", "9123456789", "9000000000"]
        );
        assert_eq!(
            actions_for(&f.store, created.id).await,
            vec!["campaign.created", "campaign.completed"]
        );
    }

    #[tokio::test]
    async fn batch_continues_past_bad_records() {
        let f = fixture();
        let batch = vec![
            json!({"name": "no id"}),
            json!({"id": "1", "status": "completed"}),
            json!({"id": "2", "status": "active"}),
            json!({"id": "3", "failed_calls": -4, "status": "failed"}),
            json!({"id": "1", "status": "completed"}),
        ];
        let summary = f.reconciler.reconcile_campaigns(&batch, 1).await;
        assert_eq!(summary.created, 2);
        assert_eq!(summary.unchanged, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(summary.persisted(), 3);
    }

    #[tokio::test]
    async fn duplicate_insert_falls_back_to_update() {
        let f = fixture();
        // Simulate a concurrent writer: the row exists but our lookup raced it.
        f.store
            .create_campaign(&create_from_snapshot(
                &CampaignSnapshot::from_value(&json!({"id": "42", "status": "pending"}), &PhoneNormalizer::default()).unwrap(),
                1,
            ))
            .await
            .unwrap();
        let snapshot = CampaignSnapshot::from_value(
            &json!({"id": "42", "status": "completed"}),
            &PhoneNormalizer::default(),
        )
        .unwrap();
        let outcome = f.reconciler.insert_snapshot(&snapshot, 1).await.unwrap();
        let campaign = match outcome {
            ReconcileOutcome::Updated(c) => c,
            other => panic!("expected update, got {other:?}"),
        };
        assert_eq!(campaign.status, "completed");
        assert_eq!(f.store.campaign_count(), 1);
    }
}
