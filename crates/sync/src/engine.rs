//! The facade callers hold: wires the reconcilers to one store, one event
//! sink and the two gateways.

use std::sync::Arc;

use callsync_core::types::{DbId, Timestamp};
use callsync_db::models::campaign::Campaign;
use callsync_events::EventSink;
use callsync_upstream::{CampaignGateway, CarrierGateway};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::actions::CampaignActions;
use crate::call_lines::CallLineReconciler;
use crate::call_logs::{CallLogMatcher, LogSweep, LogSyncSummary};
use crate::campaigns::{BatchSummary, CampaignReconciler};
use crate::coordinator::{ScopeSnapshot, SyncCoordinator, SyncHandle};
use crate::error::SyncError;
use crate::incoming::{IncomingCallSync, IncomingSummary};
use crate::job::{FullSyncJob, SyncReport};
use crate::recordings::{RecordingRequest, RecordingResolver};
use crate::settings::SyncSettings;
use crate::store::SyncStore;

/// What a background sync covers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncFilters {
    /// Owner of the synced campaigns; `None` for the admin scope.
    pub user_id: Option<DbId>,
    /// Upstream status filter for the campaign list.
    pub status: Option<String>,
}

#[derive(Clone)]
pub struct SyncEngine {
    store: Arc<dyn SyncStore>,
    campaigns: Arc<CampaignReconciler>,
    lines: Arc<CallLineReconciler>,
    logs: Arc<CallLogMatcher>,
    recordings: Arc<RecordingResolver>,
    incoming: Arc<IncomingCallSync>,
    actions: Arc<CampaignActions>,
    job: Arc<FullSyncJob>,
    coordinator: SyncCoordinator,
}

impl SyncEngine {
    pub fn new(
        store: Arc<dyn SyncStore>,
        events: Arc<dyn EventSink>,
        campaign_api: Arc<dyn CampaignGateway>,
        carrier: Arc<dyn CarrierGateway>,
        settings: SyncSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        let phones = settings.phones.clone();

        let recordings = Arc::new(RecordingResolver::new(Arc::clone(&carrier), &settings));
        let campaigns = Arc::new(CampaignReconciler::new(
            Arc::clone(&store),
            Arc::clone(&events),
            phones.clone(),
        ));
        let lines = Arc::new(CallLineReconciler::new(
            Arc::clone(&store),
            Arc::clone(&events),
            Arc::clone(&recordings),
            phones.clone(),
        ));
        let logs = Arc::new(CallLogMatcher::new(
            Arc::clone(&campaign_api),
            Arc::clone(&lines),
            phones.clone(),
        ));
        let incoming = Arc::new(IncomingCallSync::new(
            carrier,
            Arc::clone(&store),
            events,
            phones,
        ));
        let actions = Arc::new(CampaignActions::new(
            Arc::clone(&campaign_api),
            Arc::clone(&store),
            Arc::clone(&campaigns),
        ));
        let job = Arc::new(FullSyncJob::new(
            campaign_api,
            Arc::clone(&store),
            Arc::clone(&campaigns),
            Arc::clone(&lines),
            Arc::clone(&logs),
            Arc::clone(&settings),
        ));

        Self {
            store,
            campaigns,
            lines,
            logs,
            recordings,
            incoming,
            actions,
            job,
            coordinator: SyncCoordinator::new(settings.cooldown),
        }
    }

    pub fn store(&self) -> &Arc<dyn SyncStore> {
        &self.store
    }

    pub fn actions(&self) -> &CampaignActions {
        &self.actions
    }

    /// Reconcile a batch of raw campaign snapshots for `user_id`.
    pub async fn reconcile_campaigns(&self, snapshots: &[Value], user_id: DbId) -> BatchSummary {
        self.campaigns.reconcile_campaigns(snapshots, user_id).await
    }

    /// Merge a campaign's contact list into its call lines.
    pub async fn reconcile_lines(&self, contacts: &[Value], campaign: &Campaign) -> usize {
        self.lines.reconcile_lines(contacts, campaign).await
    }

    /// Sweep the call-log feed for one campaign.
    pub async fn sync_call_lines_from_logs(&self, sweep: LogSweep<'_>) -> LogSyncSummary {
        self.logs.sync_from_logs(sweep).await
    }

    /// Start (or join) the background sync of `scope`. Never blocks on the
    /// sync itself; await the handle only if the outcome matters.
    pub fn trigger_background_sync(&self, scope: &str, filters: SyncFilters) -> SyncHandle {
        let job = Arc::clone(&self.job);
        self.coordinator
            .trigger(scope, move || async move { job.run(&filters).await })
    }

    /// Cached campaigns of `filters.user_id`, refreshing `scope` in the
    /// background. The refresh is visible to the next read.
    pub async fn cached_campaigns(
        &self,
        scope: &str,
        filters: SyncFilters,
    ) -> Result<Vec<Campaign>, SyncError> {
        let user_id = filters.user_id;
        drop(self.trigger_background_sync(scope, filters));
        Ok(self.store.list_campaigns(user_id).await?)
    }

    pub fn sync_state(&self, scope: &str) -> ScopeSnapshot {
        self.coordinator.state(scope)
    }

    /// Run a full sync inline, bypassing the coordinator.
    pub async fn run_full_sync(&self, filters: &SyncFilters) -> Result<SyncReport, SyncError> {
        self.job.run(filters).await
    }

    pub async fn resolve_recording(
        &self,
        destination: &str,
        origin: &str,
        approx: Timestamp,
    ) -> Option<String> {
        self.recordings.resolve(destination, origin, approx).await
    }

    pub async fn resolve_recordings(&self, requests: Vec<RecordingRequest>) -> Vec<Option<String>> {
        self.recordings.resolve_many(requests).await
    }

    pub async fn fetch_recording(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        Ok(self.recordings.fetch_recording(url).await?)
    }

    pub async fn sync_incoming_calls(
        &self,
        number: &str,
        since: Timestamp,
        until: Timestamp,
    ) -> Result<IncomingSummary, SyncError> {
        self.incoming.sync_incoming_calls(number, since, until).await
    }
}
