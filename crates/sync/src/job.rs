//! The full sync run the coordinator executes per scope.

use std::sync::Arc;

use callsync_core::campaign::{CONTACT_LIST, EXTERNAL_ID};
use callsync_core::fields::{extract_rows, LIST_WRAPPERS};
use callsync_core::types::{DbId, Timestamp};
use callsync_db::models::campaign::Campaign;
use callsync_upstream::{retry_with_backoff, CampaignGateway, GatewayError};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::Instrument;
use uuid::Uuid;

use crate::call_lines::CallLineReconciler;
use crate::call_logs::{CallLogMatcher, LogSweep, LogSyncSummary};
use crate::campaigns::{BatchSummary, CampaignReconciler};
use crate::engine::SyncFilters;
use crate::error::SyncError;
use crate::settings::SyncSettings;
use crate::store::SyncStore;

/// Result of one full sync run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub started_at: Timestamp,
    pub finished_at: Option<Timestamp>,
    pub campaigns: BatchSummary,
    pub lines_touched: usize,
    /// Call-log sweep totals over every refreshed campaign.
    pub logs: LogSyncSummary,
    /// Failures that did not stop the run.
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn begin() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            campaigns: BatchSummary::default(),
            lines_touched: 0,
            logs: LogSyncSummary::default(),
            errors: Vec::new(),
        }
    }

    fn absorb_sweep(&mut self, campaign_id: DbId, sweep: LogSyncSummary) {
        self.logs.matched += sweep.matched;
        self.logs.upserted += sweep.upserted;
        self.logs.updated += sweep.updated;
        self.logs.pages += sweep.pages;
        if let Some(e) = sweep.error {
            self.errors.push(format!("call logs for campaign {campaign_id}: {e}"));
        }
    }
}

/// List pages, then per campaign: details, contact list and log sweep.
pub struct FullSyncJob {
    gateway: Arc<dyn CampaignGateway>,
    store: Arc<dyn SyncStore>,
    campaigns: Arc<CampaignReconciler>,
    lines: Arc<CallLineReconciler>,
    logs: Arc<CallLogMatcher>,
    settings: Arc<SyncSettings>,
}

impl FullSyncJob {
    pub fn new(
        gateway: Arc<dyn CampaignGateway>,
        store: Arc<dyn SyncStore>,
        campaigns: Arc<CampaignReconciler>,
        lines: Arc<CallLineReconciler>,
        logs: Arc<CallLogMatcher>,
        settings: Arc<SyncSettings>,
    ) -> Self {
        Self {
            gateway,
            store,
            campaigns,
            lines,
            logs,
            settings,
        }
    }

    /// Run once. Only a failure on the first list page fails the run;
    /// anything later is recorded in [`SyncReport::errors`].
    pub async fn run(&self, filters: &SyncFilters) -> Result<SyncReport, SyncError> {
        let report = SyncReport::begin();
        let span = tracing::info_span!("full_sync", run_id = %report.run_id, user_id = ?filters.user_id);
        self.run_inner(filters, report).instrument(span).await
    }

    async fn run_inner(
        &self,
        filters: &SyncFilters,
        mut report: SyncReport,
    ) -> Result<SyncReport, SyncError> {
        let owner = filters.user_id.unwrap_or(self.settings.default_owner);
        let page_size = self.settings.campaign_page_size.max(1);
        let mut persisted: Vec<Campaign> = Vec::new();

        for page in 1..=self.settings.campaign_max_pages {
            let payload = match self
                .gateway
                .list_campaigns(page, page_size, filters.status.as_deref())
                .await
            {
                Ok(payload) => payload,
                Err(e) if page == 1 => {
                    tracing::error!(error = %e, "Campaign list unavailable, sync aborted");
                    return Err(e.into());
                }
                Err(e) => {
                    tracing::warn!(page, error = %e, "Campaign list page failed, continuing with what we have");
                    report.errors.push(format!("campaign list page {page}: {e}"));
                    break;
                }
            };

            let rows = extract_rows(&payload, LIST_WRAPPERS);
            for row in rows {
                match self.campaigns.reconcile(row, owner).await {
                    Ok(outcome) => {
                        report.campaigns.record(&outcome);
                        if let Some(campaign) = outcome.into_campaign() {
                            persisted.push(campaign);
                        }
                    }
                    Err(e) => {
                        report.campaigns.failed += 1;
                        tracing::warn!(page, error = %e, "Campaign snapshot failed to reconcile");
                        report.errors.push(format!("campaign snapshot: {e}"));
                    }
                }
            }
            if rows.len() < page_size as usize {
                break;
            }
        }

        for campaign in persisted {
            self.refresh_campaign(campaign, &mut report).await;
        }

        report.finished_at = Some(Utc::now());
        tracing::info!(
            created = report.campaigns.created,
            updated = report.campaigns.updated,
            skipped = report.campaigns.skipped,
            lines_touched = report.lines_touched,
            log_matches = report.logs.matched,
            errors = report.errors.len(),
            "Full sync finished"
        );
        Ok(report)
    }

    async fn refresh_campaign(&self, mut campaign: Campaign, report: &mut SyncReport) {
        let Some(external_id) = campaign.external_id.clone() else {
            return;
        };

        let detail = retry_with_backoff(&self.settings.detail_retry, "campaign_details", || {
            self.gateway.campaign_details(&external_id)
        })
        .await;

        match detail {
            Ok(detail) => {
                if let Some(refreshed) = self.apply_detail(&campaign, &external_id, &detail, report).await {
                    campaign = refreshed;
                }
            }
            Err(GatewayError::NotFound) => {
                tracing::debug!(campaign_id = campaign.id, external_id = %external_id, "No campaign detail this round");
            }
            Err(e) => {
                tracing::warn!(campaign_id = campaign.id, external_id = %external_id, error = %e, "Campaign detail failed");
                report.errors.push(format!("campaign {external_id} detail: {e}"));
            }
        }

        let sweep = self
            .logs
            .sync_from_logs(LogSweep {
                campaign_id: campaign.id,
                campaign: &campaign,
                page_size: self.settings.log_page_size,
                max_pages: self.settings.log_max_pages,
            })
            .await;
        report.absorb_sweep(campaign.id, sweep);
    }

    /// Reconcile the detail snapshot and contact list. Returns the campaign
    /// as stored afterwards.
    async fn apply_detail(
        &self,
        campaign: &Campaign,
        external_id: &str,
        detail: &Value,
        report: &mut SyncReport,
    ) -> Option<Campaign> {
        let mut snapshot = detail
            .get("details")
            .filter(|d| d.is_object())
            .unwrap_or(detail)
            .clone();
        if EXTERNAL_ID.text(&snapshot).is_none() {
            if let Value::Object(fields) = &mut snapshot {
                fields.insert("id".into(), external_id.into());
            }
        }

        if let Err(e) = self.campaigns.reconcile(&snapshot, campaign.user_id).await {
            tracing::warn!(campaign_id = campaign.id, error = %e, "Campaign detail failed to reconcile");
            report.errors.push(format!("campaign {external_id} detail: {e}"));
        }

        let contacts = CONTACT_LIST
            .array(detail)
            .or_else(|| CONTACT_LIST.array(&snapshot));
        if let Some(contacts) = contacts {
            report.lines_touched += self.lines.reconcile_lines(contacts, campaign).await;
        }

        match self.store.find_campaign(campaign.id).await {
            Ok(current) => current,
            Err(e) => {
                tracing::warn!(campaign_id = campaign.id, error = %e, "Campaign reload failed");
                None
            }
        }
    }
}
