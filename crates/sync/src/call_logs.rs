//! Attribution of the global call-log feed to one campaign.

use std::collections::HashSet;
use std::sync::Arc;

use callsync_core::call_log::{CallLogEntry, CampaignTarget};
use callsync_core::fields::{extract_rows, LOG_WRAPPERS};
use callsync_core::phone::PhoneNormalizer;
use callsync_core::types::DbId;
use callsync_db::models::call_line::UpdateCallLine;
use callsync_db::models::campaign::Campaign;
use callsync_upstream::CampaignGateway;
use serde::Serialize;

use crate::call_lines::{CallLineReconciler, LineKey, LineWrite};

/// Parameters of one sweep over the feed.
#[derive(Debug, Clone, Copy)]
pub struct LogSweep<'a> {
    pub campaign_id: DbId,
    pub campaign: &'a Campaign,
    pub page_size: u32,
    pub max_pages: u32,
}

/// Outcome of one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogSyncSummary {
    /// Entries attributed to the campaign.
    pub matched: usize,
    /// Lines inserted.
    pub upserted: usize,
    /// Existing lines changed.
    pub updated: usize,
    pub pages: u32,
    /// Set when a page fetch ended the sweep early.
    pub error: Option<String>,
}

/// Sweeps the call-log feed page by page and upserts matching entries.
pub struct CallLogMatcher {
    gateway: Arc<dyn CampaignGateway>,
    lines: Arc<CallLineReconciler>,
    phones: PhoneNormalizer,
}

impl CallLogMatcher {
    pub fn new(
        gateway: Arc<dyn CampaignGateway>,
        lines: Arc<CallLineReconciler>,
        phones: PhoneNormalizer,
    ) -> Self {
        Self {
            gateway,
            lines,
            phones,
        }
    }

    /// Run one sweep.
    ///
    /// Pages are fetched strictly one after another. The sweep stops on a
    /// short page, at `max_pages`, or on the first failed page (results so
    /// far are kept). Entries repeated within the sweep are skipped.
    pub async fn sync_from_logs(&self, sweep: LogSweep<'_>) -> LogSyncSummary {
        let campaign = sweep.campaign;
        let target = CampaignTarget::new(
            &campaign.contact_numbers,
            campaign.origin_number.as_deref(),
            campaign.agent_name.as_deref(),
            &self.phones,
        );
        let mut summary = LogSyncSummary::default();
        if target.is_unmatchable() {
            tracing::debug!(campaign_id = sweep.campaign_id, "No contacts or origin number, log sweep skipped");
            return summary;
        }

        let page_size = sweep.page_size.max(1);
        let mut seen: HashSet<String> = HashSet::new();

        for page in 1..=sweep.max_pages {
            let payload = match self.gateway.call_logs(page, page_size).await {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(campaign_id = sweep.campaign_id, page, error = %e, "Call log page failed, ending sweep");
                    summary.error = Some(e.to_string());
                    break;
                }
            };
            summary.pages = page;

            let rows = extract_rows(&payload, LOG_WRAPPERS);
            for row in rows {
                let Some(entry) = CallLogEntry::from_value(row, &self.phones) else {
                    continue;
                };
                if !seen.insert(entry.external_call_id.clone()) {
                    continue;
                }
                if target.attribute(&entry).is_none() {
                    continue;
                }
                summary.matched += 1;
                self.upsert_entry(sweep.campaign_id, &entry, &mut summary).await;
            }

            if rows.len() < page_size as usize {
                break;
            }
        }

        tracing::debug!(
            campaign_id = sweep.campaign_id,
            matched = summary.matched,
            upserted = summary.upserted,
            updated = summary.updated,
            pages = summary.pages,
            "Call log sweep finished"
        );
        summary
    }

    async fn upsert_entry(&self, campaign_id: DbId, entry: &CallLogEntry, summary: &mut LogSyncSummary) {
        if entry.to_number.is_empty() {
            tracing::debug!(
                campaign_id,
                call_id = %entry.external_call_id,
                "Matched log entry has no destination, not stored"
            );
            return;
        }

        let key = LineKey {
            campaign_id,
            external_call_id: Some(entry.external_call_id.clone()),
            destination: entry.to_number.clone(),
        };
        match self.lines.upsert_line(&key, entry_fields(entry)).await {
            Ok(LineWrite::Created(_)) => summary.upserted += 1,
            Ok(LineWrite::Updated(_)) => summary.updated += 1,
            Ok(LineWrite::Unchanged(_)) => {}
            Err(e) => tracing::warn!(
                campaign_id,
                call_id = %entry.external_call_id,
                error = %e,
                "Call line upsert from log failed"
            ),
        }
    }
}

/// Line fields carried by a feed entry. Absent values stay `None` so an
/// update never clears what an earlier source filled in.
pub fn entry_fields(entry: &CallLogEntry) -> UpdateCallLine {
    let metadata = entry.metadata();
    UpdateCallLine {
        external_call_id: None,
        call_time: entry.call_time,
        status: entry.status.map(|s| s.as_str().to_string()),
        interaction: entry.interaction.map(|i| i.as_str().to_string()),
        duration_secs: entry.duration_secs,
        recording_url: entry.recording_url.clone(),
        transcript: entry.transcript.clone(),
        metadata: metadata
            .as_object()
            .filter(|m| !m.is_empty())
            .map(|_| metadata.clone()),
    }
}
