//! Engine tuning knobs.

use std::time::Duration;

use callsync_core::phone::PhoneNormalizer;
use callsync_core::types::DbId;
use callsync_upstream::RetryPolicy;

/// Quiet period after a scope's sync completes.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(60);

/// Half-width of the recording search window.
pub const DEFAULT_RECORDING_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Concurrent recording requests per batch.
pub const DEFAULT_RECORDING_BATCH_SIZE: usize = 5;

/// Settings for one engine instance. The engine never reads the
/// environment; the worker builds this from its configuration.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub phones: PhoneNormalizer,
    /// Owner of campaigns first seen by a scope without a user (admin).
    pub default_owner: DbId,
    pub cooldown: Duration,
    pub campaign_page_size: u32,
    pub campaign_max_pages: u32,
    pub log_page_size: u32,
    pub log_max_pages: u32,
    pub recording_window: Duration,
    pub recording_batch_size: usize,
    /// Backoff applied to the campaign detail fetch during a full sync.
    pub detail_retry: RetryPolicy,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            phones: PhoneNormalizer::default(),
            default_owner: 1,
            cooldown: DEFAULT_COOLDOWN,
            campaign_page_size: 25,
            campaign_max_pages: 10,
            log_page_size: 50,
            log_max_pages: 10,
            recording_window: DEFAULT_RECORDING_WINDOW,
            recording_batch_size: DEFAULT_RECORDING_BATCH_SIZE,
            detail_retry: RetryPolicy::default(),
        }
    }
}

impl SyncSettings {
    /// Recording window as a signed duration for timestamp arithmetic.
    pub fn recording_half_width(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.recording_window)
            .unwrap_or_else(|_| chrono::Duration::minutes(15))
    }
}
