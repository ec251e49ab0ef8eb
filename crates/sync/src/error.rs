use callsync_core::error::CoreError;
use callsync_upstream::GatewayError;

use crate::store::StoreError;

/// Failures surfaced by engine operations.
///
/// Background sync never returns these to a request; they end up in logs
/// and in the scope's `last_error`.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Upstream: {0}")]
    Gateway(#[from] GatewayError),

    #[error("Store: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl SyncError {
    /// Shorthand for a missing local record.
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::Core(CoreError::NotFound {
            entity,
            key: key.to_string(),
        })
    }
}
