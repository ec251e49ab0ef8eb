//! The call and campaign synchronization engine.
//!
//! Reconciles upstream campaign snapshots, per-contact call lines, the
//! global call-log feed and inbound carrier calls into the local store.
//!
//! - [`campaigns::CampaignReconciler`]: snapshot merge with the cache policy.
//! - [`call_lines::CallLineReconciler`]: contact-list driven line upserts.
//! - [`call_logs::CallLogMatcher`]: sequential sweep of the call-log feed.
//! - [`recordings::RecordingResolver`]: carrier recording lookup.
//! - [`incoming::IncomingCallSync`]: inbound calls to provisioned numbers.
//! - [`actions::CampaignActions`]: create / pause / resume / reschedule / cancel.
//! - [`coordinator::SyncCoordinator`]: single-flight, cooldown-gated triggers.
//! - [`engine::SyncEngine`]: the facade callers hold.
//!
//! Persistence goes through [`store::SyncStore`]; change notifications
//! through [`callsync_events::EventSink`].

pub mod actions;
pub mod call_lines;
pub mod call_logs;
pub mod campaigns;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod incoming;
pub mod job;
pub mod recordings;
pub mod settings;
pub mod store;

pub use coordinator::{ScopeSnapshot, SyncCoordinator, SyncHandle};
pub use engine::{SyncEngine, SyncFilters};
pub use error::SyncError;
pub use job::SyncReport;
pub use settings::SyncSettings;
pub use store::{MemoryStore, PgStore, StoreError, SyncStore};
