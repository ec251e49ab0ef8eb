//! Single-flight, cooldown-gated background sync per scope.
//!
//! Each scope key (an admin view, one user) is either idle or running one
//! sync. A trigger while running joins the running sync; a trigger within
//! the cooldown after completion gets the completed outcome back. Work is
//! spawned, so callers may drop the handle and serve cached data.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use callsync_core::types::Timestamp;
use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::error::SyncError;
use crate::job::SyncReport;

/// Outcome shared by every caller of one run. Errors are rendered to text
/// so the outcome can be cloned to all of them.
pub type SyncOutcome = Result<SyncReport, String>;

/// Awaitable handle on a (possibly already finished) sync run.
pub type SyncHandle = Shared<BoxFuture<'static, SyncOutcome>>;

#[derive(Default)]
struct ScopeState {
    running: Option<SyncHandle>,
    last: Option<SyncHandle>,
    last_run_at: Option<Timestamp>,
    finished_at: Option<Instant>,
    last_error: Option<String>,
    last_result: Option<SyncReport>,
}

/// Serializable view of one scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScopeSnapshot {
    pub scope: String,
    pub in_progress: bool,
    pub last_run_at: Option<Timestamp>,
    pub last_error: Option<String>,
    pub last_result: Option<SyncReport>,
    pub cooldown_remaining_secs: u64,
}

/// Owns the per-scope sync state. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SyncCoordinator {
    scopes: Arc<Mutex<HashMap<String, ScopeState>>>,
    cooldown: Duration,
}

impl SyncCoordinator {
    pub fn new(cooldown: Duration) -> Self {
        Self {
            scopes: Arc::new(Mutex::new(HashMap::new())),
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Start `work` for `scope` unless a run is in flight or the scope is
    /// cooling down, in which case the existing handle is returned and
    /// `work` is dropped without being called.
    ///
    /// The scope is claimed before `work` is called and the state lock is
    /// released by then, so `work` may inspect [`state`](Self::state).
    /// Must be called from within a Tokio runtime.
    pub fn trigger<F, Fut>(&self, scope: &str, work: F) -> SyncHandle
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<SyncReport, SyncError>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel::<SyncOutcome>();
        let handle = {
            let mut scopes = lock(&self.scopes);
            let state = scopes.entry(scope.to_string()).or_default();

            if let Some(running) = &state.running {
                tracing::debug!(scope, "Sync already running, joining");
                return running.clone();
            }
            if let (Some(finished), Some(last)) = (state.finished_at, &state.last) {
                if finished.elapsed() < self.cooldown {
                    tracing::debug!(scope, "Sync cooling down, returning last outcome");
                    return last.clone();
                }
            }

            let handle: SyncHandle = async move {
                rx.await
                    .unwrap_or_else(|_| Err("sync task aborted".to_string()))
            }
            .boxed()
            .shared();
            state.running = Some(handle.clone());
            state.last = Some(handle.clone());
            state.last_run_at = Some(Utc::now());
            handle
        };

        tracing::info!(scope, "Background sync started");
        let scope_key = scope.to_string();
        match std::panic::catch_unwind(AssertUnwindSafe(work)) {
            Ok(run) => {
                let scopes = Arc::clone(&self.scopes);
                tokio::spawn(async move {
                    let outcome = match AssertUnwindSafe(run).catch_unwind().await {
                        Ok(Ok(report)) => Ok(report),
                        Ok(Err(e)) => Err(e.to_string()),
                        Err(_) => Err("sync run panicked".to_string()),
                    };
                    finish(&scopes, &scope_key, &outcome);
                    let _ = tx.send(outcome);
                });
            }
            Err(_) => {
                let outcome: SyncOutcome = Err("sync run panicked".to_string());
                finish(&self.scopes, &scope_key, &outcome);
                let _ = tx.send(outcome);
            }
        }
        handle
    }

    /// Current state of `scope`. Unknown scopes report as idle.
    pub fn state(&self, scope: &str) -> ScopeSnapshot {
        let scopes = lock(&self.scopes);
        let Some(state) = scopes.get(scope) else {
            return ScopeSnapshot {
                scope: scope.to_string(),
                in_progress: false,
                last_run_at: None,
                last_error: None,
                last_result: None,
                cooldown_remaining_secs: 0,
            };
        };

        let cooldown_remaining_secs = match (&state.running, state.finished_at) {
            (None, Some(finished)) => self
                .cooldown
                .saturating_sub(finished.elapsed())
                .as_secs_f64()
                .ceil() as u64,
            _ => 0,
        };
        ScopeSnapshot {
            scope: scope.to_string(),
            in_progress: state.running.is_some(),
            last_run_at: state.last_run_at,
            last_error: state.last_error.clone(),
            last_result: state.last_result.clone(),
            cooldown_remaining_secs,
        }
    }
}

fn finish(scopes: &Mutex<HashMap<String, ScopeState>>, scope: &str, outcome: &SyncOutcome) {
    let mut scopes = lock(scopes);
    let state = scopes.entry(scope.to_string()).or_default();
    state.running = None;
    state.finished_at = Some(Instant::now());
    match outcome {
        Ok(report) => {
            tracing::info!(scope, run_id = %report.run_id, "Background sync finished");
            state.last_error = None;
            state.last_result = Some(report.clone());
        }
        Err(e) => {
            tracing::error!(scope, error = %e, "Background sync failed");
            state.last_error = Some(e.clone());
        }
    }
}

fn lock(scopes: &Mutex<HashMap<String, ScopeState>>) -> MutexGuard<'_, HashMap<String, ScopeState>> {
    scopes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
