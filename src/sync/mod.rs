//! Progressive replication of remote reference data.
//!
//! Staged: wards and reference rows first, a prioritized subset of zones
//! second (after which search is usable), the remainder in background
//! chunks. Partial replication is a safe intermediate state, never a
//! failure.

mod orchestrator;

pub use orchestrator::SyncOrchestrator;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Orchestrator lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Idle,
    Syncing,
    /// Priority zones are cached; search is usable even though full
    /// replication may still be running or may have failed.
    Ready,
    Error,
    Offline,
    Complete,
}

/// Snapshot published on the status stream.
#[derive(Debug, Clone, Serialize)]
pub struct SyncState {
    pub status: SyncStatus,
    /// Monotonically increasing within one sync run
    pub progress_pct: u8,
    pub pending_mutations: usize,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub is_search_ready: bool,
    pub message: Option<String>,
}

impl SyncState {
    pub fn initial(online: bool) -> Self {
        Self {
            status: if online { SyncStatus::Idle } else { SyncStatus::Offline },
            progress_pct: 0,
            pending_mutations: 0,
            last_sync_at: None,
            is_search_ready: false,
            message: None,
        }
    }
}

/// Cooperative cancellation for a sync in progress. Aborting stops further
/// remote fetches; rows already stored are kept.
#[derive(Debug, Clone, Default)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }

    /// Re-arm for the next sync run.
    pub(crate) fn reset(&self) {
        self.aborted.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abort_handle_lifecycle() {
        let handle = AbortHandle::default();
        assert!(!handle.is_aborted());
        handle.abort();
        assert!(handle.is_aborted());
        handle.reset();
        assert!(!handle.is_aborted());
    }

    #[test]
    fn test_initial_state_tracks_connectivity() {
        assert_eq!(SyncState::initial(true).status, SyncStatus::Idle);
        assert_eq!(SyncState::initial(false).status, SyncStatus::Offline);
    }
}
