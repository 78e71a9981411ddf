//! Staged replication driver.

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use super::{AbortHandle, SyncState, SyncStatus};
use crate::config::SyncConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::{meta_keys, GeodataBlob};
use crate::net::NetworkMonitor;
use crate::remote::RemoteApi;
use crate::storage::{Collection, LocalStore};

/// Progress checkpoints: reference data, then priority zones, then the
/// background remainder scales to 100.
const PROGRESS_REFERENCE_DONE: u8 = 10;
const PROGRESS_PRIORITY_DONE: u8 = 25;

const COUNTRY_BOUNDARY_ID: &str = "boundary-country";

/// Drives progressive replication from the remote directory into the
/// local store and publishes a status stream.
pub struct SyncOrchestrator {
    store: Arc<LocalStore>,
    remote: Arc<dyn RemoteApi>,
    network: NetworkMonitor,
    config: SyncConfig,
    state_tx: watch::Sender<SyncState>,
    is_syncing: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl SyncOrchestrator {
    pub fn new(
        store: Arc<LocalStore>,
        remote: Arc<dyn RemoteApi>,
        network: NetworkMonitor,
        config: SyncConfig,
    ) -> Self {
        let mut state = SyncState::initial(network.is_online());
        state.last_sync_at = last_sync_at(&store);
        state.is_search_ready = store.count(Collection::Zones).map(|c| c > 0).unwrap_or(false);
        if state.is_search_ready && state.status == SyncStatus::Idle {
            state.status = SyncStatus::Ready;
        }
        let (state_tx, _) = watch::channel(state);

        Self {
            store,
            remote,
            network,
            config,
            state_tx,
            is_syncing: Arc::new(AtomicBool::new(false)),
            abort: AbortHandle::default(),
        }
    }

    /// Subscribe to the status stream.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state_tx.subscribe()
    }

    pub fn current_state(&self) -> SyncState {
        self.state_tx.borrow().clone()
    }

    /// Handle for cancelling an in-flight sync.
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }

    /// Reflect the mutation-queue depth on the status stream.
    pub fn set_pending_mutations(&self, count: usize) {
        self.state_tx.send_modify(|state| state.pending_mutations = count);
    }

    /// React to a connectivity transition. Going online only updates the
    /// status; the caller decides when to run `sync_if_needed`.
    pub fn handle_network_change(&self, online: bool) {
        self.state_tx.send_modify(|state| {
            if !online {
                state.status = SyncStatus::Offline;
            } else if state.status == SyncStatus::Offline {
                state.status = if state.is_search_ready {
                    SyncStatus::Ready
                } else {
                    SyncStatus::Idle
                };
            }
        });
    }

    /// True when the cache is missing or older than the configured
    /// staleness threshold.
    pub fn is_stale(&self) -> bool {
        let zones_cached = self.store.count(Collection::Zones).unwrap_or(0) > 0;
        if !zones_cached {
            return true;
        }
        match last_sync_at(&self.store) {
            Some(at) => {
                let age = Utc::now().signed_duration_since(at);
                age.to_std().map(|d| d > self.config.staleness_threshold).unwrap_or(false)
            }
            None => true,
        }
    }

    /// Replicate if the cache is stale or absent; a no-op on fresh data
    /// and while offline. Never runs two syncs concurrently.
    pub async fn sync_if_needed(&self) -> CoreResult<()> {
        if !self.network.is_online() {
            self.state_tx.send_modify(|s| s.status = SyncStatus::Offline);
            return Ok(());
        }

        if !self.is_stale() {
            self.state_tx.send_modify(|s| {
                s.is_search_ready = true;
                s.status = SyncStatus::Ready;
            });
            return Ok(());
        }

        self.run_guarded().await
    }

    /// Clear replicated collections and rerun replication from stage 1.
    /// The mutation queue is untouched. Refused while offline: clearing
    /// without being able to restock would leave nothing to search.
    pub async fn force_resync(&self) -> CoreResult<()> {
        if !self.network.is_online() {
            return Err(CoreError::NetworkUnavailable);
        }
        if self.is_syncing.load(Ordering::Acquire) {
            return Err(CoreError::SyncIncomplete("sync already in progress".to_string()));
        }

        for collection in [
            Collection::Zones,
            Collection::Wards,
            Collection::Regions,
            Collection::Districts,
            Collection::Addresses,
            Collection::Geodata,
        ] {
            self.store.clear(collection)?;
        }
        self.store.meta_remove(meta_keys::LAST_SYNC_AT)?;
        self.store.meta_remove(meta_keys::WARDS_LOADED)?;
        self.state_tx.send_modify(|s| {
            s.is_search_ready = false;
            s.progress_pct = 0;
            s.last_sync_at = None;
        });

        self.run_guarded().await
    }

    async fn run_guarded(&self) -> CoreResult<()> {
        if self
            .is_syncing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(());
        }
        self.abort.reset();

        let result = self.run_sync().await;
        self.is_syncing.store(false, Ordering::Release);

        match result {
            Ok(()) => Ok(()),
            Err(e) => {
                let search_ready = self.store.count(Collection::Zones).unwrap_or(0) > 0;
                let aborted = self.abort.is_aborted();
                self.state_tx.send_modify(|s| {
                    s.is_search_ready = search_ready;
                    if aborted {
                        s.status = if search_ready { SyncStatus::Ready } else { SyncStatus::Idle };
                        s.message = Some("sync aborted".to_string());
                    } else {
                        s.status = SyncStatus::Error;
                        s.message = Some(if search_ready {
                            format!("sync failed, serving cached data: {}", e)
                        } else {
                            e.to_string()
                        });
                    }
                });
                if aborted {
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }

    async fn run_sync(&self) -> CoreResult<()> {
        info!("Starting staged replication");
        self.state_tx.send_modify(|s| {
            s.status = SyncStatus::Syncing;
            s.progress_pct = 0;
            s.message = None;
        });

        self.replicate_reference_data().await?;
        self.bump_progress(PROGRESS_REFERENCE_DONE);

        self.replicate_priority_zones().await?;
        self.state_tx.send_modify(|s| {
            s.is_search_ready = true;
            s.status = SyncStatus::Ready;
        });
        self.bump_progress(PROGRESS_PRIORITY_DONE);
        info!("Priority zones cached; search is ready");

        // Country boundary is an independent cache with its own TTL; a
        // failure here must not block zone replication.
        if let Err(e) = self.refresh_boundary().await {
            warn!("Boundary refresh failed: {}", e);
        }

        self.replicate_remainder().await?;

        let now = Utc::now();
        self.store.meta_put(meta_keys::LAST_SYNC_AT, &now.to_rfc3339())?;
        self.state_tx.send_modify(|s| {
            s.status = SyncStatus::Complete;
            s.progress_pct = 100;
            s.last_sync_at = Some(now);
        });
        info!("Replication complete");
        Ok(())
    }

    /// Stage 1: wards plus the small region/district reference collections.
    async fn replicate_reference_data(&self) -> CoreResult<()> {
        let remote = Arc::clone(&self.remote);
        let regions = self
            .fetch_with_retry("regions", move || {
                let remote = Arc::clone(&remote);
                async move { remote.fetch_regions().await }
            })
            .await?;
        self.store.put_many(&regions)?;

        let remote = Arc::clone(&self.remote);
        let districts = self
            .fetch_with_retry("districts", move || {
                let remote = Arc::clone(&remote);
                async move { remote.fetch_districts().await }
            })
            .await?;
        self.store.put_many(&districts)?;

        let remote = Arc::clone(&self.remote);
        let wards = self
            .fetch_with_retry("wards", move || {
                let remote = Arc::clone(&remote);
                async move { remote.fetch_wards().await }
            })
            .await?;
        info!("Replicated {} wards, {} districts, {} regions", wards.len(), districts.len(), regions.len());
        self.store.put_many(&wards)?;
        self.store.meta_put(meta_keys::WARDS_LOADED, "true")?;
        Ok(())
    }

    /// Stage 2: a fixed page of zones for each priority district, stored
    /// incrementally so search becomes usable as early as possible.
    async fn replicate_priority_zones(&self) -> CoreResult<()> {
        let page_size = self.config.priority_page_size;
        for district in &self.config.priority_districts {
            let remote = Arc::clone(&self.remote);
            let district_name = district.clone();
            let page = self
                .fetch_with_retry("priority zones", move || {
                    let remote = Arc::clone(&remote);
                    let district_name = district_name.clone();
                    async move { remote.fetch_zones(Some(&district_name), 0, page_size).await }
                })
                .await?;
            info!("Replicated {} priority zones for '{}'", page.items.len(), district);
            self.store.put_many(&page.items)?;
        }
        Ok(())
    }

    /// Stage 3: page through every remaining offset window, yielding
    /// between chunks so callers are not starved.
    async fn replicate_remainder(&self) -> CoreResult<()> {
        let chunk_size = self.config.chunk_size;

        let remote = Arc::clone(&self.remote);
        let first = self
            .fetch_with_retry("zone count", move || {
                let remote = Arc::clone(&remote);
                async move { remote.fetch_zones(None, 0, 1).await }
            })
            .await?;
        let total = first.total_count;
        if total == 0 {
            return Ok(());
        }

        let mut offset = 0u64;
        while offset < total {
            let remote = Arc::clone(&self.remote);
            let page = self
                .fetch_with_retry("zone chunk", move || {
                    let remote = Arc::clone(&remote);
                    async move { remote.fetch_zones(None, offset, chunk_size).await }
                })
                .await?;
            if page.items.is_empty() {
                break;
            }
            self.store.put_many(&page.items)?;
            offset += page.items.len() as u64;

            let pct = PROGRESS_PRIORITY_DONE as u64
                + (100 - PROGRESS_PRIORITY_DONE as u64) * offset.min(total) / total;
            self.bump_progress(pct as u8);

            tokio::time::sleep(self.config.chunk_pause).await;
        }

        Ok(())
    }

    /// Refresh the country boundary when its 7-day TTL has lapsed.
    async fn refresh_boundary(&self) -> CoreResult<()> {
        if let Some(blob) = self.store.get::<GeodataBlob>(COUNTRY_BOUNDARY_ID)? {
            let age = Utc::now().signed_duration_since(blob.cached_at);
            if age.to_std().map(|d| d <= self.config.geodata_ttl).unwrap_or(true) {
                return Ok(());
            }
        }

        let remote = Arc::clone(&self.remote);
        let geometry = self
            .fetch_with_retry("country boundary", move || {
                let remote = Arc::clone(&remote);
                async move { remote.fetch_boundary(COUNTRY_BOUNDARY_ID).await }
            })
            .await?;
        self.store.put(&GeodataBlob {
            id: COUNTRY_BOUNDARY_ID.to_string(),
            geometry,
            cached_at: Utc::now(),
        })
    }

    /// Bounded retries on the fixed schedule; only transient failures are
    /// retried. The abort flag is checked before every attempt.
    async fn fetch_with_retry<T, F, Fut>(&self, what: &str, op: F) -> CoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = CoreResult<T>>,
    {
        let mut attempt = 0;
        loop {
            if self.abort.is_aborted() {
                return Err(CoreError::SyncIncomplete("sync aborted".to_string()));
            }

            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.config.retry_schedule.len() => {
                    let delay = self.config.retry_schedule[attempt];
                    warn!(
                        "Fetching {} failed (attempt {}), retrying in {:?}: {}",
                        what,
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn bump_progress(&self, pct: u8) {
        self.state_tx.send_modify(|s| s.progress_pct = s.progress_pct.max(pct));
    }

    /// Zones currently cached; used by callers deciding degraded modes.
    pub fn cached_zone_count(&self) -> usize {
        self.store.count(Collection::Zones).unwrap_or(0)
    }
}

fn last_sync_at(store: &LocalStore) -> Option<DateTime<Utc>> {
    store
        .meta_get(meta_keys::LAST_SYNC_AT)
        .ok()
        .flatten()
        .and_then(|v| DateTime::parse_from_rfc3339(&v).ok())
        .map(|t| t.with_timezone(&Utc))
}
