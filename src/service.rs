//! Facade wiring the store, remote client, search, sync and queue into a
//! single handle for embedders.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::SyncConfig;
use crate::error::{CoreError, CoreResult};
use crate::model::Zone;
use crate::net::NetworkMonitor;
use crate::queue::{DrainReport, MutationQueue};
use crate::remote::{HttpRemote, RemoteApi};
use crate::search::{SearchEngine, SearchResult};
use crate::storage::{LocalStore, StorageEstimate};
use crate::sync::{SyncOrchestrator, SyncState};

/// One handle over the whole offline directory. All components are wired
/// explicitly at construction; there is no global state.
pub struct OfflineDirectory {
    store: Option<Arc<LocalStore>>,
    network: NetworkMonitor,
    search: SearchEngine,
    sync: Option<SyncOrchestrator>,
    queue: Option<MutationQueue>,
}

impl OfflineDirectory {
    /// Open with an HTTP remote built from the config's API URL.
    pub fn init<P: AsRef<Path>>(
        data_dir: P,
        config: SyncConfig,
        online: bool,
    ) -> CoreResult<Self> {
        let remote: Arc<dyn RemoteApi> = Arc::new(HttpRemote::new(&config.api_url));
        Self::init_with_remote(data_dir, config, remote, online)
    }

    /// Open with a caller-supplied remote implementation.
    ///
    /// A store that fails to open is not fatal: search degrades to
    /// remote-only and local writes are rejected.
    pub fn init_with_remote<P: AsRef<Path>>(
        data_dir: P,
        config: SyncConfig,
        remote: Arc<dyn RemoteApi>,
        online: bool,
    ) -> CoreResult<Self> {
        let network = NetworkMonitor::new(online);

        let store = match LocalStore::open(&data_dir) {
            Ok(store) => Some(Arc::new(store)),
            Err(e) => {
                warn!("Local store unavailable, running remote-only: {}", e);
                None
            }
        };

        let search = SearchEngine::new(store.clone(), Arc::clone(&remote), network.clone());
        let (sync, queue) = match &store {
            Some(store) => (
                Some(SyncOrchestrator::new(
                    Arc::clone(store),
                    Arc::clone(&remote),
                    network.clone(),
                    config,
                )),
                Some(MutationQueue::new(
                    Arc::clone(store),
                    Arc::clone(&remote),
                    network.clone(),
                )),
            ),
            None => (None, None),
        };

        info!(
            "Directory initialized ({}, {})",
            if store.is_some() { "local store open" } else { "remote-only" },
            if online { "online" } else { "offline" }
        );

        Ok(Self {
            store,
            network,
            search,
            sync,
            queue,
        })
    }

    // ==================== Connectivity ====================

    pub fn is_online(&self) -> bool {
        self.network.is_online()
    }

    /// Observe connectivity transitions.
    pub fn subscribe_network(&self) -> tokio::sync::watch::Receiver<bool> {
        self.network.subscribe()
    }

    /// Flip connectivity. Coming back online replays the mutation queue
    /// before anything else so remote reads observe local writes.
    pub async fn set_online(&self, online: bool) {
        self.network.set_online(online);
        if let Some(sync) = &self.sync {
            sync.handle_network_change(online);
        }
        if online {
            // Local writes replay before anything else so remote reads
            // observe them, then staleness is re-evaluated.
            if let Some(queue) = &self.queue {
                match queue.drain().await {
                    Ok(report) => self.publish_pending(report.remaining),
                    Err(e) => warn!("Queue drain on reconnect failed: {}", e),
                }
            }
            if let Some(sync) = &self.sync {
                if let Err(e) = sync.sync_if_needed().await {
                    warn!("Resync on reconnect failed: {}", e);
                }
            }
        }
    }

    // ==================== Search ====================

    /// Ranked free-text search. On a cold start with no cache and no
    /// network this returns empty; the sync state carries the signal.
    pub async fn search(&self, query: &str, limit: usize) -> CoreResult<Vec<SearchResult>> {
        match self.search.search_by_text(query, limit).await {
            Err(CoreError::NoDataAvailable) => Ok(vec![]),
            other => other,
        }
    }

    /// Zones within `radius_m` of a point, nearest first.
    pub async fn search_nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> CoreResult<Vec<SearchResult>> {
        match self.search.search_by_location(lat, lon, radius_m).await {
            Err(CoreError::NoDataAvailable) => Ok(vec![]),
            other => other,
        }
    }

    pub fn zone(&self, code: &str) -> CoreResult<Option<Zone>> {
        self.require_store()?.get(code)
    }

    pub fn zones_in_district(&self, district: &str) -> CoreResult<Vec<Zone>> {
        self.require_store()?.get_all_by_index("district_name", district)
    }

    pub fn zones_in_ward(&self, ward_id: &str) -> CoreResult<Vec<Zone>> {
        self.require_store()?.get_all_by_index("ward_id", ward_id)
    }

    // ==================== Local writes ====================

    /// Create a zone locally; it becomes searchable immediately under a
    /// temporary id and is replayed to the remote on the next drain.
    pub fn create_zone_offline(&self, zone: Zone) -> CoreResult<Zone> {
        let created = self.require_queue()?.enqueue_create_zone(zone)?;
        self.refresh_pending()?;
        Ok(created)
    }

    pub fn update_zone_offline(&self, zone: Zone) -> CoreResult<Zone> {
        let updated = self.require_queue()?.enqueue_update_zone(zone)?;
        self.refresh_pending()?;
        Ok(updated)
    }

    pub fn delete_zone_offline(&self, code: &str) -> CoreResult<()> {
        self.require_queue()?.enqueue_delete_zone(code)?;
        self.refresh_pending()?;
        Ok(())
    }

    /// Replay queued mutations now.
    pub async fn drain_queue(&self) -> CoreResult<DrainReport> {
        let report = self.require_queue()?.drain().await?;
        self.publish_pending(report.remaining);
        Ok(report)
    }

    pub fn pending_mutations(&self) -> CoreResult<usize> {
        self.require_queue()?.pending_count()
    }

    // ==================== Sync ====================

    pub async fn sync_if_needed(&self) -> CoreResult<()> {
        self.require_sync()?.sync_if_needed().await
    }

    pub async fn force_resync(&self) -> CoreResult<()> {
        self.require_sync()?.force_resync().await
    }

    pub fn subscribe_sync_state(&self) -> CoreResult<watch::Receiver<SyncState>> {
        Ok(self.require_sync()?.subscribe())
    }

    pub fn sync_state(&self) -> CoreResult<SyncState> {
        Ok(self.require_sync()?.current_state())
    }

    pub fn abort_sync(&self) -> CoreResult<()> {
        self.require_sync()?.abort_handle().abort();
        Ok(())
    }

    // ==================== Introspection ====================

    pub fn storage_estimate(&self) -> CoreResult<StorageEstimate> {
        Ok(self.require_store()?.storage_estimate())
    }

    /// Direct store access, `None` when running remote-only.
    pub fn store(&self) -> Option<&Arc<LocalStore>> {
        self.store.as_ref()
    }

    // ==================== Internals ====================

    fn require_store(&self) -> CoreResult<&Arc<LocalStore>> {
        self.store
            .as_ref()
            .ok_or_else(|| CoreError::StorageUnavailable("local store not open".to_string()))
    }

    fn require_sync(&self) -> CoreResult<&SyncOrchestrator> {
        self.sync
            .as_ref()
            .ok_or_else(|| CoreError::StorageUnavailable("local store not open".to_string()))
    }

    fn require_queue(&self) -> CoreResult<&MutationQueue> {
        self.queue
            .as_ref()
            .ok_or_else(|| CoreError::StorageUnavailable("local store not open".to_string()))
    }

    fn refresh_pending(&self) -> CoreResult<()> {
        let count = self.require_queue()?.pending_count()?;
        self.publish_pending(count);
        Ok(())
    }

    fn publish_pending(&self, count: usize) {
        if let Some(sync) = &self.sync {
            sync.set_pending_mutations(count);
        }
    }
}
