pub mod config;
pub mod error;
pub mod geo;
pub mod model;
pub mod net;
pub mod queue;
pub mod remote;
pub mod search;
pub mod service;
pub mod storage;
pub mod sync;

pub use config::SyncConfig;
pub use error::{CoreError, CoreResult};
pub use geo::{distance_meters, GeoPoint};
pub use model::{MutationAction, MutationItem, MutationStatus, Zone};
pub use net::NetworkMonitor;
pub use queue::{DrainReport, MutationQueue};
pub use remote::{HttpRemote, Page, RemoteApi};
pub use search::{MatchKind, Provenance, SearchEngine, SearchResult};
pub use service::OfflineDirectory;
pub use storage::{Collection, LocalStore, StorageEstimate};
pub use sync::{SyncOrchestrator, SyncState, SyncStatus};
