//! Runtime configuration with environment overrides.

use std::time::Duration;

/// Tuning knobs for replication, staleness and the mutation queue.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Base URL of the remote directory API
    pub api_url: String,
    /// Reference data older than this is re-replicated on `sync_if_needed`
    pub staleness_threshold: Duration,
    /// Districts replicated ahead of the background remainder: the capital
    /// region plus the two largest districts
    pub priority_districts: Vec<String>,
    /// Page size for the priority-district stage
    pub priority_page_size: u64,
    /// Offset window size for the background remainder
    pub chunk_size: u64,
    /// Pause between background chunks so callers are not starved
    pub chunk_pause: Duration,
    /// Geometry blobs expire after this, independent of other caches
    pub geodata_ttl: Duration,
    /// Fixed retry schedule for remote fetches during sync
    pub retry_schedule: Vec<Duration>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/api/v1".to_string(),
            staleness_threshold: Duration::from_secs(12 * 3600),
            priority_districts: vec![
                "Western Area Urban".to_string(),
                "Western Area Rural".to_string(),
                "Bo".to_string(),
            ],
            priority_page_size: 500,
            chunk_size: 1000,
            chunk_pause: Duration::from_millis(25),
            geodata_ttl: Duration::from_secs(7 * 24 * 3600),
            retry_schedule: vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(30),
            ],
        }
    }
}

impl SyncConfig {
    /// Defaults with `ZONEPOST_*` environment overrides applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(url) = std::env::var("ZONEPOST_API_URL") {
            config.api_url = url;
        }
        if let Some(hours) = env_parse::<u64>("ZONEPOST_STALENESS_HOURS") {
            config.staleness_threshold = Duration::from_secs(hours * 3600);
        }
        if let Some(size) = env_parse::<u64>("ZONEPOST_CHUNK_SIZE") {
            config.chunk_size = size.max(1);
        }
        if let Some(size) = env_parse::<u64>("ZONEPOST_PRIORITY_PAGE_SIZE") {
            config.priority_page_size = size.max(1);
        }
        if let Some(days) = env_parse::<u64>("ZONEPOST_GEODATA_TTL_DAYS") {
            config.geodata_ttl = Duration::from_secs(days * 24 * 3600);
        }

        config
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}
