//! Shared in-memory remote for integration tests: scripted failures and
//! per-endpoint call counters.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use zonepost::error::{CoreError, CoreResult};
use zonepost::model::{District, Region, SegmentType, Ward, Zone};
use zonepost::remote::{Page, RemoteApi, RemoteNearbyHit, RemoteSearchHit};

// ==================== Fixture data ====================

pub fn zone(code: &str, name: &str, district: &str, lat: f64, lon: f64) -> Zone {
    Zone {
        code: code.to_string(),
        name: name.to_string(),
        district_name: district.to_string(),
        region_name: "Western Area".to_string(),
        segment_type: SegmentType::Mixed,
        plus_code: None,
        geohash: None,
        center_lat: Some(lat),
        center_lon: Some(lon),
        ward_id: Some("WU-C1".to_string()),
        address_count: 10,
        search_text: None,
        alternate_names: vec![],
        landmarks: vec![],
    }
    .with_derived_geohash()
}

pub fn freetown_zones() -> Vec<Zone> {
    vec![
        zone("1100-001", "Central Freetown CBD", "Western Area Urban", 8.4657, -13.2317),
        zone("1100-002", "Tower Hill", "Western Area Urban", 8.4700, -13.2340),
        zone("1200-001", "Aberdeen", "Western Area Urban", 8.4855, -13.2860),
        zone("2300-001", "Bo Town Central", "Bo", 7.9564, -11.7400),
    ]
}

pub fn reference_wards() -> Vec<Ward> {
    vec![Ward {
        ward_id: "WU-C1".to_string(),
        name: "Central I".to_string(),
        district_code: "WU".to_string(),
        district_name: "Western Area Urban".to_string(),
        region_code: "W".to_string(),
        region_name: "Western Area".to_string(),
        zone_count: 3,
        address_count: 30,
        center_lat: Some(8.4657),
        center_lon: Some(-13.2317),
        geohash: None,
    }]
}

pub fn reference_districts() -> Vec<District> {
    vec![
        District {
            code: "WU".to_string(),
            name: "Western Area Urban".to_string(),
            region_code: "W".to_string(),
            locked: true,
            zone_count: 3,
        },
        District {
            code: "BO".to_string(),
            name: "Bo".to_string(),
            region_code: "S".to_string(),
            locked: true,
            zone_count: 1,
        },
    ]
}

pub fn reference_regions() -> Vec<Region> {
    vec![
        Region {
            code: "W".to_string(),
            name: "Western Area".to_string(),
            locked: true,
            district_count: 2,
        },
        Region {
            code: "S".to_string(),
            name: "Southern Province".to_string(),
            locked: true,
            district_count: 4,
        },
    ]
}

// ==================== Mock remote ====================

#[derive(Default)]
struct Counters {
    fetch_zones: AtomicUsize,
    fetch_wards: AtomicUsize,
    search_text: AtomicUsize,
    search_nearby: AtomicUsize,
    create_zone: AtomicUsize,
    update_zone: AtomicUsize,
    delete_zone: AtomicUsize,
    fetch_boundary: AtomicUsize,
}

pub struct MockRemote {
    zones: Mutex<Vec<Zone>>,
    counters: Counters,
    /// endpoint name -> queued (status, message) failures, popped per call
    failures: Mutex<HashMap<String, Vec<(u16, String)>>>,
    /// per-call artificial latency for `fetch_zones`
    fetch_zones_delay: Mutex<Option<Duration>>,
    next_server_code: AtomicUsize,
}

impl MockRemote {
    pub fn new(zones: Vec<Zone>) -> Self {
        Self {
            zones: Mutex::new(zones),
            counters: Counters::default(),
            failures: Mutex::new(HashMap::new()),
            fetch_zones_delay: Mutex::new(None),
            next_server_code: AtomicUsize::new(1),
        }
    }

    /// Slow down every `fetch_zones` call, for cancellation tests.
    pub fn set_fetch_zones_delay(&self, delay: Duration) {
        *self.fetch_zones_delay.lock().unwrap() = Some(delay);
    }

    /// Queue `count` failures with the given status for one endpoint.
    /// 503 is retryable, 422 is a permanent rejection.
    pub fn fail_times(&self, endpoint: &str, count: usize, status: u16) {
        let mut failures = self.failures.lock().unwrap();
        let queue = failures.entry(endpoint.to_string()).or_default();
        for _ in 0..count {
            queue.push((status, format!("scripted {} failure", endpoint)));
        }
    }

    pub fn calls(&self, endpoint: &str) -> usize {
        match endpoint {
            "fetch_zones" => self.counters.fetch_zones.load(Ordering::SeqCst),
            "fetch_wards" => self.counters.fetch_wards.load(Ordering::SeqCst),
            "search_text" => self.counters.search_text.load(Ordering::SeqCst),
            "search_nearby" => self.counters.search_nearby.load(Ordering::SeqCst),
            "create_zone" => self.counters.create_zone.load(Ordering::SeqCst),
            "update_zone" => self.counters.update_zone.load(Ordering::SeqCst),
            "delete_zone" => self.counters.delete_zone.load(Ordering::SeqCst),
            "fetch_boundary" => self.counters.fetch_boundary.load(Ordering::SeqCst),
            other => panic!("unknown endpoint {}", other),
        }
    }

    pub fn remote_zones(&self) -> Vec<Zone> {
        self.zones.lock().unwrap().clone()
    }

    fn check_failure(&self, endpoint: &str) -> CoreResult<()> {
        let mut failures = self.failures.lock().unwrap();
        if let Some(queue) = failures.get_mut(endpoint) {
            if !queue.is_empty() {
                let (status, message) = queue.remove(0);
                return Err(CoreError::RemoteRequestFailed { status, message });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn fetch_regions(&self) -> CoreResult<Vec<Region>> {
        self.check_failure("fetch_regions")?;
        Ok(reference_regions())
    }

    async fn fetch_districts(&self) -> CoreResult<Vec<District>> {
        self.check_failure("fetch_districts")?;
        Ok(reference_districts())
    }

    async fn fetch_wards(&self) -> CoreResult<Vec<Ward>> {
        self.counters.fetch_wards.fetch_add(1, Ordering::SeqCst);
        self.check_failure("fetch_wards")?;
        Ok(reference_wards())
    }

    async fn fetch_zones(
        &self,
        district: Option<&str>,
        offset: u64,
        limit: u64,
    ) -> CoreResult<Page<Zone>> {
        self.counters.fetch_zones.fetch_add(1, Ordering::SeqCst);
        self.check_failure("fetch_zones")?;

        let delay = *self.fetch_zones_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let zones = self.zones.lock().unwrap();
        let filtered: Vec<Zone> = zones
            .iter()
            .filter(|z| district.map(|d| z.district_name == d).unwrap_or(true))
            .cloned()
            .collect();
        let total_count = filtered.len() as u64;
        let items = filtered
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect();
        Ok(Page { items, total_count })
    }

    async fn search_text(&self, query: &str, limit: usize) -> CoreResult<Vec<RemoteSearchHit>> {
        self.counters.search_text.fetch_add(1, Ordering::SeqCst);
        self.check_failure("search_text")?;

        let needle = query.to_lowercase();
        let zones = self.zones.lock().unwrap();
        Ok(zones
            .iter()
            .filter(|z| z.code.contains(&needle) || z.name.to_lowercase().contains(&needle))
            .take(limit)
            .map(|z| RemoteSearchHit {
                zone: z.clone(),
                relevance: 0.9,
                match_type: "name_match".to_string(),
            })
            .collect())
    }

    async fn search_nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> CoreResult<Vec<RemoteNearbyHit>> {
        self.counters.search_nearby.fetch_add(1, Ordering::SeqCst);
        self.check_failure("search_nearby")?;

        let zones = self.zones.lock().unwrap();
        let mut hits: Vec<RemoteNearbyHit> = zones
            .iter()
            .filter_map(|z| {
                let (zlat, zlon) = (z.center_lat?, z.center_lon?);
                let d = zonepost::distance_meters(lat, lon, zlat, zlon);
                (d <= radius_m).then(|| RemoteNearbyHit {
                    zone: z.clone(),
                    distance_m: d,
                })
            })
            .collect();
        hits.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m));
        Ok(hits)
    }

    async fn create_zone(&self, zone: &Zone) -> CoreResult<Zone> {
        self.counters.create_zone.fetch_add(1, Ordering::SeqCst);
        self.check_failure("create_zone")?;

        let seq = self.next_server_code.fetch_add(1, Ordering::SeqCst);
        let mut created = zone.clone();
        created.code = format!("9000-{:03}", seq);
        self.zones.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn update_zone(&self, zone: &Zone) -> CoreResult<Zone> {
        self.counters.update_zone.fetch_add(1, Ordering::SeqCst);
        self.check_failure("update_zone")?;

        let mut zones = self.zones.lock().unwrap();
        match zones.iter_mut().find(|z| z.code == zone.code) {
            Some(existing) => {
                *existing = zone.clone();
                Ok(zone.clone())
            }
            None => Err(CoreError::RemoteRequestFailed {
                status: 404,
                message: format!("zone {} not found", zone.code),
            }),
        }
    }

    async fn delete_zone(&self, code: &str) -> CoreResult<()> {
        self.counters.delete_zone.fetch_add(1, Ordering::SeqCst);
        self.check_failure("delete_zone")?;

        self.zones.lock().unwrap().retain(|z| z.code != code);
        Ok(())
    }

    async fn fetch_boundary(&self, id: &str) -> CoreResult<Value> {
        self.counters.fetch_boundary.fetch_add(1, Ordering::SeqCst);
        self.check_failure("fetch_boundary")?;
        Ok(json!({ "id": id, "type": "Polygon", "coordinates": [] }))
    }
}

// ==================== Harness helpers ====================

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use zonepost::{OfflineDirectory, SyncConfig};

/// Config with millisecond retry delays and no chunk pause so test runs
/// stay fast.
pub fn test_config() -> SyncConfig {
    SyncConfig {
        retry_schedule: vec![
            Duration::from_millis(1),
            Duration::from_millis(1),
            Duration::from_millis(1),
        ],
        chunk_pause: Duration::from_millis(0),
        priority_page_size: 500,
        chunk_size: 2,
        ..SyncConfig::default()
    }
}

pub fn directory_with(
    remote: Arc<MockRemote>,
    online: bool,
) -> (OfflineDirectory, TempDir) {
    let tmp = TempDir::new().expect("Failed to create temp dir");
    let directory =
        OfflineDirectory::init_with_remote(tmp.path(), test_config(), remote, online)
            .expect("Failed to initialize directory");
    (directory, tmp)
}
