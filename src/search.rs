//! Dual-mode ranked search over zones.
//!
//! Online, queries go to the remote ranked-search endpoints and map 1:1
//! into the local result shape; any remote failure falls back to the
//! offline path transparently. Offline, text search scans the cached zones
//! with additive rule scoring, and proximity search narrows through the
//! geohash index before computing exact distances.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{CoreError, CoreResult};
use crate::geo;
use crate::model::{SegmentType, Zone};
use crate::net::NetworkMonitor;
use crate::remote::RemoteApi;
use crate::storage::{Collection, LocalStore};

/// Best rule category that produced a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchKind {
    Code,
    Name,
    Locality,
    Proximity,
}

/// Where a result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Online,
    Offline,
}

/// Uniform result shape for both entry points and both modes.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub code: String,
    pub name: String,
    pub district_name: String,
    pub region_name: String,
    pub segment_type: SegmentType,
    pub plus_code: Option<String>,
    pub geohash: Option<String>,
    pub center_lat: Option<f64>,
    pub center_lon: Option<f64>,
    pub address_count: u64,
    /// Relevance in 0..=1
    pub relevance: f64,
    pub match_kind: MatchKind,
    pub provenance: Provenance,
    /// Exact distance for proximity results
    pub distance_m: Option<f64>,
}

impl SearchResult {
    fn from_zone(
        zone: &Zone,
        relevance: f64,
        match_kind: MatchKind,
        provenance: Provenance,
    ) -> Self {
        Self {
            code: zone.code.clone(),
            name: zone.name.clone(),
            district_name: zone.district_name.clone(),
            region_name: zone.region_name.clone(),
            segment_type: zone.segment_type,
            plus_code: zone.plus_code.clone(),
            geohash: zone.geohash.clone(),
            center_lat: zone.center_lat,
            center_lon: zone.center_lon,
            address_count: zone.address_count,
            relevance: relevance.clamp(0.0, 1.0),
            match_kind,
            provenance,
            distance_m: None,
        }
    }
}

/// Sum of every scoring rule, used to normalize raw scores into 0..=1.
pub const MAX_TEXT_SCORE: u32 = 505;

/// Score a cached zone against a free-text query. Rules are additive; a
/// record may match several at once. Returns zero for no match.
pub fn score_zone(zone: &Zone, query: &str) -> (u32, MatchKind) {
    let q = query.trim().to_lowercase();
    if q.is_empty() {
        return (0, MatchKind::Locality);
    }

    let code = zone.code.to_lowercase();
    let primary_code = code.split('-').next().unwrap_or(&code);
    let name = zone.name.to_lowercase();
    let district = zone.district_name.to_lowercase();

    let mut score = 0u32;
    let mut code_hit = false;
    let mut name_hit = false;

    // Exact code, primary-code or plus-code match
    let plus_exact = zone
        .plus_code
        .as_deref()
        .map(|p| geo::normalize_plus_code(p) == geo::normalize_plus_code(&q))
        .unwrap_or(false);
    if code == q || primary_code == q || plus_exact {
        score += 100;
        code_hit = true;
    }
    if name == q {
        score += 90;
        name_hit = true;
    }
    if code.starts_with(&q) {
        score += 70;
        code_hit = true;
    }
    if name.starts_with(&q) {
        score += 60;
        name_hit = true;
    }
    if name.contains(&q) {
        score += 40;
        name_hit = true;
    }
    if district.contains(&q) {
        score += 30;
    }
    if zone
        .search_text
        .as_deref()
        .map(|t| t.to_lowercase().contains(&q))
        .unwrap_or(false)
    {
        score += 20;
    }
    if zone
        .alternate_names
        .iter()
        .any(|n| n.to_lowercase().contains(&q))
    {
        score += 50;
        name_hit = true;
    }
    if zone.landmarks.iter().any(|l| l.to_lowercase().contains(&q)) {
        score += 45;
    }

    let kind = if code_hit {
        MatchKind::Code
    } else if name_hit {
        MatchKind::Name
    } else {
        MatchKind::Locality
    };
    (score, kind)
}

fn match_kind_from_remote(match_type: &str) -> MatchKind {
    match match_type {
        "exact" | "prefix" => MatchKind::Code,
        "contains" => MatchKind::Name,
        _ => MatchKind::Locality,
    }
}

/// Ranked text and proximity search with automatic online/offline fallback.
pub struct SearchEngine {
    store: Option<Arc<LocalStore>>,
    remote: Arc<dyn RemoteApi>,
    network: NetworkMonitor,
}

impl SearchEngine {
    /// `store` is `None` when the local store failed to open; the engine
    /// then serves remote results only.
    pub fn new(
        store: Option<Arc<LocalStore>>,
        remote: Arc<dyn RemoteApi>,
        network: NetworkMonitor,
    ) -> Self {
        Self {
            store,
            remote,
            network,
        }
    }

    /// Free-text ranked search. An empty query returns an empty set.
    pub async fn search_by_text(
        &self,
        query: &str,
        limit: usize,
    ) -> CoreResult<Vec<SearchResult>> {
        if query.trim().is_empty() || limit == 0 {
            return Ok(vec![]);
        }

        if self.network.is_online() {
            match self.remote.search_text(query, limit).await {
                Ok(hits) => {
                    return Ok(hits
                        .into_iter()
                        .map(|hit| {
                            SearchResult::from_zone(
                                &hit.zone,
                                hit.relevance,
                                match_kind_from_remote(&hit.match_type),
                                Provenance::Online,
                            )
                        })
                        .collect());
                }
                Err(e) => {
                    warn!("Remote text search failed, falling back to cache: {}", e);
                }
            }
        }

        self.offline_text_search(query, limit)
    }

    fn offline_text_search(&self, query: &str, limit: usize) -> CoreResult<Vec<SearchResult>> {
        let store = self.require_store()?;
        let zones = store.get_all::<Zone>()?;
        if zones.is_empty() {
            return Err(CoreError::NoDataAvailable);
        }

        let mut scored: Vec<(u32, MatchKind, Zone)> = zones
            .into_iter()
            .filter_map(|zone| {
                let (score, kind) = score_zone(&zone, query);
                (score > 0).then_some((score, kind, zone))
            })
            .collect();

        // Descending by score, code as a deterministic tiebreak
        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.2.code.cmp(&b.2.code)));
        scored.truncate(limit);

        debug!("Offline text search '{}' matched {} zones", query, scored.len());
        Ok(scored
            .into_iter()
            .map(|(score, kind, zone)| {
                SearchResult::from_zone(
                    &zone,
                    score as f64 / MAX_TEXT_SCORE as f64,
                    kind,
                    Provenance::Offline,
                )
            })
            .collect())
    }

    /// Proximity search within `radius_m` meters, nearest first. Invalid
    /// coordinates return an empty set.
    pub async fn search_by_location(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> CoreResult<Vec<SearchResult>> {
        let origin = geo::GeoPoint::new(lat, lon);
        if !origin.is_valid() || !radius_m.is_finite() || radius_m <= 0.0 {
            return Ok(vec![]);
        }

        if self.network.is_online() {
            match self.remote.search_nearby(lat, lon, radius_m).await {
                Ok(hits) => {
                    return Ok(hits
                        .into_iter()
                        .map(|hit| {
                            let mut result = SearchResult::from_zone(
                                &hit.zone,
                                1.0 - hit.distance_m / radius_m,
                                MatchKind::Proximity,
                                Provenance::Online,
                            );
                            result.distance_m = Some(hit.distance_m);
                            result
                        })
                        .collect());
                }
                Err(e) => {
                    warn!("Remote nearby search failed, falling back to cache: {}", e);
                }
            }
        }

        self.offline_location_search(origin, radius_m)
    }

    fn offline_location_search(
        &self,
        origin: geo::GeoPoint,
        radius_m: f64,
    ) -> CoreResult<Vec<SearchResult>> {
        let store = self.require_store()?;
        if store.count(Collection::Zones)? == 0 {
            return Err(CoreError::NoDataAvailable);
        }

        // Coarse bucket: all zones sharing the 4-char geohash prefix
        let cell = geo::encode(origin.lat, origin.lon, geo::ZONE_GEOHASH_PRECISION);
        let prefix = geo::neighbor_prefix(&cell, geo::PROXIMITY_PREFIX_LEN);
        let candidates: Vec<Zone> = store.get_by_index_prefix("geohash", prefix)?;

        let mut hits: Vec<(f64, Zone)> = candidates
            .into_iter()
            .filter_map(|zone| {
                let center = zone.center()?;
                let distance = geo::haversine_distance(&origin, &center);
                (distance <= radius_m).then_some((distance, zone))
            })
            .collect();

        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(hits
            .into_iter()
            .map(|(distance, zone)| {
                let mut result = SearchResult::from_zone(
                    &zone,
                    1.0 - distance / radius_m,
                    MatchKind::Proximity,
                    Provenance::Offline,
                );
                result.distance_m = Some(distance);
                result
            })
            .collect())
    }

    fn require_store(&self) -> CoreResult<&Arc<LocalStore>> {
        self.store.as_ref().ok_or(CoreError::NoDataAvailable)
    }
}
