//! Remote directory API: typed wire payloads and the HTTP client.
//!
//! All payloads are deserialized into explicit records here, at the
//! boundary; the rest of the crate never sees raw JSON shapes. The remote
//! surface is a trait so tests can drive the sync and queue components with
//! an in-memory fake.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{CoreError, CoreResult};
use crate::model::{District, Region, SegmentType, Ward, Zone};

/// Explicit per-request timeout so a dead transport cannot stall a sync.
const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;

/// One page of a remote collection.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total_count: u64,
}

/// A ranked hit from the remote text-search endpoint.
#[derive(Debug, Clone)]
pub struct RemoteSearchHit {
    pub zone: Zone,
    pub relevance: f64,
    pub match_type: String,
}

/// A hit from the remote nearby-search endpoint.
#[derive(Debug, Clone)]
pub struct RemoteNearbyHit {
    pub zone: Zone,
    pub distance_m: f64,
}

/// Remote data-fetch and mutation surface consumed by the sync
/// orchestrator, the mutation queue and the online search path.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    async fn fetch_regions(&self) -> CoreResult<Vec<Region>>;
    async fn fetch_districts(&self) -> CoreResult<Vec<District>>;
    async fn fetch_wards(&self) -> CoreResult<Vec<Ward>>;
    /// Paginated zones, optionally filtered to one district.
    async fn fetch_zones(
        &self,
        district: Option<&str>,
        offset: u64,
        limit: u64,
    ) -> CoreResult<Page<Zone>>;
    async fn search_text(&self, query: &str, limit: usize) -> CoreResult<Vec<RemoteSearchHit>>;
    async fn search_nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> CoreResult<Vec<RemoteNearbyHit>>;
    async fn create_zone(&self, zone: &Zone) -> CoreResult<Zone>;
    async fn update_zone(&self, zone: &Zone) -> CoreResult<Zone>;
    async fn delete_zone(&self, code: &str) -> CoreResult<()>;
    /// Geometry payload for a named boundary (e.g. "boundary-country").
    async fn fetch_boundary(&self, id: &str) -> CoreResult<Value>;
}

// ==================== Wire payloads ====================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ZonePayload {
    zone_code: String,
    #[serde(default)]
    zone_name: Option<String>,
    district_name: String,
    region_name: String,
    #[serde(default)]
    segment_type: Option<String>,
    #[serde(default)]
    plus_code: Option<String>,
    #[serde(default)]
    center_lat: Option<f64>,
    #[serde(default)]
    center_lng: Option<f64>,
    #[serde(default)]
    ward_id: Option<String>,
    #[serde(default)]
    address_count: u64,
    #[serde(default)]
    search_text: Option<String>,
    #[serde(default)]
    alternate_names: Vec<String>,
    #[serde(default)]
    landmarks: Vec<String>,
}

fn parse_segment_type(value: Option<&str>) -> SegmentType {
    match value {
        Some("residential") => SegmentType::Residential,
        Some("commercial") => SegmentType::Commercial,
        Some("industrial") => SegmentType::Industrial,
        Some("government") => SegmentType::Government,
        _ => SegmentType::Mixed,
    }
}

impl From<ZonePayload> for Zone {
    fn from(payload: ZonePayload) -> Self {
        Zone {
            code: payload.zone_code,
            name: payload.zone_name.unwrap_or_default(),
            district_name: payload.district_name,
            region_name: payload.region_name,
            segment_type: parse_segment_type(payload.segment_type.as_deref()),
            plus_code: payload.plus_code,
            geohash: None,
            center_lat: payload.center_lat,
            center_lon: payload.center_lng,
            ward_id: payload.ward_id,
            address_count: payload.address_count,
            search_text: payload.search_text,
            alternate_names: payload.alternate_names,
            landmarks: payload.landmarks,
        }
        .with_derived_geohash()
    }
}

impl From<&Zone> for ZonePayload {
    fn from(zone: &Zone) -> Self {
        ZonePayload {
            zone_code: zone.code.clone(),
            zone_name: Some(zone.name.clone()),
            district_name: zone.district_name.clone(),
            region_name: zone.region_name.clone(),
            segment_type: Some(
                serde_json::to_value(zone.segment_type)
                    .ok()
                    .and_then(|v| v.as_str().map(String::from))
                    .unwrap_or_else(|| "mixed".to_string()),
            ),
            plus_code: zone.plus_code.clone(),
            center_lat: zone.center_lat,
            center_lng: zone.center_lon,
            ward_id: zone.ward_id.clone(),
            address_count: zone.address_count,
            search_text: zone.search_text.clone(),
            alternate_names: zone.alternate_names.clone(),
            landmarks: zone.landmarks.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PagePayload<T> {
    #[serde(alias = "zones", alias = "results", alias = "wards", alias = "districts", alias = "regions")]
    items: Vec<T>,
    #[serde(default)]
    total_count: u64,
}

#[derive(Debug, Deserialize)]
struct SearchHitPayload {
    #[serde(flatten)]
    zone: ZonePayload,
    #[serde(default)]
    relevance_score: f64,
    #[serde(default)]
    match_type: String,
}

#[derive(Debug, Deserialize)]
struct NearbyHitPayload {
    #[serde(flatten)]
    zone: ZonePayload,
    distance_meters: f64,
}

// ==================== HTTP client ====================

/// `RemoteApi` over the directory's REST endpoints.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(base_url: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> CoreResult<T> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
            if body.chars().count() > MAX_LOG_BODY_CHARS {
                preview.push_str("...");
            }
            debug!("API response error ({}): {}", status, preview);
            return Err(CoreError::remote(status.as_u16(), preview));
        }

        serde_json::from_str(&body).map_err(|e| {
            CoreError::remote(status.as_u16(), format!("Failed to parse response: {}", e))
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> CoreResult<T> {
        let response = self.client.get(self.url(path)).query(query).send().await?;
        Self::parse_response(response).await
    }
}

#[async_trait]
impl RemoteApi for HttpRemote {
    async fn fetch_regions(&self) -> CoreResult<Vec<Region>> {
        let page: PagePayload<Region> = self.get_json("/geography/regions", &[]).await?;
        Ok(page.items)
    }

    async fn fetch_districts(&self) -> CoreResult<Vec<District>> {
        let page: PagePayload<District> = self.get_json("/geography/districts", &[]).await?;
        Ok(page.items)
    }

    async fn fetch_wards(&self) -> CoreResult<Vec<Ward>> {
        let page: PagePayload<Ward> = self.get_json("/geography/wards", &[]).await?;
        Ok(page.items)
    }

    async fn fetch_zones(
        &self,
        district: Option<&str>,
        offset: u64,
        limit: u64,
    ) -> CoreResult<Page<Zone>> {
        let mut query = vec![
            ("offset", offset.to_string()),
            ("limit", limit.to_string()),
        ];
        if let Some(district) = district {
            query.push(("district", district.to_string()));
        }

        let page: PagePayload<ZonePayload> = self.get_json("/zones", &query).await?;
        Ok(Page {
            items: page.items.into_iter().map(Zone::from).collect(),
            total_count: page.total_count,
        })
    }

    async fn search_text(&self, query: &str, limit: usize) -> CoreResult<Vec<RemoteSearchHit>> {
        let params = [("q", query.to_string()), ("limit", limit.to_string())];
        let page: PagePayload<SearchHitPayload> = self.get_json("/search/quick", &params).await?;
        Ok(page
            .items
            .into_iter()
            .map(|hit| RemoteSearchHit {
                zone: Zone::from(hit.zone),
                relevance: hit.relevance_score,
                match_type: hit.match_type,
            })
            .collect())
    }

    async fn search_nearby(
        &self,
        lat: f64,
        lon: f64,
        radius_m: f64,
    ) -> CoreResult<Vec<RemoteNearbyHit>> {
        let params = [
            ("lat", lat.to_string()),
            ("lng", lon.to_string()),
            ("radius_meters", (radius_m as u64).to_string()),
        ];
        let page: PagePayload<NearbyHitPayload> = self.get_json("/search/nearby", &params).await?;
        Ok(page
            .items
            .into_iter()
            .map(|hit| RemoteNearbyHit {
                zone: Zone::from(hit.zone),
                distance_m: hit.distance_meters,
            })
            .collect())
    }

    async fn create_zone(&self, zone: &Zone) -> CoreResult<Zone> {
        let response = self
            .client
            .post(self.url("/zones"))
            .json(&ZonePayload::from(zone))
            .send()
            .await?;
        let payload: ZonePayload = Self::parse_response(response).await?;
        Ok(Zone::from(payload))
    }

    async fn update_zone(&self, zone: &Zone) -> CoreResult<Zone> {
        let response = self
            .client
            .put(self.url(&format!("/zones/{}", zone.code)))
            .json(&ZonePayload::from(zone))
            .send()
            .await?;
        let payload: ZonePayload = Self::parse_response(response).await?;
        Ok(Zone::from(payload))
    }

    async fn delete_zone(&self, code: &str) -> CoreResult<()> {
        let response = self
            .client
            .delete(self.url(&format!("/zones/{}", code)))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CoreError::remote(status.as_u16(), body));
        }
        Ok(())
    }

    async fn fetch_boundary(&self, id: &str) -> CoreResult<Value> {
        self.get_json(&format!("/spatial/boundary/{}", id), &[]).await
    }
}
