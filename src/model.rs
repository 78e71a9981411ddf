//! Typed records for the directory dataset and the mutation queue.
//!
//! Remote payloads are deserialized into these shapes at the boundary;
//! nothing downstream touches untyped JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, CoreResult};
use crate::geo;

/// Prefix for identifiers assigned locally while offline, replaced by the
/// server-confirmed code once the mutation queue drains.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Generate a temporary identifier for an offline-created record.
pub fn local_id() -> String {
    format!("{}{}", LOCAL_ID_PREFIX, uuid::Uuid::new_v4())
}

/// Delivery segment classification, from the YYY range of the zone code.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SegmentType {
    #[default]
    Residential,
    Commercial,
    Industrial,
    Government,
    Mixed,
}

/// Finest-grained postal addressing unit. Code format `NNNN-NNN`
/// (region+district+zone, then delivery segment), e.g. "1100-001".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Zone {
    pub code: String,
    pub name: String,
    pub district_name: String,
    pub region_name: String,
    #[serde(default)]
    pub segment_type: SegmentType,
    #[serde(default)]
    pub plus_code: Option<String>,
    #[serde(default)]
    pub geohash: Option<String>,
    #[serde(default)]
    pub center_lat: Option<f64>,
    #[serde(default)]
    pub center_lon: Option<f64>,
    #[serde(default)]
    pub ward_id: Option<String>,
    #[serde(default)]
    pub address_count: u64,
    #[serde(default)]
    pub search_text: Option<String>,
    #[serde(default)]
    pub alternate_names: Vec<String>,
    #[serde(default)]
    pub landmarks: Vec<String>,
}

impl Zone {
    /// Center point, when both coordinates are present.
    pub fn center(&self) -> Option<geo::GeoPoint> {
        match (self.center_lat, self.center_lon) {
            (Some(lat), Some(lon)) => Some(geo::GeoPoint::new(lat, lon)),
            _ => None,
        }
    }

    /// True for records created offline that still carry a temporary id.
    pub fn has_local_id(&self) -> bool {
        self.code.starts_with(LOCAL_ID_PREFIX)
    }

    /// Validate code format and geohash coherence. Locally-created records
    /// with a temporary id skip the code-format check.
    pub fn validate(&self) -> CoreResult<()> {
        if !self.has_local_id() && !is_valid_zone_code(&self.code) {
            return Err(CoreError::InvalidRecord(format!(
                "Zone code '{}' does not match NNNN-NNN",
                self.code
            )));
        }

        if self.name.trim().is_empty() {
            return Err(CoreError::InvalidRecord("Zone name is empty".to_string()));
        }

        if let Some(plus_code) = &self.plus_code {
            if !geo::is_valid_plus_code(plus_code) {
                return Err(CoreError::InvalidRecord(format!(
                    "Invalid plus code '{}'",
                    plus_code
                )));
            }
        }

        // A stored geohash must be derivable from the center point
        if let (Some(hash), Some(center)) = (&self.geohash, self.center()) {
            let expected = geo::encode(center.lat, center.lon, hash.len());
            if *hash != expected {
                return Err(CoreError::InvalidRecord(format!(
                    "Zone '{}' geohash '{}' does not match center ({}, {})",
                    self.code, hash, center.lat, center.lon
                )));
            }
        }

        Ok(())
    }

    /// Fill in the geohash from the center point if absent.
    pub fn with_derived_geohash(mut self) -> Self {
        if self.geohash.is_none() {
            if let Some(center) = self.center() {
                self.geohash = Some(geo::encode(
                    center.lat,
                    center.lon,
                    geo::ZONE_GEOHASH_PRECISION,
                ));
            }
        }
        self
    }
}

/// Check the `NNNN-NNN` zone code format.
pub fn is_valid_zone_code(code: &str) -> bool {
    let bytes = code.as_bytes();
    bytes.len() == 8
        && bytes[4] == b'-'
        && bytes[..4].iter().all(|b| b.is_ascii_digit())
        && bytes[5..].iter().all(|b| b.is_ascii_digit())
}

/// District-level grouping of zones, cached for hierarchical browsing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Ward {
    pub ward_id: String,
    pub name: String,
    pub district_code: String,
    pub district_name: String,
    pub region_code: String,
    pub region_name: String,
    #[serde(default)]
    pub zone_count: u64,
    #[serde(default)]
    pub address_count: u64,
    #[serde(default)]
    pub center_lat: Option<f64>,
    #[serde(default)]
    pub center_lon: Option<f64>,
    #[serde(default)]
    pub geohash: Option<String>,
}

/// Region reference row. Immutable once locked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Region {
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub district_count: u64,
}

/// District reference row. Immutable once locked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct District {
    pub code: String,
    pub name: String,
    pub region_code: String,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub zone_count: u64,
}

/// Cached geometry payload (e.g. the country boundary), expired
/// independently of the reference-data caches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeodataBlob {
    pub id: String,
    pub geometry: JsonValue,
    pub cached_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MutationStatus {
    Pending,
    Syncing,
    Failed,
}

/// A locally-made write awaiting replay against the remote system.
///
/// Ids are zero-padded monotone sequence numbers so that store iteration
/// order is enqueue order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationItem {
    pub id: String,
    pub action: MutationAction,
    pub target_collection: String,
    pub payload: JsonValue,
    pub enqueued_at: DateTime<Utc>,
    pub status: MutationStatus,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl MutationItem {
    /// Retry ceiling; items at or past it are excluded from automatic
    /// replay but stay visible in the queue.
    pub const MAX_RETRIES: u32 = 3;

    pub fn is_abandoned(&self) -> bool {
        self.retry_count >= Self::MAX_RETRIES
    }
}

/// Keys of the sync metadata rows in the `meta` collection.
pub mod meta_keys {
    pub const SCHEMA_VERSION: &str = "schema_version";
    pub const LAST_SYNC_AT: &str = "last_sync_at";
    pub const DATA_VERSION: &str = "data_version";
    pub const WARDS_LOADED: &str = "wards_loaded";
    pub const MUTATION_SEQ: &str = "mutation_seq";
}
