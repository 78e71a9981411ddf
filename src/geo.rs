//! Geohash codec and great-circle distance.
//!
//! Precision levels relevant to this dataset:
//! - 4 chars: ~39km x 20km (coarse proximity bucket)
//! - 5 chars: ~5km x 5km (district level)
//! - 6 chars: ~1.2km x 0.6km (zone level)
//!
//! Sierra Leone bounds: lat 6.9-10.0, lon -13.5 to -10.3. Antipodal and
//! polar edge cases are out of operational range and not special-cased.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Earth radius in meters
const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Geohash base32 alphabet
const BASE32: &[u8] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Geohash precision stored on zone records
pub const ZONE_GEOHASH_PRECISION: usize = 6;

/// Prefix length used for coarse proximity bucketing (~20km cell)
pub const PROXIMITY_PREFIX_LEN: usize = 4;

/// A geographic point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Create a new geo point
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// True when both coordinates are inside the valid WGS84 range.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }

    /// Parse a geo point from a JSON value.
    /// Supports `{ "lat": 8.46, "lon": -13.23 }` (also `lng`/`latitude`/
    /// `longitude` keys) and the `[lat, lon]` array form.
    pub fn from_value(value: &Value) -> Option<Self> {
        if let Some(obj) = value.as_object() {
            let lat = obj.get("lat").or(obj.get("latitude"))?.as_f64()?;
            let lon = obj
                .get("lon")
                .or(obj.get("lng"))
                .or(obj.get("longitude"))?
                .as_f64()?;
            return Some(Self::new(lat, lon));
        }

        if let Some(arr) = value.as_array() {
            if arr.len() == 2 {
                let lat = arr[0].as_f64()?;
                let lon = arr[1].as_f64()?;
                return Some(Self::new(lat, lon));
            }
        }

        None
    }
}

/// Encode latitude/longitude into a geohash cell id.
///
/// Interval-halving over alternating longitude/latitude bits, 5 bits per
/// emitted base32 character.
pub fn encode(lat: f64, lon: f64, precision: usize) -> String {
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);

    let mut geohash = String::with_capacity(precision);
    let mut bits: usize = 0;
    let mut bit_count = 0;
    let mut is_longitude = true;

    while geohash.len() < precision {
        if is_longitude {
            let mid = (lon_range.0 + lon_range.1) / 2.0;
            if lon >= mid {
                bits = (bits << 1) | 1;
                lon_range.0 = mid;
            } else {
                bits <<= 1;
                lon_range.1 = mid;
            }
        } else {
            let mid = (lat_range.0 + lat_range.1) / 2.0;
            if lat >= mid {
                bits = (bits << 1) | 1;
                lat_range.0 = mid;
            } else {
                bits <<= 1;
                lat_range.1 = mid;
            }
        }

        is_longitude = !is_longitude;
        bit_count += 1;

        if bit_count == 5 {
            geohash.push(BASE32[bits] as char);
            bits = 0;
            bit_count = 0;
        }
    }

    geohash
}

/// Decode a geohash to its bounding box as (min_lat, min_lon, max_lat, max_lon).
pub fn decode_bounds(geohash: &str) -> (f64, f64, f64, f64) {
    let mut lat_range = (-90.0_f64, 90.0_f64);
    let mut lon_range = (-180.0_f64, 180.0_f64);
    let mut is_longitude = true;

    for ch in geohash.to_ascii_lowercase().bytes() {
        let Some(bits) = BASE32.iter().position(|&b| b == ch) else {
            continue;
        };

        for i in (0..5).rev() {
            let bit = (bits >> i) & 1;
            if is_longitude {
                let mid = (lon_range.0 + lon_range.1) / 2.0;
                if bit == 1 {
                    lon_range.0 = mid;
                } else {
                    lon_range.1 = mid;
                }
            } else {
                let mid = (lat_range.0 + lat_range.1) / 2.0;
                if bit == 1 {
                    lat_range.0 = mid;
                } else {
                    lat_range.1 = mid;
                }
            }
            is_longitude = !is_longitude;
        }
    }

    (lat_range.0, lon_range.0, lat_range.1, lon_range.1)
}

/// Decode a geohash to its cell center point.
pub fn decode_center(geohash: &str) -> GeoPoint {
    let (min_lat, min_lon, max_lat, max_lon) = decode_bounds(geohash);
    GeoPoint::new((min_lat + max_lat) / 2.0, (min_lon + max_lon) / 2.0)
}

/// Coarse proximity bucket: the leading `len` characters of a cell id.
pub fn neighbor_prefix(geohash: &str, len: usize) -> &str {
    &geohash[..geohash.len().min(len)]
}

/// Calculate distance between two points using the Haversine formula.
/// Returns distance in meters.
pub fn haversine_distance(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    let lat1_rad = p1.lat.to_radians();
    let lat2_rad = p2.lat.to_radians();
    let delta_lat = (p2.lat - p1.lat).to_radians();
    let delta_lon = (p2.lon - p1.lon).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().asin();

    EARTH_RADIUS_M * c
}

/// Calculate distance from raw coordinates
pub fn distance_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_distance(&GeoPoint::new(lat1, lon1), &GeoPoint::new(lat2, lon2))
}

/// Plus Code character set (excludes 0, 1, A, E, I, L, O, U)
const PLUS_CODE_CHARS: &str = "23456789CFGHJMPQRVWX";

/// Validate a full Plus Code (e.g. "6WQPVX22+5WX"). Short codes without a
/// locality prefix are rejected; zones store full codes only.
pub fn is_valid_plus_code(code: &str) -> bool {
    let code = code.trim().to_ascii_uppercase();
    let Some(plus_pos) = code.find('+') else {
        return false;
    };
    if plus_pos != 8 {
        return false;
    }

    let (head, tail) = code.split_at(plus_pos);
    let tail = &tail[1..];
    if tail.is_empty() || tail.len() > 4 {
        return false;
    }

    head.chars()
        .chain(tail.chars())
        .all(|c| PLUS_CODE_CHARS.contains(c))
}

/// Canonical form used for exact-match comparisons: trimmed, uppercase.
pub fn normalize_plus_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
