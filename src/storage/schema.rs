//! Fixed collection set and per-collection index declarations.

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::model::{District, GeodataBlob, MutationItem, Region, Ward, Zone};

/// Bumped when collections or indexes change shape; gates an index rebuild
/// at store-open time.
pub const SCHEMA_VERSION: u32 = 1;

/// Named collections, one RocksDB column family each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Zones,
    Wards,
    Regions,
    Districts,
    Addresses,
    Geodata,
    Mutations,
    Meta,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::Zones,
        Collection::Wards,
        Collection::Regions,
        Collection::Districts,
        Collection::Addresses,
        Collection::Geodata,
        Collection::Mutations,
        Collection::Meta,
    ];

    /// Column family name
    pub fn cf_name(&self) -> &'static str {
        match self {
            Collection::Zones => "zones",
            Collection::Wards => "wards",
            Collection::Regions => "regions",
            Collection::Districts => "districts",
            Collection::Addresses => "addresses",
            Collection::Geodata => "geodata",
            Collection::Mutations => "mutations",
            Collection::Meta => "meta",
        }
    }

    /// Secondary indexes declared for this collection. Index names double
    /// as the JSON field they cover; only string-valued fields are indexed.
    pub fn indexes(&self) -> &'static [&'static str] {
        match self {
            Collection::Zones => &["district_name", "geohash", "ward_id"],
            Collection::Wards => &["district_code"],
            Collection::Districts => &["region_code"],
            _ => &[],
        }
    }

    pub fn from_cf_name(name: &str) -> Option<Self> {
        Collection::ALL.iter().copied().find(|c| c.cf_name() == name)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.cf_name())
    }
}

/// A record type persisted in a fixed collection.
pub trait StoredRecord: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    /// Primary key within the collection
    fn key(&self) -> String;
}

impl StoredRecord for Zone {
    const COLLECTION: Collection = Collection::Zones;

    fn key(&self) -> String {
        self.code.clone()
    }
}

impl StoredRecord for Ward {
    const COLLECTION: Collection = Collection::Wards;

    fn key(&self) -> String {
        self.ward_id.clone()
    }
}

impl StoredRecord for Region {
    const COLLECTION: Collection = Collection::Regions;

    fn key(&self) -> String {
        self.code.clone()
    }
}

impl StoredRecord for District {
    const COLLECTION: Collection = Collection::Districts;

    fn key(&self) -> String {
        self.code.clone()
    }
}

impl StoredRecord for GeodataBlob {
    const COLLECTION: Collection = Collection::Geodata;

    fn key(&self) -> String {
        self.id.clone()
    }
}

impl StoredRecord for MutationItem {
    const COLLECTION: Collection = Collection::Mutations;

    fn key(&self) -> String {
        self.id.clone()
    }
}

/// Extract the indexable value of `field` from a serialized record.
/// Missing and null fields are simply not indexed.
pub fn index_field_value(doc: &Value, field: &str) -> Option<String> {
    match doc.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.to_lowercase()),
        _ => None,
    }
}
