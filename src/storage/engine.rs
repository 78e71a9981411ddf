//! RocksDB-backed local store.
//!
//! One column family per fixed collection. Records are stored under
//! `doc:<key>`; secondary index entries under `idx:<index>:<hex(value)>:<key>`
//! with the document key as the entry value. A `put_many` batch, including
//! its index maintenance, is a single atomic `WriteBatch`.

use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, IteratorMode, Options, WriteBatch, DB};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::schema::{index_field_value, Collection, StoredRecord, SCHEMA_VERSION};
use crate::error::{CoreError, CoreResult};
use crate::model::meta_keys;

const DOC_PREFIX: &str = "doc:";
const IDX_PREFIX: &str = "idx:";

/// Approximate on-disk usage, surfaced to the UI as a storage estimate.
#[derive(Debug, Clone, serde::Serialize)]
pub struct StorageEstimate {
    /// Total size of SST files in bytes
    pub used_bytes: u64,
    /// Estimated live data size in bytes
    pub live_bytes: u64,
    /// Size of memtables in bytes
    pub memtable_bytes: u64,
}

/// Durable keyed store with named collections and secondary indexes.
pub struct LocalStore {
    db: Arc<RwLock<DB>>,
    path: PathBuf,
}

impl Clone for LocalStore {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            path: self.path.clone(),
        }
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore").field("path", &self.path).finish()
    }
}

impl LocalStore {
    /// Open (creating if absent) the versioned store with its fixed
    /// collections. Failure maps to `StorageUnavailable`; callers degrade
    /// to remote-only operation.
    pub fn open<P: AsRef<Path>>(data_dir: P) -> CoreResult<Self> {
        let path = data_dir.as_ref().to_path_buf();

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_max_total_wal_size(50 * 1024 * 1024);
        opts.set_keep_log_file_num(5);

        // Open the union of existing and declared column families so a
        // store written by an older schema still opens cleanly.
        let mut cf_names = match DB::list_cf(&opts, &path) {
            Ok(cfs) => cfs,
            Err(_) => vec!["default".to_string()],
        };
        for coll in Collection::ALL {
            if !cf_names.iter().any(|n| n == coll.cf_name()) {
                cf_names.push(coll.cf_name().to_string());
            }
        }

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = cf_names
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, &path, cf_descriptors)
            .map_err(|e| CoreError::StorageUnavailable(format!("Failed to open store: {}", e)))?;

        let store = Self {
            db: Arc::new(RwLock::new(db)),
            path,
        };
        store.migrate()?;
        Ok(store)
    }

    /// Apply structural migrations gated by the schema-version row.
    fn migrate(&self) -> CoreResult<()> {
        let stored = self
            .meta_get(meta_keys::SCHEMA_VERSION)?
            .and_then(|v| v.parse::<u32>().ok());

        match stored {
            Some(version) if version == SCHEMA_VERSION => Ok(()),
            Some(version) => {
                tracing::info!(
                    "Migrating store schema v{} -> v{}: rebuilding indexes",
                    version,
                    SCHEMA_VERSION
                );
                self.rebuild_indexes()?;
                self.meta_put(meta_keys::SCHEMA_VERSION, &SCHEMA_VERSION.to_string())
            }
            None => self.meta_put(meta_keys::SCHEMA_VERSION, &SCHEMA_VERSION.to_string()),
        }
    }

    // ==================== Key layout ====================

    fn doc_key(key: &str) -> Vec<u8> {
        format!("{}{}", DOC_PREFIX, key).into_bytes()
    }

    fn idx_entry_key(index: &str, value: &str, doc_key: &str) -> Vec<u8> {
        format!("{}{}:{}:{}", IDX_PREFIX, index, hex::encode(value), doc_key).into_bytes()
    }

    /// Scan prefix for an index. Hex encoding is byte-wise, so a prefix of
    /// the raw value is a prefix of the encoded value; the trailing ':'
    /// pins an exact value match.
    fn idx_scan_prefix(index: &str, value: &str, exact: bool) -> Vec<u8> {
        let mut prefix = format!("{}{}:{}", IDX_PREFIX, index, hex::encode(value));
        if exact {
            prefix.push(':');
        }
        prefix.into_bytes()
    }

    fn cf_checked<'a>(db: &'a DB, collection: Collection) -> CoreResult<&'a ColumnFamily> {
        db.cf_handle(collection.cf_name())
            .ok_or_else(|| CoreError::CollectionNotFound(collection.cf_name().to_string()))
    }

    // ==================== Record operations ====================

    /// Store a single record, maintaining declared indexes.
    pub fn put<T: StoredRecord>(&self, record: &T) -> CoreResult<()> {
        self.put_values(T::COLLECTION, vec![(record.key(), serde_json::to_value(record)?)])
    }

    /// Store a batch of records in one durable transaction. The batch,
    /// including index updates, applies all-or-nothing.
    pub fn put_many<T: StoredRecord>(&self, records: &[T]) -> CoreResult<()> {
        let mut values = Vec::with_capacity(records.len());
        for record in records {
            values.push((record.key(), serde_json::to_value(record)?));
        }
        self.put_values(T::COLLECTION, values)
    }

    fn put_values(&self, collection: Collection, values: Vec<(String, Value)>) -> CoreResult<()> {
        if values.is_empty() {
            return Ok(());
        }

        let db = self.db.read().unwrap();
        let cf = Self::cf_checked(&db, collection)?;
        let mut batch = WriteBatch::default();

        for (key, value) in &values {
            // Drop index entries for the previous version, if any
            if let Some(old_bytes) = db.get_cf(cf, Self::doc_key(key))? {
                if let Ok(old_value) = serde_json::from_slice::<Value>(&old_bytes) {
                    for index in collection.indexes() {
                        if let Some(old_idx) = index_field_value(&old_value, index) {
                            batch.delete_cf(cf, Self::idx_entry_key(index, &old_idx, key));
                        }
                    }
                }
            }

            batch.put_cf(cf, Self::doc_key(key), serde_json::to_vec(value)?);
            for index in collection.indexes() {
                if let Some(idx_value) = index_field_value(value, index) {
                    batch.put_cf(cf, Self::idx_entry_key(index, &idx_value, key), key.as_bytes());
                }
            }
        }

        db.write(batch)?;
        Ok(())
    }

    /// Primary-key lookup.
    pub fn get<T: StoredRecord>(&self, key: &str) -> CoreResult<Option<T>> {
        let db = self.db.read().unwrap();
        let cf = Self::cf_checked(&db, T::COLLECTION)?;

        match db.get_cf(cf, Self::doc_key(key))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// All records of a collection, in key order.
    pub fn get_all<T: StoredRecord>(&self) -> CoreResult<Vec<T>> {
        let db = self.db.read().unwrap();
        let cf = Self::cf_checked(&db, T::COLLECTION)?;

        let prefix = DOC_PREFIX.as_bytes();
        let mut records = Vec::new();
        for item in db.prefix_iterator_cf(cf, prefix) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            records.push(serde_json::from_slice(&value)?);
        }
        Ok(records)
    }

    /// Secondary-index lookup by exact value (case-insensitive).
    pub fn get_all_by_index<T: StoredRecord>(&self, index: &str, value: &str) -> CoreResult<Vec<T>> {
        self.index_scan(index, &value.to_lowercase(), true)
    }

    /// Secondary-index lookup by value prefix, used for geohash-prefix
    /// proximity bucketing.
    pub fn get_by_index_prefix<T: StoredRecord>(
        &self,
        index: &str,
        prefix: &str,
    ) -> CoreResult<Vec<T>> {
        self.index_scan(index, &prefix.to_lowercase(), false)
    }

    fn index_scan<T: StoredRecord>(
        &self,
        index: &str,
        value: &str,
        exact: bool,
    ) -> CoreResult<Vec<T>> {
        if !T::COLLECTION.indexes().contains(&index) {
            return Err(CoreError::InternalError(format!(
                "No index '{}' on collection '{}'",
                index,
                T::COLLECTION
            )));
        }

        let doc_keys = {
            let db = self.db.read().unwrap();
            let cf = Self::cf_checked(&db, T::COLLECTION)?;
            let scan_prefix = Self::idx_scan_prefix(index, value, exact);

            let mut keys = Vec::new();
            for item in db.prefix_iterator_cf(cf, &scan_prefix) {
                let (key, entry) = item?;
                if !key.starts_with(&scan_prefix) {
                    break;
                }
                keys.push(String::from_utf8_lossy(&entry).to_string());
            }
            keys
        };

        let mut records = Vec::with_capacity(doc_keys.len());
        for key in doc_keys {
            if let Some(record) = self.get::<T>(&key)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Remove a record and its index entries.
    pub fn remove<T: StoredRecord>(&self, key: &str) -> CoreResult<()> {
        let db = self.db.read().unwrap();
        let cf = Self::cf_checked(&db, T::COLLECTION)?;

        let bytes = db
            .get_cf(cf, Self::doc_key(key))?
            .ok_or_else(|| CoreError::RecordNotFound(key.to_string()))?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(cf, Self::doc_key(key));
        if let Ok(value) = serde_json::from_slice::<Value>(&bytes) {
            for index in T::COLLECTION.indexes() {
                if let Some(idx_value) = index_field_value(&value, index) {
                    batch.delete_cf(cf, Self::idx_entry_key(index, &idx_value, key));
                }
            }
        }
        db.write(batch)?;
        Ok(())
    }

    /// Drop every row of a collection, documents and index entries alike.
    pub fn clear(&self, collection: Collection) -> CoreResult<()> {
        let db = self.db.read().unwrap();
        let cf = Self::cf_checked(&db, collection)?;

        let mut batch = WriteBatch::default();
        for item in db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            batch.delete_cf(cf, &key);
        }
        db.write(batch)?;
        Ok(())
    }

    /// Number of records in a collection.
    pub fn count(&self, collection: Collection) -> CoreResult<usize> {
        let db = self.db.read().unwrap();
        let cf = Self::cf_checked(&db, collection)?;

        let prefix = DOC_PREFIX.as_bytes();
        let mut count = 0;
        for item in db.prefix_iterator_cf(cf, prefix) {
            let (key, _) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            count += 1;
        }
        Ok(count)
    }

    // ==================== Sync metadata ====================

    pub fn meta_get(&self, key: &str) -> CoreResult<Option<String>> {
        let db = self.db.read().unwrap();
        let cf = Self::cf_checked(&db, Collection::Meta)?;
        Ok(db
            .get_cf(cf, Self::doc_key(key))?
            .map(|bytes| String::from_utf8_lossy(&bytes).to_string()))
    }

    pub fn meta_put(&self, key: &str, value: &str) -> CoreResult<()> {
        let db = self.db.read().unwrap();
        let cf = Self::cf_checked(&db, Collection::Meta)?;
        db.put_cf(cf, Self::doc_key(key), value.as_bytes())?;
        Ok(())
    }

    pub fn meta_remove(&self, key: &str) -> CoreResult<()> {
        let db = self.db.read().unwrap();
        let cf = Self::cf_checked(&db, Collection::Meta)?;
        db.delete_cf(cf, Self::doc_key(key))?;
        Ok(())
    }

    // ==================== Maintenance ====================

    /// Rebuild every declared index from the stored documents.
    fn rebuild_indexes(&self) -> CoreResult<()> {
        let db = self.db.read().unwrap();

        for collection in Collection::ALL {
            if collection.indexes().is_empty() {
                continue;
            }
            let cf = Self::cf_checked(&db, collection)?;
            let mut batch = WriteBatch::default();

            // Drop stale entries
            let idx_prefix = IDX_PREFIX.as_bytes();
            for item in db.prefix_iterator_cf(cf, idx_prefix) {
                let (key, _) = item?;
                if !key.starts_with(idx_prefix) {
                    break;
                }
                batch.delete_cf(cf, &key);
            }

            // Re-derive from documents
            let doc_prefix = DOC_PREFIX.as_bytes();
            for item in db.prefix_iterator_cf(cf, doc_prefix) {
                let (key, value) = item?;
                if !key.starts_with(doc_prefix) {
                    break;
                }
                let doc_key = String::from_utf8_lossy(&key[doc_prefix.len()..]).to_string();
                let doc: Value = serde_json::from_slice(&value)?;
                for index in collection.indexes() {
                    if let Some(idx_value) = index_field_value(&doc, index) {
                        batch.put_cf(
                            cf,
                            Self::idx_entry_key(index, &idx_value, &doc_key),
                            doc_key.as_bytes(),
                        );
                    }
                }
            }

            db.write(batch)?;
        }
        Ok(())
    }

    /// Approximate usage across all collections.
    pub fn storage_estimate(&self) -> StorageEstimate {
        let db = self.db.read().unwrap();
        let mut estimate = StorageEstimate {
            used_bytes: 0,
            live_bytes: 0,
            memtable_bytes: 0,
        };

        for collection in Collection::ALL {
            let Some(cf) = db.cf_handle(collection.cf_name()) else {
                continue;
            };
            let prop = |name: &str| {
                db.property_int_value_cf(cf, name)
                    .ok()
                    .flatten()
                    .unwrap_or(0)
            };
            estimate.used_bytes += prop("rocksdb.total-sst-files-size");
            estimate.live_bytes += prop("rocksdb.estimate-live-data-size");
            estimate.memtable_bytes += prop("rocksdb.size-all-mem-tables");
        }

        estimate
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> CoreResult<()> {
        let db = self.db.read().unwrap();
        db.flush()
            .map_err(|e| CoreError::InternalError(format!("Failed to flush: {}", e)))?;
        Ok(())
    }
}
