//! Durable local storage: fixed collections over RocksDB column families.

mod engine;
mod schema;

pub use engine::{LocalStore, StorageEstimate};
pub use schema::{index_field_value, Collection, StoredRecord, SCHEMA_VERSION};
