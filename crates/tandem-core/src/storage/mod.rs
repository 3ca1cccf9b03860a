//! Persistence medium for the local store
//!
//! A namespaced key → string durable store. Records are JSON documents keyed
//! by `"{prefix}{id}"`.

mod memory;
mod migrations;
mod sqlite;

pub use memory::MemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;

use crate::error::Result;

/// Trait for durable key/value storage operations
pub trait KeyValueStore: Send + Sync {
    /// All entries whose key starts with `prefix`, ordered by key
    fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>>;

    /// Insert or replace a value
    fn put(&self, key: &str, value: &str) -> Result<()>;

    /// Remove a key; removing a missing key is not an error
    fn delete(&self, key: &str) -> Result<()>;

    /// Counter that moves when a writer other than this handle commits,
    /// e.g. another process sharing the database file. Media that nobody
    /// else can write to keep it constant.
    fn data_version(&self) -> Result<u64> {
        Ok(0)
    }
}
