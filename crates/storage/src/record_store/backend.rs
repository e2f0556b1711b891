//! Record store backend trait.

use async_trait::async_trait;

use super::entry::{CacheKey, CacheRecord};

/// Persistent store of fetched asset bytes.
///
/// Implementations handle their own error recovery - on failure, methods
/// return None/0 so a read degrades to a range read instead of failing.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Look up a record by key.
    ///
    /// # Returns
    /// The record stored under exactly this `(asset_space, path, version)`,
    /// None if absent or on error.
    async fn get(&self, key: &CacheKey) -> Option<CacheRecord>;

    /// Store bytes under a key, replacing any record with the same key.
    ///
    /// Silently fails on error (the next read fetches the range again).
    async fn put(&self, key: &CacheKey, data: &[u8]);

    /// Remove one record.
    async fn delete(&self, key: &CacheKey);

    /// Remove every record of `asset_space` whose version is not `keep_version`.
    ///
    /// # Returns
    /// Number of records removed.
    async fn sweep_stale(&self, asset_space: &str, keep_version: u64) -> usize;

    /// Remove every record of `asset_space`.
    ///
    /// # Returns
    /// Number of records removed.
    async fn purge(&self, asset_space: &str) -> usize;

    /// Number of stored records.
    async fn count(&self) -> usize;

    /// Clear all records.
    async fn clear(&self);
}
