//! In-memory record store.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use parking_lot::RwLock;

use super::backend::RecordStore;
use super::entry::{CacheKey, CacheRecord};

/// Record store held in process memory. Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: RwLock<HashMap<CacheKey, CacheRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn get(&self, key: &CacheKey) -> Option<CacheRecord> {
        self.records.read().get(key).cloned()
    }

    async fn put(&self, key: &CacheKey, data: &[u8]) {
        let created_at: i64 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        self.records.write().insert(
            key.clone(),
            CacheRecord::new(data.to_vec(), key.version, created_at),
        );
    }

    async fn delete(&self, key: &CacheKey) {
        self.records.write().remove(key);
    }

    async fn sweep_stale(&self, asset_space: &str, keep_version: u64) -> usize {
        let mut records = self.records.write();
        let before: usize = records.len();
        records.retain(|k, _| k.asset_space != asset_space || k.version == keep_version);
        before - records.len()
    }

    async fn purge(&self, asset_space: &str) -> usize {
        let mut records = self.records.write();
        let before: usize = records.len();
        records.retain(|k, _| k.asset_space != asset_space);
        before - records.len()
    }

    async fn count(&self) -> usize {
        self.records.read().len()
    }

    async fn clear(&self) {
        self.records.write().clear();
    }
}
