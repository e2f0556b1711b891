//! Persistent store of fetched asset bytes, keyed by version.
//!
//! A read that misses the store costs one range request; a hit costs none.
//! Records of older versions are harmless (their keys never match a current
//! lookup) and are swept lazily when an asset space is re-initialized.

mod backend;
mod entry;
mod memory;
mod sqlite;

pub use backend::RecordStore;
pub use entry::{CacheKey, CacheRecord};
pub use memory::MemoryRecordStore;
pub use sqlite::{RecordStoreError, SqliteRecordStore};
