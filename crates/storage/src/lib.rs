//! Range-serving cache for packed asset spaces.
//!
//! An asset space is published as a manifest plus one packed blob. This
//! crate serves individual files out of that blob by byte range:
//!
//! - **Blob sources** - [`BlobSource`] abstracts where manifests and blobs live;
//!   [`FsBlobSource`] reads a local directory tree. The HTTP implementation
//!   lives in `assetpack-storage-http`.
//! - **Record store** - fetched bytes are persisted keyed by
//!   `(asset space, path, version)` so a repeat read costs no request.
//!   [`SqliteRecordStore`] survives restarts, [`MemoryRecordStore`] does not.
//! - **Range cache** - [`RangeCache`] ties both together, coalesces concurrent
//!   reads of the same file, and falls back to direct fetches.

mod content_type;
mod error;
mod fs_source;
mod inflight;
mod range_cache;
pub mod record_store;
mod source;

pub use content_type::{content_type_for, DEFAULT_CONTENT_TYPE};
pub use error::{CacheError, SourceError};
pub use fs_source::FsBlobSource;
pub use inflight::{InFlightReads, ReadResult};
pub use range_cache::{
    AssetSource, AssetSpace, CacheOptions, CacheStats, InitReport, RangeCache, ServedAsset,
    DEFAULT_RANGE_TIMEOUT,
};
pub use record_store::{
    CacheKey, CacheRecord, MemoryRecordStore, RecordStore, RecordStoreError, SqliteRecordStore,
};
pub use source::{join_location, BlobLayout, BlobSource};
