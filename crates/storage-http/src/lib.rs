//! HTTP backend for assetpack blob sources.
//!
//! This crate provides a `BlobSource` implementation using `reqwest`. The
//! packed blob is read with standard byte-range requests; manifests are
//! fetched with a cache-busting query so a repack is visible immediately.
//!
//! # Example
//!
//! ```ignore
//! use assetpack_storage::{CacheOptions, RangeCache, SqliteRecordStore};
//! use assetpack_storage_http::{HttpBlobSource, HttpSourceOptions};
//!
//! let source = HttpBlobSource::new(HttpSourceOptions::default())?;
//! let store = Arc::new(SqliteRecordStore::open(&db_path)?);
//! let cache = RangeCache::new(source, store, CacheOptions::default());
//!
//! cache.init("H000001", "https://cdn.example.com/Games/H000001").await?;
//! let bytes = cache.read("H000001", "index.html").await?;
//! ```

mod client;
mod error;

pub use client::{HttpBlobSource, HttpSourceOptions, DEFAULT_REQUEST_TIMEOUT, DEFAULT_USER_AGENT};
pub use error::HttpSourceError;
