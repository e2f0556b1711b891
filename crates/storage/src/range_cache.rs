//! Versioned, range-reading asset cache.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        RangeCache                          │
//! │  registry: RwLock<HashMap<id, Arc<AssetSpace>>>            │
//! │  store:    Arc<dyn RecordStore>   (id:path, v) -> bytes    │
//! │  inflight: InFlightReads          one read per key         │
//! │  source:   Arc<S: BlobSource>     manifest / range / file  │
//! └────────────────────────────────────────────────────────────┘
//!
//! read(id, path)
//!   registry ──none──> NotReady
//!   index    ──none──> NotFound
//!   store    ──hit───> bytes            (no network)
//!   inflight ──range read [o, o+s)──> store.put ──> bytes
//! ```
//!
//! Registry locks are never held across an await: readers clone the
//! `Arc<AssetSpace>` and release the lock, `init` builds the new state object
//! completely before swapping it in.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use assetpack_model::{Manifest, ManifestEntry, ManifestIndex};

use crate::content_type::content_type_for;
use crate::error::CacheError;
use crate::inflight::{InFlightReads, ReadResult};
use crate::record_store::{CacheKey, CacheRecord, RecordStore};
use crate::source::BlobSource;

/// Default timeout for a single range read (30 seconds).
pub const DEFAULT_RANGE_TIMEOUT: Duration = Duration::from_secs(30);

/// Options for the range cache.
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// A range read that takes longer fails with `RangeReadFailed`.
    pub range_timeout: Duration,
    /// Delete records of other versions when an asset space is (re)initialized.
    pub sweep_on_version_change: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            range_timeout: DEFAULT_RANGE_TIMEOUT,
            sweep_on_version_change: true,
        }
    }
}

impl CacheOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the range read timeout.
    pub fn with_range_timeout(mut self, timeout: Duration) -> Self {
        self.range_timeout = timeout;
        self
    }

    /// Enable or disable sweeping of other versions on init.
    pub fn with_sweep_on_version_change(mut self, sweep: bool) -> Self {
        self.sweep_on_version_change = sweep;
        self
    }
}

/// Runtime state of one initialized asset space.
#[derive(Debug)]
pub struct AssetSpace {
    base: String,
    index: ManifestIndex,
}

impl AssetSpace {
    /// Asset space id.
    pub fn id(&self) -> &str {
        self.index.asset_space_id()
    }

    /// Base location manifests, blobs and direct fetches resolve against.
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Installed manifest version.
    pub fn version(&self) -> u64 {
        self.index.version()
    }

    /// The path index.
    pub fn index(&self) -> &ManifestIndex {
        &self.index
    }

    fn key(&self, path: &str) -> CacheKey {
        CacheKey::new(self.id(), path, self.version())
    }
}

/// Outcome of `init`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub asset_space_id: String,
    /// Version now installed.
    pub version: u64,
    /// Version that was installed before, if any.
    pub previous_version: Option<u64>,
    pub file_count: usize,
    pub total_size: u64,
    /// The fetched manifest was older than the installed one and was ignored.
    pub ignored_stale: bool,
    /// Records of other versions removed from the store.
    pub swept_records: usize,
}

/// Where served bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetSource {
    /// Persistent record store, no network access.
    Store,
    /// Range read of the packed blob.
    Range,
    /// Direct, non-ranged fetch of the unpacked asset.
    Direct,
    /// Zero-length entry, answered from the manifest without any read.
    Manifest,
}

impl fmt::Display for AssetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: &str = match self {
            AssetSource::Store => "store",
            AssetSource::Range => "range",
            AssetSource::Direct => "direct",
            AssetSource::Manifest => "manifest",
        };
        f.write_str(s)
    }
}

/// An asset ready to serve.
#[derive(Debug, Clone)]
pub struct ServedAsset {
    pub bytes: Arc<Vec<u8>>,
    pub content_type: &'static str,
    pub source: AssetSource,
}

/// Counters for cache behaviour.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Asset spaces currently initialized.
    pub asset_spaces: usize,
    pub store_hits: u64,
    /// Range reads issued against the blob.
    pub range_reads: u64,
    /// Readers that joined a range read already in flight.
    pub coalesced_reads: u64,
    pub direct_fetches: u64,
}

/// Serves files of packed asset spaces by byte range, with a persistent,
/// version-keyed record store in front of the source.
pub struct RangeCache<S: BlobSource + 'static> {
    source: Arc<S>,
    store: Arc<dyn RecordStore>,
    registry: RwLock<HashMap<String, Arc<AssetSpace>>>,
    inflight: InFlightReads,
    options: CacheOptions,
    store_hits: AtomicU64,
    direct_fetches: AtomicU64,
}

impl<S: BlobSource + 'static> RangeCache<S> {
    /// Create a cache reading from `source` and persisting into `store`.
    pub fn new(source: S, store: Arc<dyn RecordStore>, options: CacheOptions) -> Self {
        Self {
            source: Arc::new(source),
            store,
            registry: RwLock::new(HashMap::new()),
            inflight: InFlightReads::new(),
            options,
            store_hits: AtomicU64::new(0),
            direct_fetches: AtomicU64::new(0),
        }
    }

    /// The blob source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Fetch, validate and install the manifest of an asset space.
    ///
    /// Idempotent; re-initializing replaces the previous index atomically.
    /// A manifest older than the installed one is ignored so versions never
    /// go backwards.
    ///
    /// # Arguments
    /// * `asset_space_id` - Id the manifest must declare
    /// * `base` - Base location of the published asset space
    ///
    /// # Errors
    /// Returns `ManifestUnavailable` if the manifest cannot be fetched and
    /// `InvalidManifest` if it is malformed, belongs to another asset space,
    /// or references bytes past the end of the blob.
    pub async fn init(&self, asset_space_id: &str, base: &str) -> Result<InitReport, CacheError> {
        let bytes: Vec<u8> = self.source.fetch_manifest(base).await.map_err(|source| {
            CacheError::ManifestUnavailable {
                base: base.to_string(),
                source,
            }
        })?;

        let manifest: Manifest =
            Manifest::decode(&bytes).map_err(|e| CacheError::InvalidManifest {
                base: base.to_string(),
                message: e.to_string(),
            })?;
        if manifest.asset_space_id != asset_space_id {
            return Err(CacheError::InvalidManifest {
                base: base.to_string(),
                message: format!(
                    "manifest belongs to {}, expected {}",
                    manifest.asset_space_id, asset_space_id
                ),
            });
        }

        let blob_len: Option<u64> = match self.source.blob_len(base).await {
            Ok(len) => len,
            Err(e) => {
                log::debug!("Blob length unavailable for {}: {}", base, e);
                None
            }
        };

        let index: ManifestIndex =
            ManifestIndex::build(manifest, blob_len).map_err(|e| CacheError::InvalidManifest {
                base: base.to_string(),
                message: e.to_string(),
            })?;

        let space: Arc<AssetSpace> = Arc::new(AssetSpace {
            base: base.to_string(),
            index,
        });
        let version: u64 = space.version();

        let (previous_version, installed): (Option<u64>, Arc<AssetSpace>) = {
            let mut registry = self.registry.write();
            let current: Option<Arc<AssetSpace>> = registry.get(asset_space_id).cloned();
            match current {
                Some(current) if current.version() > version => (Some(current.version()), current),
                current => {
                    registry.insert(asset_space_id.to_string(), space.clone());
                    (current.map(|c| c.version()), space)
                }
            }
        };

        let ignored_stale: bool = installed.version() != version;
        if ignored_stale {
            log::warn!(
                "Ignoring manifest v{} for {}: v{} is already installed",
                version,
                asset_space_id,
                installed.version()
            );
        }

        let swept_records: usize = if !ignored_stale
            && self.options.sweep_on_version_change
            && previous_version != Some(version)
        {
            self.store.sweep_stale(asset_space_id, version).await
        } else {
            0
        };

        log::info!(
            "Initialized {} at v{} ({} files, {} bytes)",
            asset_space_id,
            installed.version(),
            installed.index().len(),
            installed.index().manifest().total_size()
        );

        Ok(InitReport {
            asset_space_id: asset_space_id.to_string(),
            version: installed.version(),
            previous_version,
            file_count: installed.index().len(),
            total_size: installed.index().manifest().total_size(),
            ignored_stale,
            swept_records,
        })
    }

    /// Read the bytes of one file of an initialized asset space.
    ///
    /// # Errors
    /// - `NotReady` before a successful `init`
    /// - `NotFound` if the path is not in the manifest
    /// - `RangeReadFailed` if the range read fails, times out or returns the
    ///   wrong number of bytes
    pub async fn read(&self, asset_space_id: &str, path: &str) -> Result<Arc<Vec<u8>>, CacheError> {
        let space: Arc<AssetSpace> = self.space(asset_space_id)?;
        let entry: ManifestEntry = lookup(&space, path)?;
        self.read_entry(&space, entry).await.map(|(bytes, _)| bytes)
    }

    /// Serve one file, falling back to a direct fetch of `<base>/<path>`
    /// when the path is not in the manifest or the range read fails.
    pub async fn fetch(&self, asset_space_id: &str, path: &str) -> Result<ServedAsset, CacheError> {
        let space: Arc<AssetSpace> = self.space(asset_space_id)?;
        let content_type: &'static str = content_type_for(path);

        let primary: Result<(Arc<Vec<u8>>, AssetSource), CacheError> = match lookup(&space, path) {
            Ok(entry) => self.read_entry(&space, entry).await,
            Err(e) => Err(e),
        };

        match primary {
            Ok((bytes, source)) => Ok(ServedAsset {
                bytes,
                content_type,
                source,
            }),
            Err(e) if e.has_fallback() => {
                log::debug!("Falling back to direct fetch of {}: {}", path, e);
                let bytes: Vec<u8> = self
                    .source
                    .read_direct(space.base(), path)
                    .await
                    .map_err(|source| CacheError::DirectFetchFailed {
                        path: path.to_string(),
                        source,
                    })?;
                self.direct_fetches.fetch_add(1, Ordering::Relaxed);
                Ok(ServedAsset {
                    bytes: Arc::new(bytes),
                    content_type,
                    source: AssetSource::Direct,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn read_entry(
        &self,
        space: &AssetSpace,
        entry: ManifestEntry,
    ) -> Result<(Arc<Vec<u8>>, AssetSource), CacheError> {
        // Zero-length files have no expressible range; nothing to fetch.
        if entry.size == 0 {
            return Ok((Arc::new(Vec::new()), AssetSource::Manifest));
        }

        let key: CacheKey = space.key(&entry.path);
        if let Some(record) = self.store.get(&key).await {
            if record.data.len() as u64 == entry.size {
                self.store_hits.fetch_add(1, Ordering::Relaxed);
                return Ok((Arc::new(record.data), AssetSource::Store));
            }
            log::warn!(
                "Discarding record for {} with {} bytes, expected {}",
                key.record_id(),
                record.data.len(),
                entry.size
            );
            self.store.delete(&key).await;
        }

        let source: Arc<S> = self.source.clone();
        let store: Arc<dyn RecordStore> = self.store.clone();
        let base: String = space.base().to_string();
        let timeout: Duration = self.options.range_timeout;
        let read_key: CacheKey = key.clone();

        let result: ReadResult = self
            .inflight
            .run(&key, move || async move {
                let bytes: Vec<u8> = match tokio::time::timeout(
                    timeout,
                    source.read_range(&base, entry.offset, entry.size),
                )
                .await
                {
                    Ok(Ok(bytes)) => bytes,
                    Ok(Err(e)) => {
                        return Err(CacheError::RangeReadFailed {
                            path: entry.path,
                            message: e.to_string(),
                        })
                    }
                    Err(_) => {
                        return Err(CacheError::RangeReadFailed {
                            path: entry.path,
                            message: format!("timed out after {:?}", timeout),
                        })
                    }
                };

                if bytes.len() as u64 != entry.size {
                    return Err(CacheError::RangeReadFailed {
                        path: entry.path,
                        message: format!("expected {} bytes, got {}", entry.size, bytes.len()),
                    });
                }

                // Only complete, length-checked bytes reach the store.
                store.put(&read_key, &bytes).await;
                Ok(Arc::new(bytes))
            })
            .await;

        result.map(|bytes| (bytes, AssetSource::Range))
    }

    /// Remove an asset space from the registry. Cached records are kept.
    ///
    /// # Returns
    /// `true` if the asset space was initialized.
    pub fn teardown(&self, asset_space_id: &str) -> bool {
        let removed: bool = self.registry.write().remove(asset_space_id).is_some();
        if removed {
            log::info!("Tore down {}", asset_space_id);
        }
        removed
    }

    /// Tear down an asset space and delete all of its cached records.
    ///
    /// # Returns
    /// Number of records deleted.
    pub async fn purge(&self, asset_space_id: &str) -> usize {
        self.teardown(asset_space_id);
        let purged: usize = self.store.purge(asset_space_id).await;
        log::info!("Purged {} records of {}", purged, asset_space_id);
        purged
    }

    /// State object of an initialized asset space.
    pub fn asset_space(&self, asset_space_id: &str) -> Option<Arc<AssetSpace>> {
        self.registry.read().get(asset_space_id).cloned()
    }

    /// Installed version of an asset space.
    pub fn version(&self, asset_space_id: &str) -> Option<u64> {
        self.asset_space(asset_space_id).map(|s| s.version())
    }

    /// Whether a record for `path` at the installed version is in the store.
    pub async fn is_cached(&self, asset_space_id: &str, path: &str) -> bool {
        match self.asset_space(asset_space_id) {
            Some(space) => {
                let record: Option<CacheRecord> = self.store.get(&space.key(path)).await;
                record.is_some()
            }
            None => false,
        }
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            asset_spaces: self.registry.read().len(),
            store_hits: self.store_hits.load(Ordering::Relaxed),
            range_reads: self.inflight.started(),
            coalesced_reads: self.inflight.coalesced(),
            direct_fetches: self.direct_fetches.load(Ordering::Relaxed),
        }
    }

    fn space(&self, asset_space_id: &str) -> Result<Arc<AssetSpace>, CacheError> {
        self.asset_space(asset_space_id)
            .ok_or_else(|| CacheError::NotReady {
                asset_space: asset_space_id.to_string(),
            })
    }
}

fn lookup(space: &AssetSpace, path: &str) -> Result<ManifestEntry, CacheError> {
    space
        .index()
        .get(path)
        .cloned()
        .ok_or_else(|| CacheError::NotFound {
            asset_space: space.id().to_string(),
            path: path.to_string(),
        })
}
