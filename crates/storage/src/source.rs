//! Blob source interface and on-disk layout of a published asset space.

use async_trait::async_trait;

use assetpack_common::{BLOB_FILE_NAME, MANIFEST_FILE_NAME};

use crate::error::SourceError;

/// File names of the artifacts under an asset space's base location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobLayout {
    /// Manifest file name.
    pub manifest_name: String,
    /// Packed blob file name.
    pub blob_name: String,
}

impl Default for BlobLayout {
    fn default() -> Self {
        Self {
            manifest_name: MANIFEST_FILE_NAME.to_string(),
            blob_name: BLOB_FILE_NAME.to_string(),
        }
    }
}

impl BlobLayout {
    /// Set the manifest file name.
    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = name.into();
        self
    }

    /// Set the blob file name.
    pub fn with_blob_name(mut self, name: impl Into<String>) -> Self {
        self.blob_name = name.into();
        self
    }

    /// `<base>/<manifest_name>`
    pub fn manifest_location(&self, base: &str) -> String {
        join_location(base, &self.manifest_name)
    }

    /// `<base>/<blob_name>`
    pub fn blob_location(&self, base: &str) -> String {
        join_location(base, &self.blob_name)
    }
}

/// Join a base location and a relative path with exactly one `/`.
pub fn join_location(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Where the range cache reads manifests and blob ranges from.
///
/// `base` is the asset space's base location: a directory for local
/// sources, a URL prefix for HTTP sources.
#[async_trait]
pub trait BlobSource: Send + Sync {
    /// Fetch the raw manifest bytes, bypassing any intermediate caches.
    async fn fetch_manifest(&self, base: &str) -> Result<Vec<u8>, SourceError>;

    /// Length of the packed blob, if the source can tell cheaply.
    async fn blob_len(&self, base: &str) -> Result<Option<u64>, SourceError>;

    /// Read `size` bytes of the blob starting at `offset`.
    ///
    /// Implementations return exactly `size` bytes or an error.
    async fn read_range(&self, base: &str, offset: u64, size: u64)
        -> Result<Vec<u8>, SourceError>;

    /// Fetch an unpacked asset at `<base>/<path>` without a range.
    async fn read_direct(&self, base: &str, path: &str) -> Result<Vec<u8>, SourceError>;
}
