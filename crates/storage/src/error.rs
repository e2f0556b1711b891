//! Error types for blob sources and the range cache.

use thiserror::Error;

/// Errors reported by a [`BlobSource`](crate::BlobSource).
#[derive(Error, Debug, Clone)]
pub enum SourceError {
    /// Object does not exist at the source.
    #[error("Not found: {location}")]
    NotFound { location: String },

    /// Transport failure.
    #[error("Network error: {message}")]
    NetworkError { message: String, retryable: bool },

    /// The server ignored or rejected the range request.
    #[error("Range request for {location} not honoured (status {status})")]
    RangeNotSupported { location: String, status: u16 },

    /// Response body does not have the requested length.
    #[error("Size mismatch for {location}: expected {expected} bytes, got {actual}")]
    SizeMismatch {
        location: String,
        expected: u64,
        actual: u64,
    },

    /// Local I/O error.
    #[error("I/O error for {path}: {message}")]
    IoError { path: String, message: String },

    /// Requested asset path cannot be resolved under the base.
    #[error("Invalid asset path: {path}")]
    InvalidPath { path: String },

    /// Invalid source configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl SourceError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::NetworkError { retryable, .. } => *retryable,
            SourceError::NotFound { .. } => false,
            SourceError::RangeNotSupported { .. } => false,
            SourceError::SizeMismatch { .. } => false,
            SourceError::IoError { .. } => false,
            SourceError::InvalidPath { .. } => false,
            SourceError::InvalidConfig { .. } => false,
        }
    }

    /// Wrap an I/O error with the path that failed.
    pub fn io(path: impl Into<String>, err: &std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            return SourceError::NotFound {
                location: path.into(),
            };
        }
        SourceError::IoError {
            path: path.into(),
            message: err.to_string(),
        }
    }
}

/// Errors returned by the range cache.
///
/// `NotFound` and `RangeReadFailed` are recoverable: `RangeCache::fetch`
/// falls back to a direct fetch of the asset when it sees them.
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Read before a successful `init` of the asset space.
    #[error("Asset space {asset_space} is not initialized")]
    NotReady { asset_space: String },

    /// Path absent from the manifest.
    #[error("{path} is not in the manifest of {asset_space}")]
    NotFound { asset_space: String, path: String },

    /// Range read failed, timed out or returned the wrong number of bytes.
    #[error("Range read for {path} failed: {message}")]
    RangeReadFailed { path: String, message: String },

    /// Manifest could not be fetched.
    #[error("Manifest unavailable at {base}: {source}")]
    ManifestUnavailable {
        base: String,
        #[source]
        source: SourceError,
    },

    /// Manifest was fetched but is malformed or inconsistent with the blob.
    #[error("Invalid manifest at {base}: {message}")]
    InvalidManifest { base: String, message: String },

    /// Fallback direct fetch failed.
    #[error("Direct fetch for {path} failed: {source}")]
    DirectFetchFailed {
        path: String,
        #[source]
        source: SourceError,
    },
}

impl CacheError {
    /// Whether `RangeCache::fetch` recovers from this error with a direct fetch.
    pub fn has_fallback(&self) -> bool {
        matches!(
            self,
            CacheError::NotFound { .. } | CacheError::RangeReadFailed { .. }
        )
    }
}
