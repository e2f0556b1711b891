//! Packaging error types.

use assetpack_common::PathError;
use thiserror::Error;

/// Errors that can occur while packing or publishing an asset space.
#[derive(Debug, Error)]
pub enum PackError {
    /// I/O failure during a pack attempt. Previously published artifacts
    /// are left untouched.
    #[error("Packaging failed at {path}: {source}")]
    PackagingFailed {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The asset space id cannot be used as a directory name.
    #[error("Invalid asset space id: {0}")]
    InvalidAssetSpaceId(#[source] PathError),

    /// Source directory does not exist or is not a directory.
    #[error("Source directory not found: {path}")]
    SourceNotFound {
        /// The missing directory.
        path: String,
    },

    /// Operation cancelled through the progress callback.
    #[error("Packaging cancelled")]
    Cancelled,
}

impl PackError {
    /// Wrap an I/O error with the path that failed.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        PackError::PackagingFailed {
            path: path.into(),
            source,
        }
    }

    /// The path attached to the error, if any.
    pub fn path(&self) -> Option<&str> {
        match self {
            PackError::PackagingFailed { path, .. } => Some(path),
            PackError::SourceNotFound { path } => Some(path),
            PackError::InvalidAssetSpaceId(_) | PackError::Cancelled => None,
        }
    }
}
