//! Error types for manifest operations.

use thiserror::Error;

/// Errors that can occur while decoding or validating a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for manifest entries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Manifest has an empty asset space id")]
    EmptyAssetSpaceId,

    #[error("Entry path {path:?} is not a normalized relative path")]
    InvalidPath { path: String },

    #[error("Duplicate entry '{path}'")]
    DuplicatePath { path: String },

    #[error("Entry '{path}' range overflows: offset {offset} + size {size}")]
    RangeOverflow { path: String, offset: u64, size: u64 },

    #[error("Entry '{path}' reads past the end of the blob: {end} > {blob_len}")]
    OutOfBounds { path: String, end: u64, blob_len: u64 },
}
