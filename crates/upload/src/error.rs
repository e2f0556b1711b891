//! Upload and ingest error types.

use assetpack_common::PathError;
use assetpack_packager::PackError;
use thiserror::Error;

/// Errors that can occur while receiving, merging or ingesting an upload.
#[derive(Debug, Error)]
pub enum UploadError {
    /// Merge requested before every chunk arrived. No output was written;
    /// the caller resubmits `missing_index` and retries.
    #[error("Upload {upload_id} is incomplete: chunk {missing_index} is missing")]
    IncompleteUpload {
        upload_id: String,
        /// Lowest missing chunk index.
        missing_index: u32,
    },

    /// The session is merging, finished or abandoned.
    #[error("Upload session {upload_id} is closed ({state})")]
    SessionClosed { upload_id: String, state: String },

    #[error("Invalid upload id {upload_id:?}: {source}")]
    InvalidUploadId {
        upload_id: String,
        #[source]
        source: PathError,
    },

    #[error("Invalid file name {file_name:?}: {source}")]
    InvalidFileName {
        file_name: String,
        #[source]
        source: PathError,
    },

    /// A file too large to index its chunks with `u32` at this chunk size.
    #[error("{size} bytes at {chunk_size} bytes per chunk exceeds the chunk index range")]
    TooManyChunks { size: u64, chunk_size: u64 },

    #[error("Invalid chunk count {total_chunks} for upload {upload_id}")]
    InvalidChunkCount { upload_id: String, total_chunks: u32 },

    #[error("IO error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Archive {path} has no entries")]
    EmptyArchive { path: String },

    #[error("Invalid archive {path}: {message}")]
    InvalidArchive { path: String, message: String },

    /// Entry name is absolute or climbs out of the extraction root.
    #[error("Archive entry escapes destination: {name}")]
    UnsafeArchiveEntry { name: String },

    #[error(transparent)]
    Pack(#[from] PackError),

    #[error("Background task failed: {0}")]
    TaskFailed(String),
}

impl UploadError {
    /// Wrap an I/O error with the path that failed.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        UploadError::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the caller can recover by resubmitting data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::IncompleteUpload { .. } | UploadError::Io { .. })
    }
}
