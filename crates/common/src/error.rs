//! Shared error types used across assetpack crates.

use thiserror::Error;

/// Path-related errors shared across crates.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// File is not below the tree being packed.
    #[error("Path is outside root: {path} not in {root}")]
    PathOutsideRoot { path: String, root: String },

    /// Logical path is empty, absolute or has `.`/`..`/empty components.
    #[error("Invalid path: {path}")]
    InvalidPath { path: String },

    /// A single path component was expected (no separators, no `.`/`..`).
    #[error("Invalid path component: {value:?}")]
    InvalidComponent { value: String },
}
