//! Shared types and utilities for the assetpack crates.
//!
//! This crate provides functionality used across the packager, the upload
//! reassembler and the range-serving cache:
//! - Manifest path normalization (POSIX, root-relative)
//! - Validation of single path components (upload ids, file names)
//! - Progress callbacks and cancellation
//! - Shared constants (canonical artifact names, chunk sizes)

pub mod constants;
pub mod error;
pub mod path_utils;
pub mod progress;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::PathError;
pub use path_utils::{
    from_posix_path, normalize_for_manifest, validate_component, validate_logical_path,
};
pub use progress::{progress_fn, CancelToken, FnProgress, ProgressCallback};
