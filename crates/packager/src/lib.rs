//! Build-time packager for asset spaces.
//!
//! This crate turns a directory tree of small files into the two artifacts
//! served at runtime:
//! - `scan_source_tree()` - deterministic depth-first file enumeration
//! - `Packager` - writes the packed blob and its manifest with atomic publish
//! - `AssetSpaceStore` - on-disk layout of published asset spaces

pub mod error;
pub mod pack;
pub mod scanner;
pub mod store;

// Re-export main types
pub use error::PackError;
pub use pack::{PackOptions, PackOutput, PackProgress, Packager};
pub use scanner::{scan_source_tree, SourceFile, TEMP_FILE_PREFIX};
pub use store::AssetSpaceStore;
