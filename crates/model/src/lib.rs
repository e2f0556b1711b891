//! Manifest model for packed asset spaces.
//!
//! A packed asset space is one contiguous blob plus a manifest that maps
//! each logical path to an `(offset, size)` range inside that blob:
//!
//! ```text
//! { "gameId": "H123456", "v": 1718000000000,
//!   "files": [ { "p": "a.txt", "o": 0, "s": 2 }, { "p": "b/c.txt", "o": 2, "s": 3 } ] }
//! ```
//!
//! - [`Manifest`] / [`ManifestEntry`] - the wire format, strongly typed
//! - [`ManifestBuilder`] - appends entries at a running write cursor
//! - [`ManifestIndex`] - validated O(1) path lookup shared by readers

pub mod error;
pub mod index;
pub mod manifest;

pub use error::{ManifestError, ValidationError};
pub use index::ManifestIndex;
pub use manifest::{byte_range, Manifest, ManifestBuilder, ManifestEntry};
