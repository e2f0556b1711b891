//! Manifest wire format.

use std::collections::HashSet;

use assetpack_common::validate_logical_path;
use serde::{Deserialize, Serialize};

use crate::error::{ManifestError, ValidationError};

/// One logical file inside a packed blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Root-relative path with `/` separators.
    #[serde(rename = "p")]
    pub path: String,
    /// Byte offset of the file inside the blob.
    #[serde(rename = "o")]
    pub offset: u64,
    /// File size in bytes.
    #[serde(rename = "s")]
    pub size: u64,
}

impl ManifestEntry {
    /// Create a new manifest entry.
    pub fn new(path: impl Into<String>, offset: u64, size: u64) -> Self {
        Self {
            path: path.into(),
            offset,
            size,
        }
    }

    /// Exclusive end of the entry's byte range, `None` on overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.size)
    }

    /// Value for an HTTP `Range` header covering this entry.
    ///
    /// Returns `None` for zero-size entries, which have no expressible range.
    pub fn http_range(&self) -> Option<String> {
        byte_range(self.offset, self.size)
    }
}

/// `bytes=<first>-<last>` for `size` bytes starting at `offset`.
///
/// Returns `None` when `size` is zero or the range overflows.
pub fn byte_range(offset: u64, size: u64) -> Option<String> {
    let last: u64 = offset.checked_add(size)?.checked_sub(1)?;
    if size == 0 {
        return None;
    }
    Some(format!("bytes={}-{}", offset, last))
}

/// Versioned index of a packed asset space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Identifier of the asset space (one game).
    #[serde(rename = "gameId")]
    pub asset_space_id: String,
    /// Strictly increasing version stamp; the cache-invalidation key.
    #[serde(rename = "v")]
    pub version: u64,
    /// Entries in blob order.
    #[serde(rename = "files")]
    pub entries: Vec<ManifestEntry>,
}

impl Manifest {
    /// Decode a manifest from JSON bytes and validate its entries.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or an entry is invalid.
    pub fn decode(json: &[u8]) -> Result<Self, ManifestError> {
        let manifest: Manifest = serde_json::from_slice(json)?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Encode the manifest to compact JSON.
    pub fn encode(&self) -> Result<String, ManifestError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Total number of bytes the blob must hold (sum of all entry sizes).
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e: &ManifestEntry| e.size).sum()
    }

    /// Number of entries.
    pub fn file_count(&self) -> usize {
        self.entries.len()
    }

    /// Check structural validity independent of the blob.
    ///
    /// # Errors
    /// Returns the first invalid entry found.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.asset_space_id.is_empty() {
            return Err(ValidationError::EmptyAssetSpaceId);
        }

        let mut seen: HashSet<&str> = HashSet::with_capacity(self.entries.len());
        for entry in &self.entries {
            validate_logical_path(&entry.path).map_err(|_| ValidationError::InvalidPath {
                path: entry.path.clone(),
            })?;

            if entry.end().is_none() {
                return Err(ValidationError::RangeOverflow {
                    path: entry.path.clone(),
                    offset: entry.offset,
                    size: entry.size,
                });
            }

            if !seen.insert(entry.path.as_str()) {
                return Err(ValidationError::DuplicatePath {
                    path: entry.path.clone(),
                });
            }
        }
        Ok(())
    }

    /// Check every entry fits inside a blob of `blob_len` bytes.
    ///
    /// # Errors
    /// Returns `OutOfBounds` for the first entry that reads past the end.
    pub fn validate_against_blob(&self, blob_len: u64) -> Result<(), ValidationError> {
        for entry in &self.entries {
            let end: u64 = entry.end().ok_or_else(|| ValidationError::RangeOverflow {
                path: entry.path.clone(),
                offset: entry.offset,
                size: entry.size,
            })?;
            if end > blob_len {
                return Err(ValidationError::OutOfBounds {
                    path: entry.path.clone(),
                    end,
                    blob_len,
                });
            }
        }
        Ok(())
    }
}

/// Builds a manifest while a blob is being written.
///
/// Every appended entry starts at the current write cursor, which then
/// advances by the entry size.
#[derive(Debug, Clone)]
pub struct ManifestBuilder {
    asset_space_id: String,
    entries: Vec<ManifestEntry>,
    cursor: u64,
}

impl ManifestBuilder {
    /// Start an empty manifest for `asset_space_id`.
    pub fn new(asset_space_id: impl Into<String>) -> Self {
        Self {
            asset_space_id: asset_space_id.into(),
            entries: Vec::new(),
            cursor: 0,
        }
    }

    /// Record a file of `size` bytes written at the current cursor.
    pub fn append(&mut self, path: impl Into<String>, size: u64) -> &ManifestEntry {
        self.entries
            .push(ManifestEntry::new(path, self.cursor, size));
        self.cursor += size;
        &self.entries[self.entries.len() - 1]
    }

    /// Bytes recorded so far.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Finish the manifest with the given version.
    pub fn finish(self, version: u64) -> Manifest {
        Manifest {
            asset_space_id: self.asset_space_id,
            version,
            entries: self.entries,
        }
    }
}
