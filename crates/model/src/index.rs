//! In-memory path index over a validated manifest.

use std::collections::HashMap;

use crate::error::ValidationError;
use crate::manifest::{Manifest, ManifestEntry};

/// O(1) lookup from logical path to manifest entry.
///
/// Built once per `init` and shared read-only between concurrent readers.
#[derive(Debug, Clone)]
pub struct ManifestIndex {
    manifest: Manifest,
    by_path: HashMap<String, usize>,
}

impl ManifestIndex {
    /// Build an index from a manifest.
    ///
    /// # Arguments
    /// * `manifest` - Manifest to index
    /// * `blob_len` - Length of the backing blob, when known
    ///
    /// # Errors
    /// Returns error if the manifest is structurally invalid or any entry
    /// reads past `blob_len`.
    pub fn build(manifest: Manifest, blob_len: Option<u64>) -> Result<Self, ValidationError> {
        manifest.validate()?;
        if let Some(len) = blob_len {
            manifest.validate_against_blob(len)?;
        }

        let by_path: HashMap<String, usize> = manifest
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.path.clone(), i))
            .collect();

        Ok(Self { manifest, by_path })
    }

    /// Look up an entry by logical path.
    pub fn get(&self, path: &str) -> Option<&ManifestEntry> {
        self.by_path
            .get(path)
            .map(|&i| &self.manifest.entries[i])
    }

    /// Asset space this index belongs to.
    pub fn asset_space_id(&self) -> &str {
        &self.manifest.asset_space_id
    }

    /// Manifest version the index was built from.
    pub fn version(&self) -> u64 {
        self.manifest.version
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }

    /// The underlying manifest.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }
}
