//! On-disk layout of published asset spaces.
//!
//! ```text
//! <root>/
//!   <asset_space_id>/        published, served as /Games/<asset_space_id>
//!     manifest.json
//!     game.core
//!   .staging-XXXX/           being unpacked and packed
//!   .trash-<id>-<nanos>/     previous version, removed after the swap
//! ```

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use assetpack_common::{validate_component, PUBLIC_BASE_PREFIX};
use tempfile::TempDir;

use crate::error::PackError;

const STAGING_PREFIX: &str = ".staging-";
const TRASH_PREFIX: &str = ".trash-";

/// Root directory holding one subdirectory per published asset space.
#[derive(Debug, Clone)]
pub struct AssetSpaceStore {
    root: PathBuf,
}

impl AssetSpaceStore {
    /// Create a store rooted at `root`. The directory is created on demand.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of a published asset space.
    ///
    /// # Errors
    /// Returns `InvalidAssetSpaceId` if the id is not a single path component.
    pub fn dir(&self, asset_space_id: &str) -> Result<PathBuf, PackError> {
        validate_component(asset_space_id).map_err(PackError::InvalidAssetSpaceId)?;
        Ok(self.root.join(asset_space_id))
    }

    /// Public base path the asset space is served under.
    pub fn base_path(asset_space_id: &str) -> String {
        format!("{}/{}", PUBLIC_BASE_PREFIX, asset_space_id)
    }

    /// Whether the asset space has been published.
    pub fn exists(&self, asset_space_id: &str) -> bool {
        self.dir(asset_space_id).map(|d| d.is_dir()).unwrap_or(false)
    }

    /// Create a fresh staging directory on the same filesystem as the
    /// published tree, so publishing is a rename.
    ///
    /// The directory is removed when the returned guard is dropped unless it
    /// has been published.
    pub fn create_staging(&self) -> Result<TempDir, PackError> {
        std::fs::create_dir_all(&self.root)
            .map_err(|e| PackError::io(self.root.display().to_string(), e))?;
        tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&self.root)
            .map_err(|e| PackError::io(self.root.display().to_string(), e))
    }

    /// Swap a fully packed staging directory into `<root>/<asset_space_id>`.
    ///
    /// The previous directory, if any, is moved aside first and only removed
    /// once the new one is in place; if the final rename fails it is moved
    /// back.
    ///
    /// # Errors
    /// Returns `PackagingFailed` with the path that could not be renamed.
    pub fn publish(&self, asset_space_id: &str, staged: &Path) -> Result<PathBuf, PackError> {
        let target: PathBuf = self.dir(asset_space_id)?;

        let trash: Option<PathBuf> = if target.exists() {
            let aside: PathBuf = self.root.join(format!(
                "{}{}-{}",
                TRASH_PREFIX,
                asset_space_id,
                SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos()
            ));
            std::fs::rename(&target, &aside)
                .map_err(|e| PackError::io(target.display().to_string(), e))?;
            Some(aside)
        } else {
            None
        };

        if let Err(e) = std::fs::rename(staged, &target) {
            if let Some(aside) = &trash {
                if let Err(restore) = std::fs::rename(aside, &target) {
                    log::warn!(
                        "Failed to restore {} from {}: {}",
                        target.display(),
                        aside.display(),
                        restore
                    );
                }
            }
            return Err(PackError::io(staged.display().to_string(), e));
        }

        if let Some(aside) = trash {
            if let Err(e) = std::fs::remove_dir_all(&aside) {
                log::warn!("Failed to remove previous version {}: {}", aside.display(), e);
            }
        }

        log::info!("Published {} at {}", asset_space_id, target.display());
        Ok(target)
    }

    /// Delete a published asset space. Missing directories are not an error.
    pub fn remove(&self, asset_space_id: &str) -> Result<bool, PackError> {
        let target: PathBuf = self.dir(asset_space_id)?;
        match std::fs::remove_dir_all(&target) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(PackError::io(target.display().to_string(), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_base_path() {
        assert_eq!(AssetSpaceStore::base_path("H000001"), "/Games/H000001");
    }

    #[test]
    fn test_dir_rejects_traversal() {
        let store: AssetSpaceStore = AssetSpaceStore::new("/srv/games");
        assert!(matches!(
            store.dir(".."),
            Err(PackError::InvalidAssetSpaceId(_))
        ));
        assert!(matches!(
            store.dir("a/b"),
            Err(PackError::InvalidAssetSpaceId(_))
        ));
        assert_eq!(store.dir("g1").unwrap(), PathBuf::from("/srv/games/g1"));
    }

    #[test]
    fn test_publish_replaces_previous_version() {
        let root = tempfile::tempdir().unwrap();
        let store: AssetSpaceStore = AssetSpaceStore::new(root.path());

        let first: TempDir = store.create_staging().unwrap();
        fs::write(first.path().join("old.txt"), b"old").unwrap();
        store.publish("g", first.path()).unwrap();

        let second: TempDir = store.create_staging().unwrap();
        fs::write(second.path().join("new.txt"), b"new").unwrap();
        let published: PathBuf = store.publish("g", second.path()).unwrap();

        assert!(published.join("new.txt").exists());
        assert!(!published.join("old.txt").exists());

        drop(first);
        drop(second);
        let leftovers: Vec<String> = fs::read_dir(root.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(leftovers, vec!["g".to_string()]);
    }

    #[test]
    fn test_remove() {
        let root = tempfile::tempdir().unwrap();
        let store: AssetSpaceStore = AssetSpaceStore::new(root.path());
        let staged: TempDir = store.create_staging().unwrap();
        store.publish("g", staged.path()).unwrap();

        assert!(store.exists("g"));
        assert!(store.remove("g").unwrap());
        assert!(!store.exists("g"));
        assert!(!store.remove("g").unwrap());
    }
}
