//! Turning a merged upload into a published asset space.
//!
//! ```text
//! merged archive ──unpack──> <root>/.staging-XXXX ──prepare──> ──pack──> manifest.json + game.core
//!                                      │
//!                                      └──publish (directory swap)──> <root>/<asset_space_id>
//! ```
//!
//! Preparing reads the bundle title, fixes up `internal/` layouts and finds
//! the cover image (see [`crate::bundle`]). When an images directory is
//! configured the cover is copied there as `<asset_space_id>.<ext>` after
//! publishing.
//!
//! The merged archive is deleted whether or not ingest succeeds.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use assetpack_common::MANIFEST_FILE_NAME;
use assetpack_model::Manifest;
use assetpack_packager::{AssetSpaceStore, PackOptions, PackOutput, Packager};
use tempfile::TempDir;

use crate::bundle::{image_extension, prepare_bundle, BundleInfo};
use crate::error::UploadError;
use crate::reassembler::MergedUpload;
use crate::unpack::{UnpackReport, Unpacker, ZipUnpacker};

/// Outcome of a successful ingest.
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub asset_space_id: String,
    /// Public base path the asset space is served under (`/Games/<id>`).
    pub base_path: String,
    /// Published directory on disk.
    pub published_dir: PathBuf,
    /// The published manifest.
    pub manifest: Manifest,
    pub unpack: UnpackReport,
    /// Title from the bundle's `index.html`.
    pub title: Option<String>,
    /// Public path of the cover image: `/images/<id>.<ext>` when an images
    /// directory is configured, otherwise the image inside the asset space.
    pub image: Option<String>,
}

/// Unpacks, packs and publishes uploaded archives.
#[derive(Clone)]
pub struct IngestPipeline {
    store: AssetSpaceStore,
    unpacker: Arc<dyn Unpacker>,
    images_dir: Option<PathBuf>,
}

impl IngestPipeline {
    /// Create a pipeline publishing into `store`, extracting zip archives.
    pub fn new(store: AssetSpaceStore) -> Self {
        Self::with_unpacker(store, Arc::new(ZipUnpacker::new()))
    }

    /// Create a pipeline with a custom unpacker.
    pub fn with_unpacker(store: AssetSpaceStore, unpacker: Arc<dyn Unpacker>) -> Self {
        Self {
            store,
            unpacker,
            images_dir: None,
        }
    }

    /// Copy each bundle's cover image into `dir`.
    pub fn with_images_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.images_dir = Some(dir.into());
        self
    }

    /// The store published asset spaces land in.
    pub fn store(&self) -> &AssetSpaceStore {
        &self.store
    }

    /// Ingest a merged upload.
    pub async fn ingest_merged(
        &self,
        merged: &MergedUpload,
        asset_space_id: &str,
    ) -> Result<IngestReport, UploadError> {
        self.ingest(&merged.path, asset_space_id).await
    }

    /// Unpack `archive`, pack it and publish it as `asset_space_id`.
    ///
    /// The blocking unpack and pack run on the blocking thread pool.
    ///
    /// # Errors
    /// Returns the first unpack, pack or publish failure. The previously
    /// published version stays in place on failure.
    pub async fn ingest(
        &self,
        archive: &Path,
        asset_space_id: &str,
    ) -> Result<IngestReport, UploadError> {
        let pipeline: IngestPipeline = self.clone();
        let archive_path: PathBuf = archive.to_path_buf();
        let id: String = asset_space_id.to_string();

        let result: Result<IngestReport, UploadError> =
            tokio::task::spawn_blocking(move || pipeline.ingest_blocking(&archive_path, &id))
                .await
                .map_err(|e| UploadError::TaskFailed(e.to_string()))
                .and_then(|r| r);

        match tokio::fs::remove_file(archive).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => log::warn!("Failed to remove archive {}: {}", archive.display(), e),
        }

        result
    }

    fn ingest_blocking(
        &self,
        archive: &Path,
        asset_space_id: &str,
    ) -> Result<IngestReport, UploadError> {
        let published: PathBuf = self.store.dir(asset_space_id)?;
        let staging: TempDir = self.store.create_staging()?;

        let unpack: UnpackReport = self.unpacker.unpack(archive, staging.path())?;
        let bundle: BundleInfo = prepare_bundle(staging.path())?;

        let mut options: PackOptions = PackOptions::new(asset_space_id);
        if let Some(version) = published_version(&published, asset_space_id) {
            options = options.with_previous_version(version);
        }
        let output: PackOutput = Packager::new(options).pack(staging.path(), None)?;

        let published_dir: PathBuf = self.store.publish(asset_space_id, staging.path())?;
        let base_path: String = AssetSpaceStore::base_path(asset_space_id);
        let image: Option<String> = bundle
            .cover_image
            .as_deref()
            .map(|name| self.publish_cover(asset_space_id, &published_dir, &base_path, name));

        log::info!(
            "Ingested {} as {} ({} files, version {})",
            archive.display(),
            base_path,
            output.manifest.file_count(),
            output.manifest.version
        );

        Ok(IngestReport {
            asset_space_id: asset_space_id.to_string(),
            base_path,
            published_dir,
            manifest: output.manifest,
            unpack,
            title: bundle.title,
            image,
        })
    }

    /// Public path of the cover `name` found at the top of `published_dir`.
    ///
    /// A failed copy into the images directory is logged and the image is
    /// served from the asset space instead.
    fn publish_cover(
        &self,
        asset_space_id: &str,
        published_dir: &Path,
        base_path: &str,
        name: &str,
    ) -> String {
        let in_space: String = format!("{}/{}", base_path, name);
        let (Some(images_dir), Some(ext)) = (&self.images_dir, image_extension(name)) else {
            return in_space;
        };

        let file_name: String = format!("{}.{}", asset_space_id, ext);
        let copied: std::io::Result<u64> = std::fs::create_dir_all(images_dir)
            .and_then(|_| std::fs::copy(published_dir.join(name), images_dir.join(&file_name)));
        match copied {
            Ok(_) => format!("/images/{}", file_name),
            Err(e) => {
                log::warn!(
                    "Failed to copy cover image of {} into {}: {}",
                    asset_space_id,
                    images_dir.display(),
                    e
                );
                in_space
            }
        }
    }
}

fn published_version(dir: &Path, asset_space_id: &str) -> Option<u64> {
    let bytes: Vec<u8> = std::fs::read(dir.join(MANIFEST_FILE_NAME)).ok()?;
    let manifest: Manifest = Manifest::decode(&bytes).ok()?;
    (manifest.asset_space_id == asset_space_id).then_some(manifest.version)
}
