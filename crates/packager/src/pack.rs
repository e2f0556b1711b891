//! Packing a source tree into a blob and manifest.
//!
//! The blob and the manifest are both written and fsynced as temporary files
//! in the destination directory before either is renamed into place, blob
//! first:
//!
//! ```text
//! .assetpack-tmpXXXX  --fsync--+--rename-->  game.core
//! .assetpack-tmpYYYY  --fsync--+--rename-->  manifest.json
//! ```
//!
//! A manifest is therefore never visible before the blob that backs it. The
//! previous blob is kept as a hard link until the manifest rename succeeds
//! and is restored if it fails, so a failed pack leaves the previously
//! published pair untouched.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use assetpack_common::{
    ProgressCallback, BLOB_FILE_NAME, LEGACY_BLOB_FILE_NAMES, MANIFEST_FILE_NAME,
};
use assetpack_model::{Manifest, ManifestBuilder};
use tempfile::{NamedTempFile, TempPath};

use crate::error::PackError;
use crate::scanner::{scan_source_tree, SourceFile, TEMP_FILE_PREFIX};

/// Options for a pack operation.
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Asset space written into the manifest.
    pub asset_space_id: String,
    /// File name of the manifest output.
    pub manifest_name: String,
    /// File name of the blob output.
    pub blob_name: String,
    /// Additional file names never packed.
    pub extra_excludes: Vec<String>,
    /// Version already published elsewhere for this asset space, when the
    /// destination holds no manifest of its own (packing into a staging dir).
    pub previous_version: Option<u64>,
}

impl PackOptions {
    /// Create options for `asset_space_id` with the canonical output names.
    pub fn new(asset_space_id: impl Into<String>) -> Self {
        Self {
            asset_space_id: asset_space_id.into(),
            manifest_name: MANIFEST_FILE_NAME.to_string(),
            blob_name: BLOB_FILE_NAME.to_string(),
            extra_excludes: Vec::new(),
            previous_version: None,
        }
    }

    /// Set the manifest file name.
    pub fn with_manifest_name(mut self, name: impl Into<String>) -> Self {
        self.manifest_name = name.into();
        self
    }

    /// Set the blob file name.
    pub fn with_blob_name(mut self, name: impl Into<String>) -> Self {
        self.blob_name = name.into();
        self
    }

    /// Never pack files with this name.
    pub fn with_exclude(mut self, name: impl Into<String>) -> Self {
        self.extra_excludes.push(name.into());
        self
    }

    /// Make the new version exceed `version`.
    pub fn with_previous_version(mut self, version: u64) -> Self {
        self.previous_version = Some(version);
        self
    }

    /// All file names excluded from the pack: both outputs, the legacy blob
    /// names and any extra exclusions.
    pub fn excluded_names(&self) -> HashSet<String> {
        let mut names: HashSet<String> = HashSet::new();
        names.insert(self.manifest_name.clone());
        names.insert(self.blob_name.clone());
        names.extend(LEGACY_BLOB_FILE_NAMES.iter().map(|s| s.to_string()));
        names.extend(self.extra_excludes.iter().cloned());
        names
    }
}

/// Progress updates while packing.
#[derive(Debug, Clone)]
pub struct PackProgress {
    /// File currently being appended.
    pub current_path: Option<String>,
    /// Files appended so far.
    pub files_packed: u64,
    /// Total files to pack.
    pub total_files: u64,
    /// Bytes written to the blob so far.
    pub bytes_written: u64,
}

/// Result of a successful pack.
#[derive(Debug, Clone)]
pub struct PackOutput {
    /// The published manifest.
    pub manifest: Manifest,
    /// Where the manifest was written.
    pub manifest_path: PathBuf,
    /// Where the blob was written.
    pub blob_path: PathBuf,
}

/// Packs source trees into blob + manifest pairs.
pub struct Packager {
    options: PackOptions,
}

impl Packager {
    /// Create a packager.
    pub fn new(options: PackOptions) -> Self {
        Self { options }
    }

    /// Options in use.
    pub fn options(&self) -> &PackOptions {
        &self.options
    }

    /// Pack `source_dir` in place: outputs land next to the source files.
    ///
    /// # Errors
    /// Returns `PackagingFailed` with the failing path on any I/O error.
    pub fn pack(
        &self,
        source_dir: &Path,
        progress: Option<&dyn ProgressCallback<PackProgress>>,
    ) -> Result<PackOutput, PackError> {
        self.pack_into(source_dir, source_dir, progress)
    }

    /// Pack `source_dir` and publish the outputs into `dest_dir`.
    ///
    /// # Arguments
    /// * `source_dir` - Tree to pack
    /// * `dest_dir` - Directory receiving the manifest and blob
    /// * `progress` - Optional progress callback; returning false cancels
    ///
    /// # Errors
    /// Returns `PackagingFailed` with the failing path on any I/O error.
    pub fn pack_into(
        &self,
        source_dir: &Path,
        dest_dir: &Path,
        progress: Option<&dyn ProgressCallback<PackProgress>>,
    ) -> Result<PackOutput, PackError> {
        let files: Vec<SourceFile> = scan_source_tree(source_dir, &self.options.excluded_names())?;

        std::fs::create_dir_all(dest_dir)
            .map_err(|e| PackError::io(dest_dir.display().to_string(), e))?;

        let manifest_path: PathBuf = dest_dir.join(&self.options.manifest_name);
        let blob_path: PathBuf = dest_dir.join(&self.options.blob_name);
        let version: u64 = self.next_version(&manifest_path);

        let (blob_tmp, builder): (NamedTempFile, ManifestBuilder) =
            self.write_blob(&files, dest_dir, progress)?;
        let manifest: Manifest = builder.finish(version);

        let json: String = manifest
            .encode()
            .map_err(|e| PackError::io(manifest_path.display().to_string(), std::io::Error::other(e)))?;
        let mut manifest_tmp: NamedTempFile = temp_file_in(dest_dir)?;
        manifest_tmp
            .write_all(json.as_bytes())
            .and_then(|_| manifest_tmp.as_file().sync_all())
            .map_err(|e| PackError::io(manifest_tmp.path().display().to_string(), e))?;

        publish_pair(blob_tmp, &blob_path, manifest_tmp, &manifest_path, dest_dir)?;

        log::info!(
            "Packed {} files ({} bytes) for {} at version {}",
            manifest.file_count(),
            manifest.total_size(),
            manifest.asset_space_id,
            manifest.version
        );

        Ok(PackOutput {
            manifest,
            manifest_path,
            blob_path,
        })
    }

    /// Append every file to a staged blob and record its entry.
    fn write_blob(
        &self,
        files: &[SourceFile],
        dest_dir: &Path,
        progress: Option<&dyn ProgressCallback<PackProgress>>,
    ) -> Result<(NamedTempFile, ManifestBuilder), PackError> {
        let total_files: u64 = files.len() as u64;
        let mut builder: ManifestBuilder = ManifestBuilder::new(self.options.asset_space_id.clone());
        let tmp: NamedTempFile = temp_file_in(dest_dir)?;
        let tmp_path: String = tmp.path().display().to_string();
        let mut writer: BufWriter<&File> = BufWriter::new(tmp.as_file());

        for (idx, file) in files.iter().enumerate() {
            if let Some(cb) = progress {
                let should_continue: bool = cb.on_progress(&PackProgress {
                    current_path: Some(file.relative_path.clone()),
                    files_packed: idx as u64,
                    total_files,
                    bytes_written: builder.cursor(),
                });
                if !should_continue {
                    return Err(PackError::Cancelled);
                }
            }

            let source: File = File::open(&file.path)
                .map_err(|e| PackError::io(file.path.display().to_string(), e))?;
            // Record what was actually copied; the file may have changed since the scan.
            let copied: u64 = copy_file(source, &mut writer, &file.path, &tmp_path)?;
            if copied != file.size {
                log::warn!(
                    "{} changed size while packing ({} -> {} bytes)",
                    file.path.display(),
                    file.size,
                    copied
                );
            }
            builder.append(file.relative_path.clone(), copied);
        }

        writer
            .flush()
            .map_err(|e| PackError::io(tmp_path.clone(), e))?;
        drop(writer);
        tmp.as_file()
            .sync_all()
            .map_err(|e| PackError::io(tmp_path, e))?;

        if let Some(cb) = progress {
            cb.on_progress(&PackProgress {
                current_path: None,
                files_packed: total_files,
                total_files,
                bytes_written: builder.cursor(),
            });
        }

        Ok((tmp, builder))
    }

    /// Next version stamp for the manifest at `manifest_path`.
    ///
    /// Wall-clock milliseconds, bumped past any version already published
    /// for the same asset space so repacks always increase strictly.
    fn next_version(&self, manifest_path: &Path) -> u64 {
        let now: u64 = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let on_disk: Option<u64> = std::fs::read(manifest_path)
            .ok()
            .and_then(|bytes| Manifest::decode(&bytes).ok())
            .filter(|m| m.asset_space_id == self.options.asset_space_id)
            .map(|m| m.version);
        let previous: Option<u64> = on_disk.max(self.options.previous_version);

        match previous {
            Some(prev) => now.max(prev.saturating_add(1)),
            None => now,
        }
    }
}

/// Copy one source file into the blob writer, returning the bytes copied.
fn copy_file(
    mut source: File,
    writer: &mut BufWriter<&File>,
    source_path: &Path,
    blob_path: &str,
) -> Result<u64, PackError> {
    let mut buffer: Vec<u8> = vec![0u8; 64 * 1024];
    let mut copied: u64 = 0;
    loop {
        let read: usize = source
            .read(&mut buffer)
            .map_err(|e| PackError::io(source_path.display().to_string(), e))?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..read])
            .map_err(|e| PackError::io(blob_path.to_string(), e))?;
        copied += read as u64;
    }
    Ok(copied)
}

/// Create a temporary file in `dir` that the scanner will never pick up.
fn temp_file_in(dir: &Path) -> Result<NamedTempFile, PackError> {
    tempfile::Builder::new()
        .prefix(TEMP_FILE_PREFIX)
        .tempfile_in(dir)
        .map_err(|e| PackError::io(dir.display().to_string(), e))
}

/// Rename the staged blob and manifest into place, blob first.
///
/// If the manifest cannot be renamed, the previous blob (or its absence) is
/// restored so the published manifest keeps pointing at its own bytes.
fn publish_pair(
    blob_tmp: NamedTempFile,
    blob_path: &Path,
    manifest_tmp: NamedTempFile,
    manifest_path: &Path,
    dest_dir: &Path,
) -> Result<(), PackError> {
    let backup: Option<TempPath> = backup_blob(blob_path, dest_dir)?;

    persist(blob_tmp, blob_path)?;

    if let Err(e) = persist(manifest_tmp, manifest_path) {
        let restored: std::io::Result<()> = match &backup {
            Some(backup) => std::fs::rename(backup, blob_path),
            None => std::fs::remove_file(blob_path),
        };
        if let Err(restore_err) = restored {
            log::error!(
                "Failed to restore previous blob {}: {}",
                blob_path.display(),
                restore_err
            );
        }
        return Err(e);
    }
    Ok(())
}

/// Hard link (or copy) the current blob to a temporary name.
///
/// Returns `None` when no blob is published yet. The link is deleted when
/// the returned path is dropped.
fn backup_blob(blob_path: &Path, dest_dir: &Path) -> Result<Option<TempPath>, PackError> {
    if !blob_path.exists() {
        return Ok(None);
    }
    let backup: TempPath = temp_file_in(dest_dir)?.into_temp_path();
    let linked: std::io::Result<()> = std::fs::remove_file(&backup)
        .and_then(|_| std::fs::hard_link(blob_path, &backup))
        .or_else(|_| std::fs::copy(blob_path, &backup).map(|_| ()));
    linked.map_err(|e| PackError::io(blob_path.display().to_string(), e))?;
    Ok(Some(backup))
}

/// Rename a staged file over its canonical path.
fn persist(tmp: NamedTempFile, target: &Path) -> Result<(), PackError> {
    tmp.persist(target)
        .map(|_| ())
        .map_err(|e| PackError::io(target.display().to_string(), e.error))
}
