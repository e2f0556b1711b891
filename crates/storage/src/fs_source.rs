//! Filesystem-backed blob source for locally published asset spaces.

use std::io::SeekFrom;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use assetpack_common::{from_posix_path, validate_logical_path};

use crate::error::SourceError;
use crate::source::{BlobLayout, BlobSource};

/// Reads manifests and blob ranges from a directory on disk.
///
/// `base` is the published asset-space directory, e.g. `/srv/games/H000001`.
#[derive(Debug, Clone, Default)]
pub struct FsBlobSource {
    layout: BlobLayout,
}

impl FsBlobSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layout(layout: BlobLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &BlobLayout {
        &self.layout
    }
}

#[async_trait]
impl BlobSource for FsBlobSource {
    async fn fetch_manifest(&self, base: &str) -> Result<Vec<u8>, SourceError> {
        let path: PathBuf = PathBuf::from(base).join(&self.layout.manifest_name);
        tokio::fs::read(&path)
            .await
            .map_err(|e| SourceError::io(path.display().to_string(), &e))
    }

    async fn blob_len(&self, base: &str) -> Result<Option<u64>, SourceError> {
        let path: PathBuf = PathBuf::from(base).join(&self.layout.blob_name);
        let meta: std::fs::Metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| SourceError::io(path.display().to_string(), &e))?;
        Ok(Some(meta.len()))
    }

    async fn read_range(
        &self,
        base: &str,
        offset: u64,
        size: u64,
    ) -> Result<Vec<u8>, SourceError> {
        let path: PathBuf = PathBuf::from(base).join(&self.layout.blob_name);
        let location: String = path.display().to_string();

        let mut file: tokio::fs::File = tokio::fs::File::open(&path)
            .await
            .map_err(|e| SourceError::io(location.clone(), &e))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .map_err(|e| SourceError::io(location.clone(), &e))?;

        let mut buffer: Vec<u8> = Vec::with_capacity(size as usize);
        let read: u64 = (&mut file)
            .take(size)
            .read_to_end(&mut buffer)
            .await
            .map_err(|e| SourceError::io(location.clone(), &e))? as u64;

        if read != size {
            return Err(SourceError::SizeMismatch {
                location,
                expected: size,
                actual: read,
            });
        }
        Ok(buffer)
    }

    async fn read_direct(&self, base: &str, path: &str) -> Result<Vec<u8>, SourceError> {
        validate_logical_path(path).map_err(|_| SourceError::InvalidPath {
            path: path.to_string(),
        })?;
        let full: PathBuf = from_posix_path(path, &PathBuf::from(base));
        tokio::fs::read(&full)
            .await
            .map_err(|e| SourceError::io(full.display().to_string(), &e))
    }
}
