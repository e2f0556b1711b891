//! Archive extraction for uploaded asset bundles.

use std::fs::File;
use std::io::BufReader;
use std::path::{Component, Path, PathBuf};

use zip::ZipArchive;

use crate::error::UploadError;

/// Summary of an extraction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackReport {
    /// Regular files written.
    pub files: u64,
    /// Bytes written.
    pub bytes: u64,
    /// Top-level folder that was stripped, if the archive had one.
    pub stripped_root: Option<String>,
}

/// Extracts an archive into a directory.
pub trait Unpacker: Send + Sync {
    /// Extract `archive` into `dest`.
    ///
    /// # Errors
    /// Returns error if the archive is unreadable, empty, or contains an
    /// entry that would land outside `dest`.
    fn unpack(&self, archive: &Path, dest: &Path) -> Result<UnpackReport, UploadError>;
}

/// Zip extraction.
///
/// Bundles are commonly zipped from their parent directory, so every entry
/// sits under one folder (`mygame/index.html`, `mygame/assets/...`). When all
/// entries share a single top-level folder it is stripped and its contents
/// land directly in `dest`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipUnpacker;

impl ZipUnpacker {
    pub fn new() -> Self {
        Self
    }
}

impl Unpacker for ZipUnpacker {
    fn unpack(&self, archive_path: &Path, dest: &Path) -> Result<UnpackReport, UploadError> {
        let display: String = archive_path.display().to_string();
        let file: File =
            File::open(archive_path).map_err(|e| UploadError::io(display.clone(), e))?;
        let mut archive: ZipArchive<BufReader<File>> = ZipArchive::new(BufReader::new(file))
            .map_err(|e| UploadError::InvalidArchive {
                path: display.clone(),
                message: e.to_string(),
            })?;

        if archive.is_empty() {
            return Err(UploadError::EmptyArchive { path: display });
        }

        // First pass: validate every name and find a shared top-level folder.
        let mut names: Vec<(PathBuf, bool)> = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let entry = archive.by_index(i).map_err(|e| UploadError::InvalidArchive {
                path: display.clone(),
                message: e.to_string(),
            })?;
            let name: PathBuf = entry
                .enclosed_name()
                .ok_or_else(|| UploadError::UnsafeArchiveEntry {
                    name: entry.name().to_string(),
                })?;
            names.push((name, entry.is_dir()));
        }
        let root: Option<String> = shared_root(&names);

        let mut report: UnpackReport = UnpackReport {
            stripped_root: root.clone(),
            ..UnpackReport::default()
        };

        for (i, (name, is_dir)) in names.iter().enumerate() {
            let relative: PathBuf = match &root {
                Some(root) => match name.strip_prefix(root) {
                    Ok(rest) => rest.to_path_buf(),
                    Err(_) => name.clone(),
                },
                None => name.clone(),
            };
            if relative.as_os_str().is_empty() {
                continue;
            }
            let target: PathBuf = dest.join(&relative);

            if *is_dir {
                std::fs::create_dir_all(&target)
                    .map_err(|e| UploadError::io(target.display().to_string(), e))?;
                continue;
            }

            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| UploadError::io(parent.display().to_string(), e))?;
            }
            let mut entry = archive.by_index(i).map_err(|e| UploadError::InvalidArchive {
                path: display.clone(),
                message: e.to_string(),
            })?;
            let mut out: File = File::create(&target)
                .map_err(|e| UploadError::io(target.display().to_string(), e))?;
            report.bytes += std::io::copy(&mut entry, &mut out)
                .map_err(|e| UploadError::io(target.display().to_string(), e))?;
            report.files += 1;
        }

        log::debug!(
            "Unpacked {} files ({} bytes) from {} into {}",
            report.files,
            report.bytes,
            display,
            dest.display()
        );
        Ok(report)
    }
}

/// The single top-level folder every entry lives under, if there is one.
///
/// A file at the top level, or two different top-level names, means there is
/// nothing to strip.
fn shared_root(names: &[(PathBuf, bool)]) -> Option<String> {
    let mut root: Option<&std::ffi::OsStr> = None;
    let mut has_nested: bool = false;

    for (name, is_dir) in names {
        let mut components = name.components();
        let first: &std::ffi::OsStr = match components.next() {
            Some(Component::Normal(first)) => first,
            _ => return None,
        };
        let nested: bool = components.next().is_some();
        if !nested && !is_dir {
            return None;
        }
        has_nested |= nested;
        match root {
            None => root = Some(first),
            Some(existing) if existing == first => {}
            Some(_) => return None,
        }
    }

    if !has_nested {
        return None;
    }
    root.map(|r| r.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, Option<&str>)]) {
        let file: File = File::create(path).unwrap();
        let mut zip: ZipWriter<File> = ZipWriter::new(file);
        let options: SimpleFileOptions =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, data) in entries {
            match data {
                Some(data) => {
                    zip.start_file(*name, options).unwrap();
                    zip.write_all(data.as_bytes()).unwrap();
                }
                None => zip.add_directory(*name, options).unwrap(),
            }
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_strips_single_root_folder() {
        let dir = tempfile::tempdir().unwrap();
        let archive: PathBuf = dir.path().join("a.zip");
        write_zip(
            &archive,
            &[
                ("mygame/", None),
                ("mygame/index.html", Some("<html>")),
                ("mygame/js/main.js", Some("main()")),
            ],
        );

        let dest: PathBuf = dir.path().join("out");
        let report: UnpackReport = ZipUnpacker::new().unpack(&archive, &dest).unwrap();

        assert_eq!(report.stripped_root.as_deref(), Some("mygame"));
        assert_eq!(report.files, 2);
        assert_eq!(std::fs::read(dest.join("index.html")).unwrap(), b"<html>");
        assert_eq!(std::fs::read(dest.join("js/main.js")).unwrap(), b"main()");
        assert!(!dest.join("mygame").exists());
    }

    #[test]
    fn test_strips_implicit_root_folder() {
        let dir = tempfile::tempdir().unwrap();
        let archive: PathBuf = dir.path().join("a.zip");
        write_zip(&archive, &[("g/a.txt", Some("A")), ("g/b/c.txt", Some("C"))]);

        let dest: PathBuf = dir.path().join("out");
        let report: UnpackReport = ZipUnpacker::new().unpack(&archive, &dest).unwrap();
        assert_eq!(report.stripped_root.as_deref(), Some("g"));
        assert!(dest.join("b/c.txt").exists());
    }

    #[test]
    fn test_keeps_flat_layout() {
        let dir = tempfile::tempdir().unwrap();
        let archive: PathBuf = dir.path().join("a.zip");
        write_zip(
            &archive,
            &[("index.html", Some("x")), ("assets/a.png", Some("y"))],
        );

        let dest: PathBuf = dir.path().join("out");
        let report: UnpackReport = ZipUnpacker::new().unpack(&archive, &dest).unwrap();
        assert_eq!(report.stripped_root, None);
        assert!(dest.join("index.html").exists());
        assert!(dest.join("assets/a.png").exists());
    }

    #[test]
    fn test_rejects_escaping_entry() {
        let dir = tempfile::tempdir().unwrap();
        let archive: PathBuf = dir.path().join("a.zip");
        write_zip(&archive, &[("../evil.txt", Some("x"))]);

        let result = ZipUnpacker::new().unpack(&archive, &dir.path().join("out"));
        assert!(matches!(result, Err(UploadError::UnsafeArchiveEntry { .. })));
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[test]
    fn test_rejects_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive: PathBuf = dir.path().join("a.zip");
        write_zip(&archive, &[]);

        let result = ZipUnpacker::new().unpack(&archive, &dir.path().join("out"));
        assert!(matches!(result, Err(UploadError::EmptyArchive { .. })));
    }

    #[test]
    fn test_rejects_non_zip() {
        let dir = tempfile::tempdir().unwrap();
        let archive: PathBuf = dir.path().join("a.zip");
        std::fs::write(&archive, b"not a zip").unwrap();

        let result = ZipUnpacker::new().unpack(&archive, &dir.path().join("out"));
        assert!(matches!(result, Err(UploadError::InvalidArchive { .. })));
    }
}
