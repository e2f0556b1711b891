//! Source tree enumeration for packing.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use assetpack_common::{normalize_for_manifest, PathError};
use walkdir::WalkDir;

use crate::error::PackError;

/// Prefix of the temporary files the packager stages next to its outputs.
///
/// Leftovers from an interrupted pack are never ingested by a later one.
pub const TEMP_FILE_PREFIX: &str = ".assetpack-tmp";

/// A regular file discovered in the source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Absolute path to the file.
    pub path: PathBuf,
    /// Relative path for the manifest (POSIX format).
    pub relative_path: String,
    /// File size in bytes at scan time.
    pub size: u64,
}

/// Enumerate the regular files under `root` in pack order.
///
/// The walk is depth-first with directory entries sorted by file name, so
/// the same tree always produces the same order on every platform. Files
/// whose name appears in `excluded_names` are skipped at any depth, as are
/// the packager's own temporary files. Symlinks are not followed, and files
/// whose names cannot form a logical path (a backslash in a Unix file name, or a
/// name that is not UTF-8) are skipped with a warning.
///
/// # Arguments
/// * `root` - Root of the source tree
/// * `excluded_names` - File names never packed (prior manifest and blob)
///
/// # Errors
/// Returns `PackagingFailed` with the offending path if an entry cannot be read.
pub fn scan_source_tree(
    root: &Path,
    excluded_names: &HashSet<String>,
) -> Result<Vec<SourceFile>, PackError> {
    if !root.is_dir() {
        return Err(PackError::SourceNotFound {
            path: root.display().to_string(),
        });
    }

    let mut files: Vec<SourceFile> = Vec::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
    {
        let entry: walkdir::DirEntry = entry.map_err(|e| {
            let path: String = e
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| root.display().to_string());
            PackError::io(path, e.into())
        })?;

        let file_type: std::fs::FileType = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        let path: &Path = entry.path();
        if file_type.is_symlink() {
            log::warn!("Skipping symlink {}", path.display());
            continue;
        }

        let name: String = entry.file_name().to_string_lossy().into_owned();
        if excluded_names.contains(&name) || name.starts_with(TEMP_FILE_PREFIX) {
            log::debug!("Excluding {} from pack", path.display());
            continue;
        }

        let relative_path: String = match normalize_for_manifest(path, root) {
            Ok(relative_path) => relative_path,
            Err(PathError::InvalidPath { .. }) => {
                log::warn!("Skipping {}: not a valid asset path", path.display());
                continue;
            }
            Err(e) => {
                return Err(PackError::io(
                    path.display().to_string(),
                    std::io::Error::other(e),
                ))
            }
        };

        let size: u64 = entry
            .metadata()
            .map_err(|e| PackError::io(path.display().to_string(), e.into()))?
            .len();

        files.push(SourceFile {
            path: path.to_path_buf(),
            relative_path,
            size,
        });
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn names(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_scan_orders_depth_first_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let root: &Path = dir.path();
        fs::create_dir_all(root.join("b/d")).unwrap();
        fs::write(root.join("z.txt"), b"z").unwrap();
        fs::write(root.join("b/d/e.txt"), b"e").unwrap();
        fs::write(root.join("b/c.txt"), b"c").unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();

        let files: Vec<SourceFile> = scan_source_tree(root, &HashSet::new()).unwrap();
        let order: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(order, vec!["a.txt", "b/c.txt", "b/d/e.txt", "z.txt"]);
    }

    #[test]
    fn test_scan_excludes_outputs_at_any_depth() {
        let dir = tempfile::tempdir().unwrap();
        let root: &Path = dir.path();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("manifest.json"), b"{}").unwrap();
        fs::write(root.join("game.core"), b"blob").unwrap();
        fs::write(root.join("sub/game.core"), b"blob").unwrap();
        fs::write(root.join(format!("{}abc", TEMP_FILE_PREFIX)), b"tmp").unwrap();
        fs::write(root.join("index.html"), b"<html>").unwrap();

        let files: Vec<SourceFile> =
            scan_source_tree(root, &names(&["manifest.json", "game.core"])).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "index.html");
        assert_eq!(files[0].size, 6);
    }

    #[cfg(unix)]
    #[test]
    fn test_scan_skips_backslash_names() {
        let dir = tempfile::tempdir().unwrap();
        let root: &Path = dir.path();
        fs::write(root.join("ok.txt"), b"ok").unwrap();
        fs::write(root.join("a\\b.txt"), b"odd").unwrap();

        let files: Vec<SourceFile> = scan_source_tree(root, &HashSet::new()).unwrap();
        let order: Vec<&str> = files.iter().map(|f| f.relative_path.as_str()).collect();
        assert_eq!(order, vec!["ok.txt"]);
    }

    #[test]
    fn test_scan_empty_tree() {
        let dir = tempfile::tempdir().unwrap();
        let files: Vec<SourceFile> = scan_source_tree(dir.path(), &HashSet::new()).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = scan_source_tree(&dir.path().join("nope"), &HashSet::new());
        assert!(matches!(result, Err(PackError::SourceNotFound { .. })));
    }
}
