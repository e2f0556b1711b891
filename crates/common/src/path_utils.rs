//! Conversions between host paths and the logical paths stored in manifests.
//!
//! A logical path is relative to the asset-space root, `/`-separated on every
//! platform and never contains empty, `.` or `..` components:
//!
//! ```text
//! /srv/build/b/c.txt  (root /srv/build)  ->  "b/c.txt"
//! "b/c.txt"           (root /srv/Games/H1) -> /srv/Games/H1/b/c.txt
//! ```

use std::path::{Component, Path, PathBuf};

use crate::error::PathError;

/// Logical manifest path of `path` inside `root`.
///
/// Both paths are compared as given, so pass `path` as produced by walking
/// `root` (i.e. prefixed by it).
///
/// # Errors
/// Returns `PathOutsideRoot` if `path` is not below `root`, and `InvalidPath`
/// if a component is not valid UTF-8 or would resolve outside the root.
pub fn normalize_for_manifest(path: &Path, root: &Path) -> Result<String, PathError> {
    let relative: &Path = path
        .strip_prefix(root)
        .map_err(|_| PathError::PathOutsideRoot {
            path: path.display().to_string(),
            root: root.display().to_string(),
        })?;

    let mut parts: Vec<&str> = Vec::new();
    for component in relative.components() {
        match component {
            Component::Normal(name) => match name.to_str() {
                Some(name) => parts.push(name),
                None => {
                    return Err(PathError::InvalidPath {
                        path: path.display().to_string(),
                    })
                }
            },
            Component::CurDir => {}
            _ => {
                return Err(PathError::InvalidPath {
                    path: path.display().to_string(),
                })
            }
        }
    }

    let logical: String = parts.join("/");
    validate_logical_path(&logical)?;
    Ok(logical)
}

/// Host path of a logical manifest path under `destination_root`.
///
/// Empty components are skipped. Callers serving untrusted paths validate
/// them with [`validate_logical_path`] first.
pub fn from_posix_path(manifest_path: &str, destination_root: &Path) -> PathBuf {
    let mut result: PathBuf = destination_root.to_path_buf();
    for component in manifest_path.split('/') {
        if !component.is_empty() {
            result.push(component);
        }
    }
    result
}

/// Validate that `value` is usable as a single file-system path component.
///
/// Upload ids and uploaded file names end up as directory and file names in
/// the staging area, so separators, `.`/`..`, NUL bytes and empty strings
/// are rejected.
///
/// # Errors
/// Returns `PathError::InvalidComponent` for anything that is not a plain name.
pub fn validate_component(value: &str) -> Result<(), PathError> {
    let invalid: bool = value.is_empty()
        || value == "."
        || value == ".."
        || value.contains(['/', '\\', '\0'])
        || value.trim() != value;

    if invalid {
        return Err(PathError::InvalidComponent {
            value: value.to_string(),
        });
    }
    Ok(())
}

/// Validate a logical manifest path.
///
/// # Errors
/// Returns `PathError::InvalidPath` when the path could escape its root.
pub fn validate_logical_path(path: &str) -> Result<(), PathError> {
    let invalid: bool = path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path
            .split('/')
            .any(|c: &str| c.is_empty() || c == "." || c == "..");

    if invalid {
        return Err(PathError::InvalidPath {
            path: path.to_string(),
        });
    }
    Ok(())
}
