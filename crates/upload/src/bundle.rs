//! Post-unpack processing of an extracted bundle.
//!
//! Runs on the staging directory before it is packed:
//!
//! ```text
//! index.html <title>          -> bundle title
//! internal/ without assets/   -> every top-level dir except src/ moved under assets/
//! cover|thumbnail|icon|...    -> cover image
//! ```

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::UploadError;

/// Extensions recognised as images, in preference order.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

/// Stems tried first when looking for a cover image, in preference order.
const COVER_STEMS: &[&str] = &["cover", "thumbnail", "icon", "splash", "preview"];

static TITLE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<title>(.*?)</title>").expect("valid regex"));

/// What post-processing found in a bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BundleInfo {
    /// Trimmed `<title>` of the root `index.html`.
    pub title: Option<String>,
    /// Top-level file name of the cover image.
    pub cover_image: Option<String>,
    /// Directories moved under `assets/`.
    pub relocated: Vec<String>,
}

/// Inspect and normalize an unpacked bundle in place.
///
/// # Errors
/// Returns `Io` if the directory cannot be listed or a relocation fails.
pub fn prepare_bundle(dir: &Path) -> Result<BundleInfo, UploadError> {
    let title: Option<String> = extract_title(dir);
    let relocated: Vec<String> = relocate_internal(dir)?;
    let cover_image: Option<String> = find_cover_image(dir)?;

    if let Some(title) = &title {
        log::debug!("Bundle title: {}", title);
    }
    Ok(BundleInfo {
        title,
        cover_image,
        relocated,
    })
}

/// Title of the bundle's root `index.html`, if it has a non-empty one.
///
/// Only a `<title>` element on a single line is recognised.
pub fn extract_title(dir: &Path) -> Option<String> {
    let bytes: Vec<u8> = std::fs::read(dir.join("index.html")).ok()?;
    let html: String = String::from_utf8_lossy(&bytes).into_owned();
    let title: &str = TITLE_PATTERN.captures(&html)?.get(1)?.as_str().trim();
    (!title.is_empty()).then(|| title.to_string())
}

/// Move an `internal/`-style layout under `assets/`.
///
/// Applies only when the bundle has an `internal` directory and no `assets`
/// directory. Every top-level directory except `src` is then moved into a
/// new `assets` directory. Files at the top level stay where they are.
///
/// # Returns
/// Names of the moved directories, sorted.
pub fn relocate_internal(dir: &Path) -> Result<Vec<String>, UploadError> {
    let assets: PathBuf = dir.join("assets");
    if assets.exists() || !dir.join("internal").is_dir() {
        return Ok(Vec::new());
    }

    let mut moved: Vec<String> = top_level(dir)?
        .into_iter()
        .filter(|(name, is_dir)| *is_dir && name != "src")
        .map(|(name, _)| name)
        .collect();
    moved.sort();

    std::fs::create_dir(&assets).map_err(|e| UploadError::io(assets.display().to_string(), e))?;
    for name in &moved {
        let from: PathBuf = dir.join(name);
        std::fs::rename(&from, assets.join(name))
            .map_err(|e| UploadError::io(from.display().to_string(), e))?;
    }

    log::info!("Moved {} directories under assets/", moved.len());
    Ok(moved)
}

/// Top-level cover image of the bundle.
///
/// Known stems are tried first (`cover`, `thumbnail`, `icon`, `splash`,
/// `preview`, each with every image extension), then the first image file
/// by name. Names compare case-insensitively.
pub fn find_cover_image(dir: &Path) -> Result<Option<String>, UploadError> {
    let mut files: Vec<String> = top_level(dir)?
        .into_iter()
        .filter(|(_, is_dir)| !is_dir)
        .map(|(name, _)| name)
        .collect();
    files.sort();

    for stem in COVER_STEMS {
        for ext in IMAGE_EXTENSIONS {
            let wanted: String = format!("{}.{}", stem, ext);
            if let Some(found) = files.iter().find(|f| f.to_lowercase() == wanted) {
                return Ok(Some(found.clone()));
            }
        }
    }

    Ok(files.into_iter().find(|f| image_extension(f).is_some()))
}

/// Lowercased image extension of `name`, if it has one.
pub fn image_extension(name: &str) -> Option<String> {
    let ext: String = Path::new(name).extension()?.to_str()?.to_lowercase();
    IMAGE_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// `(name, is_dir)` for each UTF-8 named entry directly under `dir`.
fn top_level(dir: &Path) -> Result<Vec<(String, bool)>, UploadError> {
    let display = || dir.display().to_string();
    let mut entries: Vec<(String, bool)> = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| UploadError::io(display(), e))? {
        let entry: std::fs::DirEntry = entry.map_err(|e| UploadError::io(display(), e))?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let is_dir: bool = entry
            .file_type()
            .map_err(|e| UploadError::io(entry.path().display().to_string(), e))?
            .is_dir();
        entries.push((name, is_dir));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(root: &Path, files: &[&str]) {
        for path in files {
            let full: PathBuf = root.join(path);
            fs::create_dir_all(full.parent().unwrap()).unwrap();
            fs::write(full, b"x").unwrap();
        }
    }

    #[test]
    fn test_extract_title() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("index.html"),
            "<html><head><TITLE>  Space Miner </TITLE></head></html>",
        )
        .unwrap();
        assert_eq!(extract_title(dir.path()).as_deref(), Some("Space Miner"));
    }

    #[test]
    fn test_extract_title_missing_or_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(extract_title(dir.path()), None);

        fs::write(dir.path().join("index.html"), "<title>   </title>").unwrap();
        assert_eq!(extract_title(dir.path()), None);

        fs::write(dir.path().join("index.html"), "<title>\nSplit\n</title>").unwrap();
        assert_eq!(extract_title(dir.path()), None);
    }

    #[test]
    fn test_relocate_internal_moves_dirs_except_src() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            &["index.html", "internal/a.bin", "resources/b.bin", "src/main.js"],
        );

        let moved: Vec<String> = relocate_internal(dir.path()).unwrap();
        assert_eq!(moved, vec!["internal", "resources"]);
        assert!(dir.path().join("assets/internal/a.bin").is_file());
        assert!(dir.path().join("assets/resources/b.bin").is_file());
        assert!(dir.path().join("src/main.js").is_file());
        assert!(dir.path().join("index.html").is_file());
    }

    #[test]
    fn test_relocate_internal_noop_with_assets_dir() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &["internal/a.bin", "assets/b.bin"]);

        assert!(relocate_internal(dir.path()).unwrap().is_empty());
        assert!(dir.path().join("internal/a.bin").is_file());
    }

    #[test]
    fn test_find_cover_prefers_known_stems() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &["a.png", "Icon.PNG", "thumbnail.webp", "index.html"]);
        assert_eq!(
            find_cover_image(dir.path()).unwrap().as_deref(),
            Some("thumbnail.webp")
        );
    }

    #[test]
    fn test_find_cover_falls_back_to_any_image() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &["b.gif", "a.txt", "img/cover.png"]);
        assert_eq!(find_cover_image(dir.path()).unwrap().as_deref(), Some("b.gif"));

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(find_cover_image(empty.path()).unwrap(), None);
    }

    #[test]
    fn test_prepare_bundle() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), &["internal/a.bin", "cover.jpg"]);
        fs::write(dir.path().join("index.html"), "<title>Demo</title>").unwrap();

        let info: BundleInfo = prepare_bundle(dir.path()).unwrap();
        assert_eq!(info.title.as_deref(), Some("Demo"));
        assert_eq!(info.cover_image.as_deref(), Some("cover.jpg"));
        assert_eq!(info.relocated, vec!["internal"]);
    }
}
