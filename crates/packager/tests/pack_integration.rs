//! Integration tests for packing and publishing asset spaces.
//!
//! Covers the properties every published pair must satisfy:
//! - round-trip: each entry's blob range equals the source file
//! - sum invariant: blob length equals the sum of entry sizes
//! - self-exclusion on repack
//! - publish through the store

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use assetpack_model::{Manifest, ManifestIndex};
use assetpack_packager::{AssetSpaceStore, PackOptions, PackOutput, Packager};

/// Write a tree of files and return their contents keyed by relative path.
fn write_tree(root: &Path, files: &[(&str, Vec<u8>)]) -> HashMap<String, Vec<u8>> {
    let mut expected: HashMap<String, Vec<u8>> = HashMap::new();
    for (path, data) in files {
        let full: PathBuf = root.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(&full, data).unwrap();
        expected.insert(path.to_string(), data.clone());
    }
    expected
}

fn mixed_tree() -> Vec<(&'static str, Vec<u8>)> {
    vec![
        ("index.html", b"<!doctype html><title>x</title>".to_vec()),
        ("assets/main.js", b"console.log('hi')".to_vec()),
        ("assets/style.css", b"body{margin:0}".to_vec()),
        ("assets/img/logo.png", (0..=255u8).cycle().take(4096).collect()),
        ("assets/empty.txt", Vec::new()),
        ("data/levels/1.json", b"{\"level\":1}".to_vec()),
    ]
}

#[test]
fn test_round_trip_and_sum_invariant() {
    let dir = tempfile::tempdir().unwrap();
    let expected: HashMap<String, Vec<u8>> = write_tree(dir.path(), &mixed_tree());

    let packager: Packager = Packager::new(PackOptions::new("H000002"));
    let output: PackOutput = packager.pack(dir.path(), None).unwrap();
    let blob: Vec<u8> = fs::read(&output.blob_path).unwrap();

    assert_eq!(output.manifest.file_count(), expected.len());
    assert_eq!(blob.len() as u64, output.manifest.total_size());

    for entry in &output.manifest.entries {
        let end: usize = entry.end().unwrap() as usize;
        assert!(end <= blob.len());
        assert_eq!(
            &blob[entry.offset as usize..end],
            expected[&entry.path].as_slice(),
            "mismatch for {}",
            entry.path
        );
    }

    // The published pair must index cleanly against the real blob length.
    let index: ManifestIndex =
        ManifestIndex::build(output.manifest.clone(), Some(blob.len() as u64)).unwrap();
    assert!(index.get("assets/img/logo.png").is_some());
}

#[test]
fn test_entries_follow_sorted_depth_first_order() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), &mixed_tree());

    let output: PackOutput = Packager::new(PackOptions::new("g"))
        .pack(dir.path(), None)
        .unwrap();
    let paths: Vec<&str> = output
        .manifest
        .entries
        .iter()
        .map(|e| e.path.as_str())
        .collect();

    assert_eq!(
        paths,
        vec![
            "assets/empty.txt",
            "assets/img/logo.png",
            "assets/main.js",
            "assets/style.css",
            "data/levels/1.json",
            "index.html",
        ]
    );
}

#[test]
fn test_repack_excludes_prior_pair_and_legacy_blobs() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(
        dir.path(),
        &[
            ("a.txt", b"AB".to_vec()),
            ("game.pkg", b"legacy".to_vec()),
            ("nested/game.dat", b"legacy".to_vec()),
        ],
    );

    let packager: Packager = Packager::new(PackOptions::new("g"));
    let first: PackOutput = packager.pack(dir.path(), None).unwrap();
    fs::write(dir.path().join("b.txt"), b"CD").unwrap();
    let second: PackOutput = packager.pack(dir.path(), None).unwrap();

    let paths: Vec<&str> = second
        .manifest
        .entries
        .iter()
        .map(|e| e.path.as_str())
        .collect();
    assert_eq!(paths, vec!["a.txt", "b.txt"]);
    assert_eq!(fs::read(&second.blob_path).unwrap(), b"ABCD");
    assert!(second.manifest.version > first.manifest.version);
}

#[test]
fn test_version_ignores_manifest_of_other_asset_space() {
    let dir = tempfile::tempdir().unwrap();
    write_tree(dir.path(), &[("a.txt", b"A".to_vec())]);

    let far_future: Manifest = Manifest {
        asset_space_id: "other".to_string(),
        version: u64::MAX - 1,
        entries: Vec::new(),
    };
    fs::write(
        dir.path().join("manifest.json"),
        far_future.encode().unwrap(),
    )
    .unwrap();

    let output: PackOutput = Packager::new(PackOptions::new("g"))
        .pack(dir.path(), None)
        .unwrap();
    assert!(output.manifest.version < u64::MAX - 1);
    assert_eq!(output.manifest.asset_space_id, "g");
}

#[test]
fn test_version_bumps_past_future_stamp_of_same_space() {
    let dir = tempfile::tempdir().unwrap();
    let future: Manifest = Manifest {
        asset_space_id: "g".to_string(),
        version: u64::MAX / 2,
        entries: Vec::new(),
    };
    fs::write(dir.path().join("manifest.json"), future.encode().unwrap()).unwrap();

    let output: PackOutput = Packager::new(PackOptions::new("g"))
        .pack(dir.path(), None)
        .unwrap();
    assert_eq!(output.manifest.version, u64::MAX / 2 + 1);
}

#[test]
fn test_pack_staging_then_publish() {
    let root = tempfile::tempdir().unwrap();
    let store: AssetSpaceStore = AssetSpaceStore::new(root.path());
    let packager: Packager = Packager::new(PackOptions::new("H000003"));

    let staging = store.create_staging().unwrap();
    write_tree(staging.path(), &[("index.html", b"v1".to_vec())]);
    packager.pack(staging.path(), None).unwrap();
    let published: PathBuf = store.publish("H000003", staging.path()).unwrap();

    let manifest: Manifest =
        Manifest::decode(&fs::read(published.join("manifest.json")).unwrap()).unwrap();
    assert_eq!(manifest.asset_space_id, "H000003");
    assert_eq!(fs::read(published.join("game.core")).unwrap(), b"v1");
}
