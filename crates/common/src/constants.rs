//! Shared constants used across assetpack crates.

/// Canonical file name of a published manifest.
pub const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Canonical file name of a published packed blob.
pub const BLOB_FILE_NAME: &str = "game.core";

/// Blob names written by earlier packager generations.
/// Never ingested by a repack.
pub const LEGACY_BLOB_FILE_NAMES: &[&str] = &["game.pkg", "game.dat"];

/// Default size of one upload chunk (5MB).
pub const DEFAULT_UPLOAD_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default idle time after which an upload session is considered abandoned (24h).
pub const DEFAULT_SESSION_TTL_SECS: u64 = 24 * 60 * 60;

/// URL prefix under which published asset spaces are served.
pub const PUBLIC_BASE_PREFIX: &str = "/Games";
