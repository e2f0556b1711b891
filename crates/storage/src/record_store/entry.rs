//! Cache record key and entry types.

/// Key of one cached asset.
///
/// The manifest version is part of the key, so a repacked asset space misses
/// on every path even while records of the previous version still exist.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Asset space the record belongs to.
    pub asset_space: String,
    /// Logical path inside the asset space.
    pub path: String,
    /// Manifest version the bytes were read under.
    pub version: u64,
}

impl CacheKey {
    /// Create a new cache key.
    ///
    /// # Arguments
    /// * `asset_space` - Asset space id
    /// * `path` - Logical path from the manifest
    /// * `version` - Manifest version
    pub fn new(asset_space: impl Into<String>, path: impl Into<String>, version: u64) -> Self {
        Self {
            asset_space: asset_space.into(),
            path: path.into(),
            version,
        }
    }

    /// Record id shared by every version of this path: `"<asset_space>:<path>"`.
    pub fn record_id(&self) -> String {
        format!("{}:{}", self.asset_space, self.path)
    }
}

/// Cached asset bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheRecord {
    /// The asset contents.
    pub data: Vec<u8>,
    /// Manifest version the bytes belong to.
    pub version: u64,
    /// When this record was written (epoch seconds).
    pub created_at: i64,
}

impl CacheRecord {
    /// Create a new record.
    pub fn new(data: Vec<u8>, version: u64, created_at: i64) -> Self {
        Self {
            data,
            version,
            created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id() {
        let key: CacheKey = CacheKey::new("H000001", "js/main.js", 7);
        assert_eq!(key.record_id(), "H000001:js/main.js");
    }

    #[test]
    fn test_key_equality_includes_version() {
        let v1: CacheKey = CacheKey::new("g", "a", 1);
        let v2: CacheKey = CacheKey::new("g", "a", 2);
        assert_ne!(v1, v2);
        assert_eq!(v1.record_id(), v2.record_id());
    }
}
