//! On-disk metadata shapes and the bucket-name validation rule.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ruststack_core::{Error, Result};
use serde::{Deserialize, Serialize};

/// The full metadata document persisted as `<data_dir>/metadata.json`.
///
/// Keyed by bucket name so buckets list in a stable, sorted order without an
/// extra pass over a `Vec`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    /// All known buckets, keyed by name.
    #[serde(default)]
    pub buckets: BTreeMap<String, BucketState>,
}

/// Persisted state for a single bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BucketState {
    /// When the bucket was created.
    pub created_at: DateTime<Utc>,
    /// Objects in this bucket, keyed by object key.
    #[serde(default)]
    pub objects: BTreeMap<String, ObjectRecord>,
    /// Access keys scoped to this bucket, keyed by access-key string.
    #[serde(default)]
    pub access_keys: BTreeMap<String, AccessKey>,
}

impl BucketState {
    /// Create a freshly-initialized bucket state with no objects or access keys.
    #[must_use]
    pub fn new(created_at: DateTime<Utc>) -> Self {
        Self { created_at, objects: BTreeMap::new(), access_keys: BTreeMap::new() }
    }
}

/// A stored object's metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectRecord {
    /// Size of the payload in bytes.
    pub size: u64,
    /// Lowercase hex SHA-256 of the full payload.
    pub etag: String,
    /// When this record was last written.
    pub last_modified: DateTime<Utc>,
    /// Path to the content file, relative to the store's data directory.
    pub storage_path: String,
}

/// An access-key credential bound to exactly one bucket.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessKey {
    /// The `PX<20 uppercase hex>` access-key identifier.
    pub access_key: String,
    /// The 64-hex-char secret key.
    pub secret_key: String,
    /// The single bucket this key is scoped to.
    pub bucket: String,
    /// Whether this key may only perform read operations.
    pub read_only: bool,
}

/// Validate a bucket name per the data model: 3-63 characters, lowercase
/// alphanumerics plus `-` and `.`, no leading or trailing `-`.
///
/// # Errors
///
/// Returns [`Error::InvalidBucketName`] if the name violates any rule.
pub fn validate_bucket_name(name: &str) -> Result<()> {
    if name.len() < 3 || name.len() > 63 {
        return Err(Error::InvalidBucketName(name.to_owned()));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(Error::InvalidBucketName(name.to_owned()));
    }
    if !name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.') {
        return Err(Error::InvalidBucketName(name.to_owned()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_accept_valid_bucket_name() {
        assert!(validate_bucket_name("demo").is_ok());
        assert!(validate_bucket_name("demo-bucket.1").is_ok());
    }

    #[test]
    fn test_should_reject_short_name() {
        assert!(validate_bucket_name("ab").is_err());
    }

    #[test]
    fn test_should_reject_leading_or_trailing_hyphen() {
        assert!(validate_bucket_name("-demo").is_err());
        assert!(validate_bucket_name("demo-").is_err());
    }

    #[test]
    fn test_should_reject_uppercase_and_invalid_chars() {
        assert!(validate_bucket_name("Demo").is_err());
        assert!(validate_bucket_name("demo_bucket").is_err());
    }

    #[test]
    fn test_should_reject_name_over_63_chars() {
        let name = "a".repeat(64);
        assert!(validate_bucket_name(&name).is_err());
    }
}
