//! The single-writer object and metadata store.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::Utc;
use rand::RngCore;
use ruststack_core::{Error, NotFoundKind, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::model::{AccessKey, BucketState, ObjectRecord, validate_bucket_name};
use crate::persistence;

/// A single page of a `ListObjectsV2` listing.
#[derive(Debug, Clone)]
pub struct ListObjectsPage {
    /// The keys (and their records) in this page, lexicographically ascending.
    pub entries: Vec<(String, ObjectRecord)>,
    /// The key to resume from on the next call, if truncated.
    pub next_continuation_token: Option<String>,
    /// Whether more keys remain beyond this page.
    pub truncated: bool,
}

const DEFAULT_MAX_KEYS: usize = 1000;

/// The local object and metadata store for one node.
///
/// Owns its data directory exclusively. All metadata mutation goes through a
/// single `RwLock`; readers proceed concurrently, writers are exclusive. The
/// lock is held only for the metadata mutation and rename, never across a
/// content-file stream copy.
#[derive(Debug)]
pub struct Store {
    data_dir: PathBuf,
    inner: RwLock<crate::model::Document>,
}

impl Store {
    /// Open (or initialize) a store rooted at `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be created or the
    /// existing metadata document fails to parse.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        persistence::ensure_data_dirs(&data_dir)?;
        let document = persistence::load(&data_dir)?;
        info!(data_dir = %data_dir.display(), buckets = document.buckets.len(), "opened store");
        Ok(Self { data_dir, inner: RwLock::new(document) })
    }

    /// Create a bucket. Idempotent: re-creating an existing bucket is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidBucketName`] if `name` fails validation.
    pub fn create_bucket(&self, name: &str) -> Result<()> {
        validate_bucket_name(name)?;

        let mut guard = self.inner.write().expect("store lock poisoned");
        if guard.buckets.contains_key(name) {
            return Ok(());
        }
        guard.buckets.insert(name.to_owned(), BucketState::new(Utc::now()));
        persistence::save(&self.data_dir, &guard)?;
        debug!(bucket = name, "created bucket");
        Ok(())
    }

    /// Delete a bucket.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the bucket does not exist, or
    /// [`Error::BucketNotEmpty`] if it still contains objects.
    pub fn delete_bucket(&self, name: &str) -> Result<()> {
        let mut guard = self.inner.write().expect("store lock poisoned");
        let bucket = guard
            .buckets
            .get(name)
            .ok_or_else(|| Error::NotFound { kind: NotFoundKind::Bucket, name: name.to_owned() })?;

        if !bucket.objects.is_empty() {
            return Err(Error::BucketNotEmpty(name.to_owned()));
        }

        guard.buckets.remove(name);
        persistence::save(&self.data_dir, &guard)?;
        debug!(bucket = name, "deleted bucket");
        Ok(())
    }

    /// List all buckets, sorted by name ascending.
    #[must_use]
    pub fn list_buckets(&self) -> Vec<(String, chrono::DateTime<Utc>)> {
        let guard = self.inner.read().expect("store lock poisoned");
        guard.buckets.iter().map(|(name, state)| (name.clone(), state.created_at)).collect()
    }

    /// Write an object's content, streaming `reader` through a SHA-256
    /// hasher to a fresh content file before taking the write lock to swap
    /// the metadata record in.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the bucket does not exist,
    /// [`Error::InvalidRequest`] if `key` is empty, or an I/O error.
    pub fn put_object(&self, bucket: &str, key: &str, mut reader: impl Read) -> Result<ObjectRecord> {
        if key.is_empty() {
            return Err(Error::InvalidRequest("object key must not be empty".to_owned()));
        }
        if !self.inner.read().expect("store lock poisoned").buckets.contains_key(bucket) {
            return Err(Error::NotFound { kind: NotFoundKind::Bucket, name: bucket.to_owned() });
        }

        let bucket_dir = self.data_dir.join("objects").join(bucket);
        fs::create_dir_all(&bucket_dir)?;
        let content_id = random_hex_id(12);
        let content_path = bucket_dir.join(&content_id);
        let storage_path = format!("objects/{bucket}/{content_id}");

        let (size, etag) = match write_hashed(&content_path, &mut reader) {
            Ok(result) => result,
            Err(err) => {
                let _ = fs::remove_file(&content_path);
                return Err(err);
            }
        };

        let record = ObjectRecord {
            size,
            etag,
            last_modified: Utc::now(),
            storage_path,
        };

        let previous_path = {
            let mut guard = self.inner.write().expect("store lock poisoned");
            let state = guard
                .buckets
                .get_mut(bucket)
                .ok_or_else(|| Error::NotFound { kind: NotFoundKind::Bucket, name: bucket.to_owned() })?;
            let previous = state.objects.insert(key.to_owned(), record.clone());
            persistence::save(&self.data_dir, &guard)?;
            previous.map(|r| r.storage_path)
        };

        if let Some(previous_path) = previous_path {
            if previous_path != record.storage_path {
                let _ = fs::remove_file(self.data_dir.join(previous_path));
            }
        }

        debug!(bucket, key, size = record.size, "put object");
        Ok(record)
    }

    /// Fetch an object's metadata without opening its content.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the bucket or key does not exist.
    pub fn get_object_meta(&self, bucket: &str, key: &str) -> Result<ObjectRecord> {
        let guard = self.inner.read().expect("store lock poisoned");
        let state = guard
            .buckets
            .get(bucket)
            .ok_or_else(|| Error::NotFound { kind: NotFoundKind::Bucket, name: bucket.to_owned() })?;
        state
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound { kind: NotFoundKind::Object, name: key.to_owned() })
    }

    /// Open an object's content file for reading alongside its metadata.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the bucket or key does not exist, or an
    /// I/O error if the content file cannot be opened.
    pub fn open_object(&self, bucket: &str, key: &str) -> Result<(ObjectRecord, File)> {
        let record = self.get_object_meta(bucket, key)?;
        let file = File::open(self.data_dir.join(&record.storage_path))?;
        Ok((record, file))
    }

    /// Delete an object. Idempotent: deleting an absent key within an
    /// existing bucket succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] only if the bucket itself does not exist.
    pub fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let previous_path = {
            let mut guard = self.inner.write().expect("store lock poisoned");
            let state = guard
                .buckets
                .get_mut(bucket)
                .ok_or_else(|| Error::NotFound { kind: NotFoundKind::Bucket, name: bucket.to_owned() })?;
            let previous = state.objects.remove(key);
            if previous.is_some() {
                persistence::save(&self.data_dir, &guard)?;
            }
            previous.map(|r| r.storage_path)
        };

        if let Some(path) = previous_path {
            let _ = fs::remove_file(self.data_dir.join(path));
        }
        debug!(bucket, key, "deleted object");
        Ok(())
    }

    /// List objects in `bucket` matching `prefix`, paginated by
    /// `continuation_token` and `max_keys` (clamped to `[1, 1000]`,
    /// defaulting to 1000).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the bucket does not exist.
    pub fn list_objects_v2(
        &self,
        bucket: &str,
        prefix: &str,
        continuation_token: Option<&str>,
        max_keys: Option<usize>,
    ) -> Result<ListObjectsPage> {
        let guard = self.inner.read().expect("store lock poisoned");
        let state = guard
            .buckets
            .get(bucket)
            .ok_or_else(|| Error::NotFound { kind: NotFoundKind::Bucket, name: bucket.to_owned() })?;

        let page_size = max_keys.unwrap_or(DEFAULT_MAX_KEYS).clamp(1, DEFAULT_MAX_KEYS);

        let mut matching: Vec<(&String, &ObjectRecord)> =
            state.objects.iter().filter(|(key, _)| key.starts_with(prefix)).collect();
        matching.sort_by(|a, b| a.0.cmp(b.0));

        let start = match continuation_token {
            Some(token) if !token.is_empty() => {
                matching.partition_point(|(key, _)| key.as_str() <= token)
            }
            _ => 0,
        };

        let remaining = &matching[start..];
        let truncated = remaining.len() > page_size;
        let page = &remaining[..remaining.len().min(page_size)];

        let entries = page.iter().map(|(key, record)| ((*key).clone(), (*record).clone())).collect();
        let next_continuation_token = if truncated { page.last().map(|(key, _)| (*key).clone()) } else { None };

        Ok(ListObjectsPage { entries, next_continuation_token, truncated })
    }

    /// Generate and store a new access key scoped to `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the bucket does not exist.
    pub fn create_access(&self, bucket: &str, read_only: bool) -> Result<AccessKey> {
        let access_key = AccessKey {
            access_key: generate_access_key_id(),
            secret_key: generate_secret_key(),
            bucket: bucket.to_owned(),
            read_only,
        };
        self.put_access(access_key.clone())?;
        Ok(access_key)
    }

    /// Insert a pre-existing access key record (used by the replication
    /// handler to mirror a leader-generated key verbatim).
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the access key's bucket does not exist.
    pub fn put_access(&self, access_key: AccessKey) -> Result<()> {
        let mut guard = self.inner.write().expect("store lock poisoned");
        let state = guard
            .buckets
            .get_mut(&access_key.bucket)
            .ok_or_else(|| Error::NotFound { kind: NotFoundKind::Bucket, name: access_key.bucket.clone() })?;
        state.access_keys.insert(access_key.access_key.clone(), access_key);
        persistence::save(&self.data_dir, &guard)?;
        Ok(())
    }

    /// Delete an access key by its string identifier. Idempotent: deleting
    /// an unknown access key succeeds.
    pub fn delete_access(&self, access_key: &str) -> Result<()> {
        let mut guard = self.inner.write().expect("store lock poisoned");
        let mut found = false;
        for state in guard.buckets.values_mut() {
            if state.access_keys.remove(access_key).is_some() {
                found = true;
                break;
            }
        }
        if found {
            persistence::save(&self.data_dir, &guard)?;
        }
        Ok(())
    }

    /// Look up an access key's credential record by its string identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if no bucket holds this access key.
    pub fn lookup_access_key(&self, access_key: &str) -> Result<AccessKey> {
        let guard = self.inner.read().expect("store lock poisoned");
        guard
            .buckets
            .values()
            .find_map(|state| state.access_keys.get(access_key).cloned())
            .ok_or_else(|| Error::NotFound { kind: NotFoundKind::AccessKey, name: access_key.to_owned() })
    }
}

fn write_hashed(path: &Path, reader: &mut impl Read) -> Result<(u64, String)> {
    let mut file = File::create(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total: u64 = 0;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        file.write_all(&buf[..n])?;
        total += n as u64;
    }
    file.sync_all()?;
    Ok((total, hex::encode(hasher.finalize())))
}

fn random_hex_id(num_bytes: usize) -> String {
    let mut bytes = vec![0u8; num_bytes];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn generate_access_key_id() -> String {
    let mut bytes = [0u8; 10];
    rand::rng().fill_bytes(&mut bytes);
    format!("PX{}", hex::encode(bytes).to_uppercase())
}

fn generate_secret_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_store() -> (tempfile::TempDir, Store) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        (dir, store)
    }

    #[test]
    fn test_should_create_bucket_idempotently() {
        let (_dir, store) = open_store();
        store.create_bucket("demo").unwrap();
        store.create_bucket("demo").unwrap();
        assert_eq!(store.list_buckets().len(), 1);
    }

    #[test]
    fn test_should_reject_invalid_bucket_name() {
        let (_dir, store) = open_store();
        assert!(store.create_bucket("ab").is_err());
    }

    #[test]
    fn test_should_put_and_get_object_round_trip() {
        let (_dir, store) = open_store();
        store.create_bucket("demo").unwrap();
        let record = store.put_object("demo", "hello.txt", "hi".as_bytes()).unwrap();
        assert_eq!(record.size, 2);

        let (meta, mut file) = store.open_object("demo", "hello.txt").unwrap();
        assert_eq!(meta.etag, record.etag);
        let mut contents = String::new();
        file.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hi");
    }

    #[test]
    fn test_should_compute_etag_matching_literal_example() {
        let (_dir, store) = open_store();
        store.create_bucket("demo").unwrap();
        let record = store.put_object("demo", "hello.txt", "hi".as_bytes()).unwrap();
        assert_eq!(record.etag, hex::encode(Sha256::digest(b"hi")));
    }

    #[test]
    fn test_should_fail_delete_bucket_when_not_empty() {
        let (_dir, store) = open_store();
        store.create_bucket("demo").unwrap();
        store.put_object("demo", "k", "v".as_bytes()).unwrap();
        let err = store.delete_bucket("demo").unwrap_err();
        assert!(matches!(err, Error::BucketNotEmpty(_)));
    }

    #[test]
    fn test_should_delete_object_idempotently() {
        let (_dir, store) = open_store();
        store.create_bucket("demo").unwrap();
        store.put_object("demo", "k", "v".as_bytes()).unwrap();
        store.delete_object("demo", "k").unwrap();
        store.delete_object("demo", "k").unwrap();
    }

    #[test]
    fn test_should_paginate_list_objects_v2() {
        let (_dir, store) = open_store();
        store.create_bucket("demo").unwrap();
        for key in ["a", "b", "c"] {
            store.put_object("demo", key, key.as_bytes()).unwrap();
        }

        let page1 = store.list_objects_v2("demo", "", None, Some(2)).unwrap();
        assert_eq!(page1.entries.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(page1.truncated);
        assert_eq!(page1.next_continuation_token.as_deref(), Some("b"));

        let page2 = store
            .list_objects_v2("demo", "", page1.next_continuation_token.as_deref(), Some(2))
            .unwrap();
        assert_eq!(page2.entries.iter().map(|(k, _)| k.as_str()).collect::<Vec<_>>(), vec!["c"]);
        assert!(!page2.truncated);
    }

    #[test]
    fn test_should_generate_and_lookup_access_key() {
        let (_dir, store) = open_store();
        store.create_bucket("demo").unwrap();
        let access = store.create_access("demo", true).unwrap();
        assert!(access.access_key.starts_with("PX"));
        assert_eq!(access.secret_key.len(), 64);

        let looked_up = store.lookup_access_key(&access.access_key).unwrap();
        assert_eq!(looked_up.bucket, "demo");
        assert!(looked_up.read_only);
    }

    #[test]
    fn test_should_delete_access_key_idempotently() {
        let (_dir, store) = open_store();
        store.create_bucket("demo").unwrap();
        let access = store.create_access("demo", false).unwrap();
        store.delete_access(&access.access_key).unwrap();
        store.delete_access(&access.access_key).unwrap();
        assert!(store.lookup_access_key(&access.access_key).is_err());
    }

    #[test]
    fn test_should_reclaim_previous_content_file_on_overwrite() {
        let (dir, store) = open_store();
        store.create_bucket("demo").unwrap();
        let first = store.put_object("demo", "k", "v1".as_bytes()).unwrap();
        let second = store.put_object("demo", "k", "v2".as_bytes()).unwrap();
        assert_ne!(first.storage_path, second.storage_path);
        assert!(!dir.path().join(first.storage_path).exists());
        assert!(dir.path().join(second.storage_path).exists());
    }

    #[test]
    fn test_should_persist_metadata_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = Store::open(dir.path()).unwrap();
            store.create_bucket("demo").unwrap();
            store.put_object("demo", "k", "v".as_bytes()).unwrap();
        }
        let reopened = Store::open(dir.path()).unwrap();
        let meta = reopened.get_object_meta("demo", "k").unwrap();
        assert_eq!(meta.size, 1);
    }
}
