//! Atomic load/save of the metadata document via write-temp-then-rename.

use std::fs;
use std::path::Path;

use ruststack_core::Result;
use tracing::debug;

use crate::model::Document;

const METADATA_FILE: &str = "metadata.json";
const METADATA_TMP_FILE: &str = "metadata.json.tmp";

/// Load the metadata document from `data_dir`.
///
/// Tolerant of a missing or zero-length file; both yield an empty document,
/// matching first-boot and just-created-data-dir conditions.
///
/// # Errors
///
/// Returns an error if the file exists, is non-empty, and fails to parse, or
/// on any I/O error other than not-found.
pub fn load(data_dir: &Path) -> Result<Document> {
    let path = data_dir.join(METADATA_FILE);

    let bytes = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Document::default()),
        Err(err) => return Err(err.into()),
    };

    if bytes.is_empty() {
        return Ok(Document::default());
    }

    let document = serde_json::from_slice(&bytes).map_err(|err| anyhow::anyhow!(err))?;
    Ok(document)
}

/// Persist the metadata document to `data_dir`, atomically.
///
/// Serializes to pretty-printed JSON, writes it to `metadata.json.tmp`, then
/// renames over `metadata.json`. The caller must hold the store's write lock
/// for the duration of this call.
///
/// # Errors
///
/// Returns an error on any I/O failure.
pub fn save(data_dir: &Path, document: &Document) -> Result<()> {
    let tmp_path = data_dir.join(METADATA_TMP_FILE);
    let final_path = data_dir.join(METADATA_FILE);

    let json = serde_json::to_vec_pretty(document).map_err(|err| anyhow::anyhow!(err))?;
    fs::write(&tmp_path, &json)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600))?;
    }

    fs::rename(&tmp_path, &final_path)?;
    debug!(path = %final_path.display(), bytes = json.len(), "persisted metadata document");
    Ok(())
}

/// Ensure `data_dir` and its `objects` subdirectory exist with the
/// restrictive permissions the on-disk layout requires.
///
/// # Errors
///
/// Returns an error on any I/O failure.
pub fn ensure_data_dirs(data_dir: &Path) -> Result<()> {
    fs::create_dir_all(data_dir.join("objects"))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(data_dir, fs::Permissions::from_mode(0o750))?;
        fs::set_permissions(data_dir.join("objects"), fs::Permissions::from_mode(0o750))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BucketState;

    #[test]
    fn test_should_load_empty_document_for_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let document = load(dir.path()).unwrap();
        assert!(document.buckets.is_empty());
    }

    #[test]
    fn test_should_save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        ensure_data_dirs(dir.path()).unwrap();

        let mut document = Document::default();
        document.buckets.insert("demo".to_owned(), BucketState::new(chrono::Utc::now()));
        save(dir.path(), &document).unwrap();

        let loaded = load(dir.path()).unwrap();
        assert!(loaded.buckets.contains_key("demo"));
    }

    #[test]
    fn test_should_treat_zero_length_file_as_empty_document() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(METADATA_FILE), b"").unwrap();
        let document = load(dir.path()).unwrap();
        assert!(document.buckets.is_empty());
    }
}
