//! Blob Store
//!
//! Files owned by a table's blob fields. Records store a reference string;
//! the bytes live under `{table}/blobs/`.
//!
//! ## Reference Forms
//! ```text
//! "Data_3f2a...e1.bin"   plain file name: owned, lives in blobs/
//! "/srv/shared/a.png"    absolute: returned as-is, never deleted
//! "s3://bucket/key"      opaque: passed through untouched
//! ```
//!
//! Only plain file names (one normal path component) are owned. Anything
//! with a directory part, `..` included, is never resolved into or deleted
//! from the table directory.

use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

use uuid::Uuid;

use crate::error::{Result, TabulaError};
use crate::schema::Value;

/// Blob directory name inside a table directory
pub const BLOB_DIRNAME: &str = "blobs";

/// References gathered while normalizing the values of one write
#[derive(Debug, Clone, Default)]
pub struct BlobRefs {
    /// Every reference the normalized values hold
    pub held: HashSet<String>,
    /// Files written into the blob directory by this normalization
    pub created: HashSet<String>,
}

/// Blob directory handle for one table
#[derive(Debug, Clone)]
pub struct BlobStore {
    blob_dir: PathBuf,
}

impl BlobStore {
    pub fn new(table_dir: impl Into<PathBuf>) -> Self {
        Self {
            blob_dir: table_dir.into().join(BLOB_DIRNAME),
        }
    }

    pub fn blob_dir(&self) -> &Path {
        &self.blob_dir
    }

    pub fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.blob_dir)?;
        Ok(())
    }

    /// Turn a caller-supplied blob value into the reference stored on disk.
    ///
    /// Every resulting reference is added to `refs.held`; files written here
    /// are also added to `refs.created`.
    pub fn normalize(&self, field: &str, value: &Value, refs: &mut BlobRefs) -> Result<Value> {
        match value {
            Value::Bytes(bytes) => {
                self.ensure_dir()?;
                let file_name = format!("{}_{}.bin", field, Uuid::new_v4().simple());
                fs::write(self.blob_dir.join(&file_name), bytes)?;
                tracing::debug!(field, file = %file_name, bytes = bytes.len(), "stored blob");
                refs.created.insert(file_name.clone());
                refs.held.insert(file_name.clone());
                Ok(Value::Text(file_name))
            }
            Value::Text(text) if text.is_empty() => Ok(value.clone()),
            Value::Text(text) if self.is_stored_reference(text) => {
                refs.held.insert(text.clone());
                Ok(value.clone())
            }
            Value::Text(text) => {
                let candidate = Path::new(text);
                let candidate = if candidate.is_absolute() {
                    candidate.to_path_buf()
                } else {
                    std::env::current_dir()?.join(candidate)
                };

                if !candidate.is_file() {
                    refs.held.insert(text.clone());
                    return Ok(value.clone());
                }

                self.ensure_dir()?;
                let extension = candidate
                    .extension()
                    .map(|e| format!(".{}", e.to_string_lossy()))
                    .unwrap_or_default();
                let file_name = format!("{}_{}{}", field, Uuid::new_v4().simple(), extension);
                fs::copy(&candidate, self.blob_dir.join(&file_name))?;
                tracing::debug!(field, source = %candidate.display(), file = %file_name, "copied blob");
                refs.created.insert(file_name.clone());
                refs.held.insert(file_name.clone());
                Ok(Value::Text(file_name))
            }
            other => Err(TabulaError::BlobFieldTypeMismatch(format!(
                "field '{}' expects bytes or a path, got {}",
                field,
                other.kind()
            ))),
        }
    }

    /// Map a stored reference to a filesystem path.
    ///
    /// Plain names map into the blob directory and absolute paths map to
    /// themselves; other relative references have no path.
    pub fn resolve(&self, reference: &str) -> Option<PathBuf> {
        let path = Path::new(reference);
        if path.is_absolute() {
            return Some(path.to_path_buf());
        }
        is_plain_name(reference).then(|| self.blob_dir.join(reference))
    }

    /// Read the bytes behind a stored reference
    pub fn read(&self, reference: &str) -> Result<Vec<u8>> {
        let path = self
            .resolve(reference)
            .filter(|p| p.is_file())
            .ok_or_else(|| TabulaError::BlobNotFound(reference.to_string()))?;
        Ok(fs::read(path)?)
    }

    /// Delete files referenced in `old` but not in `keep`.
    ///
    /// Only plain names whose file sits directly in the blob directory are
    /// touched. Failures are logged and swallowed.
    pub fn cleanup(&self, old: &HashSet<String>, keep: &HashSet<String>) {
        for reference in old.difference(keep) {
            let Some(path) = self.owned_file(reference) else {
                continue;
            };
            match fs::remove_file(&path) {
                Ok(()) => tracing::debug!(file = %path.display(), "removed blob"),
                Err(e) => tracing::warn!(file = %path.display(), error = %e, "failed to remove blob"),
            }
        }
    }

    /// File names present in the blob directory, sorted
    pub fn list_files(&self) -> Result<Vec<String>> {
        if !self.blob_dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.blob_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Files in the blob directory that no reference in `referenced` names
    pub fn orphans(&self, referenced: &HashSet<String>) -> Result<Vec<String>> {
        Ok(self
            .list_files()?
            .into_iter()
            .filter(|name| !referenced.contains(name))
            .collect())
    }

    fn is_stored_reference(&self, reference: &str) -> bool {
        self.owned_file(reference).is_some()
    }

    /// Path of an existing file this store owns under `reference`
    fn owned_file(&self, reference: &str) -> Option<PathBuf> {
        if !is_plain_name(reference) {
            return None;
        }
        let path = self.blob_dir.join(reference);
        if !path.is_file() {
            return None;
        }

        // A symlinked entry may point elsewhere; require the real parent to be blobs/
        let blob_dir = fs::canonicalize(&self.blob_dir).ok()?;
        let parent = fs::canonicalize(&path).ok()?.parent()?.to_path_buf();
        (parent == blob_dir).then_some(path)
    }
}

/// A single normal path component: no separators, no `.` or `..`
fn is_plain_name(reference: &str) -> bool {
    let mut components = Path::new(reference).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}
