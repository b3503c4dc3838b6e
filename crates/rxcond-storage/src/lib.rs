//! Versioned snapshot storage for analytics artifacts.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use uuid::Uuid;

pub const CRATE_NAME: &str = "rxcond-storage";

pub const LATEST_FILE_NAME: &str = "latest.json";

#[derive(Debug, Clone)]
pub struct StoredFile {
    pub content_hash: String,
    pub absolute_path: PathBuf,
    pub byte_size: usize,
    /// True when an immutable file with identical content already existed.
    pub deduplicated: bool,
}

/// Lays out `<root>/<ReactionType>/<%Y%m%d-%H%M%S>/...` version directories plus a
/// per-type `latest.json` pointer that is atomically replaced on every publish.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    /// Directory-safe form of a reaction type label (`"C-N Coupling"` -> `"C-N_Coupling"`).
    pub fn type_dir_name(reaction_type: &str) -> String {
        let cleaned = reaction_type
            .trim()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect::<String>();
        let cleaned = cleaned.trim_matches('_');
        if cleaned.is_empty() {
            "unknown".to_string()
        } else {
            cleaned.to_string()
        }
    }

    pub fn type_dir(&self, reaction_type: &str) -> PathBuf {
        self.root.join(Self::type_dir_name(reaction_type))
    }

    pub fn version_relative_path(&self, generated_at: DateTime<Utc>, reaction_type: &str) -> PathBuf {
        let stamp = generated_at.format("%Y%m%d-%H%M%S").to_string();
        PathBuf::from(Self::type_dir_name(reaction_type)).join(stamp)
    }

    /// Creates a fresh version directory; a same-second collision gets a numeric suffix.
    pub fn create_version_dir(&self, generated_at: DateTime<Utc>, reaction_type: &str) -> Result<PathBuf> {
        let base = self.root.join(self.version_relative_path(generated_at, reaction_type));
        let parent = base
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());
        fs::create_dir_all(&parent).with_context(|| format!("creating {}", parent.display()))?;

        let mut candidate = base.clone();
        let mut attempt = 1usize;
        loop {
            match fs::create_dir(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    attempt += 1;
                    let name = format!(
                        "{}-{attempt}",
                        base.file_name().and_then(|n| n.to_str()).unwrap_or("version")
                    );
                    candidate = base.with_file_name(name);
                }
                Err(err) => {
                    return Err(err).with_context(|| format!("creating version dir {}", candidate.display()))
                }
            }
        }
    }

    /// Writes an immutable file through a temp-file rename. An existing target is never
    /// replaced; identical content reports `deduplicated`, different content is an error.
    pub fn write_immutable(&self, path: &Path, bytes: &[u8]) -> Result<StoredFile> {
        let content_hash = Self::sha256_hex(bytes);
        if path.exists() {
            let existing = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
            if Self::sha256_hex(&existing) == content_hash {
                return Ok(StoredFile {
                    content_hash,
                    absolute_path: path.to_path_buf(),
                    byte_size: bytes.len(),
                    deduplicated: true,
                });
            }
            anyhow::bail!("refusing to overwrite immutable snapshot file {}", path.display());
        }
        write_atomic(path, bytes)?;
        Ok(StoredFile {
            content_hash,
            absolute_path: path.to_path_buf(),
            byte_size: bytes.len(),
            deduplicated: false,
        })
    }

    pub fn write_json_immutable<T: Serialize>(&self, path: &Path, value: &T) -> Result<StoredFile> {
        let bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("serializing {}", path.display()))?;
        self.write_immutable(path, &bytes)
    }

    pub fn latest_path(&self, reaction_type: &str) -> PathBuf {
        self.type_dir(reaction_type).join(LATEST_FILE_NAME)
    }

    /// Replaces `latest.json` for the reaction type in one rename.
    pub fn publish_latest<T: Serialize>(&self, reaction_type: &str, value: &T) -> Result<StoredFile> {
        let path = self.latest_path(reaction_type);
        let bytes = serde_json::to_vec_pretty(value)
            .with_context(|| format!("serializing {}", path.display()))?;
        write_atomic(&path, &bytes)?;
        debug!(path = %path.display(), bytes = bytes.len(), "published latest snapshot");
        Ok(StoredFile {
            content_hash: Self::sha256_hex(&bytes),
            absolute_path: path,
            byte_size: bytes.len(),
            deduplicated: false,
        })
    }

    /// `Ok(None)` when no snapshot was ever published for the reaction type.
    pub fn read_latest<T: DeserializeOwned>(&self, reaction_type: &str) -> Result<Option<T>> {
        let path = self.latest_path(reaction_type);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let value = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(value))
    }

    /// Version directories for a reaction type, newest first.
    pub fn list_versions(&self, reaction_type: &str) -> Result<Vec<PathBuf>> {
        let dir = self.type_dir(reaction_type);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut versions = fs::read_dir(&dir)
            .with_context(|| format!("reading {}", dir.display()))?
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(error = %err, dir = %dir.display(), "skipping unreadable snapshot entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().map(|ft| ft.is_dir()).unwrap_or(false))
            .map(|entry| entry.path())
            .collect::<Vec<_>>();
        // Stamps are zero-padded, so lexical order is chronological.
        versions.sort();
        versions.reverse();
        Ok(versions)
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&parent).with_context(|| format!("creating directory {}", parent.display()))?;

    let temp_path = parent.join(format!(".{}.{}.tmp", Uuid::new_v4(), bytes.len()));
    let mut file = fs::OpenOptions::new()
        .create_new(true)
        .write(true)
        .open(&temp_path)
        .with_context(|| format!("opening temp file {}", temp_path.display()))?;
    file.write_all(bytes)
        .with_context(|| format!("writing temp file {}", temp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("flushing temp file {}", temp_path.display()))?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err).with_context(|| {
            format!(
                "atomically renaming temp file {} -> {}",
                temp_path.display(),
                path.display()
            )
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde::Deserialize;
    use tempfile::tempdir;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Marker {
        label: String,
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 24, hour, 0, 0).single().expect("ts")
    }

    #[test]
    fn content_hash_is_stable() {
        assert_eq!(
            SnapshotStore::sha256_hex(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn type_dir_names_are_path_safe() {
        assert_eq!(SnapshotStore::type_dir_name("Ullmann"), "Ullmann");
        assert_eq!(SnapshotStore::type_dir_name("C-N Coupling / Cu"), "C-N_Coupling___Cu");
        assert_eq!(SnapshotStore::type_dir_name("  "), "unknown");
    }

    #[test]
    fn immutable_files_deduplicate_and_refuse_overwrite() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let version = store.create_version_dir(at(12), "Ullmann").expect("version dir");
        let path = version.join("summary.json");

        let first = store.write_immutable(&path, b"{\"a\":1}").expect("first write");
        let second = store.write_immutable(&path, b"{\"a\":1}").expect("second write");
        assert!(!first.deduplicated);
        assert!(second.deduplicated);
        assert_eq!(first.content_hash, second.content_hash);
        assert!(store.write_immutable(&path, b"{\"a\":2}").is_err());
    }

    #[test]
    fn same_second_versions_get_distinct_directories() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        let a = store.create_version_dir(at(12), "Ullmann").expect("first");
        let b = store.create_version_dir(at(12), "Ullmann").expect("second");
        assert_ne!(a, b);
        assert!(b.ends_with("20260224-120000-2"));
    }

    #[test]
    fn latest_pointer_is_overwritten_and_versions_list_newest_first() {
        let dir = tempdir().expect("tempdir");
        let store = SnapshotStore::new(dir.path());
        assert!(store.read_latest::<Marker>("Ullmann").expect("read").is_none());

        store.create_version_dir(at(8), "Ullmann").expect("v1");
        store.create_version_dir(at(9), "Ullmann").expect("v2");
        store
            .publish_latest("Ullmann", &Marker { label: "first".into() })
            .expect("publish first");
        store
            .publish_latest("Ullmann", &Marker { label: "second".into() })
            .expect("publish second");

        let latest: Marker = store.read_latest("Ullmann").expect("read").expect("present");
        assert_eq!(latest.label, "second");

        let versions = store.list_versions("Ullmann").expect("list");
        assert_eq!(versions.len(), 2);
        assert!(versions[0].ends_with("20260224-090000"));
    }
}
