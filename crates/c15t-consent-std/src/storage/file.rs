// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! File-based JSON consent storage.
//!
//! [`FileStorage`] persists the visitor's consent record to a single JSON
//! file on disk.  Every save flushes the file atomically (write-rename) so
//! that a crash mid-write never corrupts the previous record.
//!
//! ## Layout
//!
//! The JSON file has the shape:
//!
//! ```json
//! {
//!   "consents": { "necessary": true, "marketing": false, ... },
//!   "info":     { "time_ms": 1760000000000, "kind": "custom" }
//! }
//! ```
//!
//! ## Caveats
//!
//! * A file that exists but does not decode is treated as "no consent given"
//!   and overwritten by the next save.
//! * Concurrent access from multiple processes is not supported.

use std::io;
use std::path::{Path, PathBuf};

use c15t_consent_core::storage::{ConsentStorage, StorageError};
use c15t_consent_core::types::StoredConsent;
use tracing::{debug, warn};

/// A file-backed [`ConsentStorage`] that persists the record as JSON.
///
/// The record is read once on [`open`](Self::open) and cached; saves write
/// through to disk before updating the cache.
///
/// # Examples
///
/// ```rust,no_run
/// use c15t_consent_std::storage::file::FileStorage;
/// use c15t_consent_core::storage::ConsentStorage;
/// use c15t_consent_core::types::{ConsentInfo, ConsentKind, ConsentState, StoredConsent};
///
/// let mut storage = FileStorage::open("/tmp/consent.json")
///     .expect("could not open storage");
///
/// storage
///     .save(&StoredConsent {
///         consents: ConsentState::all_granted(),
///         info: ConsentInfo { time_ms: 0, kind: ConsentKind::All },
///     })
///     .expect("could not save");
/// assert!(storage.load().is_some());
/// ```
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    record: Option<StoredConsent>,
}

impl FileStorage {
    /// Open the consent file at `path`.  A missing file yields an empty
    /// store; nothing is created until the first save.
    ///
    /// # Errors
    ///
    /// Returns an [`io::Error`] if the file exists but cannot be read.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let record = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<StoredConsent>(&raw) {
                Ok(record) => Some(record),
                Err(error) => {
                    warn!(path = %path.display(), %error, "ignoring undecodable consent file");
                    None
                }
            },
            Err(error) if error.kind() == io::ErrorKind::NotFound => None,
            Err(error) => return Err(error),
        };
        debug!(path = %path.display(), found = record.is_some(), "opened consent file");
        Ok(Self { path, record })
    }

    /// The file this store writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `record` using an atomic write-rename.
    ///
    /// The file is written to `<path>.tmp` first, then renamed over the
    /// target, so a crash during the write never leaves a partial file.
    fn write(&self, record: &StoredConsent) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(record).map_err(|error| {
            StorageError::Serialization { reason: error.to_string() }
        })?;

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, json)
            .and_then(|()| std::fs::rename(&tmp_path, &self.path))
            .map_err(|error| StorageError::Write {
                reason: format!("{}: {}", self.path.display(), error),
            })
    }
}

impl ConsentStorage for FileStorage {
    fn load(&self) -> Option<StoredConsent> {
        self.record.clone()
    }

    fn save(&mut self, record: &StoredConsent) -> Result<(), StorageError> {
        self.write(record)?;
        self.record = Some(record.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                return Err(StorageError::Write {
                    reason: format!("{}: {}", self.path.display(), error),
                })
            }
        }
        self.record = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use c15t_consent_core::types::{Category, ConsentInfo, ConsentKind, ConsentState};
    use tempfile::TempDir;

    fn scratch() -> (TempDir, PathBuf) {
        let dir = TempDir::new().expect("create temp dir");
        let path = dir.path().join("consent.json");
        (dir, path)
    }

    fn record() -> StoredConsent {
        StoredConsent {
            consents: ConsentState::necessary_only().with(Category::Measurement, true),
            info: ConsentInfo { time_ms: 1_760_000_000_000, kind: ConsentKind::Custom },
        }
    }

    #[test]
    fn missing_file_is_empty() {
        let (_dir, path) = scratch();
        let storage = FileStorage::open(&path).unwrap();
        assert!(storage.load().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn save_survives_reopen() {
        let (_dir, path) = scratch();
        let mut storage = FileStorage::open(&path).unwrap();
        storage.save(&record()).unwrap();
        assert!(!path.with_extension("tmp").exists());

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(reopened.load(), Some(record()));
    }

    #[test]
    fn corrupt_file_reads_as_empty() {
        let (_dir, path) = scratch();
        std::fs::write(&path, "{ not json").unwrap();
        let mut storage = FileStorage::open(&path).unwrap();
        assert!(storage.load().is_none());

        storage.save(&record()).unwrap();
        assert_eq!(FileStorage::open(&path).unwrap().load(), Some(record()));
    }

    #[test]
    fn clear_removes_the_file() {
        let (_dir, path) = scratch();
        let mut storage = FileStorage::open(&path).unwrap();
        storage.save(&record()).unwrap();
        storage.clear().unwrap();
        assert!(!path.exists());
        assert!(storage.load().is_none());
        storage.clear().unwrap();
    }

    #[test]
    fn write_into_missing_directory_fails() {
        let (dir, _) = scratch();
        let path = dir.path().join("absent").join("consent.json");
        let mut storage = FileStorage::open(&path).unwrap();
        assert!(matches!(storage.save(&record()), Err(StorageError::Write { .. })));
        assert!(storage.load().is_none());
    }
}
