// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Storage abstraction for the persisted consent record.
//!
//! The [`ConsentStorage`] trait is the single interface between the consent
//! runtime and any persistence layer (cookie, `localStorage`, a file, a
//! database row).  This crate ships [`InMemoryStorage`] for development and
//! testing.  Production implementations live in downstream crates so that this
//! core crate remains `no_std`.
//!
//! # Implementing `ConsentStorage`
//!
//! ```rust,no_run
//! use c15t_consent_core::storage::{ConsentStorage, StorageError};
//! use c15t_consent_core::types::StoredConsent;
//!
//! struct Cookie;
//!
//! impl ConsentStorage for Cookie {
//!     fn load(&self) -> Option<StoredConsent> {
//!         None // read and decode the cookie
//!     }
//!     fn save(&mut self, _record: &StoredConsent) -> Result<(), StorageError> {
//!         Ok(())
//!     }
//!     fn clear(&mut self) -> Result<(), StorageError> {
//!         Ok(())
//!     }
//! }
//! ```

use alloc::string::String;

use thiserror::Error;

use crate::types::StoredConsent;

/// Errors a [`ConsentStorage`] reports when writing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// The record could not be encoded.
    #[error("failed to encode consent record: {reason}")]
    Serialization {
        /// Encoder message.
        reason: String,
    },

    /// The backend refused the write.
    #[error("failed to write consent record: {reason}")]
    Write {
        /// Backend message.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// ConsentStorage trait
// ---------------------------------------------------------------------------

/// Pluggable persistence for the visitor's consent record.
///
/// `load` never fails: a missing, unreadable or corrupt record is reported as
/// `None` and the runtime falls back to "no consent given yet".
pub trait ConsentStorage {
    /// The stored record, if one exists and decodes.
    fn load(&self) -> Option<StoredConsent>;

    /// Persist `record`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// [`StorageError`] when the record cannot be encoded or written.
    fn save(&mut self, record: &StoredConsent) -> Result<(), StorageError>;

    /// Remove the stored record.  Clearing an empty store succeeds.
    ///
    /// # Errors
    ///
    /// [`StorageError::Write`] when the backend refuses the removal.
    fn clear(&mut self) -> Result<(), StorageError>;
}

// ---------------------------------------------------------------------------
// InMemoryStorage
// ---------------------------------------------------------------------------

/// A volatile [`ConsentStorage`] holding at most one record.
///
/// # Examples
///
/// ```rust
/// use c15t_consent_core::storage::{ConsentStorage, InMemoryStorage};
/// use c15t_consent_core::types::{ConsentInfo, ConsentKind, ConsentState, StoredConsent};
///
/// let mut store = InMemoryStorage::new();
/// assert!(store.load().is_none());
///
/// let record = StoredConsent {
///     consents: ConsentState::all_granted(),
///     info: ConsentInfo { time_ms: 0, kind: ConsentKind::All },
/// };
/// store.save(&record).unwrap();
/// assert_eq!(store.load(), Some(record));
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryStorage {
    record: Option<StoredConsent>,
}

impl InMemoryStorage {
    /// Create a new, empty [`InMemoryStorage`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `record`, as if a previous visit saved it.
    pub fn with_record(record: StoredConsent) -> Self {
        Self { record: Some(record) }
    }
}

impl ConsentStorage for InMemoryStorage {
    fn load(&self) -> Option<StoredConsent> {
        self.record.clone()
    }

    fn save(&mut self, record: &StoredConsent) -> Result<(), StorageError> {
        self.record = Some(record.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        self.record = None;
        Ok(())
    }
}

impl<T: ConsentStorage + ?Sized> ConsentStorage for &mut T {
    fn load(&self) -> Option<StoredConsent> {
        (**self).load()
    }

    fn save(&mut self, record: &StoredConsent) -> Result<(), StorageError> {
        (**self).save(record)
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        (**self).clear()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ConsentInfo, ConsentKind, ConsentState};

    #[test]
    fn save_replaces_and_clear_empties() {
        let mut store = InMemoryStorage::new();
        let first = StoredConsent {
            consents: ConsentState::all_granted(),
            info: ConsentInfo { time_ms: 1, kind: ConsentKind::All },
        };
        let second = StoredConsent {
            consents: ConsentState::necessary_only(),
            info: ConsentInfo { time_ms: 2, kind: ConsentKind::Necessary },
        };
        store.save(&first).unwrap();
        store.save(&second).unwrap();
        assert_eq!(store.load(), Some(second));

        store.clear().unwrap();
        assert_eq!(store.load(), None);
        store.clear().unwrap();
    }
}
