// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Consent runtime: the top-level composition of storage, state and loader.
//!
//! [`ConsentRuntime`] owns one [`ConsentStorage`], the visitor's current
//! [`ConsentState`] and one [`ScriptLoader`].  Every operation that changes
//! the state persists it first and then reconciles the loader, so the
//! document always reflects the last state that was successfully saved.
//!
//! ## Lifecycle
//!
//! 1. [`init`](ConsentRuntime::init) hydrates from storage (or falls back to
//!    `necessary` only) and runs the first reconcile.
//! 2. [`save_consents`](ConsentRuntime::save_consents) records the visitor's
//!    choice and reconciles.
//! 3. [`reset`](ConsentRuntime::reset) forgets the choice and unmounts
//!    everything the defaults no longer allow.
//!
//! `necessary` is always granted: the runtime forces it to `true` on every
//! path into the state, including records loaded from storage.

use alloc::string::String;
use alloc::vec::Vec;

use thiserror::Error;
use tracing::{debug, info};

use crate::condition::{evaluate, Condition};
use crate::descriptor::ScriptDescriptor;
use crate::dom::DomAdapter;
use crate::loader::{LoaderError, ReconcileReport, ScriptLoader};
use crate::storage::{ConsentStorage, StorageError};
use crate::types::{Category, ConsentInfo, ConsentKind, ConsentState, StoredConsent};

/// Errors returned by runtime operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// The loader rejected a descriptor or the document had no insertion point.
    #[error(transparent)]
    Loader(#[from] LoaderError),

    /// The consent record could not be persisted.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// A visitor's consent choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsentUpdate {
    /// Accept every category.
    All,
    /// Reject everything except `necessary`.
    Necessary,
    /// Category-by-category choice.  Categories missing from the map are
    /// recorded as denied.
    Custom(ConsentState),
}

impl ConsentUpdate {
    /// The [`ConsentKind`] recorded for this choice.
    pub fn kind(&self) -> ConsentKind {
        match self {
            ConsentUpdate::All => ConsentKind::All,
            ConsentUpdate::Necessary => ConsentKind::Necessary,
            ConsentUpdate::Custom(_) => ConsentKind::Custom,
        }
    }

    fn into_state(self) -> ConsentState {
        match self {
            ConsentUpdate::All => ConsentState::all_granted(),
            ConsentUpdate::Necessary => ConsentState::necessary_only(),
            ConsentUpdate::Custom(state) => normalize(&state),
        }
    }
}

/// Every category present, missing ones denied, `necessary` granted.
fn normalize(state: &ConsentState) -> ConsentState {
    let mut normalized = ConsentState::new();
    for category in Category::ALL {
        normalized.set(category, state.is_granted(category));
    }
    normalized.set(Category::Necessary, true);
    normalized
}

/// Composes consent persistence and the script loader into one API.
///
/// # Examples
///
/// ```rust
/// use c15t_consent_core::{
///     condition::Condition,
///     config::LoaderConfig,
///     descriptor::ScriptDescriptor,
///     dom::InMemoryDom,
///     loader::ScriptLoader,
///     runtime::{ConsentRuntime, ConsentUpdate},
///     storage::{ConsentStorage, InMemoryStorage},
///     types::Category,
/// };
///
/// let dom = InMemoryDom::new();
/// let loader = ScriptLoader::new(dom.clone(), LoaderConfig::default());
/// let mut runtime = ConsentRuntime::new(InMemoryStorage::new(), loader);
/// runtime.init().unwrap();
///
/// runtime
///     .set_scripts(vec![ScriptDescriptor::external(
///         "ads",
///         "https://ads.example.com/tag.js",
///         Condition::category(Category::Marketing),
///     )])
///     .unwrap();
/// assert!(!runtime.has(&Condition::category(Category::Marketing)));
///
/// runtime.save_consents(ConsentUpdate::All).unwrap();
/// assert!(dom.contains("c15t-script-ads"));
/// assert!(runtime.storage().load().is_some());
/// ```
pub struct ConsentRuntime<S: ConsentStorage, D: DomAdapter> {
    storage: S,
    loader: ScriptLoader<D>,
    consents: ConsentState,
    info: Option<ConsentInfo>,
    clock: fn() -> u64,
}

impl<S: ConsentStorage, D: DomAdapter> ConsentRuntime<S, D> {
    /// Compose a runtime.  Nothing is read or reconciled until
    /// [`init`](Self::init).
    pub fn new(storage: S, loader: ScriptLoader<D>) -> Self {
        Self {
            storage,
            loader,
            consents: ConsentState::necessary_only(),
            info: None,
            clock: current_time_ms,
        }
    }

    /// Replace the wall clock used to timestamp consent records.
    ///
    /// Hosts without `std::time` (browsers, embedded) pass their own.
    #[must_use]
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    /// Hydrate the state from storage and run the first reconcile.
    ///
    /// A missing or undecodable record leaves the defaults in place.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Loader`] when the reconcile fails.
    pub fn init(&mut self) -> Result<ReconcileReport, RuntimeError> {
        match self.storage.load() {
            Some(record) => {
                debug!(kind = ?record.info.kind, time_ms = record.info.time_ms, "hydrated stored consent");
                self.consents = normalize(&record.consents);
                self.info = Some(record.info);
            }
            None => {
                debug!("no stored consent, using defaults");
                self.consents = ConsentState::necessary_only();
                self.info = None;
            }
        }
        Ok(self.loader.reconcile(&self.consents)?)
    }

    /// Record the visitor's choice, persist it and reconcile.
    ///
    /// The state is replaced wholesale.  When the write fails the in-memory
    /// state and the document are left untouched.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Storage`] when persisting fails, or
    /// [`RuntimeError::Loader`] from the reconcile.
    pub fn save_consents(&mut self, update: ConsentUpdate) -> Result<ReconcileReport, RuntimeError> {
        let kind = update.kind();
        let record = StoredConsent {
            consents: update.into_state(),
            info: ConsentInfo { time_ms: (self.clock)(), kind },
        };
        self.storage.save(&record)?;

        let granted: Vec<Category> = record.consents.granted().collect();
        info!(?kind, ?granted, "consent saved");

        self.consents = record.consents;
        self.info = Some(record.info);
        Ok(self.loader.reconcile(&self.consents)?)
    }

    /// Forget the stored choice and return to the defaults.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Storage`] when clearing fails, or
    /// [`RuntimeError::Loader`] from the reconcile.
    pub fn reset(&mut self) -> Result<ReconcileReport, RuntimeError> {
        self.storage.clear()?;
        info!("consent reset");
        self.consents = ConsentState::necessary_only();
        self.info = None;
        Ok(self.loader.reconcile(&self.consents)?)
    }

    /// Whether `condition` holds for the current state.
    pub fn has(&self, condition: &Condition) -> bool {
        evaluate(condition, &self.consents)
    }

    /// `true` once the visitor has made a choice (saved or hydrated).
    pub fn has_consented(&self) -> bool {
        self.info.is_some()
    }

    /// Register scripts and reconcile them against the current state.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Loader`] on an invalid batch or a missing insertion point.
    pub fn set_scripts(
        &mut self,
        descriptors: Vec<ScriptDescriptor>,
    ) -> Result<ReconcileReport, RuntimeError> {
        Ok(self.loader.set_scripts(descriptors, &self.consents)?)
    }

    /// See [`ScriptLoader::remove_script`].
    pub fn remove_script(&mut self, id: &str) -> Option<ReconcileReport> {
        self.loader.remove_script(id)
    }

    /// See [`ScriptLoader::script_loaded`].
    pub fn script_loaded(&mut self, id: &str) -> bool {
        self.loader.script_loaded(id)
    }

    /// See [`ScriptLoader::script_failed`].
    pub fn script_failed(&mut self, id: &str, reason: &str) -> bool {
        self.loader.script_failed(id, reason)
    }

    /// Categories a registered script depends on, or `None` when `id` is not
    /// registered.
    pub fn script_categories(&self, id: &str) -> Option<Vec<Category>> {
        self.loader
            .descriptors()
            .find(|descriptor| descriptor.id == id)
            .map(|descriptor| descriptor.condition.categories())
    }

    /// Mounted script ids, in registry order.
    pub fn loaded_scripts(&self) -> Vec<String> {
        self.loader.mounted_ids().into_iter().map(String::from).collect()
    }

    /// The current consent state.
    pub fn consents(&self) -> &ConsentState {
        &self.consents
    }

    /// When and how the current state was chosen, if it was.
    pub fn consent_info(&self) -> Option<&ConsentInfo> {
        self.info.as_ref()
    }

    /// Borrow the storage bridge.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Borrow the loader.
    pub fn loader(&self) -> &ScriptLoader<D> {
        &self.loader
    }

    /// Mutably borrow the loader.
    pub fn loader_mut(&mut self) -> &mut ScriptLoader<D> {
        &mut self.loader
    }

    /// Decompose into storage and loader.
    pub fn into_parts(self) -> (S, ScriptLoader<D>) {
        (self.storage, self.loader)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Current time as Unix epoch milliseconds.
///
/// Under `no_std` returns 0; use [`ConsentRuntime::with_clock`] there.
fn current_time_ms() -> u64 {
    #[cfg(feature = "std")]
    {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }
    #[cfg(not(feature = "std"))]
    {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_update_fills_missing_and_forces_necessary() {
        let partial = ConsentState::new()
            .with(Category::Necessary, false)
            .with(Category::Experience, true);
        let state = ConsentUpdate::Custom(partial).into_state();
        assert_eq!(state.get(Category::Necessary), Some(true));
        assert_eq!(state.get(Category::Experience), Some(true));
        assert_eq!(state.get(Category::Marketing), Some(false));
        assert_eq!(state.iter().count(), Category::ALL.len());
    }

    #[test]
    fn update_kinds() {
        assert_eq!(ConsentUpdate::All.kind(), ConsentKind::All);
        assert_eq!(ConsentUpdate::Necessary.kind(), ConsentKind::Necessary);
        assert_eq!(ConsentUpdate::Custom(ConsentState::new()).kind(), ConsentKind::Custom);
    }
}
