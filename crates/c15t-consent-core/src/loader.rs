// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Script loader: the consent-driven mount / unmount state machine.
//!
//! Every registered descriptor is either **unmounted** (no element in the
//! document) or **mounted** (its element occupies its id).  [`reconcile`]
//! walks the registry in order and applies, per descriptor:
//!
//! | State     | `alwaysLoad \|\| hasConsent` | Action                                               |
//! |-----------|------------------------------|------------------------------------------------------|
//! | unmounted | true                         | `onBeforeLoad` → insert → mounted (`onLoad` inline)  |
//! | unmounted | false                        | nothing                                              |
//! | mounted   | true                         | `onConsentChange` if the state changed               |
//! | mounted   | false, persists              | `onConsentChange` if the state changed               |
//! | mounted   | false, does not persist      | `onDelete` → remove element + companions → unmounted |
//!
//! A descriptor is mounted from the moment its element is inserted, not when
//! the script finishes loading, so a reconcile that runs while the script is
//! still downloading leaves it alone.  External scripts get `onLoad` when the
//! host calls [`script_loaded`]; a notification for an element that has been
//! unmounted in the meantime is ignored.
//!
//! Hook failures and insertions the host rejects are logged, collected in the
//! [`ReconcileReport`] and never stop the walk.  Only a missing insertion
//! point ([`DomError::TargetUnavailable`]) and registration errors are
//! returned.
//!
//! Each mounted descriptor remembers the last state it was told about, so a
//! reconcile that stopped early still delivers `onConsentChange` on the next
//! one.
//!
//! [`reconcile`]: ScriptLoader::reconcile
//! [`script_loaded`]: ScriptLoader::script_loaded

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::condition::evaluate;
use crate::config::LoaderConfig;
use crate::descriptor::{
    validate_batch, DescriptorError, HookContext, HookKind, ScriptDescriptor,
};
use crate::dom::{DomAdapter, DomError, ScriptElement};
use crate::element_id::{ElementIds, TokenSource};
use crate::types::ConsentState;

/// Errors returned by loader operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoaderError {
    /// The document refused an insertion.
    #[error(transparent)]
    Dom(#[from] DomError),

    /// A descriptor failed registration checks.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// A hook that returned an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HookFailure {
    /// Descriptor the hook belongs to.
    pub descriptor_id: String,
    /// Which hook failed.
    pub hook: HookKind,
    /// The hook's error message.
    pub message: String,
}

/// What one loader operation did, in registry order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Descriptors that transitioned to mounted.
    pub mounted: Vec<String>,
    /// Descriptors that transitioned to unmounted.
    pub unmounted: Vec<String>,
    /// Mounted descriptors that received `onConsentChange`.
    pub notified: Vec<String>,
    /// Hooks that returned an error.
    pub failures: Vec<HookFailure>,
    /// Insertions the host rejected.
    pub rejected: Vec<InsertFailure>,
}

/// A mount the host refused; the descriptor stays unmounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertFailure {
    /// Descriptor that could not be mounted.
    pub descriptor_id: String,
    /// Element id the insertion used.
    pub element_id: String,
    /// The host's explanation.
    pub reason: String,
}

impl ReconcileReport {
    /// `true` when the operation changed nothing and ran no hooks.
    pub fn is_noop(&self) -> bool {
        self.mounted.is_empty() && self.unmounted.is_empty() && self.notified.is_empty()
    }

    fn absorb(&mut self, other: ReconcileReport) {
        self.mounted.extend(other.mounted);
        self.unmounted.extend(other.unmounted);
        self.notified.extend(other.notified);
        self.failures.extend(other.failures);
        self.rejected.extend(other.rejected);
    }
}

// ---------------------------------------------------------------------------
// Bookkeeping
// ---------------------------------------------------------------------------

/// Progress of a mounted external script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
    /// Inserted, waiting for the host's load event.
    Pending,
    /// Loaded (inline scripts are loaded on insertion).
    Loaded,
    /// The host reported a load error.
    Failed,
}

#[derive(Debug)]
struct Mount {
    element_id: String,
    status: LoadStatus,
    companions: Vec<String>,
    seen: ConsentState,
}

#[derive(Debug)]
struct Entry {
    descriptor: ScriptDescriptor,
    mount: Option<Mount>,
}

/// Run `kind` on `descriptor` if it is set, converting an error into a
/// logged [`HookFailure`].
fn run_hook(
    descriptor: &ScriptDescriptor,
    kind: HookKind,
    ctx: &HookContext<'_>,
) -> Option<HookFailure> {
    let hook = descriptor.hooks.get(kind)?;
    match hook(ctx) {
        Ok(()) => None,
        Err(error) => {
            warn!(script = %descriptor.id, hook = %kind, %error, "script hook failed");
            Some(HookFailure {
                descriptor_id: descriptor.id.clone(),
                hook: kind,
                message: error.0,
            })
        }
    }
}

/// `true` when both descriptors render the same `<script>` element.
fn same_element(current: &ScriptDescriptor, replacement: &ScriptDescriptor) -> bool {
    current.payload == replacement.payload
        && current.target == replacement.target
        && current.element_attributes() == replacement.element_attributes()
}

// ---------------------------------------------------------------------------
// ScriptLoader
// ---------------------------------------------------------------------------

/// Owns the script registry and the mount state of every descriptor.
///
/// All bookkeeping lives in the instance; independent loaders never observe
/// each other.
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
///     types::{Category, ConsentState},
/// };
///
/// let dom = InMemoryDom::new();
/// let mut loader = ScriptLoader::new(dom.clone(), LoaderConfig::default());
///
/// let marketing = ConsentState::necessary_only().with(Category::Marketing, true);
/// loader
///     .set_scripts(
///         vec![ScriptDescriptor::inline(
///             "pixel",
///             "window.pixel = true",
///             Condition::category(Category::Marketing),
///         )],
///         &marketing,
///     )
///     .unwrap();
/// assert!(dom.contains("c15t-script-pixel"));
///
/// let report = loader.reconcile(&ConsentState::necessary_only()).unwrap();
/// assert_eq!(report.unmounted, ["pixel"]);
/// assert!(dom.is_empty());
/// ```
pub struct ScriptLoader<D: DomAdapter> {
    config: LoaderConfig,
    dom: D,
    ids: ElementIds,
    entries: Vec<Entry>,
    last_consents: Option<ConsentState>,
}

#[cfg(feature = "std")]
impl<D: DomAdapter> ScriptLoader<D> {
    /// Create a loader that draws anonymous ids from OS entropy.
    pub fn new(dom: D, config: LoaderConfig) -> Self {
        Self::with_token_source(dom, config, Box::new(crate::element_id::RandomTokens::new()))
    }
}

impl<D: DomAdapter> ScriptLoader<D> {
    /// Create a loader with an explicit anonymous-id source.
    pub fn with_token_source(dom: D, config: LoaderConfig, tokens: Box<dyn TokenSource>) -> Self {
        let ids = ElementIds::new(config.id_prefix.clone(), tokens);
        Self {
            config,
            dom,
            ids,
            entries: Vec::new(),
            last_consents: None,
        }
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Register `descriptors` and reconcile immediately against `consents`.
    ///
    /// New ids are appended in order.  An id that is already registered has
    /// its descriptor replaced in place; its mount state is kept and the
    /// replacement's condition decides on this reconcile whether it stays.
    /// A mounted descriptor whose replacement renders a different element
    /// (payload, target or attributes) is unmounted with the old descriptor's
    /// `onDelete` and mounted again from the new one.
    ///
    /// # Errors
    ///
    /// [`LoaderError::Descriptor`] if the batch is invalid (nothing is
    /// registered), or [`LoaderError::Dom`] from the reconcile.
    pub fn set_scripts(
        &mut self,
        descriptors: Vec<ScriptDescriptor>,
        consents: &ConsentState,
    ) -> Result<ReconcileReport, LoaderError> {
        validate_batch(&descriptors)?;

        let mut report = ReconcileReport::default();
        for descriptor in descriptors {
            match self.position(&descriptor.id) {
                Some(index) => {
                    debug!(script = %descriptor.id, "replacing script descriptor");
                    if self.entries[index].mount.is_some()
                        && !same_element(&self.entries[index].descriptor, &descriptor)
                    {
                        debug!(script = %descriptor.id, "script element changed, remounting");
                        let previous = self.last_consents.clone().unwrap_or_default();
                        let has_consent =
                            evaluate(&self.entries[index].descriptor.condition, &previous);
                        self.unmount(index, &previous, has_consent, &mut report);
                    }
                    self.entries[index].descriptor = descriptor;
                }
                None => {
                    info!(script = %descriptor.id, condition = %descriptor.condition, "registering script");
                    self.entries.push(Entry { descriptor, mount: None });
                }
            }
        }

        report.absorb(self.reconcile(consents)?);
        Ok(report)
    }

    /// Unmount `id` if it is mounted and drop it from the registry.
    ///
    /// Returns `None` when `id` is not registered.
    pub fn remove_script(&mut self, id: &str) -> Option<ReconcileReport> {
        let index = self.position(id)?;
        let mut report = ReconcileReport::default();
        let consents = self.last_consents.clone().unwrap_or_default();
        let has_consent = evaluate(&self.entries[index].descriptor.condition, &consents);
        self.unmount(index, &consents, has_consent, &mut report);
        self.entries.remove(index);
        info!(script = %id, "removed script");
        Some(report)
    }

    /// Unmount every mounted descriptor, persistent ones included.  The
    /// registry itself is kept.
    pub fn unload_all(&mut self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let consents = self.last_consents.clone().unwrap_or_default();
        for index in 0..self.entries.len() {
            let has_consent = evaluate(&self.entries[index].descriptor.condition, &consents);
            self.unmount(index, &consents, has_consent, &mut report);
        }
        report
    }

    // -----------------------------------------------------------------------
    // Reconcile
    // -----------------------------------------------------------------------

    /// Bring every descriptor in line with `consents`.
    ///
    /// Calling this twice with the same state performs no DOM mutations and
    /// runs no hooks the second time.
    ///
    /// An insertion the host rejects is recorded in
    /// [`ReconcileReport::rejected`] and the walk continues; the descriptor
    /// stays unmounted and is retried by the next reconcile.
    ///
    /// # Errors
    ///
    /// [`LoaderError::Dom`] with [`DomError::TargetUnavailable`] when the
    /// document has no insertion point yet.  The walk stops at that
    /// descriptor; earlier transitions stay applied, and descriptors that
    /// were not reached are brought up to date by the next reconcile.
    pub fn reconcile(&mut self, consents: &ConsentState) -> Result<ReconcileReport, LoaderError> {
        self.last_consents = Some(consents.clone());

        let mut report = ReconcileReport::default();
        for index in 0..self.entries.len() {
            self.reconcile_entry(index, consents, &mut report)?;
        }

        debug!(
            mounted = report.mounted.len(),
            unmounted = report.unmounted.len(),
            notified = report.notified.len(),
            failures = report.failures.len(),
            rejected = report.rejected.len(),
            "reconciled scripts"
        );
        Ok(report)
    }

    fn reconcile_entry(
        &mut self,
        index: usize,
        consents: &ConsentState,
        report: &mut ReconcileReport,
    ) -> Result<(), LoaderError> {
        let entry = &self.entries[index];
        let has_consent = evaluate(&entry.descriptor.condition, consents);
        let should_load = entry.descriptor.always_load || has_consent;
        let persists = entry.descriptor.persist_after_consent_revoked;

        match (entry.mount.is_some(), should_load) {
            (false, true) => self.mount(index, consents, has_consent, report)?,
            (false, false) => {}
            (true, false) if !persists => self.unmount(index, consents, has_consent, report),
            (true, _) => self.notify(index, consents, has_consent, report),
        }
        Ok(())
    }

    fn mount(
        &mut self,
        index: usize,
        consents: &ConsentState,
        has_consent: bool,
        report: &mut ReconcileReport,
    ) -> Result<(), LoaderError> {
        let entry = &mut self.entries[index];
        let descriptor = &entry.descriptor;
        let anonymize = descriptor.anonymize_id.unwrap_or(self.config.anonymize_ids);
        let element_id = self.ids.resolve(&descriptor.id, anonymize);

        let ctx = HookContext::new(&descriptor.id, &element_id, has_consent, consents);
        report.failures.extend(run_hook(descriptor, HookKind::BeforeLoad, &ctx));
        let companions = ctx.into_companions();

        let element = ScriptElement {
            element_id: element_id.clone(),
            payload: descriptor.payload.clone(),
            target: descriptor.target,
            attributes: descriptor.element_attributes(),
        };
        if let Err(error) = self.dom.insert_script(&element) {
            for companion in &companions {
                self.dom.remove_element(companion);
            }
            return match error {
                DomError::TargetUnavailable { .. } => Err(error.into()),
                DomError::Rejected { reason, .. } => {
                    warn!(script = %descriptor.id, element = %element_id, %reason, "host rejected script");
                    report.rejected.push(InsertFailure {
                        descriptor_id: descriptor.id.clone(),
                        element_id,
                        reason,
                    });
                    Ok(())
                }
            };
        }

        let inline = descriptor.payload.is_inline();
        debug!(script = %descriptor.id, element = %element_id, inline, "mounted script");
        report.mounted.push(descriptor.id.clone());

        if inline {
            let ctx = HookContext::new(&descriptor.id, &element_id, has_consent, consents);
            report.failures.extend(run_hook(descriptor, HookKind::Load, &ctx));
        }

        entry.mount = Some(Mount {
            element_id,
            status: if inline { LoadStatus::Loaded } else { LoadStatus::Pending },
            companions,
            seen: consents.clone(),
        });
        Ok(())
    }

    fn unmount(
        &mut self,
        index: usize,
        consents: &ConsentState,
        has_consent: bool,
        report: &mut ReconcileReport,
    ) {
        let entry = &mut self.entries[index];
        let Some(mount) = entry.mount.take() else {
            return;
        };
        let descriptor = &entry.descriptor;

        let ctx = HookContext::new(&descriptor.id, &mount.element_id, has_consent, consents);
        report.failures.extend(run_hook(descriptor, HookKind::Delete, &ctx));

        if !self.dom.remove_element(&mount.element_id) {
            debug!(script = %descriptor.id, element = %mount.element_id, "script element was already gone");
        }
        for companion in &mount.companions {
            self.dom.remove_element(companion);
        }

        debug!(script = %descriptor.id, element = %mount.element_id, "unmounted script");
        report.unmounted.push(descriptor.id.clone());
    }

    fn notify(
        &mut self,
        index: usize,
        consents: &ConsentState,
        has_consent: bool,
        report: &mut ReconcileReport,
    ) {
        let entry = &mut self.entries[index];
        let Some(mount) = entry.mount.as_mut() else {
            return;
        };
        if mount.seen == *consents {
            return;
        }
        mount.seen = consents.clone();
        let descriptor = &entry.descriptor;

        let ctx = HookContext::new(&descriptor.id, &mount.element_id, has_consent, consents);
        report.failures.extend(run_hook(descriptor, HookKind::ConsentChange, &ctx));
        report.notified.push(descriptor.id.clone());
    }

    // -----------------------------------------------------------------------
    // Host notifications
    // -----------------------------------------------------------------------

    /// The host saw the `load` event for `id`'s element.
    ///
    /// Runs `onLoad` once per mount and returns `true`.  Returns `false`
    /// (and runs nothing) when `id` is not mounted or has already settled.
    pub fn script_loaded(&mut self, id: &str) -> bool {
        self.settle(id, LoadStatus::Loaded, None)
    }

    /// The host saw the `error` event for `id`'s element.
    ///
    /// Runs `onError` with `reason`; the element stays mounted.  Returns
    /// `false` when `id` is not mounted or has already settled.
    pub fn script_failed(&mut self, id: &str, reason: &str) -> bool {
        self.settle(id, LoadStatus::Failed, Some(reason))
    }

    fn settle(&mut self, id: &str, status: LoadStatus, reason: Option<&str>) -> bool {
        let Some(index) = self.position(id) else {
            warn!(script = %id, ?status, "load notification for unknown script");
            return false;
        };
        let consents = self.last_consents.clone().unwrap_or_default();
        let entry = &mut self.entries[index];
        let Some(mount) = entry.mount.as_mut() else {
            debug!(script = %id, ?status, "ignoring load notification for unmounted script");
            return false;
        };
        if mount.status != LoadStatus::Pending {
            debug!(script = %id, ?status, "ignoring repeated load notification");
            return false;
        }
        mount.status = status;

        let descriptor = &entry.descriptor;
        let has_consent = evaluate(&descriptor.condition, &consents);
        let ctx = HookContext::new(&descriptor.id, &mount.element_id, has_consent, &consents);
        let (kind, ctx) = match reason {
            Some(reason) => (HookKind::Error, ctx.with_error(reason)),
            None => (HookKind::Load, ctx),
        };
        run_hook(descriptor, kind, &ctx);
        true
    }

    /// Track `element_id` as a companion of `id`, removed when `id` unmounts.
    ///
    /// Returns `false` when `id` is not mounted.
    pub fn register_companion(&mut self, id: &str, element_id: impl Into<String>) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        match self.entries[index].mount.as_mut() {
            Some(mount) => {
                mount.companions.push(element_id.into());
                true
            }
            None => false,
        }
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// `true` when `id` is registered and mounted.
    pub fn is_mounted(&self, id: &str) -> bool {
        self.mount_of(id).is_some()
    }

    /// Mounted descriptor ids, in registry order.
    pub fn mounted_ids(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.mount.is_some())
            .map(|entry| entry.descriptor.id.as_str())
            .collect()
    }

    /// The element id `id` is mounted under.
    pub fn element_id_for(&self, id: &str) -> Option<&str> {
        self.mount_of(id).map(|mount| mount.element_id.as_str())
    }

    /// Load progress of a mounted descriptor.
    pub fn load_status(&self, id: &str) -> Option<LoadStatus> {
        self.mount_of(id).map(|mount| mount.status)
    }

    /// Registered descriptors, in registry order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ScriptDescriptor> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    /// The state passed to the most recent reconcile.
    pub fn last_consents(&self) -> Option<&ConsentState> {
        self.last_consents.as_ref()
    }

    /// The loader's configuration.
    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Borrow the DOM adapter.
    pub fn dom(&self) -> &D {
        &self.dom
    }

    /// Mutably borrow the DOM adapter.
    pub fn dom_mut(&mut self) -> &mut D {
        &mut self.dom
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.descriptor.id == id)
    }

    fn mount_of(&self, id: &str) -> Option<&Mount> {
        self.entries
            .iter()
            .find(|entry| entry.descriptor.id == id)
            .and_then(|entry| entry.mount.as_ref())
    }
}
