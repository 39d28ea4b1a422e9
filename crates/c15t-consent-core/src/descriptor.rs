// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Script descriptors: what to load, when, and which hooks to run.
//!
//! [`ScriptDescriptor`] is the typed, in-process form handed to the
//! [`ScriptLoader`](crate::loader::ScriptLoader).  Its payload is either an
//! external `src` or an inline body, never both.
//!
//! [`ScriptDescriptorSpec`] is the serialisable, hook-less form read from
//! config files and JSON (the `src` / `textContent` pair is validated when it
//! is converted).

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::condition::Condition;
use crate::types::{ConsentState, FetchPriority, Target};

/// Errors raised when a descriptor is registered with the loader.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DescriptorError {
    /// The descriptor id is empty.
    #[error("script descriptor id must not be empty")]
    EmptyId,

    /// Both `src` and `textContent` were supplied.
    #[error("script \"{id}\" declares both `src` and `textContent`")]
    ConflictingPayload {
        /// The offending descriptor.
        id: String,
    },

    /// Neither `src` nor `textContent` was supplied.
    #[error("script \"{id}\" declares neither `src` nor `textContent`")]
    MissingPayload {
        /// The offending descriptor.
        id: String,
    },

    /// The `src` URL or inline body is empty.
    #[error("script \"{id}\" has an empty payload")]
    EmptyPayload {
        /// The offending descriptor.
        id: String,
    },

    /// The same id appears twice in one registration batch.
    #[error("script id \"{id}\" is registered more than once")]
    DuplicateId {
        /// The repeated id.
        id: String,
    },
}

// ---------------------------------------------------------------------------
// Hooks
// ---------------------------------------------------------------------------

/// Failure reported by a lifecycle hook.
///
/// The loader logs it, records it in the
/// [`ReconcileReport`](crate::loader::ReconcileReport) and carries on with the
/// remaining descriptors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct HookError(pub String);

impl HookError {
    /// Build a hook error from any displayable message.
    pub fn new(message: impl fmt::Display) -> Self {
        Self(message.to_string())
    }
}

/// Everything a lifecycle hook is told about the transition.
pub struct HookContext<'a> {
    /// The descriptor the hook belongs to.
    pub descriptor_id: &'a str,
    /// The DOM id of the script element (possibly anonymised).
    pub element_id: &'a str,
    /// Whether the descriptor's condition holds for `consents`.
    pub has_consent: bool,
    /// The consent snapshot that triggered the hook.
    pub consents: &'a ConsentState,
    /// The failure reason, set only for `onError`.
    pub error: Option<&'a str>,
    companions: RefCell<Vec<String>>,
}

impl<'a> HookContext<'a> {
    pub(crate) fn new(
        descriptor_id: &'a str,
        element_id: &'a str,
        has_consent: bool,
        consents: &'a ConsentState,
    ) -> Self {
        Self {
            descriptor_id,
            element_id,
            has_consent,
            consents,
            error: None,
            companions: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn with_error(mut self, error: &'a str) -> Self {
        self.error = Some(error);
        self
    }

    /// Record an auxiliary element created by this hook (typically an init
    /// script inserted by `onBeforeLoad`).  The loader removes it together
    /// with the script element on unmount.
    pub fn register_companion(&self, element_id: impl Into<String>) {
        self.companions.borrow_mut().push(element_id.into());
    }

    pub(crate) fn into_companions(self) -> Vec<String> {
        self.companions.into_inner()
    }
}

/// A lifecycle callback.
///
/// Hooks run synchronously on the loader's thread; the loader is
/// single-threaded, so hooks are reference-counted rather than `Send`.
pub type Hook = Rc<dyn Fn(&HookContext<'_>) -> Result<(), HookError>>;

/// The lifecycle callbacks attached to one descriptor.
#[derive(Clone, Default)]
pub struct ScriptHooks {
    /// Runs before the element is inserted.
    pub on_before_load: Option<Hook>,
    /// Runs once the script has loaded (immediately for inline scripts).
    pub on_load: Option<Hook>,
    /// Runs on every consent change while the element stays mounted.
    pub on_consent_change: Option<Hook>,
    /// Runs before the element is removed.
    pub on_delete: Option<Hook>,
    /// Runs when the host reports that the script failed to load.
    pub on_error: Option<Hook>,
}

impl fmt::Debug for ScriptHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptHooks")
            .field("on_before_load", &self.on_before_load.is_some())
            .field("on_load", &self.on_load.is_some())
            .field("on_consent_change", &self.on_consent_change.is_some())
            .field("on_delete", &self.on_delete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish()
    }
}

/// Identifies a hook in logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HookKind {
    /// `onBeforeLoad`
    #[serde(rename = "onBeforeLoad")]
    BeforeLoad,
    /// `onLoad`
    #[serde(rename = "onLoad")]
    Load,
    /// `onConsentChange`
    #[serde(rename = "onConsentChange")]
    ConsentChange,
    /// `onDelete`
    #[serde(rename = "onDelete")]
    Delete,
    /// `onError`
    #[serde(rename = "onError")]
    Error,
}

impl HookKind {
    /// The callback name as hosts spell it.
    pub fn as_str(self) -> &'static str {
        match self {
            HookKind::BeforeLoad    => "onBeforeLoad",
            HookKind::Load          => "onLoad",
            HookKind::ConsentChange => "onConsentChange",
            HookKind::Delete        => "onDelete",
            HookKind::Error         => "onError",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ScriptHooks {
    pub(crate) fn get(&self, kind: HookKind) -> Option<&Hook> {
        match kind {
            HookKind::BeforeLoad    => self.on_before_load.as_ref(),
            HookKind::Load          => self.on_load.as_ref(),
            HookKind::ConsentChange => self.on_consent_change.as_ref(),
            HookKind::Delete        => self.on_delete.as_ref(),
            HookKind::Error         => self.on_error.as_ref(),
        }
    }
}

// ---------------------------------------------------------------------------
// ScriptDescriptor
// ---------------------------------------------------------------------------

/// What a script element carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptPayload {
    /// External script URL.
    #[serde(rename = "src")]
    Src(String),
    /// Inline script body.
    #[serde(rename = "textContent")]
    Inline(String),
}

impl ScriptPayload {
    /// `true` for inline bodies, which have no load event.
    pub fn is_inline(&self) -> bool {
        matches!(self, ScriptPayload::Inline(_))
    }
}

/// One third-party script integration.
///
/// # Examples
///
/// ```rust
/// use c15t_consent_core::condition::Condition;
/// use c15t_consent_core::descriptor::ScriptDescriptor;
/// use c15t_consent_core::types::{Category, Target};
///
/// let pixel = ScriptDescriptor::external(
///     "meta-pixel",
///     "https://connect.facebook.net/en_US/fbevents.js",
///     Condition::category(Category::Marketing),
/// )
/// .target(Target::Body)
/// .attribute("data-source", "c15t")
/// .on_load(|ctx| {
///     assert!(ctx.has_consent);
///     Ok(())
/// });
///
/// assert_eq!(pixel.id, "meta-pixel");
/// assert!(pixel.hooks.on_load.is_some());
/// ```
#[derive(Debug, Clone)]
pub struct ScriptDescriptor {
    /// Unique id within one loader; keys the mount bookkeeping.
    pub id: String,
    /// Gate evaluated on every reconcile.
    pub condition: Condition,
    /// External URL or inline body.
    pub payload: ScriptPayload,
    /// Mount regardless of the condition (the script gates itself).
    pub always_load: bool,
    /// Never unmount once mounted (the script has its own opt-out).
    pub persist_after_consent_revoked: bool,
    /// Insertion point.
    pub target: Target,
    /// `async` attribute.
    pub is_async: bool,
    /// `defer` attribute.
    pub defer: bool,
    /// `nonce` attribute for CSP.
    pub nonce: Option<String>,
    /// `fetchpriority` attribute.
    pub fetch_priority: Option<FetchPriority>,
    /// Per-script override of [`LoaderConfig::anonymize_ids`](crate::config::LoaderConfig).
    pub anonymize_id: Option<bool>,
    /// Extra attributes applied verbatim, in order.
    pub attributes: Vec<(String, String)>,
    /// Lifecycle callbacks.
    pub hooks: ScriptHooks,
}

impl ScriptDescriptor {
    fn with_payload(id: impl Into<String>, payload: ScriptPayload, condition: Condition) -> Self {
        Self {
            id: id.into(),
            condition,
            payload,
            always_load: false,
            persist_after_consent_revoked: false,
            target: Target::Head,
            is_async: false,
            defer: false,
            nonce: None,
            fetch_priority: None,
            anonymize_id: None,
            attributes: Vec::new(),
            hooks: ScriptHooks::default(),
        }
    }

    /// A script loaded from `src`.
    pub fn external(id: impl Into<String>, src: impl Into<String>, condition: Condition) -> Self {
        Self::with_payload(id, ScriptPayload::Src(src.into()), condition)
    }

    /// A script whose body is inserted inline.
    pub fn inline(id: impl Into<String>, body: impl Into<String>, condition: Condition) -> Self {
        Self::with_payload(id, ScriptPayload::Inline(body.into()), condition)
    }

    /// Set [`always_load`](Self::always_load).
    #[must_use]
    pub fn always_load(mut self, always_load: bool) -> Self {
        self.always_load = always_load;
        self
    }

    /// Set [`persist_after_consent_revoked`](Self::persist_after_consent_revoked).
    #[must_use]
    pub fn persist_after_consent_revoked(mut self, persist: bool) -> Self {
        self.persist_after_consent_revoked = persist;
        self
    }

    /// Set the insertion [`Target`].
    #[must_use]
    pub fn target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }

    /// Set the `async` attribute.
    #[must_use]
    pub fn is_async(mut self, is_async: bool) -> Self {
        self.is_async = is_async;
        self
    }

    /// Set the `defer` attribute.
    #[must_use]
    pub fn defer(mut self, defer: bool) -> Self {
        self.defer = defer;
        self
    }

    /// Set the CSP `nonce`.
    #[must_use]
    pub fn nonce(mut self, nonce: impl Into<String>) -> Self {
        self.nonce = Some(nonce.into());
        self
    }

    /// Set the `fetchpriority` attribute.
    #[must_use]
    pub fn fetch_priority(mut self, priority: FetchPriority) -> Self {
        self.fetch_priority = Some(priority);
        self
    }

    /// Override the loader-wide anonymisation setting for this script.
    #[must_use]
    pub fn anonymize_id(mut self, anonymize: bool) -> Self {
        self.anonymize_id = Some(anonymize);
        self
    }

    /// Append an attribute applied verbatim.
    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Attach `onBeforeLoad`.
    #[must_use]
    pub fn on_before_load<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> Result<(), HookError> + 'static,
    {
        self.hooks.on_before_load = Some(Rc::new(hook));
        self
    }

    /// Attach `onLoad`.
    #[must_use]
    pub fn on_load<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> Result<(), HookError> + 'static,
    {
        self.hooks.on_load = Some(Rc::new(hook));
        self
    }

    /// Attach `onConsentChange`.
    #[must_use]
    pub fn on_consent_change<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> Result<(), HookError> + 'static,
    {
        self.hooks.on_consent_change = Some(Rc::new(hook));
        self
    }

    /// Attach `onDelete`.
    #[must_use]
    pub fn on_delete<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> Result<(), HookError> + 'static,
    {
        self.hooks.on_delete = Some(Rc::new(hook));
        self
    }

    /// Attach `onError`.
    #[must_use]
    pub fn on_error<F>(mut self, hook: F) -> Self
    where
        F: Fn(&HookContext<'_>) -> Result<(), HookError> + 'static,
    {
        self.hooks.on_error = Some(Rc::new(hook));
        self
    }

    /// Check the invariants the loader relies on.
    ///
    /// # Errors
    ///
    /// [`DescriptorError::EmptyId`] or [`DescriptorError::EmptyPayload`].
    pub fn validate(&self) -> Result<(), DescriptorError> {
        if self.id.trim().is_empty() {
            return Err(DescriptorError::EmptyId);
        }
        let body = match &self.payload {
            ScriptPayload::Src(src) => src,
            ScriptPayload::Inline(body) => body,
        };
        if body.trim().is_empty() {
            return Err(DescriptorError::EmptyPayload { id: self.id.clone() });
        }
        Ok(())
    }

    /// The attribute list written onto the element: the typed flags first,
    /// then [`attributes`](Self::attributes) verbatim.
    pub fn element_attributes(&self) -> Vec<(String, String)> {
        let mut attributes = Vec::with_capacity(self.attributes.len() + 4);
        if self.is_async {
            attributes.push(("async".into(), String::new()));
        }
        if self.defer {
            attributes.push(("defer".into(), String::new()));
        }
        if let Some(nonce) = &self.nonce {
            attributes.push(("nonce".into(), nonce.clone()));
        }
        if let Some(priority) = self.fetch_priority {
            attributes.push(("fetchpriority".into(), priority.as_str().into()));
        }
        attributes.extend(self.attributes.iter().cloned());
        attributes
    }
}

/// Validate a registration batch: every descriptor on its own, and no id
/// twice.
///
/// # Errors
///
/// The first [`DescriptorError`] found, in batch order.
pub fn validate_batch(descriptors: &[ScriptDescriptor]) -> Result<(), DescriptorError> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(descriptors.len());
    for descriptor in descriptors {
        descriptor.validate()?;
        if !seen.insert(descriptor.id.as_str()) {
            return Err(DescriptorError::DuplicateId { id: descriptor.id.clone() });
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ScriptDescriptorSpec
// ---------------------------------------------------------------------------

/// Serialisable descriptor without hooks.
///
/// Accepts the camelCase field names JavaScript hosts use as well as
/// snake_case aliases for TOML config files.
///
/// ```rust
/// use c15t_consent_core::descriptor::{DescriptorError, ScriptDescriptorSpec};
///
/// let spec: ScriptDescriptorSpec = serde_json::from_str(r#"{
///     "id": "gtm",
///     "src": "https://www.googletagmanager.com/gtm.js?id=GTM-XXXX",
///     "category": "measurement",
///     "alwaysLoad": true
/// }"#).unwrap();
/// let descriptor = spec.into_descriptor().unwrap();
/// assert!(descriptor.always_load);
///
/// let both: ScriptDescriptorSpec = serde_json::from_str(r#"{
///     "id": "broken",
///     "src": "https://example.com/a.js",
///     "textContent": "console.log(1)",
///     "category": "marketing"
/// }"#).unwrap();
/// assert_eq!(
///     both.into_descriptor().unwrap_err(),
///     DescriptorError::ConflictingPayload { id: "broken".into() },
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptDescriptorSpec {
    /// See [`ScriptDescriptor::id`].
    pub id: String,
    /// External URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src: Option<String>,
    /// Inline body.
    #[serde(default, alias = "text_content", skip_serializing_if = "Option::is_none")]
    pub text_content: Option<String>,
    /// Gate; spelled `category` by hosts, `condition` accepted as an alias.
    #[serde(alias = "condition")]
    pub category: Condition,
    /// See [`ScriptDescriptor::always_load`].
    #[serde(default, alias = "always_load")]
    pub always_load: bool,
    /// See [`ScriptDescriptor::persist_after_consent_revoked`].
    #[serde(default, alias = "persist_after_consent_revoked")]
    pub persist_after_consent_revoked: bool,
    /// See [`ScriptDescriptor::target`].
    #[serde(default)]
    pub target: Target,
    /// `async` attribute.
    #[serde(default, rename = "async")]
    pub is_async: bool,
    /// `defer` attribute.
    #[serde(default)]
    pub defer: bool,
    /// `nonce` attribute.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    /// `fetchpriority` attribute.
    #[serde(default, alias = "fetch_priority", skip_serializing_if = "Option::is_none")]
    pub fetch_priority: Option<FetchPriority>,
    /// Anonymisation override.
    #[serde(default, alias = "anonymize_id", skip_serializing_if = "Option::is_none")]
    pub anonymize_id: Option<bool>,
    /// Extra attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ScriptDescriptorSpec {
    /// Convert into a hook-less [`ScriptDescriptor`].
    ///
    /// # Errors
    ///
    /// [`DescriptorError::ConflictingPayload`] when both `src` and
    /// `textContent` are set, [`DescriptorError::MissingPayload`] when neither
    /// is, and any error from [`ScriptDescriptor::validate`].
    pub fn into_descriptor(self) -> Result<ScriptDescriptor, DescriptorError> {
        let payload = match (self.src, self.text_content) {
            (Some(src), None) => ScriptPayload::Src(src),
            (None, Some(body)) => ScriptPayload::Inline(body),
            (Some(_), Some(_)) => return Err(DescriptorError::ConflictingPayload { id: self.id }),
            (None, None) => return Err(DescriptorError::MissingPayload { id: self.id }),
        };

        let descriptor = ScriptDescriptor {
            id: self.id,
            condition: self.category,
            payload,
            always_load: self.always_load,
            persist_after_consent_revoked: self.persist_after_consent_revoked,
            target: self.target,
            is_async: self.is_async,
            defer: self.defer,
            nonce: self.nonce,
            fetch_priority: self.fetch_priority,
            anonymize_id: self.anonymize_id,
            attributes: self.attributes.into_iter().collect(),
            hooks: ScriptHooks::default(),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category;

    fn marketing() -> Condition {
        Condition::category(Category::Marketing)
    }

    #[test]
    fn batch_rejects_duplicates_and_empty_ids() {
        let a = ScriptDescriptor::external("a", "https://a.example/a.js", marketing());
        assert_eq!(
            validate_batch(&[a.clone(), a.clone()]),
            Err(DescriptorError::DuplicateId { id: "a".into() })
        );

        let unnamed = ScriptDescriptor::inline("  ", "void 0", marketing());
        assert_eq!(validate_batch(&[unnamed]), Err(DescriptorError::EmptyId));

        let hollow = ScriptDescriptor::external("b", "", marketing());
        assert_eq!(
            validate_batch(&[a, hollow]),
            Err(DescriptorError::EmptyPayload { id: "b".into() })
        );
    }

    #[test]
    fn spec_without_payload_is_rejected() {
        let spec: ScriptDescriptorSpec =
            serde_json::from_str(r#"{"id":"x","category":"marketing"}"#).unwrap();
        assert_eq!(
            spec.into_descriptor().unwrap_err(),
            DescriptorError::MissingPayload { id: "x".into() }
        );
    }

    #[test]
    fn spec_accepts_snake_case_aliases() {
        let spec: ScriptDescriptorSpec = serde_json::from_str(
            r#"{
                "id": "chat",
                "text_content": "window.chat = {}",
                "condition": {"or": ["functionality", "experience"]},
                "persist_after_consent_revoked": true,
                "target": "body",
                "async": true,
                "attributes": {"data-widget": "chat"}
            }"#,
        )
        .unwrap();
        let descriptor = spec.into_descriptor().unwrap();
        assert!(descriptor.payload.is_inline());
        assert!(descriptor.persist_after_consent_revoked);
        assert_eq!(descriptor.target, Target::Body);
        assert_eq!(
            descriptor.element_attributes(),
            [
                ("async".to_string(), String::new()),
                ("data-widget".to_string(), "chat".to_string()),
            ]
        );
    }

    #[test]
    fn typed_attributes_precede_custom_ones() {
        let descriptor = ScriptDescriptor::external("a", "https://a.example/a.js", marketing())
            .attribute("crossorigin", "anonymous")
            .defer(true)
            .nonce("abc")
            .fetch_priority(FetchPriority::Low);
        let names: Vec<_> = descriptor
            .element_attributes()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, ["defer", "nonce", "fetchpriority", "crossorigin"]);
    }
}
