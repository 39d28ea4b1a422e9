// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! DOM abstraction for the script loader.
//!
//! The [`DomAdapter`] trait is the single interface between the loader's state
//! machine and whatever owns the document.  The loader never touches browser
//! APIs itself; the WASM bindings implement the trait over a JavaScript host
//! object, and this crate ships [`InMemoryDom`] for tests and headless use.
//!
//! # Implementing `DomAdapter`
//!
//! ```rust,no_run
//! use c15t_consent_core::dom::{DomAdapter, DomError, ScriptElement};
//!
//! struct Logged;
//!
//! impl DomAdapter for Logged {
//!     fn insert_script(&mut self, element: &ScriptElement) -> Result<(), DomError> {
//!         println!("insert #{} into {}", element.element_id, element.target);
//!         Ok(())
//!     }
//!     fn remove_element(&mut self, element_id: &str) -> bool {
//!         println!("remove #{element_id}");
//!         true
//!     }
//! }
//! ```

use alloc::boxed::Box;
use alloc::rc::Rc;
use alloc::string::String;
use alloc::vec::Vec;
use core::cell::RefCell;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::descriptor::ScriptPayload;
use crate::types::Target;

/// Errors a [`DomAdapter`] reports when inserting an element.
///
/// `TargetUnavailable` means the loader ran before the document existed and
/// is returned from `reconcile`.  `Rejected` concerns a single script and is
/// collected in the reconcile report while the other scripts proceed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomError {
    /// The insertion point does not exist yet.
    #[error("cannot insert script #{element_id}: document {target} is not available")]
    TargetUnavailable {
        /// The requested insertion point.
        target: Target,
        /// The element that could not be inserted.
        element_id: String,
    },

    /// The host refused the element for another reason.
    #[error("host rejected script #{element_id}: {reason}")]
    Rejected {
        /// The element that could not be inserted.
        element_id: String,
        /// Host-provided explanation.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// ScriptElement
// ---------------------------------------------------------------------------

/// A fully resolved `<script>` element, ready for insertion.
///
/// Serialises to the flat shape JavaScript hosts expect:
///
/// ```json
/// { "elementId": "c15t-script-gtag", "src": "https://…", "target": "head",
///   "attributes": [["async", ""]] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptElement {
    /// The element's `id` attribute.
    pub element_id: String,
    /// `src` or inline body.
    #[serde(flatten)]
    pub payload: ScriptPayload,
    /// Insertion point.
    pub target: Target,
    /// Attributes in application order.
    pub attributes: Vec<(String, String)>,
}

// ---------------------------------------------------------------------------
// DomAdapter trait
// ---------------------------------------------------------------------------

/// The document operations the loader needs.
pub trait DomAdapter {
    /// Insert `element` at `element.target`.
    ///
    /// # Errors
    ///
    /// [`DomError::TargetUnavailable`] when the insertion point does not exist,
    /// [`DomError::Rejected`] for any other host failure.
    fn insert_script(&mut self, element: &ScriptElement) -> Result<(), DomError>;

    /// Remove the element with `element_id`, wherever it is.
    ///
    /// Returns `false` when no such element exists.
    fn remove_element(&mut self, element_id: &str) -> bool;
}

impl<T: DomAdapter + ?Sized> DomAdapter for &mut T {
    fn insert_script(&mut self, element: &ScriptElement) -> Result<(), DomError> {
        (**self).insert_script(element)
    }

    fn remove_element(&mut self, element_id: &str) -> bool {
        (**self).remove_element(element_id)
    }
}

impl<T: DomAdapter + ?Sized> DomAdapter for Box<T> {
    fn insert_script(&mut self, element: &ScriptElement) -> Result<(), DomError> {
        (**self).insert_script(element)
    }

    fn remove_element(&mut self, element_id: &str) -> bool {
        (**self).remove_element(element_id)
    }
}

// ---------------------------------------------------------------------------
// InMemoryDom
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct Document {
    ready: bool,
    head: Vec<ScriptElement>,
    body: Vec<ScriptElement>,
    mutations: usize,
}

impl Document {
    fn section_mut(&mut self, target: Target) -> &mut Vec<ScriptElement> {
        match target {
            Target::Head => &mut self.head,
            Target::Body => &mut self.body,
        }
    }

    fn find(&self, element_id: &str) -> Option<&ScriptElement> {
        self.head
            .iter()
            .chain(self.body.iter())
            .find(|element| element.element_id == element_id)
    }
}

/// A shared, in-process document with a `head` and a `body`.
///
/// Cloning an [`InMemoryDom`] yields another handle to the same document, so a
/// test can hand one clone to the loader, keep one for assertions, and move a
/// third into a hook that inserts companion elements.
///
/// # Examples
///
/// ```rust
/// use c15t_consent_core::dom::{DomAdapter, DomError, InMemoryDom, ScriptElement};
/// use c15t_consent_core::descriptor::ScriptPayload;
/// use c15t_consent_core::types::Target;
///
/// let element = ScriptElement {
///     element_id: "c15t-script-demo".into(),
///     payload: ScriptPayload::Inline("void 0".into()),
///     target: Target::Body,
///     attributes: vec![],
/// };
///
/// let mut dom = InMemoryDom::new();
/// dom.insert_script(&element).unwrap();
/// assert!(dom.contains("c15t-script-demo"));
///
/// let mut detached = InMemoryDom::detached();
/// assert!(matches!(
///     detached.insert_script(&element),
///     Err(DomError::TargetUnavailable { .. })
/// ));
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryDom {
    document: Rc<RefCell<Document>>,
}

impl InMemoryDom {
    /// A document whose `head` and `body` exist.
    pub fn new() -> Self {
        Self {
            document: Rc::new(RefCell::new(Document { ready: true, ..Document::default() })),
        }
    }

    /// A document that has not been parsed yet: every insertion fails.
    pub fn detached() -> Self {
        Self { document: Rc::new(RefCell::new(Document::default())) }
    }

    /// Make `head` and `body` available.
    pub fn attach(&self) {
        self.document.borrow_mut().ready = true;
    }

    /// `true` when an element with `element_id` exists.
    pub fn contains(&self, element_id: &str) -> bool {
        self.document.borrow().find(element_id).is_some()
    }

    /// A copy of the element with `element_id`, if present.
    pub fn element(&self, element_id: &str) -> Option<ScriptElement> {
        self.document.borrow().find(element_id).cloned()
    }

    /// Element ids in `target`, in insertion order.
    pub fn ids_in(&self, target: Target) -> Vec<String> {
        let mut document = self.document.borrow_mut();
        document
            .section_mut(target)
            .iter()
            .map(|element| element.element_id.clone())
            .collect()
    }

    /// Total number of elements in the document.
    pub fn len(&self) -> usize {
        let document = self.document.borrow();
        document.head.len() + document.body.len()
    }

    /// `true` when the document holds no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of successful insertions and removals so far.
    pub fn mutations(&self) -> usize {
        self.document.borrow().mutations
    }
}

impl Default for InMemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl DomAdapter for InMemoryDom {
    fn insert_script(&mut self, element: &ScriptElement) -> Result<(), DomError> {
        let mut document = self.document.borrow_mut();
        if !document.ready {
            return Err(DomError::TargetUnavailable {
                target: element.target,
                element_id: element.element_id.clone(),
            });
        }
        if document.find(&element.element_id).is_some() {
            return Err(DomError::Rejected {
                element_id: element.element_id.clone(),
                reason: "an element with this id already exists".into(),
            });
        }
        document.section_mut(element.target).push(element.clone());
        document.mutations += 1;
        Ok(())
    }

    fn remove_element(&mut self, element_id: &str) -> bool {
        let mut document = self.document.borrow_mut();
        let before = document.head.len() + document.body.len();
        document.head.retain(|element| element.element_id != element_id);
        document.body.retain(|element| element.element_id != element_id);
        let removed = document.head.len() + document.body.len() < before;
        if removed {
            document.mutations += 1;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(id: &str, target: Target) -> ScriptElement {
        ScriptElement {
            element_id: id.into(),
            payload: ScriptPayload::Src("https://cdn.example.com/x.js".into()),
            target,
            attributes: Vec::new(),
        }
    }

    #[test]
    fn clones_share_one_document() {
        let observer = InMemoryDom::new();
        let mut writer = observer.clone();
        writer.insert_script(&element("a", Target::Head)).unwrap();
        writer.insert_script(&element("b", Target::Body)).unwrap();
        assert_eq!(observer.ids_in(Target::Head), ["a"]);
        assert_eq!(observer.ids_in(Target::Body), ["b"]);
        assert_eq!(observer.mutations(), 2);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut dom = InMemoryDom::new();
        dom.insert_script(&element("a", Target::Head)).unwrap();
        assert!(matches!(
            dom.insert_script(&element("a", Target::Body)),
            Err(DomError::Rejected { .. })
        ));
    }

    #[test]
    fn removing_a_missing_element_is_not_a_mutation() {
        let mut dom = InMemoryDom::new();
        assert!(!dom.remove_element("ghost"));
        assert_eq!(dom.mutations(), 0);
    }

    #[test]
    fn attach_enables_insertion() {
        let mut dom = InMemoryDom::detached();
        assert!(dom.insert_script(&element("a", Target::Head)).is_err());
        dom.attach();
        assert!(dom.insert_script(&element("a", Target::Head)).is_ok());
    }

    #[test]
    fn element_serialises_flat() {
        let json = serde_json::to_value(element("c15t-script-x", Target::Head)).unwrap();
        assert_eq!(json["elementId"], "c15t-script-x");
        assert_eq!(json["src"], "https://cdn.example.com/x.js");
        assert_eq!(json["target"], "head");
    }
}
