// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # c15t-consent-core
//!
//! Consent-condition evaluator and script-loader state machine for the c15t
//! consent runtime.
//!
//! This crate is `no_std`-compatible (requires `alloc`).  Enable the `std`
//! feature (on by default) to lift that restriction and gain access to the
//! random element-id source and the wall clock used for consent timestamps.
//!
//! ## Architecture
//!
//! ```text
//! ConsentRuntime<S: ConsentStorage, D: DomAdapter>
//!   ├── ConsentStorage      load / save / clear the persisted consent record
//!   ├── ConsentState        current category → granted snapshot
//!   └── ScriptLoader<D>     registry + mount bookkeeping per descriptor
//!         ├── evaluate()    pure AND / OR / NOT condition evaluation
//!         ├── ElementIds    `c15t-script-<id>` or memoised anonymous ids
//!         └── DomAdapter    the only boundary that touches the document
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use c15t_consent_core::{
//!     condition::Condition,
//!     descriptor::ScriptDescriptor,
//!     dom::InMemoryDom,
//!     loader::ScriptLoader,
//!     config::LoaderConfig,
//!     types::{Category, ConsentState},
//! };
//!
//! let dom = InMemoryDom::new();
//! let mut loader = ScriptLoader::new(dom.clone(), LoaderConfig::default());
//!
//! let analytics = ScriptDescriptor::external(
//!     "analytics",
//!     "https://cdn.example.com/analytics.js",
//!     Condition::category(Category::Measurement),
//! );
//!
//! let denied = ConsentState::necessary_only();
//! loader.set_scripts(vec![analytics], &denied).unwrap();
//! assert!(!loader.is_mounted("analytics"));
//!
//! let granted = denied.with(Category::Measurement, true);
//! loader.reconcile(&granted).unwrap();
//! assert!(loader.is_mounted("analytics"));
//! assert!(dom.contains("c15t-script-analytics"));
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod condition;
pub mod config;
pub mod config_loader;
pub mod descriptor;
pub mod dom;
pub mod element_id;
pub mod loader;
pub mod runtime;
pub mod storage;
pub mod types;

// Re-export the most commonly used items at the crate root so consumers can
// write `use c15t_consent_core::ScriptLoader;` instead of the fully
// qualified path.
pub use condition::{evaluate, Condition, ConditionError};
pub use config::LoaderConfig;
pub use descriptor::{HookContext, HookError, ScriptDescriptor, ScriptDescriptorSpec};
pub use dom::{DomAdapter, DomError, InMemoryDom, ScriptElement};
pub use loader::{HookFailure, InsertFailure, LoadStatus, LoaderError, ReconcileReport, ScriptLoader};
pub use runtime::{ConsentRuntime, ConsentUpdate, RuntimeError};
pub use storage::{ConsentStorage, InMemoryStorage, StorageError};
pub use types::{Category, ConsentInfo, ConsentKind, ConsentState, StoredConsent, Target};
