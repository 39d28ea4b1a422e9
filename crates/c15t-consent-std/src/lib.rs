// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # c15t-consent-std
//!
//! `std`-only storage backends for `c15t-consent-core`.
//!
//! This crate provides [`FileStorage`], a JSON file-backed implementation of
//! the [`ConsentStorage`](c15t_consent_core::ConsentStorage) trait suitable for
//! desktop shells, kiosks and server-side rendering hosts that keep the
//! visitor's choice on local disk.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use c15t_consent_std::storage::FileStorage;
//! use c15t_consent_core::{ConsentRuntime, InMemoryDom, LoaderConfig, ScriptLoader};
//!
//! let storage = FileStorage::open("/var/lib/c15t/consent.json")
//!     .expect("failed to open consent file");
//!
//! let loader = ScriptLoader::new(InMemoryDom::new(), LoaderConfig::default());
//! let mut runtime = ConsentRuntime::new(storage, loader);
//! runtime.init().expect("initial reconcile failed");
//! ```

pub mod storage;

pub use storage::file::FileStorage;
