// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Loader-level configuration.
//!
//! [`LoaderConfig`] is the single entry point for tuning the script loader at
//! construction time.  All fields have sensible defaults so that
//! `LoaderConfig::default()` is always a valid starting point.

use alloc::string::String;

use serde::{Deserialize, Serialize};

/// Prefix of non-anonymised script element ids.
pub const DEFAULT_ID_PREFIX: &str = "c15t-script-";

/// Top-level configuration for [`ScriptLoader`](crate::loader::ScriptLoader).
///
/// # Examples
///
/// ```rust
/// use c15t_consent_core::config::LoaderConfig;
///
/// let config = LoaderConfig {
///     anonymize_ids: true,
///     ..LoaderConfig::default()
/// };
/// assert_eq!(config.id_prefix, "c15t-script-");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoaderConfig {
    /// When `true`, element ids are opaque random tokens instead of
    /// `<id_prefix><descriptor id>`.  A descriptor's own `anonymize_id`
    /// overrides this.  Defaults to `false`.
    #[serde(alias = "anonymize_ids")]
    pub anonymize_ids: bool,

    /// Prefix for non-anonymised element ids.  Defaults to `"c15t-script-"`.
    #[serde(alias = "id_prefix")]
    pub id_prefix: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            anonymize_ids: false,
            id_prefix: DEFAULT_ID_PREFIX.into(),
        }
    }
}
