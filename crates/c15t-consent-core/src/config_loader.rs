// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Configuration loader for [`ScriptLoader`](crate::loader::ScriptLoader).
//!
//! Supports two load strategies:
//!
//! 1. **TOML file**: [`load_config`] reads and deserialises a TOML file into
//!    a [`RuntimeConfig`] holding the loader settings and the script list.
//! 2. **Environment variables**: [`apply_env_overrides`] patches a
//!    [`LoaderConfig`] from `C15T_`-prefixed environment variables, and
//!    [`load_loader_config_from_env`] starts from the defaults.
//!
//! Both loaders are only available with the `config-loader` feature.
//!
//! # File format
//!
//! ```toml
//! [loader]
//! anonymize_ids = true
//! id_prefix     = "c15t-script-"
//!
//! [[scripts]]
//! id       = "gtag"
//! src      = "https://www.googletagmanager.com/gtag/js?id=G-XXXX"
//! category = "measurement"
//! async    = true
//!
//! [[scripts]]
//! id                            = "support-chat"
//! text_content                  = "window.chat = {}"
//! category                      = { or = ["functionality", "experience"] }
//! persist_after_consent_revoked = true
//! target                        = "body"
//! ```
//!
//! # Environment variables
//!
//! | Variable             | Type    | Default          |
//! |----------------------|---------|------------------|
//! | `C15T_ANONYMIZE_IDS` | boolean | false            |
//! | `C15T_ID_PREFIX`     | string  | "c15t-script-"   |

// "config-loader" implies "std", so std facilities are always available here.
#![cfg(feature = "config-loader")]

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::LoaderConfig;
use crate::descriptor::{validate_batch, DescriptorError, ScriptDescriptor, ScriptDescriptorSpec};

/// Environment variable overriding [`LoaderConfig::anonymize_ids`].
pub const ENV_ANONYMIZE_IDS: &str = "C15T_ANONYMIZE_IDS";
/// Environment variable overriding [`LoaderConfig::id_prefix`].
pub const ENV_ID_PREFIX: &str = "C15T_ID_PREFIX";

// ---------------------------------------------------------------------------
// RuntimeConfig
// ---------------------------------------------------------------------------

/// Everything a host needs to stand up a loader: its settings and the
/// scripts it manages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Loader settings; defaults when the table is absent.
    #[serde(default)]
    pub loader: LoaderConfig,

    /// Script descriptors, in registry order.
    #[serde(default)]
    pub scripts: Vec<ScriptDescriptorSpec>,
}

impl RuntimeConfig {
    /// Convert every script into a [`ScriptDescriptor`] and validate the
    /// batch.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Descriptor`] for the first invalid script.
    pub fn descriptors(&self) -> Result<Vec<ScriptDescriptor>, ConfigError> {
        let descriptors = self
            .scripts
            .iter()
            .cloned()
            .map(ScriptDescriptorSpec::into_descriptor)
            .collect::<Result<Vec<_>, _>>()?;
        validate_batch(&descriptors)?;
        Ok(descriptors)
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors that can occur while loading or parsing loader configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required file could not be opened.
    #[error("failed to read config file \"{path}\": {source}")]
    FileRead {
        /// The path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be deserialised.
    #[error("failed to parse TOML config: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// An environment variable could not be parsed to its expected type.
    #[error("{field}: cannot parse \"{value}\": {reason}")]
    ParseField {
        /// The variable name.
        field: String,
        /// The raw value.
        value: String,
        /// What was expected.
        reason: String,
    },

    /// A field parsed but its value is unusable.
    #[error("{field}: invalid value \"{value}\": {reason}")]
    InvalidValue {
        /// The field or variable name.
        field: String,
        /// The raw value.
        value: String,
        /// Why it is rejected.
        reason: String,
    },

    /// A script entry is not a valid descriptor.
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

// ---------------------------------------------------------------------------
// TOML loader
// ---------------------------------------------------------------------------

/// Load a [`RuntimeConfig`] from a TOML file.
///
/// # Errors
///
/// [`ConfigError::FileRead`] if the file cannot be read, otherwise any error
/// from [`parse_config`].
///
/// # Example
///
/// ```rust,no_run
/// use c15t_consent_core::config_loader::load_config;
///
/// let config = load_config("/etc/c15t/scripts.toml").unwrap();
/// println!("{} scripts", config.scripts.len());
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<RuntimeConfig, ConfigError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
        path: path.display().to_string(),
        source,
    })?;
    parse_config(&content)
}

/// Parse a [`RuntimeConfig`] from TOML text.
///
/// # Errors
///
/// [`ConfigError::TomlParse`] when the text does not match the schema
/// (including unknown categories and empty `and` / `or` lists), or
/// [`ConfigError::InvalidValue`] for an empty `id_prefix`.
pub fn parse_config(content: &str) -> Result<RuntimeConfig, ConfigError> {
    let config: RuntimeConfig = toml::from_str(content)?;
    check_prefix(&config.loader.id_prefix)?;
    debug!(
        scripts = config.scripts.len(),
        anonymize_ids = config.loader.anonymize_ids,
        "parsed runtime config"
    );
    Ok(config)
}

// ---------------------------------------------------------------------------
// Environment variable loader
// ---------------------------------------------------------------------------

/// Build a [`LoaderConfig`] from the defaults and `C15T_`-prefixed
/// environment variables.
///
/// # Errors
///
/// See [`apply_env_overrides`].
pub fn load_loader_config_from_env() -> Result<LoaderConfig, ConfigError> {
    let mut config = LoaderConfig::default();
    apply_env_overrides(&mut config)?;
    Ok(config)
}

/// Override fields of `config` with any `C15T_` variables that are set.
/// Unset variables leave the field alone.
///
/// # Errors
///
/// [`ConfigError::ParseField`] if `C15T_ANONYMIZE_IDS` is not a boolean,
/// [`ConfigError::InvalidValue`] if `C15T_ID_PREFIX` is empty.
pub fn apply_env_overrides(config: &mut LoaderConfig) -> Result<(), ConfigError> {
    if let Some(anonymize) = read_env_bool(ENV_ANONYMIZE_IDS)? {
        config.anonymize_ids = anonymize;
    }
    if let Ok(prefix) = std::env::var(ENV_ID_PREFIX) {
        check_prefix(&prefix)?;
        config.id_prefix = prefix;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn check_prefix(prefix: &str) -> Result<(), ConfigError> {
    if prefix.trim().is_empty() || prefix.chars().any(char::is_whitespace) {
        return Err(ConfigError::InvalidValue {
            field: "id_prefix".into(),
            value: prefix.into(),
            reason: "must be non-empty and contain no whitespace".into(),
        });
    }
    Ok(())
}

fn read_env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_ascii_lowercase().as_str() {
            "true"  | "1" | "yes" | "on"  => Ok(Some(true)),
            "false" | "0" | "no"  | "off" => Ok(Some(false)),
            other => Err(ConfigError::ParseField {
                field: key.to_owned(),
                value: other.to_owned(),
                reason: "expected one of: true/false, 1/0, yes/no, on/off".into(),
            }),
        },
        Err(_) => Ok(None),
    }
}
