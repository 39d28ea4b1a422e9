// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Shared data types used across the evaluator, loader and runtime.
//!
//! All types implement [`Clone`], [`Debug`], [`serde::Serialize`], and
//! [`serde::Deserialize`] so they can be persisted, loaded from config files,
//! and transmitted across WASM boundaries without additional conversion steps.

use alloc::collections::BTreeMap;
use alloc::string::String;
use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::condition::ConditionError;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// The closed set of consent purposes a visitor can grant or deny.
///
/// The set is fixed at compile time.  Parsing an unknown name fails with
/// [`ConditionError::UnknownCategory`] instead of defaulting to a value.
///
/// # Examples
///
/// ```rust
/// use c15t_consent_core::types::Category;
///
/// assert_eq!("marketing".parse::<Category>().unwrap(), Category::Marketing);
/// assert!("advertising".parse::<Category>().is_err());
/// assert_eq!(Category::Measurement.as_str(), "measurement");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Strictly necessary for the site to work.  The runtime always grants it.
    Necessary,
    /// Preferences and enhanced functionality.
    Functionality,
    /// Analytics and performance measurement.
    Measurement,
    /// Advertising and cross-site tracking.
    Marketing,
    /// Personalisation and experience optimisation.
    Experience,
}

impl Category {
    /// Every category, in declaration order.
    pub const ALL: [Category; 5] = [
        Category::Necessary,
        Category::Functionality,
        Category::Measurement,
        Category::Marketing,
        Category::Experience,
    ];

    /// The wire name used in consent records and condition expressions.
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Necessary     => "necessary",
            Category::Functionality => "functionality",
            Category::Measurement   => "measurement",
            Category::Marketing     => "marketing",
            Category::Experience    => "experience",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ConditionError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|category| category.as_str() == name)
            .ok_or_else(|| ConditionError::UnknownCategory(name.into()))
    }
}

// ---------------------------------------------------------------------------
// Consent state
// ---------------------------------------------------------------------------

/// Snapshot of the visitor's consent, keyed by [`Category`].
///
/// A state is replaced wholesale on every consent-setting action; the builder
/// methods consume `self` and return a new snapshot rather than mutating a
/// shared one.  A category may be absent (for example in a record persisted
/// before that category existed); the evaluator reads an absent category as
/// not granted.
///
/// # Examples
///
/// ```rust
/// use c15t_consent_core::types::{Category, ConsentState};
///
/// let state = ConsentState::necessary_only().with(Category::Marketing, true);
/// assert_eq!(state.get(Category::Marketing), Some(true));
/// assert_eq!(state.get(Category::Measurement), Some(false));
/// assert!(!ConsentState::new().is_granted(Category::Necessary));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ConsentState {
    categories: BTreeMap<Category, bool>,
}

impl ConsentState {
    /// An empty state with no categories recorded.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every category present, only [`Category::Necessary`] granted.
    pub fn necessary_only() -> Self {
        Self::from_granted([Category::Necessary])
    }

    /// Every category present and granted.
    pub fn all_granted() -> Self {
        Self::from_granted(Category::ALL)
    }

    /// Every category present; exactly those in `granted` are `true`.
    pub fn from_granted<I>(granted: I) -> Self
    where
        I: IntoIterator<Item = Category>,
    {
        let mut categories: BTreeMap<Category, bool> =
            Category::ALL.into_iter().map(|category| (category, false)).collect();
        for category in granted {
            categories.insert(category, true);
        }
        Self { categories }
    }

    /// Return a copy of this state with `category` set to `granted`.
    #[must_use]
    pub fn with(mut self, category: Category, granted: bool) -> Self {
        self.categories.insert(category, granted);
        self
    }

    /// Record `granted` for `category` in place.
    pub fn set(&mut self, category: Category, granted: bool) {
        self.categories.insert(category, granted);
    }

    /// The recorded value for `category`, or `None` when it is absent.
    pub fn get(&self, category: Category) -> Option<bool> {
        self.categories.get(&category).copied()
    }

    /// `true` only when `category` is present and granted.
    pub fn is_granted(&self, category: Category) -> bool {
        self.get(category).unwrap_or(false)
    }

    /// Categories currently granted, in declaration order.
    pub fn granted(&self) -> impl Iterator<Item = Category> + '_ {
        self.categories
            .iter()
            .filter_map(|(category, granted)| granted.then_some(*category))
    }

    /// All recorded `(category, granted)` pairs, in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (Category, bool)> + '_ {
        self.categories.iter().map(|(category, granted)| (*category, *granted))
    }
}

impl<'de> Deserialize<'de> for ConsentState {
    /// Category names this build does not know are skipped so that a record
    /// written by a newer schema still loads.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = BTreeMap::<String, bool>::deserialize(deserializer)?;
        let mut categories = BTreeMap::new();
        for (name, granted) in raw {
            match name.parse::<Category>() {
                Ok(category) => {
                    categories.insert(category, granted);
                }
                Err(_) => debug!(category = %name, "skipping unknown consent category"),
            }
        }
        Ok(Self { categories })
    }
}

// ---------------------------------------------------------------------------
// Persisted consent
// ---------------------------------------------------------------------------

/// How the visitor arrived at the current consent state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsentKind {
    /// "Accept all": every category granted.
    All,
    /// "Reject all": only necessary granted.
    Necessary,
    /// Category-by-category choice from the preferences dialog.
    Custom,
}

/// Metadata stored next to the consent map.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsentInfo {
    /// Unix epoch milliseconds at which the consent was given.
    pub time_ms: u64,
    /// The kind of choice the visitor made.
    pub kind: ConsentKind,
}

/// The record exchanged with a [`ConsentStorage`](crate::storage::ConsentStorage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConsent {
    /// The category map in force when the record was written.
    pub consents: ConsentState,
    /// When and how consent was given.
    pub info: ConsentInfo,
}

// ---------------------------------------------------------------------------
// Script placement
// ---------------------------------------------------------------------------

/// Where a script element is inserted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// `document.head`.
    #[default]
    Head,
    /// `document.body`.
    Body,
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Head => f.write_str("head"),
            Target::Body => f.write_str("body"),
        }
    }
}

/// Value of the `fetchpriority` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchPriority {
    /// `fetchpriority="high"`.
    High,
    /// `fetchpriority="low"`.
    Low,
    /// `fetchpriority="auto"`.
    Auto,
}

impl FetchPriority {
    /// The attribute value.
    pub fn as_str(self) -> &'static str {
        match self {
            FetchPriority::High => "high",
            FetchPriority::Low  => "low",
            FetchPriority::Auto => "auto",
        }
    }
}
