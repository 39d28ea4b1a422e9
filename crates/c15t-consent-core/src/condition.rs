// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Consent conditions and their evaluation.
//!
//! A [`Condition`] is an immutable tree: a single [`Category`] leaf, or an
//! `and` / `or` / `not` combinator over nested conditions.  The tree is built
//! once by the smart constructors (or by deserialisation, which goes through
//! them) and never mutated afterwards.
//!
//! [`evaluate`] is a pure function of `(condition, consents)`:
//!
//! * leaf: the recorded value; an absent category is **not granted**
//! * `and`: stops at the first child that evaluates to `false`
//! * `or` : stops at the first child that evaluates to `true`
//! * `not`: negation of its single child
//!
//! Empty `and` / `or` lists are rejected at construction time with
//! [`ConditionError::EmptyClauses`], so evaluation never has to pick a
//! convention for them.
//!
//! ## Wire format
//!
//! ```json
//! "marketing"
//! { "and": ["marketing", { "not": "measurement" }] }
//! { "or":  ["functionality", "experience"] }
//! ```

use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use serde::de::{self, IgnoredAny, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::types::{Category, ConsentState};

/// Errors raised while building or parsing a [`Condition`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// A leaf names a category outside the closed [`Category`] set.
    #[error("unknown consent category \"{0}\"")]
    UnknownCategory(String),

    /// An `and` / `or` combinator was given no children.
    #[error("`{operator}` condition requires at least one child")]
    EmptyClauses {
        /// `"and"` or `"or"`.
        operator: &'static str,
    },
}

// ---------------------------------------------------------------------------
// Condition tree
// ---------------------------------------------------------------------------

/// A non-empty, ordered list of child conditions.
///
/// Only constructible through [`Clauses::new`], which rejects an empty list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clauses(Vec<Condition>);

impl Clauses {
    /// Wrap `children`, rejecting an empty list on behalf of `operator`.
    fn new(operator: &'static str, children: Vec<Condition>) -> Result<Self, ConditionError> {
        if children.is_empty() {
            return Err(ConditionError::EmptyClauses { operator });
        }
        Ok(Self(children))
    }

    /// The children in declaration order.
    pub fn iter(&self) -> core::slice::Iter<'_, Condition> {
        self.0.iter()
    }

    /// Number of children (always at least one).
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always `false`; present for API symmetry with slices.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> IntoIterator for &'a Clauses {
    type Item = &'a Condition;
    type IntoIter = core::slice::Iter<'a, Condition>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A boolean expression over consent categories.
///
/// # Examples
///
/// ```rust
/// use c15t_consent_core::condition::{evaluate, Condition};
/// use c15t_consent_core::types::{Category, ConsentState};
///
/// let condition = Condition::all_of(vec![
///     Category::Marketing.into(),
///     Condition::negate(Category::Measurement.into()),
/// ])
/// .unwrap();
///
/// let state = ConsentState::necessary_only().with(Category::Marketing, true);
/// assert!(evaluate(&condition, &state));
/// assert!(!evaluate(&condition, &state.with(Category::Measurement, true)));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Condition {
    /// Granted iff the category is recorded as granted.
    Category(Category),
    /// Granted iff every child is granted.
    And(Clauses),
    /// Granted iff at least one child is granted.
    Or(Clauses),
    /// Granted iff the child is not granted.
    Not(Box<Condition>),
}

impl Condition {
    /// A single-category leaf.
    pub fn category(category: Category) -> Self {
        Condition::Category(category)
    }

    /// Conjunction of `children`.
    ///
    /// # Errors
    ///
    /// [`ConditionError::EmptyClauses`] when `children` is empty.
    pub fn all_of(children: Vec<Condition>) -> Result<Self, ConditionError> {
        Clauses::new("and", children).map(Condition::And)
    }

    /// Disjunction of `children`.
    ///
    /// # Errors
    ///
    /// [`ConditionError::EmptyClauses`] when `children` is empty.
    pub fn any_of(children: Vec<Condition>) -> Result<Self, ConditionError> {
        Clauses::new("or", children).map(Condition::Or)
    }

    /// Negation of `inner`.
    pub fn negate(inner: Condition) -> Self {
        Condition::Not(Box::new(inner))
    }

    /// Categories referenced anywhere in the tree, deduplicated, in
    /// first-seen order.
    ///
    /// ```rust
    /// use c15t_consent_core::condition::Condition;
    /// use c15t_consent_core::types::Category;
    ///
    /// let condition = Condition::any_of(vec![
    ///     Category::Marketing.into(),
    ///     Condition::negate(Category::Marketing.into()),
    ///     Category::Experience.into(),
    /// ])
    /// .unwrap();
    /// assert_eq!(condition.categories(), [Category::Marketing, Category::Experience]);
    /// ```
    pub fn categories(&self) -> Vec<Category> {
        let mut seen = Vec::new();
        self.collect_categories(&mut seen);
        seen
    }

    fn collect_categories(&self, seen: &mut Vec<Category>) {
        match self {
            Condition::Category(category) => {
                if !seen.contains(category) {
                    seen.push(*category);
                }
            }
            Condition::And(clauses) | Condition::Or(clauses) => {
                for child in clauses {
                    child.collect_categories(seen);
                }
            }
            Condition::Not(inner) => inner.collect_categories(seen),
        }
    }
}

impl From<Category> for Condition {
    fn from(category: Category) -> Self {
        Condition::Category(category)
    }
}

impl fmt::Display for Condition {
    /// Infix rendering for logs: `marketing & (!measurement | experience)`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, clauses: &Clauses, op: &str) -> fmt::Result {
            if clauses.len() > 1 {
                f.write_str("(")?;
            }
            for (position, child) in clauses.iter().enumerate() {
                if position > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{child}")?;
            }
            if clauses.len() > 1 {
                f.write_str(")")?;
            }
            Ok(())
        }

        match self {
            Condition::Category(category) => write!(f, "{category}"),
            Condition::And(clauses) => join(f, clauses, "&"),
            Condition::Or(clauses) => join(f, clauses, "|"),
            Condition::Not(inner) => write!(f, "!{inner}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

/// Read access to a consent snapshot.
///
/// Implemented by [`ConsentState`]; other implementations let hosts evaluate
/// against their own representation without copying it.
pub trait ConsentLookup {
    /// The recorded value for `category`, or `None` when it is absent.
    fn lookup(&self, category: Category) -> Option<bool>;
}

impl ConsentLookup for ConsentState {
    fn lookup(&self, category: Category) -> Option<bool> {
        self.get(category)
    }
}

/// Evaluate `condition` against `consents`.
///
/// Absent categories evaluate to `false`.  `and` and `or` short-circuit, so
/// children after the deciding one are never looked up.
pub fn evaluate<L>(condition: &Condition, consents: &L) -> bool
where
    L: ConsentLookup + ?Sized,
{
    match condition {
        Condition::Category(category) => consents.lookup(*category).unwrap_or(false),
        Condition::And(clauses) => clauses.iter().all(|child| evaluate(child, consents)),
        Condition::Or(clauses) => clauses.iter().any(|child| evaluate(child, consents)),
        Condition::Not(inner) => !evaluate(inner, consents),
    }
}

// ---------------------------------------------------------------------------
// Serde
// ---------------------------------------------------------------------------

impl Serialize for Clauses {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl Serialize for Condition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Condition::Category(category) => serializer.serialize_str(category.as_str()),
            Condition::And(clauses) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("and", clauses)?;
                map.end()
            }
            Condition::Or(clauses) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("or", clauses)?;
                map.end()
            }
            Condition::Not(inner) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("not", inner)?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Condition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ConditionVisitor)
    }
}

const OPERATORS: &[&str] = &["and", "or", "not"];

struct ConditionVisitor;

impl<'de> Visitor<'de> for ConditionVisitor {
    type Value = Condition;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a category name or an object with exactly one of `and`, `or`, `not`")
    }

    fn visit_str<E: de::Error>(self, name: &str) -> Result<Condition, E> {
        name.parse::<Category>().map(Condition::Category).map_err(E::custom)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Condition, A::Error> {
        let operator: String = map
            .next_key()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;

        let condition = match operator.as_str() {
            "and" => Condition::all_of(map.next_value()?).map_err(de::Error::custom)?,
            "or" => Condition::any_of(map.next_value()?).map_err(de::Error::custom)?,
            "not" => Condition::negate(map.next_value()?),
            other => return Err(de::Error::unknown_field(other, OPERATORS)),
        };

        if map.next_key::<IgnoredAny>()?.is_some() {
            return Err(de::Error::custom(
                "condition object must contain exactly one of `and`, `or`, `not`",
            ));
        }
        Ok(condition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(category: Category) -> Condition {
        Condition::category(category)
    }

    #[test]
    fn empty_combinators_are_rejected() {
        assert_eq!(
            Condition::all_of(Vec::new()),
            Err(ConditionError::EmptyClauses { operator: "and" })
        );
        assert_eq!(
            Condition::any_of(Vec::new()),
            Err(ConditionError::EmptyClauses { operator: "or" })
        );
    }

    #[test]
    fn absent_category_is_not_granted() {
        let state = ConsentState::new().with(Category::Marketing, true);
        assert!(!evaluate(&leaf(Category::Measurement), &state));
        assert!(evaluate(&Condition::negate(leaf(Category::Measurement)), &state));
    }

    #[test]
    fn parses_nested_json() {
        let condition: Condition = serde_json::from_str(
            r#"{"and":["marketing",{"or":["measurement",{"not":"experience"}]}]}"#,
        )
        .unwrap();
        let expected = Condition::all_of(vec![
            leaf(Category::Marketing),
            Condition::any_of(vec![
                leaf(Category::Measurement),
                Condition::negate(leaf(Category::Experience)),
            ])
            .unwrap(),
        ])
        .unwrap();
        assert_eq!(condition, expected);
        assert_eq!(serde_json::to_value(&condition).unwrap(), serde_json::json!({
            "and": ["marketing", {"or": ["measurement", {"not": "experience"}]}]
        }));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(serde_json::from_str::<Condition>(r#""advertising""#).is_err());
        assert!(serde_json::from_str::<Condition>(r#"{"and":[]}"#).is_err());
        assert!(serde_json::from_str::<Condition>(r#"{"xor":["marketing"]}"#).is_err());
        assert!(serde_json::from_str::<Condition>(r#"{}"#).is_err());
        assert!(
            serde_json::from_str::<Condition>(r#"{"and":["marketing"],"or":["marketing"]}"#)
                .is_err()
        );
    }

    #[test]
    fn display_is_infix() {
        let condition = Condition::all_of(vec![
            leaf(Category::Marketing),
            Condition::negate(leaf(Category::Measurement)),
        ])
        .unwrap();
        assert_eq!(alloc::format!("{condition}"), "(marketing & !measurement)");
    }
}
