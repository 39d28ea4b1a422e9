// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Property-based tests for the condition evaluator.
//!
//! These tests verify the boolean laws the evaluator must satisfy for any
//! consent snapshot:
//! - Leaves read the snapshot, absent categories read as `false`
//! - `and` / `or` agree with `all` / `any` over their children
//! - Double negation and De Morgan hold
//! - Serialisation round-trips preserve meaning
//!
//! Short-circuiting is checked separately with a lookup that panics when it
//! is consulted for a category it must never reach.

use c15t_consent_core::condition::{evaluate, Condition, ConsentLookup};
use c15t_consent_core::types::{Category, ConsentState};
use proptest::prelude::*;

// =============================================================================
// HELPER STRATEGIES
// =============================================================================

fn category_strategy() -> impl Strategy<Value = Category> {
    prop::sample::select(Category::ALL.to_vec())
}

/// Snapshots where each category is granted, denied or absent.
fn state_strategy() -> impl Strategy<Value = ConsentState> {
    prop::collection::vec(prop::option::of(any::<bool>()), Category::ALL.len()).prop_map(
        |values| {
            let mut state = ConsentState::new();
            for (category, value) in Category::ALL.into_iter().zip(values) {
                if let Some(granted) = value {
                    state.set(category, granted);
                }
            }
            state
        },
    )
}

fn condition_strategy() -> impl Strategy<Value = Condition> {
    let leaf = category_strategy().prop_map(Condition::category);
    leaf.prop_recursive(4, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 1..4)
                .prop_map(|children| Condition::all_of(children).unwrap()),
            prop::collection::vec(inner.clone(), 1..4)
                .prop_map(|children| Condition::any_of(children).unwrap()),
            inner.prop_map(Condition::negate),
        ]
    })
}

// =============================================================================
// EVALUATOR LAWS
// =============================================================================

mod evaluator_laws {
    use super::*;

    proptest! {
        /// A leaf reads exactly the recorded value, absent as false.
        #[test]
        fn leaf_reads_the_snapshot(category in category_strategy(), state in state_strategy()) {
            let expected = state.get(category).unwrap_or(false);
            prop_assert_eq!(evaluate(&Condition::category(category), &state), expected);
        }

        /// `and` holds iff every child holds; `or` iff any child holds.
        #[test]
        fn combinators_match_all_and_any(
            children in prop::collection::vec(condition_strategy(), 1..5),
            state in state_strategy(),
        ) {
            let values: Vec<bool> = children.iter().map(|c| evaluate(c, &state)).collect();
            let and = Condition::all_of(children.clone()).unwrap();
            let or = Condition::any_of(children).unwrap();
            prop_assert_eq!(evaluate(&and, &state), values.iter().all(|v| *v));
            prop_assert_eq!(evaluate(&or, &state), values.iter().any(|v| *v));
        }

        /// not(not(c)) == c
        #[test]
        fn double_negation(condition in condition_strategy(), state in state_strategy()) {
            let twice = Condition::negate(Condition::negate(condition.clone()));
            prop_assert_eq!(evaluate(&twice, &state), evaluate(&condition, &state));
        }

        /// not(and(a, b)) == or(not(a), not(b))
        #[test]
        fn de_morgan(
            a in condition_strategy(),
            b in condition_strategy(),
            state in state_strategy(),
        ) {
            let left = Condition::negate(Condition::all_of(vec![a.clone(), b.clone()]).unwrap());
            let right = Condition::any_of(vec![Condition::negate(a), Condition::negate(b)]).unwrap();
            prop_assert_eq!(evaluate(&left, &state), evaluate(&right, &state));
        }

        /// Evaluation depends only on its inputs.
        #[test]
        fn evaluation_is_deterministic(condition in condition_strategy(), state in state_strategy()) {
            prop_assert_eq!(evaluate(&condition, &state), evaluate(&condition, &state.clone()));
        }

        /// JSON round-trip yields the same tree.
        #[test]
        fn json_round_trip(condition in condition_strategy()) {
            let json = serde_json::to_string(&condition).unwrap();
            let parsed: Condition = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(parsed, condition);
        }

        /// Every category the evaluator may consult is listed once.
        #[test]
        fn categories_are_unique(condition in condition_strategy()) {
            let categories = condition.categories();
            let mut deduped = categories.clone();
            deduped.sort();
            deduped.dedup();
            prop_assert_eq!(deduped.len(), categories.len());
        }
    }
}

// =============================================================================
// SHORT-CIRCUIT
// =============================================================================

/// Grants `marketing`, denies `measurement`, panics for anything else.
struct Tripwire;

impl ConsentLookup for Tripwire {
    fn lookup(&self, category: Category) -> Option<bool> {
        match category {
            Category::Marketing => Some(true),
            Category::Measurement => Some(false),
            other => panic!("evaluator consulted {other} after the result was decided"),
        }
    }
}

#[test]
fn and_stops_at_the_first_false_child() {
    let condition = Condition::all_of(vec![
        Condition::category(Category::Measurement),
        Condition::category(Category::Experience),
    ])
    .unwrap();
    assert!(!evaluate(&condition, &Tripwire));
}

#[test]
fn or_stops_at_the_first_true_child() {
    let condition = Condition::any_of(vec![
        Condition::category(Category::Marketing),
        Condition::category(Category::Functionality),
    ])
    .unwrap();
    assert!(evaluate(&condition, &Tripwire));
}

#[test]
#[should_panic(expected = "evaluator consulted")]
fn tripwire_fires_when_evaluation_is_undecided() {
    let condition = Condition::all_of(vec![
        Condition::category(Category::Marketing),
        Condition::category(Category::Experience),
    ])
    .unwrap();
    evaluate(&condition, &Tripwire);
}
