// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! Integration tests for `ConsentRuntime`: hydration, saving, reset and the
//! loader pass-throughs.

use c15t_consent_core::{
    condition::Condition,
    config::LoaderConfig,
    descriptor::ScriptDescriptor,
    dom::InMemoryDom,
    element_id::RandomTokens,
    loader::ScriptLoader,
    runtime::{ConsentRuntime, ConsentUpdate, RuntimeError},
    storage::{ConsentStorage, InMemoryStorage, StorageError},
    types::{Category, ConsentInfo, ConsentKind, ConsentState, StoredConsent},
};

fn fixed_clock() -> u64 {
    1_760_000_000_000
}

fn runtime<S: ConsentStorage>(storage: S) -> (InMemoryDom, ConsentRuntime<S, InMemoryDom>) {
    let dom = InMemoryDom::new();
    let loader = ScriptLoader::with_token_source(
        dom.clone(),
        LoaderConfig::default(),
        Box::new(RandomTokens::seeded(7)),
    );
    (dom, ConsentRuntime::new(storage, loader).with_clock(fixed_clock))
}

fn ads() -> ScriptDescriptor {
    ScriptDescriptor::external(
        "ads",
        "https://ads.example.com/tag.js",
        Condition::category(Category::Marketing),
    )
}

/// Refuses every write.
struct ReadOnly;

impl ConsentStorage for ReadOnly {
    fn load(&self) -> Option<StoredConsent> {
        None
    }

    fn save(&mut self, _record: &StoredConsent) -> Result<(), StorageError> {
        Err(StorageError::Write { reason: "quota exceeded".into() })
    }

    fn clear(&mut self) -> Result<(), StorageError> {
        Err(StorageError::Write { reason: "quota exceeded".into() })
    }
}

#[test]
fn init_without_a_record_uses_necessary_only() {
    let (_, mut runtime) = runtime(InMemoryStorage::new());
    runtime.init().unwrap();
    assert!(!runtime.has_consented());
    assert!(runtime.has(&Condition::category(Category::Necessary)));
    assert!(!runtime.has(&Condition::category(Category::Marketing)));
}

#[test]
fn init_hydrates_and_mounts_from_storage() {
    let stored = StoredConsent {
        consents: ConsentState::new()
            .with(Category::Marketing, true)
            .with(Category::Necessary, false),
        info: ConsentInfo { time_ms: 42, kind: ConsentKind::Custom },
    };
    let (dom, mut runtime) = runtime(InMemoryStorage::with_record(stored));
    runtime.set_scripts(vec![ads()]).unwrap();
    assert!(dom.is_empty());

    runtime.init().unwrap();
    assert!(runtime.has_consented());
    assert_eq!(runtime.consent_info().map(|info| info.time_ms), Some(42));
    assert!(runtime.has(&Condition::category(Category::Necessary)));
    assert!(dom.contains("c15t-script-ads"));
}

#[test]
fn save_persists_then_reconciles() {
    let (dom, mut runtime) = runtime(InMemoryStorage::new());
    runtime.init().unwrap();
    runtime.set_scripts(vec![ads()]).unwrap();

    let report = runtime.save_consents(ConsentUpdate::All).unwrap();
    assert_eq!(report.mounted, ["ads"]);
    assert!(dom.contains("c15t-script-ads"));
    assert_eq!(runtime.loaded_scripts(), ["ads"]);

    let stored = runtime.storage().load().unwrap();
    assert_eq!(stored.info, ConsentInfo { time_ms: fixed_clock(), kind: ConsentKind::All });
    assert_eq!(stored.consents, ConsentState::all_granted());

    let report = runtime.save_consents(ConsentUpdate::Necessary).unwrap();
    assert_eq!(report.unmounted, ["ads"]);
    assert!(dom.is_empty());
}

#[test]
fn custom_consent_cannot_deny_necessary() {
    let (_, mut runtime) = runtime(InMemoryStorage::new());
    let choice = ConsentState::new()
        .with(Category::Necessary, false)
        .with(Category::Measurement, true);
    runtime.save_consents(ConsentUpdate::Custom(choice)).unwrap();

    assert!(runtime.consents().is_granted(Category::Necessary));
    assert!(runtime.consents().is_granted(Category::Measurement));
    assert_eq!(runtime.consents().get(Category::Marketing), Some(false));
    assert_eq!(runtime.consent_info().map(|info| info.kind), Some(ConsentKind::Custom));
}

#[test]
fn failed_save_leaves_state_and_document_untouched() {
    let (dom, mut runtime) = runtime(ReadOnly);
    runtime.init().unwrap();
    runtime.set_scripts(vec![ads()]).unwrap();

    let error = runtime.save_consents(ConsentUpdate::All).unwrap_err();
    assert!(matches!(error, RuntimeError::Storage(StorageError::Write { .. })));
    assert!(!runtime.has(&Condition::category(Category::Marketing)));
    assert!(dom.is_empty());
}

#[test]
fn reset_clears_storage_and_unmounts() {
    let (dom, mut runtime) = runtime(InMemoryStorage::new());
    runtime.set_scripts(vec![ads()]).unwrap();
    runtime.save_consents(ConsentUpdate::All).unwrap();
    assert!(!dom.is_empty());

    let report = runtime.reset().unwrap();
    assert_eq!(report.unmounted, ["ads"]);
    assert!(runtime.storage().load().is_none());
    assert!(!runtime.has_consented());
    assert!(dom.is_empty());
}

#[test]
fn pass_throughs_reach_the_loader() {
    let (dom, mut runtime) = runtime(InMemoryStorage::new());
    runtime.save_consents(ConsentUpdate::All).unwrap();
    let both = Condition::all_of(vec![
        Condition::category(Category::Marketing),
        Condition::category(Category::Measurement),
    ])
    .unwrap();
    runtime
        .set_scripts(vec![ads(), ScriptDescriptor::external("b", "https://b.example/b.js", both)])
        .unwrap();

    assert_eq!(
        runtime.script_categories("b"),
        Some(vec![Category::Marketing, Category::Measurement])
    );
    assert_eq!(runtime.script_categories("missing"), None);

    assert!(runtime.script_loaded("ads"));
    assert!(runtime.script_failed("b", "timeout"));
    assert!(runtime.remove_script("ads").is_some());
    assert!(!dom.contains("c15t-script-ads"));
    assert!(runtime.loader().is_mounted("b"));
}
