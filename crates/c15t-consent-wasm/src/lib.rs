// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 MuVeraAI Corporation

//! # c15t-consent-wasm
//!
//! WebAssembly bindings for the c15t consent script loader.
//!
//! This crate exposes the `c15t-consent-core` loader to JavaScript and
//! TypeScript consumers running in the browser via `wasm-bindgen`.  The
//! loader never touches the DOM itself: the page passes a [`ScriptHost`]
//! object that inserts and removes elements and runs lifecycle hooks.
//!
//! ## Architecture
//!
//! Each loader wraps a `ScriptLoader<Box<dyn DomAdapter>>`.  Loader instances
//! are stored in a thread-local registry keyed by integer handles because WASM
//! is single-threaded and `wasm_bindgen` cannot export generic Rust structs
//! across the JS boundary.  Hooks that call back into this module while a
//! loader operation is running get an error instead of re-entering it.
//!
//! ## Exported Functions
//!
//! | Function                 | Description                                              |
//! |--------------------------|----------------------------------------------------------|
//! | `evaluate_condition`     | Evaluate a condition against a consent map (JSON in/out) |
//! | `validate_scripts`       | Check a script list without registering it               |
//! | `create_loader`          | Create a loader driven by a `ScriptHost`                 |
//! | `create_headless_loader` | Create a loader over an in-memory document               |
//! | `destroy_loader`         | Release a loader handle                                  |
//! | `set_scripts`            | Register scripts and reconcile                           |
//! | `update_consents`        | Reconcile against a new consent map                      |
//! | `notify_script_loaded`   | Forward a script `load` event                            |
//! | `notify_script_failed`   | Forward a script `error` event                           |
//! | `remove_script`          | Unmount and unregister one script                        |
//! | `unload_scripts`         | Unmount every script                                     |
//! | `is_script_loaded`       | Whether a script is mounted                              |
//! | `loaded_script_ids`      | Mounted script ids as a JSON array                       |
//! | `script_element_id`      | The DOM id a mounted script uses                         |
//!
//! ## JavaScript Usage
//!
//! ```js
//! import init, {
//!   create_loader,
//!   set_scripts,
//!   update_consents,
//!   notify_script_loaded,
//! } from '@c15t/consent-wasm';
//!
//! await init();
//!
//! const host = {
//!   insertScript(el) {
//!     const parent = el.target === 'body' ? document.body : document.head;
//!     if (!parent) return false;
//!     const script = document.createElement('script');
//!     script.id = el.elementId;
//!     if (el.src) script.src = el.src; else script.textContent = el.textContent;
//!     for (const [name, value] of el.attributes) script.setAttribute(name, value);
//!     script.onload = () => notify_script_loaded(handle, scriptIds[el.elementId]);
//!     parent.appendChild(script);
//!     return true;
//!   },
//!   removeElement(id) {
//!     const el = document.getElementById(id);
//!     el?.remove();
//!     return el !== null;
//!   },
//!   runHook(hook, scriptId, ctx) {
//!     return hooks[scriptId]?.[hook]?.(ctx);
//!   },
//! };
//!
//! const handle = create_loader(host, JSON.stringify({ anonymizeIds: false }));
//!
//! set_scripts(handle, JSON.stringify([
//!   { id: 'gtag', src: 'https://www.googletagmanager.com/gtag/js', category: 'measurement' },
//! ]), JSON.stringify({ necessary: true, measurement: false }));
//!
//! const report = JSON.parse(update_consents(handle, JSON.stringify({
//!   necessary: true, measurement: true,
//! })));
//! console.log(report.mounted); // ["gtag"]
//! ```

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use c15t_consent_core::{
    condition::{evaluate, Condition},
    config::LoaderConfig,
    descriptor::{validate_batch, HookContext, HookError, HookKind, ScriptDescriptor, ScriptDescriptorSpec},
    dom::{DomAdapter, DomError, InMemoryDom, ScriptElement},
    loader::{ReconcileReport, ScriptLoader},
    types::ConsentState,
};
use serde::Serialize;
use tracing::debug;
use wasm_bindgen::prelude::*;

// ---------------------------------------------------------------------------
// Script host
// ---------------------------------------------------------------------------

#[wasm_bindgen(typescript_custom_section)]
const SCRIPT_HOST_TS: &'static str = r#"
export interface ScriptElement {
  elementId: string;
  src?: string;
  textContent?: string;
  target: "head" | "body";
  attributes: [string, string][];
}

export interface ScriptHost {
  /**
   * Insert the element; return false when the target does not exist yet.
   * A thrown error is reported under `rejected` and the other scripts proceed.
   */
  insertScript(element: ScriptElement): boolean;
  /** Remove the element with this id; return whether it existed. */
  removeElement(elementId: string): boolean;
  /** Run a lifecycle hook. A string return value registers a companion element id. */
  runHook(hook: string, scriptId: string, context: unknown): string | void;
}
"#;

#[wasm_bindgen]
extern "C" {
    /// The page object that owns the document and the hook callbacks.
    #[wasm_bindgen(typescript_type = "ScriptHost")]
    #[derive(Clone, Debug)]
    pub type ScriptHost;

    #[wasm_bindgen(method, catch, js_name = insertScript)]
    fn insert_script(this: &ScriptHost, element: JsValue) -> Result<bool, JsValue>;

    #[wasm_bindgen(method, js_name = removeElement)]
    fn remove_element(this: &ScriptHost, element_id: &str) -> bool;

    #[wasm_bindgen(method, catch, js_name = runHook)]
    fn run_hook(
        this: &ScriptHost,
        hook: &str,
        script_id: &str,
        context: JsValue,
    ) -> Result<JsValue, JsValue>;
}

/// Maps and structs become plain JS objects rather than `Map`s.
fn to_js<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, serde_wasm_bindgen::Error> {
    value.serialize(&serde_wasm_bindgen::Serializer::json_compatible())
}

/// Best-effort message for a thrown JS value.
fn describe(error: &JsValue) -> String {
    error.as_string().unwrap_or_else(|| format!("{error:?}"))
}

/// [`DomAdapter`] over a [`ScriptHost`].
struct JsDom {
    host: ScriptHost,
}

impl DomAdapter for JsDom {
    fn insert_script(&mut self, element: &ScriptElement) -> Result<(), DomError> {
        let value = to_js(element).map_err(|error| DomError::Rejected {
            element_id: element.element_id.clone(),
            reason: error.to_string(),
        })?;
        match self.host.insert_script(value) {
            Ok(true) => Ok(()),
            Ok(false) => Err(DomError::TargetUnavailable {
                target: element.target,
                element_id: element.element_id.clone(),
            }),
            Err(thrown) => Err(DomError::Rejected {
                element_id: element.element_id.clone(),
                reason: describe(&thrown),
            }),
        }
    }

    fn remove_element(&mut self, element_id: &str) -> bool {
        self.host.remove_element(element_id)
    }
}

/// What `runHook` receives as its `context` argument.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HookPayload<'a> {
    script_id: &'a str,
    element_id: &'a str,
    has_consent: bool,
    consents: &'a ConsentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
}

fn host_hook(
    host: ScriptHost,
    kind: HookKind,
) -> impl Fn(&HookContext<'_>) -> Result<(), HookError> {
    move |ctx: &HookContext<'_>| {
        let payload = HookPayload {
            script_id: ctx.descriptor_id,
            element_id: ctx.element_id,
            has_consent: ctx.has_consent,
            consents: ctx.consents,
            error: ctx.error,
        };
        let value = to_js(&payload).map_err(HookError::new)?;
        let returned = host
            .run_hook(kind.as_str(), ctx.descriptor_id, value)
            .map_err(|thrown| HookError::new(describe(&thrown)))?;
        if let Some(companion) = returned.as_string() {
            ctx.register_companion(companion);
        }
        Ok(())
    }
}

fn with_host_hooks(descriptor: ScriptDescriptor, host: &ScriptHost) -> ScriptDescriptor {
    descriptor
        .on_before_load(host_hook(host.clone(), HookKind::BeforeLoad))
        .on_load(host_hook(host.clone(), HookKind::Load))
        .on_consent_change(host_hook(host.clone(), HookKind::ConsentChange))
        .on_delete(host_hook(host.clone(), HookKind::Delete))
        .on_error(host_hook(host.clone(), HookKind::Error))
}

// ---------------------------------------------------------------------------
// Loader registry
// ---------------------------------------------------------------------------

struct Instance {
    loader: ScriptLoader<Box<dyn DomAdapter>>,
    /// `None` for headless loaders, which run no hooks.
    host: Option<ScriptHost>,
}

// WASM is single-threaded; RefCell<HashMap<...>> is safe here.
thread_local! {
    static LOADERS: RefCell<HashMap<u32, Instance>> = RefCell::new(HashMap::new());
    static NEXT_HANDLE: Cell<u32> = const { Cell::new(0) };
}

/// Allocate a new loader handle. Handles wrap around at `u32::MAX - 1` to
/// reserve `u32::MAX` as the error sentinel.
fn next_handle() -> u32 {
    NEXT_HANDLE.with(|counter| {
        let handle = counter.get();
        counter.set(if handle >= u32::MAX - 1 { 0 } else { handle + 1 });
        handle
    })
}

fn register(instance: Instance) -> u32 {
    let handle = next_handle();
    LOADERS.with(|loaders| match loaders.try_borrow_mut() {
        Ok(mut map) => {
            map.insert(handle, instance);
            handle
        }
        Err(_) => u32::MAX,
    })
}

/// Run `callback` with mutable access to a loader. Returns `Err(message)` if
/// the handle is unknown or a hook is calling back into the registry.
fn with_instance_mut<F, R>(handle: u32, callback: F) -> Result<R, String>
where
    F: FnOnce(&mut Instance) -> R,
{
    LOADERS.with(|loaders| {
        let mut map = loaders
            .try_borrow_mut()
            .map_err(|_| String::from("loader is busy: re-entrant call from a script hook"))?;
        map.get_mut(&handle)
            .map(callback)
            .ok_or_else(|| format!("unknown loader handle {handle}"))
    })
}

/// Run `callback` with shared access to a loader.
fn with_instance<F, R>(handle: u32, callback: F) -> Result<R, String>
where
    F: FnOnce(&Instance) -> R,
{
    LOADERS.with(|loaders| {
        let map = loaders
            .try_borrow()
            .map_err(|_| String::from("loader is busy: re-entrant call from a script hook"))?;
        map.get(&handle)
            .map(callback)
            .ok_or_else(|| format!("unknown loader handle {handle}"))
    })
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

fn error_json(message: impl std::fmt::Display) -> String {
    serde_json::json!({ "error": message.to_string() }).to_string()
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|error| error_json(format!("serialisation error: {error}")))
}

fn parse_config(config_json: &str) -> Result<LoaderConfig, String> {
    if config_json.trim().is_empty() {
        return Ok(LoaderConfig::default());
    }
    serde_json::from_str(config_json).map_err(|error| format!("config parse error: {error}"))
}

fn parse_consents(consents_json: &str) -> Result<ConsentState, String> {
    serde_json::from_str(consents_json).map_err(|error| format!("consents parse error: {error}"))
}

fn parse_scripts(scripts_json: &str) -> Result<Vec<ScriptDescriptor>, String> {
    let specs: Vec<ScriptDescriptorSpec> = serde_json::from_str(scripts_json)
        .map_err(|error| format!("scripts parse error: {error}"))?;
    let descriptors = specs
        .into_iter()
        .map(ScriptDescriptorSpec::into_descriptor)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|error| error.to_string())?;
    validate_batch(&descriptors).map_err(|error| error.to_string())?;
    Ok(descriptors)
}

fn report_json(result: Result<Result<ReconcileReport, String>, String>) -> String {
    match result.and_then(|inner| inner) {
        Ok(report) => to_json(&report),
        Err(error) => error_json(error),
    }
}

// ---------------------------------------------------------------------------
// Pure functions
// ---------------------------------------------------------------------------

/// Evaluate `condition_json` against `consents_json`.
///
/// Returns `"true"` or `"false"`, or `{"error":"..."}` when either input does
/// not parse.  Unknown category names in the condition are an error; absent
/// categories in the consent map evaluate to `false`.
#[wasm_bindgen]
pub fn evaluate_condition(condition_json: &str, consents_json: &str) -> String {
    let condition: Condition = match serde_json::from_str(condition_json) {
        Ok(condition) => condition,
        Err(error) => return error_json(format!("condition parse error: {error}")),
    };
    match parse_consents(consents_json) {
        Ok(consents) => evaluate(&condition, &consents).to_string(),
        Err(error) => error_json(error),
    }
}

/// Validate a JSON array of script descriptors without registering it.
///
/// Returns `{"valid":true,"count":N}` or `{"error":"..."}`.
#[wasm_bindgen]
pub fn validate_scripts(scripts_json: &str) -> String {
    match parse_scripts(scripts_json) {
        Ok(descriptors) => {
            serde_json::json!({ "valid": true, "count": descriptors.len() }).to_string()
        }
        Err(error) => error_json(error),
    }
}

// ---------------------------------------------------------------------------
// Loader lifecycle
// ---------------------------------------------------------------------------

/// Create a loader that mounts scripts through `host` and return its handle.
///
/// `config_json` is a [`LoaderConfig`] (`{"anonymizeIds":true}`); pass `""`
/// for the defaults.  Returns `u32::MAX` on parse error.
#[wasm_bindgen]
pub fn create_loader(host: ScriptHost, config_json: &str) -> u32 {
    let config = match parse_config(config_json) {
        Ok(config) => config,
        Err(_) => return u32::MAX,
    };
    let dom: Box<dyn DomAdapter> = Box::new(JsDom { host: host.clone() });
    let handle = register(Instance { loader: ScriptLoader::new(dom, config), host: Some(host) });
    debug!(handle, "created loader");
    handle
}

/// Create a loader over an in-memory document (server rendering, tests).
///
/// Returns `u32::MAX` on parse error.
#[wasm_bindgen]
pub fn create_headless_loader(config_json: &str) -> u32 {
    let config = match parse_config(config_json) {
        Ok(config) => config,
        Err(_) => return u32::MAX,
    };
    let dom: Box<dyn DomAdapter> = Box::new(InMemoryDom::new());
    let handle = register(Instance { loader: ScriptLoader::new(dom, config), host: None });
    debug!(handle, "created headless loader");
    handle
}

/// Release the loader associated with `handle`.
///
/// Mounted elements stay in the document; call [`unload_scripts`] first to
/// remove them.
#[wasm_bindgen]
pub fn destroy_loader(handle: u32) {
    LOADERS.with(|loaders| {
        if let Ok(mut map) = loaders.try_borrow_mut() {
            map.remove(&handle);
        }
    });
}

// ---------------------------------------------------------------------------
// Registration and reconcile
// ---------------------------------------------------------------------------

/// Register a JSON array of scripts and reconcile against `consents_json`.
///
/// Returns the JSON [`ReconcileReport`] or `{"error":"..."}`.
#[wasm_bindgen]
pub fn set_scripts(handle: u32, scripts_json: &str, consents_json: &str) -> String {
    let descriptors = match parse_scripts(scripts_json) {
        Ok(descriptors) => descriptors,
        Err(error) => return error_json(error),
    };
    let consents = match parse_consents(consents_json) {
        Ok(consents) => consents,
        Err(error) => return error_json(error),
    };

    report_json(with_instance_mut(handle, |instance| {
        let descriptors = match &instance.host {
            Some(host) => descriptors
                .into_iter()
                .map(|descriptor| with_host_hooks(descriptor, host))
                .collect(),
            None => descriptors,
        };
        instance
            .loader
            .set_scripts(descriptors, &consents)
            .map_err(|error| error.to_string())
    }))
}

/// Reconcile every registered script against `consents_json`.
///
/// Returns the JSON [`ReconcileReport`] or `{"error":"..."}`.
#[wasm_bindgen]
pub fn update_consents(handle: u32, consents_json: &str) -> String {
    let consents = match parse_consents(consents_json) {
        Ok(consents) => consents,
        Err(error) => return error_json(error),
    };
    report_json(with_instance_mut(handle, |instance| {
        instance.loader.reconcile(&consents).map_err(|error| error.to_string())
    }))
}

/// Unmount (if mounted) and unregister `script_id`.
///
/// Returns the JSON [`ReconcileReport`], `null` when the id is not
/// registered, or `{"error":"..."}`.
#[wasm_bindgen]
pub fn remove_script(handle: u32, script_id: &str) -> String {
    match with_instance_mut(handle, |instance| instance.loader.remove_script(script_id)) {
        Ok(Some(report)) => to_json(&report),
        Ok(None) => "null".into(),
        Err(error) => error_json(error),
    }
}

/// Unmount every script, persistent ones included.
///
/// Returns the JSON [`ReconcileReport`] or `{"error":"..."}`.
#[wasm_bindgen]
pub fn unload_scripts(handle: u32) -> String {
    match with_instance_mut(handle, |instance| instance.loader.unload_all()) {
        Ok(report) => to_json(&report),
        Err(error) => error_json(error),
    }
}

// ---------------------------------------------------------------------------
// Load notifications
// ---------------------------------------------------------------------------

/// Forward the `load` event of `script_id`'s element.
///
/// Returns `true` when `onLoad` ran; `false` for unknown handles, scripts
/// that are no longer mounted, and repeated events.
#[wasm_bindgen]
pub fn notify_script_loaded(handle: u32, script_id: &str) -> bool {
    with_instance_mut(handle, |instance| instance.loader.script_loaded(script_id)).unwrap_or(false)
}

/// Forward the `error` event of `script_id`'s element.
#[wasm_bindgen]
pub fn notify_script_failed(handle: u32, script_id: &str, reason: &str) -> bool {
    with_instance_mut(handle, |instance| instance.loader.script_failed(script_id, reason))
        .unwrap_or(false)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Whether `script_id` is mounted.  `false` for unknown handles.
#[wasm_bindgen]
pub fn is_script_loaded(handle: u32, script_id: &str) -> bool {
    with_instance(handle, |instance| instance.loader.is_mounted(script_id)).unwrap_or(false)
}

/// Mounted script ids as a JSON array.  Returns `"[]"` on error.
#[wasm_bindgen]
pub fn loaded_script_ids(handle: u32) -> String {
    with_instance(handle, |instance| to_json(&instance.loader.mounted_ids()))
        .unwrap_or_else(|_| "[]".into())
}

/// The DOM id `script_id` is mounted under, if it is mounted.
#[wasm_bindgen]
pub fn script_element_id(handle: u32, script_id: &str) -> Option<String> {
    with_instance(handle, |instance| {
        instance.loader.element_id_for(script_id).map(String::from)
    })
    .ok()
    .flatten()
}

// ---------------------------------------------------------------------------
// wasm-bindgen-test suite
// ---------------------------------------------------------------------------


// ---------------------------------------------------------------------------
// Native unit tests (run with `cargo test` outside of WASM)
// ---------------------------------------------------------------------------

#[cfg(test)]
#[cfg(not(target_arch = "wasm32"))]
mod native_tests {
    use super::*;

    const SCRIPTS: &str = r#"[
        {"id":"a","src":"https://a.example/a.js","category":"marketing"},
        {"id":"b","textContent":"window.b = 1","category":{"and":["marketing","measurement"]}},
        {"id":"p","src":"https://p.example/p.js","category":"marketing","persistAfterConsentRevoked":true}
    ]"#;

    fn parsed(json: &str) -> serde_json::Value {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn evaluate_condition_reads_json() {
        let consents = r#"{"necessary":true,"marketing":true}"#;
        assert_eq!(evaluate_condition(r#""marketing""#, consents), "true");
        assert_eq!(evaluate_condition(r#"{"not":"marketing"}"#, consents), "false");
        assert_eq!(evaluate_condition(r#""measurement""#, consents), "false");
        assert!(evaluate_condition(r#""advertising""#, consents).contains("error"));
        assert!(evaluate_condition(r#"{"or":[]}"#, consents).contains("error"));
    }

    #[test]
    fn validate_scripts_reports_problems() {
        assert_eq!(parsed(&validate_scripts(SCRIPTS))["count"], 3);
        let conflicting = r#"[{"id":"x","src":"s","textContent":"t","category":"marketing"}]"#;
        assert!(validate_scripts(conflicting).contains("both"));
        let duplicate = r#"[
            {"id":"x","src":"https://x/1.js","category":"marketing"},
            {"id":"x","src":"https://x/2.js","category":"marketing"}
        ]"#;
        assert!(validate_scripts(duplicate).contains("more than once"));
    }

    #[test]
    fn headless_loader_lifecycle() {
        let handle = create_headless_loader("");
        assert_ne!(handle, u32::MAX);

        let report = parsed(&set_scripts(handle, SCRIPTS, r#"{"necessary":true,"marketing":true}"#));
        assert_eq!(report["mounted"], serde_json::json!(["a", "p"]));
        assert_eq!(loaded_script_ids(handle), r#"["a","p"]"#);
        assert!(notify_script_loaded(handle, "a"));
        assert!(!notify_script_loaded(handle, "b"));

        let report = parsed(&update_consents(
            handle,
            r#"{"necessary":true,"marketing":true,"measurement":true}"#,
        ));
        assert_eq!(report["mounted"], serde_json::json!(["b"]));
        assert_eq!(report["notified"], serde_json::json!(["a", "p"]));

        let report = parsed(&update_consents(handle, r#"{"necessary":true}"#));
        assert_eq!(report["unmounted"], serde_json::json!(["a", "b"]));
        assert!(is_script_loaded(handle, "p"));
        assert_eq!(script_element_id(handle, "p").as_deref(), Some("c15t-script-p"));

        assert_eq!(remove_script(handle, "missing"), "null");
        let report = parsed(&unload_scripts(handle));
        assert_eq!(report["unmounted"], serde_json::json!(["p"]));

        destroy_loader(handle);
        assert!(!is_script_loaded(handle, "p"));
    }

    #[test]
    fn invalid_config_returns_sentinel() {
        assert_eq!(create_headless_loader("not json"), u32::MAX);
    }

    #[test]
    fn unknown_handle_returns_error() {
        let result = update_consents(99_999, r#"{"necessary":true}"#);
        assert!(result.contains("unknown loader handle"));
        assert_eq!(loaded_script_ids(99_999), "[]");
        assert!(!notify_script_failed(99_999, "a", "blocked"));
    }

    #[test]
    fn malformed_consents_are_rejected_before_lookup() {
        let handle = create_headless_loader("");
        assert!(update_consents(handle, "[1,2]").contains("consents parse error"));
        destroy_loader(handle);
    }
}
