#![cfg(target_arch = "wasm32")]
#![forbid(unsafe_code)]

use js_sys::{Array, Function, Reflect};
use vhb_web::{Action, Logger, WebDocumentManager, WebPackageManager};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_test::wasm_bindgen_test;

/// A JS callback that pushes its arguments onto `sink`.
fn recorder(sink: &Array) -> Function {
    let record = Function::new_with_args(
        "sink",
        "return function() { sink.push(Array.from(arguments)); };",
    );
    record
        .call1(&JsValue::NULL, sink)
        .expect("factory runs")
        .unchecked_into()
}

#[wasm_bindgen_test]
fn action_settles_once_and_reports_argument() {
    let calls = Array::new();
    let action = Action::new();
    action.then(recorder(&calls));
    action.add_terminate_callback(recorder(&calls));
    assert!(action.resolve_with_arg(7));
    assert!(!action.terminate());
    assert!(action.is_resolved());
    assert_eq!(calls.length(), 1);
    let args: Array = calls.get(0).unchecked_into();
    assert_eq!(args.get(0).as_f64(), Some(7.0));
}

#[wasm_bindgen_test]
fn document_manager_correlates_by_id() {
    let requests = Array::new();
    let manager = WebDocumentManager::new(recorder(&requests));
    assert_eq!(manager.pending(), 0);
    // No engine request is outstanding, so completions are misses.
    assert_eq!(
        manager.embed_request_succeeded(1.0, "doc", "{}".into(), None, false),
        None
    );
    assert!(!manager.embed_request_failed(1.0, "doc", "gone"));
    assert_eq!(requests.length(), 0);
}

#[wasm_bindgen_test]
fn package_manager_misses_unknown_reference() {
    let imports = Array::new();
    let manager = WebPackageManager::new(recorder(&imports));
    assert!(!manager.import_package_succeeded("a:1.0", "{}"));
    assert!(!manager.import_package_failed("a:1.0", "404", 404));
    assert_eq!(manager.pending(), 0);
}

#[wasm_bindgen_test]
fn logger_forwards_buffered_records() {
    let lines = Array::new();
    assert!(Logger::set_log_transport(recorder(&lines)));
    tracing::warn!(target: "vhb.web", "hello host");
    assert!(Logger::flush() >= 1);
    let last: Array = lines.get(lines.length() - 1).unchecked_into();
    assert_eq!(last.get(0).as_f64(), Some(3.0));
    let message = last.get(1).as_string().unwrap_or_default();
    assert!(message.contains("hello host"), "{message}");
    assert!(Reflect::has(&last, &JsValue::from_f64(1.0)).unwrap_or(false));
}
