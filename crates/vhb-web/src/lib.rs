#![forbid(unsafe_code)]

//! Browser surface of the viewhost bridge.
//!
//! On `wasm32` this crate exports the engine-independent bridge objects to
//! JavaScript: `Action`, `DocumentManager`, `PackageManager`,
//! `MediaPlayerFactory`, `AudioPlayerFactory` and `Logger`. The engine itself
//! is not part of this crate, so per-instance entry points live in
//! [`runner_core::RunnerCore`], a JSON facade an embedder wraps with its
//! concrete engine type.

#[cfg(target_arch = "wasm32")]
mod wasm;

#[cfg(target_arch = "wasm32")]
pub use wasm::{
    Action, JsTextMeasureHost, Logger, WebAudioPlayerFactory, WebDocumentManager,
    WebMediaPlayerFactory, WebPackageManager, host_services,
};

pub mod runner_core;

pub use runner_core::RunnerCore;

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use vhb_core::{Color, Rect};
    use vhb_harness::{
        FixedTextMeasure, RecordingServices, RootCall, ScriptedDocument, ScriptedEngine, capture,
    };
    use vhb_runtime::{EngineEvent, HostServices};

    use crate::runner_core::RunnerCore;

    const METRICS: &str = r#"{"width": 1280, "height": 800, "dpi": 320}"#;

    fn document() -> ScriptedDocument {
        ScriptedDocument::new()
            .component("title", [(1, Rect::new(0.0, 0.0, 100.0, 20.0).into())])
            .event(
                EngineEvent::new(7)
                    .with_component("title")
                    .with_value(3, Rect::new(1.0, 2.0, 3.0, 4.0)),
            )
            .background(Color::from_rgba(0x11, 0x22, 0x33, 0xff))
    }

    fn created() -> RunnerCore<ScriptedEngine> {
        let mut core = RunnerCore::new(ScriptedEngine::new(), HostServices::default());
        core.create(METRICS, "{}", &document(), None, None)
            .expect("inflates");
        core
    }

    fn parse(json: &str) -> Value {
        serde_json::from_str(json).expect("valid JSON")
    }

    #[test]
    fn runner_core_create_reports_viewport() {
        let core = created();
        assert!(core.is_created());
        assert_eq!(
            parse(&core.viewport_json().expect("created")),
            json!({"width": 1280.0, "height": 800.0, "scaleFactor": 2.0})
        );
    }

    #[test]
    fn runner_core_create_rejects_bad_payloads() {
        let mut core = RunnerCore::new(ScriptedEngine::new(), HostServices::default());
        assert!(core.create("not json", "{}", &document(), None, None).is_err());
        assert!(
            core.create(METRICS, r#"{"fontScale": 0}"#, &document(), None, None)
                .is_err()
        );
        assert!(!core.is_created());
        assert_eq!(core.viewport_json(), None);
    }

    #[test]
    fn runner_core_exhausted_scaling_leaves_no_instance() {
        let mut core = RunnerCore::new(ScriptedEngine::new().reject_all(), HostServices::default());
        let scaling = r#"{"specifications": [{"minWidth": 400, "maxWidth": 800,
                          "minHeight": 300, "maxHeight": 600}]}"#;
        let (events, result) =
            capture(|| core.create(METRICS, "{}", &document(), Some(scaling), None));
        assert!(result.is_err());
        assert!(!core.is_created());
        assert!(events.iter().any(|e| e.target == "vhb.context"));
    }

    #[test]
    fn runner_core_events_marshal_and_resolve_once() {
        let mut core = created();
        let events = parse(&core.take_events_json());
        assert_eq!(
            events,
            json!([{
                "id": 1,
                "type": 7,
                "component": "title",
                "values": {"3": {"x": 2.0, "y": 4.0, "width": 6.0, "height": 8.0}},
            }])
        );
        assert_eq!(core.pending_events(), 1);
        assert!(core.resolve_event(1, Some(4)));
        assert!(!core.resolve_event(1, None));
        assert_eq!(core.pending_events(), 0);
        assert_eq!(parse(&core.take_events_json()), json!([]));
    }

    #[test]
    fn runner_core_command_batches_are_tracked_until_collected() {
        let mut core = created();
        let first = core.execute_commands(r#"[{"type": "Idle"}]"#, false);
        let second = core.execute_commands(r#"[{"type": "Idle"}]"#, true);
        let (Some(first), Some(second)) = (first, second) else {
            panic!("instance exists");
        };
        assert_eq!(core.action_state(first), Some("pending"));
        assert_eq!(parse(&core.take_settled_actions_json()), json!({}));

        assert!(core.terminate_action(first));
        assert!(!core.terminate_action(first));
        assert_eq!(
            parse(&core.take_settled_actions_json()),
            json!({ (first.to_string()): "terminated" })
        );
        assert_eq!(core.action_state(first), None);

        core.cancel_execution();
        assert_eq!(core.action_state(second), Some("terminated"));
    }

    #[test]
    fn runner_core_destroy_terminates_tracked_batches() {
        let mut core = created();
        let id = core.execute_commands("[]", false).expect("instance exists");
        let handle = core
            .context()
            .and_then(|context| context.root().actions.first().cloned())
            .expect("engine kept the handle");
        core.destroy();
        assert!(handle.is_terminated());
        assert!(!core.is_created());
        assert_eq!(core.action_state(id), None);
        assert_eq!(core.execute_commands("[]", false), None);
    }

    #[test]
    fn runner_core_dirty_properties_drain() {
        let mut core = created();
        core.context_mut()
            .expect("created")
            .root_mut()
            .set_property("title", 1, Rect::new(0.0, 0.0, 50.0, 10.0));
        assert_eq!(
            parse(&core.take_dirty_json()),
            json!({"title": {"1": {"x": 0.0, "y": 0.0, "width": 100.0, "height": 20.0}}})
        );
        assert_eq!(parse(&core.take_dirty_json()), json!({}));
    }

    #[test]
    fn runner_core_input_converts_and_rejects() {
        let mut core = created();
        assert!(core.handle_pointer_event(0, 20.0, 40.0, 1, 0));
        assert!(!core.handle_pointer_event(99, 20.0, 40.0, 1, 0));
        assert!(!core.handle_keyboard(0, r#"{"code": "KeyA"}"#));
        core.update_cursor_position(8.0, 6.0);
        let calls = &core.context().expect("created").root().calls;
        assert_eq!(calls.len(), 2);
        assert!(matches!(calls[1], RootCall::Cursor(p) if p.x == 4.0 && p.y == 3.0));
    }

    #[test]
    fn runner_core_time_ignores_non_finite() {
        let mut core = created();
        core.update_time(f64::NAN, 0.0);
        core.update_time(100.0, f64::INFINITY);
        assert_eq!(core.next_time(), Some(16.0));
        core.update_time(100.0, 5.0);
        assert_eq!(core.next_time(), Some(116.0));
    }

    #[test]
    fn runner_core_configuration_change_with_metrics() {
        let mut core = created();
        assert!(core.configuration_change(
            r#"{"theme": "light"}"#,
            Some(r#"{"width": 640, "height": 400, "dpi": 320}"#),
            None,
        ));
        assert_eq!(
            parse(&core.viewport_json().expect("created")),
            json!({"width": 640.0, "height": 400.0, "scaleFactor": 2.0})
        );
        assert!(!core.configuration_change("[", None, None));
    }

    #[test]
    fn runner_core_background_and_context() {
        let core = created();
        assert_eq!(
            parse(&core.background_json().expect("created")),
            json!({"color": 0x1122_33ff_u32, "gradient": null})
        );
        assert_eq!(
            parse(&core.visual_context().expect("created")),
            json!({"id": "root", "children": ["title"]})
        );
        assert_eq!(core.data_source_context().as_deref(), Some("[]"));
    }

    #[test]
    fn runner_core_data_sources_and_focus() {
        let mut core = created();
        assert!(!core.process_data_source_update("{}", "unknownProvider"));
        assert!(core.process_data_source_update("{}", "dynamicIndexList"));
        assert_eq!(parse(&core.pending_errors_json()), json!([]));

        core.context_mut()
            .expect("created")
            .root_mut()
            .focusable
            .insert("title".into(), Rect::new(1.0, 1.0, 2.0, 2.0));
        assert_eq!(
            parse(&core.focusable_areas_json()),
            json!({"title": {"x": 2.0, "y": 2.0, "width": 4.0, "height": 4.0}})
        );
        assert!(core.set_focus(0, Rect::new(0.0, 0.0, 10.0, 10.0), "title"));
        assert!(!core.set_focus(42, Rect::new(0.0, 0.0, 10.0, 10.0), "title"));
    }

    #[test]
    fn runner_core_shares_services_and_text_hook() {
        let services = RecordingServices::new();
        let text = Rc::new(FixedTextMeasure::new(json!({"width": 40, "height": 10})));
        let mut core = RunnerCore::new(ScriptedEngine::new(), services.host_services());
        core.create(METRICS, "{}", &document(), None, Some(text.clone()))
            .expect("inflates");
        let root = core.context().expect("created").root();
        assert!(root.config.services.documents.is_some());
        let layout = root.measure_text("title", 100.0, 50.0).expect("text installed");
        assert_eq!((layout.width, layout.height), (20.0, 5.0));
        assert_eq!(text.requests.borrow()[0], ("title".to_owned(), 200.0, 100.0));
    }
}
