#![no_main]

use libfuzzer_sys::fuzz_target;
use vhb_core::{Metrics, ScalingOptions};
use vhb_runtime::input::{
    parse_document, parse_keyboard, parse_media_state, parse_object, parse_speech_marks,
};
use vhb_runtime::{ConfigurationChange, RootConfig};

fuzz_target!(|data: &[u8]| {
    // First byte picks the parser; the rest is the payload.
    let Some((&selector, payload)) = data.split_first() else {
        return;
    };
    let Ok(json) = std::str::from_utf8(payload) else {
        return;
    };
    if json.len() > 8192 {
        return;
    }

    // Every parser must reject bad input with an error, never a panic.
    match selector % 8 {
        0 => {
            if let Ok(keyboard) = parse_keyboard(json) {
                // Required keys are all present on success.
                let _ = (keyboard.code, keyboard.key);
            }
        }
        1 => {
            let _ = parse_media_state(json);
        }
        2 => {
            if let Ok(marks) = parse_speech_marks(json) {
                for mark in marks {
                    if !mark.kind.has_range() {
                        assert_eq!((mark.start, mark.end), (0.0, 0.0));
                    }
                }
            }
        }
        3 => {
            let _ = parse_document(json);
        }
        4 => {
            let _ = parse_object(json);
        }
        5 => {
            if let Ok(config) = RootConfig::from_json(json) {
                assert!(config.settings.font_scale > 0.0);
            }
        }
        6 => {
            if let Ok(change) = ConfigurationChange::from_json(json) {
                let mut merged = ConfigurationChange::default();
                merged.merge(&change);
            }
        }
        _ => {
            if let Ok(metrics) = Metrics::from_json(json) {
                assert!(metrics.dpi.is_finite() && metrics.dpi > 0.0);
                let _ = ScalingOptions::from_json(json, &metrics);
            }
        }
    }
});
