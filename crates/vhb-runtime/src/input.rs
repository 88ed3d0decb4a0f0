#![forbid(unsafe_code)]

//! Host payload parsing.
//!
//! Each payload is deserialized into a permissive raw struct first, then
//! checked for required fields. A payload missing a required field is
//! rejected as a whole so no partial state reaches the engine.

use serde::Deserialize;
use serde_json::Value;
use vhb_core::{DynamicValue, to_engine_value};

use crate::audio::{SpeechMark, SpeechMarkKind};
use crate::engine::Keyboard;
use crate::error::PayloadError;
use crate::media::{MediaState, TrackState};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawKeyboard {
    code: Option<String>,
    key: Option<String>,
    repeat: Option<bool>,
    alt_key: Option<bool>,
    ctrl_key: Option<bool>,
    meta_key: Option<bool>,
    shift_key: Option<bool>,
}

/// Parse a keyboard payload. All seven fields are required.
pub fn parse_keyboard(json: &str) -> Result<Keyboard, PayloadError> {
    let raw: RawKeyboard = serde_json::from_str(json)?;
    Ok(Keyboard {
        code: raw.code.ok_or(PayloadError::MissingField("code"))?,
        key: raw.key.ok_or(PayloadError::MissingField("key"))?,
        repeat: raw.repeat.ok_or(PayloadError::MissingField("repeat"))?,
        alt: raw.alt_key.ok_or(PayloadError::MissingField("altKey"))?,
        ctrl: raw.ctrl_key.ok_or(PayloadError::MissingField("ctrlKey"))?,
        meta: raw.meta_key.ok_or(PayloadError::MissingField("metaKey"))?,
        shift: raw.shift_key.ok_or(PayloadError::MissingField("shiftKey"))?,
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawMediaState {
    track_index: Option<f64>,
    track_count: Option<f64>,
    current_time: Option<f64>,
    duration: Option<f64>,
    paused: Option<bool>,
    ended: Option<bool>,
    muted: Option<bool>,
    track_state: Option<f64>,
    error_code: Option<f64>,
}

fn required_int(value: Option<f64>, field: &'static str) -> Result<i32, PayloadError> {
    let value = value.ok_or(PayloadError::MissingField(field))?;
    if !value.is_finite() {
        return Err(PayloadError::InvalidField {
            field,
            reason: "not a finite number".to_owned(),
        });
    }
    // Saturating float-to-int cast.
    Ok(value as i32)
}

/// Parse a media state payload. `trackState` and `errorCode` are optional.
pub fn parse_media_state(json: &str) -> Result<MediaState, PayloadError> {
    let raw: RawMediaState = serde_json::from_str(json)?;
    let track_state = match raw.track_state {
        None => TrackState::NotReady,
        Some(code) => TrackState::from_code(required_int(Some(code), "trackState")?).ok_or(
            PayloadError::InvalidField {
                field: "trackState",
                reason: format!("unknown track state {code}"),
            },
        )?,
    };
    Ok(MediaState {
        track_index: required_int(raw.track_index, "trackIndex")?,
        track_count: required_int(raw.track_count, "trackCount")?,
        current_time: required_int(raw.current_time, "currentTime")?,
        duration: required_int(raw.duration, "duration")?,
        paused: raw.paused.ok_or(PayloadError::MissingField("paused"))?,
        ended: raw.ended.ok_or(PayloadError::MissingField("ended"))?,
        muted: raw.muted.ok_or(PayloadError::MissingField("muted"))?,
        track_state,
        error_code: match raw.error_code {
            Some(code) => required_int(Some(code), "errorCode")?,
            None => 0,
        },
    })
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawSpeechMark {
    #[serde(rename = "type")]
    kind: Option<String>,
    time: Option<f64>,
    value: Option<String>,
    start: Option<f64>,
    end: Option<f64>,
}

/// Parse an array of speech marks.
pub fn parse_speech_marks(json: &str) -> Result<Vec<SpeechMark>, PayloadError> {
    let raw: Vec<RawSpeechMark> = serde_json::from_str(json)?;
    raw.into_iter()
        .map(|mark| {
            let kind = SpeechMarkKind::parse(
                mark.kind.as_deref().ok_or(PayloadError::MissingField("type"))?,
            );
            let (start, end) = if kind.has_range() {
                (
                    mark.start.ok_or(PayloadError::MissingField("start"))?,
                    mark.end.ok_or(PayloadError::MissingField("end"))?,
                )
            } else {
                (0.0, 0.0)
            };
            Ok(SpeechMark {
                kind,
                time: mark.time.ok_or(PayloadError::MissingField("time"))?,
                value: mark.value.ok_or(PayloadError::MissingField("value"))?,
                start,
                end,
            })
        })
        .collect()
}

/// Parse a host JSON document into an engine value.
pub fn parse_document(json: &str) -> Result<DynamicValue, PayloadError> {
    let value: Value = serde_json::from_str(json)?;
    Ok(to_engine_value(&value))
}

/// Parse a host JSON object into an engine map.
pub fn parse_object(
    json: &str,
) -> Result<std::collections::BTreeMap<String, DynamicValue>, PayloadError> {
    match parse_document(json)? {
        DynamicValue::Map(map) => Ok(map),
        DynamicValue::Null => Ok(Default::default()),
        other => Err(PayloadError::InvalidField {
            field: "data",
            reason: format!("expected an object, got {}", other.kind()),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const KEYBOARD: &str = r#"{"code":"KeyA","key":"a","repeat":false,
        "altKey":false,"ctrlKey":true,"metaKey":false,"shiftKey":false}"#;

    #[test]
    fn keyboard_full_payload() {
        let keyboard = parse_keyboard(KEYBOARD).expect("complete payload");
        assert_eq!(
            keyboard,
            Keyboard {
                code: "KeyA".into(),
                key: "a".into(),
                repeat: false,
                alt: false,
                ctrl: true,
                meta: false,
                shift: false,
            }
        );
    }

    #[test]
    fn keyboard_each_field_required() {
        for field in ["code", "key", "repeat", "altKey", "ctrlKey", "metaKey", "shiftKey"] {
            let mut value: Value = serde_json::from_str(KEYBOARD).unwrap();
            value.as_object_mut().unwrap().remove(field);
            assert_eq!(
                parse_keyboard(&value.to_string()),
                Err(PayloadError::MissingField(field)),
                "field {field}"
            );
        }
    }

    #[test]
    fn keyboard_malformed_json() {
        assert!(matches!(parse_keyboard("{"), Err(PayloadError::Json(_))));
        assert!(matches!(
            parse_keyboard(r#"{"code":1}"#),
            Err(PayloadError::Json(_))
        ));
    }

    #[test]
    fn media_state_optional_fields_default() {
        let state = parse_media_state(
            r#"{"trackIndex":0,"trackCount":1,"currentTime":12.9,"duration":100,
                "paused":true,"ended":false,"muted":false}"#,
        )
        .expect("required fields present");
        assert_eq!(state.current_time, 12);
        assert_eq!(state.track_state, TrackState::NotReady);
        assert_eq!(state.error_code, 0);
    }

    #[test]
    fn media_state_missing_field() {
        assert_eq!(
            parse_media_state(
                r#"{"trackIndex":0,"trackCount":1,"currentTime":0,"duration":0,
                    "paused":true,"ended":false}"#
            ),
            Err(PayloadError::MissingField("muted"))
        );
    }

    #[test]
    fn speech_marks_range_only_for_word_and_ssml() {
        let marks = parse_speech_marks(
            r#"[{"type":"ssml","time":1,"value":"<mark/>","start":3,"end":9},
                {"type":"visime","time":2,"value":"p","start":5,"end":6},
                {"type":"bogus","time":3,"value":"?"}]"#,
        )
        .expect("valid marks");
        assert_eq!((marks[0].start, marks[0].end), (3.0, 9.0));
        assert_eq!(marks[1].kind, SpeechMarkKind::Viseme);
        assert_eq!((marks[1].start, marks[1].end), (0.0, 0.0));
        assert_eq!(marks[2].kind, SpeechMarkKind::Unknown);
    }

    #[test]
    fn speech_marks_word_needs_range() {
        assert_eq!(
            parse_speech_marks(r#"[{"type":"word","time":1,"value":"hi"}]"#),
            Err(PayloadError::MissingField("start"))
        );
    }

    #[test]
    fn object_payloads() {
        assert!(parse_object("null").expect("null is empty").is_empty());
        assert_eq!(
            parse_object(r#"{"a":1}"#).expect("object").get("a"),
            Some(&DynamicValue::Number(1.0))
        );
        assert!(matches!(
            parse_object("[1]"),
            Err(PayloadError::InvalidField { field: "data", .. })
        ));
    }
}
