#![forbid(unsafe_code)]

//! Text measurement relay.
//!
//! The engine asks for text layouts in dp. The host measures in pixels. The
//! adapter converts the request with the instance's current transform, calls
//! the host hook, and converts every spatial field of the answer back to dp.
//! `lineCount` is a count and is never scaled.

use std::rc::Rc;

use serde::Deserialize;
use serde_json::Value;
use vhb_core::{MetricsTransform, Rect, TransformSlot};

/// How a measured dimension is constrained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureMode {
    Undefined = 0,
    Exactly = 1,
    AtMost = 2,
}

/// Measured text, in dp.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextLayout {
    pub width: f64,
    pub height: f64,
    pub baseline: f64,
    pub line_count: u32,
    pub plain_text: String,
    pub laid_out_text: String,
    pub is_truncated: bool,
    pub texts_by_line: Vec<String>,
    pub rects_by_line: Vec<Rect>,
}

/// Measured edit-text box, in dp.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EditTextBox {
    pub width: f64,
    pub height: f64,
    pub baseline: f64,
}

/// Host measurement hook. Sizes are in host pixels.
pub trait TextMeasureHost {
    fn measure(
        &self,
        component: &str,
        width: f64,
        width_mode: MeasureMode,
        height: f64,
        height_mode: MeasureMode,
    ) -> Value;
}

/// Engine-facing measurement.
pub trait TextMeasure {
    fn layout(
        &self,
        component: &str,
        width: f64,
        width_mode: MeasureMode,
        height: f64,
        height_mode: MeasureMode,
    ) -> TextLayout;

    fn edit_box(
        &self,
        component: &str,
        width: f64,
        width_mode: MeasureMode,
        height: f64,
        height_mode: MeasureMode,
    ) -> EditTextBox;
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawLayout {
    width: f64,
    height: f64,
    baseline: f64,
    line_count: f64,
    plain_text: String,
    laid_out_text: String,
    is_truncated: bool,
    texts_by_line: Vec<Value>,
    rects_by_line: Vec<Value>,
}

/// [`TextMeasure`] over a host hook, converting through the instance slot.
pub struct TextMeasurement {
    host: Rc<dyn TextMeasureHost>,
    slot: Rc<TransformSlot>,
}

impl TextMeasurement {
    pub fn new(host: Rc<dyn TextMeasureHost>, slot: Rc<TransformSlot>) -> Self {
        Self { host, slot }
    }

    fn measure(
        &self,
        transform: &MetricsTransform,
        component: &str,
        width: f64,
        width_mode: MeasureMode,
        height: f64,
        height_mode: MeasureMode,
    ) -> RawLayout {
        let answer = self.host.measure(
            component,
            transform.to_host(width),
            width_mode,
            transform.to_host(height),
            height_mode,
        );
        match serde_json::from_value::<RawLayout>(answer) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::error!(
                    target: "vhb.context",
                    component,
                    error = %err,
                    "unusable text measurement"
                );
                RawLayout::default()
            }
        }
    }
}

impl TextMeasure for TextMeasurement {
    fn layout(
        &self,
        component: &str,
        width: f64,
        width_mode: MeasureMode,
        height: f64,
        height_mode: MeasureMode,
    ) -> TextLayout {
        let transform = self.slot.load();
        let raw = self.measure(&transform, component, width, width_mode, height, height_mode);
        let to_engine = |v: f64| transform.to_engine(v);
        TextLayout {
            width: to_engine(raw.width),
            height: to_engine(raw.height),
            baseline: to_engine(raw.baseline),
            line_count: if raw.line_count.is_finite() && raw.line_count > 0.0 {
                raw.line_count as u32
            } else {
                0
            },
            plain_text: raw.plain_text,
            laid_out_text: raw.laid_out_text,
            is_truncated: raw.is_truncated,
            texts_by_line: raw
                .texts_by_line
                .into_iter()
                .filter_map(|line| match line {
                    Value::String(text) => Some(text),
                    _ => None,
                })
                .collect(),
            rects_by_line: raw
                .rects_by_line
                .iter()
                .filter_map(line_rect)
                .map(|rect| rect.map(to_engine))
                .collect(),
        }
    }

    fn edit_box(
        &self,
        component: &str,
        width: f64,
        width_mode: MeasureMode,
        height: f64,
        height_mode: MeasureMode,
    ) -> EditTextBox {
        let transform = self.slot.load();
        let raw = self.measure(&transform, component, width, width_mode, height, height_mode);
        EditTextBox {
            width: transform.to_engine(raw.width),
            height: transform.to_engine(raw.height),
            baseline: transform.to_engine(raw.baseline),
        }
    }
}

/// `[x, y, w, h]` with four numbers; anything else is skipped.
fn line_rect(value: &Value) -> Option<Rect> {
    let Value::Array(items) = value else {
        return None;
    };
    if items.len() != 4 {
        return None;
    }
    let mut coords = [0.0; 4];
    for (slot, item) in coords.iter_mut().zip(items) {
        *slot = item.as_f64()?;
    }
    Some(Rect::new(coords[0], coords[1], coords[2], coords[3]))
}

impl core::fmt::Debug for TextMeasurement {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TextMeasurement")
            .field("slot", &self.slot)
            .finish()
    }
}
