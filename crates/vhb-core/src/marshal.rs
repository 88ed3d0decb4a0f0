#![forbid(unsafe_code)]

//! Conversion between engine [`DynamicValue`]s and host JSON values.
//!
//! # Forward: [`to_host_value`]
//!
//! One recursive dispatch on the value's tag. Spatial quantities go through
//! the supplied [`MetricsTransform`]; when no transform is supplied they pass
//! through unscaled (settings objects are marshalled before any viewport
//! exists). Structured records emit a fixed key set per kind.
//!
//! Values with no host form (relative or auto dimensions, extension filters)
//! yield `None`. Callers omit the property; inside arrays the slot becomes
//! `null` so indices are preserved.
//!
//! # Reverse: [`to_engine_value`]
//!
//! Classifies by runtime shape only and never converts units. Anything the
//! host sends in pixels must be converted before submission.

use serde_json::{Map, Number, Value, json};

use crate::metrics::MetricsTransform;
use crate::value::{
    Dimension, DynamicValue, Filter, Gradient, GradientGeometry, GraphicFilter, MediaSource,
    StyledText,
};

/// Convert an engine value to its host form.
///
/// Returns `None` when the value has no host representation.
pub fn to_host_value(value: &DynamicValue, transform: Option<&MetricsTransform>) -> Option<Value> {
    let scale = |v: f64| transform.map_or(v, |t| t.to_host(v));
    let host = match value {
        DynamicValue::Null => Value::Null,
        DynamicValue::Number(n) => number(*n),
        DynamicValue::String(s) => Value::String(s.clone()),
        DynamicValue::Boolean(b) => Value::Bool(*b),
        DynamicValue::Color(c) => Value::from(c.packed()),
        DynamicValue::Dimension(d) => return dimension(*d, transform),
        DynamicValue::Rect(r) => {
            let r = r.map(scale);
            json!({
                "x": number(r.x),
                "y": number(r.y),
                "width": number(r.width),
                "height": number(r.height),
            })
        }
        DynamicValue::Radii(r) => {
            let r = r.map(scale);
            json!({
                "topLeft": number(r.top_left),
                "topRight": number(r.top_right),
                "bottomLeft": number(r.bottom_left),
                "bottomRight": number(r.bottom_right),
            })
        }
        DynamicValue::Gradient(g) => gradient(g),
        DynamicValue::MediaSource(m) => media_source(m),
        DynamicValue::StyledText(s) => styled_text(s, transform),
        DynamicValue::Filter(f) => return filter(f, transform),
        DynamicValue::GraphicFilter(f) => graphic_filter(f),
        DynamicValue::GraphicHandle(h) => json!({ "graphicId": h.id }),
        DynamicValue::Map(map) => {
            let mut out = Map::new();
            for (key, entry) in map {
                if let Some(host) = to_host_value(entry, transform) {
                    out.insert(key.clone(), host);
                }
            }
            Value::Object(out)
        }
        DynamicValue::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| to_host_value(item, transform).unwrap_or(Value::Null))
                .collect(),
        ),
        DynamicValue::Transform2D(t) => Value::String(t.to_css()),
    };
    Some(host)
}

/// Convert a host value to an engine value by runtime shape.
pub fn to_engine_value(value: &Value) -> DynamicValue {
    match value {
        Value::Bool(b) => DynamicValue::Boolean(*b),
        Value::String(s) => DynamicValue::String(s.clone()),
        Value::Number(n) => n.as_f64().map_or(DynamicValue::Null, DynamicValue::Number),
        Value::Array(items) => DynamicValue::Array(items.iter().map(to_engine_value).collect()),
        Value::Object(map) => DynamicValue::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), to_engine_value(v)))
                .collect(),
        ),
        Value::Null => DynamicValue::Null,
    }
}

/// Marshal a property set, skipping properties with no host form.
pub fn properties_to_host<'a, K, I>(
    properties: I,
    transform: Option<&MetricsTransform>,
) -> Map<String, Value>
where
    K: ToString,
    I: IntoIterator<Item = (K, &'a DynamicValue)>,
{
    let mut out = Map::new();
    for (key, value) in properties {
        match to_host_value(value, transform) {
            Some(host) => {
                out.insert(key.to_string(), host);
            }
            None => tracing::trace!(
                target: "vhb.marshal",
                kind = value.kind(),
                "property has no host form, omitted"
            ),
        }
    }
    out
}

fn number(n: f64) -> Value {
    Number::from_f64(n).map_or(Value::Null, Value::Number)
}

fn dimension(d: Dimension, transform: Option<&MetricsTransform>) -> Option<Value> {
    match d {
        Dimension::Absolute(v) => Some(number(transform.map_or(v, |t| t.to_host(v)))),
        Dimension::Relative(_) | Dimension::Auto => None,
    }
}

fn gradient(g: &Gradient) -> Value {
    let mut out = Map::new();
    out.insert("type".into(), Value::from(g.geometry.type_code()));
    out.insert(
        "colorRange".into(),
        g.color_range.iter().map(|c| Value::from(c.packed())).collect(),
    );
    out.insert(
        "inputRange".into(),
        g.input_range.iter().map(|v| number(*v)).collect(),
    );
    out.insert("spreadMethod".into(), Value::from(g.spread_method as i32));
    out.insert("units".into(), Value::from(g.units as i32));
    match g.geometry {
        GradientGeometry::Linear {
            angle,
            x1,
            y1,
            x2,
            y2,
        } => {
            out.insert("angle".into(), number(angle));
            out.insert("x1".into(), number(x1));
            out.insert("y1".into(), number(y1));
            out.insert("x2".into(), number(x2));
            out.insert("y2".into(), number(y2));
        }
        GradientGeometry::Radial {
            center_x,
            center_y,
            radius,
        } => {
            out.insert("centerX".into(), number(center_x));
            out.insert("centerY".into(), number(center_y));
            out.insert("radius".into(), number(radius));
        }
    }
    Value::Object(out)
}

fn media_source(m: &MediaSource) -> Value {
    json!({
        "url": m.url,
        "description": m.description,
        "duration": m.duration,
        "repeatCount": m.repeat_count,
        "offset": m.offset,
    })
}

fn styled_text(s: &StyledText, transform: Option<&MetricsTransform>) -> Value {
    let spans: Vec<Value> = s
        .spans
        .iter()
        .map(|span| {
            let attributes: Vec<Value> = span
                .attributes
                .iter()
                .map(|attr| {
                    json!({
                        "name": attr.name as i32,
                        "value": to_host_value(&attr.value, transform).unwrap_or(Value::Null),
                    })
                })
                .collect();
            json!({
                "type": span.kind as i32,
                "start": span.start,
                "end": span.end,
                "attributes": attributes,
            })
        })
        .collect();
    json!({ "text": s.text, "spans": spans })
}

fn filter(f: &Filter, transform: Option<&MetricsTransform>) -> Option<Value> {
    let mut out = Map::new();
    out.insert("type".into(), Value::from(f.type_code()));
    match f {
        Filter::Blend {
            mode,
            source,
            destination,
        } => {
            out.insert("mode".into(), Value::from(*mode));
            out.insert("source".into(), Value::from(*source));
            out.insert("destination".into(), Value::from(*destination));
        }
        Filter::Blur { radius, source } => {
            out.insert(
                "radius".into(),
                dimension(*radius, transform).unwrap_or(Value::Null),
            );
            out.insert("source".into(), Value::from(*source));
        }
        Filter::Color { color } => {
            out.insert("color".into(), Value::from(color.packed()));
        }
        Filter::Gradient { gradient: g } => {
            out.insert("gradient".into(), gradient(g));
        }
        Filter::Grayscale { amount, source } | Filter::Saturate { amount, source } => {
            out.insert("amount".into(), number(*amount));
            out.insert("source".into(), Value::from(*source));
        }
        Filter::Noise {
            kind,
            use_color,
            sigma,
        } => {
            out.insert("sigma".into(), number(*sigma));
            out.insert("useColor".into(), Value::Bool(*use_color));
            out.insert("kind".into(), Value::from(*kind as i32));
        }
        Filter::Extension { uri, name, .. } => {
            tracing::trace!(
                target: "vhb.marshal",
                uri = %uri,
                name = %name,
                "extension filter has no host form"
            );
            return None;
        }
    }
    Some(Value::Object(out))
}

fn graphic_filter(f: &GraphicFilter) -> Value {
    match f {
        GraphicFilter::DropShadow {
            color,
            radius,
            horizontal_offset,
            vertical_offset,
        } => json!({
            "type": f.type_code(),
            "color": color.packed(),
            "radius": number(*radius),
            "horizontalOffset": number(*horizontal_offset),
            "verticalOffset": number(*vertical_offset),
        }),
    }
}
