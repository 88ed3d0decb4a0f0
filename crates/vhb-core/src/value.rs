#![forbid(unsafe_code)]

//! The engine's dynamic value model.
//!
//! [`DynamicValue`] is a closed tagged union: every property the engine
//! exposes to the host is exactly one of these variants. Spatial variants
//! ([`Dimension::Absolute`], [`Rect`], [`Radii`]) are stored in engine units
//! (dp) and only become host pixels through the marshaller.
//!
//! Structured variants carry their own typed records rather than free-form
//! maps, so the set of fields a record can produce is fixed by its kind.

use std::collections::BTreeMap;

use crate::color::Color;
use crate::geometry::{Radii, Rect};

/// Engine-side dynamic value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum DynamicValue {
    #[default]
    Null,
    Number(f64),
    String(String),
    Boolean(bool),
    Color(Color),
    Dimension(Dimension),
    Rect(Rect),
    Radii(Radii),
    Gradient(Gradient),
    MediaSource(MediaSource),
    StyledText(StyledText),
    Filter(Filter),
    GraphicFilter(GraphicFilter),
    GraphicHandle(GraphicHandle),
    Map(BTreeMap<String, DynamicValue>),
    Array(Vec<DynamicValue>),
    Transform2D(Transform2D),
}

impl DynamicValue {
    /// Short, stable name of the active tag (used in logs).
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Boolean(_) => "boolean",
            Self::Color(_) => "color",
            Self::Dimension(_) => "dimension",
            Self::Rect(_) => "rect",
            Self::Radii(_) => "radii",
            Self::Gradient(_) => "gradient",
            Self::MediaSource(_) => "media_source",
            Self::StyledText(_) => "styled_text",
            Self::Filter(_) => "filter",
            Self::GraphicFilter(_) => "graphic_filter",
            Self::GraphicHandle(_) => "graphic",
            Self::Map(_) => "map",
            Self::Array(_) => "array",
            Self::Transform2D(_) => "transform2d",
        }
    }

    #[inline]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Numeric view, if the value is a number.
    pub const fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub const fn as_map(&self) -> Option<&BTreeMap<String, DynamicValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Keyed lookup on a map value; `None` for other tags.
    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.as_map().and_then(|m| m.get(key))
    }
}

impl From<f64> for DynamicValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i32> for DynamicValue {
    fn from(value: i32) -> Self {
        Self::Number(f64::from(value))
    }
}

impl From<bool> for DynamicValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for DynamicValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for DynamicValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<Color> for DynamicValue {
    fn from(value: Color) -> Self {
        Self::Color(value)
    }
}

impl From<Rect> for DynamicValue {
    fn from(value: Rect) -> Self {
        Self::Rect(value)
    }
}

impl From<Radii> for DynamicValue {
    fn from(value: Radii) -> Self {
        Self::Radii(value)
    }
}

impl From<Filter> for DynamicValue {
    fn from(value: Filter) -> Self {
        Self::Filter(value)
    }
}

impl<V: Into<DynamicValue>> FromIterator<(String, V)> for DynamicValue {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        Self::Map(iter.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

impl From<Vec<DynamicValue>> for DynamicValue {
    fn from(value: Vec<DynamicValue>) -> Self {
        Self::Array(value)
    }
}

// ---------------------------------------------------------------------------
// Dimensions
// ---------------------------------------------------------------------------

/// A length as the engine stores it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Dimension {
    /// Absolute length in dp. The only dimension kind the host understands.
    Absolute(f64),
    /// Percentage of the parent, resolved by the engine.
    Relative(f64),
    Auto,
}

impl From<Dimension> for DynamicValue {
    fn from(value: Dimension) -> Self {
        Self::Dimension(value)
    }
}

// ---------------------------------------------------------------------------
// Gradients
// ---------------------------------------------------------------------------

/// How color stops repeat outside `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpreadMethod {
    #[default]
    Pad = 0,
    Reflect = 1,
    Repeat = 2,
}

/// Coordinate space for gradient geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GradientUnits {
    #[default]
    BoundingBox = 0,
    UserSpace = 1,
}

/// Kind-specific geometry of a gradient.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradientGeometry {
    Linear {
        angle: f64,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
    },
    Radial {
        center_x: f64,
        center_y: f64,
        radius: f64,
    },
}

impl GradientGeometry {
    /// Wire type code: linear `0`, radial `1`.
    pub const fn type_code(&self) -> i32 {
        match self {
            Self::Linear { .. } => 0,
            Self::Radial { .. } => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Gradient {
    pub color_range: Vec<Color>,
    pub input_range: Vec<f64>,
    pub spread_method: SpreadMethod,
    pub units: GradientUnits,
    pub geometry: GradientGeometry,
}

impl Gradient {
    /// Two-stop linear gradient from `from` to `to` at `angle` degrees.
    pub fn linear(from: Color, to: Color, angle: f64) -> Self {
        Self {
            color_range: vec![from, to],
            input_range: vec![0.0, 1.0],
            spread_method: SpreadMethod::Pad,
            units: GradientUnits::BoundingBox,
            geometry: GradientGeometry::Linear {
                angle,
                x1: 0.0,
                y1: 0.0,
                x2: 1.0,
                y2: 1.0,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

/// One playable track.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MediaSource {
    pub url: String,
    pub description: String,
    /// Playback duration in ms; `0` plays to the end.
    pub duration: i32,
    pub repeat_count: i32,
    /// Start offset in ms.
    pub offset: i32,
}

// ---------------------------------------------------------------------------
// Styled text
// ---------------------------------------------------------------------------

/// Span kinds, with their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanKind {
    LineBreak = 0,
    Strong = 1,
    Italic = 2,
    Strike = 3,
    Underline = 4,
    Monospace = 5,
    Superscript = 6,
    Subscript = 7,
    NoBreak = 8,
    Span = 9,
}

/// Span attribute names, with their wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanAttributeName {
    Color = 0,
    FontSize = 1,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpanAttribute {
    pub name: SpanAttributeName,
    pub value: DynamicValue,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Span {
    pub kind: SpanKind,
    /// Start offset in characters of the plain text.
    pub start: usize,
    /// End offset (exclusive).
    pub end: usize,
    pub attributes: Vec<SpanAttribute>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct StyledText {
    pub text: String,
    pub spans: Vec<Span>,
}

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Index of an image in a filter chain.
///
/// Non-negative values index the source list; `-1` is the previous filter's
/// output and `-2` the original source.
pub type FilterSource = i32;

pub const FILTER_SOURCE_PREVIOUS: FilterSource = -1;

/// Noise distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoiseKind {
    #[default]
    Gaussian = 0,
    Uniform = 1,
}

/// Image filter, one record shape per kind.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Blend {
        mode: i32,
        source: FilterSource,
        destination: FilterSource,
    },
    Blur {
        radius: Dimension,
        source: FilterSource,
    },
    Color {
        color: Color,
    },
    /// Filter implemented by an extension; never forwarded to the host.
    Extension {
        uri: String,
        name: String,
        source: FilterSource,
        destination: FilterSource,
        params: BTreeMap<String, DynamicValue>,
    },
    Gradient {
        gradient: Gradient,
    },
    Grayscale {
        amount: f64,
        source: FilterSource,
    },
    Noise {
        kind: NoiseKind,
        use_color: bool,
        sigma: f64,
    },
    Saturate {
        amount: f64,
        source: FilterSource,
    },
}

impl Filter {
    /// Wire type code.
    pub const fn type_code(&self) -> i32 {
        match self {
            Self::Blend { .. } => 0,
            Self::Blur { .. } => 1,
            Self::Color { .. } => 2,
            Self::Extension { .. } => 3,
            Self::Gradient { .. } => 4,
            Self::Grayscale { .. } => 5,
            Self::Noise { .. } => 6,
            Self::Saturate { .. } => 7,
        }
    }
}

/// Filter applied to vector graphics.
#[derive(Debug, Clone, PartialEq)]
pub enum GraphicFilter {
    DropShadow {
        color: Color,
        radius: f64,
        horizontal_offset: f64,
        vertical_offset: f64,
    },
}

impl GraphicFilter {
    pub const fn type_code(&self) -> i32 {
        match self {
            Self::DropShadow { .. } => 0,
        }
    }
}

/// Opaque handle to an engine-owned vector graphic.
///
/// The host resolves the handle back to the graphic through a separate
/// channel; only the id crosses the value boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphicHandle {
    pub id: u64,
}

// ---------------------------------------------------------------------------
// Transforms
// ---------------------------------------------------------------------------

/// 2D affine transform `[a, b, c, d, e, f]` in CSS `matrix()` order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform2D(pub [f64; 6]);

impl Transform2D {
    pub const IDENTITY: Self = Self([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub const fn translate(x: f64, y: f64) -> Self {
        Self([1.0, 0.0, 0.0, 1.0, x, y])
    }

    /// CSS `matrix(a,b,c,d,e,f)` with six fractional digits per component.
    pub fn to_css(&self) -> String {
        let [a, b, c, d, e, f] = self.0;
        format!("matrix({a:.6},{b:.6},{c:.6},{d:.6},{e:.6},{f:.6})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_are_stable() {
        assert_eq!(DynamicValue::Null.kind(), "null");
        assert_eq!(DynamicValue::from(1.5).kind(), "number");
        assert_eq!(DynamicValue::from("x").kind(), "string");
        assert_eq!(
            DynamicValue::GraphicHandle(GraphicHandle { id: 3 }).kind(),
            "graphic"
        );
    }

    #[test]
    fn map_lookup() {
        let v: DynamicValue = [("a".to_owned(), 1.0), ("b".to_owned(), 2.0)]
            .into_iter()
            .collect();
        assert_eq!(v.get("b").and_then(DynamicValue::as_number), Some(2.0));
        assert_eq!(v.get("c"), None);
        assert_eq!(DynamicValue::from(true).get("a"), None);
    }

    #[test]
    fn transform_css_uses_six_decimals() {
        assert_eq!(
            Transform2D::translate(10.0, -2.5).to_css(),
            "matrix(1.000000,0.000000,0.000000,1.000000,10.000000,-2.500000)"
        );
    }

    #[test]
    fn filter_type_codes() {
        let blur = Filter::Blur {
            radius: Dimension::Absolute(1.0),
            source: FILTER_SOURCE_PREVIOUS,
        };
        assert_eq!(blur.type_code(), 1);
        assert_eq!(Filter::Color { color: Color::BLACK }.type_code(), 2);
        assert_eq!(
            Filter::Noise {
                kind: NoiseKind::Uniform,
                use_color: false,
                sigma: 1.0
            }
            .type_code(),
            6
        );
    }
}
