#![forbid(unsafe_code)]

//! Host metrics, viewport specifications, and the dp ⇄ px transform.
//!
//! The host describes its surface in pixels ([`Metrics`]). The engine lays
//! out in density-independent units (dp, 160 per inch). A
//! [`MetricsTransform`] fixes the conversion between the two for one
//! engine instance, optionally after choosing one of several
//! [`ViewportSpecification`] candidates that rescale the layout viewport.
//!
//! # Conversion
//!
//! ```text
//! to_host(v)   = v * scale_to_host   * dpi / 160
//! to_engine(v) = v * scale_to_engine * 160 / dpi
//! ```
//!
//! `scale_to_engine` is the reciprocal of `scale_to_host`, so the two are
//! inverse up to floating-point rounding.
//!
//! # Choosing a specification
//!
//! For every candidate the physical viewport (in dp) is fitted into the
//! candidate's `[min, max]` bounds with a uniform scale `s` (the smaller of
//! the two per-axis fit factors). The candidate cost is
//!
//! ```text
//! bias * ln(s)^2 + wasted_area_fraction (+ shape / mode penalties)
//! ```
//!
//! and the cheapest candidate wins, earliest first on ties. When
//! `shape_overrides_cost` is set, candidates matching the device shape are
//! preferred outright.
//!
//! A transform is immutable once built. Configuration changes build a new
//! one and swap it into the instance's [`crate::TransformSlot`].

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Size;

/// Density at which 1 dp == 1 px.
pub const REFERENCE_DPI: f64 = 160.0;

const DEFAULT_SPEC_MIN: f64 = 1.0;
const DEFAULT_SPEC_MAX: f64 = i32::MAX as f64;
const SHAPE_MISMATCH_PENALTY: f64 = 1.0;
const MODE_MISMATCH_PENALTY: f64 = 0.5;

/// Physical screen shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScreenShape {
    #[default]
    Rectangle,
    Round,
}

impl ScreenShape {
    #[inline]
    pub const fn is_round(self) -> bool {
        matches!(self, Self::Round)
    }
}

/// Device class the document is laid out for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ViewportMode {
    Auto,
    #[default]
    Hub,
    Mobile,
    Pc,
    Tv,
}

impl ViewportMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Hub => "HUB",
            Self::Mobile => "MOBILE",
            Self::Pc => "PC",
            Self::Tv => "TV",
        }
    }

    /// Parse the host's mode name. Unknown names yield `None`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "AUTO" => Some(Self::Auto),
            "HUB" => Some(Self::Hub),
            "MOBILE" => Some(Self::Mobile),
            "PC" => Some(Self::Pc),
            "TV" => Some(Self::Tv),
            _ => None,
        }
    }
}

impl fmt::Display for ViewportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Metrics
// ---------------------------------------------------------------------------

/// Host surface description, in host pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Metrics {
    pub width: f64,
    pub height: f64,
    /// Autosizing bounds. Autosizing is on when a min differs from its max.
    pub min_width: Option<f64>,
    pub max_width: Option<f64>,
    pub min_height: Option<f64>,
    pub max_height: Option<f64>,
    pub dpi: f64,
    pub shape: ScreenShape,
    pub mode: ViewportMode,
    pub theme: String,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            width: 1024.0,
            height: 800.0,
            min_width: None,
            max_width: None,
            min_height: None,
            max_height: None,
            dpi: REFERENCE_DPI,
            shape: ScreenShape::Rectangle,
            mode: ViewportMode::Hub,
            theme: "dark".to_owned(),
        }
    }
}

impl Metrics {
    /// Metrics of a `width` x `height` px surface at `dpi`.
    pub fn new(width: f64, height: f64, dpi: f64) -> Self {
        Self {
            width,
            height,
            dpi,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_shape(mut self, shape: ScreenShape) -> Self {
        self.shape = shape;
        self
    }

    #[must_use]
    pub fn with_mode(mut self, mode: ViewportMode) -> Self {
        self.mode = mode;
        self
    }

    /// Parse the host's JSON description. Invalid DPI falls back to 160.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let mut metrics: Self = serde_json::from_str(json)?;
        metrics.dpi = metrics.effective_dpi();
        Ok(metrics)
    }

    /// DPI usable as a divisor.
    #[inline]
    pub fn effective_dpi(&self) -> f64 {
        if self.dpi.is_finite() && self.dpi > 0.0 {
            self.dpi
        } else {
            REFERENCE_DPI
        }
    }

    /// True when the surface grows with its content on either axis.
    #[inline]
    pub fn is_autosizing(&self) -> bool {
        self.min_width != self.max_width || self.min_height != self.max_height
    }

    /// Physical surface size in dp.
    pub fn physical_dp(&self) -> Size {
        let factor = REFERENCE_DPI / self.effective_dpi();
        Size::new(self.width * factor, self.height * factor)
    }
}

// ---------------------------------------------------------------------------
// Viewport specifications
// ---------------------------------------------------------------------------

/// One candidate layout viewport, bounds in dp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportSpecification {
    pub min_width: f64,
    pub max_width: f64,
    pub min_height: f64,
    pub max_height: f64,
    pub mode: ViewportMode,
    pub is_round: bool,
}

impl ViewportSpecification {
    pub fn new(
        min_width: f64,
        max_width: f64,
        min_height: f64,
        max_height: f64,
        mode: ViewportMode,
        is_round: bool,
    ) -> Self {
        Self {
            min_width,
            max_width,
            min_height,
            max_height,
            mode,
            is_round,
        }
    }

    /// Fixed-size candidate.
    pub fn fixed(width: f64, height: f64, mode: ViewportMode, is_round: bool) -> Self {
        Self::new(width, width, height, height, mode, is_round)
    }
}

impl fmt::Display for ViewportSpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ViewportSpecification<w={}..{} h={}..{} mode={} round={}>",
            self.min_width,
            self.max_width,
            self.min_height,
            self.max_height,
            self.mode,
            self.is_round
        )
    }
}

/// Host wire form of a specification; every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawSpecification {
    min_width: Option<f64>,
    max_width: Option<f64>,
    min_height: Option<f64>,
    max_height: Option<f64>,
    mode: Option<String>,
    round: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawScalingOptions {
    bias_constant: f64,
    specifications: Vec<RawSpecification>,
    shape_overrides_cost: Option<bool>,
}

/// Ordered candidate list for one scaling session.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalingOptions {
    pub specifications: Vec<ViewportSpecification>,
    pub bias_constant: f64,
    pub shape_overrides_cost: bool,
}

impl Default for ScalingOptions {
    fn default() -> Self {
        Self {
            specifications: Vec::new(),
            bias_constant: 0.0,
            shape_overrides_cost: true,
        }
    }
}

impl ScalingOptions {
    pub fn new(specifications: Vec<ViewportSpecification>, bias_constant: f64) -> Self {
        Self {
            specifications,
            bias_constant,
            shape_overrides_cost: true,
        }
    }

    /// Parse the host's scaling options.
    ///
    /// Missing bounds default to `1` / `i32::MAX`, unknown or missing modes to
    /// `HUB`, and roundness to the device's own shape.
    pub fn from_json(json: &str, device: &Metrics) -> Result<Self, serde_json::Error> {
        let raw: RawScalingOptions = serde_json::from_str(json)?;
        let device_round = device.shape.is_round();
        let specifications = raw
            .specifications
            .into_iter()
            .map(|spec| {
                ViewportSpecification::new(
                    spec.min_width.unwrap_or(DEFAULT_SPEC_MIN),
                    spec.max_width.unwrap_or(DEFAULT_SPEC_MAX),
                    spec.min_height.unwrap_or(DEFAULT_SPEC_MIN),
                    spec.max_height.unwrap_or(DEFAULT_SPEC_MAX),
                    spec.mode
                        .as_deref()
                        .and_then(ViewportMode::parse)
                        .unwrap_or(ViewportMode::Hub),
                    spec.round.unwrap_or(device_round),
                )
            })
            .collect();
        Ok(Self {
            specifications,
            bias_constant: raw.bias_constant,
            shape_overrides_cost: raw.shape_overrides_cost.unwrap_or(true),
        })
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.specifications.is_empty()
    }

    /// Remove the first candidate equal to `spec`. Returns whether one was found.
    pub fn remove(&mut self, spec: &ViewportSpecification) -> bool {
        match self.specifications.iter().position(|s| s == spec) {
            Some(index) => {
                self.specifications.remove(index);
                true
            }
            None => false,
        }
    }
}

// ---------------------------------------------------------------------------
// Transform
// ---------------------------------------------------------------------------

/// What the engine is told about its layout surface, in dp.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineMetrics {
    pub width: f64,
    pub height: f64,
    /// Autosizing bounds in dp, when the host requested autosizing.
    pub min_width: Option<f64>,
    pub max_width: Option<f64>,
    pub min_height: Option<f64>,
    pub max_height: Option<f64>,
    pub dpi: f64,
    pub shape: ScreenShape,
    pub mode: ViewportMode,
    pub theme: String,
}

/// Immutable dp ⇄ px converter for one engine instance.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsTransform {
    metrics: Metrics,
    scale_to_host: f64,
    scale_to_engine: f64,
    dpi: f64,
    chosen: Option<ViewportSpecification>,
    engine_viewport: Size,
}

#[derive(Debug, Clone, Copy)]
struct Fit {
    scale: f64,
    viewport: Size,
    cost: f64,
}

impl MetricsTransform {
    /// Unscaled transform: one engine dp is one physical dp.
    pub fn new(metrics: &Metrics) -> Self {
        let dpi = metrics.effective_dpi();
        Self {
            metrics: Metrics {
                dpi,
                ..metrics.clone()
            },
            scale_to_host: 1.0,
            scale_to_engine: 1.0,
            dpi,
            chosen: None,
            engine_viewport: metrics.physical_dp(),
        }
    }

    /// Transform scaled to the cheapest candidate in `options`.
    ///
    /// With no candidates this is the same as [`MetricsTransform::new`].
    pub fn with_scaling(metrics: &Metrics, options: &ScalingOptions) -> Self {
        let base = Self::new(metrics);
        let Some((spec, fit)) = choose_specification(metrics, options) else {
            return base;
        };
        tracing::debug!(
            target: "vhb.metrics",
            spec = %spec,
            scale = fit.scale,
            cost = fit.cost,
            "viewport specification chosen"
        );
        Self {
            scale_to_host: fit.scale,
            scale_to_engine: 1.0 / fit.scale,
            chosen: Some(spec.clone()),
            engine_viewport: fit.viewport,
            ..base
        }
    }

    /// Engine dp → host px.
    #[inline]
    pub fn to_host(&self, value: f64) -> f64 {
        value * self.scale_to_host * self.dpi / REFERENCE_DPI
    }

    /// Host px → engine dp.
    #[inline]
    pub fn to_engine(&self, value: f64) -> f64 {
        value * self.scale_to_engine * REFERENCE_DPI / self.dpi
    }

    /// Host px → engine px (scale only, no density change).
    #[inline]
    pub fn to_engine_pixel(&self, value: f64) -> f64 {
        value * self.scale_to_engine
    }

    /// Host surface size in px.
    #[inline]
    pub fn host_viewport_size(&self) -> (f64, f64) {
        (self.metrics.width, self.metrics.height)
    }

    /// Layout viewport size in engine dp.
    #[inline]
    pub fn engine_viewport_size(&self) -> Size {
        self.engine_viewport
    }

    #[inline]
    pub fn scale_to_host(&self) -> f64 {
        self.scale_to_host
    }

    #[inline]
    pub fn scale_to_engine(&self) -> f64 {
        self.scale_to_engine
    }

    #[inline]
    pub fn dpi(&self) -> f64 {
        self.dpi
    }

    /// Candidate this transform was scaled to, if any.
    #[inline]
    pub fn chosen_specification(&self) -> Option<&ViewportSpecification> {
        self.chosen.as_ref()
    }

    #[inline]
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Metrics handed to the engine when inflating a root.
    pub fn engine_metrics(&self) -> EngineMetrics {
        let px_to_dp = |v: Option<f64>| v.map(|v| self.to_engine(v));
        let autosizing = self.metrics.is_autosizing();
        EngineMetrics {
            width: self.engine_viewport.width,
            height: self.engine_viewport.height,
            min_width: autosizing.then(|| px_to_dp(self.metrics.min_width)).flatten(),
            max_width: autosizing.then(|| px_to_dp(self.metrics.max_width)).flatten(),
            min_height: autosizing.then(|| px_to_dp(self.metrics.min_height)).flatten(),
            max_height: autosizing.then(|| px_to_dp(self.metrics.max_height)).flatten(),
            dpi: self.dpi,
            shape: self.metrics.shape,
            mode: self
                .chosen
                .as_ref()
                .map_or(self.metrics.mode, |spec| spec.mode),
            theme: self.metrics.theme.clone(),
        }
    }
}

fn fit_factor(value: f64, min: f64, max: f64) -> f64 {
    if value < min {
        value / min
    } else if value > max {
        value / max
    } else {
        1.0
    }
}

fn fit_specification(physical: Size, spec: &ViewportSpecification, bias: f64) -> Fit {
    let sx = fit_factor(physical.width, spec.min_width, spec.max_width);
    let sy = fit_factor(physical.height, spec.min_height, spec.max_height);
    let mut scale = sx.min(sy);
    if !scale.is_finite() || scale <= 0.0 {
        scale = 1.0;
    }
    let width = (physical.width / scale).clamp(spec.min_width, spec.max_width.max(spec.min_width));
    let height =
        (physical.height / scale).clamp(spec.min_height, spec.max_height.max(spec.min_height));
    let physical_area = physical.area();
    let wasted = if physical_area > 0.0 {
        (1.0 - (width * scale * height * scale) / physical_area).clamp(0.0, 1.0)
    } else {
        0.0
    };
    Fit {
        scale,
        viewport: Size::new(width, height),
        cost: bias * scale.ln().powi(2) + wasted,
    }
}

fn choose_specification<'a>(
    metrics: &Metrics,
    options: &'a ScalingOptions,
) -> Option<(&'a ViewportSpecification, Fit)> {
    let physical = metrics.physical_dp();
    let device_round = metrics.shape.is_round();
    let shape_matches = |spec: &ViewportSpecification| spec.is_round == device_round;
    let restrict_to_shape =
        options.shape_overrides_cost && options.specifications.iter().any(shape_matches);

    let mut best: Option<(&ViewportSpecification, Fit)> = None;
    for spec in &options.specifications {
        if restrict_to_shape && !shape_matches(spec) {
            continue;
        }
        let mut fit = fit_specification(physical, spec, options.bias_constant);
        if !options.shape_overrides_cost && !shape_matches(spec) {
            fit.cost += SHAPE_MISMATCH_PENALTY;
        }
        if metrics.mode != ViewportMode::Auto && spec.mode != metrics.mode {
            fit.cost += MODE_MISMATCH_PENALTY;
        }
        if best.is_none_or(|(_, current)| fit.cost < current.cost) {
            best = Some((spec, fit));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9 * a.abs().max(b.abs()).max(1.0)
    }

    #[test]
    fn unscaled_transform_uses_density() {
        let t = MetricsTransform::new(&Metrics::new(1280.0, 800.0, 320.0));
        assert!(approx(t.to_host(10.0), 20.0));
        assert!(approx(t.to_engine(20.0), 10.0));
        assert_eq!(t.host_viewport_size(), (1280.0, 800.0));
        assert_eq!(t.engine_viewport_size(), Size::new(640.0, 400.0));
        assert!(t.chosen_specification().is_none());
    }

    #[test]
    fn invalid_dpi_falls_back_to_reference() {
        let m = Metrics::from_json(r#"{"width":100,"height":100,"dpi":0}"#).unwrap();
        assert_eq!(m.dpi, REFERENCE_DPI);
        let t = MetricsTransform::new(&Metrics::new(100.0, 100.0, f64::NAN));
        assert_eq!(t.dpi(), REFERENCE_DPI);
    }

    #[test]
    fn metrics_json_uses_camel_case_and_defaults() {
        let m = Metrics::from_json(
            r#"{"width":960,"height":480,"dpi":160,"shape":"ROUND","mode":"TV","minWidth":100,"maxWidth":900}"#,
        )
        .unwrap();
        assert_eq!(m.shape, ScreenShape::Round);
        assert_eq!(m.mode, ViewportMode::Tv);
        assert_eq!(m.theme, "dark");
        assert!(m.is_autosizing());
        assert!(!Metrics::default().is_autosizing());
    }

    #[test]
    fn scaling_options_defaults() {
        let device = Metrics::default().with_shape(ScreenShape::Round);
        let options = ScalingOptions::from_json(
            r#"{"biasConstant":10,"specifications":[{"minWidth":400,"mode":"nope"},{"maxHeight":300,"mode":"TV","round":false}]}"#,
            &device,
        )
        .unwrap();
        assert!(options.shape_overrides_cost);
        assert_eq!(options.bias_constant, 10.0);
        assert_eq!(
            options.specifications[0],
            ViewportSpecification::new(
                400.0,
                i32::MAX as f64,
                1.0,
                i32::MAX as f64,
                ViewportMode::Hub,
                true
            )
        );
        assert_eq!(options.specifications[1].mode, ViewportMode::Tv);
        assert!(!options.specifications[1].is_round);
    }

    #[test]
    fn fixed_spec_scales_viewport() {
        // 1920x1080 px at 160 dpi, laid out as 960x540 dp.
        let metrics = Metrics::new(1920.0, 1080.0, 160.0);
        let options = ScalingOptions::new(
            vec![ViewportSpecification::fixed(
                960.0,
                540.0,
                ViewportMode::Hub,
                false,
            )],
            10.0,
        );
        let t = MetricsTransform::with_scaling(&metrics, &options);
        assert!(approx(t.scale_to_host(), 2.0));
        assert!(approx(t.to_host(1.0), 2.0));
        assert!(approx(t.to_engine(2.0), 1.0));
        assert!(approx(t.to_engine_pixel(1920.0), 960.0));
        assert_eq!(t.engine_viewport_size(), Size::new(960.0, 540.0));
        assert_eq!(t.engine_metrics().width, 960.0);
        assert_eq!(t.chosen_specification(), options.specifications.first());
    }

    #[test]
    fn shape_override_prefers_matching_shape() {
        let metrics = Metrics::new(480.0, 480.0, 160.0).with_shape(ScreenShape::Round);
        let rect = ViewportSpecification::fixed(480.0, 480.0, ViewportMode::Hub, false);
        let round = ViewportSpecification::fixed(240.0, 240.0, ViewportMode::Hub, true);
        let options = ScalingOptions::new(vec![rect.clone(), round.clone()], 1.0);
        let t = MetricsTransform::with_scaling(&metrics, &options);
        assert_eq!(t.chosen_specification(), Some(&round));

        let costed = ScalingOptions {
            shape_overrides_cost: false,
            ..options
        };
        let t = MetricsTransform::with_scaling(&metrics, &costed);
        // ln(2)^2 scaling cost stays below the shape mismatch penalty.
        assert_eq!(t.chosen_specification(), Some(&round));
    }

    #[test]
    fn ties_go_to_earliest_candidate() {
        let metrics = Metrics::new(800.0, 600.0, 160.0);
        let a = ViewportSpecification::new(1.0, 2000.0, 1.0, 2000.0, ViewportMode::Hub, false);
        let b = a.clone();
        let options = ScalingOptions::new(vec![a, b], 5.0);
        let t = MetricsTransform::with_scaling(&metrics, &options);
        assert!(approx(t.scale_to_host(), 1.0));
        assert_eq!(t.chosen_specification(), options.specifications.first());
    }

    #[test]
    fn remove_reports_missing() {
        let a = ViewportSpecification::fixed(1.0, 1.0, ViewportMode::Hub, false);
        let b = ViewportSpecification::fixed(2.0, 2.0, ViewportMode::Hub, false);
        let mut options = ScalingOptions::new(vec![a.clone()], 0.0);
        assert!(!options.remove(&b));
        assert!(options.remove(&a));
        assert!(options.is_empty());
    }
}
