#![forbid(unsafe_code)]

//! Host entry points for one engine instance.
//!
//! A [`BridgeContext`] owns an inflated root, the instance's transform slot
//! and its document background. Every spatial value the host passes in is
//! in pixels and is converted to dp with the transform current at call
//! time; every value handed back is converted the other way.
//!
//! # Failure handling
//!
//! Malformed host payloads are logged at `error` and reported as `false`,
//! `None`, or a terminated handle. Nothing here panics.

use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;

use serde_json::{Map, Value};
use vhb_core::{
    Color, DynamicValue, Metrics, MetricsTransform, Point, Rect, ScalingOptions, Size,
    TransformSlot, properties_to_host, to_host_value,
};

use crate::config::{ConfigurationChange, RootConfig};
use crate::documents::DocumentHandle;
use crate::engine::{
    ComponentId, DisplayState, Engine, FocusDirection, KeyHandlerType, PointerEvent,
    PointerEventType, PointerType, RootContext, ScrollAlign,
};
use crate::error::CreateError;
use crate::event::BridgeEvent;
use crate::input;
use crate::resolution::ResolutionHandle;
use crate::text::{TextMeasureHost, TextMeasurement};
use crate::viewport::ViewportResolver;

/// Document background, per instance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Background {
    pub color: Color,
    /// Gradient in host form, when the document declares one.
    pub gradient: Option<Value>,
}

impl Background {
    /// `{"color": <rgba>, "gradient": <object|null>}`.
    pub fn to_host(&self) -> Value {
        let mut out = Map::new();
        out.insert("color".into(), Value::from(self.color.packed()));
        out.insert(
            "gradient".into(),
            self.gradient.clone().unwrap_or(Value::Null),
        );
        Value::Object(out)
    }
}

/// One engine instance as the host drives it.
pub struct BridgeContext<E: Engine> {
    root: E::Root,
    slot: Rc<TransformSlot>,
    background: Background,
    config: RootConfig,
    attempts: usize,
}

impl<E: Engine> BridgeContext<E> {
    /// Inflate `content`, retrying across `scaling` candidates.
    ///
    /// When `text` is given, a [`TextMeasurement`] bound to this instance's
    /// slot is installed as the root's text service.
    pub fn create(
        engine: &E,
        metrics: &Metrics,
        config: RootConfig,
        content: &E::Content,
        scaling: Option<ScalingOptions>,
        text: Option<Rc<dyn TextMeasureHost>>,
    ) -> Result<Self, CreateError> {
        Self::create_with(
            &ViewportResolver::new(),
            engine,
            metrics,
            config,
            content,
            scaling,
            text,
        )
    }

    /// [`BridgeContext::create`] with an explicit resolver.
    pub fn create_with(
        resolver: &ViewportResolver,
        engine: &E,
        metrics: &Metrics,
        mut config: RootConfig,
        content: &E::Content,
        scaling: Option<ScalingOptions>,
        text: Option<Rc<dyn TextMeasureHost>>,
    ) -> Result<Self, CreateError> {
        let slot = Rc::new(TransformSlot::new(MetricsTransform::new(metrics)));
        if let Some(host) = text {
            config.services.text = Some(Rc::new(TextMeasurement::new(host, Rc::clone(&slot))));
        }

        let resolved = resolver
            .resolve(metrics, scaling, |transform| {
                slot.swap(transform.clone());
                engine.inflate(&transform.engine_metrics(), content, &config)
            })
            .inspect_err(|err| {
                tracing::error!(
                    target: "vhb.context",
                    code = err.code(),
                    error = %err,
                    "cannot create root context"
                );
            })?;

        let engine_metrics = resolved.transform.engine_metrics();
        let background = match engine.background(content, &engine_metrics, &config) {
            Some(DynamicValue::Color(color)) => Background {
                color,
                gradient: None,
            },
            Some(gradient @ DynamicValue::Gradient(_)) => Background {
                color: Color::TRANSPARENT,
                gradient: to_host_value(&gradient, Some(&resolved.transform)),
            },
            _ => Background::default(),
        };

        tracing::debug!(
            target: "vhb.context",
            attempts = resolved.attempts,
            width = engine_metrics.width,
            height = engine_metrics.height,
            "root context created"
        );
        Ok(Self {
            root: resolved.value,
            slot,
            background,
            config,
            attempts: resolved.attempts,
        })
    }

    /// Current transform snapshot.
    pub fn transform(&self) -> Arc<MetricsTransform> {
        self.slot.load()
    }

    pub fn slot(&self) -> &Rc<TransformSlot> {
        &self.slot
    }

    pub fn config(&self) -> &RootConfig {
        &self.config
    }

    /// Inflation attempts the resolver needed.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn root(&self) -> &E::Root {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut E::Root {
        &mut self.root
    }

    // -- events and dirty state ---------------------------------------------

    pub fn has_event(&self) -> bool {
        self.root.has_event()
    }

    pub fn pop_event(&mut self) -> Option<BridgeEvent> {
        let event = self.root.pop_event()?;
        Some(BridgeEvent::new(event, Rc::clone(&self.slot)))
    }

    pub fn is_dirty(&self) -> bool {
        self.root.is_dirty()
    }

    pub fn dirty(&self) -> Vec<ComponentId> {
        self.root.dirty()
    }

    pub fn clear_dirty(&mut self) {
        self.root.clear_dirty();
    }

    // -- components ----------------------------------------------------------

    /// All host-representable properties of `component`, keyed by decimal
    /// property key.
    pub fn component_properties(&self, component: &str) -> Option<Map<String, Value>> {
        let properties = self.root.component_properties(component)?;
        Some(properties_to_host(&properties, Some(&self.slot.load())))
    }

    /// Properties changed since the last `clear_dirty`.
    pub fn dirty_properties(&self, component: &str) -> Option<Map<String, Value>> {
        let properties = self.root.dirty_properties(component)?;
        Some(properties_to_host(&properties, Some(&self.slot.load())))
    }

    pub fn update_component(&mut self, component: &str, update_type: i32, value_json: &str) -> bool {
        match input::parse_document(value_json) {
            Ok(value) => self.root.update_component(component, update_type, value),
            Err(err) => {
                tracing::error!(
                    target: "vhb.context",
                    component,
                    error = %err,
                    "unparseable component update"
                );
                false
            }
        }
    }

    /// Scroll `component` so the host-pixel rectangle is visible.
    pub fn scroll_to_rect(
        &mut self,
        component: &str,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        align: i32,
    ) -> bool {
        let Some(align) = ScrollAlign::from_code(align) else {
            tracing::error!(target: "vhb.context", align, "unknown scroll alignment");
            return false;
        };
        let rect = self.rect_to_engine(x, y, width, height);
        self.root.scroll_to_rect(component, rect, align);
        true
    }

    // -- commands ------------------------------------------------------------

    /// Run a JSON command batch. The parsed batch stays alive until the
    /// returned handle first reaches a terminal state.
    pub fn execute_commands(&mut self, commands_json: &str, fast_mode: bool) -> ResolutionHandle {
        let commands = match input::parse_document(commands_json) {
            Ok(commands) => commands,
            Err(err) => {
                tracing::error!(target: "vhb.context", error = %err, "unparseable command batch");
                return ResolutionHandle::terminated();
            }
        };
        let action = self.root.execute_commands(&commands, fast_mode);
        action.attach_side_data(commands);
        action
    }

    /// Run a JSON command batch in a nested document.
    pub fn execute_document_commands(
        &mut self,
        document: DocumentHandle,
        commands_json: &str,
    ) -> Option<ResolutionHandle> {
        let commands = match input::parse_document(commands_json) {
            Ok(commands) => commands,
            Err(err) => {
                tracing::error!(
                    target: "vhb.context",
                    document = document.0,
                    error = %err,
                    "unparseable document command batch"
                );
                return None;
            }
        };
        let action = self.root.execute_document_commands(document, &commands)?;
        action.attach_side_data(commands);
        Some(action)
    }

    pub fn invoke_extension_event_handler(
        &mut self,
        uri: &str,
        name: &str,
        data_json: &str,
        fast_mode: bool,
    ) -> ResolutionHandle {
        let data = match input::parse_object(data_json) {
            Ok(data) => data,
            Err(err) => {
                tracing::error!(
                    target: "vhb.context",
                    uri,
                    name,
                    error = %err,
                    "unparseable extension event data"
                );
                return ResolutionHandle::terminated();
            }
        };
        let action = self
            .root
            .invoke_extension_event_handler(uri, name, &data, fast_mode);
        action.attach_side_data(data);
        action
    }

    pub fn cancel_execution(&mut self) {
        self.root.cancel_execution();
    }

    // -- time ----------------------------------------------------------------

    pub fn update_time(&mut self, elapsed_ms: f64, utc_ms: f64) {
        self.root.update_time(elapsed_ms, utc_ms);
    }

    pub fn current_time(&self) -> f64 {
        self.root.current_time()
    }

    pub fn next_time(&self) -> f64 {
        self.root.next_time()
    }

    pub fn set_local_time_adjustment(&mut self, offset_ms: f64) {
        self.root.set_local_time_adjustment(offset_ms);
    }

    // -- input ---------------------------------------------------------------

    pub fn handle_pointer_event(
        &mut self,
        kind: i32,
        x: f64,
        y: f64,
        pointer_id: i32,
        pointer_type: i32,
    ) -> bool {
        let (Some(kind), Some(pointer_type)) = (
            PointerEventType::from_code(kind),
            PointerType::from_code(pointer_type),
        ) else {
            tracing::error!(
                target: "vhb.context",
                kind,
                pointer_type,
                "unknown pointer event"
            );
            return false;
        };
        let event = PointerEvent {
            kind,
            position: self.point_to_engine(x, y),
            pointer_id,
            pointer_type,
        };
        self.root.handle_pointer(&event)
    }

    pub fn update_cursor_position(&mut self, x: f64, y: f64) {
        let position = self.point_to_engine(x, y);
        self.root.update_cursor_position(position);
    }

    /// Deliver a keyboard event. A payload missing any of `code`, `key`,
    /// `repeat`, `altKey`, `ctrlKey`, `metaKey` or `shiftKey` is rejected
    /// without reaching the engine.
    pub fn handle_keyboard(&mut self, kind: i32, keyboard_json: &str) -> bool {
        let Some(kind) = KeyHandlerType::from_code(kind) else {
            tracing::error!(target: "vhb.context", kind, "unknown keyboard handler type");
            return false;
        };
        match input::parse_keyboard(keyboard_json) {
            Ok(keyboard) => self.root.handle_keyboard(kind, &keyboard),
            Err(err) => {
                tracing::error!(
                    target: "vhb.context",
                    error = %err,
                    "can't handle keyboard event, payload has the wrong shape"
                );
                false
            }
        }
    }

    // -- configuration and display -------------------------------------------

    /// Apply a configuration change.
    ///
    /// With new `metrics`, a fresh transform is built (scaled when `scaling`
    /// is given) and swapped into the slot, and the change carries the new
    /// viewport in engine pixels.
    pub fn configuration_change(
        &mut self,
        mut change: ConfigurationChange,
        metrics: Option<&Metrics>,
        scaling: Option<&ScalingOptions>,
    ) {
        if let Some(metrics) = metrics {
            let transform = match scaling {
                Some(options) => MetricsTransform::with_scaling(metrics, options),
                None => MetricsTransform::new(metrics),
            };
            let viewport = transform.engine_viewport_size();
            let to_engine_pixels = |dp: f64| transform.to_engine_pixel(transform.to_host(dp)).trunc();
            change.size = Some(Size::new(
                to_engine_pixels(viewport.width),
                to_engine_pixels(viewport.height),
            ));
            self.slot.swap(transform);
        }
        self.root.configuration_change(&change);
    }

    pub fn update_display_state(&mut self, state: i32) -> bool {
        let Some(state) = DisplayState::from_code(state) else {
            tracing::error!(target: "vhb.context", state, "unknown display state");
            return false;
        };
        self.root.update_display_state(state);
        true
    }

    pub fn reinflate(&mut self) {
        self.root.reinflate();
    }

    // -- viewport ------------------------------------------------------------

    /// Viewport in dp.
    pub fn viewport_size(&self) -> Size {
        self.root.viewport_size()
    }

    /// Viewport in host pixels.
    pub fn viewport_pixel_size(&self) -> Size {
        let transform = self.slot.load();
        let viewport = self.root.viewport_size();
        Size::new(transform.to_host(viewport.width), transform.to_host(viewport.height))
    }

    /// Host pixels per dp.
    pub fn scale_factor(&self) -> f64 {
        self.slot.load().to_host(1.0)
    }

    // -- background ----------------------------------------------------------

    pub fn background(&self) -> &Background {
        &self.background
    }

    pub fn set_background(&mut self, background: Background) {
        self.background = background;
    }

    // -- context and data sources --------------------------------------------

    /// Serialized visual context.
    pub fn visual_context(&self) -> String {
        self.root.visual_context().to_string()
    }

    /// Serialized data-source context.
    pub fn data_source_context(&self) -> String {
        self.root.data_source_context().to_string()
    }

    /// Route an update to a data-source provider. Unknown kinds are refused.
    pub fn process_data_source_update(&mut self, payload: &str, kind: &str) -> bool {
        if !self.config.is_known_data_source(kind) {
            tracing::warn!(target: "vhb.context", kind, "update for unknown data source");
            return false;
        }
        self.root.process_data_source_update(kind, payload)
    }

    /// Errors pending in every registered provider, as one host array.
    pub fn pending_errors(&mut self) -> Value {
        let mut errors = Vec::new();
        for kind in &self.config.data_sources {
            errors.extend(self.root.pending_errors(kind));
        }
        to_host_value(&DynamicValue::Array(errors), Some(&self.slot.load()))
            .unwrap_or_else(|| Value::Array(Vec::new()))
    }

    // -- focus ---------------------------------------------------------------

    pub fn set_focus(&mut self, direction: i32, origin: Rect, target: &str) -> bool {
        let Some(direction) = FocusDirection::from_code(direction) else {
            tracing::error!(target: "vhb.context", direction, "unknown focus direction");
            return false;
        };
        let origin = self.rect_to_engine(origin.x, origin.y, origin.width, origin.height);
        self.root.set_focus(direction, origin, target);
        true
    }

    pub fn focused(&self) -> Option<ComponentId> {
        self.root.focused()
    }

    /// Focusable areas in host pixels, keyed by component.
    pub fn focusable_areas(&self) -> Map<String, Value> {
        let areas: BTreeMap<ComponentId, DynamicValue> = self
            .root
            .focusable_areas()
            .into_iter()
            .map(|(component, rect)| (component, DynamicValue::Rect(rect)))
            .collect();
        properties_to_host(&areas, Some(&self.slot.load()))
    }

    // -- media ---------------------------------------------------------------

    pub fn media_loaded(&mut self, source: &str) {
        self.root.media_loaded(source);
    }

    pub fn media_load_failed(&mut self, source: &str, error_code: i32, error: &str) {
        tracing::debug!(target: "vhb.context", source, error_code, error, "media load failed");
        self.root.media_load_failed(source, error_code, error);
    }

    // -- misc ----------------------------------------------------------------

    pub fn screen_lock(&self) -> bool {
        self.root.screen_lock()
    }

    pub fn clear_pending(&mut self) {
        self.root.clear_pending();
    }

    fn point_to_engine(&self, x: f64, y: f64) -> Point {
        let transform = self.slot.load();
        Point::new(x, y).map(|v| transform.to_engine(v))
    }

    fn rect_to_engine(&self, x: f64, y: f64, width: f64, height: f64) -> Rect {
        let transform = self.slot.load();
        Rect::new(x, y, width, height).map(|v| transform.to_engine(v))
    }
}

impl<E: Engine> core::fmt::Debug for BridgeContext<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BridgeContext")
            .field("slot", &self.slot)
            .field("background", &self.background)
            .field("attempts", &self.attempts)
            .finish_non_exhaustive()
    }
}
