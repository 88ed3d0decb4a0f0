#![forbid(unsafe_code)]

//! Platform-independent JSON facade over [`BridgeContext`].
//!
//! `wasm-bindgen` cannot export a generic type, so an embedder wraps
//! `RunnerCore<TheirEngine>` in its own `#[wasm_bindgen]` struct. Every
//! argument and result here is a number, a string, or JSON text, which keeps
//! that wrapper mechanical. No JS/WASM types here.
//!
//! Events and command batches are handed to the host under numeric ids. The
//! core keeps the underlying handles alive until the host settles or
//! collects them.

use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::{Map, Value, json};
use vhb_core::{Metrics, Rect, ScalingOptions};
use vhb_runtime::{
    BridgeContext, BridgeEvent, ConfigurationChange, CreateError, Engine, HostServices,
    PayloadError, ResolutionHandle, ResolutionState, RootConfig, TextMeasureHost,
};

/// What the host gets back for a tracked command batch.
fn state_label(state: ResolutionState) -> &'static str {
    match state {
        ResolutionState::Pending => "pending",
        ResolutionState::Resolved => "resolved",
        ResolutionState::Terminated => "terminated",
    }
}

/// One engine instance driven through JSON.
pub struct RunnerCore<E: Engine> {
    engine: E,
    services: HostServices,
    context: Option<BridgeContext<E>>,
    /// Popped events the host has not answered yet.
    events: BTreeMap<u64, BridgeEvent>,
    /// Command batches the host has not collected yet.
    actions: BTreeMap<u64, ResolutionHandle>,
    next_id: u64,
}

impl<E: Engine> RunnerCore<E> {
    pub fn new(engine: E, services: HostServices) -> Self {
        Self {
            engine,
            services,
            context: None,
            events: BTreeMap::new(),
            actions: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn context(&self) -> Option<&BridgeContext<E>> {
        self.context.as_ref()
    }

    pub fn context_mut(&mut self) -> Option<&mut BridgeContext<E>> {
        self.context.as_mut()
    }

    pub fn is_created(&self) -> bool {
        self.context.is_some()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }

    /// Inflate `content` from host JSON. Any earlier instance is destroyed
    /// first, whether or not the new one succeeds.
    pub fn create(
        &mut self,
        metrics_json: &str,
        config_json: &str,
        content: &E::Content,
        scaling_json: Option<&str>,
        text: Option<Rc<dyn TextMeasureHost>>,
    ) -> Result<(), CreateError> {
        self.destroy();
        let metrics = Metrics::from_json(metrics_json).map_err(PayloadError::from)?;
        let scaling = scaling_json
            .map(|json| ScalingOptions::from_json(json, &metrics))
            .transpose()
            .map_err(PayloadError::from)?;
        let config = RootConfig::from_json(config_json)?.with_services(self.services.clone());
        let context = BridgeContext::create(&self.engine, &metrics, config, content, scaling, text)?;
        self.context = Some(context);
        Ok(())
    }

    /// Drop the instance. Tracked command batches still pending are
    /// terminated; unanswered events are released as they are.
    pub fn destroy(&mut self) {
        let Some(mut context) = self.context.take() else {
            return;
        };
        context.clear_pending();
        let pending = core::mem::take(&mut self.actions);
        for action in pending.into_values() {
            action.terminate();
        }
        self.events.clear();
        tracing::debug!(target: "vhb.context", "root context destroyed");
    }

    // -- events --------------------------------------------------------------

    /// Drain the engine's event queue as a JSON array of
    /// `{id, type, component, values}`.
    pub fn take_events_json(&mut self) -> String {
        let mut out = Vec::new();
        loop {
            let Some(event) = self.context.as_mut().and_then(BridgeContext::pop_event) else {
                break;
            };
            let id = self.next_id();
            out.push(json!({
                "id": id,
                "type": event.kind(),
                "component": event.component(),
                "values": Value::Object(event.values()),
            }));
            self.events.insert(id, event);
        }
        Value::Array(out).to_string()
    }

    /// Answer event `id`. Returns `false` for unknown ids or an event the
    /// engine already settled.
    pub fn resolve_event(&mut self, id: u64, argument: Option<i32>) -> bool {
        let Some(event) = self.events.remove(&id) else {
            tracing::warn!(target: "vhb.context", id, "resolve for unknown event");
            return false;
        };
        match argument {
            Some(argument) => event.resolve_with_arg(argument),
            None => event.resolve(),
        }
    }

    /// Answer event `id` with a rectangle in host pixels.
    pub fn resolve_event_with_rect(&mut self, id: u64, rect: Rect) -> bool {
        let Some(event) = self.events.remove(&id) else {
            tracing::warn!(target: "vhb.context", id, "resolve for unknown event");
            return false;
        };
        event.resolve_with_rect(rect.x, rect.y, rect.width, rect.height)
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    // -- commands ------------------------------------------------------------

    /// Run a command batch and track its handle. `None` without an instance.
    pub fn execute_commands(&mut self, commands_json: &str, fast_mode: bool) -> Option<u64> {
        let action = self
            .context
            .as_mut()?
            .execute_commands(commands_json, fast_mode);
        let id = self.next_id();
        self.actions.insert(id, action);
        Some(id)
    }

    pub fn action_state(&self, id: u64) -> Option<&'static str> {
        self.actions.get(&id).map(|action| state_label(action.state()))
    }

    pub fn terminate_action(&mut self, id: u64) -> bool {
        self.actions
            .get(&id)
            .is_some_and(ResolutionHandle::terminate)
    }

    /// Settled batches as `{id: "resolved"|"terminated"}`. Reported batches
    /// are no longer tracked.
    pub fn take_settled_actions_json(&mut self) -> String {
        let settled: Vec<u64> = self
            .actions
            .iter()
            .filter(|(_, action)| !action.is_pending())
            .map(|(id, _)| *id)
            .collect();
        let mut out = Map::new();
        for id in settled {
            if let Some(action) = self.actions.remove(&id) {
                out.insert(id.to_string(), Value::from(state_label(action.state())));
            }
        }
        Value::Object(out).to_string()
    }

    pub fn cancel_execution(&mut self) {
        if let Some(context) = self.context.as_mut() {
            context.cancel_execution();
        }
    }

    // -- frame ---------------------------------------------------------------

    /// Dirty properties keyed by component, then clears the dirty set.
    pub fn take_dirty_json(&mut self) -> String {
        let Some(context) = self.context.as_mut() else {
            return "{}".to_owned();
        };
        let mut out = Map::new();
        for component in context.dirty() {
            if let Some(properties) = context.dirty_properties(&component) {
                out.insert(component, Value::Object(properties));
            }
        }
        context.clear_dirty();
        Value::Object(out).to_string()
    }

    pub fn component_properties_json(&self, component: &str) -> Option<String> {
        let properties = self.context.as_ref()?.component_properties(component)?;
        Some(Value::Object(properties).to_string())
    }

    pub fn update_time(&mut self, elapsed_ms: f64, utc_ms: f64) {
        if !elapsed_ms.is_finite() || !utc_ms.is_finite() {
            tracing::warn!(target: "vhb.context", elapsed_ms, utc_ms, "ignoring non-finite time");
            return;
        }
        if let Some(context) = self.context.as_mut() {
            context.update_time(elapsed_ms, utc_ms);
        }
    }

    pub fn next_time(&self) -> Option<f64> {
        self.context.as_ref().map(BridgeContext::next_time)
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
        self.context.as_mut().is_some_and(|context| {
            context.handle_pointer_event(kind, x, y, pointer_id, pointer_type)
        })
    }

    pub fn update_cursor_position(&mut self, x: f64, y: f64) {
        if let Some(context) = self.context.as_mut() {
            context.update_cursor_position(x, y);
        }
    }

    pub fn handle_keyboard(&mut self, kind: i32, keyboard_json: &str) -> bool {
        self.context
            .as_mut()
            .is_some_and(|context| context.handle_keyboard(kind, keyboard_json))
    }

    // -- configuration -------------------------------------------------------

    /// Apply a configuration change, optionally with new metrics and scaling.
    /// Returns `false` without an instance or on a malformed payload.
    pub fn configuration_change(
        &mut self,
        change_json: &str,
        metrics_json: Option<&str>,
        scaling_json: Option<&str>,
    ) -> bool {
        match self.apply_configuration_change(change_json, metrics_json, scaling_json) {
            Ok(applied) => applied,
            Err(err) => {
                tracing::error!(target: "vhb.context", error = %err, "cannot apply configuration change");
                false
            }
        }
    }

    fn apply_configuration_change(
        &mut self,
        change_json: &str,
        metrics_json: Option<&str>,
        scaling_json: Option<&str>,
    ) -> Result<bool, PayloadError> {
        let Some(context) = self.context.as_mut() else {
            return Ok(false);
        };
        let change = ConfigurationChange::from_json(change_json)?;
        let metrics = metrics_json.map(Metrics::from_json).transpose()?;
        let scaling = match (scaling_json, metrics.as_ref()) {
            (Some(json), Some(metrics)) => Some(ScalingOptions::from_json(json, metrics)?),
            _ => None,
        };
        context.configuration_change(change, metrics.as_ref(), scaling.as_ref());
        Ok(true)
    }

    pub fn update_display_state(&mut self, state: i32) -> bool {
        self.context
            .as_mut()
            .is_some_and(|context| context.update_display_state(state))
    }

    /// `{width, height, scaleFactor}` with sizes in host pixels.
    pub fn viewport_json(&self) -> Option<String> {
        let context = self.context.as_ref()?;
        let size = context.viewport_pixel_size();
        Some(
            json!({
                "width": size.width,
                "height": size.height,
                "scaleFactor": context.scale_factor(),
            })
            .to_string(),
        )
    }

    pub fn background_json(&self) -> Option<String> {
        Some(self.context.as_ref()?.background().to_host().to_string())
    }

    // -- context and data sources --------------------------------------------

    pub fn visual_context(&self) -> Option<String> {
        self.context.as_ref().map(BridgeContext::visual_context)
    }

    pub fn data_source_context(&self) -> Option<String> {
        self.context.as_ref().map(BridgeContext::data_source_context)
    }

    pub fn process_data_source_update(&mut self, payload: &str, kind: &str) -> bool {
        self.context
            .as_mut()
            .is_some_and(|context| context.process_data_source_update(payload, kind))
    }

    pub fn pending_errors_json(&mut self) -> String {
        self.context
            .as_mut()
            .map_or_else(|| "[]".to_owned(), |context| context.pending_errors().to_string())
    }

    // -- focus and media -----------------------------------------------------

    pub fn set_focus(&mut self, direction: i32, origin: Rect, target: &str) -> bool {
        self.context
            .as_mut()
            .is_some_and(|context| context.set_focus(direction, origin, target))
    }

    pub fn focusable_areas_json(&self) -> String {
        self.context.as_ref().map_or_else(
            || "{}".to_owned(),
            |context| Value::Object(context.focusable_areas()).to_string(),
        )
    }

    pub fn media_loaded(&mut self, source: &str) {
        if let Some(context) = self.context.as_mut() {
            context.media_loaded(source);
        }
    }

    pub fn media_load_failed(&mut self, source: &str, error_code: i32, error: &str) {
        if let Some(context) = self.context.as_mut() {
            context.media_load_failed(source, error_code, error);
        }
    }
}

impl<E: Engine> core::fmt::Debug for RunnerCore<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RunnerCore")
            .field("created", &self.context.is_some())
            .field("events", &self.events.len())
            .field("actions", &self.actions.len())
            .finish_non_exhaustive()
    }
}
