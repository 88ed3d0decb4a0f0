#![forbid(unsafe_code)]

//! A scripted stand-in for the layout engine.
//!
//! [`ScriptedEngine`] inflates a [`ScriptedDocument`] into a
//! [`ScriptedRoot`] unless a rejection rule matches the offered metrics.
//! The root records every call the bridge makes as a [`RootCall`] and
//! answers queries from plain fields tests can set directly.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, VecDeque};

use serde_json::{Value, json};
use vhb_core::metrics::EngineMetrics;
use vhb_core::{DynamicValue, Point, REFERENCE_DPI, Rect, Size};
use vhb_runtime::{
    ComponentId, ConfigurationChange, DisplayState, DocumentHandle, Engine, EngineEvent,
    FocusDirection, KeyHandlerType, Keyboard, MeasureMode, PointerEvent, PropertyKey,
    ResolutionHandle, RootConfig, RootContext, ScrollAlign, TextLayout,
};

type Properties = BTreeMap<PropertyKey, DynamicValue>;
type RejectRule = Box<dyn Fn(&EngineMetrics) -> bool>;

/// Document content the scripted engine understands.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDocument {
    pub components: BTreeMap<ComponentId, Properties>,
    pub events: Vec<EngineEvent>,
    pub background: Option<DynamicValue>,
}

impl ScriptedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn component(
        mut self,
        id: impl Into<ComponentId>,
        properties: impl IntoIterator<Item = (PropertyKey, DynamicValue)>,
    ) -> Self {
        self.components
            .insert(id.into(), properties.into_iter().collect());
        self
    }

    #[must_use]
    pub fn event(mut self, event: EngineEvent) -> Self {
        self.events.push(event);
        self
    }

    #[must_use]
    pub fn background(mut self, background: impl Into<DynamicValue>) -> Self {
        self.background = Some(background.into());
        self
    }
}

/// Engine that inflates unless told otherwise.
#[derive(Default)]
pub struct ScriptedEngine {
    rejects: Vec<RejectRule>,
    inflations: RefCell<Vec<EngineMetrics>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any inflation whose metrics match `rule`.
    #[must_use]
    pub fn reject_when(mut self, rule: impl Fn(&EngineMetrics) -> bool + 'static) -> Self {
        self.rejects.push(Box::new(rule));
        self
    }

    #[must_use]
    pub fn reject_all(self) -> Self {
        self.reject_when(|_| true)
    }

    /// Metrics offered to every inflation attempt, in order.
    pub fn inflations(&self) -> Vec<EngineMetrics> {
        self.inflations.borrow().clone()
    }
}

impl core::fmt::Debug for ScriptedEngine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ScriptedEngine")
            .field("rejects", &self.rejects.len())
            .field("inflations", &self.inflations.borrow().len())
            .finish()
    }
}

impl Engine for ScriptedEngine {
    type Content = ScriptedDocument;
    type Root = ScriptedRoot;

    fn inflate(
        &self,
        metrics: &EngineMetrics,
        content: &ScriptedDocument,
        config: &RootConfig,
    ) -> Option<ScriptedRoot> {
        self.inflations.borrow_mut().push(metrics.clone());
        if self.rejects.iter().any(|rule| rule(metrics)) {
            return None;
        }
        Some(ScriptedRoot::new(metrics, content, config.clone()))
    }

    fn background(
        &self,
        content: &ScriptedDocument,
        _metrics: &EngineMetrics,
        _config: &RootConfig,
    ) -> Option<DynamicValue> {
        content.background.clone()
    }
}

/// Every mutating call the bridge made on a [`ScriptedRoot`].
#[derive(Debug, Clone, PartialEq)]
pub enum RootCall {
    Pointer(PointerEvent),
    Keyboard(KeyHandlerType, Keyboard),
    Cursor(Point),
    Configuration(ConfigurationChange),
    DisplayState(DisplayState),
    Reinflate,
    Scroll {
        component: String,
        rect: Rect,
        align: ScrollAlign,
    },
    Commands {
        commands: DynamicValue,
        fast_mode: bool,
    },
    DocumentCommands {
        document: DocumentHandle,
        commands: DynamicValue,
    },
    Extension {
        uri: String,
        name: String,
        data: BTreeMap<String, DynamicValue>,
    },
    CancelExecution,
    Time {
        elapsed_ms: f64,
        utc_ms: f64,
    },
    LocalTimeAdjustment(f64),
    UpdateComponent {
        component: String,
        update_type: i32,
        value: DynamicValue,
    },
    MediaLoaded(String),
    MediaLoadFailed {
        source: String,
        error_code: i32,
        error: String,
    },
    DataSourceUpdate {
        kind: String,
        payload: String,
    },
    Focus {
        direction: FocusDirection,
        origin: Rect,
        target: String,
    },
    ClearPending,
}

/// Inflated scripted document.
#[derive(Debug)]
pub struct ScriptedRoot {
    pub metrics: EngineMetrics,
    pub config: RootConfig,
    pub viewport: Size,
    pub components: BTreeMap<ComponentId, Properties>,
    pub dirty: BTreeMap<ComponentId, BTreeSet<PropertyKey>>,
    pub events: VecDeque<EngineEvent>,
    pub calls: Vec<RootCall>,
    /// Handles returned from command execution, oldest first.
    pub actions: Vec<ResolutionHandle>,
    pub documents: BTreeSet<DocumentHandle>,
    pub data_source_errors: BTreeMap<String, Vec<DynamicValue>>,
    pub focusable: BTreeMap<ComponentId, Rect>,
    pub focused: Option<ComponentId>,
    pub current_time: f64,
    pub screen_lock: bool,
    /// Answer for `handle_pointer` and `handle_keyboard`.
    pub consume_input: bool,
}

impl ScriptedRoot {
    pub fn new(metrics: &EngineMetrics, content: &ScriptedDocument, config: RootConfig) -> Self {
        Self {
            metrics: metrics.clone(),
            config,
            viewport: Size::new(metrics.width, metrics.height),
            components: content.components.clone(),
            dirty: BTreeMap::new(),
            events: content.events.iter().cloned().collect(),
            calls: Vec::new(),
            actions: Vec::new(),
            documents: BTreeSet::new(),
            data_source_errors: BTreeMap::new(),
            focusable: BTreeMap::new(),
            focused: None,
            current_time: 0.0,
            screen_lock: false,
            consume_input: true,
        }
    }

    pub fn push_event(&mut self, event: EngineEvent) {
        self.events.push_back(event);
    }

    /// Change one property and mark it dirty.
    pub fn set_property(&mut self, component: &str, key: PropertyKey, value: impl Into<DynamicValue>) {
        self.components
            .entry(component.to_owned())
            .or_default()
            .insert(key, value.into());
        self.dirty.entry(component.to_owned()).or_default().insert(key);
    }

    /// Ask the installed text service to lay out `component`.
    pub fn measure_text(&self, component: &str, width: f64, height: f64) -> Option<TextLayout> {
        let text = self.config.services.text.as_ref()?;
        Some(text.layout(
            component,
            width,
            MeasureMode::AtMost,
            height,
            MeasureMode::Undefined,
        ))
    }
}

impl RootContext for ScriptedRoot {
    fn has_event(&self) -> bool {
        !self.events.is_empty()
    }

    fn pop_event(&mut self) -> Option<EngineEvent> {
        self.events.pop_front()
    }

    fn is_dirty(&self) -> bool {
        !self.dirty.is_empty()
    }

    fn dirty(&self) -> Vec<ComponentId> {
        self.dirty.keys().cloned().collect()
    }

    fn clear_dirty(&mut self) {
        self.dirty.clear();
    }

    fn component_properties(&self, component: &str) -> Option<Properties> {
        self.components.get(component).cloned()
    }

    fn dirty_properties(&self, component: &str) -> Option<Properties> {
        let keys = self.dirty.get(component)?;
        let properties = self.components.get(component)?;
        Some(
            properties
                .iter()
                .filter(|(key, _)| keys.contains(key))
                .map(|(key, value)| (*key, value.clone()))
                .collect(),
        )
    }

    fn update_component(&mut self, component: &str, update_type: i32, value: DynamicValue) -> bool {
        let known = self.components.contains_key(component);
        self.calls.push(RootCall::UpdateComponent {
            component: component.to_owned(),
            update_type,
            value,
        });
        known
    }

    fn scroll_to_rect(&mut self, component: &str, rect: Rect, align: ScrollAlign) {
        self.calls.push(RootCall::Scroll {
            component: component.to_owned(),
            rect,
            align,
        });
    }

    fn execute_commands(&mut self, commands: &DynamicValue, fast_mode: bool) -> ResolutionHandle {
        self.calls.push(RootCall::Commands {
            commands: commands.clone(),
            fast_mode,
        });
        let action = ResolutionHandle::new();
        self.actions.push(action.clone());
        action
    }

    fn execute_document_commands(
        &mut self,
        document: DocumentHandle,
        commands: &DynamicValue,
    ) -> Option<ResolutionHandle> {
        if !self.documents.contains(&document) {
            return None;
        }
        self.calls.push(RootCall::DocumentCommands {
            document,
            commands: commands.clone(),
        });
        let action = ResolutionHandle::new();
        self.actions.push(action.clone());
        Some(action)
    }

    fn invoke_extension_event_handler(
        &mut self,
        uri: &str,
        name: &str,
        data: &BTreeMap<String, DynamicValue>,
        _fast_mode: bool,
    ) -> ResolutionHandle {
        self.calls.push(RootCall::Extension {
            uri: uri.to_owned(),
            name: name.to_owned(),
            data: data.clone(),
        });
        let action = ResolutionHandle::new();
        self.actions.push(action.clone());
        action
    }

    fn cancel_execution(&mut self) {
        self.calls.push(RootCall::CancelExecution);
        for action in self.actions.drain(..) {
            action.terminate();
        }
    }

    fn update_time(&mut self, elapsed_ms: f64, utc_ms: f64) {
        self.current_time = elapsed_ms;
        self.calls.push(RootCall::Time { elapsed_ms, utc_ms });
    }

    fn current_time(&self) -> f64 {
        self.current_time
    }

    fn next_time(&self) -> f64 {
        self.current_time + 16.0
    }

    fn set_local_time_adjustment(&mut self, offset_ms: f64) {
        self.calls.push(RootCall::LocalTimeAdjustment(offset_ms));
    }

    fn handle_pointer(&mut self, event: &PointerEvent) -> bool {
        self.calls.push(RootCall::Pointer(*event));
        self.consume_input
    }

    fn handle_keyboard(&mut self, kind: KeyHandlerType, keyboard: &Keyboard) -> bool {
        self.calls.push(RootCall::Keyboard(kind, keyboard.clone()));
        self.consume_input
    }

    fn update_cursor_position(&mut self, position: Point) {
        self.calls.push(RootCall::Cursor(position));
    }

    fn configuration_change(&mut self, change: &ConfigurationChange) {
        if let Some(size) = change.size {
            // Engine pixels back to dp at the root's density.
            let dp = |px: f64| px * REFERENCE_DPI / self.metrics.dpi;
            self.viewport = Size::new(dp(size.width), dp(size.height));
        }
        self.calls.push(RootCall::Configuration(change.clone()));
    }

    fn update_display_state(&mut self, state: DisplayState) {
        self.calls.push(RootCall::DisplayState(state));
    }

    fn reinflate(&mut self) {
        self.calls.push(RootCall::Reinflate);
    }

    fn viewport_size(&self) -> Size {
        self.viewport
    }

    fn media_loaded(&mut self, source: &str) {
        self.calls.push(RootCall::MediaLoaded(source.to_owned()));
    }

    fn media_load_failed(&mut self, source: &str, error_code: i32, error: &str) {
        self.calls.push(RootCall::MediaLoadFailed {
            source: source.to_owned(),
            error_code,
            error: error.to_owned(),
        });
    }

    fn visual_context(&self) -> Value {
        json!({
            "id": "root",
            "children": self.components.keys().collect::<Vec<_>>(),
        })
    }

    fn data_source_context(&self) -> Value {
        json!([])
    }

    fn process_data_source_update(&mut self, kind: &str, payload: &str) -> bool {
        self.calls.push(RootCall::DataSourceUpdate {
            kind: kind.to_owned(),
            payload: payload.to_owned(),
        });
        true
    }

    fn pending_errors(&mut self, kind: &str) -> Vec<DynamicValue> {
        self.data_source_errors.remove(kind).unwrap_or_default()
    }

    fn set_focus(&mut self, direction: FocusDirection, origin: Rect, target: &str) {
        self.focused = Some(target.to_owned());
        self.calls.push(RootCall::Focus {
            direction,
            origin,
            target: target.to_owned(),
        });
    }

    fn focused(&self) -> Option<ComponentId> {
        self.focused.clone()
    }

    fn focusable_areas(&self) -> BTreeMap<ComponentId, Rect> {
        self.focusable.clone()
    }

    fn screen_lock(&self) -> bool {
        self.screen_lock
    }

    fn clear_pending(&mut self) {
        self.calls.push(RootCall::ClearPending);
    }
}
