#![forbid(unsafe_code)]

//! The narrow surface through which the bridge drives an engine.
//!
//! The layout engine itself is external. [`Engine`] builds root contexts and
//! reports document backgrounds; [`RootContext`] is one inflated document.
//! Everything spatial that crosses this boundary is in engine units (dp).
//!
//! Engine→bridge callbacks are the remaining traits in this module. The
//! bridge implements them with its managers and player pools.

use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use vhb_core::metrics::EngineMetrics;
use vhb_core::{DynamicValue, Point, Rect, Size};

use crate::audio::{AudioPlayer, AudioPlayerEventType, AudioState, SpeechMark};
use crate::config::{ConfigurationChange, RootConfig};
use crate::documents::{DocumentHandle, EmbedContent, EmbedRequest};
use crate::media::{MediaPlayer, MediaPlayerEventType, MediaState};
use crate::packages::PackageRequest;
use crate::resolution::ResolutionHandle;

/// Component identifier (the engine's unique id string).
pub type ComponentId = String;

/// Engine property key. Hosts receive these as decimal strings.
pub type PropertyKey = i32;

pub type EmbedSuccessFn = Box<dyn FnOnce(Rc<EmbedRequest>, EmbedContent) -> Option<DocumentHandle>>;
pub type EmbedFailureFn = Box<dyn FnOnce(Rc<EmbedRequest>, String)>;
pub type MediaPlayerCallback = Box<dyn Fn(MediaPlayerEventType, &MediaState)>;
pub type AudioPlayerCallback = Box<dyn Fn(AudioPlayerEventType, &AudioState)>;
pub type SpeechMarkCallback = Box<dyn Fn(&[SpeechMark])>;

pub trait EmbedRequestHandler {
    fn on_embed_request(
        &self,
        request: Weak<EmbedRequest>,
        on_success: EmbedSuccessFn,
        on_failure: EmbedFailureFn,
    );
}

pub trait PackageLoader {
    fn load_package(&self, request: Rc<dyn PackageRequest>);
}

pub trait MediaPlayerFactory {
    fn create_player(&self, callback: MediaPlayerCallback) -> Rc<MediaPlayer>;
}

pub trait AudioPlayerFactory {
    fn create_player(
        &self,
        callback: AudioPlayerCallback,
        marks: SpeechMarkCallback,
    ) -> Rc<AudioPlayer>;
}

macro_rules! coded_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $($variant = $code),+
        }

        impl $name {
            pub const fn from_code(code: i32) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub const fn code(self) -> i32 {
                self as i32
            }
        }
    };
}

coded_enum!(
    /// Pointer phase.
    PointerEventType { Down = 0, Up = 1, Move = 2, TargetChanged = 3, Cancel = 4 }
);
coded_enum!(PointerType { Mouse = 0, Touch = 1 });
coded_enum!(KeyHandlerType { KeyDown = 0, KeyUp = 1 });
coded_enum!(DisplayState { Hidden = 0, Background = 1, Foreground = 2 });
coded_enum!(
    /// Alignment for scroll-into-view.
    ScrollAlign { First = 0, Center = 1, Last = 2, Visible = 3 }
);
coded_enum!(FocusDirection { Forward = 0, Backward = 1, Left = 2, Up = 3, Right = 4, Down = 5 });

/// Pointer input in engine units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub kind: PointerEventType,
    pub position: Point,
    pub pointer_id: i32,
    pub pointer_type: PointerType,
}

/// Keyboard input. Every field is required on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Keyboard {
    pub code: String,
    pub key: String,
    pub repeat: bool,
    pub alt: bool,
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
}

/// One engine event waiting for the host.
#[derive(Debug, Clone)]
pub struct EngineEvent {
    /// Engine event type code.
    pub kind: i32,
    pub values: BTreeMap<PropertyKey, DynamicValue>,
    pub component: Option<ComponentId>,
    pub action: ResolutionHandle,
}

impl EngineEvent {
    pub fn new(kind: i32) -> Self {
        Self {
            kind,
            values: BTreeMap::new(),
            component: None,
            action: ResolutionHandle::new(),
        }
    }

    #[must_use]
    pub fn with_value(mut self, key: PropertyKey, value: impl Into<DynamicValue>) -> Self {
        self.values.insert(key, value.into());
        self
    }

    #[must_use]
    pub fn with_component(mut self, component: impl Into<ComponentId>) -> Self {
        self.component = Some(component.into());
        self
    }
}

/// Builds root contexts.
pub trait Engine {
    /// Parsed document content as the engine understands it.
    type Content;
    type Root: RootContext;

    /// Inflate `content` at `metrics`. `None` means this viewport was rejected.
    fn inflate(
        &self,
        metrics: &EngineMetrics,
        content: &Self::Content,
        config: &RootConfig,
    ) -> Option<Self::Root>;

    /// Document background: a `Color`, a `Gradient`, or `None` for the default.
    fn background(
        &self,
        content: &Self::Content,
        metrics: &EngineMetrics,
        config: &RootConfig,
    ) -> Option<DynamicValue>;
}

/// One inflated document.
pub trait RootContext {
    fn has_event(&self) -> bool;
    fn pop_event(&mut self) -> Option<EngineEvent>;

    fn is_dirty(&self) -> bool;
    fn dirty(&self) -> Vec<ComponentId>;
    fn clear_dirty(&mut self);

    fn component_properties(&self, component: &str)
    -> Option<BTreeMap<PropertyKey, DynamicValue>>;
    /// Only the properties changed since the last `clear_dirty`.
    fn dirty_properties(&self, component: &str) -> Option<BTreeMap<PropertyKey, DynamicValue>>;
    fn update_component(&mut self, component: &str, update_type: i32, value: DynamicValue) -> bool;
    fn scroll_to_rect(&mut self, component: &str, rect: Rect, align: ScrollAlign);

    fn execute_commands(&mut self, commands: &DynamicValue, fast_mode: bool) -> ResolutionHandle;
    /// Run commands in a nested document.
    fn execute_document_commands(
        &mut self,
        document: DocumentHandle,
        commands: &DynamicValue,
    ) -> Option<ResolutionHandle>;
    fn invoke_extension_event_handler(
        &mut self,
        uri: &str,
        name: &str,
        data: &BTreeMap<String, DynamicValue>,
        fast_mode: bool,
    ) -> ResolutionHandle;
    fn cancel_execution(&mut self);

    fn update_time(&mut self, elapsed_ms: f64, utc_ms: f64);
    fn current_time(&self) -> f64;
    fn next_time(&self) -> f64;
    fn set_local_time_adjustment(&mut self, offset_ms: f64);

    fn handle_pointer(&mut self, event: &PointerEvent) -> bool;
    fn handle_keyboard(&mut self, kind: KeyHandlerType, keyboard: &Keyboard) -> bool;
    fn update_cursor_position(&mut self, position: Point);

    fn configuration_change(&mut self, change: &ConfigurationChange);
    fn update_display_state(&mut self, state: DisplayState);
    fn reinflate(&mut self);
    /// Current viewport in dp.
    fn viewport_size(&self) -> Size;

    fn media_loaded(&mut self, source: &str);
    fn media_load_failed(&mut self, source: &str, error_code: i32, error: &str);

    fn visual_context(&self) -> serde_json::Value;
    fn data_source_context(&self) -> serde_json::Value;
    fn process_data_source_update(&mut self, kind: &str, payload: &str) -> bool;
    /// Errors accumulated by the data-source provider `kind`.
    fn pending_errors(&mut self, kind: &str) -> Vec<DynamicValue>;

    fn set_focus(&mut self, direction: FocusDirection, origin: Rect, target: &str);
    fn focused(&self) -> Option<ComponentId>;
    fn focusable_areas(&self) -> BTreeMap<ComponentId, Rect>;

    fn screen_lock(&self) -> bool;
    fn clear_pending(&mut self);
}
