#![forbid(unsafe_code)]

//! Engine events as the host sees them.

use std::rc::Rc;

use serde_json::{Map, Value};
use vhb_core::{Rect, TransformSlot, properties_to_host, to_host_value};

use crate::engine::{ComponentId, EngineEvent, PropertyKey};
use crate::resolution::{ResolutionHandle, ResolutionState};

/// An [`EngineEvent`] bound to its instance's transform slot.
///
/// Values are marshalled with the transform current at the time of each
/// read, not the one current when the event was popped.
#[derive(Debug, Clone)]
pub struct BridgeEvent {
    event: EngineEvent,
    slot: Rc<TransformSlot>,
}

impl BridgeEvent {
    pub fn new(event: EngineEvent, slot: Rc<TransformSlot>) -> Self {
        Self { event, slot }
    }

    pub fn kind(&self) -> i32 {
        self.event.kind
    }

    /// Host form of property `key`; `None` when absent or unrepresentable.
    pub fn value(&self, key: PropertyKey) -> Option<Value> {
        let value = self.event.values.get(&key)?;
        to_host_value(value, Some(&self.slot.load()))
    }

    /// Every value with a host form, keyed by property.
    pub fn values(&self) -> Map<String, Value> {
        properties_to_host(&self.event.values, Some(&self.slot.load()))
    }

    pub fn component(&self) -> Option<&ComponentId> {
        self.event.component.as_ref()
    }

    pub fn action(&self) -> &ResolutionHandle {
        &self.event.action
    }

    pub fn resolve(&self) -> bool {
        self.event.action.resolve()
    }

    pub fn resolve_with_arg(&self, argument: i32) -> bool {
        self.event.action.resolve_with_arg(argument)
    }

    /// Resolve with a rectangle given in host pixels.
    pub fn resolve_with_rect(&self, x: f64, y: f64, width: f64, height: f64) -> bool {
        let transform = self.slot.load();
        let rect = Rect::new(x, y, width, height).map(|v| transform.to_engine(v));
        self.event.action.resolve_with_rect(rect)
    }

    pub fn add_terminate_observer(&self, observer: impl FnOnce() + 'static) {
        self.event.action.add_terminate_observer(observer);
    }

    pub fn state(&self) -> ResolutionState {
        self.event.action.state()
    }

    pub fn is_pending(&self) -> bool {
        self.event.action.is_pending()
    }

    pub fn is_resolved(&self) -> bool {
        self.event.action.is_resolved()
    }

    pub fn is_terminated(&self) -> bool {
        self.event.action.is_terminated()
    }

    pub fn into_inner(self) -> EngineEvent {
        self.event
    }
}
