#![forbid(unsafe_code)]

//! Single-terminal-transition handle for one unit of host work.
//!
//! A [`ResolutionHandle`] is what the engine hands out for every action and
//! every event the host must complete. It moves from `Pending` to exactly one
//! of `Resolved` or `Terminated`; every later transition attempt is a no-op.
//!
//! # Ordering on the terminal transition
//!
//! 1. Side data attached by the bridge is released.
//! 2. Terminal hooks ([`ResolutionHandle::on_terminal_transition`]) run in
//!    registration order.
//! 3. Either the `then` observer (resolve) or every terminate observer
//!    (terminate) runs. Observers of the other kind are dropped unrun.
//!
//! No internal borrow is held while user code runs, so observers may call
//! back into the same handle (late registrations, repeated resolves).

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use vhb_core::Rect;

/// Lifecycle state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    Pending,
    Resolved,
    Terminated,
}

impl ResolutionState {
    #[inline]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// Result payload set atomically with the `Resolved` transition.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ResolutionPayload {
    #[default]
    None,
    Argument(i32),
    /// Rectangle in engine units (dp).
    Rect(Rect),
}

type ThenObserver = Box<dyn FnOnce(&ResolutionPayload)>;
type Hook = Box<dyn FnOnce()>;

struct Inner {
    state: ResolutionState,
    payload: ResolutionPayload,
    then: Option<ThenObserver>,
    terminate_observers: Vec<Hook>,
    terminal_hooks: Vec<Hook>,
    side_data: Option<Rc<dyn Any>>,
}

impl Inner {
    fn new() -> Self {
        Self {
            state: ResolutionState::Pending,
            payload: ResolutionPayload::None,
            then: None,
            terminate_observers: Vec::new(),
            terminal_hooks: Vec::new(),
            side_data: None,
        }
    }
}

/// Everything detached from a handle on its terminal transition.
struct Detached {
    side_data: Option<Rc<dyn Any>>,
    hooks: Vec<Hook>,
    then: Option<ThenObserver>,
    terminate_observers: Vec<Hook>,
}

/// Shared handle to one pending action or event.
///
/// Clones refer to the same state.
#[derive(Clone)]
pub struct ResolutionHandle {
    inner: Rc<RefCell<Inner>>,
}

/// Non-owning reference to a [`ResolutionHandle`].
#[derive(Clone)]
pub struct WeakResolutionHandle {
    inner: Weak<RefCell<Inner>>,
}

impl WeakResolutionHandle {
    pub fn upgrade(&self) -> Option<ResolutionHandle> {
        self.inner.upgrade().map(|inner| ResolutionHandle { inner })
    }
}

impl Default for ResolutionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionHandle {
    /// Create a pending handle.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner::new())),
        }
    }

    /// Create a handle that is already resolved with no payload.
    pub fn resolved() -> Self {
        let handle = Self::new();
        handle.resolve();
        handle
    }

    /// Create a handle that is already terminated.
    pub fn terminated() -> Self {
        let handle = Self::new();
        handle.terminate();
        handle
    }

    pub fn downgrade(&self) -> WeakResolutionHandle {
        WeakResolutionHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    /// True when both handles share state.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn state(&self) -> ResolutionState {
        self.inner.borrow().state
    }

    pub fn is_pending(&self) -> bool {
        self.state() == ResolutionState::Pending
    }

    pub fn is_resolved(&self) -> bool {
        self.state() == ResolutionState::Resolved
    }

    pub fn is_terminated(&self) -> bool {
        self.state() == ResolutionState::Terminated
    }

    /// Payload recorded at resolution (`None` until resolved).
    pub fn payload(&self) -> ResolutionPayload {
        self.inner.borrow().payload
    }

    /// Resolve with no payload.
    pub fn resolve(&self) -> bool {
        self.resolve_with(ResolutionPayload::None)
    }

    /// Resolve with an integer argument.
    pub fn resolve_with_arg(&self, argument: i32) -> bool {
        self.resolve_with(ResolutionPayload::Argument(argument))
    }

    /// Resolve with a rectangle in engine units.
    pub fn resolve_with_rect(&self, rect: Rect) -> bool {
        self.resolve_with(ResolutionPayload::Rect(rect))
    }

    /// Transition `Pending -> Resolved`. Returns `false` if already terminal.
    pub fn resolve_with(&self, payload: ResolutionPayload) -> bool {
        let Some(detached) = self.transition(ResolutionState::Resolved, payload) else {
            return false;
        };
        let Detached {
            side_data,
            hooks,
            then,
            terminate_observers,
        } = detached;
        drop(side_data);
        for hook in hooks {
            hook();
        }
        drop(terminate_observers);
        if let Some(observer) = then {
            observer(&payload);
        }
        true
    }

    /// Transition `Pending -> Terminated`. Returns `false` if already terminal.
    pub fn terminate(&self) -> bool {
        let Some(detached) = self.transition(ResolutionState::Terminated, ResolutionPayload::None)
        else {
            return false;
        };
        let Detached {
            side_data,
            hooks,
            then,
            terminate_observers,
        } = detached;
        drop(side_data);
        for hook in hooks {
            hook();
        }
        drop(then);
        for observer in terminate_observers {
            observer();
        }
        true
    }

    fn transition(&self, to: ResolutionState, payload: ResolutionPayload) -> Option<Detached> {
        let mut inner = self.inner.borrow_mut();
        if inner.state.is_terminal() {
            tracing::trace!(
                target: "vhb.resolution",
                state = ?inner.state,
                attempted = ?to,
                "ignoring transition on terminal handle"
            );
            return None;
        }
        inner.state = to;
        inner.payload = payload;
        tracing::trace!(target: "vhb.resolution", state = ?to, "handle settled");
        Some(Detached {
            side_data: inner.side_data.take(),
            hooks: std::mem::take(&mut inner.terminal_hooks),
            then: inner.then.take(),
            terminate_observers: std::mem::take(&mut inner.terminate_observers),
        })
    }

    /// Register the resolve observer.
    ///
    /// While pending, a second registration replaces the first. On a resolved
    /// handle the observer runs immediately with the original payload. On a
    /// terminated handle it is dropped.
    pub fn then(&self, observer: impl FnOnce(&ResolutionPayload) + 'static) {
        let replay = {
            let mut inner = self.inner.borrow_mut();
            match inner.state {
                ResolutionState::Pending => {
                    if inner.then.is_some() {
                        tracing::debug!(target: "vhb.resolution", "replacing then observer");
                    }
                    inner.then = Some(Box::new(observer));
                    return;
                }
                ResolutionState::Resolved => inner.payload,
                ResolutionState::Terminated => return,
            }
        };
        observer(&replay);
    }

    /// Register a terminate observer. Runs immediately on a terminated handle,
    /// dropped on a resolved one.
    pub fn add_terminate_observer(&self, observer: impl FnOnce() + 'static) {
        {
            let mut inner = self.inner.borrow_mut();
            match inner.state {
                ResolutionState::Pending => {
                    inner.terminate_observers.push(Box::new(observer));
                    return;
                }
                ResolutionState::Resolved => return,
                ResolutionState::Terminated => {}
            }
        }
        observer();
    }

    /// Run `hook` exactly once on whichever terminal transition comes first.
    /// Runs immediately when the handle is already terminal.
    pub fn on_terminal_transition(&self, hook: impl FnOnce() + 'static) {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.state.is_terminal() {
                inner.terminal_hooks.push(Box::new(hook));
                return;
            }
        }
        hook();
    }

    /// Attach bridge-owned data, released on the first terminal transition.
    ///
    /// Replaces previously attached data. Returns `false` (and drops `data`)
    /// when the handle is already terminal.
    pub fn attach_side_data<T: 'static>(&self, data: T) -> bool {
        let previous = {
            let mut inner = self.inner.borrow_mut();
            if inner.state.is_terminal() {
                None
            } else {
                Some(inner.side_data.replace(Rc::new(data)))
            }
        };
        previous.is_some()
    }

    /// Attached side data, if present and of type `T`.
    pub fn side_data<T: 'static>(&self) -> Option<Rc<T>> {
        let data = self.inner.borrow().side_data.clone()?;
        data.downcast::<T>().ok()
    }

    pub fn has_side_data(&self) -> bool {
        self.inner.borrow().side_data.is_some()
    }
}

impl core::fmt::Debug for ResolutionHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("ResolutionHandle")
            .field("state", &inner.state)
            .field("payload", &inner.payload)
            .field("has_then", &inner.then.is_some())
            .field("terminate_observers", &inner.terminate_observers.len())
            .field("has_side_data", &inner.side_data.is_some())
            .finish()
    }
}
