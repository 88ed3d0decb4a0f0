#![forbid(unsafe_code)]

//! Correlation table for engine-initiated host work.
//!
//! Each entry pairs a weak back-reference to the requester with a success and
//! a failure continuation. The host completes entries by key, in any order.
//! A completion for a key that is not present is a benign race: it is logged
//! and ignored. A completion whose requester has already been dropped removes
//! the entry without running either continuation.
//!
//! The registry is used identically for embedded documents (keyed by a
//! monotonically increasing [`RequestId`]) and for package imports (keyed by
//! the import reference string).

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::{Rc, Weak};

/// Identifier allocated by [`PendingRegistry::submit`]. Starts at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u64);

impl RequestId {
    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for RequestId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type family describing one kind of correlated request.
pub trait RequestKind: 'static {
    type Key: Clone + Eq + Hash + core::fmt::Debug;
    type Requester: ?Sized;
    type Success;
    type Failure;
    /// Value returned by the success continuation.
    type Output;

    /// Name used in log records.
    const LABEL: &'static str;
}

pub type SuccessFn<K> = Box<
    dyn FnOnce(
        Rc<<K as RequestKind>::Requester>,
        <K as RequestKind>::Success,
    ) -> <K as RequestKind>::Output,
>;
pub type FailureFn<K> =
    Box<dyn FnOnce(Rc<<K as RequestKind>::Requester>, <K as RequestKind>::Failure)>;

/// Outcome of delivering a completion.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion<T> {
    /// Continuation ran and produced `T`.
    Delivered(T),
    /// Entry removed; the requester was gone so nothing ran.
    RequesterDropped,
    /// No entry under the key.
    Unknown,
}

impl<T> Completion<T> {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered(_))
    }

    pub fn delivered(self) -> Option<T> {
        match self {
            Self::Delivered(value) => Some(value),
            _ => None,
        }
    }
}

/// One in-flight request.
pub struct PendingRequest<K: RequestKind> {
    requester: Weak<K::Requester>,
    on_success: SuccessFn<K>,
    on_failure: FailureFn<K>,
}

impl<K: RequestKind> PendingRequest<K> {
    pub fn new(
        requester: Weak<K::Requester>,
        on_success: SuccessFn<K>,
        on_failure: FailureFn<K>,
    ) -> Self {
        Self {
            requester,
            on_success,
            on_failure,
        }
    }

    pub fn requester_alive(&self) -> bool {
        self.requester.strong_count() > 0
    }

    /// Run the success continuation if the requester is still alive.
    pub fn succeed(self, result: K::Success) -> Completion<K::Output> {
        match self.requester.upgrade() {
            Some(requester) => Completion::Delivered((self.on_success)(requester, result)),
            None => Completion::RequesterDropped,
        }
    }

    /// Run the failure continuation if the requester is still alive.
    pub fn fail(self, reason: K::Failure) -> Completion<()> {
        match self.requester.upgrade() {
            Some(requester) => {
                (self.on_failure)(requester, reason);
                Completion::Delivered(())
            }
            None => Completion::RequesterDropped,
        }
    }
}

impl<K: RequestKind> core::fmt::Debug for PendingRequest<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("kind", &K::LABEL)
            .field("requester_alive", &self.requester_alive())
            .finish()
    }
}

/// Keyed table of [`PendingRequest`]s.
///
/// Methods take `&self`; the table is borrowed only long enough to insert or
/// remove an entry, never while a continuation runs.
pub struct PendingRegistry<K: RequestKind> {
    entries: RefCell<HashMap<K::Key, PendingRequest<K>>>,
    next_id: Cell<u64>,
}

impl<K: RequestKind> Default for PendingRegistry<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: RequestKind> PendingRegistry<K> {
    pub fn new() -> Self {
        Self {
            entries: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
        }
    }

    /// Store `request` under `key`. A live entry under the same key is
    /// replaced (and dropped without running).
    pub fn insert(&self, key: K::Key, request: PendingRequest<K>) {
        let replaced = self.entries.borrow_mut().insert(key.clone(), request);
        if replaced.is_some() {
            tracing::warn!(
                target: "vhb.registry",
                kind = K::LABEL,
                key = ?key,
                "replacing pending request with the same key"
            );
        }
    }

    /// Remove and return the entry under `key`.
    pub fn take(&self, key: &K::Key) -> Option<PendingRequest<K>> {
        self.entries.borrow_mut().remove(key)
    }

    pub fn contains(&self, key: &K::Key) -> bool {
        self.entries.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    /// Deliver a success. The entry is removed before the continuation runs.
    pub fn succeed(&self, key: &K::Key, result: K::Success) -> Completion<K::Output> {
        let Some(entry) = self.take(key) else {
            Self::log_unknown(key, "success");
            return Completion::Unknown;
        };
        let completion = entry.succeed(result);
        if matches!(completion, Completion::RequesterDropped) {
            Self::log_dropped(key, "success");
        }
        completion
    }

    /// Deliver a failure. The entry is removed before the continuation runs.
    pub fn fail(&self, key: &K::Key, reason: K::Failure) -> Completion<()> {
        let Some(entry) = self.take(key) else {
            Self::log_unknown(key, "failure");
            return Completion::Unknown;
        };
        let completion = entry.fail(reason);
        if matches!(completion, Completion::RequesterDropped) {
            Self::log_dropped(key, "failure");
        }
        completion
    }

    /// Drop every entry without running continuations.
    pub fn clear(&self) {
        let drained: Vec<_> = self.entries.borrow_mut().drain().collect();
        if !drained.is_empty() {
            tracing::debug!(
                target: "vhb.registry",
                kind = K::LABEL,
                dropped = drained.len(),
                "pending requests cleared"
            );
        }
    }

    fn log_unknown(key: &K::Key, outcome: &'static str) {
        tracing::warn!(
            target: "vhb.registry",
            kind = K::LABEL,
            key = ?key,
            outcome,
            "completion for unknown request"
        );
    }

    fn log_dropped(key: &K::Key, outcome: &'static str) {
        tracing::debug!(
            target: "vhb.registry",
            kind = K::LABEL,
            key = ?key,
            outcome,
            "requester dropped before completion"
        );
    }
}

impl<K: RequestKind<Key = RequestId>> PendingRegistry<K> {
    /// Allocate the next id and store `request` under it.
    pub fn submit(&self, request: PendingRequest<K>) -> RequestId {
        let id = RequestId(self.next_id.get());
        self.next_id.set(id.0.wrapping_add(1));
        self.insert(id, request);
        id
    }
}

impl<K: RequestKind> core::fmt::Debug for PendingRegistry<K> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PendingRegistry")
            .field("kind", &K::LABEL)
            .field("pending", &self.len())
            .field("next_id", &self.next_id.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct Probe;

    impl RequestKind for Probe {
        type Key = RequestId;
        type Requester = String;
        type Success = i32;
        type Failure = &'static str;
        type Output = i32;
        const LABEL: &'static str = "probe";
    }

    struct Counters {
        success: Rc<Cell<u32>>,
        failure: Rc<Cell<u32>>,
    }

    fn request(requester: &Rc<String>) -> (PendingRequest<Probe>, Counters) {
        let success = Rc::new(Cell::new(0));
        let failure = Rc::new(Cell::new(0));
        let s = Rc::clone(&success);
        let f = Rc::clone(&failure);
        let pending = PendingRequest::new(
            Rc::downgrade(requester),
            Box::new(move |_req: Rc<String>, value: i32| {
                s.set(s.get() + 1);
                value * 2
            }),
            Box::new(move |_req: Rc<String>, _reason: &'static str| f.set(f.get() + 1)),
        );
        (pending, Counters { success, failure })
    }

    #[test]
    fn submit_allocates_increasing_ids() {
        let registry = PendingRegistry::<Probe>::new();
        let owner = Rc::new(String::from("doc"));
        let (a, _) = request(&owner);
        let (b, _) = request(&owner);
        assert_eq!(registry.submit(a), RequestId(1));
        assert_eq!(registry.submit(b), RequestId(2));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn succeed_runs_once_and_removes() {
        let registry = PendingRegistry::<Probe>::new();
        let owner = Rc::new(String::from("doc"));
        let (pending, counters) = request(&owner);
        let id = registry.submit(pending);

        assert_eq!(registry.succeed(&id, 21), Completion::Delivered(42));
        assert_eq!(registry.succeed(&id, 21), Completion::Unknown);
        assert_eq!(counters.success.get(), 1);
        assert_eq!(counters.failure.get(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn dropped_requester_skips_callbacks() {
        let registry = PendingRegistry::<Probe>::new();
        let owner = Rc::new(String::from("doc"));
        let (pending, counters) = request(&owner);
        let id = registry.submit(pending);
        drop(owner);

        assert_eq!(registry.fail(&id, "network"), Completion::RequesterDropped);
        assert_eq!(counters.failure.get(), 0);
        assert!(!registry.contains(&id));
    }

    #[test]
    fn out_of_order_completion() {
        let registry = PendingRegistry::<Probe>::new();
        let owner = Rc::new(String::from("doc"));
        let (first, c1) = request(&owner);
        let (second, c2) = request(&owner);
        let id1 = registry.submit(first);
        let id2 = registry.submit(second);

        assert!(registry.fail(&id2, "late").is_delivered());
        assert!(registry.succeed(&id1, 1).is_delivered());
        assert_eq!((c1.success.get(), c1.failure.get()), (1, 0));
        assert_eq!((c2.success.get(), c2.failure.get()), (0, 1));
    }

    #[test]
    fn clear_drops_without_callbacks() {
        let registry = PendingRegistry::<Probe>::new();
        let owner = Rc::new(String::from("doc"));
        let (pending, counters) = request(&owner);
        let id = registry.submit(pending);
        registry.clear();
        assert_eq!(registry.succeed(&id, 1), Completion::Unknown);
        assert_eq!(counters.success.get(), 0);
    }

    #[test]
    fn insert_replaces_existing_key() {
        let registry = PendingRegistry::<Probe>::new();
        let owner = Rc::new(String::from("doc"));
        let (first, c1) = request(&owner);
        let (second, c2) = request(&owner);
        registry.insert(RequestId(9), first);
        registry.insert(RequestId(9), second);
        assert_eq!(registry.len(), 1);
        registry.succeed(&RequestId(9), 0);
        assert_eq!(c1.success.get(), 0);
        assert_eq!(c2.success.get(), 1);
    }

    #[test]
    fn continuation_may_reenter_registry() {
        let registry = Rc::new(PendingRegistry::<Probe>::new());
        let owner = Rc::new(String::from("doc"));
        let inner = Rc::clone(&registry);
        let inner_owner = Rc::clone(&owner);
        let pending = PendingRequest::<Probe>::new(
            Rc::downgrade(&owner),
            Box::new(move |_req: Rc<String>, value: i32| {
                let (next, _) = request(&inner_owner);
                inner.submit(next);
                value
            }),
            Box::new(|_: Rc<String>, _: &'static str| {}),
        );
        let id = registry.submit(pending);
        assert_eq!(registry.succeed(&id, 5), Completion::Delivered(5));
        assert_eq!(registry.len(), 1);
    }
}
