#![forbid(unsafe_code)]

//! Weakly-held collection of player shims.
//!
//! The engine owns its players. The pool keeps a `Weak` per player so the
//! host can route callbacks by [`PlayerId`], and it prunes dead entries only
//! when a new player is created. Between creations the pool may hold dead
//! entries; [`PlayerPool::len`] counts them, [`PlayerPool::live`] does not.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

/// Pool-assigned player identifier. Starts at 1 and is never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub u64);

impl core::fmt::Display for PlayerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct PlayerPool<T> {
    label: &'static str,
    entries: RefCell<Vec<(PlayerId, Weak<T>)>>,
    next_id: Cell<u64>,
}

impl<T> PlayerPool<T> {
    pub fn new(label: &'static str) -> Self {
        Self {
            label,
            entries: RefCell::new(Vec::new()),
            next_id: Cell::new(1),
        }
    }

    /// Prune dead entries, then build and track a new player.
    ///
    /// `build` runs with no pool borrow held.
    pub fn create(&self, build: impl FnOnce(PlayerId) -> Rc<T>) -> Rc<T> {
        let pruned = self.prune();
        let id = PlayerId(self.next_id.get());
        self.next_id.set(id.0.wrapping_add(1));
        let player = build(id);
        let tracked = {
            let mut entries = self.entries.borrow_mut();
            entries.push((id, Rc::downgrade(&player)));
            entries.len()
        };
        tracing::debug!(
            target: "vhb.pool",
            pool = self.label,
            id = id.0,
            pruned,
            tracked,
            "player created"
        );
        player
    }

    /// Remove entries whose player is gone. Returns how many were removed.
    pub fn prune(&self) -> usize {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|(_, weak)| weak.strong_count() > 0);
        before - entries.len()
    }

    pub fn get(&self, id: PlayerId) -> Option<Rc<T>> {
        self.entries
            .borrow()
            .iter()
            .find(|(entry, _)| *entry == id)
            .and_then(|(_, weak)| weak.upgrade())
    }

    /// Strong handles to every live player, in creation order.
    pub fn live(&self) -> Vec<(PlayerId, Rc<T>)> {
        self.entries
            .borrow()
            .iter()
            .filter_map(|(id, weak)| weak.upgrade().map(|player| (*id, player)))
            .collect()
    }

    /// Tracked entries, including dead ones not yet pruned.
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn live_count(&self) -> usize {
        self.entries
            .borrow()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }
}

impl<T> core::fmt::Debug for PlayerPool<T> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PlayerPool")
            .field("label", &self.label)
            .field("tracked", &self.len())
            .field("live", &self.live_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_increase_from_one() {
        let pool = PlayerPool::<u8>::new("test");
        let a = pool.create(|id| Rc::new(id.0 as u8));
        let b = pool.create(|id| Rc::new(id.0 as u8));
        assert_eq!((*a, *b), (1, 2));
        assert_eq!(pool.get(PlayerId(2)).as_deref(), Some(&2));
    }

    #[test]
    fn dead_entries_linger_until_create() {
        let pool = PlayerPool::<u8>::new("test");
        let a = pool.create(|_| Rc::new(0));
        let b = pool.create(|_| Rc::new(0));
        drop(a);
        drop(b);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.live_count(), 0);

        let _c = pool.create(|_| Rc::new(0));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn live_skips_dead_players() {
        let pool = PlayerPool::<u8>::new("test");
        let a = pool.create(|_| Rc::new(1));
        let b = pool.create(|_| Rc::new(2));
        drop(a);
        let live = pool.live();
        assert_eq!(live.len(), 1);
        assert!(Rc::ptr_eq(&live[0].1, &b));
        assert!(pool.get(PlayerId(1)).is_none());
    }

    #[test]
    fn build_may_inspect_pool() {
        let pool = Rc::new(PlayerPool::<usize>::new("test"));
        let inner = Rc::clone(&pool);
        let player = pool.create(move |_| Rc::new(inner.len()));
        assert_eq!(*player, 0);
    }
}
