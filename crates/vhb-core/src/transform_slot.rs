#![forbid(unsafe_code)]

//! Per-instance slot holding the current [`MetricsTransform`] snapshot.
//!
//! Every engine instance owns exactly one slot. Readers take a snapshot
//! (`Arc<MetricsTransform>`) per marshalling operation and never keep a
//! borrowed reference across a host callback. Configuration changes build a
//! fresh transform and swap it in; snapshots handed out earlier stay valid
//! and unchanged for as long as their holders keep them.
//!
//! # Constraints
//!
//! - `#![forbid(unsafe_code)]`: all pointer swapping is delegated to `arc-swap`.
//! - Read path allocates nothing (`load_ref` returns a guard).
//! - Write path allocates one `Arc` per swap.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::metrics::MetricsTransform;

/// Atomically swappable holder of the current transform.
pub struct TransformSlot {
    inner: ArcSwap<MetricsTransform>,
}

impl TransformSlot {
    /// Create a slot with an initial transform.
    pub fn new(transform: MetricsTransform) -> Self {
        Self {
            inner: ArcSwap::from_pointee(transform),
        }
    }

    /// Current snapshot with shared ownership.
    ///
    /// Use this when the snapshot must outlive the current call (for example
    /// when it is attached to an event handed to the host).
    #[inline]
    pub fn load(&self) -> Arc<MetricsTransform> {
        self.inner.load_full()
    }

    /// Read without bumping the reference count.
    ///
    /// Prefer this for a single marshalling pass.
    #[inline]
    pub fn load_ref(&self) -> arc_swap::Guard<Arc<MetricsTransform>> {
        self.inner.load()
    }

    /// Replace the transform wholesale and return the previous snapshot.
    pub fn swap(&self, transform: MetricsTransform) -> Arc<MetricsTransform> {
        let next = Arc::new(transform);
        tracing::debug!(
            target: "vhb.metrics",
            scale_to_host = next.scale_to_host(),
            dpi = next.dpi(),
            "metrics transform replaced"
        );
        self.inner.swap(next)
    }
}

impl core::fmt::Debug for TransformSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TransformSlot")
            .field("current", &*self.inner.load())
            .finish()
    }
}
