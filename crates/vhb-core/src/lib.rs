#![forbid(unsafe_code)]

//! Core: value model, metrics transform, and host value marshalling.
//!
//! # Role in the viewhost bridge
//! `vhb-core` is the pure layer. It owns the engine's dynamic value model,
//! the density transform between engine units (dp) and host pixels, and the
//! recursive marshaller that converts between the two value worlds.
//!
//! # Primary responsibilities
//! - **DynamicValue**: closed tagged union of everything the engine can expose.
//! - **MetricsTransform**: immutable dp ⇄ px converter plus the chosen viewport.
//! - **TransformSlot**: per-instance slot holding the current transform snapshot.
//! - **Marshalling**: `to_host_value` / `to_engine_value`.
//!
//! # How it fits in the system
//! The runtime (`vhb-runtime`) owns resolution handles, request registries and
//! player pools. Every property read it performs goes through this crate with a
//! transform snapshot loaded fresh from the instance slot.

pub mod color;
pub mod geometry;
pub mod marshal;
pub mod metrics;
pub mod transform_slot;
pub mod value;

pub use color::Color;
pub use geometry::{Point, Radii, Rect, Size};
pub use marshal::{properties_to_host, to_engine_value, to_host_value};
pub use metrics::{
    Metrics, MetricsTransform, REFERENCE_DPI, ScalingOptions, ScreenShape, ViewportMode,
    ViewportSpecification,
};
pub use transform_slot::TransformSlot;
pub use value::DynamicValue;
