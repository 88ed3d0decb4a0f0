#![forbid(unsafe_code)]

//! Viewhost bridge runtime
//!
//! This crate sits between a host (a browser page, a test harness) and an
//! external layout engine. It owns everything that has identity or a
//! lifetime: actions, pending requests, media players, and the engine
//! instance itself.
//!
//! # Key Components
//!
//! - [`ResolutionHandle`] - one-shot pending/resolved/terminated cell with observers
//! - [`PendingRegistry`] - correlation of asynchronous host work by request id
//! - [`DocumentManager`] / [`PackageManager`] - embedded documents and package imports
//! - [`PlayerPool`] - weakly-held players, pruned on create
//! - [`MediaPlayerPool`] / [`AudioPlayerPool`] - media and audio factories
//! - [`ViewportResolver`] - retry loop over candidate viewport specifications
//! - [`BridgeContext`] - host entry points for one engine instance
//! - [`HostLogLayer`] - `tracing` layer feeding a host log transport
//!
//! # Role in the viewhost bridge
//! `vhb-runtime` is the stateful layer. Pure conversions live in `vhb-core`;
//! the wasm surface in `vhb-web` is a thin adapter over this crate.
//!
//! # Threading
//! Single-threaded and cooperative. Shared state is `Rc`/`RefCell`, and no
//! borrow is held while a user callback or host hook runs.

pub mod audio;
pub mod clock;
pub mod config;
pub mod context;
pub mod documents;
pub mod engine;
pub mod error;
pub mod event;
pub mod input;
pub mod log_bridge;
pub mod media;
pub mod packages;
pub mod pool;
pub mod registry;
pub mod resolution;
pub mod text;
pub mod viewport;

pub use audio::{
    AudioHost, AudioPlayer, AudioPlayerEventType, AudioPlayerPool, AudioState, HostAudioPlayer,
    SpeechMark, SpeechMarkKind,
};
pub use clock::DeterministicClock;
pub use config::{
    AnimationQuality, ConfigurationChange, HostServices, KNOWN_DATA_SOURCES, RootConfig,
    RootSettings, ScreenMode,
};
pub use context::{Background, BridgeContext};
pub use documents::{DocumentHandle, DocumentHost, DocumentManager, EmbedContent, EmbedRequest};
pub use engine::{
    AudioPlayerFactory, ComponentId, DisplayState, EmbedRequestHandler, Engine, EngineEvent,
    FocusDirection, KeyHandlerType, Keyboard, MediaPlayerFactory, PackageLoader, PointerEvent,
    PointerEventType, PointerType, PropertyKey, RootContext, ScrollAlign,
};
pub use error::{CreateError, PayloadError, ResolveError};
pub use event::BridgeEvent;
pub use log_bridge::{HostLogLayer, LogBuffer, LogLevel, LogRecord, LogTransport};
pub use media::{
    AudioTrack, HostMediaPlayer, MediaHost, MediaPlayer, MediaPlayerEventType, MediaPlayerPool,
    MediaState, MediaTrack, TextTrack, TextTrackKind, TrackState,
};
pub use packages::{ImportRequest, PackageHost, PackageManager, PackageReference, PackageRequest};
pub use pool::{PlayerId, PlayerPool};
pub use registry::{Completion, PendingRegistry, PendingRequest, RequestId, RequestKind};
pub use resolution::{ResolutionHandle, ResolutionPayload, ResolutionState, WeakResolutionHandle};
pub use text::{EditTextBox, MeasureMode, TextLayout, TextMeasure, TextMeasureHost, TextMeasurement};
pub use viewport::{Resolved, ViewportResolver};
