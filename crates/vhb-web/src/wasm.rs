#![forbid(unsafe_code)]

//! `wasm-bindgen` exports for the engine-independent bridge objects.
//!
//! Each host-facing trait from `vhb-runtime` gets a JS-backed
//! implementation here (a callback or a host object with named methods),
//! and each manager gets an exported wrapper the host completes requests
//! through. Only compiled on `wasm32` targets.

use std::cell::RefCell;
use std::rc::Rc;

use js_sys::{Array, Function, JSON, Object, Reflect};
use serde_json::Value;
use tracing_subscriber::layer::SubscriberExt;
use vhb_core::Rect;
use vhb_runtime::{
    AudioHost, AudioPlayerFactory, AudioPlayerPool, AudioTrack, DeterministicClock,
    DocumentHandle, DocumentHost, EmbedRequestHandler, HostAudioPlayer, HostLogLayer,
    HostMediaPlayer, HostServices, ImportRequest, LogBuffer, LogLevel, LogTransport, MeasureMode,
    MediaHost, MediaPlayerFactory, MediaPlayerPool, MediaTrack, PackageHost, PackageLoader,
    PlayerId, RequestId, ResolutionHandle, ResolutionPayload, TextMeasureHost,
};
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::*;

/// Records kept for the host between `Logger.flush` calls.
const LOG_CAPACITY: usize = 1024;

fn console_error(msg: &str) {
    let global = js_sys::global();
    let Ok(console) = Reflect::get(&global, &"console".into()) else {
        return;
    };
    let Ok(error) = Reflect::get(&console, &"error".into()) else {
        return;
    };
    let Ok(error_fn) = error.dyn_into::<Function>() else {
        return;
    };
    let _ = error_fn.call1(&console, &JsValue::from_str(msg));
}

fn install_panic_hook() {
    use std::sync::Once;

    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let msg = if let Some(loc) = info.location() {
                format!(
                    "panic at {}:{}:{}: {info}",
                    loc.file(),
                    loc.line(),
                    loc.column()
                )
            } else {
                format!("panic: {info}")
            };
            console_error(&msg);
        }));
    });
}

fn set_js(obj: &Object, key: &str, value: JsValue) {
    let _ = Reflect::set(obj, &JsValue::from_str(key), &value);
}

/// Call `target[name](...args)`. Missing methods and thrown errors are
/// logged and come back as `undefined`.
fn call_method(target: &JsValue, name: &str, args: &[JsValue]) -> JsValue {
    let method = Reflect::get(target, &JsValue::from_str(name))
        .ok()
        .and_then(|value| value.dyn_into::<Function>().ok());
    let Some(method) = method else {
        tracing::error!(target: "vhb.web", method = name, "host object has no such method");
        return JsValue::UNDEFINED;
    };
    let args: Array = args.iter().collect();
    method.apply(target, &args).unwrap_or_else(|err| {
        tracing::error!(target: "vhb.web", method = name, error = ?err, "host method threw");
        JsValue::UNDEFINED
    })
}

/// Call a free-standing host callback.
fn call_function(callback: &Function, args: &[JsValue]) -> JsValue {
    let args: Array = args.iter().collect();
    callback.apply(&JsValue::NULL, &args).unwrap_or_else(|err| {
        tracing::error!(target: "vhb.web", error = ?err, "host callback threw");
        JsValue::UNDEFINED
    })
}

/// Serialize a JS value and parse it as JSON. Unrepresentable values come
/// back as `null`.
fn js_to_json(value: &JsValue) -> Value {
    JSON::stringify(value)
        .ok()
        .and_then(|text| text.as_string())
        .and_then(|text| serde_json::from_str(&text).ok())
        .unwrap_or(Value::Null)
}

fn json_to_js(value: &Value) -> JsValue {
    JSON::parse(&value.to_string()).unwrap_or(JsValue::NULL)
}

fn rect_to_js(rect: Rect) -> JsValue {
    let obj = Object::new();
    set_js(&obj, "x", JsValue::from_f64(rect.x));
    set_js(&obj, "y", JsValue::from_f64(rect.y));
    set_js(&obj, "width", JsValue::from_f64(rect.width));
    set_js(&obj, "height", JsValue::from_f64(rect.height));
    obj.into()
}

fn payload_to_js(payload: &ResolutionPayload) -> JsValue {
    match payload {
        ResolutionPayload::None => JsValue::UNDEFINED,
        ResolutionPayload::Argument(argument) => JsValue::from_f64(f64::from(*argument)),
        ResolutionPayload::Rect(rect) => rect_to_js(*rect),
    }
}

#[wasm_bindgen(start)]
pub fn wasm_start() {
    install_panic_hook();
}

// ---------------------------------------------------------------------------
// Action
// ---------------------------------------------------------------------------

/// A resolution handle shared with the host.
#[wasm_bindgen]
pub struct Action {
    inner: ResolutionHandle,
}

#[wasm_bindgen]
impl Action {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            inner: ResolutionHandle::new(),
        }
    }

    pub fn resolve(&self) -> bool {
        self.inner.resolve()
    }

    #[wasm_bindgen(js_name = resolveWithArg)]
    pub fn resolve_with_arg(&self, argument: i32) -> bool {
        self.inner.resolve_with_arg(argument)
    }

    /// Resolve with a rectangle already in engine units.
    #[wasm_bindgen(js_name = resolveWithRect)]
    pub fn resolve_with_rect(&self, x: f64, y: f64, width: f64, height: f64) -> bool {
        self.inner.resolve_with_rect(Rect::new(x, y, width, height))
    }

    pub fn terminate(&self) -> bool {
        self.inner.terminate()
    }

    /// Invoke `callback(argument)` once the action resolves. A later
    /// registration replaces an earlier one while pending.
    pub fn then(&self, callback: Function) {
        self.inner.then(move |payload| {
            let _ = call_function(&callback, &[payload_to_js(payload)]);
        });
    }

    #[wasm_bindgen(js_name = addTerminateCallback)]
    pub fn add_terminate_callback(&self, callback: Function) {
        self.inner.add_terminate_observer(move || {
            let _ = call_function(&callback, &[]);
        });
    }

    #[wasm_bindgen(js_name = isPending)]
    pub fn is_pending(&self) -> bool {
        self.inner.is_pending()
    }

    #[wasm_bindgen(js_name = isResolved)]
    pub fn is_resolved(&self) -> bool {
        self.inner.is_resolved()
    }

    #[wasm_bindgen(js_name = isTerminated)]
    pub fn is_terminated(&self) -> bool {
        self.inner.is_terminated()
    }
}

impl Default for Action {
    fn default() -> Self {
        Self::new()
    }
}

impl Action {
    /// Share an engine-side handle with the host.
    pub fn from_handle(inner: ResolutionHandle) -> Self {
        Self { inner }
    }

    pub fn handle(&self) -> &ResolutionHandle {
        &self.inner
    }
}

// ---------------------------------------------------------------------------
// Documents and packages
// ---------------------------------------------------------------------------

struct JsDocumentHost {
    request: Function,
}

impl DocumentHost for JsDocumentHost {
    fn request_embed(&self, id: RequestId, url: &str, headers: &[String]) {
        let headers: Array = headers.iter().map(|h| JsValue::from_str(h)).collect();
        let _ = call_function(
            &self.request,
            &[
                JsValue::from_f64(id.0 as f64),
                JsValue::from_str(url),
                headers.into(),
            ],
        );
    }
}

/// Embedded-document requests. The host answers `request(id, url, headers)`
/// through `embedRequestSucceeded` or `embedRequestFailed`.
#[wasm_bindgen(js_name = DocumentManager)]
pub struct WebDocumentManager {
    inner: Rc<vhb_runtime::DocumentManager>,
}

#[wasm_bindgen(js_class = DocumentManager)]
impl WebDocumentManager {
    #[wasm_bindgen(constructor)]
    pub fn new(request: Function) -> Self {
        Self {
            inner: Rc::new(vhb_runtime::DocumentManager::new(Rc::new(JsDocumentHost {
                request,
            }))),
        }
    }

    /// Returns the nested document handle, or `undefined` when the request
    /// is unknown or the engine built nothing.
    #[wasm_bindgen(js_name = embedRequestSucceeded)]
    pub fn embed_request_succeeded(
        &self,
        id: f64,
        url: &str,
        document: String,
        document_config: Option<String>,
        connected_visual_context: bool,
    ) -> Option<f64> {
        let config = match document_config.as_deref().map(serde_json::from_str::<Value>) {
            Some(Ok(config)) => Some(config),
            Some(Err(err)) => {
                tracing::error!(target: "vhb.web", error = %err, "document config is not JSON");
                None
            }
            None => None,
        };
        self.inner
            .embed_request_succeeded(
                RequestId(id as u64),
                url,
                document,
                config,
                connected_visual_context,
            )
            .map(|DocumentHandle(handle)| handle as f64)
    }

    #[wasm_bindgen(js_name = embedRequestFailed)]
    pub fn embed_request_failed(&self, id: f64, url: &str, failure: &str) -> bool {
        self.inner
            .embed_request_failed(RequestId(id as u64), url, failure)
    }

    pub fn pending(&self) -> u32 {
        u32::try_from(self.inner.pending()).unwrap_or(u32::MAX)
    }

    pub fn destroy(&self) {
        self.inner.destroy();
    }
}

impl WebDocumentManager {
    pub fn manager(&self) -> Rc<vhb_runtime::DocumentManager> {
        Rc::clone(&self.inner)
    }
}

struct JsPackageHost {
    import: Function,
}

impl PackageHost for JsPackageHost {
    fn import_package(&self, request: &ImportRequest) {
        let payload = serde_json::to_value(request).unwrap_or(Value::Null);
        let _ = call_function(&self.import, &[json_to_js(&payload)]);
    }
}

/// Package imports. The host answers `import({name, version, source,
/// reference})` by echoing `reference` back.
#[wasm_bindgen(js_name = PackageManager)]
pub struct WebPackageManager {
    inner: Rc<vhb_runtime::PackageManager>,
}

#[wasm_bindgen(js_class = PackageManager)]
impl WebPackageManager {
    #[wasm_bindgen(constructor)]
    pub fn new(import: Function) -> Self {
        Self {
            inner: Rc::new(vhb_runtime::PackageManager::new(Rc::new(JsPackageHost {
                import,
            }))),
        }
    }

    #[wasm_bindgen(js_name = importPackageSucceeded)]
    pub fn import_package_succeeded(&self, reference: &str, package_json: &str) -> bool {
        self.inner.import_package_succeeded(reference, package_json)
    }

    #[wasm_bindgen(js_name = importPackageFailed)]
    pub fn import_package_failed(&self, reference: &str, message: &str, code: i32) -> bool {
        self.inner.import_package_failed(reference, message, code)
    }

    pub fn pending(&self) -> u32 {
        u32::try_from(self.inner.pending()).unwrap_or(u32::MAX)
    }

    pub fn destroy(&self) {
        self.inner.destroy();
    }
}

impl WebPackageManager {
    pub fn manager(&self) -> Rc<vhb_runtime::PackageManager> {
        Rc::clone(&self.inner)
    }
}

// ---------------------------------------------------------------------------
// Media and audio players
// ---------------------------------------------------------------------------

/// A host player object; commands become method calls on it.
struct JsPlayer {
    target: JsValue,
}

impl HostMediaPlayer for JsPlayer {
    fn play(&self, wait_for_finish: bool) {
        call_method(&self.target, "play", &[JsValue::from_bool(wait_for_finish)]);
    }

    fn pause(&self) {
        call_method(&self.target, "pause", &[]);
    }

    fn stop(&self) {
        call_method(&self.target, "stop", &[]);
    }

    fn next(&self) {
        call_method(&self.target, "next", &[]);
    }

    fn previous(&self) {
        call_method(&self.target, "previous", &[]);
    }

    fn rewind(&self) {
        call_method(&self.target, "rewind", &[]);
    }

    fn seek(&self, offset: i32) {
        call_method(&self.target, "seek", &[JsValue::from_f64(f64::from(offset))]);
    }

    fn set_track_index(&self, index: i32) {
        call_method(
            &self.target,
            "setTrackIndex",
            &[JsValue::from_f64(f64::from(index))],
        );
    }

    fn set_track_list(&self, tracks: &[MediaTrack]) {
        let payload = serde_json::to_value(tracks).unwrap_or(Value::Null);
        call_method(&self.target, "setTrackList", &[json_to_js(&payload)]);
    }

    fn set_audio_track(&self, track: AudioTrack) {
        call_method(
            &self.target,
            "setAudioTrack",
            &[JsValue::from_f64(f64::from(i32::from(track)))],
        );
    }

    fn set_mute(&self, mute: bool) {
        call_method(&self.target, "setMute", &[JsValue::from_bool(mute)]);
    }
}

impl HostAudioPlayer for JsPlayer {
    fn prepare(&self, url: &str, buffered: bool) -> String {
        call_method(
            &self.target,
            "prepare",
            &[JsValue::from_str(url), JsValue::from_bool(buffered)],
        )
        .as_string()
        .unwrap_or_default()
    }

    fn play(&self, playback_id: &str) {
        call_method(&self.target, "play", &[JsValue::from_str(playback_id)]);
    }

    fn flush(&self) {
        call_method(&self.target, "flush", &[]);
    }

    fn release_audio_context(&self) {
        call_method(&self.target, "releaseAudioContext", &[]);
    }
}

/// Builds host player objects with `create(id)`.
struct JsPlayerHost {
    create: Function,
}

impl JsPlayerHost {
    fn create(&self, id: PlayerId) -> JsPlayer {
        JsPlayer {
            target: call_function(&self.create, &[JsValue::from_f64(id.0 as f64)]),
        }
    }
}

impl MediaHost for JsPlayerHost {
    fn create_player(&self, id: PlayerId) -> Box<dyn HostMediaPlayer> {
        Box::new(self.create(id))
    }
}

impl AudioHost for JsPlayerHost {
    fn create_player(&self, id: PlayerId) -> Box<dyn HostAudioPlayer> {
        Box::new(self.create(id))
    }
}

/// Media player pool. The host reports state and events by player id.
#[wasm_bindgen(js_name = MediaPlayerFactory)]
pub struct WebMediaPlayerFactory {
    inner: Rc<MediaPlayerPool>,
}

#[wasm_bindgen(js_class = MediaPlayerFactory)]
impl WebMediaPlayerFactory {
    #[wasm_bindgen(constructor)]
    pub fn new(create: Function) -> Self {
        Self {
            inner: Rc::new(MediaPlayerPool::new(Rc::new(JsPlayerHost { create }))),
        }
    }

    #[wasm_bindgen(js_name = updateMediaState)]
    pub fn update_media_state(&self, id: f64, state_json: &str) -> bool {
        self.inner
            .player(PlayerId(id as u64))
            .is_some_and(|player| player.update_media_state_json(state_json))
    }

    #[wasm_bindgen(js_name = doCallback)]
    pub fn do_callback(&self, id: f64, event: i32) -> bool {
        self.inner
            .player(PlayerId(id as u64))
            .is_some_and(|player| player.do_callback_code(event))
    }

    #[wasm_bindgen(js_name = liveCount)]
    pub fn live_count(&self) -> u32 {
        u32::try_from(self.inner.pool().live_count()).unwrap_or(u32::MAX)
    }
}

impl WebMediaPlayerFactory {
    pub fn pool(&self) -> Rc<MediaPlayerPool> {
        Rc::clone(&self.inner)
    }
}

/// Audio player pool with its own clock. The host drives `tick` once per
/// frame and reports playback progress by player id.
#[wasm_bindgen(js_name = AudioPlayerFactory)]
pub struct WebAudioPlayerFactory {
    inner: Rc<AudioPlayerPool>,
}

#[wasm_bindgen(js_class = AudioPlayerFactory)]
impl WebAudioPlayerFactory {
    #[wasm_bindgen(constructor)]
    pub fn new(create: Function) -> Self {
        Self {
            inner: Rc::new(AudioPlayerPool::new(
                Rc::new(JsPlayerHost { create }),
                DeterministicClock::new(),
            )),
        }
    }

    /// Set the pool clock in milliseconds. Non-finite or negative values
    /// are ignored.
    #[wasm_bindgen(js_name = setTime)]
    pub fn set_time(&self, ms: f64) -> bool {
        self.inner.clock().set_ms(ms)
    }

    pub fn tick(&self) {
        self.inner.tick();
    }

    #[wasm_bindgen(js_name = onPrepared)]
    pub fn on_prepared(&self, id: f64, playback_id: &str) {
        if let Some(player) = self.inner.player(PlayerId(id as u64)) {
            player.on_prepared(playback_id);
        }
    }

    #[wasm_bindgen(js_name = onMarker)]
    pub fn on_marker(&self, id: f64, playback_id: &str, markers_json: &str) -> bool {
        self.inner
            .player(PlayerId(id as u64))
            .is_some_and(|player| player.on_marker(playback_id, markers_json))
    }

    #[wasm_bindgen(js_name = onPlaybackStarted)]
    pub fn on_playback_started(&self, id: f64, playback_id: &str) {
        if let Some(player) = self.inner.player(PlayerId(id as u64)) {
            player.on_playback_started(playback_id);
        }
    }

    #[wasm_bindgen(js_name = onPlaybackFinished)]
    pub fn on_playback_finished(&self, id: f64, playback_id: &str) {
        if let Some(player) = self.inner.player(PlayerId(id as u64)) {
            player.on_playback_finished(playback_id);
        }
    }

    #[wasm_bindgen(js_name = onError)]
    pub fn on_error(&self, id: f64, playback_id: &str, reason: &str) {
        if let Some(player) = self.inner.player(PlayerId(id as u64)) {
            player.on_error(playback_id, reason);
        }
    }
}

impl WebAudioPlayerFactory {
    pub fn pool(&self) -> Rc<AudioPlayerPool> {
        Rc::clone(&self.inner)
    }
}

// ---------------------------------------------------------------------------
// Text measurement
// ---------------------------------------------------------------------------

/// Text measurement through a host callback
/// `measure(component, width, widthMode, height, heightMode)`.
pub struct JsTextMeasureHost {
    measure: Function,
}

impl JsTextMeasureHost {
    pub fn new(measure: Function) -> Self {
        Self { measure }
    }
}

impl TextMeasureHost for JsTextMeasureHost {
    fn measure(
        &self,
        component: &str,
        width: f64,
        width_mode: MeasureMode,
        height: f64,
        height_mode: MeasureMode,
    ) -> Value {
        let answer = call_function(
            &self.measure,
            &[
                JsValue::from_str(component),
                JsValue::from_f64(width),
                JsValue::from_f64(f64::from(width_mode as i32)),
                JsValue::from_f64(height),
                JsValue::from_f64(f64::from(height_mode as i32)),
            ],
        );
        js_to_json(&answer)
    }
}

/// Engine-facing services over the exported managers. Absent managers stay
/// unset. Text measurement is installed per instance by the bridge context.
pub fn host_services(
    documents: Option<&WebDocumentManager>,
    packages: Option<&WebPackageManager>,
    media: Option<&WebMediaPlayerFactory>,
    audio: Option<&WebAudioPlayerFactory>,
) -> HostServices {
    HostServices {
        documents: documents.map(|d| d.manager() as Rc<dyn EmbedRequestHandler>),
        packages: packages.map(|p| p.manager() as Rc<dyn PackageLoader>),
        media: media.map(|m| m.pool() as Rc<dyn MediaPlayerFactory>),
        audio: audio.map(|a| a.pool() as Rc<dyn AudioPlayerFactory>),
        text: None,
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

struct JsLogTransport<'a> {
    callback: &'a Function,
}

impl LogTransport for JsLogTransport<'_> {
    fn transport(&self, level: LogLevel, message: &str) {
        let _ = self.callback.call2(
            &JsValue::NULL,
            &JsValue::from_f64(f64::from(level.code())),
            &JsValue::from_str(message),
        );
    }
}

thread_local! {
    static LOG_SINK: RefCell<Option<(LogBuffer, Function)>> = const { RefCell::new(None) };
}

/// Host log transport.
///
/// JS callbacks cannot be shared across threads, so records are buffered by
/// a global `tracing` layer and handed to the transport on `flush`.
#[wasm_bindgen]
pub struct Logger;

#[wasm_bindgen]
impl Logger {
    /// Route bridge logs to `transport(level, message)`. The first call
    /// installs the global subscriber; later calls replace the callback.
    #[wasm_bindgen(js_name = setLogTransport)]
    pub fn set_log_transport(transport: Function) -> bool {
        LOG_SINK.with(|sink| {
            let mut sink = sink.borrow_mut();
            if let Some((_, callback)) = sink.as_mut() {
                *callback = transport;
                return true;
            }
            let (layer, buffer) = HostLogLayer::buffered(LOG_CAPACITY);
            let subscriber = tracing_subscriber::registry().with(layer);
            if tracing::subscriber::set_global_default(subscriber).is_err() {
                console_error("vhb: a global tracing subscriber is already installed");
                return false;
            }
            *sink = Some((buffer, transport));
            true
        })
    }

    /// Forward buffered records. Returns how many were delivered.
    pub fn flush() -> u32 {
        // Take the callback out first so a transport that logs cannot
        // re-enter the borrow.
        let taken = LOG_SINK.with(|sink| {
            sink.borrow()
                .as_ref()
                .map(|(buffer, callback)| (buffer.clone(), callback.clone()))
        });
        let Some((buffer, callback)) = taken else {
            return 0;
        };
        let delivered = buffer.forward_to(&JsLogTransport {
            callback: &callback,
        });
        u32::try_from(delivered).unwrap_or(u32::MAX)
    }
}
