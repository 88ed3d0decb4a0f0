#![forbid(unsafe_code)]

//! Video player shim.
//!
//! A [`MediaPlayer`] forwards engine commands to a host player and reports
//! host state changes back through the engine callback. It holds at most one
//! action: the one from the last foreground `play`. Any later command
//! resolves that action before doing its own work, so a `play` never
//! outlives the command that superseded it.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde::Serialize;

use crate::engine::{MediaPlayerCallback, MediaPlayerFactory};
use crate::pool::{PlayerId, PlayerPool};
use crate::resolution::ResolutionHandle;

/// Which audio track the player outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(into = "i32")]
pub enum AudioTrack {
    Background = 0,
    #[default]
    Foreground = 1,
    None = 2,
}

impl AudioTrack {
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::Background),
            1 => Some(Self::Foreground),
            2 => Some(Self::None),
            _ => None,
        }
    }
}

impl From<AudioTrack> for i32 {
    fn from(track: AudioTrack) -> Self {
        track as i32
    }
}

/// Host-reported player events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPlayerEventType {
    End = 0,
    Pause = 1,
    Play = 2,
    TimeUpdate = 3,
    TrackUpdate = 4,
    TrackReady = 5,
    TrackFail = 6,
}

impl MediaPlayerEventType {
    pub const fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => Self::End,
            1 => Self::Pause,
            2 => Self::Play,
            3 => Self::TimeUpdate,
            4 => Self::TrackUpdate,
            5 => Self::TrackReady,
            6 => Self::TrackFail,
            _ => return None,
        })
    }

    /// End and TrackFail settle the held action.
    pub const fn settles_action(self) -> bool {
        matches!(self, Self::End | Self::TrackFail)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(into = "i32")]
pub enum TrackState {
    #[default]
    NotReady = 0,
    Ready = 1,
    Failed = 2,
}

impl TrackState {
    pub const fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(Self::NotReady),
            1 => Some(Self::Ready),
            2 => Some(Self::Failed),
            _ => None,
        }
    }
}

impl From<TrackState> for i32 {
    fn from(state: TrackState) -> Self {
        state as i32
    }
}

/// Last state reported by the host player. Times are milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaState {
    pub track_index: i32,
    pub track_count: i32,
    pub current_time: i32,
    pub duration: i32,
    pub paused: bool,
    pub ended: bool,
    pub muted: bool,
    pub track_state: TrackState,
    pub error_code: i32,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            track_index: 0,
            track_count: 0,
            current_time: 0,
            duration: 0,
            paused: true,
            ended: false,
            muted: false,
            track_state: TrackState::NotReady,
            error_code: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextTrackKind {
    #[serde(rename = "captions")]
    Caption,
    #[serde(rename = "unsupported")]
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextTrack {
    pub kind: TextTrackKind,
    pub url: String,
    pub description: String,
}

/// One entry of a track list, as handed to the host.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaTrack {
    pub url: String,
    pub offset: i32,
    pub duration: i32,
    pub repeat_count: i32,
    pub text_tracks: Vec<TextTrack>,
}

impl MediaTrack {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Host-side video player.
pub trait HostMediaPlayer {
    fn play(&self, wait_for_finish: bool);
    fn pause(&self);
    fn stop(&self);
    fn next(&self);
    fn previous(&self);
    fn rewind(&self);
    fn seek(&self, offset: i32);
    fn set_track_index(&self, index: i32);
    fn set_track_list(&self, tracks: &[MediaTrack]);
    fn set_audio_track(&self, track: AudioTrack);
    fn set_mute(&self, mute: bool);
}

/// Creates host players for new shims.
pub trait MediaHost {
    fn create_player(&self, id: PlayerId) -> Box<dyn HostMediaPlayer>;
}

struct PlayerState {
    released: bool,
    halted: bool,
    audio_track: AudioTrack,
    action: Option<ResolutionHandle>,
    media_state: MediaState,
}

pub struct MediaPlayer {
    id: PlayerId,
    me: Weak<MediaPlayer>,
    host: Box<dyn HostMediaPlayer>,
    callback: MediaPlayerCallback,
    state: RefCell<PlayerState>,
}

impl MediaPlayer {
    pub fn new(
        id: PlayerId,
        host: Box<dyn HostMediaPlayer>,
        callback: MediaPlayerCallback,
    ) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            id,
            me: me.clone(),
            host,
            callback,
            state: RefCell::new(PlayerState {
                released: false,
                halted: false,
                audio_track: AudioTrack::default(),
                action: None,
                media_state: MediaState::default(),
            }),
        })
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Neither released nor halted.
    pub fn is_active(&self) -> bool {
        let state = self.state.borrow();
        !state.released && !state.halted
    }

    pub fn audio_track(&self) -> AudioTrack {
        self.state.borrow().audio_track
    }

    pub fn media_state(&self) -> MediaState {
        self.state.borrow().media_state.clone()
    }

    /// True while a foreground `play` action is held.
    pub fn holds_action(&self) -> bool {
        self.state.borrow().action.is_some()
    }

    fn resolve_existing_action(&self) {
        let held = self.state.borrow_mut().action.take();
        if let Some(action) = held {
            if action.is_pending() {
                action.resolve();
            }
        }
    }

    pub fn release(&self) {
        self.resolve_existing_action();
        self.state.borrow_mut().released = true;
        tracing::debug!(target: "vhb.media", id = self.id.0, "player released");
    }

    pub fn halt(&self) {
        if !self.is_active() {
            return;
        }
        self.resolve_existing_action();
        self.state.borrow_mut().halted = true;
        self.host.stop();
    }

    pub fn set_track_list(&self, tracks: &[MediaTrack]) {
        if !self.is_active() {
            return;
        }
        self.resolve_existing_action();
        self.host.set_track_list(tracks);
    }

    /// Start playback.
    ///
    /// Inactive players resolve `action` immediately. In foreground mode the
    /// action is held until the track ends or fails; otherwise it resolves
    /// right away.
    pub fn play(&self, action: Option<ResolutionHandle>) {
        if !self.is_active() {
            if let Some(action) = action {
                action.resolve();
            }
            return;
        }
        self.resolve_existing_action();

        let mut wait_for_finish = false;
        if let Some(action) = action {
            if self.audio_track() == AudioTrack::Foreground {
                wait_for_finish = true;
                let me = self.me.clone();
                action.add_terminate_observer(move || {
                    if let Some(player) = me.upgrade() {
                        let mut state = player.state.borrow_mut();
                        if state
                            .action
                            .as_ref()
                            .is_some_and(ResolutionHandle::is_terminated)
                        {
                            state.action = None;
                        }
                    }
                });
                self.state.borrow_mut().action = Some(action);
            } else {
                action.resolve();
            }
        }
        self.host.play(wait_for_finish);
    }

    pub fn pause(&self) {
        if self.begin_command() {
            self.host.pause();
        }
    }

    pub fn next(&self) {
        if self.begin_command() {
            self.host.next();
        }
    }

    pub fn previous(&self) {
        if self.begin_command() {
            self.host.previous();
        }
    }

    pub fn rewind(&self) {
        if self.begin_command() {
            self.host.rewind();
        }
    }

    pub fn seek(&self, offset: i32) {
        if self.begin_command() {
            self.host.seek(offset);
        }
    }

    pub fn set_track_index(&self, index: i32) {
        if self.begin_command() {
            self.host.set_track_index(index);
        }
    }

    /// Does not touch the held action.
    pub fn set_audio_track(&self, track: AudioTrack) {
        if !self.is_active() {
            return;
        }
        self.state.borrow_mut().audio_track = track;
        self.host.set_audio_track(track);
    }

    /// Forwarded even when inactive.
    pub fn set_mute(&self, mute: bool) {
        self.host.set_mute(mute);
    }

    fn begin_command(&self) -> bool {
        if !self.is_active() {
            return false;
        }
        self.resolve_existing_action();
        true
    }

    /// Record host-reported state.
    pub fn update_media_state(&self, state: MediaState) {
        self.state.borrow_mut().media_state = state;
    }

    /// Parse and record a host state payload. Returns `false` (state
    /// untouched) when a required field is missing.
    pub fn update_media_state_json(&self, json: &str) -> bool {
        match crate::input::parse_media_state(json) {
            Ok(state) => {
                self.update_media_state(state);
                true
            }
            Err(err) => {
                tracing::error!(
                    target: "vhb.media",
                    id = self.id.0,
                    error = %err,
                    "cannot update media state"
                );
                false
            }
        }
    }

    /// Report a host event to the engine.
    pub fn do_callback(&self, event: MediaPlayerEventType) {
        if !self.is_active() {
            return;
        }
        if event.settles_action() {
            self.resolve_existing_action();
        }
        let state = self.media_state();
        (self.callback)(event, &state);
    }

    /// [`Self::do_callback`] from a raw event code. Unknown codes are ignored.
    pub fn do_callback_code(&self, code: i32) -> bool {
        match MediaPlayerEventType::from_code(code) {
            Some(event) => {
                self.do_callback(event);
                true
            }
            None => {
                tracing::error!(target: "vhb.media", id = self.id.0, code, "unknown media event type");
                false
            }
        }
    }
}

impl core::fmt::Debug for MediaPlayer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MediaPlayer")
            .field("id", &self.id)
            .field("released", &state.released)
            .field("halted", &state.halted)
            .field("audio_track", &state.audio_track)
            .field("holds_action", &state.action.is_some())
            .finish()
    }
}

/// Engine-facing media factory over a [`PlayerPool`].
pub struct MediaPlayerPool {
    host: Rc<dyn MediaHost>,
    pool: PlayerPool<MediaPlayer>,
}

impl MediaPlayerPool {
    pub fn new(host: Rc<dyn MediaHost>) -> Self {
        Self {
            host,
            pool: PlayerPool::new("media"),
        }
    }

    /// Player for host callbacks.
    pub fn player(&self, id: PlayerId) -> Option<Rc<MediaPlayer>> {
        self.pool.get(id)
    }

    pub fn pool(&self) -> &PlayerPool<MediaPlayer> {
        &self.pool
    }
}

impl MediaPlayerFactory for MediaPlayerPool {
    fn create_player(&self, callback: MediaPlayerCallback) -> Rc<MediaPlayer> {
        self.pool.create(|id| {
            let host = self.host.create_player(id);
            MediaPlayer::new(id, host, callback)
        })
    }
}

impl core::fmt::Debug for MediaPlayerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MediaPlayerPool")
            .field("pool", &self.pool)
            .finish()
    }
}
