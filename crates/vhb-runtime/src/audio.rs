#![forbid(unsafe_code)]

//! Speech/audio player shim.
//!
//! An [`AudioPlayer`] prepares one track through the host, plays it when the
//! engine asks, and reports progress. Progress offsets come from the shared
//! [`DeterministicClock`], so `tick` output depends only on the times the host
//! pushed.
//!
//! A player is *active* while it holds a pending play action. `tick` emits
//! `TimeUpdate` only while active and playing. `End` and `Fail` are reported
//! after the action settles.

use std::cell::RefCell;
use std::rc::Rc;

use serde::Serialize;

use crate::clock::DeterministicClock;
use crate::engine::{AudioPlayerCallback, AudioPlayerFactory, SpeechMarkCallback};
use crate::media::{MediaTrack, TrackState};
use crate::pool::{PlayerId, PlayerPool};
use crate::resolution::ResolutionHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioPlayerEventType {
    End = 0,
    Fail = 1,
    Pause = 2,
    Play = 3,
    Ready = 4,
    TimeUpdate = 5,
}

/// Snapshot handed to the engine with every event. Times are milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioState {
    pub current_time: f64,
    pub duration: f64,
    pub paused: bool,
    pub ended: bool,
    pub track_state: TrackState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeechMarkKind {
    Word,
    Viseme,
    Sentence,
    Ssml,
    Unknown,
}

impl SpeechMarkKind {
    /// Parse a host mark type. `visime` is accepted as a spelling of `viseme`.
    pub fn parse(name: &str) -> Self {
        match name {
            "word" => Self::Word,
            "viseme" | "visime" => Self::Viseme,
            "sentence" => Self::Sentence,
            "ssml" => Self::Ssml,
            _ => Self::Unknown,
        }
    }

    /// Word and SSML marks carry a text range.
    pub const fn has_range(self) -> bool {
        matches!(self, Self::Word | Self::Ssml)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeechMark {
    pub kind: SpeechMarkKind,
    pub time: f64,
    pub value: String,
    /// Zero unless `kind.has_range()`.
    pub start: f64,
    pub end: f64,
}

/// Host-side audio player.
pub trait HostAudioPlayer {
    /// Prepare `url` and return the host playback id.
    fn prepare(&self, url: &str, buffered: bool) -> String;
    fn play(&self, playback_id: &str);
    fn flush(&self);
    fn release_audio_context(&self);
}

pub trait AudioHost {
    fn create_player(&self, id: PlayerId) -> Box<dyn HostAudioPlayer>;
}

#[derive(Default)]
struct AudioPlayerState {
    action: Option<ResolutionHandle>,
    playback_id: String,
    prepared: bool,
    playing: bool,
    playback_start_ms: f64,
}

pub struct AudioPlayer {
    id: PlayerId,
    host: Box<dyn HostAudioPlayer>,
    callback: AudioPlayerCallback,
    marks: SpeechMarkCallback,
    clock: DeterministicClock,
    state: RefCell<AudioPlayerState>,
}

impl AudioPlayer {
    pub fn new(
        id: PlayerId,
        host: Box<dyn HostAudioPlayer>,
        callback: AudioPlayerCallback,
        marks: SpeechMarkCallback,
        clock: DeterministicClock,
    ) -> Rc<Self> {
        Rc::new(Self {
            id,
            host,
            callback,
            marks,
            clock,
            state: RefCell::new(AudioPlayerState::default()),
        })
    }

    pub fn id(&self) -> PlayerId {
        self.id
    }

    /// Holds a play action that has not settled.
    pub fn is_active(&self) -> bool {
        self.state
            .borrow()
            .action
            .as_ref()
            .is_some_and(ResolutionHandle::is_pending)
    }

    pub fn is_playing(&self) -> bool {
        self.state.borrow().playing
    }

    pub fn is_prepared(&self) -> bool {
        self.state.borrow().prepared
    }

    pub fn playback_id(&self) -> String {
        self.state.borrow().playback_id.clone()
    }

    fn resolve_existing_action(&self) {
        let held = {
            let mut state = self.state.borrow_mut();
            state.playing = false;
            state.action.take()
        };
        if let Some(action) = held {
            if action.is_pending() {
                action.resolve();
            }
        }
    }

    fn offset_ms(&self) -> f64 {
        (self.clock.now_ms() - self.state.borrow().playback_start_ms).max(0.0)
    }

    fn emit(&self, event: AudioPlayerEventType, paused: bool, ended: bool, track: TrackState) {
        let state = AudioState {
            current_time: self.offset_ms(),
            duration: 0.0,
            paused,
            ended,
            track_state: track,
        };
        (self.callback)(event, &state);
    }

    /// Per-frame progress. Emits `TimeUpdate` only while active and playing.
    pub fn tick(&self) {
        if self.is_active() && self.is_playing() {
            self.emit(AudioPlayerEventType::TimeUpdate, false, false, TrackState::Ready);
        }
    }

    /// Prepare `track` once. Later calls are ignored until `release`.
    pub fn set_track(&self, track: &MediaTrack) {
        if self.is_prepared() {
            return;
        }
        let playback_id = self.host.prepare(&track.url, true);
        tracing::debug!(target: "vhb.audio", id = self.id.0, playback = %playback_id, "track prepared");
        self.state.borrow_mut().playback_id = playback_id;
    }

    /// Settle any previous action and start playback (now, or once prepared).
    pub fn play(&self, action: ResolutionHandle) {
        self.resolve_existing_action();
        let start = {
            let mut state = self.state.borrow_mut();
            state.action = Some(action);
            state.prepared.then(|| state.playback_id.clone())
        };
        if let Some(playback_id) = start {
            self.host.play(&playback_id);
        }
    }

    pub fn pause(&self) {
        self.host.flush();
        self.resolve_existing_action();
    }

    pub fn release(&self) {
        self.host.release_audio_context();
        {
            let mut state = self.state.borrow_mut();
            state.playback_id.clear();
            state.prepared = false;
        }
        self.resolve_existing_action();
    }

    pub fn on_prepared(&self, playback_id: &str) {
        tracing::trace!(target: "vhb.audio", id = self.id.0, playback = playback_id, "prepared");
        let ready = AudioState {
            current_time: 0.0,
            duration: 0.0,
            paused: false,
            ended: false,
            track_state: TrackState::Ready,
        };
        (self.callback)(AudioPlayerEventType::Ready, &ready);
        let start = {
            let mut state = self.state.borrow_mut();
            state.prepared = true;
            state.action.is_some().then(|| state.playback_id.clone())
        };
        if let Some(playback_id) = start {
            self.host.play(&playback_id);
        }
    }

    /// Forward parsed speech marks. Returns `false` on a malformed payload.
    pub fn on_marker(&self, playback_id: &str, markers_json: &str) -> bool {
        match crate::input::parse_speech_marks(markers_json) {
            Ok(marks) => {
                (self.marks)(&marks);
                true
            }
            Err(err) => {
                tracing::error!(
                    target: "vhb.audio",
                    id = self.id.0,
                    playback = playback_id,
                    error = %err,
                    "cannot parse speech marks"
                );
                false
            }
        }
    }

    pub fn on_playback_started(&self, playback_id: &str) {
        tracing::trace!(target: "vhb.audio", id = self.id.0, playback = playback_id, "started");
        {
            let mut state = self.state.borrow_mut();
            state.playback_start_ms = self.clock.now_ms();
            state.playing = true;
        }
        if self.is_active() {
            self.emit(AudioPlayerEventType::Play, false, false, TrackState::Ready);
        }
    }

    pub fn on_playback_finished(&self, playback_id: &str) {
        let had_action = self.is_active();
        self.resolve_existing_action();
        if had_action {
            self.emit(AudioPlayerEventType::End, false, true, TrackState::Ready);
        } else {
            tracing::debug!(target: "vhb.audio", id = self.id.0, playback = playback_id, "finish without action");
        }
    }

    pub fn on_error(&self, playback_id: &str, reason: &str) {
        tracing::warn!(target: "vhb.audio", id = self.id.0, playback = playback_id, reason, "playback error");
        let had_action = self.is_active();
        self.resolve_existing_action();
        if had_action {
            self.emit(AudioPlayerEventType::Fail, false, true, TrackState::Failed);
        }
    }
}

impl core::fmt::Debug for AudioPlayer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("AudioPlayer")
            .field("id", &self.id)
            .field("playback_id", &state.playback_id)
            .field("prepared", &state.prepared)
            .field("playing", &state.playing)
            .finish()
    }
}

/// Engine-facing audio factory. `tick` visits every live player.
pub struct AudioPlayerPool {
    host: Rc<dyn AudioHost>,
    pool: PlayerPool<AudioPlayer>,
    clock: DeterministicClock,
}

impl AudioPlayerPool {
    pub fn new(host: Rc<dyn AudioHost>, clock: DeterministicClock) -> Self {
        Self {
            host,
            pool: PlayerPool::new("audio"),
            clock,
        }
    }

    pub fn player(&self, id: PlayerId) -> Option<Rc<AudioPlayer>> {
        self.pool.get(id)
    }

    pub fn pool(&self) -> &PlayerPool<AudioPlayer> {
        &self.pool
    }

    pub fn clock(&self) -> &DeterministicClock {
        &self.clock
    }

    pub fn tick(&self) {
        for (_, player) in self.pool.live() {
            player.tick();
        }
    }
}

impl AudioPlayerFactory for AudioPlayerPool {
    fn create_player(
        &self,
        callback: AudioPlayerCallback,
        marks: SpeechMarkCallback,
    ) -> Rc<AudioPlayer> {
        self.pool.create(|id| {
            let host = self.host.create_player(id);
            AudioPlayer::new(id, host, callback, marks, self.clock.clone())
        })
    }
}

impl core::fmt::Debug for AudioPlayerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AudioPlayerPool")
            .field("pool", &self.pool)
            .field("now_ms", &self.clock.now_ms())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct Calls(RefCell<Vec<String>>);

    struct HostPlayer(Rc<Calls>);

    impl HostAudioPlayer for HostPlayer {
        fn prepare(&self, url: &str, buffered: bool) -> String {
            self.0.0.borrow_mut().push(format!("prepare({url},{buffered})"));
            format!("pb-{url}")
        }
        fn play(&self, playback_id: &str) {
            self.0.0.borrow_mut().push(format!("play({playback_id})"));
        }
        fn flush(&self) {
            self.0.0.borrow_mut().push("flush".into());
        }
        fn release_audio_context(&self) {
            self.0.0.borrow_mut().push("release".into());
        }
    }

    struct Host(Rc<Calls>);

    impl AudioHost for Host {
        fn create_player(&self, _id: PlayerId) -> Box<dyn HostAudioPlayer> {
            Box::new(HostPlayer(Rc::clone(&self.0)))
        }
    }

    type Events = Rc<RefCell<Vec<(AudioPlayerEventType, AudioState)>>>;

    struct Fixture {
        factory: AudioPlayerPool,
        calls: Rc<Calls>,
        events: Events,
        marks: Rc<RefCell<Vec<SpeechMark>>>,
    }

    impl Fixture {
        fn new() -> Self {
            let calls = Rc::new(Calls::default());
            Self {
                factory: AudioPlayerPool::new(
                    Rc::new(Host(Rc::clone(&calls))),
                    DeterministicClock::new(),
                ),
                calls,
                events: Rc::new(RefCell::new(Vec::new())),
                marks: Rc::new(RefCell::new(Vec::new())),
            }
        }

        fn player(&self) -> Rc<AudioPlayer> {
            let events = Rc::clone(&self.events);
            let marks = Rc::clone(&self.marks);
            self.factory.create_player(
                Box::new(move |event, state| events.borrow_mut().push((event, *state))),
                Box::new(move |batch| marks.borrow_mut().extend_from_slice(batch)),
            )
        }

        fn event_kinds(&self) -> Vec<AudioPlayerEventType> {
            self.events.borrow().iter().map(|(kind, _)| *kind).collect()
        }
    }

    #[test]
    fn play_before_prepared_starts_on_prepared() {
        let fx = Fixture::new();
        let player = fx.player();
        player.set_track(&MediaTrack::new("a.mp3"));
        player.play(ResolutionHandle::new());
        assert_eq!(*fx.calls.0.borrow(), vec!["prepare(a.mp3,true)"]);

        player.on_prepared("pb-a.mp3");
        assert_eq!(
            *fx.calls.0.borrow(),
            vec!["prepare(a.mp3,true)", "play(pb-a.mp3)"]
        );
        assert_eq!(fx.event_kinds(), vec![AudioPlayerEventType::Ready]);
    }

    #[test]
    fn set_track_prepares_once() {
        let fx = Fixture::new();
        let player = fx.player();
        player.set_track(&MediaTrack::new("a.mp3"));
        player.on_prepared("pb-a.mp3");
        player.set_track(&MediaTrack::new("b.mp3"));
        assert_eq!(player.playback_id(), "pb-a.mp3");
    }

    #[test]
    fn tick_reports_offset_only_while_playing_with_action() {
        let fx = Fixture::new();
        let player = fx.player();
        player.set_track(&MediaTrack::new("a.mp3"));
        player.on_prepared("pb-a.mp3");

        fx.factory.tick();
        assert_eq!(fx.event_kinds(), vec![AudioPlayerEventType::Ready]);

        let action = ResolutionHandle::new();
        player.play(action.clone());
        fx.factory.clock().set(Duration::from_millis(1000));
        player.on_playback_started("pb-a.mp3");
        fx.factory.clock().advance(Duration::from_millis(250));
        fx.factory.tick();

        let events = fx.events.borrow();
        assert_eq!(events.len(), 3);
        assert_eq!(events[1].0, AudioPlayerEventType::Play);
        assert_eq!(events[2].0, AudioPlayerEventType::TimeUpdate);
        assert_eq!(events[2].1.current_time, 250.0);
    }

    #[test]
    fn finish_resolves_and_reports_end() {
        let fx = Fixture::new();
        let player = fx.player();
        player.set_track(&MediaTrack::new("a.mp3"));
        player.on_prepared("pb-a.mp3");
        let action = ResolutionHandle::new();
        player.play(action.clone());
        player.on_playback_started("pb-a.mp3");
        player.on_playback_finished("pb-a.mp3");

        assert!(action.is_resolved());
        assert!(!player.is_active());
        let last = fx.events.borrow().last().copied();
        assert_eq!(last.map(|(kind, state)| (kind, state.ended)), Some((AudioPlayerEventType::End, true)));

        fx.factory.tick();
        assert_eq!(fx.events.borrow().len(), 3);
    }

    #[test]
    fn error_reports_failed_track() {
        let fx = Fixture::new();
        let player = fx.player();
        let action = ResolutionHandle::new();
        player.play(action.clone());
        player.on_error("pb", "decode");
        assert!(action.is_resolved());
        let last = fx.events.borrow().last().copied();
        assert_eq!(
            last.map(|(kind, state)| (kind, state.track_state)),
            Some((AudioPlayerEventType::Fail, TrackState::Failed))
        );
    }

    #[test]
    fn pause_flushes_and_settles() {
        let fx = Fixture::new();
        let player = fx.player();
        let action = ResolutionHandle::new();
        player.play(action.clone());
        player.pause();
        assert!(action.is_resolved());
        assert_eq!(*fx.calls.0.borrow(), vec!["flush"]);
    }

    #[test]
    fn release_resets_preparation() {
        let fx = Fixture::new();
        let player = fx.player();
        player.set_track(&MediaTrack::new("a.mp3"));
        player.on_prepared("pb-a.mp3");
        player.release();
        assert!(!player.is_prepared());
        assert_eq!(player.playback_id(), "");
        player.set_track(&MediaTrack::new("b.mp3"));
        assert_eq!(player.playback_id(), "pb-b.mp3");
    }

    #[test]
    fn markers_forwarded() {
        let fx = Fixture::new();
        let player = fx.player();
        assert!(player.on_marker(
            "pb",
            r#"[{"type":"word","time":10,"value":"hi","start":0,"end":2},
                {"type":"sentence","time":0,"value":"hi there"}]"#
        ));
        assert!(!player.on_marker("pb", "not json"));
        let marks = fx.marks.borrow();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].kind, SpeechMarkKind::Word);
        assert_eq!((marks[0].start, marks[0].end), (0.0, 2.0));
        assert_eq!(marks[1].kind, SpeechMarkKind::Sentence);
    }

    #[test]
    fn tick_skips_dropped_players() {
        let fx = Fixture::new();
        let player = fx.player();
        player.play(ResolutionHandle::new());
        player.on_playback_started("pb");
        drop(player);
        fx.factory.tick();
        assert_eq!(fx.event_kinds(), vec![AudioPlayerEventType::Play]);
    }
}
