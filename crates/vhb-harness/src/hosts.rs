#![forbid(unsafe_code)]

//! Recording implementations of every host hook.
//!
//! Each host appends what it was asked to do to a log the test can read
//! back. None of them complete anything on their own; tests drive
//! completions through the managers and shims.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Mutex;

use serde_json::Value;
use vhb_runtime::{
    AudioHost, AudioTrack, DocumentHost, HostAudioPlayer, HostMediaPlayer, ImportRequest,
    LogLevel, LogTransport, MeasureMode, MediaHost, MediaTrack, PackageHost, PlayerId, RequestId,
    TextMeasureHost,
};

/// Records embed requests.
#[derive(Debug, Default)]
pub struct RecordingDocumentHost {
    pub requests: RefCell<Vec<(RequestId, String, Vec<String>)>>,
}

impl DocumentHost for RecordingDocumentHost {
    fn request_embed(&self, id: RequestId, url: &str, headers: &[String]) {
        self.requests
            .borrow_mut()
            .push((id, url.to_owned(), headers.to_vec()));
    }
}

/// Records package imports.
#[derive(Debug, Default)]
pub struct RecordingPackageHost {
    pub imports: RefCell<Vec<ImportRequest>>,
}

impl PackageHost for RecordingPackageHost {
    fn import_package(&self, request: &ImportRequest) {
        self.imports.borrow_mut().push(request.clone());
    }
}

/// Shared command log of every player a host created.
pub type CommandLog = Rc<RefCell<Vec<(PlayerId, String)>>>;

/// Creates media players that log their commands.
#[derive(Debug, Default)]
pub struct RecordingMediaHost {
    pub log: CommandLog,
}

struct RecordingMediaPlayer {
    id: PlayerId,
    log: CommandLog,
}

impl RecordingMediaPlayer {
    fn record(&self, command: String) {
        self.log.borrow_mut().push((self.id, command));
    }
}

impl HostMediaPlayer for RecordingMediaPlayer {
    fn play(&self, wait_for_finish: bool) {
        self.record(format!("play wait={wait_for_finish}"));
    }

    fn pause(&self) {
        self.record("pause".into());
    }

    fn stop(&self) {
        self.record("stop".into());
    }

    fn next(&self) {
        self.record("next".into());
    }

    fn previous(&self) {
        self.record("previous".into());
    }

    fn rewind(&self) {
        self.record("rewind".into());
    }

    fn seek(&self, offset: i32) {
        self.record(format!("seek {offset}"));
    }

    fn set_track_index(&self, index: i32) {
        self.record(format!("track {index}"));
    }

    fn set_track_list(&self, tracks: &[MediaTrack]) {
        self.record(format!("tracks {}", tracks.len()));
    }

    fn set_audio_track(&self, track: AudioTrack) {
        self.record(format!("audio {track:?}"));
    }

    fn set_mute(&self, mute: bool) {
        self.record(format!("mute {mute}"));
    }
}

impl MediaHost for RecordingMediaHost {
    fn create_player(&self, id: PlayerId) -> Box<dyn HostMediaPlayer> {
        Box::new(RecordingMediaPlayer {
            id,
            log: Rc::clone(&self.log),
        })
    }
}

/// Creates audio players that log their commands. `prepare` answers with
/// `playback-<n>`, counting across all players.
#[derive(Debug, Default)]
pub struct RecordingAudioHost {
    pub log: CommandLog,
    next_playback: Rc<Cell<u32>>,
}

struct RecordingAudioPlayer {
    id: PlayerId,
    log: CommandLog,
    next_playback: Rc<Cell<u32>>,
}

impl HostAudioPlayer for RecordingAudioPlayer {
    fn prepare(&self, url: &str, buffered: bool) -> String {
        let n = self.next_playback.get() + 1;
        self.next_playback.set(n);
        self.log
            .borrow_mut()
            .push((self.id, format!("prepare {url} buffered={buffered}")));
        format!("playback-{n}")
    }

    fn play(&self, playback_id: &str) {
        self.log
            .borrow_mut()
            .push((self.id, format!("play {playback_id}")));
    }

    fn flush(&self) {
        self.log.borrow_mut().push((self.id, "flush".into()));
    }

    fn release_audio_context(&self) {
        self.log.borrow_mut().push((self.id, "release".into()));
    }
}

impl AudioHost for RecordingAudioHost {
    fn create_player(&self, id: PlayerId) -> Box<dyn HostAudioPlayer> {
        Box::new(RecordingAudioPlayer {
            id,
            log: Rc::clone(&self.log),
            next_playback: Rc::clone(&self.next_playback),
        })
    }
}

/// Answers every measurement with the same JSON and records the requested
/// pixel sizes.
#[derive(Debug)]
pub struct FixedTextMeasure {
    pub answer: Value,
    pub requests: RefCell<Vec<(String, f64, f64)>>,
}

impl FixedTextMeasure {
    pub fn new(answer: Value) -> Self {
        Self {
            answer,
            requests: RefCell::new(Vec::new()),
        }
    }
}

impl TextMeasureHost for FixedTextMeasure {
    fn measure(
        &self,
        component: &str,
        width: f64,
        _width_mode: MeasureMode,
        height: f64,
        _height_mode: MeasureMode,
    ) -> Value {
        self.requests
            .borrow_mut()
            .push((component.to_owned(), width, height));
        self.answer.clone()
    }
}

/// Thread-safe log transport that keeps every line.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl RecordingTransport {
    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl LogTransport for RecordingTransport {
    fn transport(&self, level: LogLevel, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push((level, message.to_owned()));
    }
}
