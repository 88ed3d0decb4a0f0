#![forbid(unsafe_code)]

//! Test harness for the viewhost bridge.
//!
//! - [`ScriptedEngine`] / [`ScriptedRoot`] - an engine that records every call
//! - recording hosts for documents, packages, media, audio, text and logs
//! - [`capture`] - run a closure under a capturing `tracing` subscriber
//! - [`RecordingServices`] - all managers wired to recording hosts at once

pub mod capture;
pub mod engine;
pub mod hosts;

use std::rc::Rc;

use vhb_runtime::{
    AudioPlayerPool, DeterministicClock, DocumentManager, HostServices, MediaPlayerPool,
    PackageManager,
};

pub use capture::{CapturedEvent, capture};
pub use engine::{RootCall, ScriptedDocument, ScriptedEngine, ScriptedRoot};
pub use hosts::{
    CommandLog, FixedTextMeasure, RecordingAudioHost, RecordingDocumentHost, RecordingMediaHost,
    RecordingPackageHost, RecordingTransport,
};

/// Every manager and pool, each over a recording host.
#[derive(Debug)]
pub struct RecordingServices {
    pub document_host: Rc<RecordingDocumentHost>,
    pub package_host: Rc<RecordingPackageHost>,
    pub media_host: Rc<RecordingMediaHost>,
    pub audio_host: Rc<RecordingAudioHost>,
    pub documents: Rc<DocumentManager>,
    pub packages: Rc<PackageManager>,
    pub media: Rc<MediaPlayerPool>,
    pub audio: Rc<AudioPlayerPool>,
    pub clock: DeterministicClock,
}

impl Default for RecordingServices {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingServices {
    pub fn new() -> Self {
        let document_host = Rc::new(RecordingDocumentHost::default());
        let package_host = Rc::new(RecordingPackageHost::default());
        let media_host = Rc::new(RecordingMediaHost::default());
        let audio_host = Rc::new(RecordingAudioHost::default());
        let clock = DeterministicClock::new();
        Self {
            documents: Rc::new(DocumentManager::new(document_host.clone())),
            packages: Rc::new(PackageManager::new(package_host.clone())),
            media: Rc::new(MediaPlayerPool::new(media_host.clone())),
            audio: Rc::new(AudioPlayerPool::new(audio_host.clone(), clock.clone())),
            document_host,
            package_host,
            media_host,
            audio_host,
            clock,
        }
    }

    /// Engine-facing services. Text measurement is left unset; the bridge
    /// context installs it.
    pub fn host_services(&self) -> HostServices {
        HostServices {
            documents: Some(self.documents.clone()),
            packages: Some(self.packages.clone()),
            media: Some(self.media.clone()),
            audio: Some(self.audio.clone()),
            text: None,
        }
    }
}
