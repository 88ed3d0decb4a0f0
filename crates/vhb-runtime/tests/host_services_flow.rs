//! Engine-initiated work flowing through the host services and back.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use vhb_harness::{RecordingServices, capture};
use vhb_runtime::{
    AudioPlayerEventType, AudioPlayerFactory, AudioState, DocumentHandle, EmbedContent,
    EmbedRequest, EmbedRequestHandler, ImportRequest, MediaPlayerEventType, MediaPlayerFactory,
    MediaState, MediaTrack, PackageLoader, PackageReference, PackageRequest, PlayerId,
    ResolutionHandle, SpeechMark, SpeechMarkKind,
};

#[test]
fn embed_round_trip_through_handler_trait() {
    let services = RecordingServices::new();
    let handler = services.host_services().documents.expect("documents wired");
    let request = Rc::new(EmbedRequest::new("https://host/doc.json").with_header("x-a: 1"));
    let delivered = Rc::new(RefCell::new(None::<String>));
    let sink = Rc::clone(&delivered);

    handler.on_embed_request(
        Rc::downgrade(&request),
        Box::new(move |_req: Rc<EmbedRequest>, content: EmbedContent| {
            *sink.borrow_mut() = Some(content.document);
            Some(DocumentHandle(11))
        }),
        Box::new(|_req: Rc<EmbedRequest>, _failure: String| {}),
    );

    let (id, url, headers) = services.document_host.requests.borrow()[0].clone();
    assert_eq!(url, "https://host/doc.json");
    assert_eq!(headers, vec!["x-a: 1".to_owned()]);
    assert_eq!(
        services
            .documents
            .embed_request_succeeded(id, &url, "{}", None, false),
        Some(DocumentHandle(11))
    );
    assert_eq!(delivered.borrow().as_deref(), Some("{}"));

    // The entry is gone; a repeat completion is a correlation miss.
    let (events, again) = capture(|| {
        services
            .documents
            .embed_request_succeeded(id, &url, "{}", None, false)
    });
    assert_eq!(again, None);
    assert!(
        events
            .iter()
            .any(|e| e.target == "vhb.registry" && e.level == tracing::Level::WARN)
    );
}

#[test]
fn embed_completion_after_requester_dropped_is_noop() {
    let services = RecordingServices::new();
    let request = Rc::new(EmbedRequest::new("doc"));
    let id = services
        .documents
        .request(
            Rc::downgrade(&request),
            Box::new(
                |_req: Rc<EmbedRequest>, _content: EmbedContent| -> Option<DocumentHandle> {
                    panic!("must not run for a dropped requester")
                },
            ),
            Box::new(|_req: Rc<EmbedRequest>, _failure: String| {}),
        )
        .expect("live requester");
    drop(request);
    assert!(!services.documents.embed_request_failed(id, "doc", "gone"));
    assert_eq!(services.documents.pending(), 0);
}

struct Package {
    import: ImportRequest,
    outcome: RefCell<Option<Result<String, (String, i32)>>>,
}

impl PackageRequest for Package {
    fn request(&self) -> &ImportRequest {
        &self.import
    }

    fn succeed(&self, package_json: &str) {
        *self.outcome.borrow_mut() = Some(Ok(package_json.to_owned()));
    }

    fn fail(&self, message: &str, code: i32) {
        *self.outcome.borrow_mut() = Some(Err((message.to_owned(), code)));
    }
}

#[test]
fn package_import_keyed_by_reference() {
    let services = RecordingServices::new();
    let loader = services.host_services().packages.expect("packages wired");
    let package = Rc::new(Package {
        import: ImportRequest::new(PackageReference::new("alexa-layouts", "1.7.0"), ""),
        outcome: RefCell::new(None),
    });
    loader.load_package(package.clone());

    let import = services.package_host.imports.borrow()[0].clone();
    assert_eq!(import.reference_key, "alexa-layouts:1.7.0");
    assert!(services.packages.import_package_failed("alexa-layouts:1.7.0", "404", 404));
    assert_eq!(
        *package.outcome.borrow(),
        Some(Err(("404".to_owned(), 404)))
    );
    assert!(!services.packages.import_package_succeeded("alexa-layouts:1.7.0", "{}"));
}

#[test]
fn foreground_media_action_held_until_end() {
    let services = RecordingServices::new();
    let factory = services.host_services().media.expect("media wired");
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let player = factory.create_player(Box::new(
        move |event: MediaPlayerEventType, _state: &MediaState| {
            sink.borrow_mut().push(event);
        },
    ));
    let id = player.id();

    player.set_track_list(&[MediaTrack::new("a.mp4")]);
    let action = ResolutionHandle::new();
    player.play(Some(action.clone()));
    assert!(action.is_pending());
    assert!(player.holds_action());

    let host_side = services.media.player(id).expect("pooled");
    assert!(host_side.update_media_state_json(
        r#"{"trackIndex":0,"trackCount":1,"currentTime":0,"duration":10,
            "paused":false,"ended":true,"muted":false}"#
    ));
    assert!(host_side.do_callback_code(0));
    assert!(action.is_resolved());
    assert_eq!(*seen.borrow(), vec![MediaPlayerEventType::End]);
    assert_eq!(
        services.media_host.log.borrow().clone(),
        vec![
            (id, "tracks 1".to_owned()),
            (id, "play wait=true".to_owned())
        ]
    );

    drop(player);
    drop(host_side);
    assert!(services.media.player(id).is_none());
}

#[test]
fn audio_ticks_only_while_playing_with_action() {
    let services = RecordingServices::new();
    let factory = services.host_services().audio.expect("audio wired");
    let events = Rc::new(RefCell::new(Vec::new()));
    let marks = Rc::new(RefCell::new(Vec::new()));
    let (event_sink, mark_sink) = (Rc::clone(&events), Rc::clone(&marks));
    let player = factory.create_player(
        Box::new(move |event: AudioPlayerEventType, state: &AudioState| {
            event_sink.borrow_mut().push((event, state.current_time));
        }),
        Box::new(move |batch: &[SpeechMark]| {
            mark_sink.borrow_mut().extend(batch.iter().map(|m| m.kind));
        }),
    );
    assert_eq!(player.id(), PlayerId(1));

    player.set_track(&MediaTrack::new("speech.mp3"));
    let playback = player.playback_id();
    assert_eq!(playback, "playback-1");

    services.audio.tick();
    assert!(events.borrow().is_empty());

    let action = ResolutionHandle::new();
    player.play(action.clone());
    player.on_prepared(&playback);
    services.clock.set(Duration::from_millis(1_000));
    player.on_playback_started(&playback);
    services.clock.advance(Duration::from_millis(250));
    services.audio.tick();
    assert!(player.on_marker(
        &playback,
        r#"[{"type":"word","time":0,"value":"hi","start":0,"end":2}]"#
    ));
    player.on_playback_finished(&playback);
    services.audio.tick();

    assert!(action.is_resolved());
    assert_eq!(
        *events.borrow(),
        vec![
            (AudioPlayerEventType::Ready, 0.0),
            (AudioPlayerEventType::Play, 0.0),
            (AudioPlayerEventType::TimeUpdate, 250.0),
            (AudioPlayerEventType::End, 250.0),
        ]
    );
    assert_eq!(*marks.borrow(), vec![SpeechMarkKind::Word]);
}
