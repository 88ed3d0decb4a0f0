#![forbid(unsafe_code)]

//! Embedded-document requests.
//!
//! The engine asks for a nested document with a weak reference to the
//! embedding request plus success and failure continuations. The manager
//! records them under a fresh [`RequestId`] and forwards `(id, url, headers)`
//! to the host. The host later completes the request by id.

use std::rc::{Rc, Weak};

use serde::Serialize;

use crate::engine::{EmbedFailureFn, EmbedRequestHandler, EmbedSuccessFn};
use crate::registry::{Completion, PendingRegistry, PendingRequest, RequestId, RequestKind};

/// What the engine wants embedded.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct EmbedRequest {
    pub url: String,
    pub headers: Vec<String>,
}

impl EmbedRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.headers.push(header.into());
        self
    }
}

/// Host-supplied result of a successful embed.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbedContent {
    pub url: String,
    /// Document source as delivered by the host.
    pub document: String,
    /// Per-document configuration (environment values), if any.
    pub document_config: Option<serde_json::Value>,
    pub connected_visual_context: bool,
}

/// Engine-assigned handle of a nested document context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct DocumentHandle(pub u64);

pub(crate) struct EmbedKind;

impl RequestKind for EmbedKind {
    type Key = RequestId;
    type Requester = EmbedRequest;
    type Success = EmbedContent;
    type Failure = String;
    type Output = Option<DocumentHandle>;
    const LABEL: &'static str = "embed";
}

/// Host side of document embedding.
pub trait DocumentHost {
    /// Start fetching `url`. Completion comes back through
    /// [`DocumentManager::embed_request_succeeded`] or
    /// [`DocumentManager::embed_request_failed`] with the same `id`.
    fn request_embed(&self, id: RequestId, url: &str, headers: &[String]);
}

/// Tracks in-flight embed requests for one host.
pub struct DocumentManager {
    registry: PendingRegistry<EmbedKind>,
    host: Rc<dyn DocumentHost>,
}

impl DocumentManager {
    pub fn new(host: Rc<dyn DocumentHost>) -> Self {
        Self {
            registry: PendingRegistry::new(),
            host,
        }
    }

    /// Register a request and forward it to the host. Returns `None` when the
    /// requester is already gone.
    pub fn request(
        &self,
        request: Weak<EmbedRequest>,
        on_success: EmbedSuccessFn,
        on_failure: EmbedFailureFn,
    ) -> Option<RequestId> {
        let Some(embed) = request.upgrade() else {
            tracing::error!(target: "vhb.registry", "embed requester dropped before request");
            return None;
        };
        let id = self
            .registry
            .submit(PendingRequest::new(request, on_success, on_failure));
        tracing::debug!(target: "vhb.registry", id = id.get(), url = %embed.url, "embed requested");
        self.host.request_embed(id, &embed.url, &embed.headers);
        Some(id)
    }

    /// Complete request `id` with the delivered document. Returns the nested
    /// document the engine built, if any.
    pub fn embed_request_succeeded(
        &self,
        id: RequestId,
        url: &str,
        document: impl Into<String>,
        document_config: Option<serde_json::Value>,
        connected_visual_context: bool,
    ) -> Option<DocumentHandle> {
        let content = EmbedContent {
            url: url.to_owned(),
            document: document.into(),
            document_config,
            connected_visual_context,
        };
        match self.registry.succeed(&id, content) {
            Completion::Delivered(handle) => handle,
            Completion::RequesterDropped | Completion::Unknown => None,
        }
    }

    /// Complete request `id` with a failure. Returns `true` when the engine's
    /// failure continuation ran.
    pub fn embed_request_failed(&self, id: RequestId, url: &str, failure: &str) -> bool {
        let delivered = self.registry.fail(&id, failure.to_owned()).is_delivered();
        if !delivered {
            tracing::debug!(target: "vhb.registry", id = id.get(), url, "embed failure not delivered");
        }
        delivered
    }

    pub fn pending(&self) -> usize {
        self.registry.len()
    }

    /// Drop every pending request without completing it.
    pub fn destroy(&self) {
        self.registry.clear();
    }
}

impl EmbedRequestHandler for DocumentManager {
    fn on_embed_request(
        &self,
        request: Weak<EmbedRequest>,
        on_success: EmbedSuccessFn,
        on_failure: EmbedFailureFn,
    ) {
        let _ = self.request(request, on_success, on_failure);
    }
}

impl core::fmt::Debug for DocumentManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DocumentManager")
            .field("pending", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    struct RecordingHost {
        calls: RefCell<Vec<(RequestId, String, Vec<String>)>>,
    }

    impl DocumentHost for RecordingHost {
        fn request_embed(&self, id: RequestId, url: &str, headers: &[String]) {
            self.calls
                .borrow_mut()
                .push((id, url.to_owned(), headers.to_vec()));
        }
    }

    fn manager() -> (DocumentManager, Rc<RecordingHost>) {
        let host = Rc::new(RecordingHost::default());
        (DocumentManager::new(host.clone()), host)
    }

    #[test]
    fn request_forwards_to_host_and_succeeds() {
        let (manager, host) = manager();
        let embed = Rc::new(EmbedRequest::new("https://doc").with_header("x-a: 1"));
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let id = manager
            .request(
                Rc::downgrade(&embed),
                Box::new(move |req: Rc<EmbedRequest>, content: EmbedContent| {
                    *sink.borrow_mut() = Some((req.url.clone(), content.document));
                    Some(DocumentHandle(77))
                }),
                Box::new(|_, _| {}),
            )
            .expect("requester alive");

        assert_eq!(
            host.calls.borrow()[0],
            (id, "https://doc".to_owned(), vec!["x-a: 1".to_owned()])
        );
        let doc = manager.embed_request_succeeded(id, "https://doc", "{}", None, true);
        assert_eq!(doc, Some(DocumentHandle(77)));
        assert_eq!(
            *seen.borrow(),
            Some(("https://doc".to_owned(), "{}".to_owned()))
        );
        assert_eq!(manager.pending(), 0);
    }

    #[test]
    fn failure_after_requester_destroyed_is_silent() {
        let (manager, _host) = manager();
        let embed = Rc::new(EmbedRequest::new("https://doc"));
        let failures = Rc::new(Cell::new(0));
        let f = Rc::clone(&failures);
        let id = manager
            .request(
                Rc::downgrade(&embed),
                Box::new(|_, _| None),
                Box::new(move |_, _| f.set(f.get() + 1)),
            )
            .expect("requester alive");
        drop(embed);

        assert!(!manager.embed_request_failed(id, "https://doc", "network"));
        assert_eq!(failures.get(), 0);
        assert_eq!(manager.pending(), 0);
    }

    #[test]
    fn dead_requester_is_not_forwarded() {
        let (manager, host) = manager();
        let embed = Rc::new(EmbedRequest::new("https://gone"));
        let weak = Rc::downgrade(&embed);
        drop(embed);
        assert!(
            manager
                .request(weak, Box::new(|_, _| None), Box::new(|_, _| {}))
                .is_none()
        );
        assert!(host.calls.borrow().is_empty());
    }

    #[test]
    fn unknown_id_returns_none() {
        let (manager, _host) = manager();
        assert_eq!(
            manager.embed_request_succeeded(RequestId(404), "u", "{}", None, false),
            None
        );
        assert!(!manager.embed_request_failed(RequestId(404), "u", "x"));
    }

    #[test]
    fn destroy_clears_pending() {
        let (manager, _host) = manager();
        let embed = Rc::new(EmbedRequest::new("https://doc"));
        let id = manager
            .request(Rc::downgrade(&embed), Box::new(|_, _| None), Box::new(|_, _| {}))
            .expect("requester alive");
        manager.destroy();
        assert_eq!(manager.pending(), 0);
        assert!(!manager.embed_request_failed(id, "https://doc", "late"));
    }
}
