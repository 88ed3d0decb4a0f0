#![forbid(unsafe_code)]

//! Dynamic package imports.
//!
//! Requests are keyed by the import reference string (`name:version`). A
//! second request for the same reference replaces the first.

use std::rc::Rc;

use serde::Serialize;

use crate::engine::PackageLoader;
use crate::registry::{Completion, PendingRegistry, PendingRequest, RequestKind};

/// Package name and version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PackageReference {
    pub name: String,
    pub version: String,
}

impl PackageReference {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }
}

impl core::fmt::Display for PackageReference {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// Description of a package import handed to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    #[serde(skip)]
    pub reference: PackageReference,
    pub name: String,
    pub version: String,
    /// Explicit source URL, empty when the host resolves by name.
    pub source: String,
    /// Reference string the host must echo back on completion.
    #[serde(rename = "reference")]
    pub reference_key: String,
}

impl ImportRequest {
    pub fn new(reference: PackageReference, source: impl Into<String>) -> Self {
        Self {
            name: reference.name.clone(),
            version: reference.version.clone(),
            reference_key: reference.to_string(),
            source: source.into(),
            reference,
        }
    }
}

/// A package request as owned by the engine.
pub trait PackageRequest {
    fn request(&self) -> &ImportRequest;
    /// Deliver the package source.
    fn succeed(&self, package_json: &str);
    fn fail(&self, message: &str, code: i32);
}

/// Host side of package loading.
pub trait PackageHost {
    fn import_package(&self, request: &ImportRequest);
}

pub(crate) struct PackageKind;

impl RequestKind for PackageKind {
    type Key = String;
    type Requester = dyn PackageRequest;
    type Success = String;
    type Failure = (String, i32);
    type Output = ();
    const LABEL: &'static str = "package";
}

/// Tracks in-flight package imports.
///
/// Entries keep only a weak reference; the engine owns the request.
pub struct PackageManager {
    registry: PendingRegistry<PackageKind>,
    host: Rc<dyn PackageHost>,
}

impl PackageManager {
    pub fn new(host: Rc<dyn PackageHost>) -> Self {
        Self {
            registry: PendingRegistry::new(),
            host,
        }
    }

    /// Record `request` under its reference and forward it to the host.
    pub fn load_package(&self, request: &Rc<dyn PackageRequest>) {
        let import = request.request().clone();
        let key = import.reference_key.clone();
        self.registry.insert(
            key.clone(),
            PendingRequest::<PackageKind>::new(
                Rc::downgrade(request),
                Box::new(|requester: Rc<dyn PackageRequest>, json: String| {
                    requester.succeed(&json);
                }),
                Box::new(|requester: Rc<dyn PackageRequest>, (message, code): (String, i32)| {
                    requester.fail(&message, code);
                }),
            ),
        );
        tracing::debug!(target: "vhb.registry", reference = %key, "package import requested");
        self.host.import_package(&import);
    }

    /// Returns `true` when the package reached a live request.
    pub fn import_package_succeeded(&self, reference: &str, package_json: &str) -> bool {
        matches!(
            self.registry
                .succeed(&reference.to_owned(), package_json.to_owned()),
            Completion::Delivered(())
        )
    }

    /// Returns `true` when the failure reached a live request.
    pub fn import_package_failed(&self, reference: &str, message: &str, code: i32) -> bool {
        self.registry
            .fail(&reference.to_owned(), (message.to_owned(), code))
            .is_delivered()
    }

    pub fn pending(&self) -> usize {
        self.registry.len()
    }

    pub fn destroy(&self) {
        self.registry.clear();
    }
}

impl PackageLoader for PackageManager {
    fn load_package(&self, request: Rc<dyn PackageRequest>) {
        PackageManager::load_package(self, &request);
    }
}

impl core::fmt::Debug for PackageManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PackageManager")
            .field("pending", &self.registry.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Host {
        imports: RefCell<Vec<ImportRequest>>,
    }

    impl PackageHost for Host {
        fn import_package(&self, request: &ImportRequest) {
            self.imports.borrow_mut().push(request.clone());
        }
    }

    struct Request {
        import: ImportRequest,
        outcome: RefCell<Option<Result<String, (String, i32)>>>,
    }

    impl Request {
        fn new(name: &str, version: &str) -> Rc<Self> {
            Rc::new(Self {
                import: ImportRequest::new(PackageReference::new(name, version), ""),
                outcome: RefCell::new(None),
            })
        }
    }

    impl PackageRequest for Request {
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
    fn import_request_serializes_reference() {
        let import = ImportRequest::new(PackageReference::new("alexa-layouts", "1.7.0"), "");
        assert_eq!(
            serde_json::to_value(&import).unwrap(),
            serde_json::json!({
                "name": "alexa-layouts",
                "version": "1.7.0",
                "source": "",
                "reference": "alexa-layouts:1.7.0"
            })
        );
    }

    #[test]
    fn succeed_by_reference() {
        let host = Rc::new(Host::default());
        let manager = PackageManager::new(host.clone());
        let request = Request::new("base", "1.0");
        let dyn_request: Rc<dyn PackageRequest> = request.clone();
        manager.load_package(&dyn_request);

        assert_eq!(host.imports.borrow().len(), 1);
        assert!(manager.import_package_succeeded("base:1.0", "{\"type\":\"APL\"}"));
        assert_eq!(
            *request.outcome.borrow(),
            Some(Ok("{\"type\":\"APL\"}".to_owned()))
        );
        assert!(!manager.import_package_succeeded("base:1.0", "{}"));
    }

    #[test]
    fn fail_carries_message_and_code() {
        let host = Rc::new(Host::default());
        let manager = PackageManager::new(host);
        let request = Request::new("base", "1.0");
        let dyn_request: Rc<dyn PackageRequest> = request.clone();
        manager.load_package(&dyn_request);
        assert!(manager.import_package_failed("base:1.0", "not found", 404));
        assert_eq!(
            *request.outcome.borrow(),
            Some(Err(("not found".to_owned(), 404)))
        );
    }

    #[test]
    fn unknown_reference_is_ignored() {
        let manager = PackageManager::new(Rc::new(Host::default()));
        assert!(!manager.import_package_failed("missing:0", "", -1));
    }

    #[test]
    fn dropped_request_is_removed_silently() {
        let manager = PackageManager::new(Rc::new(Host::default()));
        let request = Request::new("base", "1.0");
        let dyn_request: Rc<dyn PackageRequest> = request;
        manager.load_package(&dyn_request);
        drop(dyn_request);
        assert!(!manager.import_package_succeeded("base:1.0", "{}"));
        assert_eq!(manager.pending(), 0);
    }

    #[test]
    fn destroy_clears() {
        let manager = PackageManager::new(Rc::new(Host::default()));
        let request = Request::new("base", "1.0");
        let dyn_request: Rc<dyn PackageRequest> = request.clone();
        manager.load_package(&dyn_request);
        manager.destroy();
        assert_eq!(manager.pending(), 0);
        assert_eq!(*request.outcome.borrow(), None);
    }
}
