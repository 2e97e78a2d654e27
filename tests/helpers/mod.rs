#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use intake::catalogue::{self, Catalogue};
use intake::driver::{
    BlobResponse, BlobStore, BlobUpload, Collaborators, IdentityIssuer, IssueRequest,
    IssueResponse, SubmissionSink, SubmitResponse, TransportError,
};
use intake::session::{FileHandle, Session, SubmissionRecord};
use tokio::sync::{Notify, oneshot};

// =============================================================================
// Catalogue builders
// =============================================================================

pub const TUTOR_INTAKE: &str = include_str!("../fixtures/tutor_intake.json");

pub fn tutor_catalogue() -> Arc<Catalogue> {
    Arc::new(catalogue::parse_and_build(TUTOR_INTAKE).expect("fixture catalogue should build"))
}

/// Three steps: contact details, a conditional experience question, documents.
pub fn compact_json(settings: &str) -> String {
    format!(
        r#"{{
        "id": "compact",
        "version": "1.0.0",
        "settings": {settings},
        "steps": [
            {{
                "id": 1,
                "title": "Contact",
                "fields": [
                    {{"name": "name", "label": "Full Name", "kind": "text", "required": true}},
                    {{"name": "email", "label": "Email Address", "kind": "email", "required": true}},
                    {{"name": "phone", "label": "Phone Number", "kind": "tel", "required": true}}
                ]
            }},
            {{
                "id": 2,
                "title": "Experience",
                "fields": [
                    {{"name": "experience", "label": "Prior experience?", "kind": "singleSelect",
                      "required": true, "options": ["Yes", "No"]}},
                    {{"name": "years", "label": "Years of experience", "kind": "text", "required": true,
                      "visibleWhen": {{"op": "equals", "field": "experience", "value": "Yes"}}}},
                    {{"name": "subjects", "label": "Subjects", "kind": "multiSelect", "required": true,
                      "options": ["Math", "Science", "Other"]}},
                    {{"name": "other_subject", "label": "Other Subject", "kind": "freeText",
                      "required": true,
                      "visibleWhen": {{"op": "includes", "field": "subjects", "value": "Other"}}}}
                ]
            }},
            {{
                "id": 3,
                "title": "Documents",
                "fields": [
                    {{"name": "resume", "label": "Resume", "kind": "file", "required": false}},
                    {{"name": "photo", "label": "Photo", "kind": "file", "required": false}},
                    {{"name": "terms", "label": "Terms", "kind": "consent", "required": true,
                      "options": ["I agree"]}}
                ]
            }}
        ]
    }}"#
    )
}

pub fn compact_catalogue() -> Arc<Catalogue> {
    compact_catalogue_with("{}")
}

pub fn compact_catalogue_with(settings: &str) -> Arc<Catalogue> {
    Arc::new(
        catalogue::parse_and_build(&compact_json(settings))
            .expect("compact catalogue should build"),
    )
}

/// A single-step catalogue from a JSON array of field definitions.
pub fn one_step_json(fields: &str) -> String {
    format!(
        r#"{{"id": "one", "version": "1", "steps": [{{"id": 1, "title": "Only", "fields": {fields}}}]}}"#
    )
}

pub fn codes(errors: &[intake::error::CatalogueError]) -> Vec<&str> {
    errors.iter().map(|e| e.code.as_str()).collect()
}

// =============================================================================
// Session shortcuts
// =============================================================================

pub fn fill_contact(session: &mut Session) {
    session.set_text("name", "Ada Lovelace").unwrap();
    session.set_text("email", "ada@example.com").unwrap();
    session.set_text("phone", "+44 20 7946 0958").unwrap();
}

pub fn fill_experience(session: &mut Session) {
    session.select_option("experience", "No").unwrap();
    session.toggle_option("subjects", "Math").unwrap();
}

pub fn pdf(name: &str) -> FileHandle {
    FileHandle::new(name, b"%PDF-1.7 test".to_vec()).with_content_type("application/pdf")
}

// =============================================================================
// Fake collaborators
// =============================================================================

/// Issues `uid-N` for the N-th call unless told otherwise.
pub struct FakeIssuer {
    pub calls: AtomicUsize,
    answer: Mutex<IssuerAnswer>,
}

#[derive(Clone)]
pub enum IssuerAnswer {
    Issue,
    Reject(String),
    Unreachable,
}

impl FakeIssuer {
    pub fn new() -> Self {
        FakeIssuer {
            calls: AtomicUsize::new(0),
            answer: Mutex::new(IssuerAnswer::Issue),
        }
    }

    pub fn answer_with(&self, answer: IssuerAnswer) {
        *self.answer.lock().unwrap() = answer;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityIssuer for FakeIssuer {
    async fn issue(&self, _request: IssueRequest) -> Result<IssueResponse, TransportError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let answer = self.answer.lock().unwrap().clone();
        match answer {
            IssuerAnswer::Issue => Ok(IssueResponse {
                success: true,
                identity: Some(format!("uid-{n}")),
                error: None,
            }),
            IssuerAnswer::Reject(reason) => Ok(IssueResponse {
                success: false,
                identity: None,
                error: Some(reason),
            }),
            IssuerAnswer::Unreachable => Err(TransportError("connection refused".into())),
        }
    }
}

/// Answers at once. File names starting with `broken` are rejected.
pub struct InstantStore;

#[async_trait]
impl BlobStore for InstantStore {
    async fn upload(&self, request: BlobUpload) -> Result<BlobResponse, TransportError> {
        if request.file.name.starts_with("broken") {
            return Ok(BlobResponse {
                success: false,
                location: None,
                error: Some("Storage rejected the file".into()),
            });
        }
        Ok(BlobResponse {
            success: true,
            location: Some(location_for(&request)),
            error: None,
        })
    }
}

pub fn location_for(request: &BlobUpload) -> String {
    format!(
        "https://blob.test/{}/{}/{}",
        request.identity, request.field_name, request.file.name
    )
}

/// Holds every upload until the test releases it by file name.
#[derive(Default)]
pub struct GatedStore {
    pending: Mutex<HashMap<String, (BlobUpload, oneshot::Sender<BlobResponse>)>>,
    arrived: Notify,
}

impl GatedStore {
    /// Wait until at least `n` uploads are held.
    pub async fn wait_for(&self, n: usize) {
        loop {
            if self.pending.lock().unwrap().len() >= n {
                return;
            }
            self.arrived.notified().await;
        }
    }

    pub fn release_ok(&self, file_name: &str) {
        let (request, tx) = self.take(file_name);
        let _ = tx.send(BlobResponse {
            success: true,
            location: Some(location_for(&request)),
            error: None,
        });
    }

    pub fn release_err(&self, file_name: &str, reason: &str) {
        let (_, tx) = self.take(file_name);
        let _ = tx.send(BlobResponse {
            success: false,
            location: None,
            error: Some(reason.into()),
        });
    }

    fn take(&self, file_name: &str) -> (BlobUpload, oneshot::Sender<BlobResponse>) {
        self.pending
            .lock()
            .unwrap()
            .remove(file_name)
            .unwrap_or_else(|| panic!("no held upload for {file_name}"))
    }
}

#[async_trait]
impl BlobStore for GatedStore {
    async fn upload(&self, request: BlobUpload) -> Result<BlobResponse, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .unwrap()
            .insert(request.file.name.clone(), (request, tx));
        self.arrived.notify_one();
        rx.await
            .map_err(|_| TransportError("upload abandoned".into()))
    }
}

/// Keeps every record it is given and answers with a fixed result.
pub struct RecordingSink {
    pub records: Mutex<Vec<serde_json::Value>>,
    answer: Mutex<SinkAnswer>,
}

#[derive(Clone, Copy)]
pub enum SinkAnswer {
    Accept,
    Reject,
    Unreachable,
}

impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink {
            records: Mutex::new(Vec::new()),
            answer: Mutex::new(SinkAnswer::Accept),
        }
    }

    pub fn answer_with(&self, answer: SinkAnswer) {
        *self.answer.lock().unwrap() = answer;
    }

    pub fn sent(&self) -> Vec<serde_json::Value> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionSink for RecordingSink {
    async fn submit(&self, record: &SubmissionRecord) -> Result<SubmitResponse, TransportError> {
        self.records.lock().unwrap().push(record.to_json());
        let answer = *self.answer.lock().unwrap();
        match answer {
            SinkAnswer::Accept => Ok(SubmitResponse { success: true }),
            SinkAnswer::Reject => Ok(SubmitResponse { success: false }),
            SinkAnswer::Unreachable => Err(TransportError("timed out".into())),
        }
    }
}

pub struct Fakes<S> {
    pub issuer: Arc<FakeIssuer>,
    pub store: Arc<S>,
    pub sink: Arc<RecordingSink>,
}

impl<S: BlobStore + 'static> Fakes<S> {
    pub fn new(store: S) -> Self {
        Fakes {
            issuer: Arc::new(FakeIssuer::new()),
            store: Arc::new(store),
            sink: Arc::new(RecordingSink::new()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            issuer: self.issuer.clone(),
            store: self.store.clone(),
            sink: self.sink.clone(),
        }
    }
}
