//! Async driver: runs a `Session` against the identity, storage and submission services.
//!
//! Each file upload is its own tokio task. Results are joined through a
//! `JoinSet` and applied to the session by upload id, so completion order
//! does not matter. Registration and submission are awaited inline; because
//! they take `&mut self`, a second overlapping call cannot be made.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinSet;

use crate::catalogue::Catalogue;
use crate::error::{RegistrationError, SessionError, SubmissionError, UploadError};
use crate::session::{
    Advance, Attachment, FileHandle, Identity, RegistrationOutcome, RegistrationRequest, Session,
    Submit, SubmissionOutcome, SubmissionRecord, UploadId, UploadRequest, UploadStatus,
};
use crate::validate::{ErrorMap, FieldError};

// =============================================================================
// COLLABORATOR CONTRACTS
// =============================================================================

/// The call never reached the service, or its answer could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRequest {
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueResponse {
    pub success: bool,
    #[serde(default, alias = "uid")]
    pub identity: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// One file for the blob store.
#[derive(Debug, Clone)]
pub struct BlobUpload {
    pub file: FileHandle,
    pub identity: String,
    pub field_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobResponse {
    pub success: bool,
    #[serde(default, alias = "fileUrl")]
    pub location: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub success: bool,
}

#[async_trait]
pub trait IdentityIssuer: Send + Sync {
    async fn issue(&self, request: IssueRequest) -> Result<IssueResponse, TransportError>;
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn upload(&self, request: BlobUpload) -> Result<BlobResponse, TransportError>;
}

#[async_trait]
pub trait SubmissionSink: Send + Sync {
    async fn submit(&self, record: &SubmissionRecord) -> Result<SubmitResponse, TransportError>;
}

#[derive(Clone)]
pub struct Collaborators {
    pub issuer: Arc<dyn IdentityIssuer>,
    pub store: Arc<dyn BlobStore>,
    pub sink: Arc<dyn SubmissionSink>,
}

// =============================================================================
// DRIVER
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextOutcome {
    Advanced { step: usize },
    Invalid(ErrorMap),
    RegistrationFailed(RegistrationError),
    /// A registration is still outstanding from an earlier, abandoned call.
    Busy,
}

#[derive(Debug, Clone)]
pub enum SubmitReport {
    Invalid(ErrorMap),
    /// A submission from an earlier, abandoned call is still outstanding.
    Busy,
    Finished {
        record: SubmissionRecord,
        outcome: SubmissionOutcome,
    },
}

type UploadResult = (UploadId, Result<String, UploadError>);

pub struct FormDriver {
    session: Session,
    collaborators: Collaborators,
    tasks: JoinSet<UploadResult>,
}

impl FormDriver {
    pub fn new(catalogue: Arc<Catalogue>, collaborators: Collaborators) -> Self {
        FormDriver {
            session: Session::new(catalogue),
            collaborators,
            tasks: JoinSet::new(),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    // -------------------------------------------------------------------------
    // Field edits
    // -------------------------------------------------------------------------

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) -> Result<Vec<String>, SessionError> {
        self.session.set_text(name, value)
    }

    pub fn select_option(&mut self, name: &str, option: &str) -> Result<Vec<String>, SessionError> {
        self.session.select_option(name, option)
    }

    pub fn toggle_option(&mut self, name: &str, option: &str) -> Result<Vec<String>, SessionError> {
        self.session.toggle_option(name, option)
    }

    pub fn blur(&mut self, name: &str) -> Result<Option<&FieldError>, SessionError> {
        self.session.blur(name)
    }

    pub fn attach_files(
        &mut self,
        name: &str,
        files: Vec<FileHandle>,
    ) -> Result<Attachment, SessionError> {
        let attachment = self.session.attach_files(name, files)?;
        self.spawn_uploads(attachment.dispatch.clone());
        Ok(attachment)
    }

    pub fn remove_file(&mut self, name: &str, index: usize) -> Result<UploadId, SessionError> {
        self.session.remove_file(name, index)
    }

    pub fn dispatch_queued(&mut self) -> usize {
        let requests = self.session.dispatch_queued();
        let n = requests.len();
        self.spawn_uploads(requests);
        n
    }

    pub fn retry_failed(&mut self, field: Option<&str>) -> usize {
        let requests = self.session.retry_failed(field);
        let n = requests.len();
        self.spawn_uploads(requests);
        n
    }

    // -------------------------------------------------------------------------
    // Uploads
    // -------------------------------------------------------------------------

    fn spawn_uploads(&mut self, requests: Vec<UploadRequest>) {
        for request in requests {
            let store = Arc::clone(&self.collaborators.store);
            tracing::debug!(id = %request.id, field = %request.field, "upload dispatched");
            self.tasks.spawn(async move {
                let id = request.id;
                (id, upload_one(store.as_ref(), request).await)
            });
        }
    }

    /// Apply every upload result that is already available. Never waits.
    pub fn pump(&mut self) -> usize {
        let mut applied = 0;
        while let Some(joined) = self.tasks.try_join_next() {
            if self.apply_joined(joined) {
                applied += 1;
            }
        }
        applied
    }

    fn apply_joined(&mut self, joined: Result<UploadResult, tokio::task::JoinError>) -> bool {
        match joined {
            Ok((id, result)) => {
                self.session.complete_upload(id, result) == crate::session::UploadApplied::Applied
            }
            Err(e) => {
                tracing::warn!(error = %e, "upload task ended without a result");
                false
            }
        }
    }

    /// Wait until no upload (optionally of one field) is in flight. Failed
    /// entries are not retried. Returns the terminal status of each awaited upload.
    pub async fn await_outstanding(&mut self, field: Option<&str>) -> Vec<(UploadId, UploadStatus)> {
        let awaited = self.session.outstanding(field);
        while !self.session.outstanding(field).is_empty() {
            match self.tasks.join_next().await {
                Some(joined) => {
                    self.apply_joined(joined);
                }
                None => {
                    // Tasks are gone but entries are still in flight: a task panicked.
                    for id in self.session.outstanding(field) {
                        self.session.complete_upload(
                            id,
                            Err(UploadError::Transport("upload task aborted".into())),
                        );
                    }
                }
            }
        }
        awaited
            .into_iter()
            .filter_map(|id| self.session.upload_status(id).map(|s| (id, s.clone())))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    /// Advance, running registration first when the step requires it.
    pub async fn next(&mut self) -> Result<NextOutcome, SessionError> {
        self.pump();
        match self.session.next()? {
            Advance::Advanced { step } => Ok(NextOutcome::Advanced { step }),
            Advance::Invalid(errors) => Ok(NextOutcome::Invalid(errors)),
            Advance::RegistrationRequired(request) => {
                let result = register(self.collaborators.issuer.as_ref(), &request).await;
                match self.session.complete_registration(request.ticket, result) {
                    RegistrationOutcome::Registered {
                        advanced_to,
                        dispatch,
                    } => {
                        self.spawn_uploads(dispatch);
                        Ok(NextOutcome::Advanced {
                            step: advanced_to.unwrap_or(self.session.current_step_index()),
                        })
                    }
                    RegistrationOutcome::Failed(e) => Ok(NextOutcome::RegistrationFailed(e)),
                    RegistrationOutcome::Stale => Err(SessionError::Closed),
                }
            }
            Advance::Busy => Ok(NextOutcome::Busy),
        }
    }

    pub fn prev(&mut self) -> Result<usize, SessionError> {
        self.session.prev()
    }

    /// Validate, finish uploads, hand the record to the sink and apply the failure policy.
    pub async fn submit(&mut self) -> Result<SubmitReport, SessionError> {
        loop {
            self.pump();
            match self.session.submit()? {
                Submit::Invalid(errors) => return Ok(SubmitReport::Invalid(errors)),
                Submit::AwaitingUploads(requests) => {
                    self.spawn_uploads(requests);
                    self.await_outstanding(None).await;
                }
                Submit::Ready(record) => {
                    let result = send(self.collaborators.sink.as_ref(), &record).await;
                    let outcome = self.session.complete_submission(result)?;
                    return Ok(SubmitReport::Finished { record, outcome });
                }
                Submit::Busy => return Ok(SubmitReport::Busy),
            }
        }
    }
}

// =============================================================================
// RESPONSE MAPPING
// =============================================================================

async fn register(
    issuer: &dyn IdentityIssuer,
    request: &RegistrationRequest,
) -> Result<Identity, RegistrationError> {
    let response = issuer
        .issue(IssueRequest {
            email: request.email.clone(),
            phone: request.phone.clone(),
        })
        .await
        .map_err(|e| RegistrationError::Transport(e.0))?;
    match response {
        IssueResponse {
            success: true,
            identity: Some(identity),
            ..
        } => Ok(Identity::new(identity)),
        other => Err(RegistrationError::Rejected(
            other.error.unwrap_or_else(|| "no identity issued".into()),
        )),
    }
}

async fn upload_one(store: &dyn BlobStore, request: UploadRequest) -> Result<String, UploadError> {
    let response = store
        .upload(BlobUpload {
            file: request.file,
            identity: request.identity.as_str().to_string(),
            field_name: request.field,
        })
        .await
        .map_err(|e| UploadError::Transport(e.0))?;
    match response {
        BlobResponse {
            success: true,
            location: Some(location),
            ..
        } => Ok(location),
        other => Err(UploadError::Rejected(
            other.error.unwrap_or_else(|| "Upload failed".into()),
        )),
    }
}

async fn send(sink: &dyn SubmissionSink, record: &SubmissionRecord) -> Result<(), SubmissionError> {
    match sink.submit(record).await {
        Ok(SubmitResponse { success: true }) => Ok(()),
        Ok(_) => Err(SubmissionError::Rejected),
        Err(e) => Err(SubmissionError::Transport(e.0)),
    }
}
