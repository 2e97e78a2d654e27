//! One form session: values, errors, navigation, registration and uploads.
//!
//! A `Session` never performs I/O. Operations that need a collaborator return
//! a request; the caller runs it and feeds the answer back through the matching
//! `complete_*` method. Every mutation goes through `&mut Session`, so state
//! changes are applied one at a time in the order they arrive.

pub mod registration;
pub mod submission;
pub mod uploads;
pub mod values;

pub use registration::{Identity, RegistrationRequest, RegistrationTicket};
pub use submission::{RecordValue, SubmissionOutcome, SubmissionRecord};
pub use uploads::{UploadApplied, UploadEntry, UploadId, UploadRequest, UploadStatus};
pub use values::{AttachedFile, FileHandle, Value, ValueStore};

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::catalogue::{
    Catalogue, FieldDefinition, FieldKind, PendingFilesPolicy, StepDefinition,
    SubmissionFailurePolicy, ValueShape,
};
use crate::error::{RegistrationError, SessionError, SubmissionError, UploadError};
use crate::validate::{ErrorMap, FieldError, validate_field, validate_step};
use crate::visibility;

use registration::{Begin, Completion, Registrar};
use uploads::UploadTracker;

/// Key of the error slot that holds registration failures.
pub const REGISTRATION_ERROR_KEY: &str = "registration";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Collecting,
    Submitting,
    Completed,
}

/// Result of asking to move forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Advance {
    Advanced { step: usize },
    /// The step failed validation; the map holds every problem.
    Invalid(ErrorMap),
    /// Run this registration and pass the answer to `complete_registration`.
    RegistrationRequired(RegistrationRequest),
    /// A registration is already outstanding.
    Busy,
}

#[derive(Debug, Clone)]
pub enum RegistrationOutcome {
    /// Identity stored. `advanced_to` is set when the user was still on the
    /// step that started the attempt. `dispatch` holds backlog uploads.
    Registered {
        advanced_to: Option<usize>,
        dispatch: Vec<UploadRequest>,
    },
    Failed(RegistrationError),
    /// Not the outstanding attempt, or the session is closed. Nothing changed.
    Stale,
}

/// Result of attaching files to a file field.
#[derive(Debug, Clone, Default)]
pub struct Attachment {
    pub accepted: Vec<UploadId>,
    /// Names of files whose extension is not accepted.
    pub rejected: Vec<String>,
    /// Uploads to start now. Empty until an identity exists.
    pub dispatch: Vec<UploadRequest>,
}

#[derive(Debug, Clone)]
pub enum Submit {
    Invalid(ErrorMap),
    Busy,
    /// Run these uploads (possibly none, if others are still in flight), feed
    /// every result back, then call `submit` again.
    AwaitingUploads(Vec<UploadRequest>),
    /// Hand this record to the sink and report back with `complete_submission`.
    Ready(SubmissionRecord),
}

pub struct Session {
    catalogue: Arc<Catalogue>,
    current_step: usize,
    values: ValueStore,
    errors: ErrorMap,
    registrar: Registrar,
    uploads: UploadTracker,
    stage: Stage,
}

impl Session {
    pub fn new(catalogue: Arc<Catalogue>) -> Self {
        Session {
            catalogue,
            current_step: 0,
            values: ValueStore::new(),
            errors: ErrorMap::new(),
            registrar: Registrar::default(),
            uploads: UploadTracker::default(),
            stage: Stage::Collecting,
        }
    }

    // -------------------------------------------------------------------------
    // Read access
    // -------------------------------------------------------------------------

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn current_step_index(&self) -> usize {
        self.current_step
    }

    pub fn current_step(&self) -> &StepDefinition {
        &self.catalogue.steps()[self.current_step]
    }

    pub fn is_final_step(&self) -> bool {
        self.current_step + 1 == self.catalogue.step_count()
    }

    pub fn values(&self) -> &ValueStore {
        &self.values
    }

    pub fn errors(&self) -> &ErrorMap {
        &self.errors
    }

    pub fn registration_error(&self) -> Option<&RegistrationError> {
        self.registrar.last_error()
    }

    /// Every current message, field errors plus the registration slot.
    pub fn error_messages(&self) -> BTreeMap<String, String> {
        let mut out: BTreeMap<String, String> = self
            .errors
            .iter()
            .map(|(k, v)| (k.clone(), v.to_string()))
            .collect();
        if let Some(e) = self.registrar.last_error() {
            out.insert(REGISTRATION_ERROR_KEY.to_string(), e.to_string());
        }
        out
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.registrar.identity()
    }

    pub fn is_registered(&self) -> bool {
        self.registrar.identity().is_some()
    }

    /// True while a registration or submission call is outstanding.
    pub fn is_busy(&self) -> bool {
        self.registrar.in_flight() || self.stage == Stage::Submitting
    }

    pub fn is_completed(&self) -> bool {
        self.stage == Stage::Completed
    }

    pub fn is_visible(&self, name: &str) -> bool {
        self.catalogue
            .field(name)
            .is_some_and(|f| visibility::is_visible(f, &self.values))
    }

    pub fn upload_status(&self, id: UploadId) -> Option<&UploadStatus> {
        self.uploads.get(id).map(|e| &e.status)
    }

    pub fn uploads(&self) -> impl Iterator<Item = (UploadId, &UploadEntry)> {
        self.uploads.iter()
    }

    /// Uploads still in flight, optionally for one field.
    pub fn outstanding(&self, field: Option<&str>) -> Vec<UploadId> {
        self.uploads.in_flight(field)
    }

    pub fn failed_upload_count(&self) -> usize {
        self.uploads.failed(None).len()
    }

    // -------------------------------------------------------------------------
    // Field value mutations
    // -------------------------------------------------------------------------

    fn writable_field(&self, name: &str) -> Result<&FieldDefinition, SessionError> {
        self.ensure_collecting()?;
        self.catalogue
            .field(name)
            .ok_or_else(|| SessionError::UnknownField(name.to_string()))
    }

    /// Edits and navigation are refused while a submission is in flight.
    fn ensure_collecting(&self) -> Result<(), SessionError> {
        match self.stage {
            Stage::Collecting => Ok(()),
            Stage::Submitting => Err(SessionError::Busy),
            Stage::Completed => Err(SessionError::Closed),
        }
    }

    fn kind_mismatch(field: &FieldDefinition) -> SessionError {
        SessionError::KindMismatch {
            field: field.name.clone(),
            kind: field.kind.as_str(),
        }
    }

    /// Set a free-form value. Returns fields whose visibility may have changed.
    pub fn set_text(
        &mut self,
        name: &str,
        value: impl Into<String>,
    ) -> Result<Vec<String>, SessionError> {
        let field = self.writable_field(name)?;
        if field.kind.shape() != ValueShape::Text || field.kind == FieldKind::SingleSelect {
            return Err(Self::kind_mismatch(field));
        }
        self.values.set_text(name, value.into());
        tracing::debug!(field = name, "text value set");
        Ok(self.catalogue.dependents(name))
    }

    /// Choose the single option of a single-select field.
    pub fn select_option(&mut self, name: &str, option: &str) -> Result<Vec<String>, SessionError> {
        let field = self.writable_field(name)?;
        if field.kind != FieldKind::SingleSelect {
            return Err(Self::kind_mismatch(field));
        }
        if !field.has_option(option) {
            return Err(SessionError::UnknownOption {
                field: name.to_string(),
                option: option.to_string(),
            });
        }
        self.values.set_text(name, option.to_string());
        tracing::debug!(field = name, option, "option selected");
        Ok(self.catalogue.dependents(name))
    }

    /// Flip one option of a multi-select or consent field.
    pub fn toggle_option(&mut self, name: &str, option: &str) -> Result<Vec<String>, SessionError> {
        let field = self.writable_field(name)?;
        if field.kind.shape() != ValueShape::List {
            return Err(Self::kind_mismatch(field));
        }
        if !field.has_option(option) {
            return Err(SessionError::UnknownOption {
                field: name.to_string(),
                option: option.to_string(),
            });
        }
        let selected = self.values.toggle(name, option);
        tracing::debug!(field = name, option, selected, "option toggled");
        Ok(self.catalogue.dependents(name))
    }

    /// Validate a single field as the user leaves it, updating only its own error.
    pub fn blur(&mut self, name: &str) -> Result<Option<&FieldError>, SessionError> {
        let field = self.writable_field(name)?;
        let error = if visibility::is_visible(field, &self.values) {
            validate_field(field, self.values.get(name), self.catalogue.settings())
        } else {
            None
        };
        match error {
            Some(e) => {
                self.errors.insert(name.to_string(), e);
            }
            None => {
                self.errors.remove(name);
            }
        }
        Ok(self.errors.get(name))
    }

    // -------------------------------------------------------------------------
    // Files
    // -------------------------------------------------------------------------

    /// Append files to a file field. Accepted files are queued, and dispatched
    /// at once when an identity already exists.
    pub fn attach_files(
        &mut self,
        name: &str,
        files: Vec<FileHandle>,
    ) -> Result<Attachment, SessionError> {
        let field = self.writable_field(name)?;
        if field.kind != FieldKind::File {
            return Err(Self::kind_mismatch(field));
        }

        let settings = self.catalogue.settings();
        let mut attachment = Attachment::default();
        let mut attached = Vec::new();
        for file in files {
            if !settings.accepts_file(&file.name) {
                tracing::warn!(field = name, file = %file.name, "file type not accepted");
                attachment.rejected.push(file.name);
                continue;
            }
            let id = self.uploads.allocate(name);
            attachment.accepted.push(id);
            attached.push(AttachedFile { id, file });
        }
        self.values.push_files(name, attached);

        if self.is_registered() {
            attachment.dispatch = self.dispatch(&attachment.accepted);
        }
        tracing::debug!(
            field = name,
            accepted = attachment.accepted.len(),
            rejected = attachment.rejected.len(),
            dispatched = attachment.dispatch.len(),
            "files attached"
        );
        Ok(attachment)
    }

    /// Remove the file at `index`. An upload still in flight for it is
    /// forgotten, and its result will be discarded when it arrives.
    pub fn remove_file(&mut self, name: &str, index: usize) -> Result<UploadId, SessionError> {
        let field = self.writable_field(name)?;
        if field.kind != FieldKind::File {
            return Err(Self::kind_mismatch(field));
        }
        let removed = self
            .values
            .remove_file(name, index)
            .ok_or_else(|| SessionError::NoSuchFile {
                field: name.to_string(),
                index,
            })?;
        self.uploads.remove(removed.id);
        tracing::debug!(field = name, id = %removed.id, "file removed");
        Ok(removed.id)
    }

    /// Record a blob store answer for one file.
    pub fn complete_upload(
        &mut self,
        id: UploadId,
        result: Result<String, UploadError>,
    ) -> UploadApplied {
        if self.stage == Stage::Completed {
            tracing::debug!(%id, "upload result after completion discarded");
            return UploadApplied::Discarded;
        }
        let status = match &result {
            Ok(location) => UploadStatus::Succeeded {
                location: location.clone(),
            },
            Err(e) => UploadStatus::Failed {
                reason: e.to_string(),
            },
        };
        let applied = self.uploads.complete(id, status);
        match (applied, &result) {
            (UploadApplied::Discarded, _) => {
                tracing::debug!(%id, "upload result for untracked file discarded");
            }
            (UploadApplied::Applied, Ok(location)) => {
                tracing::debug!(%id, location = %location, "upload succeeded");
            }
            (UploadApplied::Applied, Err(e)) => {
                tracing::warn!(%id, error = %e, "upload failed");
            }
        }
        applied
    }

    /// Dispatch every queued file. Does nothing before registration.
    pub fn dispatch_queued(&mut self) -> Vec<UploadRequest> {
        if self.stage == Stage::Completed {
            return vec![];
        }
        let queued = self.uploads.queued(None);
        self.dispatch(&queued)
    }

    /// Re-dispatch failed uploads, optionally for one field. Never automatic.
    pub fn retry_failed(&mut self, field: Option<&str>) -> Vec<UploadRequest> {
        if self.stage == Stage::Completed || !self.is_registered() {
            return vec![];
        }
        let failed = self.uploads.failed(field);
        self.uploads.requeue(&failed);
        self.dispatch(&failed)
    }

    fn dispatch(&mut self, ids: &[UploadId]) -> Vec<UploadRequest> {
        let Some(identity) = self.registrar.identity().cloned() else {
            return vec![];
        };
        let mut requests = Vec::new();
        for &id in ids {
            let Some(field) = self.uploads.get(id).map(|e| e.field.clone()) else {
                continue;
            };
            let Some(attached) = self.values.files(&field).iter().find(|f| f.id == id) else {
                continue;
            };
            let file = attached.file.clone();
            if self.uploads.mark_in_flight(id) {
                requests.push(UploadRequest {
                    id,
                    field,
                    file,
                    identity: identity.clone(),
                });
            }
        }
        requests
    }

    // -------------------------------------------------------------------------
    // Navigation
    // -------------------------------------------------------------------------

    fn revalidate_current(&mut self) -> bool {
        let (valid, errors) = validate_step(
            &self.catalogue.steps()[self.current_step],
            &self.values,
            self.catalogue.settings(),
        );
        self.errors = errors;
        valid
    }

    /// Move forward one step, registering first when this step collects contact details.
    pub fn next(&mut self) -> Result<Advance, SessionError> {
        if self.stage == Stage::Completed {
            return Err(SessionError::Closed);
        }
        if self.is_final_step() {
            return Err(SessionError::NoNextStep);
        }
        if self.registrar.in_flight() {
            return Ok(Advance::Busy);
        }
        if !self.revalidate_current() {
            tracing::debug!(
                step = self.current_step,
                errors = self.errors.len(),
                "step invalid"
            );
            return Ok(Advance::Invalid(self.errors.clone()));
        }

        let step = self.current_step();
        if step.is_registration_step() && !self.is_registered() {
            let email = self.first_text_of_kind(step, FieldKind::Email);
            let phone = self.first_text_of_kind(step, FieldKind::Tel);
            return Ok(match self.registrar.begin(email, phone, self.current_step) {
                Begin::Started(request) => {
                    tracing::info!(step = self.current_step, "registration started");
                    Advance::RegistrationRequired(request)
                }
                Begin::Busy => Advance::Busy,
            });
        }

        self.current_step += 1;
        tracing::debug!(step = self.current_step, "advanced");
        Ok(Advance::Advanced {
            step: self.current_step,
        })
    }

    fn first_text_of_kind(&self, step: &StepDefinition, kind: FieldKind) -> String {
        step.fields
            .iter()
            .filter(|f| f.kind == kind)
            .find_map(|f| self.values.get(&f.name).and_then(Value::as_text))
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    /// Apply the issuance collaborator's answer for `ticket`.
    pub fn complete_registration(
        &mut self,
        ticket: RegistrationTicket,
        result: Result<Identity, RegistrationError>,
    ) -> RegistrationOutcome {
        if self.stage == Stage::Completed {
            return RegistrationOutcome::Stale;
        }
        match self.registrar.complete(ticket, result) {
            Completion::Stale => {
                tracing::warn!("stale registration result discarded");
                RegistrationOutcome::Stale
            }
            Completion::Failed => {
                let error = self
                    .registrar
                    .last_error()
                    .cloned()
                    .unwrap_or_else(|| RegistrationError::Rejected(String::new()));
                tracing::warn!(error = ?error, "registration failed");
                RegistrationOutcome::Failed(error)
            }
            Completion::Registered { identity, step } => {
                tracing::info!(identity = %identity, "registered");
                let advanced_to = (self.current_step == step).then(|| {
                    self.current_step += 1;
                    self.current_step
                });
                let policy = self.catalogue.settings().pending_files;
                let dispatch = match policy {
                    PendingFilesPolicy::AutoDispatch => self.dispatch_queued(),
                    PendingFilesPolicy::Manual => vec![],
                };
                RegistrationOutcome::Registered {
                    advanced_to,
                    dispatch,
                }
            }
        }
    }

    /// Move back one step. Values and errors are kept.
    pub fn prev(&mut self) -> Result<usize, SessionError> {
        self.ensure_collecting()?;
        self.current_step = self.current_step.saturating_sub(1);
        tracing::debug!(step = self.current_step, "went back");
        Ok(self.current_step)
    }

    // -------------------------------------------------------------------------
    // Submission
    // -------------------------------------------------------------------------

    /// Validate the final step, settle uploads, and build the record.
    pub fn submit(&mut self) -> Result<Submit, SessionError> {
        match self.stage {
            Stage::Completed => return Err(SessionError::Closed),
            Stage::Submitting => return Ok(Submit::Busy),
            Stage::Collecting => {}
        }
        if !self.is_final_step() {
            return Err(SessionError::NotFinalStep);
        }
        if self.registrar.in_flight() {
            return Ok(Submit::Busy);
        }
        if !self.revalidate_current() {
            return Ok(Submit::Invalid(self.errors.clone()));
        }

        let dispatch = self.dispatch_queued();
        if !dispatch.is_empty() || !self.uploads.in_flight(None).is_empty() {
            tracing::debug!(
                dispatched = dispatch.len(),
                in_flight = self.uploads.in_flight(None).len(),
                "waiting for uploads before submission"
            );
            return Ok(Submit::AwaitingUploads(dispatch));
        }

        let record = submission::assemble(
            &self.catalogue,
            &self.values,
            &self.uploads,
            self.registrar.identity(),
        );
        if record.failed_uploads > 0 {
            tracing::warn!(failed = record.failed_uploads, "submitting with failed uploads");
        }
        self.stage = Stage::Submitting;
        tracing::info!(fields = record.fields.len(), "submission ready");
        Ok(Submit::Ready(record))
    }

    /// Apply the sink's answer according to the catalogue's failure policy.
    pub fn complete_submission(
        &mut self,
        result: Result<(), SubmissionError>,
    ) -> Result<SubmissionOutcome, SessionError> {
        match self.stage {
            Stage::Submitting => {}
            Stage::Completed => return Err(SessionError::Closed),
            Stage::Collecting => return Err(SessionError::NoSubmissionInFlight),
        }
        let policy = self.catalogue.settings().submission_failure;
        let outcome = match result {
            Ok(()) => SubmissionOutcome::Accepted,
            Err(e) => match policy {
                SubmissionFailurePolicy::FailOpen => SubmissionOutcome::AcceptedDespiteFailure(e),
                SubmissionFailurePolicy::FailClosed => SubmissionOutcome::Rejected(e),
            },
        };
        self.stage = if outcome.is_complete() {
            Stage::Completed
        } else {
            Stage::Collecting
        };
        match &outcome {
            SubmissionOutcome::Accepted => tracing::info!("submission accepted"),
            SubmissionOutcome::AcceptedDespiteFailure(e) => {
                tracing::warn!(error = %e, "submission failed, session completed by policy")
            }
            SubmissionOutcome::Rejected(e) => {
                tracing::warn!(error = %e, "submission failed, session kept open")
            }
        }
        Ok(outcome)
    }
}
