//! Render payload for the current step.
//!
//! Only visible fields appear. Long option lists are cut to the catalogue's
//! `maxVisibleOptions`, with the remainder reported as a count.

use serde::Serialize;

use crate::catalogue::{FieldDefinition, FieldKind};
use crate::session::{REGISTRATION_ERROR_KEY, Session, UploadStatus};
use crate::session::values::ValueSnapshot;
use crate::visibility::is_visible;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepView {
    pub index: usize,
    pub step_count: usize,
    pub title: String,
    pub description: Option<String>,
    /// Message for the reserved `registration` slot.
    pub registration_error: Option<String>,
    pub fields: Vec<FieldView>,
    pub actions: ActionState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldView {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    pub required: bool,
    pub value: Option<ValueSnapshot>,
    pub error: Option<String>,
    pub options: Vec<String>,
    /// Options left out of `options` ("+ N More Choices").
    pub hidden_options: usize,
    pub files: Vec<FileView>,
    /// File fields accept selections only once the session is registered.
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileView {
    pub name: String,
    pub size: u64,
    pub status: Option<UploadStatus>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionState {
    pub can_go_back: bool,
    pub is_final_step: bool,
    /// Next/submit are disabled while registration or submission is outstanding.
    pub disabled: bool,
    pub failed_uploads: usize,
}

impl Session {
    pub fn view(&self) -> StepView {
        render(self, false)
    }

    /// Same as `view` but with every option listed.
    pub fn view_expanded(&self) -> StepView {
        render(self, true)
    }
}

pub fn render(session: &Session, expand_options: bool) -> StepView {
    let step = session.current_step();
    let max_options = if expand_options {
        usize::MAX
    } else {
        session.catalogue().settings().max_visible_options
    };

    let fields = step
        .fields
        .iter()
        .filter(|f| is_visible(f, session.values()))
        .map(|f| field_view(session, f, max_options))
        .collect();

    StepView {
        index: session.current_step_index(),
        step_count: session.catalogue().step_count(),
        title: step.title.clone(),
        description: step.description.clone(),
        registration_error: session
            .error_messages()
            .remove(REGISTRATION_ERROR_KEY),
        fields,
        actions: ActionState {
            can_go_back: session.current_step_index() > 0,
            is_final_step: session.is_final_step(),
            disabled: session.is_busy() || session.is_completed(),
            failed_uploads: session.failed_upload_count(),
        },
    }
}

fn field_view(session: &Session, field: &FieldDefinition, max_options: usize) -> FieldView {
    let all_options = field.options();
    let shown = all_options.len().min(max_options);

    let files = session
        .values()
        .files(&field.name)
        .iter()
        .map(|attached| FileView {
            name: attached.file.name.clone(),
            size: attached.file.size(),
            status: session.upload_status(attached.id).cloned(),
        })
        .collect();

    FieldView {
        name: field.name.clone(),
        label: field.label.clone(),
        kind: field.kind,
        required: field.required,
        value: session.values().get(&field.name).map(ValueSnapshot::from),
        error: session.errors().get(&field.name).map(|e| e.to_string()),
        options: all_options[..shown].to_vec(),
        hidden_options: all_options.len() - shown,
        files,
        enabled: field.kind != FieldKind::File || session.is_registered(),
    }
}
