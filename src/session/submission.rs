//! Final record assembly.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use super::registration::Identity;
use super::uploads::UploadTracker;
use super::values::{Value, ValueStore};
use crate::catalogue::Catalogue;
use crate::catalogue::rules::URLS_SUFFIX;
use crate::error::SubmissionError;
use crate::visibility::is_visible;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum RecordValue {
    Text(String),
    List(Vec<String>),
}

/// The flattened payload handed to the submission sink. Contains no file bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmissionRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, RecordValue>,
    /// Files that ended in `failed` and are therefore missing from the record.
    #[serde(skip)]
    pub failed_uploads: usize,
}

impl SubmissionRecord {
    pub fn get(&self, key: &str) -> Option<&RecordValue> {
        self.fields.get(key)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Accepted,
    /// The sink failed but policy completes the session anyway.
    AcceptedDespiteFailure(SubmissionError),
    /// The sink failed and the session stays open on the final step.
    Rejected(SubmissionError),
}

impl SubmissionOutcome {
    pub fn is_complete(&self) -> bool {
        !matches!(self, SubmissionOutcome::Rejected(_))
    }
}

/// Build the record from visible fields. File fields contribute `<name>_urls`
/// with their successful locations, in selection order, or nothing at all.
pub(crate) fn assemble(
    catalogue: &Catalogue,
    values: &ValueStore,
    uploads: &UploadTracker,
    identity: Option<&Identity>,
) -> SubmissionRecord {
    let mut fields = BTreeMap::new();
    let mut seen = HashSet::new();
    let mut failed_uploads = 0;

    for field in catalogue.fields() {
        if !seen.insert(field.name.as_str()) || !is_visible(field, values) {
            continue;
        }
        match values.get(&field.name) {
            None => {}
            Some(Value::Text(s)) => {
                fields.insert(field.name.clone(), RecordValue::Text(s.clone()));
            }
            Some(Value::List(items)) => {
                fields.insert(field.name.clone(), RecordValue::List(items.clone()));
            }
            Some(Value::Files(files)) => {
                let mut locations = Vec::new();
                for attached in files {
                    let Some(entry) = uploads.get(attached.id) else {
                        continue;
                    };
                    match entry.status.location() {
                        Some(location) => locations.push(location.to_string()),
                        None if entry.status.is_terminal() => failed_uploads += 1,
                        None => {}
                    }
                }
                if !locations.is_empty() {
                    fields.insert(
                        format!("{}{}", field.name, URLS_SUFFIX),
                        RecordValue::List(locations),
                    );
                }
            }
        }
    }

    SubmissionRecord {
        identity: identity.cloned(),
        fields,
        failed_uploads,
    }
}
