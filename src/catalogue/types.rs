//! Serde types for the form catalogue document.
//!
//! The catalogue is authored as JSON next to the page that renders it. Kind
//! names also accept the lower-case spellings used by older catalogues
//! (`singleselect`, `multiselect`, `other`).

use serde::{Deserialize, Serialize};

// =============================================================================
// TOP-LEVEL DOCUMENT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormDocument {
    pub id: String,
    pub version: String,
    #[serde(default)]
    pub title: Option<String>,
    pub steps: Vec<StepDefinition>,
    #[serde(default)]
    pub settings: FormSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDefinition {
    pub id: u32,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub fields: Vec<FieldDefinition>,
}

impl StepDefinition {
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// A step collects contact details when it has both an email and a phone field.
    pub fn is_registration_step(&self) -> bool {
        self.fields.iter().any(|f| f.kind == FieldKind::Email)
            && self.fields.iter().any(|f| f.kind == FieldKind::Tel)
    }
}

// =============================================================================
// FIELDS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDefinition {
    pub name: String,
    pub label: String,
    pub kind: FieldKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Option<Vec<String>>,
    #[serde(default)]
    pub visible_when: Option<Predicate>,
}

impl FieldDefinition {
    pub fn options(&self) -> &[String] {
        self.options.as_deref().unwrap_or(&[])
    }

    pub fn has_option(&self, option: &str) -> bool {
        self.options().iter().any(|o| o == option)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Text,
    Email,
    Tel,
    #[serde(alias = "singleselect")]
    SingleSelect,
    #[serde(alias = "multiselect")]
    MultiSelect,
    Consent,
    File,
    #[serde(alias = "other")]
    FreeText,
    Country,
}

/// Shape of the value a field stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueShape {
    Text,
    List,
    Files,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Email => "email",
            FieldKind::Tel => "tel",
            FieldKind::SingleSelect => "singleSelect",
            FieldKind::MultiSelect => "multiSelect",
            FieldKind::Consent => "consent",
            FieldKind::File => "file",
            FieldKind::FreeText => "freeText",
            FieldKind::Country => "country",
        }
    }

    /// Kinds whose values are drawn from a declared option set.
    pub fn is_choice(&self) -> bool {
        matches!(
            self,
            FieldKind::SingleSelect | FieldKind::MultiSelect | FieldKind::Consent
        )
    }

    pub fn shape(&self) -> ValueShape {
        match self {
            FieldKind::MultiSelect | FieldKind::Consent => ValueShape::List,
            FieldKind::File => ValueShape::Files,
            FieldKind::Text
            | FieldKind::Email
            | FieldKind::Tel
            | FieldKind::SingleSelect
            | FieldKind::FreeText
            | FieldKind::Country => ValueShape::Text,
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// VISIBILITY PREDICATES
// =============================================================================

/// Closed condition language for field visibility.
///
/// Leaves compare one earlier field against a literal; `all` / `any` combine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Predicate {
    /// The field's value is exactly `value` (a one-element list also matches).
    Equals { field: String, value: String },
    /// The field's selection contains `value`.
    Includes { field: String, value: String },
    All { of: Vec<Predicate> },
    Any { of: Vec<Predicate> },
}

impl Predicate {
    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::Equals {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn includes(field: impl Into<String>, value: impl Into<String>) -> Self {
        Predicate::Includes {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn all(of: Vec<Predicate>) -> Self {
        Predicate::All { of }
    }

    pub fn any(of: Vec<Predicate>) -> Self {
        Predicate::Any { of }
    }

    /// Every field name this predicate reads, in declaration order, with repeats.
    pub fn referenced_fields(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.collect_refs(&mut refs);
        refs
    }

    fn collect_refs<'a>(&'a self, refs: &mut Vec<&'a str>) {
        match self {
            Predicate::Equals { field, .. } | Predicate::Includes { field, .. } => {
                refs.push(field.as_str());
            }
            Predicate::All { of } | Predicate::Any { of } => {
                for p in of {
                    p.collect_refs(refs);
                }
            }
        }
    }
}

// =============================================================================
// SETTINGS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FormSettings {
    pub submission_failure: SubmissionFailurePolicy,
    pub pending_files: PendingFilesPolicy,
    pub min_phone_digits: usize,
    pub accepted_file_extensions: Vec<String>,
    pub max_visible_options: usize,
}

impl Default for FormSettings {
    fn default() -> Self {
        FormSettings {
            submission_failure: SubmissionFailurePolicy::FailOpen,
            pending_files: PendingFilesPolicy::AutoDispatch,
            min_phone_digits: 6,
            accepted_file_extensions: ["pdf", "doc", "docx", "png", "jpg", "jpeg"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_visible_options: 10,
        }
    }
}

impl FormSettings {
    /// Case-insensitive extension check. An empty list accepts everything.
    pub fn accepts_file(&self, file_name: &str) -> bool {
        if self.accepted_file_extensions.is_empty() {
            return true;
        }
        let Some((_, ext)) = file_name.rsplit_once('.') else {
            return false;
        };
        self.accepted_file_extensions
            .iter()
            .any(|accepted| accepted.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}

/// What the user sees when the submission sink fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SubmissionFailurePolicy {
    /// Report the failure but still complete the session.
    FailOpen,
    /// Keep the session open on the final step so the user can retry.
    FailClosed,
}

/// What happens to files selected before an identity exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PendingFilesPolicy {
    /// Dispatch every queued file as soon as registration succeeds.
    AutoDispatch,
    /// Leave them queued until the caller asks for dispatch.
    Manual,
}
