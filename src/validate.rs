//! Field and step validation.
//!
//! Only visible fields are checked. A step check visits every visible field so
//! the returned map holds every problem at once.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use thiserror::Error;

use crate::catalogue::{FieldDefinition, FieldKind, FormSettings, StepDefinition};
use crate::session::values::{Value, ValueStore};
use crate::visibility::is_visible;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$").expect("email regex is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FieldError {
    #[error("{label} is required")]
    Required { label: String },
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Please enter a valid phone number")]
    InvalidPhone,
}

/// Field name → error, fully recomputed by each step validation.
pub type ErrorMap = BTreeMap<String, FieldError>;

pub fn is_valid_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value.trim())
}

/// Digits left after stripping everything else must reach `min_digits`.
pub fn is_valid_phone(value: &str, min_digits: usize) -> bool {
    value.chars().filter(|c| c.is_ascii_digit()).count() >= min_digits
}

/// Check one field's value, assuming the field is visible.
pub fn validate_field(
    field: &FieldDefinition,
    value: Option<&Value>,
    settings: &FormSettings,
) -> Option<FieldError> {
    let empty = value.is_none_or(Value::is_empty);
    if empty {
        return field.required.then(|| FieldError::Required {
            label: field.label.clone(),
        });
    }

    let text = value.and_then(Value::as_text)?;
    match field.kind {
        FieldKind::Email if !is_valid_email(text) => Some(FieldError::InvalidEmail),
        FieldKind::Tel if !is_valid_phone(text, settings.min_phone_digits) => {
            Some(FieldError::InvalidPhone)
        }
        _ => None,
    }
}

/// Validate every visible field of `step`. The step is valid iff the map is empty.
pub fn validate_step(
    step: &StepDefinition,
    values: &ValueStore,
    settings: &FormSettings,
) -> (bool, ErrorMap) {
    let mut errors = ErrorMap::new();
    for field in &step.fields {
        if !is_visible(field, values) {
            continue;
        }
        if let Some(err) = validate_field(field, values.get(&field.name), settings) {
            errors.insert(field.name.clone(), err);
        }
    }
    (errors.is_empty(), errors)
}
