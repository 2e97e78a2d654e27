//! WASM entry points for browser use.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use wasm_bindgen::prelude::*;

use crate::error::CatalogueError;
use crate::session::Session;

/// Parse and check a catalogue JSON.
/// Returns a JSON array of CatalogueError objects (empty when valid).
#[wasm_bindgen]
pub fn validate_catalogue(json: &str) -> JsValue {
    let result = validate_catalogue_inner(json);
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

fn validate_catalogue_inner(json: &str) -> Vec<ErrorDto> {
    match crate::catalogue::parse_and_build(json) {
        Ok(_) => vec![],
        Err(errors) => errors.into_iter().map(ErrorDto::from).collect(),
    }
}

/// Evaluate one step against a flat `{ field: string | string[] }` value map.
/// Returns `{status: "evaluated", visible, errors}` or `{status: "errors", ...}`.
#[wasm_bindgen]
pub fn evaluate_step(catalogue_json: &str, values_json: &str, step_index: usize) -> JsValue {
    let result = evaluate_step_inner(catalogue_json, values_json, step_index);
    serde_wasm_bindgen::to_value(&result).unwrap_or(JsValue::NULL)
}

pub(crate) fn evaluate_step_inner(
    catalogue_json: &str,
    values_json: &str,
    step_index: usize,
) -> EvaluateResult {
    let catalogue = match crate::catalogue::parse_and_build(catalogue_json) {
        Ok(c) => Arc::new(c),
        Err(errors) => {
            return EvaluateResult::Errors {
                errors: errors.into_iter().map(ErrorDto::from).collect(),
            };
        }
    };

    let values = match serde_json::from_str::<BTreeMap<String, InputValue>>(values_json) {
        Ok(v) => v,
        Err(e) => {
            return EvaluateResult::Errors {
                errors: vec![ErrorDto::from(CatalogueError::parse(
                    "P002",
                    format!("Failed to parse values JSON: {}", e),
                ))],
            };
        }
    };

    let Some(step) = catalogue.step(step_index) else {
        return EvaluateResult::Errors {
            errors: vec![ErrorDto::from(CatalogueError::parse(
                "P003",
                format!("Step index {} is out of range", step_index),
            ))],
        };
    };

    // Replay the values into a scratch session so the same store rules apply.
    let mut session = Session::new(Arc::clone(&catalogue));
    for (name, value) in values {
        let Some(field) = catalogue.field(&name) else {
            continue;
        };
        let applied = match value {
            InputValue::Text(s) if field.kind == crate::catalogue::FieldKind::SingleSelect => {
                session.select_option(&name, &s).map(|_| ())
            }
            InputValue::Text(s) => session.set_text(&name, s).map(|_| ()),
            InputValue::List(mut items) => {
                // A repeated entry would toggle the option back off.
                let mut seen = HashSet::new();
                items.retain(|item| seen.insert(item.clone()));
                items
                    .iter()
                    .try_for_each(|item| session.toggle_option(&name, item).map(|_| ()))
            }
        };
        if let Err(e) = applied {
            tracing::debug!(field = %name, error = %e, "value ignored");
        }
    }

    let visible = step
        .fields
        .iter()
        .filter(|f| crate::visibility::is_visible(f, session.values()))
        .map(|f| f.name.clone())
        .collect();
    let (_, errors) =
        crate::validate::validate_step(step, session.values(), catalogue.settings());

    EvaluateResult::Evaluated {
        visible,
        errors: errors
            .into_iter()
            .map(|(k, v)| (k, v.to_string()))
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// DTOs for serialization to JS
// ---------------------------------------------------------------------------

#[derive(serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
enum InputValue {
    Text(String),
    List(Vec<String>),
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub(crate) struct ErrorDto {
    code: String,
    phase: String,
    message: String,
    field: Option<String>,
}

impl From<CatalogueError> for ErrorDto {
    fn from(e: CatalogueError) -> Self {
        ErrorDto {
            code: e.code,
            phase: e.phase.to_string(),
            message: e.message,
            field: e.field,
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(tag = "status")]
pub(crate) enum EvaluateResult {
    #[serde(rename = "evaluated")]
    Evaluated {
        visible: Vec<String>,
        errors: BTreeMap<String, String>,
    },
    #[serde(rename = "errors")]
    Errors { errors: Vec<ErrorDto> },
}
