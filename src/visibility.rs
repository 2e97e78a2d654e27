//! Visibility evaluation: a pure function of a field's predicate and the current values.

use crate::catalogue::{FieldDefinition, Predicate};
use crate::session::values::{Value, ValueStore};

/// A field with no predicate is always visible.
pub fn is_visible(field: &FieldDefinition, values: &ValueStore) -> bool {
    match &field.visible_when {
        None => true,
        Some(predicate) => evaluate(predicate, values),
    }
}

/// Evaluate a predicate. Unset fields are absent and never match a leaf.
pub fn evaluate(predicate: &Predicate, values: &ValueStore) -> bool {
    match predicate {
        Predicate::Equals { field, value } => match values.get(field) {
            Some(Value::Text(s)) => s == value,
            Some(Value::List(items)) => items.len() == 1 && items[0] == *value,
            Some(Value::Files(_)) | None => false,
        },
        Predicate::Includes { field, value } => match values.get(field) {
            Some(Value::Text(s)) => s == value,
            Some(Value::List(items)) => items.iter().any(|i| i == value),
            Some(Value::Files(_)) | None => false,
        },
        Predicate::All { of } => of.iter().all(|p| evaluate(p, values)),
        Predicate::Any { of } => of.iter().any(|p| evaluate(p, values)),
    }
}
