//! Static catalogue rules (C001–C010).

use std::collections::{HashMap, HashSet};

use super::graph::PredicateGraph;
use super::types::*;
use crate::error::CatalogueError;

/// Record keys owned by the engine rather than by any field.
pub const RESERVED_KEYS: &[&str] = &["identity", "registration"];

/// Suffix of the record key that carries a file field's resolved locations.
pub const URLS_SUFFIX: &str = "_urls";

/// Run every rule. Returns all errors found.
pub fn validate_document(document: &FormDocument, graph: &PredicateGraph) -> Vec<CatalogueError> {
    let mut errors = Vec::new();

    c001_has_steps(document, &mut errors);
    c002_unique_names_per_step(document, &mut errors);
    c003_choice_fields_have_options(document, &mut errors);
    c004_plain_fields_have_no_options(document, &mut errors);
    c005_backward_references_only(document, &mut errors);
    c006_literals_match_controller(document, &mut errors);
    c007_no_cycles(graph, &mut errors);
    c008_no_reserved_names(document, &mut errors);
    c009_non_empty_combinators(document, &mut errors);
    c010_consistent_kind_across_steps(document, &mut errors);

    errors
}

fn all_fields(document: &FormDocument) -> impl Iterator<Item = &FieldDefinition> {
    document.steps.iter().flat_map(|s| s.fields.iter())
}

fn first_declarations(document: &FormDocument) -> HashMap<&str, &FieldDefinition> {
    let mut map = HashMap::new();
    for field in all_fields(document) {
        map.entry(field.name.as_str()).or_insert(field);
    }
    map
}

fn c001_has_steps(document: &FormDocument, errors: &mut Vec<CatalogueError>) {
    if document.steps.is_empty() {
        errors.push(CatalogueError::validate(
            "C001",
            "Catalogue must contain at least one step",
            None,
        ));
    }
}

fn c002_unique_names_per_step(document: &FormDocument, errors: &mut Vec<CatalogueError>) {
    for step in &document.steps {
        let mut seen = HashSet::new();
        for field in &step.fields {
            if !seen.insert(field.name.as_str()) {
                errors.push(CatalogueError::validate(
                    "C002",
                    format!("Duplicate field name '{}' in step '{}'", field.name, step.title),
                    Some(field.name.clone()),
                ));
            }
        }
    }
}

fn c003_choice_fields_have_options(document: &FormDocument, errors: &mut Vec<CatalogueError>) {
    for field in all_fields(document) {
        if field.kind.is_choice() && field.options().is_empty() {
            errors.push(CatalogueError::validate(
                "C003",
                format!("{} field '{}' must declare at least one option", field.kind, field.name),
                Some(field.name.clone()),
            ));
        }
    }
}

fn c004_plain_fields_have_no_options(document: &FormDocument, errors: &mut Vec<CatalogueError>) {
    for field in all_fields(document) {
        if !field.kind.is_choice() && field.options.is_some() {
            errors.push(CatalogueError::validate(
                "C004",
                format!("{} field '{}' must not declare options", field.kind, field.name),
                Some(field.name.clone()),
            ));
        }
    }
}

fn c005_backward_references_only(document: &FormDocument, errors: &mut Vec<CatalogueError>) {
    let known: HashSet<&str> = all_fields(document).map(|f| f.name.as_str()).collect();
    let mut declared: HashSet<&str> = HashSet::new();

    for field in all_fields(document) {
        if let Some(predicate) = &field.visible_when {
            for name in predicate.referenced_fields() {
                let problem = if name == field.name {
                    Some("references itself")
                } else if !known.contains(name) {
                    Some("references an unknown field")
                } else if !declared.contains(name) {
                    Some("references a field declared later")
                } else {
                    None
                };
                if let Some(problem) = problem {
                    errors.push(CatalogueError::validate(
                        "C005",
                        format!(
                            "Visibility condition of '{}' {} ('{}')",
                            field.name, problem, name
                        ),
                        Some(field.name.clone()),
                    ));
                }
            }
        }
        declared.insert(field.name.as_str());
    }
}

fn c006_literals_match_controller(document: &FormDocument, errors: &mut Vec<CatalogueError>) {
    let decls = first_declarations(document);
    for field in all_fields(document) {
        if let Some(predicate) = &field.visible_when {
            check_literals(field, predicate, &decls, errors);
        }
    }
}

fn check_literals(
    field: &FieldDefinition,
    predicate: &Predicate,
    decls: &HashMap<&str, &FieldDefinition>,
    errors: &mut Vec<CatalogueError>,
) {
    match predicate {
        Predicate::Equals { field: name, value } | Predicate::Includes { field: name, value } => {
            let Some(controller) = decls.get(name.as_str()) else {
                return;
            };
            if controller.kind == FieldKind::File {
                errors.push(CatalogueError::validate(
                    "C006",
                    format!(
                        "Visibility condition of '{}' cannot test file field '{}'",
                        field.name, name
                    ),
                    Some(field.name.clone()),
                ));
            } else if controller.kind.is_choice() && !controller.has_option(value) {
                errors.push(CatalogueError::validate(
                    "C006",
                    format!(
                        "Visibility condition of '{}' tests '{}' for '{}', which is not one of its options",
                        field.name, name, value
                    ),
                    Some(field.name.clone()),
                ));
            }
        }
        Predicate::All { of } | Predicate::Any { of } => {
            for p in of {
                check_literals(field, p, decls, errors);
            }
        }
    }
}

fn c007_no_cycles(graph: &PredicateGraph, errors: &mut Vec<CatalogueError>) {
    if graph.is_cyclic() {
        errors.push(CatalogueError::validate(
            "C007",
            "Visibility conditions form a cycle",
            None,
        ));
    }
}

fn c008_no_reserved_names(document: &FormDocument, errors: &mut Vec<CatalogueError>) {
    let derived: HashSet<String> = all_fields(document)
        .filter(|f| f.kind == FieldKind::File)
        .map(|f| format!("{}{}", f.name, URLS_SUFFIX))
        .collect();

    for field in all_fields(document) {
        if RESERVED_KEYS.contains(&field.name.as_str()) {
            errors.push(CatalogueError::validate(
                "C008",
                format!("Field name '{}' is reserved", field.name),
                Some(field.name.clone()),
            ));
        } else if derived.contains(&field.name) {
            errors.push(CatalogueError::validate(
                "C008",
                format!(
                    "Field name '{}' collides with the uploaded-location key of a file field",
                    field.name
                ),
                Some(field.name.clone()),
            ));
        }
    }
}

fn c009_non_empty_combinators(document: &FormDocument, errors: &mut Vec<CatalogueError>) {
    fn has_empty(p: &Predicate) -> bool {
        match p {
            Predicate::Equals { .. } | Predicate::Includes { .. } => false,
            Predicate::All { of } | Predicate::Any { of } => of.is_empty() || of.iter().any(has_empty),
        }
    }

    for field in all_fields(document) {
        if field.visible_when.as_ref().is_some_and(has_empty) {
            errors.push(CatalogueError::validate(
                "C009",
                format!("Visibility condition of '{}' has an empty all/any", field.name),
                Some(field.name.clone()),
            ));
        }
    }
}

fn c010_consistent_kind_across_steps(document: &FormDocument, errors: &mut Vec<CatalogueError>) {
    let decls = first_declarations(document);
    let mut reported = HashSet::new();
    for field in all_fields(document) {
        let Some(first) = decls.get(field.name.as_str()) else {
            continue;
        };
        if first.kind != field.kind && reported.insert(field.name.as_str()) {
            errors.push(CatalogueError::validate(
                "C010",
                format!(
                    "Field '{}' is declared as both {} and {}",
                    field.name, first.kind, field.kind
                ),
                Some(field.name.clone()),
            ));
        }
    }
}
