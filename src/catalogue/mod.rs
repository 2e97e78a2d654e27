//! Catalogue phase: JSON → checked, immutable step/field declarations.

pub mod graph;
pub mod rules;
pub mod types;

pub use graph::PredicateGraph;
pub use types::*;

use std::collections::HashMap;

use crate::error::CatalogueError;

/// Deserialize a catalogue JSON string into a `FormDocument`.
pub fn parse(json: &str) -> Result<FormDocument, Vec<CatalogueError>> {
    serde_json::from_str::<FormDocument>(json).map_err(|e| {
        vec![CatalogueError::parse(
            "P001",
            format!("Failed to parse catalogue JSON: {}", e),
        )]
    })
}

/// Parse JSON and build the checked catalogue in one step.
pub fn parse_and_build(json: &str) -> Result<Catalogue, Vec<CatalogueError>> {
    let document = parse(json)?;
    Catalogue::build(document)
}

/// A catalogue that passed every static rule. Shared read-only by all sessions.
pub struct Catalogue {
    document: FormDocument,
    graph: PredicateGraph,
    /// Field name → (step index, field index) of its first declaration.
    index: HashMap<String, (usize, usize)>,
}

impl Catalogue {
    pub fn build(document: FormDocument) -> Result<Self, Vec<CatalogueError>> {
        let graph = PredicateGraph::build(&document);
        let errors = rules::validate_document(&document, &graph);
        if !errors.is_empty() {
            return Err(errors);
        }

        let mut index = HashMap::new();
        for (s, step) in document.steps.iter().enumerate() {
            for (f, field) in step.fields.iter().enumerate() {
                index.entry(field.name.clone()).or_insert((s, f));
            }
        }

        tracing::debug!(
            catalogue = %document.id,
            version = %document.version,
            steps = document.steps.len(),
            fields = index.len(),
            "catalogue built"
        );

        Ok(Catalogue {
            document,
            graph,
            index,
        })
    }

    pub fn document(&self) -> &FormDocument {
        &self.document
    }

    pub fn settings(&self) -> &FormSettings {
        &self.document.settings
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.document.steps
    }

    pub fn step(&self, index: usize) -> Option<&StepDefinition> {
        self.document.steps.get(index)
    }

    pub fn step_count(&self) -> usize {
        self.document.steps.len()
    }

    /// The first declaration of `name` in catalogue order.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        let &(s, f) = self.index.get(name)?;
        Some(&self.document.steps[s].fields[f])
    }

    /// Every field in catalogue order, including repeated declarations.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.document.steps.iter().flat_map(|s| s.fields.iter())
    }

    pub fn file_fields(&self) -> impl Iterator<Item = &FieldDefinition> {
        self.fields().filter(|f| f.kind == FieldKind::File)
    }

    /// Fields whose visibility may change when `name` changes.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        self.graph.dependents(name)
    }

    pub fn graph(&self) -> &PredicateGraph {
        &self.graph
    }
}
