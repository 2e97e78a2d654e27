//! petgraph-based dependency graph between fields and the predicates that read them.

use std::collections::HashMap;

use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Bfs;

use super::types::FormDocument;

/// Edges point from a controlling field to the field whose visibility it decides.
pub struct PredicateGraph {
    pub graph: DiGraph<String, ()>,
    pub node_indices: HashMap<String, NodeIndex>,
}

impl PredicateGraph {
    /// Build the graph. References to unknown fields are skipped here and
    /// reported by the catalogue rules instead.
    pub fn build(document: &FormDocument) -> Self {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for step in &document.steps {
            for field in &step.fields {
                if !node_indices.contains_key(&field.name) {
                    let idx = graph.add_node(field.name.clone());
                    node_indices.insert(field.name.clone(), idx);
                }
            }
        }

        for step in &document.steps {
            for field in &step.fields {
                let Some(predicate) = &field.visible_when else {
                    continue;
                };
                let Some(&dependent) = node_indices.get(&field.name) else {
                    continue;
                };
                for name in predicate.referenced_fields() {
                    if let Some(&controller) = node_indices.get(name) {
                        if graph.find_edge(controller, dependent).is_none() {
                            graph.add_edge(controller, dependent, ());
                        }
                    }
                }
            }
        }

        PredicateGraph {
            graph,
            node_indices,
        }
    }

    pub fn is_cyclic(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Fields whose visibility may change when `name` changes, transitively.
    pub fn dependents(&self, name: &str) -> Vec<String> {
        let Some(&start) = self.node_indices.get(name) else {
            return vec![];
        };
        let mut out = Vec::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(nx) = bfs.next(&self.graph) {
            if nx != start {
                out.push(self.graph[nx].clone());
            }
        }
        out
    }

    /// Direct controllers of `name`.
    pub fn controllers(&self, name: &str) -> Vec<&str> {
        let Some(&idx) = self.node_indices.get(name) else {
            return vec![];
        };
        self.graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .map(|n| self.graph[n].as_str())
            .collect()
    }
}
