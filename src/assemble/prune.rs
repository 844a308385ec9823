//! Reachability pruning
//!
//! Definitions form a graph with one node per id plus a node for the root;
//! everything a depth-first walk from the root does not reach is dropped.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde_json::{Map, Value};

use crate::error::{AssemblyError, Result};
use crate::fragment::FragmentId;
use crate::reference::{child_pointer, visit_refs, Reference, DEFINITIONS_KEY};

/// Outcome of a pruning pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneReport {
    pub kept: usize,
    /// Removed definition ids, sorted
    pub removed: Vec<FragmentId>,
}

/// A definition reference found while building the graph
struct Edge {
    location: String,
    reference: String,
    target: FragmentId,
}

/// Keep only definitions reachable from the root (the document minus its
/// `definitions`), then check every remaining reference resolves.
pub fn prune_unreachable(document: &mut Value) -> Result<PruneReport> {
    let Some(root) = document.as_object_mut() else {
        return Ok(PruneReport::default());
    };
    let definitions = match root.remove(DEFINITIONS_KEY) {
        Some(Value::Object(definitions)) => definitions,
        _ => Map::new(),
    };

    let reachable = reachable_ids(document, &definitions)?;

    let mut kept = Map::new();
    let mut removed = Vec::new();
    for (id, schema) in definitions {
        if reachable.contains(&id) {
            kept.insert(id, schema);
        } else {
            removed.push(id);
        }
    }

    let report = PruneReport {
        kept: kept.len(),
        removed,
    };
    if let Some(root) = document.as_object_mut() {
        root.insert(DEFINITIONS_KEY.to_string(), Value::Object(kept));
    }

    verify_references(document)?;
    Ok(report)
}

fn reachable_ids(root: &Value, definitions: &Map<String, Value>) -> Result<HashSet<FragmentId>> {
    let mut graph = DiGraph::<&str, ()>::with_capacity(definitions.len() + 1, definitions.len() * 2);
    let root_idx = graph.add_node("#");
    let indices: HashMap<&str, NodeIndex> = definitions
        .keys()
        .map(|id| (id.as_str(), graph.add_node(id.as_str())))
        .collect();

    // References to missing ids only matter if their holder is reachable
    let mut dangling: HashMap<NodeIndex, Edge> = HashMap::new();

    let definitions_location = child_pointer("", DEFINITIONS_KEY);
    let sources = std::iter::once((root_idx, root, String::new())).chain(
        definitions
            .iter()
            .map(|(id, schema)| (indices[id.as_str()], schema, child_pointer(&definitions_location, id))),
    );

    for (from, tree, location) in sources {
        for edge in definition_edges(tree, &location) {
            match indices.get(edge.target.as_str()) {
                Some(&to) => {
                    graph.update_edge(from, to, ());
                }
                None => {
                    dangling.entry(from).or_insert(edge);
                }
            }
        }
    }

    let mut reachable = HashSet::new();
    let mut dfs = Dfs::new(&graph, root_idx);
    while let Some(idx) = dfs.next(&graph) {
        if let Some(edge) = dangling.remove(&idx) {
            return Err(AssemblyError::UnresolvedReference {
                reference: edge.reference,
                target: edge.target,
                location: edge.location,
            });
        }
        if idx != root_idx {
            reachable.insert(graph[idx].to_string());
        }
    }

    Ok(reachable)
}

fn definition_edges(tree: &Value, location: &str) -> Vec<Edge> {
    let mut edges = Vec::new();
    visit_refs(tree, location, &mut |ref_location, value| {
        if let Reference::Definition { target } = Reference::parse(value, "") {
            edges.push(Edge {
                location: ref_location.to_string(),
                reference: value.to_string(),
                target,
            });
        }
    });
    edges
}

/// Check the document is self-contained: no file references, and every
/// `#<Id>` reference names a present definition.
pub fn verify_references(document: &Value) -> Result<()> {
    let empty = Map::new();
    let definitions = document
        .get(DEFINITIONS_KEY)
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let mut failure = None;
    visit_refs(document, "", &mut |location, value| {
        if failure.is_some() {
            return;
        }
        let target = match Reference::parse(value, "") {
            Reference::Pointer(_) => return,
            Reference::Definition { target } if definitions.contains_key(&target) => return,
            Reference::Definition { target } => target,
            Reference::External { path, .. } => path,
        };
        failure = Some(AssemblyError::UnresolvedReference {
            reference: value.to_string(),
            target,
            location: location.to_string(),
        });
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(()),
    }
}
