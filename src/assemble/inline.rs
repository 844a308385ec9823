//! Abstract fragment inlining
//!
//! References to abstract fragments are replaced by a deep copy of the
//! fragment's content, pass after pass, until no pass finds one.

use std::collections::{HashMap, HashSet};

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use serde_json::Value;
use tracing::debug;

use crate::error::{AssemblyError, Result};
use crate::fragment::FragmentId;
use crate::reference::{visit_refs, REF_KEY};
use crate::registry::FragmentRegistry;

/// Inline every abstract reference in `document`, returning the number of
/// passes taken (including the final pass that found nothing).
///
/// Abstract fragments reachable from `document` that reference each other in
/// a cycle are rejected before any copying, since every pass would multiply
/// the spliced content. Passes are also bounded by the pool size plus one;
/// an acyclic abstract graph never needs more.
pub fn inline_abstract(document: &mut Value, registry: &FragmentRegistry) -> Result<usize> {
    let cycle = reachable_abstract_cycle(document, registry);
    if !cycle.is_empty() {
        return Err(AssemblyError::CyclicAbstractReference { passes: 0, cycle });
    }

    let max_passes = registry.len() + 1;
    for pass in 1..=max_passes {
        let inlined = inline_pass(document, registry);
        debug!(pass, inlined, "abstract inlining pass");
        if inlined == 0 {
            return Ok(pass);
        }
    }

    Err(AssemblyError::CyclicAbstractReference {
        passes: max_passes,
        cycle: reachable_abstract_cycle(document, registry),
    })
}

/// One top-down pass. Spliced content is not descended into until the next
/// pass.
fn inline_pass(node: &mut Value, registry: &FragmentRegistry) -> usize {
    if let Some(fragment) = abstract_target(node, registry).and_then(|id| registry.get(&id)) {
        *node = fragment.inlinable_content();
        return 1;
    }

    match node {
        Value::Object(map) => map.values_mut().map(|child| inline_pass(child, registry)).sum(),
        Value::Array(items) => items.iter_mut().map(|item| inline_pass(item, registry)).sum(),
        _ => 0,
    }
}

fn abstract_target(node: &Value, registry: &FragmentRegistry) -> Option<FragmentId> {
    let reference = node.as_object()?.get(REF_KEY)?.as_str()?;
    let target = registry.parse_ref(reference).target()?.to_string();
    registry.is_abstract(&target).then_some(target)
}

/// Ids of the first abstract reference cycle reachable from `document`, or
/// nothing when abstract references there always bottom out
fn reachable_abstract_cycle(document: &Value, registry: &FragmentRegistry) -> Vec<FragmentId> {
    let mut graph = DiGraph::<&str, ()>::new();
    let indices: HashMap<&str, NodeIndex> = registry
        .abstract_ids()
        .map(|id| (id.as_str(), graph.add_node(id.as_str())))
        .collect();

    let abstract_refs = |content: &Value| {
        let mut targets = Vec::new();
        visit_refs(content, "", &mut |_, value| {
            if let Some(&idx) = registry.parse_ref(value).target().and_then(|t| indices.get(t)) {
                targets.push(idx);
            }
        });
        targets
    };

    for fragment in registry.fragments().filter(|f| f.is_abstract) {
        let Some(&from) = indices.get(fragment.id.as_str()) else {
            continue;
        };
        for to in abstract_refs(&fragment.content) {
            graph.update_edge(from, to, ());
        }
    }

    let mut reachable = HashSet::new();
    let seeds = abstract_refs(document);
    if let Some(&start) = seeds.first() {
        let mut dfs = Dfs::new(&graph, start);
        for seed in seeds {
            dfs.move_to(seed);
            while let Some(idx) = dfs.next(&graph) {
                reachable.insert(idx);
            }
        }
    }

    kosaraju_scc(&graph)
        .into_iter()
        .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
        .find(|scc| scc.iter().any(|idx| reachable.contains(idx)))
        .map(|scc| {
            let mut ids: Vec<FragmentId> = scc
                .into_iter()
                .filter_map(|idx| graph.node_weight(idx).map(|id| id.to_string()))
                .collect();
            ids.sort();
            ids
        })
        .unwrap_or_default()
}
