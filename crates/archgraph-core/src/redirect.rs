//! Edge redirection through group boundaries.
//!
//! An edge with an endpoint inside a group is rewritten to end at the group node, so a collapsed
//! group behaves as one vertex. Edges between members of the same group are internal and stay as
//! they are. Rewritten edges are deduplicated by their ordered `(source, target)` pair, and edges
//! that collapse onto a single node are dropped.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::{make_edge_id, Diagram, Edge};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedirectStats {
    pub redirected: usize,
    pub deduplicated: usize,
    pub self_loops: usize,
}

impl RedirectStats {
    pub fn changed(&self) -> bool {
        self.redirected + self.deduplicated + self.self_loops > 0
    }
}

/// Redirect every edge in the diagram.
pub fn redirect_edges(diagram: &mut Diagram) -> RedirectStats {
    redirect(diagram, None)
}

/// Redirect only the edges touching `members`; other edges are kept as they are.
pub fn redirect_edges_for(diagram: &mut Diagram, members: &HashSet<String>) -> RedirectStats {
    redirect(diagram, Some(members))
}

fn redirect(diagram: &mut Diagram, scope: Option<&HashSet<String>>) -> RedirectStats {
    let child_to_parent: HashMap<&str, &str> = diagram
        .nodes
        .iter()
        .filter_map(|n| n.parent_id.as_deref().map(|p| (n.id.as_str(), p)))
        .collect();
    let group_children: HashMap<&str, HashSet<&str>> = diagram
        .nodes
        .iter()
        .filter(|n| n.is_group)
        .map(|g| (g.id.as_str(), g.child_ids.iter().map(String::as_str).collect()))
        .collect();

    let edges = std::mem::take(&mut diagram.edges);
    let mut used_ids: HashSet<String> = edges.iter().map(|e| e.id.clone()).collect();
    let mut seen: HashSet<(String, String)> = HashSet::with_capacity(edges.len());
    let mut kept = Vec::with_capacity(edges.len());
    let mut stats = RedirectStats::default();

    for edge in edges {
        let in_scope = scope.map_or(true, |m| m.contains(&edge.source) || m.contains(&edge.target));
        let source_parent = parent_of(&edge.source, &child_to_parent, &group_children);
        let target_parent = parent_of(&edge.target, &child_to_parent, &group_children);
        let internal = source_parent.is_some() && source_parent == target_parent;

        let (source, target) = if in_scope && !internal {
            (
                source_parent.unwrap_or(edge.source.as_str()).to_string(),
                target_parent.unwrap_or(edge.target.as_str()).to_string(),
            )
        } else {
            (edge.source.clone(), edge.target.clone())
        };

        if source == target {
            stats.self_loops += 1;
            continue;
        }
        if !seen.insert((source.clone(), target.clone())) {
            stats.deduplicated += 1;
            continue;
        }

        if source == edge.source && target == edge.target {
            kept.push(edge);
        } else {
            stats.redirected += 1;
            let id = unique_id(make_edge_id(&source, &target), &mut used_ids);
            kept.push(Edge {
                id,
                source,
                target,
                label: edge.label,
                edge_type: edge.edge_type,
            });
        }
    }

    diagram.edges = kept;
    if stats.changed() {
        debug!(
            redirected = stats.redirected,
            deduplicated = stats.deduplicated,
            self_loops = stats.self_loops,
            scoped = scope.is_some(),
            "redirected edges"
        );
    }
    stats
}

/// A parent link only counts when the group lists the child back.
fn parent_of<'a>(
    id: &str,
    child_to_parent: &HashMap<&'a str, &'a str>,
    group_children: &HashMap<&'a str, HashSet<&'a str>>,
) -> Option<&'a str> {
    let parent = *child_to_parent.get(id)?;
    group_children
        .get(parent)
        .filter(|children| children.contains(id))
        .map(|_| parent)
}

fn unique_id(base: String, used: &mut HashSet<String>) -> String {
    if used.insert(base.clone()) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{}-{}", base, n);
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}
