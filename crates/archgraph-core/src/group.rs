//! Group lifecycle: create (or merge into an existing group), dissolve, toggle collapse.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info};

use crate::error::{GraphError, Result};
use crate::redirect::{redirect_edges, redirect_edges_for};
use crate::{next_group_id, Diagram, Node, NodeMetadata, Position};

/// Caller overrides for a newly created group node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupSpec {
    pub label: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupOutcome {
    Created { group_id: String, members: Vec<String> },
    /// The request referenced an existing group; the other nodes joined it.
    Merged { group_id: String, added: Vec<String> },
}

impl GroupOutcome {
    pub fn group_id(&self) -> &str {
        match self {
            GroupOutcome::Created { group_id, .. } | GroupOutcome::Merged { group_id, .. } => {
                group_id
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dissolution {
    /// Former members, now top-level.
    pub released: Vec<String>,
    pub removed_edges: usize,
}

/// Group `node_ids`, then redirect edges through the group boundary.
///
/// If exactly one of the referenced nodes is a group, the others are merged into it and only
/// their edges are redirected. Otherwise a new collapsed group node is synthesized.
pub fn create_group(diagram: &mut Diagram, node_ids: &[String], spec: &GroupSpec) -> Result<GroupOutcome> {
    let outcome = insert_group(diagram, node_ids, spec)?;
    match &outcome {
        GroupOutcome::Created { .. } => {
            redirect_edges(diagram);
        }
        GroupOutcome::Merged { added, .. } => {
            let scope: HashSet<String> = added.iter().cloned().collect();
            redirect_edges_for(diagram, &scope);
        }
    }
    Ok(outcome)
}

/// Group membership changes without any edge redirection.
pub(crate) fn insert_group(diagram: &mut Diagram, node_ids: &[String], spec: &GroupSpec) -> Result<GroupOutcome> {
    let ids = dedup(node_ids);
    if ids.len() < 2 {
        return Err(GraphError::InsufficientNodes { count: ids.len() });
    }
    match validate_members(diagram, &ids)? {
        Some(group_id) => Ok(merge_into(diagram, &group_id, &ids)),
        None => Ok(synthesize(diagram, ids, spec)),
    }
}

/// Validate the members a group node brings with it. Returns them deduplicated.
pub(crate) fn check_new_members(diagram: &Diagram, group_id: &str, child_ids: &[String]) -> Result<Vec<String>> {
    let ids = dedup(child_ids);
    if ids.len() < 2 {
        return Err(GraphError::InsufficientNodes { count: ids.len() });
    }
    if let Some(nested) = validate_members(diagram, &ids)? {
        return Err(GraphError::AlreadyGrouped {
            node_id: nested,
            group_id: group_id.to_string(),
        });
    }
    Ok(ids)
}

/// Checks existence first, then grouping. Returns the single referenced group, if any.
fn validate_members(diagram: &Diagram, ids: &[String]) -> Result<Option<String>> {
    if let Some(missing) = ids.iter().find(|id| !diagram.has_node(id)) {
        return Err(GraphError::node_not_found(missing));
    }

    let mut existing: Option<String> = None;
    for node in ids.iter().filter_map(|id| diagram.node(id)) {
        if let Some(pid) = &node.parent_id {
            return Err(GraphError::AlreadyGrouped {
                node_id: node.id.clone(),
                group_id: pid.clone(),
            });
        }
        if node.is_group {
            if let Some(first) = &existing {
                return Err(GraphError::AlreadyGrouped {
                    node_id: node.id.clone(),
                    group_id: first.clone(),
                });
            }
            existing = Some(node.id.clone());
        }
    }
    Ok(existing)
}

fn merge_into(diagram: &mut Diagram, group_id: &str, ids: &[String]) -> GroupOutcome {
    let added: Vec<String> = ids.iter().filter(|id| *id != group_id).cloned().collect();

    for id in &added {
        if let Some(node) = diagram.node_mut(id) {
            node.parent_id = Some(group_id.to_string());
        }
    }
    if let Some(group) = diagram.node_mut(group_id) {
        for id in &added {
            if !group.child_ids.contains(id) {
                group.child_ids.push(id.clone());
            }
        }
    }
    refresh_display_type(diagram, group_id);

    info!(group_id, added = added.len(), "merged nodes into existing group");
    GroupOutcome::Merged {
        group_id: group_id.to_string(),
        added,
    }
}

fn synthesize(diagram: &mut Diagram, ids: Vec<String>, spec: &GroupSpec) -> GroupOutcome {
    let members: Vec<&Node> = ids.iter().filter_map(|id| diagram.node(id)).collect();
    let types: Vec<&str> = members.iter().map(|n| n.node_type.as_str()).collect();
    let node_type = dominant_type(&types).unwrap_or("group").to_string();
    let child_types = distinct_types(&types);

    let count = members.len();
    let position = Position {
        x: members.iter().map(|n| n.position.x).sum::<f64>() / count as f64,
        y: members.iter().map(|n| n.position.y).sum::<f64>() / count as f64,
    };
    let (label, description) = match child_types.as_slice() {
        [only] => (
            format!("Group ({} {})", count, only),
            format!("{} {} nodes", count, only),
        ),
        _ => (
            format!("Group ({} nodes)", count),
            format!("{} nodes of {} types", count, child_types.len()),
        ),
    };

    let group_id = next_group_id(diagram);
    let group = Node {
        id: group_id.clone(),
        node_type,
        label: spec.label.clone().unwrap_or(label),
        description: spec.description.clone().unwrap_or(description),
        inputs: Vec::new(),
        outputs: Vec::new(),
        metadata: NodeMetadata {
            child_types,
            ..Default::default()
        },
        position,
        is_group: true,
        is_collapsed: true,
        child_ids: ids.clone(),
        parent_id: None,
    };

    for id in &ids {
        if let Some(node) = diagram.node_mut(id) {
            node.parent_id = Some(group_id.clone());
        }
    }
    info!(group_id = %group.id, members = ids.len(), group_type = %group.node_type, "created group");
    diagram.push_node(group);

    GroupOutcome::Created {
        group_id,
        members: ids,
    }
}

/// Recompute a group's display type and child types from its current members.
fn refresh_display_type(diagram: &mut Diagram, group_id: &str) {
    let Some(group) = diagram.node(group_id) else {
        return;
    };
    let types: Vec<String> = group
        .child_ids
        .iter()
        .filter_map(|c| diagram.node(c))
        .map(|n| n.node_type.clone())
        .collect();
    let refs: Vec<&str> = types.iter().map(String::as_str).collect();
    let dominant = dominant_type(&refs).map(str::to_string);
    let child_types = distinct_types(&refs);

    if let Some(group) = diagram.node_mut(group_id) {
        if let Some(t) = dominant {
            group.node_type = t;
        }
        group.metadata.child_types = child_types;
    }
}

/// Most frequent type; ties go to the type that occurs first in `types`.
pub(crate) fn dominant_type<'a>(types: &[&'a str]) -> Option<&'a str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for &t in types {
        *counts.entry(t).or_default() += 1;
    }
    let mut best: Option<(&'a str, usize)> = None;
    for &t in types {
        let count = counts[t];
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((t, count));
        }
    }
    best.map(|(t, _)| t)
}

fn distinct_types(types: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    types
        .iter()
        .filter(|t| seen.insert(**t))
        .map(|t| t.to_string())
        .collect()
}

fn dedup(ids: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.iter().filter(|id| seen.insert(id.as_str())).cloned().collect()
}

fn lookup_group<'a>(diagram: &'a mut Diagram, group_id: &str) -> Result<&'a mut Node> {
    let node = diagram
        .node_mut(group_id)
        .ok_or_else(|| GraphError::group_not_found(group_id))?;
    if !node.is_group {
        return Err(GraphError::NotAGroup(group_id.to_string()));
    }
    Ok(node)
}

/// Remove a group node, releasing its members and dropping edges attached to the group.
///
/// Edges that were redirected onto the group are not restored to the members.
pub fn dissolve_group(diagram: &mut Diagram, group_id: &str) -> Result<Dissolution> {
    lookup_group(diagram, group_id)?;

    let mut released = Vec::new();
    for node in diagram.nodes.iter_mut() {
        if node.parent_id.as_deref() == Some(group_id) {
            node.parent_id = None;
            released.push(node.id.clone());
        }
    }

    let ids: HashSet<String> = [group_id.to_string()].into_iter().collect();
    diagram.remove_nodes(&ids);
    let removed_edges = diagram.remove_edges_touching(&ids);

    info!(group_id, released = released.len(), removed_edges, "dissolved group");
    Ok(Dissolution {
        released,
        removed_edges,
    })
}

/// Flip a group's collapsed state. Returns the new state.
pub fn toggle_collapse(diagram: &mut Diagram, group_id: &str) -> Result<bool> {
    let group = lookup_group(diagram, group_id)?;
    group.is_collapsed = !group.is_collapsed;
    debug!(group_id, collapsed = group.is_collapsed, "toggled group");
    Ok(group.is_collapsed)
}
