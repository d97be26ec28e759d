use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EntityKind, GraphError, Result};
use crate::{group, Diagram, Node, Position};

/// Partial update for a node. Only the fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
pub struct NodePatch {
    /// New visual category, e.g. "database"
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    /// New display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// New description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// New technology label, e.g. "PostgreSQL"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technology: Option<String>,
    /// New free-form notes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// New canvas position
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    /// Replacement input list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs: Option<Vec<String>>,
    /// Replacement output list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outputs: Option<Vec<String>>,
}

impl NodePatch {
    pub fn is_empty(&self) -> bool {
        *self == NodePatch::default()
    }

    pub fn apply(&self, node: &mut Node) {
        if let Some(t) = &self.node_type {
            node.node_type = t.clone();
        }
        if let Some(label) = &self.label {
            node.label = label.clone();
        }
        if let Some(desc) = &self.description {
            node.description = desc.clone();
        }
        if let Some(tech) = &self.technology {
            node.metadata.technology = Some(tech.clone());
        }
        if let Some(notes) = &self.notes {
            node.metadata.notes = Some(notes.clone());
        }
        if let Some(pos) = self.position {
            node.position = pos;
        }
        if let Some(inputs) = &self.inputs {
            node.inputs = inputs.clone();
        }
        if let Some(outputs) = &self.outputs {
            node.outputs = outputs.clone();
        }
    }
}

/// What a node deletion took with it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeDeletion {
    pub removed_nodes: Vec<String>,
    pub removed_edges: usize,
    /// Groups dissolved because the deletion left them with fewer than two members.
    pub dissolved_groups: Vec<String>,
}

/// Append a node. A `parent_id` must name an existing group; a group node must bring at least
/// two existing, ungrouped members.
pub fn add_node(diagram: &mut Diagram, mut node: Node) -> Result<()> {
    if diagram.has_node(&node.id) {
        return Err(GraphError::DuplicateId {
            kind: EntityKind::Node,
            id: node.id,
        });
    }

    if let Some(pid) = &node.parent_id {
        if node.is_group {
            return Err(GraphError::AlreadyGrouped {
                node_id: node.id.clone(),
                group_id: pid.clone(),
            });
        }
        let parent = diagram
            .node(pid)
            .ok_or_else(|| GraphError::group_not_found(pid))?;
        if !parent.is_group {
            return Err(GraphError::NotAGroup(pid.clone()));
        }
    }

    if node.is_group {
        node.child_ids = group::check_new_members(diagram, &node.id, &node.child_ids)?;
    }

    if let Some(pid) = node.parent_id.clone() {
        if let Some(parent) = diagram.node_mut(&pid) {
            if !parent.child_ids.contains(&node.id) {
                parent.child_ids.push(node.id.clone());
            }
        }
    }
    if node.is_group {
        for child_id in &node.child_ids {
            if let Some(child) = diagram.node_mut(child_id) {
                child.parent_id = Some(node.id.clone());
            }
        }
    }

    debug!(node_id = %node.id, node_type = %node.node_type, "added node");
    diagram.push_node(node);
    Ok(())
}

/// Delete a node and its edges. Deleting a group also deletes its members.
pub fn delete_node(diagram: &mut Diagram, node_id: &str) -> Result<NodeDeletion> {
    let node = diagram
        .node(node_id)
        .ok_or_else(|| GraphError::node_not_found(node_id))?;

    let mut removed_nodes = vec![node.id.clone()];
    if node.is_group {
        removed_nodes.extend(
            node.child_ids
                .iter()
                .filter(|c| diagram.has_node(c))
                .cloned(),
        );
    }
    let doomed: HashSet<String> = removed_nodes.iter().cloned().collect();
    diagram.remove_nodes(&doomed);
    let mut removed_edges = diagram.remove_edges_touching(&doomed);

    for node in diagram.nodes.iter_mut() {
        if node.parent_id.as_ref().is_some_and(|p| doomed.contains(p)) {
            node.parent_id = None;
        }
    }

    let mut dissolved_groups = Vec::new();
    let affected: Vec<String> = diagram
        .groups()
        .filter(|g| g.child_ids.iter().any(|c| doomed.contains(c)))
        .map(|g| g.id.clone())
        .collect();
    for gid in affected {
        let remaining = match diagram.node_mut(&gid) {
            Some(group) => {
                group.child_ids.retain(|c| !doomed.contains(c));
                group.child_ids.len()
            }
            None => continue,
        };
        if remaining < 2 {
            let dissolution = group::dissolve_group(diagram, &gid)?;
            removed_edges += dissolution.removed_edges;
            dissolved_groups.push(gid);
        }
    }

    if removed_nodes.len() > 1 {
        info!(node_id, cascaded = removed_nodes.len() - 1, removed_edges, "deleted group with members");
    } else {
        debug!(node_id, removed_edges, "deleted node");
    }

    Ok(NodeDeletion {
        removed_nodes,
        removed_edges,
        dissolved_groups,
    })
}

/// Apply a partial update to an existing node.
pub fn update_node(diagram: &mut Diagram, node_id: &str, patch: &NodePatch) -> Result<()> {
    let node = diagram
        .node_mut(node_id)
        .ok_or_else(|| GraphError::node_not_found(node_id))?;
    patch.apply(node);
    debug!(node_id, "updated node");
    Ok(())
}
