use std::fmt;

use tracing::{debug, warn};

use crate::error::{EntityKind, GraphError, Result};
use crate::{Diagram, Edge};

/// How `add_edge` treats references it cannot satisfy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgePolicy {
    /// Direct API mutation: missing endpoints and duplicate ids are errors.
    Strict,
    /// AI-driven edits: the same conditions are skipped with a warning.
    Lenient,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    MissingEndpoint(String),
    DuplicateId(String),
    SelfLoop(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::MissingEndpoint(id) => write!(f, "endpoint node '{}' does not exist", id),
            SkipReason::DuplicateId(id) => write!(f, "edge '{}' already exists", id),
            SkipReason::SelfLoop(id) => write!(f, "edge would loop on node '{}'", id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeOutcome {
    Added,
    Skipped(SkipReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeRemoval {
    Removed,
    /// The edge was already absent.
    NotPresent,
}

pub fn add_edge(diagram: &mut Diagram, edge: Edge, policy: EdgePolicy) -> Result<EdgeOutcome> {
    let missing = [&edge.source, &edge.target]
        .into_iter()
        .find(|id| !diagram.has_node(id))
        .cloned();

    let reason = if let Some(node_id) = missing {
        if policy == EdgePolicy::Strict {
            return Err(GraphError::InvalidReference {
                edge_id: edge.id,
                node_id,
            });
        }
        SkipReason::MissingEndpoint(node_id)
    } else if diagram.has_edge(&edge.id) {
        if policy == EdgePolicy::Strict {
            return Err(GraphError::DuplicateId {
                kind: EntityKind::Edge,
                id: edge.id,
            });
        }
        SkipReason::DuplicateId(edge.id.clone())
    } else if edge.source == edge.target {
        SkipReason::SelfLoop(edge.source.clone())
    } else {
        debug!(edge_id = %edge.id, source = %edge.source, target = %edge.target, "added edge");
        diagram.push_edge(edge);
        return Ok(EdgeOutcome::Added);
    };

    warn!(edge_id = %edge.id, %reason, "skipped edge");
    Ok(EdgeOutcome::Skipped(reason))
}

/// Remove an edge by id. Removing an absent edge succeeds as a no-op.
pub fn delete_edge(diagram: &mut Diagram, edge_id: &str) -> EdgeRemoval {
    let before = diagram.edges.len();
    diagram.edges.retain(|e| e.id != edge_id);
    if diagram.edges.len() == before {
        debug!(edge_id, "edge already absent");
        EdgeRemoval::NotPresent
    } else {
        debug!(edge_id, "deleted edge");
        EdgeRemoval::Removed
    }
}
