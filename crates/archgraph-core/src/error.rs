use std::fmt;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Node,
    Edge,
    Group,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntityKind::Node => "node",
            EntityKind::Edge => "edge",
            EntityKind::Group => "group",
        })
    }
}

/// Errors raised by the node, edge and group editors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: EntityKind, id: String },

    #[error("{kind} '{id}' already exists")]
    DuplicateId { kind: EntityKind, id: String },

    #[error("edge '{edge_id}' references missing node '{node_id}'")]
    InvalidReference { edge_id: String, node_id: String },

    #[error("grouping requires at least 2 nodes, got {count}")]
    InsufficientNodes { count: usize },

    #[error("node '{node_id}' is already grouped under '{group_id}'; nested groups are not allowed")]
    AlreadyGrouped { node_id: String, group_id: String },

    #[error("node '{0}' is not a group")]
    NotAGroup(String),
}

impl GraphError {
    pub(crate) fn node_not_found(id: &str) -> Self {
        GraphError::NotFound {
            kind: EntityKind::Node,
            id: id.to_string(),
        }
    }

    pub(crate) fn group_not_found(id: &str) -> Self {
        GraphError::NotFound {
            kind: EntityKind::Group,
            id: id.to_string(),
        }
    }
}
