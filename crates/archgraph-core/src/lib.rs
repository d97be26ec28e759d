pub mod edge;
pub mod error;
pub mod executor;
pub mod group;
pub mod heuristic;
pub mod ingest;
pub mod node;
pub mod redirect;
pub mod session;
mod store;
pub mod validate;

pub use error::{EntityKind, GraphError, Result};
pub use executor::{execute, execute_json, parse_instructions, Action, ExecutionReport, Instruction, ToolError};
pub use ingest::{prepare, IngestReport};
pub use node::NodePatch;
pub use session::{DiagramStore, MemoryStore, Session};

use serde::{Deserialize, Serialize};

// --- Types ---

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, schemars::JsonSchema)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EdgeType {
    #[default]
    Default,
    Animated,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct NodeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub technology: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Every distinct member type of a group node, used for color blending.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub child_types: Vec<String>,
}

impl NodeMetadata {
    pub fn is_empty(&self) -> bool {
        self.technology.is_none() && self.notes.is_none() && self.child_types.is_empty()
    }
}

/// A node in the diagram. Group nodes carry `is_group` and their members in `child_ids`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Node {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub inputs: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default, skip_serializing_if = "NodeMetadata::is_empty")]
    pub metadata: NodeMetadata,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub is_collapsed: bool,
    #[serde(default)]
    pub child_ids: Vec<String>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

impl Node {
    pub fn new(id: impl Into<String>, node_type: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type: node_type.into(),
            label: label.into(),
            description: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            metadata: NodeMetadata::default(),
            position: Position::default(),
            is_group: false,
            is_collapsed: false,
            child_ids: Vec::new(),
            parent_id: None,
        }
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.position = Position { x, y };
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type", default)]
    pub edge_type: EdgeType,
}

impl Edge {
    pub fn new(id: impl Into<String>, source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            target: target.into(),
            label: None,
            edge_type: EdgeType::Default,
        }
    }

    /// Edge with an id derived from its endpoints.
    pub fn between(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self::new(make_edge_id(&source, &target), source, target)
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Diagram {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
}

/// Grouping thresholds supplied by the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GroupingOptions {
    /// Above this many nodes an ungrouped diagram is grouped by layer.
    pub max_visible_nodes: usize,
    pub auto_group: bool,
}

impl Default for GroupingOptions {
    fn default() -> Self {
        Self {
            max_visible_nodes: 12,
            auto_group: true,
        }
    }
}

// --- Ids ---

/// Generate the next group ID by scanning existing nodes: "group-{N}" with N incrementing.
pub fn next_group_id(diagram: &Diagram) -> String {
    let max = diagram
        .nodes
        .iter()
        .filter_map(|n| n.id.strip_prefix("group-").and_then(|s| s.parse::<u64>().ok()))
        .max()
        .unwrap_or(0);
    format!("group-{}", max + 1)
}

/// Generate an edge ID from source and target node IDs.
pub fn make_edge_id(source: &str, target: &str) -> String {
    format!("edge-{}-{}", source, target)
}
