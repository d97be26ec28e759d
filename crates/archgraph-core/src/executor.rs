//! Ordered execution of edit instructions coming from an AI tool-call layer.
//!
//! Instructions run strictly in order and the batch stops at the first failure. Instructions
//! applied before the failure stay applied.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::edge::{add_edge, delete_edge, EdgeOutcome, EdgePolicy, EdgeRemoval, SkipReason};
use crate::error::GraphError;
use crate::node::{add_node, delete_node, update_node, NodePatch};
use crate::{make_edge_id, Diagram, Edge, EdgeType, Node, NodeMetadata, Position};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Instruction {
    AddNode {
        /// ID for the new node; must not exist yet
        node_id: String,
        /// Visual category, e.g. "service", "database", "queue"
        #[serde(rename = "type")]
        node_type: String,
        /// Display label. Defaults to the node ID.
        #[serde(default)]
        label: String,
        #[serde(default)]
        description: String,
        /// Technology label, e.g. "PostgreSQL"
        #[serde(default)]
        technology: Option<String>,
        #[serde(default)]
        position: Option<Position>,
        #[serde(default)]
        inputs: Vec<String>,
        #[serde(default)]
        outputs: Vec<String>,
        #[serde(default)]
        notes: Option<String>,
    },
    DeleteNode {
        /// ID of the node to delete. Deleting a group also deletes its members.
        node_id: String,
    },
    UpdateNode {
        /// ID of the node to update
        node_id: String,
        #[serde(flatten)]
        patch: NodePatch,
    },
    AddEdge {
        /// ID for the edge. Derived from source and target when omitted.
        #[serde(default)]
        edge_id: Option<String>,
        /// Source node ID
        source: String,
        /// Target node ID
        target: String,
        /// Short relationship label, e.g. "reads from"
        #[serde(default)]
        label: Option<String>,
        /// "default" or "animated"
        #[serde(rename = "type", default)]
        edge_type: EdgeType,
    },
    DeleteEdge {
        /// ID of the edge to delete. Deleting an absent edge is a no-op.
        edge_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    AddNode,
    DeleteNode,
    UpdateNode,
    AddEdge,
    DeleteEdge,
}

impl Action {
    /// Action for a wire name such as `"add_node"`.
    pub fn parse(name: &str) -> Option<Action> {
        match name {
            "add_node" => Some(Action::AddNode),
            "delete_node" => Some(Action::DeleteNode),
            "update_node" => Some(Action::UpdateNode),
            "add_edge" => Some(Action::AddEdge),
            "delete_edge" => Some(Action::DeleteEdge),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Action::AddNode => "add_node",
            Action::DeleteNode => "delete_node",
            Action::UpdateNode => "update_node",
            Action::AddEdge => "add_edge",
            Action::DeleteEdge => "delete_edge",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Instruction {
    pub fn action(&self) -> Action {
        match self {
            Instruction::AddNode { .. } => Action::AddNode,
            Instruction::DeleteNode { .. } => Action::DeleteNode,
            Instruction::UpdateNode { .. } => Action::UpdateNode,
            Instruction::AddEdge { .. } => Action::AddEdge,
            Instruction::DeleteEdge { .. } => Action::DeleteEdge,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("instruction #{index} ({action}) failed: {source}")]
    Failed {
        index: usize,
        action: Action,
        source: GraphError,
    },

    #[error("instruction #{index} has unrecognized action '{action}'")]
    UnknownAction { index: usize, action: String },

    #[error("instruction #{index} is malformed: {message}")]
    Malformed { index: usize, message: String },

    #[error("instructions must be a JSON object or an array of objects")]
    NotAList,
}

impl ToolError {
    /// Position of the offending instruction in the batch.
    pub fn index(&self) -> Option<usize> {
        match self {
            ToolError::Failed { index, .. }
            | ToolError::UnknownAction { index, .. }
            | ToolError::Malformed { index, .. } => Some(*index),
            ToolError::NotAList => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Applied,
    Skipped(SkipReason),
    /// Nothing to do; the diagram already matched the request.
    NoOp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub index: usize,
    pub action: Action,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    pub steps: Vec<Step>,
}

impl ExecutionReport {
    pub fn applied(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.outcome == Outcome::Applied)
            .count()
    }

    pub fn skipped(&self) -> impl Iterator<Item = &Step> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, Outcome::Skipped(_)))
    }

    /// One line per step that did not simply apply.
    pub fn summary(&self) -> String {
        let mut out = format!("Applied {} of {} instruction(s)", self.applied(), self.steps.len());
        for step in &self.steps {
            match &step.outcome {
                Outcome::Applied => {}
                Outcome::Skipped(reason) => {
                    out.push_str(&format!("\n  #{} {} skipped: {}", step.index, step.action, reason));
                }
                Outcome::NoOp => {
                    out.push_str(&format!("\n  #{} {} had nothing to do", step.index, step.action));
                }
            }
        }
        out
    }
}

/// Decode raw tool-call JSON up front, one element at a time so failures carry their position.
///
/// Accepts a single instruction object or an array of them. Use [`execute_json`] to run a raw
/// batch, so that instructions before an undecodable one are still applied.
pub fn parse_instructions(value: Value) -> Result<Vec<Instruction>, ToolError> {
    into_items(value)?
        .into_iter()
        .enumerate()
        .map(|(index, item)| decode(index, item))
        .collect()
}

fn into_items(value: Value) -> Result<Vec<Value>, ToolError> {
    match value {
        Value::Array(items) => Ok(items),
        obj @ Value::Object(_) => Ok(vec![obj]),
        _ => Err(ToolError::NotAList),
    }
}

fn decode(index: usize, item: Value) -> Result<Instruction, ToolError> {
    let action = match item.get("action").and_then(Value::as_str) {
        Some(a) => a.to_string(),
        None => {
            return Err(ToolError::Malformed {
                index,
                message: "missing 'action' field".to_string(),
            })
        }
    };
    if Action::parse(&action).is_none() {
        return Err(ToolError::UnknownAction { index, action });
    }
    serde_json::from_value(item).map_err(|e| ToolError::Malformed {
        index,
        message: e.to_string(),
    })
}

/// Apply `instructions` in order, stopping at the first failure.
pub fn execute(diagram: &mut Diagram, instructions: &[Instruction]) -> Result<ExecutionReport, ToolError> {
    let mut report = ExecutionReport::default();
    for (index, instruction) in instructions.iter().enumerate() {
        report.steps.push(run_step(diagram, index, instruction)?);
    }
    log_completion(&report);
    Ok(report)
}

/// Decode and apply raw instructions one by one, stopping at the first element that fails to
/// decode or to apply. Earlier instructions stay applied either way.
pub fn execute_json(diagram: &mut Diagram, value: Value) -> Result<ExecutionReport, ToolError> {
    let mut report = ExecutionReport::default();
    for (index, item) in into_items(value)?.into_iter().enumerate() {
        let instruction = decode(index, item).inspect_err(|e| {
            warn!(index, error = %e, "undecodable instruction; halting batch");
        })?;
        report.steps.push(run_step(diagram, index, &instruction)?);
    }
    log_completion(&report);
    Ok(report)
}

fn run_step(diagram: &mut Diagram, index: usize, instruction: &Instruction) -> Result<Step, ToolError> {
    let action = instruction.action();
    let outcome = apply(diagram, instruction).map_err(|source| {
        warn!(index, %action, error = %source, "instruction failed; halting batch");
        ToolError::Failed {
            index,
            action,
            source,
        }
    })?;
    Ok(Step {
        index,
        action,
        outcome,
    })
}

fn log_completion(report: &ExecutionReport) {
    info!(
        applied = report.applied(),
        total = report.steps.len(),
        "executed instructions"
    );
}

fn apply(diagram: &mut Diagram, instruction: &Instruction) -> Result<Outcome, GraphError> {
    match instruction {
        Instruction::AddNode {
            node_id,
            node_type,
            label,
            description,
            technology,
            position,
            inputs,
            outputs,
            notes,
        } => {
            let mut node = Node::new(
                node_id.clone(),
                node_type.clone(),
                if label.is_empty() { node_id } else { label },
            );
            node.description = description.clone();
            node.inputs = inputs.clone();
            node.outputs = outputs.clone();
            node.position = position.unwrap_or_default();
            node.metadata = NodeMetadata {
                technology: technology.clone(),
                notes: notes.clone(),
                child_types: Vec::new(),
            };
            add_node(diagram, node)?;
            Ok(Outcome::Applied)
        }
        Instruction::DeleteNode { node_id } => {
            delete_node(diagram, node_id)?;
            Ok(Outcome::Applied)
        }
        Instruction::UpdateNode { node_id, patch } => {
            update_node(diagram, node_id, patch)?;
            Ok(Outcome::Applied)
        }
        Instruction::AddEdge {
            edge_id,
            source,
            target,
            label,
            edge_type,
        } => {
            let edge = Edge {
                id: edge_id
                    .clone()
                    .unwrap_or_else(|| make_edge_id(source, target)),
                source: source.clone(),
                target: target.clone(),
                label: label.clone(),
                edge_type: *edge_type,
            };
            Ok(match add_edge(diagram, edge, EdgePolicy::Lenient)? {
                EdgeOutcome::Added => Outcome::Applied,
                EdgeOutcome::Skipped(reason) => Outcome::Skipped(reason),
            })
        }
        Instruction::DeleteEdge { edge_id } => Ok(match delete_edge(diagram, edge_id) {
            EdgeRemoval::Removed => Outcome::Applied,
            EdgeRemoval::NotPresent => Outcome::NoOp,
        }),
    }
}
