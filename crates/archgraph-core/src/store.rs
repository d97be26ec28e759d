//! Lookup and raw mutation primitives on [`Diagram`].
//!
//! Nothing here checks the group invariants; the editors layer that on top.

use std::collections::HashSet;

use crate::{Diagram, Edge, Node};

impl Diagram {
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn has_node(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    pub fn has_edge(&self, id: &str) -> bool {
        self.edges.iter().any(|e| e.id == id)
    }

    /// Whether any edge already connects `source` to `target` in that direction.
    pub fn has_edge_between(&self, source: &str, target: &str) -> bool {
        self.edges
            .iter()
            .any(|e| e.source == source && e.target == target)
    }

    pub fn groups(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|n| n.is_group)
    }

    pub fn has_groups(&self) -> bool {
        self.nodes.iter().any(|n| n.is_group)
    }

    pub(crate) fn push_node(&mut self, node: Node) {
        self.nodes.push(node);
    }

    pub(crate) fn push_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Remove every node whose id is in `ids`. Returns how many were removed.
    pub(crate) fn remove_nodes(&mut self, ids: &HashSet<String>) -> usize {
        let before = self.nodes.len();
        self.nodes.retain(|n| !ids.contains(&n.id));
        before - self.nodes.len()
    }

    /// Remove every edge with an endpoint in `ids`. Returns how many were removed.
    pub(crate) fn remove_edges_touching(&mut self, ids: &HashSet<String>) -> usize {
        let before = self.edges.len();
        self.edges
            .retain(|e| !ids.contains(&e.source) && !ids.contains(&e.target));
        before - self.edges.len()
    }

    /// Drop edges whose source or target no longer exists.
    pub fn prune_dangling_edges(&mut self) -> usize {
        let node_ids: HashSet<&str> = self.nodes.iter().map(|n| n.id.as_str()).collect();
        let before = self.edges.len();
        self.edges.retain(|e| {
            node_ids.contains(e.source.as_str()) && node_ids.contains(e.target.as_str())
        });
        before - self.edges.len()
    }
}
