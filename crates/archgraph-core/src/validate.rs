//! Repair of group structure in diagrams produced by an untrusted generator.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::Diagram;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupRepair {
    /// Nodes whose `parent_id` pointed at something that is not a group, or that are groups
    /// themselves.
    pub cleared_parents: Vec<String>,
    /// Groups whose member list disagreed with their members' `parent_id` and was rewritten.
    pub relinked_groups: Vec<String>,
    /// Groups dropped for having fewer than two valid members.
    pub dissolved_groups: Vec<String>,
}

impl GroupRepair {
    pub fn is_clean(&self) -> bool {
        self.cleared_parents.is_empty()
            && self.relinked_groups.is_empty()
            && self.dissolved_groups.is_empty()
    }
}

/// Make parent links and group membership structurally valid. Edges are left alone.
///
/// A node's `parent_id` decides which group owns it. A group keeps only the listed children it
/// owns, adopts listed children that have no parent yet, and gains owned children it forgot to
/// list.
pub fn repair_groups(diagram: &mut Diagram) -> GroupRepair {
    let mut report = GroupRepair::default();

    let node_ids: HashSet<String> = diagram.nodes.iter().map(|n| n.id.clone()).collect();
    let group_ids: HashSet<String> = diagram.groups().map(|n| n.id.clone()).collect();

    for node in diagram.nodes.iter_mut() {
        if let Some(pid) = &node.parent_id {
            if !group_ids.contains(pid) || *pid == node.id || node.is_group {
                warn!(node_id = %node.id, parent_id = %pid, "cleared invalid parent reference");
                report.cleared_parents.push(node.id.clone());
                node.parent_id = None;
            }
        }
    }

    let mut owner: HashMap<String, String> = diagram
        .nodes
        .iter()
        .filter_map(|n| n.parent_id.clone().map(|p| (n.id.clone(), p)))
        .collect();

    let mut members: Vec<(String, Vec<String>)> = Vec::new();
    for group in diagram.groups() {
        let mut kept: Vec<String> = Vec::new();
        for c in &group.child_ids {
            if *c == group.id || !node_ids.contains(c) || group_ids.contains(c) || kept.contains(c) {
                continue;
            }
            match owner.get(c) {
                Some(o) if *o == group.id => kept.push(c.clone()),
                Some(_) => {}
                None => {
                    owner.insert(c.clone(), group.id.clone());
                    kept.push(c.clone());
                }
            }
        }
        members.push((group.id.clone(), kept));
    }
    for node in &diagram.nodes {
        let Some(o) = owner.get(&node.id) else { continue };
        if let Some((_, kept)) = members.iter_mut().find(|(g, _)| g == o) {
            if !kept.contains(&node.id) {
                kept.push(node.id.clone());
            }
        }
    }

    let members: HashMap<String, Vec<String>> = members.into_iter().collect();
    for node in diagram.nodes.iter_mut() {
        if let Some(kept) = members.get(&node.id) {
            if node.child_ids != *kept {
                warn!(group_id = %node.id, before = node.child_ids.len(), after = kept.len(), "rewrote group members");
                report.relinked_groups.push(node.id.clone());
                node.child_ids = kept.clone();
            }
        } else {
            node.parent_id = owner.get(&node.id).cloned();
        }
    }

    let undersized: HashSet<String> = diagram
        .groups()
        .filter(|g| g.child_ids.len() < 2)
        .map(|g| g.id.clone())
        .collect();

    if !undersized.is_empty() {
        for node in diagram.nodes.iter_mut() {
            if node.parent_id.as_ref().is_some_and(|p| undersized.contains(p)) {
                node.parent_id = None;
            }
        }
        for node in &diagram.nodes {
            if undersized.contains(&node.id) {
                warn!(group_id = %node.id, members = node.child_ids.len(), "dissolved undersized group");
                report.dissolved_groups.push(node.id.clone());
            }
        }
        diagram.remove_nodes(&undersized);
    }

    report
}
