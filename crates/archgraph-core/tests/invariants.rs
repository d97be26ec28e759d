use std::collections::HashSet;

use archgraph_core::edge::{add_edge, delete_edge, EdgePolicy};
use archgraph_core::group::{create_group, dissolve_group, toggle_collapse, GroupOutcome, GroupSpec};
use archgraph_core::heuristic::auto_group;
use archgraph_core::node::{add_node, delete_node};
use archgraph_core::redirect::redirect_edges;
use archgraph_core::validate::repair_groups;
use archgraph_core::{make_edge_id, Diagram, Edge, GroupingOptions, Node};
use proptest::prelude::*;
use proptest::test_runner::TestCaseError;

const TYPES: [&str; 6] = ["database", "cache", "api", "service", "cdn", "client"];

#[derive(Debug, Clone)]
enum Op {
    AddNode(usize, usize),
    DeleteNode(usize),
    AddEdge(usize, usize),
    DeleteEdge(usize, usize),
    Group(Vec<usize>),
    Dissolve(usize),
    Toggle(usize),
    AutoGroup(usize),
}

// Plain node ids n0..n9 and group ids group-1..group-4 share one index space.
fn id(index: usize) -> String {
    if index < 10 {
        format!("n{index}")
    } else {
        format!("group-{}", index - 9)
    }
}

// ===================
// Strategies
// ===================

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (0..10usize, 0..TYPES.len()).prop_map(|(i, t)| Op::AddNode(i, t)),
        1 => (0..14usize).prop_map(Op::DeleteNode),
        3 => (0..14usize, 0..14usize).prop_map(|(s, t)| Op::AddEdge(s, t)),
        1 => (0..14usize, 0..14usize).prop_map(|(s, t)| Op::DeleteEdge(s, t)),
        2 => prop::collection::vec(0..14usize, 0..5).prop_map(Op::Group),
        1 => (0..14usize).prop_map(Op::Dissolve),
        1 => (0..14usize).prop_map(Op::Toggle),
        1 => (0..8usize).prop_map(Op::AutoGroup),
    ]
}

fn raw_node_strategy() -> impl Strategy<Value = Node> {
    (
        0..14usize,
        0..TYPES.len(),
        any::<bool>(),
        prop::collection::vec(0..14usize, 0..4),
        prop::option::of(0..14usize),
    )
        .prop_map(|(i, t, is_group, children, parent)| {
            let mut node = Node::new(id(i), TYPES[t], id(i));
            node.is_group = is_group;
            node.child_ids = children.into_iter().map(id).collect();
            node.parent_id = parent.map(id);
            node
        })
}

fn raw_diagram_strategy() -> impl Strategy<Value = Diagram> {
    (
        prop::collection::vec(raw_node_strategy(), 0..12),
        prop::collection::vec((0..14usize, 0..14usize), 0..16),
    )
        .prop_map(|(nodes, edges)| {
            let mut seen = HashSet::new();
            let nodes = nodes.into_iter().filter(|n| seen.insert(n.id.clone())).collect();
            let edges = edges
                .into_iter()
                .enumerate()
                .map(|(k, (s, t))| Edge::new(format!("e{k}"), id(s), id(t)))
                .collect();
            Diagram { nodes, edges }
        })
}

/// Returns true when the operation ended with a redirect over every edge.
fn apply(diagram: &mut Diagram, op: &Op) -> bool {
    // Rejected operations leave the diagram unchanged, so errors are ignored.
    match op {
        Op::AddNode(i, t) => {
            let _ = add_node(diagram, Node::new(id(*i), TYPES[*t], id(*i)));
            false
        }
        Op::DeleteNode(i) => {
            let _ = delete_node(diagram, &id(*i));
            false
        }
        Op::AddEdge(s, t) => {
            let _ = add_edge(diagram, Edge::between(id(*s), id(*t)), EdgePolicy::Lenient);
            false
        }
        Op::DeleteEdge(s, t) => {
            delete_edge(diagram, &make_edge_id(&id(*s), &id(*t)));
            false
        }
        Op::Group(members) => {
            let members: Vec<String> = members.iter().map(|m| id(*m)).collect();
            matches!(
                create_group(diagram, &members, &GroupSpec::default()),
                Ok(GroupOutcome::Created { .. })
            )
        }
        Op::Dissolve(i) => {
            let _ = dissolve_group(diagram, &id(*i));
            false
        }
        Op::Toggle(i) => {
            let _ = toggle_collapse(diagram, &id(*i));
            false
        }
        Op::AutoGroup(max) => {
            let options = GroupingOptions {
                max_visible_nodes: *max,
                auto_group: true,
            };
            !auto_group(diagram, &options).is_empty()
        }
    }
}

// ===================
// Checks
// ===================

fn check_structure(diagram: &Diagram) -> Result<(), TestCaseError> {
    let mut node_ids = HashSet::new();
    for node in &diagram.nodes {
        prop_assert!(node_ids.insert(node.id.as_str()), "duplicate node id {}", node.id);
    }
    let mut edge_ids = HashSet::new();
    for edge in &diagram.edges {
        prop_assert!(edge_ids.insert(edge.id.as_str()), "duplicate edge id {}", edge.id);
        prop_assert!(node_ids.contains(edge.source.as_str()), "dangling source in {}", edge.id);
        prop_assert!(node_ids.contains(edge.target.as_str()), "dangling target in {}", edge.id);
        prop_assert_ne!(&edge.source, &edge.target);
    }

    for node in &diagram.nodes {
        if let Some(pid) = &node.parent_id {
            prop_assert!(!node.is_group, "group {} is nested", node.id);
            let parent = diagram.node(pid);
            prop_assert!(parent.is_some_and(|p| p.is_group && p.child_ids.contains(&node.id)));
        }
        if node.is_group {
            prop_assert!(node.child_ids.len() >= 2, "group {} is undersized", node.id);
            for child_id in &node.child_ids {
                let child = diagram.node(child_id);
                prop_assert!(child.is_some_and(|c| c.parent_id.as_deref() == Some(node.id.as_str())));
            }
        }
    }
    Ok(())
}

fn check_unique_pairs(diagram: &Diagram) -> Result<(), TestCaseError> {
    let mut pairs = HashSet::new();
    for edge in &diagram.edges {
        prop_assert!(
            pairs.insert((edge.source.as_str(), edge.target.as_str())),
            "{} -> {} stored twice",
            edge.source,
            edge.target
        );
    }
    Ok(())
}

fn check_operations_preserve_structure(ops: &[Op]) -> Result<(), TestCaseError> {
    let mut diagram = Diagram::default();
    for op in ops {
        let redirected = apply(&mut diagram, op);
        check_structure(&diagram)?;
        if redirected {
            check_unique_pairs(&diagram)?;
        }
    }
    Ok(())
}

fn check_redirect_is_idempotent(ops: &[Op]) -> Result<(), TestCaseError> {
    let mut diagram = Diagram::default();
    for op in ops {
        apply(&mut diagram, op);
    }
    redirect_edges(&mut diagram);
    let once = diagram.clone();
    let stats = redirect_edges(&mut diagram);
    prop_assert_eq!(&diagram, &once);
    prop_assert!(!stats.changed());
    Ok(())
}

fn check_repair_yields_valid_groups(mut diagram: Diagram) -> Result<(), TestCaseError> {
    repair_groups(&mut diagram);
    diagram.prune_dangling_edges();

    for node in &diagram.nodes {
        if let Some(pid) = &node.parent_id {
            prop_assert!(diagram.node(pid).is_some_and(|p| p.is_group));
            prop_assert!(!node.is_group);
        }
        if node.is_group {
            prop_assert!(node.child_ids.len() >= 2);
            let unique: HashSet<&String> = node.child_ids.iter().collect();
            prop_assert_eq!(unique.len(), node.child_ids.len());
            prop_assert!(!node.child_ids.contains(&node.id));
            prop_assert!(node.child_ids.iter().all(|c| diagram.has_node(c)));
            for child_id in &node.child_ids {
                let child = diagram.node(child_id);
                prop_assert!(child.is_some_and(|c| !c.is_group && c.parent_id.as_deref() == Some(node.id.as_str())));
            }
        }
        if let Some(pid) = &node.parent_id {
            prop_assert!(diagram.node(pid).is_some_and(|p| p.child_ids.contains(&node.id)));
        }
    }

    let once = diagram.clone();
    prop_assert!(repair_groups(&mut diagram).is_clean());
    prop_assert_eq!(&diagram, &once);
    Ok(())
}

// ===================
// Proptest Wrappers
// ===================

proptest! {
    #[test]
    fn operations_preserve_structure(ops in prop::collection::vec(op_strategy(), 0..40)) {
        check_operations_preserve_structure(&ops)?;
    }

    #[test]
    fn redirect_is_idempotent(ops in prop::collection::vec(op_strategy(), 0..40)) {
        check_redirect_is_idempotent(&ops)?;
    }

    #[test]
    fn repair_yields_valid_groups(diagram in raw_diagram_strategy()) {
        check_repair_yields_valid_groups(diagram)?;
    }
}
