use archgraph_core::edge::{add_edge, EdgeOutcome, EdgePolicy, SkipReason};
use archgraph_core::executor::{execute, parse_instructions, Outcome, ToolError};
use archgraph_core::group::{create_group, dissolve_group, GroupOutcome, GroupSpec};
use archgraph_core::heuristic::auto_group;
use archgraph_core::node::delete_node;
use archgraph_core::{Diagram, Edge, GraphError, GroupingOptions, Node};
use serde_json::json;

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn pairs(diagram: &Diagram) -> Vec<(String, String)> {
    diagram
        .edges
        .iter()
        .map(|e| (e.source.clone(), e.target.clone()))
        .collect()
}

#[test]
fn deleting_a_group_removes_it_with_every_member() {
    let mut diagram = Diagram {
        nodes: (0..5)
            .map(|i| Node::new(format!("svc{i}"), "service", format!("Service {i}")))
            .chain([Node::new("client", "client", "Client")])
            .collect(),
        edges: vec![Edge::between("client", "svc0"), Edge::between("svc3", "client")],
    };
    let members: Vec<String> = (0..5).map(|i| format!("svc{i}")).collect();
    let outcome = create_group(&mut diagram, &members, &GroupSpec::default()).unwrap();
    assert_eq!(diagram.nodes.len(), 7);

    let deletion = delete_node(&mut diagram, outcome.group_id()).unwrap();
    assert_eq!(deletion.removed_nodes.len(), 6);
    assert_eq!(diagram.nodes.len(), 1);
    assert!(diagram.edges.is_empty());
}

#[test]
fn parallel_edges_into_a_group_collapse_to_one() {
    let mut diagram = Diagram {
        nodes: vec![
            Node::new("A", "client", "A"),
            Node::new("B", "database", "B"),
            Node::new("C", "database", "C"),
        ],
        edges: vec![Edge::between("A", "B"), Edge::between("A", "C")],
    };
    create_group(&mut diagram, &ids(&["B", "C"]), &GroupSpec::default()).unwrap();
    assert_eq!(pairs(&diagram), vec![("A".to_string(), "group-1".to_string())]);
}

#[test]
fn only_classified_nodes_are_auto_grouped_above_threshold() {
    let mut nodes: Vec<Node> = (0..4)
        .map(|i| Node::new(format!("db{i}"), "database", format!("DB {i}")))
        .collect();
    nodes.extend((0..3).map(|i| Node::new(format!("u{i}"), "actor", format!("User {i}"))));
    let mut diagram = Diagram {
        nodes,
        edges: vec![],
    };
    let options = GroupingOptions {
        max_visible_nodes: 6,
        auto_group: true,
    };

    let created = auto_group(&mut diagram, &options);
    assert_eq!(created.len(), 1);
    let group = diagram.node(&created[0]).unwrap();
    assert_eq!(group.child_ids, ids(&["db0", "db1", "db2", "db3"]));
    assert_eq!(diagram.nodes.len(), 8);
    assert!(diagram
        .nodes
        .iter()
        .filter(|n| n.id.starts_with('u'))
        .all(|n| n.parent_id.is_none()));
}

#[test]
fn grouping_with_an_existing_group_merges_into_it() {
    let mut diagram = Diagram {
        nodes: vec![
            Node::new("a", "queue", "A"),
            Node::new("b", "queue", "B"),
            Node::new("c", "queue", "C"),
            Node::new("d", "worker", "D"),
        ],
        edges: vec![Edge::between("d", "c")],
    };
    create_group(&mut diagram, &ids(&["a", "b"]), &GroupSpec::default()).unwrap();
    let outcome = create_group(&mut diagram, &ids(&["c", "group-1"]), &GroupSpec::default()).unwrap();

    assert!(matches!(outcome, GroupOutcome::Merged { .. }));
    assert_eq!(diagram.groups().count(), 1);
    assert_eq!(diagram.node("group-1").unwrap().child_ids, ids(&["a", "b", "c"]));
    assert_eq!(diagram.node("c").unwrap().parent_id.as_deref(), Some("group-1"));
    assert_eq!(pairs(&diagram), vec![("d".to_string(), "group-1".to_string())]);
}

#[test]
fn dissolving_a_group_drops_its_redirected_edges() {
    let mut diagram = Diagram {
        nodes: vec![
            Node::new("c1", "database", "C1"),
            Node::new("c2", "database", "C2"),
            Node::new("ext", "service", "Ext"),
        ],
        edges: vec![Edge::between("c1", "ext")],
    };
    create_group(&mut diagram, &ids(&["c1", "c2"]), &GroupSpec::default()).unwrap();
    assert_eq!(pairs(&diagram), vec![("group-1".to_string(), "ext".to_string())]);

    let dissolution = dissolve_group(&mut diagram, "group-1").unwrap();
    assert_eq!(dissolution.released, ids(&["c1", "c2"]));
    assert!(diagram.edges.is_empty());
    assert!(diagram.nodes.iter().all(|n| n.parent_id.is_none() && !n.is_group));
}

#[test]
fn self_loops_are_never_stored() {
    let mut diagram = Diagram {
        nodes: vec![Node::new("a", "service", "A")],
        edges: vec![],
    };
    for policy in [EdgePolicy::Strict, EdgePolicy::Lenient] {
        let outcome = add_edge(&mut diagram, Edge::between("a", "a"), policy).unwrap();
        assert_eq!(outcome, EdgeOutcome::Skipped(SkipReason::SelfLoop("a".into())));
    }
    assert!(diagram.edges.is_empty());
}

#[test]
fn batch_failure_keeps_the_applied_prefix() {
    let mut diagram = Diagram::default();
    let instructions = parse_instructions(json!([
        {"action": "add_node", "node_id": "api", "type": "api", "label": "API"},
        {"action": "add_node", "node_id": "db", "type": "database", "label": "DB"},
        {"action": "add_edge", "source": "api", "target": "db"},
        {"action": "add_edge", "source": "api", "target": "nowhere"},
        {"action": "update_node", "node_id": "ghost", "label": "Ghost"},
        {"action": "delete_node", "node_id": "api"}
    ]))
    .unwrap();

    let err = execute(&mut diagram, &instructions).unwrap_err();
    assert!(matches!(
        err,
        ToolError::Failed {
            index: 4,
            source: GraphError::NotFound { .. },
            ..
        }
    ));
    assert_eq!(diagram.nodes.len(), 2);
    assert_eq!(pairs(&diagram), vec![("api".to_string(), "db".to_string())]);

    let prefix = &instructions[..4];
    let mut fresh = Diagram::default();
    let report = execute(&mut fresh, prefix).unwrap();
    assert_eq!(report.applied(), 3);
    assert!(matches!(report.steps[3].outcome, Outcome::Skipped(SkipReason::MissingEndpoint(_))));
}
