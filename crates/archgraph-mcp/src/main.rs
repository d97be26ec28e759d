mod store;

use std::sync::Arc;

use archgraph_core::edge::{add_edge, delete_edge, EdgeOutcome, EdgePolicy, EdgeRemoval};
use archgraph_core::group::{create_group, dissolve_group, toggle_collapse, GroupOutcome, GroupSpec};
use archgraph_core::heuristic::auto_group;
use archgraph_core::node::delete_node;
use archgraph_core::session::SessionResult;
use archgraph_core::{make_edge_id, Diagram, Edge, EdgeType, GroupingOptions, Session};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, Content, ServerCapabilities, ServerInfo},
    schemars, tool, tool_handler, tool_router, ErrorData as McpError, ServerHandler, ServiceExt,
};
use serde::Deserialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::store::{data_dir, read_settings, FileStore};

const INSTRUCTIONS: &str = "archgraph keeps architecture diagrams as nodes and edges. Large \
diagrams are simplified with collapsible group nodes: every edge that touches a group member from \
outside the group is drawn to the group node instead. Use set_diagram to store a freshly generated \
diagram (it is repaired, auto-grouped when large and its edges routed through groups), \
apply_instructions for incremental edits, and the group tools to reorganize. Nested groups are not \
allowed.";

// --- Request types ---

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DiagramRequest {
    /// Name of the diagram
    name: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct SetDiagramRequest {
    /// Name of the diagram to create or overwrite
    name: String,
    /// The complete diagram as a JSON string: {"nodes": [...], "edges": [...]}. See get_diagram output for the exact shape.
    data: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct ApplyInstructionsRequest {
    /// Name of the diagram to edit. A missing diagram starts out empty.
    name: String,
    /// Array of instructions, each tagged by "action": add_node {node_id, type, label, description?, technology?, position?, inputs?, outputs?, notes?}, update_node {node_id, any of type/label/description/technology/notes/position/inputs/outputs}, delete_node {node_id}, add_edge {source, target, edge_id?, label?, type?}, delete_edge {edge_id}. Runs in order and stops at the first failure; earlier instructions stay applied.
    instructions: serde_json::Value,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AddEdgeRequest {
    /// Name of the diagram
    name: String,
    /// Source node ID
    source: String,
    /// Target node ID
    target: String,
    /// Edge ID. Default: "edge-{source}-{target}".
    edge_id: Option<String>,
    /// Short relationship label, e.g. "publishes to"
    label: Option<String>,
    /// "default" or "animated"
    #[serde(rename = "type")]
    edge_type: Option<EdgeType>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DeleteEdgeRequest {
    /// Name of the diagram
    name: String,
    /// ID of the edge to delete
    edge_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct DeleteNodeRequest {
    /// Name of the diagram
    name: String,
    /// ID of the node to delete. Deleting a group deletes its members too.
    node_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GroupNodesRequest {
    /// Name of the diagram
    name: String,
    /// IDs of at least two ungrouped nodes. Including one existing group merges the other nodes into it.
    node_ids: Vec<String>,
    /// Label for a new group. Default: derived from member types.
    label: Option<String>,
    /// Description for a new group
    description: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct GroupRequest {
    /// Name of the diagram
    name: String,
    /// ID of the group node
    group_id: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
struct AutoGroupRequest {
    /// Name of the diagram
    name: String,
    /// Group only when the diagram has more nodes than this. Default: the configured threshold.
    max_visible_nodes: Option<usize>,
}

// --- Server ---

#[derive(Clone)]
pub struct ArchgraphServer {
    session: Arc<Session<FileStore>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl ArchgraphServer {
    pub fn new(session: Session<FileStore>) -> Self {
        Self {
            session: Arc::new(session),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(description = "List all stored diagrams")]
    fn list_diagrams(&self) -> Result<CallToolResult, McpError> {
        respond(self.session.list().map(|names| {
            if names.is_empty() {
                "No diagrams found. Use set_diagram to create one.".to_string()
            } else {
                names.join("\n")
            }
        }))
    }

    #[tool(
        description = "Get the full JSON content of a diagram: {nodes: [{id, type, label, description, inputs, outputs, metadata?, position, is_group, is_collapsed, child_ids, parent_id}], edges: [{id, source, target, label?, type}]}"
    )]
    fn get_diagram(
        &self,
        Parameters(req): Parameters<DiagramRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(self.session.load(&req.name).map(|diagram| to_json(&diagram)))
    }

    #[tool(
        description = "Create or overwrite a diagram from JSON. Broken group links and dangling edges are repaired, large ungrouped diagrams are grouped by layer, and edges are routed through group nodes."
    )]
    fn set_diagram(
        &self,
        Parameters(req): Parameters<SetDiagramRequest>,
    ) -> Result<CallToolResult, McpError> {
        let diagram: Diagram = match serde_json::from_str(&req.data) {
            Ok(d) => d,
            Err(e) => {
                return Ok(CallToolResult::error(vec![Content::text(format!(
                    "Invalid diagram JSON: {}",
                    e
                ))]));
            }
        };
        respond(self.session.import(&req.name, diagram).map(|(saved, report)| {
            let mut text = format!(
                "Saved '{}' with {} node(s) and {} edge(s)",
                req.name,
                saved.nodes.len(),
                saved.edges.len()
            );
            if !report.repair.is_clean() {
                text.push_str(&format!(
                    "\nRepaired {} parent link(s), rewrote member lists of: {}, dissolved group(s): {}",
                    report.repair.cleared_parents.len(),
                    list_or_none(&report.repair.relinked_groups),
                    list_or_none(&report.repair.dissolved_groups)
                ));
            }
            if report.dangling_edges > 0 {
                text.push_str(&format!("\nDropped {} dangling edge(s)", report.dangling_edges));
            }
            if !report.auto_groups.is_empty() {
                text.push_str(&format!("\nAuto-grouped: {}", report.auto_groups.join(", ")));
            }
            text
        }))
    }

    #[tool(
        description = "Apply an ordered batch of edit instructions (add_node, update_node, delete_node, add_edge, delete_edge). Edges with missing endpoints or duplicate IDs are skipped with a note instead of failing."
    )]
    fn apply_instructions(
        &self,
        Parameters(req): Parameters<ApplyInstructionsRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.session
                .apply_json(&req.name, req.instructions)
                .map(|report| report.summary()),
        )
    }

    #[tool(description = "Add one edge. Fails if an endpoint or the edge ID does not exist.")]
    fn add_edge(
        &self,
        Parameters(req): Parameters<AddEdgeRequest>,
    ) -> Result<CallToolResult, McpError> {
        let edge = Edge {
            id: req
                .edge_id
                .unwrap_or_else(|| make_edge_id(&req.source, &req.target)),
            source: req.source,
            target: req.target,
            label: req.label,
            edge_type: req.edge_type.unwrap_or_default(),
        };
        let id = edge.id.clone();
        respond(
            self.session
                .update(&req.name, |d| add_edge(d, edge, EdgePolicy::Strict))
                .map(|outcome| match outcome {
                    EdgeOutcome::Added => format!("Added edge '{}'", id),
                    EdgeOutcome::Skipped(reason) => format!("Skipped edge '{}': {}", id, reason),
                }),
        )
    }

    #[tool(description = "Delete an edge by ID. Deleting an absent edge is not an error.")]
    fn delete_edge(
        &self,
        Parameters(req): Parameters<DeleteEdgeRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.session
                .update(&req.name, |d| Ok(delete_edge(d, &req.edge_id)))
                .map(|removal| match removal {
                    EdgeRemoval::Removed => format!("Deleted edge '{}'", req.edge_id),
                    EdgeRemoval::NotPresent => format!("Edge '{}' was already absent", req.edge_id),
                }),
        )
    }

    #[tool(
        description = "Delete a node and its connected edges. Deleting a group also deletes its members; a group left with fewer than two members is dissolved."
    )]
    fn delete_node(
        &self,
        Parameters(req): Parameters<DeleteNodeRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.session
                .update(&req.name, |d| delete_node(d, &req.node_id))
                .map(|deletion| {
                    let mut text = format!(
                        "Deleted {} node(s) and {} edge(s)",
                        deletion.removed_nodes.len(),
                        deletion.removed_edges
                    );
                    if !deletion.dissolved_groups.is_empty() {
                        text.push_str(&format!(
                            "\nDissolved group(s): {}",
                            deletion.dissolved_groups.join(", ")
                        ));
                    }
                    text
                }),
        )
    }

    #[tool(
        description = "Group nodes into a new collapsed group node, or merge them into an existing group if one of the IDs is a group. Edges crossing the group boundary are redirected to the group node."
    )]
    fn group_nodes(
        &self,
        Parameters(req): Parameters<GroupNodesRequest>,
    ) -> Result<CallToolResult, McpError> {
        let spec = GroupSpec {
            label: req.label,
            description: req.description,
        };
        respond(
            self.session
                .update(&req.name, |d| create_group(d, &req.node_ids, &spec))
                .map(|outcome| match outcome {
                    GroupOutcome::Created { group_id, members } => {
                        format!("Created group '{}' with {} member(s)", group_id, members.len())
                    }
                    GroupOutcome::Merged { group_id, added } => {
                        format!("Merged {} into group '{}'", list_or_none(&added), group_id)
                    }
                }),
        )
    }

    #[tool(
        description = "Dissolve a group. Members become top-level again; edges attached to the group node are removed."
    )]
    fn ungroup(
        &self,
        Parameters(req): Parameters<GroupRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.session
                .update(&req.name, |d| dissolve_group(d, &req.group_id))
                .map(|dissolution| {
                    format!(
                        "Dissolved '{}', released {} and removed {} edge(s)",
                        req.group_id,
                        list_or_none(&dissolution.released),
                        dissolution.removed_edges
                    )
                }),
        )
    }

    #[tool(description = "Collapse an expanded group or expand a collapsed one")]
    fn toggle_group(
        &self,
        Parameters(req): Parameters<GroupRequest>,
    ) -> Result<CallToolResult, McpError> {
        respond(
            self.session
                .update(&req.name, |d| toggle_collapse(d, &req.group_id))
                .map(|collapsed| {
                    let state = if collapsed { "collapsed" } else { "expanded" };
                    format!("Group '{}' is now {}", req.group_id, state)
                }),
        )
    }

    #[tool(
        description = "Group an ungrouped diagram by architectural layer (data, API, processing, infrastructure) when it has more nodes than the threshold"
    )]
    fn auto_group(
        &self,
        Parameters(req): Parameters<AutoGroupRequest>,
    ) -> Result<CallToolResult, McpError> {
        let options = GroupingOptions {
            max_visible_nodes: req
                .max_visible_nodes
                .unwrap_or(self.session.options().max_visible_nodes),
            auto_group: true,
        };
        respond(
            self.session
                .update(&req.name, |d| Ok(auto_group(d, &options)))
                .map(|created| {
                    if created.is_empty() {
                        "No groups created".to_string()
                    } else {
                        format!("Created group(s): {}", created.join(", "))
                    }
                }),
        )
    }
}

#[tool_handler]
impl ServerHandler for ArchgraphServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            instructions: Some(INSTRUCTIONS.into()),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

// --- Helpers ---

fn respond(result: SessionResult<String>) -> Result<CallToolResult, McpError> {
    Ok(match result {
        Ok(text) => CallToolResult::success(vec![Content::text(text)]),
        Err(e) => {
            info!(error = %e, "tool call rejected");
            CallToolResult::error(vec![Content::text(e.to_string())])
        }
    })
}

fn to_json(diagram: &Diagram) -> String {
    serde_json::to_string_pretty(diagram).unwrap_or_else(|e| format!("Serialization error: {}", e))
}

fn list_or_none(ids: &[String]) -> String {
    if ids.is_empty() {
        "none".to_string()
    } else {
        ids.join(", ")
    }
}

fn init_tracing() {
    // stdout carries the MCP protocol, so logs go to stderr.
    let filter = EnvFilter::try_from_env("ARCHGRAPH_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let dir = data_dir();
    let settings = read_settings(&dir);
    info!(
        dir = %dir.display(),
        max_visible_nodes = settings.grouping.max_visible_nodes,
        auto_group = settings.grouping.auto_group,
        "starting archgraph-mcp"
    );

    let session = Session::new(FileStore::new(dir), settings.grouping);
    let service = ArchgraphServer::new(session)
        .serve(rmcp::transport::io::stdio())
        .await
        .inspect_err(|e| error!(error = %e, "MCP server error"))?;
    service.waiting().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use archgraph_core::Node;
    use serde_json::json;

    fn server(dir: &std::path::Path) -> ArchgraphServer {
        ArchgraphServer::new(Session::new(FileStore::new(dir), GroupingOptions::default()))
    }

    fn text(result: &CallToolResult) -> String {
        serde_json::to_string(&result.content).unwrap()
    }

    fn seed(server: &ArchgraphServer) {
        let diagram = Diagram {
            nodes: vec![
                Node::new("api", "api", "API"),
                Node::new("users", "database", "Users"),
                Node::new("orders", "database", "Orders"),
            ],
            edges: vec![Edge::between("api", "users"), Edge::between("api", "orders")],
        };
        let result = server
            .set_diagram(Parameters(SetDiagramRequest {
                name: "shop".into(),
                data: serde_json::to_string(&diagram).unwrap(),
            }))
            .unwrap();
        assert_ne!(result.is_error, Some(true));
    }

    #[test]
    fn group_nodes_persists_redirected_edges() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        seed(&server);

        let result = server
            .group_nodes(Parameters(GroupNodesRequest {
                name: "shop".into(),
                node_ids: vec!["users".into(), "orders".into()],
                label: Some("Storage".into()),
                description: None,
            }))
            .unwrap();
        assert!(text(&result).contains("group-1"));

        let stored = server.session.load("shop").unwrap();
        assert_eq!(stored.node("group-1").unwrap().label, "Storage");
        assert_eq!(stored.edges.len(), 1);
        assert_eq!(stored.edges[0].target, "group-1");
    }

    #[test]
    fn strict_add_edge_reports_missing_endpoint() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        seed(&server);

        let result = server
            .add_edge(Parameters(AddEdgeRequest {
                name: "shop".into(),
                source: "api".into(),
                target: "ghost".into(),
                edge_id: None,
                label: None,
                edge_type: None,
            }))
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(text(&result).contains("ghost"));
    }

    #[test]
    fn apply_instructions_reports_the_failing_index() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        seed(&server);

        let result = server
            .apply_instructions(Parameters(ApplyInstructionsRequest {
                name: "shop".into(),
                instructions: json!([
                    {"action": "add_node", "node_id": "cache", "type": "cache", "label": "Cache"},
                    {"action": "delete_node", "node_id": "ghost"}
                ]),
            }))
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(text(&result).contains("#1"));
        assert!(server.session.load("shop").unwrap().has_node("cache"));

        let result = server
            .apply_instructions(Parameters(ApplyInstructionsRequest {
                name: "shop".into(),
                instructions: json!([
                    {"action": "add_node", "node_id": "queue", "type": "queue"},
                    {"action": "rename", "node_id": "api"}
                ]),
            }))
            .unwrap();
        assert_eq!(result.is_error, Some(true));
        assert!(text(&result).contains("#1"));
        assert!(text(&result).contains("rename"));
        assert!(server.session.load("shop").unwrap().has_node("queue"));
    }

    #[test]
    fn unknown_diagram_is_a_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let server = server(dir.path());
        let result = server
            .get_diagram(Parameters(DiagramRequest {
                name: "missing".into(),
            }))
            .unwrap();
        assert_eq!(result.is_error, Some(true));
    }
}
