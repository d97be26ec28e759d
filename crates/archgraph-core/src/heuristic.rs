//! Layer-based automatic grouping for large diagrams that arrive without explicit groups.

use std::fmt;

use tracing::{debug, info};

use crate::group::{insert_group, GroupSpec};
use crate::redirect::redirect_edges;
use crate::{Diagram, GroupingOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Data,
    Api,
    Processing,
    Infrastructure,
}

impl Layer {
    pub const ALL: [Layer; 4] = [
        Layer::Data,
        Layer::Api,
        Layer::Processing,
        Layer::Infrastructure,
    ];

    /// Layer for a node type, if the type belongs to one. Matching ignores case.
    pub fn classify(node_type: &str) -> Option<Layer> {
        let t = node_type.to_ascii_lowercase();
        LAYER_TABLE
            .iter()
            .find(|(_, types)| types.contains(&t.as_str()))
            .map(|(layer, _)| *layer)
    }

    pub fn label(self) -> &'static str {
        match self {
            Layer::Data => "Data Layer",
            Layer::Api => "API Layer",
            Layer::Processing => "Processing Layer",
            Layer::Infrastructure => "Infrastructure",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Layer::Data => "Databases, caches and storage",
            Layer::Api => "Gateways and API endpoints",
            Layer::Processing => "Services, workers and queues",
            Layer::Infrastructure => "Networking, hosting and monitoring",
        }
    }
}

impl fmt::Display for Layer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Layer::Data => "data",
            Layer::Api => "api",
            Layer::Processing => "processing",
            Layer::Infrastructure => "infrastructure",
        })
    }
}

// Node type -> layer. Types not listed here are never auto-grouped.
const LAYER_TABLE: &[(Layer, &[&str])] = &[
    (
        Layer::Data,
        &[
            "database", "db", "cache", "storage", "datastore", "warehouse", "bucket", "search",
        ],
    ),
    (
        Layer::Api,
        &["api", "gateway", "api_gateway", "endpoint", "graphql", "rest", "grpc"],
    ),
    (
        Layer::Processing,
        &[
            "service", "microservice", "worker", "function", "lambda", "queue", "stream",
            "processor", "job", "scheduler",
        ],
    ),
    (
        Layer::Infrastructure,
        &[
            "loadbalancer", "load_balancer", "cdn", "dns", "firewall", "network", "cluster",
            "container", "server", "monitoring", "vpc",
        ],
    ),
];

/// Group nodes by layer when the diagram has no groups and exceeds `max_visible_nodes`.
///
/// Each layer with at least two nodes becomes one collapsed group. Edges are redirected once,
/// after all groups exist. Returns the ids of the created groups.
pub fn auto_group(diagram: &mut Diagram, options: &GroupingOptions) -> Vec<String> {
    if diagram.has_groups() || diagram.nodes.len() <= options.max_visible_nodes {
        debug!(
            nodes = diagram.nodes.len(),
            max_visible_nodes = options.max_visible_nodes,
            "auto-grouping not needed"
        );
        return Vec::new();
    }

    let mut created = Vec::new();
    for layer in Layer::ALL {
        let members: Vec<String> = diagram
            .nodes
            .iter()
            .filter(|n| !n.is_group && Layer::classify(&n.node_type) == Some(layer))
            .map(|n| n.id.clone())
            .collect();
        if members.len() < 2 {
            continue;
        }

        let spec = GroupSpec {
            label: Some(layer.label().to_string()),
            description: Some(layer.description().to_string()),
        };
        match insert_group(diagram, &members, &spec) {
            Ok(outcome) => created.push(outcome.group_id().to_string()),
            Err(e) => debug!(%layer, error = %e, "skipped layer group"),
        }
    }

    if !created.is_empty() {
        redirect_edges(diagram);
        info!(groups = created.len(), nodes = diagram.nodes.len(), "auto-grouped diagram by layer");
    }
    created
}
