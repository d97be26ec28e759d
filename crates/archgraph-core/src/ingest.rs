//! Normalization applied to every diagram that enters the engine from outside.

use tracing::info;

use crate::heuristic::auto_group;
use crate::redirect::{redirect_edges, RedirectStats};
use crate::validate::{repair_groups, GroupRepair};
use crate::{Diagram, GroupingOptions};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub repair: GroupRepair,
    /// Edges dropped because an endpoint did not exist.
    pub dangling_edges: usize,
    pub auto_groups: Vec<String>,
    pub redirect: RedirectStats,
}

impl IngestReport {
    pub fn changed(&self) -> bool {
        !self.repair.is_clean()
            || self.dangling_edges > 0
            || !self.auto_groups.is_empty()
            || self.redirect.changed()
    }
}

/// Repair group links, drop dangling edges, auto-group if the diagram is large and
/// ungrouped, then route edges through group boundaries.
pub fn prepare(diagram: &mut Diagram, options: &GroupingOptions) -> IngestReport {
    let repair = repair_groups(diagram);
    let dangling_edges = diagram.prune_dangling_edges();
    let auto_groups = if options.auto_group {
        auto_group(diagram, options)
    } else {
        Vec::new()
    };
    let redirect = redirect_edges(diagram);

    let report = IngestReport {
        repair,
        dangling_edges,
        auto_groups,
        redirect,
    };
    if report.changed() {
        info!(
            cleared_parents = report.repair.cleared_parents.len(),
            relinked_groups = report.repair.relinked_groups.len(),
            dissolved_groups = report.repair.dissolved_groups.len(),
            dangling_edges = report.dangling_edges,
            auto_groups = report.auto_groups.len(),
            redirected = report.redirect.redirected,
            "normalized incoming diagram"
        );
    }
    report
}
