//! Bulk placement of nodes that lack explicit coordinates.
//!
//! DESIGN
//! ======
//! Every layout function has the same shape: it takes the node list, the
//! connector list and a [`LayoutConfig`], and returns a fresh node list plus
//! the bounds of the result. Inputs are never mutated. A node that already
//! carries both coordinates is left exactly where it is, so running any
//! layout twice is idempotent: the second pass sees only positioned nodes.
//!
//! Node sizes that are not positive are replaced with the configured
//! `nodeWidth`/`nodeHeight` on the nodes a layout places.

mod flow;
mod force;
mod grid;
mod hierarchical;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::DEFAULT_NODE_SIZE;
use crate::geometry::Bounds;
use crate::scene::{Connector, Node};

pub use flow::{apply_flow_lr_layout, apply_flow_tb_layout};
pub use force::apply_force_layout;
pub use grid::apply_grid_layout;
pub use hierarchical::apply_hierarchical_layout;

// =============================================================================
// CONFIG
// =============================================================================

/// Placement algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayoutAlgorithm {
    #[default]
    Grid,
    FlowLr,
    FlowTb,
    Hierarchical,
    Force,
}

impl LayoutAlgorithm {
    /// Parse the JSON name of an algorithm (`grid`, `flowLr`, ...).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "grid" => Some(Self::Grid),
            "flowLr" => Some(Self::FlowLr),
            "flowTb" => Some(Self::FlowTb),
            "hierarchical" => Some(Self::Hierarchical),
            "force" => Some(Self::Force),
            _ => None,
        }
    }
}

/// Direction in which hierarchical levels advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LayoutDirection {
    #[default]
    TopBottom,
    BottomTop,
    LeftRight,
    RightLeft,
}

/// Layout parameters. Every field has a default so sparse documents parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LayoutConfig {
    pub algorithm: LayoutAlgorithm,
    pub cell_width: f64,
    pub cell_height: f64,
    pub columns: usize,
    pub start_x: f64,
    pub start_y: f64,
    pub node_width: f64,
    pub node_height: f64,
    pub gap: f64,
    /// Wrap extent of left-to-right flow.
    pub max_width: f64,
    /// Wrap extent of top-to-bottom flow.
    pub max_height: f64,
    pub direction: LayoutDirection,
    /// Force simulation steps.
    pub iterations: usize,
    /// Seed for force-layout jitter.
    pub seed: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            algorithm: LayoutAlgorithm::Grid,
            cell_width: 120.0,
            cell_height: 120.0,
            columns: 4,
            start_x: 50.0,
            start_y: 50.0,
            node_width: DEFAULT_NODE_SIZE,
            node_height: DEFAULT_NODE_SIZE,
            gap: 30.0,
            max_width: 1200.0,
            max_height: 1200.0,
            direction: LayoutDirection::TopBottom,
            iterations: 100,
            seed: 0,
        }
    }
}

/// Output of a layout pass.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutResult {
    pub nodes: Vec<Node>,
    /// Unrotated bounds of every positioned node; `None` when there are none.
    pub bounds: Option<Bounds>,
}

impl LayoutResult {
    fn new(nodes: Vec<Node>) -> Self {
        let bounds = nodes_bounds(&nodes);
        Self { nodes, bounds }
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// Run the algorithm named by `config.algorithm`.
#[must_use]
pub fn apply_layout(nodes: &[Node], connectors: &[Connector], config: &LayoutConfig) -> LayoutResult {
    let pending = nodes.iter().filter(|n| !n.is_positioned()).count();
    debug!(algorithm = ?config.algorithm, nodes = nodes.len(), pending, "layout: applying");
    match config.algorithm {
        LayoutAlgorithm::Grid => apply_grid_layout(nodes, connectors, config),
        LayoutAlgorithm::FlowLr => apply_flow_lr_layout(nodes, connectors, config),
        LayoutAlgorithm::FlowTb => apply_flow_tb_layout(nodes, connectors, config),
        LayoutAlgorithm::Hierarchical => apply_hierarchical_layout(nodes, connectors, config),
        LayoutAlgorithm::Force => apply_force_layout(nodes, connectors, config),
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Width and height a layout uses for `node`.
fn effective_size(node: &Node, config: &LayoutConfig) -> (f64, f64) {
    let w = if node.w > 0.0 { node.w } else { config.node_width };
    let h = if node.h > 0.0 { node.h } else { config.node_height };
    (w, h)
}

/// Copy of `node` placed at `(x, y)` with its effective size.
fn placed(node: &Node, x: f64, y: f64, config: &LayoutConfig) -> Node {
    let (w, h) = effective_size(node, config);
    Node { x: Some(x), y: Some(y), w, h, ..node.clone() }
}

fn nodes_bounds(nodes: &[Node]) -> Option<Bounds> {
    nodes
        .iter()
        .filter_map(|n| n.position().map(|(x, y)| Bounds::from_rect(x, y, n.w, n.h)))
        .reduce(Bounds::union)
}
