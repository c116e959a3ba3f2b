//! Greedy flow packing along one axis with wrap-around.

use super::{LayoutConfig, LayoutResult, effective_size, placed};
use crate::scene::{Connector, Node};

#[derive(Clone, Copy)]
enum Axis {
    /// Rows advance right, wrap down.
    Horizontal,
    /// Columns advance down, wrap right.
    Vertical,
}

/// Pack unpositioned nodes left to right, wrapping to a new row when the next
/// node would cross `startX + maxWidth`.
#[must_use]
pub fn apply_flow_lr_layout(nodes: &[Node], _connectors: &[Connector], config: &LayoutConfig) -> LayoutResult {
    flow(nodes, config, Axis::Horizontal)
}

/// Pack unpositioned nodes top to bottom, wrapping to a new column when the
/// next node would cross `startY + maxHeight`.
#[must_use]
pub fn apply_flow_tb_layout(nodes: &[Node], _connectors: &[Connector], config: &LayoutConfig) -> LayoutResult {
    flow(nodes, config, Axis::Vertical)
}

fn flow(nodes: &[Node], config: &LayoutConfig, axis: Axis) -> LayoutResult {
    // `main` runs along the flow, `cross` across it.
    let (main_start, cross_start, limit) = match axis {
        Axis::Horizontal => (config.start_x, config.start_y, config.max_width),
        Axis::Vertical => (config.start_y, config.start_x, config.max_height),
    };
    let mut main = main_start;
    let mut cross = cross_start;
    // Extent of the current row (or column) across the flow.
    let mut line_extent = 0.0_f64;

    let out = nodes
        .iter()
        .map(|node| {
            if node.is_positioned() {
                return node.clone();
            }
            let (w, h) = effective_size(node, config);
            let (along, across) = match axis {
                Axis::Horizontal => (w, h),
                Axis::Vertical => (h, w),
            };
            // A node wider than the limit still gets a line of its own.
            if main > main_start && main + along > main_start + limit {
                main = main_start;
                cross += line_extent + config.gap;
                line_extent = 0.0;
            }
            let (x, y) = match axis {
                Axis::Horizontal => (main, cross),
                Axis::Vertical => (cross, main),
            };
            main += along + config.gap;
            line_extent = line_extent.max(across);
            placed(node, x, y, config)
        })
        .collect();

    LayoutResult::new(out)
}
