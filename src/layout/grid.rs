//! Row-major grid packing.

use super::{LayoutConfig, LayoutResult, effective_size, placed};
use crate::scene::{Connector, Node};

/// Pack unpositioned nodes into cells, left to right then top to bottom.
///
/// The cell pitch is `cellWidth + gap` by `cellHeight + gap`, and each node is
/// centered inside its pitch. Positioned nodes keep their coordinates and do
/// not consume a cell.
#[must_use]
pub fn apply_grid_layout(nodes: &[Node], _connectors: &[Connector], config: &LayoutConfig) -> LayoutResult {
    let columns = config.columns.max(1);
    let pitch_x = config.cell_width + config.gap;
    let pitch_y = config.cell_height + config.gap;

    let mut slot = 0_usize;
    let out = nodes
        .iter()
        .map(|node| {
            if node.is_positioned() {
                return node.clone();
            }
            let (col, row) = (slot % columns, slot / columns);
            slot += 1;
            let (w, h) = effective_size(node, config);
            let x = config.start_x + col as f64 * pitch_x + (pitch_x - w) / 2.0;
            let y = config.start_y + row as f64 * pitch_y + (pitch_y - h) / 2.0;
            placed(node, x, y, config)
        })
        .collect();

    LayoutResult::new(out)
}
