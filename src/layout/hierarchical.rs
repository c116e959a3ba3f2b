//! Level-based placement along a direction.
//!
//! Levels come from a breadth-first pass over the connector graph starting
//! at in-degree-zero roots; a node's level is one more than its deepest
//! parent. Nodes the pass never reaches (cycle members) take one more than
//! their deepest already-levelled parent, or level 0.

use std::collections::{BTreeMap, HashMap, VecDeque};

use super::{LayoutConfig, LayoutDirection, LayoutResult, effective_size, placed};
use crate::scene::{Connector, Node};

/// Place unpositioned nodes level by level.
///
/// Level `k` sits `k · spacing` from the start along `config.direction`, with
/// `spacing = max(w, h) + gap` over the largest node. Within a level, nodes
/// are spread across the direction in input order.
#[must_use]
pub fn apply_hierarchical_layout(nodes: &[Node], connectors: &[Connector], config: &LayoutConfig) -> LayoutResult {
    let levels = assign_levels(nodes, connectors);
    let max_level = levels.iter().copied().max().unwrap_or(0);

    let spacing = nodes
        .iter()
        .map(|n| {
            let (w, h) = effective_size(n, config);
            w.max(h)
        })
        .fold(0.0_f64, f64::max)
        + config.gap;

    let mut slots: BTreeMap<usize, usize> = BTreeMap::new();
    let out = nodes
        .iter()
        .zip(&levels)
        .map(|(node, &level)| {
            if node.is_positioned() {
                return node.clone();
            }
            let slot = slots.entry(level).or_insert(0);
            let across = *slot as f64 * spacing;
            *slot += 1;

            let forward = level as f64 * spacing;
            let backward = (max_level - level) as f64 * spacing;
            let (x, y) = match config.direction {
                LayoutDirection::TopBottom => (config.start_x + across, config.start_y + forward),
                LayoutDirection::BottomTop => (config.start_x + across, config.start_y + backward),
                LayoutDirection::LeftRight => (config.start_x + forward, config.start_y + across),
                LayoutDirection::RightLeft => (config.start_x + backward, config.start_y + across),
            };
            placed(node, x, y, config)
        })
        .collect();

    LayoutResult::new(out)
}

/// Level of every node, index-aligned with `nodes`.
fn assign_levels(nodes: &[Node], connectors: &[Connector]) -> Vec<usize> {
    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut parents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    let mut indegree = vec![0_usize; nodes.len()];
    for c in connectors {
        let (Some(&from), Some(&to)) = (index.get(c.from.node_id.as_str()), index.get(c.to.node_id.as_str())) else {
            continue;
        };
        if from == to {
            continue;
        }
        children[from].push(to);
        parents[to].push(from);
        indegree[to] += 1;
    }

    let mut levels = vec![0_usize; nodes.len()];
    let mut visited = vec![false; nodes.len()];
    let mut queue: VecDeque<usize> = (0..nodes.len()).filter(|&i| indegree[i] == 0).collect();

    while let Some(i) = queue.pop_front() {
        visited[i] = true;
        for &child in &children[i] {
            levels[child] = levels[child].max(levels[i] + 1);
            indegree[child] -= 1;
            if indegree[child] == 0 {
                queue.push_back(child);
            }
        }
    }

    for i in 0..nodes.len() {
        if visited[i] {
            continue;
        }
        levels[i] = parents[i]
            .iter()
            .filter(|&&p| visited[p])
            .map(|&p| levels[p] + 1)
            .max()
            .unwrap_or(0);
        visited[i] = true;
    }

    levels
}
