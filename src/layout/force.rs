//! Force-directed placement.
//!
//! Positioned nodes are fixed anchors: they push and pull but never move.
//! Unpositioned nodes start on a grid around `(startX, startY)` with a small
//! jitter drawn from a generator seeded by `config.seed`, so identical inputs
//! always converge to identical output.
//!
//! Each pair of nodes costs work every iteration, so this pass is quadratic
//! in the node count and is not meant for more than a few hundred nodes.

#[cfg(test)]
#[path = "force_test.rs"]
mod force_test;

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{LayoutConfig, LayoutResult, effective_size, placed};
use crate::consts::{FORCE_CENTERING, FORCE_DAMPING, FORCE_JITTER, FORCE_REPULSION, FORCE_SPRING, GEOMETRY_EPSILON};
use crate::geometry::Point;
use crate::scene::{Connector, Node};

/// Body of the simulation: a node center and its velocity.
struct Body {
    center: Point,
    velocity: Point,
    fixed: bool,
}

/// Simulate repulsion, connector springs and a centering pull.
///
/// Per iteration `i`, every force is scaled by the cooling factor
/// `1 − i / iterations` before it is added to the velocity, and velocity
/// decays by the damping factor.
#[must_use]
pub fn apply_force_layout(nodes: &[Node], connectors: &[Connector], config: &LayoutConfig) -> LayoutResult {
    let mut bodies = seed_bodies(nodes, config);
    if bodies.iter().all(|b| b.fixed) {
        return LayoutResult::new(nodes.to_vec());
    }

    let index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id.as_str(), i))
        .collect();
    let springs: Vec<(usize, usize)> = connectors
        .iter()
        .filter_map(|c| Some((*index.get(c.from.node_id.as_str())?, *index.get(c.to.node_id.as_str())?)))
        .filter(|(a, b)| a != b)
        .collect();

    let centroid = bodies
        .iter()
        .fold(Point::default(), |acc, b| acc.add(b.center))
        .scale(1.0 / bodies.len() as f64);
    let rest_length = config.cell_width;

    let iterations = config.iterations;
    for i in 0..iterations {
        let cooling = 1.0 - i as f64 / iterations as f64;
        let mut forces = vec![Point::default(); bodies.len()];

        for a in 0..bodies.len() {
            for b in (a + 1)..bodies.len() {
                let delta = bodies[a].center.sub(bodies[b].center);
                // Coincident centers separate along a fixed per-pair direction.
                let dir = delta
                    .normalized()
                    .unwrap_or_else(|| Point::from_angle((a * 31 + b) as f64));
                let d = delta.length().max(1.0);
                let push = dir.scale(FORCE_REPULSION / (d * d));
                forces[a] = forces[a].add(push);
                forces[b] = forces[b].sub(push);
            }
        }

        for &(a, b) in &springs {
            let delta = bodies[b].center.sub(bodies[a].center);
            let d = delta.length();
            if d <= GEOMETRY_EPSILON {
                continue;
            }
            let pull = delta.scale(FORCE_SPRING * (d - rest_length) / d);
            forces[a] = forces[a].add(pull);
            forces[b] = forces[b].sub(pull);
        }

        for (body, force) in bodies.iter_mut().zip(&forces) {
            if body.fixed {
                continue;
            }
            let total = force.add(centroid.sub(body.center).scale(FORCE_CENTERING));
            body.velocity = body.velocity.add(total.scale(cooling)).scale(FORCE_DAMPING);
            body.center = body.center.add(body.velocity);
        }
    }

    let out = nodes
        .iter()
        .zip(&bodies)
        .map(|(node, body)| {
            if body.fixed {
                return node.clone();
            }
            let (w, h) = effective_size(node, config);
            placed(node, body.center.x - w / 2.0, body.center.y - h / 2.0, config)
        })
        .collect();

    LayoutResult::new(out)
}

fn seed_bodies(nodes: &[Node], config: &LayoutConfig) -> Vec<Body> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let pending = nodes.iter().filter(|n| !n.is_positioned()).count();
    let columns = (pending as f64).sqrt().ceil().max(1.0) as usize;

    let mut slot = 0_usize;
    nodes
        .iter()
        .map(|node| {
            let (w, h) = effective_size(node, config);
            if let Some((x, y)) = node.position() {
                return Body { center: Point::new(x + w / 2.0, y + h / 2.0), velocity: Point::default(), fixed: true };
            }
            let (col, row) = (slot % columns, slot / columns);
            slot += 1;
            let jitter = Point::new(
                rng.random_range(-FORCE_JITTER..=FORCE_JITTER),
                rng.random_range(-FORCE_JITTER..=FORCE_JITTER),
            );
            let base = Point::new(
                config.start_x + (col as f64 + 0.5) * config.cell_width,
                config.start_y + (row as f64 + 0.5) * config.cell_height,
            );
            Body { center: base.add(jitter), velocity: Point::default(), fixed: false }
        })
        .collect()
}
