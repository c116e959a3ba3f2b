//! Port resolution: local port geometry, world coordinates, and the live
//! connector → port binding registry.
//!
//! DESIGN
//! ======
//! A port's local offset is measured from the node box center in the node's
//! unscaled, unrotated frame. World coordinates apply scale → rotate →
//! translate, the same order the render surface uses, so indicator overlays
//! and connector ends stay pixel-aligned. Resolution is cached per node and
//! keyed by the node's geometry version; a cache entry goes stale only when
//! the node's transform or size changes (or the caller invalidates it after
//! editing the port list).
//!
//! All searches iterate ports in declaration order and only replace the best
//! candidate on a strictly better score, so ties go to the lowest index.

#[cfg(test)]
#[path = "ports_test.rs"]
mod ports_test;

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::geometry::{NodeGeometry, Point};
use crate::scene::{Port, PortPosition};

// =============================================================================
// TYPES
// =============================================================================

/// A port with its world position under one geometry version.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPort {
    pub id: String,
    pub position: PortPosition,
    pub point: Point,
    /// Index in the node's port list.
    pub index: usize,
}

/// One end of a port search result.
#[derive(Debug, Clone, PartialEq)]
pub struct PortChoice {
    /// Chosen port, or `None` when falling back to the bare box center.
    pub port_id: Option<String>,
    pub point: Point,
    /// Outward exit direction in radians, when the port has one.
    pub exit_angle: Option<f64>,
}

/// Result of [`choose_best_ports`].
#[derive(Debug, Clone, PartialEq)]
pub struct PortPair {
    pub from: PortChoice,
    pub to: PortChoice,
}

// =============================================================================
// GEOMETRY
// =============================================================================

/// Offset of `port` from the box center in the node's local frame.
#[must_use]
pub fn local_port_offset(width: f64, height: f64, port: &Port) -> Point {
    let anchor = match port.position {
        PortPosition::Top => Point::new(0.0, -height / 2.0),
        PortPosition::Right => Point::new(width / 2.0, 0.0),
        PortPosition::Bottom => Point::new(0.0, height / 2.0),
        PortPosition::Left => Point::new(-width / 2.0, 0.0),
        PortPosition::Center | PortPosition::Custom => Point::default(),
    };
    anchor.add(port.offset)
}

/// World position of `port` on a node placed by `geometry`.
///
/// Pure in the geometry: identical inputs always give identical outputs.
#[must_use]
pub fn calculate_absolute_port_position(geometry: &NodeGeometry, port: &Port) -> Point {
    geometry.world_point(local_port_offset(geometry.width, geometry.height, port))
}

/// Outward exit angle of `port` in radians (clockwise from +x).
///
/// Compass ports exit along their edge normal; custom ports exit along their
/// offset. Center ports, and custom ports with zero offset, have no exit
/// direction.
#[must_use]
pub fn get_port_exit_angle(geometry: &NodeGeometry, port: &Port) -> Option<f64> {
    let local = match port.position.normal() {
        Some(normal) => normal,
        None if port.position == PortPosition::Custom => port.offset.normalized()?,
        None => return None,
    };
    Some(geometry.transform.apply_direction(local).angle())
}

/// Resolve every port of a node against one geometry version.
#[must_use]
pub fn resolve_ports(geometry: &NodeGeometry, ports: &[Port]) -> Vec<ResolvedPort> {
    ports
        .iter()
        .enumerate()
        .map(|(index, port)| ResolvedPort {
            id: port.id.clone(),
            position: port.position,
            point: calculate_absolute_port_position(geometry, port),
            index,
        })
        .collect()
}

/// The port closest to `point`; ties go to the lowest port index.
#[must_use]
pub fn find_nearest_port<'a>(resolved: &'a [ResolvedPort], point: Point) -> Option<&'a ResolvedPort> {
    let mut best: Option<(&ResolvedPort, f64)> = None;
    for port in resolved {
        let dist = port.point.distance(point);
        if best.is_none_or(|(_, d)| dist < d) {
            best = Some((port, dist));
        }
    }
    best.map(|(port, _)| port)
}

/// Pick the compass-port pair that gives the shortest connection.
///
/// Every pair of boundary ports is scored by straight-line distance. A pair
/// is discarded when both ports face away from the other node (each outward
/// normal points away from the other box center). If nothing survives, or a
/// node has no boundary ports, both ends fall back to center-to-center,
/// bound to a `center` port when the node declares one.
#[must_use]
pub fn choose_best_ports(a: &NodeGeometry, a_ports: &[Port], b: &NodeGeometry, b_ports: &[Port]) -> PortPair {
    let a_center = a.center();
    let b_center = b.center();

    let mut best: Option<(PortPair, f64)> = None;
    for pa in a_ports.iter().filter(|p| p.position.is_compass()) {
        let point_a = calculate_absolute_port_position(a, pa);
        let normal_a = outward_normal(a, pa);
        for pb in b_ports.iter().filter(|p| p.position.is_compass()) {
            let point_b = calculate_absolute_port_position(b, pb);
            let normal_b = outward_normal(b, pb);

            let a_faces_away = normal_a.dot(b_center.sub(point_a)) < 0.0;
            let b_faces_away = normal_b.dot(a_center.sub(point_b)) < 0.0;
            if a_faces_away && b_faces_away {
                continue;
            }

            let dist = point_a.distance(point_b);
            if best.as_ref().is_none_or(|(_, d)| dist < *d) {
                let pair = PortPair {
                    from: PortChoice {
                        port_id: Some(pa.id.clone()),
                        point: point_a,
                        exit_angle: Some(normal_a.angle()),
                    },
                    to: PortChoice { port_id: Some(pb.id.clone()), point: point_b, exit_angle: Some(normal_b.angle()) },
                };
                best = Some((pair, dist));
            }
        }
    }

    best.map_or_else(
        || PortPair { from: center_choice(a, a_ports), to: center_choice(b, b_ports) },
        |(pair, _)| pair,
    )
}

/// Resolve a specific port by id into a [`PortChoice`].
#[must_use]
pub fn port_choice(geometry: &NodeGeometry, ports: &[Port], port_id: &str) -> Option<PortChoice> {
    let port = ports.iter().find(|p| p.id == port_id)?;
    Some(PortChoice {
        port_id: Some(port.id.clone()),
        point: calculate_absolute_port_position(geometry, port),
        exit_angle: get_port_exit_angle(geometry, port),
    })
}

fn outward_normal(geometry: &NodeGeometry, port: &Port) -> Point {
    port.position
        .normal()
        .map_or_else(Point::default, |n| geometry.transform.apply_direction(n))
}

fn center_choice(geometry: &NodeGeometry, ports: &[Port]) -> PortChoice {
    let port_id = ports
        .iter()
        .find(|p| p.position == PortPosition::Center)
        .map(|p| p.id.clone());
    PortChoice { port_id, point: geometry.center(), exit_angle: None }
}

// =============================================================================
// RESOLVER CACHE
// =============================================================================

struct CachedPorts {
    version: u64,
    dirty: bool,
    ports: Vec<ResolvedPort>,
}

/// Per-node cache of resolved port positions.
#[derive(Default)]
pub struct PortResolver {
    cache: HashMap<String, CachedPorts>,
    recomputations: usize,
}

impl PortResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolved ports for a node, recomputed only when stale.
    pub fn resolve(&mut self, node_id: &str, geometry: &NodeGeometry, ports: &[Port]) -> &[ResolvedPort] {
        let fresh = self
            .cache
            .get(node_id)
            .is_some_and(|c| !c.dirty && c.version == geometry.version);
        if !fresh {
            self.recomputations += 1;
            self.cache.insert(
                node_id.to_owned(),
                CachedPorts { version: geometry.version, dirty: false, ports: resolve_ports(geometry, ports) },
            );
        }
        self.cache
            .get(node_id)
            .map_or(&[] as &[ResolvedPort], |c| c.ports.as_slice())
    }

    /// Mark a node's entry stale, e.g. after a transform-changed notification
    /// or a port-list edit.
    pub fn invalidate(&mut self, node_id: &str) {
        if let Some(entry) = self.cache.get_mut(node_id) {
            entry.dirty = true;
        }
    }

    /// True when the next `resolve` for this node would recompute.
    #[must_use]
    pub fn is_stale(&self, node_id: &str, version: u64) -> bool {
        self.cache
            .get(node_id)
            .is_none_or(|c| c.dirty || c.version != version)
    }

    /// Drop a node's entry entirely.
    pub fn forget(&mut self, node_id: &str) {
        self.cache.remove(node_id);
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }

    /// How many times resolution actually ran (cache misses).
    #[must_use]
    pub fn recomputations(&self) -> usize {
        self.recomputations
    }
}

// =============================================================================
// ATTACHMENT REGISTRY
// =============================================================================

/// Which end of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectorEnd {
    From,
    To,
}

/// The live binding of one connector end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentEnd {
    pub node_id: String,
    /// Port the end is currently bound to; `None` for a bare center.
    pub port_id: Option<String>,
    /// True when the binding was named explicitly (in the document or by a
    /// reattach) rather than chosen automatically.
    pub pinned: bool,
}

/// The bound port pair of one connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub from: AttachmentEnd,
    pub to: AttachmentEnd,
}

impl Attachment {
    #[must_use]
    pub fn end(&self, end: ConnectorEnd) -> &AttachmentEnd {
        match end {
            ConnectorEnd::From => &self.from,
            ConnectorEnd::To => &self.to,
        }
    }
}

/// Runtime-only map of connector id → bound port pair, with a reverse index
/// so moving a node re-routes only the connectors touching it.
#[derive(Debug, Default)]
pub struct AttachmentRegistry {
    by_connector: HashMap<String, Attachment>,
    by_node: HashMap<String, BTreeSet<String>>,
}

impl AttachmentRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or replace) the binding for a connector.
    pub fn register(&mut self, connector_id: &str, attachment: Attachment) -> Option<Attachment> {
        let previous = self.deregister(connector_id);
        for node_id in [&attachment.from.node_id, &attachment.to.node_id] {
            self.by_node
                .entry(node_id.clone())
                .or_default()
                .insert(connector_id.to_owned());
        }
        self.by_connector.insert(connector_id.to_owned(), attachment);
        previous
    }

    /// Remove a connector's binding.
    pub fn deregister(&mut self, connector_id: &str) -> Option<Attachment> {
        let attachment = self.by_connector.remove(connector_id)?;
        for node_id in [&attachment.from.node_id, &attachment.to.node_id] {
            if let Some(set) = self.by_node.get_mut(node_id) {
                set.remove(connector_id);
                if set.is_empty() {
                    self.by_node.remove(node_id);
                }
            }
        }
        Some(attachment)
    }

    #[must_use]
    pub fn get(&self, connector_id: &str) -> Option<&Attachment> {
        self.by_connector.get(connector_id)
    }

    /// Ids of connectors touching a node, in sorted order.
    #[must_use]
    pub fn connectors_for_node(&self, node_id: &str) -> Vec<String> {
        self.by_node
            .get(node_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_connector.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_connector.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_connector.clear();
        self.by_node.clear();
    }
}
