//! Render target contract and the in-memory render tree.
//!
//! DESIGN
//! ======
//! The render target is the live, drawable side of a scene. It holds one
//! primitive per logical entity, each tagged with typed metadata that export
//! reads back into the document. Primitive ids are monotonically increasing
//! `u64`s, so iteration in id order is insertion order; a canonical map from
//! logical id to primitive id backs every lookup.
//!
//! Node geometry is owned and versioned. Changing a node's transform or size
//! produces the next geometry version and enqueues a transform-changed
//! notification; the engine drains the queue and re-routes only the
//! connectors attached to the nodes that moved.

#[cfg(test)]
#[path = "render_test.rs"]
mod render_test;

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::assets::Asset;
use crate::geometry::{NodeGeometry, Point, Transform};
use crate::routing::{Route, RoutingType};
use crate::scene::{ConnectorStyle, MarkerKind, Port, TextStyle};

/// Identifier of a primitive inside one render target.
pub type PrimitiveId = u64;

// =============================================================================
// PRIMITIVES
// =============================================================================

/// Draw layer a primitive belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Group {
    Nodes,
    Connectors,
    Texts,
}

impl Group {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Nodes => "nodes",
            Self::Connectors => "connectors",
            Self::Texts => "texts",
        }
    }
}

/// What a node draws for its icon.
#[derive(Debug, Clone, PartialEq)]
pub enum IconVisual {
    None,
    Asset(Arc<Asset>),
    /// The icon reference did not resolve; drawn as a placeholder box.
    Placeholder(String),
}

impl IconVisual {
    /// Aspect ratio of the resolved asset, if any.
    #[must_use]
    pub fn aspect_ratio(&self) -> Option<f64> {
        match self {
            Self::Asset(asset) => asset.aspect_ratio(),
            Self::None | Self::Placeholder(_) => None,
        }
    }
}

/// Logical fields of a node that are not geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMeta {
    pub logical_id: String,
    pub icon_ref: Option<String>,
    /// Effective ports: declared, or synthesized when none were declared.
    pub ports: Vec<Port>,
    /// True when `ports` were synthesized and should not be exported.
    pub ports_generated: bool,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodePrimitive {
    pub meta: NodeMeta,
    pub geometry: NodeGeometry,
    pub icon: IconVisual,
}

/// An oriented end marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    pub kind: MarkerKind,
    pub point: Point,
    /// Direction the marker points, in radians.
    pub angle: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorPrimitive {
    pub logical_id: String,
    pub routing_type: RoutingType,
    pub style: ConnectorStyle,
    pub label: Option<String>,
    pub route: Route,
    pub label_position: Option<Point>,
    pub start_marker: Option<Marker>,
    pub end_marker: Option<Marker>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextPrimitive {
    pub logical_id: String,
    pub position: Point,
    pub content: String,
    pub style: TextStyle,
}

/// One drawable entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    Node(NodePrimitive),
    Connector(ConnectorPrimitive),
    Text(TextPrimitive),
}

impl Primitive {
    #[must_use]
    pub fn logical_id(&self) -> &str {
        match self {
            Self::Node(n) => &n.meta.logical_id,
            Self::Connector(c) => &c.logical_id,
            Self::Text(t) => &t.logical_id,
        }
    }

    #[must_use]
    pub fn group(&self) -> Group {
        match self {
            Self::Node(_) => Group::Nodes,
            Self::Connector(_) => Group::Connectors,
            Self::Text(_) => Group::Texts,
        }
    }
}

/// Enqueued when a node's geometry gets a new version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformChanged {
    pub primitive: PrimitiveId,
    pub node_id: String,
    pub version: u64,
}

// =============================================================================
// RENDER TARGET
// =============================================================================

/// The live object graph a scene is imported into.
///
/// Implementations own primitive storage and the transform-changed queue;
/// typed accessors are provided on top of the required methods.
pub trait RenderTarget {
    /// Add a primitive and return its new id. A primitive whose logical id is
    /// already present replaces it in the logical index.
    fn insert(&mut self, primitive: Primitive) -> PrimitiveId;

    fn remove(&mut self, id: PrimitiveId) -> Option<Primitive>;

    fn get(&self, id: PrimitiveId) -> Option<&Primitive>;

    fn get_mut(&mut self, id: PrimitiveId) -> Option<&mut Primitive>;

    /// Primitive id for a logical id.
    fn lookup(&self, logical_id: &str) -> Option<PrimitiveId>;

    /// Every primitive id, in insertion order.
    fn ids(&self) -> Vec<PrimitiveId>;

    /// Primitive ids of one draw layer, in insertion order.
    fn group(&self, group: Group) -> Vec<PrimitiveId>;

    /// Remove everything, including pending notifications.
    fn clear(&mut self);

    /// Give a node primitive its next geometry version. Returns `false` if
    /// `id` is not a node.
    fn set_node_geometry(&mut self, id: PrimitiveId, geometry: NodeGeometry) -> bool;

    /// Take all transform-changed notifications enqueued so far.
    fn drain_transform_changes(&mut self) -> Vec<TransformChanged>;

    // ── Provided ────────────────────────────────────────────────

    fn node(&self, logical_id: &str) -> Option<&NodePrimitive> {
        match self.get(self.lookup(logical_id)?)? {
            Primitive::Node(n) => Some(n),
            _ => None,
        }
    }

    fn node_mut(&mut self, logical_id: &str) -> Option<&mut NodePrimitive> {
        let id = self.lookup(logical_id)?;
        match self.get_mut(id)? {
            Primitive::Node(n) => Some(n),
            _ => None,
        }
    }

    fn connector(&self, logical_id: &str) -> Option<&ConnectorPrimitive> {
        match self.get(self.lookup(logical_id)?)? {
            Primitive::Connector(c) => Some(c),
            _ => None,
        }
    }

    fn connector_mut(&mut self, logical_id: &str) -> Option<&mut ConnectorPrimitive> {
        let id = self.lookup(logical_id)?;
        match self.get_mut(id)? {
            Primitive::Connector(c) => Some(c),
            _ => None,
        }
    }

    fn text(&self, logical_id: &str) -> Option<&TextPrimitive> {
        match self.get(self.lookup(logical_id)?)? {
            Primitive::Text(t) => Some(t),
            _ => None,
        }
    }

    /// Move or rotate a node; enqueues a transform-changed notification.
    fn set_node_transform(&mut self, logical_id: &str, transform: Transform) -> bool {
        let Some(id) = self.lookup(logical_id) else {
            return false;
        };
        let Some(Primitive::Node(n)) = self.get(id) else {
            return false;
        };
        let next = n.geometry.with_transform(transform);
        self.set_node_geometry(id, next)
    }

    /// Resize a node; enqueues a transform-changed notification.
    fn set_node_size(&mut self, logical_id: &str, width: f64, height: f64) -> bool {
        let Some(id) = self.lookup(logical_id) else {
            return false;
        };
        let Some(Primitive::Node(n)) = self.get(id) else {
            return false;
        };
        let next = n.geometry.with_size(width, height);
        self.set_node_geometry(id, next)
    }

    fn len(&self) -> usize {
        self.ids().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// RENDER TREE
// =============================================================================

/// In-memory [`RenderTarget`].
#[derive(Debug, Default)]
pub struct RenderTree {
    primitives: BTreeMap<PrimitiveId, Primitive>,
    by_logical: HashMap<String, PrimitiveId>,
    groups: BTreeMap<Group, Vec<PrimitiveId>>,
    next_id: PrimitiveId,
    changes: Vec<TransformChanged>,
}

impl RenderTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RenderTarget for RenderTree {
    fn insert(&mut self, primitive: Primitive) -> PrimitiveId {
        self.next_id += 1;
        let id = self.next_id;
        self.by_logical.insert(primitive.logical_id().to_owned(), id);
        self.groups.entry(primitive.group()).or_default().push(id);
        self.primitives.insert(id, primitive);
        id
    }

    fn remove(&mut self, id: PrimitiveId) -> Option<Primitive> {
        let primitive = self.primitives.remove(&id)?;
        if self.by_logical.get(primitive.logical_id()) == Some(&id) {
            self.by_logical.remove(primitive.logical_id());
        }
        if let Some(members) = self.groups.get_mut(&primitive.group()) {
            members.retain(|m| *m != id);
        }
        self.changes.retain(|c| c.primitive != id);
        Some(primitive)
    }

    fn get(&self, id: PrimitiveId) -> Option<&Primitive> {
        self.primitives.get(&id)
    }

    fn get_mut(&mut self, id: PrimitiveId) -> Option<&mut Primitive> {
        self.primitives.get_mut(&id)
    }

    fn lookup(&self, logical_id: &str) -> Option<PrimitiveId> {
        self.by_logical.get(logical_id).copied()
    }

    fn ids(&self) -> Vec<PrimitiveId> {
        self.primitives.keys().copied().collect()
    }

    fn group(&self, group: Group) -> Vec<PrimitiveId> {
        self.groups.get(&group).cloned().unwrap_or_default()
    }

    fn clear(&mut self) {
        self.primitives.clear();
        self.by_logical.clear();
        self.groups.clear();
        self.changes.clear();
    }

    fn set_node_geometry(&mut self, id: PrimitiveId, geometry: NodeGeometry) -> bool {
        let Some(Primitive::Node(node)) = self.primitives.get_mut(&id) else {
            return false;
        };
        node.geometry = geometry;
        self.changes.push(TransformChanged { primitive: id, node_id: node.meta.logical_id.clone(), version: geometry.version });
        true
    }

    fn drain_transform_changes(&mut self) -> Vec<TransformChanged> {
        std::mem::take(&mut self.changes)
    }

    fn len(&self) -> usize {
        self.primitives.len()
    }
}
