//! Shared engine state: the render target plus everything derived from it.
//!
//! DESIGN
//! ======
//! `Engine` owns one render target, the attachment registry, the per-node
//! port cache, a handle to the asset resolver, and the document-level fields
//! (canvas config, layout) that have no primitive of their own. Import,
//! export and the operations in [`crate::ops`] are all `impl` blocks on this
//! type, so every path that mutates the render tree goes through the same
//! routing helpers below.
//!
//! The engine holds no lock. Callers serialize access to one engine (and so
//! to one render target) themselves; two imports never run concurrently
//! against the same target.

#[cfg(test)]
#[path = "engine_test.rs"]
mod engine_test;

use std::collections::BTreeSet;
use std::f64::consts::PI;
use std::sync::Arc;

use tracing::debug;

use crate::assets::AssetResolver;
use crate::config::EngineConfig;
use crate::consts::{LABEL_T, SCENE_VERSION};
use crate::geometry::{NodeGeometry, Point};
use crate::layout::LayoutConfig;
use crate::ops::OpError;
use crate::ports::{
    Attachment, AttachmentEnd, AttachmentRegistry, PortChoice, PortResolver, choose_best_ports, find_nearest_port,
    get_port_exit_angle,
};
use crate::render::{
    ConnectorPrimitive, Group, IconVisual, Marker, NodeMeta, NodePrimitive, Primitive, PrimitiveId, RenderTarget,
    RenderTree, TextPrimitive,
};
use crate::routing::{Route, RouteEnd, get_angle_along_path, get_point_along_path, route};
use crate::scene::{CanvasConfig, Connector, Endpoint, MarkerKind, Node, Port, PortPosition, Text};

pub struct Engine<R: RenderTarget = RenderTree> {
    target: R,
    attachments: AttachmentRegistry,
    ports: PortResolver,
    assets: Arc<AssetResolver>,
    config: EngineConfig,
    version: String,
    canvas: CanvasConfig,
    layout: Option<LayoutConfig>,
}

impl Engine<RenderTree> {
    /// An engine drawing into a fresh in-memory [`RenderTree`].
    #[must_use]
    pub fn new(assets: Arc<AssetResolver>, config: EngineConfig) -> Self {
        Self::with_target(RenderTree::new(), assets, config)
    }
}

impl<R: RenderTarget> Engine<R> {
    #[must_use]
    pub fn with_target(target: R, assets: Arc<AssetResolver>, config: EngineConfig) -> Self {
        Self {
            target,
            attachments: AttachmentRegistry::new(),
            ports: PortResolver::new(),
            assets,
            config,
            version: SCENE_VERSION.to_owned(),
            canvas: CanvasConfig::default(),
            layout: None,
        }
    }

    // --- Accessors ---

    #[must_use]
    pub fn target(&self) -> &R {
        &self.target
    }

    #[must_use]
    pub fn attachments(&self) -> &AttachmentRegistry {
        &self.attachments
    }

    #[must_use]
    pub fn port_resolver(&self) -> &PortResolver {
        &self.ports
    }

    #[must_use]
    pub fn assets(&self) -> &Arc<AssetResolver> {
        &self.assets
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Format version of the current document, written back on export.
    #[must_use]
    pub fn document_version(&self) -> &str {
        &self.version
    }

    #[must_use]
    pub fn canvas_config(&self) -> &CanvasConfig {
        &self.canvas
    }

    /// Layout stored with the current document, if it carried one.
    #[must_use]
    pub fn document_layout(&self) -> Option<&LayoutConfig> {
        self.layout.as_ref()
    }

    /// Layout used for nodes that arrive without coordinates.
    #[must_use]
    pub fn effective_layout(&self) -> &LayoutConfig {
        self.layout.as_ref().unwrap_or(&self.config.layout)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.target.group(Group::Nodes).len()
    }

    #[must_use]
    pub fn connector_count(&self) -> usize {
        self.target.group(Group::Connectors).len()
    }

    #[must_use]
    pub fn text_count(&self) -> usize {
        self.target.group(Group::Texts).len()
    }

    /// True when any node, connector or text uses `id`.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.target.lookup(id).is_some()
    }

    // --- Document state ---

    /// Drop every primitive, binding and cached port.
    pub fn clear(&mut self) {
        self.target.clear();
        self.attachments.clear();
        self.ports.clear();
    }

    pub(crate) fn set_document_meta(&mut self, version: String, canvas: CanvasConfig, layout: Option<LayoutConfig>) {
        self.version = version;
        self.canvas = canvas;
        self.layout = layout;
    }

    pub(crate) fn target_mut(&mut self) -> &mut R {
        &mut self.target
    }

    pub(crate) fn attachments_mut(&mut self) -> &mut AttachmentRegistry {
        &mut self.attachments
    }

    pub(crate) fn port_resolver_mut(&mut self) -> &mut PortResolver {
        &mut self.ports
    }

    // =========================================================================
    // PRIMITIVE CONSTRUCTION
    // =========================================================================

    /// Add a node primitive. The node must already be positioned; a missing
    /// coordinate is treated as the origin.
    pub(crate) fn insert_node(&mut self, node: &Node, icon: IconVisual) -> PrimitiveId {
        let geometry = NodeGeometry::new(node.transform().unwrap_or_default(), node.w, node.h);
        let meta = NodeMeta {
            logical_id: node.id.clone(),
            icon_ref: node.icon_ref.clone(),
            ports: node.effective_ports(),
            ports_generated: node.ports.is_empty(),
            label: node.label.clone(),
        };
        self.target.insert(Primitive::Node(NodePrimitive { meta, geometry, icon }))
    }

    /// Add a connector primitive, bind its ends and route it.
    ///
    /// An end naming a port the node does not have falls back to automatic
    /// port choice and records a warning.
    ///
    /// # Errors
    ///
    /// Returns [`OpError::NodeNotFound`] if either end names a missing node.
    pub(crate) fn insert_connector(
        &mut self,
        connector: &Connector,
        warnings: &mut Vec<String>,
    ) -> Result<PrimitiveId, OpError> {
        for end in [&connector.from, &connector.to] {
            if self.target.node(&end.node_id).is_none() {
                return Err(OpError::NodeNotFound(end.node_id.clone()));
            }
        }
        let from = self.bind_end(&connector.id, &connector.from, warnings);
        let to = self.bind_end(&connector.id, &connector.to, warnings);
        self.attachments.register(&connector.id, Attachment { from, to });

        let id = self.target.insert(Primitive::Connector(ConnectorPrimitive {
            logical_id: connector.id.clone(),
            routing_type: connector.routing_type,
            style: connector.style.clone(),
            label: connector.label.clone(),
            route: Route::degenerate(connector.routing_type),
            label_position: None,
            start_marker: None,
            end_marker: None,
        }));
        self.route_connector(&connector.id);
        Ok(id)
    }

    /// Add a connector whose node is missing as an unrouted placeholder.
    ///
    /// Both ends are recorded exactly as written so export reproduces them.
    /// The route stays degenerate until both nodes exist and something
    /// re-routes it.
    pub(crate) fn insert_placeholder_connector(&mut self, connector: &Connector) -> PrimitiveId {
        let as_written = |end: &Endpoint| AttachmentEnd {
            node_id: end.node_id.clone(),
            port_id: end.port_id.clone(),
            pinned: end.port_id.is_some(),
        };
        let attachment = Attachment { from: as_written(&connector.from), to: as_written(&connector.to) };
        self.attachments.register(&connector.id, attachment);
        self.target.insert(Primitive::Connector(ConnectorPrimitive {
            logical_id: connector.id.clone(),
            routing_type: connector.routing_type,
            style: connector.style.clone(),
            label: connector.label.clone(),
            route: Route::degenerate(connector.routing_type),
            label_position: None,
            start_marker: None,
            end_marker: None,
        }))
    }

    pub(crate) fn insert_text(&mut self, text: &Text) -> PrimitiveId {
        self.target.insert(Primitive::Text(TextPrimitive {
            logical_id: text.id.clone(),
            position: Point::new(text.x, text.y),
            content: text.content.clone(),
            style: text.style.clone(),
        }))
    }

    fn bind_end(&self, connector_id: &str, endpoint: &Endpoint, warnings: &mut Vec<String>) -> AttachmentEnd {
        let node_id = endpoint.node_id.clone();
        let Some(port_id) = &endpoint.port_id else {
            return AttachmentEnd { node_id, port_id: None, pinned: false };
        };
        let known = self
            .target
            .node(&node_id)
            .is_some_and(|n| n.meta.ports.iter().any(|p| &p.id == port_id));
        if known {
            AttachmentEnd { node_id, port_id: Some(port_id.clone()), pinned: true }
        } else {
            warnings.push(format!(
                "connector {connector_id}: port {port_id} not found on node {node_id}; using automatic port"
            ));
            AttachmentEnd { node_id, port_id: None, pinned: false }
        }
    }

    // =========================================================================
    // ROUTING
    // =========================================================================

    fn node_frame(&self, node_id: &str) -> Option<(NodeGeometry, Vec<Port>)> {
        self.target
            .node(node_id)
            .map(|n| (n.geometry, n.meta.ports.clone()))
    }

    /// Recompute one connector's path from its current bindings.
    ///
    /// Pinned ends stay on their port. Unpinned ends are re-chosen: both
    /// unpinned → best port pair; one unpinned → the boundary port nearest the
    /// pinned end. Returns `false` if the connector or a node is missing.
    pub(crate) fn route_connector(&mut self, connector_id: &str) -> bool {
        let Some(attachment) = self.attachments.get(connector_id).cloned() else {
            return false;
        };
        let Some(routing_type) = self.target.connector(connector_id).map(|c| c.routing_type) else {
            return false;
        };
        let (Some((ga, pa)), Some((gb, pb))) =
            (self.node_frame(&attachment.from.node_id), self.node_frame(&attachment.to.node_id))
        else {
            return false;
        };

        let pinned_from = self.pinned_choice(&attachment.from, &ga, &pa);
        let pinned_to = self.pinned_choice(&attachment.to, &gb, &pb);
        let (from, to) = match (pinned_from, pinned_to) {
            (Some(a), Some(b)) => (a, b),
            (Some(a), None) => {
                let b = self.nearest_choice(&attachment.to.node_id, &gb, &pb, a.point);
                (a, b)
            }
            (None, Some(b)) => {
                let a = self.nearest_choice(&attachment.from.node_id, &ga, &pa, b.point);
                (a, b)
            }
            (None, None) => {
                let pair = choose_best_ports(&ga, &pa, &gb, &pb);
                (pair.from, pair.to)
            }
        };

        let rebound = Attachment {
            from: rebind(&attachment.from, &from),
            to: rebind(&attachment.to, &to),
        };
        if rebound != attachment {
            self.attachments.register(connector_id, rebound);
        }

        let path = route(routing_type, RouteEnd::new(from.point, from.exit_angle), RouteEnd::new(to.point, to.exit_angle));
        let Some(primitive) = self.target.connector_mut(connector_id) else {
            return false;
        };
        primitive.start_marker = start_marker(primitive.style.start_marker, &path, from.exit_angle);
        primitive.end_marker = end_marker(primitive.style.end_marker, &path, to.exit_angle);
        primitive.label_position = get_point_along_path(&path, LABEL_T);
        primitive.route = path;
        true
    }

    fn pinned_choice(&mut self, end: &AttachmentEnd, geometry: &NodeGeometry, ports: &[Port]) -> Option<PortChoice> {
        if !end.pinned {
            return None;
        }
        let port_id = end.port_id.as_deref()?;
        let resolved = self.ports.resolve(&end.node_id, geometry, ports);
        let hit = resolved.iter().find(|r| r.id == port_id)?;
        Some(PortChoice {
            port_id: Some(hit.id.clone()),
            point: hit.point,
            exit_angle: ports.get(hit.index).and_then(|p| get_port_exit_angle(geometry, p)),
        })
    }

    fn nearest_choice(&mut self, node_id: &str, geometry: &NodeGeometry, ports: &[Port], toward: Point) -> PortChoice {
        let boundary: Vec<_> = self
            .ports
            .resolve(node_id, geometry, ports)
            .iter()
            .filter(|r| r.position.is_compass())
            .cloned()
            .collect();
        if let Some(hit) = find_nearest_port(&boundary, toward) {
            return PortChoice {
                port_id: Some(hit.id.clone()),
                point: hit.point,
                exit_angle: ports.get(hit.index).and_then(|p| get_port_exit_angle(geometry, p)),
            };
        }
        let center = ports.iter().find(|p| p.position == PortPosition::Center);
        PortChoice { port_id: center.map(|p| p.id.clone()), point: geometry.center(), exit_angle: None }
    }

    /// Re-route every connector touching a node whose geometry changed since
    /// the last call. Returns the number of connectors re-routed.
    pub fn process_transform_changes(&mut self) -> usize {
        let changes = self.target.drain_transform_changes();
        if changes.is_empty() {
            return 0;
        }
        let mut affected = BTreeSet::new();
        for change in &changes {
            self.ports.invalidate(&change.node_id);
            affected.extend(self.attachments.connectors_for_node(&change.node_id));
        }
        let rerouted = affected.iter().filter(|id| self.route_connector(id)).count();
        debug!(changes = changes.len(), rerouted, "engine: processed transform changes");
        rerouted
    }
}

fn rebind(end: &AttachmentEnd, choice: &PortChoice) -> AttachmentEnd {
    if end.pinned {
        return end.clone();
    }
    AttachmentEnd { node_id: end.node_id.clone(), port_id: choice.port_id.clone(), pinned: false }
}

/// Wrap an angle into `(-π, π]`.
fn normalize_angle(angle: f64) -> f64 {
    angle.sin().atan2(angle.cos())
}

/// Start marker points back into the source node.
fn start_marker(kind: MarkerKind, path: &Route, exit_angle: Option<f64>) -> Option<Marker> {
    if kind == MarkerKind::None {
        return None;
    }
    let (point, _) = path.endpoints()?;
    let angle = exit_angle.or_else(|| get_angle_along_path(path, 0.0))? + PI;
    Some(Marker { kind, point, angle: normalize_angle(angle) })
}

/// End marker points along the direction of arrival.
fn end_marker(kind: MarkerKind, path: &Route, exit_angle: Option<f64>) -> Option<Marker> {
    if kind == MarkerKind::None {
        return None;
    }
    let (_, point) = path.endpoints()?;
    let angle = match exit_angle {
        Some(outward) => outward + PI,
        None => get_angle_along_path(path, 1.0)?,
    };
    Some(Marker { kind, point, angle: normalize_angle(angle) })
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use crate::assets::{Asset, AssetService, MemoryAssetService};

    /// An icon whose `viewBox` has the given size.
    #[must_use]
    pub fn icon(id: &str, width: f64, height: f64) -> Asset {
        Asset {
            id: id.into(),
            name: id.into(),
            vector_markup: format!(r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {width} {height}"/>"#),
            thumbnail: None,
            category: Some("network".into()),
        }
    }

    /// A small catalogue: `square` (1:1), `wide` (2:1) and `tile` (1:1).
    #[must_use]
    pub fn catalogue() -> Arc<MemoryAssetService> {
        Arc::new(MemoryAssetService::new([
            icon("square", 100.0, 100.0),
            icon("wide", 200.0, 100.0),
            icon("tile", 50.0, 50.0),
        ]))
    }

    /// An engine over [`catalogue`] with default config.
    #[must_use]
    pub fn test_engine() -> Engine {
        test_engine_with(catalogue(), EngineConfig::default())
    }

    #[must_use]
    pub fn test_engine_with(service: Arc<MemoryAssetService>, config: EngineConfig) -> Engine {
        let resolver = AssetResolver::new(service as Arc<dyn AssetService>);
        Engine::new(Arc::new(resolver), config)
    }
}
