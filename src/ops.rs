//! Operations manager: single-entity and batch mutation commands.
//!
//! DESIGN
//! ======
//! Every command validates its target before touching anything, so a failed
//! command leaves the render tree, the attachment registry and the port
//! cache exactly as they were. Transform and size edits go through the
//! render target's versioned geometry; the resulting notifications re-route
//! only the connectors attached to the edited node.
//!
//! Batches are NOT transactional: operations run in order, each one's
//! mutations stay applied whether or not later ones fail, and the caller
//! gets one [`OpResult`] per operation.

#[cfg(test)]
#[path = "ops_test.rs"]
mod ops_test;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assets::AssetError;
use crate::engine::Engine;
use crate::error::ErrorCode;
use crate::export::node_record;
use crate::layout::{LayoutAlgorithm, apply_layout};
use crate::ports::{Attachment, AttachmentEnd, ConnectorEnd};
use crate::render::{Group, IconVisual, Primitive, RenderTarget};
use crate::routing::RoutingType;
use crate::scene::{Connector, ConnectorStyle, Endpoint, Node, Text, generate_id};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OpError {
    #[error("node not found")]
    NodeNotFound(String),
    #[error("connector not found")]
    ConnectorNotFound(String),
    #[error("text not found")]
    TextNotFound(String),
    #[error("port not found")]
    PortNotFound { node_id: String, port_id: String },
    #[error("duplicate id: {0}")]
    DuplicateId(String),
    #[error("icon not found: {0}")]
    IconNotFound(String),
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("asset lookup failed: {0}")]
    Asset(#[from] AssetError),
}

impl ErrorCode for OpError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NodeNotFound(_) => "E_NODE_NOT_FOUND",
            Self::ConnectorNotFound(_) => "E_CONNECTOR_NOT_FOUND",
            Self::TextNotFound(_) => "E_TEXT_NOT_FOUND",
            Self::PortNotFound { .. } => "E_PORT_NOT_FOUND",
            Self::DuplicateId(_) => "E_DUPLICATE_ID",
            Self::IconNotFound(_) => "E_ICON_NOT_FOUND",
            Self::InvalidGeometry(_) => "E_INVALID_GEOMETRY",
            Self::Asset(e) => e.error_code(),
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Asset(e) => e.retryable(),
            _ => false,
        }
    }
}

/// Sparse node update. Only present fields are applied.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub w: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub h: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

/// One command of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Operation {
    AddNode {
        node: Node,
    },
    RemoveNode {
        id: String,
    },
    UpdateNode {
        id: String,
        patch: NodePatch,
    },
    AddConnector {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
        from: Endpoint,
        to: Endpoint,
        /// Engine default when absent.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        routing_type: Option<RoutingType>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        style: Option<ConnectorStyle>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    RemoveConnector {
        id: String,
    },
    AddText {
        text: Text,
    },
    RemoveText {
        id: String,
    },
    ReplaceIcon {
        node_id: String,
        icon_ref: String,
    },
    ReattachConnector {
        id: String,
        end: ConnectorEnd,
        port_id: String,
    },
}

/// Outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpResult {
    pub success: bool,
    /// Id of the entity the command created or touched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
}

impl OpResult {
    #[must_use]
    pub fn ok(id: impl Into<String>) -> Self {
        Self { success: true, id: Some(id.into()), error: None, code: None }
    }

    #[must_use]
    pub fn failed(error: &OpError) -> Self {
        Self { success: false, id: None, error: Some(error.to_string()), code: Some(error.error_code()) }
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

fn check_finite(name: &str, value: f64) -> Result<(), OpError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(OpError::InvalidGeometry(format!("{name} must be finite")))
    }
}

fn check_positive(name: &str, value: f64) -> Result<(), OpError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(OpError::InvalidGeometry(format!("{name} must be positive")))
    }
}

fn check_node(node: &Node) -> Result<(), OpError> {
    check_positive("w", node.w)?;
    check_positive("h", node.h)?;
    check_positive("scale", node.scale)?;
    check_finite("rotation", node.rotation)?;
    if let Some(x) = node.x {
        check_finite("x", x)?;
    }
    if let Some(y) = node.y {
        check_finite("y", y)?;
    }
    Ok(())
}

fn check_patch(patch: &NodePatch) -> Result<(), OpError> {
    for (name, value) in [("x", patch.x), ("y", patch.y), ("rotation", patch.rotation)] {
        if let Some(v) = value {
            check_finite(name, v)?;
        }
    }
    for (name, value) in [("w", patch.w), ("h", patch.h), ("scale", patch.scale)] {
        if let Some(v) = value {
            check_positive(name, v)?;
        }
    }
    Ok(())
}

// =============================================================================
// COMMANDS
// =============================================================================

impl<R: RenderTarget> Engine<R> {
    fn ensure_unused(&self, id: &str) -> Result<(), OpError> {
        if self.contains(id) {
            return Err(OpError::DuplicateId(id.to_owned()));
        }
        Ok(())
    }

    /// Resolve a node's icon reference, degrading to a placeholder.
    pub(crate) async fn icon_visual(&self, icon_ref: Option<&str>) -> IconVisual {
        let Some(icon_ref) = icon_ref else {
            return IconVisual::None;
        };
        let assets = Arc::clone(self.assets());
        match assets.resolve(icon_ref).await {
            Ok(Some(asset)) => IconVisual::Asset(asset),
            Ok(None) => {
                warn!(%icon_ref, "ops: icon not found; using placeholder");
                IconVisual::Placeholder(icon_ref.to_owned())
            }
            Err(e) => {
                warn!(%icon_ref, error = %e, "ops: icon lookup failed; using placeholder");
                IconVisual::Placeholder(icon_ref.to_owned())
            }
        }
    }

    // --- Nodes ---

    /// Add a node. An empty id is replaced with a generated one; a node
    /// without coordinates is placed by the engine's layout. An icon that
    /// does not resolve is drawn as a placeholder.
    ///
    /// # Errors
    ///
    /// `DuplicateId` if the id is taken, `InvalidGeometry` for non-positive
    /// size or scale or non-finite coordinates.
    pub async fn add_node(&mut self, node: Node) -> Result<String, OpError> {
        let mut node = node;
        if node.id.is_empty() {
            node.id = generate_id("node");
        }
        self.ensure_unused(&node.id)?;
        check_node(&node)?;

        if !node.is_positioned() {
            node = self.place_after_existing(node);
        }

        let icon = self.icon_visual(node.icon_ref.as_deref()).await;
        self.insert_node(&node, icon);
        // Placeholder connectors waiting on this id can route now.
        for connector_id in self.attachments().connectors_for_node(&node.id) {
            self.route_connector(&connector_id);
        }
        info!(node_id = %node.id, "ops: node added");
        Ok(node.id)
    }

    /// Lay out `node` as the next entry after the nodes already on the canvas.
    ///
    /// Slot-based algorithms see the existing nodes as unpositioned so that
    /// they consume the leading slots; force layout keeps them as fixed
    /// anchors that push the new node away.
    fn place_after_existing(&self, node: Node) -> Node {
        let config = self.effective_layout();
        let keep_positions = config.algorithm == LayoutAlgorithm::Force;
        let mut nodes: Vec<Node> = self
            .target()
            .group(Group::Nodes)
            .into_iter()
            .filter_map(|id| match self.target().get(id) {
                Some(Primitive::Node(existing)) => Some(node_record(existing)),
                _ => None,
            })
            .map(|existing| if keep_positions { existing } else { Node { x: None, y: None, ..existing } })
            .collect();
        nodes.push(node.clone());

        apply_layout(&nodes, &[], config).nodes.pop().unwrap_or(node)
    }

    /// Remove a node and every connector attached to it. Returns the ids of
    /// the removed connectors.
    ///
    /// # Errors
    ///
    /// `NodeNotFound` if `id` is not a node.
    pub fn remove_node(&mut self, id: &str) -> Result<Vec<String>, OpError> {
        let Some(primitive) = self.target().lookup(id).filter(|_| self.target().node(id).is_some()) else {
            return Err(OpError::NodeNotFound(id.to_owned()));
        };
        let cascaded = self.attachments().connectors_for_node(id);
        for connector_id in &cascaded {
            self.detach_connector(connector_id);
        }
        self.port_resolver_mut().forget(id);
        self.target_mut().remove(primitive);
        info!(node_id = %id, cascaded = cascaded.len(), "ops: node removed");
        Ok(cascaded)
    }

    /// Apply a sparse update to a node. Transform or size changes re-route
    /// the connectors attached to it.
    ///
    /// # Errors
    ///
    /// `NodeNotFound` if `id` is not a node, `InvalidGeometry` for
    /// non-positive size or scale or non-finite coordinates.
    pub fn update_node(&mut self, id: &str, patch: &NodePatch) -> Result<(), OpError> {
        let geometry = self
            .target()
            .node(id)
            .map(|n| n.geometry)
            .ok_or_else(|| OpError::NodeNotFound(id.to_owned()))?;
        check_patch(patch)?;

        if let Some(label) = &patch.label {
            if let Some(node) = self.target_mut().node_mut(id) {
                node.meta.label = Some(label.clone());
            }
        }

        let current = geometry.transform;
        let mut transform = current;
        transform.x = patch.x.unwrap_or(current.x);
        transform.y = patch.y.unwrap_or(current.y);
        transform.rotation = patch.rotation.unwrap_or(current.rotation);
        transform.scale = patch.scale.unwrap_or(current.scale);
        if transform != current {
            self.target_mut().set_node_transform(id, transform);
        }

        let width = patch.w.unwrap_or(geometry.width);
        let height = patch.h.unwrap_or(geometry.height);
        if (width, height) != (geometry.width, geometry.height) {
            self.target_mut().set_node_size(id, width, height);
        }

        let rerouted = self.process_transform_changes();
        info!(node_id = %id, rerouted, "ops: node updated");
        Ok(())
    }

    /// Swap a node's icon. When the new icon's aspect ratio differs from the
    /// old one by more than the configured tolerance, the node height is
    /// re-derived from its width and attached connectors are re-routed.
    /// Returns whether the node was resized.
    ///
    /// # Errors
    ///
    /// `NodeNotFound`, `IconNotFound` if the reference does not resolve, or
    /// `Asset` if the lookup itself fails.
    pub async fn replace_icon(&mut self, node_id: &str, icon_ref: &str) -> Result<bool, OpError> {
        let (geometry, old_aspect) = {
            let node = self
                .target()
                .node(node_id)
                .ok_or_else(|| OpError::NodeNotFound(node_id.to_owned()))?;
            let box_aspect = node.geometry.width / node.geometry.height;
            (node.geometry, node.icon.aspect_ratio().unwrap_or(box_aspect))
        };

        let assets = Arc::clone(self.assets());
        let asset = assets
            .resolve(icon_ref)
            .await?
            .ok_or_else(|| OpError::IconNotFound(icon_ref.to_owned()))?;
        let new_aspect = asset.aspect_ratio();

        if let Some(node) = self.target_mut().node_mut(node_id) {
            node.icon = IconVisual::Asset(asset);
            node.meta.icon_ref = Some(icon_ref.to_owned());
        }

        let tolerance = self.config().aspect_tolerance;
        let resized = match new_aspect {
            Some(aspect) if (aspect - old_aspect).abs() / old_aspect > tolerance => {
                let height = geometry.width / aspect;
                self.target_mut().set_node_size(node_id, geometry.width, height);
                self.port_resolver_mut().invalidate(node_id);
                self.process_transform_changes();
                true
            }
            _ => false,
        };
        info!(%node_id, %icon_ref, resized, "ops: icon replaced");
        Ok(resized)
    }

    // --- Connectors ---

    /// Add a connector. An empty id is replaced with a generated one.
    ///
    /// # Errors
    ///
    /// `DuplicateId`, `NodeNotFound` if either end names a missing node, or
    /// `PortNotFound` if an end names a port its node does not have.
    pub fn add_connector(&mut self, connector: Connector) -> Result<String, OpError> {
        let mut connector = connector;
        if connector.id.is_empty() {
            connector.id = generate_id("conn");
        }
        self.ensure_unused(&connector.id)?;
        for end in [&connector.from, &connector.to] {
            let node = self
                .target()
                .node(&end.node_id)
                .ok_or_else(|| OpError::NodeNotFound(end.node_id.clone()))?;
            if let Some(port_id) = &end.port_id {
                if !node.meta.ports.iter().any(|p| &p.id == port_id) {
                    return Err(OpError::PortNotFound { node_id: end.node_id.clone(), port_id: port_id.clone() });
                }
            }
        }

        let mut warnings = Vec::new();
        self.insert_connector(&connector, &mut warnings)?;
        info!(connector_id = %connector.id, "ops: connector added");
        Ok(connector.id)
    }

    /// # Errors
    ///
    /// `ConnectorNotFound` if `id` is not a connector.
    pub fn remove_connector(&mut self, id: &str) -> Result<(), OpError> {
        if self.target().connector(id).is_none() {
            return Err(OpError::ConnectorNotFound(id.to_owned()));
        }
        self.detach_connector(id);
        info!(connector_id = %id, "ops: connector removed");
        Ok(())
    }

    /// Pin one end of a connector to a port and re-route it; the
    /// programmatic form of dragging an end onto a port.
    ///
    /// # Errors
    ///
    /// `ConnectorNotFound`, or `PortNotFound` if the end's node has no such
    /// port.
    pub fn reattach_connector(&mut self, id: &str, end: ConnectorEnd, port_id: &str) -> Result<(), OpError> {
        let attachment = self
            .attachments()
            .get(id)
            .cloned()
            .ok_or_else(|| OpError::ConnectorNotFound(id.to_owned()))?;
        let node_id = attachment.end(end).node_id.clone();
        let known = self
            .target()
            .node(&node_id)
            .is_some_and(|n| n.meta.ports.iter().any(|p| p.id == port_id));
        if !known {
            return Err(OpError::PortNotFound { node_id, port_id: port_id.to_owned() });
        }

        let bound = AttachmentEnd { node_id, port_id: Some(port_id.to_owned()), pinned: true };
        let next = match end {
            ConnectorEnd::From => Attachment { from: bound, ..attachment },
            ConnectorEnd::To => Attachment { to: bound, ..attachment },
        };
        self.attachments_mut().register(id, next);
        self.route_connector(id);
        info!(connector_id = %id, ?end, %port_id, "ops: connector reattached");
        Ok(())
    }

    fn detach_connector(&mut self, id: &str) {
        self.attachments_mut().deregister(id);
        if let Some(primitive) = self.target().lookup(id) {
            self.target_mut().remove(primitive);
        }
    }

    // --- Texts ---

    /// Add a text annotation. An empty id is replaced with a generated one.
    ///
    /// # Errors
    ///
    /// `DuplicateId`, or `InvalidGeometry` for non-finite coordinates.
    pub fn add_text(&mut self, text: Text) -> Result<String, OpError> {
        let mut text = text;
        if text.id.is_empty() {
            text.id = generate_id("text");
        }
        self.ensure_unused(&text.id)?;
        check_finite("x", text.x)?;
        check_finite("y", text.y)?;
        self.insert_text(&text);
        info!(text_id = %text.id, "ops: text added");
        Ok(text.id)
    }

    /// # Errors
    ///
    /// `TextNotFound` if `id` is not a text.
    pub fn remove_text(&mut self, id: &str) -> Result<(), OpError> {
        let primitive = self
            .target()
            .lookup(id)
            .filter(|p| matches!(self.target().get(*p), Some(Primitive::Text(_))))
            .ok_or_else(|| OpError::TextNotFound(id.to_owned()))?;
        self.target_mut().remove(primitive);
        info!(text_id = %id, "ops: text removed");
        Ok(())
    }

    // =========================================================================
    // DISPATCH
    // =========================================================================

    /// Run one command and fold its outcome into an [`OpResult`].
    pub async fn execute(&mut self, operation: Operation) -> OpResult {
        let result = match operation {
            Operation::AddNode { node } => self.add_node(node).await,
            Operation::RemoveNode { id } => self.remove_node(&id).map(|_| id),
            Operation::UpdateNode { id, patch } => self.update_node(&id, &patch).map(|()| id),
            Operation::AddConnector { id, from, to, routing_type, style, label } => {
                let mut connector = Connector::new(
                    id.unwrap_or_default(),
                    from,
                    to,
                    routing_type.unwrap_or(self.config().routing),
                );
                connector.style = style.unwrap_or_default();
                connector.label = label;
                self.add_connector(connector)
            }
            Operation::RemoveConnector { id } => self.remove_connector(&id).map(|()| id),
            Operation::AddText { text } => self.add_text(text),
            Operation::RemoveText { id } => self.remove_text(&id).map(|()| id),
            Operation::ReplaceIcon { node_id, icon_ref } => self.replace_icon(&node_id, &icon_ref).await.map(|_| node_id),
            Operation::ReattachConnector { id, end, port_id } => self.reattach_connector(&id, end, &port_id).map(|()| id),
        };
        match result {
            Ok(id) => OpResult::ok(id),
            Err(e) => {
                warn!(error = %e, code = e.error_code(), "ops: operation failed");
                OpResult::failed(&e)
            }
        }
    }

    /// Run commands in order. Not transactional: a failure does not undo
    /// earlier commands or stop later ones.
    pub async fn execute_batch(&mut self, operations: Vec<Operation>) -> Vec<OpResult> {
        let total = operations.len();
        let mut results = Vec::with_capacity(total);
        for operation in operations {
            results.push(self.execute(operation).await);
        }
        let failed = results.iter().filter(|r| !r.success).count();
        info!(total, failed, "ops: batch executed");
        results
    }
}
