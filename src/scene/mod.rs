//! Scene schema: the portable document of nodes, connectors and texts.
//!
//! DESIGN
//! ======
//! The `Scene` is the only artifact written to storage, files or the network.
//! Everything else (render primitives, resolved ports, attachment bindings)
//! is derived from it at import time and folded back into it at export time.
//! JSON keys are camelCase; every optional field has a serde default so that
//! sparse hand-written documents parse.

pub mod validate;

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;

use serde::{Deserialize, Serialize};

use crate::consts::{DEFAULT_CANVAS_HEIGHT, DEFAULT_CANVAS_WIDTH, DEFAULT_NODE_SIZE, SCENE_VERSION};
use crate::geometry::{Point, Transform};
use crate::layout::LayoutConfig;
use crate::routing::RoutingType;

pub use validate::{SceneError, ValidationReport, generate_default_ports, generate_id, parse, validate};

// =============================================================================
// SCENE
// =============================================================================

/// The persisted logical document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub version: String,
    #[serde(default)]
    pub canvas_config: CanvasConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<LayoutConfig>,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub connectors: Vec<Connector>,
    #[serde(default)]
    pub texts: Vec<Text>,
}

impl Scene {
    /// Create an empty scene at the current format version.
    #[must_use]
    pub fn empty(canvas_config: CanvasConfig) -> Self {
        Self {
            version: SCENE_VERSION.to_owned(),
            canvas_config,
            layout: None,
            nodes: Vec::new(),
            connectors: Vec::new(),
            texts: Vec::new(),
        }
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    #[must_use]
    pub fn connector(&self, id: &str) -> Option<&Connector> {
        self.connectors.iter().find(|c| c.id == id)
    }

    #[must_use]
    pub fn text(&self, id: &str) -> Option<&Text> {
        self.texts.iter().find(|t| t.id == id)
    }

    /// Serialize as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns `SceneError::Json` if serialization fails (non-finite floats).
    pub fn to_json(&self) -> Result<String, SceneError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Canvas extent and background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CanvasConfig {
    pub width: f64,
    pub height: f64,
    pub background: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid_size: Option<f64>,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_CANVAS_WIDTH,
            height: DEFAULT_CANVAS_HEIGHT,
            background: "#FFFFFF".to_owned(),
            grid_size: None,
        }
    }
}

// =============================================================================
// NODE
// =============================================================================

fn default_node_size() -> f64 {
    DEFAULT_NODE_SIZE
}

fn default_scale() -> f64 {
    1.0
}

/// A positioned, sizable, rotatable entity.
///
/// A node lacking either coordinate is unpositioned and gets placed by
/// layout during import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f64>,
    #[serde(default = "default_node_size")]
    pub w: f64,
    #[serde(default = "default_node_size")]
    pub h: f64,
    /// Clockwise rotation in degrees around the box center.
    #[serde(default)]
    pub rotation: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<Port>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Node {
    /// A default-sized node at `(x, y)` with no ports.
    #[must_use]
    pub fn new(id: impl Into<String>, x: f64, y: f64) -> Self {
        Self { x: Some(x), y: Some(y), ..Self::unpositioned(id) }
    }

    /// A default-sized node waiting for layout.
    #[must_use]
    pub fn unpositioned(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            x: None,
            y: None,
            w: DEFAULT_NODE_SIZE,
            h: DEFAULT_NODE_SIZE,
            rotation: 0.0,
            scale: 1.0,
            icon_ref: None,
            ports: Vec::new(),
            label: None,
        }
    }

    /// Both coordinates, if the node carries them.
    #[must_use]
    pub fn position(&self) -> Option<(f64, f64)> {
        self.x.zip(self.y)
    }

    #[must_use]
    pub fn is_positioned(&self) -> bool {
        self.position().is_some()
    }

    /// Render transform, or `None` when unpositioned.
    #[must_use]
    pub fn transform(&self) -> Option<Transform> {
        let (x, y) = self.position()?;
        Some(Transform { x, y, rotation: self.rotation, scale: self.scale })
    }

    /// Declared ports, or the synthesized compass set when none are declared.
    #[must_use]
    pub fn effective_ports(&self) -> Vec<Port> {
        if self.ports.is_empty() {
            generate_default_ports(self)
        } else {
            self.ports.clone()
        }
    }
}

// =============================================================================
// PORT
// =============================================================================

/// Named anchor of a port on its node box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortPosition {
    Top,
    Right,
    Bottom,
    Left,
    Center,
    Custom,
}

impl PortPosition {
    /// The four boundary anchors, in the order ports are evaluated.
    pub const COMPASS: [PortPosition; 4] = [Self::Top, Self::Right, Self::Bottom, Self::Left];

    #[must_use]
    pub fn is_compass(self) -> bool {
        Self::COMPASS.contains(&self)
    }

    /// Outward unit normal in node-local space, for boundary anchors.
    #[must_use]
    pub fn normal(self) -> Option<Point> {
        match self {
            Self::Top => Some(Point::new(0.0, -1.0)),
            Self::Right => Some(Point::new(1.0, 0.0)),
            Self::Bottom => Some(Point::new(0.0, 1.0)),
            Self::Left => Some(Point::new(-1.0, 0.0)),
            Self::Center | Self::Custom => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Top => "top",
            Self::Right => "right",
            Self::Bottom => "bottom",
            Self::Left => "left",
            Self::Center => "center",
            Self::Custom => "custom",
        }
    }
}

/// An attachment point on a node. Never persisted outside its node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub id: String,
    #[serde(rename = "positionName")]
    pub position: PortPosition,
    /// Extra displacement in the node's local, unscaled frame.
    #[serde(default)]
    pub offset: Point,
}

impl Port {
    #[must_use]
    pub fn new(id: impl Into<String>, position: PortPosition) -> Self {
        Self { id: id.into(), position, offset: Point::default() }
    }
}

// =============================================================================
// CONNECTOR
// =============================================================================

/// One end of a connector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_id: Option<String>,
}

impl Endpoint {
    #[must_use]
    pub fn node(node_id: impl Into<String>) -> Self {
        Self { node_id: node_id.into(), port_id: None }
    }

    #[must_use]
    pub fn port(node_id: impl Into<String>, port_id: impl Into<String>) -> Self {
        Self { node_id: node_id.into(), port_id: Some(port_id.into()) }
    }
}

/// Arrowhead style at a connector end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    #[default]
    None,
    Arrow,
    Circle,
    Diamond,
}

/// Stroke and marker styling of a connector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectorStyle {
    pub stroke: String,
    pub stroke_width: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dash: Option<String>,
    pub start_marker: MarkerKind,
    pub end_marker: MarkerKind,
}

impl Default for ConnectorStyle {
    fn default() -> Self {
        Self {
            stroke: "#1F1A17".to_owned(),
            stroke_width: 1.5,
            dash: None,
            start_marker: MarkerKind::None,
            end_marker: MarkerKind::Arrow,
        }
    }
}

/// An edge between two nodes, optionally pinned to explicit ports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connector {
    pub id: String,
    pub from: Endpoint,
    pub to: Endpoint,
    #[serde(default)]
    pub routing_type: RoutingType,
    #[serde(default)]
    pub style: ConnectorStyle,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl Connector {
    #[must_use]
    pub fn new(id: impl Into<String>, from: Endpoint, to: Endpoint, routing_type: RoutingType) -> Self {
        Self { id: id.into(), from, to, routing_type, style: ConnectorStyle::default(), label: None }
    }

    /// True if either end names `node_id`.
    #[must_use]
    pub fn touches(&self, node_id: &str) -> bool {
        self.from.node_id == node_id || self.to.node_id == node_id
    }
}

// =============================================================================
// TEXT
// =============================================================================

/// Font styling of a free text annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TextStyle {
    pub font_size: f64,
    pub color: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_family: Option<String>,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self { font_size: 16.0, color: "#1F1A17".to_owned(), font_family: None }
    }
}

/// Independent annotation primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Text {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub content: String,
    #[serde(default)]
    pub style: TextStyle,
}

impl Text {
    #[must_use]
    pub fn new(id: impl Into<String>, x: f64, y: f64, content: impl Into<String>) -> Self {
        Self { id: id.into(), x, y, content: content.into(), style: TextStyle::default() }
    }
}
