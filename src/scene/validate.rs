//! Structural and referential validation of candidate scene documents.
//!
//! DESIGN
//! ======
//! Validation runs over raw `serde_json::Value` so that every problem in a
//! document is reported at once with a path (`nodes[2].w`), instead of
//! stopping at the first serde failure. Structural problems (wrong types,
//! missing required fields, duplicate ids) are errors; referential problems
//! (a connector naming a missing node or port) are warnings, because import
//! degrades those to placeholders rather than aborting.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::{MarkerKind, Node, Port, PortPosition, Scene};
use crate::error::ErrorCode;
use crate::layout::LayoutConfig;
use crate::routing::RoutingType;

// =============================================================================
// TYPES
// =============================================================================

/// Outcome of validating a candidate document. Never thrown.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("scene failed validation with {} error(s): {}", .0.errors.len(), .0.errors.join("; "))]
    Invalid(ValidationReport),
}

impl ErrorCode for SceneError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Json(_) => "E_SCENE_JSON",
            Self::Invalid(_) => "E_SCENE_INVALID",
        }
    }
}

// =============================================================================
// IDS AND DEFAULT PORTS
// =============================================================================

/// Generate a collision-resistant id such as `node-3f2a…`.
#[must_use]
pub fn generate_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4().simple())
}

/// Four compass ports plus a center port, with zero offset.
///
/// Port ids equal the anchor name (`top`, `right`, …), which is unique per
/// node and stable across imports.
#[must_use]
pub fn generate_default_ports(_node: &Node) -> Vec<Port> {
    PortPosition::COMPASS
        .iter()
        .copied()
        .chain(std::iter::once(PortPosition::Center))
        .map(|position| Port::new(position.as_str(), position))
        .collect()
}

// =============================================================================
// PARSE
// =============================================================================

/// Parse and validate a JSON document into a typed scene.
///
/// # Errors
///
/// Returns `SceneError::Json` when the text is not JSON or does not match the
/// typed schema, and `SceneError::Invalid` when structural validation fails.
pub fn parse(json: &str) -> Result<Scene, SceneError> {
    let value: Value = serde_json::from_str(json)?;
    let (scene, _report) = parse_value(value)?;
    Ok(scene)
}

/// Validate a JSON value and convert it, keeping the report's warnings.
///
/// # Errors
///
/// Same as [`parse`].
pub fn parse_value(value: Value) -> Result<(Scene, ValidationReport), SceneError> {
    let report = validate(&value);
    if !report.valid {
        return Err(SceneError::Invalid(report));
    }
    let scene = serde_json::from_value(value)?;
    Ok((scene, report))
}

// =============================================================================
// VALIDATE
// =============================================================================

/// Validate a candidate document without throwing.
#[must_use]
pub fn validate(value: &Value) -> ValidationReport {
    let mut v = Validator::default();
    v.scene(value);
    ValidationReport { valid: v.errors.is_empty(), errors: v.errors, warnings: v.warnings }
}

#[derive(Default)]
struct Validator {
    errors: Vec<String>,
    warnings: Vec<String>,
    /// Every node/connector/text id seen so far; ids share one namespace.
    ids: HashSet<String>,
    /// Node id → port ids a connector may name.
    node_ports: HashMap<String, HashSet<String>>,
}

impl Validator {
    fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn scene(&mut self, value: &Value) {
        let Some(obj) = value.as_object() else {
            self.error("scene: expected a JSON object");
            return;
        };

        match obj.get("version") {
            Some(Value::String(version)) => {
                if !version.starts_with("1.") && version != "1" {
                    self.warn(format!("version: unrecognized version `{version}`, reading as 1.x"));
                }
            }
            Some(_) => self.error("version: expected string"),
            None => self.error("version: missing required field"),
        }

        if let Some(canvas) = obj.get("canvasConfig") {
            self.canvas(canvas);
        }

        if let Some(layout) = obj.get("layout").filter(|l| !l.is_null()) {
            if let Err(e) = serde_json::from_value::<LayoutConfig>(layout.clone()) {
                self.error(format!("layout: {e}"));
            }
        }

        match obj.get("nodes") {
            Some(Value::Array(nodes)) => {
                for (i, node) in nodes.iter().enumerate() {
                    self.node(i, node);
                }
            }
            Some(_) => self.error("nodes: expected array"),
            None => self.error("nodes: missing required field"),
        }

        match obj.get("connectors") {
            Some(Value::Array(connectors)) => {
                for (i, connector) in connectors.iter().enumerate() {
                    self.connector(i, connector);
                }
            }
            Some(_) => self.error("connectors: expected array"),
            None => {}
        }

        match obj.get("texts") {
            Some(Value::Array(texts)) => {
                for (i, text) in texts.iter().enumerate() {
                    self.text(i, text);
                }
            }
            Some(_) => self.error("texts: expected array"),
            None => {}
        }
    }

    fn canvas(&mut self, value: &Value) {
        let Some(obj) = value.as_object() else {
            self.error("canvasConfig: expected object");
            return;
        };
        for key in ["width", "height"] {
            if let Some(field) = obj.get(key) {
                if !is_positive(field) {
                    self.error(format!("canvasConfig.{key}: expected positive number"));
                }
            }
        }
        if obj.get("background").is_some_and(|b| !b.is_string()) {
            self.error("canvasConfig.background: expected string");
        }
        if obj.get("gridSize").is_some_and(|g| !g.is_null() && !is_positive(g)) {
            self.error("canvasConfig.gridSize: expected positive number");
        }
    }

    /// Check an entity id and claim it in the shared namespace.
    fn claim_id(&mut self, path: &str, obj: &serde_json::Map<String, Value>) -> Option<String> {
        match obj.get("id") {
            Some(Value::String(id)) if !id.is_empty() => {
                if !self.ids.insert(id.clone()) {
                    self.error(format!("{path}.id: duplicate id `{id}`"));
                }
                Some(id.clone())
            }
            Some(Value::String(_)) => {
                self.error(format!("{path}.id: must not be empty"));
                None
            }
            Some(_) => {
                self.error(format!("{path}.id: expected string"));
                None
            }
            None => {
                self.error(format!("{path}.id: missing required field"));
                None
            }
        }
    }

    fn node(&mut self, index: usize, value: &Value) {
        let path = format!("nodes[{index}]");
        let Some(obj) = value.as_object() else {
            self.error(format!("{path}: expected object"));
            return;
        };
        let id = self.claim_id(&path, obj);

        for key in ["x", "y"] {
            if let Some(field) = obj.get(key) {
                if !field.is_null() && !is_finite_number(field) {
                    self.error(format!("{path}.{key}: expected number"));
                }
            }
        }
        for key in ["w", "h", "scale"] {
            if let Some(field) = obj.get(key) {
                if !is_positive(field) {
                    self.error(format!("{path}.{key}: expected positive number"));
                }
            }
        }
        if obj.get("rotation").is_some_and(|r| !is_finite_number(r)) {
            self.error(format!("{path}.rotation: expected number"));
        }
        for key in ["iconRef", "label"] {
            if obj.get(key).is_some_and(|f| !f.is_null() && !f.is_string()) {
                self.error(format!("{path}.{key}: expected string"));
            }
        }

        let mut port_ids = HashSet::new();
        match obj.get("ports") {
            Some(Value::Array(ports)) if !ports.is_empty() => {
                for (pi, port) in ports.iter().enumerate() {
                    self.port(&format!("{path}.ports[{pi}]"), port, &mut port_ids);
                }
            }
            Some(Value::Array(_)) | None => {
                port_ids.extend(
                    PortPosition::COMPASS
                        .iter()
                        .chain(std::iter::once(&PortPosition::Center))
                        .map(|p| p.as_str().to_owned()),
                );
            }
            Some(_) => self.error(format!("{path}.ports: expected array")),
        }

        if let Some(id) = id {
            self.node_ports.insert(id, port_ids);
        }
    }

    fn port(&mut self, path: &str, value: &Value, seen: &mut HashSet<String>) {
        let Some(obj) = value.as_object() else {
            self.error(format!("{path}: expected object"));
            return;
        };
        match obj.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => {
                if !seen.insert(id.to_owned()) {
                    self.error(format!("{path}.id: duplicate port id `{id}`"));
                }
            }
            _ => self.error(format!("{path}.id: expected non-empty string")),
        }
        match obj.get("positionName") {
            Some(position) => {
                if serde_json::from_value::<PortPosition>(position.clone()).is_err() {
                    self.error(format!("{path}.positionName: expected compass name, `center` or `custom`"));
                }
            }
            None => self.error(format!("{path}.positionName: missing required field")),
        }
        if let Some(offset) = obj.get("offset") {
            let ok = offset
                .as_object()
                .is_some_and(|o| o.get("x").is_some_and(is_finite_number) && o.get("y").is_some_and(is_finite_number));
            if !ok {
                self.error(format!("{path}.offset: expected {{x, y}} numbers"));
            }
        }
    }

    fn connector(&mut self, index: usize, value: &Value) {
        let path = format!("connectors[{index}]");
        let Some(obj) = value.as_object() else {
            self.error(format!("{path}: expected object"));
            return;
        };
        self.claim_id(&path, obj);

        for end in ["from", "to"] {
            self.endpoint(&format!("{path}.{end}"), obj.get(end));
        }

        if let Some(routing) = obj.get("routingType") {
            if serde_json::from_value::<RoutingType>(routing.clone()).is_err() {
                self.error(format!("{path}.routingType: expected `straight`, `orthogonal` or `curved`"));
            }
        }
        if let Some(style) = obj.get("style") {
            self.connector_style(&format!("{path}.style"), style);
        }
        if obj.get("label").is_some_and(|f| !f.is_null() && !f.is_string()) {
            self.error(format!("{path}.label: expected string"));
        }
    }

    fn endpoint(&mut self, path: &str, value: Option<&Value>) {
        let Some(value) = value else {
            self.error(format!("{path}: missing required field"));
            return;
        };
        let Some(obj) = value.as_object() else {
            self.error(format!("{path}: expected object"));
            return;
        };
        let Some(node_id) = obj.get("nodeId").and_then(Value::as_str) else {
            self.error(format!("{path}.nodeId: expected string"));
            return;
        };
        let port_id = match obj.get("portId") {
            None | Some(Value::Null) => None,
            Some(Value::String(p)) => Some(p.as_str()),
            Some(_) => {
                self.error(format!("{path}.portId: expected string"));
                return;
            }
        };

        // Nodes are validated before connectors, so the port table is complete.
        match self.node_ports.get(node_id) {
            None => self.warn(format!("{path}.nodeId: node `{node_id}` not found")),
            Some(ports) => {
                if let Some(port_id) = port_id {
                    if !ports.contains(port_id) {
                        self.warn(format!("{path}.portId: port `{port_id}` not found on node `{node_id}`"));
                    }
                }
            }
        }
    }

    fn text(&mut self, index: usize, value: &Value) {
        let path = format!("texts[{index}]");
        let Some(obj) = value.as_object() else {
            self.error(format!("{path}: expected object"));
            return;
        };
        self.claim_id(&path, obj);
        for key in ["x", "y"] {
            match obj.get(key) {
                Some(field) if is_finite_number(field) => {}
                Some(_) => self.error(format!("{path}.{key}: expected number")),
                None => self.error(format!("{path}.{key}: missing required field")),
            }
        }
        match obj.get("content") {
            Some(Value::String(_)) => {}
            Some(_) => self.error(format!("{path}.content: expected string")),
            None => self.error(format!("{path}.content: missing required field")),
        }
        if let Some(style) = obj.get("style") {
            self.text_style(&format!("{path}.style"), style);
        }
    }

    fn connector_style(&mut self, path: &str, value: &Value) {
        let Some(obj) = value.as_object() else {
            self.error(format!("{path}: expected object"));
            return;
        };
        if obj.get("stroke").is_some_and(|f| !f.is_string()) {
            self.error(format!("{path}.stroke: expected string"));
        }
        if obj.get("strokeWidth").is_some_and(|f| !is_non_negative(f)) {
            self.error(format!("{path}.strokeWidth: expected non-negative number"));
        }
        if obj.get("dash").is_some_and(|f| !f.is_null() && !f.is_string()) {
            self.error(format!("{path}.dash: expected string"));
        }
        for key in ["startMarker", "endMarker"] {
            if let Some(marker) = obj.get(key) {
                if serde_json::from_value::<MarkerKind>(marker.clone()).is_err() {
                    self.error(format!("{path}.{key}: expected none, arrow, circle or diamond"));
                }
            }
        }
    }

    fn text_style(&mut self, path: &str, value: &Value) {
        let Some(obj) = value.as_object() else {
            self.error(format!("{path}: expected object"));
            return;
        };
        if obj.get("fontSize").is_some_and(|f| !is_positive(f)) {
            self.error(format!("{path}.fontSize: expected positive number"));
        }
        if obj.get("color").is_some_and(|f| !f.is_string()) {
            self.error(format!("{path}.color: expected string"));
        }
        if obj.get("fontFamily").is_some_and(|f| !f.is_null() && !f.is_string()) {
            self.error(format!("{path}.fontFamily: expected string"));
        }
    }
}

fn is_finite_number(value: &Value) -> bool {
    value.as_f64().is_some_and(f64::is_finite)
}

fn is_non_negative(value: &Value) -> bool {
    value.as_f64().is_some_and(|n| n.is_finite() && n >= 0.0)
}

fn is_positive(value: &Value) -> bool {
    value.as_f64().is_some_and(|n| n.is_finite() && n > 0.0)
}
