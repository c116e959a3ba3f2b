//! Export pipeline: render tree → scene document.
//!
//! DESIGN
//! ======
//! Primitives carry typed metadata, so export is a walk over the render
//! target in insertion order with one record built per primitive. Geometry
//! comes from the node's current versioned transform. Connector endpoints
//! come from the attachment registry, not from a nearest-port search: an end
//! is written with a `portId` only when it is pinned, so ends that were
//! chosen automatically stay automatic and pinned ones round-trip exactly.
//! Ports synthesized at import are not written back.

#[cfg(test)]
#[path = "export_test.rs"]
mod export_test;

use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::error::ErrorCode;
use crate::ports::AttachmentEnd;
use crate::render::{ConnectorPrimitive, NodePrimitive, Primitive, RenderTarget, TextPrimitive};
use crate::scene::{Connector, Endpoint, Node, Scene, Text};

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("scene serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("write failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("clipboard unavailable: {0}")]
    Clipboard(String),
}

impl ErrorCode for ExportError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Serialize(_) => "E_EXPORT_SERIALIZE",
            Self::Io(_) => "E_EXPORT_IO",
            Self::Clipboard(_) => "E_EXPORT_CLIPBOARD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Clipboard(_))
    }
}

/// A copy/paste medium that accepts text.
pub trait Clipboard: Send + Sync {
    /// Replace the clipboard contents.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Clipboard`] if the medium rejects the write.
    fn write_text(&self, text: &str) -> Result<(), ExportError>;
}

/// In-process clipboard, for tests and headless use.
#[derive(Debug, Default)]
pub struct MemoryClipboard {
    contents: Mutex<Option<String>>,
}

impl MemoryClipboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn contents(&self) -> Option<String> {
        self.contents.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl Clipboard for MemoryClipboard {
    fn write_text(&self, text: &str) -> Result<(), ExportError> {
        *self.contents.lock().unwrap_or_else(PoisonError::into_inner) = Some(text.to_owned());
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportStats {
    pub nodes_exported: usize,
    pub connectors_exported: usize,
    pub texts_exported: usize,
    pub time_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportResult {
    pub success: bool,
    /// Pretty-printed scene JSON; empty when serialization failed.
    pub json: String,
    pub scene: Scene,
    pub errors: Vec<String>,
    pub stats: ExportStats,
}

// =============================================================================
// RECORDS
// =============================================================================

pub(crate) fn node_record(node: &NodePrimitive) -> Node {
    let transform = node.geometry.transform;
    Node {
        id: node.meta.logical_id.clone(),
        x: Some(transform.x),
        y: Some(transform.y),
        w: node.geometry.width,
        h: node.geometry.height,
        rotation: transform.rotation,
        scale: transform.scale,
        icon_ref: node.meta.icon_ref.clone(),
        ports: if node.meta.ports_generated { Vec::new() } else { node.meta.ports.clone() },
        label: node.meta.label.clone(),
    }
}

fn endpoint(end: &AttachmentEnd) -> Endpoint {
    Endpoint {
        node_id: end.node_id.clone(),
        port_id: end.port_id.clone().filter(|_| end.pinned),
    }
}

fn text_record(text: &TextPrimitive) -> Text {
    Text {
        id: text.logical_id.clone(),
        x: text.position.x,
        y: text.position.y,
        content: text.content.clone(),
        style: text.style.clone(),
    }
}

// =============================================================================
// PIPELINE
// =============================================================================

impl<R: RenderTarget> Engine<R> {
    fn connector_record(&self, connector: &ConnectorPrimitive) -> Option<Connector> {
        let attachment = self.attachments().get(&connector.logical_id)?;
        Some(Connector {
            id: connector.logical_id.clone(),
            from: endpoint(&attachment.from),
            to: endpoint(&attachment.to),
            routing_type: connector.routing_type,
            style: connector.style.clone(),
            label: connector.label.clone(),
        })
    }

    /// Rebuild the scene document from the render target.
    pub fn export(&self) -> ExportResult {
        let started = Instant::now();
        let mut scene = Scene::empty(self.canvas_config().clone());
        self.document_version().clone_into(&mut scene.version);
        scene.layout = self.document_layout().cloned();
        let mut errors = Vec::new();

        for id in self.target().ids() {
            match self.target().get(id) {
                Some(Primitive::Node(node)) => scene.nodes.push(node_record(node)),
                Some(Primitive::Connector(connector)) => match self.connector_record(connector) {
                    Some(record) => scene.connectors.push(record),
                    None => errors.push(format!("connector {}: no attachment; skipped", connector.logical_id)),
                },
                Some(Primitive::Text(text)) => scene.texts.push(text_record(text)),
                None => {}
            }
        }

        let json = match serde_json::to_string_pretty(&scene) {
            Ok(json) => json,
            Err(e) => {
                errors.push(ExportError::from(e).to_string());
                String::new()
            }
        };
        let stats = ExportStats {
            nodes_exported: scene.nodes.len(),
            connectors_exported: scene.connectors.len(),
            texts_exported: scene.texts.len(),
            time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        if !errors.is_empty() {
            warn!(errors = errors.len(), "export: scene exported with errors");
        }
        info!(
            nodes = stats.nodes_exported,
            connectors = stats.connectors_exported,
            texts = stats.texts_exported,
            time_ms = stats.time_ms,
            "export: scene exported"
        );
        ExportResult { success: errors.is_empty(), json, scene, errors, stats }
    }

    /// Pretty-printed scene JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Serialize`] if the scene cannot be serialized.
    pub fn export_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(&self.export().scene)?)
    }

    /// Export and write the JSON to `path`. A write failure is reported in
    /// the result's errors.
    pub async fn export_to_file(&self, path: impl AsRef<Path>) -> ExportResult {
        let path = path.as_ref();
        let mut result = self.export();
        if !result.success {
            return result;
        }
        if let Err(e) = tokio::fs::write(path, &result.json).await {
            let e = ExportError::from(e);
            warn!(path = %path.display(), error = %e, code = e.error_code(), "export: file write failed");
            result.errors.push(format!("{}: {e}", path.display()));
            result.success = false;
        }
        result
    }

    /// Export and place the JSON on a clipboard.
    pub fn export_to_clipboard(&self, clipboard: &dyn Clipboard) -> ExportResult {
        let mut result = self.export();
        if !result.success {
            return result;
        }
        if let Err(e) = clipboard.write_text(&result.json) {
            warn!(error = %e, code = e.error_code(), "export: clipboard write failed");
            result.errors.push(e.to_string());
            result.success = false;
        }
        result
    }
}
