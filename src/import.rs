//! Import pipeline: scene document → render tree.
//!
//! DESIGN
//! ======
//! Import runs in a fixed order: parse and validate, optionally clear the
//! target, resolve every icon in one batched lookup, lay out unpositioned
//! nodes, then build node, connector and text primitives. The batched icon
//! lookup is the only await; everything after it is synchronous.
//!
//! Failures are tiered. A document that fails structural validation aborts
//! before the target is touched. Referential problems (an unknown icon, a
//! connector naming a missing node or port, an id already present when not
//! clearing) become warnings and the import carries on around them. An
//! unknown icon draws as a placeholder box; a connector whose node is missing
//! is kept unrouted with its ends as written, so it still exports. Nothing
//! is returned as `Err`; callers read [`ImportResult`].

#[cfg(test)]
#[path = "import_test.rs"]
mod import_test;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::assets::Asset;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::layout::{LayoutConfig, apply_layout};
use crate::ops::OpError;
use crate::render::{IconVisual, RenderTarget};
use crate::scene::{Node, SceneError};
use crate::scene::validate::parse_value;

// =============================================================================
// TYPES
// =============================================================================

/// Where a scene document comes from.
#[derive(Debug, Clone)]
pub enum ImportSource {
    Text(String),
    /// Raw file or blob contents, expected to be UTF-8 JSON.
    Bytes(Vec<u8>),
    Value(Value),
}

impl ImportSource {
    fn into_value(self) -> Result<Value, SceneError> {
        Ok(match self {
            Self::Text(text) => serde_json::from_str(&text)?,
            Self::Bytes(bytes) => serde_json::from_slice(&bytes)?,
            Self::Value(value) => value,
        })
    }
}

impl From<&str> for ImportSource {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<String> for ImportSource {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for ImportSource {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportOptions {
    /// Drop everything in the target before building the new scene.
    pub clear_existing: bool,
    /// Layout for unpositioned nodes, overriding the document's own.
    pub layout: Option<LayoutConfig>,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self { clear_existing: true, layout: None }
    }
}

impl ImportOptions {
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self { clear_existing: config.clear_on_import, layout: None }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportStats {
    pub nodes_imported: usize,
    pub connectors_imported: usize,
    pub texts_imported: usize,
    /// Icon ids sent to the asset service (cache hits excluded).
    pub icons_fetched: usize,
    pub time_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportResult {
    pub success: bool,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub stats: ImportStats,
}

impl ImportResult {
    fn failed(errors: Vec<String>, warnings: Vec<String>, started: Instant) -> Self {
        Self {
            success: false,
            errors,
            warnings,
            stats: ImportStats { time_ms: elapsed_ms(started), ..ImportStats::default() },
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

// =============================================================================
// PIPELINE
// =============================================================================

impl<R: RenderTarget> Engine<R> {
    /// Import a scene document into the render target.
    pub async fn import(&mut self, source: impl Into<ImportSource>, options: &ImportOptions) -> ImportResult {
        let started = Instant::now();

        // --- Parse and validate ---
        let source: ImportSource = source.into();
        let parsed = source.into_value().and_then(parse_value);
        let (scene, report) = match parsed {
            Ok(parsed) => parsed,
            Err(SceneError::Invalid(report)) => {
                warn!(errors = report.errors.len(), "import: scene failed validation");
                return ImportResult::failed(report.errors, report.warnings, started);
            }
            Err(e) => {
                warn!(error = %e, "import: scene could not be parsed");
                return ImportResult::failed(vec![e.to_string()], Vec::new(), started);
            }
        };
        let mut warnings = report.warnings;
        let mut stats = ImportStats::default();

        if options.clear_existing {
            self.clear();
        }

        // --- Icons ---
        let icon_ids: Vec<String> = scene.nodes.iter().filter_map(|n| n.icon_ref.clone()).collect();
        let (icons, fetched) = self.resolve_icons(&icon_ids, &mut warnings).await;
        stats.icons_fetched = fetched;

        // --- Layout ---
        let layout = options
            .layout
            .as_ref()
            .or(scene.layout.as_ref())
            .unwrap_or(&self.config().layout)
            .clone();
        let nodes = if scene.nodes.iter().all(Node::is_positioned) {
            scene.nodes.clone()
        } else {
            apply_layout(&scene.nodes, &scene.connectors, &layout).nodes
        };

        // --- Primitives ---
        for node in &nodes {
            if self.contains(&node.id) {
                warnings.push(format!("node {}: id already exists; skipped", node.id));
                continue;
            }
            let icon = match &node.icon_ref {
                None => IconVisual::None,
                Some(icon_ref) => icons
                    .get(icon_ref)
                    .map_or_else(|| IconVisual::Placeholder(icon_ref.clone()), |a| IconVisual::Asset(Arc::clone(a))),
            };
            self.insert_node(node, icon);
            stats.nodes_imported += 1;
        }

        for connector in &scene.connectors {
            if self.contains(&connector.id) {
                warnings.push(format!("connector {}: id already exists; skipped", connector.id));
                continue;
            }
            match self.insert_connector(connector, &mut warnings) {
                Ok(_) => stats.connectors_imported += 1,
                Err(OpError::NodeNotFound(node_id)) => {
                    warnings.push(format!("connector {}: node {node_id} not found; kept as placeholder", connector.id));
                    self.insert_placeholder_connector(connector);
                    stats.connectors_imported += 1;
                }
                Err(e) => warnings.push(format!("connector {}: {e}; skipped", connector.id)),
            }
        }

        for text in &scene.texts {
            if self.contains(&text.id) {
                warnings.push(format!("text {}: id already exists; skipped", text.id));
                continue;
            }
            self.insert_text(text);
            stats.texts_imported += 1;
        }

        self.set_document_meta(scene.version, scene.canvas_config, scene.layout);
        stats.time_ms = elapsed_ms(started);

        info!(
            nodes = stats.nodes_imported,
            connectors = stats.connectors_imported,
            texts = stats.texts_imported,
            icons_fetched = stats.icons_fetched,
            warnings = warnings.len(),
            time_ms = stats.time_ms,
            "import: scene imported"
        );
        ImportResult { success: true, errors: Vec::new(), warnings, stats }
    }

    /// Read a scene document from disk and import it.
    pub async fn import_file(&mut self, path: impl AsRef<Path>, options: &ImportOptions) -> ImportResult {
        let path = path.as_ref();
        match tokio::fs::read(path).await {
            Ok(bytes) => self.import(ImportSource::Bytes(bytes), options).await,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "import: read failed");
                ImportResult::failed(vec![format!("read {}: {e}", path.display())], Vec::new(), Instant::now())
            }
        }
    }

    /// Resolve every icon id in one batch. Unresolved ids are reported as
    /// warnings and left out of the map, so their nodes get placeholders.
    async fn resolve_icons(
        &self,
        icon_ids: &[String],
        warnings: &mut Vec<String>,
    ) -> (HashMap<String, Arc<Asset>>, usize) {
        if icon_ids.is_empty() {
            return (HashMap::new(), 0);
        }
        let assets = Arc::clone(self.assets());
        match assets.resolve_many(icon_ids).await {
            Ok(batch) => {
                for id in &batch.missing {
                    warnings.push(format!("icon {id}: not found; using placeholder"));
                }
                for (id, e) in &batch.failures {
                    warnings.push(format!("icon {id}: {e}; using placeholder"));
                }
                (batch.assets, batch.fetched)
            }
            Err(e) => {
                warn!(error = %e, "import: icon resolution unavailable");
                warnings.push(format!("icons: {e}; using placeholders"));
                (HashMap::new(), 0)
            }
        }
    }
}
