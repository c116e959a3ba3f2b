//! Engine configuration parsed from environment variables.

use crate::consts::DEFAULT_ASPECT_TOLERANCE;
use crate::layout::{LayoutAlgorithm, LayoutConfig};
use crate::routing::RoutingType;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable was set to a value outside its accepted set.
    #[error("config parse failed: {var}={value}: {reason}")]
    Parse { var: &'static str, value: String, reason: String },
}

impl crate::error::ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "E_CONFIG_PARSE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Layout applied to unpositioned nodes when a document carries none.
    pub layout: LayoutConfig,
    /// Routing type for connectors added without one.
    pub routing: RoutingType,
    /// Relative aspect-ratio change above which `replace_icon` resizes.
    pub aspect_tolerance: f64,
    /// Whether import clears the render target by default.
    pub clear_on_import: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            layout: LayoutConfig::default(),
            routing: RoutingType::Straight,
            aspect_tolerance: DEFAULT_ASPECT_TOLERANCE,
            clear_on_import: true,
        }
    }
}

impl EngineConfig {
    /// Build typed engine config from environment variables.
    ///
    /// Optional:
    /// - `DIAGRAM_LAYOUT`: `grid` (default), `flowLr`, `flowTb`, `hierarchical`, `force`
    /// - `DIAGRAM_ROUTING`: `straight` (default), `orthogonal`, `curved`
    /// - `DIAGRAM_ASPECT_TOLERANCE`: default 0.05
    /// - `DIAGRAM_CLEAR_ON_IMPORT`: default `true`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if a layout or routing name is unknown.
    pub fn from_env() -> Result<Self, ConfigError> {
        let algorithm = match env_var("DIAGRAM_LAYOUT") {
            None => LayoutAlgorithm::default(),
            Some(raw) => LayoutAlgorithm::from_name(&raw).ok_or_else(|| ConfigError::Parse {
                var: "DIAGRAM_LAYOUT",
                value: raw.clone(),
                reason: "expected grid, flowLr, flowTb, hierarchical or force".into(),
            })?,
        };
        let routing = match env_var("DIAGRAM_ROUTING") {
            None => RoutingType::default(),
            Some(raw) => RoutingType::from_name(&raw).ok_or_else(|| ConfigError::Parse {
                var: "DIAGRAM_ROUTING",
                value: raw.clone(),
                reason: "expected straight, orthogonal or curved".into(),
            })?,
        };

        Ok(Self {
            layout: LayoutConfig { algorithm, ..LayoutConfig::default() },
            routing,
            aspect_tolerance: env_parse("DIAGRAM_ASPECT_TOLERANCE", DEFAULT_ASPECT_TOLERANCE),
            clear_on_import: env_parse("DIAGRAM_CLEAR_ON_IMPORT", true),
        })
    }
}

fn env_var(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_owned()),
        _ => None,
    }
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match env_var(key).map(|v| v.parse::<T>()) {
        Some(Ok(value)) => value,
        _ => default,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
