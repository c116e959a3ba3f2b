//! Shared numeric constants for the engine.

// ── Document ────────────────────────────────────────────────────

/// Scene format version written by the exporter.
pub const SCENE_VERSION: &str = "1.0";

/// Width and height given to nodes that do not declare a size.
pub const DEFAULT_NODE_SIZE: f64 = 80.0;

/// Default canvas extent.
pub const DEFAULT_CANVAS_WIDTH: f64 = 1920.0;
pub const DEFAULT_CANVAS_HEIGHT: f64 = 1080.0;

// ── Geometry ────────────────────────────────────────────────────

/// Distances below this are treated as zero.
pub const GEOMETRY_EPSILON: f64 = 1e-9;

/// Tolerance for positional equality after an import/export round trip.
pub const ROUND_TRIP_TOLERANCE: f64 = 1e-6;

// ── Routing ─────────────────────────────────────────────────────

/// Perpendicular control-point offset of a curved route, as a fraction of
/// the chord length.
pub const CURVE_OFFSET_RATIO: f64 = 0.3;

/// Parameter at which connector labels are placed.
pub const LABEL_T: f64 = 0.5;

// ── Force layout ────────────────────────────────────────────────

/// Repulsion constant for the inverse-square term.
pub const FORCE_REPULSION: f64 = 20_000.0;

/// Hooke constant for connector springs.
pub const FORCE_SPRING: f64 = 0.05;

/// Pull toward the layout centroid.
pub const FORCE_CENTERING: f64 = 0.01;

/// Velocity retained between iterations.
pub const FORCE_DAMPING: f64 = 0.85;

/// Half-width of the seed jitter applied to unpositioned nodes.
pub const FORCE_JITTER: f64 = 5.0;

// ── Ops ─────────────────────────────────────────────────────────

/// Relative aspect-ratio change above which `replace_icon` re-derives ports.
pub const DEFAULT_ASPECT_TOLERANCE: f64 = 0.05;
