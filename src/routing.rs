//! Connector path algorithms between two resolved points.
//!
//! Every router is a pure function of its inputs: routing the same pair
//! twice yields the same path, and the curved router's bend side is fixed by
//! the direction of travel rather than chosen at random. A zero-length
//! request produces a flagged empty route instead of an error.

#[cfg(test)]
#[path = "routing_test.rs"]
mod routing_test;

use serde::{Deserialize, Serialize};

use crate::consts::{CURVE_OFFSET_RATIO, GEOMETRY_EPSILON};
use crate::geometry::Point;

/// Samples used to approximate the arc length of a curve.
const CURVE_LENGTH_SAMPLES: u32 = 64;

// =============================================================================
// TYPES
// =============================================================================

/// Path algorithm of a connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoutingType {
    #[default]
    Straight,
    Orthogonal,
    Curved,
}

impl RoutingType {
    /// Parse the JSON name of a routing type.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "straight" => Some(Self::Straight),
            "orthogonal" => Some(Self::Orthogonal),
            "curved" => Some(Self::Curved),
            _ => None,
        }
    }
}

/// A resolved connector end: where it sits and which way it leaves its node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEnd {
    pub point: Point,
    /// Exit direction in radians, when the port has one.
    pub exit_angle: Option<f64>,
}

impl RouteEnd {
    #[must_use]
    pub fn new(point: Point, exit_angle: Option<f64>) -> Self {
        Self { point, exit_angle }
    }

    #[must_use]
    pub fn at(point: Point) -> Self {
        Self { point, exit_angle: None }
    }
}

/// Path shape.
#[derive(Debug, Clone, PartialEq)]
pub enum PathGeometry {
    /// Straight segments through every point in order.
    Polyline(Vec<Point>),
    /// Quadratic Bezier curve.
    Quadratic { start: Point, control: Point, end: Point },
}

/// A routed connector path.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    pub routing_type: RoutingType,
    pub geometry: PathGeometry,
    /// Set when both ends coincide; the geometry is then empty.
    pub degenerate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Horizontal,
    Vertical,
}

// =============================================================================
// ROUTERS
// =============================================================================

/// Route with the algorithm named by `routing_type`.
#[must_use]
pub fn route(routing_type: RoutingType, from: RouteEnd, to: RouteEnd) -> Route {
    if from.point.distance(to.point) <= GEOMETRY_EPSILON {
        return Route::degenerate(routing_type);
    }
    match routing_type {
        RoutingType::Straight => route_straight(from.point, to.point),
        RoutingType::Orthogonal => route_orthogonal(from, to),
        RoutingType::Curved => route_curved(from.point, to.point),
    }
}

/// A direct segment.
#[must_use]
pub fn route_straight(from: Point, to: Point) -> Route {
    if from.distance(to) <= GEOMETRY_EPSILON {
        return Route::degenerate(RoutingType::Straight);
    }
    Route {
        routing_type: RoutingType::Straight,
        geometry: PathGeometry::Polyline(vec![from, to]),
        degenerate: false,
    }
}

/// A Manhattan path with at most two bends.
///
/// Each end's axis comes from its exit direction (or, without one, from the
/// dominant axis of travel). Parallel axes bend twice through the midline;
/// perpendicular axes bend once at the corner that continues the `from`
/// end's axis. Ends already aligned on the shared axis collapse to a
/// straight segment.
#[must_use]
pub fn route_orthogonal(from: RouteEnd, to: RouteEnd) -> Route {
    let a = from.point;
    let b = to.point;
    if a.distance(b) <= GEOMETRY_EPSILON {
        return Route::degenerate(RoutingType::Orthogonal);
    }
    let delta = b.sub(a);
    let axis_a = exit_axis(from.exit_angle, delta);
    let axis_b = exit_axis(to.exit_angle, delta);
    let same_row = (a.y - b.y).abs() <= GEOMETRY_EPSILON;
    let same_column = (a.x - b.x).abs() <= GEOMETRY_EPSILON;

    let points = match (axis_a, axis_b) {
        (Axis::Horizontal, Axis::Horizontal) if same_row => vec![a, b],
        (Axis::Vertical, Axis::Vertical) if same_column => vec![a, b],
        (Axis::Horizontal, Axis::Horizontal) => {
            let mx = f64::midpoint(a.x, b.x);
            vec![a, Point::new(mx, a.y), Point::new(mx, b.y), b]
        }
        (Axis::Vertical, Axis::Vertical) => {
            let my = f64::midpoint(a.y, b.y);
            vec![a, Point::new(a.x, my), Point::new(b.x, my), b]
        }
        _ if same_row || same_column => vec![a, b],
        (Axis::Horizontal, Axis::Vertical) => vec![a, Point::new(b.x, a.y), b],
        (Axis::Vertical, Axis::Horizontal) => vec![a, Point::new(a.x, b.y), b],
    };

    Route {
        routing_type: RoutingType::Orthogonal,
        geometry: PathGeometry::Polyline(dedup_points(points)),
        degenerate: false,
    }
}

/// Drop consecutive coincident points, so a midline that lands on an end
/// does not count as a bend.
fn dedup_points(mut points: Vec<Point>) -> Vec<Point> {
    points.dedup_by(|b, a| a.distance(*b) <= GEOMETRY_EPSILON);
    points
}

/// A quadratic curve bowed to one side of the chord.
///
/// The control point sits at the chord midpoint, pushed along the chord
/// direction rotated 90° clockwise (screen space) by 30% of the chord length.
#[must_use]
pub fn route_curved(from: Point, to: Point) -> Route {
    let chord = to.sub(from);
    if chord.length() <= GEOMETRY_EPSILON {
        return Route::degenerate(RoutingType::Curved);
    }
    // (-dy, dx) has the chord's length, so scaling by the ratio alone gives
    // an offset of CURVE_OFFSET_RATIO × length.
    let perpendicular = Point::new(-chord.y, chord.x);
    let control = from.midpoint(to).add(perpendicular.scale(CURVE_OFFSET_RATIO));
    Route {
        routing_type: RoutingType::Curved,
        geometry: PathGeometry::Quadratic { start: from, control, end: to },
        degenerate: false,
    }
}

fn exit_axis(exit_angle: Option<f64>, delta: Point) -> Axis {
    let (dx, dy) = match exit_angle {
        Some(angle) => {
            let dir = Point::from_angle(angle);
            (dir.x, dir.y)
        }
        None => (delta.x, delta.y),
    };
    if dx.abs() >= dy.abs() { Axis::Horizontal } else { Axis::Vertical }
}

// =============================================================================
// SAMPLING
// =============================================================================

/// Point at parameter `t ∈ [0, 1]` along the path.
///
/// Polylines are parameterized by arc length; curves by the Bezier
/// parameter. Returns `None` for a degenerate route.
#[must_use]
pub fn get_point_along_path(route: &Route, t: f64) -> Option<Point> {
    if route.degenerate {
        return None;
    }
    let t = t.clamp(0.0, 1.0);
    match &route.geometry {
        PathGeometry::Polyline(points) => {
            let (index, local_t) = locate_on_polyline(points, t)?;
            Some(points[index].lerp(points[index + 1], local_t))
        }
        PathGeometry::Quadratic { start, control, end } => Some(quadratic_point(*start, *control, *end, t)),
    }
}

/// Direction of travel in radians at parameter `t ∈ [0, 1]`.
///
/// For curves this is the analytic tangent of the Bezier. Returns `None` for
/// a degenerate route.
#[must_use]
pub fn get_angle_along_path(route: &Route, t: f64) -> Option<f64> {
    if route.degenerate {
        return None;
    }
    let t = t.clamp(0.0, 1.0);
    match &route.geometry {
        PathGeometry::Polyline(points) => {
            let (index, _) = locate_on_polyline(points, t)?;
            Some(points[index + 1].sub(points[index]).angle())
        }
        PathGeometry::Quadratic { start, control, end } => {
            let tangent = quadratic_tangent(*start, *control, *end, t);
            // A control point coinciding with an end zeroes the derivative
            // there; the chord direction is the limit.
            let dir = tangent.normalized().unwrap_or_else(|| end.sub(*start));
            Some(dir.angle())
        }
    }
}

/// Index of the non-degenerate segment holding arc-length fraction `t`, and
/// the fraction within it.
fn locate_on_polyline(points: &[Point], t: f64) -> Option<(usize, f64)> {
    let lengths: Vec<f64> = points.windows(2).map(|w| w[0].distance(w[1])).collect();
    let total: f64 = lengths.iter().sum();
    if total <= GEOMETRY_EPSILON {
        return None;
    }
    let target = t * total;
    let mut travelled = 0.0;
    let mut last = None;
    for (i, len) in lengths.iter().enumerate() {
        if *len <= GEOMETRY_EPSILON {
            continue;
        }
        if target <= travelled + len {
            return Some((i, (target - travelled) / len));
        }
        travelled += len;
        last = Some(i);
    }
    last.map(|i| (i, 1.0))
}

fn quadratic_point(p0: Point, p1: Point, p2: Point, t: f64) -> Point {
    let u = 1.0 - t;
    p0.scale(u * u).add(p1.scale(2.0 * u * t)).add(p2.scale(t * t))
}

fn quadratic_tangent(p0: Point, p1: Point, p2: Point, t: f64) -> Point {
    p1.sub(p0).scale(2.0 * (1.0 - t)).add(p2.sub(p1).scale(2.0 * t))
}

// =============================================================================
// ROUTE
// =============================================================================

impl Route {
    /// The flagged empty route returned for zero-length requests.
    #[must_use]
    pub fn degenerate(routing_type: RoutingType) -> Self {
        Self { routing_type, geometry: PathGeometry::Polyline(Vec::new()), degenerate: true }
    }

    /// Interior corner points of a polyline; curves have none.
    #[must_use]
    pub fn bends(&self) -> &[Point] {
        match &self.geometry {
            PathGeometry::Polyline(points) if points.len() > 2 => &points[1..points.len() - 1],
            _ => &[],
        }
    }

    /// First and last point, if any.
    #[must_use]
    pub fn endpoints(&self) -> Option<(Point, Point)> {
        match &self.geometry {
            PathGeometry::Polyline(points) => Some((*points.first()?, *points.last()?)),
            PathGeometry::Quadratic { start, end, .. } => Some((*start, *end)),
        }
    }

    /// Path length; curves are measured by sampling.
    #[must_use]
    pub fn length(&self) -> f64 {
        match &self.geometry {
            PathGeometry::Polyline(points) => points.windows(2).map(|w| w[0].distance(w[1])).sum(),
            PathGeometry::Quadratic { start, control, end } => {
                let mut length = 0.0;
                let mut prev = *start;
                for i in 1..=CURVE_LENGTH_SAMPLES {
                    let p = quadratic_point(*start, *control, *end, f64::from(i) / f64::from(CURVE_LENGTH_SAMPLES));
                    length += prev.distance(p);
                    prev = p;
                }
                length
            }
        }
    }

    /// SVG `d` attribute for this path; empty for degenerate routes.
    #[must_use]
    pub fn svg_path_data(&self) -> String {
        match &self.geometry {
            PathGeometry::Polyline(points) => points
                .iter()
                .enumerate()
                .map(|(i, p)| format!("{} {} {}", if i == 0 { 'M' } else { 'L' }, p.x, p.y))
                .collect::<Vec<_>>()
                .join(" "),
            PathGeometry::Quadratic { start, control, end } => {
                format!("M {} {} Q {} {} {} {}", start.x, start.y, control.x, control.y, end.x, end.y)
            }
        }
    }
}
