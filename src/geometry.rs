//! Points, affine node transforms, and axis-aligned bounds.
//!
//! World space uses screen conventions: x grows right, y grows down, and a
//! positive rotation turns clockwise.

#[cfg(test)]
#[path = "geometry_test.rs"]
mod geometry_test;

use serde::{Deserialize, Serialize};

use crate::consts::GEOMETRY_EPSILON;

/// A point or vector in world or node-local space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn add(self, other: Point) -> Point {
        Point::new(self.x + other.x, self.y + other.y)
    }

    #[must_use]
    pub fn sub(self, other: Point) -> Point {
        Point::new(self.x - other.x, self.y - other.y)
    }

    #[must_use]
    pub fn scale(self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }

    #[must_use]
    pub fn dot(self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    #[must_use]
    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    #[must_use]
    pub fn distance(self, other: Point) -> f64 {
        self.sub(other).length()
    }

    #[must_use]
    pub fn midpoint(self, other: Point) -> Point {
        Point::new(f64::midpoint(self.x, other.x), f64::midpoint(self.y, other.y))
    }

    /// Linear interpolation; `t = 0` is `self`, `t = 1` is `other`.
    #[must_use]
    pub fn lerp(self, other: Point, t: f64) -> Point {
        self.add(other.sub(self).scale(t))
    }

    /// Unit vector in the same direction, or `None` for a zero vector.
    #[must_use]
    pub fn normalized(self) -> Option<Point> {
        let len = self.length();
        (len > GEOMETRY_EPSILON).then(|| self.scale(1.0 / len))
    }

    /// Rotate clockwise (in screen space) by `degrees` about the origin.
    #[must_use]
    pub fn rotate(self, degrees: f64) -> Point {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Point::new(self.x * cos - self.y * sin, self.x * sin + self.y * cos)
    }

    /// Angle of this vector in radians, measured clockwise from +x.
    #[must_use]
    pub fn angle(self) -> f64 {
        self.y.atan2(self.x)
    }

    /// Unit vector for an angle in radians.
    #[must_use]
    pub fn from_angle(radians: f64) -> Point {
        let (sin, cos) = radians.sin_cos();
        Point::new(cos, sin)
    }

    /// Component-wise equality within `tolerance`.
    #[must_use]
    pub fn approx_eq(self, other: Point, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

/// Placement of a node box on the canvas.
///
/// `x`/`y` is the top-left corner of the unscaled box. Scale and rotation
/// are applied about the box center.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    /// Clockwise rotation in degrees.
    pub rotation: f64,
    pub scale: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self { x: 0.0, y: 0.0, rotation: 0.0, scale: 1.0 }
    }
}

impl Transform {
    /// Center of a `width` × `height` box placed by this transform.
    #[must_use]
    pub fn center(&self, width: f64, height: f64) -> Point {
        Point::new(self.x + width / 2.0, self.y + height / 2.0)
    }

    /// Map a center-relative local point to world space: scale, then rotate,
    /// then translate. The render surface composes transforms in the same
    /// order.
    #[must_use]
    pub fn apply(&self, local: Point, width: f64, height: f64) -> Point {
        local
            .scale(self.scale)
            .rotate(self.rotation)
            .add(self.center(width, height))
    }

    /// Rotate a local direction into world space. Scale does not affect
    /// directions.
    #[must_use]
    pub fn apply_direction(&self, direction: Point) -> Point {
        direction.rotate(self.rotation)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Bounds of a single rectangle.
    #[must_use]
    pub fn from_rect(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { min_x: x, min_y: y, max_x: x + width, max_y: y + height }
    }

    /// Smallest bounds containing both.
    #[must_use]
    pub fn union(self, other: Bounds) -> Bounds {
        Bounds {
            min_x: self.min_x.min(other.min_x),
            min_y: self.min_y.min(other.min_y),
            max_x: self.max_x.max(other.max_x),
            max_y: self.max_y.max(other.max_y),
        }
    }

    #[must_use]
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    #[must_use]
    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(f64::midpoint(self.min_x, self.max_x), f64::midpoint(self.min_y, self.max_y))
    }
}

/// Owned, versioned placement of one node box.
///
/// Edits never mutate a geometry in place: they produce the next version,
/// and anything derived from the old version (resolved ports, routes) is
/// recomputed when it sees the version change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NodeGeometry {
    pub transform: Transform,
    pub width: f64,
    pub height: f64,
    pub version: u64,
}

impl NodeGeometry {
    #[must_use]
    pub fn new(transform: Transform, width: f64, height: f64) -> Self {
        Self { transform, width, height, version: 0 }
    }

    /// World position of the box center.
    #[must_use]
    pub fn center(&self) -> Point {
        self.transform.center(self.width, self.height)
    }

    /// Map a center-relative local point to world space.
    #[must_use]
    pub fn world_point(&self, local: Point) -> Point {
        self.transform.apply(local, self.width, self.height)
    }

    /// Next version with a new transform.
    #[must_use]
    pub fn with_transform(&self, transform: Transform) -> Self {
        Self { transform, version: self.version + 1, ..*self }
    }

    /// Next version with a new size.
    #[must_use]
    pub fn with_size(&self, width: f64, height: f64) -> Self {
        Self { width, height, version: self.version + 1, ..*self }
    }

    /// Unrotated world bounds of the scaled box.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        let c = self.center();
        let (w, h) = (self.width * self.transform.scale, self.height * self.transform.scale);
        Bounds::from_rect(c.x - w / 2.0, c.y - h / 2.0, w, h)
    }
}
