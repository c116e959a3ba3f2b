#![allow(clippy::float_cmp)]

use super::*;

const EPS: f64 = 1e-9;

#[test]
fn rotate_quarter_turn_is_clockwise_on_screen() {
    // +x rotated 90° clockwise points down (+y).
    let p = Point::new(1.0, 0.0).rotate(90.0);
    assert!(p.approx_eq(Point::new(0.0, 1.0), EPS));
}

#[test]
fn transform_applies_scale_then_rotate_then_translate() {
    let t = Transform { x: 100.0, y: 100.0, rotation: 90.0, scale: 2.0 };
    // Right edge midpoint of an 80x40 box, relative to center.
    let world = t.apply(Point::new(40.0, 0.0), 80.0, 40.0);
    // center = (140, 120); scaled = (80, 0); rotated = (0, 80).
    assert!(world.approx_eq(Point::new(140.0, 200.0), EPS));
}

#[test]
fn transform_identity_keeps_center_relative_points() {
    let t = Transform::default();
    let world = t.apply(Point::new(-40.0, 0.0), 80.0, 80.0);
    assert!(world.approx_eq(Point::new(0.0, 40.0), EPS));
}

#[test]
fn normalized_zero_vector_is_none() {
    assert!(Point::new(0.0, 0.0).normalized().is_none());
    let unit = Point::new(3.0, 4.0).normalized().unwrap();
    assert!((unit.length() - 1.0).abs() < EPS);
}

#[test]
fn lerp_endpoints() {
    let a = Point::new(0.0, 0.0);
    let b = Point::new(10.0, -4.0);
    assert_eq!(a.lerp(b, 0.0), a);
    assert_eq!(a.lerp(b, 1.0), b);
    assert_eq!(a.lerp(b, 0.5), Point::new(5.0, -2.0));
}

#[test]
fn bounds_union_covers_both() {
    let a = Bounds::from_rect(0.0, 0.0, 10.0, 10.0);
    let b = Bounds::from_rect(20.0, -5.0, 5.0, 5.0);
    let u = a.union(b);
    assert_eq!(u, Bounds { min_x: 0.0, min_y: -5.0, max_x: 25.0, max_y: 10.0 });
    assert_eq!(u.width(), 25.0);
    assert_eq!(u.height(), 15.0);
}

#[test]
fn angle_round_trips_through_from_angle() {
    let v = Point::new(-2.0, 2.0);
    let back = Point::from_angle(v.angle());
    assert!(back.approx_eq(v.normalized().unwrap(), EPS));
}

#[test]
fn geometry_edits_bump_version() {
    let g = NodeGeometry::new(Transform::default(), 80.0, 40.0);
    assert_eq!(g.version, 0);
    let moved = g.with_transform(Transform { x: 10.0, ..Transform::default() });
    assert_eq!(moved.version, 1);
    assert_eq!(moved.width, 80.0);
    let resized = moved.with_size(100.0, 50.0);
    assert_eq!(resized.version, 2);
    assert_eq!(resized.transform.x, 10.0);
}

#[test]
fn geometry_bounds_scale_about_center() {
    let g = NodeGeometry::new(Transform { x: 0.0, y: 0.0, rotation: 0.0, scale: 2.0 }, 80.0, 80.0);
    assert_eq!(g.bounds(), Bounds { min_x: -40.0, min_y: -40.0, max_x: 120.0, max_y: 120.0 });
}
