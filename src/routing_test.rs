#![allow(clippy::float_cmp)]

use super::*;
use crate::geometry::{NodeGeometry, Transform};
use crate::ports::port_choice;
use crate::scene::{Node, generate_default_ports};

const EPS: f64 = 1e-9;

fn end_for(x: f64, port: &str) -> RouteEnd {
    let geometry = NodeGeometry::new(Transform { x, y: 0.0, rotation: 0.0, scale: 1.0 }, 80.0, 80.0);
    let ports = generate_default_ports(&Node::new("n", x, 0.0));
    let choice = port_choice(&geometry, &ports, port).unwrap();
    RouteEnd::new(choice.point, choice.exit_angle)
}

// =============================================================
// Straight
// =============================================================

#[test]
fn straight_is_a_single_segment() {
    let r = route_straight(Point::new(0.0, 0.0), Point::new(3.0, 4.0));
    assert_eq!(r.geometry, PathGeometry::Polyline(vec![Point::new(0.0, 0.0), Point::new(3.0, 4.0)]));
    assert!((r.length() - 5.0).abs() < EPS);
    assert!(r.bends().is_empty());
}

#[test]
fn zero_length_is_flagged_not_an_error() {
    let p = Point::new(7.0, 7.0);
    for kind in [RoutingType::Straight, RoutingType::Orthogonal, RoutingType::Curved] {
        let r = route(kind, RouteEnd::at(p), RouteEnd::at(p));
        assert!(r.degenerate);
        assert_eq!(r.routing_type, kind);
        assert!(get_point_along_path(&r, 0.5).is_none());
        assert!(get_angle_along_path(&r, 0.0).is_none());
        assert_eq!(r.svg_path_data(), "");
    }
}

// =============================================================
// Orthogonal
// =============================================================

#[test]
fn orthogonal_collinear_exits_have_no_bend() {
    // Two 80×80 nodes at x = 0 and x = 200, right port to left port.
    let r = route(RoutingType::Orthogonal, end_for(0.0, "right"), end_for(200.0, "left"));
    assert!(r.bends().is_empty());
    assert_eq!(r.endpoints(), Some((Point::new(80.0, 40.0), Point::new(200.0, 40.0))));
}

#[test]
fn orthogonal_perpendicular_exits_have_one_bend() {
    let r = route(RoutingType::Orthogonal, end_for(0.0, "bottom"), end_for(200.0, "left"));
    assert_eq!(r.bends().len(), 1);
    assert!(r.bends()[0].approx_eq(Point::new(40.0, 40.0), EPS));
}

#[test]
fn orthogonal_parallel_offset_exits_bend_twice_at_midline() {
    let from = RouteEnd::new(Point::new(0.0, 0.0), Some(0.0));
    let to = RouteEnd::new(Point::new(100.0, 50.0), Some(std::f64::consts::PI));
    let r = route_orthogonal(from, to);
    assert_eq!(r.bends(), &[Point::new(50.0, 0.0), Point::new(50.0, 50.0)]);
}

#[test]
fn orthogonal_without_exits_uses_dominant_axis() {
    let r = route_orthogonal(RouteEnd::at(Point::new(0.0, 0.0)), RouteEnd::at(Point::new(10.0, 100.0)));
    // Vertical travel dominates: bend through the horizontal midline.
    assert_eq!(r.bends(), &[Point::new(0.0, 50.0), Point::new(10.0, 50.0)]);
}

#[test]
fn orthogonal_segments_are_axis_aligned() {
    let from = RouteEnd::new(Point::new(12.0, 7.0), Some(std::f64::consts::FRAC_PI_2));
    let to = RouteEnd::new(Point::new(-40.0, 90.0), Some(0.0));
    let r = route_orthogonal(from, to);
    let PathGeometry::Polyline(points) = &r.geometry else {
        panic!("orthogonal routes are polylines");
    };
    for w in points.windows(2) {
        assert!((w[0].x - w[1].x).abs() < EPS || (w[0].y - w[1].y).abs() < EPS);
    }
}

// =============================================================
// Curved
// =============================================================

#[test]
fn curved_control_point_is_offset_thirty_percent() {
    let r = route_curved(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
    let PathGeometry::Quadratic { control, .. } = r.geometry else {
        panic!("curved routes are quadratic");
    };
    assert!(control.approx_eq(Point::new(50.0, 30.0), EPS));
}

#[test]
fn curved_side_is_stable_across_calls() {
    let a = Point::new(13.0, -4.0);
    let b = Point::new(-220.0, 97.0);
    let first = route(RoutingType::Curved, RouteEnd::at(a), RouteEnd::at(b));
    for _ in 0..20 {
        assert_eq!(route(RoutingType::Curved, RouteEnd::at(a), RouteEnd::at(b)), first);
    }
}

#[test]
fn curved_reversed_pair_bows_to_the_other_side() {
    let forward = route_curved(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
    let backward = route_curved(Point::new(100.0, 0.0), Point::new(0.0, 0.0));
    let mid_f = get_point_along_path(&forward, 0.5).unwrap();
    let mid_b = get_point_along_path(&backward, 0.5).unwrap();
    assert!(mid_f.y > 0.0);
    assert!(mid_b.y < 0.0);
}

#[test]
fn curved_angles_are_analytic_tangents() {
    let r = route_curved(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
    let start = get_angle_along_path(&r, 0.0).unwrap();
    let end = get_angle_along_path(&r, 1.0).unwrap();
    assert!((start - 60.0_f64.atan2(100.0)).abs() < EPS);
    assert!((end - (-60.0_f64).atan2(100.0)).abs() < EPS);
    assert!(get_point_along_path(&r, 0.5).unwrap().approx_eq(Point::new(50.0, 15.0), EPS));
}

#[test]
fn curve_length_exceeds_chord() {
    let r = route_curved(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
    assert!(r.length() > 100.0);
}

// =============================================================
// Sampling
// =============================================================

#[test]
fn polyline_sampling_is_by_arc_length() {
    let r = Route {
        routing_type: RoutingType::Orthogonal,
        geometry: PathGeometry::Polyline(vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0), Point::new(100.0, 100.0)]),
        degenerate: false,
    };
    assert!(get_point_along_path(&r, 0.5).unwrap().approx_eq(Point::new(100.0, 0.0), EPS));
    assert!(get_point_along_path(&r, 0.75).unwrap().approx_eq(Point::new(100.0, 50.0), EPS));
    assert!((get_angle_along_path(&r, 0.0).unwrap() - 0.0).abs() < EPS);
    assert!((get_angle_along_path(&r, 1.0).unwrap() - std::f64::consts::FRAC_PI_2).abs() < EPS);
}

#[test]
fn sampling_clamps_parameter() {
    let r = route_straight(Point::new(0.0, 0.0), Point::new(10.0, 0.0));
    assert_eq!(get_point_along_path(&r, -1.0), Some(Point::new(0.0, 0.0)));
    assert_eq!(get_point_along_path(&r, 2.0), Some(Point::new(10.0, 0.0)));
}

#[test]
fn svg_path_data_formats_commands() {
    let line = route_straight(Point::new(0.0, 0.0), Point::new(10.0, 5.0));
    assert_eq!(line.svg_path_data(), "M 0 0 L 10 5");
    let curve = route_curved(Point::new(0.0, 0.0), Point::new(100.0, 0.0));
    assert_eq!(curve.svg_path_data(), "M 0 0 Q 50 30 100 0");
}

#[test]
fn routing_type_serde_is_lowercase() {
    assert_eq!(serde_json::to_string(&RoutingType::Orthogonal).unwrap(), "\"orthogonal\"");
    let back: RoutingType = serde_json::from_str("\"curved\"").unwrap();
    assert_eq!(back, RoutingType::Curved);
}
