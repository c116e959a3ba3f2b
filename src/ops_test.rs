#![allow(clippy::float_cmp)]

use super::*;
use crate::config::EngineConfig;
use crate::engine::test_helpers::{catalogue, test_engine, test_engine_with};
use crate::geometry::Point;
use crate::layout::LayoutConfig;
use crate::render::IconVisual;
use crate::scene::Port;
use crate::scene::PortPosition;

async fn engine_with(nodes: &[(&str, f64, f64)]) -> Engine {
    let mut engine = test_engine();
    for (id, x, y) in nodes {
        engine.add_node(Node::new(*id, *x, *y)).await.unwrap();
    }
    engine
}

fn edge(id: &str, from: &str, to: &str) -> Connector {
    Connector::new(id, Endpoint::node(from), Endpoint::node(to), RoutingType::Straight)
}

fn add_edge(id: &str, from: &str, to: &str) -> Operation {
    Operation::AddConnector {
        id: Some(id.into()),
        from: Endpoint::node(from),
        to: Endpoint::node(to),
        routing_type: None,
        style: None,
        label: None,
    }
}

// =============================================================
// Nodes
// =============================================================

#[tokio::test]
async fn add_node_places_unpositioned_node_with_engine_layout() {
    let mut engine = test_engine();
    let id = engine.add_node(Node::unpositioned("n")).await.unwrap();
    assert_eq!(id, "n");
    let geometry = engine.target().node("n").unwrap().geometry;
    assert_eq!((geometry.transform.x, geometry.transform.y), (85.0, 85.0));
}

#[tokio::test]
async fn consecutive_unpositioned_nodes_take_successive_slots() {
    let mut engine = test_engine();
    for id in ["p", "q", "r"] {
        engine.add_node(Node::unpositioned(id)).await.unwrap();
    }
    let position = |id: &str| {
        let t = engine.target().node(id).unwrap().geometry.transform;
        (t.x, t.y)
    };
    assert_eq!(position("p"), (85.0, 85.0));
    assert_eq!(position("q"), (235.0, 85.0));
    assert_eq!(position("r"), (385.0, 85.0));
}

#[tokio::test]
async fn force_placement_avoids_existing_nodes() {
    let layout = LayoutConfig { algorithm: LayoutAlgorithm::Force, ..LayoutConfig::default() };
    let mut engine = test_engine_with(catalogue(), EngineConfig { layout, ..EngineConfig::default() });

    engine.add_node(Node::unpositioned("p")).await.unwrap();
    engine.add_node(Node::unpositioned("q")).await.unwrap();
    let p = engine.target().node("p").unwrap().geometry.center();
    let q = engine.target().node("q").unwrap().geometry.center();
    assert!(p.distance(q) > 1.0);
}

#[tokio::test]
async fn add_node_generates_missing_id() {
    let mut engine = test_engine();
    let id = engine.add_node(Node::new("", 0.0, 0.0)).await.unwrap();
    assert!(id.starts_with("node-"));
    assert!(engine.contains(&id));
}

#[tokio::test]
async fn add_node_rejects_duplicate_and_bad_geometry() {
    let mut engine = engine_with(&[("a", 0.0, 0.0)]).await;

    let err = engine.add_node(Node::new("a", 10.0, 10.0)).await.unwrap_err();
    assert_eq!(err.to_string(), "duplicate id: a");
    assert_eq!(err.error_code(), "E_DUPLICATE_ID");

    let flat = Node { w: 0.0, ..Node::new("b", 0.0, 0.0) };
    let err = engine.add_node(flat).await.unwrap_err();
    assert_eq!(err.error_code(), "E_INVALID_GEOMETRY");
    assert_eq!(engine.node_count(), 1);
}

#[tokio::test]
async fn add_node_with_unknown_icon_uses_placeholder() {
    let mut engine = test_engine();
    let node = Node { icon_ref: Some("ghost".into()), ..Node::new("a", 0.0, 0.0) };
    engine.add_node(node).await.unwrap();
    assert_eq!(engine.target().node("a").unwrap().icon, IconVisual::Placeholder("ghost".into()));

    let node = Node { icon_ref: Some("square".into()), ..Node::new("b", 0.0, 0.0) };
    engine.add_node(node).await.unwrap();
    assert!(matches!(engine.target().node("b").unwrap().icon, IconVisual::Asset(_)));
}

#[tokio::test]
async fn remove_node_cascades_to_attached_connectors() {
    let mut engine = engine_with(&[("a", 0.0, 0.0), ("b", 200.0, 0.0), ("c", 0.0, 200.0)]).await;
    engine.add_connector(edge("ab", "a", "b")).unwrap();
    engine.add_connector(edge("ca", "c", "a")).unwrap();
    engine.add_connector(edge("bc", "b", "c")).unwrap();
    assert_eq!(engine.connector_count(), 3);

    let mut removed = engine.remove_node("a").unwrap();
    removed.sort();
    assert_eq!(removed, vec!["ab".to_owned(), "ca".to_owned()]);
    assert_eq!(engine.connector_count(), 1);
    assert!(engine.attachments().connectors_for_node("a").is_empty());
    assert!(engine.attachments().get("ab").is_none());

    let scene = engine.export().scene;
    assert!(scene.connectors.iter().all(|c| !c.touches("a")));
    assert!(scene.node("a").is_none());
}

#[tokio::test]
async fn remove_node_unknown_or_wrong_kind() {
    let mut engine = engine_with(&[("a", 0.0, 0.0)]).await;
    engine.add_text(Text::new("t", 0.0, 0.0, "hi")).unwrap();
    assert_eq!(engine.remove_node("ghost").unwrap_err().to_string(), "node not found");
    assert_eq!(engine.remove_node("t").unwrap_err().error_code(), "E_NODE_NOT_FOUND");
    assert_eq!(engine.text_count(), 1);
}

#[tokio::test]
async fn update_node_reroutes_only_attached_connectors() {
    let mut engine = engine_with(&[("a", 0.0, 0.0), ("b", 200.0, 0.0), ("c", 400.0, 300.0)]).await;
    engine.add_connector(edge("ab", "a", "b")).unwrap();
    engine.add_connector(edge("bc", "b", "c")).unwrap();
    let ab_before = engine.target().connector("ab").unwrap().route.clone();
    let bc_before = engine.target().connector("bc").unwrap().route.clone();

    let patch = NodePatch { y: Some(200.0), ..NodePatch::default() };
    engine.update_node("a", &patch).unwrap();

    assert_ne!(engine.target().connector("ab").unwrap().route, ab_before);
    assert_eq!(engine.target().connector("bc").unwrap().route, bc_before);
    let node = engine.export().scene.node("a").cloned().unwrap();
    assert_eq!((node.x, node.y), (Some(0.0), Some(200.0)));
}

#[tokio::test]
async fn update_node_resizes_and_relabels() {
    let mut engine = engine_with(&[("a", 0.0, 0.0)]).await;
    let patch = NodePatch { w: Some(120.0), label: Some("core".into()), ..NodePatch::default() };
    engine.update_node("a", &patch).unwrap();

    let node = engine.target().node("a").unwrap();
    assert_eq!((node.geometry.width, node.geometry.height), (120.0, 80.0));
    assert_eq!(node.meta.label.as_deref(), Some("core"));
    assert!(engine.target_mut().drain_transform_changes().is_empty());
}

#[tokio::test]
async fn update_node_rejects_invalid_patch_without_mutating() {
    let mut engine = engine_with(&[("a", 0.0, 0.0)]).await;
    let before = engine.target().node("a").unwrap().geometry;

    let patch = NodePatch { x: Some(10.0), scale: Some(-1.0), ..NodePatch::default() };
    let err = engine.update_node("a", &patch).unwrap_err();
    assert_eq!(err.to_string(), "invalid geometry: scale must be positive");
    assert_eq!(engine.target().node("a").unwrap().geometry, before);

    let err = engine.update_node("ghost", &NodePatch::default()).unwrap_err();
    assert_eq!(err.error_code(), "E_NODE_NOT_FOUND");
}

// =============================================================
// Icons
// =============================================================

#[tokio::test]
async fn replace_icon_resizes_only_on_material_aspect_change() {
    let mut engine = test_engine();
    let node = Node { icon_ref: Some("square".into()), ..Node::new("a", 0.0, 0.0) };
    engine.add_node(node).await.unwrap();
    engine.add_node(Node::new("b", 200.0, 0.0)).await.unwrap();
    engine.add_connector(edge("ab", "a", "b")).unwrap();
    let route_before = engine.target().connector("ab").unwrap().route.clone();

    // 1:1 → 2:1 keeps the width and halves the height.
    assert!(engine.replace_icon("a", "wide").await.unwrap());
    let node = engine.target().node("a").unwrap();
    assert_eq!((node.geometry.width, node.geometry.height), (80.0, 40.0));
    assert_eq!(node.meta.icon_ref.as_deref(), Some("wide"));
    assert_ne!(engine.target().connector("ab").unwrap().route, route_before);

    // 2:1 → 1:1 restores a square box.
    assert!(engine.replace_icon("a", "tile").await.unwrap());
    assert_eq!(engine.target().node("a").unwrap().geometry.height, 80.0);

    // Same aspect: nothing moves.
    let route_before = engine.target().connector("ab").unwrap().route.clone();
    assert!(!engine.replace_icon("a", "square").await.unwrap());
    assert_eq!(engine.target().connector("ab").unwrap().route, route_before);
    assert_eq!(engine.target().node("a").unwrap().meta.icon_ref.as_deref(), Some("square"));
}

#[tokio::test]
async fn replace_icon_with_unknown_asset_keeps_old_icon() {
    let mut engine = test_engine();
    let node = Node { icon_ref: Some("square".into()), ..Node::new("a", 0.0, 0.0) };
    engine.add_node(node).await.unwrap();

    let err = engine.replace_icon("a", "ghost").await.unwrap_err();
    assert_eq!(err.to_string(), "icon not found: ghost");
    assert_eq!(engine.target().node("a").unwrap().meta.icon_ref.as_deref(), Some("square"));

    let err = engine.replace_icon("missing", "square").await.unwrap_err();
    assert_eq!(err.error_code(), "E_NODE_NOT_FOUND");
}

// =============================================================
// Connectors
// =============================================================

#[tokio::test]
async fn add_connector_with_missing_node_changes_nothing() {
    let mut engine = engine_with(&[("a", 0.0, 0.0)]).await;
    let result = engine.execute(add_edge("c1", "ghost", "a")).await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("node not found"));
    assert_eq!(result.code, Some("E_NODE_NOT_FOUND"));
    assert_eq!(engine.node_count(), 1);
    assert_eq!(engine.connector_count(), 0);
    assert!(engine.attachments().is_empty());
}

#[tokio::test]
async fn add_connector_with_unknown_port_is_rejected() {
    let mut engine = engine_with(&[("a", 0.0, 0.0), ("b", 200.0, 0.0)]).await;
    let connector = Connector::new("c1", Endpoint::port("a", "north"), Endpoint::node("b"), RoutingType::Straight);
    let err = engine.add_connector(connector).unwrap_err();
    assert_eq!(err.to_string(), "port not found");
    assert_eq!(engine.connector_count(), 0);
}

#[tokio::test]
async fn add_connector_defaults_routing_from_config() {
    let mut config = EngineConfig::default();
    config.routing = RoutingType::Orthogonal;
    let mut engine = test_engine_with(catalogue(), config);
    engine.add_node(Node::new("a", 0.0, 0.0)).await.unwrap();
    engine.add_node(Node::new("b", 200.0, 100.0)).await.unwrap();

    let op: Operation = serde_json::from_str(r#"{"op":"addConnector","from":{"nodeId":"a"},"to":{"nodeId":"b"}}"#).unwrap();
    let result = engine.execute(op).await;
    assert!(result.success);
    let id = result.id.unwrap();
    assert!(id.starts_with("conn-"));
    assert_eq!(engine.target().connector(&id).unwrap().routing_type, RoutingType::Orthogonal);
}

#[tokio::test]
async fn remove_connector_deregisters_only_itself() {
    let mut engine = engine_with(&[("a", 0.0, 0.0), ("b", 200.0, 0.0)]).await;
    engine.add_connector(edge("ab", "a", "b")).unwrap();
    engine.add_connector(edge("ba", "b", "a")).unwrap();

    engine.remove_connector("ab").unwrap();
    assert_eq!(engine.connector_count(), 1);
    assert_eq!(engine.attachments().connectors_for_node("a"), vec!["ba".to_owned()]);
    assert_eq!(engine.node_count(), 2);

    assert_eq!(engine.remove_connector("ab").unwrap_err().to_string(), "connector not found");
}

#[tokio::test]
async fn reattach_pins_end_and_survives_export() {
    let mut engine = engine_with(&[("a", 0.0, 0.0), ("b", 200.0, 0.0)]).await;
    engine.add_connector(edge("ab", "a", "b")).unwrap();
    assert!(!engine.attachments().get("ab").unwrap().from.pinned);

    engine.reattach_connector("ab", ConnectorEnd::From, "top").unwrap();

    let attachment = engine.attachments().get("ab").unwrap();
    assert!(attachment.from.pinned);
    assert_eq!(attachment.from.port_id.as_deref(), Some("top"));
    let (start, _) = engine.target().connector("ab").unwrap().route.endpoints().unwrap();
    assert!(start.approx_eq(Point::new(40.0, 0.0), 1e-9));

    let scene = engine.export().scene;
    let connector = scene.connector("ab").unwrap();
    assert_eq!(connector.from, Endpoint::port("a", "top"));
    assert_eq!(connector.to, Endpoint::node("b"));
}

#[tokio::test]
async fn reattach_rejects_unknown_port_and_connector() {
    let mut engine = test_engine();
    let custom = Node {
        ports: vec![Port::new("p1", PortPosition::Right)],
        ..Node::new("a", 0.0, 0.0)
    };
    engine.add_node(custom).await.unwrap();
    engine.add_node(Node::new("b", 200.0, 0.0)).await.unwrap();
    engine.add_connector(edge("ab", "a", "b")).unwrap();

    // Declared ports replace the default compass set.
    let err = engine.reattach_connector("ab", ConnectorEnd::From, "top").unwrap_err();
    assert!(matches!(err, OpError::PortNotFound { ref node_id, ref port_id } if node_id == "a" && port_id == "top"));
    assert!(!engine.attachments().get("ab").unwrap().from.pinned);

    engine.reattach_connector("ab", ConnectorEnd::From, "p1").unwrap();
    assert_eq!(
        engine.reattach_connector("zz", ConnectorEnd::To, "left").unwrap_err().error_code(),
        "E_CONNECTOR_NOT_FOUND"
    );
}

// =============================================================
// Texts
// =============================================================

#[tokio::test]
async fn texts_share_the_id_namespace() {
    let mut engine = engine_with(&[("a", 0.0, 0.0)]).await;
    let err = engine.add_text(Text::new("a", 0.0, 0.0, "clash")).unwrap_err();
    assert_eq!(err.error_code(), "E_DUPLICATE_ID");

    let id = engine.add_text(Text::new("", 5.0, 5.0, "note")).unwrap();
    assert!(id.starts_with("text-"));
    engine.remove_text(&id).unwrap();
    assert_eq!(engine.text_count(), 0);

    assert_eq!(engine.remove_text("a").unwrap_err().to_string(), "text not found");
    assert_eq!(engine.node_count(), 1);
}

#[tokio::test]
async fn add_text_rejects_non_finite_position() {
    let mut engine = test_engine();
    let err = engine.add_text(Text::new("t", f64::NAN, 0.0, "x")).unwrap_err();
    assert_eq!(err.to_string(), "invalid geometry: x must be finite");
    assert_eq!(engine.text_count(), 0);
}

// =============================================================
// Batches
// =============================================================

#[tokio::test]
async fn batch_keeps_successes_around_a_failure() {
    let mut engine = test_engine();
    let batch = vec![
        Operation::AddNode { node: Node::new("a", 0.0, 0.0) },
        Operation::AddNode { node: Node::new("b", 200.0, 0.0) },
        Operation::RemoveNode { id: "ghost".into() },
        add_edge("ab", "a", "b"),
        Operation::AddText { text: Text::new("t1", 100.0, 150.0, "link") },
    ];

    let results = engine.execute_batch(batch).await;
    let flags: Vec<bool> = results.iter().map(|r| r.success).collect();
    assert_eq!(flags, vec![true, true, false, true, true]);
    assert_eq!(results[2].error.as_deref(), Some("node not found"));

    let scene = engine.export().scene;
    assert_eq!(scene.nodes.len(), 2);
    assert!(scene.connector("ab").is_some());
    assert!(scene.text("t1").is_some());
}

#[tokio::test]
async fn batch_deserializes_from_json() {
    let mut engine = test_engine();
    let json = r#"[
        {"op":"addNode","node":{"id":"a","x":0,"y":0}},
        {"op":"addNode","node":{"id":"b","x":300,"y":0}},
        {"op":"addConnector","id":"ab","from":{"nodeId":"a"},"to":{"nodeId":"b"},"routingType":"curved"},
        {"op":"updateNode","id":"b","patch":{"x":320,"rotation":90}},
        {"op":"reattachConnector","id":"ab","end":"to","portId":"left"},
        {"op":"replaceIcon","nodeId":"a","iconRef":"wide"},
        {"op":"removeText","id":"nope"}
    ]"#;
    let ops: Vec<Operation> = serde_json::from_str(json).unwrap();
    let results = engine.execute_batch(ops).await;

    assert!(results[..6].iter().all(|r| r.success), "{results:?}");
    assert_eq!(results[6].code, Some("E_TEXT_NOT_FOUND"));
    assert_eq!(engine.target().connector("ab").unwrap().routing_type, RoutingType::Curved);
    assert_eq!(engine.target().node("b").unwrap().geometry.transform.rotation, 90.0);
}

#[test]
fn op_result_serializes_sparse() {
    let ok = serde_json::to_value(OpResult::ok("a")).unwrap();
    assert_eq!(ok, serde_json::json!({"success": true, "id": "a"}));

    let failed = serde_json::to_value(OpResult::failed(&OpError::NodeNotFound("x".into()))).unwrap();
    assert_eq!(
        failed,
        serde_json::json!({"success": false, "error": "node not found", "code": "E_NODE_NOT_FOUND"})
    );
}

#[test]
fn asset_errors_keep_their_code_and_retry_flag() {
    let err = OpError::from(AssetError::Service("timeout".into()));
    assert_eq!(err.error_code(), "E_ASSET_SERVICE");
    assert!(err.retryable());
    assert!(!OpError::DuplicateId("a".into()).retryable());
}
