use std::time::Duration;

use super::*;
use crate::error::ErrorCode;

fn icon(id: &str, name: &str, view_box: &str) -> Asset {
    Asset {
        id: id.into(),
        name: name.into(),
        vector_markup: format!(r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="{view_box}"><rect/></svg>"#),
        thumbnail: None,
        category: Some("network".into()),
    }
}

fn catalogue() -> Vec<Asset> {
    vec![icon("router", "Router", "0 0 64 64"), icon("server", "Rack Server", "0 0 128 64"), icon("cloud", "Cloud", "0 0 100 50")]
}

fn resolver_with(service: &Arc<MemoryAssetService>) -> AssetResolver {
    AssetResolver::new(Arc::clone(service) as Arc<dyn AssetService>)
}

// =============================================================
// viewBox
// =============================================================

#[test]
fn view_box_aspect_parses_four_numbers() {
    assert_eq!(view_box_aspect(r#"<svg viewBox="0 0 200 100">"#), Some(2.0));
    assert_eq!(view_box_aspect("<svg viewBox='0,0,30,60'>"), Some(0.5));
    assert_eq!(view_box_aspect(r#"<svg width="10">"#), None);
    assert_eq!(view_box_aspect(r#"<svg viewBox="0 0 0 10">"#), None);
    assert_eq!(view_box_aspect(r#"<svg viewBox="a b c d">"#), None);
}

#[test]
fn asset_json_is_camel_case() {
    let json = serde_json::to_value(icon("router", "Router", "0 0 1 1")).unwrap();
    assert!(json.get("vectorMarkup").is_some());
    assert!(json.get("thumbnail").is_none());
}

#[test]
fn memory_service_loads_from_json() {
    let service = MemoryAssetService::from_json(r#"[{"id":"a","name":"A","vectorMarkup":"<svg/>"}]"#).unwrap();
    assert_eq!(service.assets.len(), 1);
    assert!(MemoryAssetService::from_json("{}").is_err());
}

#[test]
fn error_codes() {
    assert_eq!(AssetError::Disposed.error_code(), "E_ASSET_RESOLVER_DISPOSED");
    assert!(AssetError::Service("down".into()).retryable());
}

// =============================================================
// Resolver
// =============================================================

#[tokio::test]
async fn resolve_caches_hits() {
    let service = Arc::new(MemoryAssetService::new(catalogue()));
    let resolver = resolver_with(&service);

    let first = resolver.resolve("router").await.unwrap().unwrap();
    let second = resolver.resolve("router").await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(service.fetch_count(), 1);
    assert_eq!(resolver.cache_len(), 1);
}

#[tokio::test]
async fn resolve_does_not_cache_misses() {
    let service = Arc::new(MemoryAssetService::new(catalogue()));
    let resolver = resolver_with(&service);

    assert!(resolver.resolve("nope").await.unwrap().is_none());
    assert!(resolver.resolve("nope").await.unwrap().is_none());
    assert_eq!(service.fetch_count(), 2);
}

#[tokio::test]
async fn concurrent_lookups_share_one_fetch() {
    let service = Arc::new(MemoryAssetService::new(catalogue()).with_latency(Duration::from_millis(20)));
    let resolver = resolver_with(&service);

    let (a, b, c) = tokio::join!(resolver.resolve("server"), resolver.resolve("server"), resolver.resolve("server"));
    assert_eq!(a.unwrap().unwrap().id, "server");
    assert!(b.unwrap().is_some());
    assert!(c.unwrap().is_some());
    assert_eq!(service.fetch_count(), 1);
}

#[tokio::test]
async fn resolve_many_uses_one_batch() {
    let service = Arc::new(MemoryAssetService::new(catalogue()));
    let resolver = resolver_with(&service);

    let ids: Vec<String> = ["router", "cloud", "router", "ghost"].iter().map(|s| (*s).to_owned()).collect();
    let batch = resolver.resolve_many(&ids).await.unwrap();
    assert_eq!(batch.assets.len(), 2);
    assert_eq!(batch.missing, vec!["ghost".to_owned()]);
    assert_eq!(batch.fetched, 3);
    assert!(batch.failures.is_empty());
    assert_eq!(service.batch_count(), 1);
    assert_eq!(service.fetch_count(), 0);

    // Second pass is served from cache except the unknown id.
    let again = resolver.resolve_many(&ids).await.unwrap();
    assert_eq!(again.assets.len(), 2);
    assert_eq!(again.fetched, 1);
    assert_eq!(service.batch_count(), 2);
}

#[tokio::test]
async fn single_lookup_joins_in_flight_batch() {
    let service = Arc::new(MemoryAssetService::new(catalogue()).with_latency(Duration::from_millis(20)));
    let resolver = resolver_with(&service);
    let ids = vec!["cloud".to_owned()];

    let (batch, single) = tokio::join!(resolver.resolve_many(&ids), async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        resolver.resolve("cloud").await
    });
    assert_eq!(batch.unwrap().assets.len(), 1);
    assert_eq!(single.unwrap().unwrap().id, "cloud");
    assert_eq!(service.batch_count(), 1);
    assert_eq!(service.fetch_count(), 0);
}

#[tokio::test]
async fn search_matches_name_id_and_category() {
    let service = Arc::new(MemoryAssetService::new(catalogue()));
    let resolver = resolver_with(&service);

    let by_name = resolver.search("rack", 10).await.unwrap();
    assert_eq!(by_name.len(), 1);
    assert_eq!(by_name[0].id, "server");
    assert_eq!(resolver.search("NETWORK", 2).await.unwrap().len(), 2);
    assert!(resolver.search("zzz", 10).await.unwrap().is_empty());
}

#[tokio::test]
async fn dispose_rejects_further_lookups() {
    let service = Arc::new(MemoryAssetService::new(catalogue()));
    let resolver = resolver_with(&service);
    resolver.resolve("router").await.unwrap();

    resolver.dispose();
    assert_eq!(resolver.cache_len(), 0);
    assert!(matches!(resolver.resolve("router").await, Err(AssetError::Disposed)));
    assert!(matches!(resolver.resolve_many(&["router".to_owned()]).await, Err(AssetError::Disposed)));
    assert!(matches!(resolver.search("r", 1).await, Err(AssetError::Disposed)));
}

#[tokio::test]
async fn clear_cache_forces_refetch() {
    let service = Arc::new(MemoryAssetService::new(catalogue()));
    let resolver = resolver_with(&service);
    resolver.resolve("router").await.unwrap();
    resolver.clear_cache();
    assert!(resolver.cached("router").is_none());
    resolver.resolve("router").await.unwrap();
    assert_eq!(service.fetch_count(), 2);
}

#[test]
fn finished_lookup_leaves_newer_pending_entry_alone() {
    let service = Arc::new(MemoryAssetService::new(catalogue()));
    let resolver = resolver_with(&service);
    let lookup = || -> PendingLookup {
        let missing: Lookup = Ok(None);
        async move { missing }.boxed().shared()
    };
    let earlier = lookup();
    let current = lookup();
    resolver.lock().pending.insert("ghost".into(), current.clone());

    // A late waiter from an earlier request must not drop the current one.
    resolver.settle("ghost", &earlier, &Ok(None));
    assert!(resolver.lock().pending.contains_key("ghost"));

    resolver.settle("ghost", &current, &Ok(None));
    assert!(resolver.lock().pending.is_empty());
}
