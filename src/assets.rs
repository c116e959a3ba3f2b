//! Icon and asset lookup over an injected storage service.
//!
//! DESIGN
//! ======
//! The asset store itself is an external collaborator; this module consumes
//! only its read contract ([`AssetService`]). [`AssetResolver`] sits in front
//! of the service and adds three things:
//!
//! - a positive cache keyed by asset id (misses are not cached, so assets
//!   added later are found on the next lookup);
//! - a pending-request map of shared futures, so N concurrent lookups for
//!   the same id produce one fetch;
//! - batched resolution: every uncached id in a `resolve_many` call goes to
//!   the service in one `fetch_many` request.
//!
//! The resolver's lock is a std `Mutex` that is never held across an await.
//! Timeouts are the service's responsibility.

#[cfg(test)]
#[path = "assets_test.rs"]
mod assets_test;

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared, join_all};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

// =============================================================================
// TYPES
// =============================================================================

/// A stored icon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: String,
    pub name: String,
    /// SVG markup of the icon.
    pub vector_markup: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Asset {
    /// Width / height of the icon's `viewBox`, when it declares one.
    #[must_use]
    pub fn aspect_ratio(&self) -> Option<f64> {
        view_box_aspect(&self.vector_markup)
    }
}

/// Errors produced by asset lookups.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AssetError {
    /// The backing service failed the request.
    #[error("asset service failed: {0}")]
    Service(String),

    /// The resolver was disposed and accepts no further lookups.
    #[error("asset resolver disposed")]
    Disposed,
}

impl crate::error::ErrorCode for AssetError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Service(_) => "E_ASSET_SERVICE",
            Self::Disposed => "E_ASSET_RESOLVER_DISPOSED",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Service(_))
    }
}

/// Outcome of a batched resolution.
#[derive(Debug, Default)]
pub struct BatchResolution {
    /// Every id that resolved, from cache or service.
    pub assets: HashMap<String, Arc<Asset>>,
    /// Ids the service does not know.
    pub missing: Vec<String>,
    /// Ids whose lookup failed outright.
    pub failures: Vec<(String, AssetError)>,
    /// Ids this call actually sent to the service.
    pub fetched: usize,
}

// =============================================================================
// SERVICE CONTRACT
// =============================================================================

/// Read contract of the external asset store. Enables mocking in tests.
#[async_trait::async_trait]
pub trait AssetService: Send + Sync {
    /// Fetch one asset; `Ok(None)` when the id is unknown.
    ///
    /// # Errors
    ///
    /// Returns an [`AssetError`] if the store cannot be reached.
    async fn fetch(&self, id: &str) -> Result<Option<Asset>, AssetError>;

    /// Fetch several assets in one request. Unknown ids are simply absent
    /// from the result.
    ///
    /// # Errors
    ///
    /// Returns an [`AssetError`] if the store cannot be reached.
    async fn fetch_many(&self, ids: &[String]) -> Result<Vec<Asset>, AssetError> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(asset) = self.fetch(id).await? {
                out.push(asset);
            }
        }
        Ok(out)
    }

    /// Assets whose name, id or category matches `query`.
    ///
    /// # Errors
    ///
    /// Returns an [`AssetError`] if the store cannot be reached.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Asset>, AssetError>;
}

// =============================================================================
// IN-MEMORY SERVICE
// =============================================================================

/// An [`AssetService`] over a fixed in-memory catalogue.
///
/// Counts requests so callers can observe caching and batching.
#[derive(Debug, Default)]
pub struct MemoryAssetService {
    assets: BTreeMap<String, Asset>,
    latency: Option<Duration>,
    fetches: AtomicUsize,
    batches: AtomicUsize,
}

impl MemoryAssetService {
    #[must_use]
    pub fn new(assets: impl IntoIterator<Item = Asset>) -> Self {
        Self { assets: assets.into_iter().map(|a| (a.id.clone(), a)).collect(), ..Self::default() }
    }

    /// Load a catalogue from a JSON array of assets.
    ///
    /// # Errors
    ///
    /// Returns the parse error if the JSON is not an asset array.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let assets: Vec<Asset> = serde_json::from_str(json)?;
        Ok(Self::new(assets))
    }

    /// Delay every request by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of single-id fetches served.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Number of batch requests served.
    pub fn batch_count(&self) -> usize {
        self.batches.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait::async_trait]
impl AssetService for MemoryAssetService {
    async fn fetch(&self, id: &str) -> Result<Option<Asset>, AssetError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        Ok(self.assets.get(id).cloned())
    }

    async fn fetch_many(&self, ids: &[String]) -> Result<Vec<Asset>, AssetError> {
        self.batches.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        Ok(ids.iter().filter_map(|id| self.assets.get(id).cloned()).collect())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Asset>, AssetError> {
        let needle = query.to_lowercase();
        Ok(self
            .assets
            .values()
            .filter(|a| {
                a.id.to_lowercase().contains(&needle)
                    || a.name.to_lowercase().contains(&needle)
                    || a.category
                        .as_deref()
                        .is_some_and(|c| c.to_lowercase().contains(&needle))
            })
            .take(limit)
            .cloned()
            .collect())
    }
}

// =============================================================================
// RESOLVER
// =============================================================================

type Lookup = Result<Option<Arc<Asset>>, AssetError>;
type PendingLookup = Shared<BoxFuture<'static, Lookup>>;
type BatchLookup = Result<Arc<HashMap<String, Arc<Asset>>>, AssetError>;

struct ResolverInner {
    cache: HashMap<String, Arc<Asset>>,
    pending: HashMap<String, PendingLookup>,
    disposed: bool,
}

/// Cached, deduplicating front of an [`AssetService`].
pub struct AssetResolver {
    service: Arc<dyn AssetService>,
    inner: Mutex<ResolverInner>,
}

impl AssetResolver {
    #[must_use]
    pub fn new(service: Arc<dyn AssetService>) -> Self {
        Self {
            service,
            inner: Mutex::new(ResolverInner { cache: HashMap::new(), pending: HashMap::new(), disposed: false }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ResolverInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve one asset id; `Ok(None)` when the service does not know it.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::Disposed`] after [`dispose`](Self::dispose), or
    /// the service's error.
    pub async fn resolve(&self, id: &str) -> Lookup {
        let lookup = {
            let mut inner = self.lock();
            if inner.disposed {
                return Err(AssetError::Disposed);
            }
            if let Some(asset) = inner.cache.get(id) {
                return Ok(Some(Arc::clone(asset)));
            }
            if let Some(pending) = inner.pending.get(id) {
                debug!(asset_id = %id, "assets: joining pending lookup");
                pending.clone()
            } else {
                let service = Arc::clone(&self.service);
                let key = id.to_owned();
                let lookup = async move { service.fetch(&key).await.map(|a| a.map(Arc::new)) }
                    .boxed()
                    .shared();
                inner.pending.insert(id.to_owned(), lookup.clone());
                lookup
            }
        };

        let result = lookup.clone().await;
        self.settle(id, &lookup, &result);
        result
    }

    /// Resolve many ids with at most one service request.
    ///
    /// Cached ids are answered immediately, ids already in flight join their
    /// pending lookup, and the rest go out as a single `fetch_many` batch.
    /// Duplicate ids are resolved once.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::Disposed`] after [`dispose`](Self::dispose).
    /// Service failures are reported per id in [`BatchResolution::failures`].
    pub async fn resolve_many(&self, ids: &[String]) -> Result<BatchResolution, AssetError> {
        let mut resolution = BatchResolution::default();
        let mut waiting: Vec<(String, PendingLookup)> = Vec::new();
        {
            let mut inner = self.lock();
            if inner.disposed {
                return Err(AssetError::Disposed);
            }

            let mut seen = HashSet::new();
            let mut to_fetch = Vec::new();
            for id in ids {
                if !seen.insert(id.as_str()) {
                    continue;
                }
                if let Some(asset) = inner.cache.get(id) {
                    resolution.assets.insert(id.clone(), Arc::clone(asset));
                } else if let Some(pending) = inner.pending.get(id) {
                    waiting.push((id.clone(), pending.clone()));
                } else {
                    to_fetch.push(id.clone());
                }
            }

            if !to_fetch.is_empty() {
                resolution.fetched = to_fetch.len();
                let service = Arc::clone(&self.service);
                let batch_ids = to_fetch.clone();
                let batch: Shared<BoxFuture<'static, BatchLookup>> = async move {
                    let assets = service.fetch_many(&batch_ids).await?;
                    Ok(Arc::new(assets.into_iter().map(|a| (a.id.clone(), Arc::new(a))).collect()))
                }
                .boxed()
                .shared();

                // Each id gets its own pending entry that projects out of the
                // shared batch, so concurrent single lookups join it too.
                for id in to_fetch {
                    let key = id.clone();
                    let lookup = batch
                        .clone()
                        .map(move |r| r.map(|found| found.get(&key).cloned()))
                        .boxed()
                        .shared();
                    inner.pending.insert(id.clone(), lookup.clone());
                    waiting.push((id, lookup));
                }
            }
        }

        let results = join_all(waiting.into_iter().map(|(id, lookup)| async move {
            let result = lookup.clone().await;
            (id, lookup, result)
        }))
        .await;
        for (id, lookup, result) in results {
            self.settle(&id, &lookup, &result);
            match result {
                Ok(Some(asset)) => {
                    resolution.assets.insert(id, asset);
                }
                Ok(None) => resolution.missing.push(id),
                Err(e) => {
                    warn!(asset_id = %id, error = %e, "assets: lookup failed");
                    resolution.failures.push((id, e));
                }
            }
        }

        info!(
            requested = ids.len(),
            resolved = resolution.assets.len(),
            fetched = resolution.fetched,
            missing = resolution.missing.len(),
            "assets: batch resolved"
        );
        Ok(resolution)
    }

    /// Search the service catalogue. Results are not cached.
    ///
    /// # Errors
    ///
    /// Returns [`AssetError::Disposed`] after [`dispose`](Self::dispose), or
    /// the service's error.
    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Asset>, AssetError> {
        if self.lock().disposed {
            return Err(AssetError::Disposed);
        }
        self.service.search(query, limit).await
    }

    /// Cached asset, without touching the service.
    #[must_use]
    pub fn cached(&self, id: &str) -> Option<Arc<Asset>> {
        self.lock().cache.get(id).cloned()
    }

    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.lock().cache.len()
    }

    pub fn clear_cache(&self) {
        self.lock().cache.clear();
    }

    /// Drop all state and refuse further lookups.
    pub fn dispose(&self) {
        let mut inner = self.lock();
        inner.disposed = true;
        inner.cache.clear();
        inner.pending.clear();
    }

    /// Record a finished lookup. The pending entry is dropped only if it is
    /// still `lookup`; a newer request for the same id keeps its entry.
    fn settle(&self, id: &str, lookup: &PendingLookup, result: &Lookup) {
        let mut inner = self.lock();
        if inner.pending.get(id).is_some_and(|current| current.ptr_eq(lookup)) {
            inner.pending.remove(id);
        }
        if inner.disposed {
            return;
        }
        if let Ok(Some(asset)) = result {
            inner.cache.insert(id.to_owned(), Arc::clone(asset));
        }
    }
}

// =============================================================================
// VIEWBOX
// =============================================================================

/// Width / height of the first `viewBox` attribute in SVG markup.
#[must_use]
pub fn view_box_aspect(markup: &str) -> Option<f64> {
    let start = markup.find("viewBox=")? + "viewBox=".len();
    let rest = &markup[start..];
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let body = &rest[1..];
    let value = &body[..body.find(quote)?];

    let numbers: Vec<f64> = value
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .map(str::parse::<f64>)
        .collect::<Result<_, _>>()
        .unwrap_or_default();
    match numbers.as_slice() {
        [_, _, w, h] if *w > 0.0 && *h > 0.0 => Some(w / h),
        _ => None,
    }
}
