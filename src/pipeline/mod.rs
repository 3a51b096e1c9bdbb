//! The asset pipeline: registry, execution and caching.
//!
//! # Flow
//!
//! ```text
//! route ─► resolve ─► fingerprint ─► cache? ──hit──► content
//!             │                        │miss
//!             │ (no asset)             ▼
//!             └─► raw file       claim flight ─follower─► wait for leader
//!                                      │leader
//!                                      ▼
//!                          watch sources ─► run ─► publish ─► broadcast
//! ```

mod flight;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::FxHashMap;

use crate::asset::{Asset, decode_text};
use crate::cache::{CacheStats, Cached, ResultCache};
use crate::error::{PipelineError, Result};
use crate::fingerprint::{Fingerprint, RequestContext, raw_key};
use crate::provider::FileProvider;
use crate::transform::SharedTransform;
use crate::utils::path::{normalize_route, normalized_to_relative_path, route_key};

use flight::{Claim, Flights};

/// How a result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Served from the cache
    Hit,
    /// Computed by this call
    Computed,
    /// Computed by a concurrent call for the same fingerprint
    Joined,
}

/// Result of [`AssetPipeline::execute`].
#[derive(Debug, Clone)]
pub struct Output {
    pub content: Arc<str>,
    /// Files whose change invalidates `content`, in registration order
    pub files: Arc<[PathBuf]>,
    pub fingerprint: Fingerprint,
    pub lookup: Lookup,
}

impl Output {
    fn new(value: Cached, fingerprint: Fingerprint, lookup: Lookup) -> Self {
        Self {
            content: value.content,
            files: value.files,
            fingerprint,
            lookup,
        }
    }
}

/// Registry of assets plus the shared cache in front of them.
pub struct AssetPipeline {
    assets: RwLock<FxHashMap<String, Arc<Asset>>>,
    provider: Arc<dyn FileProvider>,
    cache: Arc<ResultCache>,
    flights: Flights,
}

impl AssetPipeline {
    pub fn new(provider: Arc<dyn FileProvider>) -> Self {
        Self::with_cache(provider, Arc::new(ResultCache::new()))
    }

    pub fn with_cache(provider: Arc<dyn FileProvider>, cache: Arc<ResultCache>) -> Self {
        Self {
            assets: RwLock::new(FxHashMap::default()),
            provider,
            cache,
            flights: Flights::new(),
        }
    }

    pub fn provider(&self) -> &Arc<dyn FileProvider> {
        &self.provider
    }

    pub fn cache(&self) -> &Arc<ResultCache> {
        &self.cache
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Register an asset under `route`.
    pub fn register<I, P>(
        &self,
        route: &str,
        files: I,
        transforms: Vec<SharedTransform>,
    ) -> Result<Arc<Asset>>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let normalized = normalize_route(route);
        if normalized == "/" {
            return Err(PipelineError::invalid(route, "route must name a file"));
        }

        let files: Vec<PathBuf> = files.into_iter().map(Into::into).collect();
        if files.is_empty() {
            return Err(PipelineError::invalid(
                normalized,
                "at least one source file is required",
            ));
        }

        let asset = Arc::new(Asset::new(normalized, files, transforms));
        let mut assets = self.assets.write();
        if assets.contains_key(asset.key()) {
            return Err(PipelineError::DuplicateRoute(asset.route().to_string()));
        }
        assets.insert(asset.key().to_string(), Arc::clone(&asset));

        crate::debug!("bundle"; "registered {} ({} sources)", asset.route(), asset.sources().len());
        Ok(asset)
    }

    /// Case-insensitive lookup. Query and fragment are ignored.
    pub fn resolve(&self, route: &str) -> Option<Arc<Asset>> {
        self.assets.read().get(&route_key(route)).cloned()
    }

    /// All registered assets, ordered by route.
    pub fn assets(&self) -> Vec<Arc<Asset>> {
        let mut assets: Vec<_> = self.assets.read().values().cloned().collect();
        assets.sort_by(|a, b| a.key().cmp(b.key()));
        assets
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Produce the content for `route`.
    ///
    /// Registered assets are fingerprinted, served from cache or run once per
    /// fingerprint no matter how many callers ask concurrently. Unregistered
    /// routes fall back to the raw file of the same path.
    pub fn execute(&self, route: &str, context: &RequestContext) -> Result<Output> {
        match self.resolve(route) {
            Some(asset) => {
                let key = asset.fingerprint(context);
                let files: Arc<[PathBuf]> = asset.sources().into();
                self.cached_or_compute(key, asset.route(), files, || asset.run(&*self.provider))
            }
            None => {
                let normalized = normalize_route(route);
                let path = normalized_to_relative_path(&normalized)
                    .ok_or_else(|| PipelineError::AssetNotFound(normalized.clone()))?;
                let files: Arc<[PathBuf]> = Arc::from(vec![path.clone()]);
                self.cached_or_compute(raw_key(&normalized), &normalized, files, || {
                    let bytes = self.read_raw(&normalized, &path)?;
                    decode_text(&path, bytes)
                })
            }
        }
    }

    /// Read the raw file behind `route`, no transforms applied.
    pub fn default_resolver(&self, route: &str) -> Result<Vec<u8>> {
        let normalized = normalize_route(route);
        let path = normalized_to_relative_path(&normalized)
            .ok_or_else(|| PipelineError::AssetNotFound(normalized.clone()))?;
        self.read_raw(&normalized, &path)
    }

    fn read_raw(&self, route: &str, path: &Path) -> Result<Vec<u8>> {
        self.provider.read_file(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => PipelineError::AssetNotFound(route.to_string()),
            _ => PipelineError::source_read(path, e),
        })
    }

    /// Execute several routes in parallel.
    pub fn execute_many<S>(&self, routes: &[S], context: &RequestContext) -> Vec<Result<Output>>
    where
        S: AsRef<str> + Sync,
    {
        routes
            .par_iter()
            .map(|route| self.execute(route.as_ref(), context))
            .collect()
    }

    /// [`Self::execute`] on tokio's blocking pool.
    ///
    /// Dropping the returned future only abandons the wait: the computation
    /// still completes and publishes, so other callers are unaffected.
    pub async fn execute_async(
        self: &Arc<Self>,
        route: impl Into<String>,
        context: RequestContext,
    ) -> Result<Output> {
        let pipeline = Arc::clone(self);
        let route = route.into();
        let display = normalize_route(&route);
        tokio::task::spawn_blocking(move || pipeline.execute(&route, &context))
            .await
            .unwrap_or_else(|_| Err(PipelineError::Aborted(display)))
    }

    fn cached_or_compute(
        &self,
        key: Fingerprint,
        route: &str,
        files: Arc<[PathBuf]>,
        compute: impl FnOnce() -> Result<String>,
    ) -> Result<Output> {
        if let Some(hit) = self.cache.get(&key) {
            return Ok(Output::new(hit, key, Lookup::Hit));
        }

        let leader = match self.flights.claim(key) {
            Claim::Leader(leader) => leader,
            Claim::Follower(rx) => {
                let value = flight::wait(rx, route)?;
                return Ok(Output::new(value, key, Lookup::Joined));
            }
        };

        // The previous leader may have published between our miss and claim.
        if let Some(hit) = self.cache.peek(&key) {
            let _ = leader.complete(Ok(hit.clone()));
            return Ok(Output::new(hit, key, Lookup::Hit));
        }

        crate::debug!("cache"; "miss {} ({})", route, key);
        let reservation = self.cache.reserve(key, &files, &*self.provider);

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(compute))
            .unwrap_or_else(|_| Err(PipelineError::Aborted(route.to_string())))
            .map(|content| Cached::new(content, files));

        match &outcome {
            Ok(value) => {
                if !reservation.publish(value.clone()) {
                    crate::debug!("cache"; "{} served uncached", route);
                }
            }
            Err(e) => {
                crate::debug!("bundle"; "{}: {}", route, e);
                drop(reservation);
            }
        }

        leader
            .complete(outcome)
            .map(|value| Output::new(value, key, Lookup::Computed))
    }
}

impl std::fmt::Debug for AssetPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetPipeline")
            .field("assets", &self.assets.read().len())
            .field("cache", &self.cache)
            .field("in_flight", &self.flights.len())
            .finish()
    }
}
