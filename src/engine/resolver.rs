// Resolution orchestration — cache consult, script invocation, run-state
// discipline around each call.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{ResolverConfig, EXECUTION_BACKOFF};
use crate::engine::cache::{fingerprint, ResolveCache};
use crate::engine::scheduler::{refresh_once, RefreshScheduler};
use crate::engine::status::{RunState, StatusSnapshot};
use crate::error::ResolverError;
use crate::script::invoke::{Resolver, ResolveRequest, ResolveResult, ScriptResolver};
use crate::script::store::ScriptStore;

/// Facade over the resolver subsystem: script store, result cache, refresh
/// scheduler, and the per-call execution discipline. One instance per
/// application, created at startup.
pub struct ResolverEngine {
    store: Arc<ScriptStore>,
    cache: Arc<ResolveCache>,
    resolver: Arc<dyn Resolver>,
    run: RunState,
    scheduler: RefreshScheduler,
}

impl ResolverEngine {
    /// Create an engine that shells out to the configured script.
    pub fn new(config: ResolverConfig) -> Result<Self, ResolverError> {
        let resolver = Arc::new(ScriptResolver::new(config.clone()));
        Self::with_resolver(config, resolver)
    }

    /// Create an engine with a custom resolution backend.
    pub fn with_resolver(
        config: ResolverConfig,
        resolver: Arc<dyn Resolver>,
    ) -> Result<Self, ResolverError> {
        if !config.work_dir.as_os_str().is_empty() {
            std::fs::create_dir_all(&config.work_dir)?;
        }
        let store = Arc::new(ScriptStore::new(config));
        let cache = Arc::new(ResolveCache::new());
        let scheduler = RefreshScheduler::new(Arc::clone(&store), Arc::clone(&cache));
        Ok(Self {
            store,
            cache,
            resolver,
            run: RunState::new(),
            scheduler,
        })
    }

    /// Install a script downloaded from `source_url`.
    pub async fn install(&self, source_url: &str) -> Result<(), ResolverError> {
        match self.store.install(source_url).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.run.record_error(e.to_string());
                Err(e)
            }
        }
    }

    /// Install the bundled reference script, overwriting any existing one.
    pub async fn install_template(&self) -> Result<(), ResolverError> {
        self.store.install_template().await
    }

    /// Self-check the installed script. `Ok(true)` means the readiness token
    /// was emitted.
    pub async fn check_health(&self) -> Result<bool, ResolverError> {
        self.store.check_health().await
    }

    /// Resolve one request.
    ///
    /// Failures never propagate: they are absorbed into `None` and recorded
    /// as the last error. Callers must treat `None` as "resolution
    /// unavailable" and fall back to the original URL — it is not a
    /// retryable signal.
    pub async fn resolve(&self, request: &ResolveRequest) -> Option<ResolveResult> {
        let key = fingerprint(&request.url, &request.headers);

        if let Some(hit) = self.cache.get(&key) {
            debug!("cache hit for {:?}", request.display_name);
            return Some(hit);
        }

        match self.resolve_uncached(request, &key).await {
            Ok(result) => {
                self.run.record_success();
                Some(result)
            }
            Err(e) => {
                warn!("resolution of {:?} failed: {}", request.display_name, e);
                self.run.record_error(e.to_string());
                None
            }
        }
    }

    async fn resolve_uncached(
        &self,
        request: &ResolveRequest,
        key: &str,
    ) -> Result<ResolveResult, ResolverError> {
        if !self.store.exists() {
            return Err(ResolverError::ProgramMissing);
        }

        // Cooperative throttle, not a queue: wait once if another invocation
        // is in flight, then proceed regardless. Per-call artifact names keep
        // the overlap safe.
        if self.run.is_executing() {
            debug!("another resolution in flight, backing off");
            tokio::time::sleep(EXECUTION_BACKOFF).await;
        }

        self.run.set_executing(true);
        let outcome = self.resolver.resolve(request).await;
        self.run.set_executing(false);

        let result = outcome?;
        self.cache.put(key.to_string(), result.clone());
        Ok(result)
    }

    /// Start periodic refresh with an "H:MM" interval.
    pub async fn schedule_refresh(&self, interval_spec: &str) -> Result<(), ResolverError> {
        self.scheduler.schedule(interval_spec).await
    }

    /// Stop the refresh timer. Returns whether one was active.
    pub async fn stop_refresh(&self) -> bool {
        self.scheduler.stop().await
    }

    /// Run one refresh pass immediately — exactly what a timer tick does.
    pub async fn refresh_once(&self) {
        refresh_once(&self.store, &self.cache).await;
    }

    /// Drop all cached resolutions.
    pub fn clear_cache(&self) {
        self.cache.clear();
        info!("resolve cache cleared");
    }

    /// Read-only health snapshot for the admin surface.
    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            executing: self.run.is_executing(),
            last_execution_at: self.run.last_execution_at(),
            last_error: self.run.last_error(),
            script_installed: self.store.exists(),
            source_url: self.store.source_url(),
            interval: self.scheduler.human_interval(),
            schedule_active: self.scheduler.is_active(),
            cache_entries: self.cache.size(),
            script_version: self.store.version(),
        }
    }

    pub fn store(&self) -> &ScriptStore {
        &self.store
    }

    pub fn cache(&self) -> &ResolveCache {
        &self.cache
    }
}
