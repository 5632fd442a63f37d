// Scheduled script refresh — periodic re-install from the recorded source,
// then unconditional cache invalidation.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::engine::cache::ResolveCache;
use crate::error::ResolverError;
use crate::script::store::ScriptStore;

struct ActiveSchedule {
    cron_expr: String,
    human_interval: String,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the single refresh timer. Never bypasses the store or cache public
/// operations; never runs two timers concurrently.
pub struct RefreshScheduler {
    store: Arc<ScriptStore>,
    cache: Arc<ResolveCache>,
    active: Mutex<Option<ActiveSchedule>>,
}

impl RefreshScheduler {
    pub fn new(store: Arc<ScriptStore>, cache: Arc<ResolveCache>) -> Self {
        Self {
            store,
            cache,
            active: Mutex::new(None),
        }
    }

    /// Parse an "H:MM" (or bare "MM") operator interval into a period.
    fn parse_interval(spec: &str) -> Result<Duration, ResolverError> {
        let invalid = |detail: &str| ResolverError::InvalidSchedule {
            spec: spec.to_string(),
            detail: detail.to_string(),
        };

        let (hours, minutes) = match spec.split_once(':') {
            Some((h, m)) => (
                h.trim()
                    .parse::<u64>()
                    .map_err(|_| invalid("hours are not a number"))?,
                m.trim()
                    .parse::<u64>()
                    .map_err(|_| invalid("minutes are not a number"))?,
            ),
            None => (
                0,
                spec.trim()
                    .parse::<u64>()
                    .map_err(|_| invalid("minutes are not a number"))?,
            ),
        };

        if hours > 23 {
            return Err(invalid("hours must be 0-23"));
        }
        if minutes > 59 {
            return Err(invalid("minutes must be 0-59"));
        }
        let total_minutes = hours * 60 + minutes;
        if total_minutes == 0 {
            return Err(invalid("interval must be longer than zero"));
        }
        Ok(Duration::from_secs(total_minutes * 60))
    }

    /// Cron-style rendering of the interval, for display only.
    fn render_cron(period: Duration) -> String {
        let total_minutes = period.as_secs() / 60;
        if total_minutes % 60 == 0 && total_minutes >= 60 {
            format!("0 */{} * * *", total_minutes / 60)
        } else {
            format!("*/{total_minutes} * * * *")
        }
    }

    /// Install a refresh timer. Any previous timer is fully torn down before
    /// the new one starts.
    pub async fn schedule(&self, interval_spec: &str) -> Result<(), ResolverError> {
        let period = Self::parse_interval(interval_spec)?;

        self.stop().await;

        let cancel = CancellationToken::new();
        let store = Arc::clone(&self.store);
        let cache = Arc::clone(&self.cache);
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let mut timer = tokio::time::interval(period);
            // interval() fires at once; swallow that tick so the first
            // refresh happens one full period from now.
            timer.tick().await;
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = timer.tick() => refresh_once(&store, &cache).await,
                }
            }
            debug!("refresh timer stopped");
        });

        let cron_expr = Self::render_cron(period);
        info!(
            "scheduled script refresh every {:?} ({})",
            interval_spec, cron_expr
        );
        *self.active.lock() = Some(ActiveSchedule {
            cron_expr,
            human_interval: interval_spec.to_string(),
            cancel,
            task,
        });
        Ok(())
    }

    /// Cancel the active timer, if any. Idempotent; returns whether a timer
    /// was active.
    pub async fn stop(&self) -> bool {
        let previous = self.active.lock().take();
        match previous {
            Some(schedule) => {
                schedule.cancel.cancel();
                if let Err(e) = schedule.task.await {
                    warn!("refresh timer task failed: {}", e);
                }
                info!(
                    "stopped script refresh timer ({})",
                    schedule.human_interval
                );
                true
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.lock().is_some()
    }

    /// The operator's original interval string, for display.
    pub fn human_interval(&self) -> Option<String> {
        self.active.lock().as_ref().map(|s| s.human_interval.clone())
    }

    pub fn cron_expr(&self) -> Option<String> {
        self.active.lock().as_ref().map(|s| s.cron_expr.clone())
    }
}

/// One refresh pass, exactly what a timer tick runs: re-install from the
/// recorded source if there is one, then always clear the cache. The clear
/// happens even when the re-install fails — safety over cache-hit
/// efficiency.
pub async fn refresh_once(store: &ScriptStore, cache: &ResolveCache) {
    if let Some(source_url) = store.source_url() {
        if let Err(e) = store.install(&source_url).await {
            warn!("scheduled re-install from {} failed: {}", source_url, e);
        }
    }
    cache.clear();
    debug!("refresh pass complete, cache cleared");
}
