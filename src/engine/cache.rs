// Time-bounded resolution cache keyed by request fingerprint.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::RESOLVE_CACHE_TTL;
use crate::script::invoke::ResolveResult;

/// Fingerprint for a resolution request: the URL plus the canonical JSON
/// form of its headers (the BTreeMap keeps key order deterministic).
pub fn fingerprint(url: &str, headers: &BTreeMap<String, String>) -> String {
    let canonical = serde_json::to_string(headers).unwrap_or_default();
    format!("{url}|{canonical}")
}

struct CacheEntry {
    result: ResolveResult,
    stored_at: Instant,
}

/// Bounded-lifetime memoization of resolutions. Entries are never mutated
/// after creation; a stale entry is ignored on lookup, never refreshed in
/// place. Uses the tokio clock so tests can advance time deterministically.
pub struct ResolveCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
    ttl: Duration,
}

impl ResolveCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: RESOLVE_CACHE_TTL,
        }
    }

    /// Return the cached result if present and younger than the TTL.
    pub fn get(&self, fingerprint: &str) -> Option<ResolveResult> {
        let entries = self.entries.lock();
        let entry = entries.get(fingerprint)?;
        if entry.stored_at.elapsed() < self.ttl {
            Some(entry.result.clone())
        } else {
            None
        }
    }

    pub fn put(&self, fingerprint: String, result: ResolveResult) {
        let mut entries = self.entries.lock();
        entries.insert(
            fingerprint,
            CacheEntry {
                result,
                stored_at: Instant::now(),
            },
        );
    }

    /// Drop every entry. Called after each script re-install, because a new
    /// script version may resolve the same input differently.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn size(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for ResolveCache {
    fn default() -> Self {
        Self::new()
    }
}
