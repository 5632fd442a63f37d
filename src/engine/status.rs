// Run-state bookkeeping and the administrative status snapshot.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

/// Point-in-time view of the subsystem, assembled by the engine. Read-only.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub executing: bool,
    pub last_execution_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub script_installed: bool,
    pub source_url: Option<String>,
    pub interval: Option<String>,
    pub schedule_active: bool,
    pub cache_entries: usize,
    pub script_version: String,
}

/// Mutable execution bookkeeping shared across resolution calls.
pub struct RunState {
    executing: AtomicBool,
    last_execution_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            executing: AtomicBool::new(false),
            last_execution_at: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Relaxed)
    }

    pub fn set_executing(&self, value: bool) {
        self.executing.store(value, Ordering::Relaxed);
    }

    /// Record a completed resolution: stamp the time, clear the error.
    pub fn record_success(&self) {
        *self.last_execution_at.lock() = Some(Utc::now());
        *self.last_error.lock() = None;
    }

    pub fn record_error(&self, message: String) {
        *self.last_error.lock() = Some(message);
    }

    pub fn last_execution_at(&self) -> Option<DateTime<Utc>> {
        *self.last_execution_at.lock()
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}
