use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// How long a cached resolution stays valid (20 minutes).
pub const RESOLVE_CACHE_TTL: Duration = Duration::from_secs(20 * 60);

/// Cooperative backoff when another invocation is already in flight.
pub const EXECUTION_BACKOFF: Duration = Duration::from_millis(500);

/// Token a script must print on `--check` to be considered ready.
pub const READY_TOKEN: &str = "resolver_ready";

/// Entry-point marker for single-link resolution.
pub const LINK_MARKER: &str = "def resolve_link";

/// Entry-point marker for stream resolution.
pub const STREAM_MARKER: &str = "def resolve_stream";

/// Top-level configuration for the resolver engine.
#[derive(Debug, Clone, Deserialize)]
pub struct ResolverConfig {
    /// Fixed on-disk location of the active resolver script.
    pub script_path: PathBuf,
    /// Directory holding the per-call request/response artifacts.
    pub work_dir: PathBuf,
    /// Interpreter used to run the script.
    pub runtime_bin: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            script_path: PathBuf::from("resolver.py"),
            work_dir: PathBuf::new(),
            runtime_bin: "python3".to_string(),
        }
    }
}
