// Resolver orchestration engine — turns raw channel URLs into playable ones
// by driving an operator-supplied external script, with caching and
// scheduled refresh.

pub mod config;
pub mod engine;
pub mod error;
pub mod script;
pub mod server;

use std::sync::Once;

use tracing::info;
use tracing_subscriber::EnvFilter;

static INIT_TRACING: Once = Once::new();

/// Install the global tracing subscriber. Safe to call more than once.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,hyper=warn,reqwest=warn"));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init();

        info!("resolver engine tracing initialized");
    });
}
