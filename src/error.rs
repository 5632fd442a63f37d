use std::path::PathBuf;

use thiserror::Error;

/// Failure classes of the resolver engine.
///
/// All of these stop at the operation boundary: administrative calls report
/// them as a failed result, and a resolution caller only ever observes a
/// missing result plus the recorded last error.
#[derive(Debug, Error)]
pub enum ResolverError {
    /// Downloaded script body carries no resolver entry-point marker.
    #[error("script has no resolver entry point")]
    InvalidProgram,

    #[error("script storage failed: {0}")]
    Storage(#[from] std::io::Error),

    #[error("script download failed: {0}")]
    Download(#[from] reqwest::Error),

    #[error("resolver script not found at {path:?}")]
    NotFound { path: PathBuf },

    #[error("script runtime {runtime:?} is not invocable: {detail}")]
    RuntimeUnavailable { runtime: String, detail: String },

    #[error("invalid refresh interval {spec:?}: {detail}")]
    InvalidSchedule { spec: String, detail: String },

    /// Resolution was requested while no script is installed.
    #[error("no resolver script is installed")]
    ProgramMissing,

    /// The script exited cleanly but wrote no output artifact.
    #[error("script wrote no output artifact at {path:?}")]
    OutputMissing { path: PathBuf },

    /// Output artifact exists but is not the expected JSON shape. The raw
    /// content is kept for diagnostics.
    #[error("script output is not valid JSON: {detail} (raw: {raw:?})")]
    ResultParse { detail: String, raw: String },

    /// Spawn failure or non-zero exit of the script process.
    #[error("script execution failed: {detail}")]
    ProcessExecution { detail: String },
}
