// Per-call script invocation — one child process per resolution, file-based
// request/response protocol.

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

use crate::config::ResolverConfig;
use crate::error::ResolverError;

/// Input to one resolution. Immutable once constructed; the URL is opaque to
/// the engine beyond its use in the cache fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveRequest {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// For diagnostics only; forwarded to the script as `channel_name`.
    #[serde(default)]
    pub display_name: String,
    /// Forwarded verbatim to the script.
    #[serde(default)]
    pub proxy_config: Option<serde_json::Value>,
}

/// Output of one resolution, exactly as the script wrote it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolveResult {
    pub resolved_url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// On-disk request object. Field names are the script contract — operator
/// scripts in the wild depend on them.
#[derive(Serialize)]
struct WireRequest<'a> {
    url: &'a str,
    headers: &'a BTreeMap<String, String>,
    channel_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    proxy_config: Option<&'a serde_json::Value>,
}

/// Pluggable resolution backend. The production implementation shells out to
/// the installed script; tests may substitute their own.
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, request: &ResolveRequest) -> Result<ResolveResult, ResolverError>;
}

pub struct ScriptResolver {
    config: ResolverConfig,
    call_seq: AtomicU64,
}

impl ScriptResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            call_seq: AtomicU64::new(0),
        }
    }

    /// Reserve a unique input/output artifact pair. Uniqueness matters: the
    /// execution throttle is cooperative, so two invocations may overlap.
    fn next_artifact_paths(&self) -> (PathBuf, PathBuf) {
        let seq = self.call_seq.fetch_add(1, Ordering::Relaxed);
        let input = self.config.work_dir.join(format!("resolve-{seq}.in.json"));
        let output = self.config.work_dir.join(format!("resolve-{seq}.out.json"));
        (input, output)
    }
}

#[async_trait]
impl Resolver for ScriptResolver {
    async fn resolve(&self, request: &ResolveRequest) -> Result<ResolveResult, ResolverError> {
        let (input_path, output_path) = self.next_artifact_paths();

        let wire = WireRequest {
            url: &request.url,
            headers: &request.headers,
            channel_name: &request.display_name,
            proxy_config: request.proxy_config.as_ref(),
        };
        let body = serde_json::to_vec(&wire).map_err(|e| ResolverError::ProcessExecution {
            detail: format!("failed to encode request: {e}"),
        })?;
        tokio::fs::write(&input_path, &body).await?;

        debug!(
            "invoking resolver script for {:?} in={:?} out={:?}",
            request.display_name, input_path, output_path
        );

        let output = Command::new(&self.config.runtime_bin)
            .arg(&self.config.script_path)
            .arg("--resolve")
            .arg(&input_path)
            .arg(&output_path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ResolverError::ProcessExecution {
                detail: format!("failed to spawn {:?}: {e}", self.config.runtime_bin),
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(ResolverError::ProcessExecution {
                detail: format!("script exited with {}: {}", output.status, stderr.trim()),
            });
        }
        if !stderr.trim().is_empty() {
            // Diagnostics from an otherwise successful run don't fail the call.
            warn!("resolver script warnings: {}", stderr.trim());
        }

        let raw = match tokio::fs::read_to_string(&output_path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ResolverError::OutputMissing { path: output_path });
            }
            Err(e) => return Err(e.into()),
        };

        let result: ResolveResult =
            serde_json::from_str(&raw).map_err(|e| ResolverError::ResultParse {
                detail: e.to_string(),
                raw,
            })?;

        // Artifacts are transient; deletion failure is logged, not fatal.
        // Failed calls leave theirs behind for inspection.
        for path in [&input_path, &output_path] {
            if let Err(e) = tokio::fs::remove_file(path).await {
                warn!("failed to delete artifact {:?}: {}", path, e);
            }
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_request_field_names() {
        let headers = BTreeMap::from([("Referer".to_string(), "https://example.com".to_string())]);
        let wire = WireRequest {
            url: "http://source/ch1",
            headers: &headers,
            channel_name: "Channel One",
            proxy_config: None,
        };

        let json = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["url"], "http://source/ch1");
        assert_eq!(json["channel_name"], "Channel One");
        assert_eq!(json["headers"]["Referer"], "https://example.com");
        // Absent proxy config is omitted entirely, not serialized as null.
        assert!(json.get("proxy_config").is_none());

        let proxy = serde_json::json!({"mode": "socks5", "port": 1080});
        let wire = WireRequest {
            url: "http://source/ch1",
            headers: &headers,
            channel_name: "Channel One",
            proxy_config: Some(&proxy),
        };
        let json = serde_json::to_value(&wire).unwrap();
        // Present proxy config is forwarded verbatim.
        assert_eq!(json["proxy_config"], proxy);
    }

    #[test]
    fn test_result_headers_default_to_empty() {
        let result: ResolveResult =
            serde_json::from_str(r#"{"resolved_url":"http://cdn/x"}"#).unwrap();
        assert_eq!(result.resolved_url, "http://cdn/x");
        assert!(result.headers.is_empty());
    }
}
