// Resolver script lifecycle — download, validate, self-check, version probe.

use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{ResolverConfig, LINK_MARKER, READY_TOKEN, STREAM_MARKER};
use crate::error::ResolverError;

/// Bundled reference implementation of the script contract.
const TEMPLATE: &str = include_str!("resolver_template.py");

static VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"RESOLVER_VERSION\s*=\s*["']([^"']+)["']"#).unwrap());

#[derive(Debug, Default)]
struct InstallRecord {
    source_url: Option<String>,
    installed_at: Option<DateTime<Utc>>,
}

/// Owns the single active resolver script on disk.
///
/// Validation is deliberately shallow: the script's logic is opaque and
/// untrusted, so the store only checks that the artifact looks like a
/// resolver and that the runtime can execute something.
pub struct ScriptStore {
    config: ResolverConfig,
    record: Mutex<InstallRecord>,
}

impl ScriptStore {
    pub fn new(config: ResolverConfig) -> Self {
        Self {
            config,
            record: Mutex::new(InstallRecord::default()),
        }
    }

    /// Whether a script is present on disk.
    pub fn exists(&self) -> bool {
        self.config.script_path.exists()
    }

    /// Origin of the last downloaded script, if any. Scheduled refresh
    /// re-installs from this URL.
    pub fn source_url(&self) -> Option<String> {
        self.record.lock().source_url.clone()
    }

    pub fn installed_at(&self) -> Option<DateTime<Utc>> {
        self.record.lock().installed_at
    }

    /// Download a script from `source_url` and make it the active one.
    ///
    /// The body must contain at least one resolver entry-point marker; an
    /// invalid body fails the install and leaves the previously installed
    /// script untouched.
    pub async fn install(&self, source_url: &str) -> Result<(), ResolverError> {
        let response = reqwest::get(source_url).await?.error_for_status()?;
        let body = response.text().await?;

        if !body.contains(LINK_MARKER) && !body.contains(STREAM_MARKER) {
            warn!("rejected script from {}: no entry point marker", source_url);
            return Err(ResolverError::InvalidProgram);
        }

        self.write_script(&body).await?;

        let mut record = self.record.lock();
        record.source_url = Some(source_url.to_string());
        record.installed_at = Some(Utc::now());
        info!(
            "installed resolver script from {} ({} bytes)",
            source_url,
            body.len()
        );
        Ok(())
    }

    /// Overwrite the active script with the bundled reference implementation.
    pub async fn install_template(&self) -> Result<(), ResolverError> {
        self.write_script(TEMPLATE).await?;
        self.record.lock().installed_at = Some(Utc::now());
        info!("installed bundled resolver template");
        Ok(())
    }

    /// Replace the on-disk script via write-then-rename so an in-flight
    /// invocation never reads a half-written body.
    async fn write_script(&self, body: &str) -> Result<(), ResolverError> {
        if let Some(parent) = self.config.script_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let staged = self.config.script_path.with_extension("staged");
        tokio::fs::write(&staged, body).await?;
        tokio::fs::rename(&staged, &self.config.script_path).await?;
        Ok(())
    }

    /// Run the script self-check: the script must exist, the runtime must be
    /// invocable, and the script must print the readiness token.
    pub async fn check_health(&self) -> Result<bool, ResolverError> {
        if !self.exists() {
            return Err(ResolverError::NotFound {
                path: self.config.script_path.clone(),
            });
        }
        self.ensure_runtime().await?;

        let output = Command::new(&self.config.runtime_bin)
            .arg(&self.config.script_path)
            .arg("--check")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ResolverError::ProcessExecution {
                detail: format!("self-check spawn failed: {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        // The token may land on either stream depending on how the script logs.
        let ready = stdout.contains(READY_TOKEN) || stderr.contains(READY_TOKEN);
        debug!("script self-check ready={} status={}", ready, output.status);
        Ok(ready)
    }

    /// Check the configured runtime can be spawned at all.
    async fn ensure_runtime(&self) -> Result<(), ResolverError> {
        match Command::new(&self.config.runtime_bin)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(ResolverError::RuntimeUnavailable {
                runtime: self.config.runtime_bin.clone(),
                detail: "not found in PATH".to_string(),
            }),
            Err(e) => Err(ResolverError::RuntimeUnavailable {
                runtime: self.config.runtime_bin.clone(),
                detail: e.to_string(),
            }),
        }
    }

    /// Best-effort version probe from the script source text.
    pub fn version(&self) -> String {
        match std::fs::read_to_string(&self.config.script_path) {
            Ok(text) => VERSION_RE
                .captures(&text)
                .and_then(|c| c.get(1))
                .map_or_else(|| "N/A".to_string(), |m| m.as_str().to_string()),
            Err(e) if e.kind() == ErrorKind::NotFound => "N/A".to_string(),
            Err(_) => "Error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_carries_the_contract() {
        assert!(TEMPLATE.contains(LINK_MARKER));
        assert!(TEMPLATE.contains(STREAM_MARKER));
        assert!(TEMPLATE.contains(READY_TOKEN));
    }

    #[test]
    fn test_version_marker_extraction() {
        let caps = VERSION_RE.captures(TEMPLATE).unwrap();
        assert_eq!(caps.get(1).unwrap().as_str(), "1.0.0");

        assert!(VERSION_RE
            .captures("RESOLVER_VERSION = '2.3'")
            .is_some());
        assert!(VERSION_RE.captures("# no marker here").is_none());
    }
}
