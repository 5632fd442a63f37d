// Integration tests for the script store — install, validation, self-check.

use std::path::Path;

use axum::{routing::get, Router};
use tokio::net::TcpListener;

use ma_resolver_engine::config::ResolverConfig;
use ma_resolver_engine::error::ResolverError;
use ma_resolver_engine::script::store::ScriptStore;

const VALID_SCRIPT: &str = concat!(
    "RESOLVER_VERSION = \"9.9.1\"\n",
    "\n",
    "def resolve_link(request):\n",
    "    return {\"resolved_url\": request[\"url\"], \"headers\": {}}\n",
);

const BOGUS_SCRIPT: &str = "print('this is not a resolver')\n";

/// Fake script host serving one valid and one bogus body.
async fn spawn_upstream() -> u16 {
    let app = Router::new()
        .route("/good.py", get(|| async { VALID_SCRIPT }))
        .route("/bogus.py", get(|| async { BOGUS_SCRIPT }));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    port
}

fn config_in(dir: &Path) -> ResolverConfig {
    ResolverConfig {
        script_path: dir.join("resolver.py"),
        work_dir: dir.join("work"),
        runtime_bin: "python3".to_string(),
    }
}

#[tokio::test]
async fn test_install_from_url() {
    let dir = tempfile::tempdir().unwrap();
    let port = spawn_upstream().await;
    let store = ScriptStore::new(config_in(dir.path()));

    assert!(!store.exists());
    assert_eq!(store.version(), "N/A");

    let url = format!("http://127.0.0.1:{port}/good.py");
    store.install(&url).await.unwrap();

    assert!(store.exists());
    assert_eq!(store.version(), "9.9.1");
    assert_eq!(store.source_url().unwrap(), url);
    assert!(store.installed_at().is_some());
}

#[tokio::test]
async fn test_install_rejects_body_without_entry_point() {
    let dir = tempfile::tempdir().unwrap();
    let port = spawn_upstream().await;
    let store = ScriptStore::new(config_in(dir.path()));

    let good_url = format!("http://127.0.0.1:{port}/good.py");
    store.install(&good_url).await.unwrap();

    let err = store
        .install(&format!("http://127.0.0.1:{port}/bogus.py"))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolverError::InvalidProgram));

    // The previously installed script is untouched.
    assert_eq!(store.version(), "9.9.1");
    assert_eq!(store.source_url().unwrap(), good_url);
}

#[tokio::test]
async fn test_install_download_failure() {
    let dir = tempfile::tempdir().unwrap();
    let store = ScriptStore::new(config_in(dir.path()));

    // Grab a port nothing is listening on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let err = store
        .install(&format!("http://127.0.0.1:{port}/resolver.py"))
        .await
        .unwrap_err();
    assert!(matches!(err, ResolverError::Download(_)));
    assert!(!store.exists());
}

#[tokio::test]
async fn test_install_template() {
    let dir = tempfile::tempdir().unwrap();
    let store = ScriptStore::new(config_in(dir.path()));

    store.install_template().await.unwrap();

    assert!(store.exists());
    assert_eq!(store.version(), "1.0.0");
    // Only a template was installed — no download origin to refresh from.
    assert!(store.source_url().is_none());
    assert!(store.installed_at().is_some());
}

#[tokio::test]
async fn test_check_health_reports_readiness() {
    let dir = tempfile::tempdir().unwrap();
    let config = ResolverConfig {
        script_path: dir.path().join("resolver.sh"),
        work_dir: dir.path().join("work"),
        runtime_bin: "sh".to_string(),
    };

    std::fs::write(
        &config.script_path,
        "if [ \"$1\" = \"--check\" ]; then echo resolver_ready; fi\n",
    )
    .unwrap();

    let store = ScriptStore::new(config);
    assert!(store.check_health().await.unwrap());
}

#[tokio::test]
async fn test_check_health_without_readiness_token() {
    let dir = tempfile::tempdir().unwrap();
    let config = ResolverConfig {
        script_path: dir.path().join("resolver.sh"),
        work_dir: dir.path().join("work"),
        runtime_bin: "sh".to_string(),
    };

    // Runs fine but never prints the token.
    std::fs::write(&config.script_path, "exit 0\n").unwrap();

    let store = ScriptStore::new(config);
    assert!(!store.check_health().await.unwrap());
}

#[tokio::test]
async fn test_check_health_requires_script() {
    let dir = tempfile::tempdir().unwrap();
    let store = ScriptStore::new(config_in(dir.path()));

    let err = store.check_health().await.unwrap_err();
    assert!(matches!(err, ResolverError::NotFound { .. }));
}

#[tokio::test]
async fn test_check_health_requires_runtime() {
    let dir = tempfile::tempdir().unwrap();
    let config = ResolverConfig {
        script_path: dir.path().join("resolver.py"),
        work_dir: dir.path().join("work"),
        runtime_bin: "no-such-runtime-binary-exists".to_string(),
    };
    std::fs::write(&config.script_path, "def resolve_link(r): pass\n").unwrap();

    let store = ScriptStore::new(config);
    let err = store.check_health().await.unwrap_err();
    assert!(matches!(err, ResolverError::RuntimeUnavailable { .. }));
}

#[test]
fn test_version_reads_unreadable_file_as_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());

    // A directory at the script path makes the read fail without NotFound.
    std::fs::create_dir(&config.script_path).unwrap();

    let store = ScriptStore::new(config);
    assert_eq!(store.version(), "Error");
}
