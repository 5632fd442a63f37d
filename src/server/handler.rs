// Axum admin handler — translates administrative HTTP requests into engine
// operations.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::debug;

use crate::engine::resolver::ResolverEngine;
use crate::script::invoke::ResolveRequest;

pub struct AdminServer {
    port: u16,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl AdminServer {
    /// Start the admin server on a random loopback port, returning a handle.
    pub async fn start(engine: Arc<ResolverEngine>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let app = Router::new()
            .route("/script/install", post(install_handler))
            .route("/script/template", post(template_handler))
            .route("/script/health", get(health_handler))
            .route("/resolve", post(resolve_handler))
            .route(
                "/schedule",
                post(schedule_handler).delete(unschedule_handler),
            )
            .route("/cache", delete(clear_cache_handler))
            .route("/status", get(status_handler))
            .with_state(engine);

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Ok(Self {
            port,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Build a URL for an admin route.
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    /// Shutdown the server gracefully.
    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[derive(Debug, Deserialize)]
struct InstallBody {
    source_url: String,
}

#[derive(Debug, Deserialize)]
struct ScheduleBody {
    interval: String,
}

#[derive(Debug, Serialize)]
struct OpOutcome {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl OpOutcome {
    fn ok() -> Json<Self> {
        Json(Self {
            ok: true,
            error: None,
        })
    }

    fn err(e: impl std::fmt::Display) -> (StatusCode, Json<Self>) {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(Self {
                ok: false,
                error: Some(e.to_string()),
            }),
        )
    }
}

/// POST /script/install — download and activate a script.
async fn install_handler(
    State(engine): State<Arc<ResolverEngine>>,
    Json(body): Json<InstallBody>,
) -> Response {
    match engine.install(&body.source_url).await {
        Ok(()) => OpOutcome::ok().into_response(),
        Err(e) => OpOutcome::err(e).into_response(),
    }
}

/// POST /script/template — activate the bundled reference script.
async fn template_handler(State(engine): State<Arc<ResolverEngine>>) -> Response {
    match engine.install_template().await {
        Ok(()) => OpOutcome::ok().into_response(),
        Err(e) => OpOutcome::err(e).into_response(),
    }
}

#[derive(Debug, Serialize)]
struct HealthBody {
    healthy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// GET /script/health — run the script self-check.
async fn health_handler(State(engine): State<Arc<ResolverEngine>>) -> Response {
    match engine.check_health().await {
        Ok(healthy) => Json(HealthBody {
            healthy,
            error: None,
        })
        .into_response(),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(HealthBody {
                healthy: false,
                error: Some(e.to_string()),
            }),
        )
            .into_response(),
    }
}

/// POST /resolve — body mirrors the engine request. A JSON null result means
/// "resolution unavailable, fall back to the unresolved URL".
async fn resolve_handler(
    State(engine): State<Arc<ResolverEngine>>,
    Json(request): Json<ResolveRequest>,
) -> Response {
    debug!("admin resolve request for {:?}", request.display_name);
    let result = engine.resolve(&request).await;
    Json(result).into_response()
}

/// POST /schedule — install a refresh timer from an "H:MM" interval.
async fn schedule_handler(
    State(engine): State<Arc<ResolverEngine>>,
    Json(body): Json<ScheduleBody>,
) -> Response {
    match engine.schedule_refresh(&body.interval).await {
        Ok(()) => OpOutcome::ok().into_response(),
        Err(e) => OpOutcome::err(e).into_response(),
    }
}

#[derive(Debug, Serialize)]
struct UnscheduleBody {
    was_active: bool,
}

/// DELETE /schedule — cancel the refresh timer.
async fn unschedule_handler(State(engine): State<Arc<ResolverEngine>>) -> Response {
    let was_active = engine.stop_refresh().await;
    Json(UnscheduleBody { was_active }).into_response()
}

/// DELETE /cache — drop all cached resolutions.
async fn clear_cache_handler(State(engine): State<Arc<ResolverEngine>>) -> Response {
    engine.clear_cache();
    OpOutcome::ok().into_response()
}

/// GET /status — point-in-time subsystem snapshot.
async fn status_handler(State(engine): State<Arc<ResolverEngine>>) -> Response {
    Json(engine.status()).into_response()
}
