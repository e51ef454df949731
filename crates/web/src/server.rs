//! Web server implementation

use crate::config::AppConfig;
use crate::static_files::StaticFiles;
use crate::system_check::SystemChecker;
use axum::{
    extract::{Query, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use popui_common::{
    node_status_from_output, CommandExecutor, CommandOutput, Error, FileWizardStore, NodeControl,
    ProcessExecutor, Wizard, WizardStore,
};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state behind every handler
pub struct WebServerState {
    pub config: AppConfig,
    pub node: NodeControl,
    pub wizard: Wizard,
    pub static_files: StaticFiles,
    pub system_checker: SystemChecker,
}

/// Web server
pub struct WebServer {
    state: Arc<WebServerState>,
}

impl WebServer {
    /// Server backed by the real managed executable and on-disk wizard state.
    pub fn new(config: AppConfig, data_dir: &Path) -> Self {
        let executor = Arc::new(ProcessExecutor::new(config.pop_command.clone()));
        let store = Arc::new(FileWizardStore::new(data_dir));
        Self::with_parts(config, data_dir, executor, store)
    }

    /// Server over arbitrary collaborators, used by tests.
    pub fn with_parts(
        config: AppConfig,
        data_dir: &Path,
        executor: Arc<dyn CommandExecutor>,
        store: Arc<dyn WizardStore>,
    ) -> Self {
        let node = NodeControl::new(executor);
        let wizard = Wizard::new(store, node.clone());
        let static_files = StaticFiles::new(config.web_root.clone());
        let system_checker = SystemChecker::new(data_dir, config.connectivity_urls.clone())
            .with_public_ip_url(config.public_ip_url.clone())
            .with_own_port(config.port);

        Self {
            state: Arc::new(WebServerState {
                config,
                node,
                wizard,
                static_files,
                system_checker,
            }),
        }
    }

    pub fn state(&self) -> &Arc<WebServerState> {
        &self.state
    }

    /// Create router
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/health", get(health_handler))
            // Node control, proxied to the managed executable
            .route("/api/status", get(status_handler))
            .route("/api/node/start", post(node_start_handler))
            .route("/api/node/stop", post(node_stop_handler))
            .route("/api/node/restart", post(node_restart_handler))
            .route("/api/config", get(config_handler).post(config_update_handler))
            .route("/api/logs", get(logs_handler))
            .route("/api/metrics", get(metrics_handler))
            // Token-gated installation wizard
            .nest(
                "/api/wizard",
                crate::wizard_routes::wizard_router(self.state.clone()),
            )
            .route("/wizard", get(wizard_page_handler))
            .fallback(static_handler)
            .layer(
                CorsLayer::new()
                    .allow_origin(Any)
                    .allow_methods(Any)
                    .allow_headers(Any),
            )
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the web server
    pub async fn serve(self, addr: SocketAddr) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Web console running at http://{}", listener.local_addr()?);

        axum::serve(listener, self.router()).await?;

        Ok(())
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pop-ui"
    }))
}

/// 500 envelope shared by the node-control endpoints
fn command_error(message: &str, err: &Error) -> Response {
    warn!("{}: {}", message, err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "status": "error",
            "message": message,
            "error": err.detail(),
        })),
    )
        .into_response()
}

async fn status_handler(State(state): State<Arc<WebServerState>>) -> Response {
    match state.node.status().await {
        Ok(out) => Json(serde_json::json!({
            "status": "success",
            "data": {
                "output": out.stdout.trim(),
                "node_status": node_status_from_output(&out.stdout),
            }
        }))
        .into_response(),
        Err(e) => command_error("Failed to get node status", &e),
    }
}

fn node_action_response(
    result: popui_common::Result<CommandOutput>,
    done: &str,
    failed: &str,
) -> Response {
    match result {
        Ok(out) => {
            info!("{}", done);
            Json(serde_json::json!({
                "status": "success",
                "message": done,
                "data": { "output": out.stdout.trim() }
            }))
            .into_response()
        }
        Err(e) => command_error(failed, &e),
    }
}

async fn node_start_handler(State(state): State<Arc<WebServerState>>) -> Response {
    node_action_response(
        state.node.start().await,
        "Node started successfully",
        "Failed to start node",
    )
}

async fn node_stop_handler(State(state): State<Arc<WebServerState>>) -> Response {
    node_action_response(
        state.node.stop().await,
        "Node stopped successfully",
        "Failed to stop node",
    )
}

async fn node_restart_handler(State(state): State<Arc<WebServerState>>) -> Response {
    node_action_response(
        state.node.restart().await,
        "Node restarted successfully",
        "Failed to restart node",
    )
}

async fn config_handler(State(state): State<Arc<WebServerState>>) -> Response {
    match state.node.config_show().await {
        // Raw text; the managed executable has no structured config output.
        Ok(out) => Json(serde_json::json!({
            "status": "success",
            "data": { "config": out.stdout.trim() }
        }))
        .into_response(),
        Err(e) => command_error("Failed to get configuration", &e),
    }
}

async fn config_update_handler() -> Response {
    (
        StatusCode::NOT_IMPLEMENTED,
        Json(serde_json::json!({
            "status": "error",
            "message": "Not implemented yet"
        })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct LogsQuery {
    limit: Option<String>,
}

async fn logs_handler(
    State(state): State<Arc<WebServerState>>,
    Query(query): Query<LogsQuery>,
) -> Response {
    let limit = match query.limit.as_deref() {
        None | Some("") => state.config.default_log_limit,
        Some(raw) => match raw.parse::<u32>() {
            Ok(n) => n,
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "status": "error",
                        "message": "Invalid limit",
                        "error": format!("limit must be a non-negative integer, got {:?}", raw),
                    })),
                )
                    .into_response();
            }
        },
    };

    match state.node.logs(limit).await {
        Ok(out) => {
            let logs: Vec<&str> = out.stdout.trim().split('\n').collect();
            Json(serde_json::json!({
                "status": "success",
                "data": { "logs": logs }
            }))
            .into_response()
        }
        Err(e) => command_error("Failed to get logs", &e),
    }
}

async fn metrics_handler(State(state): State<Arc<WebServerState>>) -> Response {
    let metrics = crate::metrics::collect(&state.system_checker.data_dir).await;
    Json(serde_json::json!({
        "status": "success",
        "data": metrics,
    }))
    .into_response()
}

async fn wizard_page_handler(State(state): State<Arc<WebServerState>>) -> Response {
    state.static_files.serve("wizard/index.html").await
}

async fn static_handler(
    State(state): State<Arc<WebServerState>>,
    method: Method,
    uri: Uri,
) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (StatusCode::NOT_FOUND, "Not found").into_response();
    }
    state.static_files.serve(uri.path()).await
}
