//! Installation wizard API
//!
//! Every route here sits behind [`require_wizard_token`]. The token may come
//! from the `token` query parameter or from a `token` field in a JSON body;
//! the query parameter wins.

use crate::server::WebServerState;
use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{Query, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use popui_common::{CompleteOptions, Error};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Largest wizard request body buffered while looking for a token
const MAX_BODY_BYTES: usize = 1024 * 1024;

pub fn wizard_router(state: Arc<WebServerState>) -> Router<Arc<WebServerState>> {
    Router::new()
        .route("/status", get(wizard_status_handler))
        .route("/step", post(wizard_step_handler))
        .route("/complete", post(wizard_complete_handler))
        .route("/system-check", get(wizard_system_check_handler))
        .route_layer(middleware::from_fn_with_state(state, require_wizard_token))
}

fn error_body(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

fn query_token(req: &Request) -> Option<String> {
    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(req.uri()).ok()?;
    params.get("token").filter(|t| !t.is_empty()).cloned()
}

fn body_token(bytes: &[u8]) -> Option<String> {
    let doc: Value = serde_json::from_slice(bytes).ok()?;
    doc.get("token")?.as_str().map(str::to_string)
}

/// Reject wizard requests that do not carry the active session token.
async fn require_wizard_token(
    State(state): State<Arc<WebServerState>>,
    req: Request,
    next: Next,
) -> Response {
    let (token, req) = match query_token(&req) {
        Some(token) => (Some(token), req),
        None => {
            // Buffer the body to look for a token, then hand it on untouched.
            let (parts, body) = req.into_parts();
            let bytes = match to_bytes(body, MAX_BODY_BYTES).await {
                Ok(b) => b,
                Err(_) => {
                    return error_body(StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
                }
            };
            let token = body_token(&bytes);
            (token, Request::from_parts(parts, Body::from(bytes)))
        }
    };

    match state.wizard.authorize(token.as_deref()).await {
        Ok(()) => next.run(req).await,
        Err(e @ Error::Unauthorized(_)) => {
            warn!("Rejected wizard request to {}: {}", req.uri().path(), e);
            error_body(StatusCode::UNAUTHORIZED, e.to_string())
        }
        Err(e) => {
            error!("Failed to read wizard token: {}", e);
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read wizard token")
        }
    }
}

async fn wizard_status_handler(State(state): State<Arc<WebServerState>>) -> Response {
    match state.wizard.status().await {
        Ok(progress) => Json(progress).into_response(),
        Err(e) => {
            error!("Failed to load wizard status: {}", e);
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read wizard status")
        }
    }
}

#[derive(Debug, Deserialize)]
struct StepRequest {
    step: Option<String>,
    data: Option<Value>,
}

async fn wizard_step_handler(
    State(state): State<Arc<WebServerState>>,
    body: Option<Json<StepRequest>>,
) -> Response {
    let (step, data) = match body {
        Some(Json(StepRequest {
            step: Some(step),
            data,
        })) if !step.is_empty() => (step, data),
        _ => return error_body(StatusCode::BAD_REQUEST, "Step parameter is required"),
    };

    match state.wizard.advance(&step, data.as_ref()).await {
        Ok(next) => Json(serde_json::json!({
            "success": true,
            "next_step": next,
            "validation_errors": [],
        }))
        .into_response(),
        Err(Error::NotFound) => error_body(StatusCode::NOT_FOUND, "Wizard status not found"),
        Err(Error::InvalidStep(_)) => error_body(StatusCode::BAD_REQUEST, "Invalid step name"),
        Err(Error::CorruptState(reason)) => {
            warn!("Wizard status unreadable: {}", reason);
            error_body(StatusCode::INTERNAL_SERVER_ERROR, "Failed to read wizard status")
        }
        Err(e) => {
            error!("Failed to record wizard step {}: {}", step, e);
            error_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update wizard status",
            )
        }
    }
}

/// Empty body means no finishing actions; anything else must be a JSON object.
fn complete_options(body: &[u8]) -> Option<CompleteOptions> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Some(CompleteOptions::default());
    }
    let doc: Value = serde_json::from_slice(body).ok()?;
    CompleteOptions::from_request(&doc)
}

async fn wizard_complete_handler(
    State(state): State<Arc<WebServerState>>,
    body: Bytes,
) -> Response {
    let Some(opts) = complete_options(&body) else {
        warn!("Rejected wizard completion with malformed body");
        return error_body(StatusCode::BAD_REQUEST, "Request body must be a JSON object");
    };

    match state.wizard.complete(opts).await {
        Ok(()) => {
            info!("Installation wizard finished");
            Json(serde_json::json!({
                "success": true,
                "node_status": if opts.start_node { "running" } else { "stopped" },
                "message": "Installation completed successfully",
            }))
            .into_response()
        }
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({
                "status": "error",
                "message": "Failed to complete installation",
                "error": e.detail(),
            })),
        )
            .into_response(),
    }
}

async fn wizard_system_check_handler(State(state): State<Arc<WebServerState>>) -> Response {
    Json(state.system_checker.run().await).into_response()
}
