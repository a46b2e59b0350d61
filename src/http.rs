//! Streamable HTTP transport.
//!
//! Routes:
//! - `GET /`: browser console that drives a real session through `/mcp`
//! - `GET /health`: liveness probe
//! - `POST /mcp`: JSON-RPC messages
//! - `DELETE /mcp`: terminate a session
//! - `GET /mcp`: 405, no server-initiated stream is offered
//!
//! Every response to `POST /mcp` is serialized once and delivered either as
//! `application/json` or as a single `message` event on `text/event-stream`,
//! depending on the request's `Accept` header.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::sse::Event;
use axum::response::{Html, IntoResponse, Response, Sse};
use axum::routing::get;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::rpc_codes;
use crate::server::{McpServer, Reply, SERVER_NAME};
use crate::session::DEFAULT_IDLE_TIMEOUT;

/// Header carrying the session id in both directions.
pub const MCP_SESSION_ID_HEADER: &str = "mcp-session-id";

const CONSOLE_HTML: &str = include_str!("console.html");

/// Runtime settings for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address.
    pub addr: SocketAddr,
    /// Answer with `application/json` even when the client accepts SSE.
    pub json_response: bool,
    /// Idle window before a session expires.
    pub session_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: ([0, 0, 0, 0], 8000).into(),
            json_response: false,
            session_idle_timeout: DEFAULT_IDLE_TIMEOUT,
        }
    }
}

/// How a response body is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    /// Plain `application/json`.
    Json,
    /// One `message` event on `text/event-stream`.
    EventStream,
}

impl ResponseMode {
    /// Choose the framing from the `Accept` header.
    ///
    /// SSE is used only when the client lists `text/event-stream` and JSON is
    /// not forced.
    pub fn negotiate(headers: &HeaderMap, force_json: bool) -> Self {
        if force_json {
            return ResponseMode::Json;
        }
        let wants_sse = headers
            .get_all(ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(','))
            .any(|v| {
                v.split(';')
                    .next()
                    .is_some_and(|media| media.trim().eq_ignore_ascii_case("text/event-stream"))
            });
        if wants_sse {
            ResponseMode::EventStream
        } else {
            ResponseMode::Json
        }
    }
}

#[derive(Clone)]
struct AppState {
    server: Arc<McpServer>,
    json_response: bool,
}

/// Build the application router.
pub fn router(server: Arc<McpServer>, config: &ServerConfig) -> Router {
    let state = AppState {
        server,
        json_response: config.json_response,
    };

    Router::new()
        .route("/", get(console_handler))
        .route("/health", get(health_handler))
        .route(
            "/mcp",
            get(stream_handler).post(rpc_handler).delete(terminate_handler),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serve `app` on `listener` until Ctrl-C or SIGTERM.
pub async fn serve(listener: TcpListener, app: Router) -> std::io::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(MCP_SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// HTTP status for an RPC error code.
pub fn status_for_code(code: Option<i32>) -> StatusCode {
    match code {
        Some(rpc_codes::PARSE_ERROR) | Some(rpc_codes::INVALID_REQUEST) => StatusCode::BAD_REQUEST,
        Some(rpc_codes::SESSION_NOT_FOUND) => StatusCode::NOT_FOUND,
        _ => StatusCode::OK,
    }
}

async fn console_handler() -> Html<&'static str> {
    Html(CONSOLE_HTML)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": SERVER_NAME
    }))
}

async fn stream_handler() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

async fn terminate_handler(State(state): State<AppState>, headers: HeaderMap) -> StatusCode {
    match session_header(&headers) {
        Some(id) if state.server.sessions().remove(id) => {
            tracing::info!(session = %id, "session terminated");
            StatusCode::NO_CONTENT
        }
        Some(_) => StatusCode::NOT_FOUND,
        None => StatusCode::BAD_REQUEST,
    }
}

async fn rpc_handler(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let mode = ResponseMode::negotiate(&headers, state.json_response);
    let reply = state
        .server
        .handle_message(session_header(&headers), &body)
        .await;
    render(reply, mode)
}

fn render(reply: Reply, mode: ResponseMode) -> Response {
    let status = status_for_code(reply.error_code());
    let mut response = match reply.response {
        None if status == StatusCode::OK => StatusCode::ACCEPTED.into_response(),
        None => status.into_response(),
        Some(rpc) => {
            let payload = serde_json::to_string(&rpc).unwrap_or_else(|_| {
                "{\"jsonrpc\":\"2.0\",\"id\":null,\"error\":{\"code\":-32603,\"message\":\"serialization \
                 failed\"}}"
                    .to_string()
            });
            match mode {
                ResponseMode::Json => (
                    status,
                    [(CONTENT_TYPE, HeaderValue::from_static("application/json"))],
                    payload,
                )
                    .into_response(),
                ResponseMode::EventStream => {
                    let event = Event::default().event("message").data(payload);
                    let stream = tokio_stream::once(Ok::<_, Infallible>(event));
                    (status, Sse::new(stream)).into_response()
                }
            }
        }
    };

    if let Some(id) = reply.session_id {
        match HeaderValue::from_str(&id) {
            Ok(value) => {
                response.headers_mut().insert(MCP_SESSION_ID_HEADER, value);
            }
            Err(e) => tracing::error!("session id is not a valid header value: {}", e),
        }
    }
    response
}
