//! The registry's JSON-RPC surface over HTTP.
//!
//! MCP clients that prefer a socket over stdio POST one JSON-RPC message per
//! request to `/mcp` and receive the response in the body. The surface is
//! stateless: `initialize` always succeeds and `tools/call` needs no prior
//! lifecycle step, so independent callers can share one listener. A plain
//! `GET /health` reports liveness.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::mcp::protocol::{
    parse_message, IncomingMessage, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::server::{
    decode_params, ServerCapabilities, ServerInfo, ToolCallParams, ToolRegistry,
};

/// Builds the registry's HTTP router.
#[must_use]
pub fn router(registry: Arc<ToolRegistry>) -> Router {
    Router::new()
        .route("/mcp", post(handle_rpc))
        .route("/health", get(health))
        .with_state(registry)
}

/// Serves the registry until the listener fails.
///
/// # Errors
///
/// Returns an error if accepting or serving connections fails.
pub async fn serve(
    registry: Arc<ToolRegistry>,
    listener: tokio::net::TcpListener,
) -> std::io::Result<()> {
    axum::serve(listener, router(registry)).await
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> Response {
    let body = serde_json::to_vec(value).unwrap_or_else(|_| b"{}".to_vec());
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

async fn health() -> Response {
    json_response(
        StatusCode::OK,
        &json!({
            "status": "healthy",
            "server": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        }),
    )
}

async fn handle_rpc(State(registry): State<Arc<ToolRegistry>>, body: Bytes) -> Response {
    let text = match std::str::from_utf8(&body) {
        Ok(text) => text,
        Err(_) => return json_response(StatusCode::OK, &JsonRpcError::parse_error()),
    };

    match parse_message(text) {
        Ok(IncomingMessage::Request(request)) => {
            debug!(method = %request.method, "rpc request");
            match dispatch(&registry, request).await {
                Ok(response) => json_response(StatusCode::OK, &response),
                Err(error) => json_response(StatusCode::OK, &error),
            }
        }
        // Notifications get no response body.
        Ok(IncomingMessage::Notification(notification)) => {
            debug!(method = %notification.method, "rpc notification");
            Response::builder()
                .status(StatusCode::ACCEPTED)
                .body(Body::empty())
                .unwrap_or_else(|_| Response::new(Body::empty()))
        }
        Err(error) => json_response(StatusCode::OK, &error),
    }
}

async fn dispatch(
    registry: &ToolRegistry,
    request: JsonRpcRequest,
) -> Result<JsonRpcResponse, JsonRpcError> {
    match request.method.as_str() {
        "initialize" => Ok(JsonRpcResponse::success(
            request.id,
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": ServerCapabilities::default(),
                "serverInfo": ServerInfo::default(),
            }),
        )),
        "tools/list" => Ok(JsonRpcResponse::success(
            request.id,
            json!({ "tools": ToolRegistry::definitions() }),
        )),
        "tools/call" => {
            let params: ToolCallParams = decode_params(&request, "tool call")?;
            let result = registry.call(&params.name, &params.arguments).await;
            let result_value = serde_json::to_value(&result).map_err(|_| {
                JsonRpcError::internal_error(
                    request.id.clone(),
                    "Internal error: failed to serialise result",
                )
            })?;

            Ok(JsonRpcResponse::success(request.id, result_value))
        }
        "ping" => Ok(JsonRpcResponse::success(request.id, json!({}))),
        _ => Err(JsonRpcError::method_not_found(request.id, &request.method)),
    }
}
