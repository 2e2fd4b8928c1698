//! HTTP listener embedded in the CAD host process.
//!
//! Every route translates an inbound request into one [`CadHost`] invocation
//! and serialises the outcome back as a response envelope. Mutating routes
//! claim the single-flight guard first and answer HTTP 429 when it is
//! already held; read routes skip the guard entirely.
//!
//! Outcome mapping:
//!
//! - host success / host error → HTTP 200 with a `success`/`error` envelope
//! - guard contention → HTTP 429 with a `success:false` envelope
//! - malformed body, unserialisable result, poisoned host lock → HTTP 5xx
//!   with a `success:false` envelope
//! - unknown path or method → HTTP 200 with a descriptive `success:false`
//!   envelope (discoverable, not exceptional)
//!
//! Every response carries a permissive CORS allow header: the only consumer
//! is a co-located trusted process.

use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::bridge::guard::SingleFlightGuard;
use crate::bridge::protocol::{RequestEnvelope, ResponseEnvelope};
use crate::host::{CadHost, CaptureRequest, NewDocument, NewObject, PartPlacement};

/// Shared state behind every route: the host handle and the guard, coupled
/// so their lifecycles are visibly one.
pub struct BridgeState<H> {
    host: Mutex<H>,
    guard: SingleFlightGuard,
}

impl<H> BridgeState<H> {
    fn new(host: H) -> Self {
        Self {
            host: Mutex::new(host),
            guard: SingleFlightGuard::new(),
        }
    }

    /// The single-flight guard, exposed for tests and diagnostics.
    pub const fn guard(&self) -> &SingleFlightGuard {
        &self.guard
    }
}

/// The bridge server: a router over one host handle.
pub struct BridgeServer<H: CadHost> {
    state: Arc<BridgeState<H>>,
}

impl<H: CadHost> BridgeServer<H> {
    /// Wraps a host in a bridge server.
    #[must_use]
    pub fn new(host: H) -> Self {
        Self {
            state: Arc::new(BridgeState::new(host)),
        }
    }

    /// Shared state handle, for tests that need to inspect the guard.
    #[must_use]
    pub fn state(&self) -> Arc<BridgeState<H>> {
        Arc::clone(&self.state)
    }

    /// Builds the route table. Created once at startup; immutable for the
    /// process lifetime.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/api/health", get(health::<H>))
            .route("/api/status", get(status::<H>))
            .route("/api/objects", get(list_objects::<H>))
            .route("/api/object", post(create_object::<H>))
            .route(
                "/api/object/:id",
                get(get_object::<H>)
                    .put(edit_object::<H>)
                    .delete(delete_object::<H>),
            )
            .route("/api/document", post(create_document::<H>))
            .route("/api/view", get(view_info::<H>).post(capture_view::<H>))
            .route("/api/parts", get(list_parts::<H>))
            .route("/api/part", post(insert_part::<H>))
            .route("/api/execute", post(execute_script::<H>))
            .fallback(unknown_route)
            .with_state(Arc::clone(&self.state))
    }

    /// Serves the bridge on the given listener until the connection is
    /// closed or an I/O error occurs.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting or serving connections fails.
    pub async fn serve(self, listener: tokio::net::TcpListener) -> std::io::Result<()> {
        let router = self.router();
        axum::serve(listener, router).await
    }

    /// Serves the bridge until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns an error if accepting or serving connections fails.
    pub async fn serve_with_shutdown<F>(
        self,
        listener: tokio::net::TcpListener,
        shutdown: F,
    ) -> std::io::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let router = self.router();
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
    }
}

/// Builds an HTTP response around an envelope.
///
/// This is the single exit point for every handler, so the JSON content type
/// and the CORS allow header are applied uniformly.
fn respond(status: StatusCode, envelope: &ResponseEnvelope) -> Response {
    let body = serde_json::to_vec(envelope)
        .unwrap_or_else(|_| br#"{"success":false,"error":"unserialisable response"}"#.to_vec());
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .header("access-control-allow-origin", "*")
        .body(Body::from(body))
        .unwrap_or_else(|_| Response::new(Body::empty()))
}

fn app_ok<T: Serialize>(value: &T) -> Response {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => respond(StatusCode::OK, &ResponseEnvelope::ok(map)),
        Ok(_) | Err(_) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            &ResponseEnvelope::err("internal error: unserialisable result"),
        ),
    }
}

fn app_err(message: impl Into<String>) -> Response {
    respond(StatusCode::OK, &ResponseEnvelope::err(message))
}

fn busy() -> Response {
    respond(
        StatusCode::TOO_MANY_REQUESTS,
        &ResponseEnvelope::err("server busy: another operation is in progress"),
    )
}

fn bad_body(detail: &str) -> Response {
    respond(
        StatusCode::INTERNAL_SERVER_ERROR,
        &ResponseEnvelope::err(format!("invalid request body: {detail}")),
    )
}

fn poisoned() -> Response {
    respond(
        StatusCode::INTERNAL_SERVER_ERROR,
        &ResponseEnvelope::err("internal error: host state is unavailable"),
    )
}

/// Parses a request body into an envelope. An empty body is an empty
/// envelope, matching callers that send no payload on DELETE.
fn parse_body(body: &Bytes) -> Result<RequestEnvelope, String> {
    if body.is_empty() {
        return Ok(RequestEnvelope::default());
    }
    serde_json::from_slice(body).map_err(|e| e.to_string())
}

fn vector3(parameters: &Map<String, Value>, key: &str) -> [f64; 3] {
    parameters
        .get(key)
        .and_then(Value::as_array)
        .and_then(|values| {
            if values.len() == 3 {
                let mut out = [0.0; 3];
                for (slot, value) in out.iter_mut().zip(values) {
                    *slot = value.as_f64()?;
                }
                Some(out)
            } else {
                None
            }
        })
        .unwrap_or([0.0, 0.0, 0.0])
}

// ---------------------------------------------------------------------------
// Read routes — no guard.
// ---------------------------------------------------------------------------

async fn health<H: CadHost>(State(_state): State<Arc<BridgeState<H>>>) -> Response {
    let mut result = Map::new();
    result.insert("status".to_string(), Value::from("healthy"));
    result.insert("message".to_string(), Value::from("bridge server running"));
    respond(StatusCode::OK, &ResponseEnvelope::ok(result))
}

async fn status<H: CadHost>(State(state): State<Arc<BridgeState<H>>>) -> Response {
    debug!("status query");
    let Ok(host) = state.host.lock() else {
        return poisoned();
    };
    app_ok(&host.status())
}

async fn list_objects<H: CadHost>(State(state): State<Arc<BridgeState<H>>>) -> Response {
    debug!("object listing query");
    let Ok(host) = state.host.lock() else {
        return poisoned();
    };
    match host.list_objects() {
        Ok(objects) => {
            let mut result = Map::new();
            result.insert("count".to_string(), Value::from(objects.len()));
            result.insert(
                "objects".to_string(),
                serde_json::to_value(&objects).unwrap_or_default(),
            );
            respond(StatusCode::OK, &ResponseEnvelope::ok(result))
        }
        Err(e) => app_err(e.to_string()),
    }
}

async fn get_object<H: CadHost>(
    State(state): State<Arc<BridgeState<H>>>,
    Path(id): Path<String>,
) -> Response {
    if id.is_empty() {
        return app_err("missing object identifier");
    }
    let Ok(host) = state.host.lock() else {
        return poisoned();
    };
    match host.get_object(&id) {
        Ok(info) => app_ok(&info),
        Err(e) => app_err(e.to_string()),
    }
}

async fn view_info<H: CadHost>(State(state): State<Arc<BridgeState<H>>>) -> Response {
    let Ok(host) = state.host.lock() else {
        return poisoned();
    };
    match host.view_info() {
        Ok(info) => app_ok(&info),
        Err(e) => app_err(e.to_string()),
    }
}

async fn list_parts<H: CadHost>(State(state): State<Arc<BridgeState<H>>>) -> Response {
    let Ok(host) = state.host.lock() else {
        return poisoned();
    };
    match host.list_parts() {
        Ok(parts) => {
            let mut result = Map::new();
            result.insert("count".to_string(), Value::from(parts.len()));
            result.insert(
                "parts".to_string(),
                serde_json::to_value(&parts).unwrap_or_default(),
            );
            respond(StatusCode::OK, &ResponseEnvelope::ok(result))
        }
        Err(e) => app_err(e.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Mutating routes — guard first, host second.
// ---------------------------------------------------------------------------

async fn create_document<H: CadHost>(
    State(state): State<Arc<BridgeState<H>>>,
    body: Bytes,
) -> Response {
    let Some(_permit) = state.guard.try_acquire() else {
        warn!("rejecting concurrent document creation");
        return busy();
    };
    let envelope = match parse_body(&body) {
        Ok(envelope) => envelope,
        Err(detail) => return bad_body(&detail),
    };

    let request = NewDocument {
        name: envelope
            .parameters
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Untitled")
            .to_string(),
        template: envelope
            .parameters
            .get("template")
            .and_then(Value::as_str)
            .map(str::to_string),
        units: envelope
            .parameters
            .get("units")
            .and_then(Value::as_str)
            .unwrap_or("mm")
            .to_string(),
    };

    info!(name = %request.name, "creating document");
    let Ok(mut host) = state.host.lock() else {
        return poisoned();
    };
    match host.create_document(&request) {
        Ok(info) => app_ok(&info),
        Err(e) => app_err(e.to_string()),
    }
}

async fn create_object<H: CadHost>(
    State(state): State<Arc<BridgeState<H>>>,
    body: Bytes,
) -> Response {
    let Some(_permit) = state.guard.try_acquire() else {
        warn!("rejecting concurrent object creation");
        return busy();
    };
    let envelope = match parse_body(&body) {
        Ok(envelope) => envelope,
        Err(detail) => return bad_body(&detail),
    };

    let Some(object_type) = envelope
        .parameters
        .get("type")
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        return app_err("missing required parameter: type");
    };
    let parameters = envelope
        .parameters
        .get("parameters")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let request = NewObject {
        object_type,
        parameters,
        position: vector3(&envelope.parameters, "position"),
        rotation: vector3(&envelope.parameters, "rotation"),
    };

    info!(object_type = %request.object_type, "creating object");
    let Ok(mut host) = state.host.lock() else {
        return poisoned();
    };
    match host.create_object(&request) {
        Ok(created) => app_ok(&created),
        Err(e) => app_err(e.to_string()),
    }
}

async fn edit_object<H: CadHost>(
    State(state): State<Arc<BridgeState<H>>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let Some(_permit) = state.guard.try_acquire() else {
        warn!("rejecting concurrent object edit");
        return busy();
    };
    if id.is_empty() {
        return app_err("missing object identifier");
    }
    let envelope = match parse_body(&body) {
        Ok(envelope) => envelope,
        Err(detail) => return bad_body(&detail),
    };

    let parameters = envelope
        .parameters
        .get("parameters")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    info!(%id, "editing object");
    let Ok(mut host) = state.host.lock() else {
        return poisoned();
    };
    match host.edit_object(&id, &parameters) {
        Ok(updated) => app_ok(&updated),
        Err(e) => app_err(e.to_string()),
    }
}

async fn delete_object<H: CadHost>(
    State(state): State<Arc<BridgeState<H>>>,
    Path(id): Path<String>,
) -> Response {
    let Some(_permit) = state.guard.try_acquire() else {
        warn!("rejecting concurrent object deletion");
        return busy();
    };
    if id.is_empty() {
        return app_err("missing object identifier");
    }

    info!(%id, "deleting object");
    let Ok(mut host) = state.host.lock() else {
        return poisoned();
    };
    match host.delete_object(&id) {
        Ok(()) => {
            let mut result = Map::new();
            result.insert("object_id".to_string(), Value::from(id));
            result.insert("deleted".to_string(), Value::from(true));
            respond(StatusCode::OK, &ResponseEnvelope::ok(result))
        }
        Err(e) => app_err(e.to_string()),
    }
}

async fn capture_view<H: CadHost>(
    State(state): State<Arc<BridgeState<H>>>,
    body: Bytes,
) -> Response {
    let Some(_permit) = state.guard.try_acquire() else {
        warn!("rejecting concurrent view capture");
        return busy();
    };
    let envelope = match parse_body(&body) {
        Ok(envelope) => envelope,
        Err(detail) => return bad_body(&detail),
    };

    let parameters = &envelope.parameters;
    let request = CaptureRequest {
        width: parameters
            .get("width")
            .and_then(Value::as_u64)
            .map_or(1024, |v| u32::try_from(v).unwrap_or(u32::MAX)),
        height: parameters
            .get("height")
            .and_then(Value::as_u64)
            .map_or(768, |v| u32::try_from(v).unwrap_or(u32::MAX)),
        format: parameters
            .get("format")
            .and_then(Value::as_str)
            .unwrap_or("png")
            .to_string(),
        filename: parameters
            .get("filename")
            .and_then(Value::as_str)
            .map(str::to_string),
        return_base64: parameters
            .get("return_base64")
            .and_then(Value::as_bool)
            .unwrap_or(false),
    };

    info!(width = request.width, height = request.height, "capturing view");
    let Ok(mut host) = state.host.lock() else {
        return poisoned();
    };
    match host.capture_view(&request) {
        Ok(result) => app_ok(&result),
        Err(e) => app_err(e.to_string()),
    }
}

async fn insert_part<H: CadHost>(
    State(state): State<Arc<BridgeState<H>>>,
    body: Bytes,
) -> Response {
    let Some(_permit) = state.guard.try_acquire() else {
        warn!("rejecting concurrent part insertion");
        return busy();
    };
    let envelope = match parse_body(&body) {
        Ok(envelope) => envelope,
        Err(detail) => return bad_body(&detail),
    };

    let Some(library) = envelope
        .parameters
        .get("library")
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        return app_err("missing required parameter: library");
    };
    let Some(part) = envelope
        .parameters
        .get("part")
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        return app_err("missing required parameter: part");
    };

    let placement = PartPlacement {
        library,
        part,
        position: vector3(&envelope.parameters, "position"),
    };

    info!(library = %placement.library, part = %placement.part, "inserting part");
    let Ok(mut host) = state.host.lock() else {
        return poisoned();
    };
    match host.insert_part(&placement) {
        Ok(inserted) => app_ok(&inserted),
        Err(e) => app_err(e.to_string()),
    }
}

async fn execute_script<H: CadHost>(
    State(state): State<Arc<BridgeState<H>>>,
    body: Bytes,
) -> Response {
    let Some(_permit) = state.guard.try_acquire() else {
        warn!("rejecting concurrent script execution");
        return busy();
    };
    let envelope = match parse_body(&body) {
        Ok(envelope) => envelope,
        Err(detail) => return bad_body(&detail),
    };

    let Some(code) = envelope
        .parameters
        .get("code")
        .and_then(Value::as_str)
        .map(str::to_string)
    else {
        return app_err("missing required parameter: code");
    };
    let context = envelope
        .parameters
        .get("context")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    info!(bytes = code.len(), "executing script");
    let Ok(mut host) = state.host.lock() else {
        return poisoned();
    };
    match host.execute_script(&code, &context) {
        Ok(output) => {
            let mut result = Map::new();
            result.insert("output".to_string(), output);
            respond(StatusCode::OK, &ResponseEnvelope::ok(result))
        }
        Err(e) => app_err(e.to_string()),
    }
}

/// Unknown paths and methods are reported inside the envelope so the calling
/// tool can inspect them; only transport-level failures use 5xx.
async fn unknown_route(method: Method, uri: Uri) -> Response {
    debug!(%method, %uri, "unknown route");
    app_err(format!("unknown path: {method} {}", uri.path()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vector3_defaults_to_zero() {
        let parameters = Map::new();
        assert_eq!(vector3(&parameters, "position"), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn vector3_reads_three_components() {
        let mut parameters = Map::new();
        parameters.insert("position".to_string(), json!([1.0, 2.5, -3.0]));
        assert_eq!(vector3(&parameters, "position"), [1.0, 2.5, -3.0]);
    }

    #[test]
    fn vector3_rejects_wrong_arity() {
        let mut parameters = Map::new();
        parameters.insert("position".to_string(), json!([1.0, 2.0]));
        assert_eq!(vector3(&parameters, "position"), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn empty_body_parses_to_empty_envelope() {
        let envelope = parse_body(&Bytes::new()).unwrap();
        assert!(envelope.parameters.is_empty());
    }

    #[test]
    fn malformed_body_is_rejected() {
        let body = Bytes::from_static(b"{ nope");
        assert!(parse_body(&body).is_err());
    }
}
