//! Integration tests for the relay ↔ bridge path.
//!
//! Every test spins up a real bridge server on an ephemeral port, backed by
//! the simulated host, and drives it through the relay client — the same
//! path the tool registry uses in production.

use std::time::{Duration, Instant};

use serde_json::{json, Map, Value};

use cad_bridge_mcp::bridge::protocol::{RequestEnvelope, ResponseEnvelope};
use cad_bridge_mcp::bridge::BridgeServer;
use cad_bridge_mcp::config::BridgeConfig;
use cad_bridge_mcp::host::{
    CadHost, CaptureRequest, CaptureResult, CreatedObject, DocumentInfo, EntityInfo, HostError,
    HostStatus, InsertedPart, NewDocument, NewObject, PartInfo, PartPlacement, SimulatedHost,
    ViewInfo,
};
use cad_bridge_mcp::relay::{RelayClient, RelayError};

/// Starts a bridge for the given host and returns a relay client aimed at it.
async fn start_bridge<H: CadHost>(host: H) -> RelayClient {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(BridgeServer::new(host).serve(listener));

    RelayClient::with_base_url(format!("http://{addr}"), &BridgeConfig::default()).unwrap()
}

fn document_request(name: &str) -> RequestEnvelope {
    let mut parameters = Map::new();
    parameters.insert("name".to_string(), json!(name));
    parameters.insert("units".to_string(), json!("mm"));
    RequestEnvelope::new(parameters)
}

fn cylinder_request() -> RequestEnvelope {
    let mut parameters = Map::new();
    parameters.insert("type".to_string(), json!("extrude"));
    parameters.insert(
        "parameters".to_string(),
        json!({ "base_feature": "circle", "radius": 25.0, "height": 50.0 }),
    );
    parameters.insert("position".to_string(), json!([0.0, 0.0, 0.0]));
    parameters.insert("rotation".to_string(), json!([0.0, 0.0, 0.0]));
    RequestEnvelope::new(parameters)
}

fn assert_envelope_invariant(envelope: &ResponseEnvelope) {
    if envelope.success {
        assert!(envelope.error.is_none(), "success must not carry an error");
    } else {
        assert!(envelope.error.is_some(), "failure must carry an error");
        assert!(
            envelope.result.is_empty(),
            "failure must not carry result fields"
        );
    }
}

// =============================================================================
// Round trips
// =============================================================================

#[tokio::test]
async fn test_health_and_status() {
    let relay = start_bridge(SimulatedHost::new()).await;

    let health = relay.health().await.unwrap();
    assert!(health.success);
    assert_eq!(health.field("status"), Some(&json!("healthy")));

    let status = relay.status().await.unwrap();
    assert!(status.success);
    assert_eq!(status.field("active_document"), Some(&Value::Null));
    assert_eq!(status.field("design_workspace"), Some(&json!(false)));
}

#[tokio::test]
async fn test_status_reads_are_idempotent() {
    let relay = start_bridge(SimulatedHost::new()).await;
    relay
        .create_document(&document_request("Enclosure"))
        .await
        .unwrap();

    let first = relay.status().await.unwrap();
    let second = relay.status().await.unwrap();
    assert_eq!(first.field("active_document"), second.field("active_document"));
    assert_eq!(
        first.field("design_workspace"),
        second.field("design_workspace")
    );
    assert_eq!(first.field("active_document"), Some(&json!("Enclosure")));
}

#[tokio::test]
async fn test_create_object_concrete_scenario() {
    let relay = start_bridge(SimulatedHost::new()).await;
    relay
        .create_document(&document_request("Doc"))
        .await
        .unwrap();

    let created = relay.create_object(&cylinder_request()).await.unwrap();
    assert!(created.success);
    assert_envelope_invariant(&created);

    let object_id = created
        .field("object_id")
        .and_then(Value::as_str)
        .expect("object_id present");
    assert!(!object_id.is_empty());
    assert_eq!(created.field("type"), Some(&json!("extrude")));
    let parameters = created
        .field("parameters")
        .and_then(Value::as_object)
        .expect("parameters present");
    assert_eq!(parameters["base_feature"], json!("circle"));
    assert_eq!(parameters["radius"], json!(25.0));
    assert_eq!(parameters["height"], json!(50.0));
}

#[tokio::test]
async fn test_create_list_delete_fetch_round_trip() {
    let relay = start_bridge(SimulatedHost::new()).await;
    relay
        .create_document(&document_request("Doc"))
        .await
        .unwrap();

    let created = relay.create_object(&cylinder_request()).await.unwrap();
    let object_id = created
        .field("object_id")
        .and_then(Value::as_str)
        .unwrap()
        .to_string();

    // The created entity shows up in the listing.
    let listing = relay.list_objects().await.unwrap();
    assert!(listing.success);
    let ids: Vec<&str> = listing
        .field("objects")
        .and_then(Value::as_array)
        .unwrap()
        .iter()
        .filter_map(|o| o["id"].as_str())
        .collect();
    assert!(ids.contains(&object_id.as_str()));

    // Deleting it makes a subsequent fetch fail.
    let deleted = relay.delete_object(&object_id).await.unwrap();
    assert!(deleted.success);
    assert_eq!(deleted.field("deleted"), Some(&json!(true)));

    let fetched = relay.get_object(&object_id).await.unwrap();
    assert!(!fetched.success);
    assert_envelope_invariant(&fetched);
    assert!(fetched.error.as_deref().unwrap().contains(&object_id));
}

#[tokio::test]
async fn test_edit_object_updates_parameters() {
    let relay = start_bridge(SimulatedHost::new()).await;
    relay
        .create_document(&document_request("Doc"))
        .await
        .unwrap();
    let created = relay.create_object(&cylinder_request()).await.unwrap();
    let object_id = created.field("object_id").and_then(Value::as_str).unwrap();

    let mut parameters = Map::new();
    parameters.insert("parameters".to_string(), json!({ "height": 80.0 }));
    let updated = relay
        .edit_object(object_id, &RequestEnvelope::new(parameters))
        .await
        .unwrap();
    assert!(updated.success);
    let merged = updated.field("parameters").and_then(Value::as_object).unwrap();
    assert_eq!(merged["height"], json!(80.0));
    assert_eq!(merged["radius"], json!(25.0));
}

#[tokio::test]
async fn test_object_listing_is_capped() {
    let relay = start_bridge(SimulatedHost::new()).await;
    relay
        .create_document(&document_request("Doc"))
        .await
        .unwrap();
    for _ in 0..12 {
        relay.create_object(&cylinder_request()).await.unwrap();
    }

    let listing = relay.list_objects().await.unwrap();
    assert_eq!(listing.field("count"), Some(&json!(10)));
}

#[tokio::test]
async fn test_part_library_round_trip() {
    let relay = start_bridge(SimulatedHost::new()).await;
    relay
        .create_document(&document_request("Doc"))
        .await
        .unwrap();

    let parts = relay.list_parts().await.unwrap();
    assert!(parts.success);
    let first = parts.field("parts").and_then(Value::as_array).unwrap()[0].clone();

    let mut parameters = Map::new();
    parameters.insert("library".to_string(), first["library"].clone());
    parameters.insert("part".to_string(), first["part"].clone());
    parameters.insert("position".to_string(), json!([0.0, 0.0, 0.0]));
    let inserted = relay
        .insert_part(&RequestEnvelope::new(parameters))
        .await
        .unwrap();
    assert!(inserted.success);
    assert!(inserted.field("object_id").is_some());
}

#[tokio::test]
async fn test_view_capture_writes_file() {
    let dir = tempfile::tempdir().unwrap();
    let host = SimulatedHost::new().with_capture_dir(dir.path().to_path_buf());
    let relay = start_bridge(host).await;
    relay
        .create_document(&document_request("Doc"))
        .await
        .unwrap();

    let info = relay.view_info().await.unwrap();
    assert!(info.success);
    assert!(info.field("camera").is_some());

    let mut parameters = Map::new();
    parameters.insert("width".to_string(), json!(640));
    parameters.insert("height".to_string(), json!(480));
    parameters.insert("format".to_string(), json!("png"));
    parameters.insert("return_base64".to_string(), json!(true));
    let capture = relay
        .capture_view(&RequestEnvelope::new(parameters))
        .await
        .unwrap();
    assert!(capture.success);
    assert!(capture.field("image_data").is_some());

    let path = capture.field("file_path").and_then(Value::as_str).unwrap();
    assert!(std::path::Path::new(path).exists());
}

// =============================================================================
// Application errors stay inside the envelope
// =============================================================================

#[tokio::test]
async fn test_host_errors_are_success_false_not_http_errors() {
    let relay = start_bridge(SimulatedHost::new()).await;

    // No active document: every outcome is still HTTP 200 with an envelope.
    let listing = relay.list_objects().await.unwrap();
    assert!(!listing.success);
    assert_envelope_invariant(&listing);
    assert_eq!(listing.error.as_deref(), Some("no active document"));

    let execute = {
        let mut parameters = Map::new();
        parameters.insert("code".to_string(), json!("host.refresh()"));
        parameters.insert("context".to_string(), json!({}));
        relay.execute(&RequestEnvelope::new(parameters)).await.unwrap()
    };
    assert!(!execute.success);
    assert_envelope_invariant(&execute);
}

#[tokio::test]
async fn test_unsupported_object_type_reports_supported_set() {
    let relay = start_bridge(SimulatedHost::new()).await;
    relay
        .create_document(&document_request("Doc"))
        .await
        .unwrap();

    let mut parameters = Map::new();
    parameters.insert("type".to_string(), json!("loft"));
    parameters.insert("parameters".to_string(), json!({ "base_feature": "circle" }));
    let outcome = relay
        .create_object(&RequestEnvelope::new(parameters))
        .await
        .unwrap();
    assert!(!outcome.success);
    assert!(outcome.error.as_deref().unwrap().contains("loft"));
}

#[tokio::test]
async fn test_unknown_route_is_discoverable() {
    let relay = start_bridge(SimulatedHost::new()).await;

    let client = reqwest::Client::new();
    let response = client
        .get(format!("{}/api/bogus", relay.base_url()))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|v| v.to_str().ok()),
        Some("*")
    );
    let envelope: ResponseEnvelope = response.json().await.unwrap();
    assert!(!envelope.success);
    assert!(envelope.error.as_deref().unwrap().contains("unknown path"));
}

#[tokio::test]
async fn test_malformed_body_is_a_transport_failure() {
    let relay = start_bridge(SimulatedHost::new()).await;

    let client = reqwest::Client::new();
    let response = client
        .post(format!("{}/api/object", relay.base_url()))
        .header("content-type", "application/json")
        .body("{ this is not json")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let envelope: ResponseEnvelope = response.json().await.unwrap();
    assert!(!envelope.success);
    assert!(envelope
        .error
        .as_deref()
        .unwrap()
        .contains("invalid request body"));
}

// =============================================================================
// Single-flight guard
// =============================================================================

/// Host whose mutations take long enough for a second request to arrive.
struct SlowHost {
    inner: SimulatedHost,
    delay: Duration,
}

impl CadHost for SlowHost {
    fn status(&self) -> HostStatus {
        self.inner.status()
    }

    fn create_document(&mut self, request: &NewDocument) -> Result<DocumentInfo, HostError> {
        std::thread::sleep(self.delay);
        self.inner.create_document(request)
    }

    fn create_object(&mut self, request: &NewObject) -> Result<CreatedObject, HostError> {
        std::thread::sleep(self.delay);
        self.inner.create_object(request)
    }

    fn edit_object(
        &mut self,
        id: &str,
        parameters: &Map<String, Value>,
    ) -> Result<CreatedObject, HostError> {
        self.inner.edit_object(id, parameters)
    }

    fn delete_object(&mut self, id: &str) -> Result<(), HostError> {
        self.inner.delete_object(id)
    }

    fn get_object(&self, id: &str) -> Result<EntityInfo, HostError> {
        self.inner.get_object(id)
    }

    fn list_objects(&self) -> Result<Vec<EntityInfo>, HostError> {
        self.inner.list_objects()
    }

    fn view_info(&self) -> Result<ViewInfo, HostError> {
        self.inner.view_info()
    }

    fn capture_view(&mut self, request: &CaptureRequest) -> Result<CaptureResult, HostError> {
        self.inner.capture_view(request)
    }

    fn list_parts(&self) -> Result<Vec<PartInfo>, HostError> {
        self.inner.list_parts()
    }

    fn insert_part(&mut self, placement: &PartPlacement) -> Result<InsertedPart, HostError> {
        self.inner.insert_part(placement)
    }

    fn execute_script(
        &mut self,
        code: &str,
        context: &Map<String, Value>,
    ) -> Result<Value, HostError> {
        self.inner.execute_script(code, context)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_mutations_exactly_one_wins() {
    let relay = start_bridge(SlowHost {
        inner: SimulatedHost::new(),
        delay: Duration::from_millis(500),
    })
    .await;

    let first = relay.create_document(&document_request("A"));
    let second = relay.create_document(&document_request("B"));
    let (first, second) = tokio::join!(first, second);

    let outcomes = [first, second];
    let winners = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(envelope) if envelope.success))
        .count();
    let busy = outcomes
        .iter()
        .filter(|o| {
            matches!(
                o,
                Err(RelayError::Failed { status: 429, body }) if body.contains("server busy")
            )
        })
        .count();

    assert_eq!(winners, 1, "exactly one mutation may win: {outcomes:?}");
    assert_eq!(busy, 1, "the loser gets an immediate 429: {outcomes:?}");
}

#[tokio::test]
async fn test_guard_is_released_after_every_outcome() {
    let server = BridgeServer::new(SimulatedHost::new());
    let state = server.state();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(server.serve(listener));
    let relay =
        RelayClient::with_base_url(format!("http://{addr}"), &BridgeConfig::default()).unwrap();

    // A successful mutation releases the guard.
    relay
        .create_document(&document_request("Doc"))
        .await
        .unwrap();
    assert!(!state.guard().is_busy());

    // A host-rejected mutation releases it too.
    let rejected = relay.delete_object("no-such-token").await.unwrap();
    assert!(!rejected.success);
    assert!(!state.guard().is_busy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_are_not_rejected_during_a_mutation() {
    let relay = start_bridge(SlowHost {
        inner: SimulatedHost::new(),
        delay: Duration::from_millis(400),
    })
    .await;

    let mutation = relay.create_document(&document_request("Doc"));
    let read = async {
        // Give the mutation a head start so the guard is held.
        tokio::time::sleep(Duration::from_millis(100)).await;
        relay.status().await
    };
    let (mutation, read) = tokio::join!(mutation, read);

    assert!(mutation.unwrap().success);
    // The read may wait on the host handle, but it is never answered 429.
    assert!(read.unwrap().success);
}

// =============================================================================
// Transport failures
// =============================================================================

#[tokio::test]
async fn test_unreachable_bridge_is_normalised() {
    // Bind then drop a listener so the port is very likely closed.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = BridgeConfig {
        timeout_secs: 2,
        max_idle_connections: 1,
    };
    let relay = RelayClient::with_base_url(format!("http://{addr}"), &config).unwrap();
    let err = relay.status().await.unwrap_err();
    assert!(matches!(err, RelayError::Unreachable { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_timeout_fails_within_the_configured_window() {
    // A listener that accepts connections but never answers.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let config = BridgeConfig {
        timeout_secs: 1,
        max_idle_connections: 1,
    };
    let relay = RelayClient::with_base_url(format!("http://{addr}"), &config).unwrap();

    let started = Instant::now();
    let err = relay.health().await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, RelayError::Unreachable { .. }), "{err}");
    assert!(err.to_string().contains("timed out"), "{err}");
    assert!(
        elapsed < Duration::from_secs(5),
        "timed out too slowly: {elapsed:?}"
    );
}
