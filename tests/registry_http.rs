//! Integration tests for the registry's HTTP JSON-RPC surface.
//!
//! The full local stack: an MCP client (plain reqwest here) → registry HTTP
//! listener → relay client → bridge server → simulated host.

use std::sync::Arc;

use serde_json::{json, Value};

use cad_bridge_mcp::bridge::BridgeServer;
use cad_bridge_mcp::config::BridgeConfig;
use cad_bridge_mcp::host::SimulatedHost;
use cad_bridge_mcp::mcp::http;
use cad_bridge_mcp::mcp::server::ToolRegistry;
use cad_bridge_mcp::relay::RelayClient;

/// Starts bridge + registry and returns the registry's base URL.
async fn start_stack() -> String {
    let bridge_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let bridge_addr = bridge_listener.local_addr().unwrap();
    tokio::spawn(BridgeServer::new(SimulatedHost::new()).serve(bridge_listener));

    let relay = RelayClient::with_base_url(
        format!("http://{bridge_addr}"),
        &BridgeConfig::default(),
    )
    .unwrap();
    let registry = Arc::new(ToolRegistry::new(relay));

    let registry_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let registry_addr = registry_listener.local_addr().unwrap();
    tokio::spawn(http::serve(registry, registry_listener));

    format!("http://{registry_addr}")
}

async fn rpc(base: &str, message: Value) -> Value {
    reqwest::Client::new()
        .post(format!("{base}/mcp"))
        .json(&message)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let base = start_stack().await;

    let health: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["server"], "cad-bridge-mcp");
}

#[tokio::test]
async fn test_initialize_and_list_tools() {
    let base = start_stack().await;

    let init = rpc(
        &base,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": { "protocolVersion": "2024-11-05", "capabilities": {} }
        }),
    )
    .await;
    assert_eq!(init["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(init["result"]["serverInfo"]["name"], "cad-bridge-mcp");

    let list = rpc(
        &base,
        json!({ "jsonrpc": "2.0", "id": 2, "method": "tools/list" }),
    )
    .await;
    let tools = list["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 13);
}

#[tokio::test]
async fn test_tool_call_end_to_end() {
    let base = start_stack().await;

    let created = rpc(
        &base,
        json!({
            "jsonrpc": "2.0",
            "id": 3,
            "method": "tools/call",
            "params": { "name": "create_document", "arguments": { "name": "Flange" } }
        }),
    )
    .await;
    let text = created["result"]["content"][0]["text"].as_str().unwrap();
    let outcome: Value = serde_json::from_str(text).unwrap();
    assert_eq!(outcome["success"], true);
    assert_eq!(outcome["result"]["document_name"], "Flange");

    let status = rpc(
        &base,
        json!({
            "jsonrpc": "2.0",
            "id": 4,
            "method": "tools/call",
            "params": { "name": "get_status", "arguments": {} }
        }),
    )
    .await;
    let text = status["result"]["content"][0]["text"].as_str().unwrap();
    let outcome: Value = serde_json::from_str(text).unwrap();
    assert_eq!(outcome["result"]["active_document"], "Flange");
}

#[tokio::test]
async fn test_unknown_method_is_a_jsonrpc_error() {
    let base = start_stack().await;

    let response = rpc(
        &base,
        json!({ "jsonrpc": "2.0", "id": 9, "method": "tools/destroy" }),
    )
    .await;
    assert_eq!(response["error"]["code"], -32601);
}

#[tokio::test]
async fn test_notification_gets_no_body() {
    let base = start_stack().await;

    let response = reqwest::Client::new()
        .post(format!("{base}/mcp"))
        .json(&json!({ "jsonrpc": "2.0", "method": "notifications/initialized" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 202);
    assert!(response.bytes().await.unwrap().is_empty());
}
