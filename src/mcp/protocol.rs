//! JSON-RPC 2.0 message types for the MCP surface.
//!
//! The registry exchanges three message kinds with its client: requests
//! (carry an `id`, expect exactly one response), responses (success or
//! error, echoing the request `id`), and notifications (no `id`, one-way).
//! Per MCP, request IDs are strings or integers and never `null`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The MCP protocol version this implementation supports.
pub const MCP_PROTOCOL_VERSION: &str = "2024-11-05";

/// Server name advertised during capability negotiation.
pub const SERVER_NAME: &str = "cad-bridge-mcp";

/// A JSON-RPC 2.0 request ID: a string or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Numeric request ID.
    Number(i64),
    /// String request ID.
    String(String),
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => f.write_str(s),
        }
    }
}

/// The wire shape shared by requests and notifications; the presence of
/// `id` is what tells them apart.
#[derive(Debug, Deserialize)]
struct RawMessage {
    jsonrpc: String,
    #[serde(default)]
    id: Option<RequestId>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

/// A request, already validated: the `jsonrpc` marker is checked and
/// consumed during parsing.
#[derive(Debug, Clone)]
pub struct JsonRpcRequest {
    /// Unique request identifier, echoed in the response.
    pub id: RequestId,
    /// The method to invoke.
    pub method: String,
    /// Optional parameters for the method.
    pub params: Option<Value>,
}

/// A one-way notification. No response is ever sent for one.
#[derive(Debug, Clone)]
pub struct JsonRpcNotification {
    /// The notification method.
    pub method: String,
    /// Optional parameters for the notification.
    pub params: Option<Value>,
}

/// A successful JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    /// Always "2.0".
    pub jsonrpc: &'static str,
    /// The request ID this response answers.
    pub id: RequestId,
    /// The result of the method call.
    pub result: Value,
}

impl JsonRpcResponse {
    /// Builds a success response for the given request ID.
    #[must_use]
    pub const fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result,
        }
    }
}

/// Standard JSON-RPC 2.0 error codes, carrying their wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrorCode {
    /// Invalid JSON was received by the server.
    ParseError = -32700,
    /// The JSON sent is not a valid Request object.
    InvalidRequest = -32600,
    /// The method does not exist or is not available.
    MethodNotFound = -32601,
    /// Invalid method parameters.
    InvalidParams = -32602,
    /// Internal JSON-RPC error.
    InternalError = -32603,
}

impl ErrorCode {
    /// The numeric code sent on the wire.
    #[must_use]
    pub const fn code(self) -> i32 {
        self as i32
    }
}

/// The `error` member of an error response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorData {
    /// The error code.
    pub code: i32,
    /// A short description of the error.
    pub message: String,
}

/// A JSON-RPC 2.0 error response.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    /// Always "2.0".
    pub jsonrpc: &'static str,
    /// The request ID this error answers, when it could be determined.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
    /// The error details.
    pub error: JsonRpcErrorData,
}

impl JsonRpcError {
    /// Builds an error response.
    #[must_use]
    pub fn new(id: Option<RequestId>, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            error: JsonRpcErrorData {
                code: code.code(),
                message: message.into(),
            },
        }
    }

    /// The request was not even valid JSON, so no ID is known.
    #[must_use]
    pub fn parse_error() -> Self {
        Self::new(None, ErrorCode::ParseError, "Parse error")
    }

    /// The JSON was readable but is not a valid JSON-RPC message.
    #[must_use]
    pub fn invalid_request(id: Option<RequestId>) -> Self {
        Self::new(id, ErrorCode::InvalidRequest, "Invalid Request")
    }

    /// The named method is not part of this server's surface.
    #[must_use]
    pub fn method_not_found(id: RequestId, method: &str) -> Self {
        Self::new(
            Some(id),
            ErrorCode::MethodNotFound,
            format!("Method not found: {method}"),
        )
    }

    /// The method exists but its parameters are unusable.
    #[must_use]
    pub fn invalid_params(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(Some(id), ErrorCode::InvalidParams, message)
    }

    /// Something failed inside the server while producing the response.
    #[must_use]
    pub fn internal_error(id: RequestId, message: impl Into<String>) -> Self {
        Self::new(Some(id), ErrorCode::InternalError, message)
    }
}

/// An incoming message: a request or a notification.
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    /// A request expecting a response.
    Request(JsonRpcRequest),
    /// A notification (no response expected).
    Notification(JsonRpcNotification),
}

/// Parses one line of client input into an incoming message.
///
/// # Errors
///
/// Returns the `JsonRpcError` to send back when the input is not valid
/// JSON ([`ErrorCode::ParseError`]) or not a valid JSON-RPC 2.0 message
/// ([`ErrorCode::InvalidRequest`]).
pub fn parse_message(json: &str) -> Result<IncomingMessage, JsonRpcError> {
    let value: Value = serde_json::from_str(json).map_err(|_| JsonRpcError::parse_error())?;

    let raw: RawMessage =
        serde_json::from_value(value).map_err(|_| JsonRpcError::invalid_request(None))?;

    if raw.jsonrpc != "2.0" || raw.method.is_empty() {
        return Err(JsonRpcError::invalid_request(raw.id));
    }

    Ok(match raw.id {
        Some(id) => IncomingMessage::Request(JsonRpcRequest {
            id,
            method: raw.method,
            params: raw.params,
        }),
        None => IncomingMessage::Notification(JsonRpcNotification {
            method: raw.method,
            params: raw.params,
        }),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_request() {
        let json = r#"{"jsonrpc": "2.0", "id": 1, "method": "tools/call", "params": {}}"#;
        let msg = parse_message(json).unwrap();

        let IncomingMessage::Request(req) = msg else {
            panic!("Expected Request, got Notification");
        };
        assert_eq!(req.id, RequestId::Number(1));
        assert_eq!(req.method, "tools/call");
    }

    #[test]
    fn parse_valid_notification() {
        let json = r#"{"jsonrpc": "2.0", "method": "notifications/initialized"}"#;
        let msg = parse_message(json).unwrap();

        let IncomingMessage::Notification(notif) = msg else {
            panic!("Expected Notification, got Request");
        };
        assert_eq!(notif.method, "notifications/initialized");
    }

    #[test]
    fn parse_string_id() {
        let json = r#"{"jsonrpc": "2.0", "id": "call-7", "method": "ping"}"#;
        let msg = parse_message(json).unwrap();

        let IncomingMessage::Request(req) = msg else {
            panic!("Expected Request, got Notification");
        };
        assert_eq!(req.id, RequestId::String("call-7".to_string()));
    }

    #[test]
    fn parse_invalid_json() {
        let err = parse_message("not valid json").unwrap_err();
        assert_eq!(err.error.code, ErrorCode::ParseError.code());
        assert!(err.id.is_none());
    }

    #[test]
    fn parse_missing_jsonrpc() {
        let err = parse_message(r#"{"id": 1, "method": "ping"}"#).unwrap_err();
        assert_eq!(err.error.code, ErrorCode::InvalidRequest.code());
    }

    #[test]
    fn parse_wrong_jsonrpc_version() {
        let err = parse_message(r#"{"jsonrpc": "1.0", "id": 1, "method": "ping"}"#).unwrap_err();
        assert_eq!(err.error.code, ErrorCode::InvalidRequest.code());
        assert_eq!(err.id, Some(RequestId::Number(1)));
    }

    #[test]
    fn parse_empty_method_is_invalid() {
        let err = parse_message(r#"{"jsonrpc": "2.0", "id": 2, "method": ""}"#).unwrap_err();
        assert_eq!(err.error.code, ErrorCode::InvalidRequest.code());
    }

    #[test]
    fn error_codes_match_the_wire_values() {
        assert_eq!(ErrorCode::ParseError.code(), -32700);
        assert_eq!(ErrorCode::MethodNotFound.code(), -32601);
        assert_eq!(ErrorCode::InternalError.code(), -32603);
    }

    #[test]
    fn serialise_success_response() {
        let response =
            JsonRpcResponse::success(RequestId::Number(1), serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains(r#""jsonrpc":"2.0""#));
        assert!(json.contains(r#""id":1"#));
        assert!(json.contains(r#""result":{"ok":true}"#));
    }

    #[test]
    fn serialise_error_response() {
        let error = JsonRpcError::method_not_found(RequestId::Number(1), "tools/unknown");
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains(r#""code":-32601"#));
        assert!(json.contains("tools/unknown"));
    }

    #[test]
    fn parse_error_serialises_without_id() {
        let json = serde_json::to_string(&JsonRpcError::parse_error()).unwrap();
        assert!(!json.contains(r#""id""#));
    }
}
