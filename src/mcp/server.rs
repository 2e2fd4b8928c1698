//! MCP server and tool registry for the CAD bridge.
//!
//! Every CAD capability is one typed tool. The registry validates and
//! default-fills tool arguments, forwards them through the relay client, and
//! normalises every outcome (validation failure, transport failure, remote
//! application error, success) into one uniform `{success, result|error}`
//! payload. No failure escapes a tool call as an exception.
//!
//! [`McpServer`] wraps the registry in the MCP lifecycle over stdio:
//! capability negotiation, then request handling, then shutdown on EOF or
//! signal.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::bridge::protocol::{RequestEnvelope, ResponseEnvelope};
use crate::mcp::protocol::{
    parse_message, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    RequestId, MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::templates::{known_shapes, template};
use crate::mcp::transport::StdioTransport;
use crate::relay::{RelayClient, RelayError};

/// Default document name when the caller omits one.
const DEFAULT_DOCUMENT_NAME: &str = "Untitled";

/// Default unit system for new documents.
const DEFAULT_UNITS: &str = "mm";

/// Default capture width in pixels.
const DEFAULT_CAPTURE_WIDTH: u64 = 1920;

/// Default capture height in pixels.
const DEFAULT_CAPTURE_HEIGHT: u64 = 1080;

/// Default capture format.
const DEFAULT_CAPTURE_FORMAT: &str = "png";

/// Where the server is in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// No initialize request seen yet.
    AwaitingInit,
    /// Initialize answered; waiting for the initialized notification.
    Initialising,
    /// Normal operation.
    Running,
    /// Draining towards exit.
    ShuttingDown,
}

/// Capabilities advertised in the initialize response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolCapabilities>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ToolCapabilities::default()),
        }
    }
}

/// Tool-specific capabilities. The tool set is fixed at compile time, so
/// `listChanged` is always false and omitted from the wire.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "std::ops::Not::not")]
    pub list_changed: bool,
}

/// Name/version pair identifying this server to the client.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Name/version pair the client sends about itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Body of the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version the client asks for.
    pub protocol_version: String,
    /// Client capabilities, kept opaque.
    #[serde(default)]
    pub capabilities: Value,
    /// Client identification.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// One entry in the tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Body of a tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// One content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// What a tool call produced, in MCP's content-list shape.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// The text payload of the first content item.
    #[must_use]
    pub fn first_text(&self) -> &str {
        match self.content.first() {
            Some(ToolContent::Text { text }) => text,
            None => "",
        }
    }
}

/// The typed dispatch layer: one callable per CAD capability.
pub struct ToolRegistry {
    relay: RelayClient,
}

impl ToolRegistry {
    /// Creates a registry that forwards through the given relay client.
    #[must_use]
    pub const fn new(relay: RelayClient) -> Self {
        Self { relay }
    }

    /// Calls a tool by name with the given arguments.
    ///
    /// Never fails: every outcome is folded into the returned
    /// [`ToolCallResult`].
    pub async fn call(&self, name: &str, arguments: &Value) -> ToolCallResult {
        match name {
            "create_document" => self.call_create_document(arguments).await,
            "create_object" => self.call_create_object(arguments).await,
            "create_primitive" => self.call_create_primitive(arguments).await,
            "edit_object" => self.call_edit_object(arguments).await,
            "delete_object" => self.call_delete_object(arguments).await,
            "get_objects" => normalise(self.relay.list_objects().await),
            "get_object" => self.call_get_object(arguments).await,
            "get_view" => normalise(self.relay.view_info().await),
            "capture_view" => self.call_capture_view(arguments).await,
            "get_parts_list" => normalise(self.relay.list_parts().await),
            "insert_part_from_library" => self.call_insert_part(arguments).await,
            "execute_code" => self.call_execute_code(arguments).await,
            "get_status" => normalise(self.relay.status().await),
            _ => failure_result(format!("Unknown tool: {name}")),
        }
    }

    async fn call_create_document(&self, arguments: &Value) -> ToolCallResult {
        let envelope = build_document_request(arguments);
        normalise(self.relay.create_document(&envelope).await)
    }

    async fn call_create_object(&self, arguments: &Value) -> ToolCallResult {
        match build_object_request(arguments) {
            Ok(envelope) => normalise(self.relay.create_object(&envelope).await),
            Err(message) => failure_result(message),
        }
    }

    async fn call_create_primitive(&self, arguments: &Value) -> ToolCallResult {
        match build_primitive_request(arguments) {
            Ok(envelope) => normalise(self.relay.create_object(&envelope).await),
            Err(message) => failure_result(message),
        }
    }

    async fn call_edit_object(&self, arguments: &Value) -> ToolCallResult {
        let Some(object_id) = arguments.get("object_id").and_then(Value::as_str) else {
            return failure_result("missing required parameter: object_id");
        };
        let Some(parameters) = arguments.get("parameters").and_then(Value::as_object) else {
            return failure_result("missing required parameter: parameters");
        };

        let mut outer = Map::new();
        outer.insert(
            "parameters".to_string(),
            Value::Object(parameters.clone()),
        );
        let envelope = RequestEnvelope::new(outer);
        normalise(self.relay.edit_object(object_id, &envelope).await)
    }

    async fn call_delete_object(&self, arguments: &Value) -> ToolCallResult {
        let Some(object_id) = arguments.get("object_id").and_then(Value::as_str) else {
            return failure_result("missing required parameter: object_id");
        };
        normalise(self.relay.delete_object(object_id).await)
    }

    async fn call_get_object(&self, arguments: &Value) -> ToolCallResult {
        let Some(object_id) = arguments.get("object_id").and_then(Value::as_str) else {
            return failure_result("missing required parameter: object_id");
        };
        normalise(self.relay.get_object(object_id).await)
    }

    async fn call_capture_view(&self, arguments: &Value) -> ToolCallResult {
        let envelope = build_capture_request(arguments);
        normalise(self.relay.capture_view(&envelope).await)
    }

    async fn call_insert_part(&self, arguments: &Value) -> ToolCallResult {
        match build_part_request(arguments) {
            Ok(envelope) => normalise(self.relay.insert_part(&envelope).await),
            Err(message) => failure_result(message),
        }
    }

    async fn call_execute_code(&self, arguments: &Value) -> ToolCallResult {
        match build_execute_request(arguments) {
            Ok(envelope) => normalise(self.relay.execute(&envelope).await),
            Err(message) => failure_result(message),
        }
    }

    /// Returns the list of available tools.
    #[must_use]
    #[allow(clippy::too_many_lines)]
    pub fn definitions() -> Vec<ToolDefinition> {
        vec![
            ToolDefinition {
                name: "create_document".to_string(),
                description: Some(
                    "Create a new CAD document and make it active. Subsequent object \
                     operations apply to this document."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "name": {
                            "type": "string",
                            "description": "Document name (default: 'Untitled')"
                        },
                        "template": {
                            "type": "string",
                            "description": "Optional template to create the document from"
                        },
                        "units": {
                            "type": "string",
                            "description": "Unit system (default: 'mm')"
                        }
                    }
                }),
            },
            ToolDefinition {
                name: "create_object".to_string(),
                description: Some(
                    "Create a new object in the active document from a feature type \
                     (e.g. 'extrude', 'revolve') and its parameters, including the \
                     base sketch profile. Returns the opaque identifier of the created \
                     entity."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "object_type": {
                            "type": "string",
                            "description": "Feature type, e.g. 'extrude' or 'revolve'"
                        },
                        "parameters": {
                            "type": "object",
                            "description": "Feature parameters, e.g. {\"base_feature\": \"circle\", \"radius\": 25.0, \"height\": 50.0}"
                        },
                        "position": {
                            "type": "array",
                            "items": { "type": "number" },
                            "description": "Placement position [x, y, z] (default: [0, 0, 0])"
                        },
                        "rotation": {
                            "type": "array",
                            "items": { "type": "number" },
                            "description": "Placement rotation [rx, ry, rz] in degrees (default: [0, 0, 0])"
                        }
                    },
                    "required": ["object_type", "parameters"]
                }),
            },
            ToolDefinition {
                name: "create_primitive".to_string(),
                description: Some(
                    "Create a basic solid by name: cylinder, box, sphere or cone. Each \
                     shape declares the parameters it needs (e.g. cylinder: radius, \
                     height); all of them must be supplied."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "primitive_type": {
                            "type": "string",
                            "enum": ["cylinder", "box", "sphere", "cone"],
                            "description": "Shape name"
                        },
                        "parameters": {
                            "type": "object",
                            "description": "Shape dimensions, e.g. {\"radius\": 25.0, \"height\": 50.0}"
                        },
                        "position": {
                            "type": "array",
                            "items": { "type": "number" },
                            "description": "Placement position [x, y, z] (default: [0, 0, 0])"
                        },
                        "rotation": {
                            "type": "array",
                            "items": { "type": "number" },
                            "description": "Placement rotation [rx, ry, rz] in degrees (default: [0, 0, 0])"
                        }
                    },
                    "required": ["primitive_type"]
                }),
            },
            ToolDefinition {
                name: "edit_object".to_string(),
                description: Some(
                    "Update parameters on an existing entity, identified by the token \
                     returned when it was created."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "object_id": {
                            "type": "string",
                            "description": "Entity identifier"
                        },
                        "parameters": {
                            "type": "object",
                            "description": "Parameters to update"
                        }
                    },
                    "required": ["object_id", "parameters"]
                }),
            },
            ToolDefinition {
                name: "delete_object".to_string(),
                description: Some("Delete an entity from the active document.".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "object_id": {
                            "type": "string",
                            "description": "Entity identifier"
                        }
                    },
                    "required": ["object_id"]
                }),
            },
            ToolDefinition {
                name: "get_objects".to_string(),
                description: Some(
                    "List entities in the active document (capped count).".to_string(),
                ),
                input_schema: json!({ "type": "object", "properties": {} }),
            },
            ToolDefinition {
                name: "get_object".to_string(),
                description: Some("Fetch one entity by identifier.".to_string()),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "object_id": {
                            "type": "string",
                            "description": "Entity identifier"
                        }
                    },
                    "required": ["object_id"]
                }),
            },
            ToolDefinition {
                name: "get_view".to_string(),
                description: Some(
                    "Query the active viewport: dimensions and camera state.".to_string(),
                ),
                input_schema: json!({ "type": "object", "properties": {} }),
            },
            ToolDefinition {
                name: "capture_view".to_string(),
                description: Some(
                    "Render the active viewport to an image file. Defaults to \
                     1920x1080 PNG; optionally returns the image bytes inline as \
                     base64."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "width": {
                            "type": "integer",
                            "description": "Image width in pixels, 100-4096 (default: 1920)"
                        },
                        "height": {
                            "type": "integer",
                            "description": "Image height in pixels, 100-4096 (default: 1080)"
                        },
                        "format": {
                            "type": "string",
                            "enum": ["png", "jpg", "jpeg"],
                            "description": "Image format (default: 'png')"
                        },
                        "filename": {
                            "type": "string",
                            "description": "Output filename; a timestamped name is generated when omitted"
                        },
                        "return_base64": {
                            "type": "boolean",
                            "description": "Inline the image bytes as base64 (default: false)"
                        }
                    }
                }),
            },
            ToolDefinition {
                name: "get_parts_list".to_string(),
                description: Some("List the parts available in the part library.".to_string()),
                input_schema: json!({ "type": "object", "properties": {} }),
            },
            ToolDefinition {
                name: "insert_part_from_library".to_string(),
                description: Some(
                    "Insert a library part into the active document.".to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "library_name": {
                            "type": "string",
                            "description": "Library the part belongs to"
                        },
                        "part_name": {
                            "type": "string",
                            "description": "Part name"
                        },
                        "position": {
                            "type": "array",
                            "items": { "type": "number" },
                            "description": "Placement position [x, y, z] (default: [0, 0, 0])"
                        }
                    },
                    "required": ["library_name", "part_name"]
                }),
            },
            ToolDefinition {
                name: "execute_code".to_string(),
                description: Some(
                    "Run a script inside the CAD host's scripting context. The context \
                     mapping is made available to the script."
                        .to_string(),
                ),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "code": {
                            "type": "string",
                            "description": "Script source"
                        },
                        "context": {
                            "type": "object",
                            "description": "Variables exposed to the script (default: {})"
                        }
                    },
                    "required": ["code"]
                }),
            },
            ToolDefinition {
                name: "get_status".to_string(),
                description: Some(
                    "Report the CAD host's state: product name, version, active \
                     document and workspace."
                        .to_string(),
                ),
                input_schema: json!({ "type": "object", "properties": {} }),
            },
        ]
    }
}

/// Folds a relay outcome into the uniform registry payload.
fn normalise(outcome: Result<ResponseEnvelope, RelayError>) -> ToolCallResult {
    match outcome {
        Ok(envelope) if envelope.success => {
            let payload = json!({
                "success": true,
                "result": Value::Object(envelope.result),
            });
            ToolCallResult::text(pretty(&payload))
        }
        Ok(envelope) => failure_result(
            envelope
                .error
                .unwrap_or_else(|| "unknown bridge error".to_string()),
        ),
        // Contention and parse failures arrive as non-2xx with an envelope
        // body; surface that envelope's message rather than the HTTP wrapper.
        Err(RelayError::Failed { status, body }) => {
            match serde_json::from_str::<ResponseEnvelope>(&body) {
                Ok(ResponseEnvelope {
                    error: Some(message),
                    ..
                }) => failure_result(message),
                _ => failure_result(format!("bridge request failed ({status}): {body}")),
            }
        }
        Err(error) => failure_result(error.to_string()),
    }
}

/// Builds the uniform failure payload.
fn failure_result(message: impl Into<String>) -> ToolCallResult {
    let payload = json!({
        "success": false,
        "error": message.into(),
    });
    ToolCallResult::error(pretty(&payload))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn vector3_or_zero(arguments: &Value, key: &str) -> Value {
    arguments
        .get(key)
        .filter(|v| {
            v.as_array()
                .is_some_and(|a| a.len() == 3 && a.iter().all(Value::is_number))
        })
        .cloned()
        .unwrap_or_else(|| json!([0.0, 0.0, 0.0]))
}

fn build_document_request(arguments: &Value) -> RequestEnvelope {
    let mut parameters = Map::new();
    parameters.insert(
        "name".to_string(),
        Value::from(
            arguments
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_DOCUMENT_NAME),
        ),
    );
    if let Some(template) = arguments.get("template").and_then(Value::as_str) {
        parameters.insert("template".to_string(), Value::from(template));
    }
    parameters.insert(
        "units".to_string(),
        Value::from(
            arguments
                .get("units")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_UNITS),
        ),
    );
    RequestEnvelope::new(parameters)
}

fn build_object_request(arguments: &Value) -> Result<RequestEnvelope, String> {
    let Some(object_type) = arguments.get("object_type").and_then(Value::as_str) else {
        return Err("missing required parameter: object_type".to_string());
    };
    let Some(parameters) = arguments.get("parameters").and_then(Value::as_object) else {
        return Err("missing required parameter: parameters".to_string());
    };

    let mut outer = Map::new();
    outer.insert("type".to_string(), Value::from(object_type));
    outer.insert("parameters".to_string(), Value::Object(parameters.clone()));
    outer.insert("position".to_string(), vector3_or_zero(arguments, "position"));
    outer.insert("rotation".to_string(), vector3_or_zero(arguments, "rotation"));
    Ok(RequestEnvelope::new(outer))
}

fn build_primitive_request(arguments: &Value) -> Result<RequestEnvelope, String> {
    let Some(primitive_type) = arguments.get("primitive_type").and_then(Value::as_str) else {
        return Err("missing required parameter: primitive_type".to_string());
    };
    let Some(shape) = template(primitive_type) else {
        return Err(format!(
            "unknown primitive type: {primitive_type} (known: {})",
            known_shapes().join(", ")
        ));
    };

    let provided = arguments
        .get("parameters")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    let missing = shape.missing_parameters(&provided);
    if !missing.is_empty() {
        return Err(format!(
            "missing required parameters for {primitive_type}: {}",
            missing.join(", ")
        ));
    }

    let mut feature_parameters = Map::new();
    feature_parameters.insert(
        "base_feature".to_string(),
        Value::from(shape.base_feature),
    );
    for (key, value) in provided {
        feature_parameters.insert(key, value);
    }

    let mut outer = Map::new();
    outer.insert("type".to_string(), Value::from(shape.operation));
    outer.insert("parameters".to_string(), Value::Object(feature_parameters));
    outer.insert("position".to_string(), vector3_or_zero(arguments, "position"));
    outer.insert("rotation".to_string(), vector3_or_zero(arguments, "rotation"));
    Ok(RequestEnvelope::new(outer))
}

fn build_capture_request(arguments: &Value) -> RequestEnvelope {
    let mut parameters = Map::new();
    parameters.insert(
        "width".to_string(),
        Value::from(
            arguments
                .get("width")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_CAPTURE_WIDTH),
        ),
    );
    parameters.insert(
        "height".to_string(),
        Value::from(
            arguments
                .get("height")
                .and_then(Value::as_u64)
                .unwrap_or(DEFAULT_CAPTURE_HEIGHT),
        ),
    );
    parameters.insert(
        "format".to_string(),
        Value::from(
            arguments
                .get("format")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_CAPTURE_FORMAT),
        ),
    );
    if let Some(filename) = arguments.get("filename").and_then(Value::as_str) {
        parameters.insert("filename".to_string(), Value::from(filename));
    }
    parameters.insert(
        "return_base64".to_string(),
        Value::from(
            arguments
                .get("return_base64")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        ),
    );
    RequestEnvelope::new(parameters)
}

fn build_part_request(arguments: &Value) -> Result<RequestEnvelope, String> {
    let Some(library) = arguments.get("library_name").and_then(Value::as_str) else {
        return Err("missing required parameter: library_name".to_string());
    };
    let Some(part) = arguments.get("part_name").and_then(Value::as_str) else {
        return Err("missing required parameter: part_name".to_string());
    };

    let mut parameters = Map::new();
    parameters.insert("library".to_string(), Value::from(library));
    parameters.insert("part".to_string(), Value::from(part));
    parameters.insert(
        "position".to_string(),
        vector3_or_zero(arguments, "position"),
    );
    Ok(RequestEnvelope::new(parameters))
}

fn build_execute_request(arguments: &Value) -> Result<RequestEnvelope, String> {
    let Some(code) = arguments.get("code").and_then(Value::as_str) else {
        return Err("missing required parameter: code".to_string());
    };
    let context = arguments
        .get("context")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut parameters = Map::new();
    parameters.insert("code".to_string(), Value::from(code));
    parameters.insert("context".to_string(), Value::Object(context));
    Ok(RequestEnvelope::new(parameters))
}

/// The MCP server: lifecycle handling over the stdio transport.
pub struct McpServer {
    /// Current server state.
    state: ServerState,
    /// The transport layer.
    transport: StdioTransport,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// The tool registry handling tools/call.
    registry: ToolRegistry,
}

impl McpServer {
    /// Creates a new MCP server around a tool registry.
    #[must_use]
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            transport: StdioTransport::new(),
            protocol_version: None,
            registry,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// The protocol version negotiated during initialisation, if any.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Runs the main loop: one message at a time until EOF or a shutdown
    /// signal arrives.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    self.state = ServerState::ShuttingDown;
                    return Ok(());
                }

                line_result = self.transport.read_message() => {
                    if self.handle_transport_result(line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles one transport read: parses and dispatches a message line.
    ///
    /// Returns `true` once the server should exit.
    async fn handle_transport_result(
        &mut self,
        line: std::io::Result<Option<String>>,
    ) -> std::io::Result<bool> {
        let Some(line) = line? else {
            // EOF: the client is gone.
            self.state = ServerState::ShuttingDown;
            return Ok(true);
        };

        if !line.trim().is_empty() {
            match parse_message(&line) {
                Ok(msg) => self.handle_message(msg).await?,
                Err(error) => self.transport.send(&error).await?,
            }
        }

        Ok(self.state == ServerState::ShuttingDown)
    }

    /// Handles a parsed incoming message.
    async fn handle_message(&mut self, msg: IncomingMessage) -> std::io::Result<()> {
        match msg {
            IncomingMessage::Request(req) => self.handle_request(req).await,
            IncomingMessage::Notification(notif) => {
                if notif.method == "notifications/initialized"
                    && self.state == ServerState::Initialising
                {
                    self.state = ServerState::Running;
                }
                Ok(())
            }
        }
    }

    /// Handles an incoming request.
    async fn handle_request(&mut self, req: JsonRpcRequest) -> std::io::Result<()> {
        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "tools/list" => self.handle_tools_list(&req),
            "tools/call" => self.handle_tools_call(&req).await,
            "ping" => Ok(Self::handle_ping(&req)),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        match response {
            Ok(resp) => self.transport.send(&resp).await,
            Err(error) => self.transport.send(&error).await,
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                ErrorCode::InvalidRequest,
                "Server already initialised",
            ));
        }

        let params: InitializeParams = decode_params(req, "initialize")?;
        tracing::debug!(
            requested = %params.protocol_version,
            client = params.client_info.as_ref().map_or("unknown", |c| c.name.as_str()),
            "initialize received"
        );

        self.protocol_version = Some(MCP_PROTOCOL_VERSION.to_string());
        self.state = ServerState::Initialising;

        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({
                "protocolVersion": MCP_PROTOCOL_VERSION,
                "capabilities": ServerCapabilities::default(),
                "serverInfo": ServerInfo::default(),
            }),
        ))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        Ok(JsonRpcResponse::success(
            req.id.clone(),
            json!({ "tools": ToolRegistry::definitions() }),
        ))
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(
        &mut self,
        req: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ToolCallParams = decode_params(req, "tool call")?;
        let result = self.registry.call(&params.name, &params.arguments).await;

        let result_value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(
                req.id.clone(),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }

    /// Handles the ping request.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::new(
                Some(id.clone()),
                ErrorCode::InvalidRequest,
                "Server not initialised",
            ));
        }
        Ok(())
    }
}

/// Decodes a request's `params` member, which must be present and match `T`.
pub(crate) fn decode_params<T: serde::de::DeserializeOwned>(
    req: &JsonRpcRequest,
    what: &str,
) -> Result<T, JsonRpcError> {
    let Some(params) = req.params.as_ref() else {
        return Err(JsonRpcError::invalid_params(
            req.id.clone(),
            format!("Missing {what} params"),
        ));
    };
    serde_json::from_value(params.clone()).map_err(|e| {
        JsonRpcError::invalid_params(req.id.clone(), format!("Invalid {what} params: {e}"))
    })
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(signal) => signal,
        Err(_) => return std::future::pending().await,
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(signal) => signal,
        Err(_) => return std::future::pending().await,
    };

    tokio::select! {
        _ = sigint.recv() => tracing::info!("Received SIGINT, shutting down"),
        _ = sigterm.recv() => tracing::info!("Received SIGTERM, shutting down"),
    }
}

#[cfg(windows)]
async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Received Ctrl+C, shutting down");
    } else {
        std::future::pending::<()>().await;
    }
}
