//! Wire contract between the relay client and the bridge server.
//!
//! Both sides agree on three things: the request envelope (a single
//! `parameters` mapping), the response envelope (a `success` flag with either
//! inline result fields or an `error` string), and the fixed route table.
//! Everything else — transport policy, guard behaviour, host semantics — can
//! evolve independently behind this contract.
//!
//! # Status codes
//!
//! Application-level outcomes (success or a recognised application error)
//! travel as HTTP 200. 5xx is reserved for malformed bodies and unexpected
//! failures, 429 for single-flight guard contention. Unknown routes are
//! discoverable rather than exceptional: they return HTTP 200 with a
//! descriptive `success:false` envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Port the bridge server listens on.
///
/// Fixed by design: the embedded host's lifecycle pins it, and the relay
/// client hardcodes it in its default base URL.
pub const BRIDGE_PORT: u16 = 9000;

/// Loopback address the bridge binds to. The bridge is a local, single-caller
/// service and is never exposed beyond the machine.
pub const BRIDGE_HOST: &str = "127.0.0.1";

/// Default base URL the relay client targets.
#[must_use]
pub fn default_base_url() -> String {
    format!("http://{BRIDGE_HOST}:{BRIDGE_PORT}")
}

/// One entry in the fixed route table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// HTTP method.
    pub method: &'static str,
    /// Path pattern; `{id}` marks the single trailing entity-identifier
    /// segment a pattern may carry.
    pub path: &'static str,
    /// Name of the host capability the route dispatches to.
    pub operation: &'static str,
    /// Whether the operation mutates document state and therefore requires
    /// the single-flight guard.
    pub mutating: bool,
}

/// The complete route table, fixed for the lifetime of the process.
pub const ROUTES: &[Route] = &[
    Route { method: "GET", path: "/api/health", operation: "health", mutating: false },
    Route { method: "GET", path: "/api/status", operation: "status", mutating: false },
    Route { method: "GET", path: "/api/objects", operation: "list_objects", mutating: false },
    Route { method: "GET", path: "/api/object/{id}", operation: "get_object", mutating: false },
    Route { method: "POST", path: "/api/document", operation: "create_document", mutating: true },
    Route { method: "POST", path: "/api/object", operation: "create_object", mutating: true },
    Route { method: "PUT", path: "/api/object/{id}", operation: "edit_object", mutating: true },
    Route { method: "DELETE", path: "/api/object/{id}", operation: "delete_object", mutating: true },
    Route { method: "GET", path: "/api/view", operation: "view_info", mutating: false },
    Route { method: "POST", path: "/api/view", operation: "capture_view", mutating: true },
    Route { method: "GET", path: "/api/parts", operation: "list_parts", mutating: false },
    Route { method: "POST", path: "/api/part", operation: "insert_part", mutating: true },
    Route { method: "POST", path: "/api/execute", operation: "execute_script", mutating: true },
];

/// Request body for every bridge operation.
///
/// Ephemeral, no identity: it exists only for the HTTP transaction. An empty
/// or missing body deserialises to an empty parameter mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestEnvelope {
    /// Operation parameters.
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl RequestEnvelope {
    /// Wraps a parameter mapping in an envelope.
    #[must_use]
    pub const fn new(parameters: Map<String, Value>) -> Self {
        Self { parameters }
    }
}

/// Response body for every bridge operation.
///
/// Exactly one branch holds: `success:true` with result fields inlined
/// beside the flag, or `success:false` with an `error` string. The
/// constructors are the only way to build one, so the invariant cannot be
/// violated by handler code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Whether the operation succeeded.
    pub success: bool,

    /// Result fields, inlined into the JSON object. Empty on failure; may be
    /// empty on success.
    #[serde(flatten)]
    pub result: Map<String, Value>,

    /// Human-readable error description. Present exactly when `success` is
    /// `false`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResponseEnvelope {
    /// Builds a success envelope from a result mapping.
    #[must_use]
    pub const fn ok(result: Map<String, Value>) -> Self {
        Self {
            success: true,
            result,
            error: None,
        }
    }

    /// Builds a success envelope with no result fields.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::ok(Map::new())
    }

    /// Builds a failure envelope.
    #[must_use]
    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            result: Map::new(),
            error: Some(message.into()),
        }
    }

    /// Convenience lookup into the result mapping.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.result.get(key)
    }
}
