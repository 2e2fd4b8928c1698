//! MCP protocol implementation for the tool registry.
//!
//! The registry speaks JSON-RPC 2.0 with MCP lifecycle semantics over two
//! transports: newline-delimited stdio for MCP clients ([`transport`],
//! [`server`]) and plain HTTP on the configurable registry port ([`http`]).
//! Both route tool calls through the same [`server::ToolRegistry`].

pub mod http;
pub mod protocol;
pub mod server;
pub mod templates;
pub mod transport;
