//! cad-bridge-mcp: MCP server and HTTP bridge for AI-assisted parametric CAD automation
//!
//! This library connects a natural-language automation client (an LLM tool-call
//! layer) to a desktop CAD application. Two cooperating local services share a
//! small wire protocol:
//!
//! - **Tool Registry** — exposes each CAD capability (create document,
//!   create/edit/delete geometry, capture the viewport, insert library parts,
//!   run host scripts) as a typed MCP tool, served over stdio or HTTP.
//! - **Bridge Server** — an HTTP listener embedded in the CAD host process
//!   that performs the actual document mutations. The host's scripting
//!   surface is single-threaded; a single-flight guard rejects overlapping
//!   mutating requests instead of queueing them.
//!
//! # Architecture
//!
//! ```text
//! LLM client ──MCP──▶ Tool Registry ──HTTP──▶ Bridge Server ──▶ CAD host
//!                     (validate,              (single-flight     (opaque,
//!                      default-fill,           guard, route,      synchronous)
//!                      normalise)              invoke)
//! ```
//!
//! The CAD host itself is modelled as the [`host::CadHost`] trait; a real
//! deployment embeds the bridge next to the application's scripting runtime,
//! while [`host::SimulatedHost`] backs development and tests.
//!
//! # Modules
//!
//! - [`bridge`] — wire protocol, single-flight guard, and the HTTP listener
//! - [`config`] — configuration loading and validation
//! - [`error`] — error types
//! - [`host`] — the CAD host capability boundary
//! - [`mcp`] — the tool registry and its MCP protocol implementation
//! - [`relay`] — the HTTP client the registry uses to reach the bridge

pub mod bridge;
pub mod config;
pub mod error;
pub mod host;
pub mod mcp;
pub mod relay;
