//! Model Context Protocol (MCP) server handling and JSON-RPC envelopes
//!
//! Provides protocol negotiation, method routing and the JSON-RPC response shapes.

pub mod rpc;
pub mod server;
