//! HTTP routing for the fetch server
//!
//! Provides the `/mcp` listener, the root health check and the discovery document.

pub mod handlers;
