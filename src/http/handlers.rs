//! Axum HTTP handlers for the web server
//!
//! Provides the primary Model Context Protocol endpoint, and general metadata endpoints.

use axum::{
    extract::{Request, State},
    response::Response,
    Json,
};
use serde::Serialize;
use tracing::info;

use crate::config::Environment;
use crate::errors::AppError;
use crate::transport::{from_internal_response, to_internal_request};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct DiscoveryResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub mcp_endpoint: &'static str,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        message: "Web Fetch MCP Server is running",
    })
}

pub async fn discovery() -> Json<DiscoveryResponse> {
    Json(DiscoveryResponse {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        mcp_endpoint: "/mcp",
    })
}

/// An embedding platform may attach an [`Environment`] to the request extensions;
/// its values override the process environment for this call.
pub async fn mcp_endpoint(
    State(state): State<AppState>,
    request: Request,
) -> Result<Response, AppError> {
    info!("received POST MCP request");

    let env = Environment::resolve(
        request.extensions().get::<Environment>(),
        &state.process_env,
    );
    let request = to_internal_request(request).await?;
    let response = state.transports.handle(&env, request).await?;

    Ok(from_internal_response(response))
}

pub async fn mcp_get() -> AppError {
    info!("received GET MCP request");
    AppError::MethodNotAllowed
}

pub async fn mcp_delete() -> AppError {
    info!("received DELETE MCP request");
    AppError::MethodNotAllowed
}
