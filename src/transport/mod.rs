//! Streamable HTTP transport for the Model Context Protocol
//!
//! Converts between axum's request/response values and the buffered messages the
//! MCP server consumes, and owns the transport lifecycle (per request or shared).
//!
//! Buffering contract: request bodies are read fully (up to [`MAX_BODY_BYTES`]) and
//! parsed before the server sees them. Responses are produced whole; when the client
//! only accepts `text/event-stream`, each JSON-RPC response is forwarded as its own
//! SSE `message` event.

use std::convert::Infallible;

use axum::{
    body::{to_bytes, Body},
    extract::Request,
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use serde_json::Value;

use crate::errors::AppError;

pub mod streamable;

pub use streamable::{SessionMode, StreamableHttpTransport, TransportPool};

pub const SESSION_HEADER: &str = "mcp-session-id";
pub const MAX_BODY_BYTES: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct InternalRequest {
    pub session_id: Option<String>,
    pub accepts_json: bool,
    pub accepts_sse: bool,
    pub payload: Value,
}

impl InternalRequest {
    pub fn json(payload: Value) -> Self {
        Self {
            session_id: None,
            accepts_json: true,
            accepts_sse: true,
            payload,
        }
    }

    /// True when the payload (or any batch member) is an `initialize` request.
    pub fn is_initialize(&self) -> bool {
        let is_init = |value: &Value| value.get("method").and_then(Value::as_str) == Some("initialize");
        match &self.payload {
            Value::Array(items) => items.iter().any(is_init),
            value => is_init(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InternalResponse {
    pub status: StatusCode,
    pub session_id: Option<String>,
    pub message: Option<Value>,
    pub stream: bool,
}

pub async fn to_internal_request(request: Request) -> Result<InternalRequest, AppError> {
    let (parts, body) = request.into_parts();

    let session_id = parts
        .headers
        .get(SESSION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string);

    let accept = parts
        .headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .collect::<Vec<_>>()
        .join(",")
        .to_ascii_lowercase();
    let (accepts_json, accepts_sse) = if accept.trim().is_empty() {
        (true, false)
    } else {
        (
            accept.contains("application/json") || accept.contains("*/*"),
            accept.contains("text/event-stream"),
        )
    };

    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|err| AppError::internal(format!("failed to read request body: {err}")))?;
    let payload = serde_json::from_slice(&bytes)
        .map_err(|err| AppError::internal(format!("request body is not valid JSON: {err}")))?;

    Ok(InternalRequest {
        session_id,
        accepts_json,
        accepts_sse,
        payload,
    })
}

pub fn from_internal_response(response: InternalResponse) -> Response {
    let InternalResponse {
        status,
        session_id,
        message,
        stream,
    } = response;

    let mut http_response = match message {
        None => (StatusCode::ACCEPTED, Body::empty()).into_response(),
        Some(message) if stream => {
            let messages = match message {
                Value::Array(items) => items,
                single => vec![single],
            };
            let events = futures::stream::iter(messages.into_iter().map(|message| {
                Ok::<_, Infallible>(Event::default().event("message").data(message.to_string()))
            }));
            (status, Sse::new(events)).into_response()
        }
        Some(message) => (status, Json(message)).into_response(),
    };

    if let Some(value) = session_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
        http_response
            .headers_mut()
            .insert(HeaderName::from_static(SESSION_HEADER), value);
    }

    http_response
}
