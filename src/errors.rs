use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::mcp::rpc::json_rpc_error;

pub const INTERNAL_ERROR_CODE: i32 = -32603;
pub const SERVER_ERROR_CODE: i32 = -32000;
pub const SESSION_NOT_FOUND_CODE: i32 = -32001;
pub const INVALID_REQUEST_CODE: i32 = -32600;
pub const INVALID_PARAMS_CODE: i32 = -32602;
pub const PARSE_ERROR_CODE: i32 = -32700;

/// Dispatch-level failures. Rendered as a JSON-RPC error envelope with `id: null`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {message}")]
    BadRequest { code: &'static str, message: String },
    #[error("transport rejected request: {message}")]
    Transport {
        status: StatusCode,
        code: i32,
        message: &'static str,
    },
    #[error("method not allowed")]
    MethodNotAllowed,
    #[error("internal error: {message}")]
    Internal { code: &'static str, message: String },
}

impl AppError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self::BadRequest {
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            code: "internal_error",
            message: message.into(),
        }
    }

    pub fn transport(status: StatusCode, code: i32, message: &'static str) -> Self {
        Self::Transport {
            status,
            code,
            message,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            // Tool argument errors are answered in-band by `app_error_to_json_rpc`;
            // this arm only renders a `BadRequest` returned straight from a handler.
            Self::BadRequest { message, .. } => {
                (StatusCode::BAD_REQUEST, INVALID_PARAMS_CODE, message)
            }
            Self::Transport {
                status,
                code,
                message,
            } => (status, code, message.to_string()),
            Self::MethodNotAllowed => (
                StatusCode::METHOD_NOT_ALLOWED,
                SERVER_ERROR_CODE,
                "Method not allowed.".to_string(),
            ),
            Self::Internal { code, message } => {
                tracing::error!(code, error = %message, "Error handling MCP request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    INTERNAL_ERROR_CODE,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json_rpc_error(None, code, &message))).into_response()
    }
}

/// Tool-level failures. Never leave the tool boundary; converted to `isError` results.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{0} environment variable is not set")]
    MissingCredential(&'static str),
    #[error("HTTP error! status: {0}")]
    UpstreamStatus(u16),
    #[error("{0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid request header: {0}")]
    InvalidHeader(String),
    #[error("response body is not valid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),
    #[error("model response contained no text")]
    EmptyCompletion,
}
