//! The central Model Context Protocol engine
//!
//! Provides the MCP JSON-RPC decoding, method routing, capabilities negotiation
//! (`initialize`) and dispatch of the single `fetch` tool.

use std::sync::Arc;

use rust_mcp_sdk::schema::{
    CallToolRequest, CallToolRequestParams, Implementation, InitializeRequest, InitializeResult,
    JsonrpcMessage, JsonrpcRequest, ListToolsRequest, ListToolsResult, PingRequest,
    ProtocolVersion, ServerCapabilities, ServerCapabilitiesTools, Tool,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, warn};

use crate::config::{Config, Environment};
use crate::errors::{AppError, INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE, INVALID_REQUEST_CODE};
use crate::fetch::{build_strategy, handle_fetch_call, FetchStrategy, FETCH_TOOL_NAME};
use crate::mcp::rpc::{
    app_error_to_json_rpc, is_json_rpc_error, json_rpc_error, json_rpc_error_with_data,
    json_rpc_result, request_id_to_value,
};

pub const SUPPORTED_PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Invoked with every JSON-RPC error response the server produces.
pub type ErrorHook = Arc<dyn Fn(&Value) + Send + Sync>;

pub struct McpServer {
    strategy: Arc<dyn FetchStrategy>,
    on_error: ErrorHook,
}

/// Builds a fresh server with the strategy chosen by `config`. Callers decide whether to cache it.
pub fn create_server(config: &Config, env: &Environment, client: reqwest::Client) -> McpServer {
    McpServer::new(build_strategy(config, env, client))
}

/// Internal errors are server faults; every other code is caused by the client.
fn is_server_fault(response: &Value) -> bool {
    response["error"]["code"].as_i64() == Some(i64::from(INTERNAL_ERROR_CODE))
}

fn log_error_response(response: &Value) {
    let id = response.get("id").cloned().unwrap_or_default();
    let code = &response["error"]["code"];
    let message = &response["error"]["message"];

    if is_server_fault(response) {
        error!(id = %id, code = %code, message = %message, "mcp server error");
    } else {
        warn!(id = %id, code = %code, message = %message, "mcp request rejected");
    }
}

impl McpServer {
    pub fn new(strategy: Arc<dyn FetchStrategy>) -> Self {
        Self {
            strategy,
            on_error: Arc::new(log_error_response),
        }
    }

    pub fn with_error_hook(mut self, hook: ErrorHook) -> Self {
        self.on_error = hook;
        self
    }

    pub fn tools(&self) -> Vec<Tool> {
        vec![self.strategy.tool()]
    }

    /// Handles a single message or a batch. Returns `None` when nothing needs answering.
    pub async fn handle_payload(&self, payload: Value) -> Option<Value> {
        let Value::Array(batch) = payload else {
            return self.handle_json_rpc_value(payload).await;
        };

        if batch.is_empty() {
            let response = json_rpc_error(None, INVALID_REQUEST_CODE, "Invalid Request");
            (self.on_error)(&response);
            return Some(Value::Array(vec![response]));
        }

        let mut responses = Vec::new();
        for item in batch {
            if let Some(response) = self.handle_json_rpc_value(item).await {
                responses.push(response);
            }
        }

        (!responses.is_empty()).then_some(Value::Array(responses))
    }

    pub async fn handle_json_rpc_value(&self, payload: Value) -> Option<Value> {
        let response = self.route_json_rpc_value(payload).await;
        if let Some(response) = response.as_ref().filter(|value| is_json_rpc_error(value)) {
            (self.on_error)(response);
        }
        response
    }

    async fn route_json_rpc_value(&self, payload: Value) -> Option<Value> {
        if !payload.is_object() {
            return Some(json_rpc_error(None, INVALID_REQUEST_CODE, "Invalid Request"));
        }

        let request_id = payload.get("id").cloned();
        let parsed: JsonrpcMessage = match serde_json::from_value(payload) {
            Ok(message) => message,
            Err(_) => return Some(json_rpc_error(request_id, INVALID_REQUEST_CODE, "Invalid Request")),
        };

        match parsed {
            JsonrpcMessage::Request(request) => {
                if let Err(error_response) = validate_request_shape(&request) {
                    return Some(error_response);
                }

                let request_id = request_id_to_value(request.id);
                if request.method.trim().is_empty() {
                    return Some(json_rpc_error(
                        Some(request_id),
                        INVALID_REQUEST_CODE,
                        "Invalid Request",
                    ));
                }

                Some(
                    self.handle_json_rpc_request(
                        Some(request_id),
                        request.method,
                        request.params.map(Value::Object),
                    )
                    .await,
                )
            }
            JsonrpcMessage::Notification(notification) => {
                debug!(method = %notification.method, "mcp notification received");
                None
            }
            JsonrpcMessage::ResultResponse(_) | JsonrpcMessage::ErrorResponse(_) => {
                Some(json_rpc_error(request_id, INVALID_REQUEST_CODE, "Invalid Request"))
            }
        }
    }

    pub async fn handle_json_rpc_request(
        &self,
        id: Option<Value>,
        method: String,
        params: Option<Value>,
    ) -> Value {
        let audit_params = redact_audit_params(params.as_ref());

        let response = match method.as_str() {
            "initialize" => match negotiate_protocol_version(params.as_ref()) {
                Ok(version) => json_rpc_result(id, initialize_result(version)),
                Err(err) => app_error_to_json_rpc(id, err),
            },
            "ping" => json_rpc_result(id, json!({})),
            "tools/list" => json_rpc_result(
                id,
                serde_json::to_value(ListToolsResult {
                    meta: None,
                    next_cursor: None,
                    tools: self.tools(),
                })
                .unwrap_or_else(|_| json!({ "tools": [] })),
            ),
            "tools/call" => self.handle_tools_call(id, params).await,
            _ => json_rpc_error(id, -32601, "Method not found"),
        };

        info!(
            method = %method,
            params = %audit_params,
            outcome = if is_json_rpc_error(&response) { "failure" } else { "success" },
            "mcp action audited"
        );

        response
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> Value {
        let Some(raw_params) = params else {
            return json_rpc_error(id, INVALID_PARAMS_CODE, "Invalid params");
        };

        let tool_call: CallToolRequestParams = match serde_json::from_value(raw_params) {
            Ok(value) => value,
            Err(_) => return json_rpc_error(id, INVALID_PARAMS_CODE, "Invalid params"),
        };

        if tool_call.name != FETCH_TOOL_NAME {
            return json_rpc_error_with_data(
                id,
                -32601,
                "Method not found",
                Some(json!({
                    "code": "tool_not_found",
                    "message": "unknown tool name",
                    "details": {
                        "name": tool_call.name,
                    },
                })),
            );
        }

        match handle_fetch_call(self.strategy.as_ref(), tool_call.arguments).await {
            Ok(result) => match serde_json::to_value(result) {
                Ok(value) => json_rpc_result(id, value),
                Err(err) => app_error_to_json_rpc(
                    id,
                    AppError::internal(format!("tool result serialization: {err}")),
                ),
            },
            Err(err) => app_error_to_json_rpc(id, err),
        }
    }
}

fn initialize_result(version: ProtocolVersion) -> Value {
    let result = InitializeResult {
        server_info: Implementation {
            name: SERVER_NAME.to_string(),
            version: SERVER_VERSION.to_string(),
            title: None,
            description: None,
            icons: vec![],
            website_url: None,
        },
        capabilities: ServerCapabilities {
            tools: Some(ServerCapabilitiesTools {
                list_changed: Some(false),
            }),
            ..Default::default()
        },
        protocol_version: version.into(),
        instructions: None,
        meta: None,
    };

    serde_json::to_value(result).unwrap_or_else(|_| json!({}))
}

pub fn validate_request_shape(request: &JsonrpcRequest) -> Result<(), Value> {
    let request_id = Some(request_id_to_value(request.id.clone()));
    let Ok(payload) = serde_json::to_value(request) else {
        return Err(json_rpc_error(request_id, INVALID_REQUEST_CODE, "Invalid Request"));
    };

    let valid = match request.method.as_str() {
        "tools/call" => serde_json::from_value::<CallToolRequest>(payload).is_ok(),
        "tools/list" => serde_json::from_value::<ListToolsRequest>(payload).is_ok(),
        "ping" => serde_json::from_value::<PingRequest>(payload).is_ok(),
        "initialize" => serde_json::from_value::<InitializeRequest>(payload).is_ok(),
        _ => true,
    };

    if valid {
        Ok(())
    } else {
        Err(json_rpc_error(request_id, INVALID_PARAMS_CODE, "Invalid params"))
    }
}

/// Clients offering another revision are answered with the one this server speaks.
pub fn negotiate_protocol_version(params: Option<&Value>) -> Result<ProtocolVersion, AppError> {
    let offered_version = params
        .and_then(Value::as_object)
        .and_then(|object| object.get("protocolVersion"))
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|version| !version.is_empty())
        .ok_or_else(|| {
            AppError::bad_request(
                "invalid_protocol_version",
                "initialize params.protocolVersion is required",
            )
        })?;

    if offered_version != SUPPORTED_PROTOCOL_VERSION {
        debug!(
            offered = offered_version,
            supported = SUPPORTED_PROTOCOL_VERSION,
            "client offered a different protocol version"
        );
    }

    Ok(ProtocolVersion::V2024_11_05)
}

pub fn redact_audit_params(params: Option<&Value>) -> Value {
    params.map(redact_audit_value).unwrap_or(Value::Null)
}

pub fn redact_audit_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_audit_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_audit_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    matches!(
        normalized.as_str(),
        "authorization" | "cookie" | "bearer" | "api_key" | "apikey" | "x-api-key"
    ) || normalized.contains("token")
        || normalized.contains("secret")
        || normalized.contains("password")
        || normalized.contains("credential")
}
