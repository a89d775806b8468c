//! JSON-RPC protocol representations and formatting utilities
//!
//! Provides standardized mapping of internal AppErrors to valid JSON-RPC payloads.

use rust_mcp_sdk::schema::{
    JsonrpcErrorResponse, JsonrpcResultResponse, RequestId, Result as McpResult, RpcError,
};
use serde_json::{json, Value};

use crate::errors::{AppError, INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE};

pub fn is_json_rpc_error(value: &Value) -> bool {
    value.get("error").is_some()
}

pub fn app_error_to_json_rpc(id: Option<Value>, err: AppError) -> Value {
    match err {
        AppError::BadRequest { code, message } => json_rpc_error_with_data(
            id,
            INVALID_PARAMS_CODE,
            "Invalid params",
            Some(json!({
                "code": code,
                "message": message,
                "details": {}
            })),
        ),
        AppError::Transport { code, message, .. } => json_rpc_error(id, code, message),
        AppError::MethodNotAllowed | AppError::Internal { .. } => {
            json_rpc_error(id, INTERNAL_ERROR_CODE, "Internal error")
        }
    }
}

pub fn json_rpc_error(id: Option<Value>, code: i32, message: &str) -> Value {
    json_rpc_error_with_data(id, code, message, None)
}

/// Builds an error response. Without a usable request id the envelope carries `"id": null`.
pub fn json_rpc_error_with_data(
    id: Option<Value>,
    code: i32,
    message: &str,
    data: Option<Value>,
) -> Value {
    let Some(request_id) = id.as_ref().and_then(value_to_request_id) else {
        let mut error = json!({
            "code": code,
            "message": message,
        });
        if let Some(data) = data {
            error["data"] = data;
        }
        return json!({
            "jsonrpc": "2.0",
            "error": error,
            "id": Value::Null,
        });
    };

    let response = JsonrpcErrorResponse::new(
        RpcError {
            code: i64::from(code),
            data,
            message: message.to_string(),
        },
        Some(request_id),
    );
    serde_json::to_value(response).unwrap_or_else(|_| {
        json!({
            "jsonrpc": "2.0",
            "error": { "code": code, "message": message },
            "id": id,
        })
    })
}

pub fn json_rpc_result(id: Option<Value>, result: Value) -> Value {
    if let Some(request_id) = id.as_ref().and_then(value_to_request_id) {
        let extra = result.as_object().cloned();
        let response = JsonrpcResultResponse::new(request_id, McpResult { meta: None, extra });
        if let Ok(value) = serde_json::to_value(response) {
            return value;
        }
    }

    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

pub fn value_to_request_id(value: &Value) -> Option<RequestId> {
    if let Some(string_id) = value.as_str() {
        return Some(RequestId::String(string_id.to_string()));
    }

    value.as_i64().map(RequestId::Integer)
}

pub fn request_id_to_value(id: RequestId) -> Value {
    match id {
        RequestId::String(value) => Value::String(value),
        RequestId::Integer(value) => Value::Number(value.into()),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn error_without_id_serializes_null_id() {
        let value = json_rpc_error(None, -32000, "Method not allowed.");

        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "error": { "code": -32000, "message": "Method not allowed." },
                "id": null
            })
        );
    }

    #[test]
    fn error_keeps_request_id() {
        let value = json_rpc_error(Some(json!("abc")), -32601, "Method not found");

        assert_eq!(value["id"], "abc");
        assert_eq!(value["error"]["code"], -32601);
    }

    #[test]
    fn bad_request_maps_to_invalid_params_with_data() {
        let value = app_error_to_json_rpc(
            Some(json!(7)),
            AppError::bad_request("invalid_url", "url must not be empty"),
        );

        assert_eq!(value["id"], 7);
        assert_eq!(value["error"]["code"], -32602);
        assert_eq!(value["error"]["data"]["code"], "invalid_url");
    }
}
