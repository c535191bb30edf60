//! JSON-RPC 2.0 framing and the tool-level error envelope. See §6
//! "Transport" and "Errors return `{status:"error", kind, message}`".
//!
//! The framing layer (this module) only ever produces a JSON-RPC `error`
//! object for transport-level problems (malformed request, unknown
//! method); every biometric/auth/validation failure is carried inside a
//! successful JSON-RPC `result` as the `{status:"error", ...}` shape, per
//! §6's "successful responses return the operation's result object
//! directly... errors return `{status:"error", kind, message}`".

use serde::{Deserialize, Serialize};
use serde_json::Value;

use facegate_core::{Error, ErrorKind};

/// One JSON-RPC 2.0 request, one per line over stdio (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

fn jsonrpc_version() -> String {
    "2.0".to_string()
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn transport_error(id: Value, code: i64, message: impl Into<String>) -> Self {
        JsonRpcResponse {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

pub const METHOD_NOT_FOUND: i64 = -32601;
pub const PARSE_ERROR: i64 = -32700;
pub const INVALID_PARAMS: i64 = -32602;

/// The tool-level error shape embedded in a successful JSON-RPC result.
/// See §6: `kind` is one of `{unauthenticated, unavailable,
/// validation, not_found, already_exists, internal}`.
#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ToolError {
    pub kind: &'static str,
    pub message: String,
}

impl ToolError {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        ToolError {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ToolError::new("validation", message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ToolError::new("unauthenticated", message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        ToolError::new("unavailable", message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ToolError::new("internal", message)
    }

    /// Render as the `{status:"error", kind, message}` JSON-RPC result
    /// payload (§6).
    pub fn to_result(&self) -> Value {
        serde_json::json!({
            "status": "error",
            "kind": self.kind,
            "message": self.message,
        })
    }
}

impl From<Error> for ToolError {
    fn from(err: Error) -> Self {
        let kind = match err.kind() {
            ErrorKind::Validation => "validation",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::NotFound => "not_found",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::Internal => "internal",
        };
        ToolError::new(kind, err.public_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_branch_is_distinguishable_by_status_field() {
        let err = ToolError::validation("name too short");
        let value = err.to_result();
        assert_eq!(value["status"], "error");
        assert_eq!(value["kind"], "validation");
    }

    #[test]
    fn request_defaults_jsonrpc_version_when_omitted() {
        let req: JsonRpcRequest =
            serde_json::from_str(r#"{"id":1,"method":"get_health_status","params":{}}"#).unwrap();
        assert_eq!(req.jsonrpc, "2.0");
    }
}
