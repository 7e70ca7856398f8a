//! JSON-RPC Types
//!
//! Core types for the JSON-RPC 2.0 tool protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version advertised on initialize
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// JSON-RPC version
pub const JSONRPC_VERSION: &str = "2.0";

// ============================================================================
// JSON-RPC REQUEST/RESPONSE
// ============================================================================

/// JSON-RPC Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: Option<Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

/// JSON-RPC Response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

// ============================================================================
// JSON-RPC ERROR
// ============================================================================

/// JSON-RPC Error Codes (standard + server range)
#[derive(Debug, Clone, Copy)]
pub enum ErrorCode {
    ParseError = -32700,
    InvalidRequest = -32600,
    MethodNotFound = -32601,
    InvalidParams = -32602,
    InternalError = -32603,

    // Server-specific errors (-32000 to -32099)
    NotFound = -32000,
    Conflict = -32001,
    BackendUnavailable = -32002,
    ServerNotInitialized = -32003,
}

impl From<ErrorCode> for i32 {
    fn from(code: ErrorCode) -> Self {
        code as i32
    }
}

/// JSON-RPC Error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: ErrorCode, message: &str) -> Self {
        Self { code: code.into(), message: message.to_string(), data: None }
    }

    pub fn parse_error() -> Self {
        Self::new(ErrorCode::ParseError, "Parse error")
    }

    pub fn invalid_request(message: &str) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    pub fn method_not_found() -> Self {
        Self::new(ErrorCode::MethodNotFound, "Method not found")
    }

    pub fn invalid_params(message: &str) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn internal_error(message: &str) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn server_not_initialized() -> Self {
        Self::new(ErrorCode::ServerNotInitialized, "Server not initialized")
    }

    /// Map an engine error onto the wire: structured `{kind, message}` so
    /// callers never need to parse message text.
    pub fn from_memory_error(error: &engram_core::MemoryError) -> Self {
        use engram_core::MemoryError;
        let code = match error {
            MemoryError::InvalidArgument(_) => ErrorCode::InvalidParams,
            MemoryError::NotFound(_) => ErrorCode::NotFound,
            MemoryError::Conflict(_) => ErrorCode::Conflict,
            MemoryError::BackendUnavailable(_) | MemoryError::ServiceDegraded(_) => {
                ErrorCode::BackendUnavailable
            }
            _ => ErrorCode::InternalError,
        };
        Self {
            code: code.into(),
            message: error.to_string(),
            data: Some(serde_json::json!({ "kind": error.kind() })),
        }
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for JsonRpcError {}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let request = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(Value::Number(1.into())),
            method: "tools/call".to_string(),
            params: Some(serde_json::json!({"name": "search_memory"})),
        };

        let json = serde_json::to_string(&request).unwrap();
        let parsed: JsonRpcRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.method, "tools/call");
        assert!(parsed.id.is_some());
    }

    #[test]
    fn test_notification_has_no_id() {
        let notification = JsonRpcRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: None,
            method: "notifications/initialized".to_string(),
            params: None,
        };
        assert!(notification.id.is_none());
    }

    #[test]
    fn test_error_carries_kind() {
        let error = JsonRpcError::from_memory_error(&engram_core::MemoryError::NotFound(
            "conversation x".to_string(),
        ));
        assert_eq!(error.code, -32000);
        assert_eq!(error.data.unwrap()["kind"], "not_found");
    }

    #[test]
    fn test_degraded_maps_to_backend_code() {
        let error = JsonRpcError::from_memory_error(&engram_core::MemoryError::ServiceDegraded(
            "embedder missing".to_string(),
        ));
        assert_eq!(error.code, -32002);
        assert_eq!(error.data.unwrap()["kind"], "service_degraded");
    }

    #[test]
    fn test_response_shapes() {
        let ok = JsonRpcResponse::success(Some(Value::Number(1.into())), serde_json::json!({}));
        assert!(ok.result.is_some() && ok.error.is_none());

        let err = JsonRpcResponse::error(None, JsonRpcError::method_not_found());
        assert!(err.result.is_none());
        assert_eq!(err.error.unwrap().code, -32601);
    }
}
