//! JSON-RPC 2.0 envelope types
//!
//! The envelope field is written as `"version"`. Peers speaking plain JSON-RPC
//! send `"jsonrpc"` instead, which is accepted on input.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Envelope version string (always "2.0")
pub const JSONRPC_VERSION: &str = "2.0";

fn default_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Stable numeric error codes.
///
/// Clients branch on these values, never on message text.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;

    pub const PROTOCOL_VERSION_MISMATCH: i32 = -32000;
    pub const SESSION_REQUIRED: i32 = -32001;
    pub const RESOURCE_NOT_FOUND: i32 = -32002;
    pub const TOOL_NOT_FOUND: i32 = -32003;
    pub const PROMPT_NOT_FOUND: i32 = -32004;
    pub const EXECUTION_ERROR: i32 = -32005;
    pub const TIMEOUT: i32 = -32006;
}

/// Request ID - can be string, number, or null
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(i64),
    Null,
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{}", s),
            RequestId::Number(n) => write!(f, "{}", n),
            RequestId::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

/// JSON-RPC Request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(alias = "jsonrpc", default = "default_version")]
    pub version: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>) -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            id: id.into(),
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// JSON-RPC Response
///
/// Exactly one of `result` and `error` is set. Build responses through
/// [`JsonRpcResponse::success`] and [`JsonRpcResponse::error`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(alias = "jsonrpc", default = "default_version")]
    pub version: String,
    pub id: RequestId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: RequestId, result: serde_json::Value) -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: RequestId, error: JsonRpcError) -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// View the response as a `Result`.
    ///
    /// A response carrying an error wins over a stray result; a response with
    /// neither is reported as an invalid request.
    pub fn into_result(self) -> Result<serde_json::Value, JsonRpcError> {
        match (self.result, self.error) {
            (_, Some(error)) => Err(error),
            (Some(result), None) => Ok(result),
            (None, None) => Err(JsonRpcError::invalid_request()),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// JSON-RPC Error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    // Standard JSON-RPC errors
    pub fn parse_error() -> Self {
        Self::new(codes::PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request() -> Self {
        Self::new(codes::INVALID_REQUEST, "Invalid Request")
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {}", method),
        )
    }

    pub fn invalid_params(msg: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, msg)
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, msg)
    }

    // Protocol-layer errors
    pub fn protocol_version_mismatch(requested: &str, supported: &[&str]) -> Self {
        Self::new(
            codes::PROTOCOL_VERSION_MISMATCH,
            format!("Unsupported protocol version: {}", requested),
        )
        .with_data(serde_json::json!({ "supported": supported }))
    }

    pub fn session_required() -> Self {
        Self::new(
            codes::SESSION_REQUIRED,
            "No session: send initialize first",
        )
    }

    pub fn resource_not_found(uri: &str) -> Self {
        Self::new(
            codes::RESOURCE_NOT_FOUND,
            format!("Resource not found: {}", uri),
        )
    }

    pub fn tool_not_found(name: &str) -> Self {
        Self::new(codes::TOOL_NOT_FOUND, format!("Tool not found: {}", name))
    }

    pub fn prompt_not_found(name: &str) -> Self {
        Self::new(
            codes::PROMPT_NOT_FOUND,
            format!("Prompt not found: {}", name),
        )
    }

    pub fn validation_failed(errors: &[String]) -> Self {
        Self::new(codes::INVALID_PARAMS, "Input failed schema validation")
            .with_data(serde_json::json!({ "errors": errors }))
    }

    pub fn execution_error(msg: impl Into<String>) -> Self {
        Self::new(codes::EXECUTION_ERROR, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(codes::TIMEOUT, msg)
    }

    /// Validation messages carried in `data.errors`, if any
    pub fn validation_errors(&self) -> Vec<String> {
        self.data
            .as_ref()
            .and_then(|d| d.get("errors"))
            .and_then(|e| e.as_array())
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// JSON-RPC Notification (no id, no response expected)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    #[serde(alias = "jsonrpc", default = "default_version")]
    pub version: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            version: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// A message that can be either a request, response, or notification
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JsonRpcMessage {
    Request(JsonRpcRequest),
    Response(JsonRpcResponse),
    Notification(JsonRpcNotification),
}

impl JsonRpcMessage {
    /// Classify a raw JSON document.
    ///
    /// `method` + `id` is a request, `method` alone a notification, and an
    /// `id` with `result` or `error` a response.
    pub fn from_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        let has_method = value.get("method").is_some();
        let has_id = value.get("id").is_some();

        if has_method && has_id {
            serde_json::from_value(value).map(JsonRpcMessage::Request)
        } else if has_method {
            serde_json::from_value(value).map(JsonRpcMessage::Notification)
        } else {
            serde_json::from_value(value).map(JsonRpcMessage::Response)
        }
    }

    /// Try to parse a JSON string into a message
    pub fn parse(json: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Check if this is a request (has id and method)
    pub fn is_request(&self) -> bool {
        matches!(self, JsonRpcMessage::Request(_))
    }

    /// Check if this is a notification (has method but no id)
    pub fn is_notification(&self) -> bool {
        matches!(self, JsonRpcMessage::Notification(_))
    }

    /// Check if this is a response (has id and result/error)
    pub fn is_response(&self) -> bool {
        matches!(self, JsonRpcMessage::Response(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serialization() {
        let req = JsonRpcRequest::new(1, "tools/list");
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"version\":\"2.0\""));
        assert!(json.contains("\"method\":\"tools/list\""));
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_request_accepts_jsonrpc_alias() {
        let json = r#"{"jsonrpc":"2.0","id":"a","method":"ping"}"#;
        let req: JsonRpcRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.version, "2.0");
        assert_eq!(req.id, RequestId::String("a".to_string()));
    }

    #[test]
    fn test_response_success() {
        let resp = JsonRpcResponse::success(RequestId::Number(1), serde_json::json!({"ok": true}));
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"result\""));
        assert!(!json.contains("\"error\""));
    }

    #[test]
    fn test_response_error() {
        let resp = JsonRpcResponse::error(
            RequestId::Number(1),
            JsonRpcError::method_not_found("unknown"),
        );
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"error\""));
        assert!(json.contains("-32601"));
        assert!(!json.contains("\"result\""));
    }

    #[test]
    fn test_into_result_prefers_error() {
        let mut resp = JsonRpcResponse::error(RequestId::Null, JsonRpcError::parse_error());
        resp.result = Some(serde_json::json!(1));
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, codes::PARSE_ERROR);
    }

    #[test]
    fn test_validation_errors_roundtrip_through_data() {
        let errors = vec!["wallet_address: required field missing".to_string()];
        let err = JsonRpcError::validation_failed(&errors);
        assert_eq!(err.code, codes::INVALID_PARAMS);
        assert_eq!(err.validation_errors(), errors);
    }

    #[test]
    fn test_notification() {
        let notif = JsonRpcNotification::new("notifications/initialized");
        let json = serde_json::to_string(&notif).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(json.contains("\"method\""));
    }

    #[test]
    fn test_parse_classifies_messages() {
        let req = JsonRpcMessage::parse(r#"{"version":"2.0","id":1,"method":"initialize","params":{}}"#)
            .unwrap();
        assert!(req.is_request());

        let notif =
            JsonRpcMessage::parse(r#"{"version":"2.0","method":"notifications/initialized"}"#)
                .unwrap();
        assert!(notif.is_notification());

        let resp = JsonRpcMessage::parse(r#"{"version":"2.0","id":1,"result":{}}"#).unwrap();
        assert!(resp.is_response());
    }
}
