//! JSON-RPC 2.0 message types as they appear on the wire.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Protocol version carried in every message.
pub const JSONRPC_VERSION: &str = "2.0";

fn jsonrpc_version() -> String {
    JSONRPC_VERSION.to_string()
}

/// Request correlation id: a string or a number, echoed verbatim.
///
/// Numbers are kept as sent, so `1.0` or `18446744073709551615` round-trip
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Num(Number),
    Str(String),
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::Str(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self::Str(id)
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Num(id.into())
    }
}

/// A call to a named command.
///
/// A request without an `id` is a notification: it runs, but no response
/// is sent back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RequestId>,
}

fn empty_params() -> Value {
    Value::Object(Map::new())
}

impl Request {
    /// A request that expects a response.
    pub fn new(method: impl Into<String>, params: Value, id: impl Into<RequestId>) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.into(),
            params,
            id: Some(id.into()),
        }
    }

    /// A fire-and-forget request.
    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            method: method.into(),
            params,
            id: None,
        }
    }

    /// Whether the sender expects no response.
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

/// Reply to a request. Exactly one of `result` and `error` is set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(default = "jsonrpc_version")]
    pub jsonrpc: String,
    /// `null` when the request id could not be read.
    #[serde(default)]
    pub id: Option<RequestId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
}

impl Response {
    /// Success response.
    ///
    /// A `null` result is written as `"result": null`.
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id: Some(id),
            result: Some(result),
            error: None,
        }
    }

    /// Error response.
    pub fn error(id: Option<RequestId>, error: ErrorObject) -> Self {
        Self {
            jsonrpc: jsonrpc_version(),
            id,
            result: None,
            error: Some(error),
        }
    }

    /// Whether this response reports an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Split into the call outcome.
    ///
    /// A missing `result` on a non-error response (a `null` result read back
    /// from the wire) becomes `Value::Null`.
    pub fn into_result(self) -> std::result::Result<Value, ErrorObject> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// The `error` member of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    /// Create an error with a code and message.
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create an error with attached data.
    pub fn with_data(code: i64, message: impl Into<String>, data: Value) -> Self {
        Self {
            code,
            message: message.into(),
            data: Some(data),
        }
    }

    /// Parse error (-32700).
    pub fn parse_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::PARSE_ERROR, message)
    }

    /// Invalid request error (-32600).
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_REQUEST, message)
    }

    /// Method not found error (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            ErrorCode::METHOD_NOT_FOUND,
            format!("Unknown method: {method}"),
        )
    }

    /// Invalid params error (-32602).
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INVALID_PARAMS, message)
    }

    /// Internal error (-32603).
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::INTERNAL_ERROR, message)
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

/// Standard error codes.
pub struct ErrorCode;

impl ErrorCode {
    /// Invalid JSON.
    pub const PARSE_ERROR: i64 = -32700;
    /// Invalid request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Unknown method.
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal error.
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Lowest code reserved for server-defined command failures.
    pub const SERVER_ERROR_MIN: i64 = -32099;
    /// Highest code reserved for server-defined command failures.
    pub const SERVER_ERROR_MAX: i64 = -32000;

    /// The addressed element or resource does not exist.
    pub const NOT_FOUND: i64 = -32001;
    /// The host rejected the operation in its current state.
    pub const HOST_REJECTED: i64 = -32002;

    /// Whether `code` is in the server-defined range.
    pub fn is_server_error(code: i64) -> bool {
        (Self::SERVER_ERROR_MIN..=Self::SERVER_ERROR_MAX).contains(&code)
    }

    /// Short name for a code, for logs and tables.
    pub fn name(code: i64) -> &'static str {
        match code {
            Self::PARSE_ERROR => "parse error",
            Self::INVALID_REQUEST => "invalid request",
            Self::METHOD_NOT_FOUND => "method not found",
            Self::INVALID_PARAMS => "invalid params",
            Self::INTERNAL_ERROR => "internal error",
            Self::NOT_FOUND => "not found",
            Self::HOST_REJECTED => "host rejected",
            c if Self::is_server_error(c) => "server error",
            _ => "application error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_with_version_and_id() {
        let request = Request::new("echo", json!({"x": 1}), "42");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "method": "echo", "params": {"x": 1}, "id": "42"})
        );
    }

    #[test]
    fn notification_omits_id() {
        let request = Request::notification("log", json!({}));
        assert!(request.is_notification());
        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("id").is_none());
    }

    #[test]
    fn request_defaults_missing_fields() {
        let request: Request = serde_json::from_str(r#"{"method":"ping","id":7}"#).unwrap();
        assert_eq!(request.jsonrpc, "2.0");
        assert_eq!(request.params, json!({}));
        assert_eq!(request.id, Some(RequestId::from(7_i64)));
    }

    #[test]
    fn success_response_shape() {
        let response = Response::success("42".into(), json!({"x": 1}));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"jsonrpc": "2.0", "id": "42", "result": {"x": 1}})
        );
    }

    #[test]
    fn null_result_is_still_written() {
        let response = Response::success(RequestId::from(1_i64), Value::Null);
        let text = serde_json::to_string(&response).unwrap();
        assert!(text.contains(r#""result":null"#));

        let back: Response = serde_json::from_str(&text).unwrap();
        assert_eq!(back.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn error_response_shape_without_data() {
        let response = Response::error(
            Some("7".into()),
            ErrorObject::new(ErrorCode::NOT_FOUND, "not found"),
        );
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"jsonrpc": "2.0", "id": "7", "error": {"code": -32001, "message": "not found"}})
        );
    }

    #[test]
    fn error_response_with_unknown_id_writes_null() {
        let response = Response::error(None, ErrorObject::parse_error("Invalid JSON"));
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], -32700);
    }

    #[test]
    fn into_result_prefers_error() {
        let response: Response = serde_json::from_str(
            r#"{"id":"1","error":{"code":-32603,"message":"boom","data":{"k":1}}}"#,
        )
        .unwrap();
        let err = response.into_result().unwrap_err();
        assert_eq!(err.code, ErrorCode::INTERNAL_ERROR);
        assert_eq!(err.data, Some(json!({"k": 1})));
        assert_eq!(err.to_string(), "boom (code -32603)");
    }

    #[test]
    fn fractional_and_large_ids_round_trip() {
        for text in ["1.0", "18446744073709551615"] {
            let id: RequestId = serde_json::from_str(text).unwrap();
            assert!(matches!(id, RequestId::Num(_)));
            assert_eq!(serde_json::to_string(&id).unwrap(), text);
        }
    }

    #[test]
    fn request_id_forms() {
        let num: RequestId = serde_json::from_str("12").unwrap();
        let text: RequestId = serde_json::from_str(r#""abc""#).unwrap();
        assert_eq!(num, RequestId::from(12_i64));
        assert_eq!(text, RequestId::from("abc"));
        assert_eq!(num.to_string(), "12");
        assert_eq!(text.to_string(), "abc");
    }

    #[test]
    fn error_code_ranges() {
        assert!(ErrorCode::is_server_error(ErrorCode::NOT_FOUND));
        assert!(!ErrorCode::is_server_error(ErrorCode::INTERNAL_ERROR));
        assert_eq!(ErrorCode::name(-32601), "method not found");
        assert_eq!(ErrorCode::name(-32050), "server error");
        assert_eq!(ErrorCode::name(42), "application error");
        assert_eq!(
            ErrorObject::method_not_found("nope").message,
            "Unknown method: nope"
        );
    }
}
