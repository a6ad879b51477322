//! JSON-RPC 2.0 message model.
//!
//! Every message that crosses a [`Transport`](crate::transport::Transport) is a JSON
//! object carrying `"jsonrpc": "2.0"`. A message is a request or a notification if it
//! has a `method` field; otherwise it is a response. A request carries an `id`; a
//! notification does not.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Protocol version literal carried on every wire message.
pub const JSONRPC_VERSION: &str = "2.0";

/// A JSON-RPC request or response identifier.
///
/// Comparisons between ids use the string form on both sides (spec §4.5,
/// "Response id equality") to avoid numeric/string ambiguity across peers that may
/// serialize ids differently.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

impl RequestId {
    /// The canonical string key used for pending-table lookups and equality.
    pub fn as_key(&self) -> String {
        match self {
            RequestId::Number(n) => n.to_string(),
            RequestId::String(s) => s.clone(),
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        RequestId::Number(value)
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        RequestId::String(value)
    }
}

/// A JSON-RPC 2.0 error object (spec §4.2).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ErrorObject {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn parse_error() -> Self {
        Self::new(codes::PARSE_ERROR, "Parse error")
    }

    pub fn invalid_request(detail: impl Into<String>) -> Self {
        Self::new(codes::INVALID_REQUEST, detail.into())
    }

    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            codes::METHOD_NOT_FOUND,
            format!("Method not found: {method}"),
        )
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self::new(codes::INVALID_PARAMS, detail.into())
    }

    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self::new(codes::INTERNAL_ERROR, detail.into())
    }

    pub fn unexpected_server_error(detail: impl Into<String>) -> Self {
        Self::new(codes::UNEXPECTED_SERVER_ERROR, detail.into())
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for ErrorObject {}

/// Standard and reserved JSON-RPC error codes (spec §4.2).
pub mod codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Low end (inclusive) of the server-error reservation.
    pub const SERVER_ERROR_MIN: i64 = -32099;
    /// High end (inclusive) of the server-error reservation.
    pub const SERVER_ERROR_MAX: i64 = -32000;
    pub const UNEXPECTED_SERVER_ERROR: i64 = -32000;
    /// Sentinel used when a handler returns a domain error without specifying a code.
    /// Deliberately outside the reserved `SERVER_ERROR_MIN..=SERVER_ERROR_MAX` band, per
    /// spec §4.2's requirement that application errors not collide with it.
    pub const GENERIC_APPLICATION_ERROR: i64 = -320100;
}

/// A JSON-RPC request: has a `method` and an `id`, expects exactly one response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: RequestId,
}

impl Request {
    pub fn new(method: impl Into<String>, params: Option<Value>, id: RequestId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC notification: has a `method`, no `id`, no response is ever emitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

/// A JSON-RPC response: carries exactly one of `result` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorObject>,
    pub id: Value,
}

impl Response {
    pub fn success(id: RequestId, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id: serde_json::to_value(&id).expect("RequestId always serializes"),
        }
    }

    pub fn error(id: Value, error: ErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }
}

/// An inbound message classified per spec §4.1: requests and notifications are
/// distinguished from responses by the presence of `method`; requests are distinguished
/// from notifications by the presence of `id`.
#[derive(Debug, Clone)]
pub enum Incoming {
    Request(Request),
    Notification(Notification),
    Response(Response),
}

/// Parses a raw JSON value received from a transport into a classified [`Incoming`]
/// message, or `None` if the value does not resemble any JSON-RPC message shape.
pub fn classify(value: Value) -> Option<Incoming> {
    let has_method = value.get("method").is_some();
    let has_id = value.get("id").is_some();

    if has_method {
        if has_id {
            serde_json::from_value(value).ok().map(Incoming::Request)
        } else {
            serde_json::from_value(value)
                .ok()
                .map(Incoming::Notification)
        }
    } else {
        serde_json::from_value(value).ok().map(Incoming::Response)
    }
}

/// Validates that a serialized `params` value is acceptable on the wire: an object, an
/// array, or `null`/absent — never a scalar (spec §6, §8 invariant 9).
pub fn validate_params_shape(value: &Value) -> Result<(), String> {
    match value {
        Value::Object(_) | Value::Array(_) | Value::Null => Ok(()),
        other => Err(format!(
            "params must serialize to an object, array, or null, got {other}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_id_string_key_matches_across_representations() {
        assert_eq!(RequestId::Number(7).as_key(), RequestId::String("7".into()).as_key());
    }

    #[test]
    fn classify_request_has_method_and_id() {
        let value = serde_json::json!({"jsonrpc": "2.0", "method": "calculate", "id": 1, "params": {"name": "foo"}});
        match classify(value).unwrap() {
            Incoming::Request(r) => {
                assert_eq!(r.method, "calculate");
                assert_eq!(r.id, RequestId::Number(1));
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn classify_notification_has_method_no_id() {
        let value = serde_json::json!({"jsonrpc": "2.0", "method": "progress", "params": {"progress": 0.5}});
        match classify(value).unwrap() {
            Incoming::Notification(n) => assert_eq!(n.method, "progress"),
            _ => panic!("expected notification"),
        }
    }

    #[test]
    fn classify_response_has_neither_method() {
        let value = serde_json::json!({"jsonrpc": "2.0", "result": "blafoo", "id": 1});
        match classify(value).unwrap() {
            Incoming::Response(r) => assert_eq!(r.result, Some(Value::String("blafoo".into()))),
            _ => panic!("expected response"),
        }
    }

    #[test]
    fn scalar_params_are_rejected() {
        assert!(validate_params_shape(&Value::String("nope".into())).is_err());
        assert!(validate_params_shape(&Value::Null).is_ok());
        assert!(validate_params_shape(&serde_json::json!({"a": 1})).is_ok());
        assert!(validate_params_shape(&serde_json::json!([1, 2])).is_ok());
    }
}
