//! JSON-RPC 2.0 envelopes and the MCP dispatcher.

pub mod dispatcher;
pub mod session;

use std::borrow::Cow;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::ProtocolError;

pub use dispatcher::{DispatchOutcome, DispatchResult, Dispatcher, Method};
pub use session::{Session, SessionStore};

/// JSON-RPC version string.
pub const JSONRPC_VERSION: &str = "2.0";

/// Request identifier, echoed back exactly as received.
///
/// Numbers keep their original representation (`serde_json::Number`), so `7` stays
/// `7` and `"7"` stays `"7"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(serde_json::Number),
    String(String),
}

impl RequestId {
    /// Accept a string or number; anything else is not a valid id.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => Some(Self::Number(n.clone())),
            Value::String(s) => Some(Self::String(s.clone())),
            _ => None,
        }
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s:?}"),
        }
    }
}

/// A validated JSON-RPC request or notification.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonRpcRequest {
    /// `None` for notifications.
    pub id: Option<RequestId>,
    pub method: String,
    pub params: Option<Value>,
}

/// Envelope validation failure: the id to answer with (if one could be read) and the error.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeError {
    pub id: Option<RequestId>,
    pub error: ProtocolError,
}

impl JsonRpcRequest {
    /// Validate one message of a request body.
    ///
    /// An absent `id` makes a notification. A present `id` that is neither string nor
    /// number (including `null`) is an invalid request.
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let Value::Object(mut map) = value else {
            return Err(invalid(None, "message must be a JSON object"));
        };

        let id = match map.remove("id") {
            None => None,
            Some(raw) => match RequestId::from_value(&raw) {
                Some(id) => Some(id),
                None => return Err(invalid(None, "id must be a string or a number")),
            },
        };

        if map.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
            return Err(invalid(id, "jsonrpc must be \"2.0\""));
        }

        let method = match map.remove("method") {
            Some(Value::String(method)) => method,
            Some(_) => return Err(invalid(id, "method must be a string")),
            None => return Err(invalid(id, "missing method")),
        };

        let params = match map.remove("params") {
            None | Some(Value::Null) => None,
            Some(p @ (Value::Object(_) | Value::Array(_))) => Some(p),
            Some(_) => return Err(invalid(id, "params must be an object or an array")),
        };

        Ok(Self { id, method, params })
    }

    /// Returns true if no response is owed.
    #[must_use]
    pub const fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Params as an object map; missing params read as empty.
    pub fn params_object(&self) -> Result<Map<String, Value>, ProtocolError> {
        match &self.params {
            None => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(_) => Err(ProtocolError::InvalidParams("params must be an object".into())),
        }
    }
}

fn invalid(id: Option<RequestId>, message: &str) -> EnvelopeError {
    EnvelopeError {
        id,
        error: ProtocolError::InvalidRequest(message.to_string()),
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    /// Serialized as `null` when the request id could not be determined.
    pub id: Option<RequestId>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            result: Some(result),
            error: None,
            id,
        }
    }

    #[must_use]
    pub fn error(id: Option<RequestId>, error: &ProtocolError) -> Self {
        Self {
            jsonrpc: Cow::Borrowed(JSONRPC_VERSION),
            result: None,
            error: Some(JsonRpcError {
                code: error.code(),
                message: error.to_string(),
                data: None,
            }),
            id,
        }
    }

    /// Returns true for error responses.
    #[must_use]
    pub const fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_request() {
        let req = JsonRpcRequest::from_value(
            json!({"jsonrpc": "2.0", "id": 1, "method": "ping", "params": {}}),
        )
        .unwrap();
        assert_eq!(req.method, "ping");
        assert_eq!(req.id, Some(RequestId::Number(1.into())));
        assert!(!req.is_notification());
    }

    #[test]
    fn test_parse_notification() {
        let req = JsonRpcRequest::from_value(
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        )
        .unwrap();
        assert!(req.is_notification());
        assert!(req.params.is_none());
    }

    #[test]
    fn test_invalid_envelopes() {
        let cases = [
            json!([1, 2]),
            json!({"jsonrpc": "1.0", "id": 1, "method": "ping"}),
            json!({"id": 1, "method": "ping"}),
            json!({"jsonrpc": "2.0", "id": 1}),
            json!({"jsonrpc": "2.0", "id": 1, "method": 5}),
            json!({"jsonrpc": "2.0", "id": {"a": 1}, "method": "ping"}),
            json!({"jsonrpc": "2.0", "id": null, "method": "ping"}),
            json!({"jsonrpc": "2.0", "id": 1, "method": "ping", "params": "x"}),
        ];
        for case in cases {
            let err = JsonRpcRequest::from_value(case.clone()).unwrap_err();
            assert_eq!(err.error.code(), -32600, "{case}");
        }
    }

    #[test]
    fn test_invalid_envelope_keeps_readable_id() {
        let err =
            JsonRpcRequest::from_value(json!({"jsonrpc": "2.0", "id": "abc"})).unwrap_err();
        assert_eq!(err.id, Some(RequestId::String("abc".into())));
    }

    #[test]
    fn test_response_serialization() {
        let ok = JsonRpcResponse::success(Some(RequestId::String("7".into())), json!({}));
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"jsonrpc": "2.0", "result": {}, "id": "7"})
        );

        let err = JsonRpcResponse::error(None, &ProtocolError::Parse("eof".into()));
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert_eq!(value["error"]["code"], -32700);
    }
}
