//! Just enough protocol framing for agents and sessions to talk to a
//! frontend: request parsing and the three outbound message shapes.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

impl ProtocolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ProtocolError::Parse(_) => ErrorCode::ParseError,
            ProtocolError::InvalidRequest { .. } => ErrorCode::InvalidRequest,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
}

impl ErrorCode {
    pub fn as_i32(self) -> i32 {
        match self {
            ErrorCode::ParseError => -32700,
            ErrorCode::InvalidRequest => -32600,
            ErrorCode::MethodNotFound => -32601,
            ErrorCode::InvalidParams => -32602,
        }
    }
}

/// An inbound protocol request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Request {
    pub id: i64,
    pub method: String,
    #[serde(default = "empty_params")]
    pub params: Value,
}

fn empty_params() -> Value {
    Value::Object(Map::new())
}

impl Request {
    pub fn new(id: i64, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }

    pub fn parse(message: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(message)?;
        if !value.is_object() {
            return Err(ProtocolError::InvalidRequest {
                message: "request must be a JSON object".to_string(),
            });
        }
        let request: Request =
            serde_json::from_value(value).map_err(|e| ProtocolError::InvalidRequest {
                message: e.to_string(),
            })?;
        if !request.params.is_object() {
            return Err(ProtocolError::InvalidRequest {
                message: "params must be an object".to_string(),
            });
        }
        Ok(request)
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.params.get(key)
    }
}

pub fn json_result(id: i64, result: Value) -> String {
    json!({ "id": id, "result": result }).to_string()
}

pub fn json_error(id: Option<i64>, code: ErrorCode, message: impl Into<String>) -> String {
    json!({
        "id": id,
        "error": { "code": code.as_i32(), "message": message.into() },
    })
    .to_string()
}

pub fn json_notification(method: &str, params: Value) -> String {
    json!({ "method": method, "params": params }).to_string()
}

/// Outbound message sink for one session.
#[derive(Clone)]
pub struct FrontendChannel {
    send: Arc<dyn Fn(String) + Send + Sync>,
}

impl FrontendChannel {
    pub fn new(send: impl Fn(String) + Send + Sync + 'static) -> Self {
        Self {
            send: Arc::new(send),
        }
    }

    pub fn send(&self, message: String) {
        (self.send)(message);
    }
}

impl From<mpsc::UnboundedSender<String>> for FrontendChannel {
    fn from(tx: mpsc::UnboundedSender<String>) -> Self {
        Self::new(move |message| {
            if tx.send(message).is_err() {
                tracing::debug!("Frontend channel closed, dropping message");
            }
        })
    }
}

impl fmt::Debug for FrontendChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrontendChannel").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_request_with_and_without_params() {
        let request =
            Request::parse(r#"{"id":3,"method":"Runtime.addBinding","params":{"name":"x"}}"#)
                .unwrap();
        assert_eq!(request.id, 3);
        assert_eq!(request.method, "Runtime.addBinding");
        assert_eq!(request.param("name"), Some(&json!("x")));

        let request = Request::parse(r#"{"id":4,"method":"Runtime.enable"}"#).unwrap();
        assert_eq!(request.params, json!({}));
    }

    #[test]
    fn rejects_malformed_requests() {
        assert_eq!(
            Request::parse("not json").unwrap_err().code(),
            ErrorCode::ParseError
        );
        assert_eq!(
            Request::parse("[1,2]").unwrap_err().code(),
            ErrorCode::InvalidRequest
        );
        assert_eq!(
            Request::parse(r#"{"method":"Runtime.enable"}"#)
                .unwrap_err()
                .code(),
            ErrorCode::InvalidRequest
        );
        assert_eq!(
            Request::parse(r#"{"id":1,"method":"Runtime.enable","params":[]}"#)
                .unwrap_err()
                .code(),
            ErrorCode::InvalidRequest
        );
    }

    #[test]
    fn serializes_messages() {
        let result: Value = serde_json::from_str(&json_result(1, json!({}))).unwrap();
        assert_eq!(result, json!({"id": 1, "result": {}}));

        let error: Value =
            serde_json::from_str(&json_error(None, ErrorCode::ParseError, "bad")).unwrap();
        assert_eq!(
            error,
            json!({"id": null, "error": {"code": -32700, "message": "bad"}})
        );

        let notification: Value =
            serde_json::from_str(&json_notification("Runtime.bindingCalled", json!({"a": 1})))
                .unwrap();
        assert_eq!(
            notification,
            json!({"method": "Runtime.bindingCalled", "params": {"a": 1}})
        );
    }

    #[test]
    fn channel_forwards_to_sender() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let channel = FrontendChannel::from(tx);
        channel.send("hello".to_string());
        assert_eq!(rx.try_recv().unwrap(), "hello");

        drop(rx);
        channel.send("dropped".to_string());
    }
}
