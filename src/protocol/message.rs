//! CDP frame types and correlation identifiers.
//!
//! Defines the wire format for commands, responses, and events exchanged
//! with the runtime over the duplex channel.
//!
//! # Format
//!
//! Outbound:
//! ```json
//! { "id": 1, "method": "Runtime.evaluate", "params": { ... } }
//! ```
//!
//! Inbound response (carries an `id`):
//! ```json
//! { "id": 1, "result": { ... } }
//! ```
//!
//! Inbound event (no `id`, carries a `method`):
//! ```json
//! { "method": "Page.frameNavigated", "params": { ... } }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// CommandId
// ============================================================================

/// Correlation identifier for request/response matching.
///
/// Ids are monotonically increasing within one connection's lifetime and
/// never reused while a request is still pending. Responses may arrive out
/// of order; matching is by id, never by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(u64);

impl CommandId {
    /// Creates a command id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw id value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// CommandFrame
// ============================================================================

/// An outbound command frame.
#[derive(Debug, Clone, Serialize)]
pub struct CommandFrame {
    /// Correlation id echoed on the response.
    pub id: CommandId,

    /// CDP method in `Domain.method` format.
    pub method: String,

    /// Method parameters.
    pub params: Value,
}

impl CommandFrame {
    /// Creates a new command frame.
    #[inline]
    #[must_use]
    pub fn new(id: CommandId, method: impl Into<String>, params: Value) -> Self {
        Self {
            id,
            method: method.into(),
            params,
        }
    }
}

// ============================================================================
// InboundFrame
// ============================================================================

/// An inbound frame, decoded once at the protocol boundary.
///
/// Responses are distinguished from events by the presence of an `id` field;
/// untagged deserialization tries [`ResponseFrame`] first.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InboundFrame {
    /// Response to a previously sent command.
    Response(ResponseFrame),
    /// Unsolicited event notification.
    Event(EventFrame),
}

/// A response frame correlated to a pending command.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseFrame {
    /// Matches the command `id`.
    pub id: CommandId,

    /// Result payload (if the command succeeded).
    #[serde(default)]
    pub result: Option<Value>,

    /// Error detail (if the runtime rejected the command).
    #[serde(default)]
    pub error: Option<ErrorDetail>,
}

impl ResponseFrame {
    /// Extracts the result payload, mapping a CDP error member to
    /// [`crate::Error::CommandFailed`].
    pub fn into_result(self) -> crate::Result<Value> {
        match self.error {
            Some(detail) => Err(crate::Error::command_failed(detail.describe())),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// An event frame pushed by the runtime.
#[derive(Debug, Clone, Deserialize)]
pub struct EventFrame {
    /// Event method in `Domain.event` format.
    pub method: String,

    /// Event parameters.
    #[serde(default)]
    pub params: Value,
}

// ============================================================================
// ErrorDetail
// ============================================================================

/// CDP error member of a response frame.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorDetail {
    /// Numeric error code.
    #[serde(default)]
    pub code: Option<i64>,

    /// Human-readable error message.
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorDetail {
    /// Returns a printable description of the error.
    #[must_use]
    pub fn describe(&self) -> String {
        match (&self.message, self.code) {
            (Some(message), _) => message.clone(),
            (None, Some(code)) => format!("error code {code}"),
            (None, None) => "unknown error".to_string(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_frame_serialization() {
        let frame = CommandFrame::new(
            CommandId::new(3),
            "Runtime.evaluate",
            json!({ "expression": "1 + 1", "returnByValue": true }),
        );

        let value = serde_json::to_value(&frame).expect("serialize");
        assert_eq!(value["id"], 3);
        assert_eq!(value["method"], "Runtime.evaluate");
        assert_eq!(value["params"]["returnByValue"], true);
    }

    #[test]
    fn test_response_frame_decodes_as_response() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"id": 5, "result": {"result": {"type": "string"}}}"#)
                .expect("parse");

        match frame {
            InboundFrame::Response(response) => {
                assert_eq!(response.id, CommandId::new(5));
                assert!(response.result.is_some());
                assert!(response.error.is_none());
            }
            InboundFrame::Event(_) => panic!("expected response"),
        }
    }

    #[test]
    fn test_event_frame_decodes_as_event() {
        let frame: InboundFrame = serde_json::from_str(
            r#"{"method": "Page.frameNavigated", "params": {"frame": {"url": "https://app.clickup.com/"}}}"#,
        )
        .expect("parse");

        match frame {
            InboundFrame::Event(event) => {
                assert_eq!(event.method, "Page.frameNavigated");
                assert_eq!(
                    event.params["frame"]["url"],
                    "https://app.clickup.com/"
                );
            }
            InboundFrame::Response(_) => panic!("expected event"),
        }
    }

    #[test]
    fn test_event_without_params() {
        let frame: InboundFrame =
            serde_json::from_str(r#"{"method": "Page.loadEventFired"}"#).expect("parse");
        assert!(matches!(frame, InboundFrame::Event(_)));
    }

    #[test]
    fn test_response_error_member() {
        let response: ResponseFrame = serde_json::from_str(
            r#"{"id": 9, "error": {"code": -32601, "message": "Method not found"}}"#,
        )
        .expect("parse");

        let err = response.into_result().expect_err("should be error");
        assert_eq!(err.to_string(), "Command failed: Method not found");
    }

    #[test]
    fn test_response_into_result_defaults_null() {
        let response: ResponseFrame = serde_json::from_str(r#"{"id": 2}"#).expect("parse");
        let value = response.into_result().expect("success");
        assert_eq!(value, Value::Null);
    }

    #[test]
    fn test_command_id_display() {
        assert_eq!(CommandId::new(42).to_string(), "42");
    }
}
