//! Consumer-facing runtime context.
//!
//! [`RuntimeContext`] is the only surface consumer tools see. It wraps
//! [`RuntimeBridge`] to hide CDP details: no raw frames, no pending-request
//! bookkeeping, no channel handles cross this boundary. Failures surface
//! only as connection-state values and structured script results.

// ============================================================================
// Imports
// ============================================================================

use crate::protocol::ScriptResult;

use super::manager::{ConnectionState, NavigationListener, RuntimeBridge, StateListener};

// ============================================================================
// Constants
// ============================================================================

/// Expression calling the injected helper; yields the task id or `null`.
const TASK_ID_EXPRESSION: &str = "(window.getTaskIdFromUrl && window.getTaskIdFromUrl()) || null";

// ============================================================================
// RuntimeContext
// ============================================================================

/// Minimal, safe API for tools to interact with the ClickUp runtime.
///
/// A stability boundary, not a framework abstraction: everything here
/// delegates to the bridge and normalizes results for consumers.
#[derive(Clone)]
pub struct RuntimeContext {
    bridge: RuntimeBridge,
}

impl RuntimeContext {
    /// Creates a context over the given bridge.
    #[must_use]
    pub fn new(bridge: RuntimeBridge) -> Self {
        Self { bridge }
    }

    /// Executes JavaScript in the runtime with a structured result.
    ///
    /// `exceptionDetails` determines success, not the return value.
    pub async fn execute_script_with_result(&self, js: &str) -> ScriptResult {
        self.bridge.execute_script_with_result(js).await
    }

    /// Executes JavaScript in the runtime.
    ///
    /// Returns `None` on error or if the result carries no string value.
    pub async fn execute_script(&self, js: &str) -> Option<String> {
        self.bridge.execute_script(js).await
    }

    /// Gets the task id from the current URL using the injected helper.
    ///
    /// Returns `None` if the helper is unavailable or no task id can be
    /// extracted; the helper's `"null"` string result is normalized away.
    pub async fn task_id(&self) -> Option<String> {
        self.bridge
            .execute_script(TASK_ID_EXPRESSION)
            .await
            .filter(|id| !id.is_empty() && id != "null")
    }

    /// Returns the last observed page URL. Best effort, never blocks.
    #[inline]
    #[must_use]
    pub fn last_known_url(&self) -> Option<String> {
        self.bridge.last_known_url()
    }

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.bridge.connection_state()
    }

    /// Subscribes to navigation notifications.
    ///
    /// Best effort: events lost to a dropped frame or a reconnect gap are
    /// not replayed; re-query [`Self::last_known_url`] on demand.
    pub fn on_navigation(&self, listener: NavigationListener) {
        self.bridge.on_navigation(listener);
    }

    /// Subscribes to connection-state changes.
    pub fn on_connection_state_changed(&self, listener: StateListener) {
        self.bridge.on_connection_state_changed(listener);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use crate::options::BridgeOptions;

    fn disconnected_context() -> RuntimeContext {
        // Never connected in these tests; the port goes unused.
        let options = BridgeOptions::new().with_debug_port(9999);
        RuntimeContext::new(RuntimeBridge::new(options))
    }

    #[tokio::test]
    async fn test_execute_while_disconnected_is_structured_failure() {
        let context = disconnected_context();

        let result = context.execute_script_with_result("1 + 1").await;
        assert!(!result.success);
        assert_eq!(
            result.exception_message.as_deref(),
            Some("Runtime not connected")
        );
    }

    #[tokio::test]
    async fn test_task_id_none_while_disconnected() {
        let context = disconnected_context();
        assert!(context.task_id().await.is_none());
    }

    #[test]
    fn test_initial_state_exposed() {
        let context = disconnected_context();
        assert_eq!(context.connection_state(), ConnectionState::Disconnected);
        assert!(context.last_known_url().is_none());
    }
}
