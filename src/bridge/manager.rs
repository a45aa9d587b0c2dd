//! Connection manager and reconnection state machine.
//!
//! [`RuntimeBridge`] owns the single live connection to the ClickUp Desktop
//! runtime: target discovery, channel lifecycle, the post-attach
//! initialization sequence, and a supervised reconnection loop gated by the
//! process liveness probe.
//!
//! # State machine
//!
//! ```text
//! Disconnected ──connect/reconnect──► Connecting ──attach ok──► Connected
//!      ▲                                  │                         │
//!      │                             attach failed            channel closed
//!      │                                  ▼                         │
//!      └────────── explicit ──────────  Failed ◄───cap/dead proc────┘
//!                 disconnect                        (via reconnect loop)
//! ```
//!
//! Entry into Connecting is single-flight: a connect call while already
//! Connecting or Connected is a no-op reporting the current success state.
//!
//! # Reconnection policy
//!
//! After an unexpected closure while Connected: probe liveness (dead process
//! is terminal), then up to `max_reconnect_attempts` attempts with
//! exponential backoff (1s, 2s, 4s by default), re-probing liveness after
//! every delay before re-entering discovery. A failed automatic attempt
//! drops back to Disconnected; Failed is terminal, reached only when the cap
//! is exhausted, the process is dead, or an explicit connect/retry fails.
//! A manual [`RuntimeBridge::retry`] resets the attempt counter.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::discovery;
use crate::error::{Error, Result};
use crate::options::BridgeOptions;
use crate::probe::{LivenessProbe, ProcessProbe};
use crate::protocol::{
    EVENT_FRAME_NAVIGATED, METHOD_ADD_SCRIPT_ON_NEW_DOCUMENT, METHOD_PAGE_ENABLE,
    METHOD_RUNTIME_ENABLE, METHOD_RUNTIME_EVALUATE, ScriptResult, classify_evaluate,
};
use crate::transport::{ClosedHandler, Connection, EventHandler};

// ============================================================================
// Constants
// ============================================================================

/// Helper script injected on attach and on every new document.
///
/// Idempotent via the global marker; re-injection on every (re)connect is
/// intentional and safe to repeat.
pub(crate) const RUNTIME_HELPERS_SCRIPT: &str = r#"
(function() {
    if (window.__clickupPowerToolsHelpers) return;
    window.__clickupPowerToolsHelpers = true;

    window.getTaskIdFromUrl = function() {
        try {
            const url = window.location?.href;
            if (!url) return null;
            const match = url.match(/\/t\/([a-zA-Z0-9]+)/);
            return match ? match[1] : null;
        } catch {
            return null;
        }
    };
})();
"#;

// ============================================================================
// ConnectionState
// ============================================================================

/// Connection lifecycle state. Exactly one value is live at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel; no attempt in flight.
    Disconnected,
    /// Attach attempt in flight.
    Connecting,
    /// Channel open, domains enabled, helpers injected.
    Connected,
    /// Attach failed or reconnection gave up; waits for a manual retry.
    Failed,
}

// ============================================================================
// Types
// ============================================================================

/// Connection-state change listener.
pub type StateListener = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Navigation listener, called with the new URL.
pub type NavigationListener = Arc<dyn Fn(&str) + Send + Sync>;

/// State guarded by the bridge mutex.
///
/// Held only for transitions and field updates, never across an await.
struct Shared {
    state: ConnectionState,
    reconnect_attempts: u32,
    last_known_url: Option<String>,
    connection: Option<Connection>,
}

struct BridgeInner {
    options: BridgeOptions,
    http: reqwest::Client,
    probe: Arc<dyn LivenessProbe>,
    shared: Mutex<Shared>,
    state_listeners: Mutex<Vec<StateListener>>,
    navigation_listeners: Mutex<Vec<NavigationListener>>,
}

// ============================================================================
// RuntimeBridge
// ============================================================================

/// CDP connection manager for the ClickUp Desktop runtime.
///
/// Cheap to clone; all clones share one connection and one state machine.
/// Consumer tools should not use this type directly but go through
/// [`crate::bridge::RuntimeContext`].
#[derive(Clone)]
pub struct RuntimeBridge {
    inner: Arc<BridgeInner>,
}

impl RuntimeBridge {
    /// Creates a bridge with the OS process probe.
    #[must_use]
    pub fn new(options: BridgeOptions) -> Self {
        let probe = Arc::new(ProcessProbe::new(options.process_name.clone()));
        Self::with_probe(options, probe)
    }

    /// Creates a bridge with a custom liveness probe.
    #[must_use]
    pub fn with_probe(options: BridgeOptions, probe: Arc<dyn LivenessProbe>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(options.discovery_timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            inner: Arc::new(BridgeInner {
                options,
                http,
                probe,
                shared: Mutex::new(Shared {
                    state: ConnectionState::Disconnected,
                    reconnect_attempts: 0,
                    last_known_url: None,
                    connection: None,
                }),
                state_listeners: Mutex::new(Vec::new()),
                navigation_listeners: Mutex::new(Vec::new()),
            }),
        }
    }

    // ========================================================================
    // Accessors & subscriptions
    // ========================================================================

    /// Returns the current connection state.
    #[inline]
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.shared.lock().state
    }

    /// Returns the last observed page URL, surviving reconnects.
    ///
    /// Best effort; never blocks on the channel.
    #[inline]
    #[must_use]
    pub fn last_known_url(&self) -> Option<String> {
        self.inner.shared.lock().last_known_url.clone()
    }

    /// Subscribes to connection-state changes.
    pub fn on_connection_state_changed(&self, listener: StateListener) {
        self.inner.state_listeners.lock().push(listener);
    }

    /// Subscribes to navigation notifications.
    pub fn on_navigation(&self, listener: NavigationListener) {
        self.inner.navigation_listeners.lock().push(listener);
    }

    // ========================================================================
    // Connect / retry / disconnect
    // ========================================================================

    /// Connects to the runtime.
    ///
    /// Single-flight: while already Connecting or Connected this is a no-op
    /// returning the current success state; it never starts a second
    /// concurrent attempt.
    pub async fn connect(&self) -> bool {
        {
            let mut shared = self.inner.shared.lock();
            if matches!(
                shared.state,
                ConnectionState::Connected | ConnectionState::Connecting
            ) {
                debug!(state = ?shared.state, "Already connected or connecting");
                return shared.state == ConnectionState::Connected;
            }

            shared.reconnect_attempts = 0;
            shared.state = ConnectionState::Connecting;
        }
        self.notify_state(ConnectionState::Connecting);

        self.try_connect_internal(ConnectionState::Failed).await
    }

    /// Manual retry: resets the reconnect counter and attempts to connect.
    pub async fn retry(&self) -> bool {
        {
            let mut shared = self.inner.shared.lock();
            shared.reconnect_attempts = 0;

            match shared.state {
                ConnectionState::Connected => return true,
                // An attempt is in flight; the reset counter is enough.
                ConnectionState::Connecting => return false,
                _ => shared.state = ConnectionState::Connecting,
            }
        }
        self.notify_state(ConnectionState::Connecting);

        self.try_connect_internal(ConnectionState::Failed).await
    }

    /// Disconnects from the runtime. Idempotent, always safe to call.
    pub fn disconnect(&self) {
        let connection = {
            let mut shared = self.inner.shared.lock();
            // Transition first so the receive loop's closure callback does
            // not mistake this for an unexpected drop.
            shared.state = ConnectionState::Disconnected;
            shared.connection.take()
        };
        self.notify_state(ConnectionState::Disconnected);

        if let Some(connection) = connection {
            connection.shutdown();
            info!("Runtime bridge disconnected");
        }
    }

    // ========================================================================
    // Script execution
    // ========================================================================

    /// Executes JavaScript in the runtime with a structured result.
    ///
    /// Success is determined by the absence of `exceptionDetails`, not by
    /// the return value: a `null`/`undefined` evaluation is a successful
    /// result with an empty value. Transport failures (not connected,
    /// timeout) come back as failed results, never as faults.
    pub async fn execute_script_with_result(&self, js: &str) -> ScriptResult {
        let connection = {
            let shared = self.inner.shared.lock();
            if shared.state == ConnectionState::Connected {
                shared.connection.clone()
            } else {
                None
            }
        };

        let Some(connection) = connection else {
            return ScriptResult::failure(Error::NotConnected.to_string());
        };

        let params = json!({ "expression": js, "returnByValue": true });
        match connection
            .send(
                METHOD_RUNTIME_EVALUATE,
                params,
                self.inner.options.command_timeout,
            )
            .await
        {
            Ok(payload) => classify_evaluate(&payload),
            Err(e) => {
                warn!(error = %e, "Script execution failed");
                ScriptResult::failure(e.to_string())
            }
        }
    }

    /// Executes JavaScript, returning the value or `None` on any failure.
    pub async fn execute_script(&self, js: &str) -> Option<String> {
        let result = self.execute_script_with_result(js).await;
        if result.success { result.value } else { None }
    }

    // ========================================================================
    // Attach sequence
    // ========================================================================

    /// One attach attempt: discovery, channel open, domain setup.
    ///
    /// Caller must have transitioned to Connecting already; a failed attempt
    /// lands in `failure_state`. Boxed because the closure handed to the
    /// transport re-enters this function through the reconnect loop.
    fn try_connect_internal(&self, failure_state: ConnectionState) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let options = &self.inner.options;

            let Some(target) = discovery::discover(
                &self.inner.http,
                options.debug_port,
                &options.product_domain,
            )
            .await
            else {
                self.set_state(failure_state);
                return false;
            };

            let Some(ws_url) = target.web_socket_debugger_url.clone() else {
                warn!(url = %target.url, "Target has no webSocketDebuggerUrl");
                self.set_state(failure_state);
                return false;
            };

            match url::Url::parse(&ws_url) {
                Ok(parsed) if matches!(parsed.scheme(), "ws" | "wss") => {}
                _ => {
                    warn!(%ws_url, "Target advertises a non-WebSocket attach address");
                    self.set_state(failure_state);
                    return false;
                }
            }

            let event_bridge = self.clone();
            let event_handler: EventHandler = Arc::new(move |event| {
                if event.method == EVENT_FRAME_NAVIGATED {
                    let url = event.params["frame"]["url"].as_str().unwrap_or_default();
                    if !url.is_empty() {
                        event_bridge.handle_navigation(url);
                    }
                }
            });

            let closed_bridge = self.clone();
            let on_closed: ClosedHandler = Arc::new(move || {
                let bridge = closed_bridge.clone();
                tokio::spawn(async move {
                    bridge.handle_unexpected_close().await;
                });
            });

            let connection = match Connection::connect(&ws_url, event_handler, on_closed).await {
                Ok(connection) => connection,
                Err(e) => {
                    error!(error = %e, "Failed to open CDP channel");
                    self.set_state(failure_state);
                    return false;
                }
            };

            info!(url = %target.url, "Connected to CDP target");
            self.inner.shared.lock().connection = Some(connection.clone());

            if let Err(e) = self.initialize_session(&connection).await {
                error!(error = %e, "Failed to initialize CDP session");
                if let Some(connection) = self.inner.shared.lock().connection.take() {
                    connection.shutdown();
                }
                self.set_state(failure_state);
                return false;
            }

            {
                let mut shared = self.inner.shared.lock();
                shared.state = ConnectionState::Connected;
                shared.reconnect_attempts = 0;
            }
            self.notify_state(ConnectionState::Connected);

            info!("Runtime bridge connected");
            true
        })
    }

    /// Enables the required domains, registers and injects the helper
    /// script, and seeds the last known URL.
    async fn initialize_session(&self, connection: &Connection) -> Result<()> {
        let timeout = self.inner.options.command_timeout;

        connection
            .send(METHOD_RUNTIME_ENABLE, json!({}), timeout)
            .await?;
        connection
            .send(METHOD_PAGE_ENABLE, json!({}), timeout)
            .await?;

        // Auto-inject on every future document load...
        connection
            .send(
                METHOD_ADD_SCRIPT_ON_NEW_DOCUMENT,
                json!({ "source": RUNTIME_HELPERS_SCRIPT }),
                timeout,
            )
            .await?;

        // ...and into the document that is already loaded.
        connection
            .send(
                METHOD_RUNTIME_EVALUATE,
                json!({ "expression": RUNTIME_HELPERS_SCRIPT, "returnByValue": true }),
                timeout,
            )
            .await?;

        let payload = connection
            .send(
                METHOD_RUNTIME_EVALUATE,
                json!({ "expression": "window.location.href", "returnByValue": true }),
                timeout,
            )
            .await?;

        let result = classify_evaluate(&payload);
        if result.success
            && let Some(url) = result.value.filter(|u| !u.is_empty())
        {
            self.inner.shared.lock().last_known_url = Some(url);
        }

        Ok(())
    }

    // ========================================================================
    // Reconnection
    // ========================================================================

    /// Runs once per receive-loop termination.
    ///
    /// A closure observed while not Connected was either an explicit
    /// disconnect or a failed attach tearing itself down; neither triggers
    /// reconnection.
    async fn handle_unexpected_close(&self) {
        {
            let mut shared = self.inner.shared.lock();
            if shared.state != ConnectionState::Connected {
                return;
            }
            shared.state = ConnectionState::Disconnected;
            shared.connection = None;
        }
        self.notify_state(ConnectionState::Disconnected);
        info!("Channel closed unexpectedly");

        // Dead process is terminal; retrying is pointless.
        if !self.inner.probe.check().is_running() {
            info!("Process not running, stopping reconnection attempts");
            self.set_state(ConnectionState::Failed);
            return;
        }

        self.run_reconnect_loop().await;
    }

    /// Backoff loop: delay, re-probe liveness, re-attempt, until the cap.
    async fn run_reconnect_loop(&self) {
        let options = &self.inner.options;

        loop {
            let attempt = {
                let mut shared = self.inner.shared.lock();
                shared.reconnect_attempts += 1;
                shared.reconnect_attempts
            };

            if attempt > options.max_reconnect_attempts {
                warn!("Max reconnect attempts reached");
                self.set_state(ConnectionState::Failed);
                return;
            }

            let delay = options.backoff_delay(attempt);
            info!(
                attempt,
                max = options.max_reconnect_attempts,
                delay_ms = delay.as_millis() as u64,
                "Reconnecting after delay"
            );
            tokio::time::sleep(delay).await;

            // The process may have exited during the wait.
            if !self.inner.probe.check().is_running() {
                info!("Process stopped during reconnect delay");
                self.set_state(ConnectionState::Failed);
                return;
            }

            // A manual connect may have taken over during the delay.
            {
                let mut shared = self.inner.shared.lock();
                if matches!(
                    shared.state,
                    ConnectionState::Connecting | ConnectionState::Connected
                ) {
                    return;
                }
                shared.state = ConnectionState::Connecting;
            }
            self.notify_state(ConnectionState::Connecting);

            // A failed automatic attempt goes back to Disconnected; Failed
            // is reserved for the cap and the dead-process check.
            if self.try_connect_internal(ConnectionState::Disconnected).await {
                return;
            }
        }
    }

    // ========================================================================
    // Notifications
    // ========================================================================

    /// Transitions to `state` (if different) and notifies listeners.
    fn set_state(&self, state: ConnectionState) {
        {
            let mut shared = self.inner.shared.lock();
            if shared.state == state {
                return;
            }
            shared.state = state;
        }
        self.notify_state(state);
    }

    /// Delivers a state change to listeners, outside any lock.
    fn notify_state(&self, state: ConnectionState) {
        debug!(?state, "Connection state changed");
        let listeners: Vec<StateListener> = self.inner.state_listeners.lock().clone();
        for listener in listeners {
            listener(state);
        }
    }

    /// Records a navigation and notifies listeners, outside any lock.
    fn handle_navigation(&self, url: &str) {
        self.inner.shared.lock().last_known_url = Some(url.to_string());
        debug!(%url, "Navigation occurred");

        let listeners: Vec<NavigationListener> = self.inner.navigation_listeners.lock().clone();
        for listener in listeners {
            listener(url);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
