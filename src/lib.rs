//! ClickUp Bridge - CDP client for the ClickUp Desktop runtime.
//!
//! This library discovers, attaches to, and drives the ClickUp Desktop
//! (Electron) runtime over the Chrome DevTools Protocol, tolerating crashes
//! and restarts of the remote process.
//!
//! # Architecture
//!
//! The bridge follows a client model against the app's debug port:
//!
//! - **Discovery**: HTTP introspection endpoint lists attachable targets
//! - **Transport**: one WebSocket channel, one receive-loop task,
//!   request/response correlation by monotonically increasing id
//! - **Bridge**: explicit connection state machine with supervised
//!   reconnection, gated by an OS process liveness probe
//! - **Façade**: consumer tools see only [`RuntimeContext`]
//!
//! Key design principles:
//!
//! - Exactly one live connection; connect is single-flight
//! - Faults become typed results or state transitions, never panics
//! - Navigation tracking is best effort; consumers re-query on demand
//!
//! # Quick Start
//!
//! ```no_run
//! use clickup_bridge::{BridgeOptions, RuntimeBridge, RuntimeContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     let bridge = RuntimeBridge::new(BridgeOptions::new());
//!
//!     if bridge.connect().await {
//!         let context = RuntimeContext::new(bridge.clone());
//!         if let Some(task_id) = context.task_id().await {
//!             println!("Current task: {task_id}");
//!         }
//!     }
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bridge`] | Connection manager and the [`RuntimeContext`] façade |
//! | [`discovery`] | Target discovery via the HTTP introspection endpoint |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`options`] | Bridge configuration |
//! | [`probe`] | Process liveness probe |
//! | [`protocol`] | CDP frame types and result classification (internal) |
//! | [`transport`] | WebSocket transport layer (internal) |

// ============================================================================
// Modules
// ============================================================================

/// Connection manager and consumer façade.
///
/// - [`RuntimeBridge`] - owns the connection lifecycle and state machine
/// - [`RuntimeContext`] - the only surface consumer tools see
pub mod bridge;

/// Target discovery via the runtime's HTTP introspection endpoint.
pub mod discovery;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Bridge configuration options.
pub mod options;

/// Process liveness probe.
///
/// Decides whether reconnection is worthwhile after a lost channel.
pub mod probe;

/// CDP protocol message types.
///
/// Internal module defining frame structures and evaluate classification.
pub mod protocol;

/// WebSocket transport layer.
///
/// Internal module handling the duplex channel and request correlation.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Bridge types
pub use bridge::{ConnectionState, NavigationListener, RuntimeBridge, RuntimeContext, StateListener};

// Discovery types
pub use discovery::Target;

// Error types
pub use error::{Error, Result};

// Configuration
pub use options::BridgeOptions;

// Probe types
pub use probe::{LivenessProbe, ProcessProbe, RuntimeStatus};

// Script results
pub use protocol::ScriptResult;
