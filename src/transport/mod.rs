//! WebSocket transport layer.
//!
//! This module handles communication between the bridge (local end) and the
//! ClickUp Desktop runtime (remote end) over the CDP WebSocket channel.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐                              ┌──────────────────┐
//! │  Bridge (Rust)   │                              │  ClickUp Desktop │
//! │                  │         WebSocket            │  (Electron)      │
//! │  Connection      │◄────────────────────────────►│                  │
//! │  + receive loop  │   target attach address      │  CDP server      │
//! └──────────────────┘                              └──────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. Discovery selects a target and yields its attach address
//! 2. [`Connection::connect`] - open the channel, spawn the receive loop
//! 3. `Connection::send` - correlated command round-trips
//! 4. `Connection::shutdown` - close the channel; pending requests fail,
//!    the closed handler fires once

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and receive loop.
pub mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{ClosedHandler, Connection, EventHandler};
