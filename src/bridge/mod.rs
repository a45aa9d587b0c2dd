//! Runtime bridge: connection manager and consumer façade.
//!
//! # Layers
//!
//! | Type | Audience | Responsibility |
//! |------|----------|----------------|
//! | [`RuntimeBridge`] | crate internals, host app | state machine, reconnection, script execution |
//! | [`RuntimeContext`] | consumer tools | safe wrapper hiding all CDP details |
//!
//! Tools receive a [`RuntimeContext`] and nothing else; protocol framing and
//! channel handles stay behind this module boundary.

// ============================================================================
// Submodules
// ============================================================================

/// Connection manager and reconnection state machine.
pub mod manager;

/// Consumer-facing runtime context.
pub mod context;

// ============================================================================
// Re-exports
// ============================================================================

pub use context::RuntimeContext;
pub use manager::{ConnectionState, NavigationListener, RuntimeBridge, StateListener};
