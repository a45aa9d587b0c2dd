//! CDP protocol message types.
//!
//! This module defines the message format for communication between the
//! bridge (local end) and the ClickUp Desktop runtime (remote end).
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | [`CommandFrame`] | Local → Remote | Command request |
//! | [`ResponseFrame`] | Remote → Local | Command response (carries `id`) |
//! | [`EventFrame`] | Remote → Local | Runtime notification (carries `method`) |
//!
//! # Consumed operations
//!
//! Only the slice of CDP this bridge needs:
//!
//! - `Runtime.enable` / `Page.enable`
//! - `Page.addScriptToEvaluateOnNewDocument`
//! - `Runtime.evaluate` (with `returnByValue`)
//! - `Page.frameNavigated` (event)
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Frame types and [`CommandId`] |
//! | `evaluate` | [`ScriptResult`] classification |

// ============================================================================
// Submodules
// ============================================================================

/// Frame types and correlation identifiers.
pub mod message;

/// Script evaluation result classification.
pub mod evaluate;

// ============================================================================
// Re-exports
// ============================================================================

pub use evaluate::{ScriptResult, classify_evaluate};
pub use message::{CommandFrame, CommandId, ErrorDetail, EventFrame, InboundFrame, ResponseFrame};

// ============================================================================
// Method Names
// ============================================================================

/// `Runtime.enable` method name.
pub const METHOD_RUNTIME_ENABLE: &str = "Runtime.enable";

/// `Runtime.evaluate` method name.
pub const METHOD_RUNTIME_EVALUATE: &str = "Runtime.evaluate";

/// `Page.enable` method name.
pub const METHOD_PAGE_ENABLE: &str = "Page.enable";

/// `Page.addScriptToEvaluateOnNewDocument` method name.
pub const METHOD_ADD_SCRIPT_ON_NEW_DOCUMENT: &str = "Page.addScriptToEvaluateOnNewDocument";

/// `Page.frameNavigated` event name.
pub const EVENT_FRAME_NAVIGATED: &str = "Page.frameNavigated";
