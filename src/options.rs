//! Bridge configuration options.
//!
//! Provides a type-safe interface for configuring the runtime bridge:
//! debug port, product domain, timeouts, and reconnection policy.
//!
//! # Example
//!
//! ```ignore
//! use clickup_bridge::BridgeOptions;
//!
//! let options = BridgeOptions::new()
//!     .with_debug_port(9223)
//!     .with_command_timeout(Duration::from_secs(5));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default remote debugging port exposed by the desktop app.
pub const DEFAULT_DEBUG_PORT: u16 = 9222;

/// Default product domain used by the target selection filter.
pub const DEFAULT_PRODUCT_DOMAIN: &str = "clickup.com";

/// Default process name for the liveness probe.
pub const DEFAULT_PROCESS_NAME: &str = "ClickUp";

/// Default timeout for a single command round-trip.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for one discovery HTTP request.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default reconnect attempt cap.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Default base delay for exponential reconnect backoff (1s, 2s, 4s).
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

// ============================================================================
// BridgeOptions
// ============================================================================

/// Runtime bridge configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Remote debugging port of the desktop app.
    pub debug_port: u16,

    /// Domain expected in the main window URL.
    pub product_domain: String,

    /// Process name checked by the liveness probe.
    pub process_name: String,

    /// Per-command response timeout.
    pub command_timeout: Duration,

    /// Timeout for each discovery HTTP request.
    pub discovery_timeout: Duration,

    /// Automatic reconnect attempt cap after an unexpected closure.
    pub max_reconnect_attempts: u32,

    /// Backoff base delay; attempt `n` waits `base * 2^(n-1)`.
    pub reconnect_base_delay: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            debug_port: DEFAULT_DEBUG_PORT,
            product_domain: DEFAULT_PRODUCT_DOMAIN.to_string(),
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            discovery_timeout: DEFAULT_DISCOVERY_TIMEOUT,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl BridgeOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the remote debugging port.
    ///
    /// Ports below 1024 are rejected and replaced with the default.
    #[inline]
    #[must_use]
    pub fn with_debug_port(mut self, port: u16) -> Self {
        self.debug_port = if port < 1024 { DEFAULT_DEBUG_PORT } else { port };
        self
    }

    /// Sets the product domain for target selection.
    #[inline]
    #[must_use]
    pub fn with_product_domain(mut self, domain: impl Into<String>) -> Self {
        self.product_domain = domain.into();
        self
    }

    /// Sets the process name for the liveness probe.
    #[inline]
    #[must_use]
    pub fn with_process_name(mut self, name: impl Into<String>) -> Self {
        self.process_name = name.into();
        self
    }

    /// Sets the per-command response timeout.
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Sets the discovery HTTP request timeout.
    #[inline]
    #[must_use]
    pub fn with_discovery_timeout(mut self, timeout: Duration) -> Self {
        self.discovery_timeout = timeout;
        self
    }

    /// Sets the reconnect attempt cap.
    #[inline]
    #[must_use]
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Sets the backoff base delay.
    #[inline]
    #[must_use]
    pub fn with_reconnect_base_delay(mut self, delay: Duration) -> Self {
        self.reconnect_base_delay = delay;
        self
    }
}

// ============================================================================
// Backoff
// ============================================================================

impl BridgeOptions {
    /// Returns the backoff delay for reconnect attempt `attempt` (1-based).
    #[inline]
    #[must_use]
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        self.reconnect_base_delay * 2u32.pow(attempt.saturating_sub(1).min(16))
    }
}

// ============================================================================
// Tests
// ============================================================================
