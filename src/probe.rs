//! Process liveness probe.
//!
//! Reconnection is pointless when the remote application has exited, so the
//! bridge consults an OS-level probe before every reconnect attempt: once at
//! disconnect time and once more after each backoff delay.
//!
//! The probe sits behind the [`LivenessProbe`] trait so the bridge can be
//! exercised in tests without a live ClickUp process.

// ============================================================================
// Imports
// ============================================================================

use std::ffi::OsStr;

use parking_lot::Mutex;
use sysinfo::{ProcessesToUpdate, System};
use tracing::debug;

// ============================================================================
// RuntimeStatus
// ============================================================================

/// Tri-state result of a liveness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    /// No process with the expected name is running.
    NotRunning,
    /// At least one matching process is running.
    Running,
    /// Enumeration failed; liveness could not be determined.
    Unknown,
}

impl RuntimeStatus {
    /// Returns `true` if the remote process was observed running.
    #[inline]
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

// ============================================================================
// LivenessProbe
// ============================================================================

/// Checks whether the remote application process is still running.
pub trait LivenessProbe: Send + Sync {
    /// Performs one liveness check.
    fn check(&self) -> RuntimeStatus;
}

// ============================================================================
// ProcessProbe
// ============================================================================

/// OS process enumeration probe.
///
/// Matches processes by name (`ClickUp` for the desktop app).
pub struct ProcessProbe {
    /// Expected process name.
    process_name: String,

    /// Reused system handle; refreshing beats re-enumerating from scratch.
    system: Mutex<System>,
}

impl ProcessProbe {
    /// Creates a probe for the given process name.
    #[must_use]
    pub fn new(process_name: impl Into<String>) -> Self {
        Self {
            process_name: process_name.into(),
            system: Mutex::new(System::new()),
        }
    }
}

impl LivenessProbe for ProcessProbe {
    fn check(&self) -> RuntimeStatus {
        let mut system = self.system.lock();
        system.refresh_processes(ProcessesToUpdate::All, true);

        let running = system
            .processes_by_name(OsStr::new(&self.process_name))
            .next()
            .is_some();

        let status = if running {
            RuntimeStatus::Running
        } else {
            RuntimeStatus::NotRunning
        };

        debug!(process = %self.process_name, ?status, "Liveness check");
        status
    }
}

// ============================================================================
// Tests
// ============================================================================
