//! Host error-reporting sink.
//!
//! The control system keeps its own error log, separate from the process
//! diagnostics. Startup failures are written there so that an operator sees
//! them on the device console.

/// Prefix for failures that stop the orchestration unit.
pub const PROGRAM_LOAD_EXCEPTION: &str = "Program Load Exception";

/// Prefix for failures while migrating the identity store.
pub const MIGRATION_ERROR: &str = "Error during database auto-migration";

/// Host-provided logging facility.
pub trait ErrorLog: Send + Sync {
    /// Record an error entry.
    fn error(&self, message: &str);

    /// Record an informational console line.
    fn notice(&self, message: &str);
}

/// Error log that writes through `tracing` under a dedicated target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorLog;

impl ErrorLog for TracingErrorLog {
    fn error(&self, message: &str) {
        tracing::error!(target: "host::error_log", "{}", message);
    }

    fn notice(&self, message: &str) {
        tracing::info!(target: "host::console", "{}", message);
    }
}
