//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → tower_http TraceLayer (one span per request, carrying x-request-id)
//!
//! Host error log (platform::error_log):
//!     → tracing target host::error_log
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON optional) for machine parsing
//! - Request ID flows through every request span

pub mod logging;

pub use logging::init_logging;
