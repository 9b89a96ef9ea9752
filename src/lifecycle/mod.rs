//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs), inside a supervised task (supervisor.rs):
//!     Bind provider → Resolve address → Assemble + bind → Migrate → Run
//!
//! Shutdown (shutdown.rs):
//!     Signal received (signals.rs) → Stop accepting → Drain connections → Exit
//! ```
//!
//! # Design Decisions
//! - Ordered startup: provider first, listener before migration, traffic last
//! - Startup failure is contained to its task; the host keeps running
//! - No restart: a failed unit stays failed

pub mod shutdown;
pub mod signals;
pub mod startup;
pub mod supervisor;

pub use shutdown::Shutdown;
pub use startup::{StartupError, StartupHandle, StartupOrchestrator, StartupState};
pub use supervisor::{spawn_supervised, UnitOutcome};
