//! HTTP subsystem.
//!
//! # Data Flow
//! ```text
//! Request
//!     → set request id → trace → propagate request id → nosniff
//!     → [production] HSTS → catch panic → exception handler
//!     → [development] catch panic (detailed)
//!     → pages.rs (/, /Error, /health)
//!     → account.rs (/Account/*)
//!     → diagnostics.rs (/_migrations, development only)
//!     → static assets (wwwroot fallback)
//! ```
//!
//! # Design Decisions
//! - One router per process, built once by `ServiceAssembler`
//! - Handlers return `Result<_, HttpError>`; the error pipeline decides how
//!   much detail reaches the client

pub mod account;
pub mod diagnostics;
pub mod error;
pub mod pages;
pub mod request;
pub mod server;

pub use error::HttpError;
pub use server::{AppState, AssemblyError, ServiceAssembler, ServiceInstance};
