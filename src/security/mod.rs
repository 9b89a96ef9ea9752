//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outgoing response:
//!     → headers.rs (HSTS in production, nosniff always)
//! ```
//!
//! # Design Decisions
//! - Plain HTTP listener; no redirection to HTTPS
//! - Header policy is chosen once at assembly from the environment

pub mod headers;
