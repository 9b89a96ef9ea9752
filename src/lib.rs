//! Identity web host for an embedded control system.

pub mod config;
pub mod http;
pub mod identity;
pub mod lifecycle;
pub mod observability;
pub mod platform;
pub mod security;
pub mod store;

pub use config::schema::HostConfig;
pub use http::{ServiceAssembler, ServiceInstance};
pub use lifecycle::{Shutdown, StartupHandle, StartupOrchestrator, StartupState};
pub use platform::ControlSystem;
