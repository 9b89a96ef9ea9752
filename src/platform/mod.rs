//! Embedded platform integration.
//!
//! # Data Flow
//! ```text
//! Host runtime
//!     → control_system.rs (initialize_system, returns immediately)
//!         → lifecycle::startup (background unit)
//!             → ethernet.rs (current IP address of adapter 0)
//!             → error_log.rs (failures with their prefixes)
//! ```
//!
//! # Design Decisions
//! - The platform is a trait so the host query can be scripted in tests
//! - The host error log is separate from process diagnostics

pub mod control_system;
pub mod error_log;
pub mod ethernet;

pub use control_system::{platform_from_config, ControlSystem};
pub use error_log::{ErrorLog, TracingErrorLog};
pub use ethernet::{
    AddressUnavailable, EthernetParameter, HostNetworkAddress, HostPlatform, NetworkAddressResolver,
    ProbePlatform, StaticPlatform, PRIMARY_ADAPTER,
};
