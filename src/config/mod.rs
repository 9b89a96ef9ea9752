//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → HostConfig (validated, immutable)
//!     → handed to the control system before startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no hot reload
//! - All fields have defaults so the device runs with no config file
//! - The environment is resolved here, once, and never inspected again

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::AssetsConfig;
pub use schema::HostConfig;
pub use schema::HostEnvironment;
pub use schema::IdentityConfig;
pub use schema::ListenerConfig;
pub use schema::ObservabilityConfig;
pub use schema::PlatformConfig;
pub use schema::PlatformMode;
pub use schema::StoreConfig;
pub use schema::DEFAULT_PORT;
