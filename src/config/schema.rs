//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the host.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fixed TCP port the identity service listens on.
pub const DEFAULT_PORT: u16 = 7070;

/// Root configuration for the identity host.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct HostConfig {
    /// Deployment environment, resolved once before assembly.
    pub environment: HostEnvironment,

    /// Listener configuration.
    pub listener: ListenerConfig,

    /// How the host network address is discovered.
    pub platform: PlatformConfig,

    /// Persisted identity store location.
    pub store: StoreConfig,

    /// Static asset settings.
    pub assets: AssetsConfig,

    /// Identity and sign-in settings.
    pub identity: IdentityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Deployment environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HostEnvironment {
    /// Exposes diagnostic endpoints and detailed errors.
    Development,
    /// Generic error page and HSTS.
    #[default]
    Production,
}

impl HostEnvironment {
    pub fn is_development(self) -> bool {
        matches!(self, HostEnvironment::Development)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HostEnvironment::Development => "development",
            HostEnvironment::Production => "production",
        }
    }
}

impl std::str::FromStr for HostEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(HostEnvironment::Development),
            "production" | "prod" => Ok(HostEnvironment::Production),
            other => Err(format!("unknown environment '{}'", other)),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// TCP port bound on the resolved host address.
    pub port: u16,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// Address discovery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlatformMode {
    /// Ask the operating system which local address routes to `probe_target`.
    #[default]
    Probe,
    /// Report `static_address` verbatim.
    Static,
}

/// Host platform configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PlatformConfig {
    pub mode: PlatformMode,

    /// Address reported in static mode (e.g., "192.168.1.50").
    pub static_address: Option<String>,

    /// Remote socket used for the routing probe. No packets are sent.
    pub probe_target: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            mode: PlatformMode::Probe,
            static_address: None,
            probe_target: "192.0.2.1:80".to_string(),
        }
    }
}

/// Persisted store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base directory of the store file.
    pub base_dir: PathBuf,

    /// Store file name.
    pub file_name: String,

    /// Create the directory and file before migrating.
    pub ensure_created: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("/user"),
            file_name: "app.db".to_string(),
            ensure_created: false,
        }
    }
}

/// Static asset configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AssetsConfig {
    /// Overrides `<exe dir>/wwwroot` when set.
    pub root: Option<PathBuf>,
}

/// Identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Refuse sign-in until the email address is confirmed.
    pub require_confirmed_account: bool,

    /// Lifetime of an application sign-in cookie in seconds.
    pub session_ttl_secs: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            require_confirmed_account: true,
            session_ttl_secs: 14 * 24 * 60 * 60,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub json: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}
