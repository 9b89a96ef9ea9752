//! Control-system host entry point.
//!
//! The host runtime calls [`ControlSystem::initialize_system`] during its own
//! boot. It must return promptly, so the whole startup sequence is handed to
//! a supervised background task and only its handle comes back. The
//! sequence runs at most once per `ControlSystem`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{HostConfig, PlatformConfig, PlatformMode};
use crate::lifecycle::{StartupHandle, StartupOrchestrator};
use crate::platform::error_log::ErrorLog;
use crate::platform::{HostPlatform, ProbePlatform, StaticPlatform};

/// The hosting control system.
pub struct ControlSystem {
    config: HostConfig,
    platform: Arc<dyn HostPlatform>,
    error_log: Arc<dyn ErrorLog>,
    initialized: AtomicBool,
}

/// Reason reported by handles from repeated `initialize_system` calls.
pub const ALREADY_INITIALIZED: &str = "control system already initialized";

impl ControlSystem {
    pub fn new(config: HostConfig, platform: Arc<dyn HostPlatform>, error_log: Arc<dyn ErrorLog>) -> Self {
        Self {
            config,
            platform,
            error_log,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Build the orchestrator without starting it.
    pub fn orchestrator(&self) -> StartupOrchestrator {
        StartupOrchestrator::new(self.config.clone(), self.platform.clone(), self.error_log.clone())
    }

    /// Start the identity host in the background and return immediately.
    ///
    /// Only the first call starts the sequence. Later calls get a handle
    /// already settled in `Failed` and touch neither the store nor the
    /// listener.
    pub fn initialize_system(&self) -> StartupHandle {
        if self.initialized.swap(true, Ordering::SeqCst) {
            tracing::warn!("Control system already initialized; ignoring repeated start");
            return StartupHandle::rejected(ALREADY_INITIALIZED);
        }
        tracing::info!(
            environment = self.config.environment.as_str(),
            port = self.config.listener.port,
            "Initializing control system"
        );
        self.orchestrator().spawn()
    }
}

/// Platform implementation selected by configuration.
pub fn platform_from_config(config: &PlatformConfig) -> Arc<dyn HostPlatform> {
    match config.mode {
        PlatformMode::Static => match &config.static_address {
            Some(address) => Arc::new(StaticPlatform::new(address.clone())),
            None => Arc::new(StaticPlatform::unassigned()),
        },
        PlatformMode::Probe => match config.probe_target.parse::<SocketAddr>() {
            Ok(target) => Arc::new(ProbePlatform::new(target)),
            Err(e) => {
                tracing::warn!(
                    target_addr = %config.probe_target,
                    error = %e,
                    "Invalid probe target; platform will report no address"
                );
                Arc::new(StaticPlatform::unassigned())
            }
        },
    }
}
