//! Startup orchestration.
//!
//! # Responsibilities
//! - Bind the native store provider before any connection exists
//! - Resolve the device address and bind the listener on it
//! - Migrate the identity store, tolerating failure
//! - Run the service loop until shutdown
//! - Publish every state transition on a watch channel
//!
//! # Design Decisions
//! - Strictly sequential: each step consumes the previous step's output
//! - Migration failure is logged and the service starts anyway (degraded)
//! - Every other failure ends the unit in `Failed`; the supervisor writes
//!   it to the host error log and the host process keeps running
//! - No retries: a failed start needs an external restart
//!
//! # State Machine
//! ```text
//! NotStarted → ProviderBound → AddressResolved → Assembling → Migrating → Running
//!      └──────────────┴──────────────┴──────────────┴─────────────┴──→ Failed
//! ```

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::HostConfig;
use crate::http::{AssemblyError, ServiceAssembler};
use crate::lifecycle::shutdown::Shutdown;
use crate::lifecycle::supervisor::{spawn_supervised, UnitOutcome};
use crate::platform::error_log::ErrorLog;
use crate::platform::{AddressUnavailable, HostNetworkAddress, HostPlatform, NetworkAddressResolver};
use crate::store::{DataStoreConnection, NativeProvider, ProviderError, ProviderRegistry, StorePath};

const UNIT_NAME: &str = "startup-orchestration";

/// Observable progress of the orchestration unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartupState {
    NotStarted,
    ProviderBound,
    AddressResolved(HostNetworkAddress),
    Assembling,
    Migrating,
    /// Serving on `local_addr`. `degraded` is set when migration failed.
    Running { local_addr: SocketAddr, degraded: bool },
    /// Terminal.
    Failed(String),
}

impl StartupState {
    /// `Running` or `Failed`.
    pub fn is_settled(&self) -> bool {
        matches!(self, StartupState::Running { .. } | StartupState::Failed(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StartupState::Failed(_))
    }
}

impl fmt::Display for StartupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupState::NotStarted => write!(f, "not-started"),
            StartupState::ProviderBound => write!(f, "provider-bound"),
            StartupState::AddressResolved(address) => write!(f, "address-resolved({})", address),
            StartupState::Assembling => write!(f, "assembling"),
            StartupState::Migrating => write!(f, "migrating"),
            StartupState::Running { local_addr, degraded: false } => write!(f, "running({})", local_addr),
            StartupState::Running { local_addr, degraded: true } => {
                write!(f, "running-degraded({})", local_addr)
            }
            StartupState::Failed(reason) => write!(f, "failed({})", reason),
        }
    }
}

/// Failures that end the orchestration unit.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error(transparent)]
    AddressUnavailable(#[from] AddressUnavailable),
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
    #[error("service loop failed: {0}")]
    Serve(#[source] std::io::Error),
}

/// Sequences provider binding, address resolution, assembly, migration and
/// the service loop.
pub struct StartupOrchestrator {
    config: HostConfig,
    registry: &'static ProviderRegistry,
    provider: NativeProvider,
    platform: Arc<dyn HostPlatform>,
    assembler: ServiceAssembler,
    error_log: Arc<dyn ErrorLog>,
    states: Arc<watch::Sender<StartupState>>,
    shutdown: Shutdown,
}

impl StartupOrchestrator {
    pub fn new(config: HostConfig, platform: Arc<dyn HostPlatform>, error_log: Arc<dyn ErrorLog>) -> Self {
        let (states, _) = watch::channel(StartupState::NotStarted);
        let assembler = ServiceAssembler::new(&config).with_error_log(error_log.clone());
        Self {
            config,
            registry: ProviderRegistry::global(),
            provider: NativeProvider::sqlite3(),
            platform,
            assembler,
            error_log,
            states: Arc::new(states),
            shutdown: Shutdown::new(),
        }
    }

    /// Use `registry` instead of the process-wide one.
    pub fn with_registry(mut self, registry: &'static ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_provider(mut self, provider: NativeProvider) -> Self {
        self.provider = provider;
        self
    }

    /// Replace the assembler. Its error log is set to the orchestrator's.
    pub fn with_assembler(mut self, assembler: ServiceAssembler) -> Self {
        self.assembler = assembler.with_error_log(self.error_log.clone());
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<StartupState> {
        self.states.subscribe()
    }

    pub fn shutdown(&self) -> Shutdown {
        self.shutdown.clone()
    }

    /// Run the orchestration unit on a supervised background task.
    pub fn spawn(self) -> StartupHandle {
        let states = self.states.clone();
        let state = self.states.subscribe();
        let shutdown = self.shutdown.clone();
        let supervised = spawn_supervised(UNIT_NAME, self.error_log.clone(), self.run());

        let task = tokio::spawn(async move {
            let outcome = match supervised.await {
                Ok(outcome) => outcome,
                Err(e) => UnitOutcome::Panicked(e.to_string()),
            };
            if let UnitOutcome::Panicked(message) = &outcome {
                states.send_replace(StartupState::Failed(message.clone()));
            }
            outcome
        });

        StartupHandle {
            state,
            shutdown,
            task,
        }
    }

    /// Run the whole sequence on the current task. Returns once the service
    /// loop stops, or with the error that ended the unit.
    pub async fn run(self) -> Result<(), StartupError> {
        let result = self.execute().await;
        if let Err(e) = &result {
            tracing::error!(error = %e, "Startup orchestration failed");
            self.publish(StartupState::Failed(e.to_string()));
        }
        result
    }

    async fn execute(&self) -> Result<(), StartupError> {
        let shutdown = self.shutdown.subscribe();
        let provider = self.registry.bind(self.provider)?;
        self.publish(StartupState::ProviderBound);

        let address = NetworkAddressResolver::new(self.platform.as_ref()).resolve_current_address()?;
        tracing::info!(address = %address, "Host network address resolved");
        self.publish(StartupState::AddressResolved(address));

        self.publish(StartupState::Assembling);
        let connection = DataStoreConnection::new(&provider, StorePath::from_config(&self.config.store));
        tracing::info!(
            connection = %connection.path().connection_string(),
            engine_version = provider.engine_version(),
            "Identity store configured"
        );
        let instance = self.assembler.assemble(address, connection.clone()).await?;

        self.publish(StartupState::Migrating);
        let report = self
            .assembler
            .migrator()
            .migrate(&connection, self.error_log.as_ref())
            .await;
        let degraded = !report.is_success();
        if degraded {
            tracing::warn!("Continuing startup with a degraded store schema");
        }

        self.publish(StartupState::Running {
            local_addr: instance.local_addr(),
            degraded,
        });
        instance
            .run(shutdown)
            .await
            .map_err(StartupError::Serve)
    }

    fn publish(&self, state: StartupState) {
        tracing::debug!(state = %state, "Startup state changed");
        self.states.send_replace(state);
    }
}

/// Handle to a spawned orchestration unit.
pub struct StartupHandle {
    state: watch::Receiver<StartupState>,
    shutdown: Shutdown,
    task: JoinHandle<UnitOutcome>,
}

impl StartupHandle {
    /// Handle for a unit that was refused before it ran. It is already
    /// settled in `Failed` and its task ends with `UnitOutcome::Failed`.
    pub fn rejected(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        let (states, state) = watch::channel(StartupState::Failed(reason.clone()));
        let task = tokio::spawn(async move {
            drop(states);
            UnitOutcome::Failed(reason)
        });
        Self {
            state,
            shutdown: Shutdown::new(),
            task,
        }
    }

    /// Latest published state.
    pub fn state(&self) -> StartupState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<StartupState> {
        self.state.clone()
    }

    /// Wait until the unit is `Running` or `Failed`.
    pub async fn settled(&mut self) -> StartupState {
        if let Ok(state) = self.state.wait_for(StartupState::is_settled).await {
            return state.clone();
        }
        self.state.borrow().clone()
    }

    /// Stop the service loop.
    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the unit to end.
    pub async fn join(self) -> UnitOutcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => UnitOutcome::Panicked(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settled_states() {
        assert!(!StartupState::NotStarted.is_settled());
        assert!(!StartupState::Migrating.is_settled());
        assert!(StartupState::Failed("x".into()).is_settled());
        assert!(StartupState::Running {
            local_addr: "127.0.0.1:7070".parse().unwrap(),
            degraded: true,
        }
        .is_settled());
    }

    #[tokio::test]
    async fn test_rejected_handle_is_settled() {
        let mut handle = StartupHandle::rejected("already initialized");
        assert_eq!(handle.settled().await, StartupState::Failed("already initialized".into()));
        assert_eq!(handle.join().await, UnitOutcome::Failed("already initialized".into()));
    }

    #[test]
    fn test_state_display() {
        let state = StartupState::Running {
            local_addr: "192.168.1.50:7070".parse().unwrap(),
            degraded: false,
        };
        assert_eq!(state.to_string(), "running(192.168.1.50:7070)");
        assert_eq!(
            StartupState::AddressResolved("10.0.0.2".parse().unwrap()).to_string(),
            "address-resolved(10.0.0.2)"
        );
    }
}
