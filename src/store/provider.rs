//! Native data-access provider selection.
//!
//! # Responsibilities
//! - Pin one native SQLite engine configuration for the process
//! - Freeze the selection so it can never be swapped afterward
//! - Hand out the [`BoundProvider`] token required to create connections
//!
//! # Design Decisions
//! - Guarded singleton (`OnceLock`) rather than ambient mutable state
//! - Tests build private registries so initialization order stays testable
//! - Rebinding the active provider is a no-op; a different one is refused

use std::sync::OnceLock;

use rusqlite::OpenFlags;
use thiserror::Error;

/// Threading discipline the engine is opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadingMode {
    /// Engine serializes all access to a connection.
    Serialized,
    /// Caller guarantees a connection is used by one thread at a time.
    MultiThread,
}

/// A native engine implementation for store connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeProvider {
    name: &'static str,
    threading: ThreadingMode,
}

impl NativeProvider {
    /// The linked `sqlite3` library in serialized mode.
    pub const fn sqlite3() -> Self {
        Self {
            name: "sqlite3",
            threading: ThreadingMode::Serialized,
        }
    }

    /// The linked `sqlite3` library in multi-thread mode.
    pub const fn sqlite3_multi_thread() -> Self {
        Self {
            name: "sqlite3",
            threading: ThreadingMode::MultiThread,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn threading(&self) -> ThreadingMode {
        self.threading
    }

    /// Flags every connection opened through this provider uses.
    pub fn open_flags(&self) -> OpenFlags {
        let base = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI;
        match self.threading {
            ThreadingMode::Serialized => base | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
            ThreadingMode::MultiThread => base | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        }
    }
}

/// Proof that a provider has been bound and frozen.
///
/// Store connections can only be created with one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundProvider {
    provider: NativeProvider,
    engine_version: &'static str,
}

impl BoundProvider {
    pub fn provider(&self) -> NativeProvider {
        self.provider
    }

    /// Version string of the linked native engine.
    pub fn engine_version(&self) -> &'static str {
        self.engine_version
    }
}

/// Error type for provider binding.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("native provider is frozen to {active:?}; refusing {requested:?}")]
    Frozen {
        active: NativeProvider,
        requested: NativeProvider,
    },
}

/// One-shot registry holding the process's native provider.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    slot: OnceLock<BoundProvider>,
}

static GLOBAL_REGISTRY: ProviderRegistry = ProviderRegistry::new();

impl ProviderRegistry {
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// The process-wide registry.
    pub fn global() -> &'static ProviderRegistry {
        &GLOBAL_REGISTRY
    }

    /// Install `provider` and freeze the registry.
    ///
    /// Binding the already-active provider again returns the same token.
    pub fn bind(&self, provider: NativeProvider) -> Result<BoundProvider, ProviderError> {
        let mut installed = false;
        let bound = self.slot.get_or_init(|| {
            installed = true;
            BoundProvider {
                provider,
                engine_version: rusqlite::version(),
            }
        });

        if installed {
            tracing::info!(
                provider = bound.provider.name(),
                threading = ?bound.provider.threading(),
                engine_version = bound.engine_version,
                "Native provider bound and frozen"
            );
        }

        if bound.provider == provider {
            Ok(bound.clone())
        } else {
            tracing::warn!(
                active = ?bound.provider,
                requested = ?provider,
                "Rejected attempt to replace frozen native provider"
            );
            Err(ProviderError::Frozen {
                active: bound.provider,
                requested: provider,
            })
        }
    }

    /// The active provider, if one has been bound.
    pub fn active(&self) -> Option<&BoundProvider> {
        self.slot.get()
    }

    pub fn is_frozen(&self) -> bool {
        self.slot.get().is_some()
    }
}
