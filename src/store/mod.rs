//! Persisted identity store subsystem.
//!
//! # Data Flow
//! ```text
//! provider.rs (bind + freeze native engine)
//!     → BoundProvider token
//!     → connection.rs (DataStoreConnection at the fixed StorePath)
//!     → migrations.rs (advance schema to the latest known version)
//!     → users.rs (identity user store over the same connection)
//! ```
//!
//! # Design Decisions
//! - A connection cannot be created without a `BoundProvider`
//! - Migration steps are atomic and applied in ascending order
//! - Blocking SQLite calls run on the blocking pool

use std::path::PathBuf;

use thiserror::Error;

pub mod connection;
pub mod migrations;
pub mod provider;
pub mod users;

pub use connection::{DataStoreConnection, StorePath};
pub use migrations::{MigrationReport, SchemaMigrator, SchemaVersion};
pub use provider::{BoundProvider, NativeProvider, ProviderError, ProviderRegistry};
pub use users::{ApplicationUser, SqliteUserStore, UserStore};

/// Error type for store access.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open store at {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("store I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("store connection lock poisoned")]
    Poisoned,
    #[error("blocking store task failed: {0}")]
    Join(String),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}
