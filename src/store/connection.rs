//! Store location and the shared connection handle.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rusqlite::Connection;

use crate::config::StoreConfig;
use crate::store::provider::BoundProvider;
use crate::store::StoreError;

/// Fixed location of the persisted store: base directory + file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePath {
    base_dir: PathBuf,
    file_name: String,
}

impl StorePath {
    pub fn new(base_dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            file_name: file_name.into(),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        Self::new(config.base_dir.clone(), config.file_name.clone())
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Full path of the store file.
    pub fn path(&self) -> PathBuf {
        self.base_dir.join(&self.file_name)
    }

    /// Connection string form, e.g. `Data Source=/user/app.db`.
    pub fn connection_string(&self) -> String {
        format!("Data Source={}", self.path().display())
    }

    /// Create the base directory if it does not exist yet.
    pub fn ensure_directory(&self) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.base_dir).map_err(|source| StoreError::Io {
            path: self.base_dir.clone(),
            source,
        })
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path().display())
    }
}

/// Single logical handle to the persisted store.
///
/// The native connection is opened on first use and reused afterward. If
/// opening fails the next use tries again, so an unreachable store surfaces
/// as an error from whichever operation touches it first.
#[derive(Clone)]
pub struct DataStoreConnection {
    provider: BoundProvider,
    path: StorePath,
    inner: Arc<Mutex<Option<Connection>>>,
}

impl DataStoreConnection {
    /// Create a handle for `path`. Requires a bound provider.
    pub fn new(provider: &BoundProvider, path: StorePath) -> Self {
        Self {
            provider: provider.clone(),
            path,
            inner: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> &StorePath {
        &self.path
    }

    pub fn provider(&self) -> &BoundProvider {
        &self.provider
    }

    /// Create the store directory and file if they are missing.
    pub fn ensure_created(&self) -> Result<(), StoreError> {
        self.path.ensure_directory()?;
        self.with(|_| Ok(()))
    }

    /// Run `f` against the native connection, opening it if needed.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut Connection) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut guard = self.inner.lock().map_err(|_| StoreError::Poisoned)?;
        if guard.is_none() {
            *guard = Some(self.open()?);
        }
        match guard.as_mut() {
            Some(connection) => f(connection),
            None => Err(StoreError::Poisoned),
        }
    }

    /// Run `f` on the blocking pool.
    pub async fn run<R, F>(&self, f: F) -> Result<R, StoreError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<R, StoreError> + Send + 'static,
    {
        let handle = self.clone();
        tokio::task::spawn_blocking(move || handle.with(f))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// Rows changed through this handle since it was opened.
    pub fn total_changes(&self) -> Result<i64, StoreError> {
        self.with(|conn| Ok(conn.query_row("SELECT total_changes()", [], |row| row.get(0))?))
    }

    fn open(&self) -> Result<Connection, StoreError> {
        let path = self.path.path();
        let connection = Connection::open_with_flags(&path, self.provider.provider().open_flags())
            .map_err(|source| StoreError::Open {
                path: path.clone(),
                source,
            })?;
        connection.execute_batch("PRAGMA foreign_keys = ON;")?;
        tracing::debug!(
            path = %path.display(),
            provider = self.provider.provider().name(),
            "Store connection opened"
        );
        Ok(connection)
    }
}

impl fmt::Debug for DataStoreConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataStoreConnection")
            .field("path", &self.path)
            .field("provider", &self.provider.provider().name())
            .finish()
    }
}
