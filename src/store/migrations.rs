//! Schema migration for the identity store.
//!
//! # Responsibilities
//! - Read the store's recorded schema version
//! - Apply pending steps in ascending version order
//! - Report a degraded outcome instead of failing startup
//!
//! # Design Decisions
//! - One transaction per step: a step and its history row commit together
//! - Stop at the first failing step; the store keeps the last good version
//! - Never roll a store back, even if it is ahead of this binary
//! - An already-current store is left untouched (no writes)

use std::fmt;

use rusqlite::{params, Connection};
use serde::Serialize;
use thiserror::Error;

use crate::platform::error_log::{ErrorLog, MIGRATION_ERROR};
use crate::store::{DataStoreConnection, StoreError};

/// Table recording applied schema versions.
pub const HISTORY_TABLE: &str = "__schema_history";

const CREATE_HISTORY: &str = "CREATE TABLE IF NOT EXISTS __schema_history (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);";

/// Ordered identifier of a store schema state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SchemaVersion(u32);

impl SchemaVersion {
    /// Version of a store no migration has touched.
    pub const EMPTY: SchemaVersion = SchemaVersion(0);

    pub const fn new(version: u32) -> Self {
        Self(version)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A single schema step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Migration {
    pub version: SchemaVersion,
    pub name: &'static str,
    pub sql: &'static str,
}

/// Steps known to this binary for the identity schema.
pub const IDENTITY_MIGRATIONS: &[Migration] = &[
    Migration {
        version: SchemaVersion::new(1),
        name: "create_identity_schema",
        sql: "
            CREATE TABLE users (
                id TEXT PRIMARY KEY,
                user_name TEXT NOT NULL,
                normalized_user_name TEXT NOT NULL UNIQUE,
                email TEXT,
                normalized_email TEXT,
                email_confirmed INTEGER NOT NULL DEFAULT 0,
                password_hash TEXT,
                security_stamp TEXT NOT NULL,
                lockout_enabled INTEGER NOT NULL DEFAULT 1,
                access_failed_count INTEGER NOT NULL DEFAULT 0
            );
            CREATE INDEX idx_users_normalized_email ON users(normalized_email);

            CREATE TABLE roles (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                normalized_name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE user_roles (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                role_id TEXT NOT NULL REFERENCES roles(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, role_id)
            );

            CREATE TABLE user_claims (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                claim_type TEXT,
                claim_value TEXT
            );

            CREATE TABLE user_logins (
                login_provider TEXT NOT NULL,
                provider_key TEXT NOT NULL,
                provider_display_name TEXT,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                PRIMARY KEY (login_provider, provider_key)
            );

            CREATE TABLE user_tokens (
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                login_provider TEXT NOT NULL,
                name TEXT NOT NULL,
                value TEXT,
                PRIMARY KEY (user_id, login_provider, name)
            );
        ",
    },
    Migration {
        version: SchemaVersion::new(2),
        name: "add_email_confirmation_token",
        sql: "ALTER TABLE users ADD COLUMN confirmation_token TEXT;",
    },
    Migration {
        version: SchemaVersion::new(3),
        name: "add_last_sign_in",
        sql: "ALTER TABLE users ADD COLUMN last_sign_in_at TEXT;",
    },
];

/// Why migration could not reach the latest version.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("migration {version} ({name}) failed: {source}")]
    Step {
        version: SchemaVersion,
        name: &'static str,
        #[source]
        source: rusqlite::Error,
    },
    #[error("store is at {found}, newer than the latest known {known}")]
    AheadOfBinary {
        found: SchemaVersion,
        known: SchemaVersion,
    },
}

/// Outcome of a migration attempt.
#[derive(Debug)]
pub enum MigrationReport {
    /// Store was already at the latest version; nothing was written.
    UpToDate { version: SchemaVersion },
    /// Pending steps were applied.
    Applied {
        from: SchemaVersion,
        to: SchemaVersion,
        steps: Vec<SchemaVersion>,
    },
    /// The store could not be brought to `target`. `reached` is `None` when
    /// the recorded version could not even be read.
    Degraded {
        reached: Option<SchemaVersion>,
        target: SchemaVersion,
        error: MigrationError,
    },
}

impl MigrationReport {
    pub fn is_success(&self) -> bool {
        !matches!(self, MigrationReport::Degraded { .. })
    }

    /// Version the store is known to be at after the attempt.
    pub fn version(&self) -> Option<SchemaVersion> {
        match self {
            MigrationReport::UpToDate { version } => Some(*version),
            MigrationReport::Applied { to, .. } => Some(*to),
            MigrationReport::Degraded { reached, .. } => *reached,
        }
    }
}

/// A row of the history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedMigration {
    pub version: SchemaVersion,
    pub name: String,
    pub applied_at: String,
}

/// Advances a store to the latest schema version known to the binary.
#[derive(Debug, Clone)]
pub struct SchemaMigrator {
    migrations: Vec<Migration>,
    ensure_created: bool,
}

impl SchemaMigrator {
    /// Migrator for the identity schema.
    pub fn identity() -> Self {
        Self::new(IDENTITY_MIGRATIONS.to_vec())
    }

    pub fn new(mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by_key(|m| m.version);
        Self {
            migrations,
            ensure_created: false,
        }
    }

    /// Create the store directory and file before migrating.
    pub fn with_ensure_created(mut self, ensure_created: bool) -> Self {
        self.ensure_created = ensure_created;
        self
    }

    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Highest version known to this binary.
    pub fn latest(&self) -> SchemaVersion {
        self.migrations
            .last()
            .map(|m| m.version)
            .unwrap_or(SchemaVersion::EMPTY)
    }

    /// Apply pending steps on the blocking pool and report to the host log.
    ///
    /// Never fails: problems are logged and returned as
    /// [`MigrationReport::Degraded`].
    pub async fn migrate(
        &self,
        connection: &DataStoreConnection,
        error_log: &dyn ErrorLog,
    ) -> MigrationReport {
        let migrator = self.clone();
        let handle = connection.clone();
        let report = match tokio::task::spawn_blocking(move || migrator.migrate_blocking(&handle)).await
        {
            Ok(report) => report,
            Err(e) => MigrationReport::Degraded {
                reached: None,
                target: self.latest(),
                error: MigrationError::Store(StoreError::Join(e.to_string())),
            },
        };

        match &report {
            MigrationReport::Degraded { error, .. } => {
                error_log.error(&format!("{}: {}", MIGRATION_ERROR, error));
            }
            _ => error_log.notice("Database auto-migration completed successfully."),
        }
        report
    }

    /// Apply pending steps on the current thread.
    pub fn migrate_blocking(&self, connection: &DataStoreConnection) -> MigrationReport {
        let target = self.latest();

        if self.ensure_created {
            if let Err(e) = connection.ensure_created() {
                return self.degraded(None, e.into());
            }
        }

        let report = match connection.with(|conn| Ok(self.apply_pending(conn))) {
            Ok(report) => report,
            Err(e) => self.degraded(None, e.into()),
        };

        match &report {
            MigrationReport::UpToDate { version } => {
                tracing::info!(version = %version, "Store schema already current");
            }
            MigrationReport::Applied { from, to, steps } => {
                tracing::info!(from = %from, to = %to, steps = steps.len(), "Store schema migrated");
            }
            MigrationReport::Degraded { reached, error, .. } => {
                tracing::error!(
                    reached = ?reached.map(SchemaVersion::get),
                    target = %target,
                    error = %error,
                    "Store schema migration degraded"
                );
            }
        }
        report
    }

    /// Steps not yet recorded in the store.
    pub fn pending(&self, connection: &DataStoreConnection) -> Result<Vec<Migration>, StoreError> {
        let current = connection.with(|conn| Ok(current_version(conn)?))?;
        Ok(self
            .migrations
            .iter()
            .filter(|m| m.version > current)
            .copied()
            .collect())
    }

    fn apply_pending(&self, conn: &mut Connection) -> MigrationReport {
        let target = self.latest();
        let current = match current_version(conn) {
            Ok(version) => version,
            Err(e) => return self.degraded(None, StoreError::from(e).into()),
        };

        if current > target {
            return self.degraded(
                Some(current),
                MigrationError::AheadOfBinary {
                    found: current,
                    known: target,
                },
            );
        }
        if current == target {
            return MigrationReport::UpToDate { version: current };
        }

        let mut reached = current;
        let mut steps = Vec::new();
        for migration in self.migrations.iter().filter(|m| m.version > current) {
            if let Err(source) = apply_step(conn, migration) {
                return self.degraded(
                    Some(reached),
                    MigrationError::Step {
                        version: migration.version,
                        name: migration.name,
                        source,
                    },
                );
            }
            tracing::debug!(version = %migration.version, name = migration.name, "Applied migration");
            reached = migration.version;
            steps.push(migration.version);
        }

        MigrationReport::Applied {
            from: current,
            to: reached,
            steps,
        }
    }

    fn degraded(&self, reached: Option<SchemaVersion>, error: MigrationError) -> MigrationReport {
        MigrationReport::Degraded {
            reached,
            target: self.latest(),
            error,
        }
    }
}

/// Version recorded in the store; `EMPTY` when there is no history table.
pub fn current_version(conn: &Connection) -> rusqlite::Result<SchemaVersion> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        params![HISTORY_TABLE],
        |row| row.get(0),
    )?;
    if !exists {
        return Ok(SchemaVersion::EMPTY);
    }

    let version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM __schema_history",
        [],
        |row| row.get(0),
    )?;
    Ok(SchemaVersion(version))
}

/// History rows, oldest first.
pub fn applied_migrations(
    connection: &DataStoreConnection,
) -> Result<Vec<AppliedMigration>, StoreError> {
    connection.with(|conn| {
        if current_version(conn)? == SchemaVersion::EMPTY {
            return Ok(Vec::new());
        }
        let mut stmt = conn.prepare(
            "SELECT version, name, applied_at FROM __schema_history ORDER BY version ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(AppliedMigration {
                    version: SchemaVersion(row.get(0)?),
                    name: row.get(1)?,
                    applied_at: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

fn apply_step(conn: &mut Connection, migration: &Migration) -> rusqlite::Result<()> {
    let tx = conn.transaction()?;
    tx.execute_batch(CREATE_HISTORY)?;
    tx.execute_batch(migration.sql)?;
    tx.execute(
        "INSERT INTO __schema_history (version, name) VALUES (?1, ?2)",
        params![migration.version.get(), migration.name],
    )?;
    tx.commit()
}
