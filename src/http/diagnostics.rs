//! Development-only migrations endpoint.
//!
//! `GET` reports the store's schema state; `POST` applies pending steps.
//! Only mounted when the host runs in the development environment.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use crate::http::server::AppState;
use crate::store::migrations::{applied_migrations, AppliedMigration, MigrationReport};
use crate::store::SchemaVersion;

/// Path of the migrations endpoint.
pub const MIGRATIONS_PATH: &str = "/_migrations";

pub fn routes() -> Router<AppState> {
    Router::new().route(MIGRATIONS_PATH, get(status).post(apply))
}

#[derive(Debug, Serialize)]
pub struct PendingMigration {
    pub version: SchemaVersion,
    pub name: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MigrationStatus {
    pub store: String,
    pub latest: SchemaVersion,
    pub current: Option<SchemaVersion>,
    pub applied: Vec<AppliedMigration>,
    pub pending: Vec<PendingMigration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MigrationOutcome {
    pub success: bool,
    pub version: Option<SchemaVersion>,
    pub applied: Vec<SchemaVersion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&MigrationReport> for MigrationOutcome {
    fn from(report: &MigrationReport) -> Self {
        let (applied, error) = match report {
            MigrationReport::UpToDate { .. } => (Vec::new(), None),
            MigrationReport::Applied { steps, .. } => (steps.clone(), None),
            MigrationReport::Degraded { error, .. } => (Vec::new(), Some(error.to_string())),
        };
        Self {
            success: report.is_success(),
            version: report.version(),
            applied,
            error,
        }
    }
}

async fn status(State(state): State<AppState>) -> Json<MigrationStatus> {
    let migrator = state.migrator.clone();
    let connection = state.connection.clone();
    let store = connection.path().to_string();
    let latest = migrator.latest();

    let result = tokio::task::spawn_blocking(move || {
        let applied = applied_migrations(&connection)?;
        let pending = migrator.pending(&connection)?;
        Ok::<_, crate::store::StoreError>((applied, pending))
    })
    .await;

    let status = match result {
        Ok(Ok((applied, pending))) => MigrationStatus {
            store,
            latest,
            current: Some(applied.last().map(|m| m.version).unwrap_or(SchemaVersion::EMPTY)),
            applied,
            pending: pending
                .into_iter()
                .map(|m| PendingMigration {
                    version: m.version,
                    name: m.name,
                })
                .collect(),
            error: None,
        },
        Ok(Err(e)) => unreadable(store, latest, e.to_string()),
        Err(e) => unreadable(store, latest, e.to_string()),
    };
    Json(status)
}

fn unreadable(store: String, latest: SchemaVersion, error: String) -> MigrationStatus {
    MigrationStatus {
        store,
        latest,
        current: None,
        applied: Vec::new(),
        pending: Vec::new(),
        error: Some(error),
    }
}

async fn apply(State(state): State<AppState>) -> (StatusCode, Json<MigrationOutcome>) {
    tracing::info!("Applying migrations on request");
    let report = state
        .migrator
        .migrate(&state.connection, state.error_log.as_ref())
        .await;
    let status = if report.is_success() {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(MigrationOutcome::from(&report)))
}
