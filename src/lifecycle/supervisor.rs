//! Supervised background tasks.
//!
//! # Responsibilities
//! - Run a `Result`-returning unit of work on its own task
//! - Capture its terminal outcome, including panics
//! - Report failures to the host error log exactly once
//!
//! # Design Decisions
//! - The work runs inside an inner task so a panic unwinds only that task;
//!   the supervisor observes it as a `JoinError`
//! - Nothing escapes the supervisor: its own handle always completes with
//!   `Ok` or a tagged failure, never a panic

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use tokio::task::{JoinError, JoinHandle};

use crate::platform::error_log::{ErrorLog, PROGRAM_LOAD_EXCEPTION};

/// Terminal outcome of a supervised unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    Completed,
    /// The unit returned an error; the message was logged.
    Failed(String),
    /// The unit panicked or was aborted; the message was logged.
    Panicked(String),
}

impl UnitOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, UnitOutcome::Completed)
    }
}

/// Spawn `work` and report its failure to `error_log` as a
/// `Program Load Exception`.
pub fn spawn_supervised<F, E>(name: &'static str, error_log: Arc<dyn ErrorLog>, work: F) -> JoinHandle<UnitOutcome>
where
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
{
    tokio::spawn(async move {
        let inner = tokio::spawn(work);
        let outcome = match inner.await {
            Ok(Ok(())) => UnitOutcome::Completed,
            Ok(Err(e)) => UnitOutcome::Failed(e.to_string()),
            Err(e) => UnitOutcome::Panicked(panic_message(e)),
        };

        match &outcome {
            UnitOutcome::Completed => {
                tracing::info!(unit = name, "Supervised unit completed");
            }
            UnitOutcome::Failed(message) | UnitOutcome::Panicked(message) => {
                tracing::error!(unit = name, error = %message, "Supervised unit failed");
                error_log.error(&format!("{} | {}", PROGRAM_LOAD_EXCEPTION, message));
            }
        }
        outcome
    })
}

fn panic_message(err: JoinError) -> String {
    if err.is_cancelled() {
        return "task was cancelled".to_string();
    }
    match err.try_into_panic() {
        Ok(payload) => {
            if let Some(s) = payload.downcast_ref::<String>() {
                format!("panic: {}", s)
            } else if let Some(s) = payload.downcast_ref::<&str>() {
                format!("panic: {}", s)
            } else {
                "panic with non-string payload".to_string()
            }
        }
        Err(err) => err.to_string(),
    }
}
