//! End-to-end tests for the startup sequence of the identity host.

use std::sync::Arc;

use identity_host::config::{HostEnvironment, DEFAULT_PORT};
use identity_host::lifecycle::{StartupOrchestrator, StartupState, UnitOutcome};
use identity_host::platform::error_log::{MIGRATION_ERROR, PROGRAM_LOAD_EXCEPTION};
use identity_host::platform::control_system::ALREADY_INITIALIZED;
use identity_host::platform::{ControlSystem, HostNetworkAddress};
use identity_host::store::{NativeProvider, ProviderRegistry};

mod common;
use common::{settle, test_config, RecordingErrorLog, ScriptedPlatform};

fn running_addr(state: &StartupState) -> std::net::SocketAddr {
    match state {
        StartupState::Running { local_addr, .. } => *local_addr,
        other => panic!("expected Running, got {:?}", other),
    }
}

#[tokio::test]
async fn test_valid_address_starts_production_service() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RecordingErrorLog::default());
    let platform = Arc::new(ScriptedPlatform::reporting("127.0.0.1"));
    let config = test_config(dir.path(), HostEnvironment::Production);

    let mut handle = ControlSystem::new(config, platform.clone(), log.clone()).initialize_system();
    let state = settle(&mut handle).await;
    let addr = running_addr(&state);
    assert_eq!(state, StartupState::Running { local_addr: addr, degraded: false });
    assert_eq!(addr.ip().to_string(), "127.0.0.1");
    assert_eq!(platform.calls(), 1);

    let res = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(
        res.headers()["strict-transport-security"].to_str().unwrap(),
        "max-age=2592000"
    );
    let health: serde_json::Value = res.json().await.unwrap();
    assert_eq!(health["environment"], "production");
    assert_eq!(health["schema_version"], 3);

    // Diagnostics are not mounted in production.
    let res = reqwest::get(format!("http://{}/_migrations", addr)).await.unwrap();
    assert_eq!(res.status(), 404);

    assert!(log.errors().is_empty());
    assert_eq!(log.notices(), vec!["Database auto-migration completed successfully.".to_string()]);

    handle.shutdown();
    assert_eq!(handle.join().await, UnitOutcome::Completed);
}

#[tokio::test]
async fn test_second_initialize_does_not_rerun_startup() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RecordingErrorLog::default());
    let platform = Arc::new(ScriptedPlatform::reporting("127.0.0.1"));
    let config = test_config(dir.path(), HostEnvironment::Production);
    let control = ControlSystem::new(config, platform.clone(), log.clone());

    let mut first = control.initialize_system();
    running_addr(&settle(&mut first).await);

    let mut second = control.initialize_system();
    assert_eq!(settle(&mut second).await, StartupState::Failed(ALREADY_INITIALIZED.to_string()));
    assert_eq!(second.join().await, UnitOutcome::Failed(ALREADY_INITIALIZED.to_string()));

    assert_eq!(platform.calls(), 1);
    assert_eq!(log.notices().len(), 1);
    assert!(log.errors().is_empty());
    assert!(first.state().is_settled() && !first.state().is_failed());

    first.shutdown();
    assert_eq!(first.join().await, UnitOutcome::Completed);
}

#[tokio::test]
async fn test_second_initialize_after_failure_does_not_retry() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RecordingErrorLog::default());
    let platform = Arc::new(ScriptedPlatform::silent());
    let control = ControlSystem::new(test_config(dir.path(), HostEnvironment::Production), platform.clone(), log.clone());

    let mut first = control.initialize_system();
    assert!(settle(&mut first).await.is_failed());
    first.join().await;

    let mut second = control.initialize_system();
    assert!(settle(&mut second).await.is_failed());
    second.join().await;

    assert_eq!(platform.calls(), 1);
    assert_eq!(log.errors_with_prefix(PROGRAM_LOAD_EXCEPTION), 1);
}

#[tokio::test]
async fn test_listener_uses_exact_address_and_port() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RecordingErrorLog::default());
    let mut config = test_config(dir.path(), HostEnvironment::Production);
    config.listener.port = 28471;

    let mut handle = ControlSystem::new(config, Arc::new(ScriptedPlatform::reporting("127.0.0.1")), log)
        .initialize_system();
    let addr = running_addr(&settle(&mut handle).await);
    assert_eq!(addr, "127.0.0.1:28471".parse().unwrap());

    handle.shutdown();
    handle.join().await;
}

#[test]
fn test_device_address_forms_fixed_port_endpoint() {
    let address: HostNetworkAddress = "192.168.1.50".parse().unwrap();
    assert_eq!(address.socket_addr(DEFAULT_PORT), "192.168.1.50:7070".parse().unwrap());
}

#[tokio::test]
async fn test_missing_address_fails_once_and_host_survives() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RecordingErrorLog::default());
    let platform = Arc::new(ScriptedPlatform::silent());
    let config = test_config(dir.path(), HostEnvironment::Production);

    let mut handle = ControlSystem::new(config, platform.clone(), log.clone()).initialize_system();
    let state = settle(&mut handle).await;
    assert!(state.is_failed());

    let outcome = handle.join().await;
    assert!(matches!(outcome, UnitOutcome::Failed(_)));
    assert_eq!(log.errors().len(), 1);
    assert_eq!(log.errors_with_prefix(PROGRAM_LOAD_EXCEPTION), 1);
    assert_eq!(platform.calls(), 1);

    // The store is never touched and the process keeps running.
    assert!(!dir.path().join("app.db").exists());
    tokio::task::yield_now().await;
}

#[tokio::test]
async fn test_malformed_and_empty_addresses_fail() {
    for answer in ["", "   ", "not-an-address", "300.1.1.1"] {
        let dir = tempfile::tempdir().unwrap();
        let log = Arc::new(RecordingErrorLog::default());
        let config = test_config(dir.path(), HostEnvironment::Production);

        let orchestrator =
            StartupOrchestrator::new(config, Arc::new(ScriptedPlatform::reporting(answer)), log.clone());
        let mut states = orchestrator.subscribe();
        let mut handle = orchestrator.spawn();

        let state = settle(&mut handle).await;
        assert!(state.is_failed(), "answer {:?} gave {:?}", answer, state);
        handle.join().await;

        assert_eq!(log.errors().len(), 1, "answer {:?}", answer);
        assert!(log.errors()[0].starts_with("Program Load Exception | "));
        assert!(states.borrow_and_update().is_failed());
    }
}

#[tokio::test]
async fn test_unmigratable_store_still_runs() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("app.db"), vec![b'x'; 4096]).unwrap();
    let log = Arc::new(RecordingErrorLog::default());
    let config = test_config(dir.path(), HostEnvironment::Production);

    let mut handle = ControlSystem::new(config, Arc::new(ScriptedPlatform::reporting("127.0.0.1")), log.clone())
        .initialize_system();
    let state = settle(&mut handle).await;
    let addr = running_addr(&state);
    assert_eq!(state, StartupState::Running { local_addr: addr, degraded: true });

    assert_eq!(log.errors().len(), 1);
    assert_eq!(log.errors_with_prefix(MIGRATION_ERROR), 1);
    assert_eq!(log.errors_with_prefix(PROGRAM_LOAD_EXCEPTION), 0);

    let res = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(res.status(), 200);
    let health: serde_json::Value = res.json().await.unwrap();
    assert!(health["schema_version"].is_null());

    handle.shutdown();
    assert_eq!(handle.join().await, UnitOutcome::Completed);
}

#[tokio::test]
async fn test_development_exposes_migrations_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RecordingErrorLog::default());
    let config = test_config(dir.path(), HostEnvironment::Development);

    let mut handle = ControlSystem::new(config, Arc::new(ScriptedPlatform::reporting("127.0.0.1")), log)
        .initialize_system();
    let addr = running_addr(&settle(&mut handle).await);

    let res = reqwest::get(format!("http://{}/_migrations", addr)).await.unwrap();
    assert_eq!(res.status(), 200);
    assert!(res.headers().get("strict-transport-security").is_none());
    let status: serde_json::Value = res.json().await.unwrap();
    assert_eq!(status["current"], 3);
    assert_eq!(status["latest"], 3);
    assert_eq!(status["applied"].as_array().unwrap().len(), 3);
    assert!(status["pending"].as_array().unwrap().is_empty());

    // Applying again is a no-op.
    let res = reqwest::Client::new()
        .post(format!("http://{}/_migrations", addr))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let outcome: serde_json::Value = res.json().await.unwrap();
    assert_eq!(outcome["success"], true);
    assert!(outcome["applied"].as_array().unwrap().is_empty());

    handle.shutdown();
    handle.join().await;
}

#[tokio::test]
async fn test_taken_port_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let log = Arc::new(RecordingErrorLog::default());
    let mut config = test_config(dir.path(), HostEnvironment::Production);
    config.listener.port = taken.local_addr().unwrap().port();

    let mut handle = ControlSystem::new(config, Arc::new(ScriptedPlatform::reporting("127.0.0.1")), log.clone())
        .initialize_system();
    let state = settle(&mut handle).await;
    assert!(state.is_failed());
    handle.join().await;

    assert_eq!(log.errors_with_prefix(PROGRAM_LOAD_EXCEPTION), 1);
    assert!(log.errors()[0].contains("failed to bind listener"));
}

static FROZEN_REGISTRY: ProviderRegistry = ProviderRegistry::new();

#[tokio::test]
async fn test_provider_conflict_fails_before_address_query() {
    FROZEN_REGISTRY
        .bind(NativeProvider::sqlite3_multi_thread())
        .unwrap();
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(RecordingErrorLog::default());
    let platform = Arc::new(ScriptedPlatform::reporting("127.0.0.1"));
    let config = test_config(dir.path(), HostEnvironment::Production);

    let mut handle = StartupOrchestrator::new(config, platform.clone(), log.clone())
        .with_registry(&FROZEN_REGISTRY)
        .with_provider(NativeProvider::sqlite3())
        .spawn();
    assert!(settle(&mut handle).await.is_failed());
    handle.join().await;

    assert_eq!(platform.calls(), 0);
    assert_eq!(log.errors_with_prefix(PROGRAM_LOAD_EXCEPTION), 1);
    assert_eq!(
        FROZEN_REGISTRY.active().map(|b| b.provider()),
        Some(NativeProvider::sqlite3_multi_thread())
    );
}
