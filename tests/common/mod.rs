//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use identity_host::config::{HostConfig, HostEnvironment};
use identity_host::platform::{EthernetParameter, ErrorLog, HostPlatform};
use identity_host::StartupHandle;
use identity_host::StartupState;

/// Error log that keeps every entry in memory.
#[derive(Default)]
pub struct RecordingErrorLog {
    errors: Mutex<Vec<String>>,
    notices: Mutex<Vec<String>>,
}

impl RecordingErrorLog {
    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().unwrap().clone()
    }

    pub fn errors_with_prefix(&self, prefix: &str) -> usize {
        self.errors().iter().filter(|e| e.starts_with(prefix)).count()
    }
}

impl ErrorLog for RecordingErrorLog {
    fn error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    fn notice(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

/// Platform whose address answer is fixed by the test.
pub struct ScriptedPlatform {
    answer: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedPlatform {
    pub fn reporting(address: &str) -> Self {
        Self {
            answer: Some(address.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn silent() -> Self {
        Self {
            answer: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HostPlatform for ScriptedPlatform {
    fn ethernet_parameter(&self, parameter: EthernetParameter, adapter: u32) -> Option<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match (parameter, adapter) {
            (EthernetParameter::CurrentIpAddress, 0) => self.answer.clone(),
            _ => None,
        }
    }
}

/// Config with the store inside `dir`, an ephemeral port and `environment`.
pub fn test_config(dir: &Path, environment: HostEnvironment) -> HostConfig {
    let mut config = HostConfig::default();
    config.environment = environment;
    config.listener.port = 0;
    config.store.base_dir = dir.to_path_buf();
    config.store.file_name = "app.db".to_string();
    config
}

/// Wait (bounded) until the unit is `Running` or `Failed`.
pub async fn settle(handle: &mut StartupHandle) -> StartupState {
    tokio::time::timeout(Duration::from_secs(10), handle.settled())
        .await
        .expect("startup did not settle")
}
