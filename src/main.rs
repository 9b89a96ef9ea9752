//! Identity web host (v1)
//!
//! An identity-enabled web application started from inside an embedded
//! control system, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!  Host runtime
//!      │ initialize_system() returns immediately
//!      ▼
//!  ┌────────────────────── supervised background unit ──────────────────────┐
//!  │                                                                        │
//!  │  provider bind ──▶ address resolve ──▶ assemble + bind ──▶ migrate ──▶ run
//!  │  (store::provider)  (platform::ethernet)  (http::server)   (store::migrations)
//!  │                                                                        │
//!  │  any failure ──▶ host error log ("Program Load Exception | …")         │
//!  └────────────────────────────────────────────────────────────────────────┘
//!                                      │
//!  Client ──▶ <address>:7070 ──▶ pages / account / diagnostics / wwwroot
//!                                      │
//!                                      ▼
//!                          identity store (/user/app.db)
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use identity_host::config::loader::load_config;
use identity_host::config::{HostConfig, HostEnvironment, PlatformMode};
use identity_host::lifecycle::signals::shutdown_signal;
use identity_host::observability::init_logging;
use identity_host::platform::{platform_from_config, ControlSystem, TracingErrorLog};

#[derive(Parser)]
#[command(name = "identity-host")]
#[command(about = "Identity web host for an embedded control system", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured environment (development | production).
    #[arg(short, long)]
    environment: Option<HostEnvironment>,

    /// Report this address instead of probing the network interface.
    #[arg(long)]
    static_address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => HostConfig::default(),
    };
    if let Some(environment) = cli.environment {
        config.environment = environment;
    }
    if let Some(address) = cli.static_address {
        config.platform.mode = PlatformMode::Static;
        config.platform.static_address = Some(address);
    }

    init_logging(&config.observability)?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        environment = config.environment.as_str(),
        store = %config.store.base_dir.join(&config.store.file_name).display(),
        "identity-host starting"
    );

    let platform = platform_from_config(&config.platform);
    let control_system = ControlSystem::new(config, platform, Arc::new(TracingErrorLog));
    let handle = control_system.initialize_system();

    // The host stays up whether or not startup succeeded.
    shutdown_signal().await;
    handle.shutdown();
    let outcome = handle.join().await;

    tracing::info!(outcome = ?outcome, "Shutdown complete");
    Ok(())
}
