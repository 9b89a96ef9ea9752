//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (port valid, 0 < ttl <= one year)
//! - Check that static mode carries an address
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: HostConfig → Result<(), Vec<ValidationError>>
//! - Address *content* is not checked here; the resolver owns that at startup

use thiserror::Error;

use crate::config::schema::{HostConfig, PlatformMode};
use crate::identity::session::MAX_SESSION_TTL;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.port must be non-zero")]
    ZeroPort,
    #[error("platform.static_address is required when platform.mode = \"static\"")]
    MissingStaticAddress,
    #[error("platform.probe_target '{0}' is not a socket address")]
    InvalidProbeTarget(String),
    #[error("store.file_name must not be empty")]
    EmptyStoreFileName,
    #[error("store.base_dir must be an absolute path, got '{0}'")]
    RelativeStoreDir(String),
    #[error("identity.session_ttl_secs must be greater than zero")]
    ZeroSessionTtl,
    #[error("identity.session_ttl_secs must be at most {max}, got {got}")]
    SessionTtlTooLong { got: u64, max: u64 },
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &HostConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port == 0 {
        errors.push(ValidationError::ZeroPort);
    }

    match config.platform.mode {
        PlatformMode::Static if config.platform.static_address.is_none() => {
            errors.push(ValidationError::MissingStaticAddress);
        }
        PlatformMode::Probe
            if config
                .platform
                .probe_target
                .parse::<std::net::SocketAddr>()
                .is_err() =>
        {
            errors.push(ValidationError::InvalidProbeTarget(
                config.platform.probe_target.clone(),
            ));
        }
        _ => {}
    }

    if config.store.file_name.trim().is_empty() {
        errors.push(ValidationError::EmptyStoreFileName);
    }
    if !config.store.base_dir.is_absolute() {
        errors.push(ValidationError::RelativeStoreDir(
            config.store.base_dir.display().to_string(),
        ));
    }

    let max_ttl = MAX_SESSION_TTL.as_secs();
    if config.identity.session_ttl_secs == 0 {
        errors.push(ValidationError::ZeroSessionTtl);
    } else if config.identity.session_ttl_secs > max_ttl {
        errors.push(ValidationError::SessionTtlTooLong {
            got: config.identity.session_ttl_secs,
            max: max_ttl,
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
