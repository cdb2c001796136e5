//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("nickserv.guest_prefix must not be empty")]
    EmptyGuestPrefix,
    #[error("nickserv.enforcer_user and nickserv.enforcer_host must not be empty")]
    EmptyEnforcerIdentity,
    #[error("nickserv.release_timeout must be positive when network.svshold is off")]
    ZeroReleaseTimeout,
    #[error("network.max_modes must be positive")]
    ZeroMaxModes,
    #[error("server.services_nick must not be empty")]
    EmptyServicesNick,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.services_nick.is_empty() {
        errors.push(ValidationError::EmptyServicesNick);
    }
    if config.nickserv.guest_prefix.is_empty() {
        errors.push(ValidationError::EmptyGuestPrefix);
    }
    if config.nickserv.enforcer_user.is_empty() || config.nickserv.enforcer_host.is_empty() {
        errors.push(ValidationError::EmptyEnforcerIdentity);
    }
    if !config.network.svshold && config.nickserv.release_timeout == 0 {
        errors.push(ValidationError::ZeroReleaseTimeout);
    }
    if config.network.max_modes == 0 {
        errors.push(ValidationError::ZeroMaxModes);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
