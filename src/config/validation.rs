//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, names and timeouts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ObservationConfig → Result<(), Vec<ValidationError>>

use std::net::SocketAddr;

use thiserror::Error;
use tracing_subscriber::EnvFilter;

use crate::config::schema::ObservationConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid bind address '{0}'")]
    InvalidBindAddress(String),

    #[error("invalid upstream address '{0}'")]
    InvalidUpstreamAddress(String),

    #[error("invalid metrics exporter address '{0}'")]
    InvalidExporterAddress(String),

    #[error("request timeout must be greater than zero")]
    ZeroTimeout,

    #[error("{0} observation name must not be empty")]
    EmptyObservationName(&'static str),

    #[error("invalid log level '{0}'")]
    InvalidLogLevel(String),
}

/// Validate a parsed configuration, collecting every error.
pub fn validate_config(config: &ObservationConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(config.server.bind_address.clone()));
    }
    if config.server.request_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout);
    }
    if let Some(addr) = &config.server.upstream_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidUpstreamAddress(addr.clone()));
        }
    }
    if let Some(addr) = &config.metrics.exporter_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::InvalidExporterAddress(addr.clone()));
        }
    }
    if config.conventions.client_name.trim().is_empty() {
        errors.push(ValidationError::EmptyObservationName("client"));
    }
    if config.conventions.server_name.trim().is_empty() {
        errors.push(ValidationError::EmptyObservationName("server"));
    }
    if EnvFilter::try_new(&config.logging.level).is_err() {
        errors.push(ValidationError::InvalidLogLevel(config.logging.level.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
