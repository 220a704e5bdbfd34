//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check resource override keys name known resource types
//! - Validate value ranges (sizes > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: FeedConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::FeedConfig;
use crate::resources::ResourceType;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Check `config`, collecting every problem found.
pub fn validate_config(config: &FeedConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::new("listener.max_connections", "must be greater than 0"));
    }

    if config.api.version.is_none() {
        errors.push(ValidationError::new("api.version", "must be specified"));
    }
    if let Some(url) = &config.api.public_base_url {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError::new(
                "api.public_base_url",
                format!("'{}' must be an absolute http(s) URL", url),
            ));
        }
    }

    for (name, path) in &config.resources {
        if name.parse::<ResourceType>().is_err() {
            errors.push(ValidationError::new(
                format!("resources.{}", name),
                "unknown resource type",
            ));
        }
        if path.split('/').all(|s| s.is_empty()) {
            errors.push(ValidationError::new(format!("resources.{}", name), "path must not be empty"));
        }
    }

    if config.storage.packages_dir.trim().is_empty() {
        errors.push(ValidationError::new("storage.packages_dir", "must not be empty"));
    }
    if config.storage.max_package_size == 0 {
        errors.push(ValidationError::new("storage.max_package_size", "must be greater than 0"));
    }

    if config.http.write_buffer_size == 0 {
        errors.push(ValidationError::new("http.write_buffer_size", "must be greater than 0"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if !LOG_LEVELS.contains(&config.observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("'{}' is not one of {}", config.observability.log_level, LOG_LEVELS.join(", ")),
        ));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
