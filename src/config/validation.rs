//! Configuration validation.
//!
//! Serde handles syntax; this module checks values that deserialize fine
//! but cannot work at runtime. All errors are collected, not just the first.

use std::net::SocketAddr;

use crate::config::schema::ServerConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    /// Human readable description.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.host.trim().is_empty() {
        errors.push(ValidationError {
            field: "listener.host",
            message: "must not be empty".to_string(),
        });
    }

    if config.listener.port == 0 {
        errors.push(ValidationError {
            field: "listener.port",
            message: "must be non-zero".to_string(),
        });
    }

    if config.paths.client_dir.as_os_str().is_empty() {
        errors.push(ValidationError {
            field: "paths.client_dir",
            message: "must not be empty".to_string(),
        });
    }

    if config.paths.server_dir.as_os_str().is_empty() {
        errors.push(ValidationError {
            field: "paths.server_dir",
            message: "must not be empty".to_string(),
        });
    }

    if config.render.upstream.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError {
            field: "render.upstream",
            message: format!("'{}' is not a socket address", config.render.upstream),
        });
    }

    if let Some(isr) = &config.isr {
        if isr.max_byte_size == 0 {
            errors.push(ValidationError {
                field: "isr.max_byte_size",
                message: "must be greater than zero".to_string(),
            });
        }
        if isr.cache_dir.as_os_str().is_empty() {
            errors.push(ValidationError {
                field: "isr.cache_dir",
                message: "must not be empty".to_string(),
            });
        }
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError {
            field: "observability.metrics_address",
            message: format!(
                "'{}' is not a socket address",
                config.observability.metrics_address
            ),
        });
    }

    for route in config.build.route_headers.keys() {
        if !route.starts_with('/') {
            errors.push(ValidationError {
                field: "build.route_headers",
                message: format!("route '{}' must start with '/'", route),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
