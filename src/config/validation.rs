//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (limits > 0, addresses parse)
//! - Check header names and skip-list entries are usable
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use axum::http::HeaderName;

use crate::config::schema::AppConfig;

/// Upper bound for any retention period (100 years).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be > 0"));
    }

    if config.capture.truncate_chars == 0 {
        errors.push(ValidationError::new("capture.truncate_chars", "must be > 0"));
    }

    if HeaderName::from_bytes(config.audit.correlation_header.as_bytes()).is_err() {
        errors.push(ValidationError::new(
            "audit.correlation_header",
            format!("'{}' is not a valid header name", config.audit.correlation_header),
        ));
    }

    for path in &config.audit.skip_paths {
        if !path.starts_with('/') {
            errors.push(ValidationError::new(
                "audit.skip_paths",
                format!("'{}' must start with '/'", path),
            ));
        }
    }

    if config.audit.queue_capacity == 0 {
        errors.push(ValidationError::new("audit.queue_capacity", "must be > 0"));
    }

    if config.audit.write_timeout_ms == 0 {
        errors.push(ValidationError::new("audit.write_timeout_ms", "must be > 0"));
    }

    if config.performance.max_limit == 0 {
        errors.push(ValidationError::new("performance.max_limit", "must be > 0"));
    }

    if config.performance.default_limit == 0
        || config.performance.default_limit > config.performance.max_limit
    {
        errors.push(ValidationError::new(
            "performance.default_limit",
            "must be between 1 and performance.max_limit",
        ));
    }

    if config.audit.retention_days > MAX_RETENTION_DAYS {
        errors.push(ValidationError::new(
            "audit.retention_days",
            format!("must be at most {}", MAX_RETENTION_DAYS),
        ));
    }

    if config.performance.retention_days > MAX_RETENTION_DAYS {
        errors.push(ValidationError::new(
            "performance.retention_days",
            format!("must be at most {}", MAX_RETENTION_DAYS),
        ));
    }

    let retention_enabled =
        config.audit.retention_days > 0 || config.performance.retention_days > 0;
    if retention_enabled && config.performance.cleanup_interval_secs == 0 {
        errors.push(ValidationError::new(
            "performance.cleanup_interval_secs",
            "must be > 0 when retention is enabled",
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

    let mut seen = HashSet::new();
    for entry in &config.auth.api_keys {
        if entry.key.is_empty() || entry.principal.is_empty() {
            errors.push(ValidationError::new(
                "auth.api_keys",
                "key and principal must not be empty",
            ));
        }
        if !seen.insert(entry.key.as_str()) {
            errors.push(ValidationError::new(
                "auth.api_keys",
                format!("duplicate key for principal '{}'", entry.principal),
            ));
        }
    }

    if config.auth.required && config.auth.api_keys.is_empty() {
        errors.push(ValidationError::new(
            "auth.required",
            "authentication is required but no api_keys are configured",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::ApiKeyConfig;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = AppConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.audit.queue_capacity = 0;
        config.audit.skip_paths.push("health".into());

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert!(fields.contains(&"listener.bind_address"));
        assert!(fields.contains(&"audit.queue_capacity"));
        assert!(fields.contains(&"audit.skip_paths"));
    }

    #[test]
    fn test_duplicate_api_keys() {
        let mut config = AppConfig::default();
        for principal in ["a", "b"] {
            config.auth.api_keys.push(ApiKeyConfig {
                key: "same".into(),
                principal: principal.into(),
                roles: vec![],
            });
        }
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "auth.api_keys");
    }

    #[test]
    fn test_retention_days_bounded() {
        let mut config = AppConfig::default();
        config.performance.retention_days = u32::MAX;
        config.audit.retention_days = MAX_RETENTION_DAYS + 1;

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["audit.retention_days", "performance.retention_days"]);

        config.performance.retention_days = MAX_RETENTION_DAYS;
        config.audit.retention_days = MAX_RETENTION_DAYS;
        assert!(validate_config(&config).is_ok());
    }
}
