//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the directory API observability service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Payload capture limits.
    pub capture: CaptureConfig,

    /// Audit trail settings.
    pub audit: AuditConfig,

    /// Performance record settings.
    pub performance: PerformanceConfig,

    /// Logging and metrics settings.
    pub observability: ObservabilityConfig,

    #[serde(default)]
    pub auth: AuthConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Limits applied while capturing request and response bodies.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Largest request body (by Content-Length) that is buffered for capture.
    pub max_request_bytes: usize,

    /// Number of response bytes copied aside while streaming to the client.
    pub max_response_bytes: usize,

    /// Captured text longer than this many characters is truncated.
    pub truncate_chars: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: 64 * 1024,
            max_response_bytes: 64 * 1024,
            truncate_chars: 4000,
        }
    }
}

/// Audit trail configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Enable audit records for inbound requests.
    pub enabled: bool,

    /// Header carrying the correlation identifier, inbound and outbound.
    pub correlation_header: String,

    /// Path prefixes that never produce audit or performance records.
    pub skip_paths: Vec<String>,

    /// Capacity of each background write queue.
    pub queue_capacity: usize,

    /// Upper bound for a single store write in milliseconds.
    pub write_timeout_ms: u64,

    /// How long queued writes may drain after shutdown is signalled.
    pub drain_timeout_secs: u64,

    /// Audit rows older than this are removed by the retention task (0 = keep forever).
    pub retention_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            correlation_header: "x-correlation-id".to_string(),
            skip_paths: vec![
                "/swagger".to_string(),
                "/health".to_string(),
                "/favicon.ico".to_string(),
            ],
            queue_capacity: 1024,
            write_timeout_ms: 2000,
            drain_timeout_secs: 5,
            retention_days: 90,
        }
    }
}

/// Performance record configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Enable performance records for inbound requests.
    pub enabled: bool,

    /// Limit used when a query does not provide one.
    pub default_limit: usize,

    /// Largest number of records a single query returns.
    pub max_limit: usize,

    /// Records older than this are removed by the retention task (0 = keep forever).
    pub retention_days: u32,

    /// Interval between retention sweeps (audit and performance) in seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_limit: 100,
            max_limit: 1000,
            retention_days: 30,
            cleanup_interval_secs: 3600,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// API key authentication.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Reject requests without a valid key (skip-listed paths excepted).
    pub required: bool,

    /// Known keys and the principal each one authenticates as.
    pub api_keys: Vec<ApiKeyConfig>,
}

/// A single API key entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiKeyConfig {
    pub key: String,
    pub principal: String,
    #[serde(default)]
    pub roles: Vec<String>,
}
