//! Audit record types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::http::correlation::CorrelationId;

/// Kind of event an audit record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LogType {
    Request,
    Response,
    Error,
    AuthSuccess,
    AuthFailure,
    DomainOperation,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogType::Request => "REQUEST",
            LogType::Response => "RESPONSE",
            LogType::Error => "ERROR",
            LogType::AuthSuccess => "AUTH_SUCCESS",
            LogType::AuthFailure => "AUTH_FAILURE",
            LogType::DomainOperation => "DOMAIN_OPERATION",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only row of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub correlation_id: CorrelationId,
    pub log_type: LogType,
    pub action: String,
    pub resource: String,
    /// Caller identity descriptor (see `CallerIdentity::descriptor`).
    pub caller: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_payload: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Assigned by the store when the record is persisted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl AuditRecord {
    pub fn new(
        log_type: LogType,
        correlation_id: CorrelationId,
        action: impl Into<String>,
        resource: impl Into<String>,
        caller: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            correlation_id,
            log_type,
            action: action.into(),
            resource: resource.into(),
            caller: caller.into(),
            request_payload: None,
            response_payload: None,
            status_code: None,
            duration_ms: None,
            error_message: None,
            exception_detail: None,
            client_ip: None,
            user_agent: None,
            http_method: None,
            endpoint: None,
            created_at: None,
        }
    }
}
