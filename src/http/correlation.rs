//! Correlation identifier handling.
//!
//! # Responsibilities
//! - Reuse an inbound correlation identifier verbatim when the caller sends one
//! - Generate a fresh identifier (UUID v4, hex form) otherwise
//! - Provide the header value echoed on every response
//!
//! # Design Decisions
//! - Identifier is assigned once per request and never changes afterwards
//! - Header values that are not visible ASCII count as absent

use std::fmt;

use axum::http::HeaderValue;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default header used to carry the correlation identifier.
pub const X_CORRELATION_ID: &str = "x-correlation-id";

/// Opaque identifier linking every record produced for one inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new globally unique identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Reuse the inbound header value if present and non-empty, otherwise generate one.
    pub fn obtain_or_create(inbound: Option<&HeaderValue>) -> Self {
        inbound
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(|v| Self(v.to_string()))
            .unwrap_or_else(Self::generate)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Header value for the outbound response.
    pub fn header_value(&self) -> Option<HeaderValue> {
        HeaderValue::from_str(&self.0).ok()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}
