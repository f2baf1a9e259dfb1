//! Per-request context threaded through the pipeline.
//!
//! Created once at request entry by the observation middleware and inserted
//! into the request extensions; handlers take it with `Extension<RequestContext>`.

use std::net::SocketAddr;
use std::time::Instant;

use axum::extract::ConnectInfo;
use axum::http::{header, HeaderMap, Request};
use chrono::{DateTime, Utc};

use crate::http::correlation::CorrelationId;

const CLIENT_IP_HEADERS: [&str; 3] = ["x-forwarded-for", "x-real-ip", "x-client-ip"];

/// Immutable facts about one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: CorrelationId,
    pub method: String,
    pub path: String,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub received_at: DateTime<Utc>,
    pub started: Instant,
}

impl RequestContext {
    pub fn from_request<B>(req: &Request<B>, correlation_id: CorrelationId) -> Self {
        let peer = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);

        Self {
            correlation_id,
            method: req.method().to_string(),
            path: req.uri().path().to_string(),
            client_ip: client_ip(req.headers(), peer),
            user_agent: req
                .headers()
                .get(header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string),
            received_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Context for work that does not originate from an HTTP request.
    pub fn detached(correlation_id: CorrelationId) -> Self {
        Self {
            correlation_id,
            method: String::new(),
            path: String::new(),
            client_ip: None,
            user_agent: None,
            received_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Milliseconds elapsed since the request arrived.
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

/// Resolve the originating client address.
///
/// Forwarding headers are consulted in order (`X-Forwarded-For` first entry,
/// `X-Real-IP`, `X-Client-IP`) before falling back to the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> Option<String> {
    CLIENT_IP_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
        .filter_map(|value| value.split(',').next().map(str::trim))
        .find(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
}
