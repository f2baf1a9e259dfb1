//! Request observation middleware.
//!
//! # Responsibilities
//! - Assign the correlation identifier and echo it on the response
//! - Build the `RequestContext` and place it in request extensions
//! - Capture request and response bodies
//! - Fire audit and performance records once the response body is done
//!
//! # Design Decisions
//! - The REQUEST record is submitted after the handler returns so it carries
//!   the caller identity; it keeps the arrival timestamp
//! - Recording never changes the status, headers (other than the correlation
//!   header) or body bytes the client receives
//! - A panicking handler is recorded, then the panic continues to the outer
//!   panic-catching layer
//! - A request abandoned by the client before the handler returned is still
//!   recorded, from a drop guard, with status 499

use std::any::Any;
use std::panic::AssertUnwindSafe;

use axum::body::Body;
use axum::extract::{MatchedPath, State};
use axum::http::{HeaderName, Request};
use axum::middleware::Next;
use axum::response::Response;
use futures_util::FutureExt;

use crate::audit::{AuditRecorder, ErrorInfo, Payload};
use crate::http::capture::{
    capture_request, content_length, tap_response, CaptureOutcome, CapturedResponse, Unavailable,
};
use crate::http::context::RequestContext;
use crate::http::correlation::CorrelationId;
use crate::http::error::ErrorDetail;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::performance::{PerformanceCollector, RequestSample};
use crate::security::identity::{describe, CallerIdentity};

/// Segment-aware prefix match: `/health` skips `/health` and `/health/live`, not `/healthz`.
pub fn is_skipped(path: &str, skip_paths: &[String]) -> bool {
    skip_paths.iter().any(|prefix| {
        let prefix = prefix.trim_end_matches('/');
        path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Resource name for a route: its first segment after an optional `api` prefix.
fn resource_of(route: &str) -> String {
    route
        .split('/')
        .filter(|s| !s.is_empty())
        .find(|s| !s.eq_ignore_ascii_case("api"))
        .unwrap_or("root")
        .to_string()
}

fn with_correlation(
    mut response: Response,
    header: &HeaderName,
    correlation_id: &CorrelationId,
) -> Response {
    if let Some(value) = correlation_id.header_value() {
        response.headers_mut().insert(header.clone(), value);
    }
    response
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_string())
}

/// Status recorded for requests the client abandoned before a response existed.
pub const CLIENT_CLOSED_REQUEST: u16 = 499;

/// Everything needed to record one request after its response is done.
///
/// Exactly one of `finish`, `panicked` or the drop guard records the outcome.
struct Observation {
    audit: Option<AuditRecorder>,
    performance: Option<PerformanceCollector>,
    ctx: RequestContext,
    action: String,
    resource: String,
    request_payload: Payload,
    request_size: Option<u64>,
    settled: bool,
}

impl Observation {
    fn record_request(&self, caller: Option<&CallerIdentity>) {
        if let Some(audit) = &self.audit {
            audit.record_request(
                &self.ctx,
                caller,
                &self.action,
                &self.resource,
                &self.request_payload,
            );
        }
    }

    fn sample(&self, caller: Option<&CallerIdentity>, status: u16) -> RequestSample {
        let mut sample = RequestSample::new(
            self.ctx.path.clone(),
            self.ctx.method.clone(),
            status,
            self.ctx.started.elapsed(),
        );
        sample.action = self.action.clone();
        sample.timestamp = self.ctx.received_at;
        sample.request_size_bytes = self.request_size;
        sample.correlation_id = Some(self.ctx.correlation_id.clone());
        sample.caller = Some(describe(caller));
        sample.client_ip = self.ctx.client_ip.clone();
        sample.user_agent = self.ctx.user_agent.clone();
        sample
    }

    /// Record a request whose handler never produced a response.
    fn abort(&mut self, status: u16, error: ErrorInfo) {
        self.settled = true;
        let elapsed = self.ctx.started.elapsed();
        self.record_request(None);
        if let Some(audit) = &self.audit {
            audit.record_error(
                &self.ctx,
                None,
                &self.action,
                &self.resource,
                &error,
                &self.request_payload,
            );
        }
        if let Some(performance) = &self.performance {
            performance.record(self.sample(None, status));
        }
        metrics::record_request(&self.ctx.method, status, elapsed);
    }

    /// The outer panic-catching layer answers 500, so a RESPONSE row is written too.
    fn panicked(&mut self, message: String) {
        self.abort(500, ErrorInfo::new(message).with_detail("handler panicked"));
        if let Some(audit) = &self.audit {
            audit.record_response(
                &self.ctx,
                None,
                &self.action,
                &self.resource,
                &Payload::none(),
                500,
                self.ctx.started.elapsed(),
            );
        }
    }

    fn finish(
        mut self,
        caller: Option<CallerIdentity>,
        error: Option<ErrorInfo>,
        status: u16,
        captured: CapturedResponse,
    ) {
        self.settled = true;
        let elapsed = self.ctx.started.elapsed();
        if !captured.complete {
            tracing::debug!(
                correlation_id = %self.ctx.correlation_id,
                bytes_sent = captured.total_bytes,
                "Response body not fully delivered"
            );
        }

        let error = error.or_else(|| {
            captured
                .stream_error
                .as_ref()
                .map(|e| ErrorInfo::new(format!("response body stream failed: {}", e)))
        });

        if let Some(audit) = &self.audit {
            if let Some(error) = &error {
                audit.record_error(
                    &self.ctx,
                    caller.as_ref(),
                    &self.action,
                    &self.resource,
                    error,
                    &self.request_payload,
                );
            }
            audit.record_response(
                &self.ctx,
                caller.as_ref(),
                &self.action,
                &self.resource,
                &Payload::captured(&captured.body),
                status,
                elapsed,
            );
        }

        if let Some(performance) = &self.performance {
            let mut sample = self.sample(caller.as_ref(), status);
            sample.elapsed = elapsed;
            sample.response_size_bytes = Some(captured.total_bytes);
            performance.record(sample);
        }

        metrics::record_request(&self.ctx.method, status, elapsed);
    }
}

impl Drop for Observation {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        tracing::debug!(
            correlation_id = %self.ctx.correlation_id,
            action = %self.action,
            "Request cancelled before the handler returned"
        );
        self.abort(
            CLIENT_CLOSED_REQUEST,
            ErrorInfo::new("request cancelled")
                .with_detail("client disconnected before the handler completed"),
        );
    }
}

/// Observation middleware; install with `axum::middleware::from_fn_with_state`.
pub async fn observe(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let correlation_id =
        CorrelationId::obtain_or_create(req.headers().get(&state.correlation_header));
    let ctx = RequestContext::from_request(&req, correlation_id);
    req.extensions_mut().insert(ctx.clone());

    let config = &state.config;
    let skipped = is_skipped(&ctx.path, &config.audit.skip_paths);
    let audit_on = config.audit.enabled && !skipped;
    let performance_on = config.performance.enabled && !skipped;

    if !audit_on && !performance_on {
        let response = next.run(req).await;
        metrics::record_request(&ctx.method, response.status().as_u16(), ctx.started.elapsed());
        return with_correlation(response, &state.correlation_header, &ctx.correlation_id);
    }

    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| ctx.path.clone());
    let request_size = content_length(req.headers());

    // Built before the body is read so a cancellation from here on is recorded.
    let mut observation = Observation {
        audit: audit_on.then(|| state.audit.clone()),
        performance: performance_on.then(|| state.performance.clone()),
        action: format!("{} {}", ctx.method, route),
        resource: resource_of(&route),
        request_payload: Payload::none(),
        request_size,
        ctx,
        settled: false,
    };

    let (req, captured_request) = if audit_on {
        capture_request(req, config.capture.max_request_bytes).await
    } else {
        (req, CaptureOutcome::Unavailable(Unavailable::UnknownLength))
    };
    match &captured_request {
        CaptureOutcome::Captured(bytes) => observation.request_payload = Payload::captured(bytes),
        CaptureOutcome::Unavailable(reason) => tracing::trace!(
            correlation_id = %observation.ctx.correlation_id,
            ?reason,
            "Request body not captured"
        ),
    }

    let response = match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(response) => response,
        Err(panic) => {
            observation.panicked(panic_message(panic.as_ref()));
            std::panic::resume_unwind(panic);
        }
    };

    let caller = response.extensions().get::<CallerIdentity>().cloned();
    let error = response.extensions().get::<ErrorDetail>().map(|d| d.0.clone());
    let status = response.status().as_u16();
    observation.record_request(caller.as_ref());

    let response = with_correlation(
        response,
        &state.correlation_header,
        &observation.ctx.correlation_id,
    );
    let limit = if audit_on {
        config.capture.max_response_bytes
    } else {
        0
    };
    tap_response(response, limit, move |captured| {
        observation.finish(caller, error, status, captured)
    })
}
