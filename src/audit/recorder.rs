//! Audit recorder: synchronous calls, asynchronous persistence.
//!
//! # Responsibilities
//! - Build one `AuditRecord` per event with the caller descriptor attached
//! - Mask and truncate payloads before they leave the process
//! - Submit the record to the background writer without waiting on the store
//! - Always emit a structured line on the `audit` tracing target
//!
//! # Design Decisions
//! - The log line is written for every event, whether or not the store
//!   accepts the record, so the trail survives a store outage
//! - Delivery to the store is best-effort, at most once

use std::error::Error as StdError;
use std::time::Duration;

use serde::Serialize;

use crate::audit::masking;
use crate::audit::record::{AuditRecord, LogType};
use crate::http::context::RequestContext;
use crate::observability::logging::AUDIT_TARGET;
use crate::security::identity::{describe, CallerIdentity};
use crate::store::BackgroundWriter;

/// A payload ready for the audit trail: serialized and masked, not yet truncated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Payload(Option<String>);

impl Payload {
    pub fn none() -> Self {
        Self(None)
    }

    /// Serialize any value; a value that cannot be serialized becomes `serialization_error`.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        Self(Some(masking::serialize_masked(value)))
    }

    /// Raw captured body bytes, decoded lossily as UTF-8.
    pub fn captured(bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return Self(None);
        }
        Self(Some(masking::mask(&String::from_utf8_lossy(bytes))))
    }

    pub fn as_deref(&self) -> Option<&str> {
        self.0.as_deref()
    }

    fn truncated(&self, max_chars: usize) -> Option<String> {
        self.0.as_deref().map(|text| masking::truncate(text, max_chars))
    }
}

/// Error facts recorded with an ERROR event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorInfo {
    pub message: String,
    pub detail: Option<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Message from `Display`, detail from `Debug` plus the source chain.
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut detail = format!("{:?}", error);
        let mut source = error.source();
        while let Some(cause) = source {
            detail.push_str(&format!("\ncaused by: {}", cause));
            source = cause.source();
        }
        Self {
            message: error.to_string(),
            detail: Some(detail),
        }
    }
}

/// Records audit events for the request path.
#[derive(Clone)]
pub struct AuditRecorder {
    writer: BackgroundWriter<AuditRecord>,
    truncate_chars: usize,
}

impl AuditRecorder {
    pub fn new(writer: BackgroundWriter<AuditRecord>, truncate_chars: usize) -> Self {
        Self {
            writer,
            truncate_chars,
        }
    }

    fn base(
        &self,
        log_type: LogType,
        ctx: &RequestContext,
        caller: &str,
        action: &str,
        resource: &str,
    ) -> AuditRecord {
        let mut record = AuditRecord::new(
            log_type,
            ctx.correlation_id.clone(),
            action,
            resource,
            caller,
        );
        record.client_ip = ctx.client_ip.clone();
        record.user_agent = ctx.user_agent.clone();
        if !ctx.method.is_empty() {
            record.http_method = Some(ctx.method.clone());
            record.endpoint = Some(ctx.path.clone());
        }
        record
    }

    fn dispatch(&self, record: AuditRecord) {
        // Rejections are logged by the writer.
        let _ = self.writer.submit(record);
    }

    /// The record is stamped with the request's arrival time, so it may be
    /// submitted after the handler has identified the caller.
    pub fn record_request(
        &self,
        ctx: &RequestContext,
        caller: Option<&CallerIdentity>,
        action: &str,
        resource: &str,
        payload: &Payload,
    ) {
        let caller = describe(caller);
        let mut record = self.base(LogType::Request, ctx, &caller, action, resource);
        record.timestamp = ctx.received_at;
        record.request_payload = payload.truncated(self.truncate_chars);

        tracing::info!(
            target: AUDIT_TARGET,
            log_type = %record.log_type,
            correlation_id = %ctx.correlation_id,
            action,
            resource,
            caller = %caller,
            request = record.request_payload.as_deref().unwrap_or("null"),
            "API request"
        );
        self.dispatch(record);
    }

    #[allow(clippy::too_many_arguments)]
    pub fn record_response(
        &self,
        ctx: &RequestContext,
        caller: Option<&CallerIdentity>,
        action: &str,
        resource: &str,
        payload: &Payload,
        status_code: u16,
        duration: Duration,
    ) {
        let caller = describe(caller);
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let mut record = self.base(LogType::Response, ctx, &caller, action, resource);
        record.response_payload = payload.truncated(self.truncate_chars);
        record.status_code = Some(status_code);
        record.duration_ms = Some(duration_ms);

        let response = record.response_payload.as_deref().unwrap_or("null");
        if (200..300).contains(&status_code) {
            tracing::info!(
                target: AUDIT_TARGET,
                log_type = %record.log_type,
                correlation_id = %ctx.correlation_id,
                action,
                resource,
                caller = %caller,
                status = status_code,
                duration_ms,
                response,
                "API response"
            );
        } else {
            tracing::warn!(
                target: AUDIT_TARGET,
                log_type = %record.log_type,
                correlation_id = %ctx.correlation_id,
                action,
                resource,
                caller = %caller,
                status = status_code,
                duration_ms,
                response,
                "API response"
            );
        }
        self.dispatch(record);
    }

    pub fn record_error(
        &self,
        ctx: &RequestContext,
        caller: Option<&CallerIdentity>,
        action: &str,
        resource: &str,
        error: &ErrorInfo,
        payload: &Payload,
    ) {
        let caller = describe(caller);
        let mut record = self.base(LogType::Error, ctx, &caller, action, resource);
        record.request_payload = payload.truncated(self.truncate_chars);
        record.error_message = Some(error.message.clone());
        record.exception_detail = error.detail.clone();
        record.duration_ms = Some(ctx.elapsed_ms());

        tracing::error!(
            target: AUDIT_TARGET,
            log_type = %record.log_type,
            correlation_id = %ctx.correlation_id,
            action,
            resource,
            caller = %caller,
            error = %error.message,
            request = record.request_payload.as_deref().unwrap_or("null"),
            "API error"
        );
        self.dispatch(record);
    }

    pub fn record_auth_success(&self, ctx: &RequestContext, caller: &CallerIdentity, action: &str) {
        let caller = caller.descriptor();
        let record = self.base(LogType::AuthSuccess, ctx, &caller, action, "Authentication");

        tracing::info!(
            target: AUDIT_TARGET,
            log_type = %record.log_type,
            correlation_id = %ctx.correlation_id,
            action,
            caller = %caller,
            "Authentication success"
        );
        self.dispatch(record);
    }

    pub fn record_auth_failure(&self, ctx: &RequestContext, action: &str, reason: &str) {
        let caller = CallerIdentity::Unauthenticated.descriptor();
        let mut record = self.base(LogType::AuthFailure, ctx, &caller, action, "Authentication");
        record.error_message = Some(reason.to_string());

        tracing::warn!(
            target: AUDIT_TARGET,
            log_type = %record.log_type,
            correlation_id = %ctx.correlation_id,
            action,
            reason,
            "Authentication failure"
        );
        self.dispatch(record);
    }

    /// Record a call into the directory backend made on behalf of `caller`.
    #[allow(clippy::too_many_arguments)]
    pub fn record_domain_operation(
        &self,
        ctx: &RequestContext,
        caller: Option<&CallerIdentity>,
        operation: &str,
        target: &str,
        success: bool,
        duration: Duration,
        error_message: Option<&str>,
    ) {
        let caller = describe(caller);
        let duration_ms = duration.as_secs_f64() * 1000.0;
        let mut record = self.base(LogType::DomainOperation, ctx, &caller, operation, target);
        record.duration_ms = Some(duration_ms);
        record.error_message = error_message.map(str::to_string);

        if success {
            tracing::info!(
                target: AUDIT_TARGET,
                log_type = %record.log_type,
                correlation_id = %ctx.correlation_id,
                operation,
                target_object = target,
                caller = %caller,
                duration_ms,
                "Directory operation succeeded"
            );
        } else {
            tracing::error!(
                target: AUDIT_TARGET,
                log_type = %record.log_type,
                correlation_id = %ctx.correlation_id,
                operation,
                target_object = target,
                caller = %caller,
                duration_ms,
                error = error_message.unwrap_or("unknown"),
                "Directory operation failed"
            );
        }
        self.dispatch(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::correlation::CorrelationId;
    use crate::store::{AuditStore, MemoryStore, WriterSettings};
    use serde_json::json;
    use std::sync::Arc;
    use tokio::sync::broadcast;

    async fn recorder_with_store(
        truncate_chars: usize,
    ) -> (AuditRecorder, Arc<MemoryStore>, tokio::task::JoinHandle<()>) {
        let store = Arc::new(MemoryStore::new());
        let sink: Arc<dyn AuditStore> = store.clone();
        let (tx, _) = broadcast::channel(1);
        let (writer, handle) =
            BackgroundWriter::spawn("audit", sink, WriterSettings::default(), tx.subscribe());
        (AuditRecorder::new(writer, truncate_chars), store, handle)
    }

    #[tokio::test]
    async fn test_request_payload_is_masked_and_stored() {
        let (recorder, store, handle) = recorder_with_store(4000).await;
        let ctx = RequestContext::detached(CorrelationId::from("corr-1"));
        let caller = CallerIdentity::authenticated("alice", vec!["reader".into()]);

        recorder.record_request(
            &ctx,
            Some(&caller),
            "CreateUser",
            "Users",
            &Payload::json(&json!({"password": "secret123", "name": "bob"})),
        );
        drop(recorder);
        handle.await.unwrap();

        let rows = store.audit_by_correlation(&ctx.correlation_id).await.unwrap();
        assert_eq!(rows.len(), 1);
        let payload = rows[0].request_payload.as_deref().unwrap();
        assert!(!payload.contains("secret123"));
        assert!(payload.contains(r#""name":"bob""#));
        assert_eq!(rows[0].caller, "user:alice (roles: reader)");
        assert_eq!(rows[0].log_type, LogType::Request);
    }

    #[tokio::test]
    async fn test_response_payload_truncated() {
        let (recorder, store, handle) = recorder_with_store(10).await;
        let ctx = RequestContext::detached(CorrelationId::from("corr-2"));

        recorder.record_response(
            &ctx,
            None,
            "ListGroups",
            "Groups",
            &Payload::captured("x".repeat(50).as_bytes()),
            200,
            Duration::from_millis(12),
        );
        drop(recorder);
        handle.await.unwrap();

        let rows = store.audit_by_correlation(&ctx.correlation_id).await.unwrap();
        assert_eq!(
            rows[0].response_payload.as_deref(),
            Some("xxxxxxxxxx...truncated")
        );
        assert_eq!(rows[0].status_code, Some(200));
        assert_eq!(rows[0].caller, "unknown");
    }

    #[tokio::test]
    async fn test_error_auth_and_domain_events() {
        let (recorder, store, handle) = recorder_with_store(4000).await;
        let ctx = RequestContext::detached(CorrelationId::from("corr-3"));
        let io = std::io::Error::new(std::io::ErrorKind::Other, "ldap down");

        recorder.record_error(
            &ctx,
            None,
            "GetUser",
            "Users",
            &ErrorInfo::from_error(&io),
            &Payload::none(),
        );
        recorder.record_auth_failure(&ctx, "Authenticate", "invalid api key");
        recorder.record_auth_success(
            &ctx,
            &CallerIdentity::authenticated("svc", vec![]),
            "Authenticate",
        );
        recorder.record_domain_operation(
            &ctx,
            Some(&CallerIdentity::authenticated("svc", vec!["reader".into()])),
            "SearchUsers",
            "OU=People",
            false,
            Duration::from_millis(40),
            Some("timeout"),
        );
        drop(recorder);
        handle.await.unwrap();

        let rows = store.audit_by_correlation(&ctx.correlation_id).await.unwrap();
        let types: Vec<_> = rows.iter().map(|r| r.log_type).collect();
        assert_eq!(
            types,
            vec![
                LogType::Error,
                LogType::AuthFailure,
                LogType::AuthSuccess,
                LogType::DomainOperation
            ]
        );
        assert_eq!(rows[0].error_message.as_deref(), Some("ldap down"));
        assert!(rows[0].exception_detail.is_some());
        assert_eq!(rows[1].caller, "unauthenticated");
        assert_eq!(rows[3].error_message.as_deref(), Some("timeout"));
        assert_eq!(rows[3].caller, "user:svc (roles: reader)");
    }

    #[test]
    fn test_payload_constructors() {
        assert_eq!(Payload::captured(b"").as_deref(), None);
        assert_eq!(
            Payload::captured(br#"{"token":"t"}"#).as_deref(),
            Some(r#"{"token":"***MASKED***"}"#)
        );
    }
}
