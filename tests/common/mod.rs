//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use directory_observability::audit::{AuditRecord, AuditRecorder};
use directory_observability::config::{ApiKeyConfig, AppConfig};
use directory_observability::http::{ApiError, CorrelationId, RequestContext};
use directory_observability::performance::PerformanceRecord;
use directory_observability::security::CallerIdentity;
use directory_observability::store::{
    AuditQuery, AuditStore, MemoryStore, MetricQuery, PerformanceStore, StoreError,
};
use directory_observability::{HttpServer, Pipeline};

/// A running pipeline plus the router that fronts it.
pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub pipeline: Pipeline,
}

pub const ADMIN_KEY: &str = "key-admin";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.audit.queue_capacity = 8192;
    config
}

/// Optional authentication with one known key, `ADMIN_KEY`.
pub fn config_with_admin_key() -> AppConfig {
    let mut config = test_config();
    config.auth.api_keys = vec![ApiKeyConfig {
        key: ADMIN_KEY.into(),
        principal: "ops".into(),
        roles: vec!["admin".into()],
    }];
    config
}

/// Start the pipeline over a fresh `MemoryStore` with the demo directory routes mounted.
pub fn spawn_app(config: AppConfig) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let pipeline = Pipeline::start(config, store.clone(), store.clone());
    let state = pipeline.state();
    let router = HttpServer::build_router(state.clone(), directory_routes(state.audit.clone()));
    TestApp {
        router,
        store,
        pipeline,
    }
}

/// Start the pipeline over stores that reject every call.
pub fn spawn_app_with_failing_store(config: AppConfig) -> (Router, Pipeline) {
    let failing = Arc::new(FailingStore);
    let pipeline = Pipeline::start(config, failing.clone(), failing);
    let state = pipeline.state();
    let router = HttpServer::build_router(state.clone(), directory_routes(state.audit.clone()));
    (router, pipeline)
}

/// A small stand-in for the directory API.
pub fn directory_routes(audit: AuditRecorder) -> Router {
    Router::new()
        .route("/api/users", post(create_user))
        .route("/api/users/{id}", get(get_user))
        .route("/api/groups/export", get(export_groups))
        .route("/api/boom", get(boom))
        .route("/api/users/search/slow", get(slow_search))
        .with_state(audit)
}

async fn create_user(
    State(audit): State<AuditRecorder>,
    Extension(ctx): Extension<RequestContext>,
    Extension(caller): Extension<CallerIdentity>,
    body: Bytes,
) -> Response {
    audit.record_domain_operation(
        &ctx,
        Some(&caller),
        "CreateUser",
        "CN=Users",
        true,
        Duration::from_millis(3),
        None,
    );
    (
        StatusCode::CREATED,
        [("content-type", "application/json")],
        body,
    )
        .into_response()
}

async fn get_user(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    if id == "missing" {
        return Err(ApiError::NotFound(format!("user {}", id)));
    }
    Ok(Json(json!({ "id": id, "name": "bob", "token": "abc" })))
}

async fn export_groups() -> Response {
    let chunks: Vec<Result<Bytes, std::io::Error>> = (0..5)
        .map(|i| Ok(Bytes::from(format!("group-{};", i))))
        .collect();
    Response::new(Body::from_stream(futures_util::stream::iter(chunks)))
}

async fn slow_search() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "[]"
}

async fn boom() -> &'static str {
    panic!("directory backend exploded");
}

pub struct FailingStore;

#[async_trait]
impl AuditStore for FailingStore {
    async fn append_audit(&self, _record: &AuditRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("audit store offline".into()))
    }

    async fn query_audit(&self, _query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        Err(StoreError::Unavailable("audit store offline".into()))
    }

    async fn audit_by_correlation(
        &self,
        _correlation_id: &CorrelationId,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        Err(StoreError::Unavailable("audit store offline".into()))
    }

    async fn count_audit(
        &self,
        _start: Option<DateTime<Utc>>,
        _end: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("audit store offline".into()))
    }

    async fn delete_audit_before(&self, _cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("audit store offline".into()))
    }
}

#[async_trait]
impl PerformanceStore for FailingStore {
    async fn append_metric(&self, _record: &PerformanceRecord) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("performance store offline".into()))
    }

    async fn query_metrics(
        &self,
        _query: &MetricQuery,
    ) -> Result<Vec<PerformanceRecord>, StoreError> {
        Err(StoreError::Unavailable("performance store offline".into()))
    }

    async fn count_metrics(
        &self,
        _start: Option<DateTime<Utc>>,
        _end: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("performance store offline".into()))
    }

    async fn delete_metrics_before(&self, _cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        Err(StoreError::Unavailable("performance store offline".into()))
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Read a response body to completion, which also fires the response tap.
pub async fn body_bytes(response: Response) -> Bytes {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

/// Run `f` with a timeout so a hung pipeline fails the test instead of stalling it.
pub async fn within<F: Future>(f: F) -> F::Output {
    tokio::time::timeout(Duration::from_secs(10), f)
        .await
        .expect("test timed out")
}
