use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::AuditRecord;
use crate::http::correlation::CorrelationId;
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::performance::aggregation::{EndpointErrorRate, EndpointSummary, OverallSummary, SlowEndpoint};
use crate::performance::{Aggregate, PerformanceCategory, PerformanceRecord};
use crate::security::CallerIdentity;
use crate::store::{clamp_limit, cutoff_days_ago};

/// Window used by summaries when the caller gives no range.
const DEFAULT_WINDOW_HOURS: i64 = 24;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub generated_at: DateTime<Utc>,
}

impl Metadata {
    fn now() -> Self {
        Self {
            count: None,
            limit: None,
            start: None,
            end: None,
            message: None,
            generated_at: Utc::now(),
        }
    }

    fn window(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }
}

/// Envelope shared by every reporting response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub metadata: Metadata,
}

impl<T> ApiResponse<T> {
    fn ok(data: T, metadata: Metadata) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            metadata,
        })
    }

    fn aggregate(aggregate: Aggregate<T>, metadata: Metadata) -> Json<Self> {
        match aggregate {
            Aggregate::Data(data) => Self::ok(data, metadata),
            Aggregate::NoData => Json(Self {
                success: true,
                data: None,
                metadata: Metadata {
                    message: Some("no data for the requested window".to_string()),
                    ..metadata
                },
            }),
        }
    }
}

type Listing<T> = Result<Json<ApiResponse<Vec<T>>>, ApiError>;

fn listing<T>(data: Vec<T>, limit: usize, metadata: Metadata) -> Json<ApiResponse<Vec<T>>> {
    let metadata = Metadata {
        count: Some(data.len()),
        limit: Some(limit),
        ..metadata
    };
    ApiResponse::ok(data, metadata)
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitParams {
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct EndpointParams {
    pub endpoint: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeParams {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl RangeParams {
    fn resolve(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = self.end.unwrap_or_else(Utc::now);
        let start = self.start.unwrap_or_else(|| {
            end.checked_sub_signed(ChronoDuration::hours(DEFAULT_WINDOW_HOURS))
                .unwrap_or(DateTime::<Utc>::MIN_UTC)
        });
        (start, end)
    }
}

#[derive(Debug, Deserialize)]
pub struct EndpointSummaryParams {
    pub endpoint: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct CleanupParams {
    pub before: Option<DateTime<Utc>>,
    pub older_than_days: Option<u32>,
}

impl CleanupParams {
    fn cutoff(&self) -> Result<DateTime<Utc>, ApiError> {
        match (self.before, self.older_than_days) {
            (Some(before), _) => Ok(before),
            (None, Some(days)) => cutoff_days_ago(days).ok_or_else(|| {
                ApiError::BadRequest(format!("older_than_days {} is out of range", days))
            }),
            (None, None) => Err(ApiError::BadRequest(
                "either before or older_than_days is required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditParams {
    pub correlation_id: Option<String>,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct CallerParams {
    pub caller: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct CountResult {
    pub count: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupResult {
    pub cutoff: DateTime<Utc>,
    pub removed: u64,
}

/// Deleting records needs a known caller even when authentication is optional.
fn require_authenticated(caller: &CallerIdentity) -> Result<(), ApiError> {
    match caller {
        CallerIdentity::Authenticated { .. } => Ok(()),
        CallerIdentity::Unauthenticated => Err(ApiError::Unauthorized(
            "cleanup requires a valid api key".to_string(),
        )),
    }
}

fn limit(state: &AppState, requested: Option<usize>) -> usize {
    clamp_limit(
        requested,
        state.config.performance.default_limit,
        state.config.performance.max_limit,
    )
}

pub async fn get_health() -> Json<HealthStatus> {
    Json(HealthStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "healthy",
    })
}

pub async fn get_latest(
    State(state): State<AppState>,
    Query(params): Query<LimitParams>,
) -> Listing<PerformanceRecord> {
    let limit = limit(&state, params.limit);
    let records = state.performance.latest(Some(limit)).await?;
    Ok(listing(records, limit, Metadata::now()))
}

pub async fn get_by_endpoint(
    State(state): State<AppState>,
    Query(params): Query<EndpointParams>,
) -> Listing<PerformanceRecord> {
    if params.endpoint.trim().is_empty() {
        return Err(ApiError::BadRequest("endpoint must not be empty".to_string()));
    }
    let limit = limit(&state, params.limit);
    let records = state
        .performance
        .by_endpoint(&params.endpoint, Some(limit))
        .await?;
    Ok(listing(records, limit, Metadata::now()))
}

pub async fn get_by_time_range(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Listing<PerformanceRecord> {
    let (start, end) = params.resolve();
    let limit = limit(&state, params.limit);
    let records = state
        .performance
        .by_time_range(start, end, Some(limit))
        .await?;
    Ok(listing(records, limit, Metadata::now().window(start, end)))
}

pub async fn get_by_action(
    State(state): State<AppState>,
    Path(action): Path<String>,
    Query(params): Query<LimitParams>,
) -> Listing<PerformanceRecord> {
    let limit = limit(&state, params.limit);
    let records = state.performance.by_action(&action, Some(limit)).await?;
    Ok(listing(records, limit, Metadata::now()))
}

pub async fn get_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Query(params): Query<LimitParams>,
) -> Listing<PerformanceRecord> {
    let category: PerformanceCategory = category
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{}", e)))?;
    let limit = limit(&state, params.limit);
    let records = state.performance.by_category(category, Some(limit)).await?;
    Ok(listing(records, limit, Metadata::now()))
}

pub async fn get_endpoint_summary(
    State(state): State<AppState>,
    Query(params): Query<EndpointSummaryParams>,
) -> Result<Json<ApiResponse<EndpointSummary>>, ApiError> {
    let (start, end) = RangeParams {
        start: params.start,
        end: params.end,
        limit: None,
    }
    .resolve();
    let summary = state
        .aggregation
        .endpoint_summary(&params.endpoint, start, end)
        .await?;
    Ok(ApiResponse::aggregate(summary, Metadata::now().window(start, end)))
}

pub async fn get_overall_summary(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Result<Json<ApiResponse<OverallSummary>>, ApiError> {
    let (start, end) = params.resolve();
    let summary = state.aggregation.overall_summary(start, end).await?;
    Ok(ApiResponse::aggregate(summary, Metadata::now().window(start, end)))
}

pub async fn get_slowest(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Listing<SlowEndpoint> {
    let (start, end) = params.resolve();
    let ranked = state
        .aggregation
        .slowest_endpoints(start, end, params.limit)
        .await?;
    let metadata = Metadata {
        count: Some(ranked.len()),
        ..Metadata::now().window(start, end)
    };
    Ok(ApiResponse::ok(ranked, metadata))
}

pub async fn get_error_rates(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Listing<EndpointErrorRate> {
    let (start, end) = params.resolve();
    let ranked = state.aggregation.error_rate_by_endpoint(start, end).await?;
    let metadata = Metadata {
        count: Some(ranked.len()),
        ..Metadata::now().window(start, end)
    };
    Ok(ApiResponse::ok(ranked, metadata))
}

pub async fn get_count(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Result<Json<ApiResponse<CountResult>>, ApiError> {
    let count = state.performance.count(params.start, params.end).await?;
    let mut metadata = Metadata::now();
    metadata.start = params.start;
    metadata.end = params.end;
    Ok(ApiResponse::ok(CountResult { count }, metadata))
}

pub async fn delete_old_records(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Query(params): Query<CleanupParams>,
) -> Result<Json<ApiResponse<CleanupResult>>, ApiError> {
    require_authenticated(&caller)?;
    let cutoff = params.cutoff()?;
    let removed = state.performance.cleanup_before(cutoff).await?;
    Ok(ApiResponse::ok(CleanupResult { cutoff, removed }, Metadata::now()))
}

pub async fn get_audit_logs(
    State(state): State<AppState>,
    Query(params): Query<AuditParams>,
) -> Listing<AuditRecord> {
    let limit = limit(&state, params.limit);
    let records = match params.correlation_id.as_deref().filter(|c| !c.is_empty()) {
        Some(id) => {
            state
                .audit_trail
                .by_correlation(&CorrelationId::from(id), Some(limit))
                .await?
        }
        None => state.audit_trail.latest(Some(limit)).await?,
    };
    Ok(listing(records, limit, Metadata::now()))
}

pub async fn get_audit_by_time_range(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Listing<AuditRecord> {
    let (start, end) = params.resolve();
    let limit = limit(&state, params.limit);
    let records = state
        .audit_trail
        .by_time_range(start, end, Some(limit))
        .await?;
    Ok(listing(records, limit, Metadata::now().window(start, end)))
}

pub async fn get_audit_by_action(
    State(state): State<AppState>,
    Path(action): Path<String>,
    Query(params): Query<LimitParams>,
) -> Listing<AuditRecord> {
    let limit = limit(&state, params.limit);
    let records = state.audit_trail.by_action(&action, Some(limit)).await?;
    Ok(listing(records, limit, Metadata::now()))
}

pub async fn get_audit_by_caller(
    State(state): State<AppState>,
    Query(params): Query<CallerParams>,
) -> Listing<AuditRecord> {
    if params.caller.trim().is_empty() {
        return Err(ApiError::BadRequest("caller must not be empty".to_string()));
    }
    let limit = limit(&state, params.limit);
    let records = state
        .audit_trail
        .by_caller(&params.caller, Some(limit))
        .await?;
    Ok(listing(records, limit, Metadata::now()))
}

pub async fn get_audit_errors(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Listing<AuditRecord> {
    let (start, end) = params.resolve();
    let limit = limit(&state, params.limit);
    let records = state.audit_trail.errors(start, end, Some(limit)).await?;
    Ok(listing(records, limit, Metadata::now().window(start, end)))
}

pub async fn get_audit_count(
    State(state): State<AppState>,
    Query(params): Query<RangeParams>,
) -> Result<Json<ApiResponse<CountResult>>, ApiError> {
    let count = state.audit_trail.count(params.start, params.end).await?;
    let mut metadata = Metadata::now();
    metadata.start = params.start;
    metadata.end = params.end;
    Ok(ApiResponse::ok(CountResult { count }, metadata))
}

pub async fn delete_old_audit_logs(
    State(state): State<AppState>,
    Extension(caller): Extension<CallerIdentity>,
    Query(params): Query<CleanupParams>,
) -> Result<Json<ApiResponse<CleanupResult>>, ApiError> {
    require_authenticated(&caller)?;
    let cutoff = params.cutoff()?;
    let removed = state.audit_trail.cleanup_before(cutoff).await?;
    Ok(ApiResponse::ok(CleanupResult { cutoff, removed }, Metadata::now()))
}
