//! Reporting API over stored performance and audit records.
//!
//! # Routes
//! ```text
//! GET    /api/performance-metrics/latest
//! GET    /api/performance-metrics/endpoint?endpoint=
//! GET    /api/performance-metrics/timerange?start=&end=
//! GET    /api/performance-metrics/action/{action}
//! GET    /api/performance-metrics/category/{category}
//! GET    /api/performance-metrics/summary/endpoint?endpoint=&start=&end=
//! GET    /api/performance-metrics/summary/overall?start=&end=
//! GET    /api/performance-metrics/slowest?start=&end=&limit=
//! GET    /api/performance-metrics/errors?start=&end=
//! GET    /api/performance-metrics/count?start=&end=
//! DELETE /api/performance-metrics/cleanup?before=|older_than_days=
//! GET    /api/audit-logs?correlation_id=&limit=
//! GET    /api/audit-logs/timerange?start=&end=&limit=
//! GET    /api/audit-logs/action/{action}
//! GET    /api/audit-logs/caller?caller=
//! GET    /api/audit-logs/errors?start=&end=&limit=
//! GET    /api/audit-logs/count?start=&end=
//! DELETE /api/audit-logs/cleanup?before=|older_than_days=
//! ```
//!
//! Every response uses the `{ success, data, metadata }` envelope. A store
//! failure answers 503 with `success: false`. The cleanup routes answer 401
//! unless the caller presented a valid API key.

pub mod handlers;

use axum::routing::{delete, get};
use axum::Router;

use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_reporting_router(state: AppState) -> Router {
    let metrics = Router::new()
        .route("/latest", get(get_latest))
        .route("/endpoint", get(get_by_endpoint))
        .route("/timerange", get(get_by_time_range))
        .route("/action/{action}", get(get_by_action))
        .route("/category/{category}", get(get_by_category))
        .route("/summary/endpoint", get(get_endpoint_summary))
        .route("/summary/overall", get(get_overall_summary))
        .route("/slowest", get(get_slowest))
        .route("/errors", get(get_error_rates))
        .route("/count", get(get_count))
        .route("/cleanup", delete(delete_old_records));

    let audit = Router::new()
        .route("/", get(get_audit_logs))
        .route("/timerange", get(get_audit_by_time_range))
        .route("/action/{action}", get(get_audit_by_action))
        .route("/caller", get(get_audit_by_caller))
        .route("/errors", get(get_audit_errors))
        .route("/count", get(get_audit_count))
        .route("/cleanup", delete(delete_old_audit_logs));

    Router::new()
        .nest("/api/performance-metrics", metrics)
        .nest("/api/audit-logs", audit)
        .with_state(state)
}
