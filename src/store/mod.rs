//! Storage boundary for audit and performance records.
//!
//! # Data Flow
//! ```text
//! AuditRecorder / PerformanceCollector
//!     → writer.rs (bounded queue, one background worker per queue)
//!     → AuditStore / PerformanceStore (durable, append-only)
//!
//! Reporting handlers / AuditTrail / AggregationEngine
//!     → AuditStore::query_audit / PerformanceStore::query_metrics (timestamp descending)
//! ```
//!
//! # Design Decisions
//! - Stores are consumed through narrow async traits; the physical engine is
//!   a deployment choice (`MemoryStore` ships with the crate)
//! - Writes are append-only; the store assigns `created_at` to audit rows
//! - Failures are values (`StoreError`), never panics

pub mod memory;
pub mod writer;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};

use crate::audit::record::{AuditRecord, LogType};
use crate::http::correlation::CorrelationId;
use crate::performance::record::{PerformanceCategory, PerformanceRecord};

pub use memory::MemoryStore;
pub use writer::{BackgroundWriter, RecordSink, SubmitError, WriterSettings};

/// Failure at the persistence boundary.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("store write timed out after {0:?}")]
    Timeout(Duration),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Failure while reading or aggregating stored records.
///
/// Distinct from an empty result, which aggregation reports as `Aggregate::NoData`.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("store query failed: {0}")]
    Store(#[from] StoreError),
    #[error("invalid time range: start {start} is after end {end}")]
    InvalidRange {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// Clamp a caller-supplied limit into `[1, max]`, using `default` when absent.
pub fn clamp_limit(requested: Option<usize>, default: usize, max: usize) -> usize {
    let max = max.max(1);
    requested.unwrap_or(default).clamp(1, max)
}

pub(crate) fn check_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), QueryError> {
    if start > end {
        return Err(QueryError::InvalidRange { start, end });
    }
    Ok(())
}

/// The instant `days` days before now, or `None` when that predates what `DateTime` can hold.
pub fn cutoff_days_ago(days: u32) -> Option<DateTime<Utc>> {
    TimeDelta::try_days(i64::from(days)).and_then(|age| Utc::now().checked_sub_signed(age))
}

/// Append-only audit trail (`audit_log`).
#[async_trait]
pub trait AuditStore: Send + Sync {
    async fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError>;

    /// Matching records, timestamp descending, at most `query.limit` of them.
    async fn query_audit(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError>;

    /// All records for one request, oldest first.
    async fn audit_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<AuditRecord>, StoreError>;

    async fn count_audit(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError>;

    /// Remove records older than `cutoff`; returns how many were removed.
    async fn delete_audit_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Append-only performance records (`performance_metric`).
#[async_trait]
pub trait PerformanceStore: Send + Sync {
    async fn append_metric(&self, record: &PerformanceRecord) -> Result<(), StoreError>;

    /// Matching records, timestamp descending, at most `query.limit` of them.
    async fn query_metrics(&self, query: &MetricQuery)
        -> Result<Vec<PerformanceRecord>, StoreError>;

    async fn count_metrics(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError>;

    /// Remove records older than `cutoff`; returns how many were removed.
    async fn delete_metrics_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Filter over performance records. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricQuery {
    pub endpoint: Option<String>,
    pub action: Option<String>,
    pub category: Option<PerformanceCategory>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl MetricQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    pub fn category(mut self, category: PerformanceCategory) -> Self {
        self.category = Some(category);
        self
    }

    /// Inclusive time range.
    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &PerformanceRecord) -> bool {
        self.endpoint.as_ref().map_or(true, |e| &record.endpoint == e)
            && self.action.as_ref().map_or(true, |a| &record.action == a)
            && self.category.map_or(true, |c| record.performance_category == c)
            && self.start.map_or(true, |s| record.timestamp >= s)
            && self.end.map_or(true, |e| record.timestamp <= e)
    }
}

/// Filter over audit records. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditQuery {
    pub action: Option<String>,
    pub caller: Option<String>,
    pub log_type: Option<LogType>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Exact caller descriptor, e.g. `user:alice (roles: reader)`.
    pub fn caller(mut self, caller: impl Into<String>) -> Self {
        self.caller = Some(caller.into());
        self
    }

    pub fn log_type(mut self, log_type: LogType) -> Self {
        self.log_type = Some(log_type);
        self
    }

    /// Inclusive time range.
    pub fn between(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = Some(start);
        self.end = Some(end);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, record: &AuditRecord) -> bool {
        self.action.as_ref().map_or(true, |a| &record.action == a)
            && self.caller.as_ref().map_or(true, |c| &record.caller == c)
            && self.log_type.map_or(true, |t| record.log_type == t)
            && self.start.map_or(true, |s| record.timestamp >= s)
            && self.end.map_or(true, |e| record.timestamp <= e)
    }
}
