//! Read and maintenance access to the stored audit trail.
//!
//! # Design Decisions
//! - Listings are timestamp descending except the per-request view, which
//!   reads oldest first so the events replay in order
//! - Limits are clamped the same way as performance reads

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::audit::record::{AuditRecord, LogType};
use crate::http::correlation::CorrelationId;
use crate::store::{check_range, clamp_limit, AuditQuery, AuditStore, QueryError};

#[derive(Clone)]
pub struct AuditTrail {
    store: Arc<dyn AuditStore>,
    default_limit: usize,
    max_limit: usize,
}

impl AuditTrail {
    pub fn new(store: Arc<dyn AuditStore>, default_limit: usize, max_limit: usize) -> Self {
        Self {
            store,
            default_limit,
            max_limit,
        }
    }

    fn limit(&self, requested: Option<usize>) -> usize {
        clamp_limit(requested, self.default_limit, self.max_limit)
    }

    async fn query(&self, query: AuditQuery) -> Result<Vec<AuditRecord>, QueryError> {
        Ok(self.store.query_audit(&query).await?)
    }

    pub async fn latest(&self, limit: Option<usize>) -> Result<Vec<AuditRecord>, QueryError> {
        self.query(AuditQuery::new().limit(self.limit(limit))).await
    }

    /// The first `limit` events of one request, oldest first.
    pub async fn by_correlation(
        &self,
        correlation_id: &CorrelationId,
        limit: Option<usize>,
    ) -> Result<Vec<AuditRecord>, QueryError> {
        let mut records = self.store.audit_by_correlation(correlation_id).await?;
        records.truncate(self.limit(limit));
        Ok(records)
    }

    pub async fn by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditRecord>, QueryError> {
        check_range(start, end)?;
        self.query(AuditQuery::new().between(start, end).limit(self.limit(limit)))
            .await
    }

    pub async fn by_action(
        &self,
        action: &str,
        limit: Option<usize>,
    ) -> Result<Vec<AuditRecord>, QueryError> {
        self.query(AuditQuery::new().action(action).limit(self.limit(limit)))
            .await
    }

    pub async fn by_caller(
        &self,
        caller: &str,
        limit: Option<usize>,
    ) -> Result<Vec<AuditRecord>, QueryError> {
        self.query(AuditQuery::new().caller(caller).limit(self.limit(limit)))
            .await
    }

    /// ERROR events inside `[start, end]`.
    pub async fn errors(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<AuditRecord>, QueryError> {
        check_range(start, end)?;
        let query = AuditQuery::new()
            .log_type(LogType::Error)
            .between(start, end)
            .limit(self.limit(limit));
        self.query(query).await
    }

    pub async fn count(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<u64, QueryError> {
        if let (Some(start), Some(end)) = (start, end) {
            check_range(start, end)?;
        }
        Ok(self.store.count_audit(start, end).await?)
    }

    /// Delete records older than `cutoff`.
    pub async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64, QueryError> {
        let removed = self.store.delete_audit_before(cutoff).await?;
        tracing::info!(cutoff = %cutoff, removed, "Removed old audit records");
        Ok(removed)
    }
}
