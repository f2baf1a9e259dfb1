//! In-process store implementing both record tables.

use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::audit::record::AuditRecord;
use crate::http::correlation::CorrelationId;
use crate::performance::record::PerformanceRecord;
use crate::store::{AuditQuery, AuditStore, MetricQuery, PerformanceStore, StoreError};

/// Append-only store held in memory.
///
/// Rows are kept in insertion order; reads sort by timestamp.
#[derive(Debug, Default)]
pub struct MemoryStore {
    audit: RwLock<Vec<AuditRecord>>,
    metrics: RwLock<Vec<PerformanceRecord>>,
}

fn poisoned(table: &str) -> StoreError {
    StoreError::Unavailable(format!("{} table lock poisoned", table))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored audit rows.
    pub fn audit_len(&self) -> usize {
        self.audit.read().map(|rows| rows.len()).unwrap_or(0)
    }

    /// Number of stored performance rows.
    pub fn metrics_len(&self) -> usize {
        self.metrics.read().map(|rows| rows.len()).unwrap_or(0)
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit(&self, record: &AuditRecord) -> Result<(), StoreError> {
        let mut row = record.clone();
        row.created_at = Some(Utc::now());
        self.audit.write().map_err(|_| poisoned("audit_log"))?.push(row);
        Ok(())
    }

    async fn query_audit(&self, query: &AuditQuery) -> Result<Vec<AuditRecord>, StoreError> {
        let rows = self.audit.read().map_err(|_| poisoned("audit_log"))?;
        let mut out: Vec<_> = rows.iter().filter(|r| query.matches(r)).cloned().collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn audit_by_correlation(
        &self,
        correlation_id: &CorrelationId,
    ) -> Result<Vec<AuditRecord>, StoreError> {
        let rows = self.audit.read().map_err(|_| poisoned("audit_log"))?;
        let mut out: Vec<_> = rows
            .iter()
            .filter(|r| &r.correlation_id == correlation_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(out)
    }

    async fn count_audit(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        let query = AuditQuery {
            start,
            end,
            ..AuditQuery::default()
        };
        let rows = self.audit.read().map_err(|_| poisoned("audit_log"))?;
        Ok(rows.iter().filter(|r| query.matches(r)).count() as u64)
    }

    async fn delete_audit_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut rows = self.audit.write().map_err(|_| poisoned("audit_log"))?;
        let before = rows.len();
        rows.retain(|r| r.timestamp >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

#[async_trait]
impl PerformanceStore for MemoryStore {
    async fn append_metric(&self, record: &PerformanceRecord) -> Result<(), StoreError> {
        self.metrics
            .write()
            .map_err(|_| poisoned("performance_metric"))?
            .push(record.clone());
        Ok(())
    }

    async fn query_metrics(
        &self,
        query: &MetricQuery,
    ) -> Result<Vec<PerformanceRecord>, StoreError> {
        let rows = self.metrics.read().map_err(|_| poisoned("performance_metric"))?;
        let mut out: Vec<_> = rows.iter().filter(|r| query.matches(r)).cloned().collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        if let Some(limit) = query.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn count_metrics(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<u64, StoreError> {
        let query = MetricQuery {
            start,
            end,
            ..MetricQuery::default()
        };
        let rows = self.metrics.read().map_err(|_| poisoned("performance_metric"))?;
        Ok(rows.iter().filter(|r| query.matches(r)).count() as u64)
    }

    async fn delete_metrics_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut rows = self.metrics.write().map_err(|_| poisoned("performance_metric"))?;
        let before = rows.len();
        rows.retain(|r| r.timestamp >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::record::LogType;
    use crate::performance::record::PerformanceCategory;
    use chrono::Duration;

    fn metric(endpoint: &str, offset_secs: i64) -> PerformanceRecord {
        PerformanceRecord {
            endpoint: endpoint.to_string(),
            http_method: "GET".into(),
            action: format!("GET {}", endpoint),
            timestamp: Utc::now() - Duration::seconds(offset_secs),
            response_time_ms: 10.0,
            status_code: 200,
            request_size_bytes: None,
            response_size_bytes: None,
            correlation_id: None,
            caller: None,
            client_ip: None,
            user_agent: None,
            is_success: true,
            error_message: None,
            performance_category: PerformanceCategory::Fast,
        }
    }

    #[tokio::test]
    async fn test_query_orders_descending_and_limits() {
        let store = MemoryStore::new();
        for offset in [30, 10, 20] {
            store.append_metric(&metric("/api/users", offset)).await.unwrap();
        }
        store.append_metric(&metric("/api/groups", 5)).await.unwrap();

        let rows = store
            .query_metrics(&MetricQuery::new().endpoint("/api/users").limit(2))
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].timestamp > rows[1].timestamp);
        assert!(rows.iter().all(|r| r.endpoint == "/api/users"));
    }

    #[tokio::test]
    async fn test_count_and_delete() {
        let store = MemoryStore::new();
        store.append_metric(&metric("/a", 3600)).await.unwrap();
        store.append_metric(&metric("/a", 1)).await.unwrap();

        assert_eq!(store.count_metrics(None, None).await.unwrap(), 2);
        let cutoff = Utc::now() - Duration::seconds(60);
        assert_eq!(store.count_metrics(Some(cutoff), None).await.unwrap(), 1);
        assert_eq!(store.delete_metrics_before(cutoff).await.unwrap(), 1);
        assert_eq!(store.metrics_len(), 1);
    }

    #[tokio::test]
    async fn test_audit_created_at_assigned() {
        let store = MemoryStore::new();
        let record = AuditRecord::new(
            LogType::Request,
            CorrelationId::from("c-9"),
            "GET /x",
            "/x",
            "unknown",
        );
        store.append_audit(&record).await.unwrap();

        let rows = store.audit_by_correlation(&CorrelationId::from("c-9")).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].created_at.is_some());
        assert!(store
            .audit_by_correlation(&CorrelationId::from("other"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_audit_filters_count_and_delete() {
        let store = MemoryStore::new();
        let rows = [
            (LogType::Request, "GET /api/users", "user:alice", 300),
            (LogType::Error, "GET /api/users", "user:alice", 200),
            (LogType::Request, "POST /api/groups", "user:bob", 100),
            (LogType::Error, "POST /api/groups", "user:bob", 10),
        ];
        for (log_type, action, caller, age) in rows {
            let mut record =
                AuditRecord::new(log_type, CorrelationId::from("c-1"), action, "x", caller);
            record.timestamp = Utc::now() - Duration::seconds(age);
            store.append_audit(&record).await.unwrap();
        }

        let alice = store
            .query_audit(&AuditQuery::new().caller("user:alice"))
            .await
            .unwrap();
        assert_eq!(alice.len(), 2);
        assert!(alice[0].timestamp > alice[1].timestamp);

        let now = Utc::now();
        let recent_errors = store
            .query_audit(
                &AuditQuery::new()
                    .log_type(LogType::Error)
                    .between(now - Duration::seconds(250), now),
            )
            .await
            .unwrap();
        assert_eq!(recent_errors.len(), 2);

        let groups = store
            .query_audit(&AuditQuery::new().action("POST /api/groups").limit(1))
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].log_type, LogType::Error);

        let cutoff = now - Duration::seconds(150);
        assert_eq!(store.count_audit(Some(cutoff), None).await.unwrap(), 2);
        assert_eq!(store.delete_audit_before(cutoff).await.unwrap(), 2);
        assert_eq!(store.audit_len(), 2);
    }
}
