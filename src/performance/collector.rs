//! Performance collector.
//!
//! # Responsibilities
//! - Turn one finished request into a `PerformanceRecord`
//! - Submit it through the background writer without blocking the request
//! - Serve filtered reads (timestamp descending, clamped limits)
//!
//! # Design Decisions
//! - The category is fixed at write time and never recomputed
//! - `is_success` means a 2xx status; 4xx and 5xx carry `HTTP <code>` as the error message

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::http::correlation::CorrelationId;
use crate::performance::record::{PerformanceCategory, PerformanceRecord};
use crate::store::{
    check_range, clamp_limit, BackgroundWriter, MetricQuery, PerformanceStore, QueryError,
};

/// Facts about one completed request, as observed by the middleware.
#[derive(Debug, Clone)]
pub struct RequestSample {
    pub endpoint: String,
    pub http_method: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub elapsed: Duration,
    pub status_code: u16,
    pub request_size_bytes: Option<u64>,
    pub response_size_bytes: Option<u64>,
    pub correlation_id: Option<CorrelationId>,
    pub caller: Option<String>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestSample {
    pub fn new(
        endpoint: impl Into<String>,
        http_method: impl Into<String>,
        status_code: u16,
        elapsed: Duration,
    ) -> Self {
        let endpoint = endpoint.into();
        let http_method = http_method.into();
        Self {
            action: format!("{} {}", http_method, endpoint),
            endpoint,
            http_method,
            timestamp: Utc::now(),
            elapsed,
            status_code,
            request_size_bytes: None,
            response_size_bytes: None,
            correlation_id: None,
            caller: None,
            client_ip: None,
            user_agent: None,
        }
    }

    pub fn into_record(self) -> PerformanceRecord {
        let response_time_ms = self.elapsed.as_secs_f64() * 1000.0;
        let is_success = (200..300).contains(&self.status_code);
        let error_message = (self.status_code >= 400).then(|| format!("HTTP {}", self.status_code));

        PerformanceRecord {
            endpoint: self.endpoint,
            http_method: self.http_method,
            action: self.action,
            timestamp: self.timestamp,
            response_time_ms,
            status_code: self.status_code,
            request_size_bytes: self.request_size_bytes,
            response_size_bytes: self.response_size_bytes,
            correlation_id: self.correlation_id,
            caller: self.caller,
            client_ip: self.client_ip,
            user_agent: self.user_agent,
            is_success,
            error_message,
            performance_category: PerformanceCategory::from_duration_ms(response_time_ms),
        }
    }
}

/// Records and reads per-request performance data.
#[derive(Clone)]
pub struct PerformanceCollector {
    writer: BackgroundWriter<PerformanceRecord>,
    store: Arc<dyn PerformanceStore>,
    default_limit: usize,
    max_limit: usize,
}

impl PerformanceCollector {
    pub fn new(
        writer: BackgroundWriter<PerformanceRecord>,
        store: Arc<dyn PerformanceStore>,
        default_limit: usize,
        max_limit: usize,
    ) -> Self {
        Self {
            writer,
            store,
            default_limit,
            max_limit,
        }
    }

    /// Build the record and hand it to the background writer.
    pub fn record(&self, sample: RequestSample) {
        let record = sample.into_record();

        if record.performance_category == PerformanceCategory::VerySlow {
            tracing::warn!(
                endpoint = %record.endpoint,
                method = %record.http_method,
                response_time_ms = record.response_time_ms,
                correlation_id = record.correlation_id.as_ref().map(|c| c.as_str()).unwrap_or(""),
                "Very slow request"
            );
        } else {
            tracing::debug!(
                endpoint = %record.endpoint,
                response_time_ms = record.response_time_ms,
                category = %record.performance_category,
                "Performance sample"
            );
        }

        // Rejections are logged by the writer.
        let _ = self.writer.submit(record);
    }

    fn limit(&self, requested: Option<usize>) -> usize {
        clamp_limit(requested, self.default_limit, self.max_limit)
    }

    async fn query(&self, query: MetricQuery) -> Result<Vec<PerformanceRecord>, QueryError> {
        Ok(self.store.query_metrics(&query).await?)
    }

    pub async fn latest(&self, limit: Option<usize>) -> Result<Vec<PerformanceRecord>, QueryError> {
        self.query(MetricQuery::new().limit(self.limit(limit))).await
    }

    pub async fn by_endpoint(
        &self,
        endpoint: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PerformanceRecord>, QueryError> {
        self.query(MetricQuery::new().endpoint(endpoint).limit(self.limit(limit)))
            .await
    }

    pub async fn by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<PerformanceRecord>, QueryError> {
        check_range(start, end)?;
        self.query(MetricQuery::new().between(start, end).limit(self.limit(limit)))
            .await
    }

    pub async fn by_action(
        &self,
        action: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PerformanceRecord>, QueryError> {
        self.query(MetricQuery::new().action(action).limit(self.limit(limit)))
            .await
    }

    pub async fn by_category(
        &self,
        category: PerformanceCategory,
        limit: Option<usize>,
    ) -> Result<Vec<PerformanceRecord>, QueryError> {
        self.query(MetricQuery::new().category(category).limit(self.limit(limit)))
            .await
    }

    pub async fn count(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<u64, QueryError> {
        if let (Some(start), Some(end)) = (start, end) {
            check_range(start, end)?;
        }
        Ok(self.store.count_metrics(start, end).await?)
    }

    /// Delete records older than `cutoff`.
    pub async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64, QueryError> {
        let removed = self.store.delete_metrics_before(cutoff).await?;
        tracing::info!(cutoff = %cutoff, removed, "Removed old performance records");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, WriterSettings};
    use chrono::Duration as ChronoDuration;
    use tokio::sync::broadcast;

    fn sample(endpoint: &str, status: u16, ms: u64, age_secs: i64) -> RequestSample {
        let mut s = RequestSample::new(endpoint, "GET", status, Duration::from_millis(ms));
        s.timestamp = Utc::now() - ChronoDuration::seconds(age_secs);
        s
    }

    fn collector() -> (PerformanceCollector, Arc<MemoryStore>, tokio::task::JoinHandle<()>) {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn PerformanceStore> = store.clone();
        let (tx, _) = broadcast::channel(1);
        let (writer, handle) = BackgroundWriter::spawn(
            "performance",
            dyn_store.clone(),
            WriterSettings::default(),
            tx.subscribe(),
        );
        (PerformanceCollector::new(writer, dyn_store, 100, 1000), store, handle)
    }

    #[test]
    fn test_sample_into_record() {
        let ok = RequestSample::new("/api/users", "GET", 204, Duration::from_millis(150)).into_record();
        assert!(ok.is_success);
        assert_eq!(ok.error_message, None);
        assert_eq!(ok.performance_category, PerformanceCategory::Normal);
        assert_eq!(ok.action, "GET /api/users");

        let redirect = RequestSample::new("/a", "GET", 302, Duration::from_millis(1)).into_record();
        assert!(!redirect.is_success);
        assert_eq!(redirect.error_message, None);

        let failed = RequestSample::new("/a", "POST", 503, Duration::from_millis(2500)).into_record();
        assert!(!failed.is_success);
        assert_eq!(failed.error_message.as_deref(), Some("HTTP 503"));
        assert_eq!(failed.performance_category, PerformanceCategory::VerySlow);
    }

    #[tokio::test]
    async fn test_reads_are_descending_and_filtered() {
        let (reader, store, handle) = collector();
        reader.record(sample("/api/users", 200, 50, 30));
        reader.record(sample("/api/users", 500, 700, 20));
        reader.record(sample("/api/groups", 200, 10, 10));

        tokio::time::timeout(Duration::from_secs(1), async {
            while store.metrics_len() < 3 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        let latest = reader.latest(None).await.unwrap();
        assert_eq!(latest.len(), 3);
        assert_eq!(latest[0].endpoint, "/api/groups");
        assert!(latest.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));

        let users = reader.by_endpoint("/api/users", None).await.unwrap();
        assert_eq!(users.len(), 2);

        let slow = reader.by_category(PerformanceCategory::Slow, None).await.unwrap();
        assert_eq!(slow.len(), 1);
        assert_eq!(slow[0].status_code, 500);

        let by_action = reader.by_action("GET /api/groups", Some(0)).await.unwrap();
        assert_eq!(by_action.len(), 1);

        let limited = reader.latest(Some(2)).await.unwrap();
        assert_eq!(limited.len(), 2);

        let now = Utc::now();
        let window = reader
            .by_time_range(now - ChronoDuration::seconds(25), now, None)
            .await
            .unwrap();
        assert_eq!(window.len(), 2);

        assert_eq!(reader.count(None, None).await.unwrap(), 3);
        let removed = reader
            .cleanup_before(now - ChronoDuration::seconds(15))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(reader.count(None, None).await.unwrap(), 1);

        drop(reader);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_inverted_range_rejected() {
        let (collector, _store, _handle) = collector();
        let now = Utc::now();
        let err = collector
            .by_time_range(now, now - ChronoDuration::hours(1), None)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::InvalidRange { .. }));
    }
}
