//! Aggregation over stored performance records.
//!
//! # Responsibilities
//! - Endpoint and overall summaries (counts, rates, latency percentiles)
//! - Slowest-endpoint and error-rate rankings
//!
//! # Design Decisions
//! - Percentiles use the nearest-rank method: `idx = ceil(p/100 * n) - 1`
//! - An empty window is `Aggregate::NoData`, never a zero-filled summary
//! - Ranking ties are broken by endpoint name ascending

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::performance::record::{PerformanceCategory, PerformanceRecord};
use crate::store::{check_range, clamp_limit, MetricQuery, PerformanceStore, QueryError};

/// Default number of endpoints returned by `slowest_endpoints`.
pub const DEFAULT_SLOWEST_LIMIT: usize = 10;

/// Result of an aggregation over a time window.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "summary", rename_all = "snake_case")]
pub enum Aggregate<T> {
    NoData,
    Data(T),
}

impl<T> Aggregate<T> {
    pub fn data(self) -> Option<T> {
        match self {
            Aggregate::Data(value) => Some(value),
            Aggregate::NoData => None,
        }
    }
}

/// Nearest-rank percentile of an ascending slice.
pub fn percentile(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let n = sorted.len();
    let rank = (p / 100.0 * n as f64).ceil() as i64 - 1;
    let idx = rank.clamp(0, n as i64 - 1) as usize;
    Some(sorted[idx])
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyStats {
    pub mean_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencyStats {
    fn from_times(mut times: Vec<f64>) -> Option<Self> {
        if times.is_empty() {
            return None;
        }
        times.sort_by(f64::total_cmp);
        let mean_ms = times.iter().sum::<f64>() / times.len() as f64;
        Some(Self {
            mean_ms,
            min_ms: times[0],
            max_ms: times[times.len() - 1],
            p95_ms: percentile(&times, 95.0)?,
            p99_ms: percentile(&times, 99.0)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status_code: u16,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryCount {
    pub category: PerformanceCategory,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointSummary {
    pub endpoint: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub latency: LatencyStats,
    pub categories: Vec<CategoryCount>,
    pub status_codes: Vec<StatusCount>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointBreakdown {
    pub endpoint: String,
    pub request_count: u64,
    pub mean_ms: f64,
    pub success_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallSummary {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub success_rate: f64,
    pub latency: LatencyStats,
    pub categories: Vec<CategoryCount>,
    pub status_codes: Vec<StatusCount>,
    pub endpoints: Vec<EndpointBreakdown>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowEndpoint {
    pub endpoint: String,
    pub request_count: u64,
    pub mean_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub slow_requests: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointErrorRate {
    pub endpoint: String,
    pub total_requests: u64,
    pub error_count: u64,
    pub error_rate: f64,
    pub status_codes: Vec<StatusCount>,
}

fn percent(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

fn status_histogram<'a>(records: impl IntoIterator<Item = &'a PerformanceRecord>) -> Vec<StatusCount> {
    let mut counts: HashMap<u16, u64> = HashMap::new();
    for record in records {
        *counts.entry(record.status_code).or_default() += 1;
    }
    let mut out: Vec<_> = counts
        .into_iter()
        .map(|(status_code, count)| StatusCount { status_code, count })
        .collect();
    out.sort_by(|a, b| b.count.cmp(&a.count).then(a.status_code.cmp(&b.status_code)));
    out
}

fn category_counts(records: &[PerformanceRecord]) -> Vec<CategoryCount> {
    PerformanceCategory::ALL
        .into_iter()
        .map(|category| CategoryCount {
            category,
            count: records
                .iter()
                .filter(|r| r.performance_category == category)
                .count() as u64,
        })
        .collect()
}

/// Records grouped by endpoint, in endpoint name order.
fn by_endpoint(records: &[PerformanceRecord]) -> BTreeMap<&str, Vec<&PerformanceRecord>> {
    let mut groups: BTreeMap<&str, Vec<&PerformanceRecord>> = BTreeMap::new();
    for record in records {
        groups.entry(record.endpoint.as_str()).or_default().push(record);
    }
    groups
}

struct Totals {
    total: u64,
    successful: u64,
    failed: u64,
    success_rate: f64,
}

fn totals(records: &[PerformanceRecord]) -> Totals {
    let total = records.len() as u64;
    let successful = records.iter().filter(|r| r.is_success).count() as u64;
    Totals {
        total,
        successful,
        failed: total - successful,
        success_rate: percent(successful, total),
    }
}

/// Computes summaries on demand from the performance store.
#[derive(Clone)]
pub struct AggregationEngine {
    store: Arc<dyn PerformanceStore>,
    max_limit: usize,
}

impl AggregationEngine {
    pub fn new(store: Arc<dyn PerformanceStore>, max_limit: usize) -> Self {
        Self { store, max_limit }
    }

    async fn window(
        &self,
        query: MetricQuery,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PerformanceRecord>, QueryError> {
        check_range(start, end)?;
        Ok(self.store.query_metrics(&query.between(start, end)).await?)
    }

    pub async fn endpoint_summary(
        &self,
        endpoint: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Aggregate<EndpointSummary>, QueryError> {
        let records = self
            .window(MetricQuery::new().endpoint(endpoint), start, end)
            .await?;
        let latency = match LatencyStats::from_times(records.iter().map(|r| r.response_time_ms).collect()) {
            Some(latency) => latency,
            None => return Ok(Aggregate::NoData),
        };
        let totals = totals(&records);

        Ok(Aggregate::Data(EndpointSummary {
            endpoint: endpoint.to_string(),
            start,
            end,
            total_requests: totals.total,
            successful_requests: totals.successful,
            failed_requests: totals.failed,
            success_rate: totals.success_rate,
            latency,
            categories: category_counts(&records),
            status_codes: status_histogram(&records),
        }))
    }

    pub async fn overall_summary(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Aggregate<OverallSummary>, QueryError> {
        let records = self.window(MetricQuery::new(), start, end).await?;
        let latency = match LatencyStats::from_times(records.iter().map(|r| r.response_time_ms).collect()) {
            Some(latency) => latency,
            None => return Ok(Aggregate::NoData),
        };
        let totals = totals(&records);

        let mut endpoints: Vec<_> = by_endpoint(&records)
            .into_iter()
            .map(|(endpoint, group)| {
                let count = group.len() as u64;
                let successful = group.iter().filter(|r| r.is_success).count() as u64;
                EndpointBreakdown {
                    endpoint: endpoint.to_string(),
                    request_count: count,
                    mean_ms: group.iter().map(|r| r.response_time_ms).sum::<f64>() / count as f64,
                    success_rate: percent(successful, count),
                }
            })
            .collect();
        // Stable sort keeps the name order for equal counts.
        endpoints.sort_by(|a, b| b.request_count.cmp(&a.request_count));

        Ok(Aggregate::Data(OverallSummary {
            start,
            end,
            total_requests: totals.total,
            successful_requests: totals.successful,
            failed_requests: totals.failed,
            success_rate: totals.success_rate,
            latency,
            categories: category_counts(&records),
            status_codes: status_histogram(&records),
            endpoints,
        }))
    }

    pub async fn slowest_endpoints(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<usize>,
    ) -> Result<Vec<SlowEndpoint>, QueryError> {
        let limit = clamp_limit(limit, DEFAULT_SLOWEST_LIMIT, self.max_limit);
        let records = self.window(MetricQuery::new(), start, end).await?;

        let mut ranked: Vec<_> = by_endpoint(&records)
            .into_iter()
            .filter_map(|(endpoint, group)| {
                let stats = LatencyStats::from_times(group.iter().map(|r| r.response_time_ms).collect())?;
                Some(SlowEndpoint {
                    endpoint: endpoint.to_string(),
                    request_count: group.len() as u64,
                    mean_ms: stats.mean_ms,
                    p95_ms: stats.p95_ms,
                    p99_ms: stats.p99_ms,
                    slow_requests: group
                        .iter()
                        .filter(|r| r.performance_category.is_slow())
                        .count() as u64,
                })
            })
            .collect();
        ranked.sort_by(|a, b| b.mean_ms.total_cmp(&a.mean_ms));
        ranked.truncate(limit);
        Ok(ranked)
    }

    pub async fn error_rate_by_endpoint(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<EndpointErrorRate>, QueryError> {
        let records = self.window(MetricQuery::new(), start, end).await?;

        let mut ranked: Vec<_> = by_endpoint(&records)
            .into_iter()
            .map(|(endpoint, group)| {
                let total = group.len() as u64;
                let errors = group.iter().filter(|r| !r.is_success).count() as u64;
                EndpointErrorRate {
                    endpoint: endpoint.to_string(),
                    total_requests: total,
                    error_count: errors,
                    error_rate: percent(errors, total),
                    status_codes: status_histogram(group.iter().copied()),
                }
            })
            .collect();
        ranked.sort_by(|a, b| b.error_rate.total_cmp(&a.error_rate));
        Ok(ranked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::performance::collector::RequestSample;
    use crate::store::{MemoryStore, StoreError};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    async fn seeded(samples: &[(&str, u16, u64)]) -> (AggregationEngine, DateTime<Utc>, DateTime<Utc>) {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        for (i, (endpoint, status, ms)) in samples.iter().enumerate() {
            let mut sample = RequestSample::new(*endpoint, "GET", *status, Duration::from_millis(*ms));
            sample.timestamp = now - ChronoDuration::milliseconds(i as i64);
            store.append_metric(&sample.into_record()).await.unwrap();
        }
        (
            AggregationEngine::new(store, 1000),
            now - ChronoDuration::hours(1),
            now + ChronoDuration::seconds(1),
        )
    }

    #[test]
    fn test_percentile_nearest_rank() {
        let five = [10.0, 20.0, 30.0, 40.0, 50.0];
        assert_eq!(percentile(&five, 95.0), Some(50.0));
        assert_eq!(percentile(&five, 99.0), Some(50.0));
        assert_eq!(percentile(&five, 50.0), Some(30.0));

        let hundred: Vec<f64> = (1..=100).map(f64::from).collect();
        assert_eq!(percentile(&hundred, 95.0), Some(95.0));
        assert_eq!(percentile(&hundred, 99.0), Some(99.0));
        assert_eq!(percentile(&hundred, 0.0), Some(1.0));

        assert_eq!(percentile(&[7.0], 99.0), Some(7.0));
        assert_eq!(percentile(&[], 95.0), None);
    }

    #[tokio::test]
    async fn test_endpoint_summary() {
        let (engine, start, end) = seeded(&[
            ("/api/users", 200, 10),
            ("/api/users", 200, 20),
            ("/api/users", 404, 30),
            ("/api/users", 200, 40),
            ("/api/users", 500, 600),
            ("/api/groups", 200, 5),
        ])
        .await;

        let summary = engine
            .endpoint_summary("/api/users", start, end)
            .await
            .unwrap()
            .data()
            .unwrap();
        assert_eq!(summary.total_requests, 5);
        assert_eq!(summary.successful_requests, 3);
        assert_eq!(summary.failed_requests, 2);
        assert!((summary.success_rate - 60.0).abs() < 1e-9);
        assert_eq!(summary.latency.min_ms, 10.0);
        assert_eq!(summary.latency.max_ms, 600.0);
        assert_eq!(summary.latency.p95_ms, 600.0);
        assert!((summary.latency.mean_ms - 140.0).abs() < 1e-9);
        assert_eq!(
            summary.status_codes,
            vec![
                StatusCount { status_code: 200, count: 3 },
                StatusCount { status_code: 404, count: 1 },
                StatusCount { status_code: 500, count: 1 },
            ]
        );
        let slow = summary
            .categories
            .iter()
            .find(|c| c.category == PerformanceCategory::Slow)
            .unwrap();
        assert_eq!(slow.count, 1);
    }

    #[tokio::test]
    async fn test_empty_window_is_no_data() {
        let (engine, start, end) = seeded(&[("/api/users", 200, 10)]).await;
        assert_eq!(
            engine.endpoint_summary("/api/none", start, end).await.unwrap(),
            Aggregate::NoData
        );

        let past = start - ChronoDuration::days(2);
        assert_eq!(
            engine
                .overall_summary(past, past + ChronoDuration::hours(1))
                .await
                .unwrap(),
            Aggregate::NoData
        );
        assert!(engine
            .slowest_endpoints(past, past + ChronoDuration::hours(1), None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_overall_summary_breakdown_order() {
        let (engine, start, end) = seeded(&[
            ("/b", 200, 10),
            ("/a", 200, 10),
            ("/c", 200, 10),
            ("/c", 500, 30),
        ])
        .await;

        let overall = engine.overall_summary(start, end).await.unwrap().data().unwrap();
        assert_eq!(overall.total_requests, 4);
        let names: Vec<_> = overall.endpoints.iter().map(|e| e.endpoint.as_str()).collect();
        assert_eq!(names, vec!["/c", "/a", "/b"]);
        assert!((overall.endpoints[0].success_rate - 50.0).abs() < 1e-9);
        assert!((overall.endpoints[0].mean_ms - 20.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rankings() {
        let (engine, start, end) = seeded(&[
            ("/fast", 200, 10),
            ("/slow", 200, 900),
            ("/slow", 200, 2500),
            ("/mid", 500, 300),
            ("/tie", 404, 300),
        ])
        .await;

        let slowest = engine.slowest_endpoints(start, end, Some(3)).await.unwrap();
        let names: Vec<_> = slowest.iter().map(|e| e.endpoint.as_str()).collect();
        assert_eq!(names, vec!["/slow", "/mid", "/tie"]);
        assert_eq!(slowest[0].slow_requests, 2);

        let errors = engine.error_rate_by_endpoint(start, end).await.unwrap();
        let names: Vec<_> = errors.iter().map(|e| e.endpoint.as_str()).collect();
        assert_eq!(names, vec!["/mid", "/tie", "/fast", "/slow"]);
        assert_eq!(errors[0].error_rate, 100.0);
        assert_eq!(errors[0].status_codes, vec![StatusCount { status_code: 500, count: 1 }]);
    }

    struct BrokenStore;

    #[async_trait]
    impl PerformanceStore for BrokenStore {
        async fn append_metric(&self, _record: &PerformanceRecord) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn query_metrics(&self, _query: &MetricQuery) -> Result<Vec<PerformanceRecord>, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn count_metrics(
            &self,
            _start: Option<DateTime<Utc>>,
            _end: Option<DateTime<Utc>>,
        ) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
        async fn delete_metrics_before(&self, _cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable("down".into()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_query_error() {
        let engine = AggregationEngine::new(Arc::new(BrokenStore), 1000);
        let now = Utc::now();
        let err = engine
            .overall_summary(now - ChronoDuration::hours(1), now)
            .await
            .unwrap_err();
        assert!(matches!(err, QueryError::Store(_)));
    }
}
