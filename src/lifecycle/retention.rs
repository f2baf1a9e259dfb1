//! Periodic removal of expired audit and performance records.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::audit::AuditTrail;
use crate::performance::PerformanceCollector;
use crate::store::{cutoff_days_ago, QueryError};

/// Table swept by the retention task.
#[derive(Clone)]
pub enum RetentionTarget {
    Audit(AuditTrail),
    Performance(PerformanceCollector),
}

impl RetentionTarget {
    fn table(&self) -> &'static str {
        match self {
            RetentionTarget::Audit(_) => "audit_log",
            RetentionTarget::Performance(_) => "performance_metric",
        }
    }

    async fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64, QueryError> {
        match self {
            RetentionTarget::Audit(trail) => trail.cleanup_before(cutoff).await,
            RetentionTarget::Performance(collector) => collector.cleanup_before(cutoff).await,
        }
    }
}

/// Keep rows of `target` for `days` days.
#[derive(Clone)]
pub struct RetentionPolicy {
    pub target: RetentionTarget,
    pub days: u32,
}

impl RetentionPolicy {
    pub fn new(target: RetentionTarget, days: u32) -> Self {
        Self { target, days }
    }

    async fn sweep(&self) {
        let table = self.target.table();
        let Some(cutoff) = cutoff_days_ago(self.days) else {
            tracing::warn!(table, days = self.days, "Retention period out of range, skipping sweep");
            return;
        };
        if let Err(e) = self.target.cleanup_before(cutoff).await {
            tracing::warn!(table, error = %e, "Retention cleanup failed");
        }
    }
}

/// Apply every policy each `interval` until shutdown.
pub fn spawn_retention(
    policies: Vec<RetentionPolicy>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick completes immediately; skip it so startup is not a cleanup.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    for policy in &policies {
                        policy.sweep().await;
                    }
                }
                _ = shutdown.recv() => break,
            }
        }
        tracing::debug!("Retention task stopped");
    })
}
