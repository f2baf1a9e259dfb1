//! Pipeline startup and teardown.
//!
//! # Responsibilities
//! - Spawn one background writer per record queue
//! - Build the shared `AppState` (recorder, audit trail, collector, aggregation engine)
//! - Start the retention task when enabled
//! - Stop the workers after the server has finished, draining within a deadline
//!
//! # Design Decisions
//! - Workers listen to their own shutdown channel, triggered only once the
//!   server has stopped, so records from in-flight requests are not lost

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::audit::{AuditRecorder, AuditTrail};
use crate::config::AppConfig;
use crate::http::server::AppState;
use crate::lifecycle::retention::{spawn_retention, RetentionPolicy, RetentionTarget};
use crate::lifecycle::Shutdown;
use crate::performance::{AggregationEngine, PerformanceCollector};
use crate::store::{AuditStore, BackgroundWriter, PerformanceStore, WriterSettings};

/// Running observation pipeline.
pub struct Pipeline {
    state: AppState,
    shutdown: Shutdown,
    tasks: Vec<JoinHandle<()>>,
}

impl Pipeline {
    pub fn start(
        config: AppConfig,
        audit_store: Arc<dyn AuditStore>,
        performance_store: Arc<dyn PerformanceStore>,
    ) -> Self {
        let shutdown = Shutdown::new();
        let settings = WriterSettings {
            capacity: config.audit.queue_capacity,
            write_timeout: Duration::from_millis(config.audit.write_timeout_ms),
            drain_timeout: Duration::from_secs(config.audit.drain_timeout_secs),
        };

        let (audit_writer, audit_worker) = BackgroundWriter::spawn(
            "audit",
            audit_store.clone(),
            settings,
            shutdown.subscribe(),
        );
        let (performance_writer, performance_worker) = BackgroundWriter::spawn(
            "performance",
            performance_store.clone(),
            settings,
            shutdown.subscribe(),
        );
        let mut tasks = vec![audit_worker, performance_worker];

        let audit = AuditRecorder::new(audit_writer, config.capture.truncate_chars);
        let performance = PerformanceCollector::new(
            performance_writer,
            performance_store.clone(),
            config.performance.default_limit,
            config.performance.max_limit,
        );
        let aggregation = AggregationEngine::new(performance_store, config.performance.max_limit);
        let trail = AuditTrail::new(
            audit_store,
            config.performance.default_limit,
            config.performance.max_limit,
        );

        let mut policies = Vec::new();
        if config.audit.enabled && config.audit.retention_days > 0 {
            policies.push(RetentionPolicy::new(
                RetentionTarget::Audit(trail.clone()),
                config.audit.retention_days,
            ));
        }
        if config.performance.enabled && config.performance.retention_days > 0 {
            policies.push(RetentionPolicy::new(
                RetentionTarget::Performance(performance.clone()),
                config.performance.retention_days,
            ));
        }
        if !policies.is_empty() {
            tasks.push(spawn_retention(
                policies,
                Duration::from_secs(config.performance.cleanup_interval_secs),
                shutdown.subscribe(),
            ));
        }

        tracing::info!(
            audit_enabled = config.audit.enabled,
            performance_enabled = config.performance.enabled,
            queue_capacity = config.audit.queue_capacity,
            "Observation pipeline started"
        );

        let state = AppState::new(Arc::new(config), audit, trail, performance, aggregation);
        Self {
            state,
            shutdown,
            tasks,
        }
    }

    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Stop background tasks and wait for the write queues to drain.
    pub async fn shutdown(self) {
        self.shutdown.trigger();
        drop(self.state);
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!(error = %e, "Background task ended abnormally");
            }
        }
        tracing::info!("Observation pipeline stopped");
    }
}
