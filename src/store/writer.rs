//! Bounded background write queue.
//!
//! # Responsibilities
//! - Accept records from the request path without awaiting the store
//! - Persist them from a single background worker, one bounded attempt each
//! - Drain what is queued when shutdown is signalled, up to a deadline
//!
//! # Design Decisions
//! - `submit` never blocks: a full queue drops the record (no backpressure)
//! - A failed or timed-out write is logged once with the serialized record
//!   and abandoned; there is no retry loop
//! - Records still queued when the drain deadline passes are abandoned

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::audit::record::AuditRecord;
use crate::observability::metrics;
use crate::performance::record::PerformanceRecord;
use crate::store::{AuditStore, PerformanceStore, StoreError};

/// Destination a background writer persists into.
#[async_trait]
pub trait RecordSink<T>: Send + Sync + 'static {
    async fn persist(&self, record: &T) -> Result<(), StoreError>;
}

#[async_trait]
impl RecordSink<AuditRecord> for Arc<dyn AuditStore> {
    async fn persist(&self, record: &AuditRecord) -> Result<(), StoreError> {
        self.append_audit(record).await
    }
}

#[async_trait]
impl RecordSink<PerformanceRecord> for Arc<dyn PerformanceStore> {
    async fn persist(&self, record: &PerformanceRecord) -> Result<(), StoreError> {
        self.append_metric(record).await
    }
}

/// Why a record was not accepted for writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    #[error("write queue is full")]
    Full,
    #[error("write queue is closed")]
    Closed,
}

/// Queue sizing and timing.
#[derive(Debug, Clone, Copy)]
pub struct WriterSettings {
    pub capacity: usize,
    pub write_timeout: Duration,
    pub drain_timeout: Duration,
}

impl Default for WriterSettings {
    fn default() -> Self {
        Self {
            capacity: 1024,
            write_timeout: Duration::from_secs(2),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Handle used to submit records to a background worker.
pub struct BackgroundWriter<T> {
    queue: &'static str,
    tx: mpsc::Sender<T>,
}

impl<T> Clone for BackgroundWriter<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue,
            tx: self.tx.clone(),
        }
    }
}

impl<T> BackgroundWriter<T>
where
    T: Serialize + Send + Sync + 'static,
{
    /// Start the worker. It runs until every handle is dropped or shutdown is signalled.
    pub fn spawn<S>(
        queue: &'static str,
        sink: S,
        settings: WriterSettings,
        shutdown: broadcast::Receiver<()>,
    ) -> (Self, JoinHandle<()>)
    where
        S: RecordSink<T>,
    {
        let (tx, rx) = mpsc::channel(settings.capacity.max(1));
        let worker = Worker {
            queue,
            rx,
            sink,
            settings,
        };
        let handle = tokio::spawn(worker.run(shutdown));
        (Self { queue, tx }, handle)
    }

    /// Hand a record to the worker without waiting for it to be stored.
    pub fn submit(&self, record: T) -> Result<(), SubmitError> {
        match self.tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(record)) => {
                metrics::record_dropped(self.queue);
                tracing::warn!(
                    queue = self.queue,
                    record = %to_context(&record),
                    "Write queue full, dropping record"
                );
                Err(SubmitError::Full)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                metrics::record_dropped(self.queue);
                tracing::debug!(queue = self.queue, "Write queue closed, dropping record");
                Err(SubmitError::Closed)
            }
        }
    }
}

fn to_context<T: Serialize>(record: &T) -> String {
    serde_json::to_string(record).unwrap_or_else(|_| "<unserializable>".to_string())
}

struct Worker<T, S> {
    queue: &'static str,
    rx: mpsc::Receiver<T>,
    sink: S,
    settings: WriterSettings,
}

impl<T, S> Worker<T, S>
where
    T: Serialize + Send + Sync + 'static,
    S: RecordSink<T>,
{
    async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        tracing::debug!(queue = self.queue, "Background writer started");
        let mut shutdown_armed = true;

        loop {
            tokio::select! {
                record = self.rx.recv() => match record {
                    Some(record) => self.write(record).await,
                    None => break,
                },
                signal = shutdown.recv(), if shutdown_armed => match signal {
                    Err(broadcast::error::RecvError::Closed) => shutdown_armed = false,
                    _ => {
                        self.drain().await;
                        break;
                    }
                },
            }
        }

        tracing::debug!(queue = self.queue, "Background writer stopped");
    }

    async fn write(&self, record: T) {
        let outcome = match tokio::time::timeout(
            self.settings.write_timeout,
            self.sink.persist(&record),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.settings.write_timeout)),
        };

        if let Err(e) = outcome {
            metrics::record_store_failure(self.queue);
            tracing::error!(
                queue = self.queue,
                error = %e,
                record = %to_context(&record),
                "Failed to persist record, dropping it"
            );
        }
    }

    async fn drain(&mut self) {
        self.rx.close();
        let pending = self.rx.len();
        if pending > 0 {
            tracing::info!(queue = self.queue, pending, "Draining write queue");
        }

        let drained = tokio::time::timeout(self.settings.drain_timeout, async {
            while let Some(record) = self.rx.recv().await {
                self.write(record).await;
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(
                queue = self.queue,
                abandoned = self.rx.len(),
                "Drain deadline passed, abandoning queued records"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingSink {
        written: AtomicUsize,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl RecordSink<u32> for Arc<CountingSink> {
        async fn persist(&self, _record: &u32) -> Result<(), StoreError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail {
                return Err(StoreError::Unavailable("down".into()));
            }
            self.written.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_records_are_persisted_in_background() {
        let sink = Arc::new(CountingSink::default());
        let (tx, _) = broadcast::channel(1);
        let (writer, handle) =
            BackgroundWriter::spawn("test", sink.clone(), WriterSettings::default(), tx.subscribe());

        for i in 0..10u32 {
            writer.submit(i).unwrap();
        }
        drop(writer);
        handle.await.unwrap();
        assert_eq!(sink.written.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let sink = Arc::new(CountingSink {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        });
        let settings = WriterSettings {
            capacity: 1,
            ..WriterSettings::default()
        };
        let (tx, _) = broadcast::channel(1);
        let (writer, _handle) = BackgroundWriter::spawn("test", sink, settings, tx.subscribe());

        let results: Vec<_> = (0..5u32).map(|i| writer.submit(i)).collect();
        assert!(results.contains(&Err(SubmitError::Full)));
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_the_worker() {
        let sink = Arc::new(CountingSink {
            fail: true,
            ..Default::default()
        });
        let (tx, _) = broadcast::channel(1);
        let (writer, handle) =
            BackgroundWriter::spawn("test", sink, WriterSettings::default(), tx.subscribe());

        writer.submit(1).unwrap();
        writer.submit(2).unwrap();
        drop(writer);
        assert!(handle.await.is_ok());
    }

    #[tokio::test]
    async fn test_slow_write_is_bounded() {
        let sink = Arc::new(CountingSink {
            delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let settings = WriterSettings {
            write_timeout: Duration::from_millis(20),
            ..WriterSettings::default()
        };
        let (tx, _) = broadcast::channel(1);
        let (writer, handle) = BackgroundWriter::spawn("test", sink.clone(), settings, tx.subscribe());

        writer.submit(1).unwrap();
        drop(writer);
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("worker should give up on the slow write")
            .unwrap();
        assert_eq!(sink.written.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let sink = Arc::new(CountingSink {
            delay: Some(Duration::from_millis(5)),
            ..Default::default()
        });
        let (tx, _) = broadcast::channel(1);
        let (writer, handle) =
            BackgroundWriter::spawn("test", sink.clone(), WriterSettings::default(), tx.subscribe());

        for i in 0..20u32 {
            writer.submit(i).unwrap();
        }
        tx.send(()).unwrap();
        handle.await.unwrap();
        assert_eq!(sink.written.load(Ordering::SeqCst), 20);
        assert_eq!(writer.submit(99), Err(SubmitError::Closed));
    }
}
