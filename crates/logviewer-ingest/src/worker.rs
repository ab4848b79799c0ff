//! Staged file processing
//!
//! The [`Worker`] subscribes to the [`Broker`] and, for every delivered
//! [`UploadTask`], streams the staged CSV through the [`RowParser`], appends
//! valid records to the [`RecordStore`] in batches and finally deletes the
//! staged file. Nothing that goes wrong inside one file reaches the broker.

use async_trait::async_trait;
use csv_async::{AsyncReaderBuilder, ErrorKind, StringRecord, Trim};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::fs::{self, File};
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, Subscriber, Subscription};
use crate::error::ProcessError;
use crate::parser::RowParser;
use crate::record::{UploadTask, ValidatedRecord};
use crate::store::RecordStore;

/// Counters accumulated over the lifetime of a worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStats {
    pub files_processed: u64,
    pub files_failed: u64,
    pub records_stored: u64,
    pub rows_rejected: u64,
    pub staging_files_removed: u64,
    pub cleanup_failures: u64,
}

/// Outcome of one file. Filled in as processing goes, so a failed file still
/// reports what it got through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct FileReport {
    rows_read: u64,
    records_stored: u64,
    rows_rejected: u64,
    batches: u64,
}

#[derive(Default)]
struct StatsCounters {
    files_processed: AtomicU64,
    files_failed: AtomicU64,
    records_stored: AtomicU64,
    rows_rejected: AtomicU64,
    staging_files_removed: AtomicU64,
    cleanup_failures: AtomicU64,
}

impl StatsCounters {
    fn record_file(&self, report: &FileReport, succeeded: bool) {
        let outcome = if succeeded {
            &self.files_processed
        } else {
            &self.files_failed
        };
        outcome.fetch_add(1, Ordering::Relaxed);
        self.records_stored
            .fetch_add(report.records_stored, Ordering::Relaxed);
        self.rows_rejected
            .fetch_add(report.rows_rejected, Ordering::Relaxed);
    }

    fn snapshot(&self) -> WorkerStats {
        WorkerStats {
            files_processed: self.files_processed.load(Ordering::Relaxed),
            files_failed: self.files_failed.load(Ordering::Relaxed),
            records_stored: self.records_stored.load(Ordering::Relaxed),
            rows_rejected: self.rows_rejected.load(Ordering::Relaxed),
            staging_files_removed: self.staging_files_removed.load(Ordering::Relaxed),
            cleanup_failures: self.cleanup_failures.load(Ordering::Relaxed),
        }
    }
}

/// Broker subscriber that ingests staged files into a record store.
pub struct Worker {
    broker: Broker,
    processor: Arc<TaskProcessor>,
    subscription: Mutex<Option<Subscription>>,
}

impl Worker {
    /// A `batch_size` of zero is treated as one.
    pub fn new(broker: Broker, store: Arc<dyn RecordStore>, batch_size: usize) -> Self {
        Self {
            broker,
            processor: Arc::new(TaskProcessor {
                store,
                parser: RowParser::new(),
                batch_size: batch_size.max(1),
                stats: StatsCounters::default(),
            }),
            subscription: Mutex::new(None),
        }
    }

    /// Start receiving tasks. Calling it on a running worker does nothing.
    pub fn start(&self) {
        let mut subscription = self.subscription();
        if subscription.is_some() {
            warn!("Worker already started");
            return;
        }

        let handle = self
            .broker
            .subscribe(Arc::clone(&self.processor) as Arc<dyn Subscriber>);
        info!(
            subscriber_id = handle.id(),
            batch_size = self.processor.batch_size,
            "Worker started"
        );
        *subscription = Some(handle);
    }

    /// Stop receiving tasks. A file already being processed is finished first.
    pub fn stop(&self) {
        if let Some(handle) = self.subscription().take() {
            handle.unsubscribe();
            info!(stats = ?self.stats(), "Worker stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.subscription().is_some()
    }

    pub fn stats(&self) -> WorkerStats {
        self.processor.stats.snapshot()
    }

    fn subscription(&self) -> MutexGuard<'_, Option<Subscription>> {
        self.subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

struct TaskProcessor {
    store: Arc<dyn RecordStore>,
    parser: RowParser,
    batch_size: usize,
    stats: StatsCounters,
}

#[async_trait]
impl Subscriber for TaskProcessor {
    async fn on_task(&self, task: &UploadTask) -> anyhow::Result<()> {
        let started = Instant::now();
        let mut report = FileReport::default();
        info!(task_id = %task.id, path = %task.staging_path.display(), "Processing file");

        let result = self.process_file(task, &mut report).await;
        self.stats.record_file(&report, result.is_ok());

        match result {
            Ok(()) => info!(
                task_id = %task.id,
                rows_read = report.rows_read,
                records_stored = report.records_stored,
                rows_rejected = report.rows_rejected,
                batches = report.batches,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "File processed"
            ),
            Err(err) => error!(
                task_id = %task.id,
                records_stored = report.records_stored,
                error = %err,
                "Error processing file"
            ),
        }

        self.cleanup(task).await;
        Ok(())
    }
}

impl TaskProcessor {
    async fn process_file(
        &self,
        task: &UploadTask,
        report: &mut FileReport,
    ) -> Result<(), ProcessError> {
        let path = task.staging_path();
        let file = File::open(path).await.map_err(|source| ProcessError::FileIo {
            path: path.to_path_buf(),
            source,
        })?;

        let mut reader = AsyncReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::All)
            .create_reader(file);

        let mut row = StringRecord::new();
        let mut batch = Vec::with_capacity(self.batch_size);

        loop {
            match reader.read_record(&mut row).await {
                Ok(false) => break,
                Ok(true) => {
                    report.rows_read += 1;
                    let fields: Vec<&str> = row.iter().collect();
                    match self.parser.parse(&fields) {
                        Some(record) => batch.push(record),
                        None => report.rows_rejected += 1,
                    }
                },
                Err(err) if matches!(err.kind(), ErrorKind::Io(_)) => {
                    return Err(ProcessError::Csv {
                        path: path.to_path_buf(),
                        source: err,
                    });
                },
                Err(err) => {
                    report.rows_read += 1;
                    report.rows_rejected += 1;
                    warn!(task_id = %task.id, error = %err, "Unreadable row skipped");
                },
            }

            if batch.len() >= self.batch_size {
                self.flush(&mut batch, report).await?;
            }
        }

        self.flush(&mut batch, report).await
    }

    async fn flush(
        &self,
        batch: &mut Vec<ValidatedRecord>,
        report: &mut FileReport,
    ) -> Result<(), ProcessError> {
        if batch.is_empty() {
            return Ok(());
        }

        self.store
            .append(batch)
            .await
            .map_err(|source| ProcessError::StoreWrite {
                batch_len: batch.len(),
                source,
            })?;

        report.records_stored += batch.len() as u64;
        report.batches += 1;
        debug!(batch_len = batch.len(), total = report.records_stored, "Batch stored");
        batch.clear();
        Ok(())
    }

    async fn cleanup(&self, task: &UploadTask) {
        let path = task.staging_path();
        match fs::remove_file(path).await {
            Ok(()) => {
                self.stats
                    .staging_files_removed
                    .fetch_add(1, Ordering::Relaxed);
                debug!(task_id = %task.id, path = %path.display(), "Staging file removed");
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(task_id = %task.id, path = %path.display(), "Staging file already gone");
            },
            Err(err) => {
                self.stats.cleanup_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    task_id = %task.id,
                    path = %path.display(),
                    error = %err,
                    "Error cleaning up file"
                );
            },
        }
    }
}
