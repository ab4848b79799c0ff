//! One-shot ingestion of local files
//!
//! Wires a broker, worker and sink together, queues a list of files and
//! waits until everything queued has been processed. A dry run stages into a
//! throwaway directory, so uploads waiting in the configured staging
//! directory are neither recovered nor deleted by it.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use crate::broker::{Broker, BrokerConfig};
use crate::config::IngestConfig;
use crate::sink::FileSink;
use crate::store::RecordStore;
use crate::worker::{Worker, WorkerStats};

/// How often the drained-queue check runs.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct BatchSummary {
    /// Task ids of the files that were queued, in input order.
    pub queued: Vec<String>,
    /// Input files that could not be opened or queued.
    pub rejected: Vec<PathBuf>,
    pub stats: WorkerStats,
}

/// Queue `files` and wait until the broker is idle.
pub async fn ingest_files(
    config: &IngestConfig,
    store: Arc<dyn RecordStore>,
    files: &[PathBuf],
    dry_run: bool,
) -> Result<BatchSummary> {
    let mut broker_config = BrokerConfig::from(config);
    let scratch = if dry_run {
        let dir = tempfile::Builder::new()
            .prefix("logviewer-dry-run-")
            .tempdir()
            .context("Failed to create dry-run staging directory")?;
        broker_config.staging_dir = dir.path().to_path_buf();
        info!(staging_dir = %dir.path().display(), "Dry run: staging into a temporary directory");
        Some(dir)
    } else {
        None
    };

    let broker = Broker::open(broker_config).await?;
    let worker = Worker::new(broker.clone(), store, config.queue.batch_size);
    worker.start();

    let sink = FileSink::new(broker.clone(), config.staging.file_extension.clone());
    let mut queued = Vec::with_capacity(files.len());
    let mut rejected = Vec::new();

    for path in files {
        let file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to open input file");
                rejected.push(path.clone());
                continue;
            },
        };

        match sink.submit(file).await {
            Ok(task_id) => {
                info!(path = %path.display(), %task_id, "File queued");
                queued.push(task_id);
            },
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to queue file");
                rejected.push(path.clone());
            },
        }
    }

    while !broker.is_idle() {
        tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
    }
    worker.stop();

    // Remove the scratch directory only once nothing can still be reading it.
    drop(scratch);

    Ok(BatchSummary {
        queued,
        rejected,
        stats: worker.stats(),
    })
}
