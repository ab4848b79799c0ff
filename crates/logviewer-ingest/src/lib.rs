//! Logviewer Ingest Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Upload ingestion pipeline for the log viewer.
//!
//! # Overview
//!
//! An upload travels through four stages:
//!
//! - **FileSink**: streams the upload into the staging directory under a
//!   fresh task id and publishes it
//! - **Broker**: bounded FIFO of pending uploads, broadcast to every
//!   subscriber one task at a time, recovered from disk at startup
//! - **Worker**: streams the staged CSV, validates each row and appends
//!   records to the store in batches, then deletes the staged file
//! - **RowParser**: validates a single `timestamp, service, severity, message`
//!   row
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use logviewer_ingest::{Broker, BrokerConfig, FileSink, InMemoryStore, IngestConfig, Worker};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let config = IngestConfig::default();
//! let broker = Broker::open(BrokerConfig::from(&config)).await?;
//! let worker = Worker::new(broker.clone(), Arc::new(InMemoryStore::new()), config.queue.batch_size);
//! worker.start();
//!
//! let sink = FileSink::new(broker.clone(), config.staging.file_extension.clone());
//! let task_id = sink.submit(&b"2024-01-01T12:00:00Z,api,INFO,started\n"[..]).await?;
//! tracing::info!(%task_id, "queued");
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod broker;
pub mod config;
pub mod error;
pub mod parser;
pub mod record;
pub mod sink;
pub mod store;
pub mod worker;

pub use batch::{ingest_files, BatchSummary};
pub use broker::{from_fn, Broker, BrokerConfig, Subscriber, Subscription};
pub use config::IngestConfig;
pub use error::{CapacityExceeded, RecoveryScanError, RowError, SinkError, StoreError};
pub use parser::RowParser;
pub use record::{UploadTask, ValidatedRecord};
pub use sink::FileSink;
pub use store::{InMemoryStore, PgRecordStore, RecordStore};
pub use worker::{Worker, WorkerStats};
