//! Error types for the ingestion pipeline
//!
//! Only [`CapacityExceeded`], [`SinkError`] and [`RecoveryScanError`] ever
//! leave the pipeline. Row, file and store errors are contained inside the
//! worker and only show up in the logs.

use std::path::PathBuf;
use thiserror::Error;

/// The broker refused a non-recovery publish because the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Queue has reached maximum capacity ({max_size} pending uploads)")]
pub struct CapacityExceeded {
    pub max_size: usize,
}

/// Listing the staging directory failed while opening the broker.
#[derive(Debug, Error)]
#[error("Failed to scan staging directory {}: {source}", .dir.display())]
pub struct RecoveryScanError {
    pub dir: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Errors surfaced to callers of [`FileSink::submit`](crate::sink::FileSink::submit)
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    CapacityExceeded(#[from] CapacityExceeded),

    #[error("Failed to write staging file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Why a row was rejected by the [`RowParser`](crate::parser::RowParser)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("Invalid row format: expected {} fields, found {}", crate::parser::ROW_ARITY, .found)]
    InvalidFormat { found: usize },

    #[error("Invalid date format: {0:?}")]
    InvalidDate(String),

    #[error("Invalid severity {0:?}")]
    InvalidSeverity(String),

    #[error("Unexpected error while parsing row: {0}")]
    Internal(String),
}

/// Errors raised by a [`RecordStore`](crate::store::RecordStore)
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Failure while processing one staged file; logged by the worker, never propagated.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("Failed to read staging file {}: {source}", .path.display())]
    FileIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse staging file {}: {source}", .path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv_async::Error,
    },

    #[error("Failed to store batch of {batch_len} records: {source}")]
    StoreWrite {
        batch_len: usize,
        #[source]
        source: StoreError,
    },
}
