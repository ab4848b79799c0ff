//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// Pipeline Configuration Constants
// ============================================================================

/// Default staging directory for uploaded files.
pub const DEFAULT_UPLOAD_DIR: &str = "uploads";

/// Default staging file extension.
pub const DEFAULT_UPLOAD_FILE_EXTENSION: &str = "csv";

/// Default maximum number of pending (non-recovered) uploads.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// Default number of records per store append.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default idle wait of the dispatch loop, in milliseconds.
pub const DEFAULT_IDLE_POLL_INTERVAL_MS: u64 = 1000;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/logviewer";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 1;

/// Default database acquire timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Ingestion pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub staging: StagingConfig,
    pub queue: QueueConfig,
    pub database: DatabaseConfig,
}

/// Where uploads are staged before processing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagingConfig {
    pub dir: PathBuf,
    pub file_extension: String,
}

/// Broker and worker tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub max_queue_size: usize,
    pub batch_size: usize,
    pub idle_poll_interval_ms: u64,
}

impl QueueConfig {
    pub fn idle_poll_interval(&self) -> Duration {
        Duration::from_millis(self.idle_poll_interval_ms)
    }
}

/// Record store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl IngestConfig {
    /// Load configuration from `.env`, the environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = IngestConfig {
            staging: StagingConfig {
                dir: std::env::var("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from(DEFAULT_UPLOAD_DIR)),
                file_extension: std::env::var("UPLOAD_FILE_EXTENSION")
                    .unwrap_or_else(|_| DEFAULT_UPLOAD_FILE_EXTENSION.to_string()),
            },
            queue: QueueConfig {
                max_queue_size: env_or("QUEUE_MAX_SIZE", DEFAULT_MAX_QUEUE_SIZE),
                batch_size: env_or("INGEST_BATCH_SIZE", DEFAULT_BATCH_SIZE),
                idle_poll_interval_ms: env_or("QUEUE_IDLE_POLL_MS", DEFAULT_IDLE_POLL_INTERVAL_MS),
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")
                    .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", DEFAULT_DATABASE_MAX_CONNECTIONS),
                min_connections: env_or("DATABASE_MIN_CONNECTIONS", DEFAULT_DATABASE_MIN_CONNECTIONS),
                connect_timeout_secs: env_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                ),
                idle_timeout_secs: env_or("DATABASE_IDLE_TIMEOUT", DEFAULT_DATABASE_IDLE_TIMEOUT_SECS),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.queue.max_queue_size == 0 {
            anyhow::bail!("Queue max size must be greater than 0");
        }

        if self.queue.batch_size == 0 {
            anyhow::bail!("Ingest batch size must be greater than 0");
        }

        if self.queue.idle_poll_interval_ms == 0 {
            anyhow::bail!("Queue idle poll interval must be greater than 0");
        }

        if self.staging.file_extension.is_empty() || self.staging.file_extension.contains('/') {
            anyhow::bail!(
                "Invalid upload file extension: {:?}",
                self.staging.file_extension
            );
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        Ok(())
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            staging: StagingConfig {
                dir: PathBuf::from(DEFAULT_UPLOAD_DIR),
                file_extension: DEFAULT_UPLOAD_FILE_EXTENSION.to_string(),
            },
            queue: QueueConfig::default(),
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            idle_poll_interval_ms: DEFAULT_IDLE_POLL_INTERVAL_MS,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}
