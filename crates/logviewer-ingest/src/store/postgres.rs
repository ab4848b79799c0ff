//! PostgreSQL record store
//!
//! Batches are written with multi-row `INSERT`s inside one transaction per
//! `append` call, so a failed batch leaves no partial rows behind.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;
use tracing::{debug, info};

use super::RecordStore;
use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::record::ValidatedRecord;

/// Rows per `INSERT` statement. Four binds per row keeps each statement well
/// under PostgreSQL's 65535 bind parameter limit.
const MAX_ROWS_PER_INSERT: usize = 10_000;

#[derive(Debug, Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a connection pool using the configured limits and timeouts
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .connect(&config.url)
            .await?;

        info!("Database connection pool established");
        Ok(Self::new(pool))
    }

    /// Apply pending migrations from the workspace `migrations/` directory
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Database migrations completed");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn append(&self, records: &[ValidatedRecord]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for chunk in records.chunks(MAX_ROWS_PER_INSERT) {
            let mut query_builder: QueryBuilder<'_, Postgres> =
                QueryBuilder::new("INSERT INTO log_records (log_date, severity, service, message) ");

            query_builder.push_values(chunk, |mut b, record| {
                b.push_bind(record.timestamp())
                    .push_bind(record.severity().as_str())
                    .push_bind(record.service())
                    .push_bind(record.message());
            });

            query_builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;

        debug!(count = records.len(), "Inserted log records");
        Ok(())
    }
}
