//! Record store interface
//!
//! The pipeline only ever appends. Readers (search, aggregation) query the
//! same `log_records` table through their own code.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::record::ValidatedRecord;

pub use memory::InMemoryStore;
pub use postgres::PgRecordStore;

/// Durable destination for validated records
///
/// `append` is called repeatedly for one file, once per batch. An error
/// abandons the rest of that file; records from earlier batches stay stored.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn append(&self, records: &[ValidatedRecord]) -> Result<(), StoreError>;
}
