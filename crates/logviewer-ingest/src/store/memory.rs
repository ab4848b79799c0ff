//! In-memory record store for tests and dry runs

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::RecordStore;
use crate::error::StoreError;
use crate::record::ValidatedRecord;

#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: RwLock<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<ValidatedRecord>,
    append_sizes: Vec<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record appended so far, in order.
    pub async fn records(&self) -> Vec<ValidatedRecord> {
        self.inner.read().await.records.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.records.is_empty()
    }

    /// Size of each `append` call, in call order.
    pub async fn append_sizes(&self) -> Vec<usize> {
        self.inner.read().await.append_sizes.clone()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn append(&self, records: &[ValidatedRecord]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        inner.records.extend_from_slice(records);
        inner.append_sizes.push(records.len());
        Ok(())
    }
}
