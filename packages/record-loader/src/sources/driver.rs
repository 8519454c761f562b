use super::RecordSource;
use crate::error::Result;
use crate::record::SourceItem;
use dashmap::DashSet;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Indices of records already committed, shared by the driver and the
/// transaction coordinator
#[derive(Debug, Clone, Default)]
pub struct ProcessedIndices {
    inner: Arc<DashSet<usize>>,
}

impl ProcessedIndices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, index: usize) -> bool {
        self.inner.insert(index)
    }

    pub fn extend(&self, indices: impl IntoIterator<Item = usize>) {
        for index in indices {
            self.inner.insert(index);
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.inner.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn clear(&self) {
        self.inner.clear();
    }
}

/// Pulls units of work from a [`RecordSource`], skipping committed ones
pub struct RecordSetDriver {
    source: Box<dyn RecordSource>,
    processed: ProcessedIndices,
}

impl RecordSetDriver {
    pub fn new(source: Box<dyn RecordSource>) -> Self {
        Self::with_processed(source, ProcessedIndices::new())
    }

    pub fn with_processed(source: Box<dyn RecordSource>, processed: ProcessedIndices) -> Self {
        Self { source, processed }
    }

    pub fn processed(&self) -> &ProcessedIndices {
        &self.processed
    }

    pub async fn initialize(&mut self, input: Value, find_related: bool) -> Result<()> {
        self.source.initialize(input, find_related).await
    }

    /// Next unit whose lead record has not been committed yet
    pub async fn next(&mut self) -> Result<Option<SourceItem>> {
        loop {
            let item = match self.source.next().await? {
                Some(item) => item.normalize(),
                None => return Ok(None),
            };

            match item.lead_index() {
                Some(index) if self.processed.contains(index) => {
                    debug!(index, "Skipping already processed record");
                }
                Some(_) => return Ok(Some(item)),
                None => {}
            }
        }
    }
}
