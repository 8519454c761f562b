use super::RecordSource;
use crate::error::{LoaderError, Result};
use crate::record::{RecordUnit, SourceItem};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Finds the records related to `record`, returned as indices into `all`
pub type RelationFn = Arc<dyn Fn(&RecordUnit, &[Value]) -> Vec<usize> + Send + Sync>;

/// Record source over an in-memory JSON array
#[derive(Default)]
pub struct ArrayRecordSource {
    records: Vec<Value>,
    position: usize,
    find_related: bool,
    relation: Option<RelationFn>,
}

impl ArrayRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Group records with `relation` when related records are requested
    pub fn with_relation<F>(relation: F) -> Self
    where
        F: Fn(&RecordUnit, &[Value]) -> Vec<usize> + Send + Sync + 'static,
    {
        Self {
            relation: Some(Arc::new(relation)),
            ..Self::default()
        }
    }

    fn related(&self, lead: &RecordUnit) -> Vec<RecordUnit> {
        let relation = match (&self.relation, self.find_related) {
            (Some(relation), true) => relation,
            _ => return Vec::new(),
        };

        let mut indices = relation(lead, &self.records);
        indices.sort_unstable();
        indices.dedup();

        indices
            .into_iter()
            .filter(|index| *index != lead.index)
            .filter_map(|index| {
                self.records
                    .get(index)
                    .map(|data| RecordUnit::new(index, data.clone()))
            })
            .collect()
    }
}

#[async_trait]
impl RecordSource for ArrayRecordSource {
    async fn initialize(&mut self, input: Value, find_related: bool) -> Result<()> {
        match input {
            Value::Array(records) => {
                self.records = records;
                self.position = 0;
                self.find_related = find_related;
                Ok(())
            }
            _ => Err(LoaderError::record_source("Input is not an array")),
        }
    }

    async fn next(&mut self) -> Result<Option<SourceItem>> {
        let data = match self.records.get(self.position) {
            Some(data) => data.clone(),
            None => return Ok(None),
        };
        let lead = RecordUnit::new(self.position, data);
        self.position += 1;

        let related = self.related(&lead);
        if related.is_empty() {
            Ok(Some(SourceItem::Single(lead)))
        } else {
            let mut members = Vec::with_capacity(related.len() + 1);
            members.push(lead);
            members.extend(related);
            Ok(Some(SourceItem::Related(members)))
        }
    }
}
