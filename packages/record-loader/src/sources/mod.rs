//! Record sources
//!
//! A [`RecordSource`] yields records one unit of work at a time. The loader
//! never talks to a source directly: it goes through [`RecordSetDriver`],
//! which skips units that were already committed.

mod array;
mod driver;

pub use array::{ArrayRecordSource, RelationFn};
pub use driver::{ProcessedIndices, RecordSetDriver};

use crate::error::Result;
use crate::record::SourceItem;
use async_trait::async_trait;
use serde_json::Value;

#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Prepare to read from `input`. `find_related` asks the source to group
    /// each record with its related records.
    async fn initialize(&mut self, input: Value, find_related: bool) -> Result<()>;

    /// Next unit of work, `None` once exhausted
    async fn next(&mut self) -> Result<Option<SourceItem>>;
}
