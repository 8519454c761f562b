//! In-memory record store
//!
//! Records live in insertion order behind a single mutex, which also
//! serializes concurrent writers. Each record carries a private id so the
//! undo log can locate it again after other mutations shifted positions.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::domain::{Query, Record, RecordStore, RecordStoreDelta};
use crate::error::{Result, StoreError};

#[derive(Debug, Clone)]
struct StoredRecord {
    id: u64,
    record: Record,
}

/// Inverse of one logged mutation
#[derive(Debug, Clone)]
enum UndoEntry {
    Created { id: u64 },
    Updated { id: u64, previous: Record },
    Deleted { position: usize, entry: StoredRecord },
}

#[derive(Debug, Default)]
struct Inner {
    records: Vec<StoredRecord>,
    next_id: u64,
    transaction: bool,
    undo_log: Vec<UndoEntry>,
}

impl Inner {
    fn push(&mut self, record: Record) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.records.push(StoredRecord { id, record });
        id
    }

    fn log(&mut self, entry: UndoEntry) {
        if self.transaction {
            self.undo_log.push(entry);
        }
    }

    fn find_single(&self, query: &Query) -> Result<usize> {
        let matches: Vec<usize> = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, stored)| query(&stored.record))
            .map(|(position, _)| position)
            .collect();

        match matches.as_slice() {
            [position] => Ok(*position),
            [] => Err(StoreError::not_found("No single record found with query")),
            _ => Err(StoreError::ambiguous(matches.len())),
        }
    }

    fn undo(&mut self, entry: UndoEntry) {
        match entry {
            UndoEntry::Created { id } => {
                self.records.retain(|stored| stored.id != id);
            }
            UndoEntry::Updated { id, previous } => {
                if let Some(stored) = self.records.iter_mut().find(|stored| stored.id == id) {
                    stored.record = previous;
                }
            }
            UndoEntry::Deleted { position, entry } => {
                let position = position.min(self.records.len());
                self.records.insert(position, entry);
            }
        }
    }
}

/// In-memory [`RecordStore`] with transactional undo log
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    inner: Mutex<Inner>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with `records`
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        {
            let mut inner = store.inner.lock();
            for record in records {
                inner.push(record);
            }
        }
        store
    }

    /// Current content, in insertion order
    pub fn snapshot(&self) -> Vec<Record> {
        self.inner
            .lock()
            .records
            .iter()
            .map(|stored| stored.record.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of mutations currently held in the undo log
    pub fn pending_undo(&self) -> usize {
        self.inner.lock().undo_log.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create(&self, record: Record) -> Result<()> {
        let mut inner = self.inner.lock();
        let id = inner.push(record);
        inner.log(UndoEntry::Created { id });
        Ok(())
    }

    async fn read(&self, query: Option<&Query>) -> Result<Vec<Record>> {
        let inner = self.inner.lock();
        Ok(inner
            .records
            .iter()
            .filter(|stored| query.map_or(true, |q| q(&stored.record)))
            .map(|stored| stored.record.clone())
            .collect())
    }

    async fn update(&self, query: &Query, record: Record) -> Result<()> {
        let mut inner = self.inner.lock();
        let position = inner.find_single(query)?;
        let stored = &mut inner.records[position];
        let id = stored.id;
        let previous = std::mem::replace(&mut stored.record, record);
        inner.log(UndoEntry::Updated { id, previous });
        Ok(())
    }

    async fn delete(&self, query: &Query) -> Result<()> {
        let mut inner = self.inner.lock();
        let position = inner.find_single(query)?;
        let entry = inner.records.remove(position);
        inner.log(UndoEntry::Deleted { position, entry });
        Ok(())
    }

    fn toggle_transaction(&self, enable: bool) {
        let mut inner = self.inner.lock();
        inner.transaction = enable;
        if !enable {
            inner.undo_log.clear();
        }
    }

    fn in_transaction(&self) -> bool {
        self.inner.lock().transaction
    }

    async fn rollback(&self, _prior: Option<&RecordStoreDelta>) -> Result<Option<RecordStoreDelta>> {
        let mut inner = self.inner.lock();

        if !inner.transaction {
            return Err(StoreError::transaction("Transaction is not enabled"));
        }

        let log = std::mem::take(&mut inner.undo_log);
        debug!("Undoing {} logged record store operations", log.len());

        // Newest first so positions recorded by deletes stay valid
        for entry in log.into_iter().rev() {
            inner.undo(entry);
        }
        inner.transaction = false;

        Ok(None)
    }
}
