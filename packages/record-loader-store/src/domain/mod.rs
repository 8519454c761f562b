//! Domain layer for the record store
//!
//! # Domain Models
//!
//! - `Record`: opaque JSON payload held by the store
//! - `Query`: predicate selecting records
//! - `RecordStoreDelta`: records created/updated/deleted by one operation
//!
//! # Port Trait
//!
//! - `RecordStore`: primary storage abstraction consumed by the loader
//!
//! # Transactions
//!
//! A store exposes a single, non-reentrant transaction toggle. While the
//! toggle is on, every mutation is undo-logged by the store itself so that
//! `rollback` can restore the pre-transaction state. Turning the toggle off
//! commits: the undo log is discarded.
//!
//! ```rust,ignore
//! use record_loader_store::{query, RecordStore};
//!
//! async fn example(store: &dyn RecordStore) -> record_loader_store::Result<()> {
//!     store.toggle_transaction(true);
//!     store.create(serde_json::json!(1)).await?;
//!     store.update(&query(|r| r == &serde_json::json!(1)), serde_json::json!(2)).await?;
//!     store.rollback(None).await?; // store is back to its previous content
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::Result;

/// Record payload (opaque to the store)
pub type Record = serde_json::Value;

/// Record selection predicate
pub type Query = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// Build a [`Query`] from a closure
pub fn query<F>(predicate: F) -> Query
where
    F: Fn(&Record) -> bool + Send + Sync + 'static,
{
    Arc::new(predicate)
}

/// Record store mutations attributed to one record
///
/// Each list holds the affected records themselves (or references to them,
/// depending on what the load processor reports).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordStoreDelta {
    #[serde(default)]
    pub created: Vec<Record>,
    #[serde(default)]
    pub updated: Vec<Record>,
    #[serde(default)]
    pub deleted: Vec<Record>,
}

impl RecordStoreDelta {
    pub fn created(records: Vec<Record>) -> Self {
        Self {
            created: records,
            ..Default::default()
        }
    }

    pub fn updated(records: Vec<Record>) -> Self {
        Self {
            updated: records,
            ..Default::default()
        }
    }

    pub fn deleted(records: Vec<Record>) -> Self {
        Self {
            deleted: records,
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }

    /// Append another delta to this one
    pub fn extend(&mut self, other: RecordStoreDelta) {
        self.created.extend(other.created);
        self.updated.extend(other.updated);
        self.deleted.extend(other.deleted);
    }

    /// `(created, updated, deleted)` list lengths
    pub fn counts(&self) -> (usize, usize, usize) {
        (self.created.len(), self.updated.len(), self.deleted.len())
    }
}

impl fmt::Display for RecordStoreDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (created, updated, deleted) = self.counts();
        write!(
            f,
            "created={} updated={} deleted={}",
            created, updated, deleted
        )
    }
}

/// Record store port
///
/// Implementations must serialize their own writes: the loader may call the
/// store from several worker tasks at once.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record
    async fn create(&self, record: Record) -> Result<()>;

    /// Read every record matching `query` (all records when `None`)
    async fn read(&self, query: Option<&Query>) -> Result<Vec<Record>>;

    /// Replace the single record matching `query`
    async fn update(&self, query: &Query, record: Record) -> Result<()>;

    /// Remove the single record matching `query`
    async fn delete(&self, query: &Query) -> Result<()>;

    /// Open (`true`) or close (`false`) the transaction. Closing discards the
    /// undo log.
    fn toggle_transaction(&self, enable: bool);

    /// Whether a transaction is currently open
    fn in_transaction(&self) -> bool;

    /// Undo every mutation logged since the transaction was opened and close
    /// the transaction.
    ///
    /// `prior` carries the deltas the caller attributes to the failed work.
    /// The returned delta describes what remains in effect after the
    /// rollback; `None` means everything was undone. Fails when no
    /// transaction is open.
    async fn rollback(&self, prior: Option<&RecordStoreDelta>) -> Result<Option<RecordStoreDelta>>;
}
