//! Record store for the record loader
//!
//! The loader's load and match processors read and write records through
//! the [`RecordStore`] port. Stores own a single transaction toggle: while it
//! is on, mutations are undo-logged so a failed transaction can be rolled
//! back.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use record_loader_store::{query, InMemoryRecordStore, RecordStore};
//!
//! let store = InMemoryRecordStore::with_records(vec![json!(3), json!(9)]);
//! store.toggle_transaction(true);
//! store.update(&query(|r| r == &json!(3)), json!(15)).await?;
//! store.toggle_transaction(false); // commit
//! ```

pub mod domain;
pub mod error;
pub mod infrastructure;

pub use error::{ErrorKind, Result, StoreError};

pub use domain::{query, Query, Record, RecordStore, RecordStoreDelta};

#[cfg(feature = "memory")]
pub use infrastructure::InMemoryRecordStore;
