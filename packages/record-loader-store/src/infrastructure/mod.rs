//! Infrastructure layer - Record store adapters
//!
//! - `memory`: in-process store with an undo log (reference backend, tests)

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::InMemoryRecordStore;
