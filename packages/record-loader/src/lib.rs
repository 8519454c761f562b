//! Record loader
//!
//! Runs a set of input records through a fixed five-step pipeline and writes
//! the outcome to a [`RecordStore`]:
//!
//! ```text
//! filter → preprocess → match → merge → load
//! ```
//!
//! Each step is bound to a [`Processor`]. Processing stops at a configurable
//! target step. Groups of related records are processed as store
//! transactions that can be rolled back, retried, and synchronized at
//! barriers between steps.
//!
//! ## Architecture
//!
//! - [`sources`]: record sources and the driver that skips committed records
//! - [`pipeline`] / [`step_runner`]: per-record step execution
//! - [`transaction`]: transaction coordinator, wait plans, retry policy
//! - [`dispatcher`]: bounded worker pool for parallel records
//! - [`aggregator`]: folds results into the [`RunReport`]
//! - [`loader`]: the [`RecordLoader`] facade
//!
//! ## Usage
//!
//! ```rust,ignore
//! use record_loader::{ArrayRecordSource, LoaderConfig, ProcessorSet, RecordLoader};
//!
//! let config = LoaderConfig::from_path("loader.yaml")?;
//! config.init_logging();
//!
//! let mut loader = RecordLoader::builder(config)
//!     .record_source(ArrayRecordSource::new())
//!     .processors(ProcessorSet::pass_through())
//!     .build()?;
//!
//! let report = loader.run(json!([1, 2, 3])).await?;
//! ```

pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod hooks;
pub mod loader;
pub mod logging;
pub mod pipeline;
pub mod processor;
pub mod record;
pub mod result;
pub mod sources;
pub mod step;
pub mod step_runner;
pub mod transaction;

pub use aggregator::{DefaultFormatter, ResultAggregator, ResultFormatter};
pub use config::{LoaderConfig, LoggingConfig, ProcessingConfig, TransactionConfig};
pub use dispatcher::WorkDispatcher;
pub use error::{ErrorCategory, LoaderError, PipelineError, Result};
pub use hooks::{AfterWaitHook, BeforeTransactionHook, Hooks};
pub use loader::{RecordLoader, RecordLoaderBuilder};
pub use pipeline::RecordPipeline;
pub use processor::{processor_fn, FnProcessor, PassThrough, Processor, ProcessorSet, StageInput, StageOutput};
pub use record::{RecordUnit, SourceItem};
pub use result::{
    ErrorInfo, ProcessingResult, ReportedRecord, ResultLevel, RunReport, RunStatistics,
    RunStatus, StoreCounts, TransactionSummary,
};
pub use sources::{ArrayRecordSource, ProcessedIndices, RecordSetDriver, RecordSource, RelationFn};
pub use step::Step;
pub use transaction::{RetryPolicy, TransactionCoordinator, WaitConfig, WaitPlan};

pub use record_loader_store::{query, InMemoryRecordStore, Query, Record, RecordStore, RecordStoreDelta, StoreError};
