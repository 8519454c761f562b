//! End-to-end runs of the record loader against an in-memory store

use async_trait::async_trait;
use parking_lot::Mutex;
use record_loader::{
    processor_fn, query, AfterWaitHook, ArrayRecordSource, BeforeTransactionHook, InMemoryRecordStore,
    LoaderConfig, LoaderError, ProcessingResult, ProcessorSet, Query, Record, RecordLoader,
    RecordStore, RecordStoreDelta, RecordUnit, RetryPolicy, RunStatus, StageInput, StageOutput,
    Step, StoreError, WaitConfig,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// When creates start failing
#[derive(Clone, Copy)]
enum FailureMode {
    /// Every create after the fifth successful one fails
    AfterFive,
    /// Like `AfterFive`, until one record has been attempted more than four
    /// times; creates never fail after that
    AfterFiveUntilPersistent,
}

/// Wraps the in-memory store and rejects creates per [`FailureMode`]
struct FlakyStore {
    inner: InMemoryRecordStore,
    mode: FailureMode,
    created: AtomicUsize,
    attempts: Mutex<HashMap<String, usize>>,
    disabled: Mutex<bool>,
}

impl FlakyStore {
    fn new(mode: FailureMode) -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            mode,
            created: AtomicUsize::new(0),
            attempts: Mutex::new(HashMap::new()),
            disabled: Mutex::new(false),
        }
    }

    fn snapshot(&self) -> Vec<Record> {
        self.inner.snapshot()
    }

    fn should_fail(&self, record: &Record) -> bool {
        let attempts = {
            let mut attempts = self.attempts.lock();
            let count = attempts.entry(record.to_string()).or_insert(0);
            *count += 1;
            *count
        };
        let over_limit = self.created.load(Ordering::SeqCst) > 4;

        match self.mode {
            FailureMode::AfterFive => over_limit,
            FailureMode::AfterFiveUntilPersistent => {
                let mut disabled = self.disabled.lock();
                if over_limit && attempts > 4 {
                    *disabled = true;
                }
                over_limit && !*disabled
            }
        }
    }
}

#[async_trait]
impl RecordStore for FlakyStore {
    async fn create(&self, record: Record) -> record_loader_store::Result<()> {
        if self.should_fail(&record) {
            return Err(StoreError::backend("Creating record failed"));
        }
        self.inner.create(record).await?;
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&self, query: Option<&Query>) -> record_loader_store::Result<Vec<Record>> {
        self.inner.read(query).await
    }

    async fn update(&self, query: &Query, record: Record) -> record_loader_store::Result<()> {
        self.inner.update(query, record).await
    }

    async fn delete(&self, query: &Query) -> record_loader_store::Result<()> {
        self.inner.delete(query).await
    }

    fn toggle_transaction(&self, enable: bool) {
        self.inner.toggle_transaction(enable)
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    async fn rollback(
        &self,
        prior: Option<&RecordStoreDelta>,
    ) -> record_loader_store::Result<Option<RecordStoreDelta>> {
        self.inner.rollback(prior).await
    }
}

/// Pass-through steps with a load step that creates every record
fn creating_processors(store: Arc<dyn RecordStore>) -> ProcessorSet {
    let mut processors = ProcessorSet::pass_through();
    processors.register(
        Step::Load,
        processor_fn(move |input: StageInput| {
            let store = store.clone();
            async move {
                store.create(input.data.clone()).await?;
                Ok::<_, LoaderError>(StageOutput::loaded(RecordStoreDelta::created(vec![
                    input.data,
                ])))
            }
        }),
    );
    processors
}

/// Groups the record `3` with every record whose rounded square root is 3
fn square_root_source() -> ArrayRecordSource {
    ArrayRecordSource::with_relation(|lead: &RecordUnit, records: &[Value]| {
        if lead.data != json!(3) {
            return Vec::new();
        }
        records
            .iter()
            .enumerate()
            .filter(|(_, record)| {
                record
                    .as_f64()
                    .is_some_and(|value| value.sqrt().round() == 3.0)
            })
            .map(|(index, _)| index)
            .collect()
    })
}

fn transactional_config(enable_rollback: bool, retry: RetryPolicy) -> LoaderConfig {
    let mut config = LoaderConfig::default();
    config.processing.find_related_records = true;
    config.processing.transaction.enable_rollback = enable_rollback;
    config.processing.transaction.retry_after_rollback = retry;
    config
}

fn one_to_nine() -> Value {
    json!([1, 2, 3, 4, 5, 6, 7, 8, 9])
}

fn expect_run_failed(outcome: record_loader::Result<record_loader::RunReport>) -> (LoaderError, record_loader::RunReport) {
    match outcome {
        Err(LoaderError::RunFailed { cause, report }) => (*cause, *report),
        Err(other) => panic!("Expected RunFailed, got {}", other),
        Ok(report) => panic!("Expected failure, run ended with {}", report.status),
    }
}

#[tokio::test]
async fn test_filter_and_preprocess_only() {
    let mut config = LoaderConfig::default();
    config.processing.target = Step::Preprocess;

    let mut processors = ProcessorSet::new();
    processors.register(Step::Filter, Arc::new(record_loader::PassThrough));
    processors.register(
        Step::Preprocess,
        processor_fn(|input: StageInput| async move {
            let value = input.data.as_i64().unwrap_or_default();
            Ok(StageOutput::value(json!(value * 10)))
        }),
    );

    let mut loader = RecordLoader::builder(config)
        .record_source(ArrayRecordSource::new())
        .processors(processors)
        .build()
        .unwrap();

    let report = loader.run(json!([1, 2, 3])).await.unwrap();
    assert_eq!(report.status, RunStatus::Ok);

    let stats = report.statistics.clone().unwrap();
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.succeeded, 3);
    assert_eq!(stats.record_store.created, 0);

    let record = report.record(2).unwrap();
    assert_eq!(record.step, Some(Step::Preprocess));
}

#[tokio::test]
async fn test_filtered_record_is_never_seen_downstream() {
    let downstream_calls = Arc::new(AtomicUsize::new(0));
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());

    let mut processors = creating_processors(store.clone());
    processors.register(
        Step::Filter,
        processor_fn(|input: StageInput| async move {
            let keep = input.data != json!(2);
            Ok(StageOutput {
                data: Some(input.data),
                passed: Some(keep),
                ..Default::default()
            })
        }),
    );
    let calls = downstream_calls.clone();
    processors.register(
        Step::Preprocess,
        processor_fn(move |input: StageInput| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(StageOutput::value(input.data)) }
        }),
    );

    let mut loader = RecordLoader::builder(LoaderConfig::default())
        .record_source(ArrayRecordSource::new())
        .record_store(store.clone())
        .processors(processors)
        .build()
        .unwrap();

    let report = loader.run(json!([1, 2, 3])).await.unwrap();

    assert_eq!(downstream_calls.load(Ordering::SeqCst), 2);
    let stats = report.statistics.clone().unwrap();
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.record_store.created, 2);

    let skipped = report.record(1).unwrap();
    assert_eq!(skipped.skipped, Some(true));
    assert_eq!(store.read(None).await.unwrap(), vec![json!(1), json!(3)]);
}

#[tokio::test]
async fn test_create_update_and_delete() {
    let store = Arc::new(InMemoryRecordStore::with_records(vec![json!(3), json!(9)]));
    let mut processors = ProcessorSet::pass_through();

    let match_store = store.clone();
    processors.register(
        Step::Match,
        processor_fn(move |input: StageInput| {
            let store = match_store.clone();
            async move {
                let wanted = input.data.as_f64().unwrap_or(f64::NAN);
                let found = store
                    .read(Some(&query(move |record: &Record| {
                        record.as_f64().is_some_and(|r| r == wanted || r.sqrt() == wanted)
                    })))
                    .await?;
                Ok::<_, LoaderError>(StageOutput::with_candidates(input.data, found))
            }
        }),
    );
    processors.register(
        Step::Merge,
        processor_fn(|input: StageInput| async move {
            if input.side_channel.is_empty() {
                return Ok(StageOutput::value(input.data));
            }
            let total = input
                .side_channel
                .iter()
                .fold(input.data.as_i64().unwrap_or_default(), |total, record| {
                    total + record.as_i64().unwrap_or_default()
                });
            Ok(StageOutput::with_candidates(json!(total), input.side_channel))
        }),
    );
    let load_store = store.clone();
    processors.register(
        Step::Load,
        processor_fn(move |input: StageInput| {
            let store = load_store.clone();
            async move {
                let merged = input.side_channel;
                let Some((kept, removed)) = merged.split_first() else {
                    store.create(input.data.clone()).await?;
                    return Ok(StageOutput::loaded(RecordStoreDelta::created(vec![input.data])));
                };

                let target = kept.clone();
                store
                    .update(&query(move |record: &Record| *record == target), input.data)
                    .await?;
                for record in removed {
                    let target = record.clone();
                    store.delete(&query(move |r: &Record| *r == target)).await?;
                }

                Ok::<_, LoaderError>(StageOutput::loaded(RecordStoreDelta {
                    created: vec![],
                    updated: vec![kept.clone()],
                    deleted: removed.to_vec(),
                }))
            }
        }),
    );

    let mut loader = RecordLoader::builder(LoaderConfig::default())
        .record_source(ArrayRecordSource::new())
        .record_store(store.clone())
        .processors(processors)
        .build()
        .unwrap();

    let report = loader.run(json!([1, 2, 3])).await.unwrap();
    assert_eq!(report.status, RunStatus::Ok);

    let stats = report.statistics.clone().unwrap();
    assert_eq!(stats.processed, 3);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.record_store.created, 2);
    assert_eq!(stats.record_store.updated, 1);
    assert_eq!(stats.record_store.deleted, 1);
    assert_eq!(stats.merged, 2);
    assert!(report.transactions.is_empty());

    let merged = report.record(2).unwrap();
    assert_eq!(merged.matched.as_deref(), Some(&[json!(3), json!(9)][..]));

    let fifteen = store
        .read(Some(&query(|record: &Record| *record == json!(15))))
        .await
        .unwrap();
    assert_eq!(fifteen, vec![json!(15)]);
    assert_eq!(store.len(), 3);
}

#[tokio::test]
async fn test_failed_transaction_without_rollback_keeps_writes() {
    let store = Arc::new(FlakyStore::new(FailureMode::AfterFive));
    let mut loader = RecordLoader::builder(transactional_config(false, RetryPolicy::Never))
        .record_source(square_root_source())
        .record_store(store.clone())
        .processors(creating_processors(store.clone()))
        .build()
        .unwrap();

    let (cause, report) = expect_run_failed(loader.run(one_to_nine()).await);

    let message = cause.to_string();
    assert!(message.starts_with("Transaction failed: "), "{}", message);
    assert!(message.ends_with("Creating record failed"), "{}", message);
    assert_eq!(report.status, RunStatus::Aborted);
    assert_eq!(
        store.snapshot(),
        vec![json!(1), json!(2), json!(3), json!(7), json!(8)]
    );
}

#[tokio::test]
async fn test_failed_transaction_rolled_back() {
    let store = Arc::new(FlakyStore::new(FailureMode::AfterFive));
    let mut loader = RecordLoader::builder(transactional_config(true, RetryPolicy::Never))
        .record_source(square_root_source())
        .record_store(store.clone())
        .processors(creating_processors(store.clone()))
        .build()
        .unwrap();

    let (cause, report) = expect_run_failed(loader.run(one_to_nine()).await);

    assert!(matches!(cause, LoaderError::TransactionFailed { retries: 0, .. }));
    assert!(cause.to_string().starts_with("Transaction failed: "));
    assert_eq!(store.snapshot(), vec![json!(1), json!(2)]);

    // Every member of the group is reported failed
    let stats = report.statistics.unwrap();
    assert_eq!(stats.failed, 4);
    assert_eq!(stats.record_store.created, 2);
    assert!(report.transactions.is_empty());
}

#[tokio::test]
async fn test_bounded_retries_then_reject() {
    let store = Arc::new(FlakyStore::new(FailureMode::AfterFive));
    let mut loader = RecordLoader::builder(transactional_config(true, RetryPolicy::Bounded(2)))
        .record_source(square_root_source())
        .record_store(store.clone())
        .processors(creating_processors(store.clone()))
        .build()
        .unwrap();

    let (cause, _report) = expect_run_failed(loader.run(one_to_nine()).await);

    assert!(matches!(cause, LoaderError::TransactionFailed { retries: 2, .. }));
    let message = cause.to_string();
    assert!(
        message.starts_with("Transaction failed after 2 retries: "),
        "{}",
        message
    );
    assert!(message.ends_with("Creating record failed"));
    assert_eq!(store.snapshot(), vec![json!(1), json!(2)]);
}

#[tokio::test]
async fn test_unbounded_retry_eventually_commits() {
    let store = Arc::new(FlakyStore::new(FailureMode::AfterFiveUntilPersistent));
    let mut loader = RecordLoader::builder(transactional_config(true, RetryPolicy::Unbounded))
        .record_source(square_root_source())
        .record_store(store.clone())
        .processors(creating_processors(store.clone()))
        .build()
        .unwrap();

    let report = loader.run(one_to_nine()).await.unwrap();

    assert_eq!(report.status, RunStatus::Ok);
    let stats = report.statistics.clone().unwrap();
    assert_eq!(stats.processed, 9);
    assert_eq!(stats.skipped, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.record_store.created, 9);
    assert_eq!(stats.merged, 0);
    assert_eq!(report.transactions.len(), 1);
    assert_eq!(report.transactions[0].retries, 4);
    assert_eq!(store.snapshot().len(), 9);
    assert_eq!(loader.processed().len(), 9);
}

#[tokio::test]
async fn test_failed_transaction_continues_without_abort_on_error() {
    let store = Arc::new(FlakyStore::new(FailureMode::AfterFive));
    let mut config = transactional_config(true, RetryPolicy::Never);
    config.processing.abort_on_error = false;

    let mut loader = RecordLoader::builder(config)
        .record_source(square_root_source())
        .record_store(store.clone())
        .processors(creating_processors(store.clone()))
        .build()
        .unwrap();

    let report = loader.run(one_to_nine()).await.unwrap();

    assert_eq!(report.status, RunStatus::Ok);
    let stats = report.statistics.clone().unwrap();
    // The group fails, then every later record hits the exhausted store.
    // 7, 8 and 9 were never committed so they come back as singles.
    assert_eq!(stats.processed, 9);
    assert_eq!(stats.failed, 7);
    assert!(report.record(2).unwrap().failed);
    assert_eq!(store.snapshot(), vec![json!(1), json!(2)]);
}

struct RecordingBarrier {
    calls: Mutex<Vec<(Step, Vec<usize>)>>,
}

#[async_trait]
impl AfterWaitHook for RecordingBarrier {
    async fn run(&self, step: Step, results: &[ProcessingResult]) -> record_loader::Result<()> {
        let indices = results.iter().map(|result| result.index).collect();
        self.calls.lock().push((step, indices));
        Ok(())
    }
}

#[tokio::test]
async fn test_barrier_hook_sees_whole_group() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    let barrier = Arc::new(RecordingBarrier {
        calls: Mutex::new(Vec::new()),
    });

    let mut config = transactional_config(true, RetryPolicy::Never);
    config.processing.transaction.wait = WaitConfig::After(vec![Step::Match]);
    config.processing.transaction.parallel = true;
    config.processing.max_workers = Some(2);

    let mut loader = RecordLoader::builder(config)
        .record_source(square_root_source())
        .record_store(store.clone())
        .processors(creating_processors(store.clone()))
        .after_wait(Step::Match, barrier.clone())
        .build()
        .unwrap();

    let report = loader.run(one_to_nine()).await.unwrap();
    assert_eq!(report.status, RunStatus::Ok);
    assert_eq!(report.statistics.unwrap().record_store.created, 9);

    let calls = barrier.calls.lock();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], (Step::Match, vec![2, 6, 7, 8]));
}

struct Veto;

#[async_trait]
impl BeforeTransactionHook for Veto {
    async fn run(&self, members: &[RecordUnit]) -> record_loader::Result<()> {
        Err(LoaderError::Other(anyhow::anyhow!(
            "{} members is too many",
            members.len()
        )))
    }
}

#[tokio::test]
async fn test_before_transaction_rejection_fails_run() {
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
    let mut config = transactional_config(true, RetryPolicy::Unbounded);
    config.processing.abort_on_error = false;

    let mut loader = RecordLoader::builder(config)
        .record_source(square_root_source())
        .record_store(store.clone())
        .processors(creating_processors(store.clone()))
        .before_transaction(Arc::new(Veto))
        .build()
        .unwrap();

    let (cause, report) = expect_run_failed(loader.run(one_to_nine()).await);

    assert_eq!(
        cause.to_string(),
        "Processing interrupted by beforeTransaction hook: 4 members is too many"
    );
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(report.statistics.unwrap().failed, 4);
    assert_eq!(store.read(None).await.unwrap(), vec![json!(1), json!(2)]);
}

#[tokio::test]
async fn test_parallel_singles_match_sequential() {
    async fn run(parallel: bool) -> (record_loader::RunReport, Vec<Record>) {
        let store = Arc::new(InMemoryRecordStore::new());
        let mut config = LoaderConfig::default();
        config.processing.parallel = parallel;
        config.processing.max_workers = Some(3);

        let mut loader = RecordLoader::builder(config)
            .record_source(ArrayRecordSource::new())
            .record_store(store.clone())
            .processors(creating_processors(store.clone()))
            .build()
            .unwrap();

        let report = loader.run(json!([5, 1, 4, 2, 8, 7, 3])).await.unwrap();
        let mut records = store.snapshot();
        records.sort_by_key(|record| record.as_i64());
        (report, records)
    }

    let (sequential, sequential_records) = run(false).await;
    let (parallel, parallel_records) = run(true).await;

    assert_eq!(sequential.statistics, parallel.statistics);
    assert_eq!(sequential_records, parallel_records);
    let indices: Vec<usize> = parallel
        .records
        .unwrap()
        .iter()
        .map(|record| record.index)
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_config_file_drives_run() {
    let config = LoaderConfig::from_yaml_str(
        "processing:\n  target: merge\n  resultsLevel: total\n  parallel: true\n  maxWorkers: 2\n",
    )
    .unwrap();

    let mut loader = RecordLoader::builder(config)
        .record_source(ArrayRecordSource::new())
        .processors(ProcessorSet::pass_through())
        .build()
        .unwrap();

    let report = loader.run(json!([1, 2, 3, 4, 5])).await.unwrap();
    assert!(report.is_ok());
    assert!(report.records.is_none());
    assert_eq!(report.statistics.unwrap().processed, 5);
    assert!(loader.store().read(None).await.unwrap().is_empty());
}

/// Rejects creating `9` and cannot undo anything
struct BrokenUndoStore {
    inner: InMemoryRecordStore,
    creates: Mutex<HashMap<String, usize>>,
    rollbacks: AtomicUsize,
}

impl BrokenUndoStore {
    fn new() -> Self {
        Self {
            inner: InMemoryRecordStore::new(),
            creates: Mutex::new(HashMap::new()),
            rollbacks: AtomicUsize::new(0),
        }
    }

    fn creates_of(&self, record: &Record) -> usize {
        self.creates
            .lock()
            .get(&record.to_string())
            .copied()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RecordStore for BrokenUndoStore {
    async fn create(&self, record: Record) -> record_loader_store::Result<()> {
        *self.creates.lock().entry(record.to_string()).or_insert(0) += 1;
        if record == json!(9) {
            return Err(StoreError::backend("Creating record failed"));
        }
        self.inner.create(record).await
    }

    async fn read(&self, query: Option<&Query>) -> record_loader_store::Result<Vec<Record>> {
        self.inner.read(query).await
    }

    async fn update(&self, query: &Query, record: Record) -> record_loader_store::Result<()> {
        self.inner.update(query, record).await
    }

    async fn delete(&self, query: &Query) -> record_loader_store::Result<()> {
        self.inner.delete(query).await
    }

    fn toggle_transaction(&self, enable: bool) {
        self.inner.toggle_transaction(enable)
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    async fn rollback(
        &self,
        _prior: Option<&RecordStoreDelta>,
    ) -> record_loader_store::Result<Option<RecordStoreDelta>> {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::transaction("Undo log unavailable"))
    }
}

#[tokio::test]
async fn test_failed_group_rollback_is_fatal() {
    let store = Arc::new(BrokenUndoStore::new());
    let mut loader = RecordLoader::builder(transactional_config(true, RetryPolicy::Unbounded))
        .record_source(square_root_source())
        .record_store(store.clone())
        .processors(creating_processors(store.clone()))
        .build()
        .unwrap();

    let (cause, report) = expect_run_failed(loader.run(one_to_nine()).await);

    assert!(matches!(cause, LoaderError::Rollback(_)), "{}", cause);
    assert_eq!(report.status, RunStatus::Failed);
    assert!(report.message.unwrap().contains("Undo log unavailable"));
    assert!(report.transactions.is_empty());

    // No retry after the failed rollback
    assert_eq!(store.rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(store.creates_of(&json!(3)), 1);

    // Nothing was undone: the writes of 3, 7 and 8 still count
    let stats = report.statistics.unwrap();
    assert_eq!(stats.failed, 4);
    assert_eq!(stats.record_store.created, 5);
}

#[tokio::test]
async fn test_failed_single_rollback_is_fatal() {
    let store = Arc::new(BrokenUndoStore::new());
    let mut config = LoaderConfig::default();
    config.processing.abort_on_error = false;
    config.processing.transaction.enable_rollback = true;

    let mut loader = RecordLoader::builder(config)
        .record_source(ArrayRecordSource::new())
        .record_store(store.clone())
        .processors(creating_processors(store.clone()))
        .build()
        .unwrap();

    let (cause, report) = expect_run_failed(loader.run(json!([1, 9, 2])).await);

    assert!(matches!(cause, LoaderError::Rollback(_)), "{}", cause);
    assert_eq!(report.status, RunStatus::Failed);
    assert_eq!(store.rollbacks.load(Ordering::SeqCst), 1);
    assert_eq!(store.creates_of(&json!(2)), 0);

    let stats = report.statistics.clone().unwrap();
    assert_eq!(stats.processed, 2);
    assert_eq!(stats.failed, 1);
    assert!(report.record(1).unwrap().failed);
}

#[tokio::test]
async fn test_match_without_data_skips_record() {
    let merge_calls = Arc::new(AtomicUsize::new(0));
    let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());

    let mut processors = creating_processors(store.clone());
    processors.register(
        Step::Match,
        processor_fn(|_input: StageInput| async move { Ok(StageOutput::none()) }),
    );
    let calls = merge_calls.clone();
    processors.register(
        Step::Merge,
        processor_fn(move |input: StageInput| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(StageOutput::value(input.data)) }
        }),
    );

    let mut loader = RecordLoader::builder(LoaderConfig::default())
        .record_source(ArrayRecordSource::new())
        .record_store(store.clone())
        .processors(processors)
        .build()
        .unwrap();

    let report = loader.run(json!([1])).await.unwrap();

    assert_eq!(merge_calls.load(Ordering::SeqCst), 0);
    let stats = report.statistics.clone().unwrap();
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.succeeded, 0);
    assert_eq!(report.record(0).unwrap().step, Some(Step::Match));
    assert!(store.read(None).await.unwrap().is_empty());
}
