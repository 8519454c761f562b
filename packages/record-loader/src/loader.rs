use crate::aggregator::{DefaultFormatter, ResultAggregator, ResultFormatter};
use crate::config::LoaderConfig;
use crate::dispatcher::{WorkDispatcher, WorkerFailure};
use crate::error::{LoaderError, PipelineError, Result};
use crate::hooks::{AfterWaitHook, BeforeTransactionHook, Hooks};
use crate::pipeline::RecordPipeline;
use crate::processor::{Processor, ProcessorSet};
use crate::record::{RecordUnit, SourceItem};
use crate::result::{ProcessingResult, RunReport};
use crate::sources::{ProcessedIndices, RecordSetDriver, RecordSource};
use crate::step::Step;
use crate::transaction::{TransactionCoordinator, TransactionOptions};
use record_loader_store::{InMemoryRecordStore, RecordStore};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Assembles a [`RecordLoader`]
pub struct RecordLoaderBuilder {
    config: LoaderConfig,
    source: Option<Box<dyn RecordSource>>,
    store: Option<Arc<dyn RecordStore>>,
    processors: ProcessorSet,
    hooks: Hooks,
    formatter: Option<Arc<dyn ResultFormatter>>,
}

impl RecordLoaderBuilder {
    pub fn new(config: LoaderConfig) -> Self {
        Self {
            config,
            source: None,
            store: None,
            processors: ProcessorSet::new(),
            hooks: Hooks::new(),
            formatter: None,
        }
    }

    pub fn record_source(mut self, source: impl RecordSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Defaults to an empty [`InMemoryRecordStore`]
    pub fn record_store(mut self, store: Arc<dyn RecordStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn processor(mut self, step: Step, processor: Arc<dyn Processor>) -> Self {
        self.processors.register(step, processor);
        self
    }

    pub fn processors(mut self, processors: ProcessorSet) -> Self {
        self.processors = processors;
        self
    }

    pub fn before_transaction(mut self, hook: Arc<dyn BeforeTransactionHook>) -> Self {
        self.hooks.set_before_transaction(hook);
        self
    }

    pub fn after_wait(mut self, step: Step, hook: Arc<dyn AfterWaitHook>) -> Self {
        self.hooks.set_after_wait(step, hook);
        self
    }

    pub fn result_formatter(mut self, formatter: Arc<dyn ResultFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    pub fn build(self) -> Result<RecordLoader> {
        self.config.validate()?;

        let source = self
            .source
            .ok_or_else(|| LoaderError::config("Record set module is mandatory"))?;

        let target = self.config.processing.target;
        if let Some(step) = self.processors.first_missing(target) {
            return Err(LoaderError::StepUnreachable { step });
        }

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryRecordStore::new()));
        let processed = ProcessedIndices::new();
        let pipeline = Arc::new(RecordPipeline::new(self.processors, target));
        let dispatcher = WorkDispatcher::new(self.config.effective_workers());

        let transaction = &self.config.processing.transaction;
        let options = TransactionOptions {
            enable_rollback: transaction.enable_rollback,
            retry: transaction.retry_after_rollback,
            plan: self.config.wait_plan(),
            parallel: transaction.parallel,
        };
        let coordinator = TransactionCoordinator::new(
            pipeline.clone(),
            store.clone(),
            self.hooks,
            dispatcher,
            processed.clone(),
            options,
        );

        Ok(RecordLoader {
            config: self.config,
            driver: RecordSetDriver::with_processed(source, processed),
            store,
            pipeline,
            coordinator,
            dispatcher,
            formatter: self.formatter.unwrap_or_else(|| Arc::new(DefaultFormatter)),
        })
    }
}

/// Loads a record set through the pipeline
pub struct RecordLoader {
    config: LoaderConfig,
    driver: RecordSetDriver,
    store: Arc<dyn RecordStore>,
    pipeline: Arc<RecordPipeline>,
    coordinator: TransactionCoordinator,
    dispatcher: WorkDispatcher,
    formatter: Arc<dyn ResultFormatter>,
}

impl RecordLoader {
    pub fn builder(config: LoaderConfig) -> RecordLoaderBuilder {
        RecordLoaderBuilder::new(config)
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn processed(&self) -> &ProcessedIndices {
        self.driver.processed()
    }

    /// Process every record read from `input`.
    ///
    /// Per-record failures end up in the report. Fatal failures (hook
    /// rejections, failed rollbacks, a failed transaction under
    /// `abortOnError`) return [`LoaderError::RunFailed`] with the report
    /// folded up to that point.
    pub async fn run(&mut self, input: Value) -> Result<RunReport> {
        let start_time = Instant::now();
        let processing = &self.config.processing;
        let mut aggregator = ResultAggregator::with_formatter(
            processing.results_level,
            processing.abort_on_error,
            self.formatter.clone(),
        );

        self.driver.processed().clear();
        if let Err(e) = self
            .driver
            .initialize(input, processing.find_related_records)
            .await
        {
            return Err(Self::fail_run(aggregator, e));
        }

        info!(
            target_step = %processing.target,
            parallel = processing.parallel,
            "Starting processing of record set"
        );

        match self.process_record_set(&mut aggregator).await {
            Ok(()) => {
                let report = aggregator.finalize();
                info!(
                    "Processing completed with status {} in {}ms",
                    report.status,
                    start_time.elapsed().as_millis()
                );
                Ok(report)
            }
            Err(e) => Err(Self::fail_run(aggregator, e)),
        }
    }

    fn fail_run(mut aggregator: ResultAggregator, cause: LoaderError) -> LoaderError {
        error!("Processing failed: {}", cause);

        // A failed transaction is reported through its failed members
        if !matches!(cause, LoaderError::TransactionFailed { .. }) {
            aggregator.fail(&cause);
        }

        LoaderError::RunFailed {
            cause: Box::new(cause),
            report: Box::new(aggregator.finalize()),
        }
    }

    async fn process_record_set(&mut self, aggregator: &mut ResultAggregator) -> Result<()> {
        let processing = &self.config.processing;
        let batch_size = if processing.parallel && !processing.transaction.enable_rollback {
            self.dispatcher.max_workers()
        } else {
            1
        };
        let abort_on_error = processing.abort_on_error;

        let mut singles: Vec<RecordUnit> = Vec::with_capacity(batch_size);

        loop {
            match self.driver.next().await? {
                None => {
                    self.process_singles(std::mem::take(&mut singles), aggregator)
                        .await?;
                    break;
                }
                Some(SourceItem::Single(unit)) => {
                    singles.push(unit);
                    if singles.len() >= batch_size {
                        self.process_singles(std::mem::take(&mut singles), aggregator)
                            .await?;
                    }
                }
                Some(SourceItem::Related(members)) => {
                    // The store transaction is not reentrant: settle singles first
                    self.process_singles(std::mem::take(&mut singles), aggregator)
                        .await?;
                    if aggregator.should_abort() {
                        break;
                    }

                    info!("Processing {} related records", members.len());
                    match self.coordinator.run(members).await {
                        Ok(outcome) => {
                            aggregator.record_transaction(outcome.retries);
                            aggregator.fold_all(outcome.results);
                        }
                        Err(failure) => {
                            let fatal = failure.is_fatal();
                            aggregator.fold_all(failure.results);
                            if fatal || abort_on_error {
                                return Err(failure.error);
                            }
                            warn!("Continuing after failed transaction: {}", failure.error);
                        }
                    }
                }
            }

            if aggregator.should_abort() {
                warn!("Aborting processing after failed record");
                break;
            }
        }

        Ok(())
    }

    async fn process_singles(
        &self,
        units: Vec<RecordUnit>,
        aggregator: &mut ResultAggregator,
    ) -> Result<()> {
        if units.is_empty() {
            return Ok(());
        }

        if self.config.processing.transaction.enable_rollback {
            for unit in units {
                self.process_single_with_rollback(&unit, aggregator).await?;
                if aggregator.should_abort() {
                    break;
                }
            }
        } else if self.config.processing.parallel && units.len() > 1 {
            let jobs: Vec<_> = units
                .into_iter()
                .map(|unit| {
                    let pipeline = self.pipeline.clone();
                    async move {
                        let result = pipeline
                            .process_all(&unit)
                            .await
                            .unwrap_or_else(PipelineError::into_result);
                        Ok::<_, LoaderError>(result)
                    }
                })
                .collect();

            let results = self.dispatcher.dispatch(jobs).await.map_err(|failure| {
                match failure.cause {
                    WorkerFailure::Failed(e) => e,
                    WorkerFailure::Panicked(message) => LoaderError::Worker(message),
                }
            })?;
            for result in results {
                self.settle(result, aggregator);
            }
        } else {
            for unit in units {
                let result = self
                    .pipeline
                    .process_all(&unit)
                    .await
                    .unwrap_or_else(PipelineError::into_result);
                self.settle(result, aggregator);
                if aggregator.should_abort() {
                    break;
                }
            }
        }

        Ok(())
    }

    /// Run one record in its own store transaction, rolling back its
    /// changes if it fails. A failed rollback is returned after the record
    /// has been folded.
    async fn process_single_with_rollback(
        &self,
        unit: &RecordUnit,
        aggregator: &mut ResultAggregator,
    ) -> Result<()> {
        self.store.toggle_transaction(true);

        let e = match self.pipeline.process_all(unit).await {
            Ok(result) => {
                self.store.toggle_transaction(false);
                self.settle(result, aggregator);
                return Ok(());
            }
            Err(e) => e,
        };

        warn!(index = unit.index, step = %e.step, "Rolling back changes of failed record");
        let mut result = e.into_result();
        match self.store.rollback(Some(&result.record_store)).await {
            Ok(residual) => {
                result.record_store = residual.unwrap_or_default();
                self.settle(result, aggregator);
                Ok(())
            }
            Err(err) => {
                error!(index = unit.index, "Rolling back changes of failed record failed: {}", err);
                self.settle(result, aggregator);
                Err(LoaderError::Rollback(err))
            }
        }
    }

    fn settle(&self, result: ProcessingResult, aggregator: &mut ResultAggregator) {
        if !result.failed {
            self.driver.processed().insert(result.index);
        }
        aggregator.fold(result);
    }
}
