//! Related-records transactions
//!
//! A group of related records succeeds or fails as a whole. The coordinator
//! opens the store transaction, drives every member through the pipeline
//! (one slice of steps per barrier), and on failure rolls the store back and
//! retries the whole group according to the [`RetryPolicy`].

use crate::dispatcher::{WorkDispatcher, WorkerFailure};
use crate::error::{ErrorCategory, LoaderError, Result};
use crate::hooks::Hooks;
use crate::pipeline::RecordPipeline;
use crate::record::RecordUnit;
use crate::result::{ErrorInfo, ProcessingResult};
use crate::sources::ProcessedIndices;
use crate::step::Step;
use chrono::{DateTime, Utc};
use record_loader_store::{RecordStore, RecordStoreDelta};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Where barriers go between steps
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "WaitRepr")]
pub enum WaitConfig {
    /// No barrier, members run the whole range independently
    #[default]
    None,
    /// A barrier after every step
    EveryStep,
    /// Barriers after exactly these steps
    After(Vec<Step>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WaitRepr {
    Flag(bool),
    Steps(Vec<Step>),
}

impl From<WaitRepr> for WaitConfig {
    fn from(repr: WaitRepr) -> Self {
        match repr {
            WaitRepr::Flag(true) => WaitConfig::EveryStep,
            WaitRepr::Flag(false) => WaitConfig::None,
            WaitRepr::Steps(steps) if steps.is_empty() => WaitConfig::None,
            WaitRepr::Steps(steps) => WaitConfig::After(steps),
        }
    }
}

/// Contiguous slice of steps, optionally followed by a barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub start: Step,
    pub end: Step,
    pub barrier: bool,
}

/// Slices of the step range, split at the barriers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitPlan {
    segments: Vec<Segment>,
}

impl WaitPlan {
    pub fn new(wait: &WaitConfig, target: Step) -> Self {
        let steps = Step::range(Step::Filter, target);
        let is_barrier = |step: Step| match wait {
            WaitConfig::None => false,
            WaitConfig::EveryStep => true,
            WaitConfig::After(after) => after.contains(&step),
        };

        let mut segments = Vec::new();
        let mut start: Option<Step> = None;
        for &step in steps {
            let segment_start = *start.get_or_insert(step);
            if is_barrier(step) {
                segments.push(Segment {
                    start: segment_start,
                    end: step,
                    barrier: true,
                });
                start = None;
            }
        }
        if let Some(segment_start) = start {
            segments.push(Segment {
                start: segment_start,
                end: target,
                barrier: false,
            });
        }

        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

/// What to do after a rolled back transaction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RetryRepr")]
pub enum RetryPolicy {
    #[default]
    Never,
    Unbounded,
    Bounded(u32),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RetryRepr {
    Flag(bool),
    Count(u32),
}

impl From<RetryRepr> for RetryPolicy {
    fn from(repr: RetryRepr) -> Self {
        match repr {
            RetryRepr::Flag(true) => RetryPolicy::Unbounded,
            RetryRepr::Flag(false) => RetryPolicy::Never,
            RetryRepr::Count(count) => RetryPolicy::Bounded(count),
        }
    }
}

impl RetryPolicy {
    /// Whether another attempt may follow `retries` earlier retries
    pub fn allows(&self, retries: u32) -> bool {
        match self {
            RetryPolicy::Never => false,
            RetryPolicy::Unbounded => true,
            RetryPolicy::Bounded(bound) => retries < *bound,
        }
    }
}

/// Transaction state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionState {
    Pending {
        queued_at: DateTime<Utc>,
    },
    Started {
        started_at: DateTime<Utc>,
        attempt: u32,
    },
    Processing {
        started_at: DateTime<Utc>,
        segment: usize,
    },
    BarrierWait {
        started_at: DateTime<Utc>,
        step: Step,
    },
    Committed {
        started_at: DateTime<Utc>,
        committed_at: DateTime<Utc>,
        duration_ms: u64,
    },
    Failed {
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
        error: String,
        category: ErrorCategory,
    },
    RollingBack {
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
    Aborted {
        aborted_at: DateTime<Utc>,
        reason: String,
    },
}

impl TransactionState {
    pub fn state_name(&self) -> &'static str {
        match self {
            TransactionState::Pending { .. } => "pending",
            TransactionState::Started { .. } => "started",
            TransactionState::Processing { .. } => "processing",
            TransactionState::BarrierWait { .. } => "barrier_wait",
            TransactionState::Committed { .. } => "committed",
            TransactionState::Failed { .. } => "failed",
            TransactionState::RollingBack { .. } => "rolling_back",
            TransactionState::Aborted { .. } => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed { .. } | TransactionState::Aborted { .. }
        )
    }
}

/// One group of related records and its attempt history
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub members: Vec<RecordUnit>,
    pub retries: u32,
    pub state: TransactionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(members: Vec<RecordUnit>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            members,
            retries: 0,
            state: TransactionState::Pending { queued_at: now },
            created_at: now,
            updated_at: now,
        }
    }

    pub fn indices(&self) -> Vec<usize> {
        self.members.iter().map(|member| member.index).collect()
    }
}

/// Transaction state machine for transitions
pub struct TransactionStateMachine {
    transaction: TransactionRecord,
}

impl TransactionStateMachine {
    pub fn new(transaction: TransactionRecord) -> Self {
        Self { transaction }
    }

    pub fn transaction(&self) -> &TransactionRecord {
        &self.transaction
    }

    pub fn into_transaction(self) -> TransactionRecord {
        self.transaction
    }

    fn invalid(&self, to: &str) -> LoaderError {
        LoaderError::InvalidStateTransition {
            from: self.transaction.state.state_name().to_string(),
            to: to.to_string(),
        }
    }

    fn set(&mut self, state: TransactionState) {
        self.transaction.state = state;
        self.transaction.updated_at = Utc::now();
    }

    /// Transition: PENDING → STARTED
    pub fn start(&mut self) -> Result<()> {
        match &self.transaction.state {
            TransactionState::Pending { .. } => {
                let attempt = self.transaction.retries + 1;
                self.set(TransactionState::Started {
                    started_at: Utc::now(),
                    attempt,
                });
                Ok(())
            }
            _ => Err(self.invalid("started")),
        }
    }

    /// Transition: STARTED | PROCESSING | BARRIER_WAIT → PROCESSING
    pub fn process(&mut self, segment: usize) -> Result<()> {
        match &self.transaction.state {
            TransactionState::Started { started_at, .. }
            | TransactionState::Processing { started_at, .. }
            | TransactionState::BarrierWait { started_at, .. } => {
                let started_at = *started_at;
                self.set(TransactionState::Processing {
                    started_at,
                    segment,
                });
                Ok(())
            }
            _ => Err(self.invalid("processing")),
        }
    }

    /// Transition: PROCESSING → BARRIER_WAIT
    pub fn wait(&mut self, step: Step) -> Result<()> {
        match &self.transaction.state {
            TransactionState::Processing { started_at, .. } => {
                let started_at = *started_at;
                self.set(TransactionState::BarrierWait { started_at, step });
                Ok(())
            }
            _ => Err(self.invalid("barrier_wait")),
        }
    }

    /// Transition: PROCESSING | BARRIER_WAIT → COMMITTED
    pub fn commit(&mut self) -> Result<()> {
        match &self.transaction.state {
            TransactionState::Processing { started_at, .. }
            | TransactionState::BarrierWait { started_at, .. } => {
                let started_at = *started_at;
                let now = Utc::now();
                let duration_ms = (now - started_at).num_milliseconds().max(0) as u64;
                self.set(TransactionState::Committed {
                    started_at,
                    committed_at: now,
                    duration_ms,
                });
                Ok(())
            }
            _ => Err(self.invalid("committed")),
        }
    }

    /// Transition: STARTED | PROCESSING | BARRIER_WAIT → FAILED
    pub fn fail(&mut self, error: String, category: ErrorCategory) -> Result<()> {
        match &self.transaction.state {
            TransactionState::Started { started_at, .. }
            | TransactionState::Processing { started_at, .. }
            | TransactionState::BarrierWait { started_at, .. } => {
                let started_at = *started_at;
                self.set(TransactionState::Failed {
                    started_at,
                    failed_at: Utc::now(),
                    error,
                    category,
                });
                Ok(())
            }
            _ => Err(self.invalid("failed")),
        }
    }

    /// Transition: FAILED → ROLLING_BACK
    pub fn roll_back(&mut self) -> Result<()> {
        match &self.transaction.state {
            TransactionState::Failed {
                started_at,
                failed_at,
                ..
            } => {
                let (started_at, failed_at) = (*started_at, *failed_at);
                self.set(TransactionState::RollingBack {
                    started_at,
                    failed_at,
                });
                Ok(())
            }
            _ => Err(self.invalid("rolling_back")),
        }
    }

    /// Transition: ROLLING_BACK → PENDING (next attempt)
    pub fn retry(&mut self) -> Result<()> {
        match &self.transaction.state {
            TransactionState::RollingBack { .. } => {
                self.transaction.retries += 1;
                self.set(TransactionState::Pending {
                    queued_at: Utc::now(),
                });
                Ok(())
            }
            _ => Err(self.invalid("pending (retry)")),
        }
    }

    /// Transition: * → ABORTED
    pub fn abort(&mut self, reason: String) -> Result<()> {
        if self.transaction.state.is_terminal() {
            return Err(self.invalid("aborted"));
        }
        self.set(TransactionState::Aborted {
            aborted_at: Utc::now(),
            reason,
        });
        Ok(())
    }
}

/// Transaction settings
#[derive(Debug, Clone)]
pub struct TransactionOptions {
    pub enable_rollback: bool,
    pub retry: RetryPolicy,
    pub plan: WaitPlan,
    /// Dispatch the members of a slice concurrently
    pub parallel: bool,
}

/// Committed transaction
#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub id: Uuid,
    /// Member results, in member order
    pub results: Vec<ProcessingResult>,
    pub retries: u32,
}

/// Transaction that did not commit. Every member result is marked failed.
#[derive(Debug)]
pub struct TransactionFailure {
    pub error: LoaderError,
    pub results: Vec<ProcessingResult>,
    pub retries: u32,
}

impl TransactionFailure {
    /// Whether the whole run must stop regardless of `abortOnError`
    pub fn is_fatal(&self) -> bool {
        !matches!(self.error, LoaderError::TransactionFailed { .. })
    }
}

impl From<LoaderError> for TransactionFailure {
    fn from(error: LoaderError) -> Self {
        Self {
            error,
            results: Vec::new(),
            retries: 0,
        }
    }
}

/// One failed attempt
struct AttemptFailure {
    error: LoaderError,
    slots: Vec<Option<ProcessingResult>>,
}

impl From<LoaderError> for AttemptFailure {
    fn from(error: LoaderError) -> Self {
        Self {
            error,
            slots: Vec::new(),
        }
    }
}

/// Runs groups of related records as store transactions
pub struct TransactionCoordinator {
    pipeline: Arc<RecordPipeline>,
    store: Arc<dyn RecordStore>,
    hooks: Hooks,
    dispatcher: WorkDispatcher,
    processed: ProcessedIndices,
    options: TransactionOptions,
}

impl TransactionCoordinator {
    pub fn new(
        pipeline: Arc<RecordPipeline>,
        store: Arc<dyn RecordStore>,
        hooks: Hooks,
        dispatcher: WorkDispatcher,
        processed: ProcessedIndices,
        options: TransactionOptions,
    ) -> Self {
        Self {
            pipeline,
            store,
            hooks,
            dispatcher,
            processed,
            options,
        }
    }

    pub fn options(&self) -> &TransactionOptions {
        &self.options
    }

    /// Process `members` as one transaction.
    ///
    /// On success every member index is added to the processed set.
    pub async fn run(
        &self,
        members: Vec<RecordUnit>,
    ) -> std::result::Result<TransactionOutcome, TransactionFailure> {
        let mut machine = TransactionStateMachine::new(TransactionRecord::new(members));
        let id = machine.transaction().id;
        let members = machine.transaction().members.clone();

        info!(
            "Starting transaction {} for {} related records",
            id,
            members.len()
        );

        if let Err(e) = self.hooks.before_transaction(&members).await {
            error!("Transaction {} interrupted by beforeTransaction hook: {}", id, e);
            machine.abort(e.to_string())?;
            let results = Self::fail_members(&members, Vec::new(), &ErrorInfo::new(e.to_string()));
            return Err(TransactionFailure {
                error: e,
                results,
                retries: 0,
            });
        }

        loop {
            machine.start()?;
            self.store.toggle_transaction(true);

            let failure = match self.attempt(&members, &mut machine).await {
                Ok(results) => {
                    self.store.toggle_transaction(false);
                    machine.commit()?;
                    self.processed.extend(machine.transaction().indices());

                    let retries = machine.transaction().retries;
                    info!(retries, "Transaction {} committed", id);
                    return Ok(TransactionOutcome {
                        id,
                        results,
                        retries,
                    });
                }
                Err(failure) => failure,
            };

            let AttemptFailure { error, mut slots } = failure;
            let category = error.category();
            let reason = match &error {
                LoaderError::Processor(e) => e.cause_message(),
                other => other.to_string(),
            };
            warn!("Transaction {} failed: {}", id, reason);
            machine.fail(reason.clone(), category)?;

            if !self.options.enable_rollback {
                self.store.toggle_transaction(false);
                return Err(self.reject(&mut machine, &members, slots, error, reason)?);
            }

            machine.roll_back()?;
            info!("Rolling back changes of transaction {} in the record store", id);

            let mut prior = RecordStoreDelta::default();
            for result in slots.iter().flatten() {
                prior.extend(result.record_store.clone());
            }

            match self.store.rollback(Some(&prior)).await {
                Ok(residual) => {
                    // Rolled back mutations no longer count for the members
                    for result in slots.iter_mut().flatten() {
                        result.record_store = RecordStoreDelta::default();
                    }
                    if let Some(residual) = residual {
                        if let Some(result) = slots.iter_mut().flatten().find(|r| r.failed) {
                            result.record_store = residual;
                        }
                    }
                }
                Err(e) => {
                    error!("Rolling back transaction {} failed: {}", id, e);
                    machine.abort(e.to_string())?;
                    let info = ErrorInfo::new(format!("Rolling back record store changes failed: {}", e));
                    let results = Self::fail_members(&members, slots, &info);
                    return Err(TransactionFailure {
                        error: LoaderError::Rollback(e),
                        results,
                        retries: machine.transaction().retries,
                    });
                }
            }

            let retries = machine.transaction().retries;
            if category.is_retryable() && self.options.retry.allows(retries) {
                machine.retry()?;
                warn!(
                    retries = retries + 1,
                    "Retrying transaction {} after rollback", id
                );
                continue;
            }

            return Err(self.reject(&mut machine, &members, slots, error, reason)?);
        }
    }

    /// Final failure of the transaction after its last attempt
    fn reject(
        &self,
        machine: &mut TransactionStateMachine,
        members: &[RecordUnit],
        slots: Vec<Option<ProcessingResult>>,
        error: LoaderError,
        reason: String,
    ) -> Result<TransactionFailure> {
        let retries = machine.transaction().retries;
        let error = match error {
            LoaderError::Hook { .. } => error,
            _ => {
                let message = if retries > 0 {
                    format!("Transaction failed after {} retries: {}", retries, reason)
                } else {
                    format!("Transaction failed: {}", reason)
                };
                LoaderError::TransactionFailed { retries, message }
            }
        };

        error!("Transaction {} aborted: {}", machine.transaction().id, error);
        machine.abort(error.to_string())?;

        let results = Self::fail_members(members, slots, &ErrorInfo::new(error.to_string()));
        Ok(TransactionFailure {
            error,
            results,
            retries,
        })
    }

    /// Member results for a transaction that did not commit. Members that
    /// failed themselves keep their own error.
    fn fail_members(
        members: &[RecordUnit],
        slots: Vec<Option<ProcessingResult>>,
        info: &ErrorInfo,
    ) -> Vec<ProcessingResult> {
        let mut slots = slots.into_iter();
        members
            .iter()
            .map(|member| {
                let mut result = slots
                    .next()
                    .flatten()
                    .unwrap_or_else(|| ProcessingResult::new(member));
                if !result.failed {
                    result.fail(info.clone());
                }
                result
            })
            .collect()
    }

    async fn attempt(
        &self,
        members: &[RecordUnit],
        machine: &mut TransactionStateMachine,
    ) -> std::result::Result<Vec<ProcessingResult>, AttemptFailure> {
        let mut slots: Vec<Option<ProcessingResult>> = vec![None; members.len()];

        for (position, segment) in self.options.plan.segments().iter().enumerate() {
            machine.process(position)?;
            debug!(
                "Transaction {}: steps {}..={}",
                machine.transaction().id,
                segment.start,
                segment.end
            );

            if self.options.parallel {
                self.run_parallel(members, segment.start, segment.end, &mut slots)
                    .await?;
            } else {
                self.run_sequential(members, segment.start, segment.end, &mut slots)
                    .await?;
            }

            if segment.barrier {
                machine.wait(segment.end)?;
                let so_far: Vec<ProcessingResult> = slots.iter().flatten().cloned().collect();
                if let Err(error) = self.hooks.after_wait(segment.end, &so_far).await {
                    return Err(AttemptFailure { error, slots });
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }

    async fn run_sequential(
        &self,
        members: &[RecordUnit],
        start: Step,
        end: Step,
        slots: &mut Vec<Option<ProcessingResult>>,
    ) -> std::result::Result<(), AttemptFailure> {
        for (position, member) in members.iter().enumerate() {
            let prior = slots[position].take();
            match self.pipeline.process(member, start, end, prior).await {
                Ok(result) => slots[position] = Some(result),
                Err(e) => {
                    slots[position] = Some(e.failed_result());
                    return Err(AttemptFailure {
                        error: LoaderError::Processor(e),
                        slots: std::mem::take(slots),
                    });
                }
            }
        }
        Ok(())
    }

    async fn run_parallel(
        &self,
        members: &[RecordUnit],
        start: Step,
        end: Step,
        slots: &mut Vec<Option<ProcessingResult>>,
    ) -> std::result::Result<(), AttemptFailure> {
        let jobs: Vec<_> = members
            .iter()
            .enumerate()
            .map(|(position, member)| {
                let pipeline = self.pipeline.clone();
                let member = member.clone();
                let prior = slots[position].clone();
                async move { pipeline.process(&member, start, end, prior).await }
            })
            .collect();

        match self.dispatcher.dispatch(jobs).await {
            Ok(results) => {
                for (slot, result) in slots.iter_mut().zip(results) {
                    *slot = Some(result);
                }
                Ok(())
            }
            Err(failure) => {
                for (slot, result) in slots.iter_mut().zip(failure.completed) {
                    if result.is_some() {
                        *slot = result;
                    }
                }

                let error = match failure.cause {
                    WorkerFailure::Failed(e) => {
                        if let Some(position) = failure.position {
                            slots[position] = Some(e.failed_result());
                        }
                        LoaderError::Processor(e)
                    }
                    WorkerFailure::Panicked(message) => LoaderError::Worker(message),
                };

                Err(AttemptFailure {
                    error,
                    slots: std::mem::take(slots),
                })
            }
        }
    }
}
