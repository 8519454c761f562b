use crate::error::Result;
use crate::step::Step;
use async_trait::async_trait;
use record_loader_store::RecordStoreDelta;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

/// Processor input
#[derive(Debug, Clone, PartialEq)]
pub struct StageInput {
    pub data: Value,
    /// Matched records for merge, merged records for load, empty otherwise
    pub side_channel: Vec<Value>,
}

impl StageInput {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            side_channel: Vec::new(),
        }
    }
}

/// Processor output
///
/// Each step reads only the fields it understands. A filter, preprocess,
/// match or merge output without `data` drops the record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageOutput {
    pub data: Option<Value>,
    /// Explicit filter verdict. When unset the filter passes iff `data` is
    /// present and neither `null` nor `false`.
    pub passed: Option<bool>,
    /// Matched (match step) or merged (merge step) records
    pub candidates: Vec<Value>,
    pub record_store: Option<RecordStoreDelta>,
    pub additional: Option<Value>,
}

impl StageOutput {
    pub fn value(data: Value) -> Self {
        Self {
            data: Some(data),
            ..Default::default()
        }
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn pass() -> Self {
        Self {
            passed: Some(true),
            ..Default::default()
        }
    }

    pub fn reject() -> Self {
        Self {
            passed: Some(false),
            ..Default::default()
        }
    }

    pub fn with_candidates(data: Value, candidates: Vec<Value>) -> Self {
        Self {
            data: Some(data),
            candidates,
            ..Default::default()
        }
    }

    pub fn loaded(delta: RecordStoreDelta) -> Self {
        Self {
            record_store: Some(delta),
            ..Default::default()
        }
    }

    pub fn with_additional(mut self, additional: Value) -> Self {
        self.additional = Some(additional);
        self
    }
}

/// Stage processor (pluggable per step)
#[async_trait]
pub trait Processor: Send + Sync {
    async fn run(&self, input: StageInput) -> Result<StageOutput>;
}

/// Returns its input unchanged
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

#[async_trait]
impl Processor for PassThrough {
    async fn run(&self, input: StageInput) -> Result<StageOutput> {
        Ok(StageOutput::value(input.data))
    }
}

/// Adapts an async closure into a [`Processor`]
pub struct FnProcessor<F> {
    f: F,
}

impl<F> FnProcessor<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Processor for FnProcessor<F>
where
    F: Fn(StageInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StageOutput>> + Send + 'static,
{
    async fn run(&self, input: StageInput) -> Result<StageOutput> {
        (self.f)(input).await
    }
}

/// Shorthand for `Arc::new(FnProcessor::new(f))`
pub fn processor_fn<F, Fut>(f: F) -> Arc<dyn Processor>
where
    F: Fn(StageInput) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<StageOutput>> + Send + 'static,
{
    Arc::new(FnProcessor::new(f))
}

/// At most one processor per step, bound at assembly time
#[derive(Clone, Default)]
pub struct ProcessorSet {
    processors: HashMap<Step, Arc<dyn Processor>>,
}

impl ProcessorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every step bound to [`PassThrough`]
    pub fn pass_through() -> Self {
        let mut set = Self::new();
        for step in crate::step::STEP_ORDER {
            set.register(step, Arc::new(PassThrough));
        }
        set
    }

    /// Bind `processor` to `step`, returning the processor it replaces
    pub fn register(
        &mut self,
        step: Step,
        processor: Arc<dyn Processor>,
    ) -> Option<Arc<dyn Processor>> {
        self.processors.insert(step, processor)
    }

    pub fn get(&self, step: Step) -> Option<&Arc<dyn Processor>> {
        self.processors.get(&step)
    }

    pub fn contains(&self, step: Step) -> bool {
        self.processors.contains_key(&step)
    }

    /// First step up to `target` with no processor bound
    pub fn first_missing(&self, target: Step) -> Option<Step> {
        Step::range(Step::Filter, target)
            .iter()
            .copied()
            .find(|step| !self.contains(*step))
    }
}

impl std::fmt::Debug for ProcessorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut steps: Vec<&Step> = self.processors.keys().collect();
        steps.sort();
        f.debug_struct("ProcessorSet").field("steps", &steps).finish()
    }
}
