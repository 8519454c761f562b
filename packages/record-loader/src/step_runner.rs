use crate::error::{LoaderError, PipelineError};
use crate::processor::{ProcessorSet, StageInput, StageOutput};
use crate::result::ProcessingResult;
use crate::step::Step;
use record_loader_store::RecordStoreDelta;
use serde_json::Value;
use tracing::debug;

/// Normalized output of one step for one record
#[derive(Debug, Clone, PartialEq)]
pub enum StageResult {
    /// `data` is the original input when the record passed, `None` otherwise
    Filter { passed: bool, data: Option<Value> },
    Preprocess { data: Option<Value> },
    Match { data: Option<Value>, matched: Vec<Value> },
    Merge { data: Option<Value>, merged: Vec<Value> },
    Load { record_store: RecordStoreDelta },
}

impl StageResult {
    pub fn step(&self) -> Step {
        match self {
            StageResult::Filter { .. } => Step::Filter,
            StageResult::Preprocess { .. } => Step::Preprocess,
            StageResult::Match { .. } => Step::Match,
            StageResult::Merge { .. } => Step::Merge,
            StageResult::Load { .. } => Step::Load,
        }
    }

    /// Data to thread into the next step. `None` drops the record.
    pub fn data(&self) -> Option<&Value> {
        match self {
            StageResult::Filter { data, .. }
            | StageResult::Preprocess { data }
            | StageResult::Match { data, .. }
            | StageResult::Merge { data, .. } => data.as_ref(),
            StageResult::Load { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepOutcome {
    pub result: StageResult,
    pub additional: Option<Value>,
}

fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

/// Runs one step for one record against the bound processor
#[derive(Debug, Clone)]
pub struct StepRunner {
    processors: ProcessorSet,
}

impl StepRunner {
    pub fn new(processors: ProcessorSet) -> Self {
        Self { processors }
    }

    pub fn processors(&self) -> &ProcessorSet {
        &self.processors
    }

    /// Run `step` with `data`.
    ///
    /// `current` is the record's result accumulated so far; failures carry a
    /// copy of it.
    pub async fn run(
        &self,
        step: Step,
        data: Value,
        side_channel: Vec<Value>,
        current: &ProcessingResult,
    ) -> Result<StepOutcome, PipelineError> {
        let processor = self.processors.get(step).ok_or_else(|| {
            PipelineError::new(
                step,
                current.clone(),
                LoaderError::StepUnreachable { step },
            )
        })?;

        debug!(index = current.index, step = %step, "Running processor");

        let input = StageInput {
            data: data.clone(),
            side_channel,
        };
        let output = processor
            .run(input)
            .await
            .map_err(|e| PipelineError::new(step, current.clone(), e))?;

        Ok(Self::normalize(step, data, output))
    }

    fn normalize(step: Step, input: Value, output: StageOutput) -> StepOutcome {
        let StageOutput {
            data,
            passed,
            candidates,
            record_store,
            additional,
        } = output;

        let result = match step {
            Step::Filter => {
                let passed = passed.unwrap_or_else(|| data.as_ref().is_some_and(is_truthy));
                StageResult::Filter {
                    passed,
                    data: passed.then_some(input),
                }
            }
            Step::Preprocess => StageResult::Preprocess {
                data: data.filter(|value| !value.is_null()),
            },
            Step::Match => StageResult::Match {
                data: data.filter(|value| !value.is_null()),
                matched: candidates,
            },
            Step::Merge => StageResult::Merge {
                data: data.filter(|value| !value.is_null()),
                merged: candidates,
            },
            Step::Load => StageResult::Load {
                record_store: record_store.unwrap_or_default(),
            },
        };

        StepOutcome { result, additional }
    }
}
