//! Per-record step iteration
//!
//! A record runs through a contiguous slice of [`STEP_ORDER`](crate::step::STEP_ORDER).
//! Transactions with barriers run the same record in several slices, each
//! resuming from the result of the previous one.

use crate::error::PipelineError;
use crate::processor::ProcessorSet;
use crate::record::RecordUnit;
use crate::result::ProcessingResult;
use crate::step::Step;
use crate::step_runner::{StageResult, StepRunner};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RecordPipeline {
    runner: StepRunner,
    target: Step,
}

impl RecordPipeline {
    pub fn new(processors: ProcessorSet, target: Step) -> Self {
        Self {
            runner: StepRunner::new(processors),
            target,
        }
    }

    pub fn target(&self) -> Step {
        self.target
    }

    /// Run the whole configured range for `unit`
    pub async fn process_all(&self, unit: &RecordUnit) -> Result<ProcessingResult, PipelineError> {
        self.process(unit, Step::Filter, self.target, None).await
    }

    /// Run `unit` through the steps `start..=stop`.
    ///
    /// `prior` is the result of an earlier slice for the same record. A record
    /// that was dropped in an earlier slice is returned unchanged.
    pub async fn process(
        &self,
        unit: &RecordUnit,
        start: Step,
        stop: Step,
        prior: Option<ProcessingResult>,
    ) -> Result<ProcessingResult, PipelineError> {
        let mut result = prior.unwrap_or_else(|| ProcessingResult::new(unit));
        if result.skipped {
            return Ok(result);
        }

        for &step in Step::range(start, stop) {
            let data = result.data.clone().unwrap_or_else(|| unit.data.clone());
            let side_channel = match step {
                Step::Merge => result.matched.clone(),
                Step::Load => result.merged.clone(),
                _ => Vec::new(),
            };

            let outcome = self.runner.run(step, data, side_channel, &result).await?;

            if let Some(additional) = outcome.additional {
                result.additional.insert(step, additional);
            }
            result.step = Some(step);

            match outcome.result {
                StageResult::Filter { data: None, .. }
                | StageResult::Preprocess { data: None }
                | StageResult::Match { data: None, .. }
                | StageResult::Merge { data: None, .. } => {
                    debug!(index = unit.index, step = %step, "Record dropped");
                    result.skip();
                    return Ok(result);
                }
                StageResult::Filter { data: Some(data), .. }
                | StageResult::Preprocess { data: Some(data) } => {
                    result.data = Some(data);
                }
                StageResult::Match {
                    data: Some(data),
                    matched,
                } => {
                    result.data = Some(data);
                    result.matched = matched;
                }
                StageResult::Merge {
                    data: Some(data),
                    merged,
                } => {
                    result.data = Some(data);
                    result.merged = merged;
                }
                StageResult::Load { record_store } => {
                    result.record_store = record_store;
                }
            }
        }

        if stop == self.target {
            result.processed = true;
        }

        Ok(result)
    }
}
