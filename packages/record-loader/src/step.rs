use crate::error::{LoaderError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Processing step, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Filter,
    Preprocess,
    Match,
    Merge,
    Load,
}

/// Fixed, total order of the processing steps
pub const STEP_ORDER: [Step; 5] = [
    Step::Filter,
    Step::Preprocess,
    Step::Match,
    Step::Merge,
    Step::Load,
];

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Filter => "filter",
            Step::Preprocess => "preprocess",
            Step::Match => "match",
            Step::Merge => "merge",
            Step::Load => "load",
        }
    }

    /// Position in [`STEP_ORDER`]
    pub fn position(self) -> usize {
        self as usize
    }

    pub fn next(self) -> Option<Step> {
        STEP_ORDER.get(self.position() + 1).copied()
    }

    /// Steps from `start` to `end`, both inclusive. Empty when `start` comes
    /// after `end`.
    pub fn range(start: Step, end: Step) -> &'static [Step] {
        if start > end {
            &[]
        } else {
            &STEP_ORDER[start.position()..=end.position()]
        }
    }
}

impl FromStr for Step {
    type Err = LoaderError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "filter" => Ok(Step::Filter),
            "preprocess" => Ok(Step::Preprocess),
            "match" => Ok(Step::Match),
            "merge" => Ok(Step::Merge),
            "load" => Ok(Step::Load),
            _ => Err(LoaderError::config(format!("Invalid processing step: {}", s))),
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
