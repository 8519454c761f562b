use crate::result::{ErrorInfo, ProcessingResult, RunReport};
use crate::step::Step;
use record_loader_store::StoreError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LoaderError>;

#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Target processing step cannot be reached because of an invalid/undefined processor: {step}")]
    StepUnreachable { step: Step },

    #[error(transparent)]
    Processor(#[from] PipelineError),

    #[error("Record store error: {0}")]
    Store(#[from] StoreError),

    #[error("Processing interrupted by {hook} hook: {message}")]
    Hook { hook: String, message: String },

    #[error("{message}")]
    TransactionFailed { retries: u32, message: String },

    #[error("Rolling back record store changes failed: {0}")]
    Rollback(#[source] StoreError),

    #[error("Record source error: {0}")]
    Source(String),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Worker failed: {0}")]
    Worker(String),

    /// Whole-run failure. `report` holds everything folded before the failure.
    #[error("{cause}")]
    RunFailed {
        #[source]
        cause: Box<LoaderError>,
        report: Box<RunReport>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LoaderError {
    pub fn config<E: std::fmt::Display>(e: E) -> Self {
        Self::Config(e.to_string())
    }

    pub fn record_source<E: std::fmt::Display>(e: E) -> Self {
        Self::Source(e.to_string())
    }

    pub fn serialization<E: std::fmt::Display>(e: E) -> Self {
        Self::Serialization(e.to_string())
    }

    pub fn hook(hook: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Hook {
            hook: hook.into(),
            message: message.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            LoaderError::Config(_) | LoaderError::StepUnreachable { .. } => {
                ErrorCategory::Configuration
            }
            LoaderError::Processor(e) => e.cause.category(),
            LoaderError::Hook { .. } => ErrorCategory::Hook,
            LoaderError::Rollback(_) => ErrorCategory::Rollback,
            LoaderError::Store(_) | LoaderError::Other(_) => ErrorCategory::Processing,
            LoaderError::RunFailed { cause, .. } => cause.category(),
            LoaderError::TransactionFailed { .. }
            | LoaderError::Source(_)
            | LoaderError::InvalidStateTransition { .. }
            | LoaderError::Serialization(_)
            | LoaderError::Worker(_) => ErrorCategory::Unexpected,
        }
    }
}

impl From<serde_json::Error> for LoaderError {
    fn from(err: serde_json::Error) -> Self {
        LoaderError::serialization(err)
    }
}

impl From<serde_yaml::Error> for LoaderError {
    fn from(err: serde_yaml::Error) -> Self {
        LoaderError::serialization(err)
    }
}

impl From<std::io::Error> for LoaderError {
    fn from(err: std::io::Error) -> Self {
        LoaderError::Other(err.into())
    }
}

/// Stage failure attributed to one record
///
/// Carries the step that failed and the record's result as accumulated up to
/// that step, so the caller can attribute blame and roll back.
#[derive(Debug, Error)]
#[error("Processing step '{step}' failed: {cause}")]
pub struct PipelineError {
    pub step: Step,
    pub partial: Box<ProcessingResult>,
    #[source]
    pub cause: Box<LoaderError>,
}

impl PipelineError {
    pub fn new(step: Step, partial: ProcessingResult, cause: LoaderError) -> Self {
        Self {
            step,
            partial: Box::new(partial),
            cause: Box::new(cause),
        }
    }

    pub fn index(&self) -> usize {
        self.partial.index
    }

    /// Whether a rollback-and-retry may recover from this failure
    pub fn is_retryable(&self) -> bool {
        self.cause.category().is_retryable()
    }

    /// Message of the underlying cause, without the step prefix
    pub fn cause_message(&self) -> String {
        self.cause.to_string()
    }

    /// Copy of the partial result, marked failed with this error attached
    pub fn failed_result(&self) -> ProcessingResult {
        let mut result = (*self.partial).clone();
        result.fail(ErrorInfo::from_error(&*self.cause, Some(self.step)));
        result
    }

    /// The partial result, marked failed with this error attached
    pub fn into_result(self) -> ProcessingResult {
        let info = ErrorInfo::from_error(&*self.cause, Some(self.step));
        let mut result = *self.partial;
        result.fail(info);
        result
    }
}

/// Error category (decides whether a transaction may be retried)
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Invalid target, missing module, unreachable step - fatal, never retried
    Configuration,
    /// Stage processor or store failure - recoverable by rollback and retry
    Processing,
    /// Hook rejection - fatal for the current transaction attempt
    Hook,
    /// Rollback itself failed - fatal for the whole run
    Rollback,
    /// Anything else
    Unexpected,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Configuration => "configuration",
            ErrorCategory::Processing => "processing",
            ErrorCategory::Hook => "hook",
            ErrorCategory::Rollback => "rollback",
            ErrorCategory::Unexpected => "unexpected",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorCategory::Processing)
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
