use crate::error::{LoaderError, Result};
use crate::result::ResultLevel;
use crate::step::Step;
use crate::transaction::{RetryPolicy, WaitConfig, WaitPlan};
use serde::Deserialize;
use std::path::Path;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Loader configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoaderConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProcessingConfig {
    #[serde(default = "default_target")]
    pub target: Step,
    #[serde(default)]
    pub results_level: ResultLevel,
    #[serde(default = "default_true")]
    pub abort_on_error: bool,
    #[serde(default)]
    pub find_related_records: bool,
    #[serde(default)]
    pub parallel: bool,
    /// Defaults to the number of processors minus one
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default)]
    pub transaction: TransactionConfig,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            target: default_target(),
            results_level: ResultLevel::default(),
            abort_on_error: true,
            find_related_records: false,
            parallel: false,
            max_workers: None,
            transaction: TransactionConfig::default(),
        }
    }
}

fn default_target() -> Step {
    Step::Load
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TransactionConfig {
    #[serde(default)]
    pub enable_rollback: bool,
    #[serde(default)]
    pub retry_after_rollback: RetryPolicy,
    #[serde(default)]
    pub wait: WaitConfig,
    /// Run the members of a group concurrently
    #[serde(default, rename = "async")]
    pub parallel: bool,
}

impl LoaderConfig {
    pub fn from_json_str(s: &str) -> Result<Self> {
        let config: LoaderConfig =
            serde_json::from_str(s).map_err(LoaderError::config)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        let config: LoaderConfig =
            serde_yaml::from_str(s).map_err(LoaderError::config)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("yaml") | Some("yml") => Self::from_yaml_str(&content),
            Some("json") => Self::from_json_str(&content),
            _ => Err(LoaderError::config(format!(
                "Unsupported configuration file: {}",
                path.display()
            ))),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !LOG_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(LoaderError::config(format!(
                "Invalid log level: {}",
                self.logging.level
            )));
        }

        if self.processing.max_workers == Some(0) {
            return Err(LoaderError::config("maxWorkers must be at least 1"));
        }

        if let WaitConfig::After(steps) = &self.processing.transaction.wait {
            if let Some(step) = steps.iter().find(|step| **step > self.processing.target) {
                return Err(LoaderError::config(format!(
                    "Cannot wait after step '{}' past target '{}'",
                    step, self.processing.target
                )));
            }
        }

        Ok(())
    }

    /// Worker pool size
    pub fn effective_workers(&self) -> usize {
        self.processing
            .max_workers
            .unwrap_or_else(|| num_cpus::get().saturating_sub(1))
            .max(1)
    }

    pub fn wait_plan(&self) -> WaitPlan {
        WaitPlan::new(&self.processing.transaction.wait, self.processing.target)
    }

    /// Install the global tracing subscriber at the configured level
    pub fn init_logging(&self) -> bool {
        crate::logging::init(&self.logging.level)
    }
}
