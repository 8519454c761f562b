use crate::record::RecordUnit;
use crate::step::Step;
use record_loader_store::RecordStoreDelta;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Uniform error shape attached to failed records and failed runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<Step>,
    /// Messages of the error's source chain, outermost first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            step: None,
            details: Vec::new(),
        }
    }

    /// Normalize any error into the report shape
    pub fn from_error(err: &(dyn std::error::Error + 'static), step: Option<Step>) -> Self {
        let mut details = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            details.push(cause.to_string());
            source = cause.source();
        }

        Self {
            message: err.to_string(),
            step,
            details,
        }
    }
}

/// Full per-record result, as accumulated by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingResult {
    pub index: usize,
    /// Record as read from the source
    pub input: Value,
    /// Data threaded between steps. `None` once the record was dropped.
    pub data: Option<Value>,
    /// Last step that completed
    pub step: Option<Step>,
    pub processed: bool,
    pub skipped: bool,
    pub failed: bool,
    pub record_store: RecordStoreDelta,
    pub matched: Vec<Value>,
    pub merged: Vec<Value>,
    /// Step-specific data returned by processors
    pub additional: BTreeMap<Step, Value>,
    pub error: Option<ErrorInfo>,
}

impl ProcessingResult {
    pub fn new(unit: &RecordUnit) -> Self {
        Self {
            index: unit.index,
            input: unit.data.clone(),
            data: Some(unit.data.clone()),
            step: None,
            processed: false,
            skipped: false,
            failed: false,
            record_store: RecordStoreDelta::default(),
            matched: Vec::new(),
            merged: Vec::new(),
            additional: BTreeMap::new(),
            error: None,
        }
    }

    pub fn skip(&mut self) {
        self.skipped = true;
        self.processed = false;
        self.data = None;
    }

    pub fn fail(&mut self, info: ErrorInfo) {
        self.failed = true;
        self.processed = false;
        self.error = Some(info);
    }

    pub fn succeeded(&self) -> bool {
        !self.skipped && !self.failed
    }
}

/// Report verbosity. Named levels are presets of the three flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "ResultLevelRepr")]
pub struct ResultLevel {
    pub statistics: bool,
    pub record_meta_data: bool,
    pub record_data: bool,
}

impl ResultLevel {
    pub const STATISTICS_BIT: u8 = 1;
    pub const RECORD_META_DATA_BIT: u8 = 2;
    pub const RECORD_DATA_BIT: u8 = 4;

    pub const TOTAL: ResultLevel = ResultLevel {
        statistics: true,
        record_meta_data: false,
        record_data: false,
    };

    pub const RECORD: ResultLevel = ResultLevel {
        statistics: true,
        record_meta_data: true,
        record_data: false,
    };

    pub const DEBUG: ResultLevel = ResultLevel {
        statistics: true,
        record_meta_data: true,
        record_data: true,
    };

    pub fn from_bits(bits: u8) -> Self {
        Self {
            statistics: bits & Self::STATISTICS_BIT != 0,
            record_meta_data: bits & Self::RECORD_META_DATA_BIT != 0,
            record_data: bits & Self::RECORD_DATA_BIT != 0,
        }
    }

    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.statistics {
            bits |= Self::STATISTICS_BIT;
        }
        if self.record_meta_data {
            bits |= Self::RECORD_META_DATA_BIT;
        }
        if self.record_data {
            bits |= Self::RECORD_DATA_BIT;
        }
        bits
    }

    /// Whether the report carries a `records` list
    pub fn includes_records(&self) -> bool {
        self.record_meta_data || self.record_data
    }
}

impl Default for ResultLevel {
    fn default() -> Self {
        Self::RECORD
    }
}

impl std::str::FromStr for ResultLevel {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "total" => Ok(Self::TOTAL),
            "record" => Ok(Self::RECORD),
            "debug" => Ok(Self::DEBUG),
            _ => Err(format!("Invalid results level: {}", s)),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ResultLevelRepr {
    Name(String),
    Bits(u8),
    #[serde(rename_all = "camelCase")]
    Flags {
        #[serde(default)]
        statistics: bool,
        #[serde(default)]
        record_meta_data: bool,
        #[serde(default)]
        record_data: bool,
    },
}

impl TryFrom<ResultLevelRepr> for ResultLevel {
    type Error = String;

    fn try_from(repr: ResultLevelRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            ResultLevelRepr::Name(name) => name.parse(),
            ResultLevelRepr::Bits(bits) => Ok(ResultLevel::from_bits(bits)),
            ResultLevelRepr::Flags {
                statistics,
                record_meta_data,
                record_data,
            } => Ok(ResultLevel {
                statistics,
                record_meta_data,
                record_data,
            }),
        }
    }
}

/// Per-record entry of the report (projection of [`ProcessingResult`])
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedRecord {
    pub index: usize,
    pub failed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<Step>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_store: Option<RecordStoreDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merged: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional: Option<BTreeMap<Step, Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Ok,
    Aborted,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Ok => "ok",
            RunStatus::Aborted => "aborted",
            RunStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatistics {
    /// Records folded into the report, whatever their outcome
    pub processed: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub record_store: StoreCounts,
    pub merged: usize,
    pub matched: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSummary {
    pub retries: u32,
}

/// Final outcome of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<RunStatistics>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub records: Option<Vec<ReportedRecord>>,
    #[serde(default)]
    pub transactions: Vec<TransactionSummary>,
    /// Whole-run error message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl RunReport {
    pub fn is_ok(&self) -> bool {
        self.status == RunStatus::Ok
    }

    pub fn record(&self, index: usize) -> Option<&ReportedRecord> {
        self.records
            .as_ref()
            .and_then(|records| records.iter().find(|record| record.index == index))
    }
}
