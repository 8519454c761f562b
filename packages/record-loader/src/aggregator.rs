use crate::error::Result;
use crate::result::{
    ErrorInfo, ProcessingResult, ReportedRecord, ResultLevel, RunReport, RunStatistics,
    RunStatus, TransactionSummary,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Shapes the report
pub trait ResultFormatter: Send + Sync {
    /// Project one record's result for the report
    fn format_record(&self, level: ResultLevel, result: &ProcessingResult) -> ReportedRecord;

    /// Final pass over the whole report. An error aborts the run.
    fn finalize(&self, report: RunReport) -> Result<RunReport> {
        Ok(report)
    }
}

/// Level-driven projection: error fields always, the record's data with
/// `recordData`, everything else with `recordMetaData`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFormatter;

impl ResultFormatter for DefaultFormatter {
    fn format_record(&self, level: ResultLevel, result: &ProcessingResult) -> ReportedRecord {
        let meta = level.record_meta_data;

        ReportedRecord {
            index: result.index,
            failed: result.failed,
            error: result.error.clone(),
            skipped: meta.then_some(result.skipped),
            step: if meta { result.step } else { None },
            record_store: meta.then(|| result.record_store.clone()),
            matched: meta.then(|| result.matched.clone()),
            merged: meta.then(|| result.merged.clone()),
            additional: (meta && !result.additional.is_empty())
                .then(|| result.additional.clone()),
            record: level
                .record_data
                .then(|| result.data.clone().unwrap_or_else(|| result.input.clone())),
        }
    }
}

/// Folds per-record results into the run report.
///
/// Results are kept by record index: folding an index again replaces the
/// earlier result and its contribution to the totals.
pub struct ResultAggregator {
    level: ResultLevel,
    abort_on_error: bool,
    formatter: Arc<dyn ResultFormatter>,
    results: BTreeMap<usize, ProcessingResult>,
    totals: RunStatistics,
    transactions: Vec<TransactionSummary>,
    fatal: Option<ErrorInfo>,
}

impl ResultAggregator {
    pub fn new(level: ResultLevel, abort_on_error: bool) -> Self {
        Self::with_formatter(level, abort_on_error, Arc::new(DefaultFormatter))
    }

    pub fn with_formatter(
        level: ResultLevel,
        abort_on_error: bool,
        formatter: Arc<dyn ResultFormatter>,
    ) -> Self {
        Self {
            level,
            abort_on_error,
            formatter,
            results: BTreeMap::new(),
            totals: RunStatistics::default(),
            transactions: Vec::new(),
            fatal: None,
        }
    }

    pub fn fold(&mut self, result: ProcessingResult) {
        if let Some(previous) = self.results.remove(&result.index) {
            self.apply(&previous, false);
        }
        self.apply(&result, true);
        self.results.insert(result.index, result);
    }

    pub fn fold_all(&mut self, results: impl IntoIterator<Item = ProcessingResult>) {
        for result in results {
            self.fold(result);
        }
    }

    pub fn record_transaction(&mut self, retries: u32) {
        self.transactions.push(TransactionSummary { retries });
    }

    /// Record a whole-run failure. The report's status becomes `failed`.
    pub fn fail(&mut self, err: &(dyn std::error::Error + 'static)) {
        self.fatal = Some(ErrorInfo::from_error(err, None));
    }

    pub fn has_failures(&self) -> bool {
        self.totals.failed > 0
    }

    /// Whether processing should stop under `abortOnError`
    pub fn should_abort(&self) -> bool {
        self.abort_on_error && self.has_failures()
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.totals
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    fn apply(&mut self, result: &ProcessingResult, add: bool) {
        let totals = &mut self.totals;
        let step = |counter: &mut usize, amount: usize| {
            if add {
                *counter += amount;
            } else {
                *counter = counter.saturating_sub(amount);
            }
        };

        let (created, updated, deleted) = result.record_store.counts();
        step(&mut totals.processed, 1);
        step(&mut totals.succeeded, usize::from(result.succeeded()));
        step(&mut totals.skipped, usize::from(result.skipped));
        step(&mut totals.failed, usize::from(result.failed));
        step(&mut totals.record_store.created, created);
        step(&mut totals.record_store.updated, updated);
        step(&mut totals.record_store.deleted, deleted);
        step(&mut totals.merged, result.merged.len());
        step(&mut totals.matched, result.matched.len());
    }

    pub fn finalize(self) -> RunReport {
        let status = if self.fatal.is_some() {
            RunStatus::Failed
        } else if self.should_abort() {
            RunStatus::Aborted
        } else {
            RunStatus::Ok
        };

        let records = self.level.includes_records().then(|| {
            self.results
                .values()
                .map(|result| self.formatter.format_record(self.level, result))
                .collect()
        });

        let (message, details) = match self.fatal {
            Some(info) => (Some(info.message), info.details),
            None => (None, Vec::new()),
        };

        let report = RunReport {
            status,
            statistics: self.level.statistics.then_some(self.totals),
            records,
            transactions: self.transactions,
            message,
            details,
        };

        match self.formatter.finalize(report.clone()) {
            Ok(report) => report,
            Err(e) => {
                warn!("Formatting results failed: {}", e);
                RunReport {
                    status: RunStatus::Aborted,
                    message: Some(e.to_string()),
                    ..report
                }
            }
        }
    }
}
