use crate::error::{LoaderError, Result};
use crate::record::RecordUnit;
use crate::result::ProcessingResult;
use crate::step::Step;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// Called once per transaction with the group's members, before any of them
/// is processed. An error aborts the transaction.
#[async_trait]
pub trait BeforeTransactionHook: Send + Sync {
    async fn run(&self, members: &[RecordUnit]) -> Result<()>;
}

/// Called at a barrier, once every member finished `step`. An error aborts
/// the transaction.
#[async_trait]
pub trait AfterWaitHook: Send + Sync {
    async fn run(&self, step: Step, results: &[ProcessingResult]) -> Result<()>;
}

/// Optional hooks of a run. Missing hooks are no-ops.
#[derive(Clone, Default)]
pub struct Hooks {
    before_transaction: Option<Arc<dyn BeforeTransactionHook>>,
    after_wait: HashMap<Step, Arc<dyn AfterWaitHook>>,
}

impl Hooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_before_transaction(&mut self, hook: Arc<dyn BeforeTransactionHook>) {
        self.before_transaction = Some(hook);
    }

    pub fn set_after_wait(&mut self, step: Step, hook: Arc<dyn AfterWaitHook>) {
        self.after_wait.insert(step, hook);
    }

    pub async fn before_transaction(&self, members: &[RecordUnit]) -> Result<()> {
        match &self.before_transaction {
            Some(hook) => hook
                .run(members)
                .await
                .map_err(|e| Self::rejection("beforeTransaction", e)),
            None => Ok(()),
        }
    }

    pub async fn after_wait(&self, step: Step, results: &[ProcessingResult]) -> Result<()> {
        match self.after_wait.get(&step) {
            Some(hook) => hook
                .run(step, results)
                .await
                .map_err(|e| Self::rejection(&format!("afterWait[{}]", step), e)),
            None => Ok(()),
        }
    }

    fn rejection(hook: &str, err: LoaderError) -> LoaderError {
        match err {
            LoaderError::Hook { .. } => err,
            other => LoaderError::hook(hook, other),
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut after_wait: Vec<&Step> = self.after_wait.keys().collect();
        after_wait.sort();
        f.debug_struct("Hooks")
            .field("before_transaction", &self.before_transaction.is_some())
            .field("after_wait", &after_wait)
            .finish()
    }
}
