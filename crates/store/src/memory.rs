//! In-memory run store

use crate::{NewRun, Result, Run, RunStore, StoreError};
use async_trait::async_trait;
use cairn_digest::Digest;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

type RunKey = (String, String, Digest);

/// Run store that keeps every recorded run in process memory
#[derive(Debug, Default)]
pub struct MemoryRunStore {
    runs: Mutex<HashMap<RunKey, Vec<Run>>>,
}

impl MemoryRunStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of runs recorded so far
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] if the store lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.lock()?.values().map(Vec::len).sum())
    }

    /// Whether no run has been recorded
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] if the store lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<RunKey, Vec<Run>>>> {
        self.runs
            .lock()
            .map_err(|_| StoreError::internal("memory run store mutex poisoned"))
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn latest_run_by_digest(
        &self,
        cancel: &CancellationToken,
        app: &str,
        task: &str,
        digest: &Digest,
    ) -> Result<Run> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let runs = self.lock()?;
        runs.get(&(app.to_string(), task.to_string(), digest.clone()))
            .and_then(|candidates| {
                candidates
                    .iter()
                    .reduce(|best, run| if run.is_newer_than(best) { run } else { best })
            })
            .cloned()
            .ok_or_else(|| StoreError::not_found(app, task, digest.to_string()))
    }

    async fn record_run(&self, cancel: &CancellationToken, run: NewRun) -> Result<Run> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let run = Run::from_new(run);
        tracing::debug!(task = %run.task_id(), id = %run.id, "Recording run in memory");
        self.lock()?
            .entry((
                run.app.clone(),
                run.task.clone(),
                run.total_input_digest.clone(),
            ))
            .or_default()
            .push(run.clone());
        Ok(run)
    }
}
