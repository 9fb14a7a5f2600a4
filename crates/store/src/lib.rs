//! Run records and run stores for cairn
//!
//! A [`Run`] is the record of one execution of a task, keyed by the total
//! digest of the inputs it ran with. The status evaluator asks a
//! [`RunStore`] for the latest run matching a digest to decide whether a task
//! still needs to run.
//!
//! Two stores are provided:
//! - [`MemoryRunStore`]: process-local, for tests and one-shot evaluations
//! - [`FileRunStore`]: JSON documents on disk, shared across processes

mod error;
mod file;
mod memory;
mod run;

pub use error::{Result, StoreError};
pub use file::{FileRunStore, STORE_DIR_ENV};
pub use memory::MemoryRunStore;
pub use run::{InputKind, InputRecord, NewRun, Run, RunOutput, RunResult};

use async_trait::async_trait;
use cairn_digest::Digest;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Persistence for task runs
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Latest run of `app.task` whose total input digest equals `digest`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when no such run exists, or another
    /// [`StoreError`] if the store could not be read.
    async fn latest_run_by_digest(
        &self,
        cancel: &CancellationToken,
        app: &str,
        task: &str,
        digest: &Digest,
    ) -> Result<Run>;

    /// Record a completed run and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the run could not be persisted.
    async fn record_run(&self, cancel: &CancellationToken, run: NewRun) -> Result<Run>;
}

#[async_trait]
impl<S: RunStore + ?Sized> RunStore for Arc<S> {
    async fn latest_run_by_digest(
        &self,
        cancel: &CancellationToken,
        app: &str,
        task: &str,
        digest: &Digest,
    ) -> Result<Run> {
        (**self).latest_run_by_digest(cancel, app, task, digest).await
    }

    async fn record_run(&self, cancel: &CancellationToken, run: NewRun) -> Result<Run> {
        (**self).record_run(cancel, run).await
    }
}
