//! Task status evaluation
//!
//! [`StatusEvaluator`] decides whether a task needs to run: it resolves the
//! task's inputs, aggregates their digest and asks the run store for a run
//! recorded under that digest.
//!
//! ```text
//! task ──resolve──▶ Inputs ──digest──▶ RunStore ──▶ Pending | Exist(run)
//! ```
//!
//! Resolution blocks on the filesystem and runs on the blocking pool; every
//! run store call is raced against the caller's cancellation token and the
//! configured timeout.

use crate::input::{Input, InputTaskInfo};
use crate::inputs::Inputs;
use crate::resolver::InputResolver;
use crate::task::{Task, TaskProvider};
use crate::task_info::{self, TaskDescriptor};
use crate::{Config, Error, Result};
use async_recursion::async_recursion;
use cairn_digest::Digest;
use cairn_store::{NewRun, Run, RunOutput, RunResult, RunStore, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Whether a task has to run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not evaluated, or evaluation failed
    #[default]
    Undefined,
    /// No run matches the current inputs
    Pending,
    /// A run with the current inputs exists
    Exist,
}

/// Per-call evaluation options
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusOptions {
    /// Ad-hoc literal inputs appended after resolution
    pub input_strings: Vec<String>,
    /// Alternative literal tried when no run matches `input_strings`
    pub lookup_input_string: Option<String>,
}

impl StatusOptions {
    /// Options with no ad-hoc inputs
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an ad-hoc input string
    #[must_use]
    pub fn with_input_string(mut self, value: impl Into<String>) -> Self {
        self.input_strings.push(value.into());
        self
    }

    /// On a miss, look up runs with `value` in place of the ad-hoc strings
    #[must_use]
    pub fn with_lookup_input_string(mut self, value: impl Into<String>) -> Self {
        self.lookup_input_string = Some(value.into());
        self
    }
}

/// Outcome of a status evaluation
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Evaluated status
    pub state: TaskStatus,
    /// Inputs the task would run with
    pub inputs: Inputs,
    /// Matching run, when `state` is [`TaskStatus::Exist`]
    pub run: Option<Run>,
}

impl StatusReport {
    /// Whether the task has to run
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.state == TaskStatus::Pending
    }
}

/// Evaluates task status against a run store
#[derive(Clone)]
pub struct StatusEvaluator {
    resolver: Arc<InputResolver>,
    store: Arc<dyn RunStore>,
    tasks: Arc<dyn TaskProvider>,
    task_info_dir: PathBuf,
    store_timeout: Duration,
    max_parallel: usize,
}

impl std::fmt::Debug for StatusEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusEvaluator")
            .field("resolver", &self.resolver)
            .field("task_info_dir", &self.task_info_dir)
            .field("store_timeout", &self.store_timeout)
            .field("max_parallel", &self.max_parallel)
            .finish_non_exhaustive()
    }
}

impl StatusEvaluator {
    /// Evaluator with default limits
    #[must_use]
    pub fn new(
        resolver: Arc<InputResolver>,
        store: Arc<dyn RunStore>,
        tasks: Arc<dyn TaskProvider>,
    ) -> Self {
        let config = Config::default();
        Self {
            resolver,
            store,
            tasks,
            task_info_dir: config.effective_task_info_dir(),
            store_timeout: config.store_timeout(),
            max_parallel: config.max_parallel,
        }
    }

    /// Evaluator configured from `config`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the configuration is invalid.
    pub fn from_config(
        config: &Config,
        store: Arc<dyn RunStore>,
        tasks: Arc<dyn TaskProvider>,
    ) -> Result<Self> {
        config.validate()?;
        let resolver = Arc::new(InputResolver::from_config(config)?);
        Ok(Self::new(resolver, store, tasks)
            .with_task_info_dir(config.effective_task_info_dir())
            .with_store_timeout(config.store_timeout())
            .with_max_parallel(config.max_parallel))
    }

    /// Set where task descriptors are written
    #[must_use]
    pub fn with_task_info_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.task_info_dir = dir.into();
        self
    }

    /// Set the run store call timeout
    #[must_use]
    pub const fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Set the maximum number of concurrent evaluations in a batch
    #[must_use]
    pub fn with_max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel.max(1);
        self
    }

    /// The input resolver
    #[must_use]
    pub fn resolver(&self) -> &Arc<InputResolver> {
        &self.resolver
    }

    /// This evaluator with `tasks` taking precedence over the provider, so
    /// the cycle check and evaluation see the same definitions.
    fn scoped(&self, tasks: &[Arc<Task>]) -> Self {
        let mut scoped = self.clone();
        scoped.tasks = Arc::new(BatchTasks {
            batch: tasks.iter().map(|t| (t.id(), Arc::clone(t))).collect(),
            fallback: Arc::clone(&self.tasks),
        });
        scoped
    }

    /// Status of a single task.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedCombination`] for a lookup string on a task with
    ///   task-info references
    /// - [`Error::CycleDetected`] / [`Error::UnknownTask`] for bad task-info
    ///   references
    /// - resolution, store, cancellation and timeout errors
    pub async fn status(
        &self,
        task: Arc<Task>,
        options: &StatusOptions,
        cancel: &CancellationToken,
    ) -> Result<StatusReport> {
        check_lookup(&task, options)?;
        let batch = std::slice::from_ref(&task);
        let evaluator = self.scoped(batch);
        task_info::ensure_acyclic(batch, evaluator.tasks.as_ref())?;
        evaluator.evaluate(task, options, cancel).await
    }

    /// Status of every task in `tasks`, in order.
    ///
    /// The task-info references of the whole batch are checked first; a
    /// cycle or unknown reference fails the batch before any task is
    /// resolved. After that each task succeeds or fails on its own.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] or [`Error::UnknownTask`] for the
    /// batch.
    pub async fn status_all(
        &self,
        tasks: &[Arc<Task>],
        options: &StatusOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<Result<StatusReport>>> {
        let scoped = self.scoped(tasks);
        task_info::ensure_acyclic(tasks, scoped.tasks.as_ref())?;

        let semaphore = Arc::new(Semaphore::new(self.max_parallel));
        let mut join_set = JoinSet::new();
        for (index, task) in tasks.iter().enumerate() {
            let evaluator = scoped.clone();
            let task = Arc::clone(task);
            let options = options.clone();
            let cancel = cancel.clone();
            let semaphore = Arc::clone(&semaphore);

            join_set.spawn(async move {
                let id = task.id();
                let result = match semaphore.acquire().await {
                    Ok(_permit) => match check_lookup(&task, &options) {
                        Ok(()) => evaluator.evaluate(task, &options, &cancel).await,
                        Err(e) => Err(e),
                    },
                    Err(_) => Err(Error::internal(format!("{id}: worker pool closed"))),
                };
                (index, result)
            });
        }

        let mut results: Vec<Option<Result<StatusReport>>> =
            std::iter::repeat_with(|| None).take(tasks.len()).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => {
                    if let Err(e) = &result {
                        tracing::warn!(task = %tasks[index].id(), error = %e, "Status evaluation failed");
                    }
                    results[index] = Some(result);
                }
                Err(e) => tracing::error!(error = %e, "Status evaluation panicked"),
            }
        }

        Ok(results
            .into_iter()
            .zip(tasks)
            .map(|(slot, task)| {
                slot.unwrap_or_else(|| {
                    Err(Error::internal(format!(
                        "{}: status evaluation did not complete",
                        task.id()
                    )))
                })
            })
            .collect())
    }

    /// Resolve every input of `task`, task-info included, without a run
    /// store lookup for `task` itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CycleDetected`] / [`Error::UnknownTask`] for bad
    /// task-info references, and any resolution error.
    pub async fn resolve(&self, task: Arc<Task>, cancel: &CancellationToken) -> Result<Inputs> {
        let batch = std::slice::from_ref(&task);
        let evaluator = self.scoped(batch);
        task_info::ensure_acyclic(batch, evaluator.tasks.as_ref())?;
        evaluator.resolve_inputs(task, cancel).await
    }

    /// The run to record after executing `task` with `inputs`
    ///
    /// # Errors
    ///
    /// Returns an error if an input digest cannot be computed.
    pub fn new_run(
        &self,
        task: &Task,
        inputs: &Inputs,
        result: RunResult,
        start_time: DateTime<Utc>,
        stop_time: DateTime<Utc>,
        outputs: Vec<RunOutput>,
    ) -> Result<NewRun> {
        Ok(NewRun {
            app: task.app.clone(),
            task: task.name.clone(),
            total_input_digest: inputs.digest()?,
            start_time,
            stop_time,
            result,
            inputs: inputs.records()?,
            outputs,
        })
    }

    /// Record a completed run
    ///
    /// # Errors
    ///
    /// Returns store, cancellation and timeout errors.
    pub async fn record_run(&self, run: NewRun, cancel: &CancellationToken) -> Result<Run> {
        let id = format!("{}.{}", run.app, run.task);
        let recorded = self
            .store_call(&id, cancel, self.store.record_run(cancel, run))
            .await?;
        tracing::info!(task = %id, run = %recorded.id, result = ?recorded.result, "Recorded run");
        Ok(recorded)
    }

    #[async_recursion]
    async fn evaluate(
        &self,
        task: Arc<Task>,
        options: &StatusOptions,
        cancel: &CancellationToken,
    ) -> Result<StatusReport> {
        let id = task.id();
        let span = tracing::info_span!("status.evaluate", task = %id);
        self.evaluate_inner(task, options, cancel)
            .instrument(span)
            .await
    }

    async fn evaluate_inner(
        &self,
        task: Arc<Task>,
        options: &StatusOptions,
        cancel: &CancellationToken,
    ) -> Result<StatusReport> {
        let id = task.id();
        let mut inputs = self.resolve_inputs(Arc::clone(&task), cancel).await?;
        inputs.extend(options.input_strings.iter().map(Input::string));

        let digest = inputs.digest().map_err(|e| e.with_task(&id))?;
        if let Some(run) = self.latest_run(&task, &digest, cancel).await? {
            tracing::info!(task = %id, digest = %digest, run = %run.id, "Task is up to date");
            return Ok(StatusReport {
                state: TaskStatus::Exist,
                inputs,
                run: Some(run),
            });
        }

        if let Some(lookup) = &options.lookup_input_string {
            let mut aliased = inputs.without_strings();
            aliased.add(Input::string(lookup));
            let aliased_digest = aliased.digest().map_err(|e| e.with_task(&id))?;
            if let Some(run) = self.latest_run(&task, &aliased_digest, cancel).await? {
                tracing::info!(
                    task = %id,
                    lookup = %lookup,
                    run = %run.id,
                    "Run found through lookup string"
                );
                return Ok(StatusReport {
                    state: TaskStatus::Exist,
                    inputs,
                    run: Some(run),
                });
            }
        }

        tracing::info!(task = %id, digest = %digest, "Task is pending");
        Ok(StatusReport {
            state: TaskStatus::Pending,
            inputs,
            run: None,
        })
    }

    async fn resolve_inputs(&self, task: Arc<Task>, cancel: &CancellationToken) -> Result<Inputs> {
        let id = task.id();
        if cancel.is_cancelled() {
            return Err(Error::Cancelled { task: id });
        }

        let resolver = Arc::clone(&self.resolver);
        let blocking = Arc::clone(&task);
        let mut inputs = tokio::task::spawn_blocking(move || resolver.resolve(&blocking))
            .await
            .map_err(|e| Error::internal(format!("{id}: resolver task failed: {e}")))?
            .map_err(|e| e.with_task(&id))?;

        for decl in &task.task_info {
            let target_id = decl.target(&task.app);
            let target = self.tasks.task(&target_id).ok_or_else(|| Error::UnknownTask {
                task: target_id.clone(),
                referenced_by: id.clone(),
            })?;

            let report = self
                .evaluate(Arc::clone(&target), &StatusOptions::default(), cancel)
                .await?;
            let descriptor = match &report.run {
                Some(run) => TaskDescriptor::existing(run),
                None => TaskDescriptor::pending(
                    &target,
                    report.inputs.digest().map_err(|e| e.with_task(&target_id))?,
                ),
            };
            let digest = descriptor.total_input_digest.clone();

            let dir = self.task_info_dir.clone();
            let declaring = id.clone();
            let path = tokio::task::spawn_blocking(move || descriptor.write(&dir, &declaring))
                .await
                .map_err(|e| Error::internal(format!("{id}: descriptor writer failed: {e}")))??;

            inputs.add(Input::Task(InputTaskInfo::new(
                target_id,
                decl.env_var.clone(),
                path,
                digest,
            )));
        }

        Ok(inputs)
    }

    async fn latest_run(
        &self,
        task: &Task,
        digest: &Digest,
        cancel: &CancellationToken,
    ) -> Result<Option<Run>> {
        let id = task.id();
        let query = self
            .store
            .latest_run_by_digest(cancel, &task.app, &task.name, digest);
        match self.store_call(&id, cancel, query).await {
            Ok(run) => Ok(Some(run)),
            Err(Error::Store(e)) if e.is_not_found() => {
                tracing::debug!(task = %id, digest = %digest, "No run recorded for digest");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn store_call<T>(
        &self,
        id: &str,
        cancel: &CancellationToken,
        call: impl std::future::Future<Output = cairn_store::Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::Cancelled { task: id.to_string() }),
            outcome = tokio::time::timeout(self.store_timeout, call) => match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(StoreError::Cancelled)) => Err(Error::Cancelled { task: id.to_string() }),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(Error::StoreTimeout {
                    task: id.to_string(),
                    timeout_secs: self.store_timeout.as_secs(),
                }),
            },
        }
    }
}

/// Batch definitions layered over the evaluator's task provider
struct BatchTasks {
    batch: HashMap<String, Arc<Task>>,
    fallback: Arc<dyn TaskProvider>,
}

impl TaskProvider for BatchTasks {
    fn task(&self, id: &str) -> Option<Arc<Task>> {
        self.batch
            .get(id)
            .cloned()
            .or_else(|| self.fallback.task(id))
    }
}

fn check_lookup(task: &Task, options: &StatusOptions) -> Result<()> {
    if options.lookup_input_string.is_some() && !task.task_info.is_empty() {
        return Err(Error::unsupported_combination(
            task.id(),
            "a lookup input string cannot be combined with task-info inputs",
        ));
    }
    Ok(())
}
