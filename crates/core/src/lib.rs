//! Incremental-build decisions for cairn
//!
//! This crate decides whether a task in a monorepo needs to run:
//! - Expands a task's input declarations (file globs, environment
//!   variables, source dependencies, other tasks' run metadata) into a
//!   deduplicated set of [`Inputs`]
//! - Aggregates their digests into one order-independent total digest
//! - Looks that digest up in a [`RunStore`](cairn_store::RunStore)
//!
//! # Overview
//!
//! ```ignore
//! use cairn_core::{Config, StaticTaskProvider, StatusEvaluator, StatusOptions};
//! use cairn_store::FileRunStore;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! let config = Config::load("cairn.toml")?;
//! cairn_core::logging::init_tracing(&config.logging)?;
//!
//! let tasks = Arc::new(StaticTaskProvider::new(load_tasks()?));
//! let store = Arc::new(FileRunStore::open_default()?);
//! let evaluator = StatusEvaluator::from_config(&config, store, tasks.clone())?;
//!
//! let report = evaluator
//!     .status(task, &StatusOptions::new(), &CancellationToken::new())
//!     .await?;
//! if report.is_pending() {
//!     // run the task, then record it with evaluator.new_run(..) / record_run(..)
//! }
//! ```

pub mod config;
mod error;
mod input;
mod inputs;
pub mod logging;
mod resolver;
mod status;
mod task;
pub mod task_info;

pub use config::{Config, LogFormat, LogLevel, LoggingConfig};
pub use error::{Error, Result};
pub use input::{Input, InputEnvVar, InputFile, InputString, InputTaskInfo};
pub use inputs::Inputs;
pub use resolver::{
    DEFAULT_DECLARATION_CACHE_CAPACITY, GoSourceResolver, InputResolver, ResolverStats,
    SourceRequest, SourceResolver,
};
pub use status::{StatusEvaluator, StatusOptions, StatusReport, TaskStatus};
pub use task::{
    EnvVarDeclaration, FileDeclaration, OutputKind, OutputSpec, SourceDeclaration,
    StaticTaskProvider, Task, TaskInfoDeclaration, TaskProvider,
};
pub use task_info::TaskDescriptor;
