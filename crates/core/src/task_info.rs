//! Task-info references
//!
//! A task can consume another task's run metadata through a descriptor file
//! whose path is handed to its command in an environment variable. The
//! referenced task's status decides what the descriptor lists: prospective
//! outputs while it is pending, the recorded outputs once a run exists.
//!
//! References may not form cycles. [`ensure_acyclic`] checks a whole batch
//! of tasks before any of them is resolved.

use crate::status::TaskStatus;
use crate::task::{Task, TaskProvider};
use crate::{Error, Result};
use cairn_digest::Digest;
use cairn_store::RunOutput;
use cairn_task_graph::{TaskGraph, TaskNodeData};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Debug, Clone)]
struct InfoNode {
    targets: Vec<String>,
}

impl TaskNodeData for InfoNode {
    fn dependency_names(&self) -> impl Iterator<Item = &str> {
        self.targets.iter().map(String::as_str)
    }
}

/// Check that the task-info references reachable from `tasks` are acyclic.
///
/// Tasks in the batch take precedence over the provider's definitions.
///
/// # Errors
///
/// - [`Error::UnknownTask`] if a reference names a task nobody defines
/// - [`Error::CycleDetected`] naming the full cycle path
pub fn ensure_acyclic(tasks: &[Arc<Task>], provider: &dyn TaskProvider) -> Result<()> {
    let batch: HashMap<String, &Arc<Task>> = tasks.iter().map(|t| (t.id(), t)).collect();
    let lookup = |id: &str| {
        batch
            .get(id)
            .map(|t| Arc::clone(*t))
            .or_else(|| provider.task(id))
            .map(|t| InfoNode {
                targets: t.task_info_targets().collect(),
            })
    };

    let mut graph: TaskGraph<InfoNode> = TaskGraph::new();
    for task in tasks.iter().filter(|t| !t.task_info.is_empty()) {
        graph
            .add_with_dependencies(&task.id(), lookup)
            .map_err(graph_error)?;
    }
    if graph.task_count() == 0 {
        return Ok(());
    }

    graph.add_dependency_edges().map_err(graph_error)?;
    graph.ensure_acyclic().map_err(graph_error)?;

    tracing::debug!(tasks = graph.task_count(), "Task-info references are acyclic");
    Ok(())
}

fn graph_error(err: cairn_task_graph::Error) -> Error {
    match err {
        cairn_task_graph::Error::CycleDetected { cycle } => Error::CycleDetected {
            cycle: cycle.join(" -> "),
        },
        cairn_task_graph::Error::MissingDependencies { missing } => match missing.into_iter().next()
        {
            Some((referenced_by, task)) => Error::UnknownTask {
                task,
                referenced_by,
            },
            None => Error::internal("missing dependency reported without a name"),
        },
        other => Error::internal(other.to_string()),
    }
}

/// Run metadata of a referenced task, as handed to the consuming command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    /// Referenced task id
    pub task: String,
    /// Total input digest of the referenced task
    pub total_input_digest: Digest,
    /// Status of the referenced task at evaluation time
    pub status: TaskStatus,
    /// Prospective outputs when pending, recorded outputs when a run exists
    pub outputs: Vec<RunOutput>,
}

impl TaskDescriptor {
    /// Descriptor for a task that still has to run
    #[must_use]
    pub fn pending(task: &Task, total_input_digest: Digest) -> Self {
        Self {
            task: task.id(),
            total_input_digest,
            status: TaskStatus::Pending,
            outputs: task
                .outputs
                .iter()
                .map(|o| RunOutput {
                    name: o.name.clone(),
                    uri: o.prospective_uri(&task.directory),
                    digest: None,
                    size_bytes: None,
                })
                .collect(),
        }
    }

    /// Descriptor for a task with a matching recorded run
    #[must_use]
    pub fn existing(run: &cairn_store::Run) -> Self {
        Self {
            task: run.task_id(),
            total_input_digest: run.total_input_digest.clone(),
            status: TaskStatus::Exist,
            outputs: run.outputs.clone(),
        }
    }

    /// Write the descriptor for `declaring` under `dir` and return its path.
    ///
    /// The file lands at `<dir>/<declaring>/<task>.json` and is replaced
    /// atomically.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] if the file cannot be written.
    pub fn write(&self, dir: &Path, declaring: &str) -> Result<PathBuf> {
        let parent = dir.join(declaring);
        std::fs::create_dir_all(&parent)
            .map_err(|e| Error::filesystem(Some(declaring), e, &parent, "create_dir_all"))?;

        let path = parent.join(format!("{}.json", self.task));
        let tmp_path = parent.join(format!(".{}.{}.tmp", self.task, uuid::Uuid::new_v4()));
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| Error::internal(format!("failed to encode task descriptor: {e}")))?;
        std::fs::write(&tmp_path, json)
            .map_err(|e| Error::filesystem(Some(declaring), e, &tmp_path, "write"))?;
        std::fs::rename(&tmp_path, &path)
            .map_err(|e| Error::filesystem(Some(declaring), e, &path, "rename"))?;

        tracing::debug!(
            task = %declaring,
            referenced = %self.task,
            status = ?self.status,
            path = %path.display(),
            "Wrote task descriptor"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{OutputKind, OutputSpec, StaticTaskProvider, TaskInfoDeclaration};
    use cairn_store::{Run, RunResult};
    use chrono::Utc;
    use tempfile::TempDir;

    fn task(name: &str, refs: &[&str]) -> Task {
        refs.iter().fold(Task::new("a", name, "/repo/a"), |t, r| {
            t.with_task_info(TaskInfoDeclaration::new(*r, "INFO"))
        })
    }

    fn check(tasks: Vec<Task>) -> Result<()> {
        let provider = StaticTaskProvider::new(tasks.clone());
        let batch: Vec<Arc<Task>> = tasks.into_iter().map(Arc::new).collect();
        ensure_acyclic(&batch, &provider)
    }

    #[test]
    fn test_chain_is_acyclic() {
        assert!(check(vec![task("x", &["y"]), task("y", &["z"]), task("z", &[])]).is_ok());
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let err = check(vec![task("x", &["x"])]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "task-info dependency cycle: a.x -> a.x"
        );
    }

    #[test]
    fn test_two_hop_cycle_names_path() {
        let err = check(vec![task("x", &["y"]), task("y", &["x"])]).unwrap_err();
        match err {
            Error::CycleDetected { cycle } => assert_eq!(cycle, "a.x -> a.y -> a.x"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_cycle_reached_through_provider() {
        // Only x is in the batch; y and z come from the provider
        let provider = StaticTaskProvider::new([task("y", &["z"]), task("z", &["y"])]);
        let batch = vec![Arc::new(task("x", &["y"]))];
        assert!(matches!(
            ensure_acyclic(&batch, &provider),
            Err(Error::CycleDetected { .. })
        ));
    }

    #[test]
    fn test_unknown_reference() {
        let err = check(vec![task("x", &["ghost"])]).unwrap_err();
        match err {
            Error::UnknownTask {
                task,
                referenced_by,
            } => {
                assert_eq!(task, "a.ghost");
                assert_eq!(referenced_by, "a.x");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_batch_without_references() {
        assert!(check(vec![task("x", &[]), task("y", &[])]).is_ok());
    }

    #[test]
    fn test_pending_descriptor_lists_prospective_outputs() {
        let target = Task::new("a", "build", "/repo/a").with_output(OutputSpec {
            name: "bin".to_string(),
            kind: OutputKind::File {
                path: PathBuf::from("out/app"),
            },
        });
        let descriptor = TaskDescriptor::pending(&target, Digest::sha384(b"inputs"));
        assert_eq!(descriptor.status, TaskStatus::Pending);
        assert_eq!(descriptor.outputs[0].uri, "file:///repo/a/out/app");
        assert!(descriptor.outputs[0].digest.is_none());
    }

    #[test]
    fn test_existing_descriptor_lists_recorded_outputs() {
        let now = Utc::now();
        let run = Run::from_new(cairn_store::NewRun {
            app: "a".to_string(),
            task: "build".to_string(),
            total_input_digest: Digest::sha384(b"inputs"),
            start_time: now,
            stop_time: now,
            result: RunResult::Success,
            inputs: Vec::new(),
            outputs: vec![RunOutput {
                name: "image".to_string(),
                uri: "docker://registry.local/a@sha256:abc".to_string(),
                digest: None,
                size_bytes: Some(42),
            }],
        });
        let descriptor = TaskDescriptor::existing(&run);
        assert_eq!(descriptor.task, "a.build");
        assert_eq!(descriptor.status, TaskStatus::Exist);
        assert_eq!(descriptor.outputs, run.outputs);
    }

    #[test]
    fn test_write_replaces_descriptor() {
        let tmp = TempDir::new().unwrap();
        let target = Task::new("a", "build", "/repo/a");
        let first = TaskDescriptor::pending(&target, Digest::sha384(b"1"));
        let second = TaskDescriptor::pending(&target, Digest::sha384(b"2"));

        let path = first.write(tmp.path(), "a.deploy").unwrap();
        assert_eq!(path, tmp.path().join("a.deploy/a.build.json"));
        assert_eq!(second.write(tmp.path(), "a.deploy").unwrap(), path);

        let read: TaskDescriptor =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(read, second);
        assert_eq!(std::fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
