//! Run records

use cairn_digest::Digest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Outcome of a task execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunResult {
    /// The command exited successfully
    Success,
    /// The command failed
    Failure,
}

/// Kind of a recorded input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputKind {
    /// A file, identified by its repository-relative path
    File,
    /// A literal string
    String,
    /// An environment variable and its observed value
    EnvVar,
    /// Another task's run metadata
    Task,
}

/// Stored projection of a single resolved input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InputRecord {
    /// File input
    File {
        /// Repository-relative path
        identity: String,
        /// Content digest
        digest: Digest,
    },
    /// Literal string input
    String {
        /// `string:<value>`
        identity: String,
        /// Digest of the literal
        digest: Digest,
    },
    /// Environment variable input
    EnvVar {
        /// `$NAME`
        identity: String,
        /// Digest of `ENV: NAME=value`
        digest: Digest,
    },
    /// Task dependency input
    Task {
        /// `task: <app>.<task>`
        identity: String,
        /// Total input digest of the referenced task
        digest: Digest,
    },
}

impl InputRecord {
    /// Build a record of the given kind
    #[must_use]
    pub fn new(kind: InputKind, identity: impl Into<String>, digest: Digest) -> Self {
        let identity = identity.into();
        match kind {
            InputKind::File => Self::File { identity, digest },
            InputKind::String => Self::String { identity, digest },
            InputKind::EnvVar => Self::EnvVar { identity, digest },
            InputKind::Task => Self::Task { identity, digest },
        }
    }

    /// Kind of input this record describes
    #[must_use]
    pub const fn kind(&self) -> InputKind {
        match self {
            Self::File { .. } => InputKind::File,
            Self::String { .. } => InputKind::String,
            Self::EnvVar { .. } => InputKind::EnvVar,
            Self::Task { .. } => InputKind::Task,
        }
    }

    /// Identity string of the input
    #[must_use]
    pub fn identity(&self) -> &str {
        match self {
            Self::File { identity, .. }
            | Self::String { identity, .. }
            | Self::EnvVar { identity, .. }
            | Self::Task { identity, .. } => identity,
        }
    }

    /// Digest of the input
    #[must_use]
    pub const fn digest(&self) -> &Digest {
        match self {
            Self::File { digest, .. }
            | Self::String { digest, .. }
            | Self::EnvVar { digest, .. }
            | Self::Task { digest, .. } => digest,
        }
    }
}

/// An artifact produced by a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutput {
    /// Output name as declared on the task
    pub name: String,
    /// Location of the artifact (`file://...`, `docker://...`)
    pub uri: String,
    /// Content digest, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<Digest>,
    /// Size in bytes, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// A run to be recorded; the store assigns the id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRun {
    /// Application name
    pub app: String,
    /// Task name
    pub task: String,
    /// Aggregate digest of every input
    pub total_input_digest: Digest,
    /// When execution started
    pub start_time: DateTime<Utc>,
    /// When execution finished
    pub stop_time: DateTime<Utc>,
    /// Outcome
    pub result: RunResult,
    /// Inputs the run was executed with
    pub inputs: Vec<InputRecord>,
    /// Artifacts produced
    pub outputs: Vec<RunOutput>,
}

/// A recorded execution of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    /// Unique run identifier
    pub id: Uuid,
    /// Application name
    pub app: String,
    /// Task name
    pub task: String,
    /// Aggregate digest of every input
    pub total_input_digest: Digest,
    /// When execution started
    pub start_time: DateTime<Utc>,
    /// When execution finished
    pub stop_time: DateTime<Utc>,
    /// Outcome
    pub result: RunResult,
    /// Inputs the run was executed with
    #[serde(default)]
    pub inputs: Vec<InputRecord>,
    /// Artifacts produced
    #[serde(default)]
    pub outputs: Vec<RunOutput>,
}

impl Run {
    /// Materialize a new run with a fresh v4 id
    #[must_use]
    pub fn from_new(new: NewRun) -> Self {
        Self {
            id: Uuid::new_v4(),
            app: new.app,
            task: new.task,
            total_input_digest: new.total_input_digest,
            start_time: new.start_time,
            stop_time: new.stop_time,
            result: new.result,
            inputs: new.inputs,
            outputs: new.outputs,
        }
    }

    /// `<app>.<task>`
    #[must_use]
    pub fn task_id(&self) -> String {
        format!("{}.{}", self.app, self.task)
    }

    /// Whether `self` supersedes `other` as the latest run for a digest
    pub(crate) fn is_newer_than(&self, other: &Self) -> bool {
        (self.stop_time, self.start_time) >= (other.stop_time, other.start_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_run() -> NewRun {
        let now = Utc::now();
        NewRun {
            app: "web".to_string(),
            task: "build".to_string(),
            total_input_digest: Digest::sha384(b"inputs"),
            start_time: now,
            stop_time: now,
            result: RunResult::Success,
            inputs: vec![InputRecord::new(
                InputKind::File,
                "src/main.rs",
                Digest::sha384(b"src/main.rsfn main() {}"),
            )],
            outputs: vec![RunOutput {
                name: "bin".to_string(),
                uri: "file:///out/bin".to_string(),
                digest: None,
                size_bytes: Some(12),
            }],
        }
    }

    #[test]
    fn test_input_record_is_tagged_by_kind() {
        let record = InputRecord::new(InputKind::EnvVar, "$HOME", Digest::sha384(b"x"));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "env_var");
        assert_eq!(json["identity"], "$HOME");
        assert!(json["digest"].as_str().unwrap().starts_with("sha384:"));

        let back: InputRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.kind(), InputKind::EnvVar);
        assert_eq!(back, record);
    }

    #[test]
    fn test_run_serde_preserves_fields() {
        let run = Run::from_new(new_run());
        let json = serde_json::to_string(&run).unwrap();
        assert!(json.contains("\"result\":\"success\""));
        assert!(!json.contains("\"digest\":null"));
        let back: Run = serde_json::from_str(&json).unwrap();
        assert_eq!(back, run);
        assert_eq!(back.task_id(), "web.build");
    }

    #[test]
    fn test_from_new_assigns_distinct_ids() {
        let a = Run::from_new(new_run());
        let b = Run::from_new(new_run());
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.get_version_num(), 4);
    }
}
