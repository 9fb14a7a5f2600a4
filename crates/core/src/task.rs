//! Task definitions and input declarations
//!
//! Tasks are supplied by the configuration layer through a [`TaskProvider`];
//! this crate never parses or merges configuration files itself. A task owns
//! typed declarations describing what its command reads, and the list of
//! configuration files it was defined in, which are implicit inputs so that
//! editing a task's own definition invalidates recorded runs.

use crate::{Error, Result};
use globset::GlobBuilder;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// File-glob input declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct FileDeclaration {
    /// Patterns relative to the task directory; each is evaluated on its own
    pub paths: Vec<String>,
    /// Patterns may match nothing
    #[serde(default)]
    pub optional: bool,
    /// Only keep files tracked by version control
    #[serde(default)]
    pub vcs_tracked_only: bool,
}

impl FileDeclaration {
    /// Required declaration over `paths`
    #[must_use]
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
            optional: false,
            vcs_tracked_only: false,
        }
    }

    /// Mark the declaration optional
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Restrict matches to tracked files
    #[must_use]
    pub fn tracked_only(mut self) -> Self {
        self.vcs_tracked_only = true;
        self
    }
}

/// Environment-variable input declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct EnvVarDeclaration {
    /// Variable names; glob metacharacters match several variables
    pub names: Vec<String>,
    /// Names may match nothing
    #[serde(default)]
    pub optional: bool,
}

/// Ecosystem-specific source-dependency declaration
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SourceDeclaration {
    /// Ecosystem the queries are for, e.g. "go"
    pub ecosystem: String,
    /// Package queries, e.g. `./cmd/server`
    pub queries: Vec<String>,
    /// Environment for the ecosystem tool
    #[serde(default)]
    pub environment: BTreeMap<String, String>,
    /// Extra flags for the ecosystem tool
    #[serde(default)]
    pub build_flags: Vec<String>,
    /// Include test sources
    #[serde(default)]
    pub include_tests: bool,
}

/// Reference to another task's run metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInfoDeclaration {
    /// `<app>.<task>`, or a bare task name in the same app
    pub task: String,
    /// Variable that receives the descriptor file path
    pub env_var: String,
}

impl TaskInfoDeclaration {
    /// Create a reference to `task` exposed through `env_var`
    #[must_use]
    pub fn new(task: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            env_var: env_var.into(),
        }
    }

    /// Fully qualified id of the referenced task
    #[must_use]
    pub fn target(&self, app: &str) -> String {
        if self.task.contains('.') {
            self.task.clone()
        } else {
            format!("{app}.{}", self.task)
        }
    }
}

/// What an output is
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputKind {
    /// A file, relative to the task directory
    File {
        /// Path of the produced file
        path: PathBuf,
    },
    /// A container image
    Image {
        /// Image repository
        repository: String,
        /// Image tag
        tag: String,
    },
}

/// Declared output of a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Output name
    pub name: String,
    /// Output location
    #[serde(flatten)]
    pub kind: OutputKind,
}

impl OutputSpec {
    /// Where this output will land once the task runs
    #[must_use]
    pub fn prospective_uri(&self, task_dir: &Path) -> String {
        match &self.kind {
            OutputKind::File { path } => format!("file://{}", task_dir.join(path).display()),
            OutputKind::Image { repository, tag } => format!("docker://{repository}:{tag}"),
        }
    }
}

/// A task and its input declarations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Application the task belongs to
    pub app: String,
    /// Task name within the application
    pub name: String,
    /// Absolute task directory; patterns are relative to it
    pub directory: PathBuf,
    /// Configuration files the task was defined in
    #[serde(default)]
    pub config_files: Vec<PathBuf>,
    /// File-glob declarations
    #[serde(default)]
    pub files: Vec<FileDeclaration>,
    /// Environment-variable declarations
    #[serde(default)]
    pub env_vars: Vec<EnvVarDeclaration>,
    /// Source-dependency declarations
    #[serde(default)]
    pub sources: Vec<SourceDeclaration>,
    /// Task-info declarations
    #[serde(default)]
    pub task_info: Vec<TaskInfoDeclaration>,
    /// Declared outputs
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
}

impl Task {
    /// Create a task with no declarations
    #[must_use]
    pub fn new(app: impl Into<String>, name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
            directory: directory.into(),
            config_files: Vec::new(),
            files: Vec::new(),
            env_vars: Vec::new(),
            sources: Vec::new(),
            task_info: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// `<app>.<name>`
    #[must_use]
    pub fn id(&self) -> String {
        format!("{}.{}", self.app, self.name)
    }

    /// Add a configuration file
    #[must_use]
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_files.push(path.into());
        self
    }

    /// Add a file declaration
    #[must_use]
    pub fn with_files(mut self, decl: FileDeclaration) -> Self {
        self.files.push(decl);
        self
    }

    /// Add an environment-variable declaration
    #[must_use]
    pub fn with_env_vars(mut self, decl: EnvVarDeclaration) -> Self {
        self.env_vars.push(decl);
        self
    }

    /// Add a source-dependency declaration
    #[must_use]
    pub fn with_sources(mut self, decl: SourceDeclaration) -> Self {
        self.sources.push(decl);
        self
    }

    /// Add a task-info declaration
    #[must_use]
    pub fn with_task_info(mut self, decl: TaskInfoDeclaration) -> Self {
        self.task_info.push(decl);
        self
    }

    /// Add an output
    #[must_use]
    pub fn with_output(mut self, output: OutputSpec) -> Self {
        self.outputs.push(output);
        self
    }

    /// Fully qualified ids of every task referenced through task-info
    pub fn task_info_targets(&self) -> impl Iterator<Item = String> + '_ {
        self.task_info.iter().map(|d| d.target(&self.app))
    }

    /// Check the declarations for errors that do not need the filesystem.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDeclaration`] for absolute or empty patterns,
    /// patterns with more than one `**` segment, patterns that do not
    /// compile, and incomplete source or task-info declarations.
    pub fn validate(&self) -> Result<()> {
        let id = self.id();
        if !self.directory.is_absolute() {
            return Err(Error::invalid_declaration(
                &id,
                format!("task directory {} is not absolute", self.directory.display()),
            ));
        }

        for pattern in self.files.iter().flat_map(|d| &d.paths) {
            validate_file_pattern(&id, pattern)?;
        }

        for name in self.env_vars.iter().flat_map(|d| &d.names) {
            if name.trim().is_empty() {
                return Err(Error::invalid_declaration(&id, "empty environment variable name"));
            }
            GlobBuilder::new(name).build().map_err(|e| {
                Error::invalid_declaration(&id, format!("invalid variable pattern '{name}': {e}"))
            })?;
        }

        for decl in &self.sources {
            if decl.ecosystem.trim().is_empty() || decl.queries.is_empty() {
                return Err(Error::invalid_declaration(
                    &id,
                    "source declarations need an ecosystem and at least one query",
                ));
            }
        }

        for decl in &self.task_info {
            if decl.task.trim().is_empty() || decl.env_var.trim().is_empty() {
                return Err(Error::invalid_declaration(
                    &id,
                    "task-info declarations need a task and an environment variable",
                ));
            }
        }

        Ok(())
    }
}

fn validate_file_pattern(task: &str, pattern: &str) -> Result<()> {
    if pattern.trim().is_empty() {
        return Err(Error::invalid_declaration(task, "empty file pattern"));
    }
    if Path::new(pattern).is_absolute() {
        return Err(Error::invalid_declaration(
            task,
            format!("pattern '{pattern}' must be relative to the task directory"),
        ));
    }
    if pattern.matches("**").count() > 1 {
        return Err(Error::invalid_declaration(
            task,
            format!("pattern '{pattern}' has more than one '**' segment"),
        ));
    }
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| Error::invalid_declaration(task, format!("invalid pattern '{pattern}': {e}")))?;
    Ok(())
}

/// Source of task definitions
pub trait TaskProvider: Send + Sync {
    /// Look up a task by `<app>.<name>`
    fn task(&self, id: &str) -> Option<Arc<Task>>;
}

/// Task provider over a fixed set of tasks
#[derive(Debug, Default, Clone)]
pub struct StaticTaskProvider {
    tasks: HashMap<String, Arc<Task>>,
}

impl StaticTaskProvider {
    /// Create a provider holding `tasks`
    #[must_use]
    pub fn new(tasks: impl IntoIterator<Item = Task>) -> Self {
        let mut provider = Self::default();
        for task in tasks {
            provider.insert(task);
        }
        provider
    }

    /// Add or replace a task
    pub fn insert(&mut self, task: Task) -> Arc<Task> {
        let task = Arc::new(task);
        self.tasks.insert(task.id(), Arc::clone(&task));
        task
    }

    /// Number of tasks
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the provider has no tasks
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl TaskProvider for StaticTaskProvider {
    fn task(&self, id: &str) -> Option<Arc<Task>> {
        self.tasks.get(id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task {
        Task::new("web", "build", "/repo/web")
    }

    #[test]
    fn test_id_and_target() {
        let t = task();
        assert_eq!(t.id(), "web.build");
        assert_eq!(TaskInfoDeclaration::new("lint", "LINT").target("web"), "web.lint");
        assert_eq!(
            TaskInfoDeclaration::new("api.test", "API").target("web"),
            "api.test"
        );
    }

    #[test]
    fn test_validate_rejects_double_globstar() {
        let t = task().with_files(FileDeclaration::new(["src/**/gen/**/*.rs"]));
        let err = t.validate().unwrap_err();
        assert!(matches!(err, Error::InvalidDeclaration { .. }));
        assert!(err.to_string().contains("more than one '**'"));
    }

    #[test]
    fn test_validate_accepts_single_globstar() {
        let t = task().with_files(FileDeclaration::new(["src/**/*.rs", "Cargo.toml"]));
        assert!(t.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_absolute_pattern() {
        let t = task().with_files(FileDeclaration::new(["/etc/passwd"]));
        assert!(matches!(
            t.validate(),
            Err(Error::InvalidDeclaration { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_relative_directory() {
        let t = Task::new("web", "build", "web");
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_incomplete_task_info() {
        let t = task().with_task_info(TaskInfoDeclaration::new("lint", ""));
        assert!(t.validate().is_err());
    }

    #[test]
    fn test_prospective_uri() {
        let file = OutputSpec {
            name: "bundle".to_string(),
            kind: OutputKind::File {
                path: PathBuf::from("dist/app.js"),
            },
        };
        assert_eq!(
            file.prospective_uri(Path::new("/repo/web")),
            "file:///repo/web/dist/app.js"
        );

        let image = OutputSpec {
            name: "image".to_string(),
            kind: OutputKind::Image {
                repository: "registry.local/web".to_string(),
                tag: "v1".to_string(),
            },
        };
        assert_eq!(
            image.prospective_uri(Path::new("/repo/web")),
            "docker://registry.local/web:v1"
        );
    }

    #[test]
    fn test_task_deserializes_from_camel_case() {
        let json = serde_json::json!({
            "app": "web",
            "name": "build",
            "directory": "/repo/web",
            "files": [{"paths": ["*.sql"], "optional": true, "vcsTrackedOnly": true}],
            "taskInfo": [{"task": "lint", "envVar": "LINT_INFO"}],
            "outputs": [{"name": "img", "kind": "image", "repository": "r", "tag": "t"}]
        });
        let task: Task = serde_json::from_value(json).unwrap();
        assert!(task.files[0].optional);
        assert!(task.files[0].vcs_tracked_only);
        assert_eq!(task.task_info[0].env_var, "LINT_INFO");
        assert!(matches!(task.outputs[0].kind, OutputKind::Image { .. }));
    }

    #[test]
    fn test_static_provider_lookup() {
        let provider = StaticTaskProvider::new([task(), Task::new("web", "lint", "/repo/web")]);
        assert_eq!(provider.len(), 2);
        assert!(provider.task("web.lint").is_some());
        assert!(provider.task("web.deploy").is_none());
    }
}
