//! The input model
//!
//! An [`Input`] is anything that has a stable identity string and can
//! produce a [`Digest`]. File inputs hash lazily and remember the result, so
//! a file shared by many tasks is read once per resolver.

use crate::resolver::Counters;
use crate::{Error, Result};
use cairn_digest::{Algorithm, Digest, Hasher};
use cairn_store::{InputKind, InputRecord};
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

/// A file input
#[derive(Debug)]
pub struct InputFile {
    rel_path: String,
    abs_path: PathBuf,
    digest: Mutex<Option<Digest>>,
    counters: Arc<Counters>,
}

impl InputFile {
    /// Create a file input for `abs_path`, identified by `rel_path`
    #[must_use]
    pub fn new(rel_path: impl Into<String>, abs_path: impl Into<PathBuf>) -> Self {
        Self::with_counters(rel_path, abs_path, Arc::default())
    }

    pub(crate) fn with_counters(
        rel_path: impl Into<String>,
        abs_path: impl Into<PathBuf>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            rel_path: rel_path.into(),
            abs_path: abs_path.into(),
            digest: Mutex::new(None),
            counters,
        }
    }

    /// Repository-relative path, `/`-separated
    #[must_use]
    pub fn rel_path(&self) -> &str {
        &self.rel_path
    }

    /// Absolute path on disk
    #[must_use]
    pub fn abs_path(&self) -> &Path {
        &self.abs_path
    }

    /// Digest of the relative path followed by the file contents.
    ///
    /// The first caller hashes the file while holding this input's lock;
    /// concurrent callers wait and observe the same result. Failures are not
    /// remembered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] if the file cannot be read.
    pub fn digest(&self) -> Result<Digest> {
        let mut memo = self
            .digest
            .lock()
            .map_err(|_| Error::internal(format!("digest lock poisoned for {}", self.rel_path)))?;
        if let Some(digest) = memo.as_ref() {
            return Ok(digest.clone());
        }

        let mut hasher = Hasher::new(Algorithm::DEFAULT);
        hasher.update(self.rel_path.as_bytes());
        let size = hasher
            .update_file(&self.abs_path)
            .map_err(|e| Error::from_hashing(None, e))?;
        let digest = hasher.finalize();

        self.counters.files_hashed.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes_hashed.fetch_add(size, Ordering::Relaxed);
        tracing::trace!(path = %self.rel_path, size, "Hashed input file");

        *memo = Some(digest.clone());
        Ok(digest)
    }
}

/// A literal string input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputString {
    value: String,
    digest: Digest,
}

impl InputString {
    /// Create a string input
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let digest = Digest::sha384(&value);
        Self { value, digest }
    }

    /// The literal
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// An environment variable input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputEnvVar {
    name: String,
    value: String,
    digest: Digest,
}

impl InputEnvVar {
    /// Create an input for `name` observed with `value`
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        let digest = Digest::sha384(format!("ENV: {name}={value}"));
        Self {
            name,
            value,
            digest,
        }
    }

    /// Variable name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Observed value
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Another task's run metadata as an input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputTaskInfo {
    task: String,
    env_var: String,
    descriptor_path: PathBuf,
    digest: Digest,
}

impl InputTaskInfo {
    /// Create a task-info input; `digest` is the referenced task's total digest
    #[must_use]
    pub fn new(
        task: impl Into<String>,
        env_var: impl Into<String>,
        descriptor_path: impl Into<PathBuf>,
        digest: Digest,
    ) -> Self {
        Self {
            task: task.into(),
            env_var: env_var.into(),
            descriptor_path: descriptor_path.into(),
            digest,
        }
    }

    /// Referenced task id
    #[must_use]
    pub fn task(&self) -> &str {
        &self.task
    }

    /// Variable that carries the descriptor path to the command
    #[must_use]
    pub fn env_var(&self) -> &str {
        &self.env_var
    }

    /// Generated descriptor file
    #[must_use]
    pub fn descriptor_path(&self) -> &Path {
        &self.descriptor_path
    }
}

/// A single hashable, identifiable input of a task
#[derive(Debug, Clone)]
pub enum Input {
    /// File contents, shared across tasks
    File(Arc<InputFile>),
    /// Literal string
    String(InputString),
    /// Environment variable
    EnvVar(InputEnvVar),
    /// Another task's run metadata
    Task(InputTaskInfo),
}

impl Input {
    /// String input for `value`
    #[must_use]
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(InputString::new(value))
    }

    /// Environment variable input
    #[must_use]
    pub fn env_var(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::EnvVar(InputEnvVar::new(name, value))
    }

    /// Kind of input
    #[must_use]
    pub const fn kind(&self) -> InputKind {
        match self {
            Self::File(_) => InputKind::File,
            Self::String(_) => InputKind::String,
            Self::EnvVar(_) => InputKind::EnvVar,
            Self::Task(_) => InputKind::Task,
        }
    }

    /// Identity string used for deduplication
    #[must_use]
    pub fn identity(&self) -> String {
        match self {
            Self::File(f) => f.rel_path.clone(),
            Self::String(s) => format!("string:{}", s.value),
            Self::EnvVar(e) => format!("${}", e.name),
            Self::Task(t) => format!("task: {}", t.task),
        }
    }

    /// Digest of the input
    ///
    /// # Errors
    ///
    /// Returns [`Error::Filesystem`] when a file input cannot be read.
    pub fn digest(&self) -> Result<Digest> {
        match self {
            Self::File(f) => f.digest(),
            Self::String(s) => Ok(s.digest.clone()),
            Self::EnvVar(e) => Ok(e.digest.clone()),
            Self::Task(t) => Ok(t.digest.clone()),
        }
    }

    /// Stored projection of the input
    ///
    /// # Errors
    ///
    /// Returns an error if the digest cannot be computed.
    pub fn record(&self) -> Result<InputRecord> {
        Ok(InputRecord::new(self.kind(), self.identity(), self.digest()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_identities() {
        assert_eq!(Input::string("feature-x").identity(), "string:feature-x");
        assert_eq!(Input::env_var("HOME", "/root").identity(), "$HOME");
        let task = Input::Task(InputTaskInfo::new(
            "web.lint",
            "LINT",
            "/tmp/d.json",
            Digest::sha384(b""),
        ));
        assert_eq!(task.identity(), "task: web.lint");
        assert_eq!(task.kind(), InputKind::Task);
    }

    #[test]
    fn test_string_and_env_digests() {
        assert_eq!(
            Input::string("v").digest().unwrap(),
            Digest::sha384(b"v")
        );
        assert_eq!(
            Input::env_var("A", "1").digest().unwrap(),
            Digest::sha384(b"ENV: A=1")
        );
    }

    #[test]
    fn test_file_digest_covers_path_and_content() {
        let tmp = TempDir::new().unwrap();
        let abs = tmp.path().join("a.txt");
        std::fs::write(&abs, "1").unwrap();

        let file = InputFile::new("a.txt", &abs);
        assert_eq!(file.digest().unwrap(), Digest::sha384(b"a.txt1"));
    }

    #[test]
    fn test_file_digest_is_memoised() {
        let tmp = TempDir::new().unwrap();
        let abs = tmp.path().join("a.txt");
        std::fs::write(&abs, "1").unwrap();

        let counters = Arc::new(Counters::default());
        let file = InputFile::with_counters("a.txt", &abs, Arc::clone(&counters));
        let first = file.digest().unwrap();
        std::fs::write(&abs, "2").unwrap();
        assert_eq!(file.digest().unwrap(), first);
        assert_eq!(counters.files_hashed.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_vanished_file_is_filesystem_error() {
        let tmp = TempDir::new().unwrap();
        let file = InputFile::new("gone.txt", tmp.path().join("gone.txt"));
        assert!(matches!(file.digest(), Err(Error::Filesystem { .. })));
    }

    #[test]
    fn test_concurrent_digest_hashes_once() {
        let tmp = TempDir::new().unwrap();
        let abs = tmp.path().join("big.bin");
        std::fs::write(&abs, vec![7u8; 256 * 1024]).unwrap();

        let counters = Arc::new(Counters::default());
        let file = Arc::new(InputFile::with_counters("big.bin", &abs, Arc::clone(&counters)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let file = Arc::clone(&file);
                std::thread::spawn(move || file.digest().unwrap())
            })
            .collect();
        let digests: Vec<Digest> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(digests.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(counters.files_hashed.load(Ordering::Relaxed), 1);
    }
}
