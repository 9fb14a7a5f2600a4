//! Error types for input resolution and status evaluation

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Main error type for cairn core operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A required input pattern expanded to nothing
    #[error("{task}: input pattern '{pattern}' matched no files")]
    #[diagnostic(
        code(cairn::resolve::pattern_matched_zero),
        help("Fix the pattern or mark the declaration as optional")
    )]
    PatternMatchedZero {
        /// Task identifier
        task: String,
        /// The exact pattern that matched nothing
        pattern: String,
    },

    /// Filesystem failure other than a missing path
    #[error("{}I/O {operation} failed: {}", task.as_ref().map_or(String::new(), |t| format!("{t}: ")), path.display())]
    #[diagnostic(
        code(cairn::io),
        help("Check file permissions and that symlinks resolve")
    )]
    Filesystem {
        /// Task being resolved, when known
        task: Option<String>,
        /// Path that caused the error
        path: Box<Path>,
        /// Operation that failed (e.g., "open", "read", "read_dir")
        operation: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Task-info references form a cycle
    #[error("task-info dependency cycle: {cycle}")]
    #[diagnostic(
        code(cairn::task_info::cycle),
        help("Remove one of the task-info references along the cycle")
    )]
    CycleDetected {
        /// The cycle path, e.g. `a.x -> a.y -> a.x`
        cycle: String,
    },

    /// Options that cannot be used together on one evaluation
    #[error("{task}: {message}")]
    #[diagnostic(code(cairn::status::unsupported_combination))]
    UnsupportedCombination {
        /// Task identifier
        task: String,
        /// What was combined
        message: String,
    },

    /// A stored digest string could not be parsed, or a file could not be hashed
    #[error(transparent)]
    #[diagnostic(transparent)]
    DigestParse(#[from] cairn_digest::Error),

    /// Passthrough from the run store
    #[error(transparent)]
    #[diagnostic(transparent)]
    Store(#[from] cairn_store::StoreError),

    /// A declaration is malformed
    #[error("{task}: invalid input declaration: {message}")]
    #[diagnostic(code(cairn::task::invalid_declaration))]
    InvalidDeclaration {
        /// Task identifier
        task: String,
        /// What is wrong
        message: String,
    },

    /// A task-info reference names a task the provider does not know
    #[error("{referenced_by} references unknown task '{task}'")]
    #[diagnostic(
        code(cairn::task::unknown),
        help("Task references are '<app>.<task>' or a bare task name in the same app")
    )]
    UnknownTask {
        /// The missing task
        task: String,
        /// The task holding the reference
        referenced_by: String,
    },

    /// VCS state could not be determined
    #[error("{task}: version control query failed")]
    #[diagnostic(code(cairn::vcs))]
    Vcs {
        /// Task identifier
        task: String,
        /// The underlying VCS error
        #[source]
        source: cairn_vcs::Error,
    },

    /// An ecosystem source resolver failed
    #[error("{ecosystem} source resolution failed: {message}")]
    #[diagnostic(code(cairn::resolve::source))]
    SourceResolution {
        /// Ecosystem name, e.g. "go"
        ecosystem: String,
        /// Failure description
        message: String,
    },

    /// The evaluation was cancelled
    #[error("{task}: evaluation cancelled")]
    #[diagnostic(code(cairn::status::cancelled))]
    Cancelled {
        /// Task identifier
        task: String,
    },

    /// A run store call did not complete in time
    #[error("{task}: run store did not answer within {timeout_secs}s")]
    #[diagnostic(
        code(cairn::status::store_timeout),
        help("Raise storeTimeoutSecs or check the run store's availability")
    )]
    StoreTimeout {
        /// Task identifier
        task: String,
        /// Configured timeout
        timeout_secs: u64,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    #[diagnostic(code(cairn::config))]
    Configuration {
        /// Error message
        message: String,
    },

    /// An internal invariant was violated
    #[error("Internal error: {message}")]
    #[diagnostic(code(cairn::internal))]
    Internal {
        /// Description of the violation
        message: String,
    },
}

impl Error {
    /// Create a pattern-matched-zero error
    #[must_use]
    pub fn pattern_matched_zero(task: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::PatternMatchedZero {
            task: task.into(),
            pattern: pattern.into(),
        }
    }

    /// Create a filesystem error
    #[must_use]
    pub fn filesystem(
        task: Option<&str>,
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Filesystem {
            task: task.map(String::from),
            path: path.as_ref().into(),
            operation: operation.into(),
            source,
        }
    }

    /// Create an unsupported-combination error
    #[must_use]
    pub fn unsupported_combination(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedCombination {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Create an invalid-declaration error
    #[must_use]
    pub fn invalid_declaration(task: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidDeclaration {
            task: task.into(),
            message: message.into(),
        }
    }

    /// Create a source-resolution error
    #[must_use]
    pub fn source_resolution(ecosystem: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceResolution {
            ecosystem: ecosystem.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an internal error
    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
        }
    }

    /// Convert a hashing failure into a filesystem error for `task`
    #[must_use]
    pub fn from_hashing(task: Option<&str>, err: cairn_digest::Error) -> Self {
        match err {
            cairn_digest::Error::Io {
                source,
                path,
                operation,
            } => Self::Filesystem {
                task: task.map(String::from),
                path,
                operation,
                source,
            },
            other => Self::DigestParse(other),
        }
    }

    /// Attach a task id to a filesystem error that has none
    #[must_use]
    pub fn with_task(self, id: &str) -> Self {
        match self {
            Self::Filesystem {
                task: None,
                path,
                operation,
                source,
            } => Self::Filesystem {
                task: Some(id.to_string()),
                path,
                operation,
                source,
            },
            other => other,
        }
    }
}

/// Result type alias for cairn core operations
pub type Result<T> = std::result::Result<T, Error>;
