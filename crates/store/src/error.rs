//! Error types for the store crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for run store operations
#[derive(Error, Debug, Diagnostic)]
pub enum StoreError {
    /// No run was recorded for the task with the given input digest
    #[error("no run of {app}.{task} recorded for {digest}")]
    #[diagnostic(
        code(cairn::store::not_found),
        help("The task has not completed with these inputs yet")
    )]
    NotFound {
        /// Application name
        app: String,
        /// Task name
        task: String,
        /// Total input digest that was looked up
        digest: String,
    },

    /// I/O error during store operations
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(cairn::store::io),
        help("Check file permissions and ensure the store directory is writable")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "write", "rename")
        operation: String,
    },

    /// A stored run could not be encoded or decoded
    #[error("Serialization error: {message}")]
    #[diagnostic(code(cairn::store::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },

    /// Configuration or validation error
    #[error("Store configuration error: {message}")]
    #[diagnostic(code(cairn::store::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// The operation was cancelled before it completed
    #[error("Store operation cancelled")]
    #[diagnostic(code(cairn::store::cancelled))]
    Cancelled,

    /// Internal invariant violation
    #[error("Internal store error: {message}")]
    #[diagnostic(code(cairn::store::internal))]
    Internal {
        /// Description of the violation
        message: String,
    },
}

impl StoreError {
    /// Create a not-found error for a task and digest
    #[must_use]
    pub fn not_found(
        app: impl Into<String>,
        task: impl Into<String>,
        digest: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            app: app.into(),
            task: task.into(),
            digest: digest.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
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

    /// Whether this error means "no such run" rather than a failure
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Result type for store operations
pub type Result<T> = std::result::Result<T, StoreError>;
