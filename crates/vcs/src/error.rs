//! Error types for VCS state providers

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for VCS operations
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Tracked-file filtering was requested outside of a repository
    #[error("{} is not part of a version-controlled repository", path.display())]
    #[diagnostic(
        code(cairn::vcs::not_a_repository),
        help("Remove the tracked-only flag from the input declaration or run inside a git checkout")
    )]
    NotARepository {
        /// Directory that was checked
        path: Box<Path>,
    },

    /// A VCS command exited unsuccessfully
    #[error("'{command}' failed: {message}")]
    #[diagnostic(code(cairn::vcs::command))]
    Command {
        /// The command line that was run
        command: String,
        /// Captured stderr or exit status
        message: String,
    },

    /// The VCS binary could not be spawned
    #[error("failed to run '{command}'")]
    #[diagnostic(code(cairn::vcs::spawn), help("Ensure git is installed and on PATH"))]
    Spawn {
        /// The command line that was attempted
        command: String,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Internal state could not be accessed
    #[error("internal VCS state error: {message}")]
    #[diagnostic(code(cairn::vcs::internal))]
    Internal {
        /// Description of the broken invariant
        message: String,
    },
}

impl Error {
    /// Create a not-a-repository error
    #[must_use]
    pub fn not_a_repository(path: impl AsRef<Path>) -> Self {
        Self::NotARepository {
            path: path.as_ref().into(),
        }
    }

    /// Create a command failure error
    #[must_use]
    pub fn command(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
            message: message.into(),
        }
    }
}

/// Result type for VCS operations
pub type Result<T> = std::result::Result<T, Error>;
