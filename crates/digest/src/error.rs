//! Error types for the digest crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for digest parsing and hashing
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// The string has no `<algorithm>:` prefix
    #[error("digest '{input}' is missing the '<algorithm>:' prefix")]
    #[diagnostic(
        code(cairn::digest::missing_separator),
        help("Digests are stored as '<algorithm>:<hex>', e.g. 'sha384:ab12...'")
    )]
    MissingSeparator {
        /// The rejected input
        input: String,
    },

    /// The algorithm tag is not one we know how to handle
    #[error("unsupported digest algorithm '{algorithm}'")]
    #[diagnostic(code(cairn::digest::algorithm), help("Supported algorithms: sha256, sha384"))]
    UnknownAlgorithm {
        /// The rejected algorithm tag
        algorithm: String,
    },

    /// The hex part has the wrong number of characters for its algorithm
    #[error("{algorithm} digest has {actual} hex characters, expected {expected}")]
    #[diagnostic(code(cairn::digest::length))]
    InvalidLength {
        /// Algorithm tag of the digest
        algorithm: String,
        /// Expected number of hex characters
        expected: usize,
        /// Actual number of hex characters
        actual: usize,
    },

    /// The hex part contains non-hex characters
    #[error("digest '{input}' is not valid hex: {reason}")]
    #[diagnostic(code(cairn::digest::hex))]
    InvalidHex {
        /// The rejected input
        input: String,
        /// Decoder message
        reason: String,
    },

    /// I/O error while hashing a file
    #[error("I/O {operation} failed: {}", path.display())]
    #[diagnostic(
        code(cairn::digest::io),
        help("Check that the file still exists and is readable")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path being hashed
        path: Box<Path>,
        /// Operation that failed ("open", "read")
        operation: String,
    },
}

impl Error {
    /// Create an I/O error with path context
    #[must_use]
    pub fn io(source: std::io::Error, path: impl AsRef<Path>, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: path.as_ref().into(),
            operation: operation.into(),
        }
    }

    /// True for the parse-time variants (as opposed to hashing I/O failures)
    #[must_use]
    pub const fn is_parse_error(&self) -> bool {
        !matches!(self, Self::Io { .. })
    }
}

/// Result type for digest operations
pub type Result<T> = std::result::Result<T, Error>;
