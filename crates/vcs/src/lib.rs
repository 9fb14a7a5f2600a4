//! Version-control state providers for cairn
//!
//! Input declarations may restrict file matches to files tracked by version
//! control. The resolver consumes that information through the [`VcsState`]
//! trait; this crate provides a git implementation and a no-VCS fallback.

mod error;
mod git;

pub use error::{Error, Result};
pub use git::{GitState, is_inside_work_tree};

use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Read-only view of which files are under version control
pub trait VcsState: Send + Sync + std::fmt::Debug {
    /// Short provider name for logging
    fn name(&self) -> &'static str;

    /// Filter `paths` down to the ones tracked by version control.
    ///
    /// Paths are absolute; order of the retained paths is preserved.
    ///
    /// # Errors
    ///
    /// Returns an error if the VCS state cannot be determined.
    fn without_untracked(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>>;
}

/// State provider for directories outside any repository.
///
/// Any attempt to filter by tracked state fails with
/// [`Error::NotARepository`].
#[derive(Debug, Clone)]
pub struct NoVcsState {
    root: PathBuf,
}

impl NoVcsState {
    /// Create a provider for `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl VcsState for NoVcsState {
    fn name(&self) -> &'static str {
        "none"
    }

    fn without_untracked(&self, _paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        Err(Error::not_a_repository(&self.root))
    }
}

/// Pick the state provider for `root`: git when inside a work tree, none otherwise
#[must_use]
pub fn detect(root: &Path) -> Arc<dyn VcsState> {
    match GitState::open(root) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::debug!(root = %root.display(), error = %e, "No VCS detected");
            Arc::new(NoVcsState::new(root))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_vcs_rejects_filtering() {
        let state = NoVcsState::new("/repo");
        let err = state
            .without_untracked(&[PathBuf::from("/repo/a.txt")])
            .unwrap_err();
        assert!(matches!(err, Error::NotARepository { .. }));
        assert_eq!(state.name(), "none");
    }

    #[test]
    fn test_error_messages() {
        let err = Error::not_a_repository("/tmp/x");
        assert_eq!(
            err.to_string(),
            "/tmp/x is not part of a version-controlled repository"
        );
        let err = Error::command("git ls-files -z", "fatal: oops");
        assert_eq!(err.to_string(), "'git ls-files -z' failed: fatal: oops");
    }
}
