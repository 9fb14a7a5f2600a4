//! Git state provider backed by the `git` command line

use crate::{Error, Result, VcsState};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Tracked-file view of a git working tree.
///
/// The set of tracked files is read once with `git ls-files -z` on first use
/// and reused for the lifetime of the value.
#[derive(Debug)]
pub struct GitState {
    root: PathBuf,
    tracked: Mutex<Option<Arc<HashSet<PathBuf>>>>,
}

impl GitState {
    /// Open the git working tree containing `root`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotARepository`] if `root` is not inside a git work tree.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !is_inside_work_tree(&root) {
            return Err(Error::not_a_repository(&root));
        }
        debug!(root = %root.display(), "Opened git working tree");
        Ok(Self {
            root,
            tracked: Mutex::new(None),
        })
    }

    /// Root directory tracked paths are relative to
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn tracked_files(&self) -> Result<Arc<HashSet<PathBuf>>> {
        {
            let guard = self.tracked.lock().map_err(|_| Error::Internal {
                message: "tracked file cache mutex poisoned".to_string(),
            })?;
            if let Some(set) = guard.as_ref() {
                return Ok(Arc::clone(set));
            }
        }

        // Run git without holding the lock; a concurrent caller may list twice
        let listed = Arc::new(self.list_tracked()?);

        let mut guard = self.tracked.lock().map_err(|_| Error::Internal {
            message: "tracked file cache mutex poisoned".to_string(),
        })?;
        Ok(Arc::clone(guard.get_or_insert(listed)))
    }

    fn list_tracked(&self) -> Result<HashSet<PathBuf>> {
        const COMMAND: &str = "git ls-files -z";
        let output = Command::new("git")
            .args(["ls-files", "-z"])
            .current_dir(&self.root)
            .output()
            .map_err(|source| Error::Spawn {
                command: COMMAND.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(Error::command(
                COMMAND,
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let tracked: HashSet<PathBuf> = output
            .stdout
            .split(|b| *b == 0)
            .filter(|entry| !entry.is_empty())
            .map(|entry| self.root.join(String::from_utf8_lossy(entry).as_ref()))
            .collect();

        debug!(
            root = %self.root.display(),
            count = tracked.len(),
            "Listed tracked files"
        );
        Ok(tracked)
    }
}

impl VcsState for GitState {
    fn name(&self) -> &'static str {
        "git"
    }

    fn without_untracked(&self, paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
        let tracked = self.tracked_files()?;
        Ok(paths
            .iter()
            .filter(|p| tracked.contains(p.as_path()))
            .cloned()
            .collect())
    }
}

/// Check whether `dir` is inside a git work tree
#[must_use]
pub fn is_inside_work_tree(dir: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(dir)
        .output()
        .is_ok_and(|o| o.status.success() && o.stdout.starts_with(b"true"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn git(dir: &Path, args: &[&str]) {
        let status = Command::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap()
            .status;
        assert!(status.success(), "git {args:?} failed");
    }

    #[test]
    fn test_open_outside_repository() {
        let tmp = TempDir::new().unwrap();
        if !git_available() || is_inside_work_tree(tmp.path()) {
            return;
        }
        assert!(matches!(
            GitState::open(tmp.path()),
            Err(Error::NotARepository { .. })
        ));
    }

    #[test]
    fn test_without_untracked_filters_unstaged_files() {
        if !git_available() {
            return;
        }
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        git(root, &["init", "-q"]);
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/tracked.rs"), "a").unwrap();
        std::fs::write(root.join("src/untracked.rs"), "b").unwrap();
        std::fs::write(root.join("name with space.txt"), "c").unwrap();
        git(root, &["add", "src/tracked.rs", "name with space.txt"]);

        let state = GitState::open(root).unwrap();
        let candidates = vec![
            root.join("src/tracked.rs"),
            root.join("src/untracked.rs"),
            root.join("name with space.txt"),
        ];
        let kept = state.without_untracked(&candidates).unwrap();
        assert_eq!(
            kept,
            vec![root.join("src/tracked.rs"), root.join("name with space.txt")]
        );

        // Cached set is reused
        std::fs::write(root.join("late.txt"), "d").unwrap();
        git(root, &["add", "late.txt"]);
        assert!(state
            .without_untracked(&[root.join("late.txt")])
            .unwrap()
            .is_empty());
    }
}
