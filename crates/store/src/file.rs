//! JSON-file run store
//!
//! Runs are stored one JSON document per run in a two-level directory
//! structure keyed by the total input digest:
//!
//! ```text
//! <root>/
//!   <app>/<task>/sha384/
//!     ab/
//!       cd/
//!         abcdef0123.../
//!           <run-id>.json
//! ```
//!
//! Writes go to a temporary file first and are renamed into place, so a
//! concurrent reader never observes a partially written run.

use crate::{NewRun, Result, Run, RunStore, StoreError};
use async_trait::async_trait;
use cairn_digest::Digest;
use dirs::{data_dir, home_dir};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

const RUN_EXTENSION: &str = "json";

/// Environment variable that overrides the store root
pub const STORE_DIR_ENV: &str = "CAIRN_STORE_DIR";

/// Run store persisting runs as JSON files under a root directory
#[derive(Debug, Clone)]
pub struct FileRunStore {
    root: PathBuf,
}

impl FileRunStore {
    /// Create a store rooted at `root`; the directory is created lazily
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a store at the first writable default location.
    ///
    /// Resolution order:
    /// 1. `CAIRN_STORE_DIR`
    /// 2. `XDG_DATA_HOME/cairn/runs`
    /// 3. OS data dir `/cairn/runs`
    /// 4. `~/.cairn/runs`
    /// 5. `TMPDIR/cairn/runs`
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Configuration`] if no candidate is writable.
    pub fn open_default() -> Result<Self> {
        first_writable(default_roots()).map(Self::new)
    }

    /// Root directory of the store
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn digest_dir(&self, app: &str, task: &str, digest: &Digest) -> Result<PathBuf> {
        let hex = digest.to_hex();
        Ok(self
            .root
            .join(path_component(app)?)
            .join(path_component(task)?)
            .join(digest.algorithm().name())
            .join(&hex[0..2])
            .join(&hex[2..4])
            .join(&hex))
    }

    fn read_latest(&self, app: &str, task: &str, digest: &Digest) -> Result<Run> {
        let dir = self.digest_dir(app, task, digest)?;
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::not_found(app, task, digest.to_string()));
            }
            Err(e) => return Err(StoreError::io(e, &dir, "read_dir")),
        };

        let mut latest: Option<Run> = None;
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(e, &dir, "read_dir"))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RUN_EXTENSION) {
                continue;
            }
            let bytes = fs::read(&path).map_err(|e| StoreError::io(e, &path, "read"))?;
            let run: Run = serde_json::from_slice(&bytes).map_err(|e| {
                StoreError::serialization(format!("Failed to parse {}: {e}", path.display()))
            })?;
            trace!(path = %path.display(), id = %run.id, "Read stored run");
            if latest.as_ref().is_none_or(|best| run.is_newer_than(best)) {
                latest = Some(run);
            }
        }

        latest.ok_or_else(|| StoreError::not_found(app, task, digest.to_string()))
    }

    fn write_run(&self, run: &Run) -> Result<PathBuf> {
        let dir = self.digest_dir(&run.app, &run.task, &run.total_input_digest)?;
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(e, &dir, "create_dir_all"))?;

        let path = dir.join(format!("{}.{RUN_EXTENSION}", run.id));
        let json = serde_json::to_vec_pretty(run)
            .map_err(|e| StoreError::serialization(format!("Failed to serialize run: {e}")))?;

        let tmp_path = path.with_extension("tmp");
        let mut file =
            fs::File::create(&tmp_path).map_err(|e| StoreError::io(e, &tmp_path, "create"))?;
        file.write_all(&json)
            .map_err(|e| StoreError::io(e, &tmp_path, "write"))?;
        file.sync_all()
            .map_err(|e| StoreError::io(e, &tmp_path, "sync"))?;
        drop(file);

        fs::rename(&tmp_path, &path).map_err(|e| StoreError::io(e, &path, "rename"))?;
        Ok(path)
    }
}

#[async_trait]
impl RunStore for FileRunStore {
    async fn latest_run_by_digest(
        &self,
        cancel: &CancellationToken,
        app: &str,
        task: &str,
        digest: &Digest,
    ) -> Result<Run> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let store = self.clone();
        let (app, task, digest) = (app.to_string(), task.to_string(), digest.clone());
        tokio::task::spawn_blocking(move || store.read_latest(&app, &task, &digest))
            .await
            .map_err(|e| StoreError::internal(format!("store read task failed: {e}")))?
    }

    async fn record_run(&self, cancel: &CancellationToken, run: NewRun) -> Result<Run> {
        if cancel.is_cancelled() {
            return Err(StoreError::Cancelled);
        }
        let run = Run::from_new(run);
        let store = self.clone();
        let written = run.clone();
        let path = tokio::task::spawn_blocking(move || store.write_run(&written))
            .await
            .map_err(|e| StoreError::internal(format!("store write task failed: {e}")))??;
        debug!(task = %run.task_id(), id = %run.id, path = %path.display(), "Recorded run");
        Ok(run)
    }
}

/// Reject names that would escape or collapse the store layout
fn path_component(name: &str) -> Result<&str> {
    if name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0')
    {
        return Err(StoreError::configuration(format!(
            "'{name}' cannot be used as a store path component"
        )));
    }
    Ok(name)
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

/// Default store locations, most specific first
fn default_roots() -> Vec<PathBuf> {
    let data_dirs = [env_path("XDG_DATA_HOME"), data_dir()];
    env_path(STORE_DIR_ENV)
        .into_iter()
        .chain(data_dirs.into_iter().flatten().map(|d| d.join("cairn/runs")))
        .chain(home_dir().map(|h| h.join(".cairn/runs")))
        .chain(std::iter::once(std::env::temp_dir().join("cairn/runs")))
        .collect()
}

/// First candidate that can be created and written to.
///
/// Nix build sandboxes point HOME at `/homeless-shelter`, which is skipped.
fn first_writable(candidates: impl IntoIterator<Item = PathBuf>) -> Result<PathBuf> {
    candidates
        .into_iter()
        .filter(|dir| !dir.starts_with("/homeless-shelter"))
        .find(|dir| accepts_writes(dir))
        .ok_or_else(|| StoreError::configuration("no writable run store directory"))
}

fn accepts_writes(dir: &Path) -> bool {
    if fs::create_dir_all(dir).is_err() {
        return false;
    }
    let marker = dir.join(format!(".write-check-{}", uuid::Uuid::new_v4()));
    let writable = fs::File::create(&marker).is_ok();
    let _ = fs::remove_file(&marker);
    writable
}
