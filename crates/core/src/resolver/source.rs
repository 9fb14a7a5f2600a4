//! Ecosystem-specific source dependency resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A dependency query for a source resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRequest {
    /// Directory the ecosystem tool runs in
    pub dir: PathBuf,
    /// Extra environment for the tool
    pub environment: BTreeMap<String, String>,
    /// Extra flags for the tool
    pub build_flags: Vec<String>,
    /// Include test sources
    pub include_tests: bool,
    /// Package queries
    pub queries: Vec<String>,
}

/// Turns a dependency query into the source files it covers
pub trait SourceResolver: Send + Sync + Debug {
    /// Ecosystem name this resolver is registered under
    fn ecosystem(&self) -> &'static str;

    /// Absolute paths of every source file the query depends on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SourceResolution`] if the ecosystem tool fails.
    fn resolve(&self, request: &SourceRequest) -> Result<Vec<PathBuf>>;
}

/// Go resolver backed by `go list -e -deps -json`.
///
/// Standard-library packages and packages outside `root` are skipped;
/// third-party modules are pinned by `go.sum`, which tasks declare as a file
/// input.
#[derive(Debug, Clone)]
pub struct GoSourceResolver {
    root: PathBuf,
    go: PathBuf,
}

impl GoSourceResolver {
    /// Resolver keeping packages under `root`
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            go: PathBuf::from("go"),
        }
    }

    /// Use a specific `go` binary
    #[must_use]
    pub fn with_go_binary(mut self, go: impl Into<PathBuf>) -> Self {
        self.go = go.into();
        self
    }

    fn command(&self, request: &SourceRequest) -> Command {
        let mut cmd = Command::new(&self.go);
        cmd.args(["list", "-e", "-deps", "-json"]);
        if request.include_tests {
            cmd.arg("-test");
        }
        cmd.args(&request.build_flags)
            .arg("--")
            .args(&request.queries)
            .envs(&request.environment)
            .current_dir(&request.dir);
        cmd
    }
}

impl SourceResolver for GoSourceResolver {
    fn ecosystem(&self) -> &'static str {
        "go"
    }

    fn resolve(&self, request: &SourceRequest) -> Result<Vec<PathBuf>> {
        let _span = tracing::debug_span!(
            "go_list",
            dir = %request.dir.display(),
            queries = ?request.queries
        )
        .entered();

        let output = self
            .command(request)
            .output()
            .map_err(|e| Error::source_resolution("go", format!("failed to run go list: {e}")))?;
        if !output.status.success() {
            return Err(Error::source_resolution(
                "go",
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        let files = parse_go_list(&output.stdout, &self.root, request.include_tests)?;
        tracing::debug!(files = files.len(), "Resolved Go sources");
        Ok(files)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GoPackage {
    dir: Option<PathBuf>,
    import_path: String,
    #[serde(default)]
    standard: bool,
    #[serde(default)]
    go_files: Vec<String>,
    #[serde(default)]
    cgo_files: Vec<String>,
    #[serde(default)]
    c_files: Vec<String>,
    #[serde(default)]
    h_files: Vec<String>,
    #[serde(default)]
    s_files: Vec<String>,
    #[serde(default)]
    embed_files: Vec<String>,
    #[serde(default)]
    test_go_files: Vec<String>,
    #[serde(default)]
    x_test_go_files: Vec<String>,
    error: Option<GoPackageError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GoPackageError {
    err: String,
}

/// Collect source files from a `go list -json` stream of package objects
fn parse_go_list(stdout: &[u8], root: &Path, include_tests: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for package in serde_json::Deserializer::from_slice(stdout).into_iter::<GoPackage>() {
        let package = package
            .map_err(|e| Error::source_resolution("go", format!("invalid go list output: {e}")))?;
        if let Some(error) = package.error {
            return Err(Error::source_resolution(
                "go",
                format!("{}: {}", package.import_path, error.err),
            ));
        }
        if package.standard {
            continue;
        }
        let Some(dir) = package.dir.filter(|d| d.starts_with(root)) else {
            continue;
        };

        let mut names: Vec<&String> = package
            .go_files
            .iter()
            .chain(&package.cgo_files)
            .chain(&package.c_files)
            .chain(&package.h_files)
            .chain(&package.s_files)
            .chain(&package.embed_files)
            .collect();
        if include_tests {
            names.extend(package.test_go_files.iter().chain(&package.x_test_go_files));
        }
        files.extend(names.into_iter().map(|name| dir.join(name)));
    }
    files.sort();
    files.dedup();
    Ok(files)
}
