//! File pattern expansion

use crate::{Error, Result};
use globset::{GlobBuilder, GlobMatcher};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

fn looks_like_glob(pattern: &str) -> bool {
    pattern.contains(['*', '{', '?', '['])
}

/// Expand `pattern` relative to `dir` into the absolute paths of matching files.
///
/// A plain path names a file, or a directory whose files are all included.
/// A path or walk root that does not exist yields no matches; every other
/// filesystem failure on a path the pattern can reach is an error.
/// Returned paths are lexically normalised.
pub(crate) fn expand(task: &str, dir: &Path, pattern: &str) -> Result<Vec<PathBuf>> {
    let pattern = pattern.trim().trim_start_matches("./");
    let _span = tracing::debug_span!("pattern.expand", task = %task, pattern = %pattern).entered();

    if !looks_like_glob(pattern) {
        let abs = normalize_rel_path(&dir.join(pattern));
        return match file_kind(task, &abs)? {
            None => Ok(Vec::new()),
            Some(PathKind::File) => Ok(vec![abs]),
            Some(PathKind::Dir) => walk(task, &abs, None),
        };
    }

    let (base, rest) = split_glob(pattern);
    let matcher = GlobBuilder::new(&rest)
        .literal_separator(true)
        .build()
        .map_err(|e| Error::invalid_declaration(task, format!("invalid pattern '{pattern}': {e}")))?
        .compile_matcher();
    let selector = Selector {
        matcher,
        max_depth: (!rest.contains("**"))
            .then(|| rest.split('/').filter(|s| !s.is_empty()).count()),
    };

    let walk_root = normalize_rel_path(&dir.join(base));
    match file_kind(task, &walk_root)? {
        Some(PathKind::Dir) => walk(task, &walk_root, Some(&selector)),
        _ => {
            tracing::debug!(root = %walk_root.display(), "Walk root does not exist, no matches");
            Ok(Vec::new())
        }
    }
}

/// Glob part of a pattern, matched against paths relative to the walk root
struct Selector {
    matcher: GlobMatcher,
    /// Deepest level the pattern reaches; `None` with a `**` segment
    max_depth: Option<usize>,
}

impl Selector {
    /// Whether a walk error concerns a path the pattern can never match
    fn is_unreachable(&self, err: &walkdir::Error, walk_root: &Path) -> bool {
        let Some(path) = err.path() else {
            return false;
        };
        let Ok(rel) = path.strip_prefix(walk_root) else {
            return false;
        };
        if self.matcher.is_match(rel) {
            return false;
        }
        let leaf = self.max_depth.is_some_and(|depth| err.depth() >= depth);
        leaf || is_dangling(path)
    }
}

fn is_dangling(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok_and(|m| m.file_type().is_symlink())
        && fs::metadata(path).is_err()
}

enum PathKind {
    File,
    Dir,
}

/// `None` when nothing exists at `path`; a dangling symlink is an error
fn file_kind(task: &str, path: &Path) -> Result<Option<PathKind>> {
    match fs::symlink_metadata(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(Error::filesystem(Some(task), e, path, "stat")),
        Ok(_) => {}
    }
    let meta = fs::metadata(path).map_err(|e| Error::filesystem(Some(task), e, path, "resolve"))?;
    Ok(Some(if meta.is_dir() {
        PathKind::Dir
    } else {
        PathKind::File
    }))
}

fn walk(task: &str, walk_root: &Path, selector: Option<&Selector>) -> Result<Vec<PathBuf>> {
    let mut matches = Vec::new();
    let mut visited: u64 = 0;

    let mut walker = WalkDir::new(walk_root).follow_links(true);
    if let Some(depth) = selector.and_then(|s| s.max_depth) {
        walker = walker.max_depth(depth);
    }

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if selector.is_some_and(|s| s.is_unreachable(&e, walk_root)) => {
                tracing::debug!(error = %e, "Skipping entry the pattern cannot match");
                continue;
            }
            Err(e) => {
                let path = e
                    .path()
                    .map_or_else(|| walk_root.to_path_buf(), Path::to_path_buf);
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop detected"));
                return Err(Error::filesystem(Some(task), source, path, "walk"));
            }
        };
        visited += 1;
        if entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let Ok(rel) = path.strip_prefix(walk_root) else {
            continue;
        };
        if selector.is_none_or(|s| s.matcher.is_match(rel)) {
            matches.push(path.to_path_buf());
        }
    }

    matches.sort();
    tracing::debug!(
        root = %walk_root.display(),
        entries_visited = visited,
        files_matched = matches.len(),
        "Walk complete"
    );
    Ok(matches)
}

/// Split a glob pattern into its literal base directory and the glob part.
/// For example:
/// - `src/**/*.ts` -> (`src`, `**/*.ts`)
/// - `**/*.ts` -> (empty, `**/*.ts`), the base being the task directory
/// - `../shared/*.rs` -> (`../shared`, `*.rs`)
pub(crate) fn split_glob(pattern: &str) -> (String, String) {
    let parts: Vec<&str> = pattern.split('/').collect();
    let split = parts
        .iter()
        .position(|part| looks_like_glob(part))
        .unwrap_or(parts.len());
    let base = parts[..split]
        .iter()
        .filter(|part| !part.is_empty() && **part != ".")
        .copied()
        .collect::<Vec<_>>()
        .join("/");
    (base, parts[split..].join("/"))
}

/// Lexically normalise a path: drop `.`, resolve `..` against earlier components
pub(crate) fn normalize_rel_path(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in p.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(s) => out.push(s),
            Component::RootDir | Component::Prefix(_) => out.push(comp.as_os_str()),
        }
    }
    out
}
