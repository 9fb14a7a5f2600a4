//! Input resolution
//!
//! [`InputResolver`] expands a task's declarations into a deduplicated
//! [`Inputs`] collection, in a fixed order:
//!
//! 1. source-dependency declarations
//! 2. file patterns, each pattern on its own
//! 3. the task's configuration files
//! 4. environment-variable declarations
//!
//! Task-info declarations need status evaluation and are handled by the
//! [`StatusEvaluator`](crate::StatusEvaluator).
//!
//! The resolver owns two caches. Expanded path lists are kept in an LRU
//! keyed by declaration; file inputs are kept for the resolver's lifetime,
//! keyed by absolute path, so each file is hashed at most once. Both are
//! locked only for lookup and insert, never across filesystem, VCS or
//! ecosystem tool calls.

mod env;
mod glob;
mod lru;
mod source;

pub use source::{GoSourceResolver, SourceRequest, SourceResolver};

use crate::input::{Input, InputFile};
use crate::inputs::Inputs;
use crate::task::{FileDeclaration, SourceDeclaration, Task};
use crate::{Config, Error, Result};
use cairn_vcs::{NoVcsState, VcsState};
use glob::normalize_rel_path;
use lru::LruCache;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Default number of declaration results kept
pub const DEFAULT_DECLARATION_CACHE_CAPACITY: usize = 512;

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) files_hashed: AtomicU64,
    pub(crate) bytes_hashed: AtomicU64,
    pub(crate) declaration_hits: AtomicU64,
    pub(crate) declaration_misses: AtomicU64,
}

/// Snapshot of resolver activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ResolverStats {
    /// Files whose contents were hashed
    pub files_hashed: u64,
    /// Content bytes hashed
    pub bytes_hashed: u64,
    /// Declaration results served from cache
    pub declaration_cache_hits: u64,
    /// Declaration results computed
    pub declaration_cache_misses: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum DeclarationKey {
    Pattern {
        dir: PathBuf,
        pattern: String,
        optional: bool,
        tracked_only: bool,
    },
    Source {
        dir: PathBuf,
        declaration: SourceDeclaration,
    },
}

type PathList = Arc<Vec<PathBuf>>;

/// Expands task declarations into inputs
pub struct InputResolver {
    root: PathBuf,
    vcs: Arc<dyn VcsState>,
    sources: HashMap<String, Arc<dyn SourceResolver>>,
    environment: BTreeMap<String, String>,
    declarations: Mutex<LruCache<DeclarationKey, PathList>>,
    files: Mutex<HashMap<PathBuf, Arc<InputFile>>>,
    counters: Arc<Counters>,
}

impl std::fmt::Debug for InputResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputResolver")
            .field("root", &self.root)
            .field("vcs", &self.vcs.name())
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl InputResolver {
    /// Resolver for the repository at `root`.
    ///
    /// Starts without VCS filtering or source resolvers, with a snapshot of
    /// the process environment.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = normalize_rel_path(&root.into());
        Self {
            vcs: Arc::new(NoVcsState::new(&root)),
            root,
            sources: HashMap::new(),
            environment: std::env::vars().collect(),
            declarations: Mutex::new(LruCache::new(DEFAULT_DECLARATION_CACHE_CAPACITY)),
            files: Mutex::new(HashMap::new()),
            counters: Arc::default(),
        }
    }

    /// Resolver configured from `config`: VCS detected at the repository
    /// root and the Go source resolver registered.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the repository root cannot be
    /// determined.
    pub fn from_config(config: &Config) -> Result<Self> {
        let root = config.repository_root()?;
        let vcs = cairn_vcs::detect(&root);
        Ok(Self::new(&root)
            .with_vcs(vcs)
            .with_source_resolver(Arc::new(GoSourceResolver::new(&root)))
            .with_cache_capacity(config.declaration_cache_capacity))
    }

    /// Use `vcs` for tracked-only filtering
    #[must_use]
    pub fn with_vcs(mut self, vcs: Arc<dyn VcsState>) -> Self {
        self.vcs = vcs;
        self
    }

    /// Register a source resolver under its ecosystem name
    #[must_use]
    pub fn with_source_resolver(mut self, resolver: Arc<dyn SourceResolver>) -> Self {
        self.sources
            .insert(resolver.ecosystem().to_string(), resolver);
        self
    }

    /// Replace the environment snapshot
    #[must_use]
    pub fn with_environment<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.environment = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Set the declaration cache capacity
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.declarations = Mutex::new(LruCache::new(capacity));
        self
    }

    /// Repository root
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current activity counters
    #[must_use]
    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            files_hashed: self.counters.files_hashed.load(Ordering::Relaxed),
            bytes_hashed: self.counters.bytes_hashed.load(Ordering::Relaxed),
            declaration_cache_hits: self.counters.declaration_hits.load(Ordering::Relaxed),
            declaration_cache_misses: self.counters.declaration_misses.load(Ordering::Relaxed),
        }
    }

    /// Drop every cached declaration result and file input
    ///
    /// # Errors
    ///
    /// Returns [`Error::Internal`] if a cache lock is poisoned.
    pub fn clear_caches(&self) -> Result<()> {
        lock(&self.declarations, "declaration cache")?.clear();
        lock(&self.files, "file cache")?.clear();
        Ok(())
    }

    /// Resolve every non-task-info declaration of `task`.
    ///
    /// This blocks on the filesystem, the VCS and ecosystem tools.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDeclaration`] for malformed declarations or paths
    ///   outside the repository
    /// - [`Error::PatternMatchedZero`] for a required pattern with no match
    /// - [`Error::Filesystem`], [`Error::Vcs`], [`Error::SourceResolution`]
    pub fn resolve(&self, task: &Task) -> Result<Inputs> {
        let id = task.id();
        let span = tracing::info_span!(
            "input_resolver.resolve",
            task = %id,
            root = %self.root.display()
        );
        let _guard = span.enter();

        task.validate()?;

        let mut paths: Vec<PathBuf> = Vec::new();

        for decl in &task.sources {
            paths.extend(self.resolve_sources(&id, task, decl)?.iter().cloned());
        }

        for decl in &task.files {
            for pattern in &decl.paths {
                paths.extend(self.resolve_pattern(&id, task, decl, pattern)?.iter().cloned());
            }
        }

        paths.extend(task.config_files.iter().map(|p| self.root.join(p)));

        let mut inputs = Inputs::new();
        let mut seen: HashSet<String> = HashSet::new();
        for abs in paths {
            let abs = normalize_rel_path(&abs);
            let rel = self.relative_path(&id, &abs)?;
            if seen.insert(rel.clone()) {
                inputs.add(Input::File(self.file_input(rel, abs)?));
            }
        }
        let file_count = inputs.len();

        for decl in &task.env_vars {
            inputs.extend(env::resolve(&id, decl, &self.environment)?);
        }

        tracing::debug!(
            files = file_count,
            env_vars = inputs.len() - file_count,
            "Input resolution complete"
        );
        Ok(inputs)
    }

    fn resolve_sources(&self, id: &str, task: &Task, decl: &SourceDeclaration) -> Result<PathList> {
        let key = DeclarationKey::Source {
            dir: task.directory.clone(),
            declaration: decl.clone(),
        };
        if let Some(hit) = self.cached(&key)? {
            return Ok(hit);
        }

        let resolver = self.sources.get(&decl.ecosystem).ok_or_else(|| {
            Error::invalid_declaration(
                id,
                format!("no source resolver for ecosystem '{}'", decl.ecosystem),
            )
        })?;
        let request = SourceRequest {
            dir: task.directory.clone(),
            environment: decl.environment.clone(),
            build_flags: decl.build_flags.clone(),
            include_tests: decl.include_tests,
            queries: decl.queries.clone(),
        };
        let paths = Arc::new(resolver.resolve(&request)?);
        tracing::debug!(
            task = %id,
            ecosystem = %decl.ecosystem,
            files = paths.len(),
            "Resolved source dependencies"
        );
        self.store(key, Arc::clone(&paths))?;
        Ok(paths)
    }

    fn resolve_pattern(
        &self,
        id: &str,
        task: &Task,
        decl: &FileDeclaration,
        pattern: &str,
    ) -> Result<PathList> {
        let key = DeclarationKey::Pattern {
            dir: task.directory.clone(),
            pattern: pattern.to_string(),
            optional: decl.optional,
            tracked_only: decl.vcs_tracked_only,
        };
        if let Some(hit) = self.cached(&key)? {
            return Ok(hit);
        }

        let mut matches = glob::expand(id, &task.directory, pattern)?;
        if decl.vcs_tracked_only && !matches.is_empty() {
            matches = self
                .vcs
                .without_untracked(&matches)
                .map_err(|source| Error::Vcs {
                    task: id.to_string(),
                    source,
                })?;
        }

        if matches.is_empty() {
            if !decl.optional {
                return Err(Error::pattern_matched_zero(id, pattern));
            }
            tracing::debug!(task = %id, pattern = %pattern, "Optional pattern matched nothing");
        }

        let matches = Arc::new(matches);
        self.store(key, Arc::clone(&matches))?;
        Ok(matches)
    }

    fn cached(&self, key: &DeclarationKey) -> Result<Option<PathList>> {
        let hit = lock(&self.declarations, "declaration cache")?.get(key);
        let counter = if hit.is_some() {
            &self.counters.declaration_hits
        } else {
            &self.counters.declaration_misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        Ok(hit)
    }

    fn store(&self, key: DeclarationKey, paths: PathList) -> Result<()> {
        lock(&self.declarations, "declaration cache")?.put(key, paths);
        Ok(())
    }

    fn relative_path(&self, id: &str, abs: &Path) -> Result<String> {
        let rel = abs.strip_prefix(&self.root).map_err(|_| {
            Error::invalid_declaration(
                id,
                format!(
                    "{} is outside the repository root {}",
                    abs.display(),
                    self.root.display()
                ),
            )
        })?;
        Ok(rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/"))
    }

    fn file_input(&self, rel: String, abs: PathBuf) -> Result<Arc<InputFile>> {
        let mut files = lock(&self.files, "file cache")?;
        if let Some(existing) = files.get(&abs) {
            return Ok(Arc::clone(existing));
        }
        let input = Arc::new(InputFile::with_counters(
            rel,
            abs.clone(),
            Arc::clone(&self.counters),
        ));
        files.insert(abs, Arc::clone(&input));
        Ok(input)
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| Error::internal(format!("{what} mutex poisoned")))
}
