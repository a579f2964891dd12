//! Locate the writable root directory that holds repository working copies.
//!
//! Strategies are tried in priority order and the first writable hit wins:
//!
//! 1. explicit override (`GITDOCK_REPOS_PATH`)
//! 2. configured `main_path`
//! 3. runtime volume mounts (`/var/lib/docker/volumes/*/_data`, …)
//! 4. bind mounts (`/data/compose/*/repos`, …)
//! 5. directory holding an existing working copy, at most three levels deep
//!    under `/app`, `/data`, `/mnt`, `/opt`
//! 6. the first default directory that can be created
//!
//! When nothing is writable the configured path is returned anyway; callers
//! must expect later filesystem operations to fail. A successful resolution
//! is cached in the resolver and persisted to `main_path`.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use gitdock_core::settings::{self, Settings};

pub const OVERRIDE_ENV: &str = "GITDOCK_REPOS_PATH";
pub const DEFAULT_MAIN_PATH: &str = "/repos";

const VOLUME_PATTERNS: &[&str] = &[
    "/var/lib/docker/volumes/*/_data",
    "/app/repos",
    "/mnt/repos",
    "/data/repos",
    "/workspace/repos",
];

const BIND_PATTERNS: &[&str] = &[
    "/data/compose/*/host-repos",
    "/data/compose/*/repos",
    "/opt/*/repos",
    "/home/*/repos",
];

const WALK_ROOTS: &[&str] = &["/app", "/data", "/mnt", "/opt"];
const WALK_MAX_DEPTH: usize = 3;

const DEFAULT_CANDIDATES: &[&str] = &["/app/repos", "/data/repos", "/tmp/repos"];

/// Which strategy produced a [`ResolvedPath`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSource {
    Override,
    Configured,
    VolumeMount,
    BindMount,
    ExistingWorkingCopy,
    CreatedDefault,
    /// Nothing was writable; the configured path is returned unchecked.
    Unverified,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPath {
    pub path: PathBuf,
    pub source: PathSource,
}

impl ResolvedPath {
    pub fn is_writable(&self) -> bool {
        self.source != PathSource::Unverified
    }
}

/// Prioritised path detection with an explicit, invalidatable cache.
#[derive(Debug)]
pub struct PathResolver {
    home: PathBuf,
    override_path: Option<PathBuf>,
    volume_patterns: Vec<String>,
    bind_patterns: Vec<String>,
    walk_roots: Vec<PathBuf>,
    default_candidates: Vec<PathBuf>,
    cached: Mutex<Option<ResolvedPath>>,
}

impl PathResolver {
    /// Resolver with the standard container-host search locations and the
    /// override taken from the environment.
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self {
            home: home.into(),
            override_path: std::env::var_os(OVERRIDE_ENV)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            volume_patterns: VOLUME_PATTERNS.iter().map(|s| s.to_string()).collect(),
            bind_patterns: BIND_PATTERNS.iter().map(|s| s.to_string()).collect(),
            walk_roots: WALK_ROOTS.iter().map(PathBuf::from).collect(),
            default_candidates: DEFAULT_CANDIDATES.iter().map(PathBuf::from).collect(),
            cached: Mutex::new(None),
        }
    }

    /// Resolver that only consults the override and the configured path.
    pub fn isolated(home: impl Into<PathBuf>) -> Self {
        Self {
            override_path: None,
            volume_patterns: vec![],
            bind_patterns: vec![],
            walk_roots: vec![],
            default_candidates: vec![],
            ..Self::new(home)
        }
    }

    pub fn with_override(mut self, path: Option<PathBuf>) -> Self {
        self.override_path = path;
        self
    }

    pub fn with_volume_patterns(mut self, patterns: Vec<String>) -> Self {
        self.volume_patterns = patterns;
        self
    }

    pub fn with_bind_patterns(mut self, patterns: Vec<String>) -> Self {
        self.bind_patterns = patterns;
        self
    }

    pub fn with_walk_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.walk_roots = roots;
        self
    }

    pub fn with_default_candidates(mut self, candidates: Vec<PathBuf>) -> Self {
        self.default_candidates = candidates;
        self
    }

    /// Drop the cached resolution so the next call re-runs detection.
    pub fn invalidate(&self) {
        if let Ok(mut guard) = self.cached.lock() {
            *guard = None;
        }
    }

    /// Resolve the root, using the cache when it still points at a directory.
    pub fn resolve(&self) -> ResolvedPath {
        if let Ok(guard) = self.cached.lock() {
            if let Some(hit) = guard.as_ref() {
                if hit.path.is_dir() {
                    return hit.clone();
                }
            }
        }

        let settings = settings::load_settings_at(&self.home).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "could not read settings; using defaults");
            Settings::default()
        });
        let configured = PathBuf::from(settings.str_or(settings::MAIN_PATH, DEFAULT_MAIN_PATH));

        let resolved = self.detect(&configured);
        if resolved.is_writable() {
            tracing::debug!(path = %resolved.path.display(), source = ?resolved.source, "resolved repository root");
            if resolved.path != configured {
                if let Err(err) = settings::set_setting_at(
                    &self.home,
                    settings::MAIN_PATH,
                    &resolved.path.display().to_string(),
                ) {
                    tracing::warn!(error = %err, "could not persist resolved repository root");
                }
            }
            if let Ok(mut guard) = self.cached.lock() {
                *guard = Some(resolved.clone());
            }
        } else {
            tracing::warn!(path = %resolved.path.display(), "no writable repository root found; filesystem operations may fail");
        }
        resolved
    }

    fn detect(&self, configured: &Path) -> ResolvedPath {
        let hit = |path: PathBuf, source| ResolvedPath { path, source };

        if let Some(path) = &self.override_path {
            if ensure_writable(path) {
                return hit(path.clone(), PathSource::Override);
            }
            tracing::warn!(path = %path.display(), "override path is not writable; trying next strategy");
        }

        if ensure_writable(configured) {
            return hit(configured.to_path_buf(), PathSource::Configured);
        }

        if let Some(path) = first_writable_match(&self.volume_patterns) {
            return hit(path, PathSource::VolumeMount);
        }

        if let Some(path) = first_writable_match(&self.bind_patterns) {
            return hit(path, PathSource::BindMount);
        }

        for root in &self.walk_roots {
            if let Some(path) = find_working_copy_parent(root, WALK_MAX_DEPTH) {
                if probe_write(&path) {
                    return hit(path, PathSource::ExistingWorkingCopy);
                }
            }
        }

        for candidate in &self.default_candidates {
            if ensure_writable(candidate) {
                return hit(candidate.clone(), PathSource::CreatedDefault);
            }
        }

        hit(configured.to_path_buf(), PathSource::Unverified)
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

/// Create the directory if needed and check that a file can be written in it.
fn ensure_writable(path: &Path) -> bool {
    if std::fs::create_dir_all(path).is_err() {
        return false;
    }
    probe_write(path)
}

fn probe_write(dir: &Path) -> bool {
    if !dir.is_dir() {
        return false;
    }
    let probe = dir.join(format!(".gitdock-probe-{}", std::process::id()));
    match std::fs::write(&probe, b"") {
        Ok(()) => {
            let _ = std::fs::remove_file(&probe);
            true
        }
        Err(_) => false,
    }
}

fn first_writable_match(patterns: &[String]) -> Option<PathBuf> {
    for pattern in patterns {
        let Ok(paths) = glob::glob(pattern) else {
            tracing::debug!(pattern, "skipping invalid path pattern");
            continue;
        };
        for path in paths.flatten() {
            if probe_write(&path) {
                return Some(path);
            }
        }
    }
    None
}

/// Breadth-first walk for a directory containing `.git`, at most `max_depth`
/// levels below `root`; returns its parent.
fn find_working_copy_parent(root: &Path, max_depth: usize) -> Option<PathBuf> {
    let mut frontier = vec![root.to_path_buf()];
    for _ in 0..max_depth {
        let mut next = Vec::new();
        for dir in frontier {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            let mut children: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
                .map(|e| e.path())
                .collect();
            children.sort();
            for child in children {
                if child.join(".git").exists() {
                    return child.parent().map(Path::to_path_buf);
                }
                let hidden = child
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with('.'))
                    .unwrap_or(false);
                if !hidden {
                    next.push(child);
                }
            }
        }
        frontier = next;
    }
    None
}
