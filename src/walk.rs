//! Deterministic, cycle-safe traversal of a (composed) filesystem.
//!
//! The [`Walker`] is a plain recursive depth-first traversal:
//!
//! 1. The root is stat'ed and reported.
//! 2. For every directory reported, the callback answers [`WalkControl`]:
//!    `Continue` descends, `SkipDir` prunes the subtree.
//! 3. Children are visited in ascending byte order of their names, so the
//!    entry sequence (and anything derived from it) is identical across runs
//!    and platforms.
//!
//! Excluded entries (see [`FileMeta::excluded`]) are never reported.
//!
//! ## Errors
//!
//! A failing `stat` or `read_dir` is handed to the callback as a [`WalkEntry`]
//! with `error` set; the callback returns `Ok` to carry on or `Err` to abort.
//! A callback error ends the walk and is returned unchanged.
//!
//! ## Symlinks
//!
//! The walker records the canonical walk root (on OS filesystems) and the
//! canonical target of every symlinked directory it descends. A symlinked
//! directory whose target was already recorded, or is an ancestor of the link,
//! is reported but not descended. That breaks cycles such as `a/link -> a`
//! without raising an error. Plain directories are never canonicalized.

use crate::error::FsError;
use crate::fs::{Filesystem, clean_path, join_path};
use crate::glob::{GlobCache, resolve_root_dir};
use crate::meta::{FileInfo, FileMeta};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Callback answer for a reported entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    /// Do not descend into this directory. Ignored for files.
    SkipDir,
}

/// One visited node, alive for a single callback invocation.
#[derive(Debug)]
pub struct WalkEntry {
    /// Logical path with the walk's base stripped.
    pub path: String,
    pub info: Option<FileInfo>,
    pub error: Option<FsError>,
}

impl WalkEntry {
    pub fn is_dir(&self) -> bool {
        self.info.as_ref().is_some_and(FileInfo::is_dir)
    }

    pub fn meta(&self) -> Option<&FileMeta> {
        self.info.as_ref().map(FileInfo::meta)
    }
}

#[derive(Debug, Clone)]
pub struct WalkConfig {
    pub fs: Arc<dyn Filesystem>,
    /// Where the walk starts. Defaults to the filesystem root.
    pub root: String,
    /// Prefix stripped from reported paths.
    pub base: String,
    /// A missing root ends the walk quietly instead of reaching the callback.
    pub ignore_missing_root: bool,
    /// Descend into symlinked directories (cycles are still broken).
    pub follow_symlinks: bool,
}

impl WalkConfig {
    pub fn new(fs: Arc<dyn Filesystem>) -> Self {
        Self {
            fs,
            root: String::new(),
            base: String::new(),
            ignore_missing_root: false,
            follow_symlinks: true,
        }
    }

    pub fn root(mut self, root: impl Into<String>) -> Self {
        self.root = root.into();
        self
    }

    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn ignore_missing_root(mut self, ignore: bool) -> Self {
        self.ignore_missing_root = ignore;
        self
    }

    pub fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }
}

/// Canonical walk root and symlink targets descended during one walk.
struct Visited {
    dirs: HashSet<PathBuf>,
}

impl Visited {
    fn enter_root(&mut self, filename: &Path) {
        if let Ok(canonical) = filename.canonicalize() {
            self.dirs.insert(canonical);
        }
    }

    /// Decide whether to descend into a symlinked directory, recording its
    /// target when we do.
    fn enter_symlink(&mut self, link: &Path, parent: &Path) -> bool {
        let Ok(target) = link.canonicalize() else {
            return false;
        };
        let inside_target = parent
            .canonicalize()
            .is_ok_and(|parent| parent.starts_with(&target));
        if inside_target || !self.dirs.insert(target) {
            tracing::debug!(link = %link.display(), "symlink cycle, not descending");
            return false;
        }
        true
    }
}

pub struct Walker {
    cfg: WalkConfig,
}

impl Walker {
    pub fn new(cfg: WalkConfig) -> Self {
        Self { cfg }
    }

    pub fn walk<E, F>(&self, mut callback: F) -> Result<(), E>
    where
        F: FnMut(WalkEntry) -> Result<WalkControl, E>,
    {
        let root = clean_path(Path::new(&self.cfg.root));
        let mut visited = Visited {
            dirs: HashSet::new(),
        };

        let info = match self.cfg.fs.stat(Path::new(&root)) {
            Ok(info) => info,
            Err(e) if e.is_not_found() && self.cfg.ignore_missing_root => return Ok(()),
            Err(e) => {
                callback(self.entry(&root, None, Some(e)))?;
                return Ok(());
            }
        };
        if info.is_dir() && self.cfg.fs.kind().is_os() {
            visited.enter_root(info.meta().filename());
        }
        self.visit(&root, info, &mut visited, &mut callback)
    }

    fn visit<E, F>(
        &self,
        path: &str,
        info: FileInfo,
        visited: &mut Visited,
        callback: &mut F,
    ) -> Result<(), E>
    where
        F: FnMut(WalkEntry) -> Result<WalkControl, E>,
    {
        let is_dir = info.is_dir();
        let dir_filename = info.meta().filename().to_path_buf();
        let control = callback(self.entry(path, Some(info), None))?;
        if !is_dir || control == WalkControl::SkipDir {
            return Ok(());
        }

        let mut children = match self.cfg.fs.read_dir(Path::new(path)) {
            Ok(children) => children,
            Err(e) => {
                callback(self.entry(path, None, Some(e)))?;
                return Ok(());
            }
        };
        children.sort_by(|a, b| a.name().cmp(b.name()));

        for child in children {
            if child.meta().excluded() {
                tracing::trace!(path = %child.meta().path(), "skipping excluded entry");
                continue;
            }
            let child_path = join_path(path, child.name());
            if child.is_dir() && child.meta().is_symlink() {
                let descend = self.cfg.follow_symlinks
                    && visited.enter_symlink(child.meta().filename(), &dir_filename);
                if !descend {
                    callback(self.entry(&child_path, Some(child), None))?;
                    continue;
                }
            }
            self.visit(&child_path, child, visited, callback)?;
        }
        Ok(())
    }

    fn entry(&self, path: &str, info: Option<FileInfo>, error: Option<FsError>) -> WalkEntry {
        WalkEntry {
            path: strip_base(path, &self.cfg.base).to_string(),
            info,
            error,
        }
    }
}

fn strip_base<'a>(path: &'a str, base: &str) -> &'a str {
    let base = base.trim_matches('/');
    if base.is_empty() {
        return path;
    }
    match path.strip_prefix(base) {
        Some("") => "",
        Some(rest) if rest.starts_with('/') => &rest[1..],
        _ => path,
    }
}

enum GlobHalt {
    Done,
    Failed(FsError),
}

/// Walk only the subtree a glob can match and call `handle` for every
/// matching file. `handle` returns `true` to stop early.
///
/// The pattern is matched against logical paths relative to the root of `fs`.
pub fn glob_files<F>(
    fs: Arc<dyn Filesystem>,
    cache: &GlobCache,
    pattern: &str,
    mut handle: F,
) -> Result<(), FsError>
where
    F: FnMut(&FileInfo) -> Result<bool, FsError>,
{
    let matcher = cache.get_glob(pattern)?;
    let walker = Walker::new(
        WalkConfig::new(fs)
            .root(resolve_root_dir(pattern))
            .ignore_missing_root(true),
    );
    let result = walker.walk(|entry| {
        if let Some(err) = entry.error {
            return Err(GlobHalt::Failed(err));
        }
        match &entry.info {
            Some(info) if !info.is_dir() && matcher.matches(&entry.path) => {
                match handle(info) {
                    Ok(true) => Err(GlobHalt::Done),
                    Ok(false) => Ok(WalkControl::Continue),
                    Err(e) => Err(GlobHalt::Failed(e)),
                }
            }
            _ => Ok(WalkControl::Continue),
        }
    });
    match result {
        Ok(()) | Err(GlobHalt::Done) => Ok(()),
        Err(GlobHalt::Failed(e)) => Err(e),
    }
}
