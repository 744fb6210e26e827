//! The filesystem capability and its two physical implementations.
//!
//! Every layer of the composed view implements [`Filesystem`]: the physical
//! [`OsFs`] and [`MemFs`], and the composing
//! [`RootMappingFs`](crate::rootmapping::RootMappingFs) and
//! [`OverlayFs`](crate::overlay::OverlayFs). Callers that need to know whether
//! they are looking at real OS directories (the walker's symlink bookkeeping)
//! ask [`Filesystem::kind`] instead of probing concrete types.
//!
//! ## Paths
//!
//! Paths are relative and slash-separated for composed filesystems. Physical
//! filesystems also accept their own physical filenames (as recorded in
//! [`FileMeta::filename`](crate::meta::FileMeta::filename)), so an entry can
//! always be re-opened from its meta.

use crate::error::FsError;
use crate::meta::{FileInfo, FileMeta};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

/// What a filesystem is backed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    /// Real OS directories; may contain symlinks.
    Os,
    /// In-memory tree.
    Memory,
    /// An overlay of other filesystems.
    Composite,
    /// Logical paths dispatched to physical roots.
    RootMapping,
}

impl FsKind {
    pub fn is_os(self) -> bool {
        self == FsKind::Os
    }
}

pub trait Filesystem: Send + Sync + fmt::Debug {
    fn kind(&self) -> FsKind;

    /// Metadata for a file or directory. Follows symlinks.
    fn stat(&self, path: &Path) -> Result<FileInfo, FsError>;

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>, FsError>;

    /// Entries of a directory, sorted by name.
    fn read_dir(&self, path: &Path) -> Result<Vec<FileInfo>, FsError>;

    /// OS directories backing this filesystem, for change watchers.
    fn physical_roots(&self) -> Vec<PathBuf> {
        Vec::new()
    }
}

/// Normalize a path to the logical form: relative, slash-separated, with `.`
/// and `..` resolved lexically.
pub fn clean_path(path: &Path) -> String {
    let mut parts: Vec<String> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => parts.push(s.to_string_lossy().into_owned()),
            Component::ParentDir => {
                parts.pop();
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    parts.join("/")
}

/// Join a logical directory and an entry name.
pub fn join_path(dir: &str, name: &str) -> String {
    match (dir.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (_, true) => dir.to_string(),
        _ => format!("{dir}/{name}"),
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

// ============================================================================
// OsFs
// ============================================================================

/// Unrooted handle used as the re-open source for every OS entry. Filenames
/// recorded in metas are absolute (or relative to the working directory), so
/// one shared instance serves all of them.
static OS_SOURCE: LazyLock<Arc<dyn Filesystem>> = LazyLock::new(|| Arc::new(OsFs::new()));

/// The real filesystem, optionally rooted at a directory.
#[derive(Debug, Clone, Default)]
pub struct OsFs {
    root: Option<PathBuf>,
}

impl OsFs {
    /// Paths are used as given.
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths are resolved below `root` (made absolute).
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            root: Some(std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf())),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    fn physical(&self, path: &Path) -> PathBuf {
        match &self.root {
            Some(root) if path.starts_with(root) => path.to_path_buf(),
            Some(root) => root.join(clean_path(path)),
            None => path.to_path_buf(),
        }
    }

    fn logical(&self, path: &Path) -> String {
        match &self.root {
            Some(root) => clean_path(path.strip_prefix(root).unwrap_or(path)),
            None => clean_path(path),
        }
    }

    fn info(name: String, logical: String, filename: PathBuf, is_symlink: bool, md: &fs::Metadata) -> FileInfo {
        let mut meta = FileMeta::new(logical, filename).with_source(OS_SOURCE.clone());
        meta.is_symlink = is_symlink;
        FileInfo {
            name,
            is_dir: md.is_dir(),
            size: if md.is_dir() { 0 } else { md.len() },
            modified: md.modified().ok(),
            meta,
        }
    }
}

impl Filesystem for OsFs {
    fn kind(&self) -> FsKind {
        FsKind::Os
    }

    fn stat(&self, path: &Path) -> Result<FileInfo, FsError> {
        let filename = self.physical(path);
        let logical = self.logical(path);
        let lmd = fs::symlink_metadata(&filename)
            .map_err(|e| FsError::from_io(logical.clone(), &filename, e))?;
        let is_symlink = lmd.file_type().is_symlink();
        let md = if is_symlink {
            fs::metadata(&filename).map_err(|e| FsError::from_io(logical.clone(), &filename, e))?
        } else {
            lmd
        };
        let name = filename
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::info(name, logical, filename, is_symlink, &md))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>, FsError> {
        let filename = self.physical(path);
        let file = fs::File::open(&filename)
            .map_err(|e| FsError::from_io(self.logical(path), &filename, e))?;
        Ok(Box::new(file))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<FileInfo>, FsError> {
        let dir = self.physical(path);
        let logical = self.logical(path);
        let io_err = |e: io::Error| FsError::from_io(logical.clone(), &dir, e);

        let mut infos = Vec::new();
        for entry in fs::read_dir(&dir).map_err(io_err)? {
            let entry = entry.map_err(io_err)?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let filename = entry.path();
            let is_symlink = entry.file_type().map_err(io_err)?.is_symlink();
            let md = match fs::metadata(&filename) {
                Ok(md) => md,
                // Dangling symlink: report the link itself.
                Err(e) if is_symlink && e.kind() == io::ErrorKind::NotFound => {
                    fs::symlink_metadata(&filename).map_err(io_err)?
                }
                Err(e) => return Err(io_err(e)),
            };
            infos.push(Self::info(
                name.clone(),
                join_path(&logical, &name),
                filename,
                is_symlink,
                &md,
            ));
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    fn physical_roots(&self) -> Vec<PathBuf> {
        self.root.iter().cloned().collect()
    }
}

// ============================================================================
// MemFs
// ============================================================================

#[derive(Debug, Clone)]
enum MemNode {
    File(Arc<[u8]>),
    Dir,
}

/// In-memory filesystem.
///
/// Clones share the same tree. The root directory always exists.
#[derive(Debug, Clone, Default)]
pub struct MemFs {
    nodes: Arc<RwLock<BTreeMap<String, MemNode>>>,
}

impl MemFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a file, creating parent directories.
    pub fn write_file(&self, path: impl AsRef<Path>, data: impl AsRef<[u8]>) {
        let path = clean_path(path.as_ref());
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        insert_parents(&mut nodes, &path);
        nodes.insert(path, MemNode::File(Arc::from(data.as_ref())));
    }

    pub fn create_dir_all(&self, path: impl AsRef<Path>) {
        let path = clean_path(path.as_ref());
        if path.is_empty() {
            return;
        }
        let mut nodes = self.nodes.write().unwrap_or_else(PoisonError::into_inner);
        insert_parents(&mut nodes, &path);
        nodes.insert(path, MemNode::Dir);
    }

    fn info(&self, path: &str, node: &MemNode) -> FileInfo {
        let meta = FileMeta::new(path, PathBuf::from(path)).with_source(Arc::new(self.clone()));
        match node {
            MemNode::File(data) => FileInfo::file(base_name(path), data.len() as u64, meta),
            MemNode::Dir => FileInfo::dir(base_name(path), meta),
        }
    }
}

fn insert_parents(nodes: &mut BTreeMap<String, MemNode>, path: &str) {
    let mut end = 0;
    while let Some(i) = path[end..].find('/') {
        end += i;
        nodes.entry(path[..end].to_string()).or_insert(MemNode::Dir);
        end += 1;
    }
}

/// The error for an absent `path`: "not a directory" when the walk to it
/// passes through a file, like the OS reports, else "not found".
fn missing(nodes: &BTreeMap<String, MemNode>, path: String) -> FsError {
    let through_file = path
        .match_indices('/')
        .any(|(i, _)| matches!(nodes.get(&path[..i]), Some(MemNode::File(_))));
    if through_file {
        FsError::Io {
            filename: PathBuf::from(&path),
            path,
            source: io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
        }
    } else {
        FsError::not_found(path)
    }
}

impl Filesystem for MemFs {
    fn kind(&self) -> FsKind {
        FsKind::Memory
    }

    fn stat(&self, path: &Path) -> Result<FileInfo, FsError> {
        let path = clean_path(path);
        if path.is_empty() {
            return Ok(self.info("", &MemNode::Dir));
        }
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        match nodes.get(&path) {
            Some(node) => Ok(self.info(&path, node)),
            None => Err(missing(&nodes, path)),
        }
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>, FsError> {
        let path = clean_path(path);
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        match nodes.get(&path) {
            Some(MemNode::File(data)) => Ok(Box::new(Cursor::new(data.clone()))),
            Some(MemNode::Dir) => Err(FsError::Io {
                filename: PathBuf::from(&path),
                path,
                source: io::Error::new(io::ErrorKind::IsADirectory, "is a directory"),
            }),
            None => Err(missing(&nodes, path)),
        }
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<FileInfo>, FsError> {
        let dir = clean_path(path);
        let nodes = self.nodes.read().unwrap_or_else(PoisonError::into_inner);
        match nodes.get(&dir) {
            Some(MemNode::Dir) => {}
            Some(MemNode::File(_)) => {
                return Err(FsError::Io {
                    filename: PathBuf::from(&dir),
                    path: dir,
                    source: io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
                });
            }
            None if dir.is_empty() => {}
            None => return Err(missing(&nodes, dir)),
        }

        let prefix = if dir.is_empty() { String::new() } else { format!("{dir}/") };
        let mut infos: Vec<FileInfo> = nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| !key[prefix.len()..].contains('/'))
            .map(|(key, node)| self.info(key, node))
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }
}
