//! File metadata carried by every entry in the composed filesystem.
//!
//! A [`FileInfo`] is what `stat` and `read_dir` return: a name, a kind, and a
//! [`FileMeta`]. The meta records provenance (logical path, physical file,
//! language, owning module) so downstream consumers can group pages and decide
//! override precedence without touching the filesystem again.
//!
//! Two pieces of classification live here as well:
//!
//! - [`resolve_component_folder`]: which top-level component (`content`,
//!   `static`, `layouts`, ...) a logical path belongs to.
//! - [`classify_content_file`]: whether a file is a leaf bundle index, a branch
//!   bundle index, ordinary content, or a plain file.
//!
//! The filesystem layer computes and attaches these tags; it never interprets
//! them further.

use crate::error::FsError;
use crate::fs::Filesystem;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Weak};
use std::time::SystemTime;

/// Known top-level component folders, sorted.
pub const COMPONENT_FOLDERS: [&str; 7] = [
    "archetypes",
    "assets",
    "content",
    "data",
    "i18n",
    "layouts",
    "static",
];

static COMPONENT_FOLDER_SET: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| COMPONENT_FOLDERS.iter().copied().collect());

/// Extensions handled by a content converter (Markdown, AsciiDoc, HTML, ...).
const CONTENT_EXTENSIONS: &[&str] = &[
    "ad", "adoc", "asciidoc", "htm", "html", "markdown", "md", "mdown", "mmark", "org", "pandoc",
    "pdc", "rest", "rst",
];

/// A theme or the project itself: the owner of a set of mounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    /// Module name: `"project"` or the theme's directory name.
    pub name: String,
    /// Absolute directory the module's mount sources are relative to.
    pub dir: PathBuf,
    pub is_project: bool,
}

/// How a file participates in content assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentClass {
    /// `index.*` content file: the page of a leaf bundle.
    Leaf,
    /// `_index.*` content file: the page of a branch bundle (section).
    Branch,
    /// Any other content file.
    Content,
    /// Not a content file at all.
    #[default]
    File,
}

impl ContentClass {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentClass::Leaf => "leaf",
            ContentClass::Branch => "branch",
            ContentClass::Content => "content",
            ContentClass::File => "file",
        }
    }
}

impl fmt::Display for ContentClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provenance of one filesystem entry.
///
/// `path` is always slash-separated and relative; `filename` is the OS-native
/// physical path (empty for virtual directories).
#[derive(Debug, Clone)]
pub struct FileMeta {
    pub(crate) path: String,
    pub(crate) filename: PathBuf,
    pub(crate) lang: String,
    pub(crate) module: Weak<Module>,
    pub(crate) component: Option<&'static str>,
    pub(crate) classifier: ContentClass,
    pub(crate) ordinal: usize,
    pub(crate) is_owner: bool,
    pub(crate) excluded: bool,
    pub(crate) is_symlink: bool,
    pub(crate) source: Option<Arc<dyn Filesystem>>,
}

impl Default for FileMeta {
    fn default() -> Self {
        Self {
            path: String::new(),
            filename: PathBuf::new(),
            lang: String::new(),
            module: Weak::new(),
            component: None,
            classifier: ContentClass::File,
            ordinal: 0,
            is_owner: true,
            excluded: false,
            is_symlink: false,
            source: None,
        }
    }
}

impl FileMeta {
    pub fn new(path: impl Into<String>, filename: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            filename: filename.into(),
            ..Self::default()
        }
    }

    /// Attach the physical filesystem `filename` lives in, enabling
    /// [`open`](Self::open) and [`stat`](Self::stat).
    pub fn with_source(mut self, source: Arc<dyn Filesystem>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    /// Logical path as seen by consumers, e.g. `content/blog/post.md`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Physical path backing this entry.
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    /// Language tag, `""` when language-neutral.
    pub fn lang(&self) -> &str {
        &self.lang
    }

    /// The owning module, if it is still alive.
    pub fn module(&self) -> Option<Arc<Module>> {
        self.module.upgrade()
    }

    pub fn component(&self) -> Option<&'static str> {
        self.component
    }

    pub fn classifier(&self) -> ContentClass {
        self.classifier
    }

    /// Mount priority: lower wins.
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// True if this entry won the overlay/mount merge for its name.
    pub fn is_owner(&self) -> bool {
        self.is_owner
    }

    /// True if a mount filter hid this entry. The walker skips excluded entries.
    pub fn excluded(&self) -> bool {
        self.excluded
    }

    pub fn is_symlink(&self) -> bool {
        self.is_symlink
    }

    /// Re-open the physical file.
    pub fn open(&self) -> Result<Box<dyn Read + Send>, FsError> {
        self.physical()?.open(&self.filename)
    }

    /// Re-stat the physical file.
    pub fn stat(&self) -> Result<FileInfo, FsError> {
        self.physical()?.stat(&self.filename)
    }

    fn physical(&self) -> Result<&Arc<dyn Filesystem>, FsError> {
        self.source
            .as_ref()
            .filter(|_| !self.filename.as_os_str().is_empty())
            .ok_or_else(|| FsError::not_found(self.path.clone()))
    }
}

/// A `stat` or `read_dir` result.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub(crate) name: String,
    pub(crate) is_dir: bool,
    pub(crate) size: u64,
    pub(crate) modified: Option<SystemTime>,
    pub(crate) meta: FileMeta,
}

impl FileInfo {
    pub fn file(name: impl Into<String>, size: u64, meta: FileMeta) -> Self {
        Self {
            name: name.into(),
            is_dir: false,
            size,
            modified: None,
            meta,
        }
    }

    pub fn dir(name: impl Into<String>, meta: FileMeta) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            size: 0,
            modified: None,
            meta,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn modified(&self) -> Option<SystemTime> {
        self.modified
    }

    pub fn meta(&self) -> &FileMeta {
        &self.meta
    }
}

/// The component folder a logical path belongs to.
///
/// Only the first path segment is considered:
///
/// - `"content/blog/post.md"` → `Some("content")`
/// - `"/static/css"` → `Some("static")`
/// - `"blog/content/post.md"` → `None`
pub fn resolve_component_folder(path: &str) -> Option<&'static str> {
    let path = path.trim_start_matches('/');
    let first = path.split('/').next().unwrap_or_default();
    COMPONENT_FOLDER_SET.get(first).copied()
}

pub fn is_component_folder(name: &str) -> bool {
    COMPONENT_FOLDER_SET.contains(name)
}

pub fn is_content_ext(ext: &str) -> bool {
    CONTENT_EXTENSIONS
        .iter()
        .any(|known| known.eq_ignore_ascii_case(ext))
}

/// Classify a file by naming convention.
///
/// - non-content extension → [`ContentClass::File`]
/// - `_index.<ext>` → [`ContentClass::Branch`]
/// - `index.<ext>` → [`ContentClass::Leaf`]
/// - anything else → [`ContentClass::Content`]
pub fn classify_content_file(filename: &str) -> ContentClass {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let ext = match base.rsplit_once('.') {
        Some((_, ext)) => ext,
        None => return ContentClass::File,
    };
    if !is_content_ext(ext) {
        return ContentClass::File;
    }
    if base.starts_with("_index.") {
        ContentClass::Branch
    } else if base.starts_with("index.") {
        ContentClass::Leaf
    } else {
        ContentClass::Content
    }
}
