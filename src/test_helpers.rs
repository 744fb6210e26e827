//! Shared test utilities for the sitefs test suite.
//!
//! Provides in-memory and on-disk tree builders plus small extractors over
//! directory listings and walks.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let fs = mem_fs(&[("c/blog/a.md", "# A"), ("s/app.css", "")]);
//! assert_eq!(names(&fs, "c/blog"), vec!["a.md"]);
//!
//! let tmp = setup_site();
//! let cfg = load_config(tmp.path()).unwrap();
//! ```

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use crate::fs::{Filesystem, MemFs};
use crate::walk::{WalkConfig, WalkControl, Walker};

// =========================================================================
// Tree builders
// =========================================================================

/// In-memory tree from `(path, contents)` pairs.
pub fn mem_fs(files: &[(&str, &str)]) -> MemFs {
    let fs = MemFs::new();
    for (path, contents) in files {
        fs.write_file(path, contents);
    }
    fs
}

/// Write `(relative path, contents)` pairs below `root`, creating parents.
pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, contents).unwrap();
    }
}

/// A project with one theme and two languages:
///
/// ```text
/// config.toml          theme = ["hyde"], languages en (default) + fr
/// content/en/          _index.md, blog/post.md
/// content/fr/          _index.md, blog/post.md
/// static/              css/site.css, robots.txt
/// static_fr/           robots.txt
/// layouts/             _default/single.html
/// data/                authors.toml
/// themes/hyde/         config.toml (no mounts), layouts/, static/, i18n/
/// ```
pub fn setup_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write_tree(
        tmp.path(),
        &[
            (
                "config.toml",
                r#"
theme = ["hyde"]
default_content_language = "en"

[languages.en]
weight = 1
content_dir = "content/en"

[languages.fr]
weight = 2
content_dir = "content/fr"
static_dir = "static_fr"
"#,
            ),
            ("content/en/_index.md", "home"),
            ("content/en/blog/post.md", "post en"),
            ("content/fr/_index.md", "accueil"),
            ("content/fr/blog/post.md", "post fr"),
            ("static/css/site.css", "project css"),
            ("static/robots.txt", "project robots"),
            ("static_fr/robots.txt", "robots fr"),
            ("layouts/_default/single.html", "project single"),
            ("data/authors.toml", "name = 'me'"),
            ("themes/hyde/config.toml", "# no mounts\n"),
            ("themes/hyde/layouts/_default/single.html", "theme single"),
            ("themes/hyde/layouts/_default/list.html", "theme list"),
            ("themes/hyde/static/css/site.css", "theme css"),
            ("themes/hyde/static/css/theme.css", "theme only"),
            ("themes/hyde/i18n/en.toml", "hello = 'Hello'"),
        ],
    );
    tmp
}

// =========================================================================
// Extractors: panic with a clear message on failure
// =========================================================================

/// Entry names of a directory listing, in listing order.
pub fn names(fs: &dyn Filesystem, dir: &str) -> Vec<String> {
    fs.read_dir(Path::new(dir))
        .unwrap_or_else(|e| panic!("read_dir '{dir}' failed: {e}"))
        .into_iter()
        .map(|info| info.name().to_string())
        .collect()
}

/// Whole file contents as UTF-8.
pub fn read_string(fs: &dyn Filesystem, path: &str) -> String {
    let mut s = String::new();
    fs.open(Path::new(path))
        .unwrap_or_else(|e| panic!("open '{path}' failed: {e}"))
        .read_to_string(&mut s)
        .unwrap();
    s
}

/// Every reported walk path (directories included), in walk order.
pub fn collect_paths(cfg: WalkConfig) -> Vec<String> {
    collect(cfg, true)
}

/// Reported file paths only, in walk order.
pub fn collect_files(cfg: WalkConfig) -> Vec<String> {
    collect(cfg, false)
}

fn collect(cfg: WalkConfig, with_dirs: bool) -> Vec<String> {
    let mut out = Vec::new();
    Walker::new(cfg)
        .walk(|entry| {
            if let Some(err) = &entry.error {
                panic!("walk error at '{}': {err}", entry.path);
            }
            if with_dirs || !entry.is_dir() {
                out.push(entry.path);
            }
            Ok::<_, ()>(WalkControl::Continue)
        })
        .unwrap();
    out
}

/// Walk a shared filesystem from `root`, stripping `root` from the paths.
pub fn walk_files(fs: &Arc<dyn Filesystem>, root: &str) -> Vec<String> {
    collect_files(WalkConfig::new(fs.clone()).root(root).base(root))
}
