//! Composite filesystem: language and theme precedence.
//!
//! An [`OverlayFs`] stacks filesystems, highest precedence first. A typical
//! stack for one component:
//!
//! ```text
//! 0  project, current language
//! 1  theme,   current language
//! 2  project, default language
//! 3  theme,   default language
//! ```
//!
//! `stat` and `open` ask each layer in order and return the first hit; file
//! contents are never merged. `read_dir` unions every layer's listing, folding
//! each lower layer into the accumulated result with a [`DirsMerger`].
//!
//! A layer answering "not found" passes the question down. Any other error
//! (permissions, I/O, an excluded path) stops the lookup and is returned as is.

use crate::error::FsError;
use crate::fs::{Filesystem, FsKind, clean_path};
use crate::meta::FileInfo;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Merge policy for directory listings: `(higher, lower) -> merged`.
///
/// `higher` is everything accumulated from the layers above; `lower` is the
/// next layer's listing.
pub type DirsMerger = Arc<dyn Fn(Vec<FileInfo>, Vec<FileInfo>) -> Vec<FileInfo> + Send + Sync>;

/// The standard policy.
///
/// A lower file is dropped when a higher file has the same name and the same
/// language, or when either of them is language-neutral; files in different
/// languages are kept side by side. Directories are namespaces and collapse by
/// name alone, so a tree is never walked twice. A name that is a directory in
/// one layer and a file in another belongs to the higher layer.
pub fn merge_by_language(mut higher: Vec<FileInfo>, lower: Vec<FileInfo>) -> Vec<FileInfo> {
    let dirs: HashSet<String> = higher
        .iter()
        .filter(|fi| fi.is_dir())
        .map(|fi| fi.name().to_string())
        .collect();
    let mut files: HashMap<String, Vec<String>> = HashMap::new();
    for fi in higher.iter().filter(|fi| !fi.is_dir()) {
        files
            .entry(fi.name().to_string())
            .or_default()
            .push(fi.meta().lang().to_string());
    }

    for fi in lower {
        let duplicate = dirs.contains(fi.name())
            || files.get(fi.name()).is_some_and(|langs| {
                let lang = fi.meta().lang();
                fi.is_dir()
                    || lang.is_empty()
                    || langs.iter().any(|l| l == lang || l.is_empty())
            });
        if !duplicate {
            higher.push(fi);
        }
    }
    higher
}

pub fn language_merger() -> DirsMerger {
    Arc::new(merge_by_language)
}

pub struct OverlayFs {
    layers: Vec<Arc<dyn Filesystem>>,
    merger: DirsMerger,
}

impl fmt::Debug for OverlayFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlayFs")
            .field("layers", &self.layers)
            .finish_non_exhaustive()
    }
}

impl OverlayFs {
    /// Stack `layers` (highest precedence first) with [`merge_by_language`].
    pub fn new(layers: Vec<Arc<dyn Filesystem>>) -> Self {
        Self::with_merger(layers, language_merger())
    }

    pub fn with_merger(layers: Vec<Arc<dyn Filesystem>>, merger: DirsMerger) -> Self {
        Self { layers, merger }
    }

    pub fn layers(&self) -> &[Arc<dyn Filesystem>] {
        &self.layers
    }

    /// Try each layer until one answers something other than "not found".
    ///
    /// A layer that has a file where `path` needs a directory owns that name,
    /// so the path does not exist in the overlay.
    fn first<T>(
        &self,
        path: &Path,
        op: impl Fn(&dyn Filesystem) -> Result<T, FsError>,
    ) -> Result<T, FsError> {
        for layer in &self.layers {
            match op(layer.as_ref()) {
                Err(e) if e.is_not_found() => continue,
                Err(e) if e.is_not_dir() => break,
                other => return other,
            }
        }
        Err(FsError::not_found(clean_path(path)))
    }
}

impl Filesystem for OverlayFs {
    fn kind(&self) -> FsKind {
        FsKind::Composite
    }

    fn stat(&self, path: &Path) -> Result<FileInfo, FsError> {
        self.first(path, |layer| layer.stat(path))
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>, FsError> {
        self.first(path, |layer| layer.open(path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<FileInfo>, FsError> {
        let mut merged: Option<Vec<FileInfo>> = None;
        let mut not_dir: Option<FsError> = None;
        for layer in &self.layers {
            let infos = match layer.read_dir(path) {
                Ok(infos) => infos,
                Err(e) if e.is_not_found() => continue,
                Err(e) if e.is_not_dir() => {
                    if not_dir.is_none() {
                        not_dir = Some(e);
                    }
                    continue;
                }
                Err(e) => return Err(e),
            };
            merged = Some(match merged {
                None => infos,
                Some(acc) => (self.merger)(acc, infos),
            });
        }
        let mut merged = match (merged, not_dir) {
            (Some(merged), _) => merged,
            (None, Some(e)) => return Err(e),
            (None, None) => return Err(FsError::not_found(clean_path(path))),
        };
        merged.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(merged)
    }

    fn physical_roots(&self) -> Vec<PathBuf> {
        self.layers
            .iter()
            .flat_map(|layer| layer.physical_roots())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;
    use crate::glob::GlobCache;
    use crate::rootmapping::{RootMapping, RootMappingFs};
    use crate::test_helpers::{mem_fs, names, read_string};
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Content layer over `dir` tagged with `lang`.
    fn lang_layer(fs: &MemFs, dir: &str, lang: &str) -> Arc<dyn Filesystem> {
        Arc::new(
            RootMappingFs::new(
                Arc::new(fs.clone()),
                vec![RootMapping::new("content", dir).with_lang(lang)],
                &GlobCache::new(),
            )
            .unwrap(),
        )
    }

    #[derive(Debug, Default)]
    struct FailingFs {
        calls: AtomicUsize,
    }

    impl FailingFs {
        fn denied(&self, path: &Path) -> FsError {
            self.calls.fetch_add(1, Ordering::Relaxed);
            FsError::Io {
                path: clean_path(path),
                filename: path.to_path_buf(),
                source: io::Error::from(io::ErrorKind::PermissionDenied),
            }
        }
    }

    impl Filesystem for FailingFs {
        fn kind(&self) -> FsKind {
            FsKind::Memory
        }
        fn stat(&self, path: &Path) -> Result<FileInfo, FsError> {
            Err(self.denied(path))
        }
        fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>, FsError> {
            Err(self.denied(path))
        }
        fn read_dir(&self, path: &Path) -> Result<Vec<FileInfo>, FsError> {
            Err(self.denied(path))
        }
    }

    #[test]
    fn first_layer_wins_stat_and_open() {
        let l1 = mem_fs(&[("p.md", "one")]);
        let l2 = mem_fs(&[("p.md", "two"), ("only2.md", "2")]);
        let overlay = OverlayFs::new(vec![Arc::new(l1.clone()), Arc::new(l2.clone())]);

        let before = overlay.stat(Path::new("p.md")).unwrap();
        assert_eq!(before.size(), 3);
        assert_eq!(read_string(&overlay, "p.md"), "one");
        assert_eq!(read_string(&overlay, "only2.md"), "2");

        l2.write_file("p.md", "a much longer replacement");
        let after = overlay.stat(Path::new("p.md")).unwrap();
        assert_eq!(after.size(), before.size());
        assert_eq!(read_string(&overlay, "p.md"), "one");
    }

    #[test]
    fn different_languages_kept_side_by_side() {
        let fs = mem_fs(&[("en/foo.md", "en"), ("fr/foo.md", "fr")]);
        let overlay = OverlayFs::new(vec![lang_layer(&fs, "en", "en"), lang_layer(&fs, "fr", "fr")]);

        let entries = overlay.read_dir(Path::new("content")).unwrap();
        let tagged: Vec<(&str, &str)> = entries
            .iter()
            .map(|e| (e.name(), e.meta().lang()))
            .collect();
        assert_eq!(tagged, vec![("foo.md", "en"), ("foo.md", "fr")]);
    }

    #[test]
    fn same_language_collapses_to_higher_layer() {
        let fs = mem_fs(&[("project/foo.md", "project"), ("theme/foo.md", "theme")]);
        let overlay = OverlayFs::new(vec![
            lang_layer(&fs, "project", "en"),
            lang_layer(&fs, "theme", "en"),
        ]);

        let entries = overlay.read_dir(Path::new("content")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].meta().filename(), Path::new("project/foo.md"));
    }

    #[test]
    fn directories_collapse_across_languages() {
        let fs = mem_fs(&[("en/blog/a.md", ""), ("fr/blog/b.md", "")]);
        let overlay = OverlayFs::new(vec![lang_layer(&fs, "en", "en"), lang_layer(&fs, "fr", "fr")]);

        assert_eq!(names(&overlay, "content"), vec!["blog"]);
        assert_eq!(names(&overlay, "content/blog"), vec!["a.md", "b.md"]);
    }

    #[test]
    fn custom_merger_is_used() {
        let l1 = mem_fs(&[("a.md", "")]);
        let l2 = mem_fs(&[("a.md", ""), ("b.md", "")]);
        let keep_all: DirsMerger = Arc::new(|mut higher: Vec<FileInfo>, lower: Vec<FileInfo>| {
            higher.extend(lower);
            higher
        });
        let overlay = OverlayFs::with_merger(vec![Arc::new(l1), Arc::new(l2)], keep_all);
        assert_eq!(names(&overlay, ""), vec!["a.md", "a.md", "b.md"]);
    }

    #[test]
    fn not_found_everywhere_is_not_found() {
        let overlay = OverlayFs::new(vec![Arc::new(MemFs::new()), Arc::new(MemFs::new())]);
        assert!(overlay.stat(Path::new("nope.md")).unwrap_err().is_not_found());
        assert!(overlay.read_dir(Path::new("nope")).unwrap_err().is_not_found());
    }

    #[test]
    fn io_error_stops_lookup() {
        let failing = Arc::new(FailingFs::default());
        let lower = Arc::new(FailingFs::default());
        let overlay = OverlayFs::new(vec![
            Arc::new(MemFs::new()),
            failing.clone(),
            lower.clone(),
        ]);

        let err = overlay.stat(Path::new("p.md")).unwrap_err();
        assert!(matches!(err, FsError::Io { .. }));
        let err = overlay.read_dir(Path::new("")).unwrap_err();
        assert!(matches!(err, FsError::Io { .. }));

        assert_eq!(failing.calls.load(Ordering::Relaxed), 2);
        assert_eq!(lower.calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn physical_roots_are_collected() {
        let fs = mem_fs(&[("en/a.md", ""), ("fr/a.md", "")]);
        let overlay = OverlayFs::new(vec![lang_layer(&fs, "en", "en"), lang_layer(&fs, "fr", "fr")]);
        assert_eq!(
            overlay.physical_roots(),
            vec![PathBuf::from("en"), PathBuf::from("fr")]
        );
    }

    fn static_layer(fs: &MemFs, mapping: RootMapping) -> Arc<dyn Filesystem> {
        Arc::new(RootMappingFs::new(Arc::new(fs.clone()), vec![mapping], &GlobCache::new()).unwrap())
    }

    #[test]
    fn neutral_file_below_language_file_is_dropped() {
        let fs = mem_fs(&[
            ("fr/robots.txt", "fr"),
            ("common/robots.txt", "common"),
            ("common/site.css", ""),
        ]);
        let overlay = OverlayFs::new(vec![
            static_layer(&fs, RootMapping::new("static", "fr").with_lang("fr")),
            static_layer(&fs, RootMapping::new("static", "common")),
        ]);

        let entries = overlay.read_dir(Path::new("static")).unwrap();
        let tagged: Vec<(&str, &str, bool)> = entries
            .iter()
            .map(|e| (e.name(), e.meta().lang(), e.meta().is_owner()))
            .collect();
        assert_eq!(tagged, vec![("robots.txt", "fr", true), ("site.css", "", true)]);
        assert_eq!(read_string(&overlay, "static/robots.txt"), "fr");
    }

    #[test]
    fn neutral_file_above_language_file_wins() {
        let fs = mem_fs(&[("common/a.md", ""), ("en/a.md", "")]);
        let overlay = OverlayFs::new(vec![
            static_layer(&fs, RootMapping::new("static", "common")),
            static_layer(&fs, RootMapping::new("static", "en").with_lang("en")),
        ]);
        let entries = overlay.read_dir(Path::new("static")).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].meta().lang(), "");
    }

    #[test]
    fn file_and_directory_of_same_name_resolve_to_higher_layer() {
        let upper = mem_fs(&[("partials", "a file")]);
        let lower = mem_fs(&[("partials/head.html", "")]);
        let overlay = OverlayFs::new(vec![Arc::new(upper), Arc::new(lower)]);

        let entries = overlay.read_dir(Path::new("")).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_dir());
        let err = overlay.stat(Path::new("partials/head.html")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn excluded_in_upper_layer_does_not_fall_through() {
        let fs = mem_fs(&[("upper/x.map", "upper"), ("lower/x.map", "lower")]);
        let overlay = OverlayFs::new(vec![
            static_layer(&fs, RootMapping::new("static", "upper").exclude("*.map")),
            static_layer(&fs, RootMapping::new("static", "lower").with_lang("en")),
        ]);

        assert!(overlay.stat(Path::new("static/x.map")).unwrap_err().is_excluded());
        assert!(matches!(overlay.open(Path::new("static/x.map")), Err(e) if e.is_excluded()));
    }
}
