//! Root-mapping filesystem: many physical roots presented as one logical tree.
//!
//! A [`RootMapping`] mounts a physical directory (`to`) at a logical prefix
//! (`from`), optionally tagged with a language and an owning module and
//! optionally filtered by include/exclude globs:
//!
//! ```text
//! from: "static"           to: /site/static
//! from: "static/images"    to: /site/themes/hyde/static/images
//! from: "content"          to: /site/content/fr     lang: fr
//! ```
//!
//! ## Resolution
//!
//! A logical path resolves against the mappings whose `from` is its longest
//! matching prefix. Several mappings may share that prefix (two modules both
//! mounted at `static/images`, or one mount per language); they are consulted
//! in declaration order and the first one that has the file wins.
//!
//! ## Listing
//!
//! Listing a directory merges every mapping at the winning prefix. When two
//! mappings provide a file with the same name and language, the first keeps it
//! and the later copy is returned marked excluded and not owner, so
//! diagnostics can report the shadow. Same-named directories collapse into one
//! entry. Logical paths that are strict prefixes of some `from` (including the
//! root) list as virtual directories holding the next path segment.
//!
//! ## Filters
//!
//! Filter patterns match paths relative to the mapping's physical root.
//! Excluded entries stay in listings (flagged) and stay reachable through
//! [`RootMappingFs::lookup`]; [`Filesystem::stat`] and [`Filesystem::open`]
//! refuse them with [`FsError::Excluded`].

use crate::error::FsError;
use crate::fs::{Filesystem, FsKind, clean_path, join_path};
use crate::glob::{GlobCache, GlobFilter};
use crate::meta::{FileInfo, FileMeta, Module, classify_content_file, resolve_component_folder};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

/// One logical-prefix → physical-root binding.
#[derive(Debug, Clone, Default)]
pub struct RootMapping {
    /// Logical prefix, e.g. `static/images`.
    pub from: String,
    /// Physical root in the backing filesystem.
    pub to: PathBuf,
    /// Language tag; `""` for language-neutral mounts.
    pub lang: String,
    pub module: Weak<Module>,
    pub include_files: Vec<String>,
    pub exclude_files: Vec<String>,
    /// Fail construction instead of skipping the mapping when `to` is missing.
    pub required: bool,
}

impl RootMapping {
    pub fn new(from: impl Into<String>, to: impl Into<PathBuf>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            ..Self::default()
        }
    }

    pub fn with_lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn with_module(mut self, module: &Arc<Module>) -> Self {
        self.module = Arc::downgrade(module);
        self
    }

    pub fn include(mut self, pattern: impl Into<String>) -> Self {
        self.include_files.push(pattern.into());
        self
    }

    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclude_files.push(pattern.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug)]
struct Root {
    mapping: RootMapping,
    component: Option<&'static str>,
    filter: GlobFilter,
    ordinal: usize,
}

impl Root {
    fn physical(&self, rel: &str) -> PathBuf {
        if rel.is_empty() {
            self.mapping.to.clone()
        } else {
            self.mapping.to.join(rel)
        }
    }

    /// Whether the filter hides `rel` itself or any directory above it.
    fn excludes(&self, rel: &str, is_dir: bool) -> bool {
        if rel.is_empty() || self.filter.is_empty() {
            return false;
        }
        rel.match_indices('/')
            .any(|(i, _)| self.filter.excludes(&rel[..i], true))
            || self.filter.excludes(rel, is_dir)
    }

    /// Re-tag a backing entry with this mapping's provenance.
    fn decorate(&self, mut info: FileInfo, logical: &str, rel: &str) -> FileInfo {
        info.name = base_name(logical).to_string();
        let meta = &mut info.meta;
        meta.path = logical.to_string();
        meta.lang = self.mapping.lang.clone();
        meta.module = self.mapping.module.clone();
        meta.component = self.component;
        meta.ordinal = self.ordinal;
        meta.is_owner = true;
        meta.excluded = self.excludes(rel, info.is_dir);
        if self.component == Some("content") && !info.is_dir {
            meta.classifier = classify_content_file(&info.name);
        }
        info
    }
}

/// A filesystem that dispatches logical paths through a mapping table.
#[derive(Debug)]
pub struct RootMappingFs {
    backing: Arc<dyn Filesystem>,
    roots: Vec<Root>,
    /// `from` → indices into `roots`, in declaration order.
    by_from: BTreeMap<String, Vec<usize>>,
}

impl RootMappingFs {
    /// Build the table.
    ///
    /// Fails when two declared mappings share `from`, `lang` and module
    /// (whether or not their roots exist), when a filter pattern does not
    /// compile, or when a required root is missing or not a directory.
    /// Optional missing roots are skipped.
    pub fn new(
        backing: Arc<dyn Filesystem>,
        mut mappings: Vec<RootMapping>,
        globs: &GlobCache,
    ) -> Result<Self, FsError> {
        for mapping in &mut mappings {
            mapping.from = clean_path(Path::new(&mapping.from));
        }
        for (i, mapping) in mappings.iter().enumerate() {
            let duplicate = mappings[..i].iter().any(|other| {
                other.from == mapping.from
                    && other.lang == mapping.lang
                    && other.module.ptr_eq(&mapping.module)
            });
            if duplicate {
                return Err(FsError::Mapping {
                    from: mapping.from.clone(),
                    to: mapping.to.clone(),
                    reason: "duplicate mount for the same prefix, language and module".into(),
                });
            }
        }

        let mut roots: Vec<Root> = Vec::with_capacity(mappings.len());
        let mut by_from: BTreeMap<String, Vec<usize>> = BTreeMap::new();

        for (ordinal, mapping) in mappings.into_iter().enumerate() {
            match backing.stat(&mapping.to) {
                Ok(info) if !info.is_dir() => {
                    return Err(FsError::Mapping {
                        from: mapping.from,
                        to: mapping.to,
                        reason: "physical root is not a directory".into(),
                    });
                }
                Ok(_) => {}
                Err(e) if e.is_not_found() && mapping.required => {
                    return Err(FsError::Mapping {
                        from: mapping.from,
                        to: mapping.to,
                        reason: "physical root does not exist".into(),
                    });
                }
                Err(e) if e.is_not_found() => {
                    tracing::debug!(
                        from = %mapping.from,
                        to = %mapping.to.display(),
                        "skipping mount with missing root"
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }

            let filter = GlobFilter::new(
                globs,
                mapping.include_files.as_slice(),
                mapping.exclude_files.as_slice(),
            )?;
            let component = resolve_component_folder(&mapping.from);
            by_from
                .entry(mapping.from.clone())
                .or_default()
                .push(roots.len());
            roots.push(Root {
                mapping,
                component,
                filter,
                ordinal,
            });
        }

        Ok(Self {
            backing,
            roots,
            by_from,
        })
    }

    pub fn mappings(&self) -> impl Iterator<Item = &RootMapping> {
        self.roots.iter().map(|r| &r.mapping)
    }

    /// Map a logical path to the physical path of the first mapping at its
    /// longest matching prefix. No I/O.
    pub fn resolve(&self, path: &str) -> Result<(PathBuf, &RootMapping), FsError> {
        self.resolve_all(path)
            .into_iter()
            .next()
            .ok_or_else(|| FsError::not_found(clean_path(Path::new(path))))
    }

    /// Every mapping at the longest matching prefix, in priority order.
    pub fn resolve_all(&self, path: &str) -> Vec<(PathBuf, &RootMapping)> {
        let logical = clean_path(Path::new(path));
        match self.roots_for(&logical) {
            Some((rel, idxs)) => idxs
                .iter()
                .map(|&i| {
                    let root = &self.roots[i];
                    (root.physical(rel), &root.mapping)
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// Stat `path` without refusing excluded entries.
    ///
    /// The first mapping (at the longest prefix) that has the file answers; an
    /// excluded hit is returned with [`FileMeta::excluded`] set rather than
    /// falling through to a shadowed copy.
    pub fn lookup(&self, path: &str) -> Result<FileInfo, FsError> {
        let logical = clean_path(Path::new(path));
        if let Some((rel, idxs)) = self.roots_for(&logical) {
            for &i in idxs {
                let root = &self.roots[i];
                match self.backing.stat(&root.physical(rel)) {
                    Ok(info) => return Ok(root.decorate(info, &logical, rel)),
                    Err(e) if e.is_not_found() => continue,
                    // A file higher up owns the name; nothing lives below it.
                    Err(e) if e.is_not_dir() => break,
                    Err(e) => return Err(e.with_path(logical)),
                }
            }
        }
        if self.is_virtual_dir(&logical) {
            return Ok(virtual_dir(&logical));
        }
        Err(FsError::not_found(logical))
    }

    /// Longest `from` covering `logical`, with the path relative to it.
    fn roots_for<'a>(&self, logical: &'a str) -> Option<(&'a str, &[usize])> {
        let mut prefix = logical;
        loop {
            if let Some(idxs) = self.by_from.get(prefix) {
                let rel = if prefix.is_empty() {
                    logical
                } else {
                    logical[prefix.len()..].trim_start_matches('/')
                };
                return Some((rel, idxs));
            }
            if prefix.is_empty() {
                return None;
            }
            prefix = match prefix.rfind('/') {
                Some(i) => &prefix[..i],
                None => "",
            };
        }
    }

    fn is_virtual_dir(&self, logical: &str) -> bool {
        logical.is_empty() || !self.virtual_children(logical).is_empty()
    }

    /// Next path segments of every `from` strictly below `dir`.
    fn virtual_children(&self, dir: &str) -> BTreeSet<&str> {
        self.by_from
            .keys()
            .filter_map(|from| {
                let rest = if dir.is_empty() {
                    from.as_str()
                } else {
                    from.strip_prefix(dir)?.strip_prefix('/')?
                };
                rest.split('/').next().filter(|s| !s.is_empty())
            })
            .collect()
    }
}

fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn virtual_dir(logical: &str) -> FileInfo {
    let mut meta = FileMeta::new(logical, PathBuf::new());
    meta.component = resolve_component_folder(logical);
    FileInfo::dir(base_name(logical), meta)
}

/// Outcome of offering a listed entry to the [`NameTable`].
enum Claim {
    /// First entry for its name (and language, for files).
    Owner,
    /// Same-named directory already listed; folded into it.
    Merged,
    /// A higher-priority mapping already owns the name.
    Shadowed,
}

/// Names claimed so far while merging the listings of one directory.
///
/// Mappings are offered in priority order, so the first claim on a name wins
/// whatever its kind. Directories fold by name; files in different languages
/// coexist.
#[derive(Default)]
struct NameTable {
    dirs: HashSet<String>,
    files: HashSet<(String, String)>,
    file_names: HashSet<String>,
}

impl NameTable {
    fn claim(&mut self, info: &FileInfo) -> Claim {
        let name = &info.name;
        if info.is_dir {
            if self.dirs.contains(name) {
                Claim::Merged
            } else if self.file_names.contains(name) {
                Claim::Shadowed
            } else {
                self.dirs.insert(name.clone());
                Claim::Owner
            }
        } else if self.dirs.contains(name)
            || !self.files.insert((name.clone(), info.meta.lang.clone()))
        {
            Claim::Shadowed
        } else {
            self.file_names.insert(name.clone());
            Claim::Owner
        }
    }
}

impl Filesystem for RootMappingFs {
    fn kind(&self) -> FsKind {
        FsKind::RootMapping
    }

    fn stat(&self, path: &Path) -> Result<FileInfo, FsError> {
        let info = self.lookup(&clean_path(path))?;
        if info.meta().excluded() {
            tracing::debug!(path = %info.meta().path(), "stat of excluded path");
            return Err(FsError::Excluded {
                path: info.meta.path,
                filename: info.meta.filename,
            });
        }
        Ok(info)
    }

    fn open(&self, path: &Path) -> Result<Box<dyn Read + Send>, FsError> {
        let info = self.stat(path)?;
        if info.is_dir() {
            return Err(FsError::Io {
                path: info.meta.path,
                filename: info.meta.filename,
                source: io::Error::new(io::ErrorKind::IsADirectory, "is a directory"),
            });
        }
        self.backing
            .open(info.meta().filename())
            .map_err(|e| e.with_path(info.meta.path))
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<FileInfo>, FsError> {
        let logical = clean_path(path);
        let mut entries: Vec<FileInfo> = Vec::new();
        let mut listed = false;
        let mut not_dir: Option<FsError> = None;
        let mut names = NameTable::default();

        if let Some((rel, idxs)) = self.roots_for(&logical) {
            for &i in idxs {
                let root = &self.roots[i];
                let infos = match self.backing.read_dir(&root.physical(rel)) {
                    Ok(infos) => infos,
                    Err(e) if e.is_not_found() => continue,
                    Err(e) if e.is_not_dir() => {
                        if not_dir.is_none() {
                            not_dir = Some(e);
                        }
                        continue;
                    }
                    Err(e) => return Err(e.with_path(logical)),
                };
                listed = true;
                for info in infos {
                    let child = join_path(&logical, &info.name);
                    let child_rel = join_path(rel, &info.name);
                    let mut info = root.decorate(info, &child, &child_rel);
                    match names.claim(&info) {
                        Claim::Owner => {}
                        Claim::Merged => continue,
                        Claim::Shadowed => {
                            tracing::debug!(
                                path = %child,
                                shadowed = %info.meta.filename.display(),
                                "mount collision, later copy shadowed"
                            );
                            info.meta.is_owner = false;
                            info.meta.excluded = true;
                        }
                    }
                    entries.push(info);
                }
            }
        }

        for name in self.virtual_children(&logical) {
            listed = true;
            if names.dirs.contains(name) {
                continue;
            }
            // A deeper mount point is a directory whatever the listings say.
            for entry in entries.iter_mut().filter(|e| e.name == name) {
                entry.meta.is_owner = false;
                entry.meta.excluded = true;
            }
            names.dirs.insert(name.to_string());
            entries.push(virtual_dir(&join_path(&logical, name)));
        }

        if !listed {
            if let Some(e) = not_dir {
                return Err(e.with_path(logical));
            }
            if !logical.is_empty() {
                return Err(FsError::not_found(logical));
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn physical_roots(&self) -> Vec<PathBuf> {
        self.roots.iter().map(|r| r.mapping.to.clone()).collect()
    }
}
