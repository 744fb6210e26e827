//! # sitefs
//!
//! The source filesystem of a static site generator. A site is assembled from
//! the project directory, any number of themes and several languages; sitefs
//! presents all of them as one consistent, read-only filesystem per component
//! (`content`, `static`, `layouts`, ...) and walks it deterministically.
//!
//! # Architecture: Mount, Stack, Walk
//!
//! ```text
//! 1. Mount   physical dirs  →  RootMappingFs   (logical prefix → physical root)
//! 2. Stack   RootMappingFs  →  OverlayFs       (language / theme precedence)
//! 3. Walk    OverlayFs      →  callback        (sorted, cycle-safe, with provenance)
//! ```
//!
//! Every entry handed out carries a [`meta::FileMeta`]: its logical path, the
//! physical file behind it, its language, and the module (project or theme)
//! that owns it. Consumers decide page grouping and override precedence from
//! that alone, without touching the filesystem again.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`error`] | `FsError` (mapping, glob, not found, excluded, I/O) and `GlobError` |
//! | [`glob`] | Cached, normalized glob matchers and mount include/exclude filters |
//! | [`meta`] | `FileMeta`/`FileInfo`, component folders, content classification |
//! | [`fs`] | The `Filesystem` trait, `OsFs` and `MemFs` |
//! | [`rootmapping`] | Logical-prefix mounts over a backing filesystem |
//! | [`overlay`] | Precedence stacks with pluggable directory merging |
//! | [`walk`] | Deterministic depth-first walker and glob-scoped walks |
//! | [`basefs`] | Assembles project, themes and languages into named views |
//! | [`config`] | `config.toml` loading, merging and validation |
//! | [`output`] | CLI output formatting and listing fingerprints |
//!
//! # Design Decisions
//!
//! ## Shadow, Don't Drop
//!
//! When two mounts at the same prefix provide a file with the same name and
//! language, the first keeps it. The later copy stays in the directory
//! listing flagged `excluded` and not owner, so diagnostics can report what
//! was overridden; the walker never reports it.
//!
//! ## Excluded Is Not Missing
//!
//! A file hidden by a mount filter answers `stat` with
//! [`FsError::Excluded`](error::FsError::Excluded), never with "not found", and
//! never by falling through to a lower-priority copy. A user asking why a file
//! is invisible gets the actual reason.
//!
//! ## Lexical Order Everywhere
//!
//! Listings and walks are sorted by name, byte-wise. Anything derived from a
//! walk (output paths, IDs, fingerprints) is identical across runs and
//! platforms.
//!
//! ## Explicit Capabilities
//!
//! The glob cache is an object passed to whoever needs it, not process-global
//! state, and filesystems report what they are through
//! [`fs::FsKind`] rather than by type inspection.

pub mod basefs;
pub mod config;
pub mod error;
pub mod fs;
pub mod glob;
pub mod meta;
pub mod output;
pub mod overlay;
pub mod rootmapping;
pub mod walk;

#[cfg(test)]
pub(crate) mod test_helpers;
