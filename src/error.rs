//! Error taxonomy for the composed filesystem.
//!
//! Four kinds of failure reach callers:
//!
//! - **Configuration** ([`FsError::Mapping`], [`FsError::Glob`]): a malformed or
//!   conflicting root mapping, or a glob that does not compile. Raised while
//!   building filesystems, fatal to startup.
//! - **Not found** ([`FsError::NotFound`]): no layer or mapping backs the path.
//!   Most callers treat this as a normal "absent" answer.
//! - **Excluded** ([`FsError::Excluded`]): the path exists but a mount filter
//!   hides it. Kept apart from not-found so diagnostics can say *why* a file
//!   is invisible.
//! - **I/O** ([`FsError::Io`]): anything the OS reports that is not "no such
//!   file". Always propagated.
//!
//! Symlink cycles are not errors; the walker reports the repeated entry and
//! does not descend.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// A glob pattern that failed to compile.
///
/// `Clone` so the glob cache can hand out the same failure on every lookup
/// without recompiling.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid glob pattern {pattern:?}: {message}")]
pub struct GlobError {
    pub pattern: String,
    pub message: String,
}

#[derive(Error, Debug)]
pub enum FsError {
    #[error("invalid root mapping {from:?} -> {}: {reason}", to.display())]
    Mapping {
        from: String,
        to: PathBuf,
        reason: String,
    },
    #[error(transparent)]
    Glob(#[from] GlobError),
    #[error("not found: {path}")]
    NotFound { path: String },
    #[error("excluded by mount filter: {path} ({})", filename.display())]
    Excluded { path: String, filename: PathBuf },
    #[error("I/O error on {path} ({}): {source}", filename.display())]
    Io {
        path: String,
        filename: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    pub fn not_found(path: impl Into<String>) -> Self {
        FsError::NotFound { path: path.into() }
    }

    /// Translate an OS error at the physical boundary.
    ///
    /// `NotFound` keeps its own variant; every other kind becomes [`FsError::Io`].
    pub fn from_io(path: impl Into<String>, filename: impl Into<PathBuf>, err: io::Error) -> Self {
        let path = path.into();
        if err.kind() == io::ErrorKind::NotFound {
            FsError::NotFound { path }
        } else {
            FsError::Io {
                path,
                filename: filename.into(),
                source: err,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FsError::NotFound { .. })
    }

    pub fn is_excluded(&self) -> bool {
        matches!(self, FsError::Excluded { .. })
    }

    /// True when a path component that should be a directory is a file.
    pub fn is_not_dir(&self) -> bool {
        matches!(self, FsError::Io { source, .. } if source.kind() == io::ErrorKind::NotADirectory)
    }

    /// Re-address a path-level error to the logical path the caller asked for.
    ///
    /// Errors raised by a backing filesystem name the backing path; composed
    /// filesystems report the logical one. The physical filename is kept.
    pub fn with_path(self, logical: impl Into<String>) -> Self {
        match self {
            FsError::NotFound { .. } => FsError::NotFound {
                path: logical.into(),
            },
            FsError::Excluded { filename, .. } => FsError::Excluded {
                path: logical.into(),
                filename,
            },
            FsError::Io {
                filename, source, ..
            } => FsError::Io {
                path: logical.into(),
                filename,
                source,
            },
            other => other,
        }
    }

    /// True for construction-time errors that should abort startup.
    pub fn is_config(&self) -> bool {
        matches!(self, FsError::Mapping { .. } | FsError::Glob(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_becomes_not_found() {
        let err = FsError::from_io(
            "content/a.md",
            "/site/content/a.md",
            io::Error::from(io::ErrorKind::NotFound),
        );
        assert!(err.is_not_found());
        assert!(!err.is_config());
    }

    #[test]
    fn io_permission_denied_stays_io() {
        let err = FsError::from_io(
            "content/a.md",
            "/site/content/a.md",
            io::Error::from(io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(err, FsError::Io { .. }));
        let msg = err.to_string();
        assert!(msg.contains("content/a.md"));
        assert!(msg.contains("/site/content/a.md"));
    }

    #[test]
    fn excluded_is_distinct_from_not_found() {
        let err = FsError::Excluded {
            path: "static/vendor/x.js".into(),
            filename: PathBuf::from("/site/static/vendor/x.js"),
        };
        assert!(err.is_excluded());
        assert!(!err.is_not_found());
    }

    #[test]
    fn mapping_error_is_config() {
        let err = FsError::Mapping {
            from: "static".into(),
            to: PathBuf::from("/missing"),
            reason: "physical root does not exist".into(),
        };
        assert!(err.is_config());
        assert!(err.to_string().contains("/missing"));
    }

    #[test]
    fn with_path_readdresses_io_errors() {
        let err = FsError::from_io(
            "tmp/site/layouts/partials",
            "/tmp/site/layouts/partials",
            io::Error::from(io::ErrorKind::NotADirectory),
        )
        .with_path("layouts/partials");
        assert!(err.is_not_dir());
        match &err {
            FsError::Io { path, filename, .. } => {
                assert_eq!(path, "layouts/partials");
                assert_eq!(filename, &PathBuf::from("/tmp/site/layouts/partials"));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        let err = FsError::not_found("s/a.md").with_path("static/a.md");
        assert_eq!(err.to_string(), "not found: static/a.md");
    }
}
