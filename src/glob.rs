//! Glob compilation, caching, and mount filters.
//!
//! Mount include/exclude rules are glob patterns over slash-separated paths
//! relative to the mount's physical root. Compiling a pattern is cheap but not
//! free, and every build (one per language) asks for the same handful of
//! patterns, so compiled matchers are memoized in a [`GlobCache`].
//!
//! ## Normalization
//!
//! Unless the cache is case-sensitive, patterns are lower-cased before
//! compilation and candidates are lower-cased before matching. On Windows both
//! sides are slash-converted. Normalization happens in exactly one place per
//! side ([`normalize`]), so compile-time and match-time handling cannot drift.
//!
//! ## Pattern syntax
//!
//! ```text
//! *.md            any .md file directly in the mount root
//! **/*.md         any .md file at any depth
//! vendor/**       everything below vendor/
//! images/[a-c]*   character classes
//! *.{md,html}     alternatives, expanded into one pattern each
//! ```
//!
//! `**` must form a whole path segment; `a**b` is rejected with a [`GlobError`].
//!
//! ## Concurrency
//!
//! The cache is shared across concurrently running builds. Lookups take a read
//! lock; a miss takes the write lock and re-checks before compiling, so two
//! builds racing on the same pattern compile it once.

use crate::error::GlobError;
use glob::{MatchOptions, Pattern};
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

const GLOB_CHARS: &[char] = &['*', '?', '[', '{'];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

type CachedGlob = Result<Arc<GlobMatcher>, GlobError>;

/// A compiled glob pattern.
///
/// Brace alternatives are expanded at compile time; the matcher holds one
/// [`Pattern`] per alternative and matches when any of them does.
#[derive(Debug)]
pub struct GlobMatcher {
    raw: String,
    patterns: Vec<Pattern>,
    case_sensitive: bool,
}

impl GlobMatcher {
    /// The pattern as originally requested (before normalization).
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, candidate: &str) -> bool {
        let candidate = normalize(candidate, self.case_sensitive);
        self.patterns
            .iter()
            .any(|p| p.matches_with(&candidate, MATCH_OPTIONS))
    }
}

/// Memoized glob compiler.
///
/// Construct one per process (or per build context in tests) and pass it to
/// the filesystems that need it.
#[derive(Debug, Default)]
pub struct GlobCache {
    case_sensitive: bool,
    entries: RwLock<HashMap<String, CachedGlob>>,
    compiles: AtomicUsize,
}

impl GlobCache {
    /// A case-insensitive cache.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_case_sensitivity(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            ..Self::default()
        }
    }

    pub fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    /// Look up or compile `pattern`.
    ///
    /// A pattern that fails to compile is cached too: later lookups return the
    /// same [`GlobError`] without compiling again.
    pub fn get_glob(&self, pattern: &str) -> Result<Arc<GlobMatcher>, GlobError> {
        {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(cached) = entries.get(pattern) {
                return cached.clone();
            }
        }

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(cached) = entries.get(pattern) {
            return cached.clone();
        }
        let compiled = self.compile(pattern);
        entries.insert(pattern.to_string(), compiled.clone());
        compiled
    }

    /// Number of times a pattern was actually compiled.
    pub fn compile_count(&self) -> usize {
        self.compiles.load(Ordering::Relaxed)
    }

    fn compile(&self, raw: &str) -> CachedGlob {
        self.compiles.fetch_add(1, Ordering::Relaxed);
        let normalized = normalize(raw, self.case_sensitive);
        tracing::trace!(pattern = raw, "compiling glob");
        let error = |message: &str| GlobError {
            pattern: raw.to_string(),
            message: message.to_string(),
        };
        let patterns = expand_braces(&normalized)
            .map_err(error)?
            .iter()
            .map(|alt| Pattern::new(alt).map_err(|e| error(e.msg)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Arc::new(GlobMatcher {
            raw: raw.to_string(),
            patterns,
            case_sensitive: self.case_sensitive,
        }))
    }
}

/// Expand `{a,b}` alternatives, nested groups included, into plain patterns.
///
/// Braces inside a `[...]` class are literal. An unbalanced brace is an error.
fn expand_braces(pattern: &str) -> Result<Vec<String>, &'static str> {
    let Some((open, close)) = brace_group(pattern)? else {
        return Ok(vec![pattern.to_string()]);
    };
    let (head, body, tail) = (&pattern[..open], &pattern[open + 1..close], &pattern[close + 1..]);
    let mut out = Vec::new();
    for alt in split_alternatives(body) {
        out.extend(expand_braces(&format!("{head}{alt}{tail}"))?);
    }
    Ok(out)
}

/// Byte offsets of the first top-level `{` and its matching `}`.
fn brace_group(pattern: &str) -> Result<Option<(usize, usize)>, &'static str> {
    let mut depth = 0usize;
    let mut open = 0;
    let mut in_class = false;
    for (i, c) in pattern.char_indices() {
        match c {
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            _ if in_class => {}
            '{' => {
                if depth == 0 {
                    open = i;
                }
                depth += 1;
            }
            '}' if depth == 0 => return Err("unmatched '}'"),
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(Some((open, i)));
                }
            }
            _ => {}
        }
    }
    if depth > 0 {
        return Err("unclosed '{'");
    }
    Ok(None)
}

/// Split a brace body on its top-level commas.
fn split_alternatives(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    let mut in_class = false;
    for (i, c) in body.char_indices() {
        match c {
            '[' if !in_class => in_class = true,
            ']' if in_class => in_class = false,
            _ if in_class => {}
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

fn normalize(s: &str, case_sensitive: bool) -> Cow<'_, str> {
    let s: Cow<'_, str> = if cfg!(windows) && s.contains('\\') {
        Cow::Owned(s.replace('\\', "/"))
    } else {
        Cow::Borrowed(s)
    };
    if case_sensitive || !s.chars().any(char::is_uppercase) {
        s
    } else {
        Cow::Owned(s.to_lowercase())
    }
}

/// Include/exclude rules attached to one mount.
///
/// A path is hidden when any exclude pattern matches it, or when it is a file,
/// include patterns are present, and none of them matches. Directories are
/// never hidden by include rules; their children are filtered individually.
#[derive(Debug, Clone, Default)]
pub struct GlobFilter {
    include: Vec<Arc<GlobMatcher>>,
    exclude: Vec<Arc<GlobMatcher>>,
}

impl GlobFilter {
    pub fn new<S: AsRef<str>>(
        cache: &GlobCache,
        include: &[S],
        exclude: &[S],
    ) -> Result<Self, GlobError> {
        let compile = |patterns: &[S]| {
            patterns
                .iter()
                .map(|p| cache.get_glob(p.as_ref()))
                .collect::<Result<Vec<_>, _>>()
        };
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    /// Whether `path` (relative to the mount root) is hidden by this filter.
    pub fn excludes(&self, path: &str, is_dir: bool) -> bool {
        if self.exclude.iter().any(|g| g.matches(path)) {
            return true;
        }
        !is_dir && !self.include.is_empty() && !self.include.iter().any(|g| g.matches(path))
    }
}

pub fn has_glob_char(s: &str) -> bool {
    s.contains(GLOB_CHARS)
}

/// The longest leading directory of `pattern` that contains no wildcards.
///
/// Used to scope a walk to the smallest real subtree before matching. The last
/// segment is always treated as the file part and dropped.
///
/// ```
/// use sitefs::glob::resolve_root_dir;
/// assert_eq!(resolve_root_dir("content/blog/*.md"), "content/blog");
/// assert_eq!(resolve_root_dir("content/**/index.md"), "content");
/// assert_eq!(resolve_root_dir("*.md"), "");
/// ```
pub fn resolve_root_dir(pattern: &str) -> String {
    let pattern = normalize(pattern, true);
    let dir = match pattern.rfind('/') {
        Some(i) => &pattern[..i],
        None => return String::new(),
    };
    dir.split('/')
        .filter(|part| !part.is_empty())
        .take_while(|part| !has_glob_char(part))
        .collect::<Vec<_>>()
        .join("/")
}

/// Drop every segment that contains wildcard syntax.
pub fn filter_glob_parts<'a>(parts: &[&'a str]) -> Vec<&'a str> {
    parts
        .iter()
        .copied()
        .filter(|part| !has_glob_char(part))
        .collect()
}
