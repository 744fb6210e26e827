//! CLI output formatting for every `sitefs` command.
//!
//! # Provenance-First Display
//!
//! Every entry is shown under its logical path; where it physically comes
//! from (language, owning module, source file) follows as secondary context.
//! That keeps listings readable as an inventory of the composed site while
//! still letting users trace each entry back to a file on disk.
//!
//! # Output Format
//!
//! ## Mounts
//!
//! ```text
//! content [en]
//!     content ← /site/content/en (project)
//! static
//!     static ← /site/static (project)
//!     static/kit ← /site/themes/kit/dist (kit) exclude: **/*.map
//! layouts
//!     (no mounts)
//! ```
//!
//! ## Walk
//!
//! ```text
//! _index.md [en] (project) branch
//! blog/
//!     post.md [en] (project) content
//!     post.md [fr] (project) content
//! ```
//!
//! ## Check
//!
//! ```text
//! en  content    2 files, 1 dirs  3f9c2a01b7de
//! en  static     3 files, 1 dirs  81ab44c0e2f9
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::error::FsError;
use crate::meta::{ContentClass, FileInfo};
use crate::rootmapping::{RootMapping, RootMappingFs};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use std::sync::Arc;

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

/// One walked entry, detached from the filesystem for display and hashing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalkRecord {
    /// Logical path relative to the walk base.
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    pub lang: String,
    pub module: Option<String>,
    pub class: ContentClass,
    pub filename: PathBuf,
}

impl WalkRecord {
    pub fn from_info(path: &str, info: &FileInfo) -> Self {
        let meta = info.meta();
        Self {
            path: path.to_string(),
            is_dir: info.is_dir(),
            size: info.size(),
            lang: meta.lang().to_string(),
            module: meta.module().map(|m| m.name.clone()),
            class: meta.classifier(),
            filename: meta.filename().to_path_buf(),
        }
    }

    fn name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    fn depth(&self) -> usize {
        self.path.matches('/').count()
    }

    /// ` [lang] (module) class`, each part only when present.
    fn provenance(&self) -> String {
        let mut out = String::new();
        if !self.lang.is_empty() {
            out.push_str(&format!(" [{}]", self.lang));
        }
        if let Some(module) = &self.module {
            out.push_str(&format!(" ({module})"));
        }
        if !self.is_dir && self.class != ContentClass::File {
            out.push_str(&format!(" {}", self.class));
        }
        out
    }
}

/// SHA-256 over every record's logical path, kind, language and physical
/// filename, as a hex string. Equal listings hash equal.
pub fn fingerprint(records: &[WalkRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.path.as_bytes());
        hasher.update(b"\0");
        hasher.update([u8::from(record.is_dir)]);
        hasher.update(record.lang.as_bytes());
        hasher.update(b"\0");
        hasher.update(record.filename.to_string_lossy().as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// mounts
// ============================================================================

fn mapping_line(mapping: &RootMapping) -> String {
    let module = mapping
        .module
        .upgrade()
        .map(|m| m.name.clone())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{}{} ← {} ({})",
        indent(1),
        mapping.from,
        mapping.to.display(),
        module
    );
    if !mapping.lang.is_empty() {
        line.push_str(&format!(" lang: {}", mapping.lang));
    }
    if !mapping.include_files.is_empty() {
        line.push_str(&format!(" include: {}", mapping.include_files.join(", ")));
    }
    if !mapping.exclude_files.is_empty() {
        line.push_str(&format!(" exclude: {}", mapping.exclude_files.join(", ")));
    }
    line
}

/// Mapping tables with their mounts in priority order.
pub fn format_mounts(tables: &[(String, Arc<RootMappingFs>)]) -> Vec<String> {
    let mut lines = Vec::new();
    for (label, fs) in tables {
        lines.push(label.clone());
        let before = lines.len();
        lines.extend(fs.mappings().map(mapping_line));
        if lines.len() == before {
            lines.push(format!("{}(no mounts)", indent(1)));
        }
    }
    lines
}

pub fn print_mounts(tables: &[(String, Arc<RootMappingFs>)]) {
    print_lines(format_mounts(tables));
}

// ============================================================================
// walk / glob
// ============================================================================

/// Indented tree of walked entries. The walk root itself is skipped.
pub fn format_walk(records: &[WalkRecord]) -> Vec<String> {
    records
        .iter()
        .filter(|r| !r.path.is_empty())
        .map(|r| {
            let slash = if r.is_dir { "/" } else { "" };
            format!("{}{}{}{}", indent(r.depth()), r.name(), slash, r.provenance())
        })
        .collect()
}

pub fn print_walk(records: &[WalkRecord]) {
    print_lines(format_walk(records));
}

/// Flat list of matched files with a trailing count.
pub fn format_matches(pattern: &str, records: &[WalkRecord]) -> Vec<String> {
    let mut lines: Vec<String> = records
        .iter()
        .map(|r| format!("{}{}", r.path, r.provenance()))
        .collect();
    lines.push(format!("{} match(es) for {}", records.len(), pattern));
    lines
}

pub fn print_matches(pattern: &str, records: &[WalkRecord]) {
    print_lines(format_matches(pattern, records));
}

// ============================================================================
// stat
// ============================================================================

/// Resolution result for one logical path.
///
/// Excluded and not-found paths are reported differently so users can tell a
/// filtered file from a missing one.
pub fn format_stat(path: &str, result: &Result<FileInfo, FsError>) -> Vec<String> {
    let info = match result {
        Ok(info) => info,
        Err(FsError::Excluded { filename, .. }) => {
            return vec![format!(
                "{path}: excluded by mount filter ({})",
                filename.display()
            )];
        }
        Err(e) if e.is_not_found() => return vec![format!("{path}: not found")],
        Err(e) => return vec![format!("{path}: {e}")],
    };
    let meta = info.meta();
    let kind = if info.is_dir() {
        "directory".to_string()
    } else {
        format!("file ({} bytes)", info.size())
    };
    let mut lines = vec![path.to_string(), format!("{}Kind: {kind}", indent(1))];
    if !meta.filename().as_os_str().is_empty() {
        lines.push(format!("{}Source: {}", indent(1), meta.filename().display()));
    } else {
        lines.push(format!("{}Source: (virtual)", indent(1)));
    }
    if !meta.lang().is_empty() {
        lines.push(format!("{}Language: {}", indent(1), meta.lang()));
    }
    if let Some(module) = meta.module() {
        lines.push(format!("{}Module: {}", indent(1), module.name));
    }
    if let Some(component) = meta.component() {
        lines.push(format!("{}Component: {component}", indent(1)));
    }
    if !info.is_dir() {
        lines.push(format!("{}Class: {}", indent(1), meta.classifier()));
    }
    lines
}

pub fn print_stat(path: &str, result: &Result<FileInfo, FsError>) {
    print_lines(format_stat(path, result));
}

// ============================================================================
// check
// ============================================================================

/// Summary of one walked view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReport {
    pub lang: String,
    pub view: String,
    pub files: usize,
    pub dirs: usize,
    pub fingerprint: String,
}

impl CheckReport {
    pub fn new(lang: &str, view: &str, records: &[WalkRecord]) -> Self {
        let dirs = records.iter().filter(|r| r.is_dir).count();
        Self {
            lang: lang.to_string(),
            view: view.to_string(),
            files: records.len() - dirs,
            dirs,
            fingerprint: fingerprint(records),
        }
    }
}

pub fn format_check(reports: &[CheckReport]) -> Vec<String> {
    let mut lines: Vec<String> = reports
        .iter()
        .map(|r| {
            format!(
                "{:<4}{:<11}{} files, {} dirs  {}",
                r.lang,
                r.view,
                r.files,
                r.dirs,
                &r.fingerprint[..r.fingerprint.len().min(12)]
            )
        })
        .collect();
    let files: usize = reports.iter().map(|r| r.files).sum();
    lines.push(format!("Checked {} views, {} files", reports.len(), files));
    lines
}

pub fn print_check(reports: &[CheckReport]) {
    print_lines(format_check(reports));
}
