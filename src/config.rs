//! Project configuration module.
//!
//! Handles loading, validating, and merging `config.toml` files. The project
//! config is merged over stock defaults and then validated; each theme may
//! carry its own `config.toml` declaring the mounts it contributes.
//!
//! ## Config File Location
//!
//! ```text
//! site/
//! ├── config.toml              # Project config (overrides stock defaults)
//! ├── content/
//! ├── static/
//! └── themes/
//!     └── hyde/
//!         ├── config.toml      # Theme mounts (optional)
//!         └── layouts/
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! content_dir = "content"
//! resource_dir = "resources"
//! themes_dir = "themes"
//! theme = []                       # highest precedence first
//! default_content_language = "en"
//! case_sensitive_globs = false
//!
//! [languages.fr]
//! weight = 2
//! content_dir = "content/fr"       # optional per-language content root
//! static_dir = "static/fr"         # optional per-language static overlay
//!
//! [[mounts]]                       # replaces the default project mounts
//! source = "assets/scss"
//! target = "assets/scss"
//! lang = ""
//! include_files = ["**/*.scss"]
//! exclude_files = ["vendor/**"]
//! ```
//!
//! ## Mounts
//!
//! A mount binds a `source` directory (relative to the module that declares
//! it) to a logical `target` whose first segment is a component folder. When
//! a module declares no mounts it gets one default mount per component folder
//! with `source == target`.
//!
//! Unknown keys in the project config are rejected to catch typos early.
//! Theme configs may carry other settings; only `[[mounts]]` is read.

use crate::glob::GlobCache;
use crate::meta::{COMPONENT_FOLDERS, resolve_component_folder};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Project configuration loaded from `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProjectConfig {
    /// Project content root, mounted for the default language unless that
    /// language has its own `content_dir`.
    pub content_dir: String,
    /// Generated-resource cache root, exposed as a passthrough.
    pub resource_dir: String,
    /// Directory holding theme modules.
    pub themes_dir: String,
    /// Theme names, highest precedence first.
    pub theme: Vec<String>,
    pub default_content_language: String,
    /// Match mount filters case-sensitively.
    pub case_sensitive_globs: bool,
    pub languages: BTreeMap<String, LanguageConfig>,
    /// Explicit project mounts. Empty means the default mounts.
    pub mounts: Vec<MountConfig>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            content_dir: "content".to_string(),
            resource_dir: "resources".to_string(),
            themes_dir: "themes".to_string(),
            theme: Vec::new(),
            default_content_language: "en".to_string(),
            case_sensitive_globs: false,
            languages: BTreeMap::new(),
            mounts: Vec::new(),
        }
    }
}

/// Per-language settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LanguageConfig {
    /// Sort key after the default language; ties sort by name.
    pub weight: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_dir: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub static_dir: Option<String>,
}

/// One `[[mounts]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MountConfig {
    /// Directory relative to the declaring module (or absolute).
    pub source: String,
    /// Logical path, e.g. `static/images`.
    pub target: String,
    #[serde(default)]
    pub lang: String,
    #[serde(default)]
    pub include_files: Vec<String>,
    #[serde(default)]
    pub exclude_files: Vec<String>,
}

impl MountConfig {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            lang: String::new(),
            include_files: Vec::new(),
            exclude_files: Vec::new(),
        }
    }

    /// Component folder of the target.
    pub fn component(&self) -> Option<&'static str> {
        resolve_component_folder(&self.target)
    }
}

/// One mount per component folder, `source == target`.
pub fn default_mounts() -> Vec<MountConfig> {
    COMPONENT_FOLDERS
        .iter()
        .map(|folder| MountConfig::new(*folder, *folder))
        .collect()
}

impl ProjectConfig {
    /// Languages in build order: default first, then by weight, then name.
    ///
    /// A project without `[languages]` has exactly the default language.
    pub fn language_order(&self) -> Vec<String> {
        let default = &self.default_content_language;
        let mut rest: Vec<(&String, &LanguageConfig)> = self
            .languages
            .iter()
            .filter(|(name, _)| *name != default)
            .collect();
        rest.sort_by(|(a_name, a), (b_name, b)| a.weight.cmp(&b.weight).then(a_name.cmp(b_name)));

        let mut order = vec![default.clone()];
        order.extend(rest.into_iter().map(|(name, _)| name.clone()));
        order
    }

    pub fn has_language(&self, lang: &str) -> bool {
        lang == self.default_content_language || self.languages.contains_key(lang)
    }

    /// Validate settings and every mount.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_content_language.is_empty() {
            return Err(ConfigError::Validation(
                "default_content_language must not be empty".into(),
            ));
        }
        if !self.languages.is_empty() && !self.languages.contains_key(&self.default_content_language)
        {
            return Err(ConfigError::Validation(format!(
                "default_content_language '{}' is not configured in [languages]",
                self.default_content_language
            )));
        }
        if let Some(name) = self.theme.iter().find(|t| t.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "theme names must not be empty (got '{name}')"
            )));
        }
        let globs = GlobCache::with_case_sensitivity(self.case_sensitive_globs);
        validate_mounts(&self.mounts, &globs, |lang| self.has_language(lang))
    }
}

/// Check mount targets, language references and filter patterns.
pub fn validate_mounts(
    mounts: &[MountConfig],
    globs: &GlobCache,
    known_lang: impl Fn(&str) -> bool,
) -> Result<(), ConfigError> {
    for mount in mounts {
        if mount.component().is_none() {
            return Err(ConfigError::Validation(format!(
                "mount target '{}' must start with one of: {}",
                mount.target,
                COMPONENT_FOLDERS.join(", ")
            )));
        }
        if !mount.lang.is_empty() && !known_lang(&mount.lang) {
            return Err(ConfigError::Validation(format!(
                "mount '{}' references unknown language '{}'",
                mount.target, mount.lang
            )));
        }
        for pattern in mount.include_files.iter().chain(&mount.exclude_files) {
            globs.get_glob(pattern).map_err(|e| {
                ConfigError::Validation(format!("mount '{}': {e}", mount.target))
            })?;
        }
    }
    Ok(())
}

/// Theme module settings: the mounts it contributes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    pub mounts: Vec<MountConfig>,
}

impl ThemeConfig {
    /// Declared mounts, or the default mounts when none are declared.
    pub fn effective_mounts(&self) -> Vec<MountConfig> {
        if self.mounts.is_empty() {
            default_mounts()
        } else {
            self.mounts.clone()
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(ProjectConfig::default())
        .map_err(|e| ConfigError::Validation(format!("stock defaults do not serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay (including arrays) replace base values.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
pub fn load_raw_config(dir: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = dir.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ProjectConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: ProjectConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the project config from `config.toml` in `root`.
pub fn load_config(root: &Path) -> Result<ProjectConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(root)?;
    resolve_config(base, overlay)
}

/// Load a theme's `config.toml`; a theme without one gets defaults.
pub fn load_theme_config(dir: &Path) -> Result<ThemeConfig, ConfigError> {
    match load_raw_config(dir)? {
        Some(value) => Ok(value.try_into()?),
        None => Ok(ThemeConfig::default()),
    }
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# sitefs Project Configuration
# ============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Project content root. Mounted for the default language unless that
# language sets its own content_dir.
content_dir = "content"

# Generated-resource cache, exposed as a plain passthrough directory.
resource_dir = "resources"

# Where theme modules live. Each theme is a directory below this one.
themes_dir = "themes"

# Themes to mount, highest precedence first. The project always wins
# over every theme.
theme = []

# Language whose files win when several languages provide the same file.
default_content_language = "en"

# Match mount include/exclude patterns case-sensitively.
case_sensitive_globs = false

# ---------------------------------------------------------------------------
# Languages
# ---------------------------------------------------------------------------
# Once any language is listed, default_content_language must be one of them.
#
# [languages.en]
# weight = 1
# content_dir = "content/en"    # per-language content root
#
# [languages.fr]
# weight = 2
# content_dir = "content/fr"
# static_dir = "static/fr"      # overlays the common static files for fr

# ---------------------------------------------------------------------------
# Mounts
# ---------------------------------------------------------------------------
# Explicit mounts replace the default ones (one per component folder:
# archetypes, assets, content, data, i18n, layouts, static). The target
# must start with one of those folders. Patterns match paths relative to
# the mount source.
#
# [[mounts]]
# source = "node_modules/bootstrap/scss"
# target = "assets/scss/bootstrap"
# lang = ""
# include_files = ["**/*.scss"]
# exclude_files = ["tests/**"]
"##
}
