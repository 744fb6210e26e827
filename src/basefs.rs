//! Base filesystem assembly: the named views a site build reads from.
//!
//! [`BaseFs`] resolves the project and its themes into [`Module`]s, expands
//! each module's mounts into [`RootMapping`]s and wires them into
//! [`SourceFilesystems`]:
//!
//! | View | Shape |
//! |------|-------|
//! | content | one [`RootMappingFs`] per language, stacked in an [`OverlayFs`] |
//! | static | per-language static over the common static files |
//! | layouts, data, i18n, assets, archetypes | one [`RootMappingFs`] each |
//! | resources | [`OsFs`] rooted at the resource cache |
//!
//! Within every table the project's mounts come first, then each theme's in
//! configured order, so the project overrides themes and earlier themes
//! override later ones.
//!
//! Content mounts without a language belong to the default language. Static
//! mounts without a language are common to all languages.
//!
//! The assembly is immutable: a config change means building a new `BaseFs`.

use crate::config::{
    ConfigError, MountConfig, ProjectConfig, default_mounts, load_config, load_theme_config,
};
use crate::error::FsError;
use crate::fs::{Filesystem, OsFs};
use crate::glob::GlobCache;
use crate::meta::Module;
use crate::overlay::OverlayFs;
use crate::rootmapping::{RootMapping, RootMappingFs};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BaseFsError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fs(#[from] FsError),
}

/// Mappings grouped by the view they feed.
#[derive(Default)]
struct Tables {
    content: BTreeMap<String, Vec<RootMapping>>,
    static_common: Vec<RootMapping>,
    static_lang: BTreeMap<String, Vec<RootMapping>>,
    other: BTreeMap<&'static str, Vec<RootMapping>>,
}

impl Tables {
    fn add(&mut self, component: &'static str, mapping: RootMapping, default_lang: &str) {
        match component {
            "content" => {
                let lang = if mapping.lang.is_empty() {
                    default_lang.to_string()
                } else {
                    mapping.lang.clone()
                };
                self.content
                    .entry(lang.clone())
                    .or_default()
                    .push(mapping.with_lang(lang));
            }
            "static" if mapping.lang.is_empty() => self.static_common.push(mapping),
            "static" => self
                .static_lang
                .entry(mapping.lang.clone())
                .or_default()
                .push(mapping),
            other => self.other.entry(other).or_default().push(mapping),
        }
    }

    fn take_other(&mut self, component: &str) -> Vec<RootMapping> {
        self.other.remove(component).unwrap_or_default()
    }
}

/// The composed filesystems of one build.
#[derive(Debug)]
pub struct SourceFilesystems {
    default_lang: String,
    languages: Vec<String>,
    content: BTreeMap<String, Arc<RootMappingFs>>,
    static_common: Arc<RootMappingFs>,
    static_lang: BTreeMap<String, Arc<RootMappingFs>>,
    layouts: Arc<RootMappingFs>,
    data: Arc<RootMappingFs>,
    i18n: Arc<RootMappingFs>,
    assets: Arc<RootMappingFs>,
    archetypes: Arc<RootMappingFs>,
    resources: Arc<OsFs>,
}

impl SourceFilesystems {
    /// Content for one language: `[lang, default]`.
    ///
    /// Each layer holds the project's mounts before the themes', giving the
    /// usual precedence: project/lang, theme/lang, project/default,
    /// theme/default.
    pub fn content_for(&self, lang: &str) -> OverlayFs {
        let mut layers: Vec<Arc<dyn Filesystem>> = Vec::new();
        if let Some(fs) = self.content.get(lang) {
            layers.push(fs.clone());
        }
        if lang != self.default_lang
            && let Some(fs) = self.content.get(&self.default_lang)
        {
            layers.push(fs.clone());
        }
        OverlayFs::new(layers)
    }

    /// Content of every language, default language first.
    pub fn content(&self) -> OverlayFs {
        let layers: Vec<Arc<dyn Filesystem>> = self
            .languages
            .iter()
            .filter_map(|lang| self.content.get(lang))
            .map(|fs| fs.clone() as Arc<dyn Filesystem>)
            .collect();
        OverlayFs::new(layers)
    }

    /// Static files for one language over the common ones.
    pub fn static_for(&self, lang: &str) -> OverlayFs {
        let mut layers: Vec<Arc<dyn Filesystem>> = Vec::new();
        if let Some(fs) = self.static_lang.get(lang) {
            layers.push(fs.clone());
        }
        layers.push(self.static_common.clone());
        OverlayFs::new(layers)
    }

    pub fn layouts(&self) -> Arc<RootMappingFs> {
        self.layouts.clone()
    }

    pub fn data(&self) -> Arc<RootMappingFs> {
        self.data.clone()
    }

    pub fn i18n(&self) -> Arc<RootMappingFs> {
        self.i18n.clone()
    }

    pub fn assets(&self) -> Arc<RootMappingFs> {
        self.assets.clone()
    }

    pub fn archetypes(&self) -> Arc<RootMappingFs> {
        self.archetypes.clone()
    }

    /// Generated-resource cache passthrough.
    pub fn resources(&self) -> Arc<OsFs> {
        self.resources.clone()
    }

    /// The view serving `component`, language-scoped where that applies.
    ///
    /// `lang` narrows content to `[lang, default]` and picks the static
    /// overlay; without it content spans every language and static uses the
    /// default language.
    pub fn component(&self, component: &str, lang: Option<&str>) -> Option<Arc<dyn Filesystem>> {
        let fs: Arc<dyn Filesystem> = match component {
            "content" => match lang {
                Some(lang) => Arc::new(self.content_for(lang)),
                None => Arc::new(self.content()),
            },
            "static" => Arc::new(self.static_for(lang.unwrap_or(&self.default_lang))),
            "layouts" => self.layouts(),
            "data" => self.data(),
            "i18n" => self.i18n(),
            "assets" => self.assets(),
            "archetypes" => self.archetypes(),
            _ => return None,
        };
        Some(fs)
    }

    /// Every mapping table with a label, in a stable order.
    pub fn tables(&self) -> Vec<(String, Arc<RootMappingFs>)> {
        let mut tables = Vec::new();
        for lang in &self.languages {
            if let Some(fs) = self.content.get(lang) {
                tables.push((format!("content [{lang}]"), fs.clone()));
            }
        }
        tables.push(("static".to_string(), self.static_common.clone()));
        for (lang, fs) in &self.static_lang {
            tables.push((format!("static [{lang}]"), fs.clone()));
        }
        for (name, fs) in [
            ("layouts", &self.layouts),
            ("data", &self.data),
            ("i18n", &self.i18n),
            ("assets", &self.assets),
            ("archetypes", &self.archetypes),
        ] {
            tables.push((name.to_string(), fs.clone()));
        }
        tables
    }
}

/// A project with its themes, resolved into composed filesystems.
#[derive(Debug)]
pub struct BaseFs {
    root: PathBuf,
    config: ProjectConfig,
    /// Owns the modules every mapping refers to weakly.
    modules: Vec<Arc<Module>>,
    globs: Arc<GlobCache>,
    source: SourceFilesystems,
}

impl BaseFs {
    /// Load `config.toml` from `root` and assemble.
    pub fn load(root: &Path) -> Result<Self, BaseFsError> {
        let config = load_config(root)?;
        let globs = Arc::new(GlobCache::with_case_sensitivity(config.case_sensitive_globs));
        Self::new(root, config, globs)
    }

    pub fn new(
        root: &Path,
        config: ProjectConfig,
        globs: Arc<GlobCache>,
    ) -> Result<Self, BaseFsError> {
        let root = std::path::absolute(root).map_err(ConfigError::from)?;
        let languages = config.language_order();
        let default_lang = config.default_content_language.clone();

        let project = Arc::new(Module {
            name: "project".to_string(),
            dir: root.clone(),
            is_project: true,
        });
        let mut modules = vec![project.clone()];
        let mut module_mounts = vec![(project, project_mounts(&config))];

        for name in &config.theme {
            let dir = root.join(&config.themes_dir).join(name);
            if !dir.is_dir() {
                return Err(ConfigError::Validation(format!(
                    "theme '{name}' not found at {}",
                    dir.display()
                ))
                .into());
            }
            let mounts = load_theme_config(&dir)?.effective_mounts();
            let module = Arc::new(Module {
                name: name.clone(),
                dir,
                is_project: false,
            });
            modules.push(module.clone());
            module_mounts.push((module, mounts));
        }

        let mut tables = Tables::default();
        for (module, mounts) in &module_mounts {
            tracing::debug!(module = %module.name, mounts = mounts.len(), "resolving module mounts");
            for mount in mounts {
                let Some(component) = mount.component() else {
                    tracing::warn!(module = %module.name, target = %mount.target, "ignoring mount outside component folders");
                    continue;
                };
                if !mount.lang.is_empty() && !languages.contains(&mount.lang) {
                    tracing::warn!(module = %module.name, lang = %mount.lang, "ignoring mount for unconfigured language");
                    continue;
                }
                let mapping = RootMapping {
                    from: mount.target.clone(),
                    to: module.dir.join(&mount.source),
                    lang: mount.lang.clone(),
                    module: Arc::downgrade(module),
                    include_files: mount.include_files.clone(),
                    exclude_files: mount.exclude_files.clone(),
                    required: false,
                };
                tables.add(component, mapping, &default_lang);
            }
        }

        let backing: Arc<dyn Filesystem> = Arc::new(OsFs::new());
        let build = |mappings: Vec<RootMapping>| -> Result<Arc<RootMappingFs>, FsError> {
            RootMappingFs::new(backing.clone(), mappings, &globs).map(Arc::new)
        };

        let mut content = BTreeMap::new();
        for (lang, mappings) in std::mem::take(&mut tables.content) {
            content.insert(lang, build(mappings)?);
        }
        let mut static_lang = BTreeMap::new();
        for (lang, mappings) in std::mem::take(&mut tables.static_lang) {
            static_lang.insert(lang, build(mappings)?);
        }
        let source = SourceFilesystems {
            static_common: build(std::mem::take(&mut tables.static_common))?,
            layouts: build(tables.take_other("layouts"))?,
            data: build(tables.take_other("data"))?,
            i18n: build(tables.take_other("i18n"))?,
            assets: build(tables.take_other("assets"))?,
            archetypes: build(tables.take_other("archetypes"))?,
            resources: Arc::new(OsFs::with_root(root.join(&config.resource_dir))),
            content,
            static_lang,
            default_lang,
            languages,
        };

        Ok(Self {
            root,
            config,
            modules,
            globs,
            source,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Project first, then themes in precedence order.
    pub fn modules(&self) -> &[Arc<Module>] {
        &self.modules
    }

    pub fn globs(&self) -> &Arc<GlobCache> {
        &self.globs
    }

    pub fn source(&self) -> &SourceFilesystems {
        &self.source
    }

    /// Languages in build order, default first.
    pub fn languages(&self) -> &[String] {
        &self.source.languages
    }

    /// Every physical directory backing any view, for change watchers.
    pub fn watch_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: BTreeSet<PathBuf> = self
            .source
            .tables()
            .iter()
            .flat_map(|(_, fs)| fs.physical_roots())
            .collect();
        dirs.extend(
            self.source
                .resources
                .physical_roots()
                .into_iter()
                .filter(|dir| dir.is_dir()),
        );
        dirs.into_iter().collect()
    }
}

/// Project mounts: explicit `[[mounts]]` or the defaults, plus the
/// per-language content and static directories.
fn project_mounts(config: &ProjectConfig) -> Vec<MountConfig> {
    let default_lang = &config.default_content_language;
    let mut mounts = Vec::new();

    if config.mounts.is_empty() {
        let default_has_own_dir = config
            .languages
            .get(default_lang)
            .is_some_and(|l| l.content_dir.is_some());
        for mount in default_mounts() {
            if mount.target == "content" {
                if !default_has_own_dir {
                    mounts.push(MountConfig::new(&config.content_dir, "content"));
                }
            } else {
                mounts.push(mount);
            }
        }
    } else {
        mounts.extend(config.mounts.iter().cloned());
    }

    for lang in config.language_order() {
        let Some(lc) = config.languages.get(&lang) else {
            continue;
        };
        if let Some(dir) = &lc.content_dir {
            let mut mount = MountConfig::new(dir, "content");
            mount.lang = lang.clone();
            mounts.push(mount);
        }
        if let Some(dir) = &lc.static_dir {
            let mut mount = MountConfig::new(dir, "static");
            mount.lang = lang.clone();
            mounts.push(mount);
        }
    }
    mounts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{names, read_string, setup_site, walk_files, write_tree};
    use tempfile::TempDir;

    fn site() -> (TempDir, BaseFs) {
        let tmp = setup_site();
        let base = BaseFs::load(tmp.path()).unwrap();
        (tmp, base)
    }

    #[test]
    fn modules_project_first() {
        let (_tmp, base) = site();
        let modules: Vec<&str> = base.modules().iter().map(|m| m.name.as_str()).collect();
        assert_eq!(modules, vec!["project", "hyde"]);
        assert!(base.modules()[0].is_project);
        assert_eq!(base.languages(), ["en", "fr"]);
    }

    #[test]
    fn content_keeps_languages_side_by_side() {
        let (_tmp, base) = site();
        let content = base.source().content();
        let entries = content.read_dir(Path::new("content/blog")).unwrap();
        let tagged: Vec<(&str, &str)> = entries.iter().map(|e| (e.name(), e.meta().lang())).collect();
        assert_eq!(tagged, vec![("post.md", "en"), ("post.md", "fr")]);
    }

    #[test]
    fn content_for_language_falls_back_to_default() {
        let tmp = setup_site();
        write_tree(tmp.path(), &[("content/en/only-en.md", "en only")]);
        let base = BaseFs::load(tmp.path()).unwrap();

        let fr = base.source().content_for("fr");
        assert_eq!(read_string(&fr, "content/_index.md"), "accueil");
        assert_eq!(read_string(&fr, "content/only-en.md"), "en only");
        let info = fr.stat(Path::new("content/only-en.md")).unwrap();
        assert_eq!(info.meta().lang(), "en");
    }

    #[test]
    fn project_layouts_override_theme() {
        let (_tmp, base) = site();
        let layouts = base.source().layouts();
        assert_eq!(read_string(&*layouts, "layouts/_default/single.html"), "project single");
        assert_eq!(read_string(&*layouts, "layouts/_default/list.html"), "theme list");

        let fs: Arc<dyn Filesystem> = layouts;
        assert_eq!(
            walk_files(&fs, "layouts"),
            vec!["_default/list.html", "_default/single.html"]
        );
    }

    #[test]
    fn theme_entries_carry_module() {
        let (_tmp, base) = site();
        let i18n = base.source().i18n();
        let info = i18n.stat(Path::new("i18n/en.toml")).unwrap();
        assert_eq!(info.meta().module().unwrap().name, "hyde");
        assert_eq!(info.meta().component(), Some("i18n"));
    }

    #[test]
    fn static_language_overlay() {
        let (_tmp, base) = site();
        let fr = base.source().static_for("fr");
        assert_eq!(read_string(&fr, "static/robots.txt"), "robots fr");
        assert_eq!(read_string(&fr, "static/css/site.css"), "project css");
        assert_eq!(read_string(&fr, "static/css/theme.css"), "theme only");

        let en = base.source().static_for("en");
        assert_eq!(read_string(&en, "static/robots.txt"), "project robots");
        assert_eq!(names(&en, "static/css"), vec!["site.css", "site.css", "theme.css"]);
    }

    #[test]
    fn static_language_view_walks_each_path_once() {
        let (_tmp, base) = site();
        let fr: Arc<dyn Filesystem> = Arc::new(base.source().static_for("fr"));
        assert_eq!(
            walk_files(&fr, "static"),
            vec!["css/site.css", "css/theme.css", "robots.txt"]
        );

        let robots: Vec<_> = fr
            .read_dir(Path::new("static"))
            .unwrap()
            .into_iter()
            .filter(|e| e.name() == "robots.txt")
            .collect();
        assert_eq!(robots.len(), 1);
        assert_eq!(robots[0].meta().lang(), "fr");
        assert!(robots[0].meta().is_owner());
    }

    #[test]
    fn component_lookup() {
        let (_tmp, base) = site();
        let data = base.source().component("data", None).unwrap();
        assert_eq!(walk_files(&data, "data"), vec!["authors.toml"]);
        assert!(base.source().component("public", None).is_none());

        let content = base.source().component("content", Some("en")).unwrap();
        assert_eq!(walk_files(&content, "content"), vec!["_index.md", "blog/post.md"]);
    }

    #[test]
    fn empty_component_is_not_found() {
        let (_tmp, base) = site();
        let archetypes = base.source().archetypes();
        assert!(archetypes.stat(Path::new("archetypes")).unwrap_err().is_not_found());
    }

    #[test]
    fn watch_dirs_cover_project_and_theme() {
        let (tmp, base) = site();
        let dirs = base.watch_dirs();
        let root = std::path::absolute(tmp.path()).unwrap();
        assert!(dirs.contains(&root.join("content/en")));
        assert!(dirs.contains(&root.join("static_fr")));
        assert!(dirs.contains(&root.join("themes/hyde/layouts")));
        // Missing resource dir is not watched.
        assert!(!dirs.contains(&root.join("resources")));
    }

    #[test]
    fn missing_theme_is_config_error() {
        let tmp = TempDir::new().unwrap();
        write_tree(tmp.path(), &[("config.toml", "theme = [\"ghost\"]")]);
        let err = BaseFs::load(tmp.path()).unwrap_err();
        assert!(matches!(err, BaseFsError::Config(ConfigError::Validation(_))));
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn theme_mounts_with_filters() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[
                ("config.toml", "theme = [\"kit\"]"),
                (
                    "themes/kit/config.toml",
                    "[[mounts]]\nsource = \"dist\"\ntarget = \"static/kit\"\nexclude_files = [\"**/*.map\"]\n",
                ),
                ("themes/kit/dist/kit.js", "js"),
                ("themes/kit/dist/kit.js.map", "map"),
                ("themes/kit/static/ignored.txt", "not mounted"),
            ],
        );
        let base = BaseFs::load(tmp.path()).unwrap();
        let fs: Arc<dyn Filesystem> = Arc::new(base.source().static_for("en"));
        assert_eq!(walk_files(&fs, "static"), vec!["kit/kit.js"]);
        assert!(
            fs.stat(Path::new("static/kit/kit.js.map"))
                .unwrap_err()
                .is_excluded()
        );
    }

    #[test]
    fn explicit_project_mounts_replace_defaults() {
        let tmp = TempDir::new().unwrap();
        write_tree(
            tmp.path(),
            &[
                (
                    "config.toml",
                    "[[mounts]]\nsource = \"src/content\"\ntarget = \"content\"\n",
                ),
                ("src/content/a.md", ""),
                ("content/ignored.md", ""),
                ("layouts/x.html", ""),
            ],
        );
        let base = BaseFs::load(tmp.path()).unwrap();
        let content = base.source().component("content", None).unwrap();
        assert_eq!(walk_files(&content, "content"), vec!["a.md"]);
        assert_eq!(base.source().layouts().mappings().count(), 0);
    }

    #[test]
    fn tables_are_labelled() {
        let (_tmp, base) = site();
        let labels: Vec<String> = base.source().tables().into_iter().map(|(l, _)| l).collect();
        assert_eq!(
            labels,
            vec![
                "content [en]",
                "content [fr]",
                "static",
                "static [fr]",
                "layouts",
                "data",
                "i18n",
                "assets",
                "archetypes"
            ]
        );
    }
}
