use clap::{Parser, Subcommand};
use rayon::prelude::*;
use sitefs::basefs::BaseFs;
use sitefs::config;
use sitefs::error::FsError;
use sitefs::fs::Filesystem;
use sitefs::meta::{COMPONENT_FOLDERS, resolve_component_folder};
use sitefs::output::{self, CheckReport, WalkRecord};
use sitefs::walk::{WalkConfig, WalkControl, Walker, glob_files};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "sitefs")]
#[command(about = "Inspect the composed source filesystem of a static site")]
#[command(long_about = "\
Inspect the composed source filesystem of a static site

A site is assembled from the project directory and its themes. Every
component folder is a mount table; the project's mounts come first, then
each theme's in configured order:

  site/
  ├── config.toml                  # Project config, mounts, languages
  ├── content/en/                  # Content for one language
  ├── static/                      # Static files common to all languages
  ├── layouts/                     # Overrides theme layouts of the same name
  └── themes/
      └── hyde/
          ├── config.toml          # Theme mounts (optional)
          ├── layouts/
          └── static/

Logical paths start with the component: content/blog/post.md,
static/css/site.css, layouts/_default/single.html.

Set RUST_LOG (or pass -v) to see mount resolution, shadowed files and
excluded files.

Run 'sitefs gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Project directory (holds config.toml)
    #[arg(long, default_value = ".", global = true)]
    source: PathBuf,

    /// Log mount resolution, shadowed and excluded files
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print every view's root mappings in priority order
    Mounts,
    /// Walk the composed view of a component
    Walk {
        /// Component folder: content, static, layouts, data, i18n, assets, archetypes
        component: String,
        /// Narrow content to this language (over the default) or pick its static overlay
        #[arg(long)]
        lang: Option<String>,
        /// Print entries as JSON
        #[arg(long)]
        json: bool,
    },
    /// Resolve a logical path and show where it comes from
    Stat {
        /// Logical path, e.g. content/blog/post.md
        path: String,
        #[arg(long)]
        lang: Option<String>,
    },
    /// List files matching a glob, e.g. 'content/**/*.md'
    Glob {
        pattern: String,
        #[arg(long)]
        lang: Option<String>,
    },
    /// Walk every view of every language and print counts and fingerprints
    Check,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    let load = || -> Result<BaseFs, Box<dyn std::error::Error>> {
        let base = BaseFs::load(&cli.source)?;
        tracing::debug!(root = %base.root().display(), languages = ?base.languages(), "assembled");
        Ok(base)
    };

    match cli.command {
        Command::Mounts => {
            let base = load()?;
            output::print_mounts(&base.source().tables());
        }
        Command::Walk {
            component,
            lang,
            json,
        } => {
            let base = load()?;
            let fs = view(&base, &component, lang.as_deref())?;
            let records = walk_records(fs, &component)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else {
                output::print_walk(&records);
            }
        }
        Command::Stat { path, lang } => {
            let base = load()?;
            let component = resolve_component_folder(&path)
                .ok_or_else(|| format!("'{path}' does not start with a component folder"))?;
            let fs = view(&base, component, lang.as_deref())?;
            match fs.stat(Path::new(&path)) {
                Err(e) if !e.is_not_found() && !e.is_excluded() => return Err(e.into()),
                result => output::print_stat(&path, &result),
            }
        }
        Command::Glob { pattern, lang } => {
            let base = load()?;
            let component = resolve_component_folder(&pattern)
                .ok_or_else(|| format!("pattern '{pattern}' does not start with a component folder"))?;
            let fs = view(&base, component, lang.as_deref())?;
            let mut matches = Vec::new();
            glob_files(fs, base.globs(), &pattern, |info| {
                matches.push(WalkRecord::from_info(info.meta().path(), info));
                Ok(false)
            })?;
            output::print_matches(&pattern, &matches);
        }
        Command::Check => {
            let base = load()?;
            println!("==> Checking {}", base.root().display());
            let reports = check(&base)?;
            output::print_check(&reports);
            tracing::debug!(compiled = base.globs().compile_count(), "glob cache");
            println!("==> Mounts are valid");
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `--verbose`.
fn init_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let default = if verbose { "sitefs=debug" } else { "sitefs=warn" };
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(default))?;
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
    Ok(())
}

fn view(
    base: &BaseFs,
    component: &str,
    lang: Option<&str>,
) -> Result<Arc<dyn Filesystem>, Box<dyn std::error::Error>> {
    if let Some(lang) = lang
        && !base.languages().iter().any(|l| l == lang)
    {
        return Err(format!(
            "language '{lang}' is not configured (have: {})",
            base.languages().join(", ")
        )
        .into());
    }
    base.source().component(component, lang).ok_or_else(|| {
        format!(
            "unknown component '{component}' (expected one of: {})",
            COMPONENT_FOLDERS.join(", ")
        )
        .into()
    })
}

/// Walk `fs` below `root`; the first filesystem error aborts.
fn walk_records(fs: Arc<dyn Filesystem>, root: &str) -> Result<Vec<WalkRecord>, FsError> {
    let mut records = Vec::new();
    Walker::new(
        WalkConfig::new(fs)
            .root(root)
            .base(root)
            .ignore_missing_root(true),
    )
    .walk(|entry| {
        if let Some(err) = entry.error {
            return Err(err);
        }
        if let Some(info) = &entry.info {
            records.push(WalkRecord::from_info(&entry.path, info));
        }
        Ok(WalkControl::Continue)
    })?;
    Ok(records)
}

/// Walk content and static per language plus every shared view, in parallel.
fn check(base: &BaseFs) -> Result<Vec<CheckReport>, FsError> {
    let source = base.source();
    let mut jobs: Vec<(String, &'static str, Arc<dyn Filesystem>)> = Vec::new();
    for lang in base.languages() {
        let content: Arc<dyn Filesystem> = Arc::new(source.content_for(lang));
        let statics: Arc<dyn Filesystem> = Arc::new(source.static_for(lang));
        jobs.push((lang.clone(), "content", content));
        jobs.push((lang.clone(), "static", statics));
    }
    for component in ["layouts", "data", "i18n", "assets", "archetypes"] {
        if let Some(fs) = source.component(component, None) {
            jobs.push((String::new(), component, fs));
        }
    }

    jobs.into_par_iter()
        .map(|(lang, component, fs)| -> Result<CheckReport, FsError> {
            let records = walk_records(fs, component)?;
            Ok(CheckReport::new(&lang, component, &records))
        })
        .collect()
}
