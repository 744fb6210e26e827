//! Integration tests driving the public API over a real project on disk:
//! a project with two themes, two languages, filtered mounts and a
//! symlink cycle in the content tree.
//!
//! Run with: cargo test --test site_layout

use sitefs::basefs::BaseFs;
use sitefs::fs::{Filesystem, OsFs};
use sitefs::glob::GlobCache;
use sitefs::meta::ContentClass;
use sitefs::output::{WalkRecord, fingerprint};
use sitefs::rootmapping::{RootMapping, RootMappingFs};
use sitefs::walk::{WalkConfig, WalkControl, Walker, glob_files};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

fn write(root: &Path, files: &[(&str, &str)]) {
    for (rel, contents) in files {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }
}

fn project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        &[
            (
                "config.toml",
                r#"
theme = ["child", "parent"]
default_content_language = "en"

[languages.en]
weight = 1
content_dir = "content/en"

[languages.de]
weight = 2
content_dir = "content/de"
"#,
            ),
            ("content/en/_index.md", "home"),
            ("content/en/posts/first/index.md", "first"),
            ("content/en/posts/first/cover.jpg", "jpg"),
            ("content/en/posts/second.md", "second"),
            ("content/de/_index.md", "start"),
            ("content/de/posts/second.md", "zweite"),
            ("layouts/index.html", "project index"),
            ("themes/child/layouts/_default/single.html", "child single"),
            ("themes/child/layouts/partials/head.html", "child head"),
            ("themes/parent/layouts/_default/single.html", "parent single"),
            ("themes/parent/layouts/_default/list.html", "parent list"),
            ("themes/parent/layouts/partials/head.html", "parent head"),
            ("themes/parent/layouts/partials/foot.html", "parent foot"),
            (
                "themes/parent/config.toml",
                r#"
[[mounts]]
source = "layouts"
target = "layouts"

[[mounts]]
source = "node_modules/lib/dist"
target = "static/lib"
exclude_files = ["**/*.map", "src/**"]
"#,
            ),
            ("themes/parent/node_modules/lib/dist/lib.js", "lib"),
            ("themes/parent/node_modules/lib/dist/lib.js.map", "map"),
            ("themes/parent/node_modules/lib/dist/src/lib.ts", "ts"),
        ],
    );
    tmp
}

fn read(fs: &dyn Filesystem, path: &str) -> String {
    let mut s = String::new();
    fs.open(Path::new(path))
        .unwrap()
        .read_to_string(&mut s)
        .unwrap();
    s
}

fn records(fs: Arc<dyn Filesystem>, root: &str) -> Vec<WalkRecord> {
    let mut out = Vec::new();
    Walker::new(WalkConfig::new(fs).root(root).base(root))
        .walk(|entry| {
            let info = entry.info.as_ref().ok_or(())?;
            out.push(WalkRecord::from_info(&entry.path, info));
            Ok::<_, ()>(WalkControl::Continue)
        })
        .unwrap();
    out
}

fn file_paths(records: &[WalkRecord]) -> Vec<&str> {
    records
        .iter()
        .filter(|r| !r.is_dir)
        .map(|r| r.path.as_str())
        .collect()
}

#[test]
fn layouts_follow_theme_precedence() {
    let tmp = project();
    let base = BaseFs::load(tmp.path()).unwrap();
    let layouts = base.source().layouts();

    assert_eq!(read(&*layouts, "layouts/index.html"), "project index");
    assert_eq!(read(&*layouts, "layouts/_default/single.html"), "child single");
    assert_eq!(read(&*layouts, "layouts/_default/list.html"), "parent list");
    assert_eq!(read(&*layouts, "layouts/partials/head.html"), "child head");
    assert_eq!(read(&*layouts, "layouts/partials/foot.html"), "parent foot");

    let walked = records(layouts, "layouts");
    assert_eq!(
        file_paths(&walked),
        vec![
            "_default/list.html",
            "_default/single.html",
            "index.html",
            "partials/foot.html",
            "partials/head.html",
        ]
    );
    let head = walked.iter().find(|r| r.path == "partials/head.html").unwrap();
    assert_eq!(head.module.as_deref(), Some("child"));
}

#[test]
fn content_languages_and_classification() {
    let tmp = project();
    let base = BaseFs::load(tmp.path()).unwrap();

    let all = records(Arc::new(base.source().content()), "content");
    let tagged: Vec<(&str, &str, ContentClass)> = all
        .iter()
        .filter(|r| !r.is_dir)
        .map(|r| (r.path.as_str(), r.lang.as_str(), r.class))
        .collect();
    assert_eq!(
        tagged,
        vec![
            ("_index.md", "en", ContentClass::Branch),
            ("_index.md", "de", ContentClass::Branch),
            ("posts/first/cover.jpg", "en", ContentClass::File),
            ("posts/first/index.md", "en", ContentClass::Leaf),
            ("posts/second.md", "en", ContentClass::Content),
            ("posts/second.md", "de", ContentClass::Content),
        ]
    );

    let de = base.source().content_for("de");
    assert_eq!(read(&de, "content/posts/second.md"), "zweite");
    assert_eq!(read(&de, "content/posts/first/index.md"), "first");
}

#[test]
fn filtered_theme_mount() {
    let tmp = project();
    let base = BaseFs::load(tmp.path()).unwrap();
    let fs: Arc<dyn Filesystem> = Arc::new(base.source().static_for("en"));

    assert_eq!(file_paths(&records(fs.clone(), "static")), vec!["lib/lib.js"]);
    assert!(fs.stat(Path::new("static/lib/lib.js.map")).unwrap_err().is_excluded());
    assert!(fs.stat(Path::new("static/lib/src/lib.ts")).unwrap_err().is_excluded());
    assert!(fs.stat(Path::new("static/lib/missing.js")).unwrap_err().is_not_found());
}

#[test]
fn rebuilds_are_reproducible() {
    let tmp = project();
    let first = BaseFs::load(tmp.path()).unwrap();
    let second = BaseFs::load(tmp.path()).unwrap();

    for lang in ["en", "de"] {
        let a = records(Arc::new(first.source().content_for(lang)), "content");
        let b = records(Arc::new(second.source().content_for(lang)), "content");
        assert_eq!(a, b);
        assert_eq!(fingerprint(&a), fingerprint(&b));
    }
}

#[test]
fn glob_over_composed_content() {
    let tmp = project();
    let base = BaseFs::load(tmp.path()).unwrap();
    let content: Arc<dyn Filesystem> = Arc::new(base.source().content_for("en"));

    let mut found = Vec::new();
    glob_files(content, base.globs(), "content/posts/**/*.MD", |info| {
        found.push(info.meta().path().to_string());
        Ok(false)
    })
    .unwrap();
    assert_eq!(found, vec!["content/posts/first/index.md", "content/posts/second.md"]);
}

#[test]
fn mapped_os_tree_walks_in_order() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        &[("e/f/test.txt", "b"), ("c/d/test.txt", "a"), ("a/b/test.txt", "c")],
    );
    let root = tmp.path();
    let fs = RootMappingFs::new(
        Arc::new(OsFs::new()),
        vec![
            RootMapping::new("static/b", root.join("e/f")),
            RootMapping::new("static/a", root.join("c/d")),
            RootMapping::new("static/c", root.join("a/b")),
        ],
        &GlobCache::new(),
    )
    .unwrap();
    let walked = records(Arc::new(fs), "static");
    assert_eq!(
        file_paths(&walked),
        vec!["a/test.txt", "b/test.txt", "c/test.txt"]
    );
}

#[cfg(unix)]
#[test]
fn content_symlink_cycle_terminates() {
    let tmp = project();
    std::os::unix::fs::symlink(
        tmp.path().join("content/en/posts"),
        tmp.path().join("content/en/posts/loop"),
    )
    .unwrap();
    let base = BaseFs::load(tmp.path()).unwrap();

    let walked = records(Arc::new(base.source().content_for("en")), "content");
    let looped: Vec<&WalkRecord> = walked.iter().filter(|r| r.path.contains("loop")).collect();
    assert_eq!(looped.len(), 1);
    assert_eq!(looped[0].path, "posts/loop");
    assert!(looped[0].is_dir);
}
