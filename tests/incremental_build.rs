//! End-to-end builds of the fixture site through the public API.
//!
//! Each test copies `fixtures/site/` into a temp directory, builds it, edits
//! sources, and builds again with the same context, the way the `loop`
//! command does.
//!
//! Run with: cargo test --test incremental_build

use inkpress::build::{BuildContext, RunError};
use inkpress::config::{ConfigOverrides, load_config};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

// =========================================================================
// Helpers
// =========================================================================

fn setup_site() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/site");
    copy_dir(&fixtures, tmp.path());
    tmp
}

fn copy_dir(src: &Path, dst: &Path) {
    for entry in fs::read_dir(src).unwrap() {
        let entry = entry.unwrap();
        let to = dst.join(entry.file_name());
        if entry.path().is_dir() {
            fs::create_dir_all(&to).unwrap();
            copy_dir(&entry.path(), &to);
        } else {
            fs::copy(entry.path(), &to).unwrap();
        }
    }
}

/// Context configured from the fixture's own `site.toml`.
fn context(root: &Path) -> BuildContext {
    context_with(root, &ConfigOverrides::default())
}

fn context_with(root: &Path, overrides: &ConfigOverrides) -> BuildContext {
    let config = load_config(root, overrides).unwrap();
    BuildContext::new(root, config).unwrap()
}

fn edit(root: &Path, rel: &str, from: &str, to: &str) {
    let path = root.join(rel);
    let text = fs::read_to_string(&path).unwrap();
    assert!(text.contains(from), "{rel} does not contain {from:?}");
    fs::write(&path, text.replacen(from, to, 1)).unwrap();
}

fn write(root: &Path, rel: &str, text: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, text).unwrap();
}

fn output(ctx: &BuildContext, rel: &str) -> String {
    let path = ctx.target_dir().join(rel);
    fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display()))
}

fn index_json(ctx: &BuildContext) -> serde_json::Value {
    serde_json::from_str(&output(ctx, "content/index.json")).unwrap()
}

// =========================================================================
// Full builds
// =========================================================================

#[test]
fn site_toml_settings_reach_templates() {
    let site = setup_site();
    let ctx = context(site.path());
    ctx.run().unwrap();

    let about = output(&ctx, "about/index.html");
    assert!(about.contains("<title>About | Fixture</title>"));
    assert!(about.contains(r#"<meta name="description" content="About this site">"#));
}

#[test]
fn home_ranks_tags_by_count() {
    let site = setup_site();
    let ctx = context(site.path());
    ctx.run().unwrap();

    // rust: 3, "Web Dev": 1, meta: 1; ties sort by name, uppercase first
    let home = output(&ctx, "index.html");
    assert!(home.contains(r#"<a class="top" href="/tags/rust/">rust (3)</a>"#));
    assert!(home.contains(r#"<a class="top" href="/tags/web-dev/">Web Dev (1)</a>"#));
    assert!(home.contains(r#"<a class="more" href="/tags/meta/">meta (1)</a>"#));
}

#[test]
fn home_lists_articles_newest_first() {
    let site = setup_site();
    let ctx = context(site.path());
    ctx.run().unwrap();

    let home = output(&ctx, "index.html");
    let second = home.find("/second-post/").unwrap();
    let hello = home.find("/hello-world/").unwrap();
    let third = home.find("/third/").unwrap();
    assert!(second < hello && hello < third);
}

#[test]
fn markdown_features_render() {
    let site = setup_site();
    let ctx = context(site.path());
    ctx.run().unwrap();

    let hello = output(&ctx, "hello-world/index.html");
    assert!(hello.contains(r#"<p class="hook">The <em>first</em> post on this site.</p>"#));
    assert!(hello.contains(r#"<img class="cover" src="/content/images/2024/cat.png""#));
    assert!(hello.contains(r#"<figcaption>A cat, for scale</figcaption>"#));
    assert!(hello.contains(r##"<a href="#next-steps">Next Steps</a>"##));
    assert!(hello.contains(r##"<a href="#footnote-1">1</a>"##));

    let second = output(&ctx, "second-post/index.html");
    assert!(second.contains("This site lives at http://localhost:5002."));
    assert!(second.contains("<table>"));
    assert!(second.contains(r#"<a href="https://www.rust-lang.org" target="_blank">"#));

    let third = output(&ctx, "third/index.html");
    assert!(third.contains("https://www.youtube.com/embed/dQw4w9WgXcQ"));
    assert!(third.contains(r#"Video by <a href="https://example.com">someone</a>."#));
}

#[test]
fn tag_pages_list_their_articles() {
    let site = setup_site();
    let ctx = context(site.path());
    ctx.run().unwrap();

    let web_dev = output(&ctx, "tags/web-dev/index.html");
    assert!(web_dev.contains("Tagged Web Dev"));
    assert!(web_dev.contains("/second-post/"));
    assert!(!web_dev.contains("/third/"));

    let all = output(&ctx, "tags/index.html");
    assert!(all.contains(r#"<a href="/tags/rust/">rust</a> <span>3</span>"#));
}

#[test]
fn search_index_covers_articles_and_pages() {
    let site = setup_site();
    let ctx = context(site.path());
    ctx.run().unwrap();

    let index = index_json(&ctx);
    let entries = index.as_object().unwrap();
    assert_eq!(entries.len(), 4);

    let hello = &index["hello-world"];
    assert_eq!(hello["href"], "hello-world");
    assert_eq!(hello["title"], "Hello, World");
    assert_eq!(hello["tags"], serde_json::json!(["meta", "rust"]));
    assert_eq!(hello["img"], "/content/images/2024/cat.png");
    let summary = hello["summary"].as_str().unwrap();
    assert!(summary.starts_with("The first post on this site. Welcome to the site."));

    assert_eq!(index["about"]["tags"], serde_json::json!([]));
    assert_eq!(index["about"]["img"], "");

    let staged = fs::read_to_string(ctx.temp_dir().join("index.json")).unwrap();
    assert_eq!(staged, output(&ctx, "content/index.json"));
}

#[cfg(unix)]
#[test]
fn stylesheets_and_scripts_are_linked() {
    let site = setup_site();
    let ctx = context(site.path());
    ctx.run().unwrap();

    let link = ctx.target_dir().join("content/stylesheets");
    assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
    assert!(output(&ctx, "content/javascripts/search.js").contains("index.json"));

    // Linked, so edits show up without a rebuild
    edit(site.path(), "web/stylesheets/site.css", "Georgia", "Palatino");
    assert!(output(&ctx, "content/stylesheets/site.css").contains("Palatino"));
}

#[test]
fn target_dir_override_moves_output() {
    let site = setup_site();
    let overrides = ConfigOverrides {
        target_dir: Some("dist".into()),
        ..ConfigOverrides::default()
    };
    let ctx = context_with(site.path(), &overrides);
    ctx.run().unwrap();

    assert!(site.path().join("dist/index.html").exists());
    assert!(!site.path().join("public").exists());
}

// =========================================================================
// Incremental rebuilds
// =========================================================================

#[test]
fn unchanged_site_rebuilds_nothing() {
    let site = setup_site();
    let ctx = context(site.path());
    let first = ctx.run().unwrap();
    assert_eq!(first.render.skipped, 0);

    let second = ctx.run().unwrap();
    assert!(second.rebuilt.is_empty(), "rebuilt: {:?}", second.rebuilt);
    assert_eq!(second.render.total(), first.render.total());
}

#[test]
fn editing_shared_partial_rebuilds_only_its_dependents() {
    let site = setup_site();
    let ctx = context(site.path());
    ctx.run().unwrap();

    edit(site.path(), "web/html/_card.tmpl.html", "<li class=\"card\">", "<li class=\"card new\">");
    let summary = ctx.run().unwrap();

    assert_eq!(
        summary.rebuilt,
        ["home", "tag: Web Dev", "tag: meta", "tag: rust"]
    );
    assert!(output(&ctx, "index.html").contains("card new"));
    assert!(output(&ctx, "tags/rust/index.html").contains("card new"));
}

#[test]
fn editing_layout_partial_rebuilds_every_page() {
    let site = setup_site();
    let ctx = context(site.path());
    ctx.run().unwrap();

    edit(site.path(), "web/html/_header.tmpl.html", "Tags</a>", "All tags</a>");
    let summary = ctx.run().unwrap();

    assert_eq!(summary.render.ran, 4);
    // home, tags, three tag pages, and the index of the re-rendered entities
    assert_eq!(summary.aggregate.ran, 6);
    assert!(output(&ctx, "about/index.html").contains("All tags"));
    assert!(output(&ctx, "tags/index.html").contains("All tags"));
}

#[test]
fn editing_article_template_leaves_pages_alone() {
    let site = setup_site();
    let ctx = context(site.path());
    ctx.run().unwrap();

    edit(site.path(), "web/html/article.tmpl.html", "<article>", "<article class=\"post\">");
    let summary = ctx.run().unwrap();

    assert_eq!(summary.render.ran, 3);
    assert!(!summary.rebuilt.contains(&"page: about.md".to_string()));
    assert!(output(&ctx, "third/index.html").contains(r#"<article class="post">"#));
}

#[test]
fn new_article_appears_everywhere() {
    let site = setup_site();
    let ctx = context(site.path());
    ctx.run().unwrap();

    write(
        site.path(),
        "content/articles/fresh.md",
        "+++\ntitle = \"Fresh\"\npublished_at = 2025-01-01T00:00:00Z\ntags = [\"zig\"]\n+++\nNew.\n",
    );
    let summary = ctx.run().unwrap();

    assert_eq!(summary.articles, 4);
    assert!(summary.rebuilt.contains(&"article: fresh.md".to_string()));
    assert!(summary.rebuilt.contains(&"tag: zig".to_string()));
    assert!(output(&ctx, "index.html").contains("/fresh/"));
    assert!(output(&ctx, "tags/zig/index.html").contains("/fresh/"));
    assert_eq!(index_json(&ctx)["fresh"]["title"], "Fresh");
}

#[test]
fn page_slug_collision_keeps_page_in_index() {
    let site = setup_site();
    write(
        site.path(),
        "content/pages/second-post.md",
        "+++\ntitle = \"A Page\"\ndescription = \"Same slug\"\n+++\nPage body.\n",
    );
    let ctx = context(site.path());
    ctx.run().unwrap();

    let index = index_json(&ctx);
    assert_eq!(index.as_object().unwrap().len(), 4);
    assert_eq!(index["second-post"]["title"], "A Page");
    assert_eq!(index["second-post"]["tags"], serde_json::json!([]));
}

// =========================================================================
// Failures
// =========================================================================

#[test]
fn broken_partial_fails_aggregates_then_recovers() {
    let site = setup_site();
    let ctx = context(site.path());
    ctx.run().unwrap();

    edit(site.path(), "web/html/_card.tmpl.html", "{% endif %}", "");
    let Err(RunError::Phase(failure)) = ctx.run() else {
        panic!("expected aggregate failure");
    };
    assert_eq!(failure.phase, "aggregate");
    let jobs: Vec<&str> = failure.errors.iter().map(|e| e.job()).collect();
    assert_eq!(jobs, ["home", "tag: Web Dev", "tag: meta", "tag: rust"]);

    edit(site.path(), "web/html/_card.tmpl.html", "</p>", "</p>{% endif %}");
    let summary = ctx.run().unwrap();
    assert!(summary.rebuilt.contains(&"home".to_string()));
    assert!(summary.rebuilt.contains(&"tag: rust".to_string()));

    let again = ctx.run().unwrap();
    assert!(again.rebuilt.is_empty(), "rebuilt: {:?}", again.rebuilt);
}

#[test]
fn invalid_article_reports_every_bad_source() {
    let site = setup_site();
    write(site.path(), "content/articles/a.md", "+++\ntitle = \"A\"\n+++\n");
    write(site.path(), "content/articles/b.md", "+++\ntitle = \n+++\n");
    let ctx = context(site.path());

    let Err(RunError::Phase(failure)) = ctx.run() else {
        panic!("expected render failure");
    };
    assert_eq!(failure.phase, "render");
    let messages: Vec<String> = failure.errors.iter().map(|e| e.to_string()).collect();
    assert_eq!(messages.len(), 2);
    assert!(messages[0].starts_with("article: a.md: validation error"));
    assert!(messages[1].starts_with("article: b.md: parse error"));
    // Phase 2 never ran
    assert!(!ctx.target_dir().join("index.html").exists());
}

#[test]
fn check_does_not_write_output() {
    let site = setup_site();
    let ctx = context(site.path());
    let report = ctx.check().unwrap();
    assert_eq!(report.articles, 3);
    assert_eq!(report.pages, 1);
    assert!(!ctx.target_dir().exists());
}
