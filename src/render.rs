//! Template rendering.
//!
//! Each render builds a Tera instance holding exactly the template and its
//! inclusion closure, taken from the [`DependencyRegistry`] cache. Templates
//! are therefore read from disk at most once per run, and a render can only
//! see templates the registry knows it depends on.
//!
//! Every template gets the site-wide locals from [`site_context`]:
//!
//! | Name | Value |
//! |------|-------|
//! | `absolute_url` | configured site URL, no trailing slash |
//! | `fav_icon` | `/content/images/favicon.png` |
//! | `site_env` | `development` or `production` |
//! | `title_suffix` | appended to page titles |
//! | `live_reload` | whether to include the reload script |
//!
//! The date filters from [`template_helpers`] are registered on every
//! instance.
//!
//! Files with an `.html` extension are autoescaped; insert pre-rendered
//! HTML with `{{ article.content | safe }}`.

use crate::config::SiteConfig;
use crate::deps::{DependencyRegistry, template_name};
use crate::error::{BuildError, error_chain};
use crate::template_helpers;
use std::fs;
use std::path::Path;
use tera::{Context, Tera};

pub const FAV_ICON: &str = "/content/images/favicon.png";

/// Locals shared by every template.
pub fn site_context(config: &SiteConfig, live_reload: bool) -> Context {
    let mut ctx = Context::new();
    ctx.insert("absolute_url", config.base_url());
    ctx.insert("fav_icon", FAV_ICON);
    ctx.insert("site_env", config.env.as_str());
    ctx.insert("title_suffix", &config.title_suffix);
    ctx.insert("live_reload", &live_reload);
    ctx
}

/// Render `template` with `ctx` and return the output.
pub fn render_template(
    registry: &DependencyRegistry,
    template: &Path,
    ctx: &Context,
) -> Result<String, BuildError> {
    let path = registry.path_of(template);
    let sources = registry.sources(template)?;

    let mut tera = Tera::default();
    template_helpers::register(&mut tera);
    tera.add_raw_templates(
        sources
            .iter()
            .map(|t| (template_name(&t.name), t.source.as_str())),
    )
    .map_err(|e| BuildError::parse(&path, error_chain(&e)))?;

    tera.render(&template_name(template), ctx)
        .map_err(|e| BuildError::render(&path, error_chain(&e)))
}

/// Render `template` into `<dir>/index.html`.
pub fn render_to_dir(
    registry: &DependencyRegistry,
    template: &Path,
    ctx: &Context,
    dir: &Path,
) -> Result<(), BuildError> {
    let html = render_template(registry, template, ctx)?;
    write_file(&dir.join("index.html"), html.as_bytes())
}

/// Write a file, creating parent directories as needed.
pub fn write_file(path: &Path, contents: &[u8]) -> Result<(), BuildError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(BuildError::io(parent))?;
    }
    fs::write(path, contents).map_err(BuildError::io(path))
}
