//! Slugs and URL-safe names.
//!
//! A source file's slug is its basename without extension; it doubles as the
//! output directory name and as the dedup key of its collection:
//!
//! - `content/articles/2024/hello-world.md` → `hello-world`
//! - `content/pages/about.md` → `about`
//!
//! Tags get a separate URL form: lowercased, with every run of whitespace or
//! non-word characters collapsed to a single dash.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static NON_WORD_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\W-]+").expect("valid regex"));

/// Slug for a source file: basename with the extension stripped.
pub fn extract_slug(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// URL-safe form of a tag.
///
/// - `"Rust"` → `"rust"`
/// - `"Web Dev"` → `"web-dev"`
/// - `"C++ & Go!"` → `"c-go"`
pub fn tag_to_url(tag: &str) -> String {
    let lower = tag.to_lowercase();
    NON_WORD_RUN
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}

/// Embed URL for a YouTube link: everything after the last `/`.
pub fn youtube_embed_link(link: &str) -> String {
    let id = link.rsplit('/').next().unwrap_or(link);
    format!("https://www.youtube.com/embed/{id}")
}

/// Site-absolute directory a document's media is served from.
///
/// The first `collection` component of the source's directory (relative to
/// the site root) is swapped for `images`:
///
/// - `content/articles/2024` + `articles` → `/content/images/2024/`
/// - `content/pages` + `pages` → `/content/images/`
pub fn img_dir(relative_dir: &Path, collection: &str) -> String {
    let mut swapped = false;
    let parts: Vec<String> = relative_dir
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
            _ => None,
        })
        .map(|name| {
            if !swapped && name == collection {
                swapped = true;
                "images".to_string()
            } else {
                name
            }
        })
        .collect();
    if parts.is_empty() {
        return "/".to_string();
    }
    format!("/{}/", parts.join("/"))
}

/// Join a site-absolute directory and a relative file reference.
///
/// `("/content/images/post/", "./img.png")` → `/content/images/post/img.png`
pub fn join_url(dir: &str, file: &str) -> String {
    let file = file.trim_start_matches("./");
    if dir.is_empty() {
        return file.to_string();
    }
    format!("{}/{}", dir.trim_end_matches('/'), file)
}
