//! Content entities and the values derived from them.
//!
//! Entities are produced by Phase-1 jobs, kept in slug-keyed stores, and
//! serialized into template contexts and the search index.

use crate::error::BuildError;
use crate::frontmatter;
use crate::store::Entity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

/// A markdown source read for one run.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub path: PathBuf,
    pub text: String,
    /// Whether the change detector reported the file as changed.
    pub changed: bool,
}

impl SourceDocument {
    pub fn read(path: &Path, changed: bool) -> Result<Self, BuildError> {
        let text = std::fs::read_to_string(path).map_err(BuildError::io(path))?;
        Ok(Self {
            path: path.to_path_buf(),
            text,
            changed,
        })
    }
}

/// Frontmatter of an article source. Fields are optional here so that
/// [`validate`](Self::validate) can report what is missing.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ArticleFrontmatter {
    pub title: Option<String>,
    pub published_at: Option<toml::value::Datetime>,
    /// A sentence or two of markdown introducing the article.
    pub hook: String,
    pub image: Option<String>,
    pub youtube: Option<String>,
    pub tags: Vec<String>,
    /// Credits for content used in the article, as HTML.
    pub attributions: String,
}

impl ArticleFrontmatter {
    /// Check required fields and return the title and publish time.
    pub fn validate(&self, path: &Path) -> Result<(String, DateTime<Utc>), BuildError> {
        let title = match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => return Err(BuildError::validation(path, "missing required field `title`")),
        };
        let published_at = match &self.published_at {
            Some(dt) => frontmatter::to_utc(dt)
                .map_err(|e| BuildError::validation(path, format!("`published_at`: {e}")))?,
            None => {
                return Err(BuildError::validation(
                    path,
                    "missing required field `published_at`",
                ));
            }
        };
        Ok((title, published_at))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PageFrontmatter {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl PageFrontmatter {
    /// Check required fields and return the title and description.
    pub fn validate(&self, path: &Path) -> Result<(String, String), BuildError> {
        let title = required(path, "title", self.title.as_deref())?;
        let description = required(path, "description", self.description.as_deref())?;
        Ok((title, description))
    }
}

fn required(path: &Path, field: &str, value: Option<&str>) -> Result<String, BuildError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(BuildError::validation(
            path,
            format!("missing required field `{field}`"),
        )),
    }
}

/// A dated, tagged post rendered to `/<slug>/`.
#[derive(Debug, Clone, Serialize)]
pub struct Article {
    pub slug: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    /// Rendered hook, paragraph tags stripped.
    pub hook: String,
    /// Site-absolute path of the header image.
    pub image: Option<String>,
    pub youtube: Option<String>,
    pub youtube_embed: Option<String>,
    /// Sorted alphabetically.
    pub tags: Vec<String>,
    /// One entry per tag, for linking to tag pages.
    pub tag_counts: Vec<TagCount>,
    pub attributions: String,
    /// Rendered HTML without the footnote section.
    pub content: String,
    pub footnotes: String,
    pub toc: String,
    /// Plain text for the search index: hook followed by body.
    pub body: String,
    /// Site-absolute directory the article's images are served from.
    pub img_dir: String,
    #[serde(skip)]
    pub source: PathBuf,
}

impl Entity for Article {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn source(&self) -> &Path {
        &self.source
    }
}

/// Newest first; ties broken by slug so output is stable.
pub fn newest_first(a: &Article, b: &Article) -> Ordering {
    b.published_at
        .cmp(&a.published_at)
        .then_with(|| a.slug.cmp(&b.slug))
}

/// A standalone page rendered to `/<slug>/`.
#[derive(Debug, Clone, Serialize)]
pub struct Page {
    pub slug: String,
    pub title: String,
    pub description: String,
    pub content: String,
    pub body: String,
    pub img_dir: String,
    #[serde(skip)]
    pub source: PathBuf,
}

impl Entity for Page {
    fn slug(&self) -> &str {
        &self.slug
    }

    fn source(&self) -> &Path {
        &self.source
    }
}

pub fn by_slug(a: &Page, b: &Page) -> Ordering {
    a.slug.cmp(&b.slug)
}

/// A tag with the number of articles carrying it and its URL form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
    pub url_tag: String,
}

/// One search index record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexEntry {
    pub href: String,
    pub title: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub img: String,
}
