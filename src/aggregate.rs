//! Values derived from the complete article and page collections.
//!
//! Everything here is a pure function over snapshots taken after Phase 1:
//!
//! - [`tag_map`]: tag → articles carrying it
//! - [`tag_counts`]: one [`TagCount`] per tag, alphabetical
//! - [`top_tags`]: the `n` most used tags and the `m` after them
//! - [`search_index`]: slug → [`IndexEntry`] for client-side search

use crate::naming::tag_to_url;
use crate::types::{Article, IndexEntry, Page, TagCount};
use crate::log;
use serde::Serialize;
use std::collections::BTreeMap;

/// Group articles by tag. An article with `k` tags appears in `k` groups,
/// in the order of `articles`. Empty tags are ignored.
pub fn tag_map(articles: &[Article]) -> BTreeMap<String, Vec<Article>> {
    let mut map: BTreeMap<String, Vec<Article>> = BTreeMap::new();
    for article in articles {
        for tag in &article.tags {
            if tag.trim().is_empty() {
                continue;
            }
            map.entry(tag.clone()).or_default().push(article.clone());
        }
    }
    map
}

/// Count per tag, sorted alphabetically.
pub fn tag_counts(map: &BTreeMap<String, Vec<Article>>) -> Vec<TagCount> {
    map.iter()
        .map(|(tag, articles)| TagCount {
            tag: tag.clone(),
            count: articles.len(),
            url_tag: tag_to_url(tag),
        })
        .collect()
}

/// Rank by count (descending, ties alphabetical) and return the first `n`
/// and the `m` after them.
///
/// When `n` covers every tag the second slice is empty; when fewer than
/// `n + m` tags exist the second slice holds whatever remains.
pub fn top_tags(counts: &[TagCount], n: usize, m: usize) -> (Vec<TagCount>, Vec<TagCount>) {
    let mut ranked = counts.to_vec();
    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));

    if n >= ranked.len() {
        return (ranked, Vec::new());
    }
    let end = (n + m).min(ranked.len());
    let next = ranked[n..end].to_vec();
    ranked.truncate(n);
    (ranked, next)
}

/// Search records keyed by slug. Articles are entered first, then pages, so
/// a page wins a slug collision. Each collision is logged.
pub fn search_index(articles: &[Article], pages: &[Page]) -> BTreeMap<String, IndexEntry> {
    let mut entries = BTreeMap::new();
    for a in articles {
        entries.insert(
            a.slug.clone(),
            IndexEntry {
                href: a.slug.clone(),
                title: a.title.clone(),
                summary: a.body.clone(),
                tags: a.tags.clone(),
                img: a.image.clone().unwrap_or_default(),
            },
        );
    }
    for p in pages {
        let previous = entries.insert(
            p.slug.clone(),
            IndexEntry {
                href: p.slug.clone(),
                title: p.title.clone(),
                summary: p.body.clone(),
                tags: Vec::new(),
                img: String::new(),
            },
        );
        if previous.is_some() {
            log!("warn"; "search index: page `{}` replaces an article with the same slug", p.slug);
        }
    }
    entries
}

/// Pretty JSON with a one-space indent.
pub fn to_index_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b" ");
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    value.serialize(&mut ser)?;
    out.push(b'\n');
    Ok(out)
}
