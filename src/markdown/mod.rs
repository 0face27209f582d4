//! Markdown to HTML, with the site's extensions.
//!
//! [`render`] runs a fixed sequence of stateless transforms:
//!
//! 1. Template substitution, only when the text contains `{{` or `{%`
//! 2. Anchored headers, PDF embeds, image figures, download links
//!    ([`filters`])
//! 3. Markdown rendering (CommonMark with tables and strikethrough)
//! 4. Footnotes and `target="_blank"` on absolute links
//!
//! The helpers around it derive the rest of an entity from the same source:
//! a table of contents ([`toc`]), a plain-text body for search ([`strip`]),
//! and the inline form of a short hook.

pub mod filters;
pub mod strip;
pub mod toc;

pub use filters::{collapse_html, collapse_paragraphs, slugify};
pub use strip::strip_markdown;
pub use toc::render_toc;

use pulldown_cmark::{Options, Parser, html};

/// Per-document inputs to the transform pipeline.
#[derive(Default)]
pub struct RenderOptions<'a> {
    /// Values available to template expressions embedded in the markdown.
    pub template_data: Option<&'a tera::Context>,
    /// Site-absolute directory that relative image and file paths resolve
    /// against. Empty leaves paths as written.
    pub img_dir: &'a str,
}

/// Render markdown to HTML. Only the template step can fail.
pub fn render(source: &str, options: &RenderOptions) -> Result<String, tera::Error> {
    let source = substitute_templates(source, options.template_data)?;
    let source = filters::headers(&source);
    let source = filters::pdfs(&source, options.img_dir);
    let source = filters::images(&source, options.img_dir);
    let source = filters::files(&source, options.img_dir);
    let html = markdown_to_html(&source);
    let html = filters::footnotes(&html);
    Ok(filters::links_to_target_blank(&html))
}

/// Render a short markdown snippet for inline use (article hooks).
pub fn render_inline(source: &str) -> Result<String, tera::Error> {
    let html = render(source, &RenderOptions::default())?;
    Ok(collapse_paragraphs(&html))
}

/// Split rendered HTML into body and footnote section contents. The second
/// part is empty when the document has no footnotes.
pub fn split_footnotes(html: &str) -> (String, String) {
    match html.split_once("<div class=\"footnotes\">") {
        Some((body, notes)) => {
            let notes = match notes.rfind("</div>") {
                Some(end) => &notes[..end],
                None => notes,
            };
            (body.to_string(), notes.trim().to_string())
        }
        None => (html.to_string(), String::new()),
    }
}

fn substitute_templates(
    source: &str,
    data: Option<&tera::Context>,
) -> Result<String, tera::Error> {
    if !source.contains("{{") && !source.contains("{%") {
        return Ok(source.to_string());
    }
    let empty = tera::Context::new();
    tera::Tera::one_off(source, data.unwrap_or(&empty), false)
}

fn markdown_to_html(source: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let parser = Parser::new_ext(source, options);
    let mut out = String::with_capacity(source.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
