//! Regex rewrites applied before and after markdown rendering.
//!
//! Pre-render filters turn a few shorthand forms into HTML that the
//! markdown renderer passes through untouched:
//!
//! | Source | Becomes |
//! |--------|---------|
//! | `## Title` (level 2+) | `<h2 id="title" class="link"><a href="#title">Title</a></h2>` |
//! | `![](doc.pdf)` + optional `*caption*` line | `<iframe>` embed |
//! | `![](img.png)` + optional `*caption*` line | lightbox figure |
//! | `[Name](./file.zip)` | download link |
//!
//! Post-render filters rework the generated HTML: trailing `[n] text`
//! paragraphs become a footnote section with back-references, and absolute
//! links open in a new tab.
//!
//! Relative paths in figures, embeds and downloads are resolved against the
//! document's image directory.

use crate::naming::join_url;
use regex::{Captures, Regex};
use std::sync::LazyLock;

static WHITESPACE_BETWEEN_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("valid regex"));
static HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^(#{2,})\s+(.*?)$").expect("valid regex"));
static SLUG_STRIP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s-]").expect("valid regex"));
static PDF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!\[\]\((.*)\.pdf\))(\n\*(.*)\*)?").expect("valid regex"));
static FIGURE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(!\[\]\((.*)\))(\n\*(.*)\*)?").expect("valid regex"));
static FILE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(.*)\]\(\./(.*)\)").expect("valid regex"));
static FOOTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?ms)^<p>\[\d+\].*").expect("valid regex"));
static FOOTNOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[(\d+)\](\s+.*)").expect("valid regex"));
static ABSOLUTE_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<a href="http[^"]+""#).expect("valid regex"));

/// Remove newlines and inter-tag whitespace from an HTML snippet.
pub fn collapse_html(html: &str) -> String {
    let html = html.replace('\n', "");
    WHITESPACE_BETWEEN_TAGS
        .replace_all(&html, "><")
        .trim()
        .to_string()
}

/// Strip `<p>` wrappers from rendered markdown so it can sit inline.
/// Paragraph tags with attributes are left alone.
pub fn collapse_paragraphs(html: &str) -> String {
    collapse_html(&html.replace("<p>", "").replace("</p>", ""))
}

/// Anchor id for a header title.
///
/// `"Why Rust? (Part 2)"` → `"why-rust-part-2"`
pub fn slugify(title: &str) -> String {
    let lower = title.to_lowercase();
    SLUG_STRIP
        .replace_all(&lower, "")
        .trim()
        .replace(' ', "-")
        .replace("--", "-")
}

/// Level 2+ markdown headers become linkable anchored headers. Level 1 is
/// left alone so `#` comments in unfenced code survive. The trailing newline
/// ends the HTML block so the following line is rendered as markdown again.
pub fn headers(source: &str) -> String {
    HEADER
        .replace_all(source, |caps: &Captures| {
            let level = caps[1].len();
            let title = &caps[2];
            let id = slugify(title);
            let html = collapse_html(&format!(
                "\n<h{level} id=\"{id}\" class=\"link\">\n\t<a href=\"#{id}\">{title}</a>\n</h{level}>\n"
            ));
            format!("{html}\n")
        })
        .into_owned()
}

pub fn pdfs(source: &str, img_dir: &str) -> String {
    PDF.replace_all(source, |caps: &Captures| {
        let Some(figure) = FIGURE.captures(&caps[0]) else {
            return caps[0].to_string();
        };
        let pdf = join_url(img_dir, &figure[2]);
        match figure.get(4) {
            Some(caption) => format!(
                "\n<iframe width=\"100%\" height=\"800\" src=\"{pdf}\">\n</iframe>\n<figcaption class=\"text-center\">{}</figcaption>\n",
                caption.as_str()
            ),
            None => format!("\n<iframe width=\"100%\" height=\"800\" src=\"{pdf}\">\n</iframe>\n"),
        }
    })
    .into_owned()
}

pub fn images(source: &str, img_dir: &str) -> String {
    FIGURE
        .replace_all(source, |caps: &Captures| {
            let img = join_url(img_dir, &caps[2]);
            match caps.get(4) {
                Some(caption) => {
                    let caption = caption.as_str();
                    format!(
                        "\n<figure class=\"text-center\">\n  <a data-fancybox=\"gallery\" href=\"{img}\" data-caption=\"{caption}\">\n    <img src=\"{img}\" />\n  </a>\n  <figcaption>{caption}</figcaption>\n</figure>\n"
                    )
                }
                None => format!(
                    "\n<a data-fancybox=\"gallery\" href=\"{img}\">\n  <img src=\"{img}\" />\n</a>\n"
                ),
            }
        })
        .into_owned()
}

/// `[Name](./file)` becomes a download link into the image directory.
pub fn files(source: &str, img_dir: &str) -> String {
    FILE_LINK
        .replace_all(source, |caps: &Captures| {
            let file = join_url(img_dir, &caps[2]);
            format!("\n<a href=\"{file}\" download>{}</a>\n", &caps[1])
        })
        .into_owned()
}

/// Turn trailing `[n] text` paragraphs into a footnote section and link
/// every ` [n]` reference in the body to its note.
///
/// References need a leading space so that things like `KEYS[1]` in prose
/// are not mistaken for one.
pub fn footnotes(source: &str) -> String {
    let Some(footer) = FOOTER.find(source) else {
        return source.to_string();
    };
    let mut body = source[..footer.start()].to_string();
    body.push_str(&source[footer.end()..]);

    let notes = FOOTNOTE.replace_all(footer.as_str(), |caps: &Captures| {
        let n = &caps[1];
        let reference = collapse_html(&format!(
            "\n<sup id=\"footnote-{n}-source\">\n  <a href=\"#footnote-{n}\">{n}</a>\n</sup>\n"
        ));
        body = body.replace(&format!(" [{n}]"), &format!(" {reference}"));

        let anchor = format!(
            "\n<sup id=\"footnote-{n}\">\n  <a href=\"#footnote-{n}-source\">{n}</a>\n</sup>\n{}",
            &caps[2]
        );
        collapse_html(&anchor)
    });

    body.push_str(&format!("\n<div class=\"footnotes\">\n  {notes}\n</div>\n"));
    body
}

/// Absolute links open in a new tab.
pub fn links_to_target_blank(source: &str) -> String {
    ABSOLUTE_LINK
        .replace_all(source, |caps: &Captures| format!("{} target=\"_blank\"", &caps[0]))
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_html_removes_inter_tag_whitespace() {
        assert_eq!(
            collapse_html("\n<div>\n  <p>hi</p>\n</div>\n"),
            "<div><p>hi</p></div>"
        );
    }

    #[test]
    fn collapse_paragraphs_strips_p_tags() {
        assert_eq!(collapse_paragraphs("<p>Hello <em>there</em></p>\n"), "Hello <em>there</em>");
    }

    #[test]
    fn slugify_examples() {
        assert_eq!(slugify("Hello World"), "hello-world");
        assert_eq!(slugify("Why Rust? (Part 2)"), "why-rust-part-2");
        assert_eq!(slugify("  padded  "), "padded");
        assert_eq!(slugify("Hello, World!"), "hello-world");
    }

    #[test]
    fn headers_become_anchors() {
        assert_eq!(
            headers("## Getting Started"),
            "<h2 id=\"getting-started\" class=\"link\"><a href=\"#getting-started\">Getting Started</a></h2>\n"
        );
    }

    #[test]
    fn level_one_headers_are_untouched() {
        assert_eq!(headers("# Title\n"), "# Title\n");
    }

    #[test]
    fn deeper_headers_keep_level() {
        assert!(headers("#### Deep").starts_with("<h4 id=\"deep\""));
    }

    #[test]
    fn image_without_caption() {
        let out = images("![](./cat.png)", "/content/images/2024/");
        assert_eq!(
            collapse_html(&out),
            r#"<a data-fancybox="gallery" href="/content/images/2024/cat.png"><img src="/content/images/2024/cat.png" /></a>"#
        );
    }

    #[test]
    fn image_with_caption() {
        let out = images("![](cat.png)\n*A cat*", "/content/images/");
        let out = collapse_html(&out);
        assert!(out.starts_with(r#"<figure class="text-center">"#));
        assert!(out.contains(r#"data-caption="A cat""#));
        assert!(out.contains("<figcaption>A cat</figcaption>"));
    }

    #[test]
    fn image_without_img_dir_keeps_path() {
        let out = images("![](cat.png)", "");
        assert!(out.contains(r#"href="cat.png""#));
    }

    #[test]
    fn pdf_becomes_iframe() {
        let out = pdfs("![](./paper.pdf)\n*The paper*", "/content/images/");
        assert!(out.contains(r#"<iframe width="100%" height="800" src="/content/images/paper.pdf">"#));
        assert!(out.contains(r#"<figcaption class="text-center">The paper</figcaption>"#));
    }

    #[test]
    fn pdf_then_images_leaves_iframe_alone() {
        let out = images(&pdfs("![](doc.pdf)", "/d/"), "/d/");
        assert!(out.contains("<iframe"));
        assert!(!out.contains("fancybox"));
    }

    #[test]
    fn relative_file_becomes_download() {
        let out = files("Grab [the code](./code.zip) here", "/content/images/post/");
        assert!(out.contains(r#"<a href="/content/images/post/code.zip" download>the code</a>"#));
    }

    #[test]
    fn absolute_link_is_not_a_download() {
        assert_eq!(files("[x](https://a.b)", "/d/"), "[x](https://a.b)");
    }

    #[test]
    fn footnotes_link_references_and_wrap_footer() {
        let html = "<p>Claim one [1] and two [2].</p>\n<p>[1] First note.</p>\n<p>[2] Second note.</p>\n";
        let out = footnotes(html);

        assert!(out.contains(
            r##"Claim one <sup id="footnote-1-source"><a href="#footnote-1">1</a></sup> and"##
        ));
        assert!(out.contains(r#"<sup id="footnote-2-source">"#));
        assert!(out.contains(r#"<div class="footnotes">"#));
        assert!(out.contains(
            r##"<sup id="footnote-1"><a href="#footnote-1-source">1</a></sup> First note.</p>"##
        ));
    }

    #[test]
    fn footnote_references_need_leading_space() {
        let html = "<p>KEYS[1] stays.</p>\n<p>[1] note</p>";
        let out = footnotes(html);
        assert!(out.contains("KEYS[1] stays."));
    }

    #[test]
    fn no_footer_is_passthrough() {
        let html = "<p>Nothing [1] here.</p>";
        assert_eq!(footnotes(html), html);
    }

    #[test]
    fn absolute_links_get_target_blank() {
        assert_eq!(
            links_to_target_blank(r#"<a href="https://rust-lang.org">Rust</a> <a href="/about">About</a>"#),
            r#"<a href="https://rust-lang.org" target="_blank">Rust</a> <a href="/about">About</a>"#
        );
    }
}
