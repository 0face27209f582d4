//! Table of contents from anchored headers in rendered HTML.

use regex::Regex;
use std::sync::LazyLock;

static ANCHORED_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r##"<h([2-6]) id="([^"]*)" class="link"><a href="#[^"]*">(.*?)</a></h[2-6]>"##)
        .expect("valid regex")
});

/// Nested `<ol>` of links to every anchored header, or an empty string when
/// the document has none.
///
/// A header deeper than its predecessor opens a nested list; a shallower one
/// closes lists back to its level. Headers shallower than the first one are
/// treated as its siblings.
pub fn render_toc(html: &str) -> String {
    let mut out = String::new();
    let mut levels: Vec<u8> = Vec::new();

    for caps in ANCHORED_HEADER.captures_iter(html) {
        let level = caps[1].parse::<u8>().unwrap_or(2);
        let link = format!("<a href=\"#{}\">{}</a>", &caps[2], &caps[3]);

        match levels.last() {
            None => {
                out.push_str("<ol><li>");
                levels.push(level);
            }
            Some(&top) if level > top => {
                out.push_str("<ol><li>");
                levels.push(level);
            }
            Some(_) => {
                while levels.len() > 1 && levels.last().is_some_and(|&top| level < top) {
                    out.push_str("</li></ol>");
                    levels.pop();
                }
                out.push_str("</li><li>");
            }
        }
        out.push_str(&link);
    }

    for _ in &levels {
        out.push_str("</li></ol>");
    }
    out
}
