//! Plain text from markdown, for the search index.

use pulldown_cmark::{Event, Parser, TagEnd};

/// Text content of a markdown document, whitespace collapsed to single
/// spaces. Markup, raw HTML and link targets are dropped; link text and
/// code are kept. Typographic apostrophes and en dashes are folded to ASCII
/// so searches typed on a keyboard match.
pub fn strip_markdown(markdown: &str) -> String {
    let mut text = String::with_capacity(markdown.len());
    for event in Parser::new(markdown) {
        match event {
            Event::Text(t) | Event::Code(t) => text.push_str(&t),
            Event::SoftBreak | Event::HardBreak => text.push(' '),
            Event::End(
                TagEnd::Paragraph
                | TagEnd::Heading(_)
                | TagEnd::Item
                | TagEnd::CodeBlock
                | TagEnd::BlockQuote(_)
                | TagEnd::TableCell,
            ) => text.push(' '),
            _ => {}
        }
    }

    let text = text.replace('\u{2019}', "'").replace('\u{2013}', "-");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_markup() {
        assert_eq!(
            strip_markdown("## Title\n\nSome **bold** and [a link](https://x.y)."),
            "Title Some bold and a link."
        );
    }

    #[test]
    fn keeps_code_text() {
        assert_eq!(strip_markdown("Use `cargo run` now"), "Use cargo run now");
    }

    #[test]
    fn joins_lines_and_paragraphs_with_spaces() {
        assert_eq!(strip_markdown("one\ntwo\n\nthree"), "one two three");
    }

    #[test]
    fn folds_typography() {
        assert_eq!(strip_markdown("It\u{2019}s 1\u{2013}2"), "It's 1-2");
    }

    #[test]
    fn list_items_are_separated() {
        assert_eq!(strip_markdown("- a\n- b\n"), "a b");
    }

    #[test]
    fn empty_input() {
        assert_eq!(strip_markdown(""), "");
    }
}
