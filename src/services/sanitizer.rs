use html2text::render::TrivialDecorator;

use crate::error::{AppError, Result};

// Wide enough that ordinary paragraphs are never wrapped.
const TEXT_WIDTH: usize = 10_000;

/// Turns entry markup into plain text.
pub trait Sanitizer: Send + Sync {
    fn strip(&self, html: &str) -> Result<String>;
}

/// html2text based sanitizer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlSanitizer;

impl Sanitizer for HtmlSanitizer {
    fn strip(&self, html: &str) -> Result<String> {
        if html.is_empty() {
            return Ok(String::new());
        }

        // No emphasis marks, bullets, heading hashes or link footnotes.
        let text = html2text::from_read_with_decorator(
            html.as_bytes(),
            TEXT_WIDTH,
            TrivialDecorator::new(),
        )
        .map_err(|e| AppError::Sanitize(e.to_string()))?;

        let cleaned = text
            .lines()
            .map(str::trim_end)
            .collect::<Vec<_>>()
            .join("\n");

        Ok(cleaned.trim().to_string())
    }
}

/// Whitespace-collapsed plain text cut at a word boundary to at most
/// `length` characters. No omission marker is appended.
pub fn summary(text: &str, length: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= length {
        return collapsed;
    }

    let Some((cut, next)) = collapsed.char_indices().nth(length) else {
        return collapsed;
    };

    // The character right after the limit counts as a boundary too.
    let stop = collapsed[..cut + next.len_utf8()].rfind(' ').unwrap_or(cut);
    collapsed[..stop].trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_markup() {
        let text = HtmlSanitizer
            .strip("<div><p>Hello <b>world</b></p></div>")
            .unwrap();
        assert!(text.contains("Hello"));
        assert!(text.contains("world"));
        assert!(!text.contains('<'));
    }

    #[test]
    fn output_carries_no_markdown_decoration() {
        let text = HtmlSanitizer
            .strip("<b>bold</b> <em>em</em><ul><li>one</li></ul><h1>T</h1>")
            .unwrap();
        assert!(text.contains("bold em"));
        assert!(text.contains("one"));
        assert!(!text.contains(['*', '#', '[', ']']));
    }

    #[test]
    fn links_keep_their_text_and_drop_the_target() {
        let text = HtmlSanitizer
            .strip(r#"<p>Short note <a href="https://example.com/a/long/path">here</a></p>"#)
            .unwrap();
        assert_eq!(text, "Short note here");
    }

    #[test]
    fn empty_input_is_empty_text() {
        assert_eq!(HtmlSanitizer.strip("").unwrap(), "");
    }

    #[test]
    fn short_summary_is_unchanged() {
        assert_eq!(summary("  one\n two   three ", 256), "one two three");
    }

    #[test]
    fn summary_cuts_at_word_boundary() {
        assert_eq!(summary("alpha beta gamma", 12), "alpha beta");
        assert_eq!(summary("alpha beta gamma", 10), "alpha beta");
        assert_eq!(summary("alphabetagamma", 5), "alpha");
    }

    #[test]
    fn summary_counts_characters_not_bytes() {
        let text = "é".repeat(300);
        assert_eq!(summary(&text, 256).chars().count(), 256);
    }
}
