//! Text cleaning and sanitization for TTS processing.
//!
//! Applied to each chunk right before it is sent for synthesis; chunk payloads
//! themselves stay exact slices of the book.

use once_cell::sync::Lazy;
use regex::Regex;

/// Characters that can cause TTS issues and their replacements.
const PROBLEMATIC_CHARS: &[(char, &str)] = &[
    ('\u{2018}', "'"),   // Left single quote
    ('\u{2019}', "'"),   // Right single quote
    ('\u{201c}', "\""),  // Left double quote
    ('\u{201d}', "\""),  // Right double quote
    ('\u{201e}', "\""),  // Low double quote
    ('\u{2013}', "-"),   // En dash
    ('\u{2014}', "-"),   // Em dash
    ('\u{2026}', "..."), // Ellipsis
    ('\u{00a0}', " "),   // Non-breaking space
    ('\u{202f}', " "),   // Narrow non-breaking space
    ('\u{200b}', ""),    // Zero-width space
    ('\u{200c}', ""),    // Zero-width non-joiner
    ('\u{200d}', ""),    // Zero-width joiner
    ('\u{00ad}', ""),    // Soft hyphen
    ('\u{feff}', ""),    // BOM
    ('\u{2011}', "-"),   // Non-breaking hyphen
    ('\u{2012}', "-"),   // Figure dash
    ('\u{2015}', "-"),   // Horizontal bar
    ('\u{00ab}', "\""),  // Left-pointing double angle quote
    ('\u{00bb}', "\""),  // Right-pointing double angle quote
];

struct MarkdownRule {
    regex: Regex,
    replacement: &'static str,
}

/// Applied in order: images must go before links, code before emphasis.
static MARKDOWN_RULES: Lazy<Vec<MarkdownRule>> = Lazy::new(|| {
    [
        (r"(?s)```.*?```", ""),
        (r"`[^`\n]+`", ""),
        (r"!\[[^\]]*\]\([^)]*\)", ""),
        (r"\[([^\]]+)\]\([^)]*\)", "$1"),
        (r"\[\d+\]", ""),
        (r"(?m)^[ \t]*#{1,6}[ \t]*", ""),
        (r"\*{1,2}([^*\n]+)\*{1,2}", "$1"),
        (r"\b__?([^_\n]+)__?\b", "$1"),
    ]
    .into_iter()
    .map(|(pattern, replacement)| MarkdownRule {
        regex: Regex::new(pattern).expect("markdown pattern should compile"),
        replacement,
    })
    .collect()
});

/// Prepare chunk text for the speech service.
///
/// Strips Markdown markup, replaces problematic Unicode, drops control
/// characters and collapses whitespace.
pub fn prepare_for_speech(text: &str) -> String {
    let stripped = strip_markdown(text);
    let normalized = normalize_chars(&stripped);
    normalize_whitespace(&normalized)
}

/// Remove Markdown formatting, keeping link and emphasis text.
pub fn strip_markdown(text: &str) -> String {
    let mut result = text.to_string();
    for rule in MARKDOWN_RULES.iter() {
        result = rule
            .regex
            .replace_all(&result, rule.replacement)
            .into_owned();
    }
    result
}

fn normalize_chars(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for c in text.chars() {
        let replacement = PROBLEMATIC_CHARS
            .iter()
            .find(|(ch, _)| *ch == c)
            .map(|(_, r)| *r);

        if let Some(r) = replacement {
            result.push_str(r);
        } else if is_allowed_char(c) {
            result.push(c);
        }
    }

    result
}

/// Check if a character is allowed in TTS text.
fn is_allowed_char(c: char) -> bool {
    c == '\n' || c == '\t' || !c.is_control()
}

/// Collapse runs of spaces, keep at most one blank line between paragraphs.
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0;

    for line in text.lines() {
        let collapsed = line.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            blank_run += 1;
            if blank_run == 1 && !lines.is_empty() {
                lines.push(String::new());
            }
        } else {
            blank_run = 0;
            lines.push(collapsed);
        }
    }

    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_smart_quotes() {
        let text = "\u{201c}Hello,\u{201d} said John. \u{2018}It\u{2019}s nice.\u{2019}";
        let cleaned = prepare_for_speech(text);
        assert_eq!(cleaned, "\"Hello,\" said John. 'It's nice.'");
    }

    #[test]
    fn test_clean_dashes_and_guillemets() {
        assert_eq!(prepare_for_speech("one–two—three"), "one-two-three");
        assert_eq!(prepare_for_speech("«Да», сказал он"), "\"Да\", сказал он");
    }

    #[test]
    fn test_clean_ellipsis() {
        assert_eq!(prepare_for_speech("Wait… what?"), "Wait... what?");
    }

    #[test]
    fn test_clean_whitespace() {
        let text = "Hello   world\n\n\n\nNew \t paragraph  ";
        assert_eq!(prepare_for_speech(text), "Hello world\n\nNew paragraph");
    }

    #[test]
    fn test_clean_control_and_zero_width_chars() {
        let text = "Hello\x00World\x07Test\u{200b}Again\u{feff}";
        assert_eq!(prepare_for_speech(text), "HelloWorldTestAgain");
    }

    #[test]
    fn test_preserves_newlines() {
        assert_eq!(prepare_for_speech("Line 1\nLine 2"), "Line 1\nLine 2");
    }

    #[test]
    fn test_strip_headings_and_emphasis() {
        let text = "## Chapter 3\n\nShe was **very** tired and *sad*, __truly__.";
        assert_eq!(
            prepare_for_speech(text),
            "Chapter 3\n\nShe was very tired and sad, truly."
        );
    }

    #[test]
    fn test_strip_links_images_footnotes() {
        let text = "See ![cover](img/cover.png)the [map](http://x.org/map) here[12].";
        assert_eq!(prepare_for_speech(text), "See the map here.");
    }

    #[test]
    fn test_strip_code() {
        let text = "Before\n```\nlet x = 1;\n```\nafter `code` end";
        assert_eq!(prepare_for_speech(text), "Before\n\nafter end");
    }

    #[test]
    fn test_keeps_snake_case_words() {
        assert_eq!(strip_markdown("file_name_here"), "file_name_here");
    }
}
