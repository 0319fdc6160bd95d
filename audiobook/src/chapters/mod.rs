//! Chapter detection and extraction from plain book text.

mod patterns;
pub mod selector;

pub use selector::{ChapterSelection, SelectorError};

use regex::Regex;
use std::collections::HashMap;
use thiserror::Error;

/// Default minimum body length for a heading to count as a real chapter.
pub const DEFAULT_MIN_CHAPTER_CHARS: usize = 200;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LocateError {
    #[error("no chapter headings detected (expected lines like \"Chapter 1\" or \"Глава 1\")")]
    NoChaptersDetected,

    #[error(
        "chapter {} not found (available: {})",
        format_numbers(missing),
        format_numbers(available)
    )]
    ChapterNotFound {
        missing: Vec<u32>,
        available: Vec<u32>,
    },

    #[error("invalid heading pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Render numbers compactly, collapsing consecutive runs: `1-5, 7, 9-10`.
pub fn format_numbers(numbers: &[u32]) -> String {
    if numbers.is_empty() {
        return "none".to_string();
    }

    let mut sorted = numbers.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts = Vec::new();
    let mut run_start = sorted[0];
    let mut prev = sorted[0];
    for &n in &sorted[1..] {
        if n == prev + 1 {
            prev = n;
            continue;
        }
        parts.push(format_run(run_start, prev));
        run_start = n;
        prev = n;
    }
    parts.push(format_run(run_start, prev));
    parts.join(", ")
}

fn format_run(start: u32, end: u32) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{}-{}", start, end)
    }
}

/// One detected chapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterEntry {
    /// Number as written in the heading
    pub number: u32,
    /// The heading line, trimmed
    pub title: String,
    /// Byte offset of the heading line
    pub start: usize,
    /// Byte offset where the next chapter starts, or the text length
    pub end: usize,
}

impl ChapterEntry {
    /// Start of the chapter body on one line, cut to `max_chars`.
    pub fn preview(&self, text: &str, max_chars: usize) -> String {
        let chapter = &text[self.start..self.end];
        let body = chapter.split_once('\n').map_or("", |(_, rest)| rest);
        let flat = body.split_whitespace().collect::<Vec<_>>().join(" ");

        if flat.chars().count() <= max_chars {
            flat
        } else {
            let cut: String = flat.chars().take(max_chars).collect();
            format!("{}...", cut.trim_end())
        }
    }
}

/// Chapters of a book in source order, with non-overlapping byte ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterIndex {
    entries: Vec<ChapterEntry>,
}

impl ChapterIndex {
    pub fn entries(&self) -> &[ChapterEntry] {
        &self.entries
    }

    pub fn get(&self, number: u32) -> Option<&ChapterEntry> {
        self.entries.iter().find(|e| e.number == number)
    }

    /// Chapter numbers in source order.
    pub fn numbers(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.number).collect()
    }
}

/// A chapter's text, ready for chunking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedChapter {
    pub number: u32,
    pub title: String,
    pub text: String,
}

/// A heading match before TOC filtering.
struct Heading {
    number: u32,
    start: usize,
    line_end: usize,
}

/// Scans book text for chapter headings.
#[derive(Debug, Clone)]
pub struct ChapterLocator {
    patterns: Vec<Regex>,
    min_chapter_chars: usize,
}

impl Default for ChapterLocator {
    fn default() -> Self {
        Self {
            patterns: vec![patterns::KEYWORD_REGEX.clone()],
            min_chapter_chars: DEFAULT_MIN_CHAPTER_CHARS,
        }
    }
}

impl ChapterLocator {
    /// Create a locator recognising keyword headings only.
    pub fn new() -> Self {
        Self::default()
    }

    /// Also recognise bare numbered headings such as `7. Title`.
    pub fn with_numbered_headings(mut self, enabled: bool) -> Self {
        if enabled {
            self.patterns.push(patterns::NUMBERED_REGEX.clone());
        }
        self
    }

    /// Add a custom heading pattern. It must capture the number in a group named `num`.
    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, LocateError> {
        let regex = Regex::new(pattern).map_err(|e| LocateError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        if !regex.capture_names().any(|name| name == Some("num")) {
            return Err(LocateError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "missing a capture group named 'num'".to_string(),
            });
        }
        self.patterns.push(regex);
        Ok(self)
    }

    /// Headings followed by this many characters or fewer are treated as table-of-contents lines.
    pub fn with_min_chapter_chars(mut self, chars: usize) -> Self {
        self.min_chapter_chars = chars;
        self
    }

    fn scan(&self, text: &str) -> Vec<Heading> {
        let mut headings = Vec::new();

        for pattern in &self.patterns {
            for captures in pattern.captures_iter(text) {
                let (Some(whole), Some(num)) = (captures.get(0), captures.name("num")) else {
                    continue;
                };
                let Some(number) = patterns::parse_chapter_number(num.as_str()) else {
                    continue;
                };
                // Start at the beginning of the matched line
                let start = text[..whole.start()].rfind('\n').map_or(0, |i| i + 1);
                let line_end = text[whole.end()..]
                    .find('\n')
                    .map_or(text.len(), |i| whole.end() + i);
                headings.push(Heading {
                    number,
                    start,
                    line_end,
                });
            }
        }

        headings.sort_by_key(|h| h.start);
        headings.dedup_by_key(|h| h.start);
        headings
    }

    /// Build the chapter index for a book.
    pub fn index(&self, text: &str) -> Result<ChapterIndex, LocateError> {
        let raw = self.scan(text);
        if raw.is_empty() {
            return Err(LocateError::NoChaptersDetected);
        }

        // Drop table-of-contents lines: headings with (almost) nothing before the next heading
        let substantial: Vec<&Heading> = raw
            .iter()
            .enumerate()
            .filter(|(i, heading)| {
                let next = raw.get(i + 1).map_or(text.len(), |h| h.start);
                let body = text[heading.line_end.min(next)..next].trim();
                body.chars().count() > self.min_chapter_chars
            })
            .map(|(_, heading)| heading)
            .collect();

        let candidates: Vec<&Heading> = if substantial.is_empty() {
            log::debug!(
                "All {} headings are shorter than {} chars; keeping them unfiltered",
                raw.len(),
                self.min_chapter_chars
            );
            raw.iter().collect()
        } else {
            if substantial.len() < raw.len() {
                log::debug!(
                    "Ignored {} table-of-contents headings",
                    raw.len() - substantial.len()
                );
            }
            substantial
        };

        // Repeated numbers: the last occurrence is the real chapter
        let mut last_seen: HashMap<u32, usize> = HashMap::new();
        for (i, heading) in candidates.iter().enumerate() {
            last_seen.insert(heading.number, i);
        }
        let kept: Vec<&Heading> = candidates
            .iter()
            .enumerate()
            .filter(|(i, heading)| last_seen.get(&heading.number) == Some(i))
            .map(|(_, heading)| *heading)
            .collect();

        let entries = kept
            .iter()
            .enumerate()
            .map(|(i, heading)| ChapterEntry {
                number: heading.number,
                title: text[heading.start..heading.line_end].trim().to_string(),
                start: heading.start,
                end: kept.get(i + 1).map_or(text.len(), |next| next.start),
            })
            .collect();

        Ok(ChapterIndex { entries })
    }

    /// Extract the selected chapters, in selection order.
    pub fn locate(
        &self,
        text: &str,
        selection: &ChapterSelection,
    ) -> Result<Vec<LocatedChapter>, LocateError> {
        let index = self.index(text)?;
        extract(text, &index, selection)
    }
}

/// Pull the selected chapters out of an already built index.
pub fn extract(
    text: &str,
    index: &ChapterIndex,
    selection: &ChapterSelection,
) -> Result<Vec<LocatedChapter>, LocateError> {
    let requested = selection.numbers();

    let missing: Vec<u32> = requested
        .iter()
        .copied()
        .filter(|n| index.get(*n).is_none())
        .collect();
    if !missing.is_empty() {
        return Err(LocateError::ChapterNotFound {
            missing,
            available: index.numbers(),
        });
    }

    Ok(requested
        .iter()
        .filter_map(|n| index.get(*n))
        .map(|entry| LocatedChapter {
            number: entry.number,
            title: entry.title.clone(),
            text: text[entry.start..entry.end].trim().to_string(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(seed: &str) -> String {
        format!("{} ", seed).repeat(60)
    }

    fn book(chapters: u32) -> String {
        let mut text = String::from("My Book\nby Someone\n\n");
        for n in 1..=chapters {
            text.push_str(&format!("Chapter {}\n\n{}\n\n", n, body(&format!("word{}", n))));
        }
        text
    }

    #[test]
    fn test_index_finds_all_chapters() {
        let text = book(5);
        let index = ChapterLocator::new().index(&text).unwrap();
        assert_eq!(index.numbers(), vec![1, 2, 3, 4, 5]);
        assert_eq!(index.entries()[0].title, "Chapter 1");
    }

    #[test]
    fn test_entry_preview() {
        let text = book(2);
        let index = ChapterLocator::new().index(&text).unwrap();
        let first = &index.entries()[0];
        assert_eq!(first.preview(&text, 20), "word1 word1 word1 wo...");
        assert_eq!(index.entries()[1].preview(&text, 5000), body("word2").trim());
    }

    #[test]
    fn test_offsets_monotonic_and_non_overlapping() {
        let text = book(6);
        let index = ChapterLocator::new().index(&text).unwrap();
        let entries = index.entries();
        for pair in entries.windows(2) {
            assert!(pair[0].start < pair[0].end);
            assert_eq!(pair[0].end, pair[1].start);
        }
        assert_eq!(entries.last().unwrap().end, text.len());
    }

    #[test]
    fn test_locate_single() {
        let text = book(10);
        let chapters = ChapterLocator::new()
            .locate(&text, &ChapterSelection::Single(7))
            .unwrap();
        assert_eq!(chapters.len(), 1);
        assert_eq!(chapters[0].number, 7);
        assert!(chapters[0].text.starts_with("Chapter 7"));
        assert!(chapters[0].text.contains("word7"));
        assert!(!chapters[0].text.contains("word8"));
    }

    #[test]
    fn test_locate_range() {
        let text = book(5);
        let chapters = ChapterLocator::new()
            .locate(&text, &ChapterSelection::parse("1-3").unwrap())
            .unwrap();
        let numbers: Vec<u32> = chapters.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn test_locate_list_in_given_order() {
        let text = book(5);
        let chapters = ChapterLocator::new()
            .locate(&text, &ChapterSelection::parse("5,1,3").unwrap())
            .unwrap();
        let numbers: Vec<u32> = chapters.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![5, 1, 3]);
    }

    #[test]
    fn test_missing_chapter_named_in_error() {
        let text = book(10);
        let err = ChapterLocator::new()
            .locate(&text, &ChapterSelection::Single(99))
            .unwrap_err();
        assert_eq!(
            err,
            LocateError::ChapterNotFound {
                missing: vec![99],
                available: (1..=10).collect(),
            }
        );
        let message = err.to_string();
        assert!(message.contains("99"), "{}", message);
        assert!(message.contains("1-10"), "{}", message);
    }

    #[test]
    fn test_range_with_gap_fails() {
        let text = book(3).replace("Chapter 2\n", "Interlude\n");
        let err = ChapterLocator::new()
            .locate(&text, &ChapterSelection::parse("1-3").unwrap())
            .unwrap_err();
        assert!(matches!(err, LocateError::ChapterNotFound { ref missing, .. } if missing == &vec![2]));
    }

    #[test]
    fn test_no_chapters_detected() {
        let err = ChapterLocator::new()
            .index("Just some prose without any headings at all.")
            .unwrap_err();
        assert_eq!(err, LocateError::NoChaptersDetected);
    }

    #[test]
    fn test_table_of_contents_is_skipped() {
        let mut text = String::from("Contents\nChapter 1\nChapter 2\nChapter 3\n\n");
        text.push_str(&book(3));
        let index = ChapterLocator::new().index(&text).unwrap();
        assert_eq!(index.numbers(), vec![1, 2, 3]);
        // The real chapter 1 comes after the TOC
        let first = &index.entries()[0];
        assert!(first.start > text.find("My Book").unwrap());
    }

    #[test]
    fn test_short_chapters_kept_when_everything_is_short() {
        let text = "Chapter 1\nShort.\nChapter 2\nAlso short.\n";
        let index = ChapterLocator::new().index(text).unwrap();
        assert_eq!(index.numbers(), vec![1, 2]);
    }

    #[test]
    fn test_min_chapter_chars_configurable() {
        let text = "Chapter 1\nShort.\nChapter 2\nAlso short but longer.\n";
        let index = ChapterLocator::new()
            .with_min_chapter_chars(10)
            .index(text)
            .unwrap();
        assert_eq!(index.numbers(), vec![2]);
    }

    #[test]
    fn test_irregular_numbering_preserved() {
        let text = format!(
            "Chapter 2\n{}\nChapter 5\n{}\nChapter 3\n{}\n",
            body("a"),
            body("b"),
            body("c")
        );
        let index = ChapterLocator::new().index(&text).unwrap();
        assert_eq!(index.numbers(), vec![2, 5, 3]);
    }

    #[test]
    fn test_roman_and_russian_headings() {
        let text = format!(
            "ГЛАВА I\n{}\nГлава II.\n{}\n# Chapter III: The End\n{}\n",
            body("один"),
            body("два"),
            body("three")
        );
        let index = ChapterLocator::new().index(&text).unwrap();
        assert_eq!(index.numbers(), vec![1, 2, 3]);
        assert_eq!(index.get(3).unwrap().title, "# Chapter III: The End");
    }

    #[test]
    fn test_numbered_headings_opt_in() {
        let text = format!("1. Arrival\n{}\n2. Departure\n{}\n", body("x"), body("y"));
        assert_eq!(
            ChapterLocator::new().index(&text).unwrap_err(),
            LocateError::NoChaptersDetected
        );
        let index = ChapterLocator::new()
            .with_numbered_headings(true)
            .index(&text)
            .unwrap();
        assert_eq!(index.numbers(), vec![1, 2]);
    }

    #[test]
    fn test_custom_pattern() {
        let text = format!("Part 1\n{}\nPart 2\n{}\n", body("x"), body("y"));
        let locator = ChapterLocator::new()
            .with_pattern(r"(?m)^Part (?P<num>\d+)$")
            .unwrap();
        assert_eq!(locator.index(&text).unwrap().numbers(), vec![1, 2]);
    }

    #[test]
    fn test_custom_pattern_requires_num_group() {
        assert!(matches!(
            ChapterLocator::new().with_pattern(r"^Part \d+$"),
            Err(LocateError::InvalidPattern { .. })
        ));
        assert!(matches!(
            ChapterLocator::new().with_pattern(r"(?P<num>"),
            Err(LocateError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_format_numbers() {
        assert_eq!(format_numbers(&[]), "none");
        assert_eq!(format_numbers(&[3]), "3");
        assert_eq!(format_numbers(&[1, 2, 3, 5, 7, 8]), "1-3, 5, 7-8");
        assert_eq!(format_numbers(&[9, 1, 2]), "1-2, 9");
    }
}
