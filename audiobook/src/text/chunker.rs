//! Text chunking for TTS processing.
//!
//! Chunks are exact slices of the chapter text. Every sentence end and every
//! paragraph end is a candidate cut; a sentence longer than the limit falls
//! back to word boundaries, and a word longer than the limit is cut at
//! character boundaries as a last resort. Each chunk is filled up to the last
//! candidate that still fits, which gives the fewest chunks.

use once_cell::sync::Lazy;
use regex::Regex;
use std::ops::Range;
use thiserror::Error;

use super::TextChunk;
use crate::chapters::LocatedChapter;

/// Default maximum chunk size in characters.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 1500;

static BLANK_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n\s*\n").expect("blank line pattern should compile"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChunkError {
    #[error("no text to narrate: the selected chapters are empty")]
    EmptyInput,

    #[error("maximum chunk size must be at least one character")]
    ZeroLimit,
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Shrink a byte range to exclude surrounding whitespace.
fn trim_range(text: &str, range: Range<usize>) -> Option<Range<usize>> {
    let slice = &text[range.clone()];
    let trimmed = slice.trim();
    if trimmed.is_empty() {
        return None;
    }
    let lead = slice.len() - slice.trim_start().len();
    let start = range.start + lead;
    Some(start..start + trimmed.len())
}

fn paragraphs(text: &str) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = 0;
    for separator in BLANK_LINE.find_iter(text) {
        out.extend(trim_range(text, start..separator.start()));
        start = separator.end();
    }
    out.extend(trim_range(text, start..text.len()));
    out
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '…')
}

fn is_closer(c: char) -> bool {
    matches!(c, '"' | '\'' | '”' | '’' | '»' | ')' | ']')
}

/// Sentence ranges within `range`: a terminator, optional closing quotes or
/// brackets, then whitespace.
fn sentences(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let slice = &text[range.clone()];
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = slice.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }
        let mut end = i + c.len_utf8();
        while let Some(&(j, next)) = chars.peek() {
            if is_terminator(next) || is_closer(next) {
                end = j + next.len_utf8();
                chars.next();
            } else {
                break;
            }
        }
        if chars.peek().is_some_and(|&(_, next)| next.is_whitespace()) {
            out.extend(trim_range(text, range.start + start..range.start + end));
            start = end;
        }
    }

    out.extend(trim_range(text, range.start + start..range.end));
    out
}

fn words(text: &str, range: Range<usize>) -> Vec<Range<usize>> {
    let slice = &text[range.clone()];
    let mut out = Vec::new();
    let mut word_start = None;

    for (i, c) in slice.char_indices() {
        match (c.is_whitespace(), word_start) {
            (true, Some(start)) => {
                out.push(range.start + start..range.start + i);
                word_start = None;
            }
            (false, None) => word_start = Some(i),
            _ => {}
        }
    }
    if let Some(start) = word_start {
        out.push(range.start + start..range.end);
    }
    out
}

/// Last resort for a single word longer than the limit.
fn hard_split(text: &str, range: Range<usize>, max_chars: usize) -> Vec<Range<usize>> {
    let slice = &text[range.clone()];
    let mut out = Vec::new();
    let mut piece_start = 0;
    let mut count = 0;

    for (i, _) in slice.char_indices() {
        if count == max_chars {
            out.push(range.start + piece_start..range.start + i);
            piece_start = i;
            count = 0;
        }
        count += 1;
    }
    out.push(range.start + piece_start..range.end);
    out
}

/// Break text into the smallest pieces a chunk may start or end on.
fn units(text: &str, max_chars: usize) -> Vec<Range<usize>> {
    let mut out = Vec::new();

    for paragraph in paragraphs(text) {
        for sentence in sentences(text, paragraph) {
            if char_len(&text[sentence.clone()]) <= max_chars {
                out.push(sentence);
                continue;
            }
            for word in words(text, sentence) {
                if char_len(&text[word.clone()]) <= max_chars {
                    out.push(word);
                } else {
                    log::warn!(
                        "Word of {} chars exceeds the {} char limit; splitting it",
                        char_len(&text[word.clone()]),
                        max_chars
                    );
                    out.extend(hard_split(text, word, max_chars));
                }
            }
        }
    }

    out
}

/// Split text into slices of at most `max_chars` characters.
///
/// Returns nothing for blank text. `max_chars` must be non-zero.
pub fn split_text(text: &str, max_chars: usize) -> Vec<&str> {
    debug_assert!(max_chars > 0);

    let mut chunks = Vec::new();
    let mut current: Option<Range<usize>> = None;
    let mut current_len = 0;

    for unit in units(text, max_chars) {
        let unit_len = char_len(&text[unit.clone()]);
        match current.as_mut() {
            Some(cur) => {
                let gap_len = char_len(&text[cur.end..unit.start]);
                if current_len + gap_len + unit_len <= max_chars {
                    cur.end = unit.end;
                    current_len += gap_len + unit_len;
                } else {
                    chunks.push(&text[cur.clone()]);
                    *cur = unit;
                    current_len = unit_len;
                }
            }
            None => {
                current = Some(unit);
                current_len = unit_len;
            }
        }
    }

    if let Some(cur) = current {
        chunks.push(&text[cur]);
    }

    chunks
}

/// Turn the selected chapters into numbered chunks, in order.
///
/// A chunk never spans two chapters, so chapter boundaries stay exact in the
/// assembled audio.
pub fn chunk_chapters(
    chapters: &[LocatedChapter],
    max_chars: usize,
    voice: &str,
) -> Result<Vec<TextChunk>, ChunkError> {
    if max_chars == 0 {
        return Err(ChunkError::ZeroLimit);
    }
    if chapters.iter().all(|c| c.text.trim().is_empty()) {
        return Err(ChunkError::EmptyInput);
    }

    let mut chunks = Vec::new();
    for chapter in chapters {
        let pieces = split_text(&chapter.text, max_chars);
        if pieces.is_empty() {
            log::warn!("Chapter {} has no text; skipping", chapter.number);
        }
        for piece in pieces {
            chunks.push(TextChunk::new(chunks.len(), chapter.number, piece, voice));
        }
    }

    Ok(chunks)
}
