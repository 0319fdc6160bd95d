//! Chapter heading grammar.
//!
//! Every pattern is multi-line and exposes the chapter number in a capture
//! group named `num`. The keyword pattern matches headings such as
//! `Chapter 7`, `CHAPTER XII: The Storm`, `## Глава 3` at the start of a
//! line; only the keyword is case-insensitive, Roman numerals must be upper
//! case so ordinary words are never read as numbers.

use once_cell::sync::Lazy;
use regex::Regex;

/// `Chapter N` / `Глава N`, optionally behind up to three Markdown hashes.
pub const KEYWORD_HEADING: &str =
    r"(?m)^[ \t]*(?:#{1,3}[ \t]*)?(?i:chapter|глава)[ \t]+(?P<num>\d{1,4}|[IVXLCDM]+)\b";

/// `7. Title` at the start of a line. Off by default: numbered lists look the same.
pub const NUMBERED_HEADING: &str = r"(?m)^[ \t]*(?P<num>\d{1,4})\.[ \t]+\S";

pub static KEYWORD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(KEYWORD_HEADING).expect("keyword heading pattern should compile"));

pub static NUMBERED_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(NUMBERED_HEADING).expect("numbered heading pattern should compile"));

/// Parse an Arabic or Roman chapter number. Zero and non-canonical numerals are rejected.
pub fn parse_chapter_number(s: &str) -> Option<u32> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s.bytes().all(|b| b.is_ascii_digit()) {
        return s.parse().ok().filter(|n| *n > 0);
    }
    parse_roman(s)
}

fn roman_value(c: char) -> Option<u32> {
    match c {
        'I' => Some(1),
        'V' => Some(5),
        'X' => Some(10),
        'L' => Some(50),
        'C' => Some(100),
        'D' => Some(500),
        'M' => Some(1000),
        _ => None,
    }
}

/// Strict Roman numeral parsing: `IIII` or `IC` are not numbers.
pub fn parse_roman(s: &str) -> Option<u32> {
    let mut total: u32 = 0;
    let mut prev = 0;
    for c in s.chars().rev() {
        let value = roman_value(c)?;
        if value < prev {
            total = total.checked_sub(value)?;
        } else {
            total += value;
            prev = value;
        }
    }

    if total == 0 || to_roman(total) != s {
        return None;
    }
    Some(total)
}

fn to_roman(mut n: u32) -> String {
    const TABLE: &[(u32, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];

    let mut out = String::new();
    for (value, numeral) in TABLE {
        while n >= *value {
            out.push_str(numeral);
            n -= value;
        }
    }
    out
}
