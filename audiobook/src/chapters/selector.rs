//! Chapter selector parsing: "7", "1-3", "1,3,5", "1,3-5,9".

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Largest span a single range may cover.
const MAX_RANGE_SPAN: u32 = 10_000;

static DASH_SPACING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*[-–]\s*").expect("dash pattern should compile"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("empty chapter selector")]
    Empty,

    #[error("invalid chapter number '{0}'")]
    InvalidNumber(String),

    #[error("chapter numbers start at 1")]
    ZeroChapter,

    #[error("invalid chapter range {start}-{end}: start is after end")]
    ReversedRange { start: u32, end: u32 },

    #[error("chapter range {start}-{end} is too large")]
    RangeTooLarge { start: u32, end: u32 },
}

/// Which chapters to narrate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChapterSelection {
    /// Exactly one chapter.
    Single(u32),
    /// Every chapter from `start` to `end` inclusive.
    Range { start: u32, end: u32 },
    /// The named chapters, in the order given.
    List(Vec<u32>),
}

impl ChapterSelection {
    /// Parse a selector string.
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let normalized = DASH_SPACING.replace_all(input.trim(), "-");
        let parts: Vec<&str> = normalized
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|p| !p.is_empty())
            .collect();

        match parts.as_slice() {
            [] => Err(SelectorError::Empty),
            [single] => match parse_part(single)? {
                Part::Number(n) => Ok(Self::Single(n)),
                Part::Range(start, end) => Ok(Self::Range { start, end }),
            },
            many => {
                let mut numbers: Vec<u32> = Vec::new();
                for part in many {
                    let expanded = match parse_part(part)? {
                        Part::Number(n) => n..=n,
                        Part::Range(start, end) => start..=end,
                    };
                    for n in expanded {
                        if !numbers.contains(&n) {
                            numbers.push(n);
                        }
                    }
                }
                Ok(Self::List(numbers))
            }
        }
    }

    /// Requested chapter numbers in narration order.
    pub fn numbers(&self) -> Vec<u32> {
        match self {
            Self::Single(n) => vec![*n],
            Self::Range { start, end } => (*start..=*end).collect(),
            Self::List(numbers) => numbers.clone(),
        }
    }
}

impl FromStr for ChapterSelection {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ChapterSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(n) => write!(f, "{}", n),
            Self::Range { start, end } => write!(f, "{}-{}", start, end),
            Self::List(numbers) => {
                let parts: Vec<String> = numbers.iter().map(|n| n.to_string()).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

enum Part {
    Number(u32),
    Range(u32, u32),
}

fn parse_number(s: &str) -> Result<u32, SelectorError> {
    let n: u32 = s
        .parse()
        .map_err(|_| SelectorError::InvalidNumber(s.to_string()))?;
    if n == 0 {
        return Err(SelectorError::ZeroChapter);
    }
    Ok(n)
}

fn parse_part(part: &str) -> Result<Part, SelectorError> {
    match part.split_once('-') {
        Some((start, end)) => {
            let start = parse_number(start)?;
            let end = parse_number(end)?;
            if start > end {
                return Err(SelectorError::ReversedRange { start, end });
            }
            if end - start > MAX_RANGE_SPAN {
                return Err(SelectorError::RangeTooLarge { start, end });
            }
            Ok(Part::Range(start, end))
        }
        None => parse_number(part).map(Part::Number),
    }
}
