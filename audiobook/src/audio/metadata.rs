//! FFmpeg metadata generation for chapter markers.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::BookMetadata;

/// A chapter marker in the assembled audio.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterInfo {
    pub title: String,
    /// Start position in milliseconds
    pub start_ms: u64,
    /// End position in milliseconds
    pub end_ms: u64,
}

impl ChapterInfo {
    pub fn new(title: impl Into<String>, start_ms: u64, end_ms: u64) -> Self {
        Self {
            title: title.into(),
            start_ms,
            end_ms,
        }
    }
}

/// Write an FFMETADATA1 file with book tags and chapter markers.
pub fn create_ffmpeg_metadata(
    book: &BookMetadata,
    chapters: &[ChapterInfo],
    output_path: &Path,
) -> std::io::Result<()> {
    let mut file = BufWriter::new(File::create(output_path)?);

    writeln!(file, ";FFMETADATA1")?;
    writeln!(file, "title={}", escape_metadata_value(&book.title))?;
    writeln!(file, "artist={}", escape_metadata_value(&book.author))?;
    writeln!(file, "album={}", escape_metadata_value(&book.title))?;
    writeln!(file, "genre=Audiobook")?;
    writeln!(file)?;

    for chapter in chapters {
        writeln!(file, "[CHAPTER]")?;
        writeln!(file, "TIMEBASE=1/1000")?;
        writeln!(file, "START={}", chapter.start_ms)?;
        writeln!(file, "END={}", chapter.end_ms)?;
        writeln!(file, "title={}", escape_metadata_value(&chapter.title))?;
        writeln!(file)?;
    }

    file.flush()
}

/// FFmpeg metadata values need `=`, `;`, `#`, `\` and newlines escaped.
fn escape_metadata_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());

    for c in value.chars() {
        match c {
            '=' | ';' | '#' | '\\' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            _ => escaped.push(c),
        }
    }

    escaped
}

/// Chapter markers from segment durations.
///
/// `boundaries` holds (title, first segment index) per chapter, in order.
/// Offsets are accumulated in fractional milliseconds and rounded once, so
/// markers do not drift over many segments.
pub fn build_chapter_info(
    segment_durations_ms: &[f64],
    boundaries: &[(String, usize)],
) -> Vec<ChapterInfo> {
    let offset_at = |segment: usize| -> u64 {
        let end = segment.min(segment_durations_ms.len());
        segment_durations_ms[..end].iter().sum::<f64>().round() as u64
    };

    boundaries
        .iter()
        .enumerate()
        .map(|(i, (title, first_segment))| {
            let end_segment = boundaries
                .get(i + 1)
                .map(|(_, next)| *next)
                .unwrap_or(segment_durations_ms.len());
            ChapterInfo::new(title.clone(), offset_at(*first_segment), offset_at(end_segment))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_escape_metadata_value() {
        assert_eq!(escape_metadata_value("Simple"), "Simple");
        assert_eq!(escape_metadata_value("Test=Value"), "Test\\=Value");
        assert_eq!(escape_metadata_value("Test;Value"), "Test\\;Value");
        assert_eq!(escape_metadata_value("Test#Value"), "Test\\#Value");
        assert_eq!(escape_metadata_value("Test\\Value"), "Test\\\\Value");
        assert_eq!(escape_metadata_value("Line1\r\nLine2"), "Line1\\nLine2");
    }

    #[test]
    fn test_create_ffmpeg_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let metadata_path = temp_dir.path().join("metadata.txt");
        let book = BookMetadata::new("War; Peace", "Лев Толстой");
        let chapters = vec![
            ChapterInfo::new("Chapter 1", 0, 60000),
            ChapterInfo::new("Chapter 2", 60000, 120000),
        ];

        create_ffmpeg_metadata(&book, &chapters, &metadata_path).unwrap();

        let content = std::fs::read_to_string(&metadata_path).unwrap();
        assert!(content.starts_with(";FFMETADATA1\n"));
        assert!(content.contains("title=War\\; Peace"));
        assert!(content.contains("artist=Лев Толстой"));
        assert_eq!(content.matches("[CHAPTER]").count(), 2);
        assert!(content.contains("START=60000\nEND=120000\ntitle=Chapter 2"));
    }

    #[test]
    fn test_build_chapter_info() {
        let durations = vec![1000.0, 2000.0, 3000.0, 4000.0, 5000.0];
        let boundaries = vec![
            ("Chapter 1".to_string(), 0),
            ("Chapter 2".to_string(), 2),
            ("Chapter 3".to_string(), 4),
        ];

        let chapters = build_chapter_info(&durations, &boundaries);

        assert_eq!(
            chapters,
            vec![
                ChapterInfo::new("Chapter 1", 0, 3000),
                ChapterInfo::new("Chapter 2", 3000, 10000),
                ChapterInfo::new("Chapter 3", 10000, 15000),
            ]
        );
    }

    #[test]
    fn test_build_chapter_info_fractional_durations() {
        // 3 x 333.4ms rounds once to 1000, not 3 x 333
        let durations = vec![333.4, 333.4, 333.4, 500.0];
        let boundaries = vec![("One".to_string(), 0), ("Two".to_string(), 3)];
        let chapters = build_chapter_info(&durations, &boundaries);
        assert_eq!(chapters[0].end_ms, 1000);
        assert_eq!(chapters[1].start_ms, 1000);
        assert_eq!(chapters[1].end_ms, 1500);
    }
}
