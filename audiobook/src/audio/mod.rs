//! Audio assembly: joins synthesized segments into the final audiobook file.

pub mod assembler;
mod metadata;

use std::path::PathBuf;

pub use assembler::{Assembler, AssemblyError, OutputFormat};

/// Tags written to transcoded outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookMetadata {
    pub title: String,
    pub author: String,
}

impl BookMetadata {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
        }
    }
}

/// Result of a successful assembly.
#[derive(Debug, Clone, PartialEq)]
pub struct AudiobookOutput {
    pub path: PathBuf,
    /// Sum of segment durations in milliseconds
    pub duration_ms: u64,
    pub size_bytes: u64,
    pub chunk_count: usize,
    pub chapter_count: usize,
}

impl AudiobookOutput {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }

    /// Duration as `H:MM:SS`.
    pub fn duration_display(&self) -> String {
        let total_secs = self.duration_ms / 1000;
        format!(
            "{}:{:02}:{:02}",
            total_secs / 3600,
            (total_secs % 3600) / 60,
            total_secs % 60
        )
    }
}
