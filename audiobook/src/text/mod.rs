//! Text processing for TTS: chunking and speech-time cleaning.

pub mod chunker;
pub mod cleaner;

pub use chunker::{ChunkError, chunk_chapters};

/// A chunk of text ready for TTS processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// Position in the overall narration, contiguous from 0
    pub index: usize,
    /// The chapter this chunk belongs to
    pub chapter: u32,
    /// Exact slice of the chapter text
    pub text: String,
    /// Voice to narrate with
    pub voice: String,
}

impl TextChunk {
    /// Create a new text chunk.
    pub fn new(index: usize, chapter: u32, text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            index,
            chapter,
            text: text.into(),
            voice: voice.into(),
        }
    }

    /// Length in characters, the unit the synthesis limit is expressed in.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}
