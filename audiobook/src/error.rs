//! Error taxonomy for a narration run and its process exit codes.

use speech_client::SpeechError;
use std::path::PathBuf;
use thiserror::Error;

use crate::audio::AssemblyError;
use crate::chapters::{LocateError, SelectorError};
use crate::text::ChunkError;
use crate::tts::SynthesisFailure;

pub const EXIT_OTHER: i32 = 1;
pub const EXIT_INPUT: i32 = 2;
pub const EXIT_NOT_FOUND: i32 = 3;
pub const EXIT_AUTH: i32 = 4;
pub const EXIT_SYNTHESIS: i32 = 5;
pub const EXIT_ASSEMBLY: i32 = 6;
pub const EXIT_CANCELLED: i32 = 130;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Input(String),

    #[error("cannot read book {}: {source}", path.display())]
    ReadBook {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Chunk(#[from] ChunkError),

    /// Missing or rejected credential, or a voice the service does not know.
    #[error("{0}")]
    Auth(SpeechError),

    #[error("synthesis failed at chunk {chunk} (chapter {chapter}): {source}")]
    Synthesis {
        chunk: usize,
        chapter: u32,
        #[source]
        source: SpeechError,
    },

    #[error("assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("cancelled")]
    Cancelled,

    #[error("working directory error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Input(_) | Self::ReadBook { .. } | Self::Selector(_) | Self::Chunk(_) => EXIT_INPUT,
            Self::Locate(LocateError::InvalidPattern { .. }) => EXIT_INPUT,
            Self::Locate(_) => EXIT_NOT_FOUND,
            Self::Auth(_) => EXIT_AUTH,
            Self::Synthesis { .. } => EXIT_SYNTHESIS,
            Self::Assembly(_) => EXIT_ASSEMBLY,
            Self::Cancelled => EXIT_CANCELLED,
            Self::Io(_) | Self::Internal(_) => EXIT_OTHER,
        }
    }
}

impl From<SynthesisFailure> for PipelineError {
    fn from(failure: SynthesisFailure) -> Self {
        match failure {
            SynthesisFailure::Cancelled { .. } => Self::Cancelled,
            SynthesisFailure::Failed { source, .. } if source.is_fatal() => Self::Auth(source),
            SynthesisFailure::Failed {
                chunk,
                chapter,
                source,
            } => Self::Synthesis {
                chunk,
                chapter,
                source,
            },
            SynthesisFailure::Worker { message } => Self::Internal(message),
        }
    }
}

impl From<SpeechError> for PipelineError {
    fn from(error: SpeechError) -> Self {
        if error.is_fatal() {
            Self::Auth(error)
        } else {
            Self::Internal(error.to_string())
        }
    }
}
