//! Run driver: book text in, one audio file out.
//!
//! A run moves through [`PipelineState`] in order and ends in `Done` or
//! `Failed`. The run's working directory is removed on both outcomes.

mod workspace;

pub use workspace::WorkDir;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::audio::{Assembler, AudiobookOutput, BookMetadata, OutputFormat};
use crate::chapters::{ChapterLocator, ChapterSelection, LocatedChapter};
use crate::error::PipelineError;
use crate::text::chunker::DEFAULT_MAX_CHUNK_CHARS;
use crate::text::{TextChunk, chunk_chapters};
use crate::tts::{Narrator, synthesize_all};

/// Default number of concurrent synthesis requests.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Author used when none is given.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Located,
    Chunked,
    Synthesizing,
    Assembling,
    Done,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Progress notifications for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Located { chapters: usize },
    Chunked { chunks: usize },
    Synthesized { completed: usize, total: usize },
    Assembling,
}

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_chunk_chars: usize,
    pub concurrency: usize,
    /// Parent of the per-run working directory; system temp when unset
    pub work_root: Option<PathBuf>,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
            concurrency: DEFAULT_CONCURRENCY,
            work_root: None,
        }
    }
}

/// What to narrate and where to put it.
#[derive(Debug, Clone)]
pub struct BookRequest {
    pub book_path: PathBuf,
    pub selection: ChapterSelection,
    pub output: PathBuf,
    /// Defaults to the book file stem
    pub title: Option<String>,
    pub author: Option<String>,
}

impl BookRequest {
    pub fn new(book_path: impl Into<PathBuf>, selection: ChapterSelection, output: impl Into<PathBuf>) -> Self {
        Self {
            book_path: book_path.into(),
            selection,
            output: output.into(),
            title: None,
            author: None,
        }
    }

    fn metadata(&self) -> BookMetadata {
        let title = self.title.clone().unwrap_or_else(|| {
            self.book_path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "Audiobook".to_string())
        });
        let author = self.author.clone().unwrap_or_else(|| UNKNOWN_AUTHOR.to_string());
        BookMetadata::new(title, author)
    }
}

/// Read a book file as UTF-8 text.
pub async fn read_book(path: &Path) -> Result<String, PipelineError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| PipelineError::ReadBook {
            path: path.to_path_buf(),
            source,
        })
}

/// (title, first chunk index) for every chapter that produced chunks.
fn chapter_markers(chapters: &[LocatedChapter], chunks: &[TextChunk]) -> Vec<(String, usize)> {
    chapters
        .iter()
        .filter_map(|chapter| {
            chunks
                .iter()
                .position(|chunk| chunk.chapter == chapter.number)
                .map(|first| (chapter.title.clone(), first))
        })
        .collect()
}

fn check_output_path(output: &Path) -> Result<(), PipelineError> {
    OutputFormat::from_path(output).map_err(|e| PipelineError::Input(e.to_string()))?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(PipelineError::Input(format!(
                "output directory {} does not exist",
                parent.display()
            )));
        }
    }
    Ok(())
}

pub struct Pipeline {
    narrator: Arc<Narrator>,
    locator: ChapterLocator,
    assembler: Assembler,
    settings: PipelineSettings,
    state: PipelineState,
}

impl Pipeline {
    pub fn new(
        narrator: Narrator,
        locator: ChapterLocator,
        assembler: Assembler,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            narrator: Arc::new(narrator),
            locator,
            assembler,
            settings,
            state: PipelineState::Idle,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    fn transition(&mut self, next: PipelineState) {
        log::debug!("Pipeline: {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Narrate the selected chapters of a book into `request.output`.
    ///
    /// Cancelling `cancel` stops new requests, abandons in-flight ones and
    /// returns [`PipelineError::Cancelled`] once cleanup is done.
    pub async fn run<F>(
        &mut self,
        request: &BookRequest,
        cancel: &CancellationToken,
        mut on_progress: F,
    ) -> Result<AudiobookOutput, PipelineError>
    where
        F: FnMut(Progress),
    {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::Internal(format!(
                "pipeline already used (state {:?})",
                self.state
            )));
        }

        let work = match WorkDir::create(self.settings.work_root.as_deref()) {
            Ok(work) => work,
            Err(e) => {
                self.transition(PipelineState::Failed);
                return Err(e.into());
            }
        };

        let result = self.run_steps(request, &work, cancel, &mut on_progress).await;

        match &result {
            Ok(output) => {
                log::info!("Wrote {} ({} bytes)", output.path.display(), output.size_bytes);
                self.transition(PipelineState::Done);
            }
            Err(e) => {
                log::debug!("Run failed in state {:?}: {}", self.state, e);
                self.transition(PipelineState::Failed);
            }
        }

        if let Err(e) = work.remove() {
            log::warn!("Failed to remove working directory: {}", e);
        }

        result
    }

    async fn run_steps<F>(
        &mut self,
        request: &BookRequest,
        work: &WorkDir,
        cancel: &CancellationToken,
        on_progress: &mut F,
    ) -> Result<AudiobookOutput, PipelineError>
    where
        F: FnMut(Progress),
    {
        check_output_path(&request.output)?;

        let text = read_book(&request.book_path).await?;
        if text.trim().is_empty() {
            return Err(PipelineError::Input(format!(
                "book {} is empty",
                request.book_path.display()
            )));
        }

        let chapters = self.locator.locate(&text, &request.selection)?;
        work.write_chapters(&chapters)?;
        self.transition(PipelineState::Located);
        on_progress(Progress::Located {
            chapters: chapters.len(),
        });

        let chunks = chunk_chapters(
            &chapters,
            self.settings.max_chunk_chars,
            self.narrator.voice(),
        )?;
        work.write_chunks(&chunks)?;
        self.transition(PipelineState::Chunked);
        on_progress(Progress::Chunked {
            chunks: chunks.len(),
        });

        let markers = chapter_markers(&chapters, &chunks);

        self.transition(PipelineState::Synthesizing);
        let segments = synthesize_all(
            Arc::clone(&self.narrator),
            chunks,
            self.settings.concurrency,
            cancel,
            |completed, total| on_progress(Progress::Synthesized { completed, total }),
        )
        .await?;

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        self.transition(PipelineState::Assembling);
        on_progress(Progress::Assembling);

        let book = request.metadata();
        tokio::select! {
            biased;

            // Dropping the assembly future discards its staging file
            _ = cancel.cancelled() => Err(PipelineError::Cancelled),
            assembled = self.assembler.assemble(&segments, &markers, &book, work.scratch(), &request.output) => {
                Ok(assembled?)
            }
        }
    }
}
