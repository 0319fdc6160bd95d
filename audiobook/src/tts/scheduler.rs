//! Bounded-concurrency synthesis of all chunks.
//!
//! At most `concurrency` requests are in flight. Completions arrive in any
//! order and are slotted back into chunk order before returning.

use speech_client::SpeechError;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::{AudioSegment, Narrator};
use crate::text::TextChunk;

#[derive(Error, Debug)]
pub enum SynthesisFailure {
    #[error("synthesis cancelled after {completed} of {total} chunks")]
    Cancelled { completed: usize, total: usize },

    #[error("chunk {chunk} (chapter {chapter}) failed: {source}")]
    Failed {
        chunk: usize,
        chapter: u32,
        #[source]
        source: SpeechError,
    },

    #[error("synthesis task failed: {message}")]
    Worker { message: String },
}

type TaskOutput = (usize, TextChunk, Result<AudioSegment, SpeechError>);

async fn shutdown(tasks: &mut JoinSet<TaskOutput>) {
    tasks.abort_all();
    while tasks.join_next().await.is_some() {}
}

/// Synthesize every chunk, returning segments in chunk order.
///
/// `on_progress` is called with (completed, total) after each chunk finishes.
/// The first failure or a cancellation aborts all in-flight requests.
pub async fn synthesize_all<F>(
    narrator: Arc<Narrator>,
    chunks: Vec<TextChunk>,
    concurrency: usize,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<Vec<AudioSegment>, SynthesisFailure>
where
    F: FnMut(usize, usize),
{
    let total = chunks.len();
    let concurrency = concurrency.max(1);
    let mut pending = chunks.into_iter().enumerate();
    let mut slots: Vec<Option<AudioSegment>> = (0..total).map(|_| None).collect();
    let mut tasks: JoinSet<TaskOutput> = JoinSet::new();
    let mut completed = 0;

    log::debug!("Synthesizing {} chunks with concurrency {}", total, concurrency);

    loop {
        while tasks.len() < concurrency && !cancel.is_cancelled() {
            let Some((slot, chunk)) = pending.next() else {
                break;
            };
            let narrator = Arc::clone(&narrator);
            tasks.spawn(async move {
                let result = narrator.synthesize(&chunk).await;
                (slot, chunk, result)
            });
        }

        if tasks.is_empty() {
            break;
        }

        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                shutdown(&mut tasks).await;
                return Err(SynthesisFailure::Cancelled { completed, total });
            }
            joined = tasks.join_next() => match joined {
                Some(Ok((slot, _, Ok(segment)))) => {
                    slots[slot] = Some(segment);
                    completed += 1;
                    on_progress(completed, total);
                }
                Some(Ok((_, chunk, Err(source)))) => {
                    shutdown(&mut tasks).await;
                    return Err(SynthesisFailure::Failed {
                        chunk: chunk.index,
                        chapter: chunk.chapter,
                        source,
                    });
                }
                Some(Err(e)) => {
                    shutdown(&mut tasks).await;
                    return Err(SynthesisFailure::Worker {
                        message: e.to_string(),
                    });
                }
                None => break,
            },
        }
    }

    if completed < total {
        return Err(SynthesisFailure::Cancelled { completed, total });
    }

    slots
        .into_iter()
        .map(|slot| {
            slot.ok_or_else(|| SynthesisFailure::Worker {
                message: "missing audio segment".to_string(),
            })
        })
        .collect()
}
