//! Narration: turns text chunks into audio segments through a speech provider.

pub mod scheduler;

use speech_client::wav;
use speech_client::{SpeechError, SpeechProvider, SpeechRequest};
use std::sync::Arc;
use std::time::Duration;

use crate::text::TextChunk;
use crate::text::cleaner::prepare_for_speech;

pub use scheduler::{SynthesisFailure, synthesize_all};

/// Style instructions sent with every chunk unless disabled.
pub const NARRATOR_PROMPT: &str = "You are narrating an audiobook. Read the passage aloud \
in a calm, steady voice with natural pacing and pause briefly between paragraphs. \
Speak every word of the passage and nothing else.";

/// Synthesized audio for one chunk.
#[derive(Debug, Clone)]
pub struct AudioSegment {
    pub index: usize,
    pub chapter: u32,
    /// Complete WAV file
    pub data: Vec<u8>,
}

/// Backoff schedule for transient synthesis failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based).
    ///
    /// Doubles from the base delay; a server `Retry-After` hint raises it. Never
    /// exceeds `max_delay`.
    pub fn delay_for(&self, attempt: u32, error: &SpeechError) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let backoff = self.base_delay.saturating_mul(factor);
        let delay = match error {
            SpeechError::RateLimited {
                retry_after: Some(secs),
            } => backoff.max(Duration::from_secs(*secs)),
            _ => backoff,
        };
        delay.min(self.max_delay)
    }
}

/// Synthesizes chunks with one voice, retrying transient failures.
pub struct Narrator {
    provider: Arc<dyn SpeechProvider>,
    voice: &'static str,
    style_prompt: Option<String>,
    temperature: Option<f32>,
    retry: RetryPolicy,
}

impl Narrator {
    /// Create a narrator, rejecting voices the provider does not know.
    pub fn new(provider: Arc<dyn SpeechProvider>, voice: &str) -> Result<Self, SpeechError> {
        let voice = provider.resolve_voice(voice)?;
        Ok(Self {
            provider,
            voice,
            style_prompt: Some(NARRATOR_PROMPT.to_string()),
            temperature: None,
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_style_prompt(mut self, prompt: Option<String>) -> Self {
        self.style_prompt = prompt;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Canonical spelling of the narrating voice.
    pub fn voice(&self) -> &'static str {
        self.voice
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Synthesize one chunk, retrying transient errors with backoff.
    pub async fn synthesize(&self, chunk: &TextChunk) -> Result<AudioSegment, SpeechError> {
        let voice = self.provider.resolve_voice(&chunk.voice)?;
        let mut text = prepare_for_speech(&chunk.text);
        if text.is_empty() {
            log::debug!("Chunk {} is empty after cleaning; sending raw text", chunk.index);
            text = chunk.text.trim().to_string();
        }

        let mut attempt = 0;
        loop {
            let mut request = SpeechRequest::new(text.clone(), voice);
            if let Some(prompt) = &self.style_prompt {
                request = request.with_style_prompt(prompt.clone());
            }
            if let Some(temperature) = self.temperature {
                request = request.with_temperature(temperature);
            }

            match self.provider.synthesize(request).await {
                Ok(response) => {
                    wav::parse_wav(&response.audio)
                        .map_err(|e| SpeechError::InvalidAudio(e.to_string()))?;
                    log::debug!(
                        "Chunk {} synthesized ({} bytes, model {})",
                        chunk.index,
                        response.audio.len(),
                        response.model
                    );
                    return Ok(AudioSegment {
                        index: chunk.index,
                        chapter: chunk.chapter,
                        data: response.audio,
                    });
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.delay_for(attempt, &e);
                    log::warn!(
                        "Chunk {} failed (attempt {}/{}): {}; retrying in {:?}",
                        chunk.index,
                        attempt + 1,
                        self.retry.max_retries + 1,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speech_client::MockProvider;

    fn fast_retry(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    fn chunk(text: &str) -> TextChunk {
        TextChunk::new(0, 1, text, "Kore")
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0, &SpeechError::Timeout), Duration::from_secs(1));
        assert_eq!(policy.delay_for(1, &SpeechError::Timeout), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3, &SpeechError::Timeout), Duration::from_secs(8));
        assert_eq!(policy.delay_for(10, &SpeechError::Timeout), Duration::from_secs(30));
        assert_eq!(policy.delay_for(40, &SpeechError::Timeout), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_honours_retry_after() {
        let policy = RetryPolicy::default();
        let limited = SpeechError::RateLimited {
            retry_after: Some(7),
        };
        assert_eq!(policy.delay_for(0, &limited), Duration::from_secs(7));
        let huge = SpeechError::RateLimited {
            retry_after: Some(600),
        };
        assert_eq!(policy.delay_for(0, &huge), Duration::from_secs(30));
    }

    #[test]
    fn test_voice_validated_up_front() {
        let provider: Arc<dyn SpeechProvider> = Arc::new(MockProvider::always_succeeds(10));
        let narrator = Narrator::new(Arc::clone(&provider), " kore ").unwrap();
        assert_eq!(narrator.voice(), "Kore");

        let err = Narrator::new(provider, "Nobody").err().unwrap();
        assert!(matches!(err, SpeechError::InvalidVoice { .. }));
    }

    #[tokio::test]
    async fn test_transient_errors_retried() {
        let mock = Arc::new(MockProvider::fails_then_succeeds(2, SpeechError::Timeout));
        let narrator = Narrator::new(mock.clone(), "Kore")
            .unwrap()
            .with_retry(fast_retry(3));

        let segment = narrator.synthesize(&chunk("Hello there.")).await.unwrap();
        assert_eq!(segment.index, 0);
        assert_eq!(segment.chapter, 1);
        assert!(wav::parse_wav(&segment.data).is_ok());
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let mock = Arc::new(MockProvider::always_fails(SpeechError::Network(
            "connection reset".to_string(),
        )));
        let narrator = Narrator::new(mock.clone(), "Kore")
            .unwrap()
            .with_retry(fast_retry(2));

        let err = narrator.synthesize(&chunk("Hello.")).await.unwrap_err();
        assert!(matches!(err, SpeechError::Network(_)));
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_auth_errors_not_retried() {
        let mock = Arc::new(MockProvider::always_fails(SpeechError::AuthenticationFailed {
            provider: "mock".to_string(),
            message: "bad key".to_string(),
        }));
        let narrator = Narrator::new(mock.clone(), "Kore")
            .unwrap()
            .with_retry(fast_retry(4));

        let err = narrator.synthesize(&chunk("Hello.")).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_text_cleaned_before_sending() {
        let mock = Arc::new(MockProvider::always_succeeds(10));
        let narrator = Narrator::new(mock.clone(), "Kore").unwrap();

        narrator
            .synthesize(&chunk("## Heading\n\nShe said **“hi”**."))
            .await
            .unwrap();
        assert_eq!(mock.request_texts(), vec!["Heading\n\nShe said \"hi\"."]);
    }

    #[tokio::test]
    async fn test_temperature_and_prompt_forwarded() {
        let mock = Arc::new(MockProvider::always_succeeds(10));
        let narrator = Narrator::new(mock.clone(), "Kore")
            .unwrap()
            .with_temperature(Some(1.0));
        narrator.synthesize(&chunk("Hello.")).await.unwrap();

        let plain = Narrator::new(mock.clone(), "Kore")
            .unwrap()
            .with_style_prompt(None);
        plain.synthesize(&chunk("Hello.")).await.unwrap();

        let requests = mock.requests();
        assert_eq!(requests[0].temperature, Some(1.0));
        assert_eq!(requests[0].style_prompt.as_deref(), Some(NARRATOR_PROMPT));
        assert_eq!(requests[1].temperature, None);
        assert!(requests[1].style_prompt.is_none());
    }
}
