//! Mock speech provider for testing
//!
//! Produces silent WAV audio and can simulate failures, retries and slow
//! responses.

use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::{Result, SpeechError};
use crate::provider::{SpeechProvider, SpeechRequest, SpeechResponse};
use crate::voices::GEMINI_VOICES;
use crate::wav::{self, PcmFormat};

/// A mock provider for testing retry, ordering and cancellation behavior
pub struct MockProvider {
    /// Number of times to fail before succeeding (0 = always succeed)
    fail_count: AtomicUsize,
    /// Current call count
    call_count: AtomicUsize,
    /// Error to return on failure
    fail_with: Option<SpeechError>,
    /// Fail every request whose text contains this marker
    fail_on_text: Option<(String, SpeechError)>,
    /// Audio duration returned per request
    duration_ms: u64,
    /// Artificial latency per request
    delay: Duration,
    format: PcmFormat,
    /// Every request received, in arrival order
    requests: Mutex<Vec<SpeechRequest>>,
}

impl MockProvider {
    fn base() -> Self {
        Self {
            fail_count: AtomicUsize::new(0),
            call_count: AtomicUsize::new(0),
            fail_with: None,
            fail_on_text: None,
            duration_ms: 500,
            delay: Duration::ZERO,
            format: PcmFormat::default(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a provider that returns `duration_ms` of silence per request
    pub fn always_succeeds(duration_ms: u64) -> Self {
        Self {
            duration_ms,
            ..Self::base()
        }
    }

    /// Create a provider that fails `n` times with the given error, then succeeds
    pub fn fails_then_succeeds(n: usize, error: SpeechError) -> Self {
        Self {
            fail_count: AtomicUsize::new(n),
            fail_with: Some(error),
            ..Self::base()
        }
    }

    /// Create a provider that always fails with the given error
    pub fn always_fails(error: SpeechError) -> Self {
        Self::fails_then_succeeds(usize::MAX, error)
    }

    /// Fail any request whose text contains `marker`
    pub fn fail_on_text(mut self, marker: &str, error: SpeechError) -> Self {
        self.fail_on_text = Some((marker.to_string(), error));
        self
    }

    /// Delay every response
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Use a different PCM layout for the generated audio
    pub fn with_format(mut self, format: PcmFormat) -> Self {
        self.format = format;
        self
    }

    /// Get the number of times synthesize() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Texts of all requests received so far
    pub fn request_texts(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|req| req.text.clone()).collect())
            .unwrap_or_default()
    }

    /// All requests received so far, in arrival order
    pub fn requests(&self) -> Vec<SpeechRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SpeechProvider for MockProvider {
    async fn synthesize(&self, request: SpeechRequest) -> Result<SpeechResponse> {
        let call_num = self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some((marker, error)) = &self.fail_on_text {
            if request.text.contains(marker.as_str()) {
                return Err(error.clone());
            }
        }

        if call_num < self.fail_count.load(Ordering::SeqCst) {
            if let Some(error) = &self.fail_with {
                return Err(error.clone());
            }
        }

        Ok(SpeechResponse {
            audio: wav::silence(self.format, self.duration_ms),
            model: "mock-model".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    fn voices(&self) -> &[&'static str] {
        GEMINI_VOICES
    }
}
