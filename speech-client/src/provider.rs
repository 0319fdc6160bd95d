use async_trait::async_trait;

use crate::error::{Result, SpeechError};
use crate::voices;

/// Request to synthesize one piece of text
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub voice: String,
    /// Style instructions read by the model but not spoken
    pub style_prompt: Option<String>,
    /// Sampling temperature; the service default when unset
    pub temperature: Option<f32>,
}

impl SpeechRequest {
    pub fn new(text: impl Into<String>, voice: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            voice: voice.into(),
            style_prompt: None,
            temperature: None,
        }
    }

    pub fn with_style_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.style_prompt = Some(prompt.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Synthesized audio, always a complete WAV file
#[derive(Debug, Clone)]
pub struct SpeechResponse {
    pub audio: Vec<u8>,
    pub model: String,
}

/// Trait for speech synthesis providers
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Synthesize the request text into WAV audio
    async fn synthesize(&self, request: SpeechRequest) -> Result<SpeechResponse>;

    /// Get the provider name for display
    fn name(&self) -> &'static str;

    /// Voices this provider accepts
    fn voices(&self) -> &[&'static str];

    /// Map a user-supplied voice name onto the provider's canonical spelling
    fn resolve_voice(&self, voice: &str) -> Result<&'static str> {
        voices::find_voice(self.voices(), voice).ok_or_else(|| SpeechError::InvalidVoice {
            voice: voice.to_string(),
            provider: self.name().to_string(),
        })
    }
}
