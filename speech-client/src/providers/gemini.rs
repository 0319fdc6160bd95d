//! Gemini text-to-speech over the Generative Language REST API
//!
//! One `generateContent` call per request with an AUDIO response modality and
//! a prebuilt voice. Audio comes back as base64 L16 PCM, which is wrapped in a
//! WAV container before it is returned.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SpeechError};
use crate::provider::{SpeechProvider, SpeechRequest, SpeechResponse};
use crate::voices::GEMINI_VOICES;
use crate::wav;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Provider for Gemini TTS models
pub struct GeminiProvider {
    model: String,
    base_url: String,
    api_key: String,
    client: Client,
}

impl GeminiProvider {
    /// Create a new Gemini provider with the default endpoint and timeout
    pub fn new(model: &str, api_key: String) -> Result<Self> {
        Self::with_options(model, api_key, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Create a provider against a custom endpoint
    pub fn with_options(
        model: &str,
        api_key: String,
        base_url: &str,
        timeout: Duration,
    ) -> Result<Self> {
        if api_key.trim().is_empty() {
            return Err(SpeechError::MissingApiKey {
                provider: "Gemini".to_string(),
                env_var: "GEMINI_API_KEY".to_string(),
            });
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SpeechError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            model: model.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

// Generative Language API request/response types

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    response_modalities: Vec<&'static str>,
    speech_config: SpeechConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResponsePart {
    inline_data: Option<InlineData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

fn build_request(request: &SpeechRequest) -> GenerateContentRequest {
    let text = match &request.style_prompt {
        Some(prompt) => format!("{}\n\nText to read:\n{}", prompt.trim_end(), request.text),
        None => request.text.clone(),
    };

    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts: vec![TextPart { text }],
        }],
        generation_config: GenerationConfig {
            response_modalities: vec!["AUDIO"],
            speech_config: SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: request.voice.clone(),
                    },
                },
            },
            temperature: request.temperature,
        },
    }
}

/// Map a non-success HTTP status onto the error taxonomy.
fn classify_status(
    status: u16,
    message: String,
    retry_after: Option<u64>,
    voice: &str,
) -> SpeechError {
    match status {
        401 | 403 => SpeechError::AuthenticationFailed {
            provider: "Gemini".to_string(),
            message,
        },
        429 => SpeechError::RateLimited { retry_after },
        400 if message.to_lowercase().contains("voice") => SpeechError::InvalidVoice {
            voice: voice.to_string(),
            provider: "Gemini".to_string(),
        },
        500 | 502 | 503 | 504 => SpeechError::ServerOverloaded {
            status_code: status,
            message,
        },
        _ => SpeechError::ApiError {
            message,
            status_code: Some(status),
        },
    }
}

/// Collect the inline audio parts of the first candidate into a WAV file.
fn extract_audio(response: GenerateContentResponse) -> Result<Vec<u8>> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or(SpeechError::EmptyAudio { reason: None })?;

    let mut pcm = Vec::new();
    let mut mime_type = None;

    let parts = candidate.content.map(|c| c.parts).unwrap_or_default();
    for inline in parts.into_iter().filter_map(|p| p.inline_data) {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(inline.data.as_bytes())
            .map_err(|e| SpeechError::InvalidAudio(format!("bad base64 payload: {}", e)))?;
        pcm.extend_from_slice(&bytes);
        mime_type.get_or_insert(inline.mime_type);
    }

    if pcm.is_empty() {
        return Err(SpeechError::EmptyAudio {
            reason: candidate.finish_reason,
        });
    }

    let format = wav::parse_pcm_mime(mime_type.as_deref().unwrap_or("audio/L16;rate=24000"));
    Ok(wav::encode_wav(format, &pcm))
}

#[async_trait]
impl SpeechProvider for GeminiProvider {
    async fn synthesize(&self, request: SpeechRequest) -> Result<SpeechResponse> {
        let body = build_request(&request);

        log::debug!(
            "Gemini request: model={} voice={} chars={}",
            self.model,
            request.voice,
            request.text.chars().count()
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SpeechError::Timeout
                } else {
                    SpeechError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let error_text = response.text().await.unwrap_or_default();
            let message =
                if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                    error_response.error.message
                } else {
                    error_text
                };

            return Err(classify_status(
                status.as_u16(),
                message,
                retry_after,
                &request.voice,
            ));
        }

        let parsed: GenerateContentResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                SpeechError::Timeout
            } else {
                SpeechError::ApiError {
                    message: format!("Failed to parse response: {}", e),
                    status_code: None,
                }
            }
        })?;

        Ok(SpeechResponse {
            audio: extract_audio(parsed)?,
            model: self.model.clone(),
        })
    }

    fn name(&self) -> &'static str {
        "Gemini"
    }

    fn voices(&self) -> &[&'static str] {
        GEMINI_VOICES
    }
}
