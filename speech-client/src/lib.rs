//! Speech synthesis client library for the audiobook workspace
//!
//! Provides a provider-neutral interface for text-to-speech services:
//! - Gemini TTS (Generative Language REST API)
//! - A mock provider for tests
//!
//! Every provider returns complete WAV files; [`wav`] holds the PCM helpers.

pub mod error;
pub mod provider;
pub mod providers;
pub mod voices;
pub mod wav;

pub use error::{Result, SpeechError};
pub use provider::{SpeechProvider, SpeechRequest, SpeechResponse};
pub use providers::{MockProvider, ProviderKind, ProviderSettings, get_provider, resolve_api_key};
