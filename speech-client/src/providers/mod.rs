//! Speech provider implementations

mod gemini;
pub mod mock;

pub use gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL, DEFAULT_TIMEOUT, GeminiProvider};
pub use mock::MockProvider;

use std::time::Duration;

use crate::error::{Result, SpeechError};
use crate::provider::SpeechProvider;

/// Supported provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Gemini,
}

impl ProviderKind {
    /// Parse provider kind from string
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            _ => Err(SpeechError::ConfigError(format!("Unknown provider: {}", s))),
        }
    }

    /// Display name used in messages
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Gemini => "Gemini",
        }
    }

    /// Environment variables checked for the API key, in order
    pub fn env_vars(&self) -> &'static [&'static str] {
        match self {
            Self::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        }
    }
}

/// Connection settings for building a provider
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub model: String,
    pub api_key: String,
    pub base_url: Option<String>,
    pub timeout: Duration,
}

/// Create a provider instance from explicit settings
pub fn get_provider(kind: ProviderKind, settings: ProviderSettings) -> Result<Box<dyn SpeechProvider>> {
    match kind {
        ProviderKind::Gemini => {
            let base_url = settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
            Ok(Box::new(GeminiProvider::with_options(
                &settings.model,
                settings.api_key,
                base_url,
                settings.timeout,
            )?))
        }
    }
}

/// Get the API key from config, falling back to the provider's environment variables
pub fn resolve_api_key(configured: Option<&str>, kind: ProviderKind) -> Result<String> {
    resolve_api_key_with(configured, kind, |name| std::env::var(name).ok())
}

fn resolve_api_key_with(
    configured: Option<&str>,
    kind: ProviderKind,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<String> {
    // Check config first
    if let Some(key) = configured.map(str::trim).filter(|k| !k.is_empty()) {
        return Ok(key.to_string());
    }

    kind.env_vars()
        .iter()
        .filter_map(|name| lookup(name))
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
        .ok_or_else(|| SpeechError::MissingApiKey {
            provider: kind.display_name().to_string(),
            env_var: kind.env_vars().join(" or "),
        })
}
