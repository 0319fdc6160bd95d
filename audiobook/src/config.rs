//! audiobook configuration management.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use speech_client::providers::DEFAULT_MODEL;
use speech_client::voices::DEFAULT_VOICE;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::audio::assembler::DEFAULT_BITRATE;
use crate::chapters::{ChapterLocator, DEFAULT_MIN_CHAPTER_CHARS, LocateError};
use crate::pipeline::DEFAULT_CONCURRENCY;
use crate::text::chunker::DEFAULT_MAX_CHUNK_CHARS;
use crate::tts::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudiobookConfig {
    /// Narrator voice
    #[serde(default = "default_voice")]
    pub voice: String,

    /// TTS model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum characters per synthesis request
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Concurrent synthesis requests
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Encoder bitrate for mp3/m4b output
    #[serde(default = "default_bitrate")]
    pub bitrate: String,

    /// Headings with less body text than this are treated as table-of-contents entries
    #[serde(default = "default_min_chapter_chars")]
    pub min_chapter_chars: usize,

    /// Also detect "7. Title" style headings
    #[serde(default)]
    pub numbered_headings: bool,

    /// Extra heading regexes; each needs a `num` capture group
    #[serde(default)]
    pub heading_patterns: Vec<String>,

    /// Sampling temperature sent with each request
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Send narration style instructions with each chunk
    #[serde(default = "default_narrator_prompt")]
    pub narrator_prompt: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Parent directory for per-run working directories
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub work_dir: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffmpeg_path: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ffprobe_path: Option<PathBuf>,
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_max_chunk_chars() -> usize {
    DEFAULT_MAX_CHUNK_CHARS
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_max_retries() -> u32 {
    4
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_retry_max_delay_ms() -> u64 {
    30_000
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_bitrate() -> String {
    DEFAULT_BITRATE.to_string()
}

fn default_min_chapter_chars() -> usize {
    DEFAULT_MIN_CHAPTER_CHARS
}

fn default_temperature() -> f32 {
    1.0
}

fn default_narrator_prompt() -> bool {
    true
}

impl Default for AudiobookConfig {
    fn default() -> Self {
        Self {
            voice: default_voice(),
            model: default_model(),
            max_chunk_chars: default_max_chunk_chars(),
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            bitrate: default_bitrate(),
            min_chapter_chars: default_min_chapter_chars(),
            numbered_headings: false,
            heading_patterns: Vec::new(),
            temperature: default_temperature(),
            narrator_prompt: default_narrator_prompt(),
            api_key: None,
            base_url: None,
            work_dir: None,
            ffmpeg_path: None,
            ffprobe_path: None,
        }
    }
}

impl AudiobookConfig {
    /// Get the config file path: ~/.config/cli-programs/audiobook.toml
    pub fn config_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home
            .join(".config")
            .join("cli-programs")
            .join("audiobook.toml"))
    }

    /// Load config from file, returning default if file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Chapter locator configured with this file's heading settings.
    pub fn locator(&self) -> Result<ChapterLocator, LocateError> {
        let mut locator = ChapterLocator::new()
            .with_numbered_headings(self.numbered_headings)
            .with_min_chapter_chars(self.min_chapter_chars);
        for pattern in &self.heading_patterns {
            locator = locator.with_pattern(pattern)?;
        }
        Ok(locator)
    }

    /// TOML for display, with the API key masked.
    pub fn display_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        if shown.api_key.is_some() {
            shown.api_key = Some("********".to_string());
        }
        toml::to_string_pretty(&shown).context("Failed to serialize configuration")
    }
}
