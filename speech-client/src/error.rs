use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SpeechError {
    #[error(
        "API key not found for {provider}. Set {env_var} environment variable or add api_key to config."
    )]
    MissingApiKey { provider: String, env_var: String },

    #[error("Authentication failed for {provider}: {message}")]
    AuthenticationFailed { provider: String, message: String },

    #[error("Unknown voice '{voice}' for {provider}. Run 'audiobook voices' to list available voices.")]
    InvalidVoice { voice: String, provider: String },

    #[error("Rate limit exceeded{}", .retry_after.map(|s| format!(". Retry after {} seconds", s)).unwrap_or_default())]
    RateLimited { retry_after: Option<u64> },

    #[error("Server overloaded (HTTP {status_code}): {message}")]
    ServerOverloaded { status_code: u16, message: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Service returned no audio{}", .reason.as_ref().map(|r| format!(" (finish reason: {})", r)).unwrap_or_default())]
    EmptyAudio { reason: Option<String> },

    #[error("Invalid audio payload: {0}")]
    InvalidAudio(String),

    #[error("API error{}: {message}", status_code.map(|c| format!(" (HTTP {})", c)).unwrap_or_default())]
    ApiError {
        message: String,
        status_code: Option<u16>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl SpeechError {
    /// Whether a retry has a chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. }
                | Self::ServerOverloaded { .. }
                | Self::Timeout
                | Self::Network(_)
                | Self::EmptyAudio { .. }
        )
    }

    /// Credential or voice problems that abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingApiKey { .. } | Self::AuthenticationFailed { .. } | Self::InvalidVoice { .. }
        )
    }

    /// Whether this is a credential problem.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::MissingApiKey { .. } | Self::AuthenticationFailed { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, SpeechError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(SpeechError::RateLimited { retry_after: None }.is_retryable());
        assert!(SpeechError::Timeout.is_retryable());
        assert!(SpeechError::Network("reset".into()).is_retryable());
        assert!(
            SpeechError::ServerOverloaded {
                status_code: 503,
                message: "busy".into()
            }
            .is_retryable()
        );

        let auth = SpeechError::AuthenticationFailed {
            provider: "Gemini".into(),
            message: "bad key".into(),
        };
        assert!(!auth.is_retryable());
        assert!(auth.is_fatal());
        assert!(auth.is_auth());

        let voice = SpeechError::InvalidVoice {
            voice: "Nobody".into(),
            provider: "Gemini".into(),
        };
        assert!(!voice.is_retryable());
        assert!(voice.is_fatal());
        assert!(!voice.is_auth());
    }

    #[test]
    fn test_rate_limited_message() {
        let err = SpeechError::RateLimited {
            retry_after: Some(7),
        };
        assert_eq!(err.to_string(), "Rate limit exceeded. Retry after 7 seconds");
        let err = SpeechError::RateLimited { retry_after: None };
        assert_eq!(err.to_string(), "Rate limit exceeded");
    }

    #[test]
    fn test_api_error_message() {
        let err = SpeechError::ApiError {
            message: "bad request".into(),
            status_code: Some(400),
        };
        assert_eq!(err.to_string(), "API error (HTTP 400): bad request");
    }
}
