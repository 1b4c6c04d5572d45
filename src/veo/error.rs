//! Error type for Vertex AI and Gemini operations.

/// Errors that can occur while enhancing prompts or driving a Veo operation.
#[derive(Debug, thiserror::Error)]
pub enum VeoError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Empty prompt")]
    EmptyPrompt,

    #[error("Invalid duration: {seconds}s (must be between 1 and {max}s)")]
    InvalidDuration {
        /// Requested duration in seconds
        seconds: u32,
        /// Largest duration the provider accepts
        max: u32,
    },

    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Invalid operation handle: {0}")]
    InvalidHandle(String),

    #[error("Upstream error ({status}): {message}")]
    Upstream {
        /// HTTP status returned by the provider
        status: u16,
        /// Provider error message, or the raw body when unstructured
        message: String,
    },

    #[error("Model returned an empty response")]
    UpstreamEmptyResponse,

    #[error("Could not resolve result: {0}")]
    Resolution(String),

    #[error("Generation timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

impl VeoError {
    /// HTTP status a caller should associate with this error.
    ///
    /// Provider statuses pass through unchanged; malformed input maps to 400
    /// and everything else to 500.
    pub fn http_status(&self) -> u16 {
        match self {
            VeoError::Upstream { status, .. } => *status,
            VeoError::InvalidHandle(_)
            | VeoError::EmptyPrompt
            | VeoError::InvalidDuration { .. } => 400,
            _ => 500,
        }
    }
}
