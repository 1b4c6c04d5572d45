//! PromptEnhancer - rewrites prompts with Gemini before video generation.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::VeoError;
use super::validate_prompt;

/// The environment variable name for the Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// The environment variable overriding the Gemini model.
pub const GEMINI_MODEL_ENV: &str = "GEMINI_MODEL";

/// Default base URL for the Gemini API.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model for prompt enhancement.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-pro";

/// Instruction sent alongside every prompt.
pub const ENHANCE_INSTRUCTION: &str = "You optimize prompts for AI-generated videos. \
Improve the prompt below, making it cinematic, descriptive and clear. \
Reply with ONLY the new prompt, without explanations.";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Status reported when a successful Gemini response cannot be decoded.
const UNREADABLE_RESPONSE_STATUS: u16 = 502;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    fn text(&self) -> String {
        self.candidates
            .first()
            .and_then(|c| c.content.as_ref())
            .map(|content| {
                content
                    .parts
                    .iter()
                    .filter_map(|p| p.text.as_deref())
                    .collect::<String>()
            })
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

/// Client for the Gemini `generateContent` endpoint.
pub struct PromptEnhancer {
    api_key: String,
    base_url: String,
    model: String,
    http_client: reqwest::Client,
}

impl PromptEnhancer {
    /// Create a PromptEnhancer from `GEMINI_API_KEY` and `GEMINI_MODEL`.
    ///
    /// # Errors
    ///
    /// Returns `VeoError::Configuration` if `GEMINI_API_KEY` is not set.
    pub fn new() -> Result<Self, VeoError> {
        let api_key = std::env::var(GEMINI_API_KEY_ENV).map_err(|_| {
            VeoError::Configuration(format!("{} is not set", GEMINI_API_KEY_ENV))
        })?;
        let model =
            std::env::var(GEMINI_MODEL_ENV).unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());
        Self::with_config(api_key, GEMINI_API_BASE_URL.to_string(), model)
    }

    pub fn with_api_key(api_key: String) -> Result<Self, VeoError> {
        Self::with_config(
            api_key,
            GEMINI_API_BASE_URL.to_string(),
            DEFAULT_GEMINI_MODEL.to_string(),
        )
    }

    /// Useful for testing against a mock server.
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, VeoError> {
        Self::with_config(api_key, base_url, DEFAULT_GEMINI_MODEL.to_string())
    }

    pub fn with_config(api_key: String, base_url: String, model: String) -> Result<Self, VeoError> {
        if api_key.trim().is_empty() {
            return Err(VeoError::Configuration(format!(
                "{} is not set",
                GEMINI_API_KEY_ENV
            )));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            http_client,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Ask Gemini for an improved version of `prompt`.
    ///
    /// One request, no retries. The result is not deterministic.
    ///
    /// # Errors
    ///
    /// Returns `VeoError::EmptyPrompt` for a blank prompt,
    /// `VeoError::Upstream` if Gemini rejects the request or blocks the prompt,
    /// `VeoError::UpstreamEmptyResponse` if it answers with blank text,
    /// or `VeoError::Http` if the request fails.
    pub async fn enhance(&self, prompt: &str) -> Result<String, VeoError> {
        validate_prompt(prompt)?;

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );

        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part {
                    text: ENHANCE_INSTRUCTION,
                }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: prompt }],
            }],
        };

        log::debug!("Enhancing prompt with {}", self.model);

        let response = self
            .http_client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = super::client::upstream_message(&text)
                .unwrap_or_else(|| "prompt enhancement failed".to_string());
            log::warn!("Gemini request failed with status {}: {}", status, message);
            return Err(VeoError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        if text.trim().is_empty() {
            return Err(VeoError::UpstreamEmptyResponse);
        }
        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| VeoError::Upstream {
                status: UNREADABLE_RESPONSE_STATUS,
                message: format!("unreadable response: {}", e),
            })?;

        let enhanced = parsed.text();
        if enhanced.is_empty() {
            if let Some(reason) = parsed.prompt_feedback.and_then(|f| f.block_reason) {
                return Err(VeoError::Upstream {
                    status: status.as_u16(),
                    message: format!("prompt blocked: {}", reason),
                });
            }
            return Err(VeoError::UpstreamEmptyResponse);
        }

        Ok(enhanced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_api_key_uses_defaults() {
        let enhancer = PromptEnhancer::with_api_key("key".to_string()).unwrap();
        assert_eq!(enhancer.base_url(), GEMINI_API_BASE_URL);
        assert_eq!(enhancer.model(), DEFAULT_GEMINI_MODEL);
    }

    #[test]
    fn test_empty_api_key_is_configuration_error() {
        let result = PromptEnhancer::with_api_key("".to_string());
        assert!(matches!(result, Err(VeoError::Configuration(_))));
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let enhancer =
            PromptEnhancer::with_base_url("key".to_string(), "http://localhost:1/".to_string())
                .unwrap();
        assert_eq!(enhancer.base_url(), "http://localhost:1");
    }

    #[test]
    fn test_response_text_joins_parts() {
        let parsed: GenerateContentResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": " A slow "}, {"text": "dolly shot. "}]}}]
        }))
        .unwrap();
        assert_eq!(parsed.text(), "A slow dolly shot.");
    }

    #[test]
    fn test_response_without_candidates_is_empty() {
        let parsed: GenerateContentResponse =
            serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(parsed.text(), "");
    }

    #[test]
    fn test_request_body_shape() {
        let body = GenerateContentRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part { text: "sys" }],
            },
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: "a cat" }],
            }],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "systemInstruction": {"parts": [{"text": "sys"}]},
                "contents": [{"role": "user", "parts": [{"text": "a cat"}]}]
            })
        );
    }
}
