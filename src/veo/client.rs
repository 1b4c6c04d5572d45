//! VeoClient - submits and polls Veo long-running operations on Vertex AI.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use super::auth::TokenSource;
use super::error::VeoError;
use super::handle::{parse_handle, OperationKind};
use super::resolver::{decode_data_url, gcs_location, resolve, OperationResponse, TerminalResult};
use super::status::{PollReport, TaskStatus};

/// The environment variable holding the Google Cloud project id.
pub const GCP_PROJECT_ID_ENV: &str = "GCP_PROJECT_ID";

/// The environment variable holding the Vertex AI region.
pub const GCP_LOCATION_ID_ENV: &str = "GCP_LOCATION_ID";

/// The environment variable overriding the Veo model.
pub const VEO_MODEL_ID_ENV: &str = "VEO_MODEL_ID";

/// The environment variable with a `gs://` prefix for generated videos.
pub const VIDEO_STORAGE_GCS_URI_ENV: &str = "VIDEO_STORAGE_GCS_URI";

/// Default Vertex AI region.
pub const DEFAULT_REGION: &str = "us-central1";

/// Default model for video generation.
pub const DEFAULT_MODEL: &str = "veo-3.0-generate-preview";

/// Longest clip Veo accepts, in seconds.
pub const MAX_DURATION_SECONDS: u32 = 8;

/// Host serving the Cloud Storage JSON API.
const STORAGE_API_BASE_URL: &str = "https://storage.googleapis.com";

/// Message used when a failed poll carries no usable error text.
const DEFAULT_POLL_ERROR: &str = "failed to query operation status";

/// Default timeout for HTTP requests (60 seconds).
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Validate a prompt before sending it to any API.
///
/// # Returns
/// `Ok(())` if the prompt is valid, `Err(VeoError::EmptyPrompt)` otherwise.
pub fn validate_prompt(prompt: &str) -> Result<(), VeoError> {
    if prompt.trim().is_empty() {
        return Err(VeoError::EmptyPrompt);
    }
    Ok(())
}

/// A video generation job as submitted by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub duration_seconds: u32,
    pub audio_enabled: bool,
    /// Overrides the client's storage destination for this job.
    pub storage_uri: Option<String>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, duration_seconds: u32) -> Self {
        Self {
            prompt: prompt.into(),
            duration_seconds,
            audio_enabled: false,
            storage_uri: None,
        }
    }

    pub fn with_audio(mut self, audio_enabled: bool) -> Self {
        self.audio_enabled = audio_enabled;
        self
    }

    pub fn with_storage_uri(mut self, storage_uri: Option<String>) -> Self {
        self.storage_uri = storage_uri;
        self
    }

    /// Check prompt and duration before any network call.
    pub fn validate(&self) -> Result<(), VeoError> {
        validate_prompt(&self.prompt)?;
        if self.duration_seconds == 0 || self.duration_seconds > MAX_DURATION_SECONDS {
            return Err(VeoError::InvalidDuration {
                seconds: self.duration_seconds,
                max: MAX_DURATION_SECONDS,
            });
        }
        Ok(())
    }
}

/// Opaque name of a long-running operation, as issued by Vertex AI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationHandle(String);

impl OperationHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request body for `predictLongRunning`.
#[derive(Debug, Serialize)]
struct PredictLongRunningRequest<'a> {
    instances: Vec<Instance<'a>>,
    parameters: Parameters<'a>,
}

#[derive(Debug, Serialize)]
struct Instance<'a> {
    prompt: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Parameters<'a> {
    duration_seconds: u32,
    audio_enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    storage_uri: Option<&'a str>,
}

/// Request body for `fetchPredictOperation`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FetchPredictOperationRequest<'a> {
    operation_name: &'a str,
}

/// Response from `predictLongRunning`.
#[derive(Debug, Default, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    name: Option<String>,
}

/// Long-running operation envelope returned by both poll endpoints.
#[derive(Debug, Default, Deserialize)]
struct OperationEnvelope {
    #[serde(default)]
    done: Option<bool>,
    #[serde(default)]
    response: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<ProviderError>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<ProviderError>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderError {
    #[serde(default)]
    message: Option<String>,
}

impl ProviderError {
    fn message(&self) -> Option<String> {
        self.message
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
    }
}

/// Poll body after parsing: either an operation envelope or unreadable text.
enum PollBody {
    Envelope(OperationEnvelope),
    Raw(String),
}

fn parse_poll_body(text: &str) -> PollBody {
    if text.trim().is_empty() {
        return PollBody::Envelope(OperationEnvelope::default());
    }
    match serde_json::from_str::<OperationEnvelope>(text) {
        Ok(envelope) => PollBody::Envelope(envelope),
        Err(_) => PollBody::Raw(text.trim().to_string()),
    }
}

/// Pick the most useful error text from a provider response body.
///
/// Prefers the structured `error.message`, falling back to the raw body.
pub(crate) fn upstream_message(text: &str) -> Option<String> {
    serde_json::from_str::<ErrorBody>(text)
        .ok()
        .and_then(|body| body.error)
        .and_then(|e| e.message())
        .or_else(|| {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        })
}

/// Normalize a raw poll response into a task status.
///
/// Pure: given the HTTP status and body of a poll request, decides the
/// status a caller sees. Never fails.
pub fn interpret_poll_response(http_status: u16, body: &str) -> PollReport {
    let parsed = parse_poll_body(body);

    if !(200..300).contains(&http_status) {
        let message = match &parsed {
            PollBody::Envelope(envelope) => envelope.error.as_ref().and_then(ProviderError::message),
            PollBody::Raw(raw) => Some(raw.clone()),
        }
        .unwrap_or_else(|| DEFAULT_POLL_ERROR.to_string());
        return PollReport::failed(message, http_status);
    }

    let envelope = match parsed {
        PollBody::Envelope(envelope) => envelope,
        PollBody::Raw(raw) => {
            log::debug!("Operation status body is not JSON, treating as running: {}", raw);
            return PollReport::ok(TaskStatus::processing());
        }
    };

    if envelope.done != Some(true) {
        return PollReport::ok(TaskStatus::processing());
    }

    if let Some(message) = envelope.error.as_ref().and_then(ProviderError::message) {
        return PollReport::failed(message, 500);
    }

    let response: OperationResponse = match envelope.response {
        Some(value) => match serde_json::from_value(value) {
            Ok(response) => response,
            Err(e) => {
                return PollReport::failed(format!("unexpected operation response: {}", e), 500)
            }
        },
        None => OperationResponse::default(),
    };

    match resolve(&response) {
        Ok(result) => PollReport::ok(result.into_status()),
        Err(VeoError::Resolution(message)) => PollReport::failed(message, 500),
        Err(e) => PollReport::failed(e.to_string(), 500),
    }
}

/// Client for Veo video generation on Vertex AI.
pub struct VeoClient {
    project_id: String,
    region: String,
    model: String,
    storage_uri: Option<String>,
    endpoint: Option<String>,
    http_client: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
}

impl VeoClient {
    /// Create a VeoClient for `project_id` with default region and model.
    ///
    /// # Errors
    ///
    /// Returns `VeoError::Configuration` if the project id is empty.
    pub fn new(project_id: String, tokens: Arc<dyn TokenSource>) -> Result<Self, VeoError> {
        if project_id.trim().is_empty() {
            return Err(VeoError::Configuration(format!(
                "{} is not set",
                GCP_PROJECT_ID_ENV
            )));
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            project_id,
            region: DEFAULT_REGION.to_string(),
            model: DEFAULT_MODEL.to_string(),
            storage_uri: None,
            endpoint: None,
            http_client,
            tokens,
        })
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = region.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Default `gs://` destination for generated videos.
    pub fn with_storage_uri(mut self, storage_uri: Option<String>) -> Self {
        self.storage_uri = storage_uri;
        self
    }

    /// Send every request to `endpoint` instead of the regional Google hosts.
    ///
    /// Useful for testing against a mock server.
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        self.endpoint = endpoint.map(|e| e.trim_end_matches('/').to_string());
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn storage_uri(&self) -> Option<&str> {
        self.storage_uri.as_deref()
    }

    fn aiplatform_host(&self, region: &str) -> String {
        match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://{}-aiplatform.googleapis.com", region),
        }
    }

    fn storage_host(&self) -> &str {
        self.endpoint.as_deref().unwrap_or(STORAGE_API_BASE_URL)
    }

    /// Submit a video generation job.
    ///
    /// Returns the operation handle to poll. A failed submission is returned
    /// as is; retrying is left to the caller.
    ///
    /// # Errors
    ///
    /// Returns `VeoError::EmptyPrompt` or `VeoError::InvalidDuration` for a bad
    /// request, `VeoError::Upstream` if Vertex AI rejects it,
    /// `VeoError::Submission` if the response has no operation name,
    /// or `VeoError::Http` if the request fails.
    pub async fn submit(&self, request: &GenerationRequest) -> Result<OperationHandle, VeoError> {
        request.validate()?;

        let url = format!(
            "{}/v1/projects/{}/locations/{}/publishers/google/models/{}:predictLongRunning",
            self.aiplatform_host(&self.region),
            self.project_id,
            self.region,
            self.model
        );

        let body = PredictLongRunningRequest {
            instances: vec![Instance {
                prompt: &request.prompt,
            }],
            parameters: Parameters {
                duration_seconds: request.duration_seconds,
                audio_enabled: request.audio_enabled,
                storage_uri: request
                    .storage_uri
                    .as_deref()
                    .or(self.storage_uri.as_deref()),
            },
        };

        let token = self.tokens.access_token().await?;

        log::info!(
            "Submitting {}s video job to {} ({})",
            request.duration_seconds,
            self.model,
            self.region
        );

        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();

        if !status.is_success() {
            let message = upstream_message(&text)
                .unwrap_or_else(|| "video generation request failed".to_string());
            log::warn!("Veo submission failed with status {}: {}", status, message);
            return Err(VeoError::Upstream {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: SubmitResponse = serde_json::from_str(&text).unwrap_or_default();
        match parsed.name.filter(|name| !name.trim().is_empty()) {
            Some(name) => {
                log::info!("Operation started: {}", name);
                Ok(OperationHandle(name))
            }
            None => Err(VeoError::Submission("operation name missing".to_string())),
        }
    }

    /// Check the status of an operation once.
    ///
    /// Never fails: transport, auth, handle and resolution problems all come
    /// back as `TaskStatus::Error` with a message and an HTTP status.
    pub async fn poll(&self, handle: &str) -> PollReport {
        match self.try_poll(handle).await {
            Ok(report) => report,
            Err(e) => {
                log::warn!("Status check for {} failed: {}", handle, e);
                PollReport::failed(e.to_string(), e.http_status())
            }
        }
    }

    async fn try_poll(&self, handle: &str) -> Result<PollReport, VeoError> {
        let route = parse_handle(handle, &self.region)?;
        let host = self.aiplatform_host(&route.region);
        let token = self.tokens.access_token().await?;

        let request = match &route.kind {
            OperationKind::PublisherModel { model_path } => self
                .http_client
                .post(format!("{}/v1/{}:fetchPredictOperation", host, model_path))
                .json(&FetchPredictOperationRequest {
                    operation_name: &route.name,
                }),
            OperationKind::Generic => self
                .http_client
                .get(format!("{}/v1/{}", host, route.name)),
        };

        let response = request.bearer_auth(&token).send().await?;
        let status = response.status().as_u16();
        let text = response.text().await?;

        let report = interpret_poll_response(status, &text);
        if let TaskStatus::Error { error } = &report.status {
            log::warn!("Operation {} reported error ({}): {}", route.name, status, error);
        } else {
            log::debug!("Operation {} is {}", route.name, report.status.label());
        }
        Ok(report)
    }

    /// Write a generated video to `dest`.
    ///
    /// Inline results are decoded directly. `gs://` references are read
    /// through the Cloud Storage JSON API with the client's credentials, so
    /// private buckets work; any other URL is fetched as is. The body is
    /// streamed to disk.
    ///
    /// # Errors
    ///
    /// Returns `VeoError::Decode` for a corrupt inline payload,
    /// `VeoError::Upstream` if the download is rejected,
    /// `VeoError::Http` or `VeoError::Io` on transfer failures.
    pub async fn download(&self, result: &TerminalResult, dest: &Path) -> Result<PathBuf, VeoError> {
        if let Some(parent) = dest.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let (url, raw_uri) = match result {
            TerminalResult::Inline { url, .. } => {
                let bytes = decode_data_url(url)?;
                tokio::fs::write(dest, bytes).await?;
                return Ok(dest.to_path_buf());
            }
            TerminalResult::RemoteReference { url, raw_uri, .. } => (url, raw_uri),
        };

        let request = match gcs_location(raw_uri) {
            Some((bucket, object)) => {
                let object_url = self.storage_object_url(bucket, object)?;
                let token = self.tokens.access_token().await?;
                self.http_client.get(object_url).bearer_auth(token)
            }
            None => self.http_client.get(url.as_str()),
        };

        log::info!("Downloading {} to {}", raw_uri, dest.display());

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(VeoError::Upstream {
                status: status.as_u16(),
                message: upstream_message(&text)
                    .unwrap_or_else(|| "video download failed".to_string()),
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();

        use futures_util::StreamExt;
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            file.write_all(&chunk).await?;
        }

        file.flush().await?;

        Ok(dest.to_path_buf())
    }

    fn storage_object_url(&self, bucket: &str, object: &str) -> Result<reqwest::Url, VeoError> {
        let base = format!("{}/storage/v1/b", self.storage_host());
        let mut url = reqwest::Url::parse(&base)
            .map_err(|e| VeoError::Configuration(format!("invalid storage endpoint: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| VeoError::Configuration("invalid storage endpoint".to_string()))?
            .push(bucket)
            .push("o")
            .push(object);
        url.query_pairs_mut().append_pair("alt", "media");
        Ok(url)
    }
}
