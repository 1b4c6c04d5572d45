//! Configuration file handling for veo-studio.
//!
//! Loads configuration from `~/.config/veo-studio/config.toml` or a custom path,
//! then layers environment variables on top. CLI flags are applied last by the
//! command handlers.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::veo::{
    Credentials, PromptEnhancer, ServiceAccountTokens, StaticToken, TokenSource, VeoClient,
    VeoError, WatchOptions, DEFAULT_GEMINI_MODEL, DEFAULT_MODEL, DEFAULT_POLL_INTERVAL,
    DEFAULT_REGION, GCP_LOCATION_ID_ENV, GCP_PROJECT_ID_ENV, GEMINI_API_BASE_URL,
    GEMINI_API_KEY_ENV, GEMINI_MODEL_ENV, VEO_MODEL_ID_ENV, VIDEO_STORAGE_GCS_URI_ENV,
};

/// Path to a service account key file.
pub const GOOGLE_APPLICATION_CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Service account email, used together with `GOOGLE_PRIVATE_KEY`.
pub const GOOGLE_CLIENT_EMAIL_ENV: &str = "GOOGLE_CLIENT_EMAIL";

/// Service account private key (PEM, `\n` may be escaped).
pub const GOOGLE_PRIVATE_KEY_ENV: &str = "GOOGLE_PRIVATE_KEY";

/// Default ceiling on a watch, in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Configuration file structure for veo-studio.
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub vertex: VertexConfig,
    #[serde(default)]
    pub gemini: GeminiConfig,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

#[derive(Debug, Deserialize, Default)]
pub struct VertexConfig {
    pub project_id: Option<String>,
    pub region: Option<String>,
    pub model: Option<String>,
    pub storage_uri: Option<String>,
    /// Replaces the regional Google hosts, e.g. for a local mock.
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct GeminiConfig {
    pub model: Option<String>,
    pub endpoint: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
pub struct PollingConfig {
    pub interval_secs: Option<u64>,
    pub max_attempts: Option<u32>,
    /// 0 disables the time limit.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CredentialsConfig {
    pub credentials_file: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file path.
    ///
    /// Without an explicit path, a missing default file yields the default
    /// config. An explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (default_path(), false),
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigError::NotFound { path });
            }
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            path: path.clone(),
            source: e,
        })?;
        Self::parse(&content).map_err(|e| ConfigError::ParseError { path, source: e })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    NotFound {
        path: PathBuf,
    },
    IoError {
        path: PathBuf,
        source: std::io::Error,
    },
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound { path } => {
                write!(f, "Config file '{}' does not exist", path.display())
            }
            ConfigError::IoError { path, source } => {
                write!(
                    f,
                    "Failed to read config file '{}': {}",
                    path.display(),
                    source
                )
            }
            ConfigError::ParseError { path, source } => {
                write!(
                    f,
                    "Failed to parse config file '{}': {}",
                    path.display(),
                    source
                )
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::NotFound { .. } => None,
            ConfigError::IoError { source, .. } => Some(source),
            ConfigError::ParseError { source, .. } => Some(source),
        }
    }
}

/// Get the default config file path.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .map(|d| d.join("veo-studio").join("config.toml"))
        .unwrap_or_else(|| {
            let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
            PathBuf::from(home).join(".config/veo-studio/config.toml")
        })
}

/// Effective settings: config file overlaid with environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub project_id: Option<String>,
    pub region: String,
    pub model: String,
    pub storage_uri: Option<String>,
    pub vertex_endpoint: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub gemini_endpoint: String,
    pub credentials: Option<Credentials>,
    pub watch: WatchOptions,
}

impl Settings {
    /// Resolve settings from the process environment.
    pub fn from_env(config: &Config) -> Self {
        Self::resolve(config, |key| std::env::var(key).ok())
    }

    /// Resolve settings using `env` to look up variables. Empty values count
    /// as unset.
    pub fn resolve<F>(config: &Config, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| env(key).filter(|v| !v.trim().is_empty());

        let credentials = var(GOOGLE_APPLICATION_CREDENTIALS_ENV)
            .map(|p| Credentials::File(PathBuf::from(p)))
            .or_else(|| {
                match (var(GOOGLE_CLIENT_EMAIL_ENV), var(GOOGLE_PRIVATE_KEY_ENV)) {
                    (Some(email), Some(key)) => Some(Credentials::from_key_parts(&email, &key)),
                    _ => None,
                }
            })
            .or_else(|| config.credentials.credentials_file.clone().map(Credentials::File));

        let timeout_secs = config.polling.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            project_id: var(GCP_PROJECT_ID_ENV).or_else(|| config.vertex.project_id.clone()),
            region: var(GCP_LOCATION_ID_ENV)
                .or_else(|| config.vertex.region.clone())
                .unwrap_or_else(|| DEFAULT_REGION.to_string()),
            model: var(VEO_MODEL_ID_ENV)
                .or_else(|| config.vertex.model.clone())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            storage_uri: var(VIDEO_STORAGE_GCS_URI_ENV).or_else(|| config.vertex.storage_uri.clone()),
            vertex_endpoint: config.vertex.endpoint.clone(),
            gemini_api_key: var(GEMINI_API_KEY_ENV),
            gemini_model: var(GEMINI_MODEL_ENV)
                .or_else(|| config.gemini.model.clone())
                .unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            gemini_endpoint: config
                .gemini
                .endpoint
                .clone()
                .unwrap_or_else(|| GEMINI_API_BASE_URL.to_string()),
            credentials,
            watch: WatchOptions {
                interval: config
                    .polling
                    .interval_secs
                    .map(Duration::from_secs)
                    .unwrap_or(DEFAULT_POLL_INTERVAL),
                max_attempts: config.polling.max_attempts,
                max_elapsed: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            },
        }
    }

    /// Build the token source: an explicit access token wins over
    /// service account credentials.
    pub fn token_source(&self, access_token: Option<String>) -> Result<Arc<dyn TokenSource>, VeoError> {
        if let Some(token) = access_token {
            return Ok(Arc::new(StaticToken::new(token)?));
        }
        match &self.credentials {
            Some(credentials) => Ok(Arc::new(ServiceAccountTokens::from_credentials(credentials)?)),
            None => Err(VeoError::Configuration(format!(
                "no credentials: set {} or {} and {}",
                GOOGLE_APPLICATION_CREDENTIALS_ENV, GOOGLE_CLIENT_EMAIL_ENV, GOOGLE_PRIVATE_KEY_ENV
            ))),
        }
    }

    pub fn veo_client(&self, access_token: Option<String>) -> Result<VeoClient, VeoError> {
        let project_id = self.project_id.clone().ok_or_else(|| {
            VeoError::Configuration(format!("{} is not set", GCP_PROJECT_ID_ENV))
        })?;
        let tokens = self.token_source(access_token)?;

        Ok(VeoClient::new(project_id, tokens)?
            .with_region(self.region.clone())
            .with_model(self.model.clone())
            .with_storage_uri(self.storage_uri.clone())
            .with_endpoint(self.vertex_endpoint.clone()))
    }

    pub fn prompt_enhancer(&self) -> Result<PromptEnhancer, VeoError> {
        let api_key = self.gemini_api_key.clone().ok_or_else(|| {
            VeoError::Configuration(format!("{} is not set", GEMINI_API_KEY_ENV))
        })?;
        PromptEnhancer::with_config(
            api_key,
            self.gemini_endpoint.clone(),
            self.gemini_model.clone(),
        )
    }
}

/// Template written by `veo-studio config init`.
pub const DEFAULT_CONFIG_TEMPLATE: &str = r#"# veo-studio configuration
# Environment variables (and .env) take precedence over this file.

[vertex]
# Google Cloud project (or GCP_PROJECT_ID)
# project_id = "my-project"
# Region (or GCP_LOCATION_ID)
region = "us-central1"
# Veo model (or VEO_MODEL_ID)
model = "veo-3.0-generate-preview"
# Write videos to Cloud Storage instead of returning them inline
# (or VIDEO_STORAGE_GCS_URI)
# storage_uri = "gs://my-bucket/videos/"

[gemini]
# Model used by `enhance` (or GEMINI_MODEL). The API key is read from
# GEMINI_API_KEY only.
model = "gemini-1.5-pro"

[polling]
# Seconds between status checks
interval_secs = 3
# Give up after this many polls (unset = no limit)
# max_attempts = 200
# Give up after this many seconds (0 = no limit)
timeout_secs = 600

[credentials]
# Service account key (or GOOGLE_APPLICATION_CREDENTIALS, or
# GOOGLE_CLIENT_EMAIL + GOOGLE_PRIVATE_KEY)
# credentials_file = "/path/to/service-account.json"
"#;
