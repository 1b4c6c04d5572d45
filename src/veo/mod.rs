//! Veo video generation on Vertex AI.
//!
//! Submits long-running generation jobs, polls them through a small
//! normalized state machine and resolves the finished operation into a
//! playable URL. Prompts can be rewritten with Gemini before submission.

mod auth;
mod client;
mod enhancer;
mod error;
mod handle;
mod resolver;
mod status;
mod store;
mod watcher;

pub use auth::{Credentials, ServiceAccountTokens, StaticToken, TokenSource, CLOUD_PLATFORM_SCOPE};
pub use client::{
    interpret_poll_response, validate_prompt, GenerationRequest, OperationHandle, VeoClient,
    DEFAULT_MODEL, DEFAULT_REGION, GCP_LOCATION_ID_ENV, GCP_PROJECT_ID_ENV, MAX_DURATION_SECONDS,
    VEO_MODEL_ID_ENV, VIDEO_STORAGE_GCS_URI_ENV,
};
pub use enhancer::{
    PromptEnhancer, DEFAULT_GEMINI_MODEL, ENHANCE_INSTRUCTION, GEMINI_API_BASE_URL,
    GEMINI_API_KEY_ENV, GEMINI_MODEL_ENV,
};
pub use error::VeoError;
pub use handle::{parse_handle, OperationKind, OperationRoute};
pub use resolver::{
    decode_data_url, extension_for_mime, gcs_location, mime_type_for_uri, public_url, resolve,
    GeneratedMedia, MediaPayload, OperationResponse, TerminalResult, DEFAULT_MIME_TYPE,
};
pub use status::{MediaSource, PollReport, TaskStatus, COMPLETED_PROGRESS, PROCESSING_PROGRESS};
pub use store::{FileTaskStore, MemoryTaskStore, TaskRecord, TaskStore};
pub use watcher::{
    PollWatcher, StatusSource, WatchOptions, WatchOutcome, DEFAULT_MAX_ELAPSED,
    DEFAULT_POLL_INTERVAL,
};
