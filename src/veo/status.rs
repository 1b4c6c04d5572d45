//! Normalized task status exposed to callers.

use serde::{Deserialize, Serialize};

/// Progress reported while the provider is still working.
///
/// Vertex AI gives no fractional progress, so this is a fixed marker.
pub const PROCESSING_PROGRESS: u8 = 20;

/// Progress reported once the video is available.
pub const COMPLETED_PROGRESS: u8 = 100;

/// Where a completed video's URL came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaSource {
    /// Bytes returned inline, exposed as a data URL.
    Base64,
    /// Object written to Cloud Storage.
    Gcs,
}

/// Status of a video generation task.
///
/// Serializes as `{"status": "...", ...}` with camelCase fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TaskStatus {
    /// Submitted, not yet observed by a poll.
    Pending,
    /// Provider has not finished the operation.
    Processing { progress: u8 },
    /// Operation finished and produced a usable media reference.
    #[serde(rename_all = "camelCase")]
    Completed {
        progress: u8,
        video_url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        raw_reference: Option<String>,
        source: MediaSource,
    },
    /// Poll, provider or resolution failure.
    Error { error: String },
    /// The poll loop gave up before the operation finished.
    #[serde(rename_all = "camelCase")]
    Timeout {
        error: String,
        attempts: u32,
        elapsed_secs: u64,
    },
}

impl TaskStatus {
    pub fn processing() -> Self {
        TaskStatus::Processing {
            progress: PROCESSING_PROGRESS,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        TaskStatus::Error {
            error: message.into(),
        }
    }

    /// Whether polling should stop.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed { .. } | TaskStatus::Error { .. } | TaskStatus::Timeout { .. }
        )
    }

    pub fn progress(&self) -> Option<u8> {
        match self {
            TaskStatus::Pending => Some(0),
            TaskStatus::Processing { progress } | TaskStatus::Completed { progress, .. } => {
                Some(*progress)
            }
            TaskStatus::Error { .. } | TaskStatus::Timeout { .. } => None,
        }
    }

    /// Short lowercase label, matching the serialized `status` tag.
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing { .. } => "processing",
            TaskStatus::Completed { .. } => "completed",
            TaskStatus::Error { .. } => "error",
            TaskStatus::Timeout { .. } => "timeout",
        }
    }
}

/// Outcome of a single poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    pub status: TaskStatus,
    /// HTTP status to hand to the caller; upstream failures keep the
    /// provider's code.
    pub http_status: u16,
}

impl PollReport {
    pub fn ok(status: TaskStatus) -> Self {
        Self {
            status,
            http_status: 200,
        }
    }

    pub fn failed(message: impl Into<String>, http_status: u16) -> Self {
        Self {
            status: TaskStatus::error(message),
            http_status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_processing_serializes_with_progress() {
        let json = serde_json::to_value(TaskStatus::processing()).unwrap();
        assert_eq!(json, serde_json::json!({"status": "processing", "progress": 20}));
    }

    #[test]
    fn test_completed_serializes_camel_case() {
        let status = TaskStatus::Completed {
            progress: COMPLETED_PROGRESS,
            video_url: "https://storage.googleapis.com/b/v.mp4".to_string(),
            raw_reference: Some("gs://b/v.mp4".to_string()),
            source: MediaSource::Gcs,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "status": "completed",
                "progress": 100,
                "videoUrl": "https://storage.googleapis.com/b/v.mp4",
                "rawReference": "gs://b/v.mp4",
                "source": "gcs"
            })
        );
    }

    #[test]
    fn test_completed_without_reference_omits_field() {
        let status = TaskStatus::Completed {
            progress: COMPLETED_PROGRESS,
            video_url: "data:video/mp4;base64,Zm9v".to_string(),
            raw_reference: None,
            source: MediaSource::Base64,
        };
        let json = serde_json::to_value(&status).unwrap();
        assert!(json.get("rawReference").is_none());
    }

    #[test]
    fn test_error_round_trips() {
        let status = TaskStatus::error("quota exceeded");
        let text = serde_json::to_string(&status).unwrap();
        assert_eq!(text, r#"{"status":"error","error":"quota exceeded"}"#);
        let back: TaskStatus = serde_json::from_str(&text).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn test_terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::processing().is_terminal());
        assert!(TaskStatus::error("x").is_terminal());
        assert!(TaskStatus::Timeout {
            error: "x".to_string(),
            attempts: 3,
            elapsed_secs: 9
        }
        .is_terminal());
    }

    #[test]
    fn test_progress_values() {
        assert_eq!(TaskStatus::Pending.progress(), Some(0));
        assert_eq!(TaskStatus::processing().progress(), Some(20));
        assert_eq!(TaskStatus::error("x").progress(), None);
    }
}
