//! Result resolution for finished Veo operations.
//!
//! A finished operation carries the video either inline as base64 or as a
//! Cloud Storage reference. Inline bytes win when both are present.

use base64::Engine;
use serde::Deserialize;

use super::error::VeoError;
use super::status::{MediaSource, TaskStatus, COMPLETED_PROGRESS};

/// MIME type assumed when the provider does not declare one.
pub const DEFAULT_MIME_TYPE: &str = "video/mp4";

/// Host serving public Cloud Storage objects.
pub const GCS_PUBLIC_HOST: &str = "https://storage.googleapis.com";

const GCS_SCHEME: &str = "gs://";

/// `response` object of a finished operation.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    #[serde(default)]
    pub videos: Option<Vec<GeneratedMedia>>,
    #[serde(default)]
    pub predictions: Option<Vec<GeneratedMedia>>,
    #[serde(default)]
    pub rai_media_filtered_count: Option<u32>,
    #[serde(default)]
    pub rai_media_filtered_reasons: Option<Vec<String>>,
}

/// One generated video entry.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedMedia {
    #[serde(default)]
    pub bytes_base64_encoded: Option<String>,
    #[serde(default)]
    pub gcs_uri: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
}

/// The media reference chosen from an operation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaPayload<'a> {
    Inline { mime_type: &'a str, data: &'a str },
    Remote { mime_type: &'a str, uri: &'a str },
    Missing,
}

impl GeneratedMedia {
    fn payload(&self) -> MediaPayload<'_> {
        let declared = non_empty(&self.mime_type);

        if let Some(data) = non_empty(&self.bytes_base64_encoded) {
            let mime_type = declared.unwrap_or(DEFAULT_MIME_TYPE);
            MediaPayload::Inline { mime_type, data }
        } else if let Some(uri) = non_empty(&self.gcs_uri) {
            let mime_type = declared.unwrap_or_else(|| mime_type_for_uri(uri));
            MediaPayload::Remote { mime_type, uri }
        } else {
            MediaPayload::Missing
        }
    }
}

impl OperationResponse {
    /// First entry of `videos`, falling back to the first of `predictions`.
    pub fn media(&self) -> MediaPayload<'_> {
        self.videos
            .as_deref()
            .and_then(<[_]>::first)
            .or_else(|| self.predictions.as_deref().and_then(<[_]>::first))
            .map(GeneratedMedia::payload)
            .unwrap_or(MediaPayload::Missing)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// A playable reference to the generated video.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalResult {
    /// Video embedded as a `data:` URL.
    Inline { mime_type: String, url: String },
    /// Video stored remotely. `url` is the public HTTPS form when the URI
    /// uses the `gs://` scheme; it only works if the object is public.
    RemoteReference {
        mime_type: String,
        url: String,
        raw_uri: String,
    },
}

impl TerminalResult {
    pub fn url(&self) -> &str {
        match self {
            TerminalResult::Inline { url, .. } | TerminalResult::RemoteReference { url, .. } => url,
        }
    }

    pub fn mime_type(&self) -> &str {
        match self {
            TerminalResult::Inline { mime_type, .. }
            | TerminalResult::RemoteReference { mime_type, .. } => mime_type,
        }
    }

    pub fn raw_reference(&self) -> Option<&str> {
        match self {
            TerminalResult::Inline { .. } => None,
            TerminalResult::RemoteReference { raw_uri, .. } => Some(raw_uri),
        }
    }

    pub fn source(&self) -> MediaSource {
        match self {
            TerminalResult::Inline { .. } => MediaSource::Base64,
            TerminalResult::RemoteReference { .. } => MediaSource::Gcs,
        }
    }

    /// Decode the bytes of an inline result. Returns `None` for remote ones.
    pub fn inline_bytes(&self) -> Option<Result<Vec<u8>, VeoError>> {
        match self {
            TerminalResult::Inline { url, .. } => Some(decode_data_url(url)),
            TerminalResult::RemoteReference { .. } => None,
        }
    }

    /// Rebuild the result from a completed status, e.g. one read back from a
    /// task store.
    pub fn from_status(status: &TaskStatus) -> Option<Self> {
        let TaskStatus::Completed {
            video_url,
            raw_reference,
            source,
            ..
        } = status
        else {
            return None;
        };

        match source {
            MediaSource::Base64 => {
                let mime_type = video_url
                    .strip_prefix("data:")
                    .and_then(|rest| rest.split_once(';'))
                    .map(|(mime, _)| mime)
                    .unwrap_or(DEFAULT_MIME_TYPE);
                Some(TerminalResult::Inline {
                    mime_type: mime_type.to_string(),
                    url: video_url.clone(),
                })
            }
            MediaSource::Gcs => {
                let raw_uri = raw_reference.clone().unwrap_or_else(|| video_url.clone());
                Some(TerminalResult::RemoteReference {
                    mime_type: mime_type_for_uri(&raw_uri).to_string(),
                    url: video_url.clone(),
                    raw_uri,
                })
            }
        }
    }

    pub fn into_status(self) -> TaskStatus {
        let source = self.source();
        match self {
            TerminalResult::Inline { url, .. } => TaskStatus::Completed {
                progress: COMPLETED_PROGRESS,
                video_url: url,
                raw_reference: None,
                source,
            },
            TerminalResult::RemoteReference { url, raw_uri, .. } => TaskStatus::Completed {
                progress: COMPLETED_PROGRESS,
                video_url: url,
                raw_reference: Some(raw_uri),
                source,
            },
        }
    }
}

/// Turn a finished operation's response into a playable URL.
///
/// # Errors
///
/// Returns `VeoError::Resolution` when neither inline bytes nor a storage URI
/// is present.
pub fn resolve(response: &OperationResponse) -> Result<TerminalResult, VeoError> {
    match response.media() {
        MediaPayload::Inline { mime_type, data } => Ok(TerminalResult::Inline {
            mime_type: mime_type.to_string(),
            url: format!("data:{};base64,{}", mime_type, data),
        }),
        MediaPayload::Remote { mime_type, uri } => Ok(TerminalResult::RemoteReference {
            mime_type: mime_type.to_string(),
            url: public_url(uri),
            raw_uri: uri.to_string(),
        }),
        MediaPayload::Missing => {
            let filtered = response.rai_media_filtered_count.unwrap_or(0);
            if filtered > 0 {
                let reasons = match response.rai_media_filtered_reasons.as_deref() {
                    Some(reasons) if !reasons.is_empty() => reasons.join("; "),
                    _ => "no reason given".to_string(),
                };
                Err(VeoError::Resolution(format!(
                    "operation completed but {} video(s) were removed by safety filters: {}",
                    filtered, reasons
                )))
            } else {
                Err(VeoError::Resolution(
                    "operation completed but no usable media reference found".to_string(),
                ))
            }
        }
    }
}

/// Decode the payload of a `data:<mime>;base64,<data>` URL.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, VeoError> {
    let encoded = url.split_once(',').map(|(_, data)| data).unwrap_or(url);
    Ok(base64::engine::general_purpose::STANDARD.decode(encoded)?)
}

/// Rewrite `gs://bucket/path` to its public HTTPS URL. Other URIs are
/// returned unchanged.
pub fn public_url(uri: &str) -> String {
    match uri.strip_prefix(GCS_SCHEME) {
        Some(rest) if !rest.is_empty() => format!("{}/{}", GCS_PUBLIC_HOST, rest),
        _ => uri.to_string(),
    }
}

/// Guess a video MIME type from the file extension of a URI.
pub fn mime_type_for_uri(uri: &str) -> &'static str {
    let path = uri.split(['?', '#']).next().unwrap_or(uri);
    let extension = path
        .rsplit_once('/')
        .map_or(path, |(_, name)| name)
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        _ => DEFAULT_MIME_TYPE,
    }
}

/// File extension for a video MIME type, without the dot.
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type {
        "video/webm" => "webm",
        "video/quicktime" => "mov",
        _ => "mp4",
    }
}

/// Split `gs://bucket/object` into bucket and object name.
pub fn gcs_location(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix(GCS_SCHEME)?;
    let (bucket, object) = rest.split_once('/')?;
    if bucket.is_empty() || object.is_empty() {
        None
    } else {
        Some((bucket, object))
    }
}
