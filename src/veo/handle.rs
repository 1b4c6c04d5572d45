//! Operation handle parsing.
//!
//! Vertex AI names a long-running operation with a resource path such as
//! `projects/p/locations/us-central1/publishers/google/models/veo/operations/123`.
//! Publisher-model operations are polled through `fetchPredictOperation` on the
//! model path, everything else through a plain GET on the operation name, so the
//! handle alone has to tell the poller which endpoint to call.

use super::error::VeoError;

const LOCATIONS_MARKER: &str = "locations";
const PUBLISHERS_MARKER: &str = "publishers";
const MODELS_MARKER: &str = "models";
const OPERATIONS_MARKER: &str = "operations";

/// Which polling endpoint an operation belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    /// Operation started by a publisher model; `model_path` is everything
    /// before the `operations` segment.
    PublisherModel { model_path: String },
    /// Any other long-running operation.
    Generic,
}

/// Routing metadata extracted from an operation handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRoute {
    /// The handle with empty segments removed.
    pub name: String,
    pub region: String,
    pub kind: OperationKind,
}

impl OperationRoute {
    pub fn is_publisher_model(&self) -> bool {
        matches!(self.kind, OperationKind::PublisherModel { .. })
    }

    pub fn model_path(&self) -> Option<&str> {
        match &self.kind {
            OperationKind::PublisherModel { model_path } => Some(model_path),
            OperationKind::Generic => None,
        }
    }
}

/// Regions become part of the API host name: lowercase letters, digits and `-` only.
fn is_valid_region(region: &str) -> bool {
    !region.is_empty()
        && region
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
}

/// Split an operation handle into routing metadata.
///
/// # Errors
///
/// Returns `VeoError::InvalidHandle` if the handle has no segments, if its
/// region is not a plain region name, or if it names a publisher model
/// without an operation id.
pub fn parse_handle(handle: &str, default_region: &str) -> Result<OperationRoute, VeoError> {
    let segments: Vec<&str> = handle.split('/').filter(|s| !s.is_empty()).collect();

    if segments.is_empty() {
        return Err(VeoError::InvalidHandle("handle has no segments".to_string()));
    }

    let region = segments
        .iter()
        .position(|s| *s == LOCATIONS_MARKER)
        .and_then(|idx| segments.get(idx + 1))
        .map(|s| s.to_string())
        .unwrap_or_else(|| default_region.to_string());

    if !is_valid_region(&region) {
        return Err(VeoError::InvalidHandle(format!("invalid region: {:?}", region)));
    }

    let is_publisher_model =
        segments.contains(&PUBLISHERS_MARKER) && segments.contains(&MODELS_MARKER);

    let kind = if is_publisher_model {
        match segments.iter().position(|s| *s == OPERATIONS_MARKER) {
            Some(idx) if idx > 0 => OperationKind::PublisherModel {
                model_path: segments[..idx].join("/"),
            },
            _ => {
                return Err(VeoError::InvalidHandle(format!(
                    "publisher model handle has no operation id: {}",
                    handle
                )))
            }
        }
    } else {
        OperationKind::Generic
    };

    Ok(OperationRoute {
        name: segments.join("/"),
        region,
        kind,
    })
}
