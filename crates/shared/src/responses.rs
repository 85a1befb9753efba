//! Response bodies returned by the HTTP API.

use serde::{Deserialize, Serialize};
use studio_domain::{GenerationRequest, GenerationStatus, PanelSide, SavedImage, SlotPosition};
use uuid::Uuid;

// =============================================================================
// Generations
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSubmitted {
    pub batch_id: Uuid,
    pub generations: Vec<GenerationView>,
}

/// One tracked generation as the client sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationView {
    pub id: Uuid,
    pub prompt_id: String,
    pub prompt_text: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_generation_id: Option<String>,
    /// Whether this prompt's image currently sits in a panel slot
    #[serde(default)]
    pub saved: bool,
}

impl GenerationView {
    pub fn from_request(request: &GenerationRequest, saved: bool) -> Self {
        let error = match &request.status {
            GenerationStatus::Failed { error } => Some(error.clone()),
            _ => None,
        };
        Self {
            id: request.id.to_uuid(),
            prompt_id: request.prompt_id.to_string(),
            prompt_text: request.prompt_text.clone(),
            status: request.status.label().to_string(),
            url: request.url().map(str::to_string),
            error,
            provider_generation_id: request
                .provider_generation_id
                .as_ref()
                .map(ToString::to_string),
            saved,
        }
    }
}

// =============================================================================
// Panels
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedImageView {
    pub id: Uuid,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    pub side: PanelSide,
    pub slot_index: usize,
}

impl From<&SavedImage> for SavedImageView {
    fn from(image: &SavedImage) -> Self {
        Self {
            id: image.id.to_uuid(),
            url: image.url.clone(),
            prompt_id: image.prompt_id.as_ref().map(ToString::to_string),
            prompt: image.prompt.clone(),
            side: image.side,
            slot_index: image.slot_index,
        }
    }
}

/// Both panels, `null` for empty slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanelsView {
    pub project_id: String,
    pub loaded: bool,
    pub left: Vec<Option<SavedImageView>>,
    pub right: Vec<Option<SavedImageView>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveToPanelResponse {
    pub position: SlotPosition,
    pub image: SavedImageView,
}

// =============================================================================
// Errors
// =============================================================================

/// Error classification codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request was malformed or invalid
    BadRequest,
    /// Requested resource was not found
    NotFound,
    /// The request conflicts with current state (slot taken, already saved, ...)
    Conflict,
    /// Panel data has not finished loading
    NotReady,
    /// Internal server error
    InternalError,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub code: ErrorCode,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}
