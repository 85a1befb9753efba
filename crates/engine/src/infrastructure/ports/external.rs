//! External service port traits (image generation, database sync).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use studio_domain::{PanelSide, ProjectId, ProviderGenerationId};

use super::error::{ImageGenError, SyncError};

// =============================================================================
// Image Generation Types
// =============================================================================

/// Start a single remote generation.
#[derive(Debug, Clone, PartialEq)]
pub struct StartGeneration {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
}

/// Remote status as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Pending,
    #[serde(alias = "processing", alias = "running")]
    Generating,
    #[serde(alias = "completed", alias = "succeeded")]
    Complete,
    #[serde(alias = "error")]
    Failed,
    /// Anything we do not recognise is polled again
    #[serde(other)]
    Unknown,
}

/// Result of one `check` call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationCheck {
    pub status: ProviderStatus,
    /// Image URLs, first one is used
    pub images: Vec<String>,
    pub error: Option<String>,
}

impl GenerationCheck {
    pub fn pending() -> Self {
        Self {
            status: ProviderStatus::Pending,
            images: Vec::new(),
            error: None,
        }
    }

    pub fn complete(url: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::Complete,
            images: vec![url.into()],
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: ProviderStatus::Failed,
            images: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Result of a bulk delete. Already-deleted ids count as deleted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteOutcome {
    pub deleted: Vec<ProviderGenerationId>,
    pub failed: Vec<ProviderGenerationId>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageGenPort: Send + Sync {
    /// Ask the provider to start generating; returns its id for polling.
    async fn start(&self, request: StartGeneration) -> Result<ProviderGenerationId, ImageGenError>;
    /// Idempotent status check.
    async fn check(&self, id: &ProviderGenerationId) -> Result<GenerationCheck, ImageGenError>;
    /// Idempotent bulk delete.
    async fn delete(&self, ids: Vec<ProviderGenerationId>) -> Result<DeleteOutcome, ImageGenError>;
    async fn check_health(&self) -> Result<bool, ImageGenError>;
}

// =============================================================================
// Database Sync
// =============================================================================

/// A save mirrored to the remote project database.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncedImage {
    pub side: PanelSide,
    pub slot_index: usize,
    pub image_url: String,
    pub prompt: Option<String>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ImageSyncPort: Send + Sync {
    async fn sync_saved_image(
        &self,
        project_id: ProjectId,
        image: SyncedImage,
    ) -> Result<(), SyncError>;
}
