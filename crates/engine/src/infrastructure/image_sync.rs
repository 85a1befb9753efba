//! Database sync for saved panel images.
//!
//! Mirrors each local save to the remote project database. Best effort:
//! callers log failures and keep the local save.

use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use studio_domain::ProjectId;

use crate::infrastructure::ports::{ImageSyncPort, SyncError, SyncedImage};

/// Posts saved images to `{base}/projects/{id}/images`.
#[derive(Clone)]
pub struct HttpImageSync {
    client: Client,
    base_url: String,
}

impl HttpImageSync {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ImageSyncPort for HttpImageSync {
    async fn sync_saved_image(
        &self,
        project_id: ProjectId,
        image: SyncedImage,
    ) -> Result<(), SyncError> {
        let response = self
            .client
            .post(format!("{}/projects/{}/images", self.base_url, project_id))
            .json(&image)
            .send()
            .await
            .map_err(|e| SyncError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(SyncError::Status { status, body });
        }

        Ok(())
    }
}

/// Used when no sync endpoint is configured.
pub struct NoopImageSync;

#[async_trait]
impl ImageSyncPort for NoopImageSync {
    async fn sync_saved_image(
        &self,
        project_id: ProjectId,
        image: SyncedImage,
    ) -> Result<(), SyncError> {
        tracing::trace!(
            project_id = %project_id,
            side = %image.side,
            slot_index = image.slot_index,
            "Database sync disabled, skipping"
        );
        Ok(())
    }
}
