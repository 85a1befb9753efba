//! HTTP image generation provider client
//!
//! Implements the ImageGenPort trait against the coordinator's generation API:
//! start a generation, check it, and delete generations we no longer track.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use studio_domain::ProviderGenerationId;

use crate::infrastructure::ports::{
    DeleteOutcome, GenerationCheck, ImageGenError, ImageGenPort, ProviderStatus, StartGeneration,
};

/// Client for the image provider API
#[derive(Clone)]
pub struct HttpImageProvider {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpImageProvider {
    pub fn new(base_url: &str, api_key: Option<String>) -> Self {
        // Individual calls are short; the long wait happens in our own polling loop.
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn error_body(response: reqwest::Response) -> String {
        response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string())
    }
}

#[async_trait]
impl ImageGenPort for HttpImageProvider {
    async fn start(&self, request: StartGeneration) -> Result<ProviderGenerationId, ImageGenError> {
        let body = StartRequest {
            prompt: &request.prompt,
            width: request.width,
            height: request.height,
        };

        let response = self
            .authorized(self.client.post(format!("{}/generations", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| ImageGenError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ImageGenError::Request(Self::error_body(response).await));
        }
        if !status.is_success() {
            return Err(ImageGenError::Rejected(Self::error_body(response).await));
        }

        let parsed: StartResponse = response
            .json()
            .await
            .map_err(|e| ImageGenError::InvalidResponse(e.to_string()))?;
        Ok(ProviderGenerationId::new(parsed.generation_id))
    }

    async fn check(&self, id: &ProviderGenerationId) -> Result<GenerationCheck, ImageGenError> {
        let response = self
            .authorized(
                self.client
                    .get(format!("{}/generations/{}", self.base_url, id)),
            )
            .send()
            .await
            .map_err(|e| ImageGenError::Request(e.to_string()))?;

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ImageGenError::Request(Self::error_body(response).await));
        }
        if !status.is_success() {
            return Err(ImageGenError::Rejected(Self::error_body(response).await));
        }

        let parsed: CheckResponse = response
            .json()
            .await
            .map_err(|e| ImageGenError::InvalidResponse(e.to_string()))?;

        Ok(GenerationCheck {
            status: parsed.status,
            images: parsed.images.into_iter().map(ImageRef::into_url).collect(),
            error: parsed.error,
        })
    }

    async fn delete(&self, ids: Vec<ProviderGenerationId>) -> Result<DeleteOutcome, ImageGenError> {
        if ids.is_empty() {
            return Ok(DeleteOutcome::default());
        }

        let body = DeleteRequest {
            generation_ids: ids.iter().map(ProviderGenerationId::as_str).collect(),
        };
        let response = self
            .authorized(self.client.delete(format!("{}/generations", self.base_url)))
            .json(&body)
            .send()
            .await
            .map_err(|e| ImageGenError::Request(e.to_string()))?;

        // Nothing left to delete on the provider side.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(DeleteOutcome {
                deleted: ids,
                failed: Vec::new(),
            });
        }
        if !response.status().is_success() {
            return Err(ImageGenError::Request(Self::error_body(response).await));
        }

        let parsed: DeleteResponse = response
            .json()
            .await
            .map_err(|e| ImageGenError::InvalidResponse(e.to_string()))?;

        Ok(DeleteOutcome {
            deleted: parsed
                .deleted
                .into_iter()
                .map(ProviderGenerationId::new)
                .collect(),
            failed: parsed
                .failed
                .into_iter()
                .map(ProviderGenerationId::new)
                .collect(),
        })
    }

    async fn check_health(&self) -> Result<bool, ImageGenError> {
        let response = self
            .authorized(self.client.get(format!("{}/health", self.base_url)))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .map_err(|_| ImageGenError::Unavailable)?;

        Ok(response.status().is_success())
    }
}

// =============================================================================
// Provider API types
// =============================================================================

#[derive(Debug, Serialize)]
struct StartRequest<'a> {
    prompt: &'a str,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartResponse {
    generation_id: String,
}

#[derive(Debug, Deserialize)]
struct CheckResponse {
    status: ProviderStatus,
    #[serde(default)]
    images: Vec<ImageRef>,
    #[serde(default)]
    error: Option<String>,
}

/// Providers answer with either bare URLs or `{ "url": ... }` objects.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImageRef {
    Url(String),
    Object { url: String },
}

impl ImageRef {
    fn into_url(self) -> String {
        match self {
            Self::Url(url) | Self::Object { url } => url,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    generation_ids: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    deleted: Vec<String>,
    #[serde(default)]
    failed: Vec<String>,
}
