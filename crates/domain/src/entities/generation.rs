//! GenerationRequest entity - One remote image generation tracked until terminal

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};
use crate::{BatchId, GenerationId, PromptId, ProviderGenerationId};

/// Lifecycle of a single generation.
///
/// The image URL only exists on `Complete`, so "url present iff complete"
/// holds by construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum GenerationStatus {
    /// Created, provider has not acknowledged yet
    Pending,
    /// Provider accepted the request and assigned an id
    Generating,
    /// Finished with an image
    Complete { url: String },
    /// Rejected, failed remotely, or timed out
    Failed { error: String },
}

impl GenerationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Generating => "generating",
            Self::Complete { .. } => "complete",
            Self::Failed { .. } => "failed",
        }
    }
}

/// A generation request owned by the registry for the lifetime of its batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub id: GenerationId,
    /// Batch this request was submitted with
    pub batch_id: BatchId,
    /// Caller correlation token (may be reused by later batches)
    pub prompt_id: PromptId,
    /// Prompt text sent to the provider
    pub prompt_text: String,
    /// Assigned once the provider accepts the request
    pub provider_generation_id: Option<ProviderGenerationId>,
    #[serde(flatten)]
    pub status: GenerationStatus,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl GenerationRequest {
    pub fn new(
        batch_id: BatchId,
        prompt_id: PromptId,
        prompt_text: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: GenerationId::new(),
            batch_id,
            prompt_id,
            prompt_text: prompt_text.into(),
            provider_generation_id: None,
            status: GenerationStatus::Pending,
            created_at: now,
            finished_at: None,
        }
    }

    /// Provider acknowledged the request.
    pub fn start_generating(&mut self, provider_id: ProviderGenerationId) -> DomainResult<()> {
        if self.status != GenerationStatus::Pending {
            return Err(DomainError::invalid_transition(format!(
                "generation {} cannot start from {}",
                self.id,
                self.status.label()
            )));
        }
        self.provider_generation_id = Some(provider_id);
        self.status = GenerationStatus::Generating;
        Ok(())
    }

    pub fn complete(&mut self, url: impl Into<String>, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_not_terminal("complete")?;
        self.status = GenerationStatus::Complete { url: url.into() };
        self.finished_at = Some(now);
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>, now: DateTime<Utc>) -> DomainResult<()> {
        self.ensure_not_terminal("fail")?;
        self.status = GenerationStatus::Failed {
            error: error.into(),
        };
        self.finished_at = Some(now);
        Ok(())
    }

    /// The image URL, present only once complete.
    pub fn url(&self) -> Option<&str> {
        match &self.status {
            GenerationStatus::Complete { url } => Some(url),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_not_terminal(&self, action: &str) -> DomainResult<()> {
        if self.is_terminal() {
            return Err(DomainError::invalid_transition(format!(
                "generation {} cannot {} from {}",
                self.id,
                action,
                self.status.label()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest::new(BatchId::new(), PromptId::new("p1"), "a red fox", Utc::now())
    }

    #[test]
    fn new_request_is_pending_without_url() {
        let req = request();
        assert_eq!(req.status, GenerationStatus::Pending);
        assert!(req.url().is_none());
        assert!(req.provider_generation_id.is_none());
    }

    #[test]
    fn complete_exposes_url() {
        let mut req = request();
        req.start_generating(ProviderGenerationId::new("gen-1"))
            .expect("start");
        req.complete("https://cdn/a.png", Utc::now()).expect("complete");

        assert_eq!(req.url(), Some("https://cdn/a.png"));
        assert!(req.is_terminal());
        assert!(req.finished_at.is_some());
    }

    #[test]
    fn pending_may_fail_directly() {
        let mut req = request();
        req.fail("provider rejected prompt", Utc::now()).expect("fail");
        assert_eq!(
            req.status,
            GenerationStatus::Failed {
                error: "provider rejected prompt".into()
            }
        );
    }

    #[test]
    fn terminal_states_are_final() {
        let mut req = request();
        req.fail("boom", Utc::now()).expect("fail");

        assert!(req.complete("https://cdn/late.png", Utc::now()).is_err());
        assert!(req
            .start_generating(ProviderGenerationId::new("gen-2"))
            .is_err());
        assert!(req.url().is_none());
    }

    #[test]
    fn status_serializes_with_tag() {
        let mut req = request();
        req.start_generating(ProviderGenerationId::new("gen-1"))
            .expect("start");
        req.complete("https://cdn/a.png", Utc::now()).expect("complete");

        let json = serde_json::to_value(&req).expect("serialize");
        assert_eq!(json["status"], "complete");
        assert_eq!(json["url"], "https://cdn/a.png");
        assert_eq!(json["promptId"], "p1");
    }
}
