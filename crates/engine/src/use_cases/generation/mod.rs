//! Generation registry use cases.
//!
//! Tracks one batch of remote generations at a time. Submitting a batch
//! replaces the previous one: its polls are cancelled and its provider-side
//! generations are deleted (best effort). Each accepted generation is polled
//! independently until it completes, fails, or runs out of attempts.

use std::sync::Arc;

use futures_util::future::join_all;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use studio_domain::{
    BatchId, DomainResult, GenerationId, GenerationRequest, PromptId, ProviderGenerationId,
};

use crate::infrastructure::polling::{poll_until, PollOutcome, PollPolicy, PollStep};
use crate::infrastructure::ports::{
    ClockPort, GenerationCheck, ImageGenError, ImageGenPort, ProviderStatus, StartGeneration,
};

/// Container for generation use cases.
pub struct GenerationUseCases {
    pub registry: GenerationRegistry,
}

impl GenerationUseCases {
    pub fn new(registry: GenerationRegistry) -> Self {
        Self { registry }
    }
}

/// Image size and polling cadence for submitted prompts.
#[derive(Debug, Clone)]
pub struct GenerationSettings {
    pub width: u32,
    pub height: u32,
    pub poll: PollPolicy,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 1024,
            poll: PollPolicy::default(),
        }
    }
}

/// One prompt of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSubmission {
    pub prompt_id: PromptId,
    pub text: String,
}

impl PromptSubmission {
    pub fn new(prompt_id: impl Into<PromptId>, text: impl Into<String>) -> Self {
        Self {
            prompt_id: prompt_id.into(),
            text: text.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("A batch needs at least one prompt")]
    EmptyBatch,
}

struct RegistryState {
    batch_id: Option<BatchId>,
    entries: Vec<GenerationRequest>,
    cancel: CancellationToken,
}

struct RegistryInner {
    provider: Arc<dyn ImageGenPort>,
    clock: Arc<dyn ClockPort>,
    settings: GenerationSettings,
    state: RwLock<RegistryState>,
}

/// Handle to the registry. Clones share state.
#[derive(Clone)]
pub struct GenerationRegistry {
    inner: Arc<RegistryInner>,
}

impl GenerationRegistry {
    pub fn new(
        provider: Arc<dyn ImageGenPort>,
        clock: Arc<dyn ClockPort>,
        settings: GenerationSettings,
    ) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                provider,
                clock,
                settings,
                state: RwLock::new(RegistryState {
                    batch_id: None,
                    entries: Vec::new(),
                    cancel: CancellationToken::new(),
                }),
            }),
        }
    }

    /// Replace the current batch with `prompts` and start them all in parallel.
    ///
    /// A prompt the provider refuses is marked failed; its siblings carry on.
    pub async fn submit(&self, prompts: Vec<PromptSubmission>) -> Result<BatchId, GenerationError> {
        if prompts.is_empty() {
            return Err(GenerationError::EmptyBatch);
        }

        let now = self.inner.clock.now();
        let batch_id = BatchId::new();
        let entries: Vec<GenerationRequest> = prompts
            .into_iter()
            .map(|p| GenerationRequest::new(batch_id, p.prompt_id, p.text, now))
            .collect();

        let cancel = self
            .replace_batch(Some(batch_id), entries.clone())
            .await;

        tracing::info!(
            batch_id = %batch_id,
            prompts = entries.len(),
            "Submitting generation batch"
        );

        // Each prompt starts polling as soon as its own start call returns.
        let starts = entries.iter().map(|entry| {
            let request = StartGeneration {
                prompt: entry.prompt_text.clone(),
                width: self.inner.settings.width,
                height: self.inner.settings.height,
            };
            let generation_id = entry.id;
            let cancel = cancel.clone();
            async move {
                let result = self.inner.provider.start(request).await;
                self.record_start(batch_id, generation_id, result, &cancel)
                    .await;
            }
        });
        join_all(starts).await;

        Ok(batch_id)
    }

    /// Stop every poll and forget the current batch.
    pub async fn clear(&self) {
        self.replace_batch(None, Vec::new()).await;
        tracing::info!("Generation registry cleared");
    }

    /// All tracked generations in submission order.
    pub async fn list(&self) -> Vec<GenerationRequest> {
        self.inner.state.read().await.entries.clone()
    }

    /// Latest tracked generation for a prompt id.
    pub async fn find_by_prompt(&self, prompt_id: &PromptId) -> Option<GenerationRequest> {
        self.inner
            .state
            .read()
            .await
            .entries
            .iter()
            .rev()
            .find(|e| &e.prompt_id == prompt_id)
            .cloned()
    }

    pub async fn current_batch(&self) -> Option<BatchId> {
        self.inner.state.read().await.batch_id
    }

    /// Poll one accepted generation until it is terminal, then record the result.
    pub async fn poll(
        &self,
        batch_id: BatchId,
        generation_id: GenerationId,
        provider_id: ProviderGenerationId,
        cancel: CancellationToken,
    ) {
        let provider = Arc::clone(&self.inner.provider);
        let policy = self.inner.settings.poll.clone();

        let outcome = poll_until(&policy, &cancel, "generation_check", |_| {
            let provider = Arc::clone(&provider);
            let provider_id = provider_id.clone();
            async move { check_step(provider.check(&provider_id).await) }
        })
        .await;

        let now = self.inner.clock.now();
        match outcome {
            PollOutcome::Ready(url) => {
                tracing::info!(
                    generation_id = %generation_id,
                    provider_id = %provider_id,
                    "Generation complete"
                );
                self.mutate(batch_id, generation_id, move |entry| entry.complete(url, now))
                    .await;
            }
            PollOutcome::Failed(error) => {
                tracing::warn!(
                    generation_id = %generation_id,
                    provider_id = %provider_id,
                    error = %error,
                    "Generation failed"
                );
                self.mutate(batch_id, generation_id, move |entry| entry.fail(error, now))
                    .await;
            }
            PollOutcome::TimedOut { attempts } => {
                let message = format!(
                    "Generation timed out after {} attempts ({}s)",
                    attempts,
                    policy.ceiling().as_secs()
                );
                tracing::warn!(
                    generation_id = %generation_id,
                    provider_id = %provider_id,
                    attempts,
                    "Generation timed out"
                );
                self.mutate(batch_id, generation_id, move |entry| entry.fail(message, now))
                    .await;
            }
            PollOutcome::Cancelled => {
                tracing::debug!(generation_id = %generation_id, "Polling cancelled");
            }
        }
    }

    async fn record_start(
        &self,
        batch_id: BatchId,
        generation_id: GenerationId,
        result: Result<ProviderGenerationId, ImageGenError>,
        cancel: &CancellationToken,
    ) {
        match result {
            Ok(provider_id) => {
                let accepted = provider_id.clone();
                let applied = self
                    .mutate(batch_id, generation_id, move |entry| {
                        entry.start_generating(accepted)
                    })
                    .await;
                if applied {
                    self.spawn_poll(batch_id, generation_id, provider_id, cancel.child_token());
                } else {
                    // Batch was replaced while the start call was in flight.
                    self.delete_remote(vec![provider_id]).await;
                }
            }
            Err(e) => {
                tracing::warn!(
                    batch_id = %batch_id,
                    generation_id = %generation_id,
                    error = %e,
                    "Provider refused generation"
                );
                let failed_at = self.inner.clock.now();
                let message = start_failure_message(&e);
                self.mutate(batch_id, generation_id, move |entry| {
                    entry.fail(message, failed_at)
                })
                .await;
            }
        }
    }

    fn spawn_poll(
        &self,
        batch_id: BatchId,
        generation_id: GenerationId,
        provider_id: ProviderGenerationId,
        cancel: CancellationToken,
    ) {
        let registry = self.clone();
        tokio::spawn(async move {
            registry
                .poll(batch_id, generation_id, provider_id, cancel)
                .await;
        });
    }

    /// Swap in a new batch (or none), cancel the old polls, and delete the
    /// old provider-side generations. Returns the new batch's token.
    async fn replace_batch(
        &self,
        batch_id: Option<BatchId>,
        entries: Vec<GenerationRequest>,
    ) -> CancellationToken {
        let (previous, cancel) = {
            let mut state = self.inner.state.write().await;
            state.cancel.cancel();
            let previous: Vec<ProviderGenerationId> = state
                .entries
                .iter()
                .filter_map(|e| e.provider_generation_id.clone())
                .collect();
            state.cancel = CancellationToken::new();
            state.batch_id = batch_id;
            state.entries = entries;
            (previous, state.cancel.clone())
        };

        self.delete_remote(previous).await;
        cancel
    }

    async fn delete_remote(&self, ids: Vec<ProviderGenerationId>) {
        if ids.is_empty() {
            return;
        }
        let requested = ids.len();
        match self.inner.provider.delete(ids).await {
            Ok(outcome) if outcome.failed.is_empty() => {
                tracing::debug!(deleted = outcome.deleted.len(), "Deleted previous generations");
            }
            Ok(outcome) => {
                tracing::warn!(
                    deleted = outcome.deleted.len(),
                    failed = outcome.failed.len(),
                    "Some previous generations could not be deleted"
                );
            }
            Err(e) => {
                tracing::warn!(requested, error = %e, "Failed to delete previous generations");
            }
        }
    }

    /// Apply `f` to a tracked entry if it still belongs to the current batch.
    async fn mutate<F>(&self, batch_id: BatchId, generation_id: GenerationId, f: F) -> bool
    where
        F: FnOnce(&mut GenerationRequest) -> DomainResult<()>,
    {
        let mut state = self.inner.state.write().await;
        if state.batch_id != Some(batch_id) {
            tracing::debug!(
                batch_id = %batch_id,
                generation_id = %generation_id,
                "Ignoring result for superseded batch"
            );
            return false;
        }
        let Some(entry) = state.entries.iter_mut().find(|e| e.id == generation_id) else {
            return false;
        };
        match f(entry) {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(generation_id = %generation_id, error = %e, "Rejected generation update");
                false
            }
        }
    }
}

fn start_failure_message(error: &ImageGenError) -> String {
    match error {
        ImageGenError::Rejected(message) if !message.trim().is_empty() => message.clone(),
        other => other.to_string(),
    }
}

fn check_step(result: Result<GenerationCheck, ImageGenError>) -> PollStep<String> {
    match result {
        Ok(check) => match check.status {
            ProviderStatus::Complete => match check.images.into_iter().next() {
                Some(url) => PollStep::Done(url),
                None => PollStep::Failed("Provider reported completion without an image".to_string()),
            },
            ProviderStatus::Failed => PollStep::Failed(
                check
                    .error
                    .unwrap_or_else(|| "Generation failed".to_string()),
            ),
            ProviderStatus::Pending | ProviderStatus::Generating | ProviderStatus::Unknown => {
                PollStep::Pending
            }
        },
        Err(e) if e.is_transient() => PollStep::Transient(e.to_string()),
        Err(ImageGenError::Rejected(message)) => PollStep::Failed(message),
        Err(e) => PollStep::Failed(e.to_string()),
    }
}
