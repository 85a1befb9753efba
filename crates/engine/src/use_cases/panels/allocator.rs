//! Slot allocator.
//!
//! Places completed generations into the first free panel slot, left panel
//! first. Decisions are made against the last *observed* store snapshot plus
//! the set of pending claims, all under one FIFO mutex, so two saves issued
//! back to back never pick the same slot even when the store has not caught up.

use std::sync::Arc;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use studio_domain::{
    GenerationStatus, PanelSide, PanelSlots, ProjectId, PromptId, SavedImage, SlotPosition,
};

use super::claims::PendingClaims;
use super::dedup::DedupGuard;
use crate::infrastructure::persisted_store::{Observed, PersistedStore};
use crate::infrastructure::ports::{ClockPort, ImageSyncPort, RepoError, SyncedImage};
use crate::use_cases::generation::GenerationRegistry;

/// Where a save landed.
#[derive(Debug, Clone, PartialEq)]
pub struct SlotPlacement {
    pub position: SlotPosition,
    pub image: SavedImage,
}

/// Expected reasons a save does not happen. None of these are faults.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationRejection {
    #[error("Panels are still loading")]
    NotLoaded,
    #[error("No generation tracked for prompt {0}")]
    NotFound(PromptId),
    #[error("Generation for prompt {0} has not completed")]
    NotComplete(PromptId),
    #[error("Image is already saved at {position}")]
    AlreadySaved { position: SlotPosition },
    #[error("No empty slots")]
    NoEmptySlots,
}

struct AllocatorState {
    project_id: ProjectId,
    claims: PendingClaims,
    dedup: DedupGuard,
}

impl AllocatorState {
    fn reconcile(&mut self, observed: &PanelSlots) {
        self.claims.reconcile(observed);
        self.dedup.forget_stale(observed, &self.claims);
    }
}

struct AllocatorInner {
    registry: GenerationRegistry,
    store: PersistedStore<PanelSlots>,
    sync: Arc<dyn ImageSyncPort>,
    clock: Arc<dyn ClockPort>,
    state: Mutex<AllocatorState>,
}

/// Handle to the allocator. Clones share state.
#[derive(Clone)]
pub struct SlotAllocator {
    inner: Arc<AllocatorInner>,
}

impl SlotAllocator {
    pub fn new(
        registry: GenerationRegistry,
        store: PersistedStore<PanelSlots>,
        sync: Arc<dyn ImageSyncPort>,
        clock: Arc<dyn ClockPort>,
        project_id: ProjectId,
    ) -> Self {
        Self {
            inner: Arc::new(AllocatorInner {
                registry,
                store,
                sync,
                clock,
                state: Mutex::new(AllocatorState {
                    project_id,
                    claims: PendingClaims::new(),
                    dedup: DedupGuard::new(),
                }),
            }),
        }
    }

    /// Save the completed image for `prompt_id` into the first free slot.
    ///
    /// The slot is claimed before this returns; the persisted write and the
    /// remote sync happen afterwards.
    pub async fn allocate(
        &self,
        prompt_id: PromptId,
        prompt_text: Option<String>,
    ) -> Result<SlotPlacement, AllocationRejection> {
        let mut state = self.inner.state.lock().await;

        let observed = self.inner.store.snapshot();
        if !observed.loaded {
            tracing::debug!(prompt_id = %prompt_id, "Save refused, panels not loaded");
            return Err(AllocationRejection::NotLoaded);
        }
        state.reconcile(&observed.data);

        let generation = self
            .inner
            .registry
            .find_by_prompt(&prompt_id)
            .await
            .ok_or_else(|| AllocationRejection::NotFound(prompt_id.clone()))?;
        let url = match generation.status {
            GenerationStatus::Complete { url } => url,
            _ => return Err(AllocationRejection::NotComplete(prompt_id)),
        };

        if let Some(position) = state.dedup.is_duplicate(&url, &observed.data, &state.claims) {
            tracing::debug!(
                prompt_id = %prompt_id,
                position = %position,
                "Image already on a panel, skipping save"
            );
            state.dedup.record(prompt_id, url);
            return Err(AllocationRejection::AlreadySaved { position });
        }

        let position = first_available(&observed.data, &state.claims)
            .ok_or(AllocationRejection::NoEmptySlots)?;
        state.claims.claim(position, url.clone(), prompt_id.clone());
        state.dedup.record(prompt_id.clone(), url.clone());
        let project_id = state.project_id;

        let prompt = prompt_text.or(Some(generation.prompt_text));
        let image = SavedImage::new(
            url,
            Some(prompt_id.clone()),
            prompt,
            position,
            self.inner.clock.now(),
        );

        // Queued before the lock is released so a project switch cannot slip in between.
        let placed = image.clone();
        self.inner.store.update(move |slots| {
            let mut next = slots.clone();
            if let Err(e) = next.place(position, placed) {
                tracing::warn!(position = %position, error = %e, "Claimed slot could not be written");
            }
            next
        });
        drop(state);

        tracing::info!(
            prompt_id = %prompt_id,
            position = %position,
            project_id = %project_id,
            "Saved image to panel"
        );

        self.spawn_sync(project_id, &image);
        Ok(SlotPlacement { position, image })
    }

    /// Whether `prompt_id` is currently saved with `url`.
    pub async fn is_saved(&self, prompt_id: &PromptId, url: &str) -> bool {
        let mut state = self.inner.state.lock().await;
        let observed = self.inner.store.snapshot();
        if observed.loaded {
            state.reconcile(&observed.data);
        }
        state.dedup.is_saved(prompt_id, url)
    }

    /// Positions reserved but not yet observed in the store.
    #[cfg(test)]
    pub(crate) async fn pending_claims(&self) -> Vec<SlotPosition> {
        self.inner.state.lock().await.claims.positions()
    }

    pub async fn project_id(&self) -> ProjectId {
        self.inner.state.lock().await.project_id
    }

    /// Point the store at another project. Claims and dedup history belong
    /// to the old project and are dropped. With `carry_over`, the new
    /// project starts from that data instead of its stored panels.
    pub async fn switch_project(
        &self,
        project_id: ProjectId,
        carry_over: Option<PanelSlots>,
    ) -> Result<(), RepoError> {
        let mut state = self.inner.state.lock().await;
        state.project_id = project_id;
        state.claims.clear();
        state.dedup.clear();

        if let Some(slots) = carry_over {
            self.inner.store.override_next_load(slots);
        }
        self.inner.store.load(project_id.to_string()).await?;

        tracing::info!(project_id = %project_id, "Switched panel project");
        Ok(())
    }

    /// Queue clearing `position`. A claim on it is dropped: its write was
    /// queued earlier and this one overwrites it.
    pub async fn clear_slot(&self, position: SlotPosition) {
        let mut state = self.inner.state.lock().await;
        self.inner.store.update(move |slots| {
            let mut next = slots.clone();
            if let Err(e) = next.remove(position) {
                tracing::warn!(position = %position, error = %e, "Failed to clear slot");
            }
            next
        });
        state.claims.release(position);
    }

    /// Queue replacing the whole grid. Every pending claim is overwritten.
    pub async fn replace_all(&self, slots: PanelSlots) {
        let mut state = self.inner.state.lock().await;
        self.inner.store.update(move |_| slots);
        state.claims.clear();
    }

    /// Release claims as soon as each persisted write is observed.
    pub fn spawn_reconciler(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let allocator = self.clone();
        let mut updates = self.inner.store.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    changed = updates.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
                let observed: Observed<PanelSlots> = updates.borrow_and_update().clone();
                if observed.loaded {
                    allocator.inner.state.lock().await.reconcile(&observed.data);
                }
            }
            tracing::debug!("Slot claim reconciler stopped");
        })
    }

    fn spawn_sync(&self, project_id: ProjectId, image: &SavedImage) {
        let sync = Arc::clone(&self.inner.sync);
        let payload = SyncedImage {
            side: image.side,
            slot_index: image.slot_index,
            image_url: image.url.clone(),
            prompt: image.prompt.clone(),
        };
        tokio::spawn(async move {
            if let Err(e) = sync.sync_saved_image(project_id, payload).await {
                tracing::warn!(project_id = %project_id, error = %e, "Failed to sync saved image");
            }
        });
    }
}

/// Lowest index on the left, then the right, that is empty and unclaimed.
fn first_available(observed: &PanelSlots, claims: &PendingClaims) -> Option<SlotPosition> {
    PanelSide::ORDER.into_iter().find_map(|side| {
        (0..observed.capacity())
            .map(|index| SlotPosition::new(side, index))
            .find(|position| observed.is_empty_at(*position) && !claims.is_claimed(*position))
    })
}
