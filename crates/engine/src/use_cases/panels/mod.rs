//! Panel use cases: saving generated images into slots and managing the grid.

mod allocator;
mod claims;
mod dedup;

pub use allocator::{AllocationRejection, SlotAllocator, SlotPlacement};
pub use claims::PendingClaims;
pub use dedup::DedupGuard;

use studio_domain::{DomainError, PanelSlots, ProjectId, PromptId, SavedImage, SlotPosition};

use crate::infrastructure::persisted_store::{Observed, PersistedStore};
use crate::infrastructure::ports::RepoError;

#[derive(Debug, thiserror::Error)]
pub enum PanelError {
    #[error("Panels are still loading")]
    NotLoaded,
    #[error("Slot {0} is empty")]
    SlotEmpty(SlotPosition),
    #[error("Validation error: {0}")]
    Validation(#[from] DomainError),
    #[error("Repository error: {0}")]
    Repo(#[from] RepoError),
}

/// Container for panel use cases.
pub struct PanelUseCases {
    pub allocator: SlotAllocator,
    store: PersistedStore<PanelSlots>,
    capacity: usize,
}

impl PanelUseCases {
    pub fn new(allocator: SlotAllocator, store: PersistedStore<PanelSlots>, capacity: usize) -> Self {
        Self {
            allocator,
            store,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Last observed panel state.
    pub fn snapshot(&self) -> Observed<PanelSlots> {
        self.store.snapshot()
    }

    /// Wait until every queued panel write has been persisted.
    pub async fn flush(&self) {
        self.store.flush().await;
    }

    /// Allocate a slot and wait for the write, so the next snapshot shows it.
    pub async fn save(
        &self,
        prompt_id: PromptId,
        prompt_text: Option<String>,
    ) -> Result<SlotPlacement, AllocationRejection> {
        let placement = self.allocator.allocate(prompt_id, prompt_text).await?;
        self.store.flush().await;
        Ok(placement)
    }

    /// Clear one slot. Returns the image it held.
    pub async fn remove(&self, position: SlotPosition) -> Result<SavedImage, PanelError> {
        let observed = self.loaded_snapshot()?;
        if position.index >= self.capacity {
            return Err(DomainError::SlotOutOfRange {
                side: position.side,
                index: position.index,
                capacity: self.capacity,
            }
            .into());
        }
        let image = observed
            .data
            .get(position)
            .cloned()
            .ok_or(PanelError::SlotEmpty(position))?;

        self.allocator.clear_slot(position).await;
        self.store.flush().await;

        tracing::info!(position = %position, url = %image.url, "Removed image from panel");
        Ok(image)
    }

    /// Replace the whole grid from an external source of truth.
    pub async fn hydrate(&self, slots: PanelSlots) -> Result<Observed<PanelSlots>, PanelError> {
        self.loaded_snapshot()?;
        let slots = slots.normalized(self.capacity);
        let count = slots.occupied_count();

        self.allocator.replace_all(slots).await;
        self.store.flush().await;

        tracing::info!(images = count, "Hydrated panels");
        Ok(self.store.snapshot())
    }

    pub async fn switch_project(
        &self,
        project_id: ProjectId,
        carry_over: Option<PanelSlots>,
    ) -> Result<Observed<PanelSlots>, PanelError> {
        let carry_over = carry_over.map(|slots| slots.normalized(self.capacity));
        self.allocator.switch_project(project_id, carry_over).await?;
        Ok(self.store.snapshot())
    }

    fn loaded_snapshot(&self) -> Result<Observed<PanelSlots>, PanelError> {
        let observed = self.store.snapshot();
        if !observed.loaded {
            return Err(PanelError::NotLoaded);
        }
        Ok(observed)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use futures_util::future::join_all;
    use tokio::sync::{Mutex, Semaphore};
    use tokio_util::sync::CancellationToken;

    use studio_domain::{
        PanelSide, PanelSlots, ProjectId, PromptId, ProviderGenerationId, SavedImage, SlotPosition,
    };

    use super::*;
    use crate::infrastructure::blob_store::InMemoryBlobStore;
    use crate::infrastructure::clock::FixedClock;
    use crate::infrastructure::persisted_store::PersistedStore;
    use crate::infrastructure::polling::PollPolicy;
    use crate::infrastructure::ports::{
        BlobStorePort, DeleteOutcome, GenerationCheck, ImageSyncPort, MockImageGenPort,
        MockImageSyncPort, RepoError, SyncError, SyncedImage,
    };
    use crate::use_cases::generation::{GenerationRegistry, GenerationSettings, PromptSubmission};

    // =============================================================================
    // Fakes
    // =============================================================================

    /// Records every sync call.
    #[derive(Default)]
    struct RecordingSync {
        calls: Mutex<Vec<(ProjectId, SyncedImage)>>,
    }

    #[async_trait]
    impl ImageSyncPort for RecordingSync {
        async fn sync_saved_image(
            &self,
            project_id: ProjectId,
            image: SyncedImage,
        ) -> Result<(), SyncError> {
            self.calls.lock().await.push((project_id, image));
            Ok(())
        }
    }

    /// Blob store whose writes block until a permit is released.
    struct GatedBlobStore {
        inner: InMemoryBlobStore,
        gate: Semaphore,
    }

    impl GatedBlobStore {
        fn closed() -> Self {
            Self {
                inner: InMemoryBlobStore::new(),
                gate: Semaphore::new(0),
            }
        }

        fn open(&self, writes: usize) {
            self.gate.add_permits(writes);
        }
    }

    #[async_trait]
    impl BlobStorePort for GatedBlobStore {
        async fn load(&self, namespace: &str, key: &str) -> Result<Option<String>, RepoError> {
            self.inner.load(namespace, key).await
        }

        async fn save(&self, namespace: &str, key: &str, json: &str) -> Result<(), RepoError> {
            let permit = self.gate.acquire().await.map_err(|_| RepoError::Closed)?;
            permit.forget();
            self.inner.save(namespace, key, json).await
        }
    }

    // =============================================================================
    // Harness
    // =============================================================================

    /// Provider whose image URL is derived from the prompt text, so two prompts
    /// with the same text produce the same URL.
    fn provider() -> MockImageGenPort {
        let mut provider = MockImageGenPort::new();
        provider
            .expect_start()
            .returning(|req| Ok(ProviderGenerationId::new(req.prompt)));
        provider.expect_check().returning(|id| {
            if id.as_str().starts_with("slow") {
                Ok(GenerationCheck::pending())
            } else {
                Ok(GenerationCheck::complete(url_for(id.as_str())))
            }
        });
        provider.expect_delete().returning(|ids| {
            Ok(DeleteOutcome {
                deleted: ids,
                failed: Vec::new(),
            })
        });
        provider
    }

    fn url_for(text: &str) -> String {
        format!("https://cdn.test/{text}.png")
    }

    struct Harness {
        registry: GenerationRegistry,
        store: PersistedStore<PanelSlots>,
        panels: PanelUseCases,
        project_id: ProjectId,
    }

    async fn harness(
        backend: Arc<dyn BlobStorePort>,
        sync: Arc<dyn ImageSyncPort>,
        capacity: usize,
        load: bool,
    ) -> Harness {
        let clock = Arc::new(FixedClock(Utc::now()));
        let registry = GenerationRegistry::new(
            Arc::new(provider()),
            clock.clone(),
            GenerationSettings {
                poll: PollPolicy {
                    interval: Duration::from_millis(1),
                    max_attempts: 10_000,
                },
                ..GenerationSettings::default()
            },
        );
        let project_id = ProjectId::new();
        let store = PersistedStore::spawn(
            backend,
            "panels",
            PanelSlots::new(capacity),
            move |slots: PanelSlots| slots.normalized(capacity),
        );
        if load {
            store.load(project_id.to_string()).await.expect("load panels");
        }
        let allocator = SlotAllocator::new(registry.clone(), store.clone(), sync, clock, project_id);
        let panels = PanelUseCases::new(allocator, store.clone(), capacity);
        Harness {
            registry,
            store,
            panels,
            project_id,
        }
    }

    async fn default_harness() -> Harness {
        harness(
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(RecordingSync::default()),
            4,
            true,
        )
        .await
    }

    /// Submit `(prompt id, text)` pairs and wait for every non-slow one to finish.
    async fn generate(registry: &GenerationRegistry, prompts: &[(&str, &str)]) {
        let submissions = prompts
            .iter()
            .map(|(id, text)| PromptSubmission::new(*id, *text))
            .collect();
        registry.submit(submissions).await.expect("submit");

        for _ in 0..1000 {
            let entries = registry.list().await;
            let done = entries
                .iter()
                .filter(|e| !e.prompt_text.starts_with("slow"))
                .all(|e| e.is_terminal());
            if done {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("generations did not complete");
    }

    async fn save(h: &Harness, prompt_id: &str) -> Result<SlotPlacement, AllocationRejection> {
        h.panels.save(PromptId::new(prompt_id), None).await
    }

    /// Claim a slot without waiting for the write.
    async fn allocate(h: &Harness, prompt_id: &str) -> Result<SlotPlacement, AllocationRejection> {
        h.panels.allocator.allocate(PromptId::new(prompt_id), None).await
    }

    // =============================================================================
    // Allocation
    // =============================================================================

    #[tokio::test]
    async fn back_to_back_saves_take_consecutive_left_slots() {
        let h = default_harness().await;
        generate(&h.registry, &[("p1", "a"), ("p2", "b"), ("p3", "c"), ("p4", "d")]).await;

        let first = save(&h, "p1").await.expect("p1 saved");
        let second = save(&h, "p2").await.expect("p2 saved");

        assert_eq!(first.position, SlotPosition::left(0));
        assert_eq!(second.position, SlotPosition::left(1));
        assert_eq!(first.image.url, url_for("a"));

        h.store.flush().await;
        let observed = h.panels.snapshot();
        assert_eq!(
            observed.data.get(SlotPosition::left(0)).map(|i| i.url.clone()),
            Some(url_for("a"))
        );
        assert_eq!(
            observed.data.get(SlotPosition::left(1)).map(|i| i.url.clone()),
            Some(url_for("b"))
        );
    }

    #[tokio::test]
    async fn saved_image_is_visible_as_soon_as_save_returns() {
        let h = default_harness().await;
        generate(&h.registry, &[("p1", "a")]).await;

        let placement = save(&h, "p1").await.expect("p1 saved");

        let observed = h.panels.snapshot();
        assert_eq!(
            observed.data.get(placement.position).map(|i| i.url.clone()),
            Some(url_for("a"))
        );
    }

    #[tokio::test]
    async fn stored_grid_is_resized_to_configured_capacity() {
        let backend = Arc::new(InMemoryBlobStore::new());
        let h = harness(backend.clone(), Arc::new(RecordingSync::default()), 4, false).await;
        let mut narrow = PanelSlots::new(1);
        let position = SlotPosition::left(0);
        narrow
            .place(position, SavedImage::new("old", None, None, position, Utc::now()))
            .expect("place");
        backend
            .save(
                "panels",
                &h.project_id.to_string(),
                &serde_json::to_string(&narrow).expect("serialize"),
            )
            .await
            .expect("seed");

        let observed = h
            .panels
            .switch_project(h.project_id, None)
            .await
            .expect("load");
        assert_eq!(observed.data.capacity(), 4);
        assert!(observed.data.contains_url("old"));

        generate(&h.registry, &[("p1", "a"), ("p2", "b"), ("p3", "c")]).await;
        assert_eq!(save(&h, "p1").await.expect("p1").position, SlotPosition::left(1));
        assert_eq!(save(&h, "p2").await.expect("p2").position, SlotPosition::left(2));
        assert_eq!(save(&h, "p3").await.expect("p3").position, SlotPosition::left(3));

        let removed = h.panels.remove(SlotPosition::left(2)).await.expect("remove");
        assert_eq!(removed.url, url_for("b"));
    }

    #[tokio::test]
    async fn concurrent_saves_never_share_a_slot() {
        let h = default_harness().await;
        let prompts: Vec<(String, String)> = (0..10)
            .map(|i| (format!("p{i}"), format!("img{i}")))
            .collect();
        let borrowed: Vec<(&str, &str)> = prompts
            .iter()
            .map(|(id, text)| (id.as_str(), text.as_str()))
            .collect();
        generate(&h.registry, &borrowed).await;

        let results = join_all(prompts.iter().map(|(id, _)| save(&h, id))).await;

        let mut positions: Vec<SlotPosition> = results
            .iter()
            .filter_map(|r| r.as_ref().ok().map(|p| p.position))
            .collect();
        let rejected = results
            .iter()
            .filter(|r| matches!(r, Err(AllocationRejection::NoEmptySlots)))
            .count();
        positions.sort();
        positions.dedup();

        assert_eq!(positions.len(), 8);
        assert_eq!(rejected, 2);
    }

    #[tokio::test]
    async fn left_panel_is_filled_before_right() {
        let h = default_harness().await;
        let mut existing = PanelSlots::new(4);
        for index in [0, 2] {
            let position = SlotPosition::left(index);
            existing
                .place(position, SavedImage::new(format!("old-{index}"), None, None, position, Utc::now()))
                .expect("place");
        }
        h.panels.hydrate(existing).await.expect("hydrate");
        generate(&h.registry, &[("p1", "a"), ("p2", "b"), ("p3", "c")]).await;

        assert_eq!(save(&h, "p1").await.expect("p1").position, SlotPosition::left(1));
        assert_eq!(save(&h, "p2").await.expect("p2").position, SlotPosition::left(3));
        assert_eq!(save(&h, "p3").await.expect("p3").position, SlotPosition::right(0));
    }

    #[tokio::test]
    async fn full_panels_reject_with_no_empty_slots() {
        let h = harness(
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(RecordingSync::default()),
            1,
            true,
        )
        .await;
        generate(&h.registry, &[("p1", "a"), ("p2", "b"), ("p3", "c")]).await;

        assert_eq!(save(&h, "p1").await.expect("p1").position, SlotPosition::left(0));
        assert_eq!(save(&h, "p2").await.expect("p2").position, SlotPosition::right(0));
        assert_eq!(save(&h, "p3").await, Err(AllocationRejection::NoEmptySlots));
    }

    #[tokio::test]
    async fn save_before_load_is_refused() {
        let h = harness(
            Arc::new(InMemoryBlobStore::new()),
            Arc::new(RecordingSync::default()),
            4,
            false,
        )
        .await;
        generate(&h.registry, &[("p1", "a")]).await;

        assert_eq!(save(&h, "p1").await, Err(AllocationRejection::NotLoaded));
        assert!(h.panels.allocator.pending_claims().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_and_unfinished_prompts_are_refused() {
        let h = default_harness().await;
        generate(&h.registry, &[("p1", "slow-render")]).await;

        assert_eq!(
            save(&h, "missing").await,
            Err(AllocationRejection::NotFound(PromptId::new("missing")))
        );
        assert_eq!(
            save(&h, "p1").await,
            Err(AllocationRejection::NotComplete(PromptId::new("p1")))
        );
        h.registry.clear().await;
    }

    // =============================================================================
    // Dedup
    // =============================================================================

    #[tokio::test]
    async fn same_url_under_different_prompts_is_saved_once() {
        let h = default_harness().await;
        generate(&h.registry, &[("p1", "same"), ("p2", "same")]).await;

        let first = allocate(&h, "p1").await.expect("p1 saved");
        // Possibly still only a pending claim: dedup must see it either way.
        let second = allocate(&h, "p2").await;
        assert_eq!(
            second,
            Err(AllocationRejection::AlreadySaved {
                position: first.position
            })
        );

        h.store.flush().await;
        assert_eq!(
            save(&h, "p1").await,
            Err(AllocationRejection::AlreadySaved {
                position: SlotPosition::left(0)
            })
        );
        assert_eq!(h.panels.snapshot().data.occupied_count(), 1);
    }

    #[tokio::test]
    async fn reused_prompt_id_with_new_image_gets_a_new_slot() {
        let h = default_harness().await;
        generate(&h.registry, &[("slot-2", "first-take")]).await;
        let first = save(&h, "slot-2").await.expect("first take saved");
        h.store.flush().await;

        generate(&h.registry, &[("slot-2", "second-take")]).await;
        let second = save(&h, "slot-2").await.expect("second take saved");

        assert_eq!(first.position, SlotPosition::left(0));
        assert_eq!(second.position, SlotPosition::left(1));
        assert_eq!(second.image.url, url_for("second-take"));
        assert!(
            h.panels
                .allocator
                .is_saved(&PromptId::new("slot-2"), &url_for("second-take"))
                .await
        );
        assert!(
            !h.panels
                .allocator
                .is_saved(&PromptId::new("slot-2"), &url_for("first-take"))
                .await
        );
    }

    #[tokio::test]
    async fn removed_image_can_be_saved_again() {
        let h = default_harness().await;
        generate(&h.registry, &[("p1", "a")]).await;
        save(&h, "p1").await.expect("saved");
        h.store.flush().await;

        let removed = h.panels.remove(SlotPosition::left(0)).await.expect("remove");
        assert_eq!(removed.url, url_for("a"));
        assert!(!h.panels.allocator.is_saved(&PromptId::new("p1"), &url_for("a")).await);

        let again = save(&h, "p1").await.expect("saved again");
        assert_eq!(again.position, SlotPosition::left(0));
    }

    // =============================================================================
    // Claims
    // =============================================================================

    #[tokio::test]
    async fn claim_is_held_until_the_write_is_observed() {
        let backend = Arc::new(GatedBlobStore::closed());
        let h = harness(backend.clone(), Arc::new(RecordingSync::default()), 4, true).await;
        generate(&h.registry, &[("p1", "a"), ("p2", "b"), ("p3", "c")]).await;

        let first = allocate(&h, "p1").await.expect("p1");
        // The store is stuck writing p1, so left:0 still looks empty.
        assert!(h.panels.snapshot().data.is_empty_at(SlotPosition::left(0)));

        let second = allocate(&h, "p2").await.expect("p2");
        assert_eq!(first.position, SlotPosition::left(0));
        assert_eq!(second.position, SlotPosition::left(1));
        assert_eq!(
            h.panels.allocator.pending_claims().await,
            vec![SlotPosition::left(0), SlotPosition::left(1)]
        );

        backend.open(2);
        h.store.flush().await;

        let third = allocate(&h, "p3").await.expect("p3");
        assert_eq!(third.position, SlotPosition::left(2));
        assert_eq!(
            h.panels.allocator.pending_claims().await,
            vec![SlotPosition::left(2)]
        );

        backend.open(1);
        h.store.flush().await;
    }

    #[tokio::test]
    async fn reconciler_releases_claims_in_the_background() {
        let h = default_harness().await;
        let cancel = CancellationToken::new();
        let reconciler = h.panels.allocator.spawn_reconciler(cancel.clone());
        generate(&h.registry, &[("p1", "a")]).await;

        allocate(&h, "p1").await.expect("p1");

        let mut released = false;
        for _ in 0..500 {
            if h.panels.allocator.pending_claims().await.is_empty() {
                released = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        assert!(released, "claim was never released");

        cancel.cancel();
        reconciler.await.expect("reconciler task");
    }

    // =============================================================================
    // Sync and project switching
    // =============================================================================

    #[tokio::test]
    async fn save_is_mirrored_to_the_sync_endpoint() {
        let sync = Arc::new(RecordingSync::default());
        let h = harness(Arc::new(InMemoryBlobStore::new()), sync.clone(), 4, true).await;
        generate(&h.registry, &[("p1", "a")]).await;

        h.panels
            .save(PromptId::new("p1"), Some("a castle".into()))
            .await
            .expect("saved");

        for _ in 0..500 {
            if !sync.calls.lock().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        let calls = sync.calls.lock().await;
        assert_eq!(calls.len(), 1);
        let (project_id, image) = &calls[0];
        assert_eq!(*project_id, h.project_id);
        assert_eq!(image.side, PanelSide::Left);
        assert_eq!(image.slot_index, 0);
        assert_eq!(image.image_url, url_for("a"));
        assert_eq!(image.prompt.as_deref(), Some("a castle"));
    }

    #[tokio::test]
    async fn sync_failure_keeps_the_local_save() {
        let mut sync = MockImageSyncPort::new();
        sync.expect_sync_saved_image()
            .returning(|_, _| Err(SyncError::Request("connection refused".into())));
        let h = harness(Arc::new(InMemoryBlobStore::new()), Arc::new(sync), 4, true).await;
        generate(&h.registry, &[("p1", "a")]).await;

        let placement = save(&h, "p1").await.expect("saved");
        h.store.flush().await;

        assert_eq!(placement.image.prompt.as_deref(), Some("a"));
        assert!(h.panels.snapshot().data.get(SlotPosition::left(0)).is_some());
    }

    #[tokio::test]
    async fn switching_project_loads_its_own_panels() {
        let backend = Arc::new(InMemoryBlobStore::new());
        let h = harness(backend.clone(), Arc::new(RecordingSync::default()), 4, true).await;
        generate(&h.registry, &[("p1", "a")]).await;
        save(&h, "p1").await.expect("saved");
        h.store.flush().await;

        let other = ProjectId::new();
        let observed = h.panels.switch_project(other, None).await.expect("switch");
        assert_eq!(observed.key, other.to_string());
        assert_eq!(observed.data.occupied_count(), 0);
        assert_eq!(h.panels.allocator.project_id().await, other);

        // Same image is not a duplicate in the new project.
        assert_eq!(save(&h, "p1").await.expect("saved").position, SlotPosition::left(0));

        let observed = h.panels.switch_project(h.project_id, None).await.expect("switch back");
        assert_eq!(observed.data.occupied_count(), 1);
    }

    #[tokio::test]
    async fn switching_with_carry_over_keeps_current_panels() {
        let h = default_harness().await;
        generate(&h.registry, &[("p1", "a")]).await;
        save(&h, "p1").await.expect("saved");
        h.store.flush().await;

        let current = (*h.panels.snapshot().data).clone();
        let other = ProjectId::new();
        let observed = h
            .panels
            .switch_project(other, Some(current))
            .await
            .expect("switch");

        assert_eq!(observed.key, other.to_string());
        assert_eq!(
            observed.data.get(SlotPosition::left(0)).map(|i| i.url.clone()),
            Some(url_for("a"))
        );
    }

    // =============================================================================
    // Grid management
    // =============================================================================

    #[tokio::test]
    async fn hydrate_normalizes_to_configured_capacity() {
        let h = default_harness().await;
        let mut wide = PanelSlots::new(6);
        let position = SlotPosition::right(5);
        wide.place(position, SavedImage::new("lost", None, None, position, Utc::now()))
            .expect("place");
        let position = SlotPosition::right(1);
        wide.place(position, SavedImage::new("kept", None, None, position, Utc::now()))
            .expect("place");

        let observed = h.panels.hydrate(wide).await.expect("hydrate");

        assert_eq!(observed.data.capacity(), 4);
        assert!(observed.data.contains_url("kept"));
        assert!(!observed.data.contains_url("lost"));
    }

    #[tokio::test]
    async fn removing_an_empty_or_missing_slot_fails() {
        let h = default_harness().await;

        assert!(matches!(
            h.panels.remove(SlotPosition::left(1)).await,
            Err(PanelError::SlotEmpty(_))
        ));
        assert!(matches!(
            h.panels.remove(SlotPosition::right(9)).await,
            Err(PanelError::Validation(_))
        ));
    }
}
