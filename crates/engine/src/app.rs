//! Application state and composition.

use std::sync::Arc;

use studio_domain::{PanelSlots, ProjectId};

use crate::infrastructure::{
    persisted_store::PersistedStore,
    ports::{BlobStorePort, ClockPort, ImageGenPort, ImageSyncPort},
};
use crate::use_cases;
use crate::use_cases::generation::{GenerationRegistry, GenerationSettings};
use crate::use_cases::panels::SlotAllocator;

/// Blob namespace holding one panel grid per project.
pub const PANELS_NAMESPACE: &str = "panels";

/// Main application state.
///
/// Passed to HTTP handlers via Axum state.
pub struct App {
    pub use_cases: UseCases,
    pub image_gen: Arc<dyn ImageGenPort>,
}

/// Container for all use cases.
pub struct UseCases {
    pub generation: use_cases::GenerationUseCases,
    pub panels: use_cases::PanelUseCases,
}

impl App {
    /// Wire every use case. Panels stay unloaded until
    /// [`PanelUseCases::switch_project`](use_cases::PanelUseCases::switch_project)
    /// has run for `project_id`.
    pub fn new(
        image_gen: Arc<dyn ImageGenPort>,
        image_sync: Arc<dyn ImageSyncPort>,
        blob_store: Arc<dyn BlobStorePort>,
        clock: Arc<dyn ClockPort>,
        settings: GenerationSettings,
        panel_capacity: usize,
        project_id: ProjectId,
    ) -> Self {
        let registry = GenerationRegistry::new(image_gen.clone(), clock.clone(), settings);

        // Grids stored under a different slot count are resized on load.
        let store = PersistedStore::spawn(
            blob_store,
            PANELS_NAMESPACE,
            PanelSlots::new(panel_capacity),
            move |slots: PanelSlots| slots.normalized(panel_capacity),
        );
        let allocator = SlotAllocator::new(
            registry.clone(),
            store.clone(),
            image_sync,
            clock,
            project_id,
        );

        Self {
            use_cases: UseCases {
                generation: use_cases::GenerationUseCases::new(registry),
                panels: use_cases::PanelUseCases::new(allocator, store, panel_capacity),
            },
            image_gen,
        }
    }
}
